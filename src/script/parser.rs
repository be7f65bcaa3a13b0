//! Recursive-descent parser producing [`Program`].

use std::rc::Rc;

use super::ast::{BinaryOp, Expr, FunctionBody, FunctionDecl, LogicalOp, Program, Stmt, StmtKind, UnaryOp};
use super::lexer::{tokenize, Tok, Token};
use crate::engine::ScriptError;

const RESERVED: &[&str] = &[
    "let", "const", "var", "if", "else", "while", "do", "for", "function", "return", "break",
    "continue", "throw", "try", "catch", "finally", "new", "typeof", "await", "true", "false",
    "null", "class", "delete", "in", "instanceof", "switch", "case", "default", "void", "yield",
];

const BINARY_LEVELS: &[&[(&str, BinaryOp)]] = &[
    &[("===", BinaryOp::StrictEq), ("!==", BinaryOp::StrictNotEq), ("==", BinaryOp::Eq), ("!=", BinaryOp::NotEq)],
    &[("<=", BinaryOp::LtEq), (">=", BinaryOp::GtEq), ("<", BinaryOp::Lt), (">", BinaryOp::Gt)],
    &[("+", BinaryOp::Add), ("-", BinaryOp::Sub)],
    &[("*", BinaryOp::Mul), ("/", BinaryOp::Div), ("%", BinaryOp::Rem)],
];

const ASSIGN_OPS: &[(&str, Option<BinaryOp>)] = &[
    ("=", None),
    ("+=", Some(BinaryOp::Add)),
    ("-=", Some(BinaryOp::Sub)),
    ("*=", Some(BinaryOp::Mul)),
    ("/=", Some(BinaryOp::Div)),
    ("%=", Some(BinaryOp::Rem)),
];

/// Deepest syntax tree the parser will build. Evaluation recurses once per
/// level, so this bounds the native stack a single statement can use.
pub const MAX_NESTING: usize = 256;

/// Parse a complete script.
pub fn parse(source: &str) -> Result<Program, ScriptError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser { tokens, pos: 0, functions: Vec::new(), depth: 0 };
    let mut body = Vec::new();
    while !parser.at_eof() {
        body.push(parser.statement()?);
    }
    Ok(Program { body })
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    /// One entry per enclosing function: whether it is `async`.
    functions: Vec<bool>,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        let last = self.tokens.len() - 1;
        &self.tokens[self.pos.min(last)]
    }

    fn peek_at(&self, offset: usize) -> &Tok {
        let last = self.tokens.len() - 1;
        &self.tokens[(self.pos + offset).min(last)].tok
    }

    fn bump(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn at_eof(&self) -> bool {
        self.peek().tok == Tok::Eof
    }

    fn previous_line(&self) -> usize {
        self.tokens[self.pos.saturating_sub(1)].line
    }

    fn is_punct(&self, p: &str) -> bool {
        matches!(&self.peek().tok, Tok::Punct(q) if *q == p)
    }

    fn eat_punct(&mut self, p: &str) -> bool {
        if self.is_punct(p) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, p: &str) -> Result<(), ScriptError> {
        if self.eat_punct(p) {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn is_keyword(&self, kw: &str) -> bool {
        matches!(&self.peek().tok, Tok::Ident(s) if s == kw)
    }

    fn eat_keyword(&mut self, kw: &str) -> bool {
        if self.is_keyword(kw) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn error(&self, message: impl Into<String>) -> ScriptError {
        let token = self.peek();
        ScriptError::Syntax { message: message.into(), line: token.line, column: token.column }
    }

    /// Count one more level of nesting below the current node.
    fn deepen(&mut self) -> Result<(), ScriptError> {
        if self.depth >= MAX_NESTING {
            return Err(self.error("Maximum nesting depth exceeded"));
        }
        self.depth += 1;
        Ok(())
    }

    fn nested<T>(&mut self, parse: fn(&mut Self) -> Result<T, ScriptError>) -> Result<T, ScriptError> {
        self.deepen()?;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn unexpected(&self) -> ScriptError {
        let message = match &self.peek().tok {
            Tok::Eof => "Unexpected end of input".to_string(),
            Tok::Punct(p) => format!("Unexpected token '{p}'"),
            Tok::Ident(name) => format!("Unexpected identifier '{name}'"),
            Tok::Number(_) => "Unexpected number".to_string(),
            Tok::Str(_) => "Unexpected string".to_string(),
        };
        self.error(message)
    }

    fn binding_name(&mut self) -> Result<String, ScriptError> {
        match &self.peek().tok {
            Tok::Ident(name) if !RESERVED.contains(&name.as_str()) => {
                let name = name.clone();
                self.bump();
                Ok(name)
            }
            Tok::Ident(name) => Err(self.error(format!("Unexpected token '{name}'"))),
            _ => Err(self.unexpected()),
        }
    }

    /// Semicolons are optional at line breaks, before `}` and at the end of input.
    fn end_statement(&mut self) -> Result<(), ScriptError> {
        if self.eat_punct(";") || self.is_punct("}") || self.at_eof() || self.peek().line > self.previous_line() {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn statement(&mut self) -> Result<Stmt, ScriptError> {
        self.nested(Self::statement_at_depth)
    }

    fn statement_at_depth(&mut self) -> Result<Stmt, ScriptError> {
        let line = self.peek().line;
        let keyword = match &self.peek().tok {
            Tok::Ident(s) => Some(s.clone()),
            _ => None,
        };

        if self.eat_punct("{") {
            return Ok(Stmt { kind: StmtKind::Block(self.block_body()?), line });
        }
        if self.eat_punct(";") {
            return Ok(Stmt { kind: StmtKind::Empty, line });
        }

        let kind = match keyword.as_deref() {
            Some("let") | Some("const") | Some("var") => {
                let kind = self.declaration()?;
                self.end_statement()?;
                kind
            }
            Some("if") => {
                self.bump();
                self.expect_punct("(")?;
                let cond = self.expression()?;
                self.expect_punct(")")?;
                let then = Box::new(self.statement()?);
                let otherwise = if self.eat_keyword("else") { Some(Box::new(self.statement()?)) } else { None };
                StmtKind::If { cond, then, otherwise }
            }
            Some("while") => {
                self.bump();
                self.expect_punct("(")?;
                let cond = self.expression()?;
                self.expect_punct(")")?;
                StmtKind::While { cond, body: Box::new(self.statement()?) }
            }
            Some("do") => {
                self.bump();
                let body = Box::new(self.statement()?);
                if !self.eat_keyword("while") {
                    return Err(self.unexpected());
                }
                self.expect_punct("(")?;
                let cond = self.expression()?;
                self.expect_punct(")")?;
                self.eat_punct(";");
                StmtKind::DoWhile { body, cond }
            }
            Some("for") => self.for_statement()?,
            Some("function") => {
                self.bump();
                StmtKind::Function(self.function_rest(false, true)?)
            }
            Some("async") if matches!(self.peek_at(1), Tok::Ident(s) if s == "function") => {
                self.bump();
                self.bump();
                StmtKind::Function(self.function_rest(true, true)?)
            }
            Some("return") => {
                if self.functions.is_empty() {
                    return Err(self.error("Illegal return statement"));
                }
                self.bump();
                let value = if self.is_punct(";") || self.is_punct("}") || self.at_eof() || self.peek().line > self.previous_line() {
                    None
                } else {
                    Some(self.expression()?)
                };
                self.end_statement()?;
                StmtKind::Return(value)
            }
            Some("break") => {
                self.bump();
                self.end_statement()?;
                StmtKind::Break
            }
            Some("continue") => {
                self.bump();
                self.end_statement()?;
                StmtKind::Continue
            }
            Some("throw") => {
                self.bump();
                let value = self.expression()?;
                self.end_statement()?;
                StmtKind::Throw(value)
            }
            Some("try") => self.try_statement()?,
            _ => {
                let expr = self.expression()?;
                self.end_statement()?;
                StmtKind::Expr(expr)
            }
        };
        Ok(Stmt { kind, line })
    }

    /// Statements up to the closing brace; the opening brace is already consumed.
    fn block_body(&mut self) -> Result<Vec<Stmt>, ScriptError> {
        let mut body = Vec::new();
        while !self.eat_punct("}") {
            if self.at_eof() {
                return Err(self.unexpected());
            }
            body.push(self.statement()?);
        }
        Ok(body)
    }

    fn braced_block(&mut self) -> Result<Vec<Stmt>, ScriptError> {
        self.expect_punct("{")?;
        self.block_body()
    }

    fn declaration(&mut self) -> Result<StmtKind, ScriptError> {
        let mutable = !self.is_keyword("const");
        self.bump();
        let name = self.binding_name()?;
        let init = if self.eat_punct("=") { Some(self.assignment()?) } else { None };
        if init.is_none() && !mutable {
            return Err(self.error("Missing initializer in const declaration"));
        }
        Ok(StmtKind::Declare { name, init, mutable })
    }

    fn for_statement(&mut self) -> Result<StmtKind, ScriptError> {
        self.bump();
        self.expect_punct("(")?;

        let init = if self.is_keyword("let") || self.is_keyword("const") || self.is_keyword("var") {
            let line = self.peek().line;
            if matches!(self.peek_at(2), Tok::Ident(s) if s == "of") {
                let mutable = !self.is_keyword("const");
                self.bump();
                let name = self.binding_name()?;
                self.bump();
                let iterable = self.expression()?;
                self.expect_punct(")")?;
                let body = Box::new(self.statement()?);
                return Ok(StmtKind::ForOf { name, mutable, iterable, body });
            }
            let kind = self.declaration()?;
            Some(Box::new(Stmt { kind, line }))
        } else if self.is_punct(";") {
            None
        } else {
            let line = self.peek().line;
            Some(Box::new(Stmt { kind: StmtKind::Expr(self.expression()?), line }))
        };
        self.expect_punct(";")?;

        let cond = if self.is_punct(";") { None } else { Some(self.expression()?) };
        self.expect_punct(";")?;
        let update = if self.is_punct(")") { None } else { Some(self.expression()?) };
        self.expect_punct(")")?;

        let body = Box::new(self.statement()?);
        Ok(StmtKind::For { init, cond, update, body })
    }

    fn try_statement(&mut self) -> Result<StmtKind, ScriptError> {
        self.bump();
        let body = self.braced_block()?;
        let mut param = None;
        let mut handler = None;
        if self.eat_keyword("catch") {
            if self.eat_punct("(") {
                param = Some(self.binding_name()?);
                self.expect_punct(")")?;
            }
            handler = Some(self.braced_block()?);
        }
        let finalizer = if self.eat_keyword("finally") { Some(self.braced_block()?) } else { None };
        if handler.is_none() && finalizer.is_none() {
            return Err(self.error("Missing catch or finally after try"));
        }
        Ok(StmtKind::Try { body, param, handler, finalizer })
    }

    /// Parses `name(params) { body }` after the `function` keyword.
    fn function_rest(&mut self, is_async: bool, require_name: bool) -> Result<Rc<FunctionDecl>, ScriptError> {
        let name = if require_name || matches!(&self.peek().tok, Tok::Ident(_)) {
            Some(self.binding_name()?)
        } else {
            None
        };
        let params = self.parameter_list()?;
        self.functions.push(is_async);
        let body = self.braced_block();
        self.functions.pop();
        Ok(Rc::new(FunctionDecl { name, params, body: FunctionBody::Block(body?), is_async }))
    }

    fn parameter_list(&mut self) -> Result<Vec<String>, ScriptError> {
        self.expect_punct("(")?;
        let mut params = Vec::new();
        while !self.eat_punct(")") {
            params.push(self.binding_name()?);
            if !self.is_punct(")") {
                self.expect_punct(",")?;
            }
        }
        Ok(params)
    }

    fn expression(&mut self) -> Result<Expr, ScriptError> {
        self.assignment()
    }

    /// Index of the `)` matching the `(` at `self.pos + offset`.
    fn matching_paren(&self, offset: usize) -> Option<usize> {
        let mut depth = 0usize;
        for (i, token) in self.tokens.iter().enumerate().skip(self.pos + offset) {
            match token.tok {
                Tok::Punct("(") => depth += 1,
                Tok::Punct(")") => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(i);
                    }
                }
                Tok::Eof => return None,
                _ => {}
            }
        }
        None
    }

    fn arrow_at(&self, offset: usize) -> bool {
        match self.peek_at(offset) {
            Tok::Ident(name) if !RESERVED.contains(&name.as_str()) => {
                matches!(self.peek_at(offset + 1), Tok::Punct("=>"))
            }
            Tok::Punct("(") => self
                .matching_paren(offset)
                .is_some_and(|close| matches!(self.tokens.get(close + 1).map(|t| &t.tok), Some(Tok::Punct("=>")))),
            _ => false,
        }
    }

    fn arrow(&mut self, is_async: bool) -> Result<Expr, ScriptError> {
        let params = if self.is_punct("(") { self.parameter_list()? } else { vec![self.binding_name()?] };
        self.expect_punct("=>")?;
        self.functions.push(is_async);
        let body = if self.eat_punct("{") {
            self.block_body().map(FunctionBody::Block)
        } else {
            self.assignment().map(FunctionBody::Expr)
        };
        self.functions.pop();
        Ok(Expr::Function(Rc::new(FunctionDecl { name: None, params, body: body?, is_async })))
    }

    fn assignment(&mut self) -> Result<Expr, ScriptError> {
        self.nested(Self::assignment_at_depth)
    }

    fn assignment_at_depth(&mut self) -> Result<Expr, ScriptError> {
        if self.arrow_at(0) {
            return self.arrow(false);
        }
        if self.is_keyword("async") && self.arrow_at(1) {
            self.bump();
            return self.arrow(true);
        }

        let target = self.conditional()?;
        for (p, op) in ASSIGN_OPS {
            if self.is_punct(p) {
                if !is_assignable(&target) {
                    return Err(self.error("Invalid left-hand side in assignment"));
                }
                self.bump();
                let value = self.assignment()?;
                return Ok(Expr::Assign { target: Box::new(target), op: *op, value: Box::new(value) });
            }
        }
        Ok(target)
    }

    fn conditional(&mut self) -> Result<Expr, ScriptError> {
        let cond = self.logical_or()?;
        if !self.eat_punct("?") {
            return Ok(cond);
        }
        let then = self.assignment()?;
        self.expect_punct(":")?;
        let otherwise = self.assignment()?;
        Ok(Expr::Conditional { cond: Box::new(cond), then: Box::new(then), otherwise: Box::new(otherwise) })
    }

    fn logical_or(&mut self) -> Result<Expr, ScriptError> {
        let depth = self.depth;
        let mut left = self.logical_and()?;
        loop {
            let op = if self.eat_punct("||") {
                LogicalOp::Or
            } else if self.eat_punct("??") {
                LogicalOp::Nullish
            } else {
                self.depth = depth;
                return Ok(left);
            };
            self.deepen()?;
            let right = self.logical_and()?;
            left = Expr::Logical { op, left: Box::new(left), right: Box::new(right) };
        }
    }

    fn logical_and(&mut self) -> Result<Expr, ScriptError> {
        let depth = self.depth;
        let mut left = self.binary(0)?;
        while self.eat_punct("&&") {
            self.deepen()?;
            let right = self.binary(0)?;
            left = Expr::Logical { op: LogicalOp::And, left: Box::new(left), right: Box::new(right) };
        }
        self.depth = depth;
        Ok(left)
    }

    fn binary(&mut self, level: usize) -> Result<Expr, ScriptError> {
        if level == BINARY_LEVELS.len() {
            return self.unary();
        }
        let depth = self.depth;
        let mut left = self.binary(level + 1)?;
        'operators: loop {
            for (p, op) in BINARY_LEVELS[level] {
                if self.eat_punct(p) {
                    self.deepen()?;
                    let right = self.binary(level + 1)?;
                    left = Expr::Binary { op: *op, left: Box::new(left), right: Box::new(right) };
                    continue 'operators;
                }
            }
            self.depth = depth;
            return Ok(left);
        }
    }

    fn unary(&mut self) -> Result<Expr, ScriptError> {
        self.nested(Self::unary_at_depth)
    }

    fn unary_at_depth(&mut self) -> Result<Expr, ScriptError> {
        let op = if self.is_punct("!") {
            Some(UnaryOp::Not)
        } else if self.is_punct("-") {
            Some(UnaryOp::Neg)
        } else if self.is_punct("+") {
            Some(UnaryOp::Plus)
        } else if self.is_keyword("typeof") {
            Some(UnaryOp::Typeof)
        } else {
            None
        };
        if let Some(op) = op {
            self.bump();
            let expr = self.unary()?;
            return Ok(Expr::Unary { op, expr: Box::new(expr) });
        }

        if self.is_punct("++") || self.is_punct("--") {
            let delta = if self.is_punct("++") { 1.0 } else { -1.0 };
            self.bump();
            let target = self.unary()?;
            if !is_assignable(&target) {
                return Err(self.error("Invalid left-hand side expression in prefix operation"));
            }
            return Ok(Expr::Update { target: Box::new(target), delta, prefix: true });
        }

        if self.is_keyword("await") {
            if self.functions.last() == Some(&false) {
                return Err(self.error("await is only valid in async functions and the top level bodies of modules"));
            }
            self.bump();
            let expr = self.unary()?;
            return Ok(Expr::Await(Box::new(expr)));
        }

        self.postfix()
    }

    fn postfix(&mut self) -> Result<Expr, ScriptError> {
        let expr = self.call_member()?;
        let same_line = self.peek().line == self.previous_line();
        if same_line && (self.is_punct("++") || self.is_punct("--")) {
            if !is_assignable(&expr) {
                return Err(self.error("Invalid left-hand side expression in postfix operation"));
            }
            let delta = if self.is_punct("++") { 1.0 } else { -1.0 };
            self.bump();
            return Ok(Expr::Update { target: Box::new(expr), delta, prefix: false });
        }
        Ok(expr)
    }

    fn property_name(&mut self) -> Result<String, ScriptError> {
        match &self.peek().tok {
            Tok::Ident(name) => {
                let name = name.clone();
                self.bump();
                Ok(name)
            }
            _ => Err(self.unexpected()),
        }
    }

    fn call_member(&mut self) -> Result<Expr, ScriptError> {
        let depth = self.depth;
        let mut expr = if self.eat_keyword("new") {
            let mut callee = self.primary()?;
            while self.eat_punct(".") {
                self.deepen()?;
                let property = self.property_name()?;
                callee = Expr::Member { object: Box::new(callee), property, optional: false };
            }
            let args = if self.is_punct("(") { self.arguments()? } else { Vec::new() };
            Expr::New { callee: Box::new(callee), args }
        } else {
            self.primary()?
        };

        loop {
            if self.is_punct(".") || self.is_punct("?.") || self.is_punct("[") || self.is_punct("(") {
                self.deepen()?;
            }
            if self.eat_punct(".") {
                let property = self.property_name()?;
                expr = Expr::Member { object: Box::new(expr), property, optional: false };
            } else if self.eat_punct("?.") {
                let property = self.property_name()?;
                expr = Expr::Member { object: Box::new(expr), property, optional: true };
            } else if self.eat_punct("[") {
                let index = self.expression()?;
                self.expect_punct("]")?;
                expr = Expr::Index { object: Box::new(expr), index: Box::new(index) };
            } else if self.is_punct("(") {
                let args = self.arguments()?;
                expr = Expr::Call { callee: Box::new(expr), args };
            } else {
                self.depth = depth;
                return Ok(expr);
            }
        }
    }

    fn arguments(&mut self) -> Result<Vec<Expr>, ScriptError> {
        self.expect_punct("(")?;
        let mut args = Vec::new();
        while !self.eat_punct(")") {
            args.push(self.assignment()?);
            if !self.is_punct(")") {
                self.expect_punct(",")?;
            }
        }
        Ok(args)
    }

    fn primary(&mut self) -> Result<Expr, ScriptError> {
        let token = self.peek().clone();
        match token.tok {
            Tok::Number(n) => {
                self.bump();
                Ok(Expr::Number(n))
            }
            Tok::Str(s) => {
                self.bump();
                Ok(Expr::Str(Rc::from(s)))
            }
            Tok::Punct("(") => {
                self.bump();
                let expr = self.expression()?;
                self.expect_punct(")")?;
                Ok(expr)
            }
            Tok::Punct("[") => {
                self.bump();
                let mut items = Vec::new();
                while !self.eat_punct("]") {
                    items.push(self.assignment()?);
                    if !self.is_punct("]") {
                        self.expect_punct(",")?;
                    }
                }
                Ok(Expr::Array(items))
            }
            Tok::Punct("{") => {
                self.bump();
                self.object_literal()
            }
            Tok::Ident(name) => match name.as_str() {
                "true" => {
                    self.bump();
                    Ok(Expr::Bool(true))
                }
                "false" => {
                    self.bump();
                    Ok(Expr::Bool(false))
                }
                "null" => {
                    self.bump();
                    Ok(Expr::Null)
                }
                "undefined" => {
                    self.bump();
                    Ok(Expr::Undefined)
                }
                "function" => {
                    self.bump();
                    Ok(Expr::Function(self.function_rest(false, false)?))
                }
                "async" if matches!(self.peek_at(1), Tok::Ident(s) if s == "function") => {
                    self.bump();
                    self.bump();
                    Ok(Expr::Function(self.function_rest(true, false)?))
                }
                _ if RESERVED.contains(&name.as_str()) => Err(self.error(format!("Unexpected token '{name}'"))),
                _ => {
                    self.bump();
                    Ok(Expr::Ident(name))
                }
            },
            _ => Err(self.unexpected()),
        }
    }

    /// Object literal after the opening brace.
    fn object_literal(&mut self) -> Result<Expr, ScriptError> {
        let mut props = Vec::new();
        while !self.eat_punct("}") {
            let key = match self.peek().tok.clone() {
                Tok::Ident(name) => name,
                Tok::Str(s) => s,
                Tok::Number(n) => super::value::format_number(n),
                _ => return Err(self.unexpected()),
            };
            self.bump();
            let value = if self.eat_punct(":") {
                self.assignment()?
            } else if self.is_punct(",") || self.is_punct("}") {
                Expr::Ident(key.clone())
            } else {
                return Err(self.unexpected());
            };
            props.push((key, value));
            if !self.is_punct("}") {
                self.expect_punct(",")?;
            }
        }
        Ok(Expr::Object(props))
    }
}

fn is_assignable(expr: &Expr) -> bool {
    matches!(expr, Expr::Ident(_) | Expr::Member { optional: false, .. } | Expr::Index { .. })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(src: &str) -> Program {
        parse(src).unwrap_or_else(|e| panic!("{src:?} failed: {e}"))
    }

    fn syntax_message(src: &str) -> String {
        match parse(src) {
            Err(ScriptError::Syntax { message, .. }) => message,
            other => panic!("expected syntax error, got {other:?}"),
        }
    }

    #[test]
    fn semicolons_are_optional_at_line_breaks() {
        let program = parse_ok("console.log(\"A\")\nawait prompt(\"name?\")\nconsole.log(\"B\")");
        assert_eq!(program.body.len(), 3);
        assert_eq!(program.body[2].line, 3);
        assert!(matches!(&program.body[1].kind, StmtKind::Expr(Expr::Await(_))));
    }

    #[test]
    fn two_statements_on_one_line_need_a_semicolon() {
        assert_eq!(syntax_message("let a = 1 let b = 2"), "Unexpected identifier 'let'");
    }

    #[test]
    fn parses_arrow_functions() {
        let program = parse_ok("const add = (a, b) => a + b; const twice = x => { return x * 2 }; const f = async () => 1");
        for stmt in &program.body {
            match &stmt.kind {
                StmtKind::Declare { init: Some(Expr::Function(decl)), .. } => assert!(decl.name.is_none()),
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn parenthesised_expression_is_not_an_arrow() {
        let program = parse_ok("let x = (1 + 2) * 3");
        assert!(matches!(
            &program.body[0].kind,
            StmtKind::Declare { init: Some(Expr::Binary { op: BinaryOp::Mul, .. }), .. }
        ));
    }

    #[test]
    fn await_outside_async_function_is_rejected() {
        assert_eq!(
            syntax_message("function ask() { return await prompt('x') }"),
            "await is only valid in async functions and the top level bodies of modules"
        );
        parse_ok("async function ask() { return await prompt('x') }");
        parse_ok("const name = await prompt('x')");
    }

    #[test]
    fn return_with_line_break_returns_nothing() {
        let program = parse_ok("function f() {\n  return\n  42\n}");
        let StmtKind::Function(decl) = &program.body[0].kind else { panic!("not a function") };
        let FunctionBody::Block(body) = &decl.body else { panic!("not a block") };
        assert!(matches!(body[0].kind, StmtKind::Return(None)));
    }

    #[test]
    fn parses_for_loops() {
        parse_ok("for (let i = 0; i < 3; i++) { console.log(i) }");
        parse_ok("for (const item of [1, 2, 3]) console.log(item)");
        parse_ok("for (;;) { break }");
    }

    #[test]
    fn parses_try_catch_finally() {
        parse_ok("try { throw new Error('x') } catch (e) { console.log(e.message) } finally { console.log('done') }");
        assert_eq!(syntax_message("try { }"), "Missing catch or finally after try");
    }

    #[test]
    fn reports_positions() {
        match parse("let x = ;") {
            Err(ScriptError::Syntax { message, line, column }) => {
                assert_eq!(message, "Unexpected token ';'");
                assert_eq!((line, column), (1, 9));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn rejects_invalid_assignment_targets() {
        assert_eq!(syntax_message("1 = 2"), "Invalid left-hand side in assignment");
    }

    #[test]
    fn deep_nesting_is_a_syntax_error() {
        let run = |src: String| {
            crate::engine::engine_thread().spawn(move || parse(&src).map(|_| ())).expect("spawn").join().expect("join")
        };
        let parens = format!("{}1{}", "(".repeat(3000), ")".repeat(3000));
        let blocks = format!("{}{}", "{".repeat(3000), "}".repeat(3000));
        let chain = format!("let x = 1{}", " + 1".repeat(5000));
        let negations = format!("let y = {}1", "!".repeat(5000));
        for src in [parens, blocks, chain, negations] {
            match run(src) {
                Err(ScriptError::Syntax { message, .. }) => assert_eq!(message, "Maximum nesting depth exceeded"),
                other => panic!("expected syntax error, got {other:?}"),
            }
        }

        let shallow = format!("let z = {}1{} + 1 + 1", "(".repeat(40), ")".repeat(40));
        parse_ok(&shallow);
        parse_ok("const v = [1, 2, 3].map(x => x * 2).filter(x => x > 2).join(',').length");
    }

    #[test]
    fn object_literals_support_shorthand() {
        let program = parse_ok("const o = { a: 1, 'b c': 2, d }");
        let StmtKind::Declare { init: Some(Expr::Object(props)), .. } = &program.body[0].kind else {
            panic!("not an object literal")
        };
        let keys: Vec<_> = props.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, ["a", "b c", "d"]);
    }
}
