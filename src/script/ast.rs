//! Syntax tree produced by the parser.

use std::rc::Rc;

#[derive(Debug, Clone, Default)]
pub struct Program {
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone)]
pub struct Stmt {
    pub kind: StmtKind,
    pub line: usize,
}

#[derive(Debug, Clone)]
pub enum StmtKind {
    Declare { name: String, init: Option<Expr>, mutable: bool },
    Expr(Expr),
    If { cond: Expr, then: Box<Stmt>, otherwise: Option<Box<Stmt>> },
    While { cond: Expr, body: Box<Stmt> },
    DoWhile { body: Box<Stmt>, cond: Expr },
    For { init: Option<Box<Stmt>>, cond: Option<Expr>, update: Option<Expr>, body: Box<Stmt> },
    ForOf { name: String, mutable: bool, iterable: Expr, body: Box<Stmt> },
    Block(Vec<Stmt>),
    Function(Rc<FunctionDecl>),
    Return(Option<Expr>),
    Break,
    Continue,
    Throw(Expr),
    Try { body: Vec<Stmt>, param: Option<String>, handler: Option<Vec<Stmt>>, finalizer: Option<Vec<Stmt>> },
    Empty,
}

#[derive(Debug)]
pub struct FunctionDecl {
    pub name: Option<String>,
    pub params: Vec<String>,
    pub body: FunctionBody,
    pub is_async: bool,
}

#[derive(Debug)]
pub enum FunctionBody {
    Block(Vec<Stmt>),
    Expr(Expr),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
    Plus,
    Typeof,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    NotEq,
    StrictEq,
    StrictNotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
    Nullish,
}

#[derive(Debug, Clone)]
pub enum Expr {
    Number(f64),
    Str(Rc<str>),
    Bool(bool),
    Null,
    Undefined,
    Ident(String),
    Array(Vec<Expr>),
    Object(Vec<(String, Expr)>),
    Function(Rc<FunctionDecl>),
    Unary { op: UnaryOp, expr: Box<Expr> },
    Binary { op: BinaryOp, left: Box<Expr>, right: Box<Expr> },
    Logical { op: LogicalOp, left: Box<Expr>, right: Box<Expr> },
    Conditional { cond: Box<Expr>, then: Box<Expr>, otherwise: Box<Expr> },
    Assign { target: Box<Expr>, op: Option<BinaryOp>, value: Box<Expr> },
    Update { target: Box<Expr>, delta: f64, prefix: bool },
    Member { object: Box<Expr>, property: String, optional: bool },
    Index { object: Box<Expr>, index: Box<Expr> },
    Call { callee: Box<Expr>, args: Vec<Expr> },
    New { callee: Box<Expr>, args: Vec<Expr> },
    Await(Box<Expr>),
}

impl Expr {
    /// Name used in diagnostics such as "x is not a function".
    pub fn describe(&self) -> String {
        match self {
            Expr::Ident(name) => name.clone(),
            Expr::Member { object, property, .. } => format!("{}.{}", object.describe(), property),
            Expr::Index { object, .. } => format!("{}[...]", object.describe()),
            Expr::Call { callee, .. } => format!("{}(...)", callee.describe()),
            _ => "expression".to_string(),
        }
    }
}
