//! Tokenizer for the console's script language.

use crate::engine::ScriptError;

#[derive(Debug, Clone, PartialEq)]
pub enum Tok {
    Number(f64),
    Str(String),
    Ident(String),
    Punct(&'static str),
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub tok: Tok,
    pub line: usize,
    pub column: usize,
}

// Longest first so that `===` wins over `==` and `=`.
const PUNCTUATORS: &[&str] = &[
    "===", "!==", "...", "==", "!=", "<=", ">=", "&&", "||", "??", "=>", "+=", "-=", "*=", "/=",
    "%=", "++", "--", "?.", "(", ")", "{", "}", "[", "]", ";", ",", ".", ":", "?", "+", "-", "*",
    "/", "%", "<", ">", "=", "!",
];

pub fn tokenize(source: &str) -> Result<Vec<Token>, ScriptError> {
    Lexer::new(source).run()
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
}

impl Lexer {
    fn new(source: &str) -> Self {
        Self { chars: source.chars().collect(), pos: 0, line: 1, column: 1 }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.get(self.pos).copied()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn error(&self, message: impl Into<String>, line: usize, column: usize) -> ScriptError {
        ScriptError::Syntax { message: message.into(), line, column }
    }

    fn run(mut self) -> Result<Vec<Token>, ScriptError> {
        let mut tokens = Vec::new();
        loop {
            self.skip_trivia()?;
            let (line, column) = (self.line, self.column);
            let Some(c) = self.peek() else {
                tokens.push(Token { tok: Tok::Eof, line, column });
                return Ok(tokens);
            };

            let tok = if c.is_ascii_digit() || (c == '.' && self.peek_at(1).is_some_and(|d| d.is_ascii_digit())) {
                self.number(line, column)?
            } else if c == '"' || c == '\'' {
                self.string(c, line, column)?
            } else if c == '_' || c == '$' || c.is_alphabetic() {
                self.ident()
            } else {
                self.punct(line, column)?
            };
            tokens.push(Token { tok, line, column });
        }
    }

    fn skip_trivia(&mut self) -> Result<(), ScriptError> {
        loop {
            match (self.peek(), self.peek_at(1)) {
                (Some(c), _) if c.is_whitespace() => {
                    self.bump();
                }
                (Some('/'), Some('/')) => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                (Some('/'), Some('*')) => {
                    let (line, column) = (self.line, self.column);
                    self.bump();
                    self.bump();
                    loop {
                        match self.bump() {
                            Some('*') if self.peek() == Some('/') => {
                                self.bump();
                                break;
                            }
                            Some(_) => {}
                            None => return Err(self.error("Unterminated comment", line, column)),
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn number(&mut self, line: usize, column: usize) -> Result<Tok, ScriptError> {
        if self.peek() == Some('0') && matches!(self.peek_at(1), Some('x') | Some('X')) {
            self.bump();
            self.bump();
            let mut digits = String::new();
            while let Some(c) = self.peek().filter(|c| c.is_ascii_hexdigit()) {
                digits.push(c);
                self.bump();
            }
            return u64::from_str_radix(&digits, 16)
                .map(|n| Tok::Number(n as f64))
                .map_err(|_| self.error("Invalid hexadecimal literal", line, column));
        }

        let mut text = String::new();
        while let Some(c) = self.peek().filter(|c| c.is_ascii_digit() || *c == '_') {
            if c != '_' {
                text.push(c);
            }
            self.bump();
        }
        if self.peek() == Some('.') && self.peek_at(1).map_or(true, |c| c.is_ascii_digit()) {
            text.push('.');
            self.bump();
            while let Some(c) = self.peek().filter(|c| c.is_ascii_digit()) {
                text.push(c);
                self.bump();
            }
        }
        if matches!(self.peek(), Some('e') | Some('E')) {
            let sign = self.peek_at(1);
            let exponent_follows = match sign {
                Some('+') | Some('-') => self.peek_at(2).is_some_and(|c| c.is_ascii_digit()),
                Some(c) => c.is_ascii_digit(),
                None => false,
            };
            if exponent_follows {
                text.push('e');
                self.bump();
                if let Some(s @ ('+' | '-')) = self.peek() {
                    text.push(s);
                    self.bump();
                }
                while let Some(c) = self.peek().filter(|c| c.is_ascii_digit()) {
                    text.push(c);
                    self.bump();
                }
            }
        }
        if self.peek().is_some_and(|c| c.is_alphabetic() || c == '_') {
            return Err(self.error("Invalid or unexpected token", self.line, self.column));
        }
        text.parse::<f64>()
            .map(Tok::Number)
            .map_err(|_| self.error(format!("Invalid number literal '{text}'"), line, column))
    }

    fn string(&mut self, quote: char, line: usize, column: usize) -> Result<Tok, ScriptError> {
        self.bump();
        let mut out = String::new();
        loop {
            match self.bump() {
                None | Some('\n') => return Err(self.error("Invalid or unexpected token: unterminated string", line, column)),
                Some(c) if c == quote => return Ok(Tok::Str(out)),
                Some('\\') => {
                    let escaped = self
                        .bump()
                        .ok_or_else(|| self.error("Invalid or unexpected token: unterminated string", line, column))?;
                    match escaped {
                        'n' => out.push('\n'),
                        't' => out.push('\t'),
                        'r' => out.push('\r'),
                        '0' => out.push('\0'),
                        'u' => {
                            let mut hex = String::new();
                            for _ in 0..4 {
                                match self.bump() {
                                    Some(h) if h.is_ascii_hexdigit() => hex.push(h),
                                    _ => return Err(self.error("Invalid Unicode escape sequence", self.line, self.column)),
                                }
                            }
                            let code = u32::from_str_radix(&hex, 16).unwrap_or(0xFFFD);
                            out.push(char::from_u32(code).unwrap_or('\u{FFFD}'));
                        }
                        '\n' => {}
                        other => out.push(other),
                    }
                }
                Some(c) => out.push(c),
            }
        }
    }

    fn ident(&mut self) -> Tok {
        let mut name = String::new();
        while let Some(c) = self.peek().filter(|c| *c == '_' || *c == '$' || c.is_alphanumeric()) {
            name.push(c);
            self.bump();
        }
        Tok::Ident(name)
    }

    fn punct(&mut self, line: usize, column: usize) -> Result<Tok, ScriptError> {
        for p in PUNCTUATORS {
            let matches = p.chars().enumerate().all(|(i, pc)| self.peek_at(i) == Some(pc));
            if matches {
                // `?.5` is a conditional followed by a number, not optional chaining.
                if *p == "?." && self.peek_at(2).is_some_and(|c| c.is_ascii_digit()) {
                    continue;
                }
                for _ in 0..p.chars().count() {
                    self.bump();
                }
                return Ok(Tok::Punct(p));
            }
        }
        let c = self.peek().unwrap_or(' ');
        Err(self.error(format!("Invalid or unexpected token '{c}'"), line, column))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(src: &str) -> Vec<Tok> {
        tokenize(src).unwrap().into_iter().map(|t| t.tok).collect()
    }

    #[test]
    fn lexes_operators_longest_first() {
        assert_eq!(
            toks("a === b !== c => d"),
            vec![
                Tok::Ident("a".into()),
                Tok::Punct("==="),
                Tok::Ident("b".into()),
                Tok::Punct("!=="),
                Tok::Ident("c".into()),
                Tok::Punct("=>"),
                Tok::Ident("d".into()),
                Tok::Eof,
            ]
        );
    }

    #[test]
    fn lexes_numbers_and_strings() {
        assert_eq!(
            toks(r#"1.5 0x1F 2e3 'it\'s' "a\nb""#),
            vec![
                Tok::Number(1.5),
                Tok::Number(31.0),
                Tok::Number(2000.0),
                Tok::Str("it's".into()),
                Tok::Str("a\nb".into()),
                Tok::Eof,
            ]
        );
    }

    #[test]
    fn skips_comments_and_tracks_lines() {
        let tokens = tokenize("// hello\n/* multi\nline */ x").unwrap();
        assert_eq!(tokens[0].tok, Tok::Ident("x".into()));
        assert_eq!(tokens[0].line, 3);
        assert_eq!(tokens[0].column, 9);
    }

    #[test]
    fn unterminated_string_is_a_syntax_error() {
        let err = tokenize("let s = 'oops").unwrap_err();
        assert!(matches!(err, ScriptError::Syntax { line: 1, column: 9, .. }));
    }

    #[test]
    fn member_access_on_number_is_not_a_fraction() {
        assert_eq!(
            toks("x?.y"),
            vec![Tok::Ident("x".into()), Tok::Punct("?."), Tok::Ident("y".into()), Tok::Eof]
        );
    }
}
