//! Tokenizer and precedence-climbing parser.
//!
//! Grammar, loosest first:
//!
//! ```text
//! equation := sum ('=' sum)?
//! sum      := product (('+' | '-') product)*
//! product  := unary (('*' | '/') unary | implicit unary)*
//! unary    := ('-' | '+') unary | power
//! power    := postfix ('^' unary)?
//! postfix  := primary '!'*
//! primary  := number | ident | ident '(' args ')' | '(' sum ')' | matrix
//! ```
//!
//! Implicit multiplication applies when a factor is directly followed by
//! an identifier or an opening parenthesis (`2x`, `3(x + 1)`).

use std::fmt;

use super::ast::Expr;

#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
    pub position: usize,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "syntax error at {}: {}", self.position, self.message)
    }
}

type ParseResult<T> = Result<T, ParseError>;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(f64),
    Ident(String),
    Op(char),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Num(n) => write!(f, "number {n}"),
            Self::Ident(s) => write!(f, "'{s}'"),
            Self::Op(c) => write!(f, "'{c}'"),
        }
    }
}

fn tokenize(src: &str) -> ParseResult<Vec<(Token, usize)>> {
    let chars: Vec<char> = src.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }

        if c.is_ascii_digit() || (c == '.' && chars.get(i + 1).is_some_and(char::is_ascii_digit)) {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            // exponent only when digits follow, so `2e` stays 2 * e
            if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                let mut j = i + 1;
                if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
                    j += 1;
                }
                if j < chars.len() && chars[j].is_ascii_digit() {
                    i = j;
                    while i < chars.len() && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                }
            }
            let text: String = chars[start..i].iter().collect();
            let value = text.parse::<f64>().map_err(|_| ParseError {
                message: format!("invalid number '{text}'"),
                position: start,
            })?;
            tokens.push((Token::Num(value), start));
            continue;
        }

        if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            tokens.push((Token::Ident(chars[start..i].iter().collect()), start));
            continue;
        }

        match c {
            '*' if chars.get(i + 1) == Some(&'*') => {
                tokens.push((Token::Op('^'), i));
                i += 2;
            }
            '=' if chars.get(i + 1) == Some(&'=') => {
                tokens.push((Token::Op('='), i));
                i += 2;
            }
            '+' | '-' | '*' | '/' | '^' | '!' | '(' | ')' | '[' | ']' | ',' | ';' | '=' => {
                tokens.push((Token::Op(c), i));
                i += 1;
            }
            other => {
                return Err(ParseError {
                    message: format!("unexpected character '{other}'"),
                    position: i,
                })
            }
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
    end: usize,
}

impl Parser {
    fn new(src: &str) -> ParseResult<Self> {
        Ok(Self {
            tokens: tokenize(src)?,
            pos: 0,
            end: src.chars().count(),
        })
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn position(&self) -> usize {
        self.tokens.get(self.pos).map(|(_, p)| *p).unwrap_or(self.end)
    }

    fn error<T>(&self, message: impl Into<String>) -> ParseResult<T> {
        Err(ParseError {
            message: message.into(),
            position: self.position(),
        })
    }

    fn eat(&mut self, op: char) -> bool {
        if self.peek() == Some(&Token::Op(op)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, op: char) -> ParseResult<()> {
        if self.eat(op) {
            return Ok(());
        }
        match self.peek() {
            Some(t) => self.error(format!("expected '{op}', found {t}")),
            None => self.error(format!("expected '{op}', found end of input")),
        }
    }

    fn finish(&self) -> ParseResult<()> {
        match self.peek() {
            None => Ok(()),
            Some(t) => self.error(format!("unexpected {t}")),
        }
    }

    fn sum(&mut self) -> ParseResult<Expr> {
        let mut lhs = self.product()?;
        loop {
            if self.eat('+') {
                lhs = Expr::add(lhs, self.product()?);
            } else if self.eat('-') {
                lhs = Expr::sub(lhs, self.product()?);
            } else {
                return Ok(lhs);
            }
        }
    }

    fn product(&mut self) -> ParseResult<Expr> {
        let mut lhs = self.unary()?;
        loop {
            if self.eat('*') {
                lhs = Expr::mul(lhs, self.unary()?);
            } else if self.eat('/') {
                lhs = Expr::div(lhs, self.unary()?);
            } else if matches!(self.peek(), Some(Token::Ident(_)) | Some(Token::Op('('))) {
                lhs = Expr::mul(lhs, self.unary()?);
            } else {
                return Ok(lhs);
            }
        }
    }

    fn unary(&mut self) -> ParseResult<Expr> {
        if self.eat('-') {
            return Ok(Expr::neg(self.unary()?));
        }
        if self.eat('+') {
            return self.unary();
        }
        self.power()
    }

    fn power(&mut self) -> ParseResult<Expr> {
        let base = self.postfix()?;
        if self.eat('^') {
            return Ok(Expr::pow(base, self.unary()?));
        }
        Ok(base)
    }

    fn postfix(&mut self) -> ParseResult<Expr> {
        let mut e = self.primary()?;
        while self.eat('!') {
            e = Expr::Factorial(Box::new(e));
        }
        Ok(e)
    }

    fn primary(&mut self) -> ParseResult<Expr> {
        match self.peek().cloned() {
            Some(Token::Num(n)) => {
                self.pos += 1;
                Ok(Expr::Num(n))
            }
            Some(Token::Ident(name)) => {
                self.pos += 1;
                if self.eat('(') {
                    let mut args = Vec::new();
                    if !self.eat(')') {
                        loop {
                            args.push(self.sum()?);
                            if self.eat(')') {
                                break;
                            }
                            self.expect(',')?;
                        }
                    }
                    Ok(Expr::Call(name, args))
                } else {
                    Ok(Expr::Var(name))
                }
            }
            Some(Token::Op('(')) => {
                self.pos += 1;
                let inner = self.sum()?;
                self.expect(')')?;
                Ok(inner)
            }
            Some(Token::Op('[')) => self.matrix(),
            Some(t) => self.error(format!("unexpected {t}")),
            None => self.error("unexpected end of input"),
        }
    }

    /// `[[1, 2], [3, 4]]`, `[1, 2; 3, 4]` or a single row `[1, 2, 3]`.
    fn matrix(&mut self) -> ParseResult<Expr> {
        self.expect('[')?;
        let mut rows = Vec::new();

        if self.peek() == Some(&Token::Op('[')) {
            loop {
                self.expect('[')?;
                rows.push(self.row(']')?);
                if self.eat(']') {
                    break;
                }
                self.expect(',')?;
            }
        } else {
            loop {
                let row = self.row_until_separator()?;
                rows.push(row);
                if self.eat(']') {
                    break;
                }
                self.expect(';')?;
            }
        }

        let width = rows[0].len();
        if rows.iter().any(|r| r.len() != width) {
            return self.error("matrix rows must have the same length");
        }
        Ok(Expr::Matrix(rows))
    }

    fn row(&mut self, close: char) -> ParseResult<Vec<Expr>> {
        let mut row = vec![self.sum()?];
        while self.eat(',') {
            row.push(self.sum()?);
        }
        self.expect(close)?;
        Ok(row)
    }

    fn row_until_separator(&mut self) -> ParseResult<Vec<Expr>> {
        let mut row = vec![self.sum()?];
        while self.eat(',') {
            row.push(self.sum()?);
        }
        Ok(row)
    }
}

pub fn parse(src: &str) -> ParseResult<Expr> {
    let mut p = Parser::new(src)?;
    let e = p.sum()?;
    p.finish()?;
    Ok(e)
}

/// Parse `lhs = rhs`. Without an `=` the right-hand side is zero.
pub fn parse_equation(src: &str) -> ParseResult<(Expr, Expr)> {
    let mut p = Parser::new(src)?;
    let lhs = p.sum()?;
    let rhs = if p.eat('=') { p.sum()? } else { Expr::Num(0.0) };
    p.finish()?;
    Ok((lhs, rhs))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn show(src: &str) -> String {
        parse(src).unwrap().to_string()
    }

    #[test]
    fn test_precedence() {
        assert_eq!(show("1+2*3"), "1 + 2 * 3");
        assert_eq!(show("(1+2)*3"), "(1 + 2) * 3");
        assert_eq!(show("2^3^2"), "2^3^2");
        assert_eq!(parse("-x^2").unwrap(), Expr::neg(Expr::pow(Expr::var("x"), Expr::Num(2.0))));
    }

    #[test]
    fn test_implicit_multiplication() {
        assert_eq!(show("2x"), "2 * x");
        assert_eq!(show("3(x+1)"), "3 * (x + 1)");
        assert_eq!(show("2sin(x)"), "2 * sin(x)");
    }

    #[test]
    fn test_scientific_notation() {
        assert_eq!(parse("1.5e3").unwrap(), Expr::Num(1500.0));
        assert_eq!(parse("2e").unwrap(), Expr::mul(Expr::Num(2.0), Expr::var("e")));
    }

    #[test]
    fn test_calls_and_matrices() {
        assert_eq!(show("log(x, 2)"), "log(x, 2)");
        assert_eq!(show("det([[1,2],[3,4]])"), "det([[1, 2], [3, 4]])");
        assert_eq!(show("[1, 2; 3, 4]"), "[[1, 2], [3, 4]]");
        assert_eq!(show("5!"), "5!");
    }

    #[test]
    fn test_equation() {
        let (l, r) = parse_equation("x^2 = 4").unwrap();
        assert_eq!(l.to_string(), "x^2");
        assert_eq!(r, Expr::Num(4.0));
        let (_, r) = parse_equation("x - 1").unwrap();
        assert_eq!(r, Expr::Num(0.0));
    }

    #[test]
    fn test_errors() {
        assert!(parse("1 +").is_err());
        assert!(parse("(1 + 2").is_err());
        assert!(parse("2 $ 3").is_err());
        assert!(parse("[[1,2],[3]]").is_err());
        assert!(parse("1 = 2").is_err());
        let err = parse("1 + * 2").unwrap_err();
        assert_eq!(err.position, 4);
    }
}
