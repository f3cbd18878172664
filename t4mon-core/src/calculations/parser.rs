//! Recursive-descent parser for calculation expressions

use std::iter::Peekable;
use std::str::CharIndices;

/// Arithmetic operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
}

impl BinaryOp {
    /// Applies the operator; non-finite results are missing
    #[must_use]
    pub fn apply(self, a: f64, b: f64) -> Option<f64> {
        let value = match self {
            Self::Add => a + b,
            Self::Sub => a - b,
            Self::Mul => a * b,
            Self::Div if b == 0.0 => return None,
            Self::Div => a / b,
        };
        value.is_finite().then_some(value)
    }
}

/// Expression tree
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Numeric literal
    Number(f64),
    /// Column reference
    Column(String),
    /// Unary minus
    Neg(Box<Expr>),
    /// Binary operation
    Binary {
        /// Operator
        op: BinaryOp,
        /// Left operand
        lhs: Box<Expr>,
        /// Right operand
        rhs: Box<Expr>,
    },
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Op(BinaryOp),
    Open,
    Close,
    Operand(String),
}

fn tokenize(input: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut chars: Peekable<CharIndices<'_>> = input.char_indices().peekable();
    while let Some((start, c)) = chars.next() {
        let token = match c {
            '+' => Token::Op(BinaryOp::Add),
            '-' => Token::Op(BinaryOp::Sub),
            '*' => Token::Op(BinaryOp::Mul),
            '/' => Token::Op(BinaryOp::Div),
            '(' => Token::Open,
            ')' => Token::Close,
            c if c.is_whitespace() => continue,
            _ => {
                // Operands run up to the next operator or parenthesis, so
                // column names may contain spaces
                let mut end = start + c.len_utf8();
                while let Some(&(i, next)) = chars.peek() {
                    if "+-*/()".contains(next) {
                        break;
                    }
                    end = i + next.len_utf8();
                    chars.next();
                }
                Token::Operand(input[start..end].trim().to_string())
            }
        };
        tokens.push(token);
    }
    tokens
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expr(&mut self) -> Result<Expr, String> {
        let mut lhs = self.term()?;
        while let Some(Token::Op(op @ (BinaryOp::Add | BinaryOp::Sub))) = self.peek() {
            let op = *op;
            self.pos += 1;
            let rhs = self.term()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn term(&mut self) -> Result<Expr, String> {
        let mut lhs = self.factor()?;
        while let Some(Token::Op(op @ (BinaryOp::Mul | BinaryOp::Div))) = self.peek() {
            let op = *op;
            self.pos += 1;
            let rhs = self.factor()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn factor(&mut self) -> Result<Expr, String> {
        match self.next() {
            Some(Token::Op(BinaryOp::Sub)) => Ok(Expr::Neg(Box::new(self.factor()?))),
            Some(Token::Open) => {
                let inner = self.expr()?;
                match self.next() {
                    Some(Token::Close) => Ok(inner),
                    _ => Err("unbalanced parenthesis".to_string()),
                }
            }
            Some(Token::Operand(text)) => Ok(text
                .parse::<f64>()
                .map_or_else(|_| Expr::Column(text), Expr::Number)),
            Some(Token::Close) => Err("unexpected ')'".to_string()),
            Some(Token::Op(_)) => Err("operator without left operand".to_string()),
            None => Err("expression ends too early".to_string()),
        }
    }
}

/// Parses the right-hand side of a definition
///
/// # Errors
///
/// Returns a readable reason for malformed input.
pub fn parse_expression(input: &str) -> Result<Expr, String> {
    let tokens = tokenize(input);
    if tokens.is_empty() {
        return Err("empty expression".to_string());
    }
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.expr()?;
    match parser.peek() {
        None => Ok(expr),
        Some(Token::Close) => Err("unbalanced parenthesis".to_string()),
        Some(other) => Err(format!("unexpected {other:?}")),
    }
}
