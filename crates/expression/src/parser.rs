use crate::ast::{BinaryOp, Expr, UnaryOp};
use crate::error::ExpressionError;
use crate::lexer::Token;

/// Recursive-descent parser over a token stream produced by [`crate::lexer::tokenize`].
pub struct Parser<'a> {
    tokens: &'a [Token],
    position: usize,
}

impl<'a> Parser<'a> {
    /// Creates a parser over a token stream.
    #[must_use]
    pub fn new(tokens: &'a [Token]) -> Self {
        Self { tokens, position: 0 }
    }

    /// Parses the full token stream into an [`Expr`], rejecting trailing input.
    pub fn parse(mut self) -> Result<Expr, ExpressionError> {
        let expr = self.ternary()?;
        if !matches!(self.peek(), Token::Eof) {
            return Err(ExpressionError::CompileError(format!(
                "unexpected trailing token: {:?}",
                self.peek()
            )));
        }
        Ok(expr)
    }

    fn peek(&self) -> &Token {
        self.tokens.get(self.position).unwrap_or(&Token::Eof)
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.position < self.tokens.len() {
            self.position += 1;
        }
        token
    }

    fn expect(&mut self, expected: &Token) -> Result<(), ExpressionError> {
        if self.peek() == expected {
            self.advance();
            Ok(())
        } else {
            Err(ExpressionError::CompileError(format!(
                "expected {expected:?}, found {:?}",
                self.peek()
            )))
        }
    }

    fn ternary(&mut self) -> Result<Expr, ExpressionError> {
        let condition = self.or_expr()?;
        if matches!(self.peek(), Token::Question) {
            self.advance();
            let when_true = self.ternary()?;
            self.expect(&Token::Colon)?;
            let when_false = self.ternary()?;
            return Ok(Expr::Ternary(
                Box::new(condition),
                Box::new(when_true),
                Box::new(when_false),
            ));
        }
        Ok(condition)
    }

    fn or_expr(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.and_expr()?;
        while matches!(self.peek(), Token::PipePipe) {
            self.advance();
            let right = self.and_expr()?;
            left = Expr::Binary(BinaryOp::Or, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.equality()?;
        while matches!(self.peek(), Token::AmpAmp) {
            self.advance();
            let right = self.equality()?;
            left = Expr::Binary(BinaryOp::And, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn equality(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.comparison()?;
        loop {
            let op = match self.peek() {
                Token::EqEq => BinaryOp::Eq,
                Token::BangEq => BinaryOp::NotEq,
                _ => break,
            };
            self.advance();
            let right = self.comparison()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn comparison(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.additive()?;
        loop {
            let op = match self.peek() {
                Token::Lt => BinaryOp::Lt,
                Token::LtEq => BinaryOp::LtEq,
                Token::Gt => BinaryOp::Gt,
                Token::GtEq => BinaryOp::GtEq,
                _ => break,
            };
            self.advance();
            let right = self.additive()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn additive(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.multiplicative()?;
        loop {
            let op = match self.peek() {
                Token::Plus => BinaryOp::Add,
                Token::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.multiplicative()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn multiplicative(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.unary()?;
        loop {
            let op = match self.peek() {
                Token::Star => BinaryOp::Mul,
                Token::Slash => BinaryOp::Div,
                Token::Percent => BinaryOp::Rem,
                _ => break,
            };
            self.advance();
            let right = self.unary()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr, ExpressionError> {
        match self.peek() {
            Token::Minus => {
                self.advance();
                Ok(Expr::Unary(UnaryOp::Neg, Box::new(self.unary()?)))
            }
            Token::Bang => {
                self.advance();
                Ok(Expr::Unary(UnaryOp::Not, Box::new(self.unary()?)))
            }
            _ => self.postfix(),
        }
    }

    fn postfix(&mut self) -> Result<Expr, ExpressionError> {
        let mut expr = self.primary()?;
        loop {
            match self.peek() {
                Token::Dot => {
                    self.advance();
                    let Token::Ident(field) = self.advance() else {
                        return Err(ExpressionError::CompileError(
                            "expected field name after '.'".to_owned(),
                        ));
                    };
                    expr = Expr::Member(Box::new(expr), field);
                }
                Token::LBracket => {
                    self.advance();
                    let index = self.ternary()?;
                    self.expect(&Token::RBracket)?;
                    expr = Expr::Index(Box::new(expr), Box::new(index));
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn primary(&mut self) -> Result<Expr, ExpressionError> {
        match self.advance() {
            Token::Number(value) => Ok(Expr::Number(value)),
            Token::Str(value) => Ok(Expr::Str(value)),
            Token::True => Ok(Expr::Bool(true)),
            Token::False => Ok(Expr::Bool(false)),
            Token::Null => Ok(Expr::Null),
            Token::Ident(name) => {
                if matches!(self.peek(), Token::LParen) {
                    self.advance();
                    let args = self.call_args()?;
                    Ok(Expr::Call(name, args))
                } else {
                    Ok(Expr::Ident(name))
                }
            }
            Token::LParen => {
                let expr = self.ternary()?;
                self.expect(&Token::RParen)?;
                Ok(expr)
            }
            other => Err(ExpressionError::CompileError(format!(
                "unexpected token: {other:?}"
            ))),
        }
    }

    fn call_args(&mut self) -> Result<Vec<Expr>, ExpressionError> {
        let mut args = Vec::new();
        if matches!(self.peek(), Token::RParen) {
            self.advance();
            return Ok(args);
        }

        loop {
            args.push(self.ternary()?);
            match self.peek() {
                Token::Comma => {
                    self.advance();
                }
                Token::RParen => {
                    self.advance();
                    break;
                }
                other => {
                    return Err(ExpressionError::CompileError(format!(
                        "expected ',' or ')' in argument list, found {other:?}"
                    )));
                }
            }
        }
        Ok(args)
    }
}
