use crate::error::ExpressionError;

/// A lexical token produced by [`tokenize`].
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Numeric literal.
    Number(f64),
    /// Quoted string literal.
    Str(String),
    /// Identifier or keyword.
    Ident(String),
    /// `true`
    True,
    /// `false`
    False,
    /// `null`
    Null,
    /// `+`
    Plus,
    /// `-`
    Minus,
    /// `*`
    Star,
    /// `/`
    Slash,
    /// `%`
    Percent,
    /// `!`
    Bang,
    /// `!=`
    BangEq,
    /// `==`
    EqEq,
    /// `<`
    Lt,
    /// `<=`
    LtEq,
    /// `>`
    Gt,
    /// `>=`
    GtEq,
    /// `&&`
    AmpAmp,
    /// `||`
    PipePipe,
    /// `?`
    Question,
    /// `:`
    Colon,
    /// `.`
    Dot,
    /// `(`
    LParen,
    /// `)`
    RParen,
    /// `[`
    LBracket,
    /// `]`
    RBracket,
    /// `,`
    Comma,
    /// End of input.
    Eof,
}

/// Tokenizes an expression into a flat token stream terminated by [`Token::Eof`].
pub fn tokenize(source: &str) -> Result<Vec<Token>, ExpressionError> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut index = 0usize;

    while index < chars.len() {
        let ch = chars[index];

        if ch.is_whitespace() {
            index += 1;
            continue;
        }

        if ch.is_ascii_digit() {
            let start = index;
            while index < chars.len() && (chars[index].is_ascii_digit() || chars[index] == '.') {
                index += 1;
            }
            let text: String = chars[start..index].iter().collect();
            let value = text
                .parse::<f64>()
                .map_err(|_| ExpressionError::CompileError(format!("invalid number literal: {text}")))?;
            tokens.push(Token::Number(value));
            continue;
        }

        if ch == '"' || ch == '\'' {
            let quote = ch;
            index += 1;
            let start = index;
            while index < chars.len() && chars[index] != quote {
                index += 1;
            }
            if index >= chars.len() {
                return Err(ExpressionError::CompileError(
                    "unterminated string literal".to_owned(),
                ));
            }
            let text: String = chars[start..index].iter().collect();
            index += 1;
            tokens.push(Token::Str(text));
            continue;
        }

        if ch.is_alphabetic() || ch == '_' {
            let start = index;
            while index < chars.len() && (chars[index].is_alphanumeric() || chars[index] == '_') {
                index += 1;
            }
            let text: String = chars[start..index].iter().collect();
            tokens.push(match text.as_str() {
                "true" => Token::True,
                "false" => Token::False,
                "null" => Token::Null,
                _ => Token::Ident(text),
            });
            continue;
        }

        macro_rules! two_char {
            ($second:expr, $with:expr, $without:expr) => {{
                if chars.get(index + 1) == Some(&$second) {
                    index += 2;
                    $with
                } else {
                    index += 1;
                    $without
                }
            }};
        }

        let token = match ch {
            '+' => {
                index += 1;
                Token::Plus
            }
            '-' => {
                index += 1;
                Token::Minus
            }
            '*' => {
                index += 1;
                Token::Star
            }
            '/' => {
                index += 1;
                Token::Slash
            }
            '%' => {
                index += 1;
                Token::Percent
            }
            '.' => {
                index += 1;
                Token::Dot
            }
            '(' => {
                index += 1;
                Token::LParen
            }
            ')' => {
                index += 1;
                Token::RParen
            }
            '[' => {
                index += 1;
                Token::LBracket
            }
            ']' => {
                index += 1;
                Token::RBracket
            }
            ',' => {
                index += 1;
                Token::Comma
            }
            '?' => {
                index += 1;
                Token::Question
            }
            ':' => {
                index += 1;
                Token::Colon
            }
            '!' => two_char!('=', Token::BangEq, Token::Bang),
            '=' => two_char!('=', Token::EqEq, {
                return Err(ExpressionError::CompileError(
                    "unexpected '=', did you mean '=='?".to_owned(),
                ));
            }),
            '<' => two_char!('=', Token::LtEq, Token::Lt),
            '>' => two_char!('=', Token::GtEq, Token::Gt),
            '&' => two_char!('&', Token::AmpAmp, {
                return Err(ExpressionError::CompileError(
                    "unexpected '&', did you mean '&&'?".to_owned(),
                ));
            }),
            '|' => two_char!('|', Token::PipePipe, {
                return Err(ExpressionError::CompileError(
                    "unexpected '|', did you mean '||'?".to_owned(),
                ));
            }),
            other => {
                return Err(ExpressionError::CompileError(format!(
                    "unexpected character: {other}"
                )));
            }
        };

        tokens.push(token);
    }

    tokens.push(Token::Eof);
    Ok(tokens)
}
