use logos::Logos;
use std::fmt;

use crate::Span;

/// Token grammar: parentheses plus whitespace-delimited atoms. There is no
/// string, quote-sugar, or comment syntax — an atom is an integer if it
/// parses as one, else a float, else a symbol.
///
/// Longest-match lexing reproduces plain whitespace splitting: `1.2.3` is a
/// single symbol token, not a float followed by `.3`.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\n\r]+")]
pub enum TokenKind {
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[regex(r"[+-]?[0-9]+", |lex| lex.slice().parse::<i64>().ok(), priority = 5)]
    Integer(i64),
    #[regex(
        r"[+-]?(?:[0-9]+\.[0-9]*|\.[0-9]+)(?:[eE][+-]?[0-9]+)?|[+-]?[0-9]+[eE][+-]?[0-9]+",
        |lex| lex.slice().parse::<f64>().ok(),
        priority = 4
    )]
    Float(f64),
    #[regex(r"[^\s()]+", |lex| lex.slice().to_string(), priority = 3)]
    Symbol(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::LParen => write!(f, "("),
            TokenKind::RParen => write!(f, ")"),
            TokenKind::Integer(n) => write!(f, "{}", n),
            TokenKind::Float(n) => write!(f, "{:?}", n),
            TokenKind::Symbol(s) => write!(f, "{}", s),
        }
    }
}

/// Tokenizes a whole input string. Total: every non-whitespace run becomes
/// some token. A slice the table rejects (e.g. an integer literal overflowing
/// i64) falls back to the atom rules by hand: float first, then symbol.
pub fn tokenize(input: &str) -> Vec<Token> {
    let mut lexer = TokenKind::lexer(input);
    let mut tokens = Vec::new();
    while let Some(result) = lexer.next() {
        let range = lexer.span();
        let kind = match result {
            Ok(kind) => kind,
            Err(()) => {
                let slice = lexer.slice();
                match slice.parse::<f64>() {
                    Ok(n) => TokenKind::Float(n),
                    Err(_) => TokenKind::Symbol(slice.to_string()),
                }
            }
        };
        tokens.push(Token {
            kind,
            span: Span::new(range.start, range.end),
        });
    }
    tokens
}
