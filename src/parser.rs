use crate::Span;
use crate::lexer::{Token, TokenKind, tokenize};
use crate::types::{Node, Sexpr};
use std::iter::Peekable;
use std::vec::IntoIter;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("Unexpected end of input, expected {0}")]
    UnexpectedEof(String),
    #[error("Unexpected ')'")]
    UnexpectedClose(Span),
    #[error("Unexpected token after expression: '{}'", .0.kind)]
    TrailingToken(Token),
}

type ParseResult<T> = Result<T, ParseError>;

pub struct Parser {
    tokens: Peekable<IntoIter<Token>>,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Parser {
            tokens: tokens.into_iter().peekable(),
        }
    }

    fn next_token(&mut self) -> Option<Token> {
        self.tokens.next()
    }

    /// Reads a single expression from the front of the token stream,
    /// consuming the tokens it covers.
    pub fn parse_expr(&mut self) -> ParseResult<Node> {
        match self.next_token() {
            Some(Token {
                kind: TokenKind::LParen,
                span,
            }) => self.parse_list(span),
            Some(Token {
                kind: TokenKind::RParen,
                span,
            }) => Err(ParseError::UnexpectedClose(span)),
            Some(token) => Ok(Self::parse_atom(token)),
            None => Err(ParseError::UnexpectedEof("an expression".to_string())),
        }
    }

    /// Reads sub-expressions until the matching `)`. `lparen_span` is the
    /// opener's span; the list node covers opener through closer.
    fn parse_list(&mut self, lparen_span: Span) -> ParseResult<Node> {
        let mut elements = Vec::new();
        loop {
            match self.tokens.peek() {
                Some(Token {
                    kind: TokenKind::RParen,
                    span: rparen_span,
                }) => {
                    let span = lparen_span.merge(*rparen_span);
                    self.next_token();
                    return Ok(Node::new_list(elements, span));
                }
                Some(_) => elements.push(self.parse_expr()?),
                None => return Err(ParseError::UnexpectedEof("')'".to_string())),
            }
        }
    }

    fn parse_atom(token: Token) -> Node {
        let kind = match token.kind {
            TokenKind::Symbol(s) => Sexpr::Symbol(s),
            TokenKind::Integer(n) => Sexpr::Integer(n),
            TokenKind::Float(n) => Sexpr::Float(n),
            // Parens are consumed by parse_expr before reaching here
            TokenKind::LParen | TokenKind::RParen => unreachable!("parens handled in parse_expr"),
        };
        Node::new(kind, token.span)
    }

    /// Parses exactly one top-level expression; leftover tokens are an
    /// error at this entry point.
    pub fn parse(mut self) -> ParseResult<Node> {
        let expr = self.parse_expr()?;
        if let Some(found) = self.next_token() {
            Err(ParseError::TrailingToken(found))
        } else {
            Ok(expr)
        }
    }

    /// Parses the whole token stream as a sequence of top-level
    /// expressions (a program or a multi-expression REPL line).
    pub fn parse_program(mut self) -> ParseResult<Vec<Node>> {
        let mut expressions = Vec::new();
        while self.tokens.peek().is_some() {
            expressions.push(self.parse_expr()?);
        }
        if expressions.is_empty() {
            return Err(ParseError::UnexpectedEof("an expression".to_string()));
        }
        Ok(expressions)
    }
}

/// Lexes and parses a single expression from a string.
pub fn parse_str(input: &str) -> ParseResult<Node> {
    Parser::new(tokenize(input)).parse()
}

/// Lexes and parses a sequence of top-level expressions from a string.
pub fn parse_program_str(input: &str) -> ParseResult<Vec<Node>> {
    Parser::new(tokenize(input)).parse_program()
}
