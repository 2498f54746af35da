use crate::environment::Environment;
use crate::evaluator::EvalResult;
use crate::source::Span;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: Sexpr, // The actual S-expression data
    pub span: Span,  // The source span it covers
}

impl Node {
    pub fn new(kind: Sexpr, span: Span) -> Self {
        Node { kind, span }
    }

    pub fn new_symbol(name: impl Into<String>, span: Span) -> Self {
        Node::new(Sexpr::Symbol(name.into()), span)
    }

    pub fn new_integer(n: i64, span: Span) -> Self {
        Node::new(Sexpr::Integer(n), span)
    }

    pub fn new_float(n: f64, span: Span) -> Self {
        Node::new(Sexpr::Float(n), span)
    }

    pub fn new_bool(b: bool, span: Span) -> Self {
        Node::new(Sexpr::Bool(b), span)
    }

    pub fn new_list(elements: Vec<Node>, span: Span) -> Self {
        Node::new(Sexpr::List(Rc::new(elements)), span)
    }

    pub fn new_unspecified(span: Span) -> Self {
        Node::new(Sexpr::Unspecified, span)
    }

    pub fn new_primitive(func: PrimitiveFunc, name: &'static str, span: Span) -> Self {
        Node::new(Sexpr::Procedure(Procedure::Primitive(func, name)), span)
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)
    }
}

/// Runtime value and AST node in one: the reader produces `Sexpr` trees and
/// the evaluator both consumes and returns them (code is data).
///
/// `List` is reference-counted so that cloning a value shares the backing
/// vector: `eq?` compares list identity with `Rc::ptr_eq`, and `cons`
/// shallow-copies while sharing element references.
#[derive(Debug, Clone, PartialEq)]
pub enum Sexpr {
    Symbol(String),
    Integer(i64),
    Float(f64),
    /// Produced only at runtime (comparisons, predicates, `not`); the reader
    /// has no boolean literal. Only `Bool(false)` is falsy.
    Bool(bool),
    List(Rc<Vec<Node>>),
    Procedure(Procedure),
    /// The "no value" result of `define` and `set!`. The REPL skips it.
    Unspecified,
}

impl Sexpr {
    pub fn type_name(&self) -> &'static str {
        match self {
            Sexpr::Symbol(_) => "symbol",
            Sexpr::Integer(_) => "integer",
            Sexpr::Float(_) => "float",
            Sexpr::Bool(_) => "boolean",
            Sexpr::List(_) => "list",
            Sexpr::Procedure(_) => "procedure",
            Sexpr::Unspecified => "unspecified",
        }
    }

    /// Truthiness for `if`: only `#f` is false. 0 and () are true.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Sexpr::Bool(false))
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Sexpr::Integer(n) => Some(*n as f64),
            Sexpr::Float(n) => Some(*n),
            _ => None,
        }
    }

    /// Numeric equality with integer/float promotion. `None` if either side
    /// is not a number.
    pub fn numeric_eq(&self, other: &Sexpr) -> Option<bool> {
        match (self, other) {
            (Sexpr::Integer(a), Sexpr::Integer(b)) => Some(a == b),
            _ => Some(self.as_f64()? == other.as_f64()?),
        }
    }

    /// `equal?`: deep structural equality, ignoring source spans. Numbers
    /// compare by value across kinds; procedures fall back to identity.
    pub fn structurally_equal(&self, other: &Sexpr) -> bool {
        if let Some(eq) = self.numeric_eq(other) {
            return eq;
        }
        match (self, other) {
            (Sexpr::Symbol(a), Sexpr::Symbol(b)) => a == b,
            (Sexpr::Bool(a), Sexpr::Bool(b)) => a == b,
            (Sexpr::List(a), Sexpr::List(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .zip(b.iter())
                        .all(|(x, y)| x.kind.structurally_equal(&y.kind))
            }
            (Sexpr::Procedure(a), Sexpr::Procedure(b)) => a.is_identical(b),
            (Sexpr::Unspecified, Sexpr::Unspecified) => true,
            _ => false,
        }
    }

    /// `eq?`: reference identity for lists and procedures, value equality
    /// for numbers, text equality for symbols.
    pub fn is_identical(&self, other: &Sexpr) -> bool {
        if let Some(eq) = self.numeric_eq(other) {
            return eq;
        }
        match (self, other) {
            (Sexpr::Symbol(a), Sexpr::Symbol(b)) => a == b,
            (Sexpr::Bool(a), Sexpr::Bool(b)) => a == b,
            (Sexpr::List(a), Sexpr::List(b)) => Rc::ptr_eq(a, b),
            (Sexpr::Procedure(a), Sexpr::Procedure(b)) => a.is_identical(b),
            (Sexpr::Unspecified, Sexpr::Unspecified) => true,
            _ => false,
        }
    }
}

impl fmt::Display for Sexpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sexpr::Symbol(s) => write!(f, "{}", s),
            Sexpr::Integer(n) => write!(f, "{}", n),
            // Debug formatting keeps the decimal point: 10.0 not 10
            Sexpr::Float(n) => write!(f, "{:?}", n),
            Sexpr::Bool(b) => write!(f, "{}", if *b { "#t" } else { "#f" }),
            Sexpr::List(elements) => {
                write!(f, "(")?;
                let mut first = true;
                for expr in elements.iter() {
                    if !first {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", expr)?;
                    first = false;
                }
                write!(f, ")")
            }
            Sexpr::Procedure(procedure) => write!(f, "{}", procedure),
            Sexpr::Unspecified => write!(f, "#<unspecified>"),
        }
    }
}

pub type PrimitiveFunc = fn(Vec<Node>, Span) -> EvalResult;

#[derive(Clone)]
pub enum Procedure {
    /// A native builtin: the Rust function and its name (for display).
    Primitive(PrimitiveFunc, &'static str),
    /// A user-defined closure.
    Lambda(Rc<Lambda>),
}

/// A `lambda` value: parameter names, body expression, and the environment
/// captured by reference at creation time. The captured frame is shared,
/// not snapshotted, so later `set!` mutations are observable.
pub struct Lambda {
    pub params: Vec<String>,
    pub body: Node,
    pub env: Rc<RefCell<Environment>>,
}

impl Procedure {
    /// Identity comparison: primitives by function pointer, lambdas by
    /// allocation.
    pub fn is_identical(&self, other: &Self) -> bool {
        match (self, other) {
            (Procedure::Primitive(f1, _), Procedure::Primitive(f2, _)) => {
                std::ptr::fn_addr_eq(*f1, *f2)
            }
            (Procedure::Lambda(a), Procedure::Lambda(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Procedure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Procedure::Primitive(_, name) => write!(f, "#<primitive:{}>", name),
            Procedure::Lambda(lambda) => {
                write!(f, "#<lambda ({})>", lambda.params.join(" "))
            }
        }
    }
}

impl fmt::Debug for Procedure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Procedure::Primitive(_, name) => write!(f, "Primitive({})", name),
            // Not derived: a lambda's captured environment can point back at
            // the lambda itself, which would recurse forever.
            Procedure::Lambda(lambda) => write!(f, "Lambda({})", lambda.params.join(" ")),
        }
    }
}

impl PartialEq for Procedure {
    fn eq(&self, other: &Self) -> bool {
        self.is_identical(other)
    }
}
