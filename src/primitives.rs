use crate::evaluator::{EvalError, EvalResult, apply_procedure};
use crate::source::Span;
use crate::types::{Node, PrimitiveFunc, Procedure, Sexpr};
use std::rc::Rc;

/// The builtin library, installed into the global frame at startup.
pub const BUILTINS: &[(&str, PrimitiveFunc)] = &[
    ("+", prim_add),
    ("-", prim_sub),
    ("*", prim_mul),
    ("/", prim_div),
    ("=", prim_num_equals),
    ("<", prim_less_than),
    ("<=", prim_less_than_or_equals),
    (">", prim_greater_than),
    (">=", prim_greater_than_or_equals),
    ("car", prim_car),
    ("cdr", prim_cdr),
    ("cons", prim_cons),
    ("list", prim_list),
    ("list?", prim_is_list),
    ("null?", prim_is_null),
    ("length", prim_length),
    ("append", prim_append),
    ("number?", prim_is_number),
    ("symbol?", prim_is_symbol),
    ("procedure?", prim_is_procedure),
    ("eq?", prim_is_eq),
    ("equal?", prim_is_equal),
    ("not", prim_not),
    ("min", prim_min),
    ("max", prim_max),
    ("abs", prim_abs),
    ("round", prim_round),
    ("floor", prim_floor),
    ("ceil", prim_ceil),
    ("begin", prim_begin),
    ("apply", prim_apply),
    ("map", prim_map),
    ("pow", prim_pow),
    ("sin", prim_sin),
    ("cos", prim_cos),
    ("tan", prim_tan),
    ("asin", prim_asin),
    ("acos", prim_acos),
    ("atan", prim_atan),
    ("sqrt", prim_sqrt),
    ("exp", prim_exp),
    ("log", prim_log),
];

/// Host math constants, bound alongside the builtins.
pub fn constants() -> Vec<(&'static str, Node)> {
    vec![
        ("pi", Node::new_float(std::f64::consts::PI, Span::default())),
        ("e", Node::new_float(std::f64::consts::E, Span::default())),
        ("tau", Node::new_float(std::f64::consts::TAU, Span::default())),
    ]
}

fn arity_error(name: &str, expected: usize, got: usize, span: Span) -> EvalError {
    EvalError::ArityMismatch {
        name: name.to_string(),
        expected: expected.to_string(),
        got,
        span,
    }
}

fn arity_at_least_error(name: &str, min: usize, got: usize, span: Span) -> EvalError {
    EvalError::ArityMismatch {
        name: name.to_string(),
        expected: format!("at least {}", min),
        got,
        span,
    }
}

fn type_error(expected: &'static str, found: &Node) -> EvalError {
    EvalError::TypeMismatch {
        expected,
        found: found.kind.clone(),
        span: found.span,
    }
}

// Checks the number of arguments
macro_rules! check_arity {
    ($args:expr, $expected:expr, $span:expr, $name:expr) => {
        if $args.len() != $expected {
            return Err(arity_error($name, $expected, $args.len(), $span));
        }
    };
    // Variant for minimum number of args
    ($args:expr, min $expected:expr, $span:expr, $name:expr) => {
        if $args.len() < $expected {
            return Err(arity_at_least_error($name, $expected, $args.len(), $span));
        }
    };
}

/// A number in either of the two numeric kinds. Arithmetic promotes to
/// float when the kinds are mixed, or when integer arithmetic overflows.
#[derive(Debug, Copy, Clone)]
enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    fn from_node(node: &Node) -> EvalResult<Num> {
        match node.kind {
            Sexpr::Integer(n) => Ok(Num::Int(n)),
            Sexpr::Float(n) => Ok(Num::Float(n)),
            _ => Err(type_error("a number", node)),
        }
    }

    fn to_node(self, span: Span) -> Node {
        match self {
            Num::Int(n) => Node::new_integer(n, span),
            Num::Float(n) => Node::new_float(n, span),
        }
    }

    fn as_f64(self) -> f64 {
        match self {
            Num::Int(n) => n as f64,
            Num::Float(n) => n,
        }
    }

    fn binop(self, other: Num, int_op: fn(i64, i64) -> Option<i64>, float_op: fn(f64, f64) -> f64) -> Num {
        match (self, other) {
            (Num::Int(a), Num::Int(b)) => match int_op(a, b) {
                Some(n) => Num::Int(n),
                // i64 overflow widens to float
                None => Num::Float(float_op(a as f64, b as f64)),
            },
            (a, b) => Num::Float(float_op(a.as_f64(), b.as_f64())),
        }
    }
}

/// Left-associative pairwise reduction of a binary numeric operator over
/// two or more arguments.
fn reduce_numbers(
    args: &[Node],
    span: Span,
    name: &'static str,
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
) -> EvalResult {
    check_arity!(args, min 2, span, name);
    let mut acc = Num::from_node(&args[0])?;
    for node in &args[1..] {
        acc = acc.binop(Num::from_node(node)?, int_op, float_op);
    }
    Ok(acc.to_node(span))
}

pub fn prim_add(args: Vec<Node>, span: Span) -> EvalResult {
    reduce_numbers(&args, span, "+", i64::checked_add, |a, b| a + b)
}

pub fn prim_sub(args: Vec<Node>, span: Span) -> EvalResult {
    reduce_numbers(&args, span, "-", i64::checked_sub, |a, b| a - b)
}

pub fn prim_mul(args: Vec<Node>, span: Span) -> EvalResult {
    reduce_numbers(&args, span, "*", i64::checked_mul, |a, b| a * b)
}

/// True division: the result is always a float, `(/ 10 2)` included.
pub fn prim_div(args: Vec<Node>, span: Span) -> EvalResult {
    check_arity!(args, min 2, span, "/");
    let mut acc = Num::from_node(&args[0])?.as_f64();
    for node in &args[1..] {
        let divisor = Num::from_node(node)?.as_f64();
        if divisor == 0.0 {
            return Err(EvalError::DivisionByZero(node.span));
        }
        acc /= divisor;
    }
    Ok(Node::new_float(acc, span))
}

/// Binary numeric comparison; integers compare exactly.
fn compare_numbers<I, F>(
    args: &[Node],
    span: Span,
    name: &'static str,
    int_cmp: I,
    float_cmp: F,
) -> EvalResult
where
    I: Fn(i64, i64) -> bool,
    F: Fn(f64, f64) -> bool,
{
    check_arity!(args, 2, span, name);
    let left = Num::from_node(&args[0])?;
    let right = Num::from_node(&args[1])?;
    let result = match (left, right) {
        (Num::Int(a), Num::Int(b)) => int_cmp(a, b),
        (a, b) => float_cmp(a.as_f64(), b.as_f64()),
    };
    Ok(Node::new_bool(result, span))
}

pub fn prim_num_equals(args: Vec<Node>, span: Span) -> EvalResult {
    compare_numbers(&args, span, "=", |a, b| a == b, |a, b| a == b)
}

pub fn prim_less_than(args: Vec<Node>, span: Span) -> EvalResult {
    compare_numbers(&args, span, "<", |a, b| a < b, |a, b| a < b)
}

pub fn prim_less_than_or_equals(args: Vec<Node>, span: Span) -> EvalResult {
    compare_numbers(&args, span, "<=", |a, b| a <= b, |a, b| a <= b)
}

pub fn prim_greater_than(args: Vec<Node>, span: Span) -> EvalResult {
    compare_numbers(&args, span, ">", |a, b| a > b, |a, b| a > b)
}

pub fn prim_greater_than_or_equals(args: Vec<Node>, span: Span) -> EvalResult {
    compare_numbers(&args, span, ">=", |a, b| a >= b, |a, b| a >= b)
}

// --- List primitives ---

fn expect_list(node: &Node) -> EvalResult<&Rc<Vec<Node>>> {
    match &node.kind {
        Sexpr::List(elements) => Ok(elements),
        _ => Err(type_error("a list", node)),
    }
}

pub fn prim_car(args: Vec<Node>, span: Span) -> EvalResult {
    check_arity!(args, 1, span, "car");
    let elements = expect_list(&args[0])?;
    match elements.first() {
        Some(first) => Ok(first.clone()),
        None => Err(type_error("a non-empty list", &args[0])),
    }
}

/// `cdr` drops the first element and returns the remainder as a list:
/// `(cdr (list 1 2 3))` is `(2 3)`.
pub fn prim_cdr(args: Vec<Node>, span: Span) -> EvalResult {
    check_arity!(args, 1, span, "cdr");
    let elements = expect_list(&args[0])?;
    if elements.is_empty() {
        return Err(type_error("a non-empty list", &args[0]));
    }
    Ok(Node::new_list(elements[1..].to_vec(), span))
}

/// `(cons x lst)` builds a fresh list; the element values are shared, not
/// copied, so sublist aliasing stays observable through the result.
pub fn prim_cons(args: Vec<Node>, span: Span) -> EvalResult {
    check_arity!(args, 2, span, "cons");
    let tail = expect_list(&args[1])?;
    let mut elements = Vec::with_capacity(tail.len() + 1);
    elements.push(args[0].clone());
    elements.extend(tail.iter().cloned());
    Ok(Node::new_list(elements, span))
}

pub fn prim_list(args: Vec<Node>, span: Span) -> EvalResult {
    Ok(Node::new_list(args, span))
}

pub fn prim_length(args: Vec<Node>, span: Span) -> EvalResult {
    check_arity!(args, 1, span, "length");
    let elements = expect_list(&args[0])?;
    Ok(Node::new_integer(elements.len() as i64, span))
}

pub fn prim_append(args: Vec<Node>, span: Span) -> EvalResult {
    check_arity!(args, min 2, span, "append");
    let mut elements = Vec::new();
    for arg in &args {
        elements.extend(expect_list(arg)?.iter().cloned());
    }
    Ok(Node::new_list(elements, span))
}

// --- Predicates ---

pub fn prim_is_list(args: Vec<Node>, span: Span) -> EvalResult {
    check_arity!(args, 1, span, "list?");
    Ok(Node::new_bool(matches!(args[0].kind, Sexpr::List(_)), span))
}

pub fn prim_is_null(args: Vec<Node>, span: Span) -> EvalResult {
    check_arity!(args, 1, span, "null?");
    let is_null = matches!(&args[0].kind, Sexpr::List(elements) if elements.is_empty());
    Ok(Node::new_bool(is_null, span))
}

pub fn prim_is_number(args: Vec<Node>, span: Span) -> EvalResult {
    check_arity!(args, 1, span, "number?");
    let is_number = matches!(args[0].kind, Sexpr::Integer(_) | Sexpr::Float(_));
    Ok(Node::new_bool(is_number, span))
}

pub fn prim_is_symbol(args: Vec<Node>, span: Span) -> EvalResult {
    check_arity!(args, 1, span, "symbol?");
    Ok(Node::new_bool(matches!(args[0].kind, Sexpr::Symbol(_)), span))
}

pub fn prim_is_procedure(args: Vec<Node>, span: Span) -> EvalResult {
    check_arity!(args, 1, span, "procedure?");
    Ok(Node::new_bool(
        matches!(args[0].kind, Sexpr::Procedure(_)),
        span,
    ))
}

// --- Equality ---

pub fn prim_is_eq(args: Vec<Node>, span: Span) -> EvalResult {
    check_arity!(args, 2, span, "eq?");
    Ok(Node::new_bool(args[0].kind.is_identical(&args[1].kind), span))
}

pub fn prim_is_equal(args: Vec<Node>, span: Span) -> EvalResult {
    check_arity!(args, 2, span, "equal?");
    Ok(Node::new_bool(
        args[0].kind.structurally_equal(&args[1].kind),
        span,
    ))
}

pub fn prim_not(args: Vec<Node>, span: Span) -> EvalResult {
    check_arity!(args, 1, span, "not");
    Ok(Node::new_bool(!args[0].kind.is_truthy(), span))
}

// --- Numeric utilities ---

fn select_number<F: Fn(f64, f64) -> bool>(
    args: Vec<Node>,
    span: Span,
    name: &'static str,
    prefer: F,
) -> EvalResult {
    check_arity!(args, min 1, span, name);
    let mut best = args[0].clone();
    let mut best_val = Num::from_node(&best)?.as_f64();
    for node in &args[1..] {
        let val = Num::from_node(node)?.as_f64();
        if prefer(val, best_val) {
            best = node.clone();
            best_val = val;
        }
    }
    Ok(best)
}

pub fn prim_min(args: Vec<Node>, span: Span) -> EvalResult {
    select_number(args, span, "min", |candidate, best| candidate < best)
}

pub fn prim_max(args: Vec<Node>, span: Span) -> EvalResult {
    select_number(args, span, "max", |candidate, best| candidate > best)
}

pub fn prim_abs(args: Vec<Node>, span: Span) -> EvalResult {
    check_arity!(args, 1, span, "abs");
    let result = match Num::from_node(&args[0])? {
        Num::Int(n) => match n.checked_abs() {
            Some(n) => Num::Int(n),
            None => Num::Float((n as f64).abs()),
        },
        Num::Float(n) => Num::Float(n.abs()),
    };
    Ok(result.to_node(span))
}

/// Rounds half away from zero; integers pass through unchanged.
pub fn prim_round(args: Vec<Node>, span: Span) -> EvalResult {
    check_arity!(args, 1, span, "round");
    let result = match Num::from_node(&args[0])? {
        Num::Int(n) => Num::Int(n),
        Num::Float(n) => Num::Float(n.round()),
    };
    Ok(result.to_node(span))
}

pub fn prim_floor(args: Vec<Node>, span: Span) -> EvalResult {
    check_arity!(args, 1, span, "floor");
    let result = match Num::from_node(&args[0])? {
        Num::Int(n) => Num::Int(n),
        Num::Float(n) => Num::Float(n.floor()),
    };
    Ok(result.to_node(span))
}

pub fn prim_ceil(args: Vec<Node>, span: Span) -> EvalResult {
    check_arity!(args, 1, span, "ceil");
    let result = match Num::from_node(&args[0])? {
        Num::Int(n) => Num::Int(n),
        Num::Float(n) => Num::Float(n.ceil()),
    };
    Ok(result.to_node(span))
}

// --- Procedure plumbing ---

fn expect_procedure(node: &Node) -> EvalResult<Procedure> {
    match &node.kind {
        Sexpr::Procedure(procedure) => Ok(procedure.clone()),
        _ => Err(type_error("a procedure", node)),
    }
}

/// `(begin e1 e2 ...)` — arguments are already evaluated in order by the
/// application rule, so this just returns the last one.
pub fn prim_begin(mut args: Vec<Node>, span: Span) -> EvalResult {
    match args.pop() {
        Some(last) => Ok(last),
        None => Err(arity_at_least_error("begin", 1, 0, span)),
    }
}

/// `(apply proc args-list)` — direct call with the list's elements as the
/// argument vector.
pub fn prim_apply(args: Vec<Node>, span: Span) -> EvalResult {
    check_arity!(args, 2, span, "apply");
    let procedure = expect_procedure(&args[0])?;
    let call_args = expect_list(&args[1])?.iter().cloned().collect();
    apply_procedure(procedure, call_args, span)
}

/// `(map proc lst)` — applies `proc` to each element, collecting results.
pub fn prim_map(args: Vec<Node>, span: Span) -> EvalResult {
    check_arity!(args, 2, span, "map");
    let procedure = expect_procedure(&args[0])?;
    let elements = expect_list(&args[1])?;
    let mut results = Vec::with_capacity(elements.len());
    for element in elements.iter() {
        results.push(apply_procedure(
            procedure.clone(),
            vec![element.clone()],
            span,
        )?);
    }
    Ok(Node::new_list(results, span))
}

// --- Math passthrough ---

pub fn prim_pow(args: Vec<Node>, span: Span) -> EvalResult {
    check_arity!(args, 2, span, "pow");
    let base = Num::from_node(&args[0])?.as_f64();
    let exponent = Num::from_node(&args[1])?.as_f64();
    Ok(Node::new_float(base.powf(exponent), span))
}

fn float_unary(args: &[Node], span: Span, name: &'static str, func: fn(f64) -> f64) -> EvalResult {
    check_arity!(args, 1, span, name);
    let value = Num::from_node(&args[0])?.as_f64();
    Ok(Node::new_float(func(value), span))
}

macro_rules! math_unary {
    ($($fn_name:ident, $name:literal, $func:expr);+ $(;)?) => {
        $(
            pub fn $fn_name(args: Vec<Node>, span: Span) -> EvalResult {
                float_unary(&args, span, $name, $func)
            }
        )+
    };
}

math_unary! {
    prim_sin, "sin", f64::sin;
    prim_cos, "cos", f64::cos;
    prim_tan, "tan", f64::tan;
    prim_asin, "asin", f64::asin;
    prim_acos, "acos", f64::acos;
    prim_atan, "atan", f64::atan;
    prim_sqrt, "sqrt", f64::sqrt;
    prim_exp, "exp", f64::exp;
    prim_log, "log", f64::ln;
}
