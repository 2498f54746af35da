use crate::environment::{EnvError, Environment};
use crate::source::Span;
use crate::types::{Lambda, Node, Procedure, Sexpr};
use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::rc::Rc;
use thiserror::Error;

/// Guard for the host call stack: evaluation nests several Rust frames per
/// expression level, so pathologically deep recursion must fail with an
/// error instead of overflowing the stack. 200 levels fit within a default
/// 2 MiB test-thread stack.
const MAX_RECURSION_DEPTH: usize = 200;

thread_local! {
    // Depth of the innermost active `evaluate_at_depth`. Builtins that
    // re-enter application (`apply`, `map`) read it so the guard keeps
    // counting across the primitive boundary.
    static CURRENT_DEPTH: Cell<usize> = const { Cell::new(0) };
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("{0}")]
    Env(#[from] EnvError),
    #[error("Expected a procedure, but got: {0}")]
    NotAProcedure(Sexpr, Span),
    // `expected` is rendered text ("2", "at least 2") so variadic callers
    // can state a minimum
    #[error("'{name}' expects {expected} arguments, got {got}")]
    ArityMismatch {
        name: String,
        expected: String,
        got: usize,
        span: Span,
    },
    #[error("Invalid special form: {0}")]
    InvalidSpecialForm(String, Span),
    #[error("Type mismatch: expected {expected}, found {}", .found.type_name())]
    TypeMismatch {
        expected: &'static str,
        found: Sexpr,
        span: Span,
    },
    #[error("Division by zero")]
    DivisionByZero(Span),
    #[error("Maximum recursion depth exceeded")]
    RecursionDepth(Span),
}

impl EvalError {
    pub fn span(&self) -> Span {
        match self {
            EvalError::Env(EnvError::UnboundVariable(_, span)) => *span,
            EvalError::NotAProcedure(_, span) => *span,
            EvalError::ArityMismatch { span, .. } => *span,
            EvalError::InvalidSpecialForm(_, span) => *span,
            EvalError::TypeMismatch { span, .. } => *span,
            EvalError::DivisionByZero(span) => *span,
            EvalError::RecursionDepth(span) => *span,
        }
    }
}

pub type EvalResult<T = Node> = Result<T, EvalError>;

/// Evaluates an expression tree within the given environment.
pub fn evaluate(node: Node, env: Rc<RefCell<Environment>>) -> EvalResult {
    evaluate_at_depth(node, env, 0)
}

fn evaluate_at_depth(node: Node, env: Rc<RefCell<Environment>>, depth: usize) -> EvalResult {
    if depth > MAX_RECURSION_DEPTH {
        return Err(EvalError::RecursionDepth(node.span));
    }

    let previous = CURRENT_DEPTH.replace(depth);
    let result = evaluate_dispatch(node, env, depth);
    CURRENT_DEPTH.set(previous);
    result
}

fn evaluate_dispatch(node: Node, env: Rc<RefCell<Environment>>, depth: usize) -> EvalResult {
    match &node.kind {
        // Self-evaluating atoms. Runtime-only values (procedures, booleans)
        // can reappear here through quote or apply.
        Sexpr::Integer(_)
        | Sexpr::Float(_)
        | Sexpr::Bool(_)
        | Sexpr::Procedure(_)
        | Sexpr::Unspecified => Ok(node),

        // Symbols are variable references
        Sexpr::Symbol(name) => Ok(env.borrow().get(name, node.span)?),

        // Lists are special forms or applications, keyed on the head symbol
        Sexpr::List(elements) => {
            if let [first, rest @ ..] = &elements[..] {
                match &first.kind {
                    Sexpr::Symbol(sym_name) if sym_name == "quote" => {
                        evaluate_quote(rest, node.span)
                    }
                    Sexpr::Symbol(sym_name) if sym_name == "if" => {
                        evaluate_if(rest, env, node.span, depth)
                    }
                    Sexpr::Symbol(sym_name) if sym_name == "define" => {
                        evaluate_define(rest, env, node.span, depth)
                    }
                    Sexpr::Symbol(sym_name) if sym_name == "set!" => {
                        evaluate_set(rest, env, node.span, depth)
                    }
                    Sexpr::Symbol(sym_name) if sym_name == "lambda" => {
                        evaluate_lambda(rest, env, node.span)
                    }
                    _ => evaluate_application(first, rest, env, node.span, depth),
                }
            } else {
                // The empty list evaluates to itself
                Ok(node.clone())
            }
        }
    }
}

/// `(quote expr)` — return the operand unevaluated, structure shared.
fn evaluate_quote(operands: &[Node], span: Span) -> EvalResult {
    if let [node] = operands {
        Ok(node.clone())
    } else {
        Err(EvalError::InvalidSpecialForm(
            "quote expects exactly one argument".to_string(),
            span,
        ))
    }
}

/// `(if test conseq alt)` — exactly three operands; only `#f` is false.
fn evaluate_if(
    operands: &[Node],
    env: Rc<RefCell<Environment>>,
    span: Span,
    depth: usize,
) -> EvalResult {
    if let [condition, consequent, alternate] = operands {
        let condition_result = evaluate_at_depth(condition.clone(), env.clone(), depth + 1)?;
        if condition_result.kind.is_truthy() {
            evaluate_at_depth(consequent.clone(), env, depth + 1)
        } else {
            evaluate_at_depth(alternate.clone(), env, depth + 1)
        }
    } else {
        Err(EvalError::InvalidSpecialForm(
            "if expects exactly a test, a consequent, and an alternate".to_string(),
            span,
        ))
    }
}

/// `(define name expr)` — bind in the current frame; yields no value.
fn evaluate_define(
    operands: &[Node],
    env: Rc<RefCell<Environment>>,
    span: Span,
    depth: usize,
) -> EvalResult {
    if let [name_node, expr] = operands {
        let Sexpr::Symbol(name) = &name_node.kind else {
            return Err(EvalError::InvalidSpecialForm(
                format!(
                    "define expects a symbol name, got {}",
                    name_node.kind.type_name()
                ),
                name_node.span,
            ));
        };
        let value = evaluate_at_depth(expr.clone(), env.clone(), depth + 1)?;
        env.borrow_mut().define(name.clone(), value);
        Ok(Node::new_unspecified(span))
    } else {
        Err(EvalError::InvalidSpecialForm(
            "define expects exactly a name and an expression".to_string(),
            span,
        ))
    }
}

/// `(set! name expr)` — overwrite an existing binding; never creates one.
fn evaluate_set(
    operands: &[Node],
    env: Rc<RefCell<Environment>>,
    span: Span,
    depth: usize,
) -> EvalResult {
    if let [name_node, expr] = operands {
        let Sexpr::Symbol(name) = &name_node.kind else {
            return Err(EvalError::InvalidSpecialForm(
                format!(
                    "set! expects a symbol name, got {}",
                    name_node.kind.type_name()
                ),
                name_node.span,
            ));
        };
        let value = evaluate_at_depth(expr.clone(), env.clone(), depth + 1)?;
        env.borrow_mut().set(name, value, name_node.span)?;
        Ok(Node::new_unspecified(span))
    } else {
        Err(EvalError::InvalidSpecialForm(
            "set! expects exactly a name and an expression".to_string(),
            span,
        ))
    }
}

/// `(lambda (params...) body)` — build a closure capturing `env` by
/// reference. The captured frame stays shared, so later mutations through
/// `set!` are visible to the closure.
fn evaluate_lambda(operands: &[Node], env: Rc<RefCell<Environment>>, span: Span) -> EvalResult {
    if let [params_node, body] = operands {
        let Sexpr::List(param_nodes) = &params_node.kind else {
            return Err(EvalError::InvalidSpecialForm(
                format!(
                    "lambda expects a parameter list, got {}",
                    params_node.kind.type_name()
                ),
                params_node.span,
            ));
        };
        let mut params = Vec::with_capacity(param_nodes.len());
        for param in param_nodes.iter() {
            match &param.kind {
                Sexpr::Symbol(name) => params.push(name.clone()),
                other => {
                    return Err(EvalError::InvalidSpecialForm(
                        format!("lambda parameters must be symbols, got {}", other.type_name()),
                        param.span,
                    ));
                }
            }
        }
        let lambda = Lambda {
            params,
            body: body.clone(),
            env,
        };
        Ok(Node::new(
            Sexpr::Procedure(Procedure::Lambda(Rc::new(lambda))),
            span,
        ))
    } else {
        Err(EvalError::InvalidSpecialForm(
            "lambda expects exactly a parameter list and a body".to_string(),
            span,
        ))
    }
}

fn evaluate_application(
    operator: &Node,
    operands: &[Node],
    env: Rc<RefCell<Environment>>,
    span: Span,
    depth: usize,
) -> EvalResult {
    let operator_node = evaluate_at_depth(operator.clone(), env.clone(), depth + 1)?;
    let procedure = match operator_node.kind {
        Sexpr::Procedure(procedure) => procedure,
        other => return Err(EvalError::NotAProcedure(other, operator.span)),
    };

    // Operands evaluate left to right in the caller's environment
    let mut evaluated_args = Vec::with_capacity(operands.len());
    for operand in operands {
        evaluated_args.push(evaluate_at_depth(operand.clone(), env.clone(), depth + 1)?);
    }

    apply_at_depth(procedure, evaluated_args, span, depth)
}

/// Applies an already-evaluated procedure to already-evaluated arguments.
/// Public so builtins like `apply` and `map` can re-enter application. The
/// call continues at the current evaluation depth, so the recursion guard
/// keeps counting across it.
pub fn apply_procedure(procedure: Procedure, args: Vec<Node>, span: Span) -> EvalResult {
    apply_at_depth(procedure, args, span, CURRENT_DEPTH.get())
}

fn apply_at_depth(procedure: Procedure, args: Vec<Node>, span: Span, depth: usize) -> EvalResult {
    match procedure {
        Procedure::Primitive(func, _) => func(args, span),
        Procedure::Lambda(lambda) => {
            if lambda.params.len() != args.len() {
                return Err(EvalError::ArityMismatch {
                    name: Procedure::Lambda(lambda.clone()).to_string(),
                    expected: lambda.params.len().to_string(),
                    got: args.len(),
                    span,
                });
            }
            // The frame's outer pointer is the closure's captured
            // environment, not the caller's: this is what makes scoping
            // lexical rather than dynamic.
            let frame = Environment::new_call_frame(&lambda.params, args, lambda.env.clone());
            evaluate_at_depth(lambda.body.clone(), frame, depth + 1)
        }
    }
}

/// The special-form keywords, exposed for REPL completion.
pub fn special_form_identifiers() -> HashSet<String> {
    ["quote", "if", "define", "set!", "lambda"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{parse_program_str, parse_str};

    // Evaluates one expression against a fresh (or provided) global env
    fn assert_eval_kind(input: &str, expected_kind: Sexpr, env: Option<Rc<RefCell<Environment>>>) {
        let env = env.unwrap_or_else(Environment::new_global_populated);
        match parse_str(input) {
            Ok(node) => match evaluate(node, env) {
                Ok(result_node) => {
                    assert_eq!(result_node.kind, expected_kind, "Input: '{}'", input)
                }
                Err(e) => panic!("Evaluation failed for input '{}': {}", input, e),
            },
            Err(e) => panic!("Parsing failed for input '{}': {}", input, e),
        }
    }

    fn assert_eval_error(
        input: &str,
        expected_error_variant: &EvalError,
        env: Option<Rc<RefCell<Environment>>>,
    ) {
        let env = env.unwrap_or_else(Environment::new_global_populated);
        match parse_str(input) {
            Ok(node) => match evaluate(node, env) {
                Ok(result) => panic!(
                    "Expected evaluation to fail for input '{}', but got: {:?}",
                    input, result
                ),
                Err(e) => {
                    assert_eq!(
                        std::mem::discriminant(&e),
                        std::mem::discriminant(expected_error_variant),
                        "Input: '{}', Expected error variant like {:?}, got: {:?}",
                        input,
                        expected_error_variant,
                        e
                    );
                }
            },
            Err(e) => panic!("Parsing failed for input '{}': {}", input, e),
        }
    }

    // Evaluates a whole program in one environment, returning the last result
    fn eval_program(input: &str, env: &Rc<RefCell<Environment>>) -> EvalResult {
        let nodes = parse_program_str(input).expect("program should parse");
        let mut last = Node::new_unspecified(Span::default());
        for node in nodes {
            last = evaluate(node, env.clone())?;
        }
        Ok(last)
    }

    fn dummy_arity_error() -> EvalError {
        EvalError::ArityMismatch {
            name: String::new(),
            expected: String::new(),
            got: 0,
            span: Span::default(),
        }
    }

    fn dummy_unbound_error() -> EvalError {
        EvalError::Env(EnvError::UnboundVariable(String::new(), Span::default()))
    }

    #[test]
    fn test_eval_self_evaluating() {
        assert_eval_kind("123", Sexpr::Integer(123), None);
        assert_eval_kind("-4.5", Sexpr::Float(-4.5), None);
        assert_eval_kind("()", Sexpr::List(Rc::new(vec![])), None);
    }

    #[test]
    fn test_eval_symbol_lookup() {
        let env = Environment::new();
        env.borrow_mut()
            .define("x".to_string(), Node::new_integer(100, Span::default()));
        assert_eval_kind("x", Sexpr::Integer(100), Some(env));

        assert_eval_error("nonexistent", &dummy_unbound_error(), None);
    }

    #[test]
    fn test_eval_quote() {
        assert_eval_kind("(quote a)", Sexpr::Symbol("a".to_string()), None);
        assert_eval_kind("(quote 1)", Sexpr::Integer(1), None);

        let result = evaluate(
            parse_str("(quote (1 2))").unwrap(),
            Environment::new(),
        )
        .unwrap();
        let Sexpr::List(elements) = &result.kind else {
            panic!("Expected a list, got {:?}", result.kind);
        };
        assert_eq!(elements.len(), 2);
        assert_eq!(elements[0].kind, Sexpr::Integer(1));
        assert_eq!(elements[1].kind, Sexpr::Integer(2));

        let malformed = EvalError::InvalidSpecialForm(String::new(), Span::default());
        assert_eval_error("(quote a b)", &malformed, None);
        assert_eval_error("(quote)", &malformed, None);
    }

    #[test]
    fn test_eval_if_branches() {
        assert_eval_kind("(if (< 1 2) 10 20)", Sexpr::Integer(10), None);
        assert_eval_kind("(if (> 1 2) 10 20)", Sexpr::Integer(20), None);
    }

    #[test]
    fn test_eval_if_truthiness_sentinel() {
        // Everything but #f is true, including 0 and the empty list
        assert_eval_kind("(if 0 1 2)", Sexpr::Integer(1), None);
        assert_eval_kind("(if () 1 2)", Sexpr::Integer(1), None);
        assert_eval_kind("(if (quote x) 1 2)", Sexpr::Integer(1), None);
        assert_eval_kind("(if (not (< 1 2)) 1 2)", Sexpr::Integer(2), None);
    }

    #[test]
    fn test_eval_if_does_not_evaluate_unused_branch() {
        assert_eval_kind("(if (< 1 2) 10 unbound-variable)", Sexpr::Integer(10), None);
        assert_eval_kind("(if (> 1 2) unbound-variable 20)", Sexpr::Integer(20), None);
    }

    #[test]
    fn test_eval_if_requires_three_operands() {
        let malformed = EvalError::InvalidSpecialForm(String::new(), Span::default());
        assert_eval_error("(if 1 2)", &malformed, None);
        assert_eval_error("(if)", &malformed, None);
        assert_eval_error("(if 1 2 3 4)", &malformed, None);
    }

    #[test]
    fn test_eval_define_then_reference() {
        let env = Environment::new_global_populated();
        let result = eval_program("(define x 10) x", &env).unwrap();
        assert_eq!(result.kind, Sexpr::Integer(10));
    }

    #[test]
    fn test_eval_define_returns_no_value() {
        assert_eval_kind("(define x 1)", Sexpr::Unspecified, None);
    }

    #[test]
    fn test_eval_define_malformed() {
        let malformed = EvalError::InvalidSpecialForm(String::new(), Span::default());
        assert_eval_error("(define 1 2)", &malformed, None);
        assert_eval_error("(define x)", &malformed, None);
        assert_eval_error("(define x 1 2)", &malformed, None);
    }

    #[test]
    fn test_eval_set_overwrites() {
        let env = Environment::new_global_populated();
        assert_eq!(
            eval_program("(define x 10) x", &env).unwrap().kind,
            Sexpr::Integer(10)
        );
        assert_eq!(
            eval_program("(set! x 20) x", &env).unwrap().kind,
            Sexpr::Integer(20)
        );
    }

    #[test]
    fn test_eval_set_unbound_is_error() {
        assert_eval_error("(set! y 1)", &dummy_unbound_error(), None);
    }

    #[test]
    fn test_eval_set_never_defines() {
        // set! fails without touching the environment
        let env = Environment::new_global_populated();
        assert!(eval_program("(set! y 1)", &env).is_err());
        assert!(eval_program("y", &env).is_err());
    }

    #[test]
    fn test_eval_lambda_application() {
        assert_eval_kind("((lambda (x) (* x x)) 5)", Sexpr::Integer(25), None);
        assert_eval_kind("((lambda () 42))", Sexpr::Integer(42), None);
    }

    #[test]
    fn test_eval_lambda_lexical_closure() {
        let env = Environment::new_global_populated();
        let result = eval_program(
            "(define f (lambda (x) (lambda (y) (+ x y)))) ((f 3) 4)",
            &env,
        )
        .unwrap();
        assert_eq!(result.kind, Sexpr::Integer(7));
    }

    #[test]
    fn test_eval_closure_sees_frame_mutation() {
        // Closures capture frame references, not snapshots: a set! against
        // the shared frame is visible on the next call
        let env = Environment::new_global_populated();
        let result = eval_program(
            "(define x 10) (define get-x (lambda () x)) (set! x 20) (get-x)",
            &env,
        )
        .unwrap();
        assert_eq!(result.kind, Sexpr::Integer(20));
    }

    #[test]
    fn test_eval_closure_frame_is_private_per_call() {
        // Each call builds a fresh frame over the captured environment, so
        // parallel activations do not interfere
        let env = Environment::new_global_populated();
        let result = eval_program(
            "(define add (lambda (x) (lambda (y) (+ x y)))) \
             (define add1 (add 1)) (define add10 (add 10)) \
             (+ (add1 0) (add10 0))",
            &env,
        )
        .unwrap();
        assert_eq!(result.kind, Sexpr::Integer(11));
    }

    #[test]
    fn test_eval_counter_closure_mutates_captured_frame() {
        let env = Environment::new_global_populated();
        let result = eval_program(
            "(define make-counter \
               (lambda (n) (lambda () (begin (set! n (+ n 1)) n)))) \
             (define tick (make-counter 0)) \
             (tick) (tick) (tick)",
            &env,
        )
        .unwrap();
        assert_eq!(result.kind, Sexpr::Integer(3));
    }

    #[test]
    fn test_eval_lambda_arity_mismatch() {
        assert_eval_error("((lambda (x) x) 1 2)", &dummy_arity_error(), None);
        assert_eval_error("((lambda (x y) x) 1)", &dummy_arity_error(), None);
    }

    #[test]
    fn test_eval_lambda_malformed() {
        let malformed = EvalError::InvalidSpecialForm(String::new(), Span::default());
        assert_eval_error("(lambda x x)", &malformed, None);
        assert_eval_error("(lambda (1) x)", &malformed, None);
        assert_eval_error("(lambda (x))", &malformed, None);
    }

    #[test]
    fn test_eval_shadowing_in_call_frame() {
        let env = Environment::new_global_populated();
        let result = eval_program(
            "(define x 1) (define f (lambda (x) (* x 100))) (+ (f 2) x)",
            &env,
        )
        .unwrap();
        assert_eq!(result.kind, Sexpr::Integer(201));
    }

    #[test]
    fn test_eval_not_a_procedure() {
        let not_proc = EvalError::NotAProcedure(Sexpr::Integer(0), Span::default());
        assert_eval_error("(1 2 3)", &not_proc, None);
        assert_eval_error("((quote (1 2)) 3)", &not_proc, None);
    }

    #[test]
    fn test_eval_operator_lookup_error_propagates_as_unbound() {
        // An unbound operator is an unbound-variable error, not NotAProcedure
        assert_eval_error("(frobnicate 1 2)", &dummy_unbound_error(), None);
    }

    #[test]
    fn test_eval_recursive_definition() {
        let env = Environment::new_global_populated();
        let result = eval_program(
            "(define fib (lambda (n) \
               (if (< n 2) n (+ (fib (- n 1)) (fib (- n 2)))))) \
             (fib 10)",
            &env,
        )
        .unwrap();
        assert_eq!(result.kind, Sexpr::Integer(55));

        let result = eval_program(
            "(define fact (lambda (n) (if (= n 0) 1 (* n (fact (- n 1)))))) (fact 10)",
            &env,
        )
        .unwrap();
        assert_eq!(result.kind, Sexpr::Integer(3628800));
    }

    #[test]
    fn test_eval_runaway_recursion_fails_gracefully() {
        let env = Environment::new_global_populated();
        let result = eval_program("(define loop (lambda (n) (loop (+ n 1)))) (loop 0)", &env);
        assert!(matches!(result, Err(EvalError::RecursionDepth(_))));
    }

    #[test]
    fn test_eval_runaway_recursion_through_apply_fails_gracefully() {
        // The guard keeps counting when recursion is routed through the
        // apply and map builtins
        let env = Environment::new_global_populated();
        let result = eval_program(
            "(define loop (lambda (n) (apply loop (list n)))) (loop 0)",
            &env,
        );
        assert!(matches!(result, Err(EvalError::RecursionDepth(_))));

        let result = eval_program(
            "(define spin (lambda (n) (map spin (list n)))) (spin 0)",
            &env,
        );
        assert!(matches!(result, Err(EvalError::RecursionDepth(_))));
    }

    #[test]
    fn test_depth_guard_resets_between_top_level_expressions() {
        // A depth failure must not leave the counter deep for the next line
        let env = Environment::new_global_populated();
        let result = eval_program("(define loop (lambda (n) (loop n))) (loop 0)", &env);
        assert!(matches!(result, Err(EvalError::RecursionDepth(_))));
        assert_eq!(eval_program("(+ 1 2)", &env).unwrap().kind, Sexpr::Integer(3));
    }

    #[test]
    fn test_eval_error_leaves_environment_intact() {
        let env = Environment::new_global_populated();
        assert_eq!(
            eval_program("(define x 10) x", &env).unwrap().kind,
            Sexpr::Integer(10)
        );
        // A failing top-level expression must not corrupt earlier bindings
        assert!(eval_program("(car 5)", &env).is_err());
        assert_eq!(eval_program("x", &env).unwrap().kind, Sexpr::Integer(10));
    }

    #[test]
    fn test_special_form_identifiers() {
        let forms = special_form_identifiers();
        assert!(forms.contains("lambda"));
        assert!(forms.contains("set!"));
        assert_eq!(forms.len(), 5);
    }
}
