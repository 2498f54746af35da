use crate::environment::EnvError;
use crate::evaluator::EvalError;
use crate::parser::ParseError;
use ariadne::{Label, Report, ReportKind, Source};

impl EvalError {
    /// Renders the error as a labeled report against the source line.
    pub fn pretty_print(&self, input: &str) {
        let range = self.span().to_range();
        let report = match self {
            EvalError::Env(EnvError::UnboundVariable(symbol, _)) => {
                Report::build(ReportKind::Error, ("REPL", range.clone()))
                    .with_message(format!("Unbound variable `{}`", symbol))
                    .with_label(
                        Label::new(("REPL", range))
                            .with_message("This symbol is not defined in the current scope"),
                    )
            }
            EvalError::NotAProcedure(sexpr, _) => {
                Report::build(ReportKind::Error, ("REPL", range.clone()))
                    .with_message(format!("Not a procedure: {}", sexpr))
                    .with_label(
                        Label::new(("REPL", range))
                            .with_message("This expression cannot be called as a procedure"),
                    )
            }
            EvalError::ArityMismatch {
                name,
                expected,
                got,
                ..
            } => Report::build(ReportKind::Error, ("REPL", range.clone()))
                .with_message(format!("Wrong number of arguments for {}", name))
                .with_label(
                    Label::new(("REPL", range))
                        .with_message(format!("Expected {} arguments, got {}", expected, got)),
                ),
            EvalError::InvalidSpecialForm(message, _) => {
                Report::build(ReportKind::Error, ("REPL", range.clone()))
                    .with_message("Invalid special form")
                    .with_label(Label::new(("REPL", range)).with_message(message))
            }
            EvalError::TypeMismatch {
                expected, found, ..
            } => Report::build(ReportKind::Error, ("REPL", range.clone()))
                .with_message("Type mismatch")
                .with_label(Label::new(("REPL", range)).with_message(format!(
                    "Expected {}, found a {}",
                    expected,
                    found.type_name()
                ))),
            EvalError::DivisionByZero(_) => {
                Report::build(ReportKind::Error, ("REPL", range.clone()))
                    .with_message("Division by zero")
                    .with_label(
                        Label::new(("REPL", range)).with_message("This divisor evaluated to zero"),
                    )
            }
            EvalError::RecursionDepth(_) => {
                Report::build(ReportKind::Error, ("REPL", range.clone()))
                    .with_message("Maximum recursion depth exceeded")
                    .with_label(
                        Label::new(("REPL", range))
                            .with_message("Evaluation of this expression recursed too deeply"),
                    )
            }
        };
        let _ = report.finish().print(("REPL", Source::from(input)));
    }
}

impl ParseError {
    pub fn pretty_print(&self, input: &str) {
        let report = match self {
            ParseError::UnexpectedEof(expected) => {
                let idx = input.len();
                Report::build(ReportKind::Error, ("REPL", idx..idx))
                    .with_message("Unexpected end of input")
                    .with_label(
                        Label::new(("REPL", idx..idx))
                            .with_message(format!("Expected {}", expected)),
                    )
            }
            ParseError::UnexpectedClose(span) => {
                Report::build(ReportKind::Error, ("REPL", span.to_range()))
                    .with_message("Unexpected ')'")
                    .with_label(
                        Label::new(("REPL", span.to_range()))
                            .with_message("No open list to close here"),
                    )
            }
            ParseError::TrailingToken(found) => {
                Report::build(ReportKind::Error, ("REPL", found.span.to_range()))
                    .with_message(format!("Unexpected token: {}", found.kind))
                    .with_label(
                        Label::new(("REPL", found.span.to_range()))
                            .with_message("Expected end of input after the expression"),
                    )
            }
        };
        let _ = report.finish().print(("REPL", Source::from(input)));
    }
}
