use std::cell::RefCell;
use std::rc::Rc;

use rustyline::error::ReadlineError;
use rustyline::validate::{ValidationContext, ValidationResult, Validator};
use rustyline::{Completer, Context, Editor, Helper, Highlighter, Hinter, Validator};

use rispy::{
    Environment, Sexpr, TokenKind, evaluate, evaluator::special_form_identifiers,
    parse_program_str, tokenize,
};

/// Completes symbol prefixes from the environment's visible identifiers
/// plus the special-form keywords.
struct RispyCompleter {
    env: Rc<RefCell<Environment>>,
}

impl rustyline::completion::Completer for RispyCompleter {
    type Candidate = String;
    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<String>)> {
        let tokens = tokenize(&line[..pos]);
        let candidates = match tokens.last().map(|t| t.kind.clone()) {
            Some(TokenKind::Symbol(prefix)) => self
                .env
                .borrow()
                .get_identifiers()
                .union(&special_form_identifiers())
                .filter_map(|id| {
                    if id.starts_with(&prefix) {
                        Some(id[prefix.len()..].to_string())
                    } else {
                        None
                    }
                })
                .collect(),
            _ => vec![],
        };
        Ok((pos, candidates))
    }
}

/// Keeps reading lines until the parentheses balance, so multi-line
/// expressions can be entered naturally.
struct BalanceValidator;

impl Validator for BalanceValidator {
    fn validate(&self, ctx: &mut ValidationContext) -> rustyline::Result<ValidationResult> {
        let mut depth = 0i64;
        for c in ctx.input().chars() {
            match c {
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth < 0 {
                        // Let the parser report this one properly
                        return Ok(ValidationResult::Valid(None));
                    }
                }
                _ => {}
            }
        }
        if depth > 0 {
            Ok(ValidationResult::Incomplete)
        } else {
            Ok(ValidationResult::Valid(None))
        }
    }
}

#[derive(Completer, Helper, Highlighter, Hinter, Validator)]
struct ReplHelper {
    #[rustyline(Validator)]
    validator: BalanceValidator,
    #[rustyline(Completer)]
    completer: RispyCompleter,
}

const HISTORY_FILE: &str = "rispy_history.txt";

fn main() -> rustyline::Result<()> {
    println!("rispy v{}", env!("CARGO_PKG_VERSION"));
    println!("Type 'exit' or press Ctrl-D to quit.");

    let global_env = Environment::new_global_populated();
    let helper = ReplHelper {
        validator: BalanceValidator,
        completer: RispyCompleter {
            env: global_env.clone(),
        },
    };
    let mut rl = Editor::new()?;
    rl.set_helper(Some(helper));
    if rl.load_history(HISTORY_FILE).is_err() {
        println!("No previous history.");
    }

    loop {
        let readline = rl.readline("rispy> ");
        match readline {
            Ok(line) => {
                let trimmed_input = line.trim();
                if trimmed_input.is_empty() {
                    continue;
                }
                rl.add_history_entry(line.as_str())?;
                if trimmed_input.eq_ignore_ascii_case("exit") {
                    break;
                }

                // A failed expression aborts the rest of the line but never
                // the loop; the global environment stays live either way.
                match parse_program_str(trimmed_input) {
                    Ok(nodes) => {
                        for node in nodes {
                            match evaluate(node, global_env.clone()) {
                                Ok(result) => {
                                    if !matches!(result.kind, Sexpr::Unspecified) {
                                        println!("{}", result);
                                    }
                                }
                                Err(e) => {
                                    e.pretty_print(trimmed_input);
                                    break;
                                }
                            }
                        }
                    }
                    Err(parse_err) => {
                        parse_err.pretty_print(trimmed_input);
                    }
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("Interrupted. Type 'exit' or Ctrl-D to quit.");
            }
            Err(ReadlineError::Eof) => {
                println!("\nExiting.");
                break;
            }
            Err(err) => {
                eprintln!("Readline Error: {:?}", err);
                break;
            }
        }
    }
    rl.save_history(HISTORY_FILE)
}
