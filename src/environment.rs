use crate::primitives;
use crate::source::Span;
use crate::types::{Node, PrimitiveFunc};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EnvError {
    #[error("Unbound variable: '{0}'")]
    UnboundVariable(String, Span),
}

/// One frame of the lexical scope chain: its own bindings plus an optional
/// outer frame. Frames are shared (`Rc<RefCell<_>>`) because closures keep a
/// reference to their defining frame and `set!` mutates through it. A call
/// frame therefore outlives its activation exactly as long as some closure
/// still holds it.
#[derive(Debug, Clone, PartialEq)]
pub struct Environment {
    outer: Option<Rc<RefCell<Environment>>>,
    bindings: HashMap<String, Node>,
}

impl Environment {
    /// Creates a new, empty top-level environment.
    pub fn new() -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Environment {
            outer: None,
            bindings: HashMap::new(),
        }))
    }

    /// The global frame: a fresh environment holding the whole builtin
    /// library. Built once at startup, before any user expression runs.
    pub fn new_global_populated() -> Rc<RefCell<Environment>> {
        let env_ptr = Environment::new();
        {
            let mut env = env_ptr.borrow_mut();
            for &(name, func) in primitives::BUILTINS {
                env.add_primitive(name, func);
            }
            for (name, value) in primitives::constants() {
                env.define(name.to_string(), value);
            }
        }
        env_ptr
    }

    /// Creates a new environment enclosed within an outer one.
    pub fn new_enclosed(outer_env: Rc<RefCell<Environment>>) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Environment {
            outer: Some(outer_env),
            bindings: HashMap::new(),
        }))
    }

    /// A procedure-call frame: parameters bound pairwise to arguments, with
    /// the closure's captured environment as the outer frame. The caller
    /// checks arity first; the slices must be the same length.
    pub fn new_call_frame(
        params: &[String],
        args: Vec<Node>,
        outer_env: Rc<RefCell<Environment>>,
    ) -> Rc<RefCell<Self>> {
        debug_assert_eq!(params.len(), args.len());
        let frame = Environment::new_enclosed(outer_env);
        {
            let mut env = frame.borrow_mut();
            for (param, arg) in params.iter().zip(args) {
                env.define(param.clone(), arg);
            }
        }
        frame
    }

    /// Defines a variable in the *current* frame only, replacing any
    /// existing binding here. Never searches outward.
    pub fn define(&mut self, name: String, value_node: Node) {
        self.bindings.insert(name, value_node);
    }

    /// Looks up a variable: this frame first, then the outer chain.
    /// `lookup_span` is where the variable was referenced, for reporting.
    pub fn get(&self, name: &str, lookup_span: Span) -> Result<Node, EnvError> {
        if let Some(value_node) = self.bindings.get(name) {
            Ok(value_node.clone())
        } else {
            match &self.outer {
                Some(outer_env_ptr) => outer_env_ptr.borrow().get(name, lookup_span),
                None => Err(EnvError::UnboundVariable(name.to_string(), lookup_span)),
            }
        }
    }

    /// `set!`: overwrites an *existing* binding in the innermost frame that
    /// owns it. Never creates a new binding; errors if no frame in the
    /// chain owns `name`.
    pub fn set(&mut self, name: &str, value_node: Node, set_span: Span) -> Result<(), EnvError> {
        if let Some(value_mut) = self.bindings.get_mut(name) {
            *value_mut = value_node;
            Ok(())
        } else {
            match &self.outer {
                Some(outer_env_ptr) => outer_env_ptr.borrow_mut().set(name, value_node, set_span),
                None => Err(EnvError::UnboundVariable(name.to_string(), set_span)),
            }
        }
    }

    fn add_primitive(&mut self, name: &'static str, func: PrimitiveFunc) {
        let node = Node::new_primitive(func, name, Span::default());
        self.define(name.to_string(), node);
    }

    fn add_identifiers(&self, mut identifiers: HashSet<String>) -> HashSet<String> {
        for identifier in self.bindings.keys() {
            identifiers.insert(identifier.to_string());
        }
        match &self.outer {
            Some(outer_env_ptr) => outer_env_ptr.borrow().add_identifiers(identifiers),
            None => identifiers,
        }
    }

    /// Every identifier visible from this frame (used by REPL completion).
    pub fn get_identifiers(&self) -> HashSet<String> {
        self.add_identifiers(HashSet::new())
    }
}
