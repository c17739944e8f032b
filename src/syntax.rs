//! The contract between the parser and the evaluation core.
//!
//! The parser lives outside this crate; it only has to produce values
//! implementing [`Node`]. The three node types here cover what the core
//! itself needs: constants, variable references and calls.

use std::fmt;
use std::rc::Rc;

use crate::context::Context;
use crate::error::{Error, Result};
use crate::scope::{LookupOptions, DEFAULT};
use crate::value::Value;

/// An evaluable piece of syntax.
pub trait Node {
    fn eval(&self, ctx: &Context) -> Result<Value>;

    /// For variable references, the `(name, container)` they address.
    fn reference(&self) -> Option<(&str, &str)> {
        None
    }

    /// Short description used in error messages.
    fn describe(&self) -> String {
        "expression".to_string()
    }
}

pub type NodeRef = Rc<dyn Node>;

/// A call argument, optionally named.
#[derive(Clone)]
pub struct Argument {
    pub name: Option<String>,
    pub node: NodeRef,
}

impl Argument {
    pub fn positional(node: NodeRef) -> Self {
        Self { name: None, node }
    }

    pub fn named(name: &str, node: NodeRef) -> Self {
        Self {
            name: Some(name.to_string()),
            node,
        }
    }

    /// A positional argument holding an already computed value.
    pub fn value(value: Value) -> Self {
        Self::positional(LiteralNode::new(value))
    }
}

impl fmt::Debug for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Argument")
            .field("name", &self.name)
            .field("node", &self.node.describe())
            .finish()
    }
}

/// A constant.
pub struct LiteralNode(pub Value);

impl LiteralNode {
    pub fn new(value: Value) -> NodeRef {
        Rc::new(LiteralNode(value))
    }
}

impl Node for LiteralNode {
    fn eval(&self, _ctx: &Context) -> Result<Value> {
        Ok(self.0.clone())
    }

    fn describe(&self) -> String {
        format!("literal {}", self.0.type_name())
    }
}

/// A reference to a named binding.
pub struct VariableNode {
    pub name: String,
    pub container: String,
}

impl VariableNode {
    pub fn new(name: &str) -> NodeRef {
        Self::in_container(name, DEFAULT)
    }

    pub fn in_container(name: &str, container: &str) -> NodeRef {
        Rc::new(VariableNode {
            name: name.to_string(),
            container: container.to_string(),
        })
    }
}

impl Node for VariableNode {
    fn eval(&self, ctx: &Context) -> Result<Value> {
        ctx.symbols()
            .lookup(&self.name, &LookupOptions::in_container(&self.container))
    }

    fn reference(&self) -> Option<(&str, &str)> {
        Some((self.name.as_str(), self.container.as_str()))
    }

    fn describe(&self) -> String {
        format!("variable '{}'", self.name)
    }
}

/// A call: evaluates the callee and hands it the raw argument nodes.
pub struct CallNode {
    pub callee: NodeRef,
    pub arguments: Vec<Argument>,
}

impl CallNode {
    pub fn new(callee: NodeRef, arguments: Vec<Argument>) -> NodeRef {
        Rc::new(CallNode { callee, arguments })
    }

    /// Call a function bound to `name` in the default container.
    pub fn named(name: &str, arguments: Vec<Argument>) -> NodeRef {
        Self::new(VariableNode::new(name), arguments)
    }
}

impl Node for CallNode {
    fn eval(&self, ctx: &Context) -> Result<Value> {
        match self.callee.eval(ctx)? {
            Value::Callable(callable) => callable.call(ctx, &self.arguments),
            other => Err(Error::runtime(format!(
                "{} is not callable (found {})",
                self.callee.describe(),
                other.type_name()
            ))),
        }
    }

    fn describe(&self) -> String {
        format!("call to {}", self.callee.describe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_evaluates_to_itself() {
        let ctx = Context::new();
        let node = LiteralNode::new(Value::Int(5));
        assert_eq!(node.eval(&ctx).unwrap(), Value::Int(5));
        assert!(node.reference().is_none());
    }

    #[test]
    fn variable_reads_scope_and_exposes_reference() {
        let ctx = Context::new();
        ctx.assign("x", Value::Int(2)).unwrap();
        let node = VariableNode::new("x");
        assert_eq!(node.eval(&ctx).unwrap(), Value::Int(2));
        assert_eq!(node.reference(), Some(("x", "")));
        assert_eq!(
            VariableNode::new("missing").eval(&ctx),
            Err(Error::lookup("missing", ""))
        );
    }

    #[test]
    fn calling_a_non_callable_fails() {
        let ctx = Context::new();
        ctx.assign("x", Value::Int(2)).unwrap();
        let err = CallNode::named("x", Vec::new()).eval(&ctx).unwrap_err();
        assert!(matches!(err, Error::Runtime(_)));
    }
}
