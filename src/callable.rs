//! Invocable values and the host-function binding adapter.
//!
//! Every callable receives the caller's [`Context`] and the *unevaluated*
//! argument nodes. A [`HostFunction`] binds those nodes to its declared
//! [`Parameter`]s according to each parameter's [`ParamRole`]: inject the
//! context, pass a reference, pass the raw node, or evaluate and type-check.

use std::fmt;
use std::rc::Rc;

use tracing::trace;

use crate::context::{Context, ForkOptions};
use crate::error::{Error, Result};
use crate::scope::{Ref, DEFAULT};
use crate::syntax::{Argument, LiteralNode, NodeRef};
use crate::value::{Value, ValueType};

/// Anything a script can call.
pub trait Callable {
    fn name(&self) -> &str;

    fn call(&self, ctx: &Context, args: &[Argument]) -> Result<Value>;
}

type RawFn = dyn Fn(&Context, &[Argument]) -> Result<Value>;

/// A callable over raw argument nodes, with no binding applied.
#[derive(Clone)]
pub struct CallableValue {
    name: String,
    func: Rc<RawFn>,
}

impl CallableValue {
    pub fn new(
        name: &str,
        func: impl Fn(&Context, &[Argument]) -> Result<Value> + 'static,
    ) -> Self {
        Self {
            name: name.to_string(),
            func: Rc::new(func),
        }
    }
}

impl Callable for CallableValue {
    fn name(&self) -> &str {
        &self.name
    }

    fn call(&self, ctx: &Context, args: &[Argument]) -> Result<Value> {
        (self.func)(ctx, args)
    }
}

/// A function defined in script: parameter names, a body, and the context
/// it was defined in.
///
/// The body runs with the caller's cursor and voice, in a scope forked from
/// the definition scope; the caller's cursor is then joined to the body's.
pub struct ScriptFunction {
    name: String,
    parameters: Vec<String>,
    body: NodeRef,
    closure: Context,
}

impl ScriptFunction {
    pub fn new(name: &str, parameters: &[&str], body: NodeRef, closure: &Context) -> Self {
        Self {
            name: name.to_string(),
            parameters: parameters.iter().map(|p| p.to_string()).collect(),
            body,
            closure: closure.clone(),
        }
    }
}

impl Callable for ScriptFunction {
    fn name(&self) -> &str {
        &self.name
    }

    fn call(&self, ctx: &Context, args: &[Argument]) -> Result<Value> {
        if args.len() > self.parameters.len() {
            return Err(Error::arity(
                &self.name,
                format!(
                    "takes {} arguments but {} were given",
                    self.parameters.len(),
                    args.len()
                ),
            ));
        }

        let body_ctx = ctx.fork_with(ForkOptions {
            symbols: Some(self.closure.symbols().clone()),
            ..ForkOptions::default()
        });
        for (index, parameter) in self.parameters.iter().enumerate() {
            let arg = args
                .iter()
                .find(|a| a.name.as_deref() == Some(parameter.as_str()))
                .or_else(|| args.iter().filter(|a| a.name.is_none()).nth(index));
            let value = match arg {
                Some(arg) => arg.node.eval(&ctx.fork())?,
                None => Value::None,
            };
            body_ctx.symbols().assign(parameter, value, DEFAULT, true)?;
        }

        let result = self.body.eval(&body_ctx)?;
        ctx.join_context(&body_ctx);
        Ok(result)
    }
}

/// How a host parameter receives its argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamRole {
    /// The caller's context, consuming no argument.
    Context,
    /// A reference to the variable the argument names.
    Ref,
    /// The argument's syntax node, unevaluated.
    Node,
    /// The evaluated argument, checked against a type.
    Value(ValueType),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Positional,
    /// Takes every remaining positional argument.
    VarPositional,
    /// Takes every keyword argument not matching another parameter.
    VarKeyword,
}

/// One declared parameter of a host function.
#[derive(Debug, Clone)]
pub struct Parameter {
    pub name: String,
    pub role: ParamRole,
    pub kind: ParamKind,
    pub default: Option<Value>,
}

impl Parameter {
    fn new(name: &str, role: ParamRole) -> Self {
        Self {
            name: name.to_string(),
            role,
            kind: ParamKind::Positional,
            default: None,
        }
    }

    pub fn context(name: &str) -> Self {
        Self::new(name, ParamRole::Context)
    }

    pub fn reference(name: &str) -> Self {
        Self::new(name, ParamRole::Ref)
    }

    pub fn node(name: &str) -> Self {
        Self::new(name, ParamRole::Node)
    }

    pub fn value(name: &str, ty: ValueType) -> Self {
        Self::new(name, ParamRole::Value(ty))
    }

    /// Make the parameter optional.
    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn variadic(mut self) -> Self {
        self.kind = ParamKind::VarPositional;
        self
    }

    pub fn keywords(mut self) -> Self {
        self.kind = ParamKind::VarKeyword;
        self
    }
}

/// A bound argument.
#[derive(Clone)]
pub enum Bound {
    Context(Context),
    Ref(Ref),
    Node(NodeRef),
    Value(Value),
    /// Everything a variadic positional parameter took.
    Many(Vec<Bound>),
    /// Everything a variadic keyword parameter took.
    Keywords(Vec<(String, Bound)>),
}

impl Bound {
    fn kind(&self) -> &'static str {
        match self {
            Bound::Context(_) => "context",
            Bound::Ref(_) => "ref",
            Bound::Node(_) => "node",
            Bound::Value(v) => v.type_name(),
            Bound::Many(_) => "variadic",
            Bound::Keywords(_) => "keywords",
        }
    }
}

/// Arguments bound to a host function's parameters, accessed by name.
pub struct BoundArgs {
    function: String,
    caller: Context,
    values: Vec<(String, Bound)>,
}

impl BoundArgs {
    pub fn get(&self, name: &str) -> Option<&Bound> {
        self.values
            .iter()
            .find(|(param, _)| param == name)
            .map(|(_, bound)| bound)
    }

    fn require(&self, name: &str) -> Result<&Bound> {
        self.get(name)
            .ok_or_else(|| Error::arity(&self.function, format!("no parameter '{name}'")))
    }

    fn mismatch(&self, name: &str, expected: &str, found: &Bound) -> Error {
        Error::binding(&self.function, name, expected, found.kind())
    }

    pub fn context(&self, name: &str) -> Result<&Context> {
        match self.require(name)? {
            Bound::Context(ctx) => Ok(ctx),
            other => Err(self.mismatch(name, "context", other)),
        }
    }

    pub fn reference(&self, name: &str) -> Result<&Ref> {
        match self.require(name)? {
            Bound::Ref(r) => Ok(r),
            other => Err(self.mismatch(name, "ref", other)),
        }
    }

    pub fn node(&self, name: &str) -> Result<&NodeRef> {
        match self.require(name)? {
            Bound::Node(node) => Ok(node),
            other => Err(self.mismatch(name, "node", other)),
        }
    }

    pub fn value(&self, name: &str) -> Result<&Value> {
        match self.require(name)? {
            Bound::Value(value) => Ok(value),
            other => Err(self.mismatch(name, "value", other)),
        }
    }

    pub fn int(&self, name: &str) -> Result<i64> {
        let value = self.value(name)?;
        value
            .as_int()
            .ok_or_else(|| Error::binding(&self.function, name, "int", value.type_name()))
    }

    pub fn float(&self, name: &str) -> Result<f64> {
        let value = self.value(name)?;
        value
            .as_float()
            .ok_or_else(|| Error::binding(&self.function, name, "number", value.type_name()))
    }

    /// Items taken by a variadic positional parameter.
    pub fn many(&self, name: &str) -> Result<&[Bound]> {
        match self.require(name)? {
            Bound::Many(items) => Ok(items),
            other => Err(self.mismatch(name, "variadic", other)),
        }
    }

    /// Items taken by a variadic keyword parameter.
    pub fn keywords(&self, name: &str) -> Result<&[(String, Bound)]> {
        match self.require(name)? {
            Bound::Keywords(items) => Ok(items),
            other => Err(self.mismatch(name, "keywords", other)),
        }
    }

    /// A callable argument wrapped so the host can invoke it later with plain values.
    pub fn closure(&self, name: &str) -> Result<HostClosure> {
        match self.value(name)? {
            Value::Callable(callable) => Ok(HostClosure::new(Rc::clone(callable), &self.caller)),
            other => Err(Error::binding(&self.function, name, "callable", other.type_name())),
        }
    }
}

type HostFn = dyn Fn(&BoundArgs) -> Result<Value>;

/// A host-native function exposed to scripts through a declared signature.
#[derive(Clone)]
pub struct HostFunction {
    name: String,
    parameters: Vec<Parameter>,
    func: Rc<HostFn>,
}

impl HostFunction {
    pub fn new(
        name: &str,
        parameters: Vec<Parameter>,
        func: impl Fn(&BoundArgs) -> Result<Value> + 'static,
    ) -> Self {
        Self {
            name: name.to_string(),
            parameters,
            func: Rc::new(func),
        }
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    /// Bind raw argument nodes to the declared parameters.
    pub fn bind(&self, ctx: &Context, args: &[Argument]) -> Result<BoundArgs> {
        let mut positional = args.iter().filter(|a| a.name.is_none()).peekable();
        let mut keywords: Vec<&Argument> = args.iter().filter(|a| a.name.is_some()).collect();
        let mut values = Vec::with_capacity(self.parameters.len());

        for param in &self.parameters {
            let bound = match param.kind {
                ParamKind::Positional if param.role == ParamRole::Context => {
                    Bound::Context(ctx.clone())
                }
                ParamKind::Positional => {
                    let keyword = keywords
                        .iter()
                        .position(|a| a.name.as_deref() == Some(param.name.as_str()))
                        .map(|i| keywords.remove(i));
                    match keyword.or_else(|| positional.next()) {
                        Some(arg) => self.bind_one(ctx, param, &arg.node)?,
                        None => match &param.default {
                            Some(default) => Bound::Value(default.clone()),
                            None => {
                                return Err(Error::arity(
                                    &self.name,
                                    format!("missing argument '{}'", param.name),
                                ))
                            }
                        },
                    }
                }
                ParamKind::VarPositional => {
                    let mut items = Vec::new();
                    for arg in positional.by_ref() {
                        items.push(self.bind_one(ctx, param, &arg.node)?);
                    }
                    Bound::Many(items)
                }
                ParamKind::VarKeyword => {
                    let mut items = Vec::new();
                    for arg in keywords.drain(..) {
                        let name = arg.name.clone().unwrap_or_default();
                        items.push((name, self.bind_one(ctx, param, &arg.node)?));
                    }
                    Bound::Keywords(items)
                }
            };
            values.push((param.name.clone(), bound));
        }

        if positional.peek().is_some() {
            return Err(Error::arity(
                &self.name,
                format!(
                    "takes {} positional arguments but {} were given",
                    self.parameters
                        .iter()
                        .filter(|p| p.kind == ParamKind::Positional && p.role != ParamRole::Context)
                        .count(),
                    args.iter().filter(|a| a.name.is_none()).count()
                ),
            ));
        }
        if let Some(unexpected) = keywords.first() {
            return Err(Error::arity(
                &self.name,
                format!(
                    "unexpected keyword argument '{}'",
                    unexpected.name.as_deref().unwrap_or_default()
                ),
            ));
        }

        Ok(BoundArgs {
            function: self.name.clone(),
            caller: ctx.clone(),
            values,
        })
    }

    fn bind_one(&self, ctx: &Context, param: &Parameter, node: &NodeRef) -> Result<Bound> {
        match param.role {
            ParamRole::Context => Ok(Bound::Context(ctx.clone())),
            ParamRole::Node => Ok(Bound::Node(Rc::clone(node))),
            ParamRole::Ref => {
                let Some((name, container)) = node.reference() else {
                    return Err(Error::binding(
                        &self.name,
                        &param.name,
                        "variable reference",
                        node.describe(),
                    ));
                };
                Ok(Bound::Ref(ctx.symbols().reference(name, container)?))
            }
            ParamRole::Value(ty) => {
                let value = node.eval(&ctx.fork())?;
                if !ty.accepts(&value) {
                    return Err(Error::binding(
                        &self.name,
                        &param.name,
                        ty.name(),
                        value.type_name(),
                    ));
                }
                Ok(Bound::Value(value))
            }
        }
    }
}

impl Callable for HostFunction {
    fn name(&self) -> &str {
        &self.name
    }

    fn call(&self, ctx: &Context, args: &[Argument]) -> Result<Value> {
        let bound = self.bind(ctx, args)?;
        trace!(function = %self.name, arguments = bound.values.len(), "host call");
        (self.func)(&bound)
    }
}

impl fmt::Debug for HostFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostFunction")
            .field("name", &self.name)
            .field("parameters", &self.parameters)
            .finish()
    }
}

/// A script callable captured together with a context, so host code can
/// invoke it later with plain values.
#[derive(Clone)]
pub struct HostClosure {
    callable: Rc<dyn Callable>,
    ctx: Context,
}

impl HostClosure {
    pub fn new(callable: Rc<dyn Callable>, ctx: &Context) -> Self {
        Self {
            callable,
            ctx: ctx.clone(),
        }
    }

    pub fn invoke(&self, args: impl IntoIterator<Item = Value>) -> Result<Value> {
        let args: Vec<Argument> = args
            .into_iter()
            .map(|value| Argument::positional(LiteralNode::new(value)))
            .collect();
        self.callable.call(&self.ctx, &args)
    }
}

impl Callable for HostClosure {
    fn name(&self) -> &str {
        self.callable.name()
    }

    fn call(&self, ctx: &Context, args: &[Argument]) -> Result<Value> {
        self.callable.call(ctx, args)
    }
}
