//! Scope integration tests — contexts, script functions, host functions and
//! references working against one shared scope tree.

use std::rc::Rc;

use musikla::callable::ScriptFunction;
use musikla::context::Context;
use musikla::error::Error;
use musikla::library;
use musikla::scope::{EnumerateOptions, LookupOptions, UsingTarget, DEFAULT, INSTRUMENTS};
use musikla::syntax::{Argument, CallNode, LiteralNode, Node, NodeRef, VariableNode};
use musikla::value::Value;

fn root() -> Context {
    let ctx = Context::new();
    library::install(&ctx).expect("install standard library");
    ctx
}

fn call(ctx: &Context, name: &str, args: Vec<Argument>) -> musikla::Result<Value> {
    CallNode::named(name, args).eval(ctx)
}

fn var(name: &str) -> Argument {
    Argument::positional(VariableNode::new(name))
}

/// `name = value` evaluated in whatever context runs it.
struct Assign {
    name: String,
    value: NodeRef,
}

impl Node for Assign {
    fn eval(&self, ctx: &Context) -> musikla::Result<Value> {
        let value = self.value.eval(ctx)?;
        ctx.assign(&self.name, value)?;
        Ok(Value::None)
    }
}

/// Evaluates each statement in order, returning the last value.
struct Block(Vec<NodeRef>);

impl Node for Block {
    fn eval(&self, ctx: &Context) -> musikla::Result<Value> {
        let mut last = Value::None;
        for node in &self.0 {
            last = node.eval(ctx)?;
        }
        Ok(last)
    }
}

fn assign(name: &str, value: Value) -> NodeRef {
    Rc::new(Assign {
        name: name.to_string(),
        value: LiteralNode::new(value),
    })
}

// =============================================================================
// using / setvar redirect writes into enclosing scopes
// =============================================================================

#[test]
fn using_inside_a_function_body_writes_the_global() {
    let ctx = root();
    ctx.assign("counter", Value::Int(0)).unwrap();

    let body: NodeRef = Rc::new(Block(vec![
        CallNode::named("using", vec![var("counter")]),
        assign("counter", Value::Int(7)),
    ]));
    let bump = ScriptFunction::new("bump", &[], body, &ctx);
    ctx.assign("bump", Value::callable(bump)).unwrap();

    call(&ctx, "bump", vec![]).unwrap();
    assert_eq!(ctx.lookup("counter").unwrap(), Value::Int(7));
}

#[test]
fn function_locals_do_not_leak_without_using() {
    let ctx = root();
    ctx.assign("counter", Value::Int(0)).unwrap();

    let body = assign("counter", Value::Int(7));
    let shadow = ScriptFunction::new("shadow", &[], body, &ctx);
    ctx.assign("shadow", Value::callable(shadow)).unwrap();

    call(&ctx, "shadow", vec![]).unwrap();
    assert_eq!(ctx.lookup("counter").unwrap(), Value::Int(0));
}

#[test]
fn setvar_reaches_through_nested_forks() {
    let ctx = root();
    ctx.assign("level", Value::Int(1)).unwrap();
    let inner = ctx.fork().fork().fork();
    call(&inner, "setvar", vec![var("level"), Argument::value(Value::Int(5))]).unwrap();
    assert_eq!(ctx.lookup("level").unwrap(), Value::Int(5));
}

#[test]
fn aliases_chain_across_three_scopes() {
    let ctx = root();
    ctx.assign("tempo", Value::Int(120)).unwrap();
    let middle = ctx.fork();
    middle
        .symbols()
        .using(UsingTarget::from("tempo"), Some("bpm"), DEFAULT, false, false)
        .unwrap();
    let leaf = middle.fork();
    leaf.symbols()
        .using(UsingTarget::from("bpm"), None, DEFAULT, false, false)
        .unwrap();

    leaf.assign("bpm", Value::Int(90)).unwrap();
    assert_eq!(ctx.lookup("tempo").unwrap(), Value::Int(90));
    assert_eq!(middle.lookup("bpm").unwrap(), Value::Int(90));
}

#[test]
fn sibling_scopes_using_the_same_binding_see_each_others_writes() {
    let ctx = root();
    ctx.assign("tempo", Value::Int(120)).unwrap();
    let left = ctx.fork();
    let right = ctx.fork();
    call(&left, "using", vec![var("tempo")]).unwrap();
    call(&right, "using", vec![var("tempo")]).unwrap();

    left.assign("tempo", Value::Int(90)).unwrap();
    assert_eq!(right.lookup("tempo").unwrap(), Value::Int(90));

    let through_left = left.symbols().reference("tempo", DEFAULT).unwrap();
    through_left.set(Value::Int(140)).unwrap();
    assert_eq!(right.lookup("tempo").unwrap(), Value::Int(140));
    assert_eq!(ctx.lookup("tempo").unwrap(), Value::Int(140));
}

#[test]
fn unresolved_using_is_a_lookup_error() {
    let ctx = root();
    let inner = ctx.fork();
    let err = call(&inner, "using", vec![var("nowhere")]).unwrap_err();
    assert_eq!(err, Error::lookup("nowhere", ""));
}

// =============================================================================
// References
// =============================================================================

#[test]
fn reference_observes_later_rebinding() {
    let ctx = root();
    ctx.assign("x", Value::Int(1)).unwrap();
    let r = ctx.fork().symbols().reference("x", DEFAULT).unwrap();
    ctx.assign("x", Value::Int(2)).unwrap();
    assert_eq!(r.get().unwrap(), Value::Int(2));
    r.set(Value::Int(3)).unwrap();
    assert_eq!(ctx.lookup("x").unwrap(), Value::Int(3));
}

#[test]
fn reference_to_released_scope_is_stale() {
    let ctx = root();
    let block = ctx.fork();
    block.symbols().assign("temp", Value::Int(1), DEFAULT, true).unwrap();
    let r = block.symbols().reference("temp", DEFAULT).unwrap();
    let live = ctx.symbols().live_scopes();

    drop(block);
    assert_eq!(ctx.symbols().live_scopes(), live - 1);
    assert_eq!(
        r.get().unwrap_err(),
        Error::StalePointer {
            name: "temp".to_string()
        }
    );
}

#[test]
fn unfollowed_pointer_lookup_returns_a_ref() {
    let ctx = root();
    ctx.assign("x", Value::Int(4)).unwrap();
    let inner = ctx.fork();
    call(&inner, "using", vec![var("x")]).unwrap();

    let options = LookupOptions {
        follow_pointers: false,
        ..LookupOptions::default()
    };
    let Value::Ref(r) = inner.symbols().lookup("x", &options).unwrap() else {
        panic!("expected a reference");
    };
    assert_eq!(r.get().unwrap(), Value::Int(4));
}

// =============================================================================
// Containers and enumeration
// =============================================================================

#[test]
fn containers_are_independent_namespaces() {
    let ctx = root();
    ctx.symbols()
        .assign("piano", Value::Int(1), INSTRUMENTS, true)
        .unwrap();
    assert!(ctx.lookup("piano").is_err());
    let found = ctx
        .fork()
        .symbols()
        .lookup("piano", &LookupOptions::in_container(INSTRUMENTS))
        .unwrap();
    assert_eq!(found, Value::Int(1));
}

#[test]
fn enumeration_lists_nearest_binding_once() {
    let ctx = Context::new();
    ctx.assign("a", Value::Int(1)).unwrap();
    ctx.assign("b", Value::Int(2)).unwrap();
    let inner = ctx.fork();
    inner.symbols().assign("a", Value::Int(10), DEFAULT, true).unwrap();

    let mut seen: Vec<(String, Value)> = inner
        .symbols()
        .enumerate(EnumerateOptions::default())
        .collect();
    seen.sort_by(|x, y| x.0.cmp(&y.0));
    assert_eq!(
        seen,
        vec![
            ("a".to_string(), Value::Int(10)),
            ("b".to_string(), Value::Int(2)),
        ]
    );
}
