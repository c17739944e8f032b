//! Standard host functions available to every script.

use std::rc::Rc;

use crate::callable::{Bound, BoundArgs, Callable, HostFunction, Parameter};
use crate::context::Context;
use crate::error::{Error, Result};
use crate::event::MusicEvent;
use crate::music::Music;
use crate::scope::{UsingTarget, DEFAULT};
use crate::value::{Value, ValueType};

/// Register the standard functions in `ctx`'s scope.
pub fn install(ctx: &Context) -> Result<()> {
    for function in functions() {
        let name = function.name().to_string();
        ctx.symbols()
            .assign(&name, Value::callable(function), DEFAULT, true)?;
    }
    Ok(())
}

/// Every standard function, unregistered.
pub fn functions() -> Vec<HostFunction> {
    vec![
        using(),
        setvar(),
        gettime(),
        settime(),
        seek(),
        cc(),
        len(),
        slice(),
        discard(),
        play(),
        setvoice(),
        modulo(),
        floor_div(),
    ]
}

/// `using(var)`: alias an enclosing binding in the caller's scope.
fn using() -> HostFunction {
    HostFunction::new(
        "using",
        vec![Parameter::context("ctx"), Parameter::node("var")],
        |args| {
            let ctx = args.context("ctx")?;
            let node = args.node("var")?;
            let Some((name, container)) = node.reference() else {
                return Err(Error::binding(
                    "using",
                    "var",
                    "variable reference",
                    node.describe(),
                ));
            };
            ctx.symbols()
                .using(UsingTarget::Name(name.to_string()), None, container, false, false)?;
            Ok(Value::None)
        },
    )
}

/// `setvar(var, value)`: assign through a reference.
fn setvar() -> HostFunction {
    HostFunction::new(
        "setvar",
        vec![
            Parameter::reference("var"),
            Parameter::value("value", ValueType::Any),
        ],
        |args| {
            args.reference("var")?.set(args.value("value")?.clone())?;
            Ok(Value::None)
        },
    )
}

fn gettime() -> HostFunction {
    HostFunction::new("gettime", vec![Parameter::context("ctx")], |args| {
        Ok(Value::Int(args.context("ctx")?.cursor()))
    })
}

fn settime() -> HostFunction {
    HostFunction::new(
        "settime",
        vec![
            Parameter::context("ctx"),
            Parameter::value("time", ValueType::Int),
        ],
        |args| {
            args.context("ctx")?.set_cursor(args.int("time")?);
            Ok(Value::None)
        },
    )
}

/// `seek(ticks)`: move the cursor by an amount evaluated in the caller's context.
fn seek() -> HostFunction {
    HostFunction::new(
        "seek",
        vec![Parameter::context("ctx"), Parameter::node("time")],
        |args| {
            let ctx = args.context("ctx")?;
            let amount = args.node("time")?.eval(ctx)?;
            let ticks = amount
                .as_int()
                .ok_or_else(|| Error::binding("seek", "time", "int", amount.type_name()))?;
            ctx.set_cursor(ctx.cursor() + ticks);
            Ok(Value::None)
        },
    )
}

/// `cc(control, value)`: a control change at the cursor, in the current voice.
fn cc() -> HostFunction {
    HostFunction::new(
        "cc",
        vec![
            Parameter::context("ctx"),
            Parameter::value("control", ValueType::Int),
            Parameter::value("value", ValueType::Int),
        ],
        |args| {
            let ctx = args.context("ctx")?;
            let control = midi_byte("control", args.int("control")?)?;
            let value = midi_byte("value", args.int("value")?)?;
            let event = MusicEvent::control_change(ctx.cursor(), control, value)
                .with_voice(ctx.voice());
            Ok(Value::Music(Music::from_events(vec![event])))
        },
    )
}

fn midi_byte(parameter: &str, n: i64) -> Result<u8> {
    u8::try_from(n)
        .ok()
        .filter(|b| *b < 128)
        .ok_or_else(|| Error::binding("cc", parameter, "0..=127", n.to_string()))
}

/// `len(obj)`: note-value length of music, element count otherwise.
fn len() -> HostFunction {
    HostFunction::new(
        "len",
        vec![
            Parameter::context("ctx"),
            Parameter::value("obj", ValueType::Any),
        ],
        |args| {
            let ctx = args.context("ctx")?;
            match args.value("obj")? {
                Value::Music(music) => Ok(Value::Fraction(music.len(ctx)?)),
                Value::Str(s) => Ok(Value::Int(s.chars().count() as i64)),
                Value::List(items) => Ok(Value::Int(items.len() as i64)),
                other => Err(Error::binding("len", "obj", "music, str or list", other.type_name())),
            }
        },
    )
}

/// `slice(music, start, end)`: events starting within `[start, end]`.
fn slice() -> HostFunction {
    HostFunction::new(
        "slice",
        vec![
            Parameter::value("notes", ValueType::Music),
            Parameter::value("start", ValueType::Int),
            Parameter::value("end", ValueType::Int),
        ],
        |args| {
            let Value::Music(music) = args.value("notes")? else {
                return Err(Error::invariant("slice(): music parameter not bound to music"));
            };
            let (start, end) = (args.int("start")?, args.int("end")?);
            Ok(Value::Music(
                music.filter(move |event, _, _| event.timestamp >= start && event.timestamp <= end),
            ))
        },
    )
}

/// `discard(expr...)`: evaluate each expression in a fork and drain any music it yields.
fn discard() -> HostFunction {
    HostFunction::new(
        "discard",
        vec![Parameter::context("ctx"), Parameter::node("expr").variadic()],
        |args| {
            let ctx = args.context("ctx")?;
            for bound in args.many("expr")? {
                let Bound::Node(node) = bound else {
                    continue;
                };
                let fork = ctx.fork();
                if let Value::Music(music) = node.eval(&fork)? {
                    for event in music.expand(&fork) {
                        event?;
                    }
                }
            }
            Ok(Value::None)
        },
    )
}

/// `play(expr)`: the music an expression evaluates to, or empty music.
fn play() -> HostFunction {
    HostFunction::new(
        "play",
        vec![Parameter::context("ctx"), Parameter::node("expr")],
        |args| {
            let ctx = args.context("ctx")?;
            match args.node("expr")?.eval(ctx)? {
                Value::Music(music) => Ok(Value::Music(music)),
                _ => Ok(Value::Music(Music::empty())),
            }
        },
    )
}

fn setvoice() -> HostFunction {
    HostFunction::new(
        "setvoice",
        vec![
            Parameter::context("ctx"),
            Parameter::value("voice", ValueType::Voice),
        ],
        |args| {
            let Value::Voice(voice) = args.value("voice")? else {
                return Err(Error::invariant("setvoice(): voice parameter not bound to a voice"));
            };
            args.context("ctx")?.set_voice(Rc::clone(voice));
            Ok(Value::None)
        },
    )
}

fn numbers(args: &BoundArgs) -> Result<(Value, Value)> {
    Ok((args.value("n")?.clone(), args.value("d")?.clone()))
}

/// `mod(n, d)`: remainder with the sign of the divisor.
fn modulo() -> HostFunction {
    HostFunction::new(
        "mod",
        vec![
            Parameter::value("n", ValueType::Number),
            Parameter::value("d", ValueType::Number),
        ],
        |args| match numbers(args)? {
            (Value::Int(_), Value::Int(0)) => Err(Error::runtime("mod(): division by zero")),
            (Value::Int(n), Value::Int(d)) => {
                let r = n.wrapping_rem(d);
                let floored = if r != 0 && ((r < 0) != (d < 0)) { r + d } else { r };
                Ok(Value::Int(floored))
            }
            (n, d) => {
                let (n, d) = (as_f64(&n)?, as_f64(&d)?);
                if d == 0.0 {
                    return Err(Error::runtime("mod(): division by zero"));
                }
                Ok(Value::Float(n - d * (n / d).floor()))
            }
        },
    )
}

/// `div(n, d)`: floored division.
fn floor_div() -> HostFunction {
    HostFunction::new(
        "div",
        vec![
            Parameter::value("n", ValueType::Number),
            Parameter::value("d", ValueType::Number),
        ],
        |args| match numbers(args)? {
            (Value::Int(_), Value::Int(0)) => Err(Error::runtime("div(): division by zero")),
            (Value::Int(n), Value::Int(d)) => {
                let q = n.wrapping_div(d);
                let floored = if n.wrapping_rem(d) != 0 && ((n < 0) != (d < 0)) {
                    q - 1
                } else {
                    q
                };
                Ok(Value::Int(floored))
            }
            (n, d) => {
                let (n, d) = (as_f64(&n)?, as_f64(&d)?);
                if d == 0.0 {
                    return Err(Error::runtime("div(): division by zero"));
                }
                Ok(Value::Float((n / d).floor()))
            }
        },
    )
}

fn as_f64(value: &Value) -> Result<f64> {
    value
        .as_float()
        .ok_or_else(|| Error::runtime(format!("expected a number, found {}", value.type_name())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::{Argument, CallNode, VariableNode};
    use crate::voice::Voice;
    use fraction::Fraction;

    fn setup() -> Context {
        let ctx = Context::new();
        install(&ctx).unwrap();
        ctx
    }

    fn call(ctx: &Context, name: &str, args: Vec<Argument>) -> Result<Value> {
        CallNode::named(name, args).eval(ctx)
    }

    fn int(n: i64) -> Argument {
        Argument::value(Value::Int(n))
    }

    #[test]
    fn time_functions() {
        let ctx = setup();
        call(&ctx, "settime", vec![int(480)]).unwrap();
        assert_eq!(call(&ctx, "gettime", vec![]).unwrap(), Value::Int(480));
        call(&ctx, "seek", vec![int(-80)]).unwrap();
        assert_eq!(ctx.cursor(), 400);
    }

    #[test]
    fn setvar_writes_through_reference() {
        let ctx = setup();
        ctx.assign("x", Value::Int(1)).unwrap();
        let block = ctx.fork();
        call(
            &block,
            "setvar",
            vec![Argument::positional(VariableNode::new("x")), int(2)],
        )
        .unwrap();
        assert_eq!(ctx.lookup("x").unwrap(), Value::Int(2));
    }

    #[test]
    fn using_aliases_enclosing_binding() {
        let ctx = setup();
        ctx.assign("tempo", Value::Int(120)).unwrap();
        let inner = ctx.fork();
        call(&inner, "using", vec![Argument::positional(VariableNode::new("tempo"))]).unwrap();
        inner.assign("tempo", Value::Int(90)).unwrap();
        assert_eq!(ctx.lookup("tempo").unwrap(), Value::Int(90));

        let err = call(&inner, "using", vec![int(1)]).unwrap_err();
        assert!(matches!(err, Error::Binding { .. }));
    }

    #[test]
    fn cc_builds_music_at_cursor() {
        let ctx = Context::with_voice(Voice::new("synth"));
        install(&ctx).unwrap();
        ctx.join(960);
        let Value::Music(music) = call(&ctx, "cc", vec![int(7), int(100)]).unwrap() else {
            panic!("cc should return music");
        };
        let events: Vec<MusicEvent> = music
            .expand(&Context::new())
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].timestamp, 960);
        assert_eq!(events[0].voice_name(), Some("synth"));

        assert!(call(&ctx, "cc", vec![int(7), int(300)]).is_err());
    }

    #[test]
    fn len_of_music_and_list() {
        let ctx = setup();
        let music = Music::from_events(vec![MusicEvent::rest(0, 960, true)]);
        let result = call(&ctx, "len", vec![Argument::value(Value::Music(music))]).unwrap();
        assert_eq!(result, Value::Fraction(Fraction::new(1u64, 4u64)));
        let list = Value::list(vec![Value::None, Value::None]);
        assert_eq!(call(&ctx, "len", vec![Argument::value(list)]).unwrap(), Value::Int(2));
        assert_eq!(
            call(&ctx, "len", vec![Argument::value(Value::Music(Music::empty()))]).unwrap(),
            Value::Fraction(Fraction::new(0u64, 1u64))
        );
    }

    #[test]
    fn play_returns_empty_music_for_other_values() {
        let ctx = setup();
        let result = call(&ctx, "play", vec![int(3)]).unwrap();
        let Value::Music(music) = result else {
            panic!("play should return music");
        };
        assert_eq!(music.expand(&ctx).count(), 0);
    }

    #[test]
    fn discard_drains_in_a_fork() {
        let ctx = setup();
        let music = Music::from_events(vec![MusicEvent::rest(0, 960, true)]);
        ctx.assign("m", Value::Music(music)).unwrap();
        call(&ctx, "discard", vec![Argument::positional(VariableNode::new("m"))]).unwrap();
        assert_eq!(ctx.cursor(), 0);
    }

    #[test]
    fn setvoice_changes_context_voice() {
        let ctx = setup();
        call(&ctx, "setvoice", vec![Argument::value(Value::from(Voice::new("organ")))]).unwrap();
        assert_eq!(ctx.voice().name, "organ");
    }

    #[test]
    fn floored_mod_and_div() {
        let ctx = setup();
        let cases = [(7, 3, 1, 2), (-7, 3, 2, -3), (7, -3, -2, -3), (-7, -3, -1, 2)];
        for (n, d, m, q) in cases {
            assert_eq!(call(&ctx, "mod", vec![int(n), int(d)]).unwrap(), Value::Int(m), "{n} mod {d}");
            assert_eq!(call(&ctx, "div", vec![int(n), int(d)]).unwrap(), Value::Int(q), "{n} div {d}");
        }
        let half = call(
            &ctx,
            "mod",
            vec![Argument::value(Value::Float(5.5)), int(2)],
        )
        .unwrap();
        assert_eq!(half, Value::Float(1.5));
        assert!(call(&ctx, "div", vec![int(1), int(0)]).is_err());
    }

    #[test]
    fn slice_filters_by_start_time() {
        let ctx = setup();
        let music = Music::from_events(vec![
            MusicEvent::rest(0, 10, true),
            MusicEvent::rest(10, 10, true),
            MusicEvent::rest(20, 10, true),
        ]);
        let result = call(
            &ctx,
            "slice",
            vec![Argument::value(Value::Music(music)), int(5), int(20)],
        )
        .unwrap();
        let Value::Music(sliced) = result else {
            panic!("slice should return music");
        };
        let stamps: Vec<i64> = sliced
            .expand(&Context::new())
            .map(|e| e.unwrap().timestamp)
            .collect();
        assert_eq!(stamps, vec![10, 20]);
    }
}
