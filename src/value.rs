//! Script values and their runtime type tags.

use std::fmt;
use std::rc::Rc;

use fraction::Fraction;

use crate::callable::Callable;
use crate::event::time::format_fraction;
use crate::music::Music;
use crate::scope::Ref;
use crate::voice::Voice;

/// A value produced by evaluating a syntax node.
#[derive(Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Fraction(Fraction),
    Str(Rc<str>),
    Music(Music),
    Callable(Rc<dyn Callable>),
    Ref(Ref),
    Voice(Rc<Voice>),
    List(Rc<[Value]>),
}

/// Declared type of a host-function parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Any,
    None,
    Bool,
    Int,
    Float,
    /// Int, float or fraction.
    Number,
    Str,
    Music,
    Callable,
    Voice,
    List,
    Ref,
}

impl ValueType {
    pub fn accepts(self, value: &Value) -> bool {
        match self {
            ValueType::Any => true,
            ValueType::None => matches!(value, Value::None),
            ValueType::Bool => matches!(value, Value::Bool(_)),
            ValueType::Int => matches!(value, Value::Int(_)),
            ValueType::Float => matches!(value, Value::Float(_) | Value::Int(_)),
            ValueType::Number => {
                matches!(value, Value::Int(_) | Value::Float(_) | Value::Fraction(_))
            }
            ValueType::Str => matches!(value, Value::Str(_)),
            ValueType::Music => matches!(value, Value::Music(_)),
            ValueType::Callable => matches!(value, Value::Callable(_)),
            ValueType::Voice => matches!(value, Value::Voice(_)),
            ValueType::List => matches!(value, Value::List(_)),
            ValueType::Ref => matches!(value, Value::Ref(_)),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ValueType::Any => "any",
            ValueType::None => "none",
            ValueType::Bool => "bool",
            ValueType::Int => "int",
            ValueType::Float => "float",
            ValueType::Number => "number",
            ValueType::Str => "str",
            ValueType::Music => "music",
            ValueType::Callable => "callable",
            ValueType::Voice => "voice",
            ValueType::List => "list",
            ValueType::Ref => "ref",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Value {
    pub fn str(text: &str) -> Self {
        Value::Str(Rc::from(text))
    }

    pub fn list(values: Vec<Value>) -> Self {
        Value::List(Rc::from(values))
    }

    pub fn callable(callable: impl Callable + 'static) -> Self {
        Value::Callable(Rc::new(callable))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "none",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Fraction(_) => "fraction",
            Value::Str(_) => "str",
            Value::Music(_) => "music",
            Value::Callable(_) => "callable",
            Value::Ref(_) => "ref",
            Value::Voice(_) => "voice",
            Value::List(_) => "list",
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            Value::Bool(b) => Some(*b as i64),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(x) => Some(*x),
            Value::Fraction(fr) => f64::try_from(*fr).ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(&**s),
            _ => None,
        }
    }

    pub fn as_music(&self) -> Option<&Music> {
        match self {
            Value::Music(m) => Some(m),
            _ => None,
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Float(x) => *x != 0.0,
            Value::Fraction(fr) => *fr != crate::event::time::zero(),
            Value::Str(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
            _ => true,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => write!(f, "None"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Int(n) => write!(f, "Int({n})"),
            Value::Float(x) => write!(f, "Float({x})"),
            Value::Fraction(fr) => write!(f, "Fraction({})", format_fraction(fr)),
            Value::Str(s) => write!(f, "Str({s:?})"),
            Value::Music(m) => write!(f, "{m:?}"),
            Value::Callable(c) => write!(f, "Callable({})", c.name()),
            Value::Ref(r) => write!(f, "{r:?}"),
            Value::Voice(v) => write!(f, "Voice({})", v.name),
            Value::List(items) => f.debug_list().entries(items.iter()).finish(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => write!(f, "none"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Fraction(fr) => write!(f, "{}", format_fraction(fr)),
            Value::Str(s) => write!(f, "{s}"),
            Value::Music(_) => write!(f, "<music>"),
            Value::Callable(c) => write!(f, "<function {}>", c.name()),
            Value::Ref(r) => write!(f, "{}", r.pointer()),
            Value::Voice(v) => write!(f, "<voice {}>", v.name),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
        }
    }
}

/// Structural equality for plain data; identity for music and callables.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Fraction(a), Value::Fraction(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Music(a), Value::Music(b)) => a.same(b),
            (Value::Callable(a), Value::Callable(b)) => Rc::ptr_eq(a, b),
            (Value::Ref(a), Value::Ref(b)) => a == b,
            (Value::Voice(a), Value::Voice(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<Fraction> for Value {
    fn from(fr: Fraction) -> Self {
        Value::Fraction(fr)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::str(s)
    }
}

impl From<Music> for Value {
    fn from(m: Music) -> Self {
        Value::Music(m)
    }
}

impl From<Voice> for Value {
    fn from(v: Voice) -> Self {
        Value::Voice(Rc::new(v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_tags_accept_matching_values() {
        assert!(ValueType::Int.accepts(&Value::Int(1)));
        assert!(!ValueType::Int.accepts(&Value::Float(1.0)));
        assert!(ValueType::Float.accepts(&Value::Int(1)));
        assert!(ValueType::Number.accepts(&Value::Fraction(Fraction::new(1u64, 2u64))));
        assert!(!ValueType::Str.accepts(&Value::None));
        assert!(ValueType::Any.accepts(&Value::None));
    }

    #[test]
    fn numeric_views() {
        assert_eq!(Value::Int(3).as_float(), Some(3.0));
        assert_eq!(Value::Fraction(Fraction::new(1u64, 4u64)).as_float(), Some(0.25));
        assert_eq!(Value::Bool(true).as_int(), Some(1));
        assert_eq!(Value::str("x").as_int(), None);
    }

    #[test]
    fn display_forms() {
        assert_eq!(Value::Fraction(Fraction::new(3u64, 8u64)).to_string(), "3/8");
        assert_eq!(
            Value::list(vec![Value::Int(1), Value::str("a")]).to_string(),
            "[1, a]"
        );
        assert_eq!(Value::None.to_string(), "none");
    }

    #[test]
    fn music_equality_is_identity() {
        let a = Music::empty();
        let b = Music::empty();
        assert_eq!(Value::Music(a.clone()), Value::Music(a));
        assert_ne!(Value::Music(b), Value::Music(Music::empty()));
    }

    #[test]
    fn truthiness() {
        assert!(!Value::None.truthy());
        assert!(!Value::Int(0).truthy());
        assert!(Value::str("x").truthy());
        assert!(!Value::list(Vec::new()).truthy());
    }
}
