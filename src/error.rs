//! Error types shared by the evaluation core.
//!
//! Lookup and binding failures surface to whoever triggered the evaluation
//! step. Invariant violations point at a bug in an upstream producer and are
//! reported, never recovered from.

use thiserror::Error;

/// An error raised while resolving symbols, binding host arguments or
/// streaming events.
///
/// Errors are `Clone` because a shared expansion replays the same failure to
/// every consumer that reaches it.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error("symbol '{name}' is not defined{}", container_suffix(container))]
    Lookup { name: String, container: String },

    #[error("pointer to '{name}' outlived the scope that owns it")]
    StalePointer { name: String },

    #[error("argument '{parameter}' of {function}(): expected {expected}, found {found}")]
    Binding {
        function: String,
        parameter: String,
        expected: String,
        found: String,
    },

    #[error("{function}(): {message}")]
    Arity { function: String, message: String },

    #[error("invariant violated: {0}")]
    Invariant(String),

    #[error("{0}")]
    Runtime(String),
}

fn container_suffix(container: &str) -> String {
    if container.is_empty() {
        String::new()
    } else {
        format!(" in container '{container}'")
    }
}

impl Error {
    pub fn lookup(name: impl Into<String>, container: impl Into<String>) -> Self {
        Self::Lookup {
            name: name.into(),
            container: container.into(),
        }
    }

    pub fn binding(
        function: impl Into<String>,
        parameter: impl Into<String>,
        expected: impl Into<String>,
        found: impl Into<String>,
    ) -> Self {
        Self::Binding {
            function: function.into(),
            parameter: parameter.into(),
            expected: expected.into(),
            found: found.into(),
        }
    }

    pub fn arity(function: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Arity {
            function: function.into(),
            message: message.into(),
        }
    }

    pub fn invariant(message: impl Into<String>) -> Self {
        Self::Invariant(message.into())
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        Self::Runtime(message.into())
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_message_default_container() {
        let e = Error::lookup("tempo", "");
        assert_eq!(e.to_string(), "symbol 'tempo' is not defined");
    }

    #[test]
    fn lookup_message_named_container() {
        let e = Error::lookup("piano", "instruments");
        assert_eq!(
            e.to_string(),
            "symbol 'piano' is not defined in container 'instruments'"
        );
    }

    #[test]
    fn binding_message_names_parameter_and_type() {
        let e = Error::binding("cc", "control", "int", "str");
        assert_eq!(
            e.to_string(),
            "argument 'control' of cc(): expected int, found str"
        );
    }

    #[test]
    fn errors_are_comparable() {
        assert_eq!(Error::invariant("x"), Error::invariant("x"));
        assert_ne!(Error::invariant("x"), Error::runtime("x"));
    }
}
