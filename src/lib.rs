//! Musikla — the evaluation core of a live coding music language: symbol
//! scopes, evaluation contexts, lazy music streams and the event pipeline.

pub mod callable;
pub mod config;
pub mod context;
pub mod error;
pub mod event;
pub mod library;
pub mod music;
pub mod scope;
pub mod score;
pub mod syntax;
pub mod transform;
pub mod value;
pub mod voice;

pub use context::Context;
pub use error::{Error, Result};
pub use event::MusicEvent;
pub use music::Music;
