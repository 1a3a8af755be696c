//! # confsig-renderer
//!
//! Renders the raw remote value into final file content.
//!
//! The value is treated as a Tera template whose only extension point is the
//! `env(name="VAR")` function; rendering is deterministic given the template
//! and the environment.

pub mod engine;
pub mod error;

pub use engine::{EnvLookup, Renderer};
pub use error::RenderError;
