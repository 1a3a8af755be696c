//! Error types for confsig-renderer.

use thiserror::Error;

/// All errors that can arise from template rendering.
#[derive(Debug, Error)]
pub enum RenderError {
    /// Tera template engine error — malformed syntax or a failed function call.
    #[error("template engine error: {0}")]
    Tera(#[from] tera::Error),

    /// The remote value is not valid UTF-8 and cannot be a template.
    #[error("template is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),
}
