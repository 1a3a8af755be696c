//! Tera rendering engine — [`Renderer`] and the `env` lookup function.
//!
//! Templates reference environment variables as `{{ env(name="PORT") }}`.
//! An unset variable substitutes the empty string; only malformed syntax or
//! a missing `name` argument fails the render.

use std::collections::HashMap;
use std::sync::Arc;

use tera::{Context, Tera, Value};

use crate::error::RenderError;

/// Environment lookup injected into the template engine.
///
/// `None` means "unset", which renders as the empty string.
pub type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Name under which a raw template is registered for a one-shot render.
const TEMPLATE_NAME: &str = "remote_config";

/// Renders raw remote bytes into final file content.
///
/// Create once and reuse; each [`Renderer::render`] call parses the supplied
/// template from scratch, so a bad remote value never poisons later renders.
pub struct Renderer {
    env: EnvLookup,
}

impl Renderer {
    /// Renderer backed by the real process environment.
    pub fn new() -> Renderer {
        Renderer {
            env: Arc::new(|name| std::env::var(name).ok()),
        }
    }

    /// Renderer with a caller-supplied environment, for tests.
    pub fn with_env(env: EnvLookup) -> Renderer {
        Renderer { env }
    }

    /// Render `raw` as a template. Fails on malformed syntax without any
    /// side effects; the caller decides what to do with the content.
    pub fn render(&self, raw: &[u8]) -> Result<String, RenderError> {
        let template = std::str::from_utf8(raw)?;

        let mut tera = Tera::default();
        let env = self.env.clone();
        tera.register_function("env", move |args: &HashMap<String, Value>| {
            let name = args
                .get("name")
                .and_then(Value::as_str)
                .ok_or_else(|| tera::Error::msg("env() requires a string `name` argument"))?;
            Ok(Value::String(env(name).unwrap_or_default()))
        });
        tera.add_raw_template(TEMPLATE_NAME, template)?;

        Ok(tera.render(TEMPLATE_NAME, &Context::new())?)
    }
}

impl Default for Renderer {
    fn default() -> Renderer {
        Renderer::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
