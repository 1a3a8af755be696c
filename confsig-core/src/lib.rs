//! # confsig-core
//!
//! Static settings and domain types shared by every confsig crate.
//!
//! Load the sidecar's settings with [`settings::Settings::load_at`] and pass
//! the result to the daemon runtime.

pub mod error;
pub mod settings;
pub mod types;

pub use error::SettingsError;
pub use settings::Settings;
pub use types::{PersistedConfig, RemoteEntry, RenderedConfig};
