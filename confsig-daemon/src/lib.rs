//! # confsig-daemon
//!
//! The sidecar runtime: change watcher + reload coordinator + process
//! supervisor under one cancellable lifecycle.
//!
//! Call [`start_blocking`] from a binary, or [`run`] from inside an existing
//! tokio runtime. The runtime's lifetime is bound to the supervised child:
//! when the child exits, background loops are cancelled after a short grace
//! period and the call returns the child's exit status.

mod error;
mod runtime;
pub mod supervisor;

pub use error::DaemonError;
pub use runtime::{run, start_blocking};
pub use supervisor::SupervisedProcess;
