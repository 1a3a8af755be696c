//! Error types for the daemon runtime and process supervision.

use thiserror::Error;

/// Error surface for the sidecar runtime.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("sync error: {0}")]
    Sync(#[from] confsig_sync::SyncError),

    /// The supervised executable could not be launched; nothing to supervise.
    #[error("failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed waiting on supervised process: {0}")]
    Wait(#[source] std::io::Error),

    #[error("failed to signal pid {pid}: {source}")]
    Signal {
        pid: i32,
        #[source]
        source: std::io::Error,
    },

    /// No reload-signal mechanism on this platform.
    #[error("reload signalling is not supported on this platform")]
    ReloadUnsupported,

    /// No command on the command line and no `app` in the settings file.
    #[error("no command given and no `app` configured in the settings file")]
    NoCommand,

    /// The child disappeared before its pid could be observed.
    #[error("supervised process exited before supervision could begin")]
    ChildGone,

    #[error("channel closed: {0}")]
    ChannelClosed(&'static str),

    #[error("daemon runtime error: {0}")]
    Runtime(String),
}
