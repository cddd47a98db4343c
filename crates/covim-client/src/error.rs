//! Client errors.
//!
//! These are local precondition failures of the command surface. Protocol
//! and transport failures never show up here: they are reported to the
//! editor as notices and end the connection.

/// Error returned by a [`Client`](crate::Client) command.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("ERROR: Already connected. Please disconnect first")]
    AlreadyConnected,

    #[error(
        "ERROR: Different address/port already used ({addr}:{port}). To try another, quit the current session first"
    )]
    ConflictingSession { addr: String, port: u16 },

    #[error("ERROR: CoVim must be running to use this command")]
    NotRunning,

    #[error("Syntax Error: Use form {0}")]
    Usage(&'static str),

    #[error("failed to launch companion server `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to start network worker: {0}")]
    WorkerStart(#[source] std::io::Error),

    #[error("network worker has stopped")]
    WorkerGone,
}
