//! Error types shared across the provisioning helpers.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProvisionError {
    /// A caller passed an argument that can never be valid, e.g. an empty
    /// device path. Raised before any subprocess is spawned.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// An external command exited non-zero. Surfaced to the caller
    /// unchanged; the library never retries on its own.
    #[error("`{command}` exited with status {exit_code}: {stderr}")]
    CommandFailed {
        command: String,
        exit_code: i32,
        stderr: String,
    },

    /// An external command could not be spawned at all.
    #[error("Failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// Every tokenization fallback was exhausted for a property line.
    /// The sanitize tier is expected to always succeed, so hitting this
    /// means the fallback chain itself is broken, not that input was bad.
    #[error("Malformed property line `{line}`: {reason}")]
    MalformedPropertyLine { line: String, reason: String },

    /// A device node survived the full removal retry loop.
    #[error("Device node {0} still present after removal")]
    RemovalFailed(String),
}
