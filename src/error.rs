//! Error types shared across the crate.

/// Errors surfaced by graph construction, merging and (de)serialization.
///
/// Recovery policy: none. Partial build products are discarded by the caller
/// on any of these; annotation queries and correction cannot fail.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A file is missing, truncated, or its layout does not match what the
    /// header promises.
    #[error("failed to load {what}: {reason}")]
    Load { what: &'static str, reason: String },

    /// Chunks with mismatched k, alphabet size, canonical flag or weight
    /// width cannot be concatenated.
    #[error("incompatible graph chunks: {0}")]
    IncompatibleChunks(String),

    /// Allocation retries exhausted while reserving k-mer storage.
    #[error("out of memory: cannot reserve space for {0} k-mers")]
    OutOfMemory(usize),

    /// Malformed build configuration.
    #[error("bad configuration: {0}")]
    BadConfig(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn load(what: &'static str, reason: impl ToString) -> Self {
        Error::Load { what, reason: reason.to_string() }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
