// In: src/error.rs

//! This module defines the single, unified error type for the entire lontar
//! core. It uses the `thiserror` crate to provide ergonomic, context-aware
//! error handling.
//!
//! The taxonomy is deliberately small. Variants describing corrupt or
//! adversarial compressed input (`CodeTable`, `Stream`, `Lz`, `Truncated`) are
//! always surfaced to the caller and never silently recovered: recovering on a
//! corrupt stream risks producing wrong pixel data. `Internal` marks sequencing
//! bugs in the calling code, not recoverable input conditions.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LontarError {
    // =========================================================================
    // === Format Errors (corrupt/adversarial compressed input)
    // =========================================================================
    #[error("Invalid code-length table: {0}")]
    CodeTable(String),

    #[error("Corrupt symbol stream: {0}")]
    Stream(String),

    #[error("Invalid LZ match reference: {0}")]
    Lz(String),

    #[error("Bit channel exhausted in the middle of a field")]
    Truncated,

    // =========================================================================
    // === Boundary Errors
    // =========================================================================
    /// An error from the Serde JSON library while parsing a `CodecConfig`.
    #[error("Config parse error: {0}")]
    Config(#[from] serde_json::Error),

    // =========================================================================
    // === Contract Violations
    // =========================================================================
    #[error("Internal logic error (this is a bug): {0}")]
    Internal(String),
}

impl LontarError {
    /// True for errors caused by corrupt compressed input, as opposed to
    /// misuse of the encode/decode surfaces.
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            LontarError::CodeTable(_)
                | LontarError::Stream(_)
                | LontarError::Lz(_)
                | LontarError::Truncated
        )
    }
}

/// The crate-wide result alias.
pub type Result<T> = std::result::Result<T, LontarError>;
