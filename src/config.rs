// In: src/config.rs

//! The single source of truth for lontar codec configuration.
//!
//! This module defines the `CodecConfig` struct, which is created once at the
//! application boundary (e.g., from a CLI flag set or a JSON settings file)
//! and passed by value to the encoder and decoder constructors.
//!
//! Every field here is a *wire-format parameter*: the container layer records
//! the configuration in its header, and encoder and decoder must be built with
//! identical values or table selection diverges.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Configuration shared by the entropy encoder and decoder of one image.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct CodecConfig {
    /// Enables the after-zero context table: the symbol immediately following
    /// a decoded zero byte is coded under a second, dedicated table
    /// (pseudo-order-1 modeling without full order-1 overhead).
    #[serde(default = "default_true")]
    pub after_zero: bool,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self { after_zero: true }
    }
}

impl CodecConfig {
    /// Parses a config from a JSON document, as handed over by the container
    /// layer or a settings file.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Helper for `serde` to default a boolean field to true.
fn default_true() -> bool {
    true
}
