//! This file is the root of the `lontar` Rust crate.
//!
//! lontar-core is the statistical compression backend shared by the lontar
//! image encoder and decoder. It owns two subsystems:
//!
//! 1.  An adaptive entropy coder (`kernels::entropy`) that maps a byte-symbol
//!     stream, augmented with reserved zero-run symbols, onto a length-limited
//!     canonical prefix code, with an optional "after-zero" context table.
//! 2.  The 2D-LZ match codec (`kernels::lz`) that encodes match length and
//!     distance through a small escape-code alphabet, a recent-distance cache,
//!     and spatially-local distance shortcuts.
//!
//! Container framing, pixel filtering and the CLI front end live in sibling
//! crates; this crate only defines the symbol-to-bits transformation.

//==================================================================================
// 0. Constants
//==================================================================================
/// The crate version, automatically set from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//==================================================================================
// 1. Module Declarations
//==================================================================================
#[macro_use]
mod observability; // Make macros available throughout the crate

pub mod bitio;
pub mod config;
pub mod error;
pub mod kernels;
