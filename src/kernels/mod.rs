//! The pure, stateless-where-possible codec kernels.
//!
//! Layering, leaf to root:
//! - `huffman`: histogram accumulation and length-limited canonical prefix
//!   codes, including the code-length wire serialization.
//! - `zrle`: the zero-run tracker state machine and run-symbol banding.
//! - `entropy`: the two-pass entropy encoder and the streaming decoder,
//!   composed from the two modules above.
//! - `lz`: the 2D-LZ match distance/length codec (escape-code bands,
//!   recent-distance cache, distance bucket sub-coders).

pub mod entropy;
pub mod huffman;
pub mod lz;
pub mod zrle;

#[cfg(test)]
mod codec_tests;
