//! This module provides observability hooks for the codec kernels.
//!
//! Table construction is adaptive (per-image histograms, length-limited code
//! rebalancing), so visibility into what was built matters when chasing a
//! ratio regression. The `codec_metric!` macro is the primary tool.
//!
//! It is a zero-cost abstraction: the `#[cfg(debug_assertions)]` attribute
//! ensures that the macro body is completely compiled out of release builds,
//! imposing no performance penalty in production.

/// Logs a structured key-value metric line through the `log` facade, only in
/// debug builds.
///
/// # Example
/// ```
/// # #[macro_use] extern crate lontar;
/// # fn main() {
/// let coded = 37;
/// codec_metric!("event" = "table_build", "coded_symbols" = &coded);
/// # }
/// ```
#[macro_export]
macro_rules! codec_metric {
    ($($key:literal = $value:expr),+ $(,)?) => {
        #[cfg(debug_assertions)]
        {
            // Collect each pair as a JSON string fragment
            let mut parts = Vec::new();
            $(
                parts.push(format!("\"{}\": \"{}\"", $key, $value));
            )+

            log::debug!("LONTAR_METRIC: {{ {} }}", parts.join(", "));
        }
    };
}
