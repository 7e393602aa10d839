// In: src/kernels/zrle.rs

//! Zero-run detection and the reserved run-symbol banding.
//!
//! The entropy coder's base alphabet reserves 128 symbols for runs of the zero
//! byte. Symbol `RUN_BASE + k` with `k < 127` is a *terminal* run of exactly
//! `k` zeros; `RUN_BASE + 127` contributes 127 zeros and marks the run as
//! continuing, so arbitrarily long runs chain without ever overflowing. Every
//! chained symbol is entropy coded like any other symbol, so long runs cost
//! proportionally more bits.
//!
//! The tracker itself is a two-state machine (`Idle` / `InRun`) that turns a
//! raw byte stream into completed run lengths; the entropy encoder owns the
//! run-list those lengths are queued on.

/// Number of reserved run symbols in the base alphabet.
pub const RUN_SYMS: usize = 128;

/// First reserved run symbol (literals occupy 0..=255).
pub const RUN_BASE: u16 = 256;

/// The continuation symbol: 127 zeros, run continues.
pub const RUN_CONT_SYM: u16 = RUN_BASE + RUN_SYMS as u16 - 1;

/// Zeros contributed by one continuation symbol.
pub const RUN_CONT_SPAN: u32 = 127;

/// Expands one run symbol into (zero count, run continues). Caller guarantees
/// `sym` is in the reserved band.
pub fn run_span(sym: u16) -> (u32, bool) {
    debug_assert!((RUN_BASE..RUN_BASE + RUN_SYMS as u16).contains(&sym));
    if sym == RUN_CONT_SYM {
        (RUN_CONT_SPAN, true)
    } else {
        ((sym - RUN_BASE) as u32, false)
    }
}

/// The symbol chain for a run of `len` zeros: `len / 127` continuation
/// symbols, then the terminal symbol for the remainder (possibly "0 zeros"
/// when `len` is an exact multiple).
pub fn run_chain(len: u32) -> Vec<u16> {
    let mut chain = Vec::with_capacity((len / RUN_CONT_SPAN) as usize + 1);
    let mut rem = len;
    while rem >= RUN_CONT_SPAN {
        chain.push(RUN_CONT_SYM);
        rem -= RUN_CONT_SPAN;
    }
    chain.push(RUN_BASE + rem as u16);
    chain
}

/// Tracker state: outside any run, or inside one with the count so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    InRun(u32),
}

/// Detects maximal runs of the zero byte in a symbol stream.
#[derive(Debug, Clone)]
pub struct ZeroRunTracker {
    state: RunState,
}

impl ZeroRunTracker {
    pub fn new() -> Self {
        Self {
            state: RunState::Idle,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Feeds one byte; returns the completed run length when a nonzero byte
    /// closes a run.
    pub fn push(&mut self, byte: u8) -> Option<u32> {
        match (self.state, byte) {
            (RunState::Idle, 0) => {
                self.state = RunState::InRun(1);
                None
            }
            (RunState::InRun(count), 0) => {
                self.state = RunState::InRun(count + 1);
                None
            }
            (RunState::Idle, _) => None,
            (RunState::InRun(count), _) => {
                self.state = RunState::Idle;
                Some(count)
            }
        }
    }

    /// End of stream: flushes a still-open run.
    pub fn finish(&mut self) -> Option<u32> {
        match self.state {
            RunState::Idle => None,
            RunState::InRun(count) => {
                self.state = RunState::Idle;
                Some(count)
            }
        }
    }
}

impl Default for ZeroRunTracker {
    fn default() -> Self {
        Self::new()
    }
}
