// In: src/kernels/entropy.rs

//! The adaptive entropy encoder and decoder.
//!
//! Encoding is two-pass. Pass one (`push`) routes every raw byte through the
//! zero-run tracker, accumulating histograms and the ordered run-list;
//! `finalize` closes the stream and builds the canonical table(s). Pass two
//! (`write_overhead` + `encode` replayed in the original order +
//! `encode_finalize`) serializes the tables and then the symbols. The decoder
//! is single-pass: read tables, then decode one symbol at a time, expanding
//! run chains back into zero bytes.
//!
//! Context modeling: with `after_zero` enabled, the symbol immediately
//! following a decoded zero byte is coded under a second 257-symbol table.
//! Both sides derive the table choice purely from the symbol history, so no
//! side channel is needed — but both passes of the encoder must agree, which
//! is why the replay state below is a function of the byte sequence alone and
//! never of encoder-internal counters.

use crate::bitio::{BitReader, BitWriter};
use crate::config::CodecConfig;
use crate::error::{LontarError, Result};
use crate::kernels::huffman::{CanonicalDecoder, CodeTable, Histogram};
use crate::kernels::zrle::{run_chain, run_span, ZeroRunTracker, RUN_BASE, RUN_SYMS};

/// Base ("BZ") alphabet: 256 literals + 128 run symbols + end marker.
pub const BZ_SYMS: usize = 256 + RUN_SYMS + 1;

/// After-zero ("AZ") alphabet: 256 literals + end marker.
pub const AZ_SYMS: usize = 257;

/// End-of-stream marker in the base alphabet.
pub const BZ_EOS: u16 = (BZ_SYMS - 1) as u16;

/// End-of-stream marker in the after-zero alphabet.
pub const AZ_EOS: u16 = (AZ_SYMS - 1) as u16;

//==================================================================================
// 1. Encoder
//==================================================================================

/// Two-pass entropy encoder for one image's symbol stream.
///
/// Call sequence contract: `push`* then `finalize`, then `write_overhead`,
/// then `encode` once per byte in the same order as `push`, then
/// `encode_finalize`. Violations are bugs in the caller, surfaced as
/// `LontarError::Internal` (and debug assertions), never as format errors.
#[derive(Debug)]
pub struct EntropyEncoder {
    cfg: CodecConfig,
    hist_bz: Histogram,
    hist_az: Histogram,
    tracker: ZeroRunTracker,
    /// Run lengths in encounter order; pass two consumes them strictly in
    /// order.
    run_list: Vec<u32>,
    /// Pass-one context flag: the most recently pushed byte was zero.
    last_was_zero: bool,
    table_bz: Option<CodeTable>,
    table_az: Option<CodeTable>,
    // --- pass-two replay state (pure function of the byte sequence) ---
    run_read_index: usize,
    replay_run_remaining: u32,
    replay_prev_zero: bool,
}

impl EntropyEncoder {
    pub fn new(cfg: CodecConfig) -> Self {
        Self {
            cfg,
            hist_bz: Histogram::new(BZ_SYMS),
            hist_az: Histogram::new(AZ_SYMS),
            tracker: ZeroRunTracker::new(),
            run_list: Vec::new(),
            last_was_zero: false,
            table_bz: None,
            table_az: None,
            run_read_index: 0,
            replay_run_remaining: 0,
            replay_prev_zero: false,
        }
    }

    fn account_run(&mut self, len: u32) {
        self.run_list.push(len);
        for sym in run_chain(len) {
            self.hist_bz.add(sym);
        }
    }

    /// Pass one: accumulate statistics for one raw byte.
    pub fn push(&mut self, byte: u8) {
        debug_assert!(self.table_bz.is_none(), "push after finalize");
        if byte == 0 {
            let _flushed = self.tracker.push(0);
            debug_assert!(_flushed.is_none());
            self.last_was_zero = true;
            return;
        }
        if let Some(run) = self.tracker.push(byte) {
            self.account_run(run);
        }
        if self.cfg.after_zero && self.last_was_zero {
            self.hist_az.add(byte as u16);
        } else {
            self.hist_bz.add(byte as u16);
        }
        self.last_was_zero = false;
    }

    /// Closes pass one: flushes an open run, accounts the end marker under
    /// the final context, and builds the code table(s).
    pub fn finalize(&mut self) {
        debug_assert!(self.table_bz.is_none(), "finalize called twice");
        if let Some(run) = self.tracker.finish() {
            self.account_run(run);
        }
        if self.cfg.after_zero && self.last_was_zero {
            self.hist_az.add(AZ_EOS);
        } else {
            self.hist_bz.add(BZ_EOS);
        }
        self.table_bz = Some(CodeTable::build(&self.hist_bz));
        if self.cfg.after_zero {
            self.table_az = Some(CodeTable::build(&self.hist_az));
        }
        codec_metric!(
            "event" = "entropy_finalize",
            "bz_coded" = &self.hist_bz.coded_symbols(),
            "az_coded" = &self.hist_az.coded_symbols(),
            "runs" = &self.run_list.len(),
        );
    }

    fn tables(&self) -> Result<(&CodeTable, Option<&CodeTable>)> {
        let bz = self.table_bz.as_ref().ok_or_else(|| {
            LontarError::Internal("encode surface used before finalize".to_string())
        })?;
        Ok((bz, self.table_az.as_ref()))
    }

    /// Serializes the code-length table(s); returns bits written.
    pub fn write_overhead(&self, writer: &mut BitWriter) -> Result<u32> {
        let (bz, az) = self.tables()?;
        let start = writer.bit_len();
        bz.write(writer);
        if let Some(az) = az {
            az.write(writer);
        }
        let bits = (writer.bit_len() - start) as u32;
        log::debug!("entropy table overhead: {bits} bits");
        Ok(bits)
    }

    /// Pass two: emit one byte, replayed in the original `push` order;
    /// returns bits written. The first zero of a run consumes the next
    /// run-list entry and emits the whole symbol chain; the remaining zeros
    /// of that run emit nothing.
    pub fn encode(&mut self, byte: u8, writer: &mut BitWriter) -> Result<u32> {
        let bz = self.table_bz.as_ref().ok_or_else(|| {
            LontarError::Internal("encode surface used before finalize".to_string())
        })?;
        if byte == 0 {
            if self.replay_run_remaining > 0 {
                self.replay_run_remaining -= 1;
                return Ok(0);
            }
            let run = *self.run_list.get(self.run_read_index).ok_or_else(|| {
                LontarError::Internal(
                    "run-list exhausted: encode stream diverges from push stream".to_string(),
                )
            })?;
            self.run_read_index += 1;
            let mut bits = 0;
            for sym in run_chain(run) {
                bits += bz.write_symbol(sym, writer)?;
            }
            self.replay_run_remaining = run - 1;
            self.replay_prev_zero = true;
            Ok(bits)
        } else {
            debug_assert_eq!(
                self.replay_run_remaining, 0,
                "literal encoded inside an unfinished zero run"
            );
            let table = match &self.table_az {
                Some(az) if self.replay_prev_zero => az,
                _ => bz,
            };
            let bits = table.write_symbol(byte as u16, writer)?;
            self.replay_prev_zero = false;
            Ok(bits)
        }
    }

    /// Emits the end-of-stream marker under the replayed context; returns
    /// bits written. The decoder needs no externally-carried symbol count.
    pub fn encode_finalize(&mut self, writer: &mut BitWriter) -> Result<u32> {
        let (bz, az) = self.tables()?;
        debug_assert_eq!(
            self.run_read_index,
            self.run_list.len(),
            "run-list entries left unconsumed at end of stream"
        );
        match az {
            Some(az) if self.replay_prev_zero => az.write_symbol(AZ_EOS, writer),
            _ => bz.write_symbol(BZ_EOS, writer),
        }
    }
}

//==================================================================================
// 2. Decoder
//==================================================================================

/// What a decoded run chain left behind for delivery after its zeros.
#[derive(Debug, Clone, Copy)]
enum Tail {
    Literal(u8),
    Eos,
}

/// Single-pass entropy decoder for one image's symbol stream.
#[derive(Debug)]
pub struct EntropyDecoder {
    dec_bz: CanonicalDecoder,
    dec_az: Option<CanonicalDecoder>,
    pending_zeros: u32,
    tail: Option<Tail>,
    prev_zero: bool,
    done: bool,
}

impl EntropyDecoder {
    /// Reads and validates the code table(s). Fails with a format error on a
    /// corrupt table; nothing is decoded past that point.
    pub fn init(reader: &mut BitReader, cfg: &CodecConfig) -> Result<Self> {
        let bz = CodeTable::read(BZ_SYMS, reader)?;
        let dec_bz = CanonicalDecoder::from_lengths(bz.lens())?;
        let dec_az = if cfg.after_zero {
            let az = CodeTable::read(AZ_SYMS, reader)?;
            Some(CanonicalDecoder::from_lengths(az.lens())?)
        } else {
            None
        };
        Ok(Self {
            dec_bz,
            dec_az,
            pending_zeros: 0,
            tail: None,
            prev_zero: false,
            done: false,
        })
    }

    /// Decodes one run chain starting from `first`, crediting zeros to the
    /// pending counter. A terminal run symbol ends the chain; a literal or
    /// the end marker also ends it and is stashed for delivery after the
    /// zeros.
    fn expand_run(&mut self, first: u16, reader: &mut BitReader) -> Result<()> {
        self.prev_zero = true;
        let mut sym = first;
        loop {
            let (span, continues) = run_span(sym);
            // A 1-bit continuation code lets a corrupt stream chain forever;
            // the counter must reject instead of wrapping.
            self.pending_zeros = self.pending_zeros.checked_add(span).ok_or_else(|| {
                LontarError::Stream("zero-run chain overflows the output counter".to_string())
            })?;
            if !continues {
                return Ok(());
            }
            let next = self.dec_bz.decode_symbol(reader)?;
            if next == BZ_EOS {
                self.tail = Some(Tail::Eos);
                return Ok(());
            }
            if next < RUN_BASE {
                self.tail = Some(Tail::Literal(next as u8));
                return Ok(());
            }
            sym = next;
        }
    }

    /// Decodes the next byte; `Ok(None)` signals the end marker. Any
    /// unrecognized bit pattern or channel underrun aborts decoding of this
    /// image with a format error.
    pub fn decode_next(&mut self, reader: &mut BitReader) -> Result<Option<u8>> {
        loop {
            if self.pending_zeros > 0 {
                self.pending_zeros -= 1;
                return Ok(Some(0));
            }
            if let Some(tail) = self.tail.take() {
                match tail {
                    Tail::Literal(byte) => {
                        self.prev_zero = byte == 0;
                        return Ok(Some(byte));
                    }
                    Tail::Eos => {
                        self.done = true;
                        return Ok(None);
                    }
                }
            }
            if self.done {
                return Ok(None);
            }
            match &self.dec_az {
                Some(az) if self.prev_zero => {
                    let sym = az.decode_symbol(reader)?;
                    if sym == AZ_EOS {
                        self.done = true;
                        return Ok(None);
                    }
                    let byte = sym as u8;
                    self.prev_zero = byte == 0;
                    return Ok(Some(byte));
                }
                _ => {
                    let sym = self.dec_bz.decode_symbol(reader)?;
                    if sym == BZ_EOS {
                        self.done = true;
                        return Ok(None);
                    }
                    if sym < RUN_BASE {
                        let byte = sym as u8;
                        self.prev_zero = byte == 0;
                        return Ok(Some(byte));
                    }
                    self.expand_run(sym, reader)?;
                    // Zeros (and any stashed tail) are delivered by the next
                    // iterations of this loop.
                }
            }
        }
    }
}

//==================================================================================
// 3. Unit Tests
//==================================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn encode_all(data: &[u8], cfg: CodecConfig) -> Vec<u8> {
        let mut enc = EntropyEncoder::new(cfg);
        for &b in data {
            enc.push(b);
        }
        enc.finalize();
        let mut w = BitWriter::new();
        enc.write_overhead(&mut w).unwrap();
        for &b in data {
            enc.encode(b, &mut w).unwrap();
        }
        enc.encode_finalize(&mut w).unwrap();
        w.into_bytes()
    }

    fn decode_all(bytes: &[u8], cfg: CodecConfig) -> Result<Vec<u8>> {
        let mut r = BitReader::from_bytes(bytes);
        let mut dec = EntropyDecoder::init(&mut r, &cfg)?;
        let mut out = Vec::new();
        while let Some(b) = dec.decode_next(&mut r)? {
            out.push(b);
        }
        Ok(out)
    }

    fn roundtrip(data: &[u8], cfg: CodecConfig) {
        let bytes = encode_all(data, cfg);
        assert_eq!(decode_all(&bytes, cfg).unwrap(), data, "cfg {cfg:?}");
    }

    #[test]
    fn test_empty_stream_roundtrip() {
        roundtrip(&[], CodecConfig::default());
        roundtrip(&[], CodecConfig { after_zero: false });
    }

    #[test]
    fn test_literal_only_roundtrip() {
        roundtrip(&[5, 5, 5], CodecConfig::default());
    }

    #[test]
    fn test_simple_run_roundtrip() {
        roundtrip(&[0, 0, 0, 7], CodecConfig::default());
    }

    #[test]
    fn test_trailing_run_roundtrip() {
        roundtrip(&[9, 0, 0, 0, 0], CodecConfig::default());
    }

    #[test]
    fn test_all_zero_roundtrip() {
        for len in [1usize, 2, 127, 128, 10_000] {
            roundtrip(&vec![0u8; len], CodecConfig::default());
            roundtrip(&vec![0u8; len], CodecConfig { after_zero: false });
        }
    }

    #[test]
    fn test_run_symbol_count_matches_banding() {
        // A 3-zero run is one run symbol; the literal after it is AZ-coded.
        let mut enc = EntropyEncoder::new(CodecConfig::default());
        for &b in &[0u8, 0, 0, 7] {
            enc.push(b);
        }
        enc.finalize();
        assert_eq!(enc.run_list, vec![3]);
        assert_eq!(enc.hist_bz.count(RUN_BASE + 3), 1);
        assert_eq!(enc.hist_az.count(7), 1);
        assert_eq!(enc.hist_bz.count(7), 0);
    }

    #[test]
    fn test_after_zero_table_unused_without_zeros() {
        let mut enc = EntropyEncoder::new(CodecConfig::default());
        for &b in &[5u8, 5, 5] {
            enc.push(b);
        }
        enc.finalize();
        assert_eq!(enc.hist_az.coded_symbols(), 0);
        assert_eq!(enc.hist_bz.count(5), 3);
    }

    #[test]
    fn test_encode_divergence_is_internal_error() {
        let mut enc = EntropyEncoder::new(CodecConfig::default());
        enc.push(1);
        enc.finalize();
        let mut w = BitWriter::new();
        enc.write_overhead(&mut w).unwrap();
        // Pass two replays a zero that pass one never saw.
        assert!(matches!(
            enc.encode(0, &mut w),
            Err(LontarError::Internal(_))
        ));
    }

    #[test]
    fn test_truncated_stream_is_format_error() {
        let bytes = encode_all(&[1, 2, 3, 0, 0, 9, 1, 1], CodecConfig::default());
        let mut clipped = bytes.clone();
        clipped.truncate(bytes.len().saturating_sub(2));
        let err = decode_all(&clipped, CodecConfig::default()).unwrap_err();
        assert!(err.is_format_error(), "got {err:?}");
    }

    #[test]
    fn test_unbounded_run_chain_is_format_error() {
        // Base table coding only the continuation symbol (383) and the end
        // marker (384), one bit each: tokens for 256 + 127 codeless symbols,
        // then two length-1 entries. Exactly 32 bits, so the symbol section
        // starts byte aligned.
        let mut w = BitWriter::new();
        w.write_bits(0, 4);
        w.write_bits(255, 8);
        w.write_bits(0, 4);
        w.write_bits(126, 8);
        w.write_bits(1, 4);
        w.write_bits(1, 4);
        let mut bytes = w.into_bytes();
        // Every zero bit now decodes as another continuation: enough of them
        // to push the zero counter past u32::MAX.
        bytes.extend(std::iter::repeat(0u8).take(4_400_000));

        let cfg = CodecConfig { after_zero: false };
        let mut r = BitReader::from_bytes(&bytes);
        let mut dec = EntropyDecoder::init(&mut r, &cfg).unwrap();
        let err = dec.decode_next(&mut r).unwrap_err();
        assert!(matches!(err, LontarError::Stream(_)), "got {err:?}");
    }

    #[test]
    fn test_decode_after_eos_stays_ended() {
        let bytes = encode_all(&[4, 2], CodecConfig::default());
        let mut r = BitReader::from_bytes(&bytes);
        let mut dec = EntropyDecoder::init(&mut r, &CodecConfig::default()).unwrap();
        assert_eq!(dec.decode_next(&mut r).unwrap(), Some(4));
        assert_eq!(dec.decode_next(&mut r).unwrap(), Some(2));
        assert_eq!(dec.decode_next(&mut r).unwrap(), None);
        assert_eq!(dec.decode_next(&mut r).unwrap(), None);
    }

    #[test]
    fn test_mixed_runs_both_configs() {
        let mut data = Vec::new();
        data.extend_from_slice(&[10, 0, 0, 20, 20, 0, 30]);
        data.extend(std::iter::repeat(0u8).take(300));
        data.extend_from_slice(&[1, 2, 3, 0]);
        roundtrip(&data, CodecConfig::default());
        roundtrip(&data, CodecConfig { after_zero: false });
    }
}
