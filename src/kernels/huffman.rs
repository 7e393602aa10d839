// In: src/kernels/huffman.rs

//! This module contains the histogram and canonical prefix-code machinery
//! shared by the entropy coder and every LZ sub-coder.
//!
//! Codes are *canonical*: the bit pattern of every codeword is fully
//! determined by the sorted (length, symbol) ordering, never by tree shape.
//! Encoder and decoder therefore agree bit-for-bit after exchanging only the
//! code-length array, which `CodeTable::write`/`CodeTable::read` serialize
//! with a compact zero-run token scheme.
//!
//! Construction is length-limited: natural Huffman lengths deeper than
//! `MAX_CODE_BITS` are rebalanced (Kraft-sum repair) before code assignment,
//! keeping the decoder's per-length tables small and bounded.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use crate::bitio::{BitReader, BitWriter};
use crate::error::{LontarError, Result};

/// Maximum decodable code depth. A wire-format constant: changing it breaks
/// interoperability with existing streams.
pub const MAX_CODE_BITS: u8 = 15;

const MAX_LEN: usize = MAX_CODE_BITS as usize;

//==================================================================================
// 1. Histogram
//==================================================================================

/// Symbol occurrence counts for one table, accumulated over one full pass of
/// the input. Frozen (read-only) once code construction begins.
#[derive(Debug, Clone)]
pub struct Histogram {
    counts: Vec<u32>,
    max_count: u32,
}

impl Histogram {
    pub fn new(num_symbols: usize) -> Self {
        Self {
            counts: vec![0; num_symbols],
            max_count: 0,
        }
    }

    /// Symbol index is always in range by construction of the caller.
    pub fn add(&mut self, sym: u16) {
        let count = &mut self.counts[sym as usize];
        *count += 1;
        if *count > self.max_count {
            self.max_count = *count;
        }
    }

    pub fn count(&self, sym: u16) -> u32 {
        self.counts[sym as usize]
    }

    pub fn counts(&self) -> &[u32] {
        &self.counts
    }

    pub fn num_symbols(&self) -> usize {
        self.counts.len()
    }

    pub fn max_count(&self) -> u32 {
        self.max_count
    }

    /// Number of symbols that will receive a code.
    pub fn coded_symbols(&self) -> usize {
        self.counts.iter().filter(|&&c| c > 0).count()
    }
}

//==================================================================================
// 2. Length Construction (pure functions: histogram -> lengths -> codes)
//==================================================================================

/// Unconstrained Huffman code lengths from counts. Zero-count symbols get
/// length 0 (no code). Equal-weight ties resolve by node id, with leaves
/// created in ascending symbol order, so the result is a pure function of the
/// counts alone.
fn huffman_lengths(counts: &[u32]) -> Vec<u8> {
    let mut lens = vec![0u8; counts.len()];
    let coded: Vec<usize> = (0..counts.len()).filter(|&s| counts[s] > 0).collect();
    match coded.len() {
        0 => return lens,
        1 => {
            // A lone symbol still needs one bit on the wire.
            lens[coded[0]] = 1;
            return lens;
        }
        _ => {}
    }

    // Arena of parent links: leaves first (ascending symbol), then merges.
    let mut parent: Vec<usize> = Vec::with_capacity(coded.len() * 2 - 1);
    let mut heap: BinaryHeap<Reverse<(u64, usize)>> = BinaryHeap::new();
    for &sym in &coded {
        let id = parent.len();
        parent.push(usize::MAX);
        heap.push(Reverse((counts[sym] as u64, id)));
    }
    while heap.len() > 1 {
        let Reverse((wa, a)) = heap.pop().unwrap();
        let Reverse((wb, b)) = heap.pop().unwrap();
        let id = parent.len();
        parent.push(usize::MAX);
        parent[a] = id;
        parent[b] = id;
        heap.push(Reverse((wa + wb, id)));
    }

    for (leaf, &sym) in coded.iter().enumerate() {
        let mut depth = 0u8;
        let mut node = leaf;
        while parent[node] != usize::MAX {
            node = parent[node];
            depth += 1;
        }
        lens[sym] = depth;
    }
    lens
}

/// Rebalances `lens` so that no length exceeds `MAX_CODE_BITS` and the Kraft
/// sum is exactly full (the canonical tree has no dangling branch). No-op when
/// the natural Huffman lengths already fit.
fn limit_lengths(counts: &[u32], lens: &mut [u8]) {
    let full: u64 = 1 << MAX_LEN;
    let weight = |l: u8| 1u64 << (MAX_LEN as u32 - l as u32);

    if lens.iter().filter(|&&l| l > 0).count() < 2 {
        return;
    }
    for l in lens.iter_mut() {
        if *l > MAX_CODE_BITS {
            *l = MAX_CODE_BITS;
        }
    }
    let mut kraft: u64 = lens.iter().filter(|&&l| l > 0).map(|&l| weight(l)).sum();

    // Clamping only ever grows the Kraft sum; deepen the rarest shallow
    // leaves until the tree fits again.
    while kraft > full {
        let mut pick: Option<usize> = None;
        for (sym, &l) in lens.iter().enumerate() {
            if l == 0 || l >= MAX_CODE_BITS {
                continue;
            }
            let better = match pick {
                None => true,
                Some(p) => counts[sym] < counts[p] || (counts[sym] == counts[p] && l > lens[p]),
            };
            if better {
                pick = Some(sym);
            }
        }
        let p = pick.expect("alphabet cannot fit MAX_CODE_BITS");
        lens[p] += 1;
        kraft -= weight(lens[p]);
    }

    // The deepening pass can overshoot below full; hand bits back to the
    // deepest, most frequent leaves. The deficit is always a multiple of the
    // smallest leaf weight, so this terminates at exactly full.
    while kraft < full {
        let deficit = full - kraft;
        let mut pick: Option<usize> = None;
        for (sym, &l) in lens.iter().enumerate() {
            if l <= 1 || weight(l) > deficit {
                continue;
            }
            let better = match pick {
                None => true,
                Some(p) => l > lens[p] || (l == lens[p] && counts[sym] > counts[p]),
            };
            if better {
                pick = Some(sym);
            }
        }
        let p = pick.expect("cannot complete canonical tree");
        lens[p] -= 1;
        kraft += weight(lens[p] + 1);
    }
}

/// Canonical code assignment (RFC 1951 style): codes count upward within a
/// length, lengths ordered shortest first, symbols ascending within a length.
fn canonical_codes(lens: &[u8]) -> Vec<u16> {
    let mut bl_count = [0u32; MAX_LEN + 1];
    for &l in lens {
        if l > 0 {
            bl_count[l as usize] += 1;
        }
    }
    let mut next_code = [0u32; MAX_LEN + 1];
    let mut code = 0u32;
    for bits in 1..=MAX_LEN {
        code = (code + bl_count[bits - 1]) << 1;
        next_code[bits] = code;
    }
    let mut codes = vec![0u16; lens.len()];
    for (sym, &l) in lens.iter().enumerate() {
        if l > 0 {
            codes[sym] = next_code[l as usize] as u16;
            next_code[l as usize] += 1;
        }
    }
    codes
}

/// Rejects length arrays that do not describe a decodable canonical code:
/// lengths beyond the cap, over-subscribed sets (some pattern decodes two
/// ways) and under-subscribed sets (some pattern decodes no way). The two
/// degenerate shapes that legitimately occur on the wire are allowed: an
/// all-zero table (valid only if never selected) and a single symbol at
/// length 1.
fn validate_lengths(lens: &[u8]) -> Result<()> {
    let full: u64 = 1 << MAX_LEN;
    let mut kraft = 0u64;
    let mut coded = 0usize;
    let mut lone_len = 0u8;
    for &l in lens {
        if l == 0 {
            continue;
        }
        if l > MAX_CODE_BITS {
            return Err(LontarError::CodeTable(format!(
                "code length {l} exceeds the {MAX_CODE_BITS}-bit cap"
            )));
        }
        coded += 1;
        lone_len = l;
        kraft += 1u64 << (MAX_LEN as u32 - l as u32);
        if kraft > full {
            return Err(LontarError::CodeTable(
                "over-subscribed code-length set".to_string(),
            ));
        }
    }
    match coded {
        0 => Ok(()),
        1 if lone_len == 1 => Ok(()),
        1 => Err(LontarError::CodeTable(
            "single coded symbol must have length 1".to_string(),
        )),
        _ if kraft == full => Ok(()),
        _ => Err(LontarError::CodeTable(
            "under-subscribed code-length set".to_string(),
        )),
    }
}

//==================================================================================
// 3. CodeTable (encode side + wire serialization)
//==================================================================================

/// One finished code table: symbol -> (code, length). Built once per table per
/// image, immutable thereafter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeTable {
    lens: Vec<u8>,
    codes: Vec<u16>,
}

impl CodeTable {
    /// Deterministic, depends only on the counts. Builds length-limited
    /// canonical codes; symbols with zero frequency get no code.
    pub fn build(hist: &Histogram) -> Self {
        let mut lens = huffman_lengths(hist.counts());
        limit_lengths(hist.counts(), &mut lens);
        let codes = canonical_codes(&lens);
        Self { lens, codes }
    }

    pub fn num_symbols(&self) -> usize {
        self.lens.len()
    }

    pub fn len(&self, sym: u16) -> u8 {
        self.lens[sym as usize]
    }

    pub fn lens(&self) -> &[u8] {
        &self.lens
    }

    pub fn code(&self, sym: u16) -> (u16, u8) {
        (self.codes[sym as usize], self.lens[sym as usize])
    }

    /// Emits one symbol's codeword; returns the number of bits written.
    /// Writing a symbol that was never counted is a sequencing bug in the
    /// caller (the encode pass diverged from the statistics pass).
    pub fn write_symbol(&self, sym: u16, writer: &mut BitWriter) -> Result<u32> {
        let len = self.lens[sym as usize];
        if len == 0 {
            return Err(LontarError::Internal(format!(
                "symbol {sym} has no code: encode stream diverges from the statistics pass"
            )));
        }
        writer.write_bits(self.codes[sym as usize] as u32, len as u32);
        Ok(len as u32)
    }

    /// Serializes the code-length array. Wire contract: per symbol, a 4-bit
    /// token carrying the length 1..=15, or token 0 followed by 8 bits holding
    /// (zero_run - 1) for a run of 1..=256 codeless symbols.
    pub fn write(&self, writer: &mut BitWriter) {
        let n = self.lens.len();
        let mut i = 0;
        while i < n {
            if self.lens[i] == 0 {
                let mut run = 1;
                while i + run < n && self.lens[i + run] == 0 && run < 256 {
                    run += 1;
                }
                writer.write_bits(0, 4);
                writer.write_bits(run as u32 - 1, 8);
                i += run;
            } else {
                writer.write_bits(self.lens[i] as u32, 4);
                i += 1;
            }
        }
    }

    /// Inverts `write` exactly, then validates and reassigns canonical codes
    /// with the same rule as `build`, so both sides hold bit-identical tables.
    pub fn read(num_symbols: usize, reader: &mut BitReader) -> Result<Self> {
        let mut lens = vec![0u8; num_symbols];
        let mut i = 0;
        while i < num_symbols {
            let token = reader.read_bits(4)?;
            if token == 0 {
                let run = reader.read_bits(8)? as usize + 1;
                if i + run > num_symbols {
                    return Err(LontarError::CodeTable(
                        "zero-length run overflows the table".to_string(),
                    ));
                }
                i += run;
            } else {
                lens[i] = token as u8;
                i += 1;
            }
        }
        validate_lengths(&lens)?;
        let codes = canonical_codes(&lens);
        Ok(Self { lens, codes })
    }
}

//==================================================================================
// 4. CanonicalDecoder (decode side)
//==================================================================================

/// Bit-serial canonical decoder over per-length first-code/first-index
/// tables. `MAX_CODE_BITS` bounds the walk, so a corrupt stream costs at most
/// 15 bit reads before it is rejected.
#[derive(Debug, Clone)]
pub struct CanonicalDecoder {
    first_code: [u32; MAX_LEN + 1],
    first_index: [u32; MAX_LEN + 1],
    count: [u32; MAX_LEN + 1],
    /// Coded symbols sorted by (length, symbol).
    syms: Vec<u16>,
    max_len: u8,
}

impl CanonicalDecoder {
    pub fn from_lengths(lens: &[u8]) -> Result<Self> {
        validate_lengths(lens)?;
        let mut count = [0u32; MAX_LEN + 1];
        for &l in lens {
            if l > 0 {
                count[l as usize] += 1;
            }
        }
        let mut first_code = [0u32; MAX_LEN + 1];
        let mut first_index = [0u32; MAX_LEN + 1];
        let mut code = 0u32;
        let mut index = 0u32;
        let mut max_len = 0u8;
        for bits in 1..=MAX_LEN {
            code = (code + count[bits - 1]) << 1;
            first_code[bits] = code;
            first_index[bits] = index;
            index += count[bits];
            if count[bits] > 0 {
                max_len = bits as u8;
            }
        }
        let mut syms = Vec::with_capacity(index as usize);
        for bits in 1..=MAX_LEN as u8 {
            for (sym, &l) in lens.iter().enumerate() {
                if l == bits {
                    syms.push(sym as u16);
                }
            }
        }
        Ok(Self {
            first_code,
            first_index,
            count,
            syms,
            max_len,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.syms.is_empty()
    }

    /// Decodes one codeword, walking bit-by-bit through the per-length bands.
    /// A pattern longer than every table entry is a format error.
    pub fn decode_symbol(&self, reader: &mut BitReader) -> Result<u16> {
        if self.syms.is_empty() {
            return Err(LontarError::Stream(
                "decode requested from an empty code table".to_string(),
            ));
        }
        let mut code = 0u32;
        for bits in 1..=self.max_len as usize {
            code = (code << 1) | reader.read_bit()? as u32;
            let band = self.count[bits];
            if band > 0 && code >= self.first_code[bits] {
                let offset = code - self.first_code[bits];
                if offset < band {
                    return Ok(self.syms[(self.first_index[bits] + offset) as usize]);
                }
            }
        }
        Err(LontarError::Stream(
            "bit pattern does not map to any symbol".to_string(),
        ))
    }
}
