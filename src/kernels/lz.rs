// In: src/kernels/lz.rs

//! The 2D-LZ match codec: escape-code bands, the recent-distance cache, and
//! the short/long distance bucket sub-coders.
//!
//! A match is a (length, distance) pair over the image's row-major byte
//! stream. The first wire field of every match is a small *escape code* in
//! `0..ESCAPE_SYMS`; the caller entropy-codes it in whatever alphabet hosts
//! matches, this module only decides its value and codes the payload that
//! follows it. The bands, cheapest first:
//!
//! - `0..=3`   recent: distance is one of the four most recent distances.
//! - `4..=11`  local left: small literal distances on the current row
//!   (1 and 3..=9; the code for 2 is remapped to 1, a same-row distance of
//!   2 never beats its neighbors).
//! - `12..=16` local up: distances within two columns of one row above.
//! - `17..=25` short: distance up to `SHORT_DIST_MAX` via the short bucket
//!   table; lengths 2..=9 ride inside the escape, longer lengths spill to
//!   the length code.
//! - `26..=34` long: as short, but the wide bucket table up to `DIST_MASK`.
//!
//! Like the entropy coder, the encoder is two-pass with a replayed second
//! pass; the cache is state both sides reconstruct from the match sequence
//! alone.

use crate::bitio::{BitReader, BitWriter};
use crate::error::{LontarError, Result};
use crate::kernels::huffman::{CanonicalDecoder, CodeTable, Histogram};

//==================================================================================
// 1. Wire Constants
//==================================================================================

/// Escape band bases. Wire-format constants.
pub const ESC_RECENT_0: u16 = 0;
pub const ESC_LEFT_1: u16 = 4;
pub const ESC_UP_N2: u16 = 12;
pub const ESC_SHORT_2: u16 = 17;
pub const ESC_LONG_2: u16 = 26;

/// Total escape codes a caller must reserve in its alphabet.
pub const ESCAPE_SYMS: u16 = 35;

/// Distances are confined to a 24-bit window.
pub const DIST_BITS: u32 = 24;
pub const DIST_MASK: u32 = (1 << DIST_BITS) - 1;

/// Boundary between the short and long distance sub-coders.
pub const SHORT_DIST_MAX: u32 = 1 << 16;

/// Match lengths span 2..=257; the length code carries `len - 2`.
pub const MIN_MATCH_LEN: u32 = 2;
pub const MAX_MATCH_LEN: u32 = 257;
pub const LEN_SYMS: usize = 256;

/// Bucket alphabet sizes for the two distance sub-coders.
pub const SDIST_SYMS: usize = 32;
pub const LDIST_SYMS: usize = 48;

/// Longest length expressible inside a short/long escape code itself.
const ESC_INLINE_LEN_MAX: u32 = 9;

//==================================================================================
// 2. Recent-Distance Cache
//==================================================================================

/// Four-slot rolling cache of recently coded distances. Recent-band hits do
/// not reinsert, so a distance reused back-to-back keeps its slot index
/// stable instead of churning the ring.
#[derive(Debug, Clone)]
pub struct RecentCache {
    slots: [u32; 4],
    cursor: usize,
}

impl RecentCache {
    pub fn new() -> Self {
        Self {
            slots: [0; 4],
            cursor: 0,
        }
    }

    /// Slot lookup by recency index 0..=3. Zero means the slot is still
    /// unwritten; no valid distance is ever zero.
    pub fn get(&self, index: u16) -> u32 {
        self.slots[(self.cursor + index as usize) & 3]
    }

    /// First recency index currently holding `dist`, if any.
    pub fn find(&self, dist: u32) -> Option<u16> {
        (0..4u16).find(|&i| self.get(i) == dist)
    }

    pub fn insert(&mut self, dist: u32) {
        self.slots[self.cursor] = dist;
        self.cursor = (self.cursor + 1) & 3;
    }
}

impl Default for RecentCache {
    fn default() -> Self {
        Self::new()
    }
}

//==================================================================================
// 3. Distance Buckets
//==================================================================================

/// Maps a distance to (bucket symbol, extra-bit count, extra-bit payload).
/// Buckets 0 and 1 are exact; from there every pair of buckets covers one
/// power-of-two octave split in half, DEFLATE fashion.
pub fn dist_bucket(dist: u32) -> (u16, u32, u32) {
    debug_assert!(dist >= 1);
    let u = dist - 1;
    if u < 2 {
        return (u as u16, 0, 0);
    }
    let n = 31 - u.leading_zeros();
    let extra_bits = n - 1;
    let sym = 2 * n + ((u >> extra_bits) & 1);
    let extra = u & ((1 << extra_bits) - 1);
    (sym as u16, extra_bits, extra)
}

/// Inverse of `dist_bucket`: bucket symbol plus extra bits back to the
/// distance.
pub fn dist_unbucket(sym: u16, extra: u32) -> u32 {
    if sym < 2 {
        return sym as u32 + 1;
    }
    let n = (sym >> 1) as u32;
    let extra_bits = n - 1;
    let base = (2 + (sym & 1) as u32) << extra_bits;
    base + extra + 1
}

fn dist_extra_bits(sym: u16) -> u32 {
    if sym < 2 {
        0
    } else {
        (sym >> 1) as u32 - 1
    }
}

//==================================================================================
// 4. Match Classification
//==================================================================================

/// Which escape band codes a match, decided against the current cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchClass {
    Recent(u16),
    LocalLeft,
    LocalUp,
    Short,
    Long,
}

fn check_match(len: u32, dist: u32) -> Result<()> {
    if !(MIN_MATCH_LEN..=MAX_MATCH_LEN).contains(&len) {
        return Err(LontarError::Lz(format!(
            "match length {len} outside {MIN_MATCH_LEN}..={MAX_MATCH_LEN}"
        )));
    }
    if dist == 0 || dist > DIST_MASK {
        return Err(LontarError::Lz(format!(
            "match distance {dist} outside 1..={DIST_MASK}"
        )));
    }
    Ok(())
}

/// Band priority: recent, then the two local bands, then short, then long.
fn classify(dist: u32, xsize: u32, cache: &RecentCache) -> MatchClass {
    if let Some(i) = cache.find(dist) {
        return MatchClass::Recent(i);
    }
    if dist == 1 || (3..=9).contains(&dist) {
        return MatchClass::LocalLeft;
    }
    if dist + 2 >= xsize && dist <= xsize + 2 {
        return MatchClass::LocalUp;
    }
    if dist <= SHORT_DIST_MAX {
        return MatchClass::Short;
    }
    MatchClass::Long
}

fn escape_for(class: MatchClass, len: u32, dist: u32, xsize: u32) -> u16 {
    match class {
        MatchClass::Recent(i) => ESC_RECENT_0 + i,
        // The code slot for distance 2 stands in for distance 1.
        MatchClass::LocalLeft if dist == 1 => ESC_LEFT_1,
        MatchClass::LocalLeft => ESC_LEFT_1 + (dist as u16 - 2),
        MatchClass::LocalUp => ESC_UP_N2 + (dist + 2 - xsize) as u16,
        MatchClass::Short if len <= ESC_INLINE_LEN_MAX => ESC_SHORT_2 + (len as u16 - 2),
        MatchClass::Short => ESC_SHORT_2 + 8,
        MatchClass::Long if len <= ESC_INLINE_LEN_MAX => ESC_LONG_2 + (len as u16 - 2),
        MatchClass::Long => ESC_LONG_2 + 8,
    }
}

/// Whether a match in this band spends a length codeword (on top of the
/// escape code).
fn needs_len_code(class: MatchClass, len: u32) -> bool {
    match class {
        MatchClass::Recent(_) | MatchClass::LocalLeft | MatchClass::LocalUp => true,
        MatchClass::Short | MatchClass::Long => len > ESC_INLINE_LEN_MAX,
    }
}

//==================================================================================
// 5. Encoder
//==================================================================================

/// Two-pass match encoder. `record` each match in order, `finalize`, then
/// `write_tables` and replay every match through `escape_code` + `encode`.
/// The caller owns the escape codes' entropy coding; this struct tells it
/// which escape to emit and writes everything after it.
#[derive(Debug)]
pub struct LzEncoder {
    xsize: u32,
    hist_len: Histogram,
    hist_sdist: Histogram,
    hist_ldist: Histogram,
    cache: RecentCache,
    table_len: Option<CodeTable>,
    table_sdist: Option<CodeTable>,
    table_ldist: Option<CodeTable>,
    // Pass-two cache, rebuilt from the replayed match sequence.
    replay_cache: RecentCache,
    matches: usize,
}

impl LzEncoder {
    pub fn new(xsize: u32) -> Self {
        Self {
            xsize,
            hist_len: Histogram::new(LEN_SYMS),
            hist_sdist: Histogram::new(SDIST_SYMS),
            hist_ldist: Histogram::new(LDIST_SYMS),
            cache: RecentCache::new(),
            table_len: None,
            table_sdist: None,
            table_ldist: None,
            replay_cache: RecentCache::new(),
            matches: 0,
        }
    }

    /// Pass one: accounts one match and returns the escape code the caller
    /// must count in its own alphabet.
    pub fn record(&mut self, len: u32, dist: u32) -> Result<u16> {
        debug_assert!(self.table_len.is_none(), "record after finalize");
        check_match(len, dist)?;
        let class = classify(dist, self.xsize, &self.cache);
        if needs_len_code(class, len) {
            self.hist_len.add((len - MIN_MATCH_LEN) as u16);
        }
        match class {
            MatchClass::Recent(_) => {}
            MatchClass::LocalLeft | MatchClass::LocalUp => {
                self.cache.insert(dist);
            }
            MatchClass::Short => {
                let (sym, _, _) = dist_bucket(dist);
                self.hist_sdist.add(sym);
                self.cache.insert(dist);
            }
            MatchClass::Long => {
                let (sym, _, _) = dist_bucket(dist);
                self.hist_ldist.add(sym);
                self.cache.insert(dist);
            }
        }
        self.matches += 1;
        Ok(escape_for(class, len, dist, self.xsize))
    }

    /// Closes pass one and builds the three sub-coder tables.
    pub fn finalize(&mut self) {
        debug_assert!(self.table_len.is_none(), "finalize called twice");
        self.table_len = Some(CodeTable::build(&self.hist_len));
        self.table_sdist = Some(CodeTable::build(&self.hist_sdist));
        self.table_ldist = Some(CodeTable::build(&self.hist_ldist));
        codec_metric!(
            "event" = "lz_finalize",
            "matches" = &self.matches,
            "len_coded" = &self.hist_len.coded_symbols(),
            "sdist_coded" = &self.hist_sdist.coded_symbols(),
            "ldist_coded" = &self.hist_ldist.coded_symbols(),
        );
    }

    fn tables(&self) -> Result<(&CodeTable, &CodeTable, &CodeTable)> {
        match (&self.table_len, &self.table_sdist, &self.table_ldist) {
            (Some(l), Some(s), Some(d)) => Ok((l, s, d)),
            _ => Err(LontarError::Internal(
                "match encode surface used before finalize".to_string(),
            )),
        }
    }

    /// Serializes the three code-length tables in decode order (length,
    /// short distance, long distance); returns bits written.
    pub fn write_tables(&self, writer: &mut BitWriter) -> Result<u32> {
        let (len, sdist, ldist) = self.tables()?;
        let start = writer.bit_len();
        len.write(writer);
        sdist.write(writer);
        ldist.write(writer);
        let bits = (writer.bit_len() - start) as u32;
        log::debug!("lz table overhead: {bits} bits");
        Ok(bits)
    }

    /// Pass two, step one: the escape code for the next replayed match.
    /// Read-only; `encode` for the same match must follow.
    pub fn escape_code(&self, len: u32, dist: u32) -> Result<u16> {
        check_match(len, dist)?;
        Ok(escape_for(
            classify(dist, self.xsize, &self.replay_cache),
            len,
            dist,
            self.xsize,
        ))
    }

    /// Pass two, step two: writes the match payload that follows the escape
    /// code; returns bits written.
    pub fn encode(&mut self, len: u32, dist: u32, writer: &mut BitWriter) -> Result<u32> {
        check_match(len, dist)?;
        let (table_len, table_sdist, table_ldist) =
            match (&self.table_len, &self.table_sdist, &self.table_ldist) {
                (Some(l), Some(s), Some(d)) => (l, s, d),
                _ => {
                    return Err(LontarError::Internal(
                        "match encode surface used before finalize".to_string(),
                    ))
                }
            };
        let class = classify(dist, self.xsize, &self.replay_cache);
        let mut bits = 0;
        if needs_len_code(class, len) {
            bits += table_len.write_symbol((len - MIN_MATCH_LEN) as u16, writer)?;
        }
        match class {
            MatchClass::Recent(_) => {}
            MatchClass::LocalLeft | MatchClass::LocalUp => {
                self.replay_cache.insert(dist);
            }
            MatchClass::Short | MatchClass::Long => {
                let (sym, extra_bits, extra) = dist_bucket(dist);
                let table = if matches!(class, MatchClass::Short) {
                    table_sdist
                } else {
                    table_ldist
                };
                bits += table.write_symbol(sym, writer)?;
                writer.write_bits(extra, extra_bits);
                bits += extra_bits;
                self.replay_cache.insert(dist);
            }
        }
        Ok(bits)
    }
}

//==================================================================================
// 6. Decoder
//==================================================================================

/// Single-pass match decoder. The caller decodes the escape code from its
/// own alphabet and hands it to `read`, which consumes the payload.
#[derive(Debug)]
pub struct LzDecoder {
    xsize: u32,
    dec_len: CanonicalDecoder,
    dec_sdist: CanonicalDecoder,
    dec_ldist: CanonicalDecoder,
    cache: RecentCache,
}

impl LzDecoder {
    /// Reads the three sub-coder tables. Table order is a wire contract.
    pub fn init(xsize: u32, reader: &mut BitReader) -> Result<Self> {
        let dec_len = CanonicalDecoder::from_lengths(CodeTable::read(LEN_SYMS, reader)?.lens())?;
        let dec_sdist =
            CanonicalDecoder::from_lengths(CodeTable::read(SDIST_SYMS, reader)?.lens())?;
        let dec_ldist =
            CanonicalDecoder::from_lengths(CodeTable::read(LDIST_SYMS, reader)?.lens())?;
        Ok(Self {
            xsize,
            dec_len,
            dec_sdist,
            dec_ldist,
            cache: RecentCache::new(),
        })
    }

    fn read_len(&self, reader: &mut BitReader) -> Result<u32> {
        Ok(self.dec_len.decode_symbol(reader)? as u32 + MIN_MATCH_LEN)
    }

    fn read_dist(&self, dec: &CanonicalDecoder, reader: &mut BitReader) -> Result<u32> {
        let sym = dec.decode_symbol(reader)?;
        let extra = reader.read_bits(dist_extra_bits(sym))?;
        Ok(dist_unbucket(sym, extra))
    }

    /// Decodes the (length, distance) of one match from its escape code plus
    /// the payload bits that follow it.
    pub fn read(&mut self, escape: u16, reader: &mut BitReader) -> Result<(u32, u32)> {
        if escape >= ESCAPE_SYMS {
            return Err(LontarError::Lz(format!(
                "escape code {escape} out of range"
            )));
        }
        let (len, dist) = if escape < ESC_LEFT_1 {
            let dist = self.cache.get(escape - ESC_RECENT_0);
            if dist == 0 {
                return Err(LontarError::Lz(
                    "recent-distance escape hit an empty cache slot".to_string(),
                ));
            }
            // Recent hits do not touch the cache.
            return Ok((self.read_len(reader)?, dist));
        } else if escape < ESC_UP_N2 {
            let mut dist = (escape - ESC_LEFT_1) as u32 + 2;
            if dist == 2 {
                dist = 1;
            }
            (self.read_len(reader)?, dist)
        } else if escape < ESC_SHORT_2 {
            let dist = self
                .xsize
                .wrapping_add((escape - ESC_UP_N2) as u32)
                .wrapping_sub(2)
                & DIST_MASK;
            if dist == 0 {
                return Err(LontarError::Lz(
                    "local-up escape yields distance zero".to_string(),
                ));
            }
            (self.read_len(reader)?, dist)
        } else if escape < ESC_LONG_2 {
            let mut len = (escape - ESC_SHORT_2) as u32 + 2;
            if len > ESC_INLINE_LEN_MAX {
                len = self.read_len(reader)?;
            }
            (len, self.read_dist(&self.dec_sdist, reader)?)
        } else {
            let mut len = (escape - ESC_LONG_2) as u32 + 2;
            if len > ESC_INLINE_LEN_MAX {
                len = self.read_len(reader)?;
            }
            let dist = self.read_dist(&self.dec_ldist, reader)?;
            if dist > DIST_MASK {
                return Err(LontarError::Lz(format!(
                    "decoded distance {dist} exceeds the window"
                )));
            }
            (len, dist)
        };
        self.cache.insert(dist);
        Ok((len, dist))
    }
}
