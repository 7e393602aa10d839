// In: src/kernels/codec_tests.rs

//! Integration tests across the codec kernels: the entropy coder and the
//! match codec sharing one bit stream, the way a tile compressor drives them.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::bitio::{BitReader, BitWriter};
use crate::config::CodecConfig;
use crate::kernels::entropy::{EntropyDecoder, EntropyEncoder};
use crate::kernels::huffman::{CanonicalDecoder, CodeTable, Histogram};
use crate::kernels::lz::{LzDecoder, LzEncoder, ESCAPE_SYMS};

/// Route `codec_metric!` lines through the test harness when RUST_LOG is set.
fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn entropy_roundtrip(data: &[u8], cfg: CodecConfig) {
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
    let bytes = w.into_bytes();

    let mut r = BitReader::from_bytes(&bytes);
    let mut dec = EntropyDecoder::init(&mut r, &cfg).unwrap();
    let mut out = Vec::with_capacity(data.len());
    while let Some(b) = dec.decode_next(&mut r).unwrap() {
        out.push(b);
    }
    assert_eq!(out, data, "cfg {cfg:?}, {} bytes", data.len());
}

/// Zero-heavy byte planes, the shape residual data actually takes.
fn sparse_plane(rng: &mut StdRng, len: usize, zero_pct: u32) -> Vec<u8> {
    (0..len)
        .map(|_| {
            if rng.random_range(0..100u32) < zero_pct {
                0
            } else {
                rng.random_range(1..=255u32) as u8
            }
        })
        .collect()
}

#[test]
fn test_entropy_random_planes_both_configs() {
    init_logs();
    let mut rng = StdRng::seed_from_u64(0x5EED);
    for zero_pct in [0u32, 30, 60, 90, 99] {
        for _ in 0..4 {
            let data = sparse_plane(&mut rng, 4096, zero_pct);
            entropy_roundtrip(&data, CodecConfig { after_zero: true });
            entropy_roundtrip(&data, CodecConfig { after_zero: false });
        }
    }
}

#[test]
fn test_entropy_output_is_deterministic() {
    let mut rng = StdRng::seed_from_u64(7);
    let data = sparse_plane(&mut rng, 2048, 70);
    let encode = |data: &[u8]| {
        let cfg = CodecConfig::default();
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
    };
    assert_eq!(encode(&data), encode(&data));
}

/// One symbol past the escape band flags a raw literal in the host alphabet.
const HOST_LIT: u16 = ESCAPE_SYMS;
const HOST_SYMS: usize = ESCAPE_SYMS as usize + 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Event {
    Lit(u8),
    Match(u32, u32),
}

/// Drives the match codec the way its caller contract intends: escape codes
/// live in a host alphabet alongside a literal marker, the match payload
/// follows each escape inline.
fn event_stream_roundtrip(xsize: u32, events: &[Event]) {
    // Pass one: statistics.
    let mut lz = LzEncoder::new(xsize);
    let mut host_hist = Histogram::new(HOST_SYMS);
    for &ev in events {
        match ev {
            Event::Lit(_) => host_hist.add(HOST_LIT),
            Event::Match(len, dist) => host_hist.add(lz.record(len, dist).unwrap()),
        }
    }
    lz.finalize();
    let host_table = CodeTable::build(&host_hist);

    // Pass two: tables then the replayed event stream.
    let mut w = BitWriter::new();
    host_table.write(&mut w);
    lz.write_tables(&mut w).unwrap();
    for &ev in events {
        match ev {
            Event::Lit(b) => {
                host_table.write_symbol(HOST_LIT, &mut w).unwrap();
                w.write_bits(b as u32, 8);
            }
            Event::Match(len, dist) => {
                let esc = lz.escape_code(len, dist).unwrap();
                host_table.write_symbol(esc, &mut w).unwrap();
                lz.encode(len, dist, &mut w).unwrap();
            }
        }
    }
    let bytes = w.into_bytes();

    let mut r = BitReader::from_bytes(&bytes);
    let host_dec =
        CanonicalDecoder::from_lengths(CodeTable::read(HOST_SYMS, &mut r).unwrap().lens())
            .unwrap();
    let mut lz_dec = LzDecoder::init(xsize, &mut r).unwrap();
    for (i, &ev) in events.iter().enumerate() {
        let sym = host_dec.decode_symbol(&mut r).unwrap();
        let got = if sym == HOST_LIT {
            Event::Lit(r.read_bits(8).unwrap() as u8)
        } else {
            let (len, dist) = lz_dec.read(sym, &mut r).unwrap();
            Event::Match(len, dist)
        };
        assert_eq!(got, ev, "event {i}");
    }
    assert!(r.remaining() < 8, "trailing garbage beyond byte padding");
}

#[test]
fn test_mixed_literal_and_match_stream() {
    let events = vec![
        Event::Lit(42),
        Event::Match(5, 500),
        Event::Match(5, 500),
        Event::Lit(0),
        Event::Match(12, 1),
        Event::Match(3, 200),
        Event::Match(64, 200),
        Event::Lit(255),
        Event::Match(9, 70_000),
        Event::Match(257, 200),
    ];
    event_stream_roundtrip(100, &events);
}

#[test]
fn test_random_event_streams() {
    init_logs();
    let mut rng = StdRng::seed_from_u64(0xC0DEC);
    for _ in 0..8 {
        let xsize = rng.random_range(16..=1024u32);
        let mut recent = Vec::new();
        let events: Vec<Event> = (0..500)
            .map(|_| {
                if rng.random_range(0..10u32) < 4 {
                    Event::Lit(rng.random_range(0..=255u32) as u8)
                } else {
                    let len = rng.random_range(2..=257u32);
                    // Mix fresh distances with reuses so every band,
                    // including recent, gets exercised.
                    let dist = if !recent.is_empty() && rng.random_range(0..4u32) == 0 {
                        recent[rng.random_range(0..recent.len())]
                    } else {
                        let d = rng.random_range(1..=200_000u32);
                        recent.push(d);
                        if recent.len() > 4 {
                            recent.remove(0);
                        }
                        d
                    };
                    Event::Match(len, dist)
                }
            })
            .collect();
        event_stream_roundtrip(xsize, &events);
    }
}

#[test]
fn test_entropy_and_lz_share_one_stream() {
    // A plane followed by a match stream in the same bit channel; the
    // section boundary is implicit in the symbols, no byte alignment.
    let cfg = CodecConfig::default();
    let plane = [7u8, 0, 0, 0, 9, 0, 1];
    let matches = [(5u32, 12u32), (5, 12), (30, 1)];

    let mut ent = EntropyEncoder::new(cfg);
    for &b in &plane {
        ent.push(b);
    }
    ent.finalize();
    let mut lz = LzEncoder::new(64);
    let mut escapes = Vec::new();
    for &(len, dist) in &matches {
        escapes.push(lz.record(len, dist).unwrap());
    }
    lz.finalize();

    let mut w = BitWriter::new();
    ent.write_overhead(&mut w).unwrap();
    lz.write_tables(&mut w).unwrap();
    for &b in &plane {
        ent.encode(b, &mut w).unwrap();
    }
    ent.encode_finalize(&mut w).unwrap();
    for &(len, dist) in &matches {
        w.write_bits(lz.escape_code(len, dist).unwrap() as u32, 6);
        lz.encode(len, dist, &mut w).unwrap();
    }
    let bytes = w.into_bytes();

    let mut r = BitReader::from_bytes(&bytes);
    let mut ent_dec = EntropyDecoder::init(&mut r, &cfg).unwrap();
    let mut lz_dec = LzDecoder::init(64, &mut r).unwrap();
    let mut out = Vec::new();
    while let Some(b) = ent_dec.decode_next(&mut r).unwrap() {
        out.push(b);
    }
    assert_eq!(out, plane);
    for (i, &(len, dist)) in matches.iter().enumerate() {
        let esc = r.read_bits(6).unwrap() as u16;
        assert_eq!(esc, escapes[i]);
        assert_eq!(lz_dec.read(esc, &mut r).unwrap(), (len, dist));
    }
}
