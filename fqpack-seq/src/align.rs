// fqpack
// Copyright (c) 2019-2026 The fqpack Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Shared seed-and-extend residual coder: both `reference.rs`'s
//! reference-aligned coder and `assembled.rs`'s de-novo coder reduce to
//! "align a read against a fixed set of nucleotide sequences, code it as a
//! run of match bits against the aligned position, fall back to literal
//! bytes". Only the alignment source differs (an externally supplied
//! reference set versus the assembler's own growing contig set), so that
//! source is abstracted behind [`AlignSource`] and the residual model lives
//! here once.

use fqpack_core::ac::{Decoder as AcDecoder, Encoder as AcEncoder};
use fqpack_core::codecs::seq::{SeqDecoder, SeqEncoder};
use fqpack_core::dist::Distribution;
use fqpack_core::io::ByteSink;
use std::collections::HashMap;
use std::io;
use std::sync::{Arc, RwLock};

/// Bases a read's leading k-mer must match exactly before a candidate
/// alignment position is even considered.
pub const SEED_LEN: usize = 16;
const MAX_SOURCES: usize = 256;

fn base_code(b: u8) -> Option<u32> {
    match b.to_ascii_uppercase() {
        b'A' => Some(0),
        b'C' => Some(1),
        b'G' => Some(2),
        b'T' => Some(3),
        _ => None,
    }
}

/// A fixed set of nucleotide sequences a read can be aligned against.
pub trait AlignSource: Send + Sync {
    fn num_sequences(&self) -> usize;
    fn seq_len(&self, idx: usize) -> usize;
    fn base_at(&self, idx: usize, pos: usize) -> u8;
}

/// First-occurrence index from a packed `SEED_LEN`-base seed to the
/// `(sequence index, position)` it was first seen at. Only exact `A/C/G/T`
/// runs are indexable; anything else (including a read's own seed) simply
/// never finds a hit, and the encoder falls back to literal coding.
#[derive(Default)]
pub struct SeedIndex {
    map: HashMap<u32, (u32, u32)>,
}

impl SeedIndex {
    pub fn new() -> Self {
        SeedIndex::default()
    }

    /// Indexes every `SEED_LEN`-base window of one sequence in `source`.
    pub fn index_sequence(&mut self, source: &dyn AlignSource, seq_idx: usize) {
        let len = source.seq_len(seq_idx);
        if len < SEED_LEN {
            return;
        }
        let mut seed = 0u32;
        let mut run = 0usize;
        for pos in 0..len {
            match base_code(source.base_at(seq_idx, pos)) {
                Some(code) => {
                    seed = (seed << 2) | code;
                    run += 1;
                }
                None => {
                    seed = 0;
                    run = 0;
                }
            }
            if run >= SEED_LEN {
                let start = (pos + 1 - SEED_LEN) as u32;
                self.map.entry(seed).or_insert((seq_idx as u32, start));
            }
        }
    }

    fn seed_of(bytes: &[u8]) -> Option<u32> {
        if bytes.len() < SEED_LEN {
            return None;
        }
        let mut seed = 0u32;
        for &b in &bytes[..SEED_LEN] {
            seed = (seed << 2) | base_code(b)?;
        }
        Some(seed)
    }

    pub fn lookup(&self, read: &[u8]) -> Option<(u32, u32)> {
        Self::seed_of(read).and_then(|seed| self.map.get(&seed).copied())
    }
}

/// Per-block adaptive state for the residual model: a hit bit, the aligned
/// source index, a big-endian offset, a per-base match bit, and a literal
/// byte model covering both mismatches and the no-seed fallback path.
struct ResidualModel {
    has_hit: Distribution<2>,
    source_idx: Distribution<MAX_SOURCES>,
    offset_bytes: [Distribution<256>; 4],
    match_bit: Distribution<2>,
    literal_byte: Distribution<256>,
}

impl ResidualModel {
    fn new() -> Self {
        ResidualModel {
            has_hit: Distribution::new(),
            source_idx: Distribution::new(),
            offset_bytes: std::array::from_fn(|_| Distribution::new()),
            match_bit: Distribution::new(),
            literal_byte: Distribution::new(),
        }
    }
}

/// Encoding side shared by `reference.rs` and `assembled.rs`: looks each
/// read up in a [`SeedIndex`] over `source`, and on a hit codes it as a
/// per-base match/mismatch run against the aligned position; on a miss it
/// codes every byte through the literal model directly.
pub struct AlignedSeqEncoder<S: AlignSource> {
    ac: AcEncoder,
    model: Box<ResidualModel>,
    source: Arc<RwLock<S>>,
    index: Arc<RwLock<SeedIndex>>,
}

impl<S: AlignSource> AlignedSeqEncoder<S> {
    pub fn new(source: Arc<RwLock<S>>, index: Arc<RwLock<SeedIndex>>) -> Self {
        AlignedSeqEncoder { ac: AcEncoder::new(), model: Box::new(ResidualModel::new()), source, index }
    }
}

impl<S: AlignSource> SeqEncoder for AlignedSeqEncoder<S> {
    fn encode(&mut self, seq: &[u8]) {
        let index = self.index.read().expect("seed index lock poisoned");
        let hit = index.lookup(seq);
        match hit {
            Some((seq_idx, offset)) if (seq_idx as usize) < MAX_SOURCES => {
                self.model.has_hit.encode(&mut self.ac, 1);
                self.model.source_idx.encode(&mut self.ac, seq_idx as usize);
                for (i, byte) in offset.to_be_bytes().into_iter().enumerate() {
                    self.model.offset_bytes[i].encode(&mut self.ac, byte as usize);
                }
                let source = self.source.read().expect("align source lock poisoned");
                let seq_idx = seq_idx as usize;
                let seq_len = source.seq_len(seq_idx);
                let mut cursor = offset as usize;
                for &b in seq {
                    let reference_base = if cursor < seq_len { Some(source.base_at(seq_idx, cursor)) } else { None };
                    let matches = reference_base == Some(b);
                    self.model.match_bit.encode(&mut self.ac, matches as usize);
                    if !matches {
                        self.model.literal_byte.encode(&mut self.ac, b as usize);
                    }
                    cursor += 1;
                }
            }
            _ => {
                self.model.has_hit.encode(&mut self.ac, 0);
                for &b in seq {
                    self.model.literal_byte.encode(&mut self.ac, b as usize);
                }
            }
        }
    }

    fn finish(&mut self) -> u32 {
        self.ac.finish();
        let n = self.ac.len() as u32;
        self.model = Box::new(ResidualModel::new());
        n
    }

    fn flush(&mut self, sink: &mut dyn ByteSink) -> io::Result<()> {
        self.ac.drain_to(sink)?;
        self.ac.reset();
        Ok(())
    }
}

/// The decoding half of [`AlignedSeqEncoder`].
pub struct AlignedSeqDecoder<S: AlignSource> {
    ac: AcDecoder,
    model: Box<ResidualModel>,
    source: Arc<RwLock<S>>,
}

impl<S: AlignSource> AlignedSeqDecoder<S> {
    pub fn new(source: Arc<RwLock<S>>) -> Self {
        AlignedSeqDecoder { ac: AcDecoder::new(), model: Box::new(ResidualModel::new()), source }
    }
}

impl<S: AlignSource> SeqDecoder for AlignedSeqDecoder<S> {
    fn reset_decoder(&mut self, buf: Vec<u8>) {
        self.ac.reset(buf);
        self.model = Box::new(ResidualModel::new());
    }

    fn start_decoder(&mut self) {
        self.ac.start();
    }

    fn decode(&mut self, len: usize) -> Vec<u8> {
        let hit = self.model.has_hit.decode(&mut self.ac) == 1;
        if !hit {
            return (0..len).map(|_| self.model.literal_byte.decode(&mut self.ac) as u8).collect();
        }
        let seq_idx = self.model.source_idx.decode(&mut self.ac);
        let mut offset_buf = [0u8; 4];
        for (i, slot) in offset_buf.iter_mut().enumerate() {
            *slot = self.model.offset_bytes[i].decode(&mut self.ac) as u8;
        }
        let offset = u32::from_be_bytes(offset_buf) as usize;

        let source = self.source.read().expect("align source lock poisoned");
        let mut cursor = offset;
        let mut out = Vec::with_capacity(len);
        for _ in 0..len {
            let matches = self.model.match_bit.decode(&mut self.ac) == 1;
            let b = if matches {
                source.base_at(seq_idx, cursor)
            }
            else {
                self.model.literal_byte.decode(&mut self.ac) as u8
            };
            out.push(b);
            cursor += 1;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FlatSource {
        seqs: Vec<Vec<u8>>,
    }

    impl AlignSource for FlatSource {
        fn num_sequences(&self) -> usize {
            self.seqs.len()
        }

        fn seq_len(&self, idx: usize) -> usize {
            self.seqs[idx].len()
        }

        fn base_at(&self, idx: usize, pos: usize) -> u8 {
            self.seqs[idx][pos]
        }
    }

    fn build(seqs: Vec<&[u8]>) -> (Arc<RwLock<FlatSource>>, Arc<RwLock<SeedIndex>>) {
        let source = FlatSource { seqs: seqs.into_iter().map(|s| s.to_vec()).collect() };
        let mut index = SeedIndex::new();
        for i in 0..source.num_sequences() {
            index.index_sequence(&source, i);
        }
        (Arc::new(RwLock::new(source)), Arc::new(RwLock::new(index)))
    }

    #[test]
    fn round_trips_exact_match_against_source() {
        let contig = b"ACGTACGTACGTACGTACGTACGTACGTACGT";
        let (source, index) = build(vec![contig]);
        let mut enc = AlignedSeqEncoder::new(Arc::clone(&source), Arc::clone(&index));
        let reads: [&[u8]; 2] = [&contig[0..20], &contig[5..25]];
        for r in reads {
            enc.encode(r);
        }
        enc.finish();
        let mut bytes = Vec::new();
        enc.flush(&mut bytes).unwrap();

        let mut dec = AlignedSeqDecoder::new(source);
        dec.reset_decoder(bytes);
        dec.start_decoder();
        for r in reads {
            assert_eq!(dec.decode(r.len()), r);
        }
    }

    #[test]
    fn round_trips_mismatches_and_misses() {
        let contig = b"ACGTACGTACGTACGTACGTACGTACGTACGT";
        let (source, index) = build(vec![contig]);
        let mut enc = AlignedSeqEncoder::new(Arc::clone(&source), Arc::clone(&index));
        let mut mismatched = contig[0..20].to_vec();
        mismatched[10] = b'N';
        let reads: Vec<Vec<u8>> = vec![mismatched, b"TTTTTTTTTTTTTTTTTTTTTTTT".to_vec(), b"".to_vec()];
        for r in &reads {
            enc.encode(r);
        }
        enc.finish();
        let mut bytes = Vec::new();
        enc.flush(&mut bytes).unwrap();

        let mut dec = AlignedSeqDecoder::new(source);
        dec.reset_decoder(bytes);
        dec.start_decoder();
        for r in &reads {
            assert_eq!(&dec.decode(r.len()), r);
        }
    }
}
