// fqpack
// Copyright (c) 2019-2026 The fqpack Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The quality sub-stream codec.
//!
//! Quality bytes are modeled relative to a per-block-run `base` byte
//! (transmitted out of band, via the block's quality-scheme RLE) so the
//! coder always sees small deltas in `[0, QUAL_SCALE)` rather than raw
//! ASCII quality characters. The context for each delta is `(position
//! bucket, previous delta, previous-previous delta)`, the same three-way
//! context `qualenc.h` conditions on, with position coarsened into a small
//! number of buckets so a long read does not blow up the context table the
//! way a context keyed on the raw position would.

use crate::ac::{Decoder, Encoder};
use crate::dist::{CondDistribution, Distribution};
use crate::io::ByteSink;
use std::io;

/// Width of the quality alphabet: every quality byte lies in
/// `[base, base + QUAL_SCALE)`.
pub const QUAL_SCALE: u8 = 64;

const QUAL_SCALE_USIZE: usize = QUAL_SCALE as usize;

/// Read positions beyond this are folded into the last bucket, bounding the
/// context table regardless of read length.
const POS_BUCKETS: usize = 8;

const NUM_CONTEXTS: usize = POS_BUCKETS * QUAL_SCALE_USIZE * QUAL_SCALE_USIZE;

#[inline]
fn context(pos: usize, q1: u8, q2: u8) -> usize {
    let bucket = pos.min(POS_BUCKETS - 1);
    (bucket * QUAL_SCALE_USIZE + q1 as usize) * QUAL_SCALE_USIZE + q2 as usize
}

/// `NUM_CONTEXTS` spreads a block's quality bytes far thinner per context
/// than any other sub-stream's model, so each context sees few observations
/// before a block ends; a faster update rate than the default rebuilds its
/// table sooner off those few observations instead of coasting on a stale
/// uniform prior for most of the block.
fn fresh_dist() -> Box<CondDistribution<QUAL_SCALE_USIZE, NUM_CONTEXTS>> {
    let mut dist: CondDistribution<QUAL_SCALE_USIZE, NUM_CONTEXTS> = CondDistribution::new();
    dist.set_update_rate(2);
    Box::new(dist)
}

/// The encoder half of one block's quality sub-stream.
pub struct QualEncoder {
    ac: Encoder,
    dist: Box<CondDistribution<QUAL_SCALE_USIZE, NUM_CONTEXTS>>,
    /// Whether a read's quality bytes are present at all. The block's
    /// read-length RLE is shared with the sequence sub-stream and always
    /// reflects `seq.len()`, so a read with zero quality bytes (legal per
    /// the `|qual| ∈ {0, |seq|}` invariant) needs its own presence marker
    /// rather than relying on the externally supplied length.
    present: Distribution<2>,
    base: u8,
}

impl Default for QualEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl QualEncoder {
    pub fn new() -> Self {
        QualEncoder {
            ac: Encoder::new(),
            dist: fresh_dist(),
            present: Distribution::new(),
            base: 0,
        }
    }

    /// Informs the codec of the active quality-scheme base for the chunks
    /// about to be encoded; called once per chunk by the block writer.
    pub fn set_base(&mut self, base: u8) {
        self.base = base;
    }

    /// Encodes one read's quality bytes, each already known to lie within
    /// `[base, base + QUAL_SCALE)`, or an empty slice if this read carries
    /// no quality scores at all.
    pub fn encode(&mut self, qual: &[u8]) {
        self.present.encode(&mut self.ac, if qual.is_empty() { 0 } else { 1 });
        let mut q1 = 0u8;
        let mut q2 = 0u8;
        for (pos, &q) in qual.iter().enumerate() {
            let delta = q - self.base;
            debug_assert!((delta as u16) < QUAL_SCALE as u16);
            let y = context(pos, q1, q2);
            self.dist.encode(&mut self.ac, y, delta as usize);
            q2 = q1;
            q1 = delta;
        }
    }

    /// Flushes the trailing arithmetic-coder bits, returns this block's
    /// compressed byte count, and rearms the adaptive tables for the next
    /// block.
    pub fn finish(&mut self) -> u32 {
        self.ac.finish();
        let n = self.ac.len() as u32;
        self.dist = fresh_dist();
        self.present = Distribution::new();
        n
    }

    /// Drains the compressed bytes produced since the last `flush` to
    /// `sink`, rearming the underlying arithmetic coder for the next block.
    pub fn flush<W: ByteSink + ?Sized>(&mut self, sink: &mut W) -> io::Result<()> {
        self.ac.drain_to(sink)?;
        self.ac.reset();
        Ok(())
    }
}

/// The decoder half of one block's quality sub-stream.
pub struct QualDecoder {
    ac: Decoder,
    dist: Box<CondDistribution<QUAL_SCALE_USIZE, NUM_CONTEXTS>>,
    present: Distribution<2>,
    base: u8,
}

impl Default for QualDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl QualDecoder {
    pub fn new() -> Self {
        QualDecoder {
            ac: Decoder::new(),
            dist: fresh_dist(),
            present: Distribution::new(),
            base: 0,
        }
    }

    pub fn set_base(&mut self, base: u8) {
        self.base = base;
    }

    /// Points the decoder at a fresh block's compressed bytes and resets
    /// the adaptive tables, discarding whatever the previous block left
    /// behind.
    pub fn reset_decoder(&mut self, buf: Vec<u8>) {
        self.ac.reset(buf);
        self.dist = fresh_dist();
        self.present = Distribution::new();
    }

    /// Primes the arithmetic decoder's bit register; must follow
    /// `reset_decoder` and precede the first `decode` of a block.
    pub fn start_decoder(&mut self) {
        self.ac.start();
    }

    /// Decodes one read's quality bytes. `len` is the read's length from
    /// the block's shared read-length RLE; if the read carries no quality
    /// at all, `out` is left empty regardless of `len`.
    pub fn decode(&mut self, len: usize, out: &mut Vec<u8>) {
        if self.present.decode(&mut self.ac) == 0 {
            return;
        }
        let mut q1 = 0u8;
        let mut q2 = 0u8;
        for pos in 0..len {
            let y = context(pos, q1, q2);
            let delta = self.dist.decode(&mut self.ac, y) as u8;
            out.push(self.base + delta);
            q2 = q1;
            q1 = delta;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_reads_of_varying_length() {
        let base = 33u8;
        let reads: Vec<Vec<u8>> = vec![
            (0..40).map(|i| base + (i % QUAL_SCALE)).collect(),
            vec![base + 10; 75],
            (0..12).map(|i| base + ((i * 7) % QUAL_SCALE)).collect(),
        ];

        let mut enc = QualEncoder::new();
        enc.set_base(base);
        for r in &reads {
            enc.encode(r);
        }
        enc.finish();
        let mut bytes = Vec::new();
        enc.flush(&mut bytes).unwrap();

        let mut dec = QualDecoder::new();
        dec.set_base(base);
        dec.reset_decoder(bytes);
        dec.start_decoder();

        for r in &reads {
            let mut out = Vec::new();
            dec.decode(r.len(), &mut out);
            assert_eq!(&out, r);
        }
    }

    #[test]
    fn zero_length_quality_round_trips_alongside_full_length_reads() {
        let base = 33u8;
        let reads: Vec<Vec<u8>> = vec![vec![base + 5; 10], Vec::new(), vec![base + 1; 4]];
        let lens = [10usize, 4, 4];

        let mut enc = QualEncoder::new();
        enc.set_base(base);
        for r in &reads {
            enc.encode(r);
        }
        enc.finish();
        let mut bytes = Vec::new();
        enc.flush(&mut bytes).unwrap();

        let mut dec = QualDecoder::new();
        dec.set_base(base);
        dec.reset_decoder(bytes);
        dec.start_decoder();

        for (r, &len) in reads.iter().zip(lens.iter()) {
            let mut out = Vec::new();
            dec.decode(len, &mut out);
            assert_eq!(&out, r);
        }
    }
}
