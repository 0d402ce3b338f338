// fqpack
// Copyright (c) 2019-2026 The fqpack Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The de-novo assembled sequence coder: no external reference is
//! supplied, so the first `seed_reads` reads themselves become the
//! alignment source, and every read after that (including the seed reads
//! themselves, once they're indexed) is coded against whichever of them it
//! seeds into. This mirrors `quip`'s assembler in spirit — build a contig
//! set from early reads, align the rest to it — without reimplementing its
//! de Bruijn-graph contig assembly; contigs here are simply the raw seed
//! reads rather than merged overlaps.

use crate::align::{AlignSource, AlignedSeqDecoder, AlignedSeqEncoder, SeedIndex};
use fqpack_core::codecs::seq::{SeqDecoder, SeqEncoder};
use fqpack_core::io::ByteSink;
use std::io;
use std::sync::{Arc, RwLock};

/// How many reads seed the contig set before the assembler commits to
/// aligning everything else against it. Chosen to comfortably exceed one
/// chunk, so a typical FASTQ file's early coverage already has something to
/// align to by the time most reads arrive.
pub const DEFAULT_SEED_READS: usize = 4096;

/// The growing contig set: the first `seed_reads` reads seen, kept verbatim
/// and indexed for seed lookup once the budget is spent.
#[derive(Default)]
pub struct ContigSet {
    contigs: Vec<Vec<u8>>,
    seed_reads: usize,
}

impl ContigSet {
    pub fn new(seed_reads: usize) -> Self {
        ContigSet { contigs: Vec::new(), seed_reads }
    }

    fn is_seeding(&self) -> bool {
        self.contigs.len() < self.seed_reads
    }

    fn add_contig(&mut self, bases: Vec<u8>) {
        self.contigs.push(bases);
    }
}

impl AlignSource for ContigSet {
    fn num_sequences(&self) -> usize {
        self.contigs.len()
    }

    fn seq_len(&self, idx: usize) -> usize {
        self.contigs[idx].len()
    }

    fn base_at(&self, idx: usize, pos: usize) -> u8 {
        self.contigs[idx][pos]
    }
}

/// Wraps [`AlignedSeqEncoder`], additionally feeding every read into the
/// shared [`ContigSet`]/[`SeedIndex`] while the assembler is still in its
/// seeding phase.
pub struct AssembledSeqEncoder {
    inner: AlignedSeqEncoder<ContigSet>,
    contigs: Arc<RwLock<ContigSet>>,
    index: Arc<RwLock<SeedIndex>>,
}

impl AssembledSeqEncoder {
    pub fn new(seed_reads: usize) -> Self {
        let contigs = Arc::new(RwLock::new(ContigSet::new(seed_reads)));
        let index = Arc::new(RwLock::new(SeedIndex::new()));
        let inner = AlignedSeqEncoder::new(Arc::clone(&contigs), Arc::clone(&index));
        AssembledSeqEncoder { inner, contigs, index }
    }
}

impl Default for AssembledSeqEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_SEED_READS)
    }
}

impl SeqEncoder for AssembledSeqEncoder {
    fn encode(&mut self, seq: &[u8]) {
        let still_seeding = self.contigs.read().expect("contig set lock poisoned").is_seeding();
        self.inner.encode(seq);
        if still_seeding {
            let mut contigs = self.contigs.write().expect("contig set lock poisoned");
            let new_idx = contigs.num_sequences();
            contigs.add_contig(seq.to_vec());
            let done_seeding = !contigs.is_seeding();
            drop(contigs);
            let contigs = self.contigs.read().expect("contig set lock poisoned");
            self.index.write().expect("seed index lock poisoned").index_sequence(&*contigs, new_idx);
            if done_seeding {
                log::debug!("assembled seq coder: contig set reached its seed budget at {} contigs", new_idx + 1);
            }
        }
    }

    fn finish(&mut self) -> u32 {
        self.inner.finish()
    }

    fn flush(&mut self, sink: &mut dyn ByteSink) -> io::Result<()> {
        self.inner.flush(sink)
    }
}

/// The decoding half of [`AssembledSeqEncoder`].
///
/// Reads are fed back into the same growing contig set in the same order
/// they were encoded, so the decoder's seed index tracks the encoder's
/// exactly: by the time a read was coded as an alignment hit, the contig it
/// hit against had already been indexed on both sides.
pub struct AssembledSeqDecoder {
    inner: AlignedSeqDecoder<ContigSet>,
    contigs: Arc<RwLock<ContigSet>>,
    index: Arc<RwLock<SeedIndex>>,
}

impl AssembledSeqDecoder {
    pub fn new(seed_reads: usize) -> Self {
        let contigs = Arc::new(RwLock::new(ContigSet::new(seed_reads)));
        let index = Arc::new(RwLock::new(SeedIndex::new()));
        let inner = AlignedSeqDecoder::new(Arc::clone(&contigs));
        AssembledSeqDecoder { inner, contigs, index }
    }
}

impl Default for AssembledSeqDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_SEED_READS)
    }
}

impl SeqDecoder for AssembledSeqDecoder {
    fn reset_decoder(&mut self, buf: Vec<u8>) {
        self.inner.reset_decoder(buf);
    }

    fn start_decoder(&mut self) {
        self.inner.start_decoder();
    }

    fn decode(&mut self, len: usize) -> Vec<u8> {
        let still_seeding = self.contigs.read().expect("contig set lock poisoned").is_seeding();
        let out = self.inner.decode(len);
        if still_seeding {
            let mut contigs = self.contigs.write().expect("contig set lock poisoned");
            let new_idx = contigs.num_sequences();
            contigs.add_contig(out.clone());
            drop(contigs);
            let contigs = self.contigs.read().expect("contig set lock poisoned");
            self.index.write().expect("seed index lock poisoned").index_sequence(&*contigs, new_idx);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn early_reads_round_trip_through_literal_fallback() {
        let mut enc = AssembledSeqEncoder::new(2);
        let reads: [&[u8]; 2] = [b"ACGTACGTACGT", b"TTTTGGGGCCCC"];
        for r in reads {
            enc.encode(r);
        }
        enc.finish();
        let mut bytes = Vec::new();
        enc.flush(&mut bytes).unwrap();

        let mut dec = AssembledSeqDecoder::new(2);
        dec.reset_decoder(bytes);
        dec.start_decoder();
        for r in reads {
            assert_eq!(dec.decode(r.len()), r);
        }
    }

    #[test]
    fn later_reads_align_to_earlier_seed_reads() {
        let mut enc = AssembledSeqEncoder::new(1);
        let seed = b"ACGTACGTACGTACGTACGTACGTACGTACGT".to_vec();
        let repeat = seed[4..24].to_vec();
        let reads: Vec<Vec<u8>> = vec![seed, repeat];
        for r in &reads {
            enc.encode(r);
        }
        enc.finish();
        let mut bytes = Vec::new();
        enc.flush(&mut bytes).unwrap();

        let mut dec = AssembledSeqDecoder::new(1);
        dec.reset_decoder(bytes);
        dec.start_decoder();
        for r in &reads {
            assert_eq!(&dec.decode(r.len()), r);
        }
    }
}
