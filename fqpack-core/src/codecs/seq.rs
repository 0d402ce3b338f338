// fqpack
// Copyright (c) 2019-2026 The fqpack Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The sequence sub-stream codec and its pluggable-variant interface.
//!
//! Three collaborators can produce the sequence sub-stream for a container:
//! the order-N nucleotide model in this module (always available), and the
//! de-novo assembler and reference-aligned coders in `fqpack-seq` (optional,
//! selected once per run from the container's header flags, never mixed
//! within a run). [`SeqEncoder`]/[`SeqDecoder`] are the capability both
//! sides implement so the block writer/reader never needs to know which
//! variant is active.

use crate::dist::{CondDistribution, Distribution};
use crate::io::ByteSink;
use std::io;

/// Encoding side of a pluggable sequence sub-stream collaborator.
///
/// Implementors own their arithmetic coder internally; the block writer
/// only calls these four methods, in this order, once per block:
/// `encode` for every read in every chunk, then `finish`, then `flush`.
pub trait SeqEncoder: Send {
    fn encode(&mut self, seq: &[u8]);
    fn finish(&mut self) -> u32;
    fn flush(&mut self, sink: &mut dyn ByteSink) -> io::Result<()>;
}

/// Decoding side, symmetric to [`SeqEncoder`].
pub trait SeqDecoder: Send {
    fn reset_decoder(&mut self, buf: Vec<u8>);
    fn start_decoder(&mut self);
    fn decode(&mut self, len: usize) -> Vec<u8>;
}

/// The sixteen IUPAC nucleotide ambiguity codes this model has a dedicated
/// symbol for; anything else (stray whitespace, lowercase masking, etc.)
/// falls back to the escape symbol plus a literal byte.
const ALPHABET: &[u8; 16] = b"ACGTNRYSWKMBDHVU";
const ALPHABET_LEN: usize = ALPHABET.len();
/// One extra symbol for "not in the alphabet, see the literal byte model".
const NUM_SYMBOLS: usize = ALPHABET_LEN + 1;
const ESCAPE: usize = ALPHABET_LEN;
const NUM_CONTEXTS: usize = NUM_SYMBOLS * NUM_SYMBOLS;

fn symbol_index(b: u8) -> usize {
    ALPHABET.iter().position(|&c| c == b).unwrap_or(ESCAPE)
}

#[inline]
fn context(prev1: usize, prev2: usize) -> usize {
    prev1 * NUM_SYMBOLS + prev2
}

/// Per-block adaptive state for the order-2 nucleotide model.
struct PlainSeqModel {
    symbol: CondDistribution<NUM_SYMBOLS, NUM_CONTEXTS>,
    literal_byte: Distribution<256>,
}

impl PlainSeqModel {
    fn new() -> Self {
        PlainSeqModel { symbol: CondDistribution::new(), literal_byte: Distribution::new() }
    }
}

/// The mandatory sequence coder: an order-2 adaptive model over the IUPAC
/// nucleotide alphabet, with an escape path for anything else.
pub struct PlainSeqEncoder {
    ac: crate::ac::Encoder,
    model: Box<PlainSeqModel>,
}

impl Default for PlainSeqEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl PlainSeqEncoder {
    pub fn new() -> Self {
        PlainSeqEncoder { ac: crate::ac::Encoder::new(), model: Box::new(PlainSeqModel::new()) }
    }
}

impl SeqEncoder for PlainSeqEncoder {
    fn encode(&mut self, seq: &[u8]) {
        let mut prev1 = 0usize;
        let mut prev2 = 0usize;
        for &b in seq {
            let idx = symbol_index(b);
            let ctx = context(prev1, prev2);
            self.model.symbol.encode(&mut self.ac, ctx, idx);
            if idx == ESCAPE {
                self.model.literal_byte.encode(&mut self.ac, b as usize);
            }
            prev2 = prev1;
            prev1 = idx;
        }
    }

    fn finish(&mut self) -> u32 {
        self.ac.finish();
        let n = self.ac.len() as u32;
        self.model = Box::new(PlainSeqModel::new());
        n
    }

    fn flush(&mut self, sink: &mut dyn ByteSink) -> io::Result<()> {
        self.ac.drain_to(sink)?;
        self.ac.reset();
        Ok(())
    }
}

/// The decoding half of [`PlainSeqEncoder`].
pub struct PlainSeqDecoder {
    ac: crate::ac::Decoder,
    model: Box<PlainSeqModel>,
}

impl Default for PlainSeqDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl PlainSeqDecoder {
    pub fn new() -> Self {
        PlainSeqDecoder { ac: crate::ac::Decoder::new(), model: Box::new(PlainSeqModel::new()) }
    }
}

impl SeqDecoder for PlainSeqDecoder {
    fn reset_decoder(&mut self, buf: Vec<u8>) {
        self.ac.reset(buf);
        self.model = Box::new(PlainSeqModel::new());
    }

    fn start_decoder(&mut self) {
        self.ac.start();
    }

    fn decode(&mut self, len: usize) -> Vec<u8> {
        let mut prev1 = 0usize;
        let mut prev2 = 0usize;
        let mut out = Vec::with_capacity(len);
        for _ in 0..len {
            let ctx = context(prev1, prev2);
            let idx = self.model.symbol.decode(&mut self.ac, ctx);
            let b = if idx == ESCAPE {
                self.model.literal_byte.decode(&mut self.ac) as u8
            }
            else {
                ALPHABET[idx]
            };
            out.push(b);
            prev2 = prev1;
            prev1 = idx;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(reads: &[&[u8]]) -> Vec<Vec<u8>> {
        let mut enc = PlainSeqEncoder::new();
        for r in reads {
            enc.encode(r);
        }
        enc.finish();
        let mut bytes = Vec::new();
        enc.flush(&mut bytes).unwrap();

        let mut dec = PlainSeqDecoder::new();
        dec.reset_decoder(bytes);
        dec.start_decoder();
        reads.iter().map(|r| dec.decode(r.len())).collect()
    }

    #[test]
    fn round_trips_plain_acgt_reads() {
        let reads: [&[u8]; 3] = [b"ACGTACGTACGT", b"GGGGGGGGGGGGGGGG", b"TACGNNNNACGT"];
        let decoded = round_trip(&reads);
        for (a, b) in reads.iter().zip(decoded.iter()) {
            assert_eq!(a, &b.as_slice());
        }
    }

    #[test]
    fn escape_path_round_trips_unexpected_bytes() {
        let reads: [&[u8]; 1] = [b"ACGTacgt-.*xyz"];
        let decoded = round_trip(&reads);
        assert_eq!(reads[0], decoded[0].as_slice());
    }

    #[test]
    fn empty_read_round_trips() {
        let reads: [&[u8]; 2] = [b"", b"AC"];
        let decoded = round_trip(&reads);
        for (a, b) in reads.iter().zip(decoded.iter()) {
            assert_eq!(a, &b.as_slice());
        }
    }
}
