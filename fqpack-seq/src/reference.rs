// fqpack
// Copyright (c) 2019-2026 The fqpack Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The reference-aligned sequence coder: reads are aligned against an
//! externally supplied FASTA reference set rather than coded from scratch.
//! The reference set's bookkeeping (name-sorted lookup, CRC64 fingerprint,
//! the container header's reference-info block) is grounded directly on
//! `quip`'s `seqmap_t`: a `qsort`-then-`bsearch` table of named sequences,
//! hashed once for the header's integrity check.

use crate::align::{AlignSource, AlignedSeqDecoder, AlignedSeqEncoder, SeedIndex};
use crate::twobit::TwoBitSeq;
use fqpack_core::checksum::Crc64;
use fqpack_core::container::ReferenceInfo;
use std::sync::{Arc, RwLock};

/// A FASTA reference set kept sorted by sequence name, mirroring
/// `seqmap_t`'s binary-searchable layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeqMap {
    entries: Vec<(String, TwoBitSeq)>,
}

impl SeqMap {
    /// Builds a map from `(name, bases)` pairs, sorting by name the way
    /// `seqmap_t` does before any lookup is possible.
    pub fn from_sequences(sequences: Vec<(String, Vec<u8>)>) -> Self {
        let mut entries: Vec<(String, TwoBitSeq)> =
            sequences.into_iter().map(|(name, bases)| (name, TwoBitSeq::from_bytes(&bases))).collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        log::debug!("reference set built: {} sequences", entries.len());
        SeqMap { entries }
    }

    /// A minimal single-record FASTA parser: `>name` lines start a new
    /// sequence, truncated at the first whitespace the way `seqmap.c`'s
    /// `seqmap_read_fasta` truncates at the first space; any other
    /// non-blank line is appended as sequence bytes.
    pub fn parse_fasta(text: &[u8]) -> Self {
        let mut sequences: Vec<(String, Vec<u8>)> = Vec::new();
        for line in text.split(|&b| b == b'\n') {
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            if let Some(rest) = line.strip_prefix(b">") {
                let name_bytes = rest.split(|&b| b == b' ' || b == b'\t').next().unwrap_or(rest);
                let name = String::from_utf8_lossy(name_bytes).into_owned();
                sequences.push((name, Vec::new()));
            }
            else if !line.is_empty() {
                if let Some((_, bases)) = sequences.last_mut() {
                    bases.extend_from_slice(line);
                }
            }
        }
        Self::from_sequences(sequences)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Binary-searches by name, symmetric to `seqmap_get`.
    pub fn get(&self, name: &str) -> Option<&TwoBitSeq> {
        self.entries.binary_search_by(|(n, _)| n.as_str().cmp(name)).ok().map(|i| &self.entries[i].1)
    }

    fn index_of(&self, idx: usize) -> &TwoBitSeq {
        &self.entries[idx].1
    }

    /// Folds every sequence's name then its packed bases into a running
    /// CRC64, the same fold order as `seqmap_crc64`.
    pub fn crc64(&self) -> u64 {
        let mut crc = Crc64::new();
        for (name, seq) in &self.entries {
            crc.update(name.as_bytes());
            seq.crc64_into(&mut crc);
        }
        crc.finalize()
    }

    /// The container header block this reference set commits to, matching
    /// `seqmap_write_quip_header_info`'s field order.
    pub fn header_info(&self, filename: Vec<u8>) -> ReferenceInfo {
        ReferenceInfo {
            crc64: self.crc64(),
            filename,
            sequences: self.entries.iter().map(|(name, seq)| (name.clone().into_bytes(), seq.len() as u64)).collect(),
        }
    }

    fn seed_index(&self) -> SeedIndex {
        let mut index = SeedIndex::new();
        for i in 0..self.entries.len() {
            index.index_sequence(self, i);
        }
        index
    }
}

impl Default for SeqMap {
    fn default() -> Self {
        SeqMap { entries: Vec::new() }
    }
}

impl AlignSource for SeqMap {
    fn num_sequences(&self) -> usize {
        self.entries.len()
    }

    fn seq_len(&self, idx: usize) -> usize {
        self.index_of(idx).len()
    }

    fn base_at(&self, idx: usize, pos: usize) -> u8 {
        self.index_of(idx).get(pos)
    }
}

/// Builds an encoder/decoder pair sharing one [`SeqMap`] and its seed index,
/// the shape `container::Writer::new`/`container::Reader::new` expect for
/// the `seq_enc`/`seq_dec` argument.
pub fn encoder(reference: SeqMap) -> AlignedSeqEncoder<SeqMap> {
    let index = Arc::new(RwLock::new(reference.seed_index()));
    AlignedSeqEncoder::new(Arc::new(RwLock::new(reference)), index)
}

pub fn decoder(reference: SeqMap) -> AlignedSeqDecoder<SeqMap> {
    AlignedSeqDecoder::new(Arc::new(RwLock::new(reference)))
}
