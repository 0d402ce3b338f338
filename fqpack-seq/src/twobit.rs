// fqpack
// Copyright (c) 2019-2026 The fqpack Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A 2-bit-per-base packed nucleotide sequence, the in-memory shape the
//! original codec's `twobit_t` stores a reference set in (`seqmap.c`): four
//! bases per byte, ambiguity codes and anything non-ACGT held out of band
//! as a sparse list of `(position, original byte)` exceptions so the packed
//! form never loses information.

use fqpack_core::checksum::Crc64;

fn base_code(b: u8) -> Option<u8> {
    match b.to_ascii_uppercase() {
        b'A' => Some(0),
        b'C' => Some(1),
        b'G' => Some(2),
        b'T' => Some(3),
        _ => None,
    }
}

fn code_base(code: u8) -> u8 {
    match code {
        0 => b'A',
        1 => b'C',
        2 => b'G',
        _ => b'T',
    }
}

/// A packed nucleotide sequence: every position decodes to exactly one of
/// `A`/`C`/`G`/`T` from the 2-bit array, with non-ACGT originals (lowercase,
/// `N`, IUPAC ambiguity codes, ...) recorded as exceptions and substituted
/// with `A` in the packed array so lookups never need a branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TwoBitSeq {
    len: usize,
    packed: Vec<u8>,
    exceptions: Vec<(u32, u8)>,
}

impl TwoBitSeq {
    pub fn from_bytes(bases: &[u8]) -> Self {
        let mut seq = TwoBitSeq { len: bases.len(), packed: vec![0u8; bases.len().div_ceil(4)], exceptions: Vec::new() };
        for (i, &b) in bases.iter().enumerate() {
            let code = base_code(b).unwrap_or_else(|| {
                seq.exceptions.push((i as u32, b));
                0
            });
            seq.packed[i / 4] |= code << ((i % 4) * 2);
        }
        seq
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The byte at `pos`, expanded back from its packed code (and any
    /// recorded exception).
    pub fn get(&self, pos: usize) -> u8 {
        if let Ok(idx) = self.exceptions.binary_search_by_key(&(pos as u32), |&(p, _)| p) {
            return self.exceptions[idx].1;
        }
        let code = (self.packed[pos / 4] >> ((pos % 4) * 2)) & 0b11;
        code_base(code)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        (0..self.len).map(|i| self.get(i)).collect()
    }

    /// CRC64 over the packed representation, the fingerprint half of a
    /// reference set's integrity check (`seqmap_crc64`'s per-sequence
    /// `twobit_crc64_update` call).
    pub fn crc64_into(&self, crc: &mut Crc64) {
        crc.update(&self.packed);
        for &(pos, byte) in &self.exceptions {
            crc.update(&pos.to_be_bytes());
            crc.update(&[byte]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_plain_acgt() {
        let seq = TwoBitSeq::from_bytes(b"ACGTACGTAC");
        assert_eq!(seq.to_bytes(), b"ACGTACGTAC");
    }

    #[test]
    fn preserves_non_acgt_exceptions() {
        let seq = TwoBitSeq::from_bytes(b"ACGTNNacgt");
        assert_eq!(seq.to_bytes(), b"ACGTNNacgt");
    }

    #[test]
    fn empty_sequence_round_trips() {
        let seq = TwoBitSeq::from_bytes(b"");
        assert_eq!(seq.len(), 0);
        assert_eq!(seq.to_bytes(), Vec::<u8>::new());
    }
}
