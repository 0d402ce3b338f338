// fqpack
// Copyright (c) 2019-2026 The fqpack Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The read-identifier sub-stream codec.
//!
//! Consecutive read ids are usually near-identical (an incrementing
//! instrument/lane/tile/x/y coordinate tail on an otherwise fixed prefix),
//! so each id is coded relative to the previous one as a mixture of three
//! token kinds, mirroring `idenc.h`'s own three-way split:
//!
//! - a **matched-from-previous** prefix, coded as one "still matches" bit
//!   per byte until the first divergence;
//! - an **integer field**, when the remaining suffix is entirely ASCII
//!   digits, coded as a digit count plus one digit at a time; and
//! - a **literal run**, for everything else, coded as a byte count plus an
//!   order-1 byte model over the literal bytes.
//!
//! `previous` is reset to empty at the start of every block, so ids never
//! reference across a block boundary.

use crate::ac::{Decoder, Encoder};
use crate::dist::{CondDistribution, Distribution};
use crate::io::ByteSink;
use std::io;

const MAX_DIGITS: usize = 20;
const DIGIT_POS_CONTEXTS: usize = 4;
const BYTE_CONTEXTS: usize = 256;

fn is_all_digits(bytes: &[u8]) -> bool {
    !bytes.is_empty() && bytes.iter().all(u8::is_ascii_digit)
}

/// Per-block adaptive state shared by the encoder and decoder id codecs,
/// kept in one place so `IdEncoder`/`IdDecoder` cannot drift out of sync on
/// which distributions exist or how they're indexed.
struct IdModel {
    match_continue: Distribution<2>,
    is_integer: Distribution<2>,
    digit_count: Distribution<{ MAX_DIGITS + 1 }>,
    digit: CondDistribution<10, DIGIT_POS_CONTEXTS>,
    literal_len_hi: Distribution<BYTE_CONTEXTS>,
    literal_len_lo: Distribution<BYTE_CONTEXTS>,
    literal_byte: CondDistribution<BYTE_CONTEXTS, BYTE_CONTEXTS>,
}

/// A skewed prior for `literal_byte`'s "no previous byte yet" context
/// (index 0, the first byte of a literal id suffix): printable ASCII
/// (`0x20..=0x7e`) gets most of the weight, everything else a small floor,
/// since the first byte of a literal run in a read identifier is
/// overwhelmingly likely to be printable.
fn printable_ascii_prior() -> [u16; BYTE_CONTEXTS] {
    const OTHER_WEIGHT: u16 = 16;
    let printable = 0x20..=0x7eu8;
    let other_count = BYTE_CONTEXTS - printable.clone().count();
    let reserved = OTHER_WEIGHT as u32 * other_count as u32;
    let printable_count = printable.clone().count() as u32;
    let base = (crate::ac::TOTAL_MAX - reserved) / printable_count;
    let mut remainder = (crate::ac::TOTAL_MAX - reserved) - base * printable_count;

    let mut cs = [OTHER_WEIGHT; BYTE_CONTEXTS];
    for b in printable {
        let mut v = base;
        if remainder > 0 {
            v += 1;
            remainder -= 1;
        }
        cs[b as usize] = v as u16;
    }
    cs
}

impl IdModel {
    fn new() -> Self {
        let mut literal_byte: CondDistribution<BYTE_CONTEXTS, BYTE_CONTEXTS> = CondDistribution::new();
        literal_byte.set_one(0, &printable_ascii_prior());
        IdModel {
            match_continue: Distribution::new(),
            is_integer: Distribution::new(),
            digit_count: Distribution::new(),
            digit: CondDistribution::new(),
            literal_len_hi: Distribution::new(),
            literal_len_lo: Distribution::new(),
            literal_byte,
        }
    }
}

#[inline]
fn digit_pos_context(i: usize) -> usize {
    i.min(DIGIT_POS_CONTEXTS - 1)
}

/// The encoder half of one block's id sub-stream.
pub struct IdEncoder {
    ac: Encoder,
    model: Box<IdModel>,
    previous: Vec<u8>,
}

impl Default for IdEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl IdEncoder {
    pub fn new() -> Self {
        IdEncoder { ac: Encoder::new(), model: Box::new(IdModel::new()), previous: Vec::new() }
    }

    pub fn encode(&mut self, id: &[u8]) {
        let mut k = 0usize;
        while k < self.previous.len() && k < id.len() && id[k] == self.previous[k] {
            self.model.match_continue.encode(&mut self.ac, 1);
            k += 1;
        }
        if k < self.previous.len() {
            self.model.match_continue.encode(&mut self.ac, 0);
        }

        let suffix = &id[k..];
        if is_all_digits(suffix) && suffix.len() <= MAX_DIGITS {
            self.model.is_integer.encode(&mut self.ac, 1);
            self.model.digit_count.encode(&mut self.ac, suffix.len());
            for (i, &b) in suffix.iter().enumerate() {
                let ctx = digit_pos_context(i);
                self.model.digit.encode(&mut self.ac, ctx, (b - b'0') as usize);
            }
        }
        else {
            self.model.is_integer.encode(&mut self.ac, 0);
            let len = suffix.len() as u16;
            self.model.literal_len_hi.encode(&mut self.ac, (len >> 8) as usize);
            self.model.literal_len_lo.encode(&mut self.ac, (len & 0xff) as usize);
            let mut prev_byte = 0usize;
            for &b in suffix {
                self.model.literal_byte.encode(&mut self.ac, prev_byte, b as usize);
                prev_byte = b as usize;
            }
        }

        self.previous.clear();
        self.previous.extend_from_slice(id);
    }

    pub fn finish(&mut self) -> u32 {
        self.ac.finish();
        let n = self.ac.len() as u32;
        self.model = Box::new(IdModel::new());
        self.previous.clear();
        n
    }

    pub fn flush<W: ByteSink + ?Sized>(&mut self, sink: &mut W) -> io::Result<()> {
        self.ac.drain_to(sink)?;
        self.ac.reset();
        Ok(())
    }
}

/// The decoder half of one block's id sub-stream.
pub struct IdDecoder {
    ac: Decoder,
    model: Box<IdModel>,
    previous: Vec<u8>,
}

impl Default for IdDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl IdDecoder {
    pub fn new() -> Self {
        IdDecoder { ac: Decoder::new(), model: Box::new(IdModel::new()), previous: Vec::new() }
    }

    pub fn reset_decoder(&mut self, buf: Vec<u8>) {
        self.ac.reset(buf);
        self.model = Box::new(IdModel::new());
        self.previous.clear();
    }

    pub fn start_decoder(&mut self) {
        self.ac.start();
    }

    pub fn decode(&mut self) -> Vec<u8> {
        let mut k = 0usize;
        while k < self.previous.len() {
            let bit = self.model.match_continue.decode(&mut self.ac);
            if bit == 1 {
                k += 1;
            }
            else {
                break;
            }
        }

        let mut id = self.previous[..k].to_vec();

        if self.model.is_integer.decode(&mut self.ac) == 1 {
            let count = self.model.digit_count.decode(&mut self.ac);
            for i in 0..count {
                let ctx = digit_pos_context(i);
                let digit = self.model.digit.decode(&mut self.ac, ctx);
                id.push(b'0' + digit as u8);
            }
        }
        else {
            let hi = self.model.literal_len_hi.decode(&mut self.ac);
            let lo = self.model.literal_len_lo.decode(&mut self.ac);
            let len = ((hi as u16) << 8) | lo as u16;
            let mut prev_byte = 0usize;
            for _ in 0..len {
                let b = self.model.literal_byte.decode(&mut self.ac, prev_byte) as u8;
                id.push(b);
                prev_byte = b as usize;
            }
        }

        self.previous = id.clone();
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(ids: &[&[u8]]) -> Vec<Vec<u8>> {
        let mut enc = IdEncoder::new();
        for id in ids {
            enc.encode(id);
        }
        enc.finish();
        let mut bytes = Vec::new();
        enc.flush(&mut bytes).unwrap();

        let mut dec = IdDecoder::new();
        dec.reset_decoder(bytes);
        dec.start_decoder();
        (0..ids.len()).map(|_| dec.decode()).collect()
    }

    #[test]
    fn round_trips_incrementing_numeric_tail() {
        let ids: Vec<Vec<u8>> = (0..2000)
            .map(|i| format!("instrument:lane:tile:1000:{i}").into_bytes())
            .collect();
        let refs: Vec<&[u8]> = ids.iter().map(|v| v.as_slice()).collect();
        let decoded = round_trip(&refs);
        assert_eq!(ids, decoded);
    }

    #[test]
    fn round_trips_unrelated_literal_ids() {
        let ids: [&[u8]; 4] = [b"alpha", b"completely-different", b"x", b""];
        let decoded = round_trip(&ids);
        for (a, b) in ids.iter().zip(decoded.iter()) {
            assert_eq!(a, &b.as_slice());
        }
    }
}
