// fqpack
// Copyright (c) 2019-2026 The fqpack Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The SAM/BAM optional-tag sub-stream codec.
//!
//! Each record's aux table is coded as a sequence of tag entries terminated
//! by an end-of-table symbol, so a read with no tags at all costs exactly
//! one symbol. A tag's two bytes and its type code are coded jointly: an
//! adaptive distribution over previously-seen `(tag, type)` pairs picks up
//! one symbol per habitual combination (`NM`+`i`, `MD`+`Z`, ...), falling
//! back to independent tag-byte and type-code models only the first time a
//! given pair is seen. Values are coded by
//! type: fixed-width integers and the float go through a generic byte-wise
//! model, `Z`/`H` strings go through a length-prefixed order-1 byte model
//! shared with [`crate::codecs::id`]'s literal-run coder, and `B` arrays are
//! a length prefix followed by one element per the array's element type.

use crate::ac::{Decoder, Encoder};
use crate::dist::{CondDistribution, Distribution};
use crate::io::ByteSink;
use crate::record::{AuxArray, AuxField, AuxValue, Tag};
use std::collections::HashMap;
use std::io;

const BYTE_CONTEXTS: usize = 256;

fn type_index(code: u8) -> usize {
    match code {
        b'A' => 0,
        b'c' => 1,
        b'C' => 2,
        b's' => 3,
        b'S' => 4,
        b'i' => 5,
        b'I' => 6,
        b'f' => 7,
        b'Z' => 8,
        b'H' => 9,
        b'B' => 10,
        _ => unreachable!("unsupported aux type code"),
    }
}

const NUM_TYPES: usize = 11;

/// Ceiling on how many distinct `(tag, type)` pairs the joint model tracks
/// per block. Real aux tables draw from a small fixed vocabulary (`NM`,
/// `MD`, `AS`, ... each with one habitual type), so this comfortably covers
/// a homogeneous dataset; once it fills, further novel pairs always take
/// the escape path rather than growing the table further.
const MAX_KNOWN_PAIRS: usize = 64;

/// The escape symbol: "this pair hasn't been seen yet (or the table is
/// full)", falling back to coding the tag bytes and type code independently.
const PAIR_ESCAPE: usize = MAX_KNOWN_PAIRS;

fn write_bytes_via_model(
    ac: &mut Encoder,
    model: &mut CondDistribution<BYTE_CONTEXTS, BYTE_CONTEXTS>,
    bytes: &[u8],
) {
    let mut prev = 0usize;
    for &b in bytes {
        model.encode(ac, prev, b as usize);
        prev = b as usize;
    }
}

fn read_bytes_via_model(
    ac: &mut Decoder,
    model: &mut CondDistribution<BYTE_CONTEXTS, BYTE_CONTEXTS>,
    n: usize,
) -> Vec<u8> {
    let mut prev = 0usize;
    let mut out = Vec::with_capacity(n);
    for _ in 0..n {
        let b = model.decode(ac, prev) as u8;
        out.push(b);
        prev = b as usize;
    }
    out
}

/// Per-block adaptive state shared between `AuxEncoder` and `AuxDecoder`.
struct AuxModel {
    /// Whether another tag follows (`1`) or the table has ended (`0`).
    has_next: Distribution<2>,
    /// An adaptive joint distribution over previously-seen `(tag, type)`
    /// pairs, indexed by first-occurrence order; [`PAIR_ESCAPE`] falls back
    /// to `tag_byte`/`type_code` for a pair not yet known.
    pair_symbol: Distribution<{ MAX_KNOWN_PAIRS + 1 }>,
    known_pairs: Vec<(Tag, u8)>,
    /// A tag's two ASCII bytes, each through its own byte-wise model; only
    /// reached via the `pair_symbol` escape.
    tag_byte: [Distribution<BYTE_CONTEXTS>; 2],
    /// The type code, as an index into `NUM_TYPES`; only reached via escape.
    type_code: Distribution<NUM_TYPES>,
    /// Order-1 byte model used for every `Z`/`H` string and `B` element
    /// byte stream; shared across types since there's no benefit to
    /// separating them.
    bytes: CondDistribution<BYTE_CONTEXTS, BYTE_CONTEXTS>,
    /// Length prefixes (`Z`/`H` strings, `B` arrays) as two-byte big-endian
    /// values through a byte-wise model.
    len_hi: Distribution<BYTE_CONTEXTS>,
    len_lo: Distribution<BYTE_CONTEXTS>,
    /// Element type code of a `B` array.
    array_elem_code: Distribution<7>,
}

impl AuxModel {
    fn new() -> Self {
        AuxModel {
            has_next: Distribution::new(),
            pair_symbol: Distribution::new(),
            known_pairs: Vec::new(),
            tag_byte: [Distribution::new(), Distribution::new()],
            type_code: Distribution::new(),
            bytes: CondDistribution::new(),
            len_hi: Distribution::new(),
            len_lo: Distribution::new(),
            array_elem_code: Distribution::new(),
        }
    }

    /// The pair's symbol in `pair_symbol`'s alphabet, if it's already known.
    fn pair_index(&self, tag: Tag, type_code: u8) -> Option<usize> {
        self.known_pairs.iter().position(|&(t, c)| t == tag && c == type_code)
    }

    /// Records a newly seen pair, unless the table has already reached
    /// `MAX_KNOWN_PAIRS` — encoder and decoder call this at exactly the same
    /// point in the stream, so the symbol space stays in lockstep.
    fn remember_pair(&mut self, tag: Tag, type_code: u8) {
        if self.known_pairs.len() < MAX_KNOWN_PAIRS {
            self.known_pairs.push((tag, type_code));
        }
    }
}

fn array_elem_index(code: u8) -> usize {
    match code {
        b'c' => 0,
        b'C' => 1,
        b's' => 2,
        b'S' => 3,
        b'i' => 4,
        b'I' => 5,
        b'f' => 6,
        _ => unreachable!("unsupported array element type code"),
    }
}

const ARRAY_ELEM_CODES: [u8; 7] = [b'c', b'C', b's', b'S', b'i', b'I', b'f'];

/// The encoder half of one block's aux sub-stream.
pub struct AuxEncoder {
    ac: Encoder,
    model: Box<AuxModel>,
}

impl Default for AuxEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl AuxEncoder {
    pub fn new() -> Self {
        AuxEncoder { ac: Encoder::new(), model: Box::new(AuxModel::new()) }
    }

    pub fn encode(&mut self, fields: &[AuxField]) {
        for field in fields {
            self.model.has_next.encode(&mut self.ac, 1);
            let type_code = field.value.type_code();
            match self.model.pair_index(field.tag, type_code) {
                Some(symbol) => self.model.pair_symbol.encode(&mut self.ac, symbol),
                None => {
                    self.model.pair_symbol.encode(&mut self.ac, PAIR_ESCAPE);
                    self.model.tag_byte[0].encode(&mut self.ac, field.tag[0] as usize);
                    self.model.tag_byte[1].encode(&mut self.ac, field.tag[1] as usize);
                    self.model.type_code.encode(&mut self.ac, type_index(type_code));
                    self.model.remember_pair(field.tag, type_code);
                }
            }
            self.encode_value(&field.value);
        }
        self.model.has_next.encode(&mut self.ac, 0);
    }

    fn encode_len(&mut self, len: u16) {
        self.model.len_hi.encode(&mut self.ac, (len >> 8) as usize);
        self.model.len_lo.encode(&mut self.ac, (len & 0xff) as usize);
    }

    fn encode_value(&mut self, value: &AuxValue) {
        match value {
            AuxValue::Char(c) => self.model.bytes.encode(&mut self.ac, 0, *c as usize),
            AuxValue::Int8(v) => self.model.bytes.encode(&mut self.ac, 0, v.to_le_bytes()[0] as usize),
            AuxValue::UInt8(v) => self.model.bytes.encode(&mut self.ac, 0, *v as usize),
            AuxValue::Int16(v) => write_bytes_via_model(&mut self.ac, &mut self.model.bytes, &v.to_le_bytes()),
            AuxValue::UInt16(v) => write_bytes_via_model(&mut self.ac, &mut self.model.bytes, &v.to_le_bytes()),
            AuxValue::Int32(v) => write_bytes_via_model(&mut self.ac, &mut self.model.bytes, &v.to_le_bytes()),
            AuxValue::UInt32(v) => write_bytes_via_model(&mut self.ac, &mut self.model.bytes, &v.to_le_bytes()),
            AuxValue::Float(v) => write_bytes_via_model(&mut self.ac, &mut self.model.bytes, &v.to_le_bytes()),
            AuxValue::Str(s) | AuxValue::Hex(s) => {
                self.encode_len(s.len() as u16);
                write_bytes_via_model(&mut self.ac, &mut self.model.bytes, s);
            }
            AuxValue::Array(arr) => {
                self.model.array_elem_code.encode(&mut self.ac, array_elem_index(arr.element_code()));
                self.encode_len(arr.len() as u16);
                self.encode_array_elements(arr);
            }
        }
    }

    fn encode_array_elements(&mut self, arr: &AuxArray) {
        match arr {
            AuxArray::Int8(v) => {
                for x in v {
                    self.model.bytes.encode(&mut self.ac, 0, x.to_le_bytes()[0] as usize);
                }
            }
            AuxArray::UInt8(v) => {
                for &x in v {
                    self.model.bytes.encode(&mut self.ac, 0, x as usize);
                }
            }
            AuxArray::Int16(v) => {
                for x in v {
                    write_bytes_via_model(&mut self.ac, &mut self.model.bytes, &x.to_le_bytes());
                }
            }
            AuxArray::UInt16(v) => {
                for x in v {
                    write_bytes_via_model(&mut self.ac, &mut self.model.bytes, &x.to_le_bytes());
                }
            }
            AuxArray::Int32(v) => {
                for x in v {
                    write_bytes_via_model(&mut self.ac, &mut self.model.bytes, &x.to_le_bytes());
                }
            }
            AuxArray::UInt32(v) => {
                for x in v {
                    write_bytes_via_model(&mut self.ac, &mut self.model.bytes, &x.to_le_bytes());
                }
            }
            AuxArray::Float(v) => {
                for x in v {
                    write_bytes_via_model(&mut self.ac, &mut self.model.bytes, &x.to_le_bytes());
                }
            }
        }
    }

    pub fn finish(&mut self) -> u32 {
        self.ac.finish();
        let n = self.ac.len() as u32;
        self.model = Box::new(AuxModel::new());
        n
    }

    pub fn flush<W: ByteSink + ?Sized>(&mut self, sink: &mut W) -> io::Result<()> {
        self.ac.drain_to(sink)?;
        self.ac.reset();
        Ok(())
    }
}

/// The decoder half of one block's aux sub-stream.
pub struct AuxDecoder {
    ac: Decoder,
    model: Box<AuxModel>,
}

impl Default for AuxDecoder {
    fn default() -> Self {
        Self::new()
    }
}

const TYPE_CODES: [u8; NUM_TYPES] =
    [b'A', b'c', b'C', b's', b'S', b'i', b'I', b'f', b'Z', b'H', b'B'];

impl AuxDecoder {
    pub fn new() -> Self {
        AuxDecoder { ac: Decoder::new(), model: Box::new(AuxModel::new()) }
    }

    pub fn reset_decoder(&mut self, buf: Vec<u8>) {
        self.ac.reset(buf);
        self.model = Box::new(AuxModel::new());
    }

    pub fn start_decoder(&mut self) {
        self.ac.start();
    }

    pub fn decode(&mut self) -> Vec<AuxField> {
        let mut fields = Vec::new();
        while self.model.has_next.decode(&mut self.ac) == 1 {
            let symbol = self.model.pair_symbol.decode(&mut self.ac);
            let (tag, type_code) = if symbol == PAIR_ESCAPE {
                let t0 = self.model.tag_byte[0].decode(&mut self.ac) as u8;
                let t1 = self.model.tag_byte[1].decode(&mut self.ac) as u8;
                let tag: Tag = [t0, t1];
                let type_code = TYPE_CODES[self.model.type_code.decode(&mut self.ac)];
                self.model.remember_pair(tag, type_code);
                (tag, type_code)
            }
            else {
                self.model.known_pairs[symbol]
            };
            let value = self.decode_value(type_code);
            fields.push(AuxField { tag, value });
        }
        fields
    }

    fn decode_len(&mut self) -> u16 {
        let hi = self.model.len_hi.decode(&mut self.ac) as u16;
        let lo = self.model.len_lo.decode(&mut self.ac) as u16;
        (hi << 8) | lo
    }

    fn decode_value(&mut self, type_code: u8) -> AuxValue {
        match type_code {
            b'A' => AuxValue::Char(self.model.bytes.decode(&mut self.ac, 0) as u8),
            b'c' => AuxValue::Int8(self.model.bytes.decode(&mut self.ac, 0) as i8),
            b'C' => AuxValue::UInt8(self.model.bytes.decode(&mut self.ac, 0) as u8),
            b's' => AuxValue::Int16(i16::from_le_bytes(
                read_bytes_via_model(&mut self.ac, &mut self.model.bytes, 2).try_into().unwrap(),
            )),
            b'S' => AuxValue::UInt16(u16::from_le_bytes(
                read_bytes_via_model(&mut self.ac, &mut self.model.bytes, 2).try_into().unwrap(),
            )),
            b'i' => AuxValue::Int32(i32::from_le_bytes(
                read_bytes_via_model(&mut self.ac, &mut self.model.bytes, 4).try_into().unwrap(),
            )),
            b'I' => AuxValue::UInt32(u32::from_le_bytes(
                read_bytes_via_model(&mut self.ac, &mut self.model.bytes, 4).try_into().unwrap(),
            )),
            b'f' => AuxValue::Float(f32::from_le_bytes(
                read_bytes_via_model(&mut self.ac, &mut self.model.bytes, 4).try_into().unwrap(),
            )),
            b'Z' => {
                let len = self.decode_len();
                AuxValue::Str(read_bytes_via_model(&mut self.ac, &mut self.model.bytes, len as usize))
            }
            b'H' => {
                let len = self.decode_len();
                AuxValue::Hex(read_bytes_via_model(&mut self.ac, &mut self.model.bytes, len as usize))
            }
            b'B' => {
                let elem = ARRAY_ELEM_CODES[self.model.array_elem_code.decode(&mut self.ac)];
                let len = self.decode_len() as usize;
                AuxValue::Array(self.decode_array(elem, len))
            }
            _ => unreachable!("unsupported aux type code"),
        }
    }

    fn decode_array(&mut self, elem: u8, len: usize) -> AuxArray {
        match elem {
            b'c' => AuxArray::Int8(
                (0..len).map(|_| self.model.bytes.decode(&mut self.ac, 0) as i8).collect(),
            ),
            b'C' => AuxArray::UInt8(
                (0..len).map(|_| self.model.bytes.decode(&mut self.ac, 0) as u8).collect(),
            ),
            b's' => AuxArray::Int16(
                (0..len)
                    .map(|_| {
                        i16::from_le_bytes(
                            read_bytes_via_model(&mut self.ac, &mut self.model.bytes, 2)
                                .try_into()
                                .unwrap(),
                        )
                    })
                    .collect(),
            ),
            b'S' => AuxArray::UInt16(
                (0..len)
                    .map(|_| {
                        u16::from_le_bytes(
                            read_bytes_via_model(&mut self.ac, &mut self.model.bytes, 2)
                                .try_into()
                                .unwrap(),
                        )
                    })
                    .collect(),
            ),
            b'i' => AuxArray::Int32(
                (0..len)
                    .map(|_| {
                        i32::from_le_bytes(
                            read_bytes_via_model(&mut self.ac, &mut self.model.bytes, 4)
                                .try_into()
                                .unwrap(),
                        )
                    })
                    .collect(),
            ),
            b'I' => AuxArray::UInt32(
                (0..len)
                    .map(|_| {
                        u32::from_le_bytes(
                            read_bytes_via_model(&mut self.ac, &mut self.model.bytes, 4)
                                .try_into()
                                .unwrap(),
                        )
                    })
                    .collect(),
            ),
            b'f' => AuxArray::Float(
                (0..len)
                    .map(|_| {
                        f32::from_le_bytes(
                            read_bytes_via_model(&mut self.ac, &mut self.model.bytes, 4)
                                .try_into()
                                .unwrap(),
                        )
                    })
                    .collect(),
            ),
            _ => unreachable!("unsupported array element type code"),
        }
    }
}

/// Lookup used by tests and by the `fqpack-seq` reference coder to validate
/// a tag table has no duplicate tags before encoding; not part of the wire
/// format, just a convenience the original SAM optional-field model leaves
/// implicit.
pub fn index_by_tag(fields: &[AuxField]) -> HashMap<Tag, usize> {
    fields.iter().enumerate().map(|(i, f)| (f.tag, i)).collect()
}

/// A canonical flat byte serialization of an aux table, used only to
/// compute the `aux` sub-stream's uncompressed size and CRC64 — the aux
/// codec itself never reads or writes these bytes directly, but the block
/// writer and reader must agree on *some* fixed byte representation of "the
/// bytes fed to encode" for a value that isn't natively a byte string, and
/// recomputing this over the decoded fields is how the reader checks its
/// CRC against the one the writer recorded.
pub fn canonical_bytes(fields: &[AuxField]) -> Vec<u8> {
    let mut out = Vec::new();
    for f in fields {
        out.extend_from_slice(&f.tag);
        out.push(f.value.type_code());
        append_value_bytes(&mut out, &f.value);
    }
    out
}

fn append_value_bytes(out: &mut Vec<u8>, value: &AuxValue) {
    match value {
        AuxValue::Char(c) => out.push(*c),
        AuxValue::Int8(v) => out.push(v.to_le_bytes()[0]),
        AuxValue::UInt8(v) => out.push(*v),
        AuxValue::Int16(v) => out.extend_from_slice(&v.to_le_bytes()),
        AuxValue::UInt16(v) => out.extend_from_slice(&v.to_le_bytes()),
        AuxValue::Int32(v) => out.extend_from_slice(&v.to_le_bytes()),
        AuxValue::UInt32(v) => out.extend_from_slice(&v.to_le_bytes()),
        AuxValue::Float(v) => out.extend_from_slice(&v.to_le_bytes()),
        AuxValue::Str(s) | AuxValue::Hex(s) => {
            out.extend_from_slice(&(s.len() as u16).to_be_bytes());
            out.extend_from_slice(s);
        }
        AuxValue::Array(arr) => {
            out.push(arr.element_code());
            out.extend_from_slice(&(arr.len() as u16).to_be_bytes());
            append_array_bytes(out, arr);
        }
    }
}

fn append_array_bytes(out: &mut Vec<u8>, arr: &AuxArray) {
    match arr {
        AuxArray::Int8(v) => {
            for x in v {
                out.push(x.to_le_bytes()[0]);
            }
        }
        AuxArray::UInt8(v) => out.extend_from_slice(v),
        AuxArray::Int16(v) => {
            for x in v {
                out.extend_from_slice(&x.to_le_bytes());
            }
        }
        AuxArray::UInt16(v) => {
            for x in v {
                out.extend_from_slice(&x.to_le_bytes());
            }
        }
        AuxArray::Int32(v) => {
            for x in v {
                out.extend_from_slice(&x.to_le_bytes());
            }
        }
        AuxArray::UInt32(v) => {
            for x in v {
                out.extend_from_slice(&x.to_le_bytes());
            }
        }
        AuxArray::Float(v) => {
            for x in v {
                out.extend_from_slice(&x.to_le_bytes());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(records: &[Vec<AuxField>]) -> Vec<Vec<AuxField>> {
        let mut enc = AuxEncoder::new();
        for fields in records {
            enc.encode(fields);
        }
        enc.finish();
        let mut bytes = Vec::new();
        enc.flush(&mut bytes).unwrap();

        let mut dec = AuxDecoder::new();
        dec.reset_decoder(bytes);
        dec.start_decoder();
        (0..records.len()).map(|_| dec.decode()).collect()
    }

    #[test]
    fn round_trips_mixed_types_including_array_and_char() {
        let records = vec![
            vec![
                AuxField { tag: *b"NM", value: AuxValue::Int32(3) },
                AuxField { tag: *b"MD", value: AuxValue::Str(b"10A20".to_vec()) },
                AuxField { tag: *b"XA", value: AuxValue::Char(b'Y') },
                AuxField {
                    tag: *b"XB",
                    value: AuxValue::Array(AuxArray::UInt16(vec![1, 2, 3, 65535])),
                },
            ],
            vec![],
            vec![AuxField { tag: *b"HX", value: AuxValue::Hex(b"deadbeef".to_vec()) }],
        ];
        let decoded = round_trip(&records);
        assert_eq!(records, decoded);
    }

    #[test]
    fn empty_aux_table_round_trips() {
        let records = vec![Vec::new(), Vec::new()];
        let decoded = round_trip(&records);
        assert_eq!(records, decoded);
    }

    #[test]
    fn repeated_tag_type_pairs_round_trip_through_joint_model() {
        let records: Vec<Vec<AuxField>> = (0..200)
            .map(|i| {
                vec![
                    AuxField { tag: *b"NM", value: AuxValue::Int32(i) },
                    AuxField { tag: *b"MD", value: AuxValue::Str(format!("{i}M").into_bytes()) },
                ]
            })
            .collect();
        let decoded = round_trip(&records);
        assert_eq!(records, decoded);
    }

    #[test]
    fn more_than_max_known_pairs_round_trips_via_escape() {
        // One distinct (tag, type) pair per record, well past MAX_KNOWN_PAIRS,
        // so later records exercise the pair table after it has filled up.
        let records: Vec<Vec<AuxField>> = (0..(MAX_KNOWN_PAIRS as u32 + 20))
            .map(|i| {
                let tag = [b'A' + (i / 26) as u8 % 26, b'A' + (i % 26) as u8];
                vec![AuxField { tag, value: AuxValue::UInt8(i as u8) }]
            })
            .collect();
        let decoded = round_trip(&records);
        assert_eq!(records, decoded);
    }
}
