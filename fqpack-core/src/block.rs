// fqpack
// Copyright (c) 2019-2026 The fqpack Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The block framing layer: chunk buffering, the four-way concurrent
//! fan-out/fan-in per chunk, and the RLE side tables and per-sub-stream
//! checksums that frame each block on the wire.
//!
//! [`BlockWriter`]/[`BlockReader`] are the only place the four sub-stream
//! codecs are driven together; everything above this layer (the container)
//! just hands them whole [`Record`]s and sees whole blocks' worth back.

use crate::checksum::Crc64;
use crate::codecs::aux::{self, AuxDecoder, AuxEncoder};
use crate::codecs::id::{IdDecoder, IdEncoder};
use crate::codecs::qual::{QualDecoder, QualEncoder};
use crate::codecs::seq::{SeqDecoder, SeqEncoder};
use crate::errors::{
    concurrency_error, malformed_header_error, unexpected_eof_error, ChecksumMismatch, Error, Result,
};
use crate::io::{ByteSink, ByteSource};
use crate::record::Record;
use std::io;

/// Reads buffered before the four-way encode fan-out runs over them.
pub const CHUNK: usize = 5000;

/// Nucleotide bases accumulated across chunks before a block closes.
pub const BLOCK_BASES: u32 = 5_000_000;

/// One of the four independently coded byte regions a block is split into,
/// in their fixed wire order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubStream {
    Id,
    Aux,
    Seq,
    Qual,
}

impl SubStream {
    pub const ALL: [SubStream; 4] =
        [SubStream::Id, SubStream::Aux, SubStream::Seq, SubStream::Qual];
}

/// A run-length encoding: consecutive equal values collapse into
/// `(value, run_count)` pairs, exactly the shape the read-length and
/// quality-scheme side tables are framed in.
#[derive(Debug, Clone)]
pub struct Rle<T> {
    runs: Vec<(T, u32)>,
}

impl<T: PartialEq + Copy> Rle<T> {
    pub fn new() -> Self {
        Rle { runs: Vec::new() }
    }

    pub fn push(&mut self, value: T) {
        self.push_n(value, 1);
    }

    pub fn push_n(&mut self, value: T, n: u32) {
        if n == 0 {
            return;
        }
        if let Some(last) = self.runs.last_mut() {
            if last.0 == value {
                last.1 += n;
                return;
            }
        }
        self.runs.push((value, n));
    }

    pub fn total(&self) -> u32 {
        self.runs.iter().map(|r| r.1).sum()
    }

    pub fn runs(&self) -> &[(T, u32)] {
        &self.runs
    }

    pub fn clear(&mut self) {
        self.runs.clear();
    }
}

impl<T: PartialEq + Copy> Default for Rle<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Expands an RLE's runs back into one value per read, for `reads_total`
/// reads; used only on the reader side, where per-read values are needed.
fn expand<T: Copy>(runs: &[(T, u32)], reads_total: u32) -> Vec<T> {
    let mut out = Vec::with_capacity(reads_total as usize);
    for &(value, count) in runs {
        for _ in 0..count {
            out.push(value);
        }
    }
    out
}

fn writer_io(e: io::Error) -> Error {
    Error::WriterIoError(e)
}

fn reader_io(e: io::Error) -> Error {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        Error::UnexpectedEndOfFile { detail: "a declared block field was truncated" }
    }
    else {
        Error::ReaderIoError(e)
    }
}

/// Owns the chunk buffer, the four sub-stream encoders, and the
/// block-level accumulators (byte counts, CRCs, RLE builders) described in
/// the block writer protocol.
pub struct BlockWriter {
    chunk: Vec<Record>,
    reads_in_block: u32,
    bases_in_block: u32,
    read_len_rle: Rle<u32>,
    qual_scheme_rle: Rle<u8>,
    qual_base: Option<u8>,

    id_enc: IdEncoder,
    aux_enc: AuxEncoder,
    seq_enc: Box<dyn SeqEncoder>,
    qual_enc: QualEncoder,

    id_crc: Crc64,
    aux_crc: Crc64,
    seq_crc: Crc64,
    qual_crc: Crc64,

    id_bytes: u64,
    aux_bytes: u64,
    seq_bytes: u64,
    qual_bytes: u64,

    block_index: u32,
}

impl BlockWriter {
    pub fn new(seq_enc: Box<dyn SeqEncoder>) -> Self {
        BlockWriter {
            chunk: Vec::with_capacity(CHUNK),
            reads_in_block: 0,
            bases_in_block: 0,
            read_len_rle: Rle::new(),
            qual_scheme_rle: Rle::new(),
            qual_base: None,
            id_enc: IdEncoder::new(),
            aux_enc: AuxEncoder::new(),
            seq_enc,
            qual_enc: QualEncoder::new(),
            id_crc: Crc64::new(),
            aux_crc: Crc64::new(),
            seq_crc: Crc64::new(),
            qual_crc: Crc64::new(),
            id_bytes: 0,
            aux_bytes: 0,
            seq_bytes: 0,
            qual_bytes: 0,
            block_index: 0,
        }
    }

    /// Appends one read, flushing the current block and/or chunk first if
    /// either is already full.
    pub fn append<W: ByteSink + ?Sized>(&mut self, record: Record, sink: &mut W) -> Result<()> {
        if !record.is_valid() {
            return malformed_header_error("record quality length is neither zero nor the sequence length");
        }
        if self.bases_in_block > BLOCK_BASES {
            self.flush_block(sink)?;
        }
        if self.chunk.len() == CHUNK {
            self.flush_chunk()?;
        }
        self.chunk.push(record);
        Ok(())
    }

    /// Flushes the chunk buffer, then the block if it holds any reads, then
    /// writes the terminator block.
    pub fn finish<W: ByteSink + ?Sized>(&mut self, sink: &mut W) -> Result<()> {
        if !self.chunk.is_empty() {
            self.flush_chunk()?;
        }
        if self.reads_in_block > 0 {
            self.flush_block(sink)?;
        }
        sink.write_u32_be(0).map_err(writer_io)
    }

    fn flush_chunk(&mut self) -> Result<()> {
        if self.chunk.is_empty() {
            return Ok(());
        }

        let minmax = self
            .chunk
            .iter()
            .flat_map(|r| r.qual.iter().copied())
            .fold(None, |acc: Option<(u8, u8)>, q| {
                Some(match acc {
                    None => (q, q),
                    Some((lo, hi)) => (lo.min(q), hi.max(q)),
                })
            });

        let n = self.chunk.len() as u32;
        let scale = crate::codecs::qual::QUAL_SCALE as i32;

        let base = match minmax {
            Some((cmin, cmax)) => {
                if cmax as i32 - cmin as i32 + 1 > scale {
                    return Err(Error::InvalidQualityRange { base: cmin, found: cmax });
                }
                let needs_new_run = match self.qual_base {
                    None => true,
                    Some(b) => (cmin as i32) < b as i32 || (cmin as i32) > b as i32 + scale - 1,
                };
                let base = if needs_new_run { cmin } else { self.qual_base.unwrap() };
                if (cmax as i32) > base as i32 + scale - 1 || (cmax as i32) < base as i32 {
                    return Err(Error::InvalidQualityRange { base, found: cmax });
                }
                base
            }
            None => self.qual_base.unwrap_or(0),
        };
        self.qual_base = Some(base);
        self.qual_scheme_rle.push_n(base, n);
        self.qual_enc.set_base(base);

        let chunk = &self.chunk;
        let id_enc = &mut self.id_enc;
        let aux_enc = &mut self.aux_enc;
        let seq_enc = self.seq_enc.as_mut();
        let qual_enc = &mut self.qual_enc;
        let id_crc = &mut self.id_crc;
        let aux_crc = &mut self.aux_crc;
        let seq_crc = &mut self.seq_crc;
        let qual_crc = &mut self.qual_crc;
        let id_bytes = &mut self.id_bytes;
        let aux_bytes = &mut self.aux_bytes;
        let seq_bytes = &mut self.seq_bytes;
        let qual_bytes = &mut self.qual_bytes;

        let results = std::thread::scope(|scope| {
            let t_id = scope.spawn(move || {
                for r in chunk.iter() {
                    id_enc.encode(&r.id);
                    id_crc.update(&r.id);
                    *id_bytes += r.id.len() as u64;
                }
            });
            let t_aux = scope.spawn(move || {
                for r in chunk.iter() {
                    aux_enc.encode(&r.aux);
                    let bytes = aux::canonical_bytes(&r.aux);
                    aux_crc.update(&bytes);
                    *aux_bytes += bytes.len() as u64;
                }
            });
            let t_seq = scope.spawn(move || {
                for r in chunk.iter() {
                    seq_enc.encode(&r.seq);
                    seq_crc.update(&r.seq);
                    *seq_bytes += r.seq.len() as u64;
                }
            });
            let t_qual = scope.spawn(move || {
                for r in chunk.iter() {
                    qual_enc.encode(&r.qual);
                    qual_crc.update(&r.qual);
                    *qual_bytes += r.qual.len() as u64;
                }
            });
            [t_id.join(), t_aux.join(), t_seq.join(), t_qual.join()]
        });

        if results.iter().any(|r| r.is_err()) {
            return concurrency_error("a chunk encode worker panicked");
        }

        for r in self.chunk.iter() {
            self.read_len_rle.push(r.seq.len() as u32);
            self.bases_in_block += r.seq.len() as u32;
        }
        self.reads_in_block += n;

        self.chunk.clear();
        Ok(())
    }

    fn flush_block<W: ByteSink + ?Sized>(&mut self, sink: &mut W) -> Result<()> {
        self.flush_chunk()?;
        if self.reads_in_block == 0 {
            return Ok(());
        }

        sink.write_u32_be(self.reads_in_block).map_err(writer_io)?;
        sink.write_u32_be(self.bases_in_block).map_err(writer_io)?;

        for &(len, count) in self.read_len_rle.runs() {
            sink.write_u32_be(len).map_err(writer_io)?;
            sink.write_u32_be(count).map_err(writer_io)?;
        }
        for &(base, count) in self.qual_scheme_rle.runs() {
            sink.write_u8(base).map_err(writer_io)?;
            sink.write_u32_be(count).map_err(writer_io)?;
        }

        let id_n = self.id_enc.finish();
        let aux_n = self.aux_enc.finish();
        let seq_n = self.seq_enc.finish();
        let qual_n = self.qual_enc.finish();

        let headers = [
            (self.id_bytes, id_n, self.id_crc.finalize()),
            (self.aux_bytes, aux_n, self.aux_crc.finalize()),
            (self.seq_bytes, seq_n, self.seq_crc.finalize()),
            (self.qual_bytes, qual_n, self.qual_crc.finalize()),
        ];
        for &(uncompressed, compressed, crc) in &headers {
            let uncompressed = u32::try_from(uncompressed).unwrap_or(u32::MAX);
            sink.write_u32_be(uncompressed).map_err(writer_io)?;
            sink.write_u32_be(compressed).map_err(writer_io)?;
            sink.write_u64_be(crc).map_err(writer_io)?;
        }

        self.id_enc.flush(sink).map_err(writer_io)?;
        self.aux_enc.flush(sink).map_err(writer_io)?;
        self.seq_enc.flush(sink).map_err(writer_io)?;
        self.qual_enc.flush(sink).map_err(writer_io)?;

        self.block_index += 1;
        self.reads_in_block = 0;
        self.bases_in_block = 0;
        self.read_len_rle.clear();
        self.qual_scheme_rle.clear();
        self.id_crc = Crc64::new();
        self.aux_crc = Crc64::new();
        self.seq_crc = Crc64::new();
        self.qual_crc = Crc64::new();
        self.id_bytes = 0;
        self.aux_bytes = 0;
        self.seq_bytes = 0;
        self.qual_bytes = 0;
        // `qual_base` is intentionally carried forward into the next block.

        Ok(())
    }
}

/// Owns the four sub-stream decoders and walks a container's blocks one at
/// a time, handing whole decoded blocks back to the caller.
pub struct BlockReader {
    id_dec: IdDecoder,
    aux_dec: AuxDecoder,
    seq_dec: Box<dyn SeqDecoder>,
    qual_dec: QualDecoder,
    block_index: u32,
}

impl BlockReader {
    pub fn new(seq_dec: Box<dyn SeqDecoder>) -> Self {
        BlockReader {
            id_dec: IdDecoder::new(),
            aux_dec: AuxDecoder::new(),
            seq_dec,
            qual_dec: QualDecoder::new(),
            block_index: 0,
        }
    }

    /// Reads one block, or `None` at the terminator. On a per-sub-stream
    /// checksum mismatch, logs a warning and returns the block's decoded
    /// reads anyway, per the "report, do not repair" policy.
    pub fn read_block<R: ByteSource + ?Sized>(
        &mut self,
        source: &mut R,
    ) -> Result<Option<Vec<Record>>> {
        // A clean end-of-stream is legal right here, between blocks; a
        // partial read of the read count itself means the stream was cut
        // mid-field and is fatal.
        let mut reads_buf = [0u8; 4];
        let filled = source.read_some_bytes(&mut reads_buf).map_err(reader_io)?;
        if filled == 0 {
            return Ok(None);
        }
        if filled < reads_buf.len() {
            return unexpected_eof_error("block header's read count");
        }
        let reads_in_block = u32::from_be_bytes(reads_buf);
        if reads_in_block == 0 {
            return Ok(None);
        }
        let _bases_in_block = source.read_u32_be().map_err(reader_io)?;

        let read_lengths = self.read_rle_u32(source, reads_in_block)?;
        let qual_bases = self.read_rle_u8(source, reads_in_block)?;

        let mut sizes = [(0u32, 0u32, 0u64); 4];
        for s in sizes.iter_mut() {
            let uncompressed = source.read_u32_be().map_err(reader_io)?;
            let compressed = source.read_u32_be().map_err(reader_io)?;
            let crc = source.read_u64_be().map_err(reader_io)?;
            *s = (uncompressed, compressed, crc);
        }

        let mut buffers: [Vec<u8>; 4] = Default::default();
        for (buf, s) in buffers.iter_mut().zip(sizes.iter()) {
            let mut b = vec![0u8; s.1 as usize];
            source.read_exact_bytes(&mut b).map_err(reader_io)?;
            *buf = b;
        }
        let [id_buf, aux_buf, seq_buf, qual_buf] = buffers;

        self.id_dec.reset_decoder(id_buf);
        self.aux_dec.reset_decoder(aux_buf);
        self.seq_dec.reset_decoder(seq_buf);
        self.qual_dec.reset_decoder(qual_buf);
        self.id_dec.start_decoder();
        self.aux_dec.start_decoder();
        self.seq_dec.start_decoder();
        self.qual_dec.start_decoder();

        let n = reads_in_block as usize;
        let mut ids: Vec<Vec<u8>> = Vec::with_capacity(n);
        let mut auxes: Vec<Vec<crate::record::AuxField>> = Vec::with_capacity(n);
        let mut seqs: Vec<Vec<u8>> = Vec::with_capacity(n);
        let mut quals: Vec<Vec<u8>> = Vec::with_capacity(n);

        let mut id_crc = Crc64::new();
        let mut aux_crc = Crc64::new();
        let mut seq_crc = Crc64::new();
        let mut qual_crc = Crc64::new();

        let mut read_idx = 0usize;
        while read_idx < n {
            let take = (n - read_idx).min(CHUNK);
            let lens = &read_lengths[read_idx..read_idx + take];
            let base = qual_bases[read_idx];
            self.qual_dec.set_base(base);

            let id_dec = &mut self.id_dec;
            let aux_dec = &mut self.aux_dec;
            let seq_dec = self.seq_dec.as_mut();
            let qual_dec = &mut self.qual_dec;

            let (chunk_ids, chunk_auxes, chunk_seqs, chunk_quals) = std::thread::scope(|scope| {
                let t_id = scope.spawn(move || (0..take).map(|_| id_dec.decode()).collect::<Vec<_>>());
                let t_aux =
                    scope.spawn(move || (0..take).map(|_| aux_dec.decode()).collect::<Vec<_>>());
                let t_seq = scope.spawn(move || {
                    lens.iter().map(|&len| seq_dec.decode(len as usize)).collect::<Vec<_>>()
                });
                let t_qual = scope.spawn(move || {
                    lens.iter()
                        .map(|&len| {
                            let mut out = Vec::new();
                            qual_dec.decode(len as usize, &mut out);
                            out
                        })
                        .collect::<Vec<_>>()
                });
                (t_id.join(), t_aux.join(), t_seq.join(), t_qual.join())
            });

            let (chunk_ids, chunk_auxes, chunk_seqs, chunk_quals) = match (
                chunk_ids,
                chunk_auxes,
                chunk_seqs,
                chunk_quals,
            ) {
                (Ok(a), Ok(b), Ok(c), Ok(d)) => (a, b, c, d),
                _ => return concurrency_error("a chunk decode worker panicked"),
            };

            for id in &chunk_ids {
                id_crc.update(id);
            }
            for aux in &chunk_auxes {
                let bytes = aux::canonical_bytes(aux);
                aux_crc.update(&bytes);
            }
            for seq in &chunk_seqs {
                seq_crc.update(seq);
            }
            for qual in &chunk_quals {
                qual_crc.update(qual);
            }

            ids.extend(chunk_ids);
            auxes.extend(chunk_auxes);
            seqs.extend(chunk_seqs);
            quals.extend(chunk_quals);

            read_idx += take;
        }

        let observed = [
            (SubStream::Id, id_crc.finalize(), sizes[0].2),
            (SubStream::Aux, aux_crc.finalize(), sizes[1].2),
            (SubStream::Seq, seq_crc.finalize(), sizes[2].2),
            (SubStream::Qual, qual_crc.finalize(), sizes[3].2),
        ];
        for (stream, found, expected) in observed {
            if found != expected {
                log::warn!(
                    "{}",
                    ChecksumMismatch {
                        stream,
                        block_index: self.block_index,
                        expected,
                        found,
                    }
                );
            }
        }

        let records = (0..n)
            .map(|i| {
                Record::new(
                    std::mem::take(&mut ids[i]),
                    std::mem::take(&mut seqs[i]),
                    std::mem::take(&mut quals[i]),
                    std::mem::take(&mut auxes[i]),
                )
            })
            .collect();

        self.block_index += 1;
        Ok(Some(records))
    }

    fn read_rle_u32<R: ByteSource + ?Sized>(
        &self,
        source: &mut R,
        reads_in_block: u32,
    ) -> Result<Vec<u32>> {
        let mut runs: Vec<(u32, u32)> = Vec::new();
        let mut total = 0u32;
        while total < reads_in_block {
            let value = source.read_u32_be().map_err(reader_io)?;
            let count = source.read_u32_be().map_err(reader_io)?;
            if count > 0 {
                runs.push((value, count));
            }
            total += count;
        }
        Ok(expand(&runs, reads_in_block))
    }

    fn read_rle_u8<R: ByteSource + ?Sized>(
        &self,
        source: &mut R,
        reads_in_block: u32,
    ) -> Result<Vec<u8>> {
        let mut runs: Vec<(u8, u32)> = Vec::new();
        let mut total = 0u32;
        while total < reads_in_block {
            let value = source.read_u8().map_err(reader_io)?;
            let count = source.read_u32_be().map_err(reader_io)?;
            if count > 0 {
                runs.push((value, count));
            }
            total += count;
        }
        Ok(expand(&runs, reads_in_block))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codecs::seq::{PlainSeqDecoder, PlainSeqEncoder};
    use crate::record::Record;

    fn sample_records(n: usize) -> Vec<Record> {
        (0..n)
            .map(|i| {
                Record::new(
                    format!("read{i}").into_bytes(),
                    b"ACGTACGTAC".to_vec(),
                    vec![b'I'; 10],
                    Vec::new(),
                )
            })
            .collect()
    }

    #[test]
    fn rle_collapses_consecutive_equal_runs() {
        let mut rle: Rle<u32> = Rle::new();
        for v in [1, 1, 1, 2, 2, 3] {
            rle.push(v);
        }
        assert_eq!(rle.runs(), &[(1, 3), (2, 2), (3, 1)]);
        assert_eq!(rle.total(), 6);
    }

    #[test]
    fn round_trips_small_block() {
        let records = sample_records(12);

        let mut writer = BlockWriter::new(Box::new(PlainSeqEncoder::new()));
        let mut bytes = Vec::new();
        for r in records.clone() {
            writer.append(r, &mut bytes).unwrap();
        }
        writer.finish(&mut bytes).unwrap();

        let mut reader = BlockReader::new(Box::new(PlainSeqDecoder::new()));
        let mut cursor: &[u8] = &bytes;
        let decoded = reader.read_block(&mut cursor).unwrap().unwrap();
        assert_eq!(decoded, records);
        assert!(reader.read_block(&mut cursor).unwrap().is_none());
    }

    #[test]
    fn round_trips_block_spanning_multiple_chunks() {
        let records = sample_records(CHUNK * 2 + 37);

        let mut writer = BlockWriter::new(Box::new(PlainSeqEncoder::new()));
        let mut bytes = Vec::new();
        for r in records.clone() {
            writer.append(r, &mut bytes).unwrap();
        }
        writer.finish(&mut bytes).unwrap();

        let mut reader = BlockReader::new(Box::new(PlainSeqDecoder::new()));
        let mut cursor: &[u8] = &bytes;
        let decoded = reader.read_block(&mut cursor).unwrap().unwrap();
        assert_eq!(decoded, records);
    }

    #[test]
    fn partial_terminator_is_unexpected_eof() {
        let mut reader = BlockReader::new(Box::new(PlainSeqDecoder::new()));
        let mut cursor: &[u8] = &[0u8, 1, 2];
        let err = reader.read_block(&mut cursor).unwrap_err();
        assert!(matches!(err, Error::UnexpectedEndOfFile { .. }));
    }

    #[test]
    fn truncated_block_body_is_unexpected_eof() {
        let records = sample_records(3);
        let mut writer = BlockWriter::new(Box::new(PlainSeqEncoder::new()));
        let mut bytes = Vec::new();
        for r in records {
            writer.append(r, &mut bytes).unwrap();
        }
        writer.finish(&mut bytes).unwrap();
        bytes.truncate(bytes.len() - 8);

        let mut reader = BlockReader::new(Box::new(PlainSeqDecoder::new()));
        let mut cursor: &[u8] = &bytes;
        let err = reader.read_block(&mut cursor).unwrap_err();
        assert!(matches!(err, Error::UnexpectedEndOfFile { .. } | Error::ReaderIoError(_)));
    }

    #[test]
    fn empty_writer_emits_only_terminator() {
        let mut writer = BlockWriter::new(Box::new(PlainSeqEncoder::new()));
        let mut bytes = Vec::new();
        writer.finish(&mut bytes).unwrap();
        assert_eq!(bytes, 0u32.to_be_bytes());
    }
}
