// fqpack
// Copyright (c) 2019-2026 The fqpack Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The container layer: the magic/version/flags header, the optional
//! reference fingerprint and assembly-hint fields, the aux payload (e.g. a
//! verbatim SAM header), and the repeated-blocks body that
//! [`BlockWriter`]/[`BlockReader`] frame.
//!
//! [`Writer`] and [`Reader`] are the crate's top-level entry points; the
//! standalone [`inspect`] walker parses the same header and block-header
//! bytes without ever invoking arithmetic decoding, for `list`-style
//! tooling that only wants per-block size accounting.

use crate::block::{BlockReader, BlockWriter, CHUNK};
use crate::codecs::seq::{SeqDecoder, SeqEncoder};
use crate::config::SeqVariant;
use crate::errors::{malformed_header_error, unexpected_eof_error, wrong_reference_error, Error, Result};
use crate::io::{ByteSink, ByteSource};
use crate::record::Record;

const MAGIC: [u8; 6] = [0xFF, b'Q', b'U', b'I', b'P', 0x00];

/// The only container version this crate writes. Versions 2 and 3 are both
/// accepted on read; version 1 is rejected, matching the source codec this
/// format is descended from.
pub const CONTAINER_VERSION: u8 = 3;

const FLAG_REFERENCE: u8 = 0b01;
const FLAG_ASSEMBLED: u8 = 0b10;

fn writer_io(e: std::io::Error) -> Error {
    Error::WriterIoError(e)
}

fn reader_io(e: std::io::Error) -> Error {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        Error::UnexpectedEndOfFile { detail: "a declared header field was truncated" }
    }
    else {
        Error::ReaderIoError(e)
    }
}

/// The external reference set a [`SeqVariant::Reference`] run is fingerprinted
/// against: a CRC64 (computed by the caller over the reference FASTA, out of
/// this crate's scope) plus the filename and per-sequence name/length table
/// recorded in the container header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceInfo {
    pub crc64: u64,
    pub filename: Vec<u8>,
    pub sequences: Vec<(Vec<u8>, u64)>,
}

impl ReferenceInfo {
    fn write<W: ByteSink + ?Sized>(&self, sink: &mut W) -> Result<()> {
        sink.write_u64_be(self.crc64).map_err(writer_io)?;
        sink.write_u32_be(self.filename.len() as u32).map_err(writer_io)?;
        sink.write_all_bytes(&self.filename).map_err(writer_io)?;
        sink.write_u32_be(self.sequences.len() as u32).map_err(writer_io)?;
        for (name, len) in &self.sequences {
            sink.write_u32_be(name.len() as u32).map_err(writer_io)?;
            sink.write_all_bytes(name).map_err(writer_io)?;
            sink.write_u64_be(*len).map_err(writer_io)?;
        }
        Ok(())
    }

    fn read<R: ByteSource + ?Sized>(source: &mut R) -> Result<Self> {
        let crc64 = source.read_u64_be().map_err(reader_io)?;
        let n_fn = source.read_u32_be().map_err(reader_io)?;
        let mut filename = vec![0u8; n_fn as usize];
        source.read_exact_bytes(&mut filename).map_err(reader_io)?;
        let n_s = source.read_u32_be().map_err(reader_io)?;
        let mut sequences = Vec::with_capacity(n_s as usize);
        for _ in 0..n_s {
            let name_len = source.read_u32_be().map_err(reader_io)?;
            let mut name = vec![0u8; name_len as usize];
            source.read_exact_bytes(&mut name).map_err(reader_io)?;
            let seq_len = source.read_u64_be().map_err(reader_io)?;
            sequences.push((name, seq_len));
        }
        Ok(ReferenceInfo { crc64, filename, sequences })
    }
}

/// The fields a run's header carries beyond the blocks themselves.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Header {
    pub version: u8,
    pub reference: Option<ReferenceInfo>,
    pub assembly_n: Option<u64>,
    pub aux_format_tag: u8,
    pub aux_payload: Vec<u8>,
}

fn write_header<W: ByteSink + ?Sized>(sink: &mut W, header: &Header) -> Result<()> {
    sink.write_all_bytes(&MAGIC).map_err(writer_io)?;
    sink.write_u8(header.version).map_err(writer_io)?;

    let mut flags = 0u8;
    if header.reference.is_some() {
        flags |= FLAG_REFERENCE;
    }
    if header.assembly_n.is_some() {
        flags |= FLAG_ASSEMBLED;
    }
    sink.write_u8(flags).map_err(writer_io)?;

    if let Some(reference) = &header.reference {
        reference.write(sink)?;
    }
    if let Some(assembly_n) = header.assembly_n {
        sink.write_u64_be(assembly_n).map_err(writer_io)?;
    }

    sink.write_u8(header.aux_format_tag).map_err(writer_io)?;
    sink.write_u64_be(header.aux_payload.len() as u64).map_err(writer_io)?;
    sink.write_all_bytes(&header.aux_payload).map_err(writer_io)?;
    Ok(())
}

/// Reads and validates the container header. `supplied_reference`, if the
/// caller has one on hand, is checked against the header's recorded
/// fingerprint; a `REFERENCE` flag with no supplied reference is
/// [`Error::MissingReference`], and a fingerprint mismatch is
/// [`Error::WrongReference`].
fn read_header<R: ByteSource + ?Sized>(
    source: &mut R,
    supplied_reference: Option<&ReferenceInfo>,
) -> Result<Header> {
    let mut magic = [0u8; 6];
    source.read_exact_bytes(&mut magic).map_err(reader_io)?;
    if magic != MAGIC {
        return malformed_header_error("magic bytes did not match");
    }

    let version = source.read_u8().map_err(reader_io)?;
    if version != 2 && version != 3 {
        return malformed_header_error("unsupported container version");
    }

    let flags = source.read_u8().map_err(reader_io)?;
    let has_reference = flags & FLAG_REFERENCE != 0;
    let has_assembled = flags & FLAG_ASSEMBLED != 0;

    let reference = if has_reference {
        let recorded = ReferenceInfo::read(source)?;
        match supplied_reference {
            None => return Err(Error::MissingReference),
            Some(supplied) if *supplied != recorded => {
                return wrong_reference_error("supplied reference's CRC64 or sequence table did not match");
            }
            Some(_) => {}
        }
        Some(recorded)
    }
    else {
        None
    };

    let assembly_n =
        if has_assembled { Some(source.read_u64_be().map_err(reader_io)?) } else { None };

    let aux_format_tag = source.read_u8().map_err(reader_io)?;
    let n_aux = source.read_u64_be().map_err(reader_io)?;
    let mut aux_payload = vec![0u8; n_aux as usize];
    source.read_exact_bytes(&mut aux_payload).map_err(reader_io)?;

    Ok(Header { version, reference, assembly_n, aux_format_tag, aux_payload })
}

/// A container writer: writes the header once on construction, then frames
/// every appended [`Record`] into blocks via an internal [`BlockWriter`].
pub struct Writer<W: ByteSink> {
    sink: W,
    block_writer: BlockWriter,
}

impl<W: ByteSink> Writer<W> {
    /// Writes the container header to `sink` and returns a writer ready to
    /// accept records. `seq_enc` must match `header`'s implied
    /// [`SeqVariant`] (the header itself records only `REFERENCE`/
    /// `ASSEMBLED`, not which concrete collaborator produced the bytes —
    /// that pairing is the caller's responsibility, mirroring how the
    /// sequence sub-stream is "selected once per run from header flags"
    /// rather than self-describing).
    pub fn new(mut sink: W, seq_enc: Box<dyn SeqEncoder>, header: Header) -> Result<Self> {
        write_header(&mut sink, &header)?;
        Ok(Writer { sink, block_writer: BlockWriter::new(seq_enc) })
    }

    pub fn append(&mut self, record: Record) -> Result<()> {
        self.block_writer.append(record, &mut self.sink)
    }

    /// Flushes any buffered chunk and block, writes the terminator, and
    /// returns the underlying sink.
    pub fn finish(mut self) -> Result<W> {
        self.block_writer.finish(&mut self.sink)?;
        Ok(self.sink)
    }
}

/// A container reader: parses the header on construction, then yields one
/// decoded block's worth of records per [`Reader::next_block`] call.
pub struct Reader<R: ByteSource> {
    source: R,
    header: Header,
    block_reader: BlockReader,
    done: bool,
}

impl<R: ByteSource> Reader<R> {
    pub fn new(
        mut source: R,
        seq_dec: Box<dyn SeqDecoder>,
        supplied_reference: Option<&ReferenceInfo>,
    ) -> Result<Self> {
        let header = read_header(&mut source, supplied_reference)?;
        Ok(Reader { source, header, block_reader: BlockReader::new(seq_dec), done: false })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Which sequence sub-stream variant this run's header implies, for
    /// callers that need to pick a matching decoder before constructing
    /// [`Reader`].
    pub fn seq_variant(&self) -> SeqVariant {
        if self.header.reference.is_some() {
            SeqVariant::Reference
        }
        else if self.header.assembly_n.is_some() {
            SeqVariant::Assembled
        }
        else {
            SeqVariant::Plain
        }
    }

    /// Reads the next block's records, or `None` once the terminator has
    /// been consumed.
    pub fn next_block(&mut self) -> Result<Option<Vec<Record>>> {
        if self.done {
            return Ok(None);
        }
        let block = self.block_reader.read_block(&mut self.source)?;
        if block.is_none() {
            self.done = true;
        }
        Ok(block)
    }

    /// Reads every remaining block and concatenates their records in order.
    pub fn read_all(&mut self) -> Result<Vec<Record>> {
        let mut out = Vec::new();
        while let Some(mut block) = self.next_block()? {
            out.append(&mut block);
        }
        Ok(out)
    }
}

/// Per-sub-stream size/checksum accounting for one block, as recorded in
/// its header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubStreamSummary {
    pub uncompressed: u32,
    pub compressed: u32,
    pub crc64: u64,
}

/// One block's header fields, in the fixed id/aux/seq/qual order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockSummary {
    pub reads: u32,
    pub bases: u32,
    pub id: SubStreamSummary,
    pub aux: SubStreamSummary,
    pub seq: SubStreamSummary,
    pub qual: SubStreamSummary,
}

/// The result of walking a whole container without decoding any block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSummary {
    pub header: Header,
    pub blocks: Vec<BlockSummary>,
}

fn skip_rle<R: ByteSource + ?Sized>(
    source: &mut R,
    reads_in_block: u32,
    value_width: usize,
) -> Result<()> {
    let mut total = 0u32;
    while total < reads_in_block {
        let mut value = vec![0u8; value_width];
        source.read_exact_bytes(&mut value).map_err(reader_io)?;
        let count = source.read_u32_be().map_err(reader_io)?;
        total += count;
    }
    Ok(())
}

/// Walks a container's header and every block header, skipping the four
/// compressed regions by byte count rather than decoding them. Used by
/// `list`/`inspect`-style tooling that only needs per-block size
/// accounting.
pub fn inspect<R: ByteSource + ?Sized>(
    source: &mut R,
    supplied_reference: Option<&ReferenceInfo>,
) -> Result<ContainerSummary> {
    let header = read_header(source, supplied_reference)?;
    let mut blocks = Vec::new();

    loop {
        // A clean end-of-stream is legal right here, between blocks; a
        // partial read of the count itself is not.
        let mut reads_buf = [0u8; 4];
        let filled = source.read_some_bytes(&mut reads_buf).map_err(reader_io)?;
        if filled == 0 {
            break;
        }
        if filled < reads_buf.len() {
            return unexpected_eof_error("block header's read count");
        }
        let reads = u32::from_be_bytes(reads_buf);
        if reads == 0 {
            break;
        }
        let bases = source.read_u32_be().map_err(reader_io)?;

        skip_rle(source, reads, 4)?;
        skip_rle(source, reads, 1)?;

        let mut summaries = [SubStreamSummary { uncompressed: 0, compressed: 0, crc64: 0 }; 4];
        for s in summaries.iter_mut() {
            let uncompressed = source.read_u32_be().map_err(reader_io)?;
            let compressed = source.read_u32_be().map_err(reader_io)?;
            let crc64 = source.read_u64_be().map_err(reader_io)?;
            *s = SubStreamSummary { uncompressed, compressed, crc64 };
        }

        for s in &summaries {
            let mut discard = vec![0u8; s.compressed as usize];
            source.read_exact_bytes(&mut discard).map_err(reader_io)?;
        }

        blocks.push(BlockSummary {
            reads,
            bases,
            id: summaries[0],
            aux: summaries[1],
            seq: summaries[2],
            qual: summaries[3],
        });
    }

    Ok(ContainerSummary { header, blocks })
}

/// Re-exported so callers constructing a [`BlockWriter`]/[`BlockReader`]
/// directly (rather than through [`Writer`]/[`Reader`]) can size their own
/// chunk buffers consistently.
pub const CHUNK_SIZE: usize = CHUNK;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codecs::seq::{PlainSeqDecoder, PlainSeqEncoder};
    use crate::record::Record;

    fn sample_records(n: usize) -> Vec<Record> {
        (0..n)
            .map(|i| {
                Record::new(
                    format!("r{i}").into_bytes(),
                    b"ACGTACGTAC".to_vec(),
                    vec![b'I'; 10],
                    Vec::new(),
                )
            })
            .collect()
    }

    #[test]
    fn round_trips_plain_container_with_no_reference() {
        let records = sample_records(30);
        let header = Header { version: CONTAINER_VERSION, ..Header::default() };

        let mut writer =
            Writer::new(Vec::new(), Box::new(PlainSeqEncoder::new()), header.clone()).unwrap();
        for r in records.clone() {
            writer.append(r).unwrap();
        }
        let bytes = writer.finish().unwrap();

        let mut cursor: &[u8] = &bytes;
        let mut reader = Reader::new(&mut cursor, Box::new(PlainSeqDecoder::new()), None).unwrap();
        assert_eq!(reader.header().version, CONTAINER_VERSION);
        assert_eq!(reader.seq_variant(), SeqVariant::Plain);
        let decoded = reader.read_all().unwrap();
        assert_eq!(decoded, records);
    }

    #[test]
    fn reference_flag_without_supplied_reference_is_missing_reference() {
        let reference = ReferenceInfo {
            crc64: 0xdead_beef,
            filename: b"ref.fa".to_vec(),
            sequences: vec![(b"chr1".to_vec(), 1000)],
        };
        let header = Header {
            version: CONTAINER_VERSION,
            reference: Some(reference),
            ..Header::default()
        };
        let mut writer =
            Writer::new(Vec::new(), Box::new(PlainSeqEncoder::new()), header).unwrap();
        writer.append(sample_records(1).remove(0)).unwrap();
        let bytes = writer.finish().unwrap();

        let mut cursor: &[u8] = &bytes;
        let err = Reader::new(&mut cursor, Box::new(PlainSeqDecoder::new()), None).unwrap_err();
        assert!(matches!(err, Error::MissingReference));
    }

    #[test]
    fn mismatched_reference_is_wrong_reference() {
        let written = ReferenceInfo {
            crc64: 1,
            filename: b"a.fa".to_vec(),
            sequences: vec![(b"chr1".to_vec(), 5)],
        };
        let header = Header {
            version: CONTAINER_VERSION,
            reference: Some(written),
            ..Header::default()
        };
        let mut writer =
            Writer::new(Vec::new(), Box::new(PlainSeqEncoder::new()), header).unwrap();
        writer.append(sample_records(1).remove(0)).unwrap();
        let bytes = writer.finish().unwrap();

        let supplied = ReferenceInfo {
            crc64: 2,
            filename: b"a.fa".to_vec(),
            sequences: vec![(b"chr1".to_vec(), 5)],
        };
        let mut cursor: &[u8] = &bytes;
        let err = Reader::new(&mut cursor, Box::new(PlainSeqDecoder::new()), Some(&supplied))
            .unwrap_err();
        assert!(matches!(err, Error::WrongReference { .. }));
    }

    #[test]
    fn rejects_malformed_magic() {
        let mut bytes = vec![0u8; 16];
        bytes[0] = 0x00;
        let mut cursor: &[u8] = &bytes;
        let err = Reader::new(&mut cursor, Box::new(PlainSeqDecoder::new()), None).unwrap_err();
        assert!(matches!(err, Error::MalformedHeader { .. }));
    }

    #[test]
    fn truncated_header_is_unexpected_eof() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&MAGIC);
        bytes.push(CONTAINER_VERSION);
        // Cut off before the flags byte.
        let mut cursor: &[u8] = &bytes;
        let err = Reader::new(&mut cursor, Box::new(PlainSeqDecoder::new()), None).unwrap_err();
        assert!(matches!(err, Error::UnexpectedEndOfFile { .. }));
    }

    #[test]
    fn rejects_unsupported_version() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&MAGIC);
        bytes.push(1);
        bytes.push(0);
        bytes.push(0);
        bytes.extend_from_slice(&0u64.to_be_bytes());
        let mut cursor: &[u8] = &bytes;
        let err = Reader::new(&mut cursor, Box::new(PlainSeqDecoder::new()), None).unwrap_err();
        assert!(matches!(err, Error::MalformedHeader { .. }));
    }

    #[test]
    fn inspect_walks_blocks_without_decoding() {
        let records = sample_records(CHUNK + 5);
        let header = Header { version: CONTAINER_VERSION, ..Header::default() };
        let mut writer =
            Writer::new(Vec::new(), Box::new(PlainSeqEncoder::new()), header).unwrap();
        for r in records {
            writer.append(r).unwrap();
        }
        let bytes = writer.finish().unwrap();

        let mut cursor: &[u8] = &bytes;
        let summary = inspect(&mut cursor, None).unwrap();
        assert_eq!(summary.blocks.len(), 1);
        assert_eq!(summary.blocks[0].reads, (CHUNK + 5) as u32);
    }
}
