// fqpack
// Copyright (c) 2019-2026 The fqpack Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! End-to-end container round-trip scenarios that exercise the full
//! `Writer`/`Reader` stack rather than any one module in isolation.

use fqpack_core::block::{BlockReader, BlockWriter};
use fqpack_core::codecs::seq::{PlainSeqDecoder, PlainSeqEncoder};
use fqpack_core::container::{Header, Reader, Writer, CONTAINER_VERSION};
use fqpack_core::record::Record;

fn sample_records(n: usize, len: usize) -> Vec<Record> {
    (0..n)
        .map(|i| {
            let seq: Vec<u8> = (0..len).map(|j| b"ACGT"[(i + j) % 4]).collect();
            let qual: Vec<u8> = (0..len).map(|j| 33 + ((i + j) % 40) as u8).collect();
            Record::new(format!("read{i}").into_bytes(), seq, qual, Vec::new())
        })
        .collect()
}

fn write_container(records: &[Record]) -> Vec<u8> {
    let header = Header { version: CONTAINER_VERSION, ..Header::default() };
    let mut writer = Writer::new(Vec::new(), Box::new(PlainSeqEncoder::new()), header).unwrap();
    for r in records {
        writer.append(r.clone()).unwrap();
    }
    writer.finish().unwrap()
}

fn read_container(bytes: &[u8]) -> Vec<Record> {
    let mut cursor: &[u8] = bytes;
    let mut reader = Reader::new(&mut cursor, Box::new(PlainSeqDecoder::new()), None).unwrap();
    reader.read_all().unwrap()
}

#[test]
fn round_trips_empty_input() {
    let records = sample_records(0, 0);
    let bytes = write_container(&records);
    assert_eq!(read_container(&bytes), records);
}

#[test]
fn round_trips_single_read() {
    let records = sample_records(1, 36);
    let bytes = write_container(&records);
    assert_eq!(read_container(&bytes), records);
}

#[test]
fn round_trips_two_reads_differing_only_in_last_base() {
    let mut records = sample_records(2, 20);
    records[0].seq[19] = b'A';
    records[1].seq = records[0].seq.clone();
    records[1].seq[19] = b'T';
    let bytes = write_container(&records);
    assert_eq!(read_container(&bytes), records);
}

#[test]
fn round_trips_ten_thousand_reads_of_length_one_hundred() {
    let records = sample_records(10_000, 100);
    let bytes = write_container(&records);
    assert_eq!(read_container(&bytes), records);
}

#[test]
fn two_successive_encodes_are_byte_identical() {
    let records = sample_records(500, 60);
    let first = write_container(&records);
    let second = write_container(&records);
    assert_eq!(first, second);
}

/// A minimal `log::Log` sink that records every formatted message, used to
/// observe the single warning a corrupted sub-stream checksum should
/// produce without tearing down the read.
struct RecordingLogger {
    messages: std::sync::Mutex<Vec<String>>,
}

impl log::Log for RecordingLogger {
    fn enabled(&self, metadata: &log::Metadata<'_>) -> bool {
        metadata.level() <= log::Level::Warn
    }

    fn log(&self, record: &log::Record<'_>) {
        if self.enabled(record.metadata()) {
            self.messages.lock().unwrap().push(record.args().to_string());
        }
    }

    fn flush(&self) {}
}

static LOGGER: RecordingLogger = RecordingLogger { messages: std::sync::Mutex::new(Vec::new()) };
static INIT_LOGGER: std::sync::Once = std::sync::Once::new();

fn install_logger() {
    INIT_LOGGER.call_once(|| {
        log::set_logger(&LOGGER).expect("logger already installed");
        log::set_max_level(log::LevelFilter::Warn);
    });
}

/// Parses just enough of a single block's header to find where the quality
/// sub-stream's compressed bytes start and how long they are, without
/// pulling in the crate's own (non-public) block-header parser.
fn locate_qual_region(bytes: &[u8]) -> (usize, usize) {
    let mut pos = 0usize;
    let read_u32 = |bytes: &[u8], pos: &mut usize| {
        let v = u32::from_be_bytes(bytes[*pos..*pos + 4].try_into().unwrap());
        *pos += 4;
        v
    };
    let reads_in_block = read_u32(bytes, &mut pos);
    let _bases_in_block = read_u32(bytes, &mut pos);

    let mut total = 0u32;
    while total < reads_in_block {
        let _len = read_u32(bytes, &mut pos);
        let count = read_u32(bytes, &mut pos);
        total += count;
    }
    let mut total = 0u32;
    while total < reads_in_block {
        pos += 1; // base byte
        let count = read_u32(bytes, &mut pos);
        total += count;
    }

    let mut compressed = [0u32; 4];
    for slot in compressed.iter_mut() {
        let _uncompressed = read_u32(bytes, &mut pos);
        let c = read_u32(bytes, &mut pos);
        pos += 8; // crc64
        *slot = c;
    }

    let qual_start = pos + (compressed[0] + compressed[1] + compressed[2]) as usize;
    (qual_start, compressed[3] as usize)
}

#[test]
fn corrupted_qual_checksum_is_warned_and_reading_continues() {
    install_logger();
    LOGGER.messages.lock().unwrap().clear();

    let records = sample_records(40, 30);
    let mut writer = BlockWriter::new(Box::new(PlainSeqEncoder::new()));
    let mut bytes = Vec::new();
    for r in records.clone() {
        writer.append(r, &mut bytes).unwrap();
    }
    writer.finish(&mut bytes).unwrap();

    let (qual_start, qual_len) = locate_qual_region(&bytes);
    assert!(qual_len > 0, "test fixture must produce non-empty compressed quality bytes");
    bytes[qual_start + qual_len / 2] ^= 0xff;

    let mut reader = BlockReader::new(Box::new(PlainSeqDecoder::new()));
    let mut cursor: &[u8] = &bytes;
    let decoded = reader.read_block(&mut cursor).unwrap().unwrap();
    assert_eq!(decoded.len(), records.len());

    let warnings = LOGGER.messages.lock().unwrap();
    let qual_warnings: Vec<&String> = warnings.iter().filter(|m| m.contains("Qual")).collect();
    assert_eq!(qual_warnings.len(), 1, "expected exactly one quality checksum warning, got: {warnings:?}");
}
