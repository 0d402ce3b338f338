// fqpack
// Copyright (c) 2019-2026 The fqpack Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `errors` module defines the crate-wide error taxonomy.
//!
//! Every variant corresponds to exactly one row of the error taxonomy table
//! in the specification this crate implements: malformed headers and short
//! reads are always fatal, per-sub-stream checksum mismatches are warned and
//! the reader continues to the next block.

use std::fmt;
use std::io;

use crate::block::SubStream;

/// `Error` enumerates every way an encode or decode run can fail.
#[derive(Debug)]
pub enum Error {
    /// The container magic bytes did not match, or the version byte was
    /// neither 2 nor 3.
    MalformedHeader { detail: &'static str },
    /// A short read occurred inside a declared field (as opposed to between
    /// blocks, which is a normal end-of-stream).
    UnexpectedEndOfFile { detail: &'static str },
    /// The `REFERENCE` header flag was set but no reference set was
    /// supplied to the decoder.
    MissingReference,
    /// The supplied reference's CRC64 or sequence name table did not match
    /// the one recorded in the container.
    WrongReference { detail: &'static str },
    /// A fatal I/O error propagated from the outer writer.
    WriterIoError(io::Error),
    /// A fatal I/O error propagated from the outer reader.
    ReaderIoError(io::Error),
    /// A worker thread failed to complete (panicked) during chunk fan-out.
    InternalConcurrencyFailure { detail: &'static str },
    /// A chunk's quality bytes span more than `QUAL_SCALE` distinct values;
    /// raised only on the encode side, since it is a precondition on the
    /// block writer's own bookkeeping, not a property of the wire format.
    InvalidQualityRange { base: u8, found: u8 },
}

/// A per-sub-stream, per-block checksum mismatch. Not part of [`Error`]
/// because it is never fatal: the reader logs it via [`log::warn!`] and
/// continues, per the specification's "report, do not repair" policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChecksumMismatch {
    pub stream: SubStream,
    pub block_index: u32,
    pub expected: u64,
    pub found: u64,
}

impl fmt::Display for ChecksumMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "checksum mismatch in {:?} sub-stream of block {}: expected {:016x}, found {:016x}",
            self.stream, self.block_index, self.expected, self.found
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::MalformedHeader { detail } => write!(f, "malformed container header: {detail}"),
            Error::UnexpectedEndOfFile { detail } => {
                write!(f, "unexpected end of file while reading {detail}")
            }
            Error::MissingReference => {
                write!(f, "REFERENCE flag set but no reference sequences were supplied")
            }
            Error::WrongReference { detail } => write!(f, "reference mismatch: {detail}"),
            Error::WriterIoError(err) => write!(f, "writer I/O error: {err}"),
            Error::ReaderIoError(err) => write!(f, "reader I/O error: {err}"),
            Error::InternalConcurrencyFailure { detail } => {
                write!(f, "worker task failed: {detail}")
            }
            Error::InvalidQualityRange { base, found } => write!(
                f,
                "quality byte {found} falls outside [{base}, {}) for the current chunk",
                *base as u16 + crate::codecs::qual::QUAL_SCALE as u16
            ),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::WriterIoError(err) | Error::ReaderIoError(err) => Some(err),
            _ => None,
        }
    }
}

/// This crate's `Result` alias; every fallible public function returns it.
pub type Result<T> = std::result::Result<T, Error>;

/// Convenience constructor for [`Error::MalformedHeader`].
pub fn malformed_header_error<T>(detail: &'static str) -> Result<T> {
    Err(Error::MalformedHeader { detail })
}

/// Convenience constructor for [`Error::UnexpectedEndOfFile`].
pub fn unexpected_eof_error<T>(detail: &'static str) -> Result<T> {
    Err(Error::UnexpectedEndOfFile { detail })
}

/// Convenience constructor for [`Error::WrongReference`].
pub fn wrong_reference_error<T>(detail: &'static str) -> Result<T> {
    Err(Error::WrongReference { detail })
}

/// Convenience constructor for [`Error::InternalConcurrencyFailure`].
pub fn concurrency_error<T>(detail: &'static str) -> Result<T> {
    Err(Error::InternalConcurrencyFailure { detail })
}
