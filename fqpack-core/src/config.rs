// fqpack
// Copyright (c) 2019-2026 The fqpack Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Small, caller-supplied option structs, in the shape of
//! `symphonia_core`'s `DecoderOptions`/`FormatOptions`: plain structs with
//! `Default` impls, never a config file or `serde` schema, since nothing in
//! this crate is configured from outside the embedding program.

use crate::block::{BLOCK_BASES, CHUNK};
use crate::codecs::qual::QUAL_SCALE;

/// Which sequence sub-stream collaborator a [`container::Writer`] drives.
///
/// `Assembled` and `Reference` are only constructible by `fqpack-seq`; this
/// enum just records, in the container header flags, which one a run used.
///
/// [`container::Writer`]: crate::container::Writer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SeqVariant {
    #[default]
    Plain,
    Assembled,
    Reference,
}

/// Tuning knobs for a [`container::Writer`]/[`container::Reader`] pair.
///
/// The defaults match the wire format's named constants; widening
/// `chunk`/`block_bases` changes only how often the encoder fans out and
/// closes blocks, never the bytes a *decoder* needs to understand, so a
/// decoder's `Config` need not match the encoder's.
///
/// [`container::Writer`]: crate::container::Writer
/// [`container::Reader`]: crate::container::Reader
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Reads buffered per chunk before the four-way fan-out runs.
    pub chunk: usize,
    /// Bases accumulated before a block closes.
    pub block_bases: u32,
    /// Width of the quality alphabet a chunk's bytes must fit within.
    pub qual_scale: u8,
    /// Which sequence sub-stream collaborator to drive.
    pub seq_variant: SeqVariant,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            chunk: CHUNK,
            block_bases: BLOCK_BASES,
            qual_scale: QUAL_SCALE,
            seq_variant: SeqVariant::Plain,
        }
    }
}
