// fqpack
// Copyright (c) 2019-2026 The fqpack Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `fqpack-core` is a block-parallel statistical codec for FASTQ/SAM/BAM
//! reads: an order-N adaptive arithmetic coder, one sub-stream model each
//! for read identifiers, optional tags, sequence, and quality, and the
//! block/container framing that ties them together into a single
//! self-describing, checksummed file format.
//!
//! The public entry points are [`container::Writer`] and
//! [`container::Reader`]; everything else is exposed mainly so
//! `fqpack-seq`'s alternative sequence coders can plug into [`block`]
//! through the [`codecs::seq::SeqEncoder`]/[`codecs::seq::SeqDecoder`]
//! traits.

pub mod ac;
pub mod block;
pub mod checksum;
pub mod codecs;
pub mod config;
pub mod container;
pub mod dist;
pub mod errors;
pub mod io;
pub mod record;

pub use codecs::seq::{SeqDecoder, SeqEncoder};
pub use config::{Config, SeqVariant};
pub use container::{Reader, Writer};
pub use errors::{Error, Result};
pub use record::{AuxArray, AuxField, AuxValue, Record, Tag};
