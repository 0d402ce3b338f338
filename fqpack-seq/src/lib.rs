// fqpack
// Copyright (c) 2019-2026 The fqpack Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Optional sequence sub-stream collaborators for `fqpack-core`: a
//! reference-aligned coder driven by an externally supplied FASTA index
//! ([`reference`]), and a de-novo assembler that builds its alignment
//! source from a run's own early reads ([`assembled`]). Both implement
//! `fqpack_core::{SeqEncoder, SeqDecoder}` and plug directly into
//! `fqpack_core::container::Writer`/`Reader` in place of the mandatory
//! order-2 model.
//!
//! Neither collaborator reimplements a full aligner: both reduce a read to
//! a seed-and-extend lookup against a fixed set of sequences, shared in
//! [`align`].

pub mod align;
pub mod assembled;
pub mod reference;
pub mod twobit;

pub use align::{AlignSource, AlignedSeqDecoder, AlignedSeqEncoder, SeedIndex};
pub use assembled::{AssembledSeqDecoder, AssembledSeqEncoder, ContigSet, DEFAULT_SEED_READS};
pub use reference::SeqMap;
pub use twobit::TwoBitSeq;
