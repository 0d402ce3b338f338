// fqpack
// Copyright (c) 2019-2026 The fqpack Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! One module per sub-stream: `id`, `qual`, `aux`, and `seq`. Each exposes
//! an `Encoder`/`Decoder` pair (or, for `seq`, a trait the block writer
//! dispatches through, since which sequence model is active is chosen once
//! per run from the container header's flags).

pub mod aux;
pub mod id;
pub mod qual;
pub mod seq;
