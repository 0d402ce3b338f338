// fqpack
// Copyright (c) 2019-2026 The fqpack Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `checksum` module provides the one error-detecting code this crate
//! needs: the CRC64 variant used for per-sub-stream block integrity.

mod crc64;

pub use crc64::Crc64;
