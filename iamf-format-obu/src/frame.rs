// IAMF-RS
// Copyright (c) 2024 The IAMF-RS Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/// An audio frame OBU: the coded data of one substream for one temporal unit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AudioFrame {
    pub substream_id: u64,
    /// The number of samples to trim from the start of the decoded frame.
    pub trim_start: u64,
    /// The number of samples to trim from the end of the decoded frame.
    pub trim_end: u64,
    pub data: Box<[u8]>,
}
