// IAMF-RS
// Copyright (c) 2024 The IAMF-RS Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `audio` module provides the channel and loudspeaker layout model shared by the IAMF
//! bitstream parser, the demixer, and the renderers.

mod channels;
mod layout;

pub use channels::*;
pub use layout::*;
