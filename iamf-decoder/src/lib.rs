// IAMF-RS
// Copyright (c) 2024 The IAMF-RS Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]
// The following lints are allowed in all IAMF-RS crates. Please see the workspace Cargo.toml for
// their justification.
#![allow(clippy::comparison_chain)]
#![allow(clippy::excessive_precision)]
#![allow(clippy::identity_op)]
#![allow(clippy::manual_range_contains)]

//! The IAMF decoder: descriptor database, parameter timeline, per-element decoding and
//! demixing, rendering, and the mix, resample, loudness and limiter chain of a mix
//! presentation.

mod context;
pub mod database;
mod demixer;
mod frame;
mod limiter;
mod mixer;
mod options;
pub mod parameters;
mod presentation;
pub mod render;
mod resampler;
pub mod stream;
mod stream_decoder;

pub use context::{AudioOutput, DecodeStatus, Decoded, DecoderState, IamfDecoder, StreamInfo};
pub use frame::Frame;
pub use options::{DecoderOptions, LimiterOptions};
