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

//! A parser for the Open Bitstream Units (OBUs) of an IAMF bitstream.

mod codec_config;
mod element;
mod frame;
mod header;
mod mix;
pub mod param;
mod reader;
mod sequence;

pub use codec_config::CodecConfig;
pub use element::{AmbisonicsConfig, AudioElement, AudioElementConfig, ChannelLayerConfig};
pub use element::OutputGain;
pub use frame::AudioFrame;
pub use header::{ObuHeader, ObuType};
pub use mix::{AnchoredLoudness, HeadphonesRenderingMode, LoudnessInfo, LoudnessLayout};
pub use mix::{MixPresentation, SubMix, SubMixElement, SubMixLayout};
pub use param::{ParameterBlock, RawParameterBlock};
pub use reader::{read_obu, ReadStatus};
pub use sequence::{Profile, SequenceHeader};

/// A parsed OBU.
#[derive(Clone, Debug)]
pub enum Obu {
    SequenceHeader(SequenceHeader),
    CodecConfig(CodecConfig),
    AudioElement(AudioElement),
    MixPresentation(MixPresentation),
    ParameterBlock(RawParameterBlock),
    TemporalDelimiter,
    AudioFrame(AudioFrame),
    /// A reserved OBU type. The payload is skipped.
    Reserved(u8),
}

impl Obu {
    /// Returns `true` if the OBU is a descriptor.
    pub fn is_descriptor(&self) -> bool {
        matches!(
            self,
            Obu::SequenceHeader(_)
                | Obu::CodecConfig(_)
                | Obu::AudioElement(_)
                | Obu::MixPresentation(_)
        )
    }
}
