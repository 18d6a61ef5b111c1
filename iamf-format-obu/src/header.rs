// IAMF-RS
// Copyright (c) 2024 The IAMF-RS Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use iamf_core::errors::Result;
use iamf_core::io::ReadBytes;

/// The type of an OBU.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ObuType {
    CodecConfig,
    AudioElement,
    MixPresentation,
    ParameterBlock,
    TemporalDelimiter,
    /// An audio frame with an explicit substream id.
    AudioFrame,
    /// An audio frame with an implicit substream id (0 to 17).
    AudioFrameId(u8),
    SequenceHeader,
    Reserved(u8),
}

impl ObuType {
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => ObuType::CodecConfig,
            1 => ObuType::AudioElement,
            2 => ObuType::MixPresentation,
            3 => ObuType::ParameterBlock,
            4 => ObuType::TemporalDelimiter,
            5 => ObuType::AudioFrame,
            6..=23 => ObuType::AudioFrameId(code - 6),
            31 => ObuType::SequenceHeader,
            _ => ObuType::Reserved(code),
        }
    }

    /// Returns `true` if the OBU is a descriptor.
    pub fn is_descriptor(&self) -> bool {
        matches!(
            self,
            ObuType::SequenceHeader
                | ObuType::CodecConfig
                | ObuType::AudioElement
                | ObuType::MixPresentation
        )
    }
}

/// The common header of all OBUs.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ObuHeader {
    pub obu_type: ObuType,
    /// The OBU is a redundant copy of a previous OBU.
    pub redundant_copy: bool,
    /// The number of samples to trim from the end of the audio frame.
    pub num_samples_to_trim_at_end: u64,
    /// The number of samples to trim from the start of the audio frame.
    pub num_samples_to_trim_at_start: u64,
    /// The size of the header, including the optional fields.
    pub header_len: usize,
    /// The size of the payload following the header.
    pub payload_len: usize,
}

/// The header fields that precede `obu_size`.
pub(crate) struct ObuPreamble {
    pub obu_type: ObuType,
    pub redundant_copy: bool,
    pub trimming: bool,
    pub extension: bool,
    /// `obu_size`: the number of bytes after the `obu_size` field.
    pub obu_size: u64,
}

impl ObuPreamble {
    pub fn read<B: ReadBytes>(reader: &mut B) -> Result<ObuPreamble> {
        let byte = reader.read_u8()?;

        let obu_type = ObuType::from_code(byte >> 3);
        let redundant_copy = byte & 0x4 != 0;
        let trimming = byte & 0x2 != 0;
        let extension = byte & 0x1 != 0;

        let obu_size = reader.read_leb128()?;

        Ok(ObuPreamble { obu_type, redundant_copy, trimming, extension, obu_size })
    }
}
