// IAMF-RS
// Copyright (c) 2024 The IAMF-RS Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::fmt;

use iamf_core::errors::{decode_error, Result};
use iamf_core::io::ReadBytes;

/// An IAMF profile.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Profile {
    Simple,
    Base,
    BaseEnhanced,
    Unknown(u8),
}

impl Profile {
    fn from_code(code: u8) -> Self {
        match code {
            0 => Profile::Simple,
            1 => Profile::Base,
            2 => Profile::BaseEnhanced,
            _ => Profile::Unknown(code),
        }
    }

    /// Returns `true` if the profile can be decoded.
    pub fn is_supported(&self) -> bool {
        !matches!(self, Profile::Unknown(_))
    }

    /// Gets the maximum number of audio elements a mix presentation of this profile may render.
    pub fn max_audio_elements(&self) -> usize {
        match self {
            Profile::Simple => 1,
            Profile::Base => 2,
            _ => 28,
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Profile::Simple => write!(f, "simple"),
            Profile::Base => write!(f, "base"),
            Profile::BaseEnhanced => write!(f, "base-enhanced"),
            Profile::Unknown(code) => write!(f, "unknown ({})", code),
        }
    }
}

/// The IA sequence header OBU.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SequenceHeader {
    pub primary_profile: Profile,
    pub additional_profile: Profile,
}

impl SequenceHeader {
    const IA_CODE: [u8; 4] = *b"iamf";

    pub fn read<B: ReadBytes>(reader: &mut B) -> Result<SequenceHeader> {
        if reader.read_quad_bytes()? != SequenceHeader::IA_CODE {
            return decode_error("obu: missing iamf magic code");
        }

        let primary_profile = Profile::from_code(reader.read_u8()?);
        let additional_profile = Profile::from_code(reader.read_u8()?);

        Ok(SequenceHeader { primary_profile, additional_profile })
    }

    /// Gets the most capable profile supported by the decoder.
    pub fn profile(&self) -> Profile {
        if self.additional_profile.is_supported() && self.additional_profile > self.primary_profile
        {
            self.additional_profile
        }
        else {
            self.primary_profile
        }
    }
}
