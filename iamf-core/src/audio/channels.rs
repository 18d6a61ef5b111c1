// IAMF-RS
// Copyright (c) 2024 The IAMF-RS Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::fmt;

use bitflags::bitflags;

/// A channel label as used by scalable channel audio.
///
/// Channel labels are not purely positional. A front-left channel of a stereo mix (`L2`) is a
/// different signal than the front-left channel of a 3.1.2 mix (`L3`) or a 5.1 mix (`L5`), since
/// each is a downmix of the layers above it. The front-left and front-right channels of 7.1
/// layouts are identical to those of 5.1 layouts and share the `L5` and `R5` labels. Likewise,
/// the top-front channels of 7.1.2 layouts share the `Ltf2` and `Rtf2` labels.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Channel {
    /// Mono.
    Mono,
    /// Stereo left.
    L2,
    /// Stereo right.
    R2,
    /// Center.
    C,
    /// Low-frequency effects.
    Lfe,
    /// Left of a 3.1.2 layout.
    L3,
    /// Right of a 3.1.2 layout.
    R3,
    /// Front-left of a 5.1 or 7.1 layout.
    L5,
    /// Front-right of a 5.1 or 7.1 layout.
    R5,
    /// Left surround of a 5.1 layout.
    Ls5,
    /// Right surround of a 5.1 layout.
    Rs5,
    /// Left side surround of a 7.1 layout.
    Lss7,
    /// Right side surround of a 7.1 layout.
    Rss7,
    /// Left rear surround of a 7.1 layout.
    Lrs7,
    /// Right rear surround of a 7.1 layout.
    Rrs7,
    /// Left top-front of a 3.1.2 layout.
    Ltf3,
    /// Right top-front of a 3.1.2 layout.
    Rtf3,
    /// Left top-front of a 5.1.2 or 7.1.2 layout.
    Ltf2,
    /// Right top-front of a 5.1.2 or 7.1.2 layout.
    Rtf2,
    /// Left top-front of a 5.1.4 or 7.1.4 layout.
    Ltf4,
    /// Right top-front of a 5.1.4 or 7.1.4 layout.
    Rtf4,
    /// Left top-back of a 5.1.4 or 7.1.4 layout.
    Ltb4,
    /// Right top-back of a 5.1.4 or 7.1.4 layout.
    Rtb4,
}

impl Channel {
    /// The number of distinct channel labels.
    pub const COUNT: usize = 23;

    /// Gets a dense index for the channel, in the range `0..Channel::COUNT`.
    #[inline(always)]
    pub fn index(&self) -> usize {
        *self as usize
    }

    /// Gets the nominal loudspeaker direction of the channel as an `(azimuth, elevation)` pair in
    /// degrees. Positive azimuths are to the listener's left.
    pub fn direction(&self) -> (f32, f32) {
        match self {
            Channel::Mono | Channel::C | Channel::Lfe => (0.0, 0.0),
            Channel::L2 | Channel::L3 | Channel::L5 => (30.0, 0.0),
            Channel::R2 | Channel::R3 | Channel::R5 => (-30.0, 0.0),
            Channel::Ls5 => (110.0, 0.0),
            Channel::Rs5 => (-110.0, 0.0),
            Channel::Lss7 => (90.0, 0.0),
            Channel::Rss7 => (-90.0, 0.0),
            Channel::Lrs7 => (135.0, 0.0),
            Channel::Rrs7 => (-135.0, 0.0),
            Channel::Ltf2 | Channel::Ltf3 | Channel::Ltf4 => (45.0, 35.0),
            Channel::Rtf2 | Channel::Rtf3 | Channel::Rtf4 => (-45.0, 35.0),
            Channel::Ltb4 => (135.0, 35.0),
            Channel::Rtb4 => (-135.0, 35.0),
        }
    }

    /// Returns `true` if the channel is a low-frequency effects channel.
    pub fn is_lfe(&self) -> bool {
        *self == Channel::Lfe
    }

    /// Gets the recon gain flag that addresses the channel, if any.
    pub fn recon_gain_flag(&self) -> ReconGainFlags {
        match self {
            Channel::Mono => ReconGainFlags::empty(),
            Channel::L2 | Channel::L3 | Channel::L5 => ReconGainFlags::L,
            Channel::R2 | Channel::R3 | Channel::R5 => ReconGainFlags::R,
            Channel::C => ReconGainFlags::C,
            Channel::Lfe => ReconGainFlags::LFE,
            Channel::Ls5 | Channel::Lss7 => ReconGainFlags::LS,
            Channel::Rs5 | Channel::Rss7 => ReconGainFlags::RS,
            Channel::Lrs7 => ReconGainFlags::LRS,
            Channel::Rrs7 => ReconGainFlags::RRS,
            Channel::Ltf2 | Channel::Ltf3 | Channel::Ltf4 => ReconGainFlags::LTF,
            Channel::Rtf2 | Channel::Rtf3 | Channel::Rtf4 => ReconGainFlags::RTF,
            Channel::Ltb4 => ReconGainFlags::LTB,
            Channel::Rtb4 => ReconGainFlags::RTB,
        }
    }

    /// Gets the output gain flag that addresses the channel, if any.
    pub fn output_gain_flag(&self) -> OutputGainFlags {
        match self {
            Channel::L2 | Channel::L3 | Channel::L5 => OutputGainFlags::L,
            Channel::R2 | Channel::R3 | Channel::R5 => OutputGainFlags::R,
            Channel::Ls5 | Channel::Lss7 => OutputGainFlags::LS,
            Channel::Rs5 | Channel::Rss7 => OutputGainFlags::RS,
            Channel::Ltf2 | Channel::Ltf3 | Channel::Ltf4 => OutputGainFlags::LTF,
            Channel::Rtf2 | Channel::Rtf3 | Channel::Rtf4 => OutputGainFlags::RTF,
            _ => OutputGainFlags::empty(),
        }
    }

    /// Gets a short name for the channel.
    pub fn short_name(&self) -> &'static str {
        match self {
            Channel::Mono => "M",
            Channel::L2 => "L2",
            Channel::R2 => "R2",
            Channel::C => "C",
            Channel::Lfe => "LFE",
            Channel::L3 => "L3",
            Channel::R3 => "R3",
            Channel::L5 => "L5",
            Channel::R5 => "R5",
            Channel::Ls5 => "Ls5",
            Channel::Rs5 => "Rs5",
            Channel::Lss7 => "Lss7",
            Channel::Rss7 => "Rss7",
            Channel::Lrs7 => "Lrs7",
            Channel::Rrs7 => "Rrs7",
            Channel::Ltf3 => "Ltf3",
            Channel::Rtf3 => "Rtf3",
            Channel::Ltf2 => "Ltf2",
            Channel::Rtf2 => "Rtf2",
            Channel::Ltf4 => "Ltf4",
            Channel::Rtf4 => "Rtf4",
            Channel::Ltb4 => "Ltb4",
            Channel::Rtb4 => "Rtb4",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

bitflags! {
    /// Channels addressed by the recon gain of a channel layer.
    ///
    /// The bit positions are those of the `recon_gain_flags` field of a recon gain parameter
    /// block.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
    pub struct ReconGainFlags: u32 {
        const L   = 1 << 0;
        const C   = 1 << 1;
        const R   = 1 << 2;
        const LS  = 1 << 3;
        const RS  = 1 << 4;
        const LTF = 1 << 5;
        const RTF = 1 << 6;
        const LRS = 1 << 7;
        const RRS = 1 << 8;
        const LTB = 1 << 9;
        const RTB = 1 << 10;
        const LFE = 1 << 11;
    }
}

bitflags! {
    /// Channels addressed by the output gain of a channel layer.
    ///
    /// The bit positions are those of the 6-bit `output_gain_flag` field of a channel audio
    /// layer config.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
    pub struct OutputGainFlags: u8 {
        const RTF = 1 << 0;
        const LTF = 1 << 1;
        const RS  = 1 << 2;
        const LS  = 1 << 3;
        const R   = 1 << 4;
        const L   = 1 << 5;
    }
}
