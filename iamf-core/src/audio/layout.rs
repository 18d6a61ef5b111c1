// IAMF-RS
// Copyright (c) 2024 The IAMF-RS Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::fmt;
use std::str::FromStr;

use smallvec::SmallVec;

use super::Channel;

/// The loudspeaker layout of a channel layer.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum LoudspeakerLayout {
    Mono,
    Stereo,
    Surround5_1,
    Surround5_1_2,
    Surround5_1_4,
    Surround7_1,
    Surround7_1_2,
    Surround7_1_4,
    Surround3_1_2,
    Binaural,
}

const MONO: &[Channel] = &[Channel::Mono];
const STEREO: &[Channel] = &[Channel::L2, Channel::R2];
const SURROUND_3_1_2: &[Channel] =
    &[Channel::L3, Channel::R3, Channel::C, Channel::Lfe, Channel::Ltf3, Channel::Rtf3];
const SURROUND_5_1: &[Channel] =
    &[Channel::L5, Channel::R5, Channel::C, Channel::Lfe, Channel::Ls5, Channel::Rs5];
const SURROUND_5_1_2: &[Channel] = &[
    Channel::L5,
    Channel::R5,
    Channel::C,
    Channel::Lfe,
    Channel::Ls5,
    Channel::Rs5,
    Channel::Ltf2,
    Channel::Rtf2,
];
const SURROUND_5_1_4: &[Channel] = &[
    Channel::L5,
    Channel::R5,
    Channel::C,
    Channel::Lfe,
    Channel::Ls5,
    Channel::Rs5,
    Channel::Ltf4,
    Channel::Rtf4,
    Channel::Ltb4,
    Channel::Rtb4,
];
const SURROUND_7_1: &[Channel] = &[
    Channel::L5,
    Channel::R5,
    Channel::C,
    Channel::Lfe,
    Channel::Lss7,
    Channel::Rss7,
    Channel::Lrs7,
    Channel::Rrs7,
];
const SURROUND_7_1_2: &[Channel] = &[
    Channel::L5,
    Channel::R5,
    Channel::C,
    Channel::Lfe,
    Channel::Lss7,
    Channel::Rss7,
    Channel::Lrs7,
    Channel::Rrs7,
    Channel::Ltf2,
    Channel::Rtf2,
];
const SURROUND_7_1_4: &[Channel] = &[
    Channel::L5,
    Channel::R5,
    Channel::C,
    Channel::Lfe,
    Channel::Lss7,
    Channel::Rss7,
    Channel::Lrs7,
    Channel::Rrs7,
    Channel::Ltf4,
    Channel::Rtf4,
    Channel::Ltb4,
    Channel::Rtb4,
];

impl LoudspeakerLayout {
    /// Try to get the loudspeaker layout from the 4-bit `loudspeaker_layout` code of a channel
    /// audio layer config. The expanded layout code (15) and reserved codes return `None`.
    pub fn from_code(code: u8) -> Option<Self> {
        let layout = match code {
            0 => LoudspeakerLayout::Mono,
            1 => LoudspeakerLayout::Stereo,
            2 => LoudspeakerLayout::Surround5_1,
            3 => LoudspeakerLayout::Surround5_1_2,
            4 => LoudspeakerLayout::Surround5_1_4,
            5 => LoudspeakerLayout::Surround7_1,
            6 => LoudspeakerLayout::Surround7_1_2,
            7 => LoudspeakerLayout::Surround7_1_4,
            8 => LoudspeakerLayout::Surround3_1_2,
            9 => LoudspeakerLayout::Binaural,
            _ => return None,
        };
        Some(layout)
    }

    /// Gets the channels of the layout in output order.
    pub fn channels(&self) -> &'static [Channel] {
        match self {
            LoudspeakerLayout::Mono => MONO,
            LoudspeakerLayout::Stereo | LoudspeakerLayout::Binaural => STEREO,
            LoudspeakerLayout::Surround3_1_2 => SURROUND_3_1_2,
            LoudspeakerLayout::Surround5_1 => SURROUND_5_1,
            LoudspeakerLayout::Surround5_1_2 => SURROUND_5_1_2,
            LoudspeakerLayout::Surround5_1_4 => SURROUND_5_1_4,
            LoudspeakerLayout::Surround7_1 => SURROUND_7_1,
            LoudspeakerLayout::Surround7_1_2 => SURROUND_7_1_2,
            LoudspeakerLayout::Surround7_1_4 => SURROUND_7_1_4,
        }
    }

    /// Gets the number of channels in the layout.
    pub fn channel_count(&self) -> usize {
        self.channels().len()
    }

    /// Gets the number of surround (ear-level, non-LFE) channels of the layout.
    pub fn surround(&self) -> u8 {
        match self {
            LoudspeakerLayout::Mono => 1,
            LoudspeakerLayout::Stereo | LoudspeakerLayout::Binaural => 2,
            LoudspeakerLayout::Surround3_1_2 => 3,
            LoudspeakerLayout::Surround5_1
            | LoudspeakerLayout::Surround5_1_2
            | LoudspeakerLayout::Surround5_1_4 => 5,
            LoudspeakerLayout::Surround7_1
            | LoudspeakerLayout::Surround7_1_2
            | LoudspeakerLayout::Surround7_1_4 => 7,
        }
    }

    /// Gets the number of height channels of the layout.
    pub fn height(&self) -> u8 {
        match self {
            LoudspeakerLayout::Surround3_1_2
            | LoudspeakerLayout::Surround5_1_2
            | LoudspeakerLayout::Surround7_1_2 => 2,
            LoudspeakerLayout::Surround5_1_4 | LoudspeakerLayout::Surround7_1_4 => 4,
            _ => 0,
        }
    }

    /// Returns `true` if the layout has a low-frequency effects channel.
    pub fn has_lfe(&self) -> bool {
        self.surround() >= 3
    }

    /// Gets the channels that must be transmitted by a channel layer with this layout when it
    /// is stacked on a layer with the `below` layout. The base layer has no layout below it and
    /// transmits all of its channels.
    ///
    /// All other channels of the layout are reconstructed by demixing. Returns `None` if this
    /// layout cannot be stacked on the `below` layout.
    pub fn transmitted_channels(&self, below: Option<LoudspeakerLayout>) -> Option<LayerChannels> {
        let mut layer = LayerChannels::default();

        let below = match below {
            Some(below) => below,
            None => {
                // The base layer transmits everything. Pairs in output order, then the center (or
                // mono) and LFE channels as single channels.
                let channels = self.channels();

                if *self == LoudspeakerLayout::Mono {
                    layer.single.push(Channel::Mono);
                    return Some(layer);
                }

                let mut iter = channels.iter().filter(|ch| **ch != Channel::C && !ch.is_lfe());

                while let (Some(&left), Some(&right)) = (iter.next(), iter.next()) {
                    layer.coupled.push((left, right));
                }

                if channels.contains(&Channel::C) {
                    layer.single.push(Channel::C);
                }
                if self.has_lfe() {
                    layer.single.push(Channel::Lfe);
                }
                return Some(layer);
            }
        };

        if below == LoudspeakerLayout::Binaural || *self == LoudspeakerLayout::Binaural {
            return None;
        }

        let (s0, s1) = (below.surround(), self.surround());
        let (h0, h1) = (below.height(), self.height());

        if s1 < s0 || h1 < h0 || (s1 == s0 && h1 == h0) {
            return None;
        }

        // Heights may only be added to layouts with 3 or more surround channels.
        if h1 > 0 && s1 < 3 {
            return None;
        }

        // Walk the surround downmix chain from the lower layer up to this layer. Each step needs
        // one or two transmitted channels to reconstruct the others.
        const CHAIN: [u8; 5] = [1, 2, 3, 5, 7];

        for pair in CHAIN.windows(2) {
            let (from, to) = (pair[0], pair[1]);

            if from < s0 || to > s1 {
                continue;
            }

            match to {
                2 => layer.single.push(Channel::L2),
                3 => layer.single.push(Channel::C),
                5 => layer.coupled.push((Channel::L5, Channel::R5)),
                7 => layer.coupled.push((Channel::Lss7, Channel::Rss7)),
                _ => unreachable!(),
            }
        }

        match (h0, h1) {
            (0, 2) if s1 == 3 => layer.coupled.push((Channel::Ltf3, Channel::Rtf3)),
            (0, 2) => layer.coupled.push((Channel::Ltf2, Channel::Rtf2)),
            (0, 4) => {
                layer.coupled.push((Channel::Ltf4, Channel::Rtf4));
                layer.coupled.push((Channel::Ltb4, Channel::Rtb4));
            }
            (2, 4) => layer.coupled.push((Channel::Ltf4, Channel::Rtf4)),
            _ => (),
        }

        if self.has_lfe() && !below.has_lfe() {
            layer.single.push(Channel::Lfe);
        }

        // Single channels are coded after all coupled channels. Keep the center channel ahead of
        // the LFE channel.
        layer.single.sort_by_key(|ch| ch.is_lfe());

        Some(layer)
    }

    /// Gets a short name for the layout.
    pub fn name(&self) -> &'static str {
        match self {
            LoudspeakerLayout::Mono => "mono",
            LoudspeakerLayout::Stereo => "2.0",
            LoudspeakerLayout::Surround5_1 => "5.1",
            LoudspeakerLayout::Surround5_1_2 => "5.1.2",
            LoudspeakerLayout::Surround5_1_4 => "5.1.4",
            LoudspeakerLayout::Surround7_1 => "7.1",
            LoudspeakerLayout::Surround7_1_2 => "7.1.2",
            LoudspeakerLayout::Surround7_1_4 => "7.1.4",
            LoudspeakerLayout::Surround3_1_2 => "3.1.2",
            LoudspeakerLayout::Binaural => "binaural",
        }
    }
}

impl fmt::Display for LoudspeakerLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The channels transmitted by one channel layer, in coding order.
///
/// Coupled channels are coded first, two channels per coupled substream. Single channels follow,
/// one channel per substream.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LayerChannels {
    pub coupled: SmallVec<[(Channel, Channel); 6]>,
    pub single: SmallVec<[Channel; 4]>,
}

impl LayerChannels {
    /// Gets the number of substreams needed to code the channels.
    pub fn substream_count(&self) -> usize {
        self.coupled.len() + self.single.len()
    }

    /// Gets the number of coupled substreams needed to code the channels.
    pub fn coupled_substream_count(&self) -> usize {
        self.coupled.len()
    }

    /// Gets the total number of transmitted channels.
    pub fn channel_count(&self) -> usize {
        2 * self.coupled.len() + self.single.len()
    }

    /// Gets the transmitted channels in coding order.
    pub fn order(&self) -> SmallVec<[Channel; 12]> {
        let mut order = SmallVec::new();
        for &(left, right) in self.coupled.iter() {
            order.push(left);
            order.push(right);
        }
        order.extend(self.single.iter().copied());
        order
    }
}

/// A loudspeaker sound system as defined by ITU-R BS.2051, used to describe the layouts a mix
/// presentation was authored and loudness-measured for.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum SoundSystem {
    /// Sound system A (0+2+0).
    A,
    /// Sound system B (0+5+0).
    B,
    /// Sound system C (2+5+0).
    C,
    /// Sound system D (4+5+0).
    D,
    /// Sound system E (4+5+1).
    E,
    /// Sound system F (3+7+0).
    F,
    /// Sound system G (4+9+0).
    G,
    /// Sound system H (9+10+3).
    H,
    /// Sound system I (0+7+0).
    I,
    /// Sound system J (4+7+0).
    J,
    /// 7.1.2 (2+7+0).
    Ext10,
    /// 3.1.2 (2+3+0).
    Ext11,
    /// Mono (0+1+0).
    Ext12,
    /// 9.1.6 (6+9+0).
    Ext13,
}

impl SoundSystem {
    /// Try to get the sound system from its 4-bit code.
    pub fn from_code(code: u8) -> Option<Self> {
        let ss = match code {
            0 => SoundSystem::A,
            1 => SoundSystem::B,
            2 => SoundSystem::C,
            3 => SoundSystem::D,
            4 => SoundSystem::E,
            5 => SoundSystem::F,
            6 => SoundSystem::G,
            7 => SoundSystem::H,
            8 => SoundSystem::I,
            9 => SoundSystem::J,
            10 => SoundSystem::Ext10,
            11 => SoundSystem::Ext11,
            12 => SoundSystem::Ext12,
            13 => SoundSystem::Ext13,
            _ => return None,
        };
        Some(ss)
    }

    /// Gets the loudspeaker layout that can be rendered for the sound system.
    ///
    /// Sound systems E, F, G, H and 9.1.6 have loudspeakers that no channel layout carries and
    /// cannot be rendered.
    pub fn loudspeaker_layout(&self) -> Option<LoudspeakerLayout> {
        match self {
            SoundSystem::A => Some(LoudspeakerLayout::Stereo),
            SoundSystem::B => Some(LoudspeakerLayout::Surround5_1),
            SoundSystem::C => Some(LoudspeakerLayout::Surround5_1_2),
            SoundSystem::D => Some(LoudspeakerLayout::Surround5_1_4),
            SoundSystem::I => Some(LoudspeakerLayout::Surround7_1),
            SoundSystem::J => Some(LoudspeakerLayout::Surround7_1_4),
            SoundSystem::Ext10 => Some(LoudspeakerLayout::Surround7_1_2),
            SoundSystem::Ext11 => Some(LoudspeakerLayout::Surround3_1_2),
            SoundSystem::Ext12 => Some(LoudspeakerLayout::Mono),
            _ => None,
        }
    }
}

/// The layout the decoder renders its output to.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum OutputLayout {
    /// Render to a loudspeaker sound system.
    SoundSystem(SoundSystem),
    /// Render for headphones.
    Binaural,
}

impl Default for OutputLayout {
    fn default() -> Self {
        OutputLayout::SoundSystem(SoundSystem::A)
    }
}

impl OutputLayout {
    /// Gets the loudspeaker layout that will be rendered, if the layout is supported.
    pub fn loudspeaker_layout(&self) -> Option<LoudspeakerLayout> {
        match self {
            OutputLayout::SoundSystem(ss) => ss.loudspeaker_layout(),
            OutputLayout::Binaural => Some(LoudspeakerLayout::Binaural),
        }
    }

    /// Gets the number of output channels, if the layout is supported.
    pub fn channel_count(&self) -> Option<usize> {
        self.loudspeaker_layout().map(|layout| layout.channel_count())
    }
}

impl FromStr for OutputLayout {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let layout = match s.to_ascii_lowercase().as_str() {
            "mono" | "1.0" => OutputLayout::SoundSystem(SoundSystem::Ext12),
            "stereo" | "2.0" => OutputLayout::SoundSystem(SoundSystem::A),
            "3.1.2" => OutputLayout::SoundSystem(SoundSystem::Ext11),
            "5.1" => OutputLayout::SoundSystem(SoundSystem::B),
            "5.1.2" => OutputLayout::SoundSystem(SoundSystem::C),
            "5.1.4" => OutputLayout::SoundSystem(SoundSystem::D),
            "7.1" => OutputLayout::SoundSystem(SoundSystem::I),
            "7.1.2" => OutputLayout::SoundSystem(SoundSystem::Ext10),
            "7.1.4" => OutputLayout::SoundSystem(SoundSystem::J),
            "binaural" => OutputLayout::Binaural,
            _ => return Err("unknown output layout"),
        };
        Ok(layout)
    }
}
