// IAMF-RS
// Copyright (c) 2024 The IAMF-RS Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use iamf_core::audio::{LoudspeakerLayout, OutputGainFlags};
use iamf_core::errors::{decode_error, limit_error, Result};
use iamf_core::io::ReadBytes;

use log::debug;

use crate::param::{q7_8, DemixingParamDefinition, ParamDefinition};

/// The maximum number of substreams of one audio element.
const MAX_SUBSTREAMS: u64 = 255;

/// The maximum number of parameter definitions of one audio element.
const MAX_PARAMETERS: u64 = 255;

/// The expanded loudspeaker layout code.
const EXPANDED_LOUDSPEAKER_LAYOUT: u8 = 15;

/// The output gain of a channel layer.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct OutputGain {
    pub flags: OutputGainFlags,
    /// The gain in decibels.
    pub gain: f32,
}

/// The configuration of one layer of a scalable channel audio element.
#[derive(Clone, Debug, PartialEq)]
pub struct ChannelLayerConfig {
    /// The 4-bit loudspeaker layout code.
    pub loudspeaker_layout: u8,
    pub output_gain: Option<OutputGain>,
    pub recon_gain_is_present: bool,
    pub substream_count: u8,
    pub coupled_substream_count: u8,
    pub expanded_loudspeaker_layout: Option<u8>,
}

impl ChannelLayerConfig {
    fn read<B: ReadBytes>(reader: &mut B) -> Result<ChannelLayerConfig> {
        let byte = reader.read_u8()?;

        let loudspeaker_layout = byte >> 4;
        let output_gain_is_present = byte & 0x08 != 0;
        let recon_gain_is_present = byte & 0x04 != 0;

        let substream_count = reader.read_u8()?;
        let coupled_substream_count = reader.read_u8()?;

        if coupled_substream_count > substream_count {
            return decode_error("obu: more coupled substreams than substreams");
        }

        let output_gain = if output_gain_is_present {
            let flags = OutputGainFlags::from_bits_truncate(reader.read_u8()? >> 2);
            let gain = q7_8(reader.read_be_i16()?);
            Some(OutputGain { flags, gain })
        }
        else {
            None
        };

        let expanded_loudspeaker_layout = if loudspeaker_layout == EXPANDED_LOUDSPEAKER_LAYOUT {
            Some(reader.read_u8()?)
        }
        else {
            None
        };

        Ok(ChannelLayerConfig {
            loudspeaker_layout,
            output_gain,
            recon_gain_is_present,
            substream_count,
            coupled_substream_count,
            expanded_loudspeaker_layout,
        })
    }

    /// Gets the loudspeaker layout of the layer, if it is a known layout.
    pub fn layout(&self) -> Option<LoudspeakerLayout> {
        LoudspeakerLayout::from_code(self.loudspeaker_layout)
    }

    /// Gets the number of channels coded in the layer.
    pub fn channel_count(&self) -> usize {
        usize::from(self.substream_count) + usize::from(self.coupled_substream_count)
    }
}

/// The ambisonics configuration of a scene-based audio element.
#[derive(Clone, Debug, PartialEq)]
pub enum AmbisonicsConfig {
    /// Each ambisonics channel is mapped to a decoded channel, or is silent (255).
    Mono { output_channel_count: u8, substream_count: u8, channel_mapping: Vec<u8> },
    /// The ambisonics channels are derived from the decoded channels with a demixing matrix.
    Projection {
        output_channel_count: u8,
        substream_count: u8,
        coupled_substream_count: u8,
        /// Column-major `output_channel_count` x `(substream_count + coupled_substream_count)`
        /// matrix.
        demixing_matrix: Vec<f32>,
    },
}

impl AmbisonicsConfig {
    /// Channel mapping value of a silent ambisonics channel.
    pub const SILENT: u8 = 255;

    fn read<B: ReadBytes>(reader: &mut B) -> Result<AmbisonicsConfig> {
        match reader.read_leb128()? {
            0 => {
                let output_channel_count = reader.read_u8()?;
                let substream_count = reader.read_u8()?;

                let mut channel_mapping = vec![0; usize::from(output_channel_count)];
                reader.read_buf_exact(&mut channel_mapping)?;

                if channel_mapping
                    .iter()
                    .any(|&ch| ch != AmbisonicsConfig::SILENT && ch >= substream_count)
                {
                    return decode_error("obu: ambisonics channel mapping out of range");
                }

                Ok(AmbisonicsConfig::Mono {
                    output_channel_count,
                    substream_count,
                    channel_mapping,
                })
            }
            1 => {
                let output_channel_count = reader.read_u8()?;
                let substream_count = reader.read_u8()?;
                let coupled_substream_count = reader.read_u8()?;

                if coupled_substream_count > substream_count {
                    return decode_error("obu: more coupled substreams than substreams");
                }

                let len = usize::from(output_channel_count)
                    * (usize::from(substream_count) + usize::from(coupled_substream_count));

                let mut demixing_matrix = Vec::with_capacity(len);
                for _ in 0..len {
                    demixing_matrix.push(f32::from(reader.read_be_i16()?) / 32_768.0);
                }

                Ok(AmbisonicsConfig::Projection {
                    output_channel_count,
                    substream_count,
                    coupled_substream_count,
                    demixing_matrix,
                })
            }
            _ => decode_error("obu: invalid ambisonics mode"),
        }
    }

    /// Gets the number of ambisonics channels.
    pub fn output_channel_count(&self) -> usize {
        match self {
            AmbisonicsConfig::Mono { output_channel_count, .. } => {
                usize::from(*output_channel_count)
            }
            AmbisonicsConfig::Projection { output_channel_count, .. } => {
                usize::from(*output_channel_count)
            }
        }
    }

    /// Gets the number of substreams and coupled substreams.
    pub fn substream_counts(&self) -> (usize, usize) {
        match self {
            AmbisonicsConfig::Mono { substream_count, .. } => (usize::from(*substream_count), 0),
            AmbisonicsConfig::Projection { substream_count, coupled_substream_count, .. } => {
                (usize::from(*substream_count), usize::from(*coupled_substream_count))
            }
        }
    }
}

/// The configuration specific to the audio element type.
#[derive(Clone, Debug, PartialEq)]
pub enum AudioElementConfig {
    /// A channel-based element made of one or more scalable layers.
    Channel { layers: Vec<ChannelLayerConfig> },
    /// A scene-based (ambisonics) element.
    Scene(AmbisonicsConfig),
    /// A reserved element type.
    Extension { element_type: u8 },
}

/// The audio element OBU.
#[derive(Clone, Debug, PartialEq)]
pub struct AudioElement {
    pub audio_element_id: u64,
    pub codec_config_id: u64,
    pub substream_ids: Vec<u64>,
    pub demixing: Option<DemixingParamDefinition>,
    pub recon_gain: Option<ParamDefinition>,
    pub config: AudioElementConfig,
}

impl AudioElement {
    pub fn read<B: ReadBytes>(reader: &mut B) -> Result<AudioElement> {
        let audio_element_id = reader.read_leb128()?;
        let element_type = reader.read_u8()? >> 5;
        let codec_config_id = reader.read_leb128()?;

        let num_substreams = reader.read_leb128()?;

        if num_substreams > MAX_SUBSTREAMS {
            return limit_error("obu: too many substreams");
        }

        let mut substream_ids = Vec::with_capacity(num_substreams as usize);
        for _ in 0..num_substreams {
            substream_ids.push(reader.read_leb128()?);
        }

        let num_parameters = reader.read_leb128()?;

        if num_parameters > MAX_PARAMETERS {
            return limit_error("obu: too many parameters");
        }

        let mut demixing = None;
        let mut recon_gain = None;

        for _ in 0..num_parameters {
            match reader.read_leb128()? {
                0 => return decode_error("obu: mix gain parameter in audio element"),
                1 => demixing = Some(DemixingParamDefinition::read(reader)?),
                2 => recon_gain = Some(ParamDefinition::read(reader)?),
                _ => {
                    let size = reader.read_leb128()?;
                    reader.ignore_bytes(size)?;
                }
            }
        }

        let config = match element_type {
            0 => {
                let num_layers = reader.read_u8()? >> 5;

                if num_layers == 0 || num_layers > 6 {
                    return decode_error("obu: invalid number of channel layers");
                }

                let mut layers = Vec::with_capacity(usize::from(num_layers));
                for _ in 0..num_layers {
                    layers.push(ChannelLayerConfig::read(reader)?);
                }

                AudioElementConfig::Channel { layers }
            }
            1 => AudioElementConfig::Scene(AmbisonicsConfig::read(reader)?),
            _ => {
                let size = reader.read_leb128()?;
                reader.ignore_bytes(size)?;
                AudioElementConfig::Extension { element_type }
            }
        };

        debug!(
            "audio element: id={}, codec_config_id={}, substreams={}",
            audio_element_id,
            codec_config_id,
            substream_ids.len()
        );

        Ok(AudioElement {
            audio_element_id,
            codec_config_id,
            substream_ids,
            demixing,
            recon_gain,
            config,
        })
    }

    /// Gets the recon gain presence of each channel layer.
    pub fn recon_gain_layers(&self) -> Vec<bool> {
        match &self.config {
            AudioElementConfig::Channel { layers } => {
                layers.iter().map(|layer| layer.recon_gain_is_present).collect()
            }
            _ => Vec::new(),
        }
    }
}
