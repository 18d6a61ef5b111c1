// IAMF-RS
// Copyright (c) 2024 The IAMF-RS Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Resolution of the audio elements of a mix presentation into playable streams.

use std::ops::Range;

use log::{debug, warn};

use iamf_core::audio::{LayerChannels, LoudspeakerLayout, OutputLayout};
use iamf_core::codecs::CodecId;
use iamf_core::errors::{config_error, unsupported_error, Result};
use iamf_format_obu::{AmbisonicsConfig, AudioElementConfig, HeadphonesRenderingMode, OutputGain};
use iamf_format_obu::{CodecConfig, SubMixElement};

use crate::database::ElementEntry;

/// The highest ambisonics order that is rendered. Higher order components are discarded.
pub const MAX_AMBISONICS_ORDER: usize = 3;

/// The channel layout of a decoded stream.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StreamLayout {
    /// Loudspeaker channels in the order of the layout.
    Channel(LoudspeakerLayout),
    /// Ambisonics components in ACN order.
    Ambisonics { channels: usize },
}

impl StreamLayout {
    pub fn channel_count(&self) -> usize {
        match self {
            StreamLayout::Channel(layout) => layout.channel_count(),
            StreamLayout::Ambisonics { channels } => *channels,
        }
    }
}

/// What a stream is rendered to.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RenderTarget {
    Loudspeakers(LoudspeakerLayout),
    /// Head-related rendering to two ears.
    Binaural,
}

impl RenderTarget {
    pub fn channel_count(&self) -> usize {
        match self {
            RenderTarget::Loudspeakers(layout) => layout.channel_count(),
            RenderTarget::Binaural => 2,
        }
    }

    /// Resolves the render target of an element for an output layout after negotiating the
    /// headphones rendering mode.
    pub fn resolve(output: OutputLayout, mode: HeadphonesRenderingMode) -> Result<RenderTarget> {
        match output {
            OutputLayout::Binaural => match mode {
                HeadphonesRenderingMode::Binaural => Ok(RenderTarget::Binaural),
                HeadphonesRenderingMode::Stereo => {
                    Ok(RenderTarget::Loudspeakers(LoudspeakerLayout::Stereo))
                }
                HeadphonesRenderingMode::Reserved(code) => {
                    warn!("reserved headphones rendering mode {}, rendering to stereo", code);
                    Ok(RenderTarget::Loudspeakers(LoudspeakerLayout::Stereo))
                }
            },
            OutputLayout::SoundSystem(ss) => match ss.loudspeaker_layout() {
                Some(layout) => Ok(RenderTarget::Loudspeakers(layout)),
                None => unsupported_error("decoder: unsupported output sound system"),
            },
        }
    }
}

/// One decoded layer of a scalable channel stream.
#[derive(Clone, Debug)]
pub struct ChannelLayer {
    pub layout: LoudspeakerLayout,
    /// The channels coded by the layer.
    pub transmitted: LayerChannels,
    /// The indicies of the substreams of the layer.
    pub substreams: Range<usize>,
    pub output_gain: Option<OutputGain>,
    pub recon_gain_is_present: bool,
}

/// The coding scheme of a stream.
#[derive(Clone, Debug)]
pub enum StreamScheme {
    /// Scalable channel audio. Only the layers up-to and including the decoded layer are kept.
    ChannelBased { layers: Vec<ChannelLayer>, default_demixing: (u8, u8) },
    /// Scene-based audio.
    SceneBased(AmbisonicsConfig),
}

/// A playable stream: one audio element of a mix presentation resolved for the output layout.
#[derive(Clone, Debug)]
pub struct IamfStream {
    pub element_id: u64,
    pub codec_id: CodecId,
    pub codec_config: CodecConfig,
    pub sample_rate: u32,
    /// The number of samples per frame, and the largest frame the stream decodes.
    pub max_frame_size: usize,
    /// The ids of the substreams that are decoded, in coding order.
    pub substream_ids: Vec<u64>,
    pub scheme: StreamScheme,
    /// The layout of the decoded audio.
    pub layout: StreamLayout,
    pub target: RenderTarget,
    pub element_mix_gain_id: u64,
    pub demixing_id: Option<u64>,
    pub recon_gain_id: Option<u64>,
}

impl IamfStream {
    pub fn substream_count(&self) -> usize {
        self.substream_ids.len()
    }
}

/// Gets the loudspeaker layout of a layer. A binaural layer is rendered as stereo.
fn layer_layout(code: u8) -> Result<LoudspeakerLayout> {
    match LoudspeakerLayout::from_code(code) {
        Some(LoudspeakerLayout::Binaural) => Ok(LoudspeakerLayout::Stereo),
        Some(layout) => Ok(layout),
        None if code == 15 => unsupported_error("decoder: expanded loudspeaker layouts"),
        None => config_error("decoder: reserved loudspeaker layout"),
    }
}

/// Resolves the layers of a scalable channel element and selects the layer to decode.
///
/// The decoded layer is the layer whose layout is the render target. If no layer matches, the
/// highest layer is decoded.
fn resolve_layers(
    configs: &[iamf_format_obu::ChannelLayerConfig],
    num_substreams: usize,
    target: RenderTarget,
) -> Result<Vec<ChannelLayer>> {
    let mut layers = Vec::with_capacity(configs.len());
    let mut below = None;
    let mut next_substream = 0;

    for (i, config) in configs.iter().enumerate() {
        let layout = layer_layout(config.loudspeaker_layout)?;

        let transmitted = match layout.transmitted_channels(below) {
            Some(transmitted) => transmitted,
            None => {
                warn!("layer {} ({}) cannot be stacked on {:?}", i, layout, below);
                return config_error("decoder: invalid channel layer stacking");
            }
        };

        if transmitted.substream_count() != usize::from(config.substream_count)
            || transmitted.coupled_substream_count() != usize::from(config.coupled_substream_count)
        {
            warn!(
                "layer {} ({}) signals {} substreams ({} coupled), expected {} ({} coupled)",
                i,
                layout,
                config.substream_count,
                config.coupled_substream_count,
                transmitted.substream_count(),
                transmitted.coupled_substream_count()
            );
            return config_error("decoder: channel count mismatch");
        }

        let substreams = next_substream..next_substream + transmitted.substream_count();
        next_substream = substreams.end;

        layers.push(ChannelLayer {
            layout,
            transmitted,
            substreams,
            output_gain: config.output_gain,
            recon_gain_is_present: config.recon_gain_is_present,
        });

        below = Some(layout);
    }

    if next_substream != num_substreams {
        return config_error("decoder: substream count mismatch");
    }

    let decoded = match target {
        RenderTarget::Loudspeakers(target) => {
            layers.iter().position(|layer| layer.layout == target).unwrap_or(layers.len() - 1)
        }
        RenderTarget::Binaural => layers.len() - 1,
    };

    layers.truncate(decoded + 1);

    Ok(layers)
}

/// Builds the stream of an audio element of a sub-mix.
pub fn build_stream(
    entry: ElementEntry<'_>,
    sub_element: &SubMixElement,
    output: OutputLayout,
    mode_override: Option<HeadphonesRenderingMode>,
) -> Result<IamfStream> {
    let element = entry.element;
    let codec_config = entry.codec_config;

    let mode = mode_override.unwrap_or(sub_element.headphones_rendering_mode);
    let target = RenderTarget::resolve(output, mode)?;

    let num_substreams = element.substream_ids.len();

    let (scheme, layout, decoded_substreams) = match &element.config {
        AudioElementConfig::Channel { layers } => {
            if layers.is_empty() {
                return config_error("decoder: channel element has no layers");
            }

            let layers = resolve_layers(layers, num_substreams, target)?;

            let (decoded_layout, decoded_substreams) = match layers.last() {
                Some(layer) => (layer.layout, layer.substreams.end),
                None => return config_error("decoder: channel element has no layers"),
            };

            let default_demixing = element
                .demixing
                .as_ref()
                .map_or((0, 0), |demixing| (demixing.default_mode, demixing.default_w));

            let scheme = StreamScheme::ChannelBased { layers, default_demixing };

            (scheme, StreamLayout::Channel(decoded_layout), decoded_substreams)
        }
        AudioElementConfig::Scene(config) => {
            let (substreams, _) = config.substream_counts();

            if substreams != num_substreams {
                return config_error("decoder: substream count mismatch");
            }

            let channels = config.output_channel_count();
            let order = (channels as f64).sqrt() as usize;

            if channels == 0 || order * order != channels {
                return config_error("decoder: invalid number of ambisonics channels");
            }

            if order > MAX_AMBISONICS_ORDER {
                warn!(
                    "element {}: ambisonics order {} is rendered at order {}",
                    element.audio_element_id, order, MAX_AMBISONICS_ORDER
                );
            }

            let scheme = StreamScheme::SceneBased(config.clone());

            (scheme, StreamLayout::Ambisonics { channels }, num_substreams)
        }
        AudioElementConfig::Extension { .. } => {
            return unsupported_error("decoder: extension audio element types");
        }
    };

    debug!(
        "element {}: layout {:?}, target {:?}, {} of {} substreams",
        element.audio_element_id, layout, target, decoded_substreams, num_substreams
    );

    Ok(IamfStream {
        element_id: element.audio_element_id,
        codec_id: codec_config.codec_id,
        codec_config: codec_config.clone(),
        sample_rate: codec_config.sample_rate,
        max_frame_size: codec_config.num_samples_per_frame as usize,
        substream_ids: element.substream_ids[..decoded_substreams].to_vec(),
        scheme,
        layout,
        target,
        element_mix_gain_id: sub_element.element_mix_gain.base.parameter_id,
        demixing_id: element.demixing.as_ref().map(|demixing| demixing.base.parameter_id),
        recon_gain_id: element.recon_gain.as_ref().map(|recon_gain| recon_gain.parameter_id),
    })
}
