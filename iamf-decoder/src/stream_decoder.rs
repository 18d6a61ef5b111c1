// IAMF-RS
// Copyright (c) 2024 The IAMF-RS Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-element decoding: codec decoding of the substreams, followed by scalable channel demixing
//! or ambisonics channel mapping.

use log::{debug, warn};
use smallvec::SmallVec;

use iamf_core::audio::{Channel, LoudspeakerLayout};
use iamf_core::codecs::registry::CodecRegistry;
use iamf_core::codecs::AudioDecoder;
use iamf_core::errors::{codec_error, config_error, invalid_argument_error, invalid_state_error};
use iamf_core::errors::Result;
use iamf_format_obu::param::{db_to_linear, ReconGain};
use iamf_format_obu::{AmbisonicsConfig, CodecConfig};

use crate::demixer::{ChannelStore, Demixer};
use crate::frame::{BufferPool, Frame};
use crate::stream::{ChannelLayer, IamfStream, StreamScheme};

/// The time-varying parameters of one frame.
#[derive(Copy, Clone, Debug, Default)]
pub struct FrameParams<'a> {
    /// The demixing mode, if signalled.
    pub demixing_mode: Option<u8>,
    /// The recon gains of the layers, if signalled.
    pub recon_gains: Option<&'a [ReconGain]>,
}

fn make_codec(
    registry: &CodecRegistry,
    config: &CodecConfig,
    num_streams: usize,
    num_coupled: usize,
) -> Result<Box<dyn AudioDecoder>> {
    let params = config.make_codec_params(num_streams, num_coupled);

    match registry.make_audio_decoder(&params) {
        Ok(codec) => Ok(codec),
        Err(err) => {
            warn!("failed to instantiate a {} decoder: {}", config.codec_id, err);
            config_error("decoder: could not instantiate the codec decoder")
        }
    }
}

/// Decode one packet per substream with `codec` into the next scratch buffer. Returns the
/// interleaved samples and the number of samples per channel.
fn decode_packets<'p>(
    codec: &mut dyn AudioDecoder,
    packets: &[Vec<u8>],
    channels: usize,
    frame_size: usize,
    pool: &'p mut BufferPool,
) -> Result<(&'p [f32], usize)> {
    let refs: SmallVec<[&[u8]; 8]> = packets.iter().map(|packet| packet.as_slice()).collect();

    let buf = pool.next(channels * frame_size);
    let samples = codec.decode(&refs, buf, frame_size)?;

    if samples > frame_size {
        return codec_error("decoder: codec returned more samples than the frame size");
    }

    Ok((&buf[..channels * samples], samples))
}

struct LayerDecoder {
    layer: ChannelLayer,
    codec: Box<dyn AudioDecoder>,
    /// The transmitted channels in the order they are decoded.
    order: SmallVec<[Channel; 12]>,
}

/// Decodes the layers of a scalable channel audio element and demixes them.
pub struct ScalableChannelDecoder {
    layers: Vec<LayerDecoder>,
    demixer: Demixer,
    store: ChannelStore,
    layout: LoudspeakerLayout,
}

impl ScalableChannelDecoder {
    fn try_new(
        stream: &IamfStream,
        layers: &[ChannelLayer],
        default_demixing: (u8, u8),
        registry: &CodecRegistry,
    ) -> Result<Self> {
        let mut decoders = Vec::with_capacity(layers.len());

        for layer in layers {
            let codec = make_codec(
                registry,
                &stream.codec_config,
                layer.transmitted.substream_count(),
                layer.transmitted.coupled_substream_count(),
            )?;

            let order = layer.transmitted.order();
            decoders.push(LayerDecoder { layer: layer.clone(), codec, order });
        }

        let layout = match layers.last() {
            Some(layer) => layer.layout,
            None => return config_error("decoder: channel element has no layers"),
        };

        Ok(ScalableChannelDecoder {
            layers: decoders,
            demixer: Demixer::new(default_demixing.0, default_demixing.1),
            store: ChannelStore::new(stream.max_frame_size),
            layout,
        })
    }

    fn delay(&self) -> usize {
        self.layers.iter().map(|layer| layer.codec.delay()).max().unwrap_or(0)
    }

    fn reset(&mut self) {
        for layer in self.layers.iter_mut() {
            layer.codec.reset();
        }
    }

    fn decode(
        &mut self,
        packets: &[Vec<u8>],
        params: &FrameParams<'_>,
        frame_size: usize,
        pool: &mut BufferPool,
        frame: &mut Frame,
    ) -> Result<()> {
        let mut samples = None;

        for layer in self.layers.iter_mut() {
            let channels = layer.order.len();

            let (buf, n) = decode_packets(
                layer.codec.as_mut(),
                &packets[layer.layer.substreams.clone()],
                channels,
                frame_size,
                pool,
            )?;

            match samples {
                None => {
                    samples = Some(n);
                    self.store.reset(n);
                }
                Some(samples) if samples != n => {
                    return codec_error("decoder: layers decoded a different number of samples");
                }
                _ => (),
            }

            for (c, &ch) in layer.order.iter().enumerate() {
                let plane = self.store.plane_mut(ch);

                for (s, interleaved) in plane.iter_mut().zip(buf.chunks_exact(channels)) {
                    *s = interleaved[c];
                }
            }
        }

        self.demixer.update(params.demixing_mode);

        // Reconstruct the layers from the bottom up. The recon gains of a layer apply to the
        // channels it reconstructed before they are used to reconstruct higher layers.
        for (i, layer) in self.layers.iter().enumerate().skip(1) {
            let derived = self.demixer.demix(&mut self.store, layer.layer.layout)?;

            if !layer.layer.recon_gain_is_present {
                continue;
            }

            let gains = params
                .recon_gains
                .and_then(|gains| gains.iter().find(|gain| usize::from(gain.layer) == i));

            if let Some(gains) = gains {
                for &ch in layer.layer.layout.channels() {
                    if derived & (1 << ch.index()) != 0 {
                        self.store.scale(ch, gains.gain(ch.recon_gain_flag()));
                    }
                }
            }
        }

        if let Some(output_gain) = self.layers.last().and_then(|layer| layer.layer.output_gain) {
            let gain = db_to_linear(output_gain.gain);

            for &ch in self.layout.channels() {
                let flag = ch.output_gain_flag();

                if !flag.is_empty() && output_gain.flags.contains(flag) {
                    self.store.scale(ch, gain);
                }
            }
        }

        frame.set_samples(self.store.samples());

        for (c, &ch) in self.layout.channels().iter().enumerate() {
            frame.plane_mut(c).copy_from_slice(self.store.plane(ch));
        }

        Ok(())
    }
}

/// Decodes a scene-based audio element into ambisonics components.
pub struct AmbisonicsDecoder {
    codec: Box<dyn AudioDecoder>,
    config: AmbisonicsConfig,
    /// The number of decoded (coded) channels.
    coded_channels: usize,
}

impl AmbisonicsDecoder {
    fn try_new(
        stream: &IamfStream,
        config: &AmbisonicsConfig,
        registry: &CodecRegistry,
    ) -> Result<Self> {
        let (substreams, coupled) = config.substream_counts();

        let codec = make_codec(registry, &stream.codec_config, substreams, coupled)?;

        let coded_channels = substreams + coupled;

        Ok(AmbisonicsDecoder { codec, config: config.clone(), coded_channels })
    }

    fn decode(
        &mut self,
        packets: &[Vec<u8>],
        frame_size: usize,
        pool: &mut BufferPool,
        frame: &mut Frame,
    ) -> Result<()> {
        let coded = self.coded_channels;

        let (buf, n) = decode_packets(self.codec.as_mut(), packets, coded, frame_size, pool)?;

        frame.set_samples(n);

        match &self.config {
            AmbisonicsConfig::Mono { channel_mapping, .. } => {
                for (acn, &mapping) in channel_mapping.iter().enumerate() {
                    let plane = frame.plane_mut(acn);

                    if mapping == AmbisonicsConfig::SILENT {
                        plane.fill(0.0);
                        continue;
                    }

                    let src = usize::from(mapping);

                    for (s, interleaved) in plane.iter_mut().zip(buf.chunks_exact(coded)) {
                        *s = interleaved[src];
                    }
                }
            }
            AmbisonicsConfig::Projection { demixing_matrix, output_channel_count, .. } => {
                let rows = usize::from(*output_channel_count);

                for acn in 0..rows {
                    let plane = frame.plane_mut(acn);

                    for (s, interleaved) in plane.iter_mut().zip(buf.chunks_exact(coded)) {
                        *s = interleaved
                            .iter()
                            .enumerate()
                            .map(|(j, x)| demixing_matrix[j * rows + acn] * x)
                            .sum();
                    }
                }
            }
        }

        Ok(())
    }
}

/// The decoder of a stream.
pub enum DecoderKind {
    ChannelBased(ScalableChannelDecoder),
    SceneBased(AmbisonicsDecoder),
}

/// Decodes the packets of one stream into frames.
///
/// Each frame is decoded by handing the decoder exactly one packet per decoded substream with
/// [`StreamDecoder::receive_packet`], then calling [`StreamDecoder::decode`].
pub struct StreamDecoder {
    kind: DecoderKind,
    num_substreams: usize,
    frame_size: usize,
    pool: BufferPool,
    packets: Vec<Vec<u8>>,
    has_packet: bool,
    strim: usize,
    etrim: usize,
    /// Samples of codec delay that remain to be trimmed.
    delay: usize,
    frame: Frame,
}

impl StreamDecoder {
    /// Builds the codec decoders of a stream.
    pub fn try_new(stream: &IamfStream, registry: &CodecRegistry) -> Result<Self> {
        let frame_size = stream.max_frame_size;

        let kind = match &stream.scheme {
            StreamScheme::ChannelBased { layers, default_demixing } => DecoderKind::ChannelBased(
                ScalableChannelDecoder::try_new(stream, layers, *default_demixing, registry)?,
            ),
            StreamScheme::SceneBased(config) => {
                DecoderKind::SceneBased(AmbisonicsDecoder::try_new(stream, config, registry)?)
            }
        };

        let delay = match &kind {
            DecoderKind::ChannelBased(decoder) => decoder.delay(),
            DecoderKind::SceneBased(decoder) => decoder.codec.delay(),
        };

        debug!(
            "element {}: built decoder for {} substreams, frame size {}, delay {}",
            stream.element_id,
            stream.substream_count(),
            frame_size,
            delay
        );

        Ok(StreamDecoder {
            kind,
            num_substreams: stream.substream_count(),
            frame_size,
            pool: BufferPool::new(stream.layout.channel_count() * frame_size),
            packets: vec![Vec::new(); stream.substream_count()],
            has_packet: false,
            strim: 0,
            etrim: 0,
            delay,
            frame: Frame::new(stream.layout.channel_count(), frame_size),
        })
    }

    /// Gets the number of substreams the decoder expects per frame.
    pub fn substream_count(&self) -> usize {
        self.num_substreams
    }

    /// Hands the decoder one packet per substream, in substream order, and the trimming of the
    /// frame.
    ///
    /// If the number of packets is not the number of substreams, the packets are rejected and
    /// the decoder is left untouched.
    pub fn receive_packet(&mut self, packets: &[&[u8]], strim: usize, etrim: usize) -> Result<()> {
        if packets.len() != self.num_substreams {
            return invalid_argument_error("decoder: packet count does not match substream count");
        }

        for (dst, src) in self.packets.iter_mut().zip(packets) {
            dst.clear();
            dst.extend_from_slice(src);
        }

        self.has_packet = true;
        self.strim = strim;
        self.etrim = etrim;

        Ok(())
    }

    /// Decodes the received packet into a frame.
    ///
    /// A codec error invalidates only this frame.
    pub fn decode(&mut self, params: &FrameParams<'_>, pts: u64) -> Result<&Frame> {
        if !self.has_packet {
            return invalid_state_error("decoder: no packet was received");
        }

        self.has_packet = false;

        let result = match &mut self.kind {
            DecoderKind::ChannelBased(decoder) => {
                let frame_size = self.frame_size;
                decoder.decode(&self.packets, params, frame_size, &mut self.pool, &mut self.frame)
            }
            DecoderKind::SceneBased(decoder) => {
                decoder.decode(&self.packets, self.frame_size, &mut self.pool, &mut self.frame)
            }
        };

        result?;

        let samples = self.frame.samples();

        // The signalled start trim covers the codec delay of the first frames.
        let strim = self.strim.max(self.delay).min(samples);
        self.delay -= self.delay.min(strim);

        self.frame.strim = strim;
        self.frame.etrim = self.etrim.min(samples - self.frame.strim);
        self.frame.pts = pts;

        Ok(&self.frame)
    }

    /// Gets the last decoded frame.
    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    /// Reset the codec decoders.
    pub fn reset(&mut self) {
        match &mut self.kind {
            DecoderKind::ChannelBased(decoder) => decoder.reset(),
            DecoderKind::SceneBased(decoder) => decoder.codec.reset(),
        }
        self.has_packet = false;
    }
}
