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

//! Opus substream decoder.
//!
//! Every IAMF Opus substream is a complete Opus packet. Coupled substreams are decoded by a
//! stereo decoder and mono substreams by a mono decoder. All substreams decode at 48 kHz.

use iamf_core::support_audio_codec;

use iamf_core::codecs::registry::{RegisterableAudioDecoder, SupportedCodec};
use iamf_core::codecs::{AudioDecoder, CodecInfo, CodecParameters, CODEC_ID_OPUS};
use iamf_core::errors::{codec_error, decode_error, unsupported_error, Result};
use iamf_core::io::{BufReader, ReadBytes};

use log::{debug, warn};
use opus_codec::{Channels, Decoder, SampleRate, MAX_FRAME_SAMPLES_48KHZ};

/// The sample rate of decoded Opus substreams.
pub const OPUS_SAMPLE_RATE: u32 = 48_000;

/// The decoder specific configuration of Opus substreams.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct OpusConfig {
    pub version: u8,
    pub output_channel_count: u8,
    /// The number of samples at 48 kHz to discard from the start of the stream.
    pub pre_skip: u16,
    /// The sample rate of the encoder input. Informational only.
    pub input_sample_rate: u32,
    /// Q7.8 output gain in dB.
    pub output_gain: i16,
    pub channel_mapping_family: u8,
}

impl OpusConfig {
    pub fn read<B: ReadBytes>(reader: &mut B) -> Result<OpusConfig> {
        let version = reader.read_u8()?;
        let output_channel_count = reader.read_u8()?;
        let pre_skip = reader.read_be_u16()?;
        let input_sample_rate = reader.read_be_u32()?;
        let output_gain = reader.read_be_i16()?;
        let channel_mapping_family = reader.read_u8()?;

        // Only the minor version may change while remaining compatible.
        if version & 0xf0 != 0 {
            return unsupported_error("opus: unsupported major version");
        }

        if channel_mapping_family != 0 {
            warn!("opus: ignoring channel mapping family {}", channel_mapping_family);
        }

        Ok(OpusConfig {
            version,
            output_channel_count,
            pre_skip,
            input_sample_rate,
            output_gain,
            channel_mapping_family,
        })
    }
}

/// Decodes the Opus packet of one substream.
struct SubstreamDecoder {
    decoder: Decoder,
    channels: usize,
}

/// Opus substream decoder.
pub struct OpusDecoder {
    params: CodecParameters,
    config: OpusConfig,
    substreams: Vec<SubstreamDecoder>,
    /// Scratch buffer for the 16-bit output of one substream.
    pcm: Vec<i16>,
}

impl OpusDecoder {
    pub fn try_new(params: &CodecParameters) -> Result<Self> {
        if params.codec != CODEC_ID_OPUS {
            return unsupported_error("opus: invalid codec");
        }

        if params.num_streams == 0 || params.num_coupled_streams > params.num_streams {
            return unsupported_error("opus: invalid substream counts");
        }

        if params.sample_rate != 0 && params.sample_rate != OPUS_SAMPLE_RATE {
            return unsupported_error("opus: unsupported sample rate");
        }

        let config = OpusConfig::read(&mut BufReader::new(&params.extra_data))?;

        let mut substreams = Vec::with_capacity(params.num_streams);

        for i in 0..params.num_streams {
            let channels =
                if i < params.num_coupled_streams { Channels::Stereo } else { Channels::Mono };

            let decoder = match Decoder::new(SampleRate::Hz48000, channels) {
                Ok(decoder) => decoder,
                Err(err) => {
                    warn!("opus: failed to create decoder: {}", err);
                    return decode_error("opus: failed to create decoder");
                }
            };

            substreams.push(SubstreamDecoder { decoder, channels: channels.as_usize() });
        }

        debug!(
            "opus: {} substreams ({} coupled), pre-skip {}",
            params.num_streams, params.num_coupled_streams, config.pre_skip
        );

        Ok(OpusDecoder {
            params: params.clone(),
            config,
            substreams,
            pcm: vec![0; 2 * MAX_FRAME_SAMPLES_48KHZ],
        })
    }

    /// Gets the decoder specific configuration.
    pub fn config(&self) -> &OpusConfig {
        &self.config
    }
}

impl AudioDecoder for OpusDecoder {
    fn reset(&mut self) {
        for substream in self.substreams.iter_mut() {
            if let Err(err) = substream.decoder.reset() {
                warn!("opus: reset failed: {}", err);
            }
        }
    }

    fn codec_info(&self) -> &CodecInfo {
        &Self::supported_codecs()[0].info
    }

    fn codec_params(&self) -> &CodecParameters {
        &self.params
    }

    fn delay(&self) -> usize {
        usize::from(self.config.pre_skip)
    }

    fn decode(&mut self, packets: &[&[u8]], out: &mut [f32], frame_size: usize) -> Result<usize> {
        if packets.len() != self.substreams.len() {
            return codec_error("opus: packet count does not match the substream count");
        }

        let n_channels = self.params.channel_count();
        let frame_size = frame_size.min(MAX_FRAME_SAMPLES_48KHZ);

        if frame_size == 0 || out.len() < frame_size * n_channels {
            return codec_error("opus: output buffer too small");
        }

        // Every substream must decode the same number of samples.
        let mut n_samples = None;
        let mut ch_offset = 0;

        for (i, (substream, packet)) in self.substreams.iter_mut().zip(packets).enumerate() {
            let n_ch = substream.channels;
            let pcm = &mut self.pcm[..frame_size * n_ch];

            let len = match substream.decoder.decode(packet, pcm, false) {
                Ok(len) => len,
                Err(err) => {
                    warn!("opus: substream {}: {}", i, err);
                    return codec_error("opus: failed to decode packet");
                }
            };

            match n_samples {
                None => n_samples = Some(len),
                Some(n) if n != len => return codec_error("opus: substream length mismatch"),
                _ => (),
            }

            for (s, frame) in pcm.chunks_exact(n_ch).take(len).enumerate() {
                for (c, &sample) in frame.iter().enumerate() {
                    out[s * n_channels + ch_offset + c] = f32::from(sample) / 32_768.0;
                }
            }

            ch_offset += n_ch;
        }

        Ok(n_samples.unwrap_or(0))
    }
}

impl RegisterableAudioDecoder for OpusDecoder {
    fn try_registry_new(params: &CodecParameters) -> Result<Box<dyn AudioDecoder>>
    where
        Self: Sized,
    {
        Ok(Box::new(OpusDecoder::try_new(params)?))
    }

    fn supported_codecs() -> &'static [SupportedCodec] {
        &[support_audio_codec!(CODEC_ID_OPUS, "opus", "Opus")]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use opus_codec::{Application, Encoder};

    const FRAME_SIZE: usize = 960;

    fn extra_data(pre_skip: u16) -> Vec<u8> {
        let mut extra = vec![0x01, 0x02];
        extra.extend_from_slice(&pre_skip.to_be_bytes());
        extra.extend_from_slice(&48_000u32.to_be_bytes());
        extra.extend_from_slice(&0i16.to_be_bytes());
        extra.push(0);
        extra
    }

    fn params(streams: usize, coupled: usize) -> CodecParameters {
        let mut params = CodecParameters::new(CODEC_ID_OPUS);
        params
            .with_sample_rate(48_000)
            .with_frames_per_packet(FRAME_SIZE as u32)
            .with_streams(streams, coupled)
            .with_extra_data(extra_data(312).into_boxed_slice());
        params
    }

    /// Encodes `frames` frames of a 440 Hz tone.
    fn encode(channels: Channels, frames: usize) -> Vec<Vec<u8>> {
        let mut encoder = Encoder::new(SampleRate::Hz48000, channels, Application::Audio).unwrap();
        let n_ch = channels.as_usize();

        (0..frames)
            .map(|f| {
                let pcm: Vec<i16> = (0..FRAME_SIZE * n_ch)
                    .map(|i| {
                        let t = (f * FRAME_SIZE + i / n_ch) as f32 / 48_000.0;
                        (8_000.0 * (2.0 * std::f32::consts::PI * 440.0 * t).sin()) as i16
                    })
                    .collect();

                let mut packet = vec![0u8; 4000];
                let len = encoder.encode(&pcm, &mut packet).unwrap();
                packet.truncate(len);
                packet
            })
            .collect()
    }

    #[test]
    fn verify_opus_config() {
        let config = OpusConfig::read(&mut BufReader::new(&extra_data(312))).unwrap();
        assert_eq!(config.pre_skip, 312);
        assert_eq!(config.input_sample_rate, 48_000);
        assert_eq!(config.channel_mapping_family, 0);

        let mut extra = extra_data(0);
        extra[0] = 0x10;
        assert!(OpusConfig::read(&mut BufReader::new(&extra)).is_err());
    }

    #[test]
    fn verify_delay_is_pre_skip() {
        let decoder = OpusDecoder::try_new(&params(1, 1)).unwrap();
        assert_eq!(decoder.delay(), 312);
    }

    #[test]
    fn verify_decode_coupled_and_mono_substreams() {
        let mut decoder = OpusDecoder::try_new(&params(2, 1)).unwrap();

        let stereo = encode(Channels::Stereo, 4);
        let mono = encode(Channels::Mono, 4);

        let mut out = vec![0.0f32; 3 * FRAME_SIZE];
        let mut energy = [0.0f32; 3];

        for (s, m) in stereo.iter().zip(mono.iter()) {
            let n = decoder.decode(&[s.as_slice(), m.as_slice()], &mut out, FRAME_SIZE).unwrap();
            assert_eq!(n, FRAME_SIZE);

            for frame in out.chunks_exact(3) {
                for (e, sample) in energy.iter_mut().zip(frame) {
                    assert!(sample.abs() <= 1.0);
                    *e += sample * sample;
                }
            }
        }

        // Every channel carries the tone once the decoder has primed.
        assert!(energy.iter().all(|&e| e > 1.0));
    }

    #[test]
    fn verify_invalid_packet_is_frame_local() {
        let mut decoder = OpusDecoder::try_new(&params(1, 0)).unwrap();

        let mut out = vec![0.0f32; FRAME_SIZE];
        // A code 3 packet without a frame count byte.
        let err = decoder.decode(&[&[0x03]], &mut out, FRAME_SIZE).unwrap_err();
        assert!(err.is_frame_local());

        // Decoding continues with the next packet.
        let packets = encode(Channels::Mono, 1);
        let n = decoder.decode(&[packets[0].as_slice()], &mut out, FRAME_SIZE).unwrap();
        assert_eq!(n, FRAME_SIZE);
    }

    #[test]
    fn verify_substream_count_mismatch() {
        let mut decoder = OpusDecoder::try_new(&params(2, 1)).unwrap();

        let packets = encode(Channels::Stereo, 1);
        let mut out = vec![0.0f32; 3 * FRAME_SIZE];
        let err = decoder.decode(&[packets[0].as_slice()], &mut out, FRAME_SIZE).unwrap_err();
        assert!(err.is_frame_local());
    }
}
