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

use iamf_core::support_audio_codec;

use iamf_core::codecs::registry::{RegisterableAudioDecoder, SupportedCodec};
use iamf_core::codecs::{AudioDecoder, CodecInfo, CodecParameters, CODEC_ID_LPCM};
use iamf_core::errors::{codec_error, decode_error, unsupported_error, Result};
use iamf_core::io::{BufReader, ReadBytes};

use log::warn;

/// Bit 0 of the LPCM sample format flags selects little-endian samples.
const LPCM_FLAG_LITTLE_ENDIAN: u8 = 0x1;

/// The decoder specific configuration of LPCM substreams.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct LpcmConfig {
    /// Samples are little-endian.
    pub little_endian: bool,
    /// Bits per sample. One of 16, 24 or 32.
    pub sample_size: u8,
    /// The sample rate in Hz.
    pub sample_rate: u32,
}

impl LpcmConfig {
    /// Read the LPCM decoder config.
    pub fn read<B: ReadBytes>(reader: &mut B) -> Result<LpcmConfig> {
        let flags = reader.read_u8()?;
        let sample_size = reader.read_u8()?;
        let sample_rate = reader.read_be_u32()?;

        if !matches!(sample_size, 16 | 24 | 32) {
            return unsupported_error("pcm: unsupported sample size");
        }

        if sample_rate == 0 {
            return decode_error("pcm: invalid sample rate");
        }

        let little_endian = flags & LPCM_FLAG_LITTLE_ENDIAN != 0;

        Ok(LpcmConfig { little_endian, sample_size, sample_rate })
    }

    fn bytes_per_sample(&self) -> usize {
        usize::from(self.sample_size / 8)
    }

    /// Read one sample and normalize it to [-1, 1).
    #[inline(always)]
    fn read_sample(&self, buf: &[u8]) -> f32 {
        match (self.sample_size, self.little_endian) {
            (16, true) => f32::from(i16::from_le_bytes([buf[0], buf[1]])) / 32_768.0,
            (16, false) => f32::from(i16::from_be_bytes([buf[0], buf[1]])) / 32_768.0,
            (24, true) => {
                (i32::from_le_bytes([0, buf[0], buf[1], buf[2]]) >> 8) as f32 / 8_388_608.0
            }
            (24, false) => {
                (i32::from_be_bytes([buf[0], buf[1], buf[2], 0]) >> 8) as f32 / 8_388_608.0
            }
            (_, true) => {
                (f64::from(i32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]])) / 2_147_483_648.0)
                    as f32
            }
            (_, false) => {
                (f64::from(i32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]])) / 2_147_483_648.0)
                    as f32
            }
        }
    }
}

/// Linear PCM substream decoder.
pub struct LpcmDecoder {
    params: CodecParameters,
    config: LpcmConfig,
}

impl LpcmDecoder {
    pub fn try_new(params: &CodecParameters) -> Result<Self> {
        if params.codec != CODEC_ID_LPCM {
            return unsupported_error("pcm: invalid codec");
        }

        if params.num_streams == 0 || params.num_coupled_streams > params.num_streams {
            return unsupported_error("pcm: invalid substream counts");
        }

        let config = LpcmConfig::read(&mut BufReader::new(&params.extra_data))?;

        Ok(LpcmDecoder { params: params.clone(), config })
    }
}

impl AudioDecoder for LpcmDecoder {
    fn reset(&mut self) {
        // No state is stored between packets, therefore do nothing.
    }

    fn codec_info(&self) -> &CodecInfo {
        &Self::supported_codecs()[0].info
    }

    fn codec_params(&self) -> &CodecParameters {
        &self.params
    }

    fn decode(&mut self, packets: &[&[u8]], out: &mut [f32], frame_size: usize) -> Result<usize> {
        if packets.len() != self.params.num_streams {
            return codec_error("pcm: packet count does not match the substream count");
        }

        let n_channels = self.params.channel_count();
        let bps = self.config.bytes_per_sample();

        // Every substream must carry the same number of samples.
        let mut n_samples = None;

        for (i, packet) in packets.iter().enumerate() {
            let n_ch = if i < self.params.num_coupled_streams { 2 } else { 1 };
            let len = packet.len() / (bps * n_ch);

            if packet.len() % (bps * n_ch) != 0 {
                warn!("pcm: substream {} has a partial sample", i);
            }

            match n_samples {
                None => n_samples = Some(len),
                Some(n) if n != len => return codec_error("pcm: substream length mismatch"),
                _ => (),
            }
        }

        let n_samples = n_samples.unwrap_or(0).min(frame_size);

        if out.len() < n_samples * n_channels {
            return codec_error("pcm: output buffer too small");
        }

        // Interleave the substreams into the output. Coupled substreams occupy two consecutive
        // channels.
        let mut ch_offset = 0;

        for (i, packet) in packets.iter().enumerate() {
            let n_ch = if i < self.params.num_coupled_streams { 2 } else { 1 };

            for (s, frame) in packet.chunks_exact(bps * n_ch).take(n_samples).enumerate() {
                for (c, sample) in frame.chunks_exact(bps).enumerate() {
                    out[s * n_channels + ch_offset + c] = self.config.read_sample(sample);
                }
            }

            ch_offset += n_ch;
        }

        Ok(n_samples)
    }
}

impl RegisterableAudioDecoder for LpcmDecoder {
    fn try_registry_new(params: &CodecParameters) -> Result<Box<dyn AudioDecoder>>
    where
        Self: Sized,
    {
        Ok(Box::new(LpcmDecoder::try_new(params)?))
    }

    fn supported_codecs() -> &'static [SupportedCodec] {
        &[support_audio_codec!(CODEC_ID_LPCM, "ipcm", "Linear PCM")]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(flags: u8, sample_size: u8, streams: usize, coupled: usize) -> CodecParameters {
        let mut extra = vec![flags, sample_size];
        extra.extend_from_slice(&48_000u32.to_be_bytes());

        let mut params = CodecParameters::new(CODEC_ID_LPCM);
        params
            .with_sample_rate(48_000)
            .with_frames_per_packet(2)
            .with_streams(streams, coupled)
            .with_extra_data(extra.into_boxed_slice());
        params
    }

    #[test]
    fn verify_lpcm_config() {
        let config = LpcmConfig::read(&mut BufReader::new(&[1, 24, 0, 0, 0xbb, 0x80])).unwrap();
        assert!(config.little_endian);
        assert_eq!(config.sample_size, 24);
        assert_eq!(config.sample_rate, 48_000);

        assert!(LpcmConfig::read(&mut BufReader::new(&[1, 8, 0, 0, 0xbb, 0x80])).is_err());
    }

    #[test]
    fn verify_decode_interleaves_substreams() {
        let mut decoder = LpcmDecoder::try_new(&params(1, 16, 2, 1)).unwrap();

        // Coupled substream: (L, R) x 2, then a mono substream x 2.
        let stereo = [0x00, 0x40, 0x00, 0xc0, 0x00, 0x20, 0x00, 0xe0];
        let mono = [0x00, 0x10, 0x00, 0xf0];

        let mut out = [0.0f32; 6];
        let n = decoder.decode(&[&stereo, &mono], &mut out, 2).unwrap();

        assert_eq!(n, 2);
        assert_eq!(out, [0.5, -0.5, 0.125, 0.25, -0.25, -0.125]);
    }

    #[test]
    fn verify_decode_big_endian_24() {
        let mut decoder = LpcmDecoder::try_new(&params(0, 24, 1, 0)).unwrap();

        let mut out = [0.0f32; 2];
        let n = decoder.decode(&[&[0x40, 0x00, 0x00, 0xc0, 0x00, 0x00]], &mut out, 2).unwrap();

        assert_eq!(n, 2);
        assert_eq!(out, [0.5, -0.5]);
    }

    #[test]
    fn verify_substream_length_mismatch() {
        let mut decoder = LpcmDecoder::try_new(&params(1, 16, 2, 0)).unwrap();

        let mut out = [0.0f32; 4];
        let err = decoder.decode(&[&[0, 0, 0, 0], &[0, 0]], &mut out, 2).unwrap_err();
        assert!(err.is_frame_local());
    }
}
