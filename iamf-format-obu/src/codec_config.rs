// IAMF-RS
// Copyright (c) 2024 The IAMF-RS Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use iamf_core::codecs::{CodecId, CodecParameters};
use iamf_core::codecs::{CODEC_ID_AAC, CODEC_ID_FLAC, CODEC_ID_LPCM, CODEC_ID_OPUS};
use iamf_core::errors::{decode_error, limit_error, unsupported_error, Result};
use iamf_core::io::{BufReader, ReadBytes};

use log::debug;

/// Sample rates indexed by the AAC sampling frequency index.
const AAC_SAMPLE_RATES: [u32; 13] =
    [96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350];

/// The maximum number of samples per frame.
pub const MAX_SAMPLES_PER_FRAME: u64 = 1 << 16;

/// The codec config OBU.
#[derive(Clone, Debug)]
pub struct CodecConfig {
    pub codec_config_id: u64,
    pub codec_id: CodecId,
    pub num_samples_per_frame: u32,
    pub audio_roll_distance: i16,
    /// The sample rate of the decoded audio in Hz.
    pub sample_rate: u32,
    /// The number of priming samples signalled by the codec configuration.
    pub pre_skip: u32,
    /// The bit depth of the coded audio, if signalled.
    pub bits_per_sample: Option<u32>,
    /// The raw decoder config.
    pub decoder_config: Box<[u8]>,
}

impl CodecConfig {
    pub fn read(reader: &mut BufReader<'_>) -> Result<CodecConfig> {
        let codec_config_id = reader.read_leb128()?;
        let codec_id = CodecId::from_fourcc(reader.read_quad_bytes()?);
        let num_samples_per_frame = reader.read_leb128()?;
        let audio_roll_distance = reader.read_be_i16()?;

        if num_samples_per_frame == 0 {
            return decode_error("obu: invalid number of samples per frame");
        }

        if num_samples_per_frame > MAX_SAMPLES_PER_FRAME {
            return limit_error("obu: too many samples per frame");
        }

        let decoder_config: Box<[u8]> = reader.read_buf_bytes_available_ref().into();

        let mut config = CodecConfig {
            codec_config_id,
            codec_id,
            num_samples_per_frame: num_samples_per_frame as u32,
            audio_roll_distance,
            sample_rate: 0,
            pre_skip: 0,
            bits_per_sample: None,
            decoder_config,
        };

        let mut dc = BufReader::new(&config.decoder_config);

        match codec_id {
            CODEC_ID_OPUS => {
                // Opus always decodes at 48 kHz. The pre-skip follows the version and channel
                // count.
                let _version = dc.read_u8()?;
                let _channels = dc.read_u8()?;
                config.pre_skip = u32::from(dc.read_be_u16()?);
                config.sample_rate = 48_000;
            }
            CODEC_ID_LPCM => {
                let _flags = dc.read_u8()?;
                config.bits_per_sample = Some(u32::from(dc.read_u8()?));
                config.sample_rate = dc.read_be_u32()?;
            }
            CODEC_ID_FLAC => config.sample_rate = read_flac_sample_rate(&mut dc)?,
            CODEC_ID_AAC => config.sample_rate = read_aac_sample_rate(&mut dc)?,
            _ => return unsupported_error("obu: unknown codec id"),
        }

        if config.sample_rate == 0 {
            return decode_error("obu: invalid sample rate");
        }

        debug!(
            "codec config: id={}, codec={}, frame_size={}, sample_rate={}",
            config.codec_config_id,
            config.codec_id,
            config.num_samples_per_frame,
            config.sample_rate
        );

        Ok(config)
    }

    /// Make the codec parameters for a decoder of `num_streams` substreams, `num_coupled` of
    /// which are coupled.
    pub fn make_codec_params(&self, num_streams: usize, num_coupled: usize) -> CodecParameters {
        let mut params = CodecParameters::new(self.codec_id);
        params
            .with_sample_rate(self.sample_rate)
            .with_frames_per_packet(self.num_samples_per_frame)
            .with_roll_distance(self.audio_roll_distance)
            .with_streams(num_streams, num_coupled)
            .with_extra_data(self.decoder_config.clone());
        params
    }
}

/// Read the sample rate from the STREAMINFO block of a FLAC decoder config.
fn read_flac_sample_rate<B: ReadBytes>(reader: &mut B) -> Result<u32> {
    loop {
        let header = reader.read_u8()?;
        let len = reader.read_be_u24()?;

        // Block type 0 is STREAMINFO.
        if header & 0x7f == 0 {
            // Skip the block and frame size bounds.
            reader.ignore_bytes(10)?;

            let buf = reader.read_triple_bytes()?;
            let rate =
                (u32::from(buf[0]) << 12) | (u32::from(buf[1]) << 4) | (u32::from(buf[2]) >> 4);
            return Ok(rate);
        }

        if header & 0x80 != 0 {
            return decode_error("obu: flac config has no streaminfo block");
        }

        reader.ignore_bytes(u64::from(len))?;
    }
}

/// Read the expandable size of an MPEG-4 descriptor.
fn read_descriptor_len<B: ReadBytes>(reader: &mut B) -> Result<u32> {
    let mut len = 0;

    for _ in 0..4 {
        let byte = reader.read_u8()?;
        len = (len << 7) | u32::from(byte & 0x7f);

        if byte & 0x80 == 0 {
            break;
        }
    }

    Ok(len)
}

/// Read the sample rate from the AudioSpecificConfig of an AAC decoder config descriptor.
fn read_aac_sample_rate<B: ReadBytes>(reader: &mut B) -> Result<u32> {
    const DECODER_CONFIG_DESCR_TAG: u8 = 0x04;
    const DECODER_SPECIFIC_DESCR_TAG: u8 = 0x05;

    if reader.read_u8()? != DECODER_CONFIG_DESCR_TAG {
        return decode_error("obu: invalid aac decoder config descriptor");
    }

    let _ = read_descriptor_len(reader)?;

    // Object type, stream type, buffer size, and bit rates.
    reader.ignore_bytes(13)?;

    if reader.read_u8()? != DECODER_SPECIFIC_DESCR_TAG {
        return decode_error("obu: invalid aac decoder specific descriptor");
    }

    let _ = read_descriptor_len(reader)?;

    // The audio object type occupies the first 5 bits, followed by the 4-bit sampling frequency
    // index.
    let b0 = reader.read_u8()?;
    let b1 = reader.read_u8()?;

    let index = ((b0 & 0x07) << 1) | (b1 >> 7);

    if index == 0xf {
        // An explicit 24-bit sample rate follows the index.
        let b2 = reader.read_u8()?;
        let b3 = reader.read_u8()?;
        let b4 = reader.read_u8()?;

        let rate = (u32::from(b1 & 0x7f) << 17)
            | (u32::from(b2) << 9)
            | (u32::from(b3) << 1)
            | (u32::from(b4) >> 7);

        return Ok(rate);
    }

    match AAC_SAMPLE_RATES.get(usize::from(index)) {
        Some(&rate) => Ok(rate),
        None => decode_error("obu: invalid aac sampling frequency index"),
    }
}
