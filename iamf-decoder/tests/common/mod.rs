// IAMF-RS
// Copyright (c) 2024 The IAMF-RS Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A minimal IAMF bitstream writer for tests.

#![allow(dead_code)]

use iamf_codec_pcm::LpcmDecoder;
use iamf_core::codecs::registry::CodecRegistry;

pub const SAMPLE_RATE: u32 = 48_000;

const OBU_CODEC_CONFIG: u8 = 0;
const OBU_AUDIO_ELEMENT: u8 = 1;
const OBU_MIX_PRESENTATION: u8 = 2;
const OBU_PARAMETER_BLOCK: u8 = 3;
const OBU_TEMPORAL_DELIMITER: u8 = 4;
const OBU_AUDIO_FRAME: u8 = 5;
const OBU_AUDIO_FRAME_ID0: u8 = 6;
const OBU_SEQUENCE_HEADER: u8 = 31;

pub fn registry() -> CodecRegistry {
    let mut registry = CodecRegistry::new();
    registry.register_audio_decoder::<LpcmDecoder>();
    registry
}

pub fn leb128(out: &mut Vec<u8>, mut value: u64) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;

        if value == 0 {
            out.push(byte);
            break;
        }

        out.push(byte | 0x80);
    }
}

/// Wraps a payload in an OBU header. `trim` is `(start, end)`.
pub fn obu(obu_type: u8, payload: &[u8], trim: Option<(u64, u64)>, redundant: bool) -> Vec<u8> {
    let mut body = Vec::new();

    if let Some((start, end)) = trim {
        leb128(&mut body, end);
        leb128(&mut body, start);
    }
    body.extend_from_slice(payload);

    let mut out =
        vec![(obu_type << 3) | (u8::from(redundant) << 2) | (u8::from(trim.is_some()) << 1)];
    leb128(&mut out, body.len() as u64);
    out.extend_from_slice(&body);
    out
}

/// An IA sequence header with the given primary profile.
pub fn sequence_header(profile: u8) -> Vec<u8> {
    let mut payload = b"iamf".to_vec();
    payload.push(profile);
    payload.push(profile);
    obu(OBU_SEQUENCE_HEADER, &payload, None, false)
}

/// A codec config of 16-bit little-endian LPCM.
pub fn lpcm_codec_config(id: u64, frame_size: u32) -> Vec<u8> {
    let mut payload = Vec::new();
    leb128(&mut payload, id);
    payload.extend_from_slice(b"ipcm");
    leb128(&mut payload, u64::from(frame_size));
    payload.extend_from_slice(&0i16.to_be_bytes());
    payload.push(1);
    payload.push(16);
    payload.extend_from_slice(&SAMPLE_RATE.to_be_bytes());
    obu(OBU_CODEC_CONFIG, &payload, None, false)
}

/// A channel layer: `(loudspeaker layout code, substreams, coupled substreams)`.
pub type Layer = (u8, u8, u8);

/// A scalable channel audio element.
pub fn channel_element(
    id: u64,
    codec_config_id: u64,
    substream_ids: &[u64],
    layers: &[Layer],
) -> Vec<u8> {
    let mut payload = Vec::new();
    leb128(&mut payload, id);
    // Channel based.
    payload.push(0);
    leb128(&mut payload, codec_config_id);
    leb128(&mut payload, substream_ids.len() as u64);
    for &substream_id in substream_ids {
        leb128(&mut payload, substream_id);
    }
    // No parameters.
    leb128(&mut payload, 0);

    channel_layers(&mut payload, layers);

    obu(OBU_AUDIO_ELEMENT, &payload, None, false)
}

/// A scalable channel audio element with a demixing parameter definition. `demixing` is
/// `(parameter id, frame size, default mode)`.
pub fn demixed_channel_element(
    id: u64,
    codec_config_id: u64,
    substream_ids: &[u64],
    layers: &[Layer],
    demixing: (u64, u32, u8),
) -> Vec<u8> {
    let (parameter_id, frame_size, default_mode) = demixing;

    let mut payload = Vec::new();
    leb128(&mut payload, id);
    payload.push(0);
    leb128(&mut payload, codec_config_id);
    leb128(&mut payload, substream_ids.len() as u64);
    for &substream_id in substream_ids {
        leb128(&mut payload, substream_id);
    }

    leb128(&mut payload, 1);
    // Demixing.
    leb128(&mut payload, 1);
    leb128(&mut payload, parameter_id);
    leb128(&mut payload, u64::from(SAMPLE_RATE));
    payload.push(0);
    leb128(&mut payload, u64::from(frame_size));
    leb128(&mut payload, u64::from(frame_size));
    payload.push(default_mode << 5);
    payload.push(0);

    channel_layers(&mut payload, layers);

    obu(OBU_AUDIO_ELEMENT, &payload, None, false)
}

fn channel_layers(out: &mut Vec<u8>, layers: &[Layer]) {
    out.push((layers.len() as u8) << 5);
    for &(layout, substreams, coupled) in layers {
        out.push(layout << 4);
        out.push(substreams);
        out.push(coupled);
    }
}

/// A mix gain parameter definition whose blocks span one frame.
fn mix_gain_definition(out: &mut Vec<u8>, parameter_id: u64, frame_size: u32, default_q78: i16) {
    leb128(out, parameter_id);
    leb128(out, u64::from(SAMPLE_RATE));
    out.push(0);
    leb128(out, u64::from(frame_size));
    leb128(out, u64::from(frame_size));
    out.extend_from_slice(&default_q78.to_be_bytes());
}

/// An element of a sub-mix: `(audio element id, element mix gain parameter id)`.
pub type MixElement = (u64, u64);

/// A mix presentation with one sub-mix. The sub-mix carries loudness for stereo at
/// `loudness_q78`.
pub fn mix_presentation(
    id: u64,
    elements: &[MixElement],
    output_gain_id: u64,
    frame_size: u32,
    loudness_q78: i16,
) -> Vec<u8> {
    let mut payload = Vec::new();
    leb128(&mut payload, id);
    // No labels.
    leb128(&mut payload, 0);
    // One sub-mix.
    leb128(&mut payload, 1);
    leb128(&mut payload, elements.len() as u64);

    for &(element_id, gain_id) in elements {
        leb128(&mut payload, element_id);
        // Stereo headphones rendering, no extension.
        payload.push(0);
        leb128(&mut payload, 0);
        mix_gain_definition(&mut payload, gain_id, frame_size, 0);
    }

    mix_gain_definition(&mut payload, output_gain_id, frame_size, 0);

    // One layout: sound system A.
    leb128(&mut payload, 1);
    payload.push(2 << 6);
    payload.push(0);
    payload.extend_from_slice(&loudness_q78.to_be_bytes());
    payload.extend_from_slice(&0i16.to_be_bytes());

    obu(OBU_MIX_PRESENTATION, &payload, None, false)
}

/// A mix gain parameter block with one step subblock.
pub fn mix_gain_block(parameter_id: u64, gain_q78: i16) -> Vec<u8> {
    let mut payload = Vec::new();
    leb128(&mut payload, parameter_id);
    leb128(&mut payload, 0);
    payload.extend_from_slice(&gain_q78.to_be_bytes());
    obu(OBU_PARAMETER_BLOCK, &payload, None, false)
}

/// A demixing parameter block with one subblock.
pub fn demixing_block(parameter_id: u64, mode: u8) -> Vec<u8> {
    let mut payload = Vec::new();
    leb128(&mut payload, parameter_id);
    payload.push(mode << 5);
    obu(OBU_PARAMETER_BLOCK, &payload, None, false)
}

pub fn temporal_delimiter() -> Vec<u8> {
    obu(OBU_TEMPORAL_DELIMITER, &[], None, false)
}

/// An audio frame. `trim` is `(start, end)`.
pub fn audio_frame(substream_id: u64, data: &[u8], trim: Option<(u64, u64)>) -> Vec<u8> {
    if substream_id <= 17 {
        obu(OBU_AUDIO_FRAME_ID0 + substream_id as u8, data, trim, false)
    }
    else {
        let mut payload = Vec::new();
        leb128(&mut payload, substream_id);
        payload.extend_from_slice(data);
        obu(OBU_AUDIO_FRAME, &payload, trim, false)
    }
}

/// Packs interleaved 16-bit samples as little-endian bytes.
pub fn pcm16(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

/// Interleaves planar channels.
pub fn interleave(planes: &[&[i16]]) -> Vec<i16> {
    let len = planes.first().map_or(0, |p| p.len());
    (0..len).flat_map(|i| planes.iter().map(move |p| p[i])).collect()
}

/// Reads little-endian 16-bit output PCM.
pub fn read_s16(data: &[u8]) -> Vec<i16> {
    data.chunks_exact(2).map(|b| i16::from_le_bytes([b[0], b[1]])).collect()
}

/// Reads 32-bit float output PCM.
pub fn read_f32(data: &[u8]) -> Vec<f32> {
    data.chunks_exact(4).map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]])).collect()
}

/// A ramp of `len` samples starting at `start`.
pub fn ramp(start: i16, step: i16, len: usize) -> Vec<i16> {
    (0..len).map(|i| start + step * i as i16).collect()
}

/// The descriptors of a simple profile stream with one stereo element.
pub fn stereo_descriptors(frame_size: u32) -> Vec<u8> {
    let mut buf = sequence_header(0);
    buf.extend(lpcm_codec_config(0, frame_size));
    buf.extend(channel_element(10, 0, &[0], &[(1, 1, 1)]));
    buf.extend(mix_presentation(100, &[(10, 200)], 201, frame_size, -24 * 256));
    buf
}
