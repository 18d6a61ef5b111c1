// IAMF-RS
// Copyright (c) 2024 The IAMF-RS Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

mod common;

use iamf_core::audio::{OutputLayout, SoundSystem};
use iamf_core::conv::SampleFormat;
use iamf_core::errors::Error;
use iamf_core::units::TimeBase;
use iamf_decoder::{DecodeStatus, DecoderOptions, DecoderState, IamfDecoder};

use common::*;

const FRAME_SIZE: u32 = 64;

fn temporal_unit(left: &[i16], right: &[i16], trim: Option<(u64, u64)>) -> Vec<u8> {
    let mut buf = temporal_delimiter();
    buf.extend(audio_frame(0, &pcm16(&interleave(&[left, right])), trim));
    buf
}

#[test]
fn verify_stereo_passthrough() {
    let registry = registry();
    let mut decoder = IamfDecoder::new(&registry, DecoderOptions::default());

    assert_eq!(decoder.state(), DecoderState::Uninit);

    let descriptors = stereo_descriptors(FRAME_SIZE);
    assert_eq!(decoder.configure(&descriptors).unwrap(), descriptors.len());
    assert_eq!(decoder.state(), DecoderState::Run);

    let info = decoder.stream_info().unwrap();
    assert_eq!(info.mix_presentation_id, 100);
    assert_eq!(info.channels, 2);
    assert_eq!(info.sampling_rate, SAMPLE_RATE);
    assert_eq!(info.frame_size, FRAME_SIZE as usize);
    assert_eq!(info.mix_presentations, vec![100]);

    let left = ramp(-8000, 200, FRAME_SIZE as usize);
    let right = ramp(8000, -100, FRAME_SIZE as usize);

    let mut stream = temporal_unit(&left, &right, None);
    stream.extend(temporal_unit(&right, &left, None));

    let mut pos = 0;
    let mut outputs = Vec::new();

    while pos < stream.len() {
        let decoded = decoder.decode(&stream[pos..]).unwrap();
        assert_eq!(decoded.status, DecodeStatus::Frame { samples: FRAME_SIZE as usize });

        pos += decoded.consumed;
        outputs.push(decoder.last_decoded().clone());
    }

    assert_eq!(outputs.len(), 2);

    assert_eq!(outputs[0].pts, 0);
    assert_eq!(outputs[1].pts, u64::from(FRAME_SIZE));

    for output in outputs.iter() {
        assert_eq!(output.channels, 2);
        assert_eq!(output.format, SampleFormat::S16);
    }

    assert_eq!(read_s16(&outputs[0].data), interleave(&[&left, &right]));
    assert_eq!(read_s16(&outputs[1].data), interleave(&[&right, &left]));
}

#[test]
fn verify_trimmed_frame() {
    let registry = registry();
    let mut decoder = IamfDecoder::new(&registry, DecoderOptions::default());

    decoder.configure(&stereo_descriptors(1024)).unwrap();

    let left = ramp(0, 16, 1024);
    let right = ramp(0, -16, 1024);

    let decoded = decoder.decode(&temporal_unit(&left, &right, Some((100, 50)))).unwrap();
    assert_eq!(decoded.status, DecodeStatus::Frame { samples: 874 });

    let output = decoder.last_decoded();
    assert_eq!(output.samples, 874);
    assert_eq!(read_s16(&output.data), interleave(&[&left[100..974], &right[100..974]]));
}

#[test]
fn verify_pts_follows_time_base() {
    let registry = registry();
    let mut decoder = IamfDecoder::new(&registry, DecoderOptions::default());

    decoder.configure(&stereo_descriptors(960)).unwrap();
    decoder.set_pts(5_000, TimeBase::new(1, 1_000).unwrap());

    let silence = vec![0; 960];

    let mut pts = Vec::new();
    for _ in 0..3 {
        decoder.decode(&temporal_unit(&silence, &silence, None)).unwrap();
        pts.push(decoder.last_decoded().pts);
    }

    // 960 samples at 48 kHz are 20 ms.
    assert_eq!(pts, vec![5_000, 5_020, 5_040]);
}

#[test]
fn verify_partial_temporal_unit() {
    let registry = registry();
    let mut decoder = IamfDecoder::new(&registry, DecoderOptions::default());

    decoder.configure(&stereo_descriptors(FRAME_SIZE)).unwrap();

    let left = ramp(100, 1, FRAME_SIZE as usize);
    let unit = temporal_unit(&left, &left, None);

    // The input ends inside the audio frame. Only the temporal delimiter is consumed.
    let split = unit.len() - 10;
    let decoded = decoder.decode(&unit[..split]).unwrap();

    assert_eq!(decoded.status, DecodeStatus::NeedMoreData);
    assert_eq!(decoded.consumed, temporal_delimiter().len());

    let decoded = decoder.decode(&unit[decoded.consumed..]).unwrap();
    assert_eq!(decoded.status, DecodeStatus::Frame { samples: FRAME_SIZE as usize });
    assert_eq!(read_s16(&decoder.last_decoded().data), interleave(&[&left, &left]));
}

#[test]
fn verify_configure_stops_at_first_frame() {
    let registry = registry();
    let mut decoder = IamfDecoder::new(&registry, DecoderOptions::default());

    let descriptors = stereo_descriptors(FRAME_SIZE);
    let silence = vec![0; FRAME_SIZE as usize];

    let mut stream = descriptors.clone();
    stream.extend(temporal_unit(&silence, &silence, None));

    assert_eq!(decoder.configure(&stream).unwrap(), descriptors.len());
    assert_eq!(decoder.state(), DecoderState::Run);

    let decoded = decoder.decode(&stream[descriptors.len()..]).unwrap();
    assert_eq!(decoded.consumed, stream.len() - descriptors.len());
}

#[test]
fn verify_incomplete_descriptors() {
    let registry = registry();
    let mut decoder = IamfDecoder::new(&registry, DecoderOptions::default());

    let mut descriptors = sequence_header(0);
    descriptors.extend(lpcm_codec_config(0, FRAME_SIZE));

    decoder.configure(&descriptors).unwrap();
    assert_eq!(decoder.state(), DecoderState::Init);

    assert!(matches!(decoder.decode(&temporal_delimiter()), Err(Error::InvalidState(_))));
    assert!(decoder.stream_info().is_err());
}

#[test]
fn verify_oversized_frames_are_rejected() {
    let registry = registry();
    let mut decoder = IamfDecoder::new(&registry, DecoderOptions::default());

    let result = decoder.configure(&stereo_descriptors(u32::MAX));
    assert!(matches!(result, Err(Error::LimitError(_))));
    assert_ne!(decoder.state(), DecoderState::Run);
}

#[test]
fn verify_unsupported_sound_systems() {
    let registry = registry();

    for ss in [SoundSystem::E, SoundSystem::F, SoundSystem::G, SoundSystem::H, SoundSystem::Ext13]
    {
        let options =
            DecoderOptions { output_layout: OutputLayout::SoundSystem(ss), ..Default::default() };
        let mut decoder = IamfDecoder::new(&registry, options);

        let result = decoder.configure(&stereo_descriptors(FRAME_SIZE));
        assert!(matches!(result, Err(Error::Unsupported(_))));
        assert!(decoder.stream_info().is_err());
    }
}

#[test]
fn verify_output_formats() {
    let registry = registry();
    let options = DecoderOptions { bit_depth: SampleFormat::F32, ..Default::default() };
    let mut decoder = IamfDecoder::new(&registry, options);

    decoder.configure(&stereo_descriptors(FRAME_SIZE)).unwrap();

    let left = ramp(-3200, 100, FRAME_SIZE as usize);
    let right = ramp(1600, 10, FRAME_SIZE as usize);

    decoder.decode(&temporal_unit(&left, &right, None)).unwrap();

    let expected: Vec<f32> =
        interleave(&[&left, &right]).iter().map(|&s| f32::from(s) / 32_768.0).collect();
    assert_eq!(read_f32(&decoder.last_decoded().data), expected);

    // The sample format changes without a reconfiguration.
    decoder.set_bit_depth(SampleFormat::S24);
    assert_eq!(decoder.state(), DecoderState::Run);

    decoder.decode(&temporal_unit(&left, &right, None)).unwrap();

    let output = decoder.last_decoded();
    assert_eq!(output.format, SampleFormat::S24);
    assert_eq!(output.data.len(), 3 * 2 * FRAME_SIZE as usize);
}

#[test]
fn verify_redundant_descriptors_are_ignored() {
    let registry = registry();
    let mut decoder = IamfDecoder::new(&registry, DecoderOptions::default());

    decoder.configure(&stereo_descriptors(FRAME_SIZE)).unwrap();

    let left = ramp(0, 3, FRAME_SIZE as usize);

    // A redundant sequence header ahead of a temporal unit does not reset the decoder.
    let mut payload = b"iamf".to_vec();
    payload.extend_from_slice(&[0, 0]);

    let mut stream = obu(31, &payload, None, true);
    stream.extend(temporal_unit(&left, &left, None));

    let decoded = decoder.decode(&stream).unwrap();
    assert_eq!(decoded.status, DecodeStatus::Frame { samples: FRAME_SIZE as usize });
    assert_eq!(decoded.consumed, stream.len());
}
