// IAMF-RS
// Copyright (c) 2024 The IAMF-RS Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

mod common;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use iamf_core::conv::SampleFormat;
use iamf_core::errors::Error;
use iamf_decoder::{DecodeStatus, DecoderOptions, DecoderState, IamfDecoder};

use common::*;

const FRAME_SIZE: usize = 256;

fn float_options() -> DecoderOptions {
    DecoderOptions { bit_depth: SampleFormat::F32, ..Default::default() }
}

fn noise(rng: &mut SmallRng, len: usize) -> Vec<i16> {
    (0..len).map(|_| rng.random_range(-8_000..8_000)).collect()
}

/// Descriptors of a base profile stream with two stereo elements, 10 and 11, on substreams 0
/// and 1. Mix presentation 100 lists the elements in order, 101 in reverse order.
fn two_element_descriptors() -> Vec<u8> {
    let mut buf = sequence_header(1);
    buf.extend(lpcm_codec_config(0, FRAME_SIZE as u32));
    buf.extend(channel_element(10, 0, &[0], &[(1, 1, 1)]));
    buf.extend(channel_element(11, 0, &[1], &[(1, 1, 1)]));
    buf.extend(mix_presentation(100, &[(10, 200), (11, 201)], 202, FRAME_SIZE as u32, -24 * 256));
    buf.extend(mix_presentation(101, &[(11, 300), (10, 301)], 302, FRAME_SIZE as u32, -24 * 256));
    buf
}

fn two_element_unit(a: &[i16], b: &[i16]) -> Vec<u8> {
    let mut buf = temporal_delimiter();
    buf.extend(audio_frame(0, &pcm16(a), None));
    buf.extend(audio_frame(1, &pcm16(b), None));
    buf
}

/// Decodes a stream of back-to-back temporal units into float samples.
fn decode_all(decoder: &mut IamfDecoder<'_>, stream: &[u8]) -> Vec<f32> {
    let mut pos = 0;
    let mut samples = Vec::new();

    while pos < stream.len() {
        let decoded = decoder.decode(&stream[pos..]).unwrap();
        pos += decoded.consumed;

        if let DecodeStatus::Frame { .. } = decoded.status {
            samples.extend(read_f32(&decoder.last_decoded().data));
        }
    }

    samples
}

#[test]
fn verify_mix_is_independent_of_element_order() {
    let mut rng = SmallRng::seed_from_u64(0x5eed);
    let registry = registry();

    let mut stream = Vec::new();
    for _ in 0..4 {
        let a = noise(&mut rng, 2 * FRAME_SIZE);
        let b = noise(&mut rng, 2 * FRAME_SIZE);
        stream.extend(two_element_unit(&a, &b));
    }

    let mut forward = IamfDecoder::new(&registry, float_options());
    forward.configure(&two_element_descriptors()).unwrap();
    assert_eq!(forward.stream_info().unwrap().mix_presentations, vec![100, 101]);

    let options = DecoderOptions { mix_presentation_id: Some(101), ..float_options() };
    let mut reverse = IamfDecoder::new(&registry, options);
    reverse.configure(&two_element_descriptors()).unwrap();
    assert_eq!(reverse.stream_info().unwrap().mix_presentation_id, 101);

    let forward = decode_all(&mut forward, &stream);
    let reverse = decode_all(&mut reverse, &stream);

    assert_eq!(forward.len(), 4 * 2 * FRAME_SIZE);
    assert_eq!(forward, reverse);
}

#[test]
fn verify_elements_are_summed() {
    let registry = registry();
    let mut decoder = IamfDecoder::new(&registry, float_options());

    decoder.configure(&two_element_descriptors()).unwrap();

    let a = vec![4096; 2 * FRAME_SIZE];
    let b = vec![-1024; 2 * FRAME_SIZE];

    let output = decode_all(&mut decoder, &two_element_unit(&a, &b));
    assert!(output.iter().all(|&s| s == 0.09375));
}

#[test]
fn verify_element_mix_gain() {
    let registry = registry();
    let mut decoder = IamfDecoder::new(&registry, float_options());

    decoder.configure(&two_element_descriptors()).unwrap();

    let a = vec![8192; 2 * FRAME_SIZE];
    let b = vec![0; 2 * FRAME_SIZE];

    // -6.02 dB on element 10. The gain holds after the block ends.
    let mut stream = temporal_delimiter();
    stream.extend(mix_gain_block(200, -1541));
    stream.extend(audio_frame(0, &pcm16(&a), None));
    stream.extend(audio_frame(1, &pcm16(&b), None));
    stream.extend(two_element_unit(&a, &b));

    let output = decode_all(&mut decoder, &stream);
    let (first, second) = output.split_at(2 * FRAME_SIZE);

    assert!(first.iter().all(|&s| (s - 0.125).abs() < 1e-3));
    assert_eq!(first, second);
}

#[test]
fn verify_output_mix_gain() {
    let registry = registry();
    let mut decoder = IamfDecoder::new(&registry, float_options());

    decoder.configure(&two_element_descriptors()).unwrap();

    let a = vec![8192; 2 * FRAME_SIZE];
    let b = vec![8192; 2 * FRAME_SIZE];

    let mut stream = temporal_delimiter();
    stream.extend(mix_gain_block(202, -1541));
    stream.extend(audio_frame(0, &pcm16(&a), None));
    stream.extend(audio_frame(1, &pcm16(&b), None));

    let output = decode_all(&mut decoder, &stream);
    assert!(output.iter().all(|&s| (s - 0.25).abs() < 1e-3));
}

#[test]
fn verify_parameter_of_other_presentation_is_ignored() {
    let registry = registry();
    let mut decoder = IamfDecoder::new(&registry, float_options());

    decoder.configure(&two_element_descriptors()).unwrap();

    let a = vec![8192; 2 * FRAME_SIZE];
    let b = vec![0; 2 * FRAME_SIZE];

    // Parameter 300 belongs to mix presentation 101.
    let mut stream = temporal_delimiter();
    stream.extend(mix_gain_block(300, -1541));
    stream.extend(audio_frame(0, &pcm16(&a), None));
    stream.extend(audio_frame(1, &pcm16(&b), None));

    let output = decode_all(&mut decoder, &stream);
    assert!(output.iter().all(|&s| s == 0.25));
}

#[test]
fn verify_mix_presentation_switch() {
    let registry = registry();
    let mut decoder = IamfDecoder::new(&registry, float_options());

    decoder.configure(&two_element_descriptors()).unwrap();
    assert_eq!(decoder.stream_info().unwrap().mix_presentation_id, 100);

    let a = vec![8192; 2 * FRAME_SIZE];
    let b = vec![0; 2 * FRAME_SIZE];

    // Parameter 301 is the mix gain of element 10 in mix presentation 101.
    let unit = || {
        let mut buf = temporal_delimiter();
        buf.extend(mix_gain_block(301, -1541));
        buf.extend(audio_frame(0, &pcm16(&a), None));
        buf.extend(audio_frame(1, &pcm16(&b), None));
        buf
    };

    let output = decode_all(&mut decoder, &unit());
    assert!(output.iter().all(|&s| s == 0.25));

    decoder.set_mix_presentation_id(101);
    assert_eq!(decoder.state(), DecoderState::Reconfigure);

    let output = decode_all(&mut decoder, &unit());
    assert_eq!(decoder.state(), DecoderState::Run);
    assert_eq!(decoder.stream_info().unwrap().mix_presentation_id, 101);
    assert!(output.iter().all(|&s| (s - 0.125).abs() < 1e-3));

    // Selecting the decoded presentation again does not reconfigure.
    decoder.set_mix_presentation_id(101);
    assert_eq!(decoder.state(), DecoderState::Run);
}

#[test]
fn verify_loudness_normalization() {
    let registry = registry();
    let options = DecoderOptions { normalization_loudness: Some(-30.0), ..float_options() };
    let mut decoder = IamfDecoder::new(&registry, options);

    decoder.configure(&stereo_descriptors(FRAME_SIZE as u32)).unwrap();

    let data = vec![16_384; 2 * FRAME_SIZE];

    let mut stream = temporal_delimiter();
    stream.extend(audio_frame(0, &pcm16(&data), None));

    // The program is signalled at -24 LKFS.
    let output = decode_all(&mut decoder, &stream);
    let gain = 10f32.powf(-6.0 / 20.0);
    assert!(output.iter().all(|&s| (s - 0.5 * gain).abs() < 1e-4));
}

#[test]
fn verify_codec_error_drops_temporal_unit() {
    let registry = registry();
    let mut decoder = IamfDecoder::new(&registry, DecoderOptions::default());

    let mut descriptors = sequence_header(0);
    descriptors.extend(lpcm_codec_config(0, FRAME_SIZE as u32));
    descriptors.extend(channel_element(10, 0, &[0, 1, 2, 3], &[(2, 4, 2)]));
    descriptors.extend(mix_presentation(100, &[(10, 200)], 201, FRAME_SIZE as u32, -24 * 256));

    decoder.configure(&descriptors).unwrap();

    let unit = |center_len: usize| {
        let mut buf = temporal_delimiter();
        buf.extend(audio_frame(0, &pcm16(&vec![0; 2 * FRAME_SIZE]), None));
        buf.extend(audio_frame(1, &pcm16(&vec![0; 2 * FRAME_SIZE]), None));
        buf.extend(audio_frame(2, &pcm16(&vec![0; center_len]), None));
        buf.extend(audio_frame(3, &pcm16(&vec![0; FRAME_SIZE]), None));
        buf
    };

    // The center substream is shorter than the others.
    let broken = unit(FRAME_SIZE / 2);
    let decoded = decoder.decode(&broken).unwrap();

    assert_eq!(decoded.status, DecodeStatus::Dropped);
    assert_eq!(decoded.consumed, broken.len());
    assert_eq!(decoder.state(), DecoderState::Run);

    let decoded = decoder.decode(&unit(FRAME_SIZE)).unwrap();
    assert_eq!(decoded.status, DecodeStatus::Frame { samples: FRAME_SIZE });
}

#[test]
fn verify_temporal_unit_ends_at_delimiter() {
    let registry = registry();
    let mut decoder = IamfDecoder::new(&registry, DecoderOptions::default());

    decoder.configure(&two_element_descriptors()).unwrap();

    let data = pcm16(&vec![0; 2 * FRAME_SIZE]);

    // The second element is missing from the first temporal unit.
    let mut first = temporal_delimiter();
    first.extend(audio_frame(0, &data, None));

    let mut stream = first.clone();
    stream.extend(two_element_unit(&[0; 2 * FRAME_SIZE], &[0; 2 * FRAME_SIZE]));

    let decoded = decoder.decode(&stream).unwrap();
    assert_eq!(decoded.status, DecodeStatus::Dropped);
    assert_eq!(decoded.consumed, first.len());

    let decoded = decoder.decode(&stream[first.len()..]).unwrap();
    assert_eq!(decoded.status, DecodeStatus::Frame { samples: FRAME_SIZE });
}

#[test]
fn verify_unknown_mix_presentation() {
    let registry = registry();
    let options = DecoderOptions { mix_presentation_id: Some(7), ..Default::default() };
    let mut decoder = IamfDecoder::new(&registry, options);

    assert!(matches!(
        decoder.configure(&stereo_descriptors(FRAME_SIZE as u32)),
        Err(Error::ConfigError(_))
    ));
}

#[test]
fn verify_too_many_elements_for_profile() {
    let registry = registry();
    let mut decoder = IamfDecoder::new(&registry, DecoderOptions::default());

    // Two elements in a simple profile stream.
    let mut descriptors = sequence_header(0);
    descriptors.extend_from_slice(&two_element_descriptors()[sequence_header(1).len()..]);

    assert!(matches!(decoder.configure(&descriptors), Err(Error::ConfigError(_))));
}

#[test]
fn verify_resampled_output() {
    let registry = registry();
    let options = DecoderOptions { sampling_rate: Some(16_000), ..Default::default() };
    let mut decoder = IamfDecoder::new(&registry, options);

    decoder.configure(&stereo_descriptors(960)).unwrap();
    assert_eq!(decoder.stream_info().unwrap().sampling_rate, 16_000);

    let data = pcm16(&vec![1000; 2 * 960]);

    for _ in 0..3 {
        let mut unit = temporal_delimiter();
        unit.extend(audio_frame(0, &data, None));

        let decoded = decoder.decode(&unit).unwrap();
        assert_eq!(decoded.status, DecodeStatus::Frame { samples: 320 });
        assert_eq!(decoder.last_decoded().channels, 2);
    }

    assert!(decoder.flush().is_ok());
}
