// IAMF-RS
// Copyright (c) 2024 The IAMF-RS Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use iamf_core::audio::SoundSystem;
use iamf_core::errors::{decode_error, limit_error, Result};
use iamf_core::io::ReadBytes;

use log::debug;

use crate::param::{q7_8, MixGainParamDefinition};

/// The maximum length of a string, including the terminating NUL.
const MAX_STRING_LEN: usize = 128;

/// Upper bound on the number of labels, sub-mixes, elements and layouts of a mix presentation.
const MAX_COUNT: u64 = 255;

fn read_count<B: ReadBytes>(reader: &mut B) -> Result<usize> {
    let count = reader.read_leb128()?;

    if count > MAX_COUNT {
        return limit_error("obu: mix presentation count too large");
    }

    Ok(count as usize)
}

/// Read a NUL-terminated UTF-8 string.
fn read_string<B: ReadBytes>(reader: &mut B) -> Result<String> {
    let mut buf = Vec::new();

    loop {
        let byte = reader.read_u8()?;

        if byte == 0 {
            break;
        }

        if buf.len() + 1 >= MAX_STRING_LEN {
            return decode_error("obu: string too long");
        }

        buf.push(byte);
    }

    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// How an audio element is rendered for headphones.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum HeadphonesRenderingMode {
    /// Render to stereo loudspeakers, world-locked.
    #[default]
    Stereo,
    /// Render binaurally, head-locked.
    Binaural,
    Reserved(u8),
}

impl HeadphonesRenderingMode {
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => HeadphonesRenderingMode::Stereo,
            1 => HeadphonesRenderingMode::Binaural,
            _ => HeadphonesRenderingMode::Reserved(code),
        }
    }
}

/// An audio element of a sub-mix.
#[derive(Clone, Debug, PartialEq)]
pub struct SubMixElement {
    pub audio_element_id: u64,
    pub annotations: Vec<String>,
    pub headphones_rendering_mode: HeadphonesRenderingMode,
    pub element_mix_gain: MixGainParamDefinition,
}

/// The playback layout a loudness measurement was made for.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LoudnessLayout {
    SoundSystem(SoundSystem),
    Binaural,
    Reserved,
}

/// A loudness measurement anchored to the content of one element.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct AnchoredLoudness {
    pub anchor_element: u8,
    /// Loudness in LKFS.
    pub anchored_loudness: f32,
}

/// Loudness information of a sub-mix rendered to a layout.
#[derive(Clone, Debug, PartialEq)]
pub struct LoudnessInfo {
    pub info_type: u8,
    /// Integrated loudness in LKFS.
    pub integrated_loudness: f32,
    /// Digital peak in dBFS.
    pub digital_peak: f32,
    /// True peak in dBTP.
    pub true_peak: Option<f32>,
    pub anchored_loudness: Vec<AnchoredLoudness>,
}

impl LoudnessInfo {
    const TRUE_PEAK: u8 = 0x01;
    const ANCHORED_LOUDNESS: u8 = 0x02;

    fn read<B: ReadBytes>(reader: &mut B) -> Result<LoudnessInfo> {
        let info_type = reader.read_u8()?;
        let integrated_loudness = q7_8(reader.read_be_i16()?);
        let digital_peak = q7_8(reader.read_be_i16()?);

        let true_peak = if info_type & LoudnessInfo::TRUE_PEAK != 0 {
            Some(q7_8(reader.read_be_i16()?))
        }
        else {
            None
        };

        let mut anchored_loudness = Vec::new();

        if info_type & LoudnessInfo::ANCHORED_LOUDNESS != 0 {
            let num_anchored_loudness = reader.read_u8()?;

            for _ in 0..num_anchored_loudness {
                let anchor_element = reader.read_u8()?;
                let loudness = q7_8(reader.read_be_i16()?);
                anchored_loudness
                    .push(AnchoredLoudness { anchor_element, anchored_loudness: loudness });
            }
        }

        // Other info types are extensions that carry a size.
        if info_type & 0xfc != 0 {
            let size = reader.read_leb128()?;
            reader.ignore_bytes(size)?;
        }

        Ok(LoudnessInfo {
            info_type,
            integrated_loudness,
            digital_peak,
            true_peak,
            anchored_loudness,
        })
    }
}

/// A layout of a sub-mix with its loudness information.
#[derive(Clone, Debug, PartialEq)]
pub struct SubMixLayout {
    pub layout: LoudnessLayout,
    pub loudness: LoudnessInfo,
}

impl SubMixLayout {
    fn read<B: ReadBytes>(reader: &mut B) -> Result<SubMixLayout> {
        let byte = reader.read_u8()?;

        let layout = match byte >> 6 {
            2 => match SoundSystem::from_code((byte >> 2) & 0xf) {
                Some(ss) => LoudnessLayout::SoundSystem(ss),
                None => LoudnessLayout::Reserved,
            },
            3 => LoudnessLayout::Binaural,
            _ => LoudnessLayout::Reserved,
        };

        let loudness = LoudnessInfo::read(reader)?;

        Ok(SubMixLayout { layout, loudness })
    }
}

/// A sub-mix of a mix presentation.
#[derive(Clone, Debug, PartialEq)]
pub struct SubMix {
    pub elements: Vec<SubMixElement>,
    pub output_mix_gain: MixGainParamDefinition,
    pub layouts: Vec<SubMixLayout>,
}

/// The mix presentation OBU.
#[derive(Clone, Debug, PartialEq)]
pub struct MixPresentation {
    pub mix_presentation_id: u64,
    pub language_labels: Vec<String>,
    pub annotations: Vec<String>,
    pub sub_mixes: Vec<SubMix>,
}

impl MixPresentation {
    pub fn read<B: ReadBytes>(reader: &mut B) -> Result<MixPresentation> {
        let mix_presentation_id = reader.read_leb128()?;

        let count_label = read_count(reader)?;

        let mut language_labels = Vec::with_capacity(count_label);
        for _ in 0..count_label {
            language_labels.push(read_string(reader)?);
        }

        let mut annotations = Vec::with_capacity(count_label);
        for _ in 0..count_label {
            annotations.push(read_string(reader)?);
        }

        let num_sub_mixes = read_count(reader)?;

        if num_sub_mixes == 0 {
            return decode_error("obu: mix presentation has no sub-mixes");
        }

        let mut sub_mixes = Vec::with_capacity(num_sub_mixes);

        for _ in 0..num_sub_mixes {
            let num_elements = read_count(reader)?;

            if num_elements == 0 {
                return decode_error("obu: sub-mix has no audio elements");
            }

            let mut elements = Vec::with_capacity(num_elements);

            for _ in 0..num_elements {
                let audio_element_id = reader.read_leb128()?;

                let mut annotations = Vec::with_capacity(count_label);
                for _ in 0..count_label {
                    annotations.push(read_string(reader)?);
                }

                let headphones_rendering_mode =
                    HeadphonesRenderingMode::from_code(reader.read_u8()? >> 6);

                let extension_size = reader.read_leb128()?;
                reader.ignore_bytes(extension_size)?;

                let element_mix_gain = MixGainParamDefinition::read(reader)?;

                elements.push(SubMixElement {
                    audio_element_id,
                    annotations,
                    headphones_rendering_mode,
                    element_mix_gain,
                });
            }

            let output_mix_gain = MixGainParamDefinition::read(reader)?;

            let num_layouts = read_count(reader)?;

            let mut layouts = Vec::with_capacity(num_layouts);
            for _ in 0..num_layouts {
                layouts.push(SubMixLayout::read(reader)?);
            }

            sub_mixes.push(SubMix { elements, output_mix_gain, layouts });
        }

        debug!(
            "mix presentation: id={}, sub_mixes={}, labels={:?}",
            mix_presentation_id,
            sub_mixes.len(),
            language_labels
        );

        Ok(MixPresentation { mix_presentation_id, language_labels, annotations, sub_mixes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use iamf_core::io::BufReader;

    #[test]
    fn verify_mix_presentation() {
        let mut buf = vec![
            0x2a, // id
            0x01, // one label
        ];
        buf.extend_from_slice(b"en-us\0");
        buf.extend_from_slice(b"Main\0");
        buf.extend_from_slice(&[0x01, 0x01, 0x0a]); // one sub-mix, one element with id 10
        buf.extend_from_slice(b"Dialog\0");
        buf.extend_from_slice(&[0x40, 0x00]); // binaural, no extension
        // element mix gain -3 dB
        buf.extend_from_slice(&[0x07, 0x01, 0x00, 0x01, 0x01, 0xfd, 0x00]);
        // output mix gain 0 dB
        buf.extend_from_slice(&[0x08, 0x01, 0x00, 0x01, 0x01, 0x00, 0x00]);
        buf.extend_from_slice(&[0x02]); // 2 layouts
        buf.extend_from_slice(&[0x80, 0x01, 0xe8, 0x00, 0xff, 0x00, 0xfe, 0x80]); // A, true peak
        buf.extend_from_slice(&[0xc0, 0x00, 0xe7, 0x00, 0x00, 0x00]); // binaural

        let mix = MixPresentation::read(&mut BufReader::new(&buf)).unwrap();

        assert_eq!(mix.mix_presentation_id, 42);
        assert_eq!(mix.language_labels, vec!["en-us".to_string()]);
        assert_eq!(mix.annotations, vec!["Main".to_string()]);

        let sub_mix = &mix.sub_mixes[0];
        assert_eq!(sub_mix.elements[0].audio_element_id, 10);
        assert_eq!(sub_mix.elements[0].annotations, vec!["Dialog".to_string()]);
        assert_eq!(
            sub_mix.elements[0].headphones_rendering_mode,
            HeadphonesRenderingMode::Binaural
        );
        assert_eq!(sub_mix.elements[0].element_mix_gain.default_mix_gain, -3.0);
        assert_eq!(sub_mix.output_mix_gain.base.parameter_id, 8);

        assert_eq!(sub_mix.layouts.len(), 2);
        assert_eq!(sub_mix.layouts[0].layout, LoudnessLayout::SoundSystem(SoundSystem::A));
        assert_eq!(sub_mix.layouts[0].loudness.integrated_loudness, -24.0);
        assert_eq!(sub_mix.layouts[0].loudness.digital_peak, -1.0);
        assert_eq!(sub_mix.layouts[0].loudness.true_peak, Some(-1.5));
        assert_eq!(sub_mix.layouts[1].layout, LoudnessLayout::Binaural);
        assert_eq!(sub_mix.layouts[1].loudness.integrated_loudness, -25.0);
    }

    #[test]
    fn verify_string_too_long() {
        let mut buf = vec![0x01, 0x01];
        buf.extend_from_slice(&[b'a'; 200]);
        buf.push(0);

        assert!(MixPresentation::read(&mut BufReader::new(&buf)).is_err());
    }
}
