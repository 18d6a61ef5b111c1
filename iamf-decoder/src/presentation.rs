// IAMF-RS
// Copyright (c) 2024 The IAMF-RS Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The active mix presentation: every element pipeline and the output chain of one
//! configuration of the decoder.

use hashbrown::{HashMap, HashSet};
use log::{debug, info, warn};
use smallvec::SmallVec;

use iamf_core::audio::OutputLayout;
use iamf_core::codecs::registry::CodecRegistry;
use iamf_core::errors::{codec_error, config_error, invalid_state_error, unsupported_error};
use iamf_core::errors::Result;
use iamf_format_obu::param::db_to_linear;
use iamf_format_obu::{AudioFrame, LoudnessLayout, MixPresentation, RawParameterBlock, SubMix};

use crate::database::{Database, DescriptorFlags};
use crate::frame::Frame;
use crate::limiter::Limiter;
use crate::mixer::Mixer;
use crate::options::DecoderOptions;
use crate::parameters::{MixGainUnit, ParameterTimeline};
use crate::render::StreamRenderer;
use crate::resampler::Resampler;
use crate::stream::{build_stream, IamfStream};
use crate::stream_decoder::{FrameParams, StreamDecoder};

/// The decode and render pipeline of one audio element.
struct ElementPipeline {
    stream: IamfStream,
    decoder: StreamDecoder,
    renderer: StreamRenderer,
    rendered: Frame,
}

/// Gets the loudness of a sub-mix when rendered to `output`. If the sub-mix does not signal
/// loudness for the output layout, the loudness of its first layout is used.
pub fn program_loudness(sub_mix: &SubMix, output: OutputLayout) -> Option<f32> {
    let matches = |layout: &LoudnessLayout| match (layout, output) {
        (LoudnessLayout::SoundSystem(a), OutputLayout::SoundSystem(b)) => *a == b,
        (LoudnessLayout::Binaural, OutputLayout::Binaural) => true,
        _ => false,
    };

    sub_mix
        .layouts
        .iter()
        .find(|entry| matches(&entry.layout))
        .or_else(|| sub_mix.layouts.first())
        .map(|entry| entry.loudness.integrated_loudness)
}

/// Gets the linear gain that brings `loudness` to `target`, both in LKFS.
pub fn loudness_gain(target: f32, loudness: f32) -> f32 {
    db_to_linear(target - loudness)
}

fn select_mix_presentation<'a>(db: &'a Database, id: Option<u64>) -> Result<&'a MixPresentation> {
    match id {
        Some(id) => match db.mix_presentation(id) {
            Some(mix) => Ok(mix),
            None => {
                warn!("mix presentation {} does not exist", id);
                config_error("decoder: unknown mix presentation")
            }
        },
        None => match db.mix_presentations().first() {
            Some(mix) => Ok(mix),
            None => config_error("decoder: no mix presentation"),
        },
    }
}

/// Copies the samples of `src` that remain after trimming into `dst`.
fn copy_trimmed(src: &Frame, dst: &mut Frame) {
    let start = src.strim.min(src.samples());
    let len = src.trimmed_len();

    dst.set_samples(len);
    for (ch, plane) in src.planes().enumerate() {
        dst.plane_mut(ch).copy_from_slice(&plane[start..start + len]);
    }
}

/// An instantiated mix presentation.
pub struct Presentation {
    mix_presentation_id: u64,
    output_layout: OutputLayout,
    elements: Vec<ElementPipeline>,
    /// Every substream of the elements of the presentation, decoded or not.
    substream_ids: Vec<u64>,
    output_mix_gain_id: u64,
    timeline: ParameterTimeline,
    mixer: Mixer,
    resampler: Option<Resampler>,
    loudness_gain: f32,
    limiter: Limiter,
    sample_rate: u32,
    output_sample_rate: u32,
    frame_size: usize,
    channels: usize,
    /// The number of samples per channel of the last decoded temporal unit, before trimming.
    decoded_samples: usize,
    output: Frame,
}

impl Presentation {
    /// Instantiates a mix presentation of the database for the options.
    ///
    /// Either the whole presentation is built or nothing is.
    pub fn build(
        db: &Database,
        registry: &CodecRegistry,
        options: &DecoderOptions,
    ) -> Result<Self> {
        if !db.flags().contains(DescriptorFlags::CONFIG) {
            return invalid_state_error("decoder: viewers were not built");
        }

        let mix = select_mix_presentation(db, options.mix_presentation_id)?;

        let sub_mix = match mix.sub_mixes.first() {
            Some(sub_mix) => sub_mix,
            None => return config_error("decoder: mix presentation has no sub-mix"),
        };

        if mix.sub_mixes.len() > 1 {
            debug!(
                "mix presentation {}: rendering the first of {} sub-mixes",
                mix.mix_presentation_id,
                mix.sub_mixes.len()
            );
        }

        if let Some(profile) = db.profile() {
            if sub_mix.elements.len() > profile.max_audio_elements() {
                warn!(
                    "mix presentation {} has {} audio elements, the {} profile allows {}",
                    mix.mix_presentation_id,
                    sub_mix.elements.len(),
                    profile,
                    profile.max_audio_elements()
                );
                return config_error("decoder: too many audio elements for the profile");
            }
        }

        let channels = match options.output_layout.channel_count() {
            Some(channels) => channels,
            None => {
                warn!("cannot render to {:?}", options.output_layout);
                return unsupported_error(
                    "decoder: sound systems E, F, G, H and 9.1.6 are not supported outputs",
                );
            }
        };

        let mut elements: Vec<ElementPipeline> = Vec::with_capacity(sub_mix.elements.len());
        let mut substream_ids = Vec::new();

        for sub_element in sub_mix.elements.iter() {
            let entry = match db.element(sub_element.audio_element_id) {
                Some(entry) => entry,
                None => return config_error("decoder: unknown audio element"),
            };

            let stream = build_stream(
                entry,
                sub_element,
                options.output_layout,
                options.headphones_rendering_mode,
            )?;

            if let Some(first) = elements.first() {
                if first.stream.sample_rate != stream.sample_rate
                    || first.stream.max_frame_size != stream.max_frame_size
                {
                    return config_error("decoder: audio elements differ in rate or frame size");
                }
            }

            let decoder = StreamDecoder::try_new(&stream, registry)?;

            let renderer = StreamRenderer::new(
                stream.layout,
                stream.target,
                stream.sample_rate,
                stream.max_frame_size,
            );

            if renderer.channel_count() != channels {
                return config_error("decoder: rendered channel count mismatch");
            }

            substream_ids.extend_from_slice(&entry.element.substream_ids);

            let rendered = Frame::new(channels, stream.max_frame_size);

            elements.push(ElementPipeline { stream, decoder, renderer, rendered });
        }

        let (sample_rate, frame_size) = match elements.first() {
            Some(first) => (first.stream.sample_rate, first.stream.max_frame_size),
            None => return config_error("decoder: sub-mix has no audio elements"),
        };

        let output_mix_gain_id = sub_mix.output_mix_gain.base.parameter_id;

        // Only the parameters of this presentation follow their parameter blocks.
        let mut used = HashSet::new();
        used.insert(output_mix_gain_id);

        for pipeline in elements.iter() {
            used.insert(pipeline.stream.element_mix_gain_id);
            used.extend(pipeline.stream.demixing_id);
            used.extend(pipeline.stream.recon_gain_id);
        }

        let mut timeline = ParameterTimeline::new(sample_rate);

        for (id, info) in db.params() {
            timeline.add(id, info.clone(), used.contains(&id));
        }

        let output_sample_rate = options.sampling_rate.unwrap_or(sample_rate);

        let resampler = if output_sample_rate != sample_rate {
            Some(Resampler::try_new(sample_rate, output_sample_rate, frame_size, channels)?)
        }
        else {
            None
        };

        let loudness_gain = match options.normalization_loudness {
            Some(target) => match program_loudness(sub_mix, options.output_layout) {
                Some(loudness) => {
                    debug!("normalizing program loudness {} LKFS to {} LKFS", loudness, target);
                    loudness_gain(target, loudness)
                }
                None => {
                    warn!("mix presentation has no loudness information, not normalizing");
                    1.0
                }
            },
            None => 1.0,
        };

        info!(
            "mix presentation {}: {} audio elements, {} channels, {} Hz to {} Hz, frame size {}",
            mix.mix_presentation_id,
            elements.len(),
            channels,
            sample_rate,
            output_sample_rate,
            frame_size
        );

        Ok(Presentation {
            mix_presentation_id: mix.mix_presentation_id,
            output_layout: options.output_layout,
            elements,
            substream_ids,
            output_mix_gain_id,
            timeline,
            mixer: Mixer::new(channels, frame_size),
            resampler,
            loudness_gain,
            limiter: Limiter::new(&options.limiter, output_sample_rate),
            sample_rate,
            output_sample_rate,
            frame_size,
            channels,
            decoded_samples: 0,
            output: Frame::new(channels, 2 * frame_size),
        })
    }

    pub fn mix_presentation_id(&self) -> u64 {
        self.mix_presentation_id
    }

    pub fn output_layout(&self) -> OutputLayout {
        self.output_layout
    }

    /// Gets the number of output channels.
    pub fn channel_count(&self) -> usize {
        self.channels
    }

    /// Gets the sample rate of the coded audio.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn output_sample_rate(&self) -> u32 {
        self.output_sample_rate
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Gets the number of samples per channel of the last decoded temporal unit, before
    /// trimming and resampling.
    pub fn decoded_samples(&self) -> usize {
        self.decoded_samples
    }

    /// Gets the ids of all substreams of a temporal unit.
    pub fn substream_ids(&self) -> &[u64] {
        &self.substream_ids
    }

    pub fn has_substream(&self, id: u64) -> bool {
        self.substream_ids.contains(&id)
    }

    /// Queues a parameter block that starts at `ts`.
    pub fn push_parameter(&mut self, raw: &RawParameterBlock, ts: u64) -> Result<()> {
        self.timeline.push(raw, ts)
    }

    /// Decodes the audio frames of one temporal unit that starts at `ts` into output samples.
    ///
    /// The output may hold fewer samples than the frame, or none, while the resampler fills.
    pub fn decode(&mut self, frames: &HashMap<u64, AudioFrame>, ts: u64) -> Result<&Frame> {
        let timeline = &mut self.timeline;

        for pipeline in self.elements.iter_mut() {
            let mut packets: SmallVec<[&[u8]; 8]> = SmallVec::new();

            for id in pipeline.stream.substream_ids.iter() {
                match frames.get(id) {
                    Some(frame) => packets.push(&frame.data),
                    None => {
                        warn!("element {}: missing substream {}", pipeline.stream.element_id, id);
                        return codec_error("decoder: missing substream");
                    }
                }
            }

            // The trimming of the temporal unit is carried by the first substream.
            let first = pipeline.stream.substream_ids.first().and_then(|id| frames.get(id));

            let (strim, etrim) = match first {
                Some(frame) => (frame.trim_start as usize, frame.trim_end as usize),
                None => (0, 0),
            };

            pipeline.decoder.receive_packet(&packets, strim, etrim)?;

            let demixing_mode = match pipeline.stream.demixing_id {
                Some(id) => timeline.demixing_mode(id, ts),
                None => None,
            };

            let recon_gains = match pipeline.stream.recon_gain_id {
                Some(id) => timeline.recon_gain(id, ts),
                None => None,
            };

            let params = FrameParams { demixing_mode, recon_gains };

            let frame = pipeline.decoder.decode(&params, ts)?;

            pipeline.renderer.render(frame, &mut pipeline.rendered);
        }

        let samples = match self.elements.first() {
            Some(first) => first.rendered.samples(),
            None => return invalid_state_error("decoder: presentation has no elements"),
        };

        self.decoded_samples = samples;

        let gains: Vec<MixGainUnit> = self
            .elements
            .iter()
            .map(|pipeline| timeline.mix_gain(pipeline.stream.element_mix_gain_id, ts, samples))
            .collect();

        let output_gain = timeline.mix_gain(self.output_mix_gain_id, ts, samples);

        let inputs: Vec<(&Frame, &MixGainUnit)> =
            self.elements.iter().map(|pipeline| &pipeline.rendered).zip(gains.iter()).collect();

        let mixed = self.mixer.mix(&inputs, &output_gain)?;

        match self.resampler.as_mut() {
            Some(resampler) => copy_trimmed(resampler.push(mixed)?, &mut self.output),
            None => copy_trimmed(mixed, &mut self.output),
        }

        self.output.pts = ts;
        self.finish();

        Ok(&self.output)
    }

    /// Drains the resampler.
    pub fn flush(&mut self) -> Result<&Frame> {
        match self.resampler.as_mut() {
            Some(resampler) => copy_trimmed(resampler.flush()?, &mut self.output),
            None => self.output.set_samples(0),
        }

        self.finish();

        Ok(&self.output)
    }

    /// Resets all state carried between temporal units.
    pub fn reset(&mut self) {
        for pipeline in self.elements.iter_mut() {
            pipeline.decoder.reset();
            pipeline.renderer.reset();
        }
        self.limiter.reset();
    }

    /// Applies loudness normalization and limiting to the output.
    fn finish(&mut self) {
        if self.loudness_gain != 1.0 {
            for ch in 0..self.output.channel_count() {
                self.output.plane_mut(ch).iter_mut().for_each(|s| *s *= self.loudness_gain);
            }
        }

        self.limiter.process(&mut self.output);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use iamf_core::audio::SoundSystem;
    use iamf_format_obu::param::MixGainParamDefinition;
    use iamf_format_obu::{LoudnessInfo, SubMixLayout};

    fn layout(layout: LoudnessLayout, integrated_loudness: f32) -> SubMixLayout {
        SubMixLayout {
            layout,
            loudness: LoudnessInfo {
                info_type: 0,
                integrated_loudness,
                digital_peak: 0.0,
                true_peak: None,
                anchored_loudness: Vec::new(),
            },
        }
    }

    #[test]
    fn verify_program_loudness() {
        let sub_mix = SubMix {
            elements: Vec::new(),
            output_mix_gain: MixGainParamDefinition::default(),
            layouts: vec![
                layout(LoudnessLayout::SoundSystem(SoundSystem::A), -24.0),
                layout(LoudnessLayout::SoundSystem(SoundSystem::B), -20.0),
            ],
        };

        let stereo = OutputLayout::SoundSystem(SoundSystem::A);
        let surround = OutputLayout::SoundSystem(SoundSystem::B);

        assert_eq!(program_loudness(&sub_mix, stereo), Some(-24.0));
        assert_eq!(program_loudness(&sub_mix, surround), Some(-20.0));
        // Falls back to the first layout.
        assert_eq!(program_loudness(&sub_mix, OutputLayout::Binaural), Some(-24.0));
    }

    #[test]
    fn verify_loudness_gain() {
        assert!((loudness_gain(-18.0, -24.0) - 1.995262).abs() < 1e-5);
        assert_eq!(loudness_gain(-24.0, -24.0), 1.0);
    }

    #[test]
    fn verify_copy_trimmed() {
        let mut src = Frame::new(1, 1024);
        src.set_samples(1024);
        src.strim = 100;
        src.etrim = 50;
        for (i, s) in src.plane_mut(0).iter_mut().enumerate() {
            *s = i as f32;
        }

        let mut dst = Frame::new(1, 16);
        copy_trimmed(&src, &mut dst);

        assert_eq!(dst.samples(), 874);
        assert_eq!(dst.plane(0)[0], 100.0);
        assert_eq!(dst.plane(0)[873], 973.0);
    }
}
