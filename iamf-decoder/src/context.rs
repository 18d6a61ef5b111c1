// IAMF-RS
// Copyright (c) 2024 The IAMF-RS Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The decoder context: descriptor ingestion, presentation selection and steady-state decoding
//! of temporal units.

use hashbrown::HashMap;
use log::{debug, info, trace, warn};

use iamf_core::audio::OutputLayout;
use iamf_core::codecs::registry::CodecRegistry;
use iamf_core::conv::{write_samples, SampleFormat};
use iamf_core::errors::{invalid_state_error, Result};
use iamf_core::units::{TimeBase, TimeStamp};
use iamf_format_obu::{read_obu, AudioFrame, Obu, ObuHeader, Profile, ReadStatus};

use crate::database::{Database, DescriptorFlags};
use crate::frame::Frame;
use crate::options::DecoderOptions;
use crate::presentation::Presentation;

/// The state of an [`IamfDecoder`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DecoderState {
    /// No descriptors were received.
    Uninit,
    /// Descriptors are being received.
    Init,
    /// All descriptors were received. The presentation is being built.
    Configure,
    /// The presentation must be rebuilt before the next temporal unit.
    Reconfigure,
    /// A temporal unit is being received.
    Receive,
    /// Steady state.
    Run,
}

/// The outcome of a call to [`IamfDecoder::decode`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DecodeStatus {
    /// All input was consumed without completing a temporal unit.
    NeedMoreData,
    /// A temporal unit was decoded. The output holds `samples` samples per channel.
    Frame { samples: usize },
    /// A temporal unit could not be decoded and was dropped.
    Dropped,
}

/// The result of a call to [`IamfDecoder::decode`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Decoded {
    /// The number of bytes of input that were consumed.
    pub consumed: usize,
    pub status: DecodeStatus,
}

/// Interleaved output PCM.
#[derive(Clone, Debug, Default)]
pub struct AudioOutput {
    /// The timestamp of the first sample in the time base set by [`IamfDecoder::set_pts`].
    pub pts: TimeStamp,
    /// The number of samples per channel.
    pub samples: usize,
    pub channels: usize,
    pub format: SampleFormat,
    pub data: Vec<u8>,
}

/// Information about the stream being decoded.
#[derive(Clone, Debug, PartialEq)]
pub struct StreamInfo {
    /// The mix presentation that is decoded.
    pub mix_presentation_id: u64,
    /// The number of output channels.
    pub channels: usize,
    /// The output sample rate in Hz.
    pub sampling_rate: u32,
    /// The number of samples per frame of the coded audio.
    pub frame_size: usize,
    /// The ids of every mix presentation of the stream.
    pub mix_presentations: Vec<u64>,
    pub profile: Option<Profile>,
}

/// An IAMF decoder.
///
/// Descriptors are passed to [`IamfDecoder::configure`] to select and build a mix presentation.
/// Temporal units are then passed to [`IamfDecoder::decode`], which outputs one frame of
/// interleaved PCM per temporal unit.
pub struct IamfDecoder<'a> {
    registry: &'a CodecRegistry,
    options: DecoderOptions,
    database: Database,
    state: DecoderState,
    presentation: Option<Presentation>,
    /// The audio frames of the temporal unit being received.
    frames: HashMap<u64, AudioFrame>,
    /// The timestamp of the temporal unit being received, in samples at the codec sample rate.
    ts: u64,
    /// The timestamp of the next output, in `time_base` units.
    pts: TimeStamp,
    time_base: TimeBase,
    interleaved: Vec<f32>,
    output: AudioOutput,
}

impl<'a> IamfDecoder<'a> {
    pub fn new(registry: &'a CodecRegistry, options: DecoderOptions) -> Self {
        IamfDecoder {
            registry,
            options,
            database: Database::new(),
            state: DecoderState::Uninit,
            presentation: None,
            frames: HashMap::new(),
            ts: 0,
            pts: 0,
            time_base: TimeBase::default(),
            interleaved: Vec::new(),
            output: AudioOutput::default(),
        }
    }

    pub fn state(&self) -> DecoderState {
        self.state
    }

    pub fn options(&self) -> &DecoderOptions {
        &self.options
    }

    /// Parse descriptor OBUs from `data` and, once every descriptor was received, build the
    /// presentation. Parsing stops at the first non-descriptor OBU. Returns the number of bytes
    /// consumed.
    ///
    /// Configuring a decoder that is running starts a new IA sequence.
    pub fn configure(&mut self, data: &[u8]) -> Result<usize> {
        if matches!(
            self.state,
            DecoderState::Run | DecoderState::Receive | DecoderState::Reconfigure
        ) {
            debug!("configuring a new ia sequence");
            self.teardown();
            self.database.reset();
            self.state = DecoderState::Uninit;
        }

        let mut consumed = 0;

        loop {
            let (header, obu, len) = match read_obu(&data[consumed..])? {
                ReadStatus::NeedMoreData => break,
                ReadStatus::Obu { header, obu, consumed } => (header, obu, consumed),
            };

            if !obu.is_descriptor() {
                if let Obu::Reserved(code) = obu {
                    trace!("skipping reserved obu type {}", code);
                    consumed += len;
                    continue;
                }

                self.database.set_frame_start();
                break;
            }

            consumed += len;

            self.database.add(obu, header.redundant_copy)?;
            self.state = DecoderState::Init;
        }

        let frame_start = self.database.flags().contains(DescriptorFlags::FRAME_START);

        if self.database.is_complete() && (frame_start || consumed == data.len()) {
            self.state = DecoderState::Configure;
            self.rebuild()?;
        }

        Ok(consumed)
    }

    /// Decode OBUs from `data` until a temporal unit is complete or the data is exhausted.
    ///
    /// A temporal unit ends when every substream of the presentation was received, or at a
    /// temporal delimiter, a repeated substream, or a descriptor. The OBU that ends a temporal
    /// unit early is not consumed.
    pub fn decode(&mut self, data: &[u8]) -> Result<Decoded> {
        if matches!(
            self.state,
            DecoderState::Uninit | DecoderState::Init | DecoderState::Configure
        ) {
            return invalid_state_error("decoder: not configured");
        }

        let mut consumed = 0;

        loop {
            let (header, obu, len) = match read_obu(&data[consumed..])? {
                ReadStatus::NeedMoreData => {
                    return Ok(Decoded { consumed, status: DecodeStatus::NeedMoreData });
                }
                ReadStatus::Obu { header, obu, consumed } => (header, obu, consumed),
            };

            match obu {
                Obu::TemporalDelimiter => {
                    if !self.frames.is_empty() {
                        return self.finish_temporal_unit(consumed);
                    }
                    consumed += len;
                }
                Obu::SequenceHeader(_)
                | Obu::CodecConfig(_)
                | Obu::AudioElement(_)
                | Obu::MixPresentation(_) => {
                    if !self.frames.is_empty() {
                        return self.finish_temporal_unit(consumed);
                    }
                    consumed += len;
                    self.receive_descriptor(header, obu)?;
                }
                Obu::ParameterBlock(raw) => {
                    self.ensure_presentation()?;
                    consumed += len;

                    self.state = DecoderState::Receive;

                    if let Some(presentation) = self.presentation.as_mut() {
                        if let Err(err) = presentation.push_parameter(&raw, self.ts) {
                            warn!("parameter {}: discarding block: {}", raw.parameter_id, err);
                        }
                    }
                }
                Obu::AudioFrame(frame) => {
                    self.ensure_presentation()?;

                    if self.frames.contains_key(&frame.substream_id) {
                        return self.finish_temporal_unit(consumed);
                    }

                    consumed += len;

                    self.state = DecoderState::Receive;

                    let complete = match self.presentation.as_ref() {
                        Some(presentation) if presentation.has_substream(frame.substream_id) => {
                            self.frames.insert(frame.substream_id, frame);
                            presentation
                                .substream_ids()
                                .iter()
                                .all(|id| self.frames.contains_key(id))
                        }
                        _ => {
                            trace!("skipping substream {}", frame.substream_id);
                            false
                        }
                    };

                    if complete {
                        return self.finish_temporal_unit(consumed);
                    }
                }
                Obu::Reserved(code) => {
                    trace!("skipping reserved obu type {}", code);
                    consumed += len;
                }
            }
        }
    }

    /// Gets the output of the last decoded temporal unit.
    pub fn last_decoded(&self) -> &AudioOutput {
        &self.output
    }

    /// Outputs the audio buffered by the decoder. An incomplete temporal unit is discarded.
    /// Returns the number of samples per channel of the output.
    pub fn flush(&mut self) -> Result<usize> {
        if !self.frames.is_empty() {
            debug!("discarding an incomplete temporal unit");
            self.frames.clear();
        }

        let presentation = match self.presentation.as_mut() {
            Some(presentation) => presentation,
            None => return invalid_state_error("decoder: not configured"),
        };

        let rate = presentation.output_sample_rate();
        let frame = presentation.flush()?;

        write_output(
            frame,
            self.options.bit_depth,
            self.pts,
            &mut self.interleaved,
            &mut self.output,
        );

        let samples = self.output.samples;
        self.pts += self.time_base.calc_duration(samples as u64, rate);

        Ok(samples)
    }

    /// Gets information about the stream being decoded.
    pub fn stream_info(&self) -> Result<StreamInfo> {
        let presentation = match self.presentation.as_ref() {
            Some(presentation) => presentation,
            None => return invalid_state_error("decoder: not configured"),
        };

        Ok(StreamInfo {
            mix_presentation_id: presentation.mix_presentation_id(),
            channels: presentation.channel_count(),
            sampling_rate: presentation.output_sample_rate(),
            frame_size: presentation.frame_size(),
            mix_presentations: self
                .database
                .mix_presentations()
                .iter()
                .map(|mix| mix.mix_presentation_id)
                .collect(),
            profile: self.database.profile(),
        })
    }

    pub fn set_output_layout(&mut self, layout: OutputLayout) {
        if self.options.output_layout != layout {
            self.options.output_layout = layout;
            self.request_reconfigure();
        }
    }

    pub fn set_mix_presentation_id(&mut self, id: u64) {
        if self.options.mix_presentation_id != Some(id) {
            self.options.mix_presentation_id = Some(id);
            self.request_reconfigure();
        }
    }

    /// Sets the target loudness, in LKFS, of loudness normalization.
    pub fn set_normalization_loudness(&mut self, loudness: f32) {
        if self.options.normalization_loudness != Some(loudness) {
            self.options.normalization_loudness = Some(loudness);
            self.request_reconfigure();
        }
    }

    /// Sets the sample format of the output. Takes effect on the next output.
    pub fn set_bit_depth(&mut self, format: SampleFormat) {
        self.options.bit_depth = format;
    }

    pub fn set_sampling_rate(&mut self, rate: u32) {
        if self.options.sampling_rate != Some(rate) {
            self.options.sampling_rate = Some(rate);
            self.request_reconfigure();
        }
    }

    /// Sets the timestamp of the next output and the time base of output timestamps.
    pub fn set_pts(&mut self, pts: TimeStamp, time_base: TimeBase) {
        self.pts = pts;
        self.time_base = time_base;
    }

    fn request_reconfigure(&mut self) {
        if self.presentation.is_some() || self.state == DecoderState::Reconfigure {
            debug!("reconfiguration requested");
            self.state = DecoderState::Reconfigure;
        }
    }

    /// Drop the presentation and the temporal unit being received.
    fn teardown(&mut self) {
        self.presentation = None;
        self.frames.clear();
    }

    /// Builds the presentation from the database. The previous presentation is released first.
    fn rebuild(&mut self) -> Result<()> {
        self.teardown();

        if !self.database.flags().contains(DescriptorFlags::CONFIG) {
            self.database.build_viewers()?;
        }

        let presentation = Presentation::build(&self.database, self.registry, &self.options)?;

        info!(
            "decoding mix presentation {} to {:?}",
            presentation.mix_presentation_id(),
            presentation.output_layout()
        );

        self.presentation = Some(presentation);
        self.state = DecoderState::Run;

        Ok(())
    }

    fn ensure_presentation(&mut self) -> Result<()> {
        if self.state == DecoderState::Reconfigure || self.presentation.is_none() {
            self.database.set_frame_start();
            self.rebuild()?;
        }
        Ok(())
    }

    fn receive_descriptor(&mut self, header: ObuHeader, obu: Obu) -> Result<()> {
        if header.redundant_copy {
            trace!("skipping redundant descriptor");
            return Ok(());
        }

        if let Obu::SequenceHeader(_) = obu {
            info!("new ia sequence");
            self.teardown();
            self.database.reset();
        }

        self.database.add(obu, false)?;
        self.state = DecoderState::Reconfigure;

        Ok(())
    }

    fn finish_temporal_unit(&mut self, consumed: usize) -> Result<Decoded> {
        let frames = std::mem::take(&mut self.frames);
        let ts = self.ts;

        self.state = DecoderState::Run;

        let presentation = match self.presentation.as_mut() {
            Some(presentation) => presentation,
            None => return invalid_state_error("decoder: not configured"),
        };

        let rate = presentation.output_sample_rate();
        let frame_size = presentation.frame_size();

        match presentation.decode(&frames, ts) {
            Ok(frame) => {
                write_output(
                    frame,
                    self.options.bit_depth,
                    self.pts,
                    &mut self.interleaved,
                    &mut self.output,
                );

                let samples = self.output.samples;

                self.ts += presentation.decoded_samples() as u64;
                self.pts += self.time_base.calc_duration(samples as u64, rate);

                Ok(Decoded { consumed, status: DecodeStatus::Frame { samples } })
            }
            Err(err) if err.is_frame_local() => {
                warn!("dropping temporal unit at {}: {}", ts, err);
                self.ts += frame_size as u64;
                Ok(Decoded { consumed, status: DecodeStatus::Dropped })
            }
            Err(err) => Err(err),
        }
    }
}

/// Interleaves a frame into the output PCM.
fn write_output(
    frame: &Frame,
    format: SampleFormat,
    pts: TimeStamp,
    interleaved: &mut Vec<f32>,
    output: &mut AudioOutput,
) {
    let channels = frame.channel_count();
    let samples = frame.samples();

    interleaved.clear();
    interleaved.resize(channels * samples, 0.0);

    for (ch, plane) in frame.planes().enumerate() {
        for (i, &s) in plane.iter().enumerate() {
            interleaved[i * channels + ch] = s;
        }
    }

    output.pts = pts;
    output.samples = samples;
    output.channels = channels;
    output.format = format;
    output.data.clear();

    write_samples(interleaved, format, &mut output.data);
}

#[cfg(test)]
mod tests {
    use super::*;
    use iamf_core::audio::SoundSystem;

    #[test]
    fn verify_decoder_is_send() {
        fn is_send<T: Send>() {}
        is_send::<IamfDecoder<'static>>();
    }

    #[test]
    fn verify_write_output_interleaves() {
        let mut frame = Frame::new(2, 4);
        frame.set_samples(3);
        frame.plane_mut(0).copy_from_slice(&[0.5, 0.25, 0.0]);
        frame.plane_mut(1).copy_from_slice(&[-0.5, -0.25, 1.0]);

        let mut interleaved = Vec::new();
        let mut output = AudioOutput::default();

        write_output(&frame, SampleFormat::F32, 7, &mut interleaved, &mut output);

        assert_eq!(output.pts, 7);
        assert_eq!((output.samples, output.channels), (3, 2));
        assert_eq!(interleaved, vec![0.5, -0.5, 0.25, -0.25, 0.0, 1.0]);
        assert_eq!(output.data.len(), 6 * 4);
    }

    #[test]
    fn verify_setters_before_configure() {
        let registry = CodecRegistry::new();
        let mut decoder = IamfDecoder::new(&registry, DecoderOptions::default());

        decoder.set_output_layout(OutputLayout::SoundSystem(SoundSystem::B));
        decoder.set_sampling_rate(44_100);

        // Nothing to reconfigure yet.
        assert_eq!(decoder.state(), DecoderState::Uninit);
        assert_eq!(decoder.options().sampling_rate, Some(44_100));
        assert!(matches!(decoder.flush(), Err(iamf_core::errors::Error::InvalidState(_))));
    }
}
