// IAMF-RS
// Copyright (c) 2024 The IAMF-RS Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The parameter timeline tracks the time-varying parameters of the active presentation.
//!
//! Parameter blocks are queued as segments on the timeline of their parameter when they are
//! received, and resolved at the timestamp of each decoded frame. All timestamps and durations
//! on the timeline are in samples at the codec sample rate.

use std::collections::VecDeque;

use hashbrown::HashMap;
use log::{trace, warn};

use iamf_core::errors::{decode_error, Result};
use iamf_format_obu::param::{db_to_linear, MixGainAnimation, ParamBlockContext, ParamKind};
use iamf_format_obu::param::{ParameterData, ReconGain};
use iamf_format_obu::RawParameterBlock;

use crate::database::{ParamDefault, ParamInfo};

/// The mix gain of one frame as linear gains.
#[derive(Clone, Debug, PartialEq)]
pub enum MixGainUnit {
    /// One gain for the whole frame.
    Constant(f32),
    /// One gain per sample.
    PerSample(Vec<f32>),
}

impl MixGainUnit {
    /// Gets the gain of the sample at index `i` of the frame.
    #[inline(always)]
    pub fn gain(&self, i: usize) -> f32 {
        match self {
            MixGainUnit::Constant(gain) => *gain,
            MixGainUnit::PerSample(gains) => gains.get(i).copied().unwrap_or(1.0),
        }
    }

    /// Returns `true` if the gain is a constant unity gain.
    pub fn is_unity(&self) -> bool {
        matches!(self, MixGainUnit::Constant(gain) if *gain == 1.0)
    }
}

impl Default for MixGainUnit {
    fn default() -> Self {
        MixGainUnit::Constant(1.0)
    }
}

/// A span of the timeline with one parameter value.
#[derive(Clone, Debug)]
struct Segment {
    start: u64,
    end: u64,
    data: ParameterData,
}

/// Evaluates a mix gain animation, in decibels, `k` samples into a segment of `n` samples.
fn eval_animation(animation: &MixGainAnimation, k: u64, n: u64) -> f32 {
    match *animation {
        MixGainAnimation::Step { start } => start,
        MixGainAnimation::Linear { start, end } => {
            let a = k as f32 / n as f32;
            (1.0 - a) * start + a * end
        }
        MixGainAnimation::Bezier { start, end, control, control_time } => {
            // Find the curve parameter alpha at time k of a quadratic Bezier curve whose control
            // point is at time tc: alpha^2 (n - 2 tc) + 2 tc alpha - k = 0.
            let n = n as f32;
            let k = k as f32;
            let tc = (control_time * n).round();

            let a = n - 2.0 * tc;

            let alpha = if a.abs() < 1e-6 {
                if tc > 0.0 {
                    k / (2.0 * tc)
                }
                else {
                    k / n
                }
            }
            else {
                (-2.0 * tc + (4.0 * tc * tc + 4.0 * a * k).max(0.0).sqrt()) / (2.0 * a)
            };

            let alpha = alpha.clamp(0.0, 1.0);

            (1.0 - alpha) * (1.0 - alpha) * start + 2.0 * (1.0 - alpha) * alpha * control
                + alpha * alpha * end
        }
    }
}

/// The value a mix gain animation holds after its segment ends, in decibels.
fn final_value(animation: &MixGainAnimation) -> f32 {
    match *animation {
        MixGainAnimation::Step { start } => start,
        MixGainAnimation::Linear { end, .. } => end,
        MixGainAnimation::Bezier { end, .. } => end,
    }
}

/// The timeline of one parameter.
#[derive(Debug)]
pub struct ParameterItem {
    info: ParamInfo,
    enabled: bool,
    segments: VecDeque<Segment>,
    /// The value of the last segment that ended.
    held: Option<ParameterData>,
    /// The end of the last queued segment.
    end: u64,
    /// The number of samples of segments that were consumed.
    elapsed: u64,
}

impl ParameterItem {
    fn new(info: ParamInfo, enabled: bool) -> Self {
        ParameterItem { info, enabled, segments: VecDeque::new(), held: None, end: 0, elapsed: 0 }
    }

    pub fn kind(&self) -> ParamKind {
        self.info.kind
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Gets the timestamp at which the last queued segment ends.
    pub fn end(&self) -> u64 {
        self.end
    }

    /// Gets the number of samples covered by segments that were consumed.
    pub fn elapsed(&self) -> u64 {
        self.elapsed
    }

    /// Drop all segments that ended at or before `ts`.
    fn advance(&mut self, ts: u64) {
        while let Some(front) = self.segments.front() {
            if front.end > ts {
                break;
            }

            if let Some(segment) = self.segments.pop_front() {
                self.elapsed += segment.end - segment.start;
                self.held = Some(segment.data);
            }
        }
    }

    /// Gets the value at `ts`: the covering segment, else the held value.
    fn value_at(&mut self, ts: u64) -> Option<&ParameterData> {
        self.advance(ts);

        match self.segments.front() {
            Some(front) if front.start <= ts => Some(&front.data),
            _ => self.held.as_ref(),
        }
    }

    fn default_mix_gain(&self) -> f32 {
        match self.info.default {
            ParamDefault::MixGain(gain) => gain,
            _ => 0.0,
        }
    }

    /// Resolves the mix gain of `len` samples starting at `ts`.
    fn mix_gain(&mut self, ts: u64, len: usize) -> MixGainUnit {
        self.advance(ts);

        let mut held = match &self.held {
            Some(ParameterData::MixGain(animation)) => final_value(animation),
            _ => self.default_mix_gain(),
        };

        // Fast path: no segment starts within the frame.
        let covered = self.segments.front().map_or(false, |seg| seg.start < ts + len as u64);

        if !covered {
            return MixGainUnit::Constant(db_to_linear(held));
        }

        let mut gains = Vec::with_capacity(len);
        let mut iter = self.segments.iter().peekable();

        for i in 0..len as u64 {
            let t = ts + i;

            while let Some(seg) = iter.peek() {
                if seg.end > t {
                    break;
                }
                if let ParameterData::MixGain(animation) = &seg.data {
                    held = final_value(animation);
                }
                iter.next();
            }

            let db = match iter.peek() {
                Some(seg) if seg.start <= t => match &seg.data {
                    ParameterData::MixGain(animation) => {
                        eval_animation(animation, t - seg.start, seg.end - seg.start)
                    }
                    _ => held,
                },
                _ => held,
            };

            gains.push(db_to_linear(db));
        }

        if gains.windows(2).all(|w| w[0] == w[1]) {
            MixGainUnit::Constant(gains.first().copied().unwrap_or(1.0))
        }
        else {
            MixGainUnit::PerSample(gains)
        }
    }

    /// Queues a parameter block starting at `start`.
    fn push(&mut self, raw: &RawParameterBlock, start: u64, sample_rate: u32) -> Result<()> {
        let ctx = ParamBlockContext {
            kind: self.info.kind,
            definition: &self.info.definition,
            recon_gain_layers: &self.info.recon_gain_layers,
        };

        let block = raw.parse(&ctx)?;

        if start < self.end {
            warn!(
                "parameter {}: block at {} overlaps the previous block ending at {}",
                raw.parameter_id, start, self.end
            );
            return decode_error("decoder: overlapping parameter blocks");
        }

        let rate = self.info.definition.parameter_rate;
        let mut ts = start;

        for subblock in block.subblocks {
            let duration = ticks_to_samples(subblock.duration, rate, sample_rate);

            if duration == 0 {
                continue;
            }

            self.segments.push_back(Segment { start: ts, end: ts + duration, data: subblock.data });
            ts += duration;
        }

        trace!("parameter {}: queued segments {}..{}", raw.parameter_id, start, ts);

        self.end = ts;
        Ok(())
    }
}

/// Converts a duration in parameter rate ticks to samples.
fn ticks_to_samples(ticks: u64, parameter_rate: u64, sample_rate: u32) -> u64 {
    if parameter_rate == 0 || parameter_rate == u64::from(sample_rate) {
        return ticks;
    }

    (u128::from(ticks) * u128::from(sample_rate) / u128::from(parameter_rate)) as u64
}

/// The timelines of all parameters of an IA sequence.
#[derive(Debug, Default)]
pub struct ParameterTimeline {
    items: HashMap<u64, ParameterItem>,
    sample_rate: u32,
}

impl ParameterTimeline {
    /// Create an empty timeline for audio at `sample_rate`.
    pub fn new(sample_rate: u32) -> Self {
        ParameterTimeline { items: HashMap::new(), sample_rate }
    }

    /// Adds a parameter to the timeline. A disabled parameter ignores its parameter blocks and
    /// resolves to a neutral value.
    pub fn add(&mut self, id: u64, info: ParamInfo, enabled: bool) {
        self.items.insert(id, ParameterItem::new(info, enabled));
    }

    pub fn item(&self, id: u64) -> Option<&ParameterItem> {
        self.items.get(&id)
    }

    /// Queues a parameter block that starts at `start`.
    ///
    /// A block for an unknown or disabled parameter is ignored. A block that overlaps the
    /// previous block of the same parameter is an error and leaves the timeline unchanged.
    pub fn push(&mut self, raw: &RawParameterBlock, start: u64) -> Result<()> {
        match self.items.get_mut(&raw.parameter_id) {
            Some(item) if item.enabled => item.push(raw, start, self.sample_rate),
            Some(_) => {
                trace!("parameter {}: disabled, ignoring block", raw.parameter_id);
                Ok(())
            }
            None => {
                warn!("parameter {}: no definition, ignoring block", raw.parameter_id);
                Ok(())
            }
        }
    }

    /// Resolves the linear mix gain of `len` samples starting at `ts`.
    pub fn mix_gain(&mut self, id: u64, ts: u64, len: usize) -> MixGainUnit {
        match self.items.get_mut(&id) {
            Some(item) if item.enabled && item.kind() == ParamKind::MixGain => {
                item.mix_gain(ts, len)
            }
            _ => MixGainUnit::Constant(1.0),
        }
    }

    /// Resolves the demixing mode at `ts`.
    pub fn demixing_mode(&mut self, id: u64, ts: u64) -> Option<u8> {
        let item = self.items.get_mut(&id).filter(|item| item.enabled)?;

        let default = match item.info.default {
            ParamDefault::Demixing { mode, .. } => mode,
            _ => return None,
        };

        match item.value_at(ts) {
            Some(ParameterData::Demixing { mode }) => Some(*mode),
            _ => Some(default),
        }
    }

    /// Resolves the recon gains at `ts`. Returns `None` if no recon gains apply.
    pub fn recon_gain(&mut self, id: u64, ts: u64) -> Option<&[ReconGain]> {
        let item = self.items.get_mut(&id).filter(|item| item.enabled)?;

        match item.value_at(ts) {
            Some(ParameterData::ReconGain(gains)) => Some(gains.as_slice()),
            _ => None,
        }
    }
}
