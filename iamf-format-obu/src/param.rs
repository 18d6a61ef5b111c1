// IAMF-RS
// Copyright (c) 2024 The IAMF-RS Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Parameter definitions and parameter blocks.

use iamf_core::audio::ReconGainFlags;
use iamf_core::errors::{decode_error, limit_error, Result};
use iamf_core::io::{BufReader, ReadBytes};

use smallvec::SmallVec;

/// The maximum number of subblocks in one parameter block.
const MAX_SUBBLOCKS: u64 = 1 << 16;

/// The kind of parameter carried by a parameter block.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ParamKind {
    MixGain,
    Demixing,
    ReconGain,
}

/// Converts a Q7.8 fixed point value to a float.
#[inline(always)]
pub fn q7_8(value: i16) -> f32 {
    f32::from(value) / 256.0
}

/// Converts a gain in decibels to a linear gain.
#[inline(always)]
pub fn db_to_linear(db: f32) -> f32 {
    10f32.powf(db / 20.0)
}

/// A parameter definition.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ParamDefinition {
    pub parameter_id: u64,
    /// The number of ticks per second of durations.
    pub parameter_rate: u64,
    /// If `true`, durations are carried by each parameter block rather than the definition.
    pub param_definition_mode: bool,
    pub duration: u64,
    pub constant_subblock_duration: u64,
    /// Explicit subblock durations, used when `constant_subblock_duration` is 0.
    pub subblock_durations: Vec<u64>,
}

impl ParamDefinition {
    pub fn read<B: ReadBytes>(reader: &mut B) -> Result<ParamDefinition> {
        let parameter_id = reader.read_leb128()?;
        let parameter_rate = reader.read_leb128()?;
        let param_definition_mode = reader.read_u8()? & 0x80 != 0;

        let mut def = ParamDefinition {
            parameter_id,
            parameter_rate,
            param_definition_mode,
            ..Default::default()
        };

        if !param_definition_mode {
            let (duration, constant, durations) = read_durations(reader)?;

            def.duration = duration;
            def.constant_subblock_duration = constant;
            def.subblock_durations = durations;
        }

        Ok(def)
    }
}

/// Reads a duration, constant subblock duration and, if required, the explicit subblock
/// durations.
fn read_durations<B: ReadBytes>(reader: &mut B) -> Result<(u64, u64, Vec<u64>)> {
    let duration = reader.read_leb128()?;
    let constant = reader.read_leb128()?;

    let mut durations = Vec::new();

    if constant == 0 {
        let num_subblocks = reader.read_leb128()?;

        if num_subblocks > MAX_SUBBLOCKS {
            return limit_error("obu: too many subblocks");
        }

        for _ in 0..num_subblocks {
            durations.push(reader.read_leb128()?);
        }

        if durations.iter().sum::<u64>() != duration {
            return decode_error("obu: subblock durations do not sum to the duration");
        }
    }

    Ok((duration, constant, durations))
}

/// Expands the durations of a parameter block into one duration per subblock.
fn subblock_durations(duration: u64, constant: u64, durations: &[u64]) -> Result<Vec<u64>> {
    if constant == 0 {
        return Ok(durations.to_vec());
    }

    let count = duration.div_ceil(constant);

    if count > MAX_SUBBLOCKS {
        return limit_error("obu: too many subblocks");
    }

    let mut out = Vec::with_capacity(count as usize);
    let mut remaining = duration;

    while remaining > 0 {
        let len = remaining.min(constant);
        out.push(len);
        remaining -= len;
    }

    Ok(out)
}

/// The definition of a mix gain parameter.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MixGainParamDefinition {
    pub base: ParamDefinition,
    /// The default gain in decibels.
    pub default_mix_gain: f32,
}

impl MixGainParamDefinition {
    pub fn read<B: ReadBytes>(reader: &mut B) -> Result<MixGainParamDefinition> {
        let base = ParamDefinition::read(reader)?;
        let default_mix_gain = q7_8(reader.read_be_i16()?);

        Ok(MixGainParamDefinition { base, default_mix_gain })
    }
}

/// The definition of a demixing parameter.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DemixingParamDefinition {
    pub base: ParamDefinition,
    /// The default demixing mode (`dmixp_mode`).
    pub default_mode: u8,
    /// The default weight index (`default_w`).
    pub default_w: u8,
}

impl DemixingParamDefinition {
    pub fn read<B: ReadBytes>(reader: &mut B) -> Result<DemixingParamDefinition> {
        let base = ParamDefinition::read(reader)?;
        let default_mode = reader.read_u8()? >> 5;
        let default_w = reader.read_u8()? >> 4;

        Ok(DemixingParamDefinition { base, default_mode, default_w })
    }
}

/// The shape of a mix gain over one subblock. Values are in decibels.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum MixGainAnimation {
    Step { start: f32 },
    Linear { start: f32, end: f32 },
    Bezier { start: f32, end: f32, control: f32, control_time: f32 },
}

impl MixGainAnimation {
    fn read<B: ReadBytes>(reader: &mut B) -> Result<MixGainAnimation> {
        let animation = match reader.read_leb128()? {
            0 => MixGainAnimation::Step { start: q7_8(reader.read_be_i16()?) },
            1 => {
                let start = q7_8(reader.read_be_i16()?);
                let end = q7_8(reader.read_be_i16()?);
                MixGainAnimation::Linear { start, end }
            }
            2 => {
                let start = q7_8(reader.read_be_i16()?);
                let end = q7_8(reader.read_be_i16()?);
                let control = q7_8(reader.read_be_i16()?);
                // Q0.8 relative time of the control point.
                let control_time = f32::from(reader.read_u8()?) / 256.0;
                MixGainAnimation::Bezier { start, end, control, control_time }
            }
            _ => return decode_error("obu: invalid mix gain animation type"),
        };
        Ok(animation)
    }
}

/// The recon gains of one channel layer.
#[derive(Clone, Debug, PartialEq)]
pub struct ReconGain {
    /// The index of the layer within the audio element.
    pub layer: u8,
    pub flags: ReconGainFlags,
    /// Linear gains in flag bit order, one per set flag.
    pub gains: SmallVec<[f32; 12]>,
}

impl ReconGain {
    /// Gets the gain for a channel flag. Channels without a gain are not attenuated.
    pub fn gain(&self, flag: ReconGainFlags) -> f32 {
        if !self.flags.contains(flag) || flag.is_empty() {
            return 1.0;
        }

        let index = (self.flags.bits() & (flag.bits() - 1)).count_ones() as usize;
        self.gains.get(index).copied().unwrap_or(1.0)
    }
}

/// The data of one parameter subblock.
#[derive(Clone, Debug, PartialEq)]
pub enum ParameterData {
    MixGain(MixGainAnimation),
    Demixing { mode: u8 },
    ReconGain(Vec<ReconGain>),
}

/// One subblock of a parameter block.
#[derive(Clone, Debug, PartialEq)]
pub struct ParameterSubblock {
    pub duration: u64,
    pub data: ParameterData,
}

/// The information required to parse a parameter block.
#[derive(Copy, Clone, Debug)]
pub struct ParamBlockContext<'a> {
    pub kind: ParamKind,
    pub definition: &'a ParamDefinition,
    /// For recon gain parameters, the recon gain presence of each layer of the parent element.
    pub recon_gain_layers: &'a [bool],
}

/// A parameter block OBU whose payload has not yet been interpreted.
///
/// The layout of a parameter block depends on the definition of the parameter, which is found in
/// a descriptor. Parsing is therefore completed by `parse` once the definition is known.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawParameterBlock {
    pub parameter_id: u64,
    pub data: Box<[u8]>,
}

impl RawParameterBlock {
    pub fn read(reader: &mut BufReader<'_>) -> Result<RawParameterBlock> {
        let parameter_id = reader.read_leb128()?;
        let data = reader.read_buf_bytes_available_ref().into();

        Ok(RawParameterBlock { parameter_id, data })
    }

    /// Parse the parameter block using its definition.
    pub fn parse(&self, ctx: &ParamBlockContext<'_>) -> Result<ParameterBlock> {
        let mut reader = BufReader::new(&self.data);

        let def = ctx.definition;

        // The number of subblocks whose duration precedes their data.
        let mut explicit = None;

        let (duration, durations) = if def.param_definition_mode {
            let duration = reader.read_leb128()?;
            let constant = reader.read_leb128()?;

            if constant == 0 {
                let num_subblocks = reader.read_leb128()?;

                if num_subblocks > MAX_SUBBLOCKS {
                    return limit_error("obu: too many subblocks");
                }

                explicit = Some(num_subblocks);
                (duration, Vec::new())
            }
            else {
                (duration, subblock_durations(duration, constant, &[])?)
            }
        }
        else {
            let durations = subblock_durations(
                def.duration,
                def.constant_subblock_duration,
                &def.subblock_durations,
            )?;
            (def.duration, durations)
        };

        if duration == 0 {
            return decode_error("obu: parameter block has no duration");
        }

        let mut subblocks = Vec::with_capacity(durations.len());

        match explicit {
            Some(num_subblocks) => {
                for _ in 0..num_subblocks {
                    let duration = reader.read_leb128()?;
                    let data = read_subblock_data(&mut reader, ctx)?;
                    subblocks.push(ParameterSubblock { duration, data });
                }

                if subblocks.iter().map(|s| s.duration).sum::<u64>() != duration {
                    return decode_error("obu: subblock durations do not sum to the duration");
                }
            }
            None => {
                for duration in durations {
                    let data = read_subblock_data(&mut reader, ctx)?;
                    subblocks.push(ParameterSubblock { duration, data });
                }
            }
        }

        Ok(ParameterBlock { parameter_id: self.parameter_id, duration, subblocks })
    }
}

fn read_subblock_data(
    reader: &mut BufReader<'_>,
    ctx: &ParamBlockContext<'_>,
) -> Result<ParameterData> {
    let data = match ctx.kind {
        ParamKind::MixGain => ParameterData::MixGain(MixGainAnimation::read(reader)?),
        ParamKind::Demixing => ParameterData::Demixing { mode: reader.read_u8()? >> 5 },
        ParamKind::ReconGain => {
            let mut layers = Vec::new();

            let present = ctx.recon_gain_layers.iter().enumerate().filter(|(_, p)| **p);

            for (layer, _) in present {
                let bits = reader.read_leb128()? as u32;
                let flags = ReconGainFlags::from_bits_truncate(bits);

                let mut gains = SmallVec::new();
                for _ in 0..flags.bits().count_ones() {
                    gains.push(f32::from(reader.read_u8()?) / 255.0);
                }

                layers.push(ReconGain { layer: layer as u8, flags, gains });
            }

            ParameterData::ReconGain(layers)
        }
    };

    Ok(data)
}

/// A parsed parameter block.
#[derive(Clone, Debug, PartialEq)]
pub struct ParameterBlock {
    pub parameter_id: u64,
    pub duration: u64,
    pub subblocks: Vec<ParameterSubblock>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_param_definition() {
        // id=3, rate=48000, mode=0, duration=960, constant=480.
        let buf = [0x03, 0x80, 0xf7, 0x02, 0x00, 0xc0, 0x07, 0xe0, 0x03];
        let def = ParamDefinition::read(&mut BufReader::new(&buf)).unwrap();

        assert_eq!(def.parameter_id, 3);
        assert_eq!(def.parameter_rate, 48_000);
        assert!(!def.param_definition_mode);
        assert_eq!(def.duration, 960);
        assert_eq!(def.constant_subblock_duration, 480);
    }

    #[test]
    fn verify_explicit_subblocks_must_sum() {
        // id=1, rate=1, mode=0, duration=10, constant=0, 2 subblocks of 4 and 5.
        let buf = [0x01, 0x01, 0x00, 0x0a, 0x00, 0x02, 0x04, 0x05];
        assert!(ParamDefinition::read(&mut BufReader::new(&buf)).is_err());
    }

    #[test]
    fn verify_mix_gain_block() {
        let def = ParamDefinition {
            parameter_id: 9,
            parameter_rate: 48_000,
            param_definition_mode: true,
            ..Default::default()
        };

        // duration=8, constant=3, then 3 subblocks: step -6 dB, linear 0 to -1 dB, bezier.
        let raw = RawParameterBlock {
            parameter_id: 9,
            data: vec![
                0x08, 0x03, 0x00, 0xfa, 0x00, 0x01, 0x00, 0x00, 0xff, 0x00, 0x02, 0x00, 0x00, 0x01,
                0x00, 0x00, 0x80, 0x80,
            ]
            .into_boxed_slice(),
        };

        let ctx = ParamBlockContext {
            kind: ParamKind::MixGain,
            definition: &def,
            recon_gain_layers: &[],
        };
        let block = raw.parse(&ctx).unwrap();

        assert_eq!(block.duration, 8);
        assert_eq!(block.subblocks.len(), 3);
        assert_eq!(block.subblocks[2].duration, 2);
        assert_eq!(
            block.subblocks[0].data,
            ParameterData::MixGain(MixGainAnimation::Step { start: -6.0 })
        );
        assert_eq!(
            block.subblocks[1].data,
            ParameterData::MixGain(MixGainAnimation::Linear { start: 0.0, end: -1.0 })
        );
        assert_eq!(
            block.subblocks[2].data,
            ParameterData::MixGain(MixGainAnimation::Bezier {
                start: 0.0,
                end: 1.0,
                control: 0.5,
                control_time: 0.5
            })
        );
    }

    #[test]
    fn verify_explicit_subblock_durations() {
        let def = ParamDefinition {
            parameter_id: 4,
            parameter_rate: 48_000,
            param_definition_mode: true,
            ..Default::default()
        };

        // duration=8, constant=0, 2 subblocks. Each duration precedes its step gain.
        let data = vec![0x08, 0x00, 0x02, 0x04, 0x00, 0x00, 0x00, 0x04, 0x00, 0xfa, 0x00];
        let raw = RawParameterBlock { parameter_id: 4, data: data.into_boxed_slice() };

        let ctx = ParamBlockContext {
            kind: ParamKind::MixGain,
            definition: &def,
            recon_gain_layers: &[],
        };
        let block = raw.parse(&ctx).unwrap();

        assert_eq!(block.duration, 8);
        assert_eq!(block.subblocks.len(), 2);
        assert_eq!(block.subblocks[0].duration, 4);
        assert_eq!(block.subblocks[1].duration, 4);
        assert_eq!(
            block.subblocks[0].data,
            ParameterData::MixGain(MixGainAnimation::Step { start: 0.0 })
        );
        assert_eq!(
            block.subblocks[1].data,
            ParameterData::MixGain(MixGainAnimation::Step { start: -6.0 })
        );

        // Durations of 4 and 3 do not cover the block.
        let data = vec![0x08, 0x00, 0x02, 0x04, 0x00, 0x00, 0x00, 0x03, 0x00, 0xfa, 0x00];
        let raw = RawParameterBlock { parameter_id: 4, data: data.into_boxed_slice() };
        assert!(raw.parse(&ctx).is_err());
    }

    #[test]
    fn verify_recon_gain_block() {
        let def = ParamDefinition {
            parameter_id: 2,
            parameter_rate: 48_000,
            param_definition_mode: false,
            duration: 960,
            constant_subblock_duration: 960,
            subblock_durations: Vec::new(),
        };

        // Layer 1 carries gains for Ls and Rs.
        let data = vec![0x18, 255, 0].into_boxed_slice();
        let raw = RawParameterBlock { parameter_id: 2, data };

        let ctx = ParamBlockContext {
            kind: ParamKind::ReconGain,
            definition: &def,
            recon_gain_layers: &[false, true],
        };

        let block = raw.parse(&ctx).unwrap();

        match &block.subblocks[0].data {
            ParameterData::ReconGain(layers) => {
                assert_eq!(layers.len(), 1);
                assert_eq!(layers[0].layer, 1);
                assert_eq!(layers[0].gain(ReconGainFlags::LS), 1.0);
                assert_eq!(layers[0].gain(ReconGainFlags::RS), 0.0);
                assert_eq!(layers[0].gain(ReconGainFlags::L), 1.0);
            }
            _ => panic!("expected recon gain"),
        }
    }

    #[test]
    fn verify_truncated_block() {
        let def = ParamDefinition {
            parameter_rate: 1,
            duration: 1,
            constant_subblock_duration: 1,
            ..Default::default()
        };
        let raw = RawParameterBlock { parameter_id: 0, data: vec![0x01, 0x00].into_boxed_slice() };

        let ctx = ParamBlockContext {
            kind: ParamKind::MixGain,
            definition: &def,
            recon_gain_layers: &[],
        };
        assert!(raw.parse(&ctx).is_err());
    }
}
