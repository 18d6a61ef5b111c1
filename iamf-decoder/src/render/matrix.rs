// IAMF-RS
// Copyright (c) 2024 The IAMF-RS Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Loudspeaker layout conversion by a static mixing matrix.

use iamf_core::audio::{Channel, LoudspeakerLayout};

use crate::frame::Frame;

/// The role of a loudspeaker channel in a layout, regardless of which downmix it carries.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Position {
    Mono,
    FrontLeft,
    FrontRight,
    Center,
    Lfe,
    SideLeft,
    SideRight,
    BackLeft,
    BackRight,
    TopFrontLeft,
    TopFrontRight,
    TopBackLeft,
    TopBackRight,
}

fn position(ch: Channel) -> Position {
    use Channel::*;

    match ch {
        Mono => Position::Mono,
        L2 | L3 | L5 => Position::FrontLeft,
        R2 | R3 | R5 => Position::FrontRight,
        C => Position::Center,
        Lfe => Position::Lfe,
        Ls5 | Lss7 => Position::SideLeft,
        Rs5 | Rss7 => Position::SideRight,
        Lrs7 => Position::BackLeft,
        Rrs7 => Position::BackRight,
        Ltf2 | Ltf3 | Ltf4 => Position::TopFrontLeft,
        Rtf2 | Rtf3 | Rtf4 => Position::TopFrontRight,
        Ltb4 => Position::TopBackLeft,
        Rtb4 => Position::TopBackRight,
    }
}

const FOLD_GAIN: f32 = 0.707;

/// The gain of each front channel when folding into a mono loudspeaker.
const MONO_GAIN: f32 = 0.5;

/// Routes `pos` to the positions of `dst`, folding missing positions into their neighbours.
fn fold(pos: Position, dst: &[Position], gain: f32, out: &mut Vec<(usize, f32)>) {
    use Position::*;

    if let Some(idx) = dst.iter().position(|&p| p == pos) {
        out.push((idx, gain));
        return;
    }

    let has = |p: Position| dst.contains(&p);

    match pos {
        Mono | Center => {
            if has(Center) {
                fold(Center, dst, gain, out);
            }
            else if has(Mono) {
                fold(Mono, dst, gain, out);
            }
            else {
                fold(FrontLeft, dst, gain * FOLD_GAIN, out);
                fold(FrontRight, dst, gain * FOLD_GAIN, out);
            }
        }
        FrontLeft | FrontRight => {
            // Every layout without front left and right loudspeakers is mono.
            if has(Mono) {
                fold(Mono, dst, gain * MONO_GAIN, out);
            }
        }
        SideLeft => fold(FrontLeft, dst, gain * FOLD_GAIN, out),
        SideRight => fold(FrontRight, dst, gain * FOLD_GAIN, out),
        BackLeft => fold(SideLeft, dst, gain * FOLD_GAIN, out),
        BackRight => fold(SideRight, dst, gain * FOLD_GAIN, out),
        TopFrontLeft => fold(FrontLeft, dst, gain * FOLD_GAIN, out),
        TopFrontRight => fold(FrontRight, dst, gain * FOLD_GAIN, out),
        TopBackLeft if has(TopFrontLeft) => fold(TopFrontLeft, dst, gain * FOLD_GAIN, out),
        TopBackLeft => fold(SideLeft, dst, gain * FOLD_GAIN, out),
        TopBackRight if has(TopFrontRight) => fold(TopFrontRight, dst, gain * FOLD_GAIN, out),
        TopBackRight => fold(SideRight, dst, gain * FOLD_GAIN, out),
        // Low-frequency effects are dropped if there is no LFE loudspeaker.
        Lfe => (),
    }
}

/// A sparse mixing matrix from one loudspeaker layout to another.
#[derive(Clone, Debug)]
pub struct MixMatrix {
    /// `(input channel, output channel, gain)` entries.
    entries: Vec<(usize, usize, f32)>,
    out_channels: usize,
}

impl MixMatrix {
    pub fn new(src: LoudspeakerLayout, dst: LoudspeakerLayout) -> Self {
        let dst_positions: Vec<Position> = dst.channels().iter().map(|&ch| position(ch)).collect();

        let mut entries = Vec::new();
        let mut routes = Vec::new();

        for (i, &ch) in src.channels().iter().enumerate() {
            routes.clear();
            fold(position(ch), &dst_positions, 1.0, &mut routes);

            for &(o, gain) in routes.iter() {
                match entries.iter_mut().find(|(ei, eo, _)| *ei == i && *eo == o) {
                    Some((_, _, g)) => *g += gain,
                    None => entries.push((i, o, gain)),
                }
            }
        }

        MixMatrix { entries, out_channels: dst.channel_count() }
    }

    /// Gets the gain from an input channel to an output channel.
    pub fn gain(&self, input: usize, output: usize) -> f32 {
        self.entries
            .iter()
            .filter(|(i, o, _)| *i == input && *o == output)
            .map(|(_, _, gain)| gain)
            .sum()
    }

    pub fn apply(&self, input: &Frame, output: &mut Frame) {
        output.set_samples(input.samples());
        output.clear();

        for &(i, o, gain) in self.entries.iter() {
            if o >= self.out_channels {
                continue;
            }

            for (d, s) in output.plane_mut(o).iter_mut().zip(input.plane(i)) {
                *d += gain * s;
            }
        }
    }
}
