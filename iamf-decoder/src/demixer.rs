// IAMF-RS
// Copyright (c) 2024 The IAMF-RS Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Scalable channel demixing.
//!
//! A scalable channel audio element codes a base layer and enhancement layers. Each layer only
//! transmits the channels that cannot be derived from the layers below it. The demixer
//! reconstructs the other channels of a layer from the channels already available using the
//! downmix relations of the encoder, inverted.

use log::warn;

use iamf_core::audio::{Channel, LoudspeakerLayout};
use iamf_core::errors::{topology_error, Result};

/// Demixing weights (alpha, beta, gamma, delta, w_idx_offset) indexed by demixing mode.
/// Modes 3 and 7 are reserved.
const DEMIXING_MODES: [Option<(f32, f32, f32, f32, i8)>; 8] = [
    Some((1.0, 1.0, 0.707, 0.707, -1)),
    Some((0.707, 0.707, 0.707, 0.707, -1)),
    Some((1.0, 0.866, 0.866, 0.866, -1)),
    None,
    Some((1.0, 1.0, 0.707, 0.707, 1)),
    Some((0.707, 0.707, 0.707, 0.707, 1)),
    Some((1.0, 0.866, 0.866, 0.866, 1)),
    None,
];

/// Height downmix weights indexed by the weight index.
const W_TABLE: [f32; 11] =
    [0.0, 0.0179, 0.0391, 0.0658, 0.1038, 0.25, 0.3962, 0.4342, 0.4609, 0.4821, 0.5];

const MAX_W_IDX: i16 = 10;

/// The weight of the center channel in the 3.1.2 to stereo downmix.
const CENTER_GAIN: f32 = 0.707;

/// Planar audio for every channel label, with a record of which channels hold valid audio for
/// the current frame.
#[derive(Debug)]
pub struct ChannelStore {
    planes: Vec<Vec<f32>>,
    present: u32,
    samples: usize,
}

impl ChannelStore {
    pub fn new(capacity: usize) -> Self {
        ChannelStore { planes: vec![vec![0.0; capacity]; Channel::COUNT], present: 0, samples: 0 }
    }

    /// Invalidate all channels and prepare for a frame of `samples` samples.
    pub fn reset(&mut self, samples: usize) {
        for plane in self.planes.iter_mut() {
            if plane.len() < samples {
                plane.resize(samples, 0.0);
            }
        }
        self.present = 0;
        self.samples = samples;
    }

    pub fn samples(&self) -> usize {
        self.samples
    }

    /// Returns `true` if the channel holds valid audio.
    pub fn has(&self, ch: Channel) -> bool {
        self.present & (1 << ch.index()) != 0
    }

    pub fn plane(&self, ch: Channel) -> &[f32] {
        &self.planes[ch.index()][..self.samples]
    }

    /// Gets a channel for writing and marks it as valid.
    pub fn plane_mut(&mut self, ch: Channel) -> &mut [f32] {
        self.present |= 1 << ch.index();
        &mut self.planes[ch.index()][..self.samples]
    }

    /// Scales a channel.
    pub fn scale(&mut self, ch: Channel, gain: f32) {
        if gain != 1.0 {
            for s in self.planes[ch.index()][..self.samples].iter_mut() {
                *s *= gain;
            }
        }
    }

    /// Writes `out = f(a, b, c)` sample by sample.
    fn combine<F>(&mut self, out: Channel, inputs: [Channel; 3], f: F)
    where
        F: Fn(f32, f32, f32) -> f32,
    {
        let mut dst = std::mem::take(&mut self.planes[out.index()]);

        let a = &self.planes[inputs[0].index()];
        let b = &self.planes[inputs[1].index()];
        let c = &self.planes[inputs[2].index()];

        for (i, s) in dst[..self.samples].iter_mut().enumerate() {
            *s = f(a[i], b[i], c[i]);
        }

        self.planes[out.index()] = dst;
        self.present |= 1 << out.index();
    }
}

/// Reconstructs the channels of scalable channel layers.
#[derive(Debug)]
pub struct Demixer {
    default_mode: u8,
    weights: (f32, f32, f32, f32, i8),
    w_idx: i16,
}

impl Demixer {
    /// Create a demixer with the default demixing mode and weight index of an audio element.
    pub fn new(default_mode: u8, default_w: u8) -> Self {
        let weights = match DEMIXING_MODES.get(usize::from(default_mode)).copied().flatten() {
            Some(weights) => weights,
            None => {
                warn!("demixer: default demixing mode {} is reserved", default_mode);
                DEMIXING_MODES[0].unwrap_or((1.0, 1.0, 0.707, 0.707, -1))
            }
        };

        Demixer {
            default_mode,
            weights,
            w_idx: i16::from(default_w).clamp(0, MAX_W_IDX),
        }
    }

    /// Gets the current weight index.
    pub fn w_idx(&self) -> usize {
        self.w_idx as usize
    }

    /// Selects the demixing mode for the next frame and steps the weight index. If `mode` is
    /// `None` or reserved, the default mode of the element is used.
    pub fn update(&mut self, mode: Option<u8>) {
        let mode = mode.unwrap_or(self.default_mode);

        match DEMIXING_MODES.get(usize::from(mode)).copied().flatten() {
            Some(weights) => self.weights = weights,
            None => {
                warn!("demixer: demixing mode {} is reserved, using the default", mode);

                let default = DEMIXING_MODES.get(usize::from(self.default_mode)).copied().flatten();
                if let Some(weights) = default {
                    self.weights = weights;
                }
            }
        }

        self.w_idx = (self.w_idx + i16::from(self.weights.4)).clamp(0, MAX_W_IDX);
    }

    /// Reconstructs every channel of `layout` that is not present in the store.
    ///
    /// Returns a mask, indexed by `Channel::index`, of the channels that were reconstructed.
    pub fn demix(&self, store: &mut ChannelStore, layout: LoudspeakerLayout) -> Result<u32> {
        let before = store.present;

        for &ch in layout.channels() {
            self.derive(store, ch)?;
        }

        Ok(store.present & !before)
    }

    fn derive(&self, store: &mut ChannelStore, ch: Channel) -> Result<()> {
        use Channel::*;

        if store.has(ch) {
            return Ok(());
        }

        let (alpha, beta, gamma, delta, _) = self.weights;
        let w = W_TABLE[self.w_idx as usize];

        // Each channel is reconstructed from the channel it was downmixed into, and the
        // transmitted channel of the layer that replaced it.
        match ch {
            R2 => {
                self.require(store, &[Mono, L2])?;
                store.combine(R2, [Mono, L2, L2], |m, l, _| 2.0 * m - l);
            }
            L3 | R3 => {
                let src = if ch == L3 { L2 } else { R2 };
                self.require(store, &[src, C])?;
                store.combine(ch, [src, C, C], |x, c, _| x - CENTER_GAIN * c);
            }
            Ls5 | Rs5 => {
                let (x3, x5) = if ch == Ls5 { (L3, L5) } else { (R3, R5) };
                self.require(store, &[x3, x5])?;
                store.combine(ch, [x3, x5, x5], |x3, x5, _| (x3 - x5) / delta);
            }
            Lrs7 | Rrs7 => {
                let (s5, ss7) = if ch == Lrs7 { (Ls5, Lss7) } else { (Rs5, Rss7) };
                self.require(store, &[s5, ss7])?;
                store.combine(ch, [s5, ss7, ss7], |s5, ss7, _| (s5 - alpha * ss7) / beta);
            }
            Ltf2 | Rtf2 => {
                let (tf3, x3, x5) = if ch == Ltf2 { (Ltf3, L3, L5) } else { (Rtf3, R3, R5) };
                self.require(store, &[tf3, x3, x5])?;
                store.combine(ch, [tf3, x3, x5], |tf3, x3, x5| tf3 - w * (x3 - x5));
            }
            Ltb4 | Rtb4 => {
                let (tf2, tf4) = if ch == Ltb4 { (Ltf2, Ltf4) } else { (Rtf2, Rtf4) };
                self.require(store, &[tf2, tf4])?;
                store.combine(ch, [tf2, tf4, tf4], |tf2, tf4, _| (tf2 - tf4) / gamma);
            }
            _ => {
                warn!("demixer: channel {} was not transmitted", ch);
                return topology_error("demixer: missing transmitted channel");
            }
        }

        Ok(())
    }

    fn require(&self, store: &mut ChannelStore, inputs: &[Channel]) -> Result<()> {
        for &input in inputs {
            self.derive(store, input)?;
        }
        Ok(())
    }
}
