// IAMF-RS
// Copyright (c) 2024 The IAMF-RS Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Planar audio frames and scratch buffers.

/// The number of scratch buffers of a stream decoder.
pub const DEC_BUF_CNT: usize = 3;

/// A planar frame of audio with its trim window and presentation timestamp.
#[derive(Clone, Debug, Default)]
pub struct Frame {
    planes: Vec<Vec<f32>>,
    samples: usize,
    /// The number of samples to trim from the start of the frame.
    pub strim: usize,
    /// The number of samples to trim from the end of the frame.
    pub etrim: usize,
    /// The timestamp of the first sample, in samples.
    pub pts: u64,
}

impl Frame {
    /// Create a frame of `channels` channels that can hold `capacity` samples per channel.
    pub fn new(channels: usize, capacity: usize) -> Self {
        let planes = vec![vec![0.0; capacity]; channels];
        Frame { planes, samples: 0, strim: 0, etrim: 0, pts: 0 }
    }

    pub fn channel_count(&self) -> usize {
        self.planes.len()
    }

    /// Gets the number of samples per channel.
    pub fn samples(&self) -> usize {
        self.samples
    }

    /// Sets the number of samples per channel, growing the planes if required. New samples are
    /// silent.
    pub fn set_samples(&mut self, samples: usize) {
        for plane in self.planes.iter_mut() {
            if plane.len() < samples {
                plane.resize(samples, 0.0);
            }
        }
        self.samples = samples;
    }

    /// Copy the trim window and timestamp of another frame.
    pub fn copy_timing(&mut self, other: &Frame) {
        self.strim = other.strim;
        self.etrim = other.etrim;
        self.pts = other.pts;
    }

    /// Gets the number of samples remaining after trimming.
    pub fn trimmed_len(&self) -> usize {
        self.samples.saturating_sub(self.strim + self.etrim)
    }

    pub fn plane(&self, ch: usize) -> &[f32] {
        &self.planes[ch][..self.samples]
    }

    pub fn plane_mut(&mut self, ch: usize) -> &mut [f32] {
        &mut self.planes[ch][..self.samples]
    }

    /// Gets the untrimmed samples of every channel.
    pub fn planes(&self) -> impl Iterator<Item = &[f32]> + '_ {
        self.planes.iter().map(move |plane| &plane[..self.samples])
    }

    /// Silence all samples.
    pub fn clear(&mut self) {
        for plane in self.planes.iter_mut() {
            plane[..self.samples].fill(0.0);
        }
    }
}

/// A fixed arena of reusable scratch buffers.
///
/// Buffers are handed out in rotation so that the outputs of consecutive decode steps do not
/// alias.
#[derive(Debug)]
pub struct BufferPool {
    slots: [Vec<f32>; DEC_BUF_CNT],
    next: usize,
}

impl BufferPool {
    /// Create a pool where every buffer holds `len` samples.
    pub fn new(len: usize) -> Self {
        BufferPool { slots: std::array::from_fn(|_| vec![0.0; len]), next: 0 }
    }

    /// Gets the next buffer of the rotation, grown to at least `len` samples.
    pub fn next(&mut self, len: usize) -> &mut [f32] {
        let slot = &mut self.slots[self.next];
        self.next = (self.next + 1) % DEC_BUF_CNT;

        if slot.len() < len {
            slot.resize(len, 0.0);
        }

        &mut slot[..len]
    }
}
