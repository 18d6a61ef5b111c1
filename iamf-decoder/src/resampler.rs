// IAMF-RS
// Copyright (c) 2024 The IAMF-RS Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Sample rate conversion of the presentation output.

use log::debug;
use rubato::Resampler as _;

use iamf_core::errors::{config_error, topology_error, Result};

use crate::frame::Frame;

/// Converts the sample rate of planar audio. Input that does not fill a whole chunk is carried
/// to the next call.
pub struct Resampler {
    resampler: rubato::FftFixedIn<f32>,
    /// Input samples waiting for a whole chunk.
    pending: Vec<Vec<f32>>,
    output: Vec<Vec<f32>>,
    out: Frame,
}

impl Resampler {
    pub fn try_new(
        from_sample_rate: u32,
        to_sample_rate: u32,
        chunk_size: usize,
        channels: usize,
    ) -> Result<Self> {
        let resampler = match rubato::FftFixedIn::<f32>::new(
            from_sample_rate as usize,
            to_sample_rate as usize,
            chunk_size,
            2,
            channels,
        ) {
            Ok(resampler) => resampler,
            Err(err) => {
                debug!("resampler: {}", err);
                return config_error("resampler: unsupported conversion");
            }
        };

        let output = resampler.output_buffer_allocate(true);

        Ok(Resampler {
            resampler,
            pending: vec![Vec::with_capacity(2 * chunk_size); channels],
            output,
            out: Frame::new(channels, 2 * output_len(from_sample_rate, to_sample_rate, chunk_size)),
        })
    }

    /// Resample the trimmed samples of a frame. Returns every whole chunk of output that could
    /// be produced.
    pub fn push(&mut self, input: &Frame) -> Result<&Frame> {
        let start = input.strim.min(input.samples());
        let end = start.max(input.samples().saturating_sub(input.etrim));

        for (ch, pending) in self.pending.iter_mut().enumerate() {
            pending.extend_from_slice(&input.plane(ch)[start..end]);
        }

        self.out.set_samples(0);

        while self.pending[0].len() >= self.resampler.input_frames_next() {
            let (used, written) = match self.resampler.process_into_buffer(
                &self.pending,
                &mut self.output,
                None,
            ) {
                Ok(counts) => counts,
                Err(err) => {
                    debug!("resampler: {}", err);
                    return topology_error("resampler: process failed");
                }
            };

            self.append(written);

            for pending in self.pending.iter_mut() {
                pending.drain(..used);
            }
        }

        Ok(&self.out)
    }

    /// Resample any carried input, padded with silence to a whole chunk.
    pub fn flush(&mut self) -> Result<&Frame> {
        self.out.set_samples(0);

        if self.pending[0].is_empty() {
            return Ok(&self.out);
        }

        let written = match self.resampler.process_partial_into_buffer(
            Some(self.pending.as_slice()),
            &mut self.output,
            None,
        ) {
            Ok((_, written)) => written,
            Err(err) => {
                debug!("resampler: {}", err);
                return topology_error("resampler: process failed");
            }
        };

        self.append(written);
        self.pending.iter_mut().for_each(|pending| pending.clear());

        Ok(&self.out)
    }

    fn append(&mut self, written: usize) {
        let offset = self.out.samples();
        self.out.set_samples(offset + written);

        for (ch, output) in self.output.iter().enumerate() {
            self.out.plane_mut(ch)[offset..].copy_from_slice(&output[..written]);
        }
    }
}

/// Gets the nominal number of output samples for a chunk of input samples.
fn output_len(from_sample_rate: u32, to_sample_rate: u32, chunk_size: usize) -> usize {
    let len = chunk_size as u64 * u64::from(to_sample_rate);
    len.div_ceil(u64::from(from_sample_rate.max(1))) as usize
}
