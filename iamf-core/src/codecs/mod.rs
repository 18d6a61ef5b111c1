// IAMF-RS
// Copyright (c) 2024 The IAMF-RS Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `codecs` module provides the uniform interface to the codec backends that decode the
//! substreams of an audio element.
//!
//! # Nomenclature
//!
//! * A codec ID is the four character code carried by a codec config OBU.
//! * A substream is one independently coded mono or coupled (stereo) stream.
//! * A codec decoder instance decodes a group of substreams into interleaved PCM.

use std::fmt;

use crate::errors::Result;

pub mod registry;

/// A four character code identifying a codec.
#[repr(transparent)]
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CodecId(u32);

impl CodecId {
    /// Create a codec ID from a four character code.
    pub const fn from_fourcc(cc: [u8; 4]) -> Self {
        CodecId(u32::from_be_bytes(cc))
    }

    /// Get the four character code.
    pub const fn fourcc(&self) -> [u8; 4] {
        self.0.to_be_bytes()
    }
}

impl fmt::Debug for CodecId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CodecId({})", self)
    }
}

impl fmt::Display for CodecId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.fourcc() {
            if byte.is_ascii_graphic() || byte == b' ' {
                write!(f, "{}", byte as char)?;
            }
            else {
                write!(f, "\\x{:02x}", byte)?;
            }
        }
        Ok(())
    }
}

/// Opus.
pub const CODEC_ID_OPUS: CodecId = CodecId::from_fourcc(*b"Opus");
/// AAC-LC.
pub const CODEC_ID_AAC: CodecId = CodecId::from_fourcc(*b"mp4a");
/// FLAC.
pub const CODEC_ID_FLAC: CodecId = CodecId::from_fourcc(*b"fLaC");
/// Linear PCM.
pub const CODEC_ID_LPCM: CodecId = CodecId::from_fourcc(*b"ipcm");

/// Basic information about a codec.
#[derive(Copy, Clone, Debug)]
pub struct CodecInfo {
    /// A short ASCII-only string identifying the codec.
    pub short_name: &'static str,
    /// A longer, more descriptive, string identifying the codec.
    pub long_name: &'static str,
}

/// The precedence of a registered codec decoder.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Tier {
    /// Prefer over others.
    Preferred,
    /// Standard tier. First-party decoders are registered at this level.
    Standard,
    /// Use as a fallback if nothing else is available.
    Fallback,
}

/// Parameters used to instantiate a codec decoder for a group of substreams.
#[derive(Clone, Debug)]
pub struct CodecParameters {
    /// The codec ID.
    pub codec: CodecId,
    /// The sample rate of the decoded audio in Hz.
    pub sample_rate: u32,
    /// The number of samples per channel in every audio frame.
    pub frames_per_packet: u32,
    /// The number of frames that must be decoded before the output is valid.
    pub roll_distance: i16,
    /// The number of substreams decoded by one decoder instance.
    pub num_streams: usize,
    /// The number of coupled (two channel) substreams. Coupled substreams come first.
    pub num_coupled_streams: usize,
    /// Codec specific configuration data.
    pub extra_data: Box<[u8]>,
}

impl CodecParameters {
    pub fn new(codec: CodecId) -> CodecParameters {
        CodecParameters {
            codec,
            sample_rate: 0,
            frames_per_packet: 0,
            roll_distance: 0,
            num_streams: 0,
            num_coupled_streams: 0,
            extra_data: Box::new([]),
        }
    }

    /// Provide the sample rate in Hz.
    pub fn with_sample_rate(&mut self, sample_rate: u32) -> &mut Self {
        self.sample_rate = sample_rate;
        self
    }

    /// Provide the number of samples per channel in every frame.
    pub fn with_frames_per_packet(&mut self, len: u32) -> &mut Self {
        self.frames_per_packet = len;
        self
    }

    /// Provide the roll distance.
    pub fn with_roll_distance(&mut self, roll_distance: i16) -> &mut Self {
        self.roll_distance = roll_distance;
        self
    }

    /// Provide the substream counts.
    pub fn with_streams(&mut self, num_streams: usize, num_coupled_streams: usize) -> &mut Self {
        self.num_streams = num_streams;
        self.num_coupled_streams = num_coupled_streams;
        self
    }

    /// Provide codec specific configuration data.
    pub fn with_extra_data(&mut self, data: Box<[u8]>) -> &mut Self {
        self.extra_data = data;
        self
    }

    /// Gets the number of decoded channels.
    pub fn channel_count(&self) -> usize {
        self.num_streams + self.num_coupled_streams
    }
}

/// An `AudioDecoder` implements a codec's decode algorithm for a group of substreams. It
/// consumes one packet per substream and produces interleaved PCM samples in the range [-1, 1].
///
/// Closing a decoder is dropping it.
pub trait AudioDecoder: Send + Sync {
    /// Reset the decoder.
    ///
    /// A decoder must be reset when the next packet is discontinuous with respect to the last
    /// decoded packet.
    fn reset(&mut self);

    /// Get basic information about the codec.
    fn codec_info(&self) -> &CodecInfo;

    /// Gets the parameters the decoder was instantiated with.
    fn codec_params(&self) -> &CodecParameters;

    /// Gets the number of samples per channel of priming delay at the start of the stream.
    fn delay(&self) -> usize {
        0
    }

    /// Decodes one packet per substream into `out`, which holds interleaved samples for all
    /// channels of the decoder. Coupled substreams produce two channels each, mono substreams
    /// one, in substream order. At most `frame_size` samples per channel are written.
    ///
    /// Returns the number of samples per channel decoded. If an error is returned, the packets
    /// are undecodeable and the frame should be dropped. Decoding may continue with the next
    /// set of packets.
    fn decode(&mut self, packets: &[&[u8]], out: &mut [f32], frame_size: usize) -> Result<usize>;
}
