// IAMF-RS
// Copyright (c) 2024 The IAMF-RS Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `errors` module defines the common error type.

use std::error;
use std::fmt;
use std::io;
use std::result;

/// `Error` provides an enumeration of all possible errors reported by the IAMF decoder.
#[derive(Debug)]
pub enum Error {
    /// An IO error occured while reading the bitstream.
    IoError(std::io::Error),
    /// The bitstream contained malformed data and could not be parsed or decoded.
    DecodeError(&'static str),
    /// A descriptor was declared with an id that is already in use within its set.
    DuplicateId(&'static str, u64),
    /// An unsupported codec or bitstream feature was encountered.
    Unsupported(&'static str),
    /// A default or user-defined limit was reached while parsing or decoding. Limits are used to
    /// prevent denial-of-service attacks from malicious streams.
    LimitError(&'static str),
    /// A codec backend failed to decode one frame. The error is local to that frame.
    CodecError(&'static str),
    /// The decoded channel topology or frame alignment did not match the configuration. The
    /// presentation must be reconfigured before decoding can continue.
    TopologyError(&'static str),
    /// A presentation could not be built from the available descriptors.
    ConfigError(&'static str),
    /// An argument passed by the caller was invalid.
    InvalidArgument(&'static str),
    /// The operation is not valid in the current decoder state.
    InvalidState(&'static str),
    /// The decoder needs to be reconfigured before continuing.
    ResetRequired,
}

impl Error {
    /// Returns `true` if the error only invalidates the frame being decoded, and decoding may
    /// continue with the next temporal unit.
    pub fn is_frame_local(&self) -> bool {
        matches!(*self, Error::CodecError(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Error::IoError(ref err) => err.fmt(f),
            Error::DecodeError(msg) => {
                write!(f, "malformed stream: {}", msg)
            }
            Error::DuplicateId(set, id) => {
                write!(f, "malformed stream: duplicate {} id {}", set, id)
            }
            Error::Unsupported(feature) => {
                write!(f, "unsupported feature: {}", feature)
            }
            Error::LimitError(constraint) => {
                write!(f, "limit reached: {}", constraint)
            }
            Error::CodecError(msg) => {
                write!(f, "codec error: {}", msg)
            }
            Error::TopologyError(msg) => {
                write!(f, "topology error: {}", msg)
            }
            Error::ConfigError(msg) => {
                write!(f, "configuration error: {}", msg)
            }
            Error::InvalidArgument(msg) => {
                write!(f, "invalid argument: {}", msg)
            }
            Error::InvalidState(msg) => {
                write!(f, "invalid state: {}", msg)
            }
            Error::ResetRequired => {
                write!(f, "decoder needs to be reconfigured")
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
            Error::IoError(ref err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::IoError(err)
    }
}

pub type Result<T> = result::Result<T, Error>;

/// Convenience function to create a decode error.
pub fn decode_error<T>(desc: &'static str) -> Result<T> {
    Err(Error::DecodeError(desc))
}

/// Convenience function to create an unsupported feature error.
pub fn unsupported_error<T>(feature: &'static str) -> Result<T> {
    Err(Error::Unsupported(feature))
}

/// Convenience function to create a limit error.
pub fn limit_error<T>(constraint: &'static str) -> Result<T> {
    Err(Error::LimitError(constraint))
}

/// Convenience function to create a codec error.
pub fn codec_error<T>(desc: &'static str) -> Result<T> {
    Err(Error::CodecError(desc))
}

/// Convenience function to create a topology error.
pub fn topology_error<T>(desc: &'static str) -> Result<T> {
    Err(Error::TopologyError(desc))
}

/// Convenience function to create a configuration error.
pub fn config_error<T>(desc: &'static str) -> Result<T> {
    Err(Error::ConfigError(desc))
}

/// Convenience function to create an invalid argument error.
pub fn invalid_argument_error<T>(desc: &'static str) -> Result<T> {
    Err(Error::InvalidArgument(desc))
}

/// Convenience function to create an invalid state error.
pub fn invalid_state_error<T>(desc: &'static str) -> Result<T> {
    Err(Error::InvalidState(desc))
}

/// Convenience function to create a reset required error.
pub fn reset_error<T>() -> Result<T> {
    Err(Error::ResetRequired)
}

/// Convenience function to create an end-of-stream error.
pub fn end_of_stream_error<T>() -> Result<T> {
    Err(Error::IoError(io::Error::new(io::ErrorKind::UnexpectedEof, "end of stream")))
}
