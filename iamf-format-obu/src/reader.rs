// IAMF-RS
// Copyright (c) 2024 The IAMF-RS Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use iamf_core::errors::{decode_error, Error, Result};
use iamf_core::io::{BufReader, FiniteStream, ReadBytes};

use log::{trace, warn};

use crate::header::{ObuHeader, ObuPreamble, ObuType};
use crate::{AudioElement, AudioFrame, CodecConfig, MixPresentation, Obu, RawParameterBlock};
use crate::SequenceHeader;

/// The result of reading one OBU.
#[derive(Debug)]
pub enum ReadStatus {
    /// An OBU was read. `consumed` bytes of input were used.
    Obu { header: ObuHeader, obu: Obu, consumed: usize },
    /// The input ends inside an OBU. No input was consumed.
    NeedMoreData,
}

/// Returns `true` if the error was caused by the reader running out of input.
fn is_underrun(err: &Error) -> bool {
    matches!(err, Error::IoError(err) if err.kind() == std::io::ErrorKind::UnexpectedEof)
}

/// Read one OBU from the start of `buf`.
///
/// If `buf` does not contain a complete OBU, `ReadStatus::NeedMoreData` is returned and the
/// caller should retry with more data.
pub fn read_obu(buf: &[u8]) -> Result<ReadStatus> {
    let mut reader = BufReader::new(buf);

    let preamble = match ObuPreamble::read(&mut reader) {
        Ok(preamble) => preamble,
        Err(err) if is_underrun(&err) => return Ok(ReadStatus::NeedMoreData),
        Err(err) => return Err(err),
    };

    let size_len = reader.bytes_read() as usize;

    if preamble.obu_size > reader.bytes_available() {
        return Ok(ReadStatus::NeedMoreData);
    }

    let consumed = size_len + preamble.obu_size as usize;

    // All further reads are bounded to the OBU.
    let mut reader = BufReader::new(&buf[size_len..consumed]);

    let (trim_end, trim_start) = if preamble.trimming {
        (reader.read_leb128()?, reader.read_leb128()?)
    }
    else {
        (0, 0)
    };

    if preamble.extension {
        let extension_header_size = reader.read_leb128()?;
        reader.ignore_bytes(extension_header_size)?;
    }

    let header = ObuHeader {
        obu_type: preamble.obu_type,
        redundant_copy: preamble.redundant_copy,
        num_samples_to_trim_at_end: trim_end,
        num_samples_to_trim_at_start: trim_start,
        header_len: size_len + reader.bytes_read() as usize,
        payload_len: reader.bytes_available() as usize,
    };

    trace!("obu: {:?}, size={}", header.obu_type, preamble.obu_size);

    let obu = match read_payload(&mut reader, &header) {
        Ok(obu) => obu,
        // A truncated payload within a complete OBU is malformed.
        Err(err) if is_underrun(&err) => {
            warn!("obu: {:?} payload is truncated", header.obu_type);
            return decode_error("obu: truncated payload");
        }
        Err(err) => return Err(err),
    };

    Ok(ReadStatus::Obu { header, obu, consumed })
}

fn read_payload(reader: &mut BufReader<'_>, header: &ObuHeader) -> Result<Obu> {
    let obu = match header.obu_type {
        ObuType::SequenceHeader => Obu::SequenceHeader(SequenceHeader::read(reader)?),
        ObuType::CodecConfig => Obu::CodecConfig(CodecConfig::read(reader)?),
        ObuType::AudioElement => Obu::AudioElement(AudioElement::read(reader)?),
        ObuType::MixPresentation => Obu::MixPresentation(MixPresentation::read(reader)?),
        ObuType::ParameterBlock => Obu::ParameterBlock(RawParameterBlock::read(reader)?),
        ObuType::TemporalDelimiter => Obu::TemporalDelimiter,
        ObuType::AudioFrame | ObuType::AudioFrameId(_) => {
            let substream_id = match header.obu_type {
                ObuType::AudioFrameId(id) => u64::from(id),
                _ => reader.read_leb128()?,
            };

            Obu::AudioFrame(AudioFrame {
                substream_id,
                trim_start: header.num_samples_to_trim_at_start,
                trim_end: header.num_samples_to_trim_at_end,
                data: reader.read_buf_bytes_available_ref().into(),
            })
        }
        ObuType::Reserved(code) => Obu::Reserved(code),
    };
    Ok(obu)
}
