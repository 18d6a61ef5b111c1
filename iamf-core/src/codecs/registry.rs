// IAMF-RS
// Copyright (c) 2024 The IAMF-RS Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Registry for codecs to support lookup and instantiation of decoders dynamically at runtime.

use hashbrown::HashMap;
use log::debug;

use crate::codecs::{AudioDecoder, CodecId, CodecInfo, CodecParameters, Tier};
use crate::errors::{unsupported_error, Result};

/// Description of a supported codec.
#[derive(Copy, Clone, Debug)]
pub struct SupportedCodec {
    pub id: CodecId,
    pub info: CodecInfo,
}

/// To support registration in a codec registry, an `AudioDecoder` must implement the
/// `RegisterableAudioDecoder` trait.
pub trait RegisterableAudioDecoder: AudioDecoder {
    fn try_registry_new(params: &CodecParameters) -> Result<Box<dyn AudioDecoder>>
    where
        Self: Sized;

    /// Get a list of codecs supported by this decoder.
    fn supported_codecs() -> &'static [SupportedCodec];
}

/// `AudioDecoder` factory function. Creates a boxed `AudioDecoder`.
pub type AudioDecoderFactoryFn = fn(&CodecParameters) -> Result<Box<dyn AudioDecoder>>;

/// Registration details of a decoder for a particular codec.
pub struct RegisteredAudioDecoder {
    /// Codec details.
    pub codec: SupportedCodec,
    /// Factory function to instantiate the decoder.
    pub factory: AudioDecoderFactoryFn,
}

/// A `CodecRegistry` allows the registration of codecs, and provides a method to instantiate an
/// `AudioDecoder` given a `CodecParameters` object.
#[derive(Default)]
pub struct CodecRegistry {
    preferred: HashMap<CodecId, RegisteredAudioDecoder>,
    standard: HashMap<CodecId, RegisteredAudioDecoder>,
    fallback: HashMap<CodecId, RegisteredAudioDecoder>,
}

impl CodecRegistry {
    /// Instantiate a new `CodecRegistry`.
    pub fn new() -> Self {
        Default::default()
    }

    /// Get the registration information of the most preferred decoder for the specified codec.
    pub fn get_audio_decoder(&self, id: CodecId) -> Option<&RegisteredAudioDecoder> {
        self.preferred
            .get(&id)
            .or_else(|| self.standard.get(&id))
            .or_else(|| self.fallback.get(&id))
    }

    /// Registers all codecs supported by the decoder at the standard tier.
    ///
    /// If a supported codec was previously registered by another decoder at the same tier, it
    /// will be replaced within the registry.
    pub fn register_audio_decoder<C: RegisterableAudioDecoder>(&mut self) {
        self.register_audio_decoder_at_tier::<C>(Tier::Standard);
    }

    /// Registers all codecs supported by the decoder at a specific tier.
    pub fn register_audio_decoder_at_tier<C: RegisterableAudioDecoder>(&mut self, tier: Tier) {
        let map = match tier {
            Tier::Preferred => &mut self.preferred,
            Tier::Standard => &mut self.standard,
            Tier::Fallback => &mut self.fallback,
        };

        for codec in C::supported_codecs() {
            let reg = RegisteredAudioDecoder {
                codec: *codec,
                factory: |params| C::try_registry_new(params),
            };

            map.insert(codec.id, reg);
        }
    }

    /// Instantiate a decoder for the specified codec parameters.
    ///
    /// If a suitable decoder could not be found, or the decoder could not be instantiated, an
    /// error will be returned.
    pub fn make_audio_decoder(&self, params: &CodecParameters) -> Result<Box<dyn AudioDecoder>> {
        if let Some(codec) = self.get_audio_decoder(params.codec) {
            debug!(
                "instantiating {} decoder for {} substreams ({} coupled)",
                codec.codec.info.short_name, params.num_streams, params.num_coupled_streams
            );
            Ok((codec.factory)(params)?)
        }
        else {
            unsupported_error("core (codec): unsupported codec")
        }
    }
}

/// Convenience macro for declaring a `SupportedCodec`.
#[macro_export]
macro_rules! support_audio_codec {
    ($id:expr, $short_name:expr, $long_name:expr) => {
        iamf_core::codecs::registry::SupportedCodec {
            id: $id,
            info: iamf_core::codecs::CodecInfo { short_name: $short_name, long_name: $long_name },
        }
    };
}
