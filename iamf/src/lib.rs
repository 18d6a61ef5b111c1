// IAMF-RS
// Copyright (c) 2024 The IAMF-RS Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]

//! # Project IAMF-RS
//!
//! IAMF-RS is a Rust decoder for Immersive Audio Model and Formats (IAMF) streams.
//!
//! # Usage
//!
//! 1. Instantiate an [`IamfDecoder`] with a [`CodecRegistry`] that holds a decoder for every
//!    substream codec. Use [`default::make_decoder`] to get a decoder using the default registry.
//! 2. Pass the descriptor OBUs to [`IamfDecoder::configure`]. Once every descriptor was
//!    received, the decoder selects a mix presentation and builds its processing chain.
//! 3. Pass temporal units to [`IamfDecoder::decode`]. Each complete temporal unit produces one
//!    frame of interleaved PCM, which is available from [`IamfDecoder::last_decoded`].
//! 4. Call [`IamfDecoder::flush`] at the end of the stream to drain buffered samples.
//!
//! The output layout, mix presentation, sample rate, loudness target and sample format can be
//! changed at any time. Changes that affect the processing chain take effect at the next
//! temporal unit.
//!
//! [`CodecRegistry`]: crate::core::codecs::registry::CodecRegistry
//! [`IamfDecoder`]: crate::decoder::IamfDecoder
//! [`IamfDecoder::configure`]: crate::decoder::IamfDecoder::configure
//! [`IamfDecoder::decode`]: crate::decoder::IamfDecoder::decode
//! [`IamfDecoder::last_decoded`]: crate::decoder::IamfDecoder::last_decoded
//! [`IamfDecoder::flush`]: crate::decoder::IamfDecoder::flush
//!
//! # Adding support for new codecs
//!
//! Substream decoders implement the `AudioDecoder` trait of `iamf-core` and are registered on a
//! [`CodecRegistry`] with `register_audio_decoder`.

pub mod default {
    //! The `default` module provides convenience functions and registries to get an implementer
    //! up-and-running as quickly as possible. Using the `default` module is completely optional
    //! and incurs no overhead unless actually used.

    pub mod codecs {
        //! The `codecs` module re-exports all enabled substream decoders.

        #[cfg(feature = "opus")]
        pub use iamf_codec_opus::OpusDecoder;
        #[cfg(feature = "pcm")]
        pub use iamf_codec_pcm::LpcmDecoder;
    }

    use lazy_static::lazy_static;

    use iamf_core::codecs::registry::CodecRegistry;
    use iamf_decoder::{DecoderOptions, IamfDecoder};

    lazy_static! {
        static ref CODEC_REGISTRY: CodecRegistry = {
            let mut registry = CodecRegistry::new();
            register_enabled_codecs(&mut registry);
            registry
        };
    }

    /// Gets the default `CodecRegistry`. This registry pre-registers all the codecs selected by
    /// the `feature` flags in the includer's `Cargo.toml`.
    ///
    /// This function is lazy and does not instantiate the `CodecRegistry` until the first call to
    /// this function.
    pub fn get_codecs() -> &'static CodecRegistry {
        &CODEC_REGISTRY
    }

    /// Registers all the codecs selected by the `feature` flags in the includer's `Cargo.toml` on
    /// the provided `CodecRegistry`.
    pub fn register_enabled_codecs(registry: &mut CodecRegistry) {
        #[cfg(feature = "opus")]
        registry.register_audio_decoder::<codecs::OpusDecoder>();

        #[cfg(feature = "pcm")]
        registry.register_audio_decoder::<codecs::LpcmDecoder>();
    }

    /// Instantiates an `IamfDecoder` that uses the default `CodecRegistry`.
    pub fn make_decoder(options: DecoderOptions) -> IamfDecoder<'static> {
        IamfDecoder::new(get_codecs(), options)
    }
}

pub use iamf_core as core;
pub use iamf_decoder as decoder;
pub use iamf_format_obu as obu;
