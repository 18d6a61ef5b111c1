// IAMF-RS
// Copyright (c) 2024 The IAMF-RS Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The descriptor database accumulates the descriptor OBUs of an IA sequence and indexes them.

use bitflags::bitflags;
use hashbrown::HashMap;
use log::{debug, warn};

use iamf_core::errors::{config_error, decode_error, invalid_state_error, Error, Result};
use iamf_format_obu::param::{ParamDefinition, ParamKind};
use iamf_format_obu::{AudioElement, CodecConfig, MixPresentation, Obu, Profile, SequenceHeader};

bitflags! {
    /// Progress of descriptor ingestion.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
    pub struct DescriptorFlags: u8 {
        /// The IA sequence header (magic code) was received.
        const MAGIC_CODE       = 0x01;
        const CODEC_CONFIG     = 0x02;
        const AUDIO_ELEMENT    = 0x04;
        const MIX_PRESENTATION = 0x08;
        /// The viewers were built.
        const CONFIG           = 0x10;
        /// A non-descriptor OBU was received after the descriptors.
        const FRAME_START      = 0x20;

        const DESCRIPTORS = Self::MAGIC_CODE.bits()
            | Self::CODEC_CONFIG.bits()
            | Self::AUDIO_ELEMENT.bits()
            | Self::MIX_PRESENTATION.bits();
    }
}

/// The object that declared a parameter.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ParamParent {
    /// A demixing or recon gain parameter of an audio element.
    AudioElement(u64),
    /// A mix gain parameter of a mix presentation.
    MixPresentation(u64),
}

/// The default value of a parameter.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum ParamDefault {
    /// A mix gain in decibels.
    MixGain(f32),
    /// A demixing mode and weight index.
    Demixing { mode: u8, w_idx: u8 },
    /// Recon gains default to unity.
    ReconGain,
}

/// An entry of the parameter viewer.
#[derive(Clone, Debug)]
pub struct ParamInfo {
    pub kind: ParamKind,
    pub parent: ParamParent,
    pub definition: ParamDefinition,
    pub default: ParamDefault,
    /// For recon gain parameters, the recon gain presence of each layer of the parent element.
    pub recon_gain_layers: Vec<bool>,
}

/// An entry of the element viewer: an audio element with its resolved codec config.
#[derive(Copy, Clone, Debug)]
pub struct ElementEntry<'a> {
    pub element: &'a AudioElement,
    pub codec_config: &'a CodecConfig,
}

/// The descriptor database.
///
/// The database owns every descriptor. The element and parameter viewers built by
/// [`Database::build_viewers`] are id indices into the owned descriptors.
#[derive(Default)]
pub struct Database {
    sequence_header: Option<SequenceHeader>,
    codec_configs: HashMap<u64, CodecConfig>,
    elements: HashMap<u64, AudioElement>,
    /// Mix presentations in the order they were received.
    mix_presentations: Vec<MixPresentation>,
    mix_presentation_index: HashMap<u64, usize>,
    /// Element id to codec config id.
    element_viewer: HashMap<u64, u64>,
    param_viewer: HashMap<u64, ParamInfo>,
    flags: DescriptorFlags,
}

impl Database {
    pub fn new() -> Self {
        Default::default()
    }

    /// Drop all descriptors.
    pub fn reset(&mut self) {
        *self = Default::default();
    }

    pub fn flags(&self) -> DescriptorFlags {
        self.flags
    }

    /// Marks that a non-descriptor OBU was received.
    pub fn set_frame_start(&mut self) {
        self.flags |= DescriptorFlags::FRAME_START;
    }

    /// Returns `true` if every descriptor required to build the viewers was received.
    pub fn is_complete(&self) -> bool {
        self.flags.contains(DescriptorFlags::DESCRIPTORS)
    }

    /// Adds a descriptor to the database. Returns `true` if the descriptor was inserted.
    ///
    /// Redundant copies are ignored. Non-descriptor OBUs are not accepted.
    pub fn add(&mut self, obu: Obu, redundant: bool) -> Result<bool> {
        if redundant {
            return Ok(false);
        }

        match obu {
            Obu::SequenceHeader(header) => {
                if !header.primary_profile.is_supported() {
                    return Err(Error::Unsupported("decoder: unsupported primary profile"));
                }

                if self.sequence_header.is_some() {
                    return decode_error("decoder: duplicate ia sequence header");
                }

                self.sequence_header = Some(header);
                self.flags |= DescriptorFlags::MAGIC_CODE;
            }
            Obu::CodecConfig(config) => {
                let id = config.codec_config_id;

                if self.codec_configs.contains_key(&id) {
                    return Err(Error::DuplicateId("codec config", id));
                }

                self.codec_configs.insert(id, config);
                self.flags |= DescriptorFlags::CODEC_CONFIG;
            }
            Obu::AudioElement(element) => {
                let id = element.audio_element_id;

                if self.elements.contains_key(&id) {
                    return Err(Error::DuplicateId("audio element", id));
                }

                self.elements.insert(id, element);
                self.flags |= DescriptorFlags::AUDIO_ELEMENT;
            }
            Obu::MixPresentation(mix) => {
                let id = mix.mix_presentation_id;

                if self.mix_presentation_index.contains_key(&id) {
                    return Err(Error::DuplicateId("mix presentation", id));
                }

                self.mix_presentation_index.insert(id, self.mix_presentations.len());
                self.mix_presentations.push(mix);
                self.flags |= DescriptorFlags::MIX_PRESENTATION;
            }
            _ => return invalid_state_error("decoder: not a descriptor"),
        }

        // A new descriptor invalidates the viewers.
        self.flags.remove(DescriptorFlags::CONFIG);

        Ok(true)
    }

    /// Builds the element and parameter viewers.
    ///
    /// Every audio element must reference a known codec config, and every mix presentation must
    /// reference known audio elements.
    pub fn build_viewers(&mut self) -> Result<()> {
        if !self.is_complete() {
            return invalid_state_error("decoder: descriptors are incomplete");
        }

        let mut element_viewer = HashMap::with_capacity(self.elements.len());
        let mut param_viewer = HashMap::new();

        for (&id, element) in self.elements.iter() {
            if !self.codec_configs.contains_key(&element.codec_config_id) {
                warn!(
                    "audio element {} references unknown codec config {}",
                    id, element.codec_config_id
                );
                return config_error("decoder: audio element references an unknown codec config");
            }

            element_viewer.insert(id, element.codec_config_id);

            if let Some(demixing) = &element.demixing {
                let info = ParamInfo {
                    kind: ParamKind::Demixing,
                    parent: ParamParent::AudioElement(id),
                    definition: demixing.base.clone(),
                    default: ParamDefault::Demixing {
                        mode: demixing.default_mode,
                        w_idx: demixing.default_w,
                    },
                    recon_gain_layers: Vec::new(),
                };
                insert_param(&mut param_viewer, info)?;
            }

            if let Some(recon_gain) = &element.recon_gain {
                let info = ParamInfo {
                    kind: ParamKind::ReconGain,
                    parent: ParamParent::AudioElement(id),
                    definition: recon_gain.clone(),
                    default: ParamDefault::ReconGain,
                    recon_gain_layers: element.recon_gain_layers(),
                };
                insert_param(&mut param_viewer, info)?;
            }
        }

        for mix in self.mix_presentations.iter() {
            let parent = ParamParent::MixPresentation(mix.mix_presentation_id);

            for sub_mix in mix.sub_mixes.iter() {
                for sub_element in sub_mix.elements.iter() {
                    if !element_viewer.contains_key(&sub_element.audio_element_id) {
                        warn!(
                            "mix presentation {} references unknown audio element {}",
                            mix.mix_presentation_id, sub_element.audio_element_id
                        );
                        return config_error(
                            "decoder: mix presentation references an unknown audio element",
                        );
                    }

                    let gain = &sub_element.element_mix_gain;
                    insert_param(&mut param_viewer, mix_gain_info(parent, gain))?;
                }

                insert_param(&mut param_viewer, mix_gain_info(parent, &sub_mix.output_mix_gain))?;
            }
        }

        debug!(
            "built viewers: {} audio elements, {} parameters, {} mix presentations",
            element_viewer.len(),
            param_viewer.len(),
            self.mix_presentations.len()
        );

        self.element_viewer = element_viewer;
        self.param_viewer = param_viewer;
        self.flags |= DescriptorFlags::CONFIG;

        Ok(())
    }

    /// Gets the profile of the IA sequence. The additional profile is used if it is supported.
    pub fn profile(&self) -> Option<Profile> {
        self.sequence_header.map(|header| {
            if header.additional_profile.is_supported() {
                header.additional_profile
            }
            else {
                header.primary_profile
            }
        })
    }

    /// Gets an audio element and its codec config from the element viewer.
    pub fn element(&self, id: u64) -> Option<ElementEntry<'_>> {
        let codec_config_id = self.element_viewer.get(&id)?;

        Some(ElementEntry {
            element: self.elements.get(&id)?,
            codec_config: self.codec_configs.get(codec_config_id)?,
        })
    }

    /// Gets a parameter from the parameter viewer.
    pub fn param(&self, id: u64) -> Option<&ParamInfo> {
        self.param_viewer.get(&id)
    }

    /// Gets an iterator over all parameters of the parameter viewer.
    pub fn params(&self) -> impl Iterator<Item = (u64, &ParamInfo)> + '_ {
        self.param_viewer.iter().map(|(id, info)| (*id, info))
    }

    /// Gets a mix presentation by id.
    pub fn mix_presentation(&self, id: u64) -> Option<&MixPresentation> {
        self.mix_presentation_index.get(&id).map(|&idx| &self.mix_presentations[idx])
    }

    /// Gets all mix presentations in the order they were received.
    pub fn mix_presentations(&self) -> &[MixPresentation] {
        &self.mix_presentations
    }
}

fn mix_gain_info(
    parent: ParamParent,
    gain: &iamf_format_obu::param::MixGainParamDefinition,
) -> ParamInfo {
    ParamInfo {
        kind: ParamKind::MixGain,
        parent,
        definition: gain.base.clone(),
        default: ParamDefault::MixGain(gain.default_mix_gain),
        recon_gain_layers: Vec::new(),
    }
}

fn insert_param(viewer: &mut HashMap<u64, ParamInfo>, info: ParamInfo) -> Result<()> {
    let id = info.definition.parameter_id;

    match viewer.get(&id) {
        // Mix gain parameters may be shared by several sub-mixes.
        Some(prev) if prev.kind == info.kind && prev.kind == ParamKind::MixGain => Ok(()),
        Some(_) => Err(Error::DuplicateId("parameter", id)),
        None => {
            viewer.insert(id, info);
            Ok(())
        }
    }
}
