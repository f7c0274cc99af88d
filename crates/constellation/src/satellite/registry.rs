// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Registry of satellite types.
//!
//! Satellite types register a constructor under their type name and are
//! instantiated by name. This replaces native plugin loading: every type
//! is a value implementing [`Satellite`], linked into the binary.

use std::collections::BTreeMap;

use crate::satellite::Satellite;

/// Constructor building a satellite instance from its instance name.
pub type SatelliteGenerator = Box<dyn Fn(&str) -> Box<dyn Satellite> + Send + Sync>;

/// Maps satellite type names to constructors.
#[derive(Default)]
pub struct SatelliteRegistry {
    generators: BTreeMap<String, SatelliteGenerator>,
}

impl SatelliteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a type. A later registration under the same name replaces
    /// the earlier one.
    pub fn register(&mut self, type_name: impl Into<String>, generator: SatelliteGenerator) {
        let type_name = type_name.into();
        log::debug!("[registry] registered satellite type {}", type_name);
        self.generators.insert(type_name, generator);
    }

    /// Instantiate a satellite by type name. Matching is case-insensitive
    /// like CSCP verbs.
    pub fn create(&self, type_name: &str, instance_name: &str) -> Option<Box<dyn Satellite>> {
        let generator = self
            .generators
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(type_name))
            .map(|(_, generator)| generator)?;
        Some(generator(instance_name))
    }

    /// Registered type names.
    pub fn type_names(&self) -> Vec<&str> {
        self.generators.keys().map(String::as_str).collect()
    }
}
