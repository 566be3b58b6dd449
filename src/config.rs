//! Ambient configuration surface: a small `ini`-style section reader for
//! `tones.conf`, plus the plain structs an embedder fills in from
//! `openzap.conf`/`modules.conf`. Parsing those two is the excluded
//! collaborator's job; only the tone-map section reader (§4.9) is in
//! scope here.

use std::collections::HashMap;

use crate::span::{AnalogStartType, TrunkType};
use crate::tone::ConfigSource;

/// An in-memory `[section]` / `key = value` document, good enough to drive
/// [`crate::tone::load_tone_map`] without pulling in a generic config
/// parser crate.
#[derive(Debug, Clone, Default)]
pub struct IniDocument {
    sections: HashMap<String, Vec<(String, String)>>,
}

impl IniDocument {
    pub fn parse(text: &str) -> Self {
        let mut sections: HashMap<String, Vec<(String, String)>> = HashMap::new();
        let mut current = String::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                continue;
            }
            if let Some(name) = line.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
                current = name.trim().to_string();
                sections.entry(current.clone()).or_default();
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                sections
                    .entry(current.clone())
                    .or_default()
                    .push((key.trim().to_string(), value.trim().to_string()));
            }
        }
        Self { sections }
    }
}

impl ConfigSource for IniDocument {
    fn section(&self, section: &str) -> Option<Vec<(String, String)>> {
        self.sections.get(section).cloned()
    }
}

/// A single `openzap.conf` span stanza: enough to call
/// [`crate::registry::Registry::create_span`].
#[derive(Debug, Clone)]
pub struct SpanConfig {
    pub name: String,
    pub trunk_type: TrunkType,
    pub start_type: AnalogStartType,
    pub num_channels: usize,
    pub driver_name: String,
    pub tone_map_section: Option<String>,
    pub dtmf_hangup: Option<String>,
}

/// A `modules.conf` entry: a driver name to autoload if not already
/// registered.
#[derive(Debug, Clone)]
pub struct ModuleConfig {
    pub driver_name: String,
}
