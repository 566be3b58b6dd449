//! Tone map representation and the DSP trait seams the media pipeline
//! drives: DTMF detection, FSK demodulation and call-progress tone
//! detection are all per-technology collaborators the core calls through,
//! not internals it reimplements.

use std::collections::HashMap;

use crate::error::{Result, ZtError};

/// The kinds of call-progress/special tones a span can recognise and
/// generate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum ToneKind {
    Dial = 0,
    Ring = 1,
    Busy = 2,
    Congestion = 3,
    CallWaiting = 4,
    Fax = 5,
    /// Not a configurable tone-map entry: a `detected_tones` counter slot
    /// bumped when a CALLWAITING ack digit ('D'/'A') is seen during
    /// DTMF_DETECT, per §4.6.
    CallWaitingAck = 6,
    Attn = 7,
}

pub const MAX_TONE_KINDS: usize = 8;

impl ToneKind {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "dial" => Some(ToneKind::Dial),
            "ring" => Some(ToneKind::Ring),
            "busy" => Some(ToneKind::Busy),
            "congestion" => Some(ToneKind::Congestion),
            "callwaiting" => Some(ToneKind::CallWaiting),
            "fax" => Some(ToneKind::Fax),
            "attn" => Some(ToneKind::Attn),
            _ => None,
        }
    }
}

/// The tone patterns every newly created span carries before any
/// `tones.conf` section is loaded over it, per §4.1's `create_span`.
pub fn default_tone_map() -> ToneMap {
    let mut map = ToneMap::new();
    map.generate.insert(ToneKind::Dial, "350+440".to_string());
    map.detect.insert(ToneKind::Dial, vec![350, 440]);
    map.generate.insert(ToneKind::Ring, "!2000/4000".to_string());
    map.detect.insert(ToneKind::Ring, vec![440, 480]);
    map.generate.insert(ToneKind::Busy, "!500/500".to_string());
    map.detect.insert(ToneKind::Busy, vec![480, 620]);
    map.generate.insert(ToneKind::Attn, "!100/100".to_string());
    map.detect.insert(ToneKind::Attn, vec![1400, 2060, 2450, 2600]);
    map
}

/// A generated-tone cadence as a teletone pattern string (e.g.
/// `"350+440"` for a sustained dial tone, `"!450/500!400/500"` for a
/// two-state cadence) — the pattern grammar itself belongs to the
/// teletone generator collaborator; the core only stores and forwards it.
#[derive(Debug, Clone)]
pub struct ToneMap {
    pub generate: HashMap<ToneKind, String>,
    pub detect: HashMap<ToneKind, Vec<u32>>,
}

impl ToneMap {
    pub fn new() -> Self {
        Self {
            generate: HashMap::new(),
            detect: HashMap::new(),
        }
    }
}

impl Default for ToneMap {
    fn default() -> Self {
        Self::new()
    }
}

/// A source of configuration key/value pairs for one named section, e.g. a
/// `tones.conf` `[us]` section. Parsing the file itself is an external
/// collaborator's job; this seam only exposes already-split lines.
pub trait ConfigSource {
    /// Returns `(key, value)` pairs for `section`, in file order.
    fn section(&self, section: &str) -> Option<Vec<(String, String)>>;
}

/// Load a tone map from `section` of `source`, parsing `detect-<kind>`
/// (comma-separated frequencies) and `generate-<kind>` (pattern string)
/// keys, per §4.9.
pub fn load_tone_map(section: &str, source: &dyn ConfigSource) -> Result<ToneMap> {
    let entries = source
        .section(section)
        .ok_or_else(|| ZtError::fail(format!("no such tone map section: {section}")))?;

    let mut map = ToneMap::new();
    for (key, value) in entries {
        if let Some(name) = key.strip_prefix("detect-") {
            let kind = ToneKind::from_name(name)
                .ok_or_else(|| ZtError::fail(format!("unknown tone kind: {name}")))?;
            let freqs: std::result::Result<Vec<u32>, _> =
                value.split(',').map(|s| s.trim().parse::<u32>()).collect();
            let freqs = freqs.map_err(|_| ZtError::fail(format!("bad frequency list: {value}")))?;
            map.detect.insert(kind, freqs);
        } else if let Some(name) = key.strip_prefix("generate-") {
            let kind = ToneKind::from_name(name)
                .ok_or_else(|| ZtError::fail(format!("unknown tone kind: {name}")))?;
            map.generate.insert(kind, value);
        }
    }

    if map.generate.is_empty() && map.detect.is_empty() {
        return Err(ZtError::fail(format!(
            "tone map section {section} defined no tones"
        )));
    }
    Ok(map)
}

/// DTMF digit detection, implemented by an external DSP collaborator.
pub trait DtmfDetector: Send {
    /// Feed samples, return any digits newly recognised.
    fn detect(&mut self, samples: &[i16]) -> String;
}

/// DTMF tone generation, implemented by an external DSP collaborator.
pub trait DtmfGenerator: Send {
    /// Queue digits for generation.
    fn put(&mut self, digits: &str);
    /// Fill `out` with generated samples, returning how many were written.
    fn generate(&mut self, out: &mut [i16]) -> usize;
}

/// Lead/trail/prefix cadence for one FSK caller-ID send, per §4.7's two
/// parameter sets keyed on attached-token count.
#[derive(Debug, Clone, Copy)]
pub struct FskSendParams {
    pub lead: u32,
    pub trail: u32,
    pub prefix: u32,
}

/// Bell 202 FSK modulator used for caller-ID delivery.
pub trait FskModulator: Send {
    /// Modulate `payload` bytes into samples appended to `out`, using the
    /// lead/trail/prefix cadence in `params`.
    fn modulate(&mut self, payload: &[u8], params: FskSendParams, out: &mut Vec<i16>);
}

/// Bell 202 FSK demodulator used for caller-ID reception.
pub trait FskDemodulator: Send {
    fn demodulate(&mut self, samples: &[i16]) -> Option<Vec<u8>>;
}

/// A single call-progress/special tone detector session bound to one
/// channel's `needed_tones`/`detected_tones` set.
pub trait ToneSession: Send {
    /// Feed samples, returning any tone kinds newly detected this call.
    fn detect(&mut self, samples: &[i16]) -> Vec<ToneKind>;
}
