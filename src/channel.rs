//! A single voice circuit: state, flags, buffers and codec configuration.

use std::collections::VecDeque;
use std::fmt;
use std::io::Write;
use std::sync::Arc;

use bitflags::bitflags;

use crate::codec::Codec;
use crate::event::ChannelEvent;
use crate::logging::{LogLevel, LogTag};
use crate::state::ChannelState;
use crate::tone::{ToneKind, MAX_TONE_KINDS};

bitflags! {
    /// Per-channel flags, grounded on the source core's `zap_channel_flag_t`
    /// bitset and on the teacher's `EchoCanFlags`/`LogShowFlags` bitflags
    /// usage.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ChannelFlags: u32 {
        const CONFIGURED = 1 << 0;
        const READY = 1 << 1;
        const OPEN = 1 << 2;
        const DTMF_DETECT = 1 << 3;
        const SUPPRESS_DTMF = 1 << 4;
        const TRANSCODE = 1 << 5;
        const BUFFER = 1 << 6;
        const CALLERID_DETECT = 1 << 7;
        const PROGRESS_DETECT = 1 << 8;
        const INUSE = 1 << 9;
        const OUTBOUND = 1 << 10;
        const WINK = 1 << 11;
        const FLASH = 1 << 12;
        const STATE_CHANGE = 1 << 13;
        const HOLD = 1 << 14;
        const INTHREAD = 1 << 15;
        const OFFHOOK = 1 << 16;
        const RINGING = 1 << 17;
        const ANSWERED = 1 << 18;
        const PROGRESS = 1 << 19;
        const MEDIA = 1 << 20;
        const THREE_WAY = 1 << 21;
        const CALLWAITING = 1 << 22;
        const EVENT = 1 << 23;
    }
}

impl fmt::Display for ChannelFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        bitflags::parser::to_writer(self, f)
    }
}

bitflags! {
    /// Hardware alarm conditions reported by the driver.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AlarmFlags: u32 {
        const RED = 1 << 0;
        const YELLOW = 1 << 1;
        const BLUE = 1 << 2;
        const LOOPBACK = 1 << 3;
        const RECOVER = 1 << 4;
        const NOTOPEN = 1 << 5;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelType {
    B,
    Dq921,
    Dq931,
    Fxs,
    Fxo,
    Em,
    Cas,
}

/// Per-call caller-ID data, reset whenever the channel returns to `Down`.
#[derive(Debug, Clone, Default)]
pub struct CallerData {
    pub ani: String,
    pub dnis: String,
    pub cid_num: String,
    pub cid_name: String,
    pub cid_date: String,
}

/// A single channel/voice circuit.
pub struct Channel {
    pub span_id: u32,
    pub chan_id: u32,
    pub chan_type: ChannelType,

    pub state: ChannelState,
    pub last_state: ChannelState,
    pub init_state: ChannelState,

    pub flags: ChannelFlags,
    pub alarm_flags: AlarmFlags,

    pub tokens: Vec<String>,

    pub caller_data: CallerData,

    pub native_codec: Codec,
    pub effective_codec: Codec,
    pub native_interval: u32,
    pub effective_interval: u32,
    pub packet_len: usize,
    pub sample_rate: u32,

    pub dtmf_on: u32,
    pub dtmf_off: u32,

    pub digit_buffer: VecDeque<char>,
    pub gen_dtmf_buffer: VecDeque<char>,
    pub dtmf_buffer: Vec<i16>,
    pub fsk_buffer: Vec<i16>,
    pub dtmf_hangup_buf: String,

    pub detected_tones: [u32; MAX_TONE_KINDS],
    pub needed_tones: [u32; MAX_TONE_KINDS],

    pub variables: std::collections::HashMap<String, String>,

    pub buffer_delay: u32,
    pub skip_read_frames: u32,

    pub last_error: String,

    pub log_tag: LogTag,

    /// Raw-capture sinks opened by `TRACE_INPUT`/`TRACE_OUTPUT` (§4.5);
    /// native-codec bytes are mirrored into these by the media read/write
    /// paths whenever they're open.
    pub trace_input: Option<Box<dyn Write + Send>>,
    pub trace_output: Option<Box<dyn Write + Send>>,

    /// Per-channel event callback. Takes precedence over the owning span's
    /// callback when both are set (§4.6).
    pub event_callback: Option<Arc<dyn Fn(ChannelEvent) + Send + Sync>>,
}

pub const MAX_TOKENS: usize = 10;
pub const TOKEN_STRLEN: usize = 255;
pub const DTMF_ON_DEFAULT: u32 = 100;
pub const DTMF_OFF_DEFAULT: u32 = 100;

impl Channel {
    pub fn new(span_id: u32, chan_id: u32, chan_type: ChannelType) -> Self {
        Self {
            span_id,
            chan_id,
            chan_type,
            state: ChannelState::Down,
            last_state: ChannelState::Down,
            init_state: ChannelState::Down,
            flags: ChannelFlags::empty(),
            alarm_flags: AlarmFlags::empty(),
            tokens: Vec::new(),
            caller_data: CallerData::default(),
            native_codec: Codec::Slin,
            effective_codec: Codec::Slin,
            native_interval: 20,
            effective_interval: 20,
            packet_len: 160,
            sample_rate: 8000,
            dtmf_on: DTMF_ON_DEFAULT,
            dtmf_off: DTMF_OFF_DEFAULT,
            digit_buffer: VecDeque::new(),
            gen_dtmf_buffer: VecDeque::new(),
            dtmf_buffer: Vec::new(),
            fsk_buffer: Vec::new(),
            dtmf_hangup_buf: String::new(),
            detected_tones: [0; MAX_TONE_KINDS],
            needed_tones: [0; MAX_TONE_KINDS],
            variables: std::collections::HashMap::new(),
            buffer_delay: 0,
            skip_read_frames: 0,
            last_error: String::new(),
            log_tag: LogTag::new(format!("s{span_id}c{chan_id}"), LogLevel::Warning),
            trace_input: None,
            trace_output: None,
            event_callback: None,
        }
    }

    /// Whether this channel is in use by a call right now.
    pub fn in_use(&self) -> bool {
        self.flags.contains(ChannelFlags::INUSE)
    }

    /// Push a signalling token, rotating out the oldest when at capacity —
    /// the bounded token list §3/§4.3 describe.
    pub fn push_token(&mut self, token: impl Into<String>) {
        let mut token = token.into();
        token.truncate(TOKEN_STRLEN);
        if self.tokens.len() >= MAX_TOKENS {
            self.tokens.remove(0);
        }
        self.tokens.push(token);
    }

    pub fn clear_tokens(&mut self) {
        self.tokens.clear();
    }

    pub fn set_variable(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.variables.insert(key.into(), value.into());
    }

    pub fn get_variable(&self, key: &str) -> Option<&str> {
        self.variables.get(key).map(|s| s.as_str())
    }

    pub fn clear_variables(&mut self) {
        self.variables.clear();
    }

    /// Reset a channel for reuse once its owning span is torn down or the
    /// channel returns to `Down`, grounded on `zap_channel_init` resetting
    /// call-progress flags and the token list on reuse.
    pub fn reset_for_reuse(&mut self) {
        self.flags.remove(
            ChannelFlags::INUSE
                | ChannelFlags::OUTBOUND
                | ChannelFlags::ANSWERED
                | ChannelFlags::RINGING
                | ChannelFlags::PROGRESS
                | ChannelFlags::MEDIA
                | ChannelFlags::HOLD
                | ChannelFlags::THREE_WAY
                | ChannelFlags::CALLWAITING,
        );
        self.clear_tokens();
        self.clear_variables();
        self.caller_data = CallerData::default();
        self.digit_buffer.clear();
        self.gen_dtmf_buffer.clear();
        self.dtmf_hangup_buf.clear();
        self.state = ChannelState::Down;
        self.last_state = ChannelState::Down;
    }

    pub fn set_last_error(&mut self, message: impl Into<String>) {
        self.last_error = crate::error::truncate_last_error(message.into());
        self.log_tag.log(LogLevel::Error, &self.last_error.clone());
    }

    pub fn tone_kind_index(kind: ToneKind) -> usize {
        kind as usize
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("span_id", &self.span_id)
            .field("chan_id", &self.chan_id)
            .field("chan_type", &self.chan_type)
            .field("state", &self.state)
            .field("flags", &self.flags)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_token_rotates_oldest_out_at_capacity() {
        let mut chan = Channel::new(1, 1, ChannelType::B);
        for i in 0..MAX_TOKENS + 2 {
            chan.push_token(format!("tok{i}"));
        }
        assert_eq!(chan.tokens.len(), MAX_TOKENS);
        assert_eq!(chan.tokens.first().unwrap(), "tok2");
        assert_eq!(chan.tokens.last().unwrap(), &format!("tok{}", MAX_TOKENS + 1));
    }

    #[test]
    fn reset_for_reuse_clears_call_state() {
        let mut chan = Channel::new(1, 1, ChannelType::B);
        chan.flags.insert(ChannelFlags::INUSE | ChannelFlags::ANSWERED);
        chan.push_token("abc");
        chan.set_variable("foo", "bar");
        chan.caller_data.ani = "5551234".into();
        chan.reset_for_reuse();
        assert!(!chan.flags.contains(ChannelFlags::INUSE));
        assert!(chan.tokens.is_empty());
        assert!(chan.variables.is_empty());
        assert_eq!(chan.caller_data.ani, "");
        assert_eq!(chan.state, ChannelState::Down);
    }
}
