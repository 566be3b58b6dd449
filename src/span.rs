//! A span: the container of channels belonging to one trunk line.

use std::sync::atomic::{AtomicBool, AtomicI32};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::channel::Channel;
use crate::driver::IoDriver;
use crate::event::ChannelEvent;
use crate::logging::{LogLevel, LogTag};
use crate::state::StateMap;
use crate::tone::ToneMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrunkType {
    None,
    Fxs,
    Fxo,
    Em,
    Bri,
    Pri,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnalogStartType {
    Na,
    LoopStart,
    GroundStart,
    Wink,
    Kewl,
    Immediate,
}

pub const MAX_CHANNELS_SPAN: usize = 32;

/// A span: a container of channels belonging to one trunk, plus its
/// driver binding and per-span policy (tone maps, state map, DTMF hangup
/// string).
pub struct Span {
    pub id: u32,
    pub name: String,
    pub trunk_type: TrunkType,
    pub start_type: AnalogStartType,

    /// Channel 0 is never used; indices 1..=MAX_CHANNELS_SPAN are live.
    pub channels: Vec<Mutex<Channel>>,

    pub tone_map: ToneMap,
    pub state_map: Option<StateMap>,

    pub signal_data: Mutex<Option<Box<dyn std::any::Any + Send + Sync>>>,
    pub event_callback: Mutex<Option<Arc<dyn Fn(ChannelEvent) + Send + Sync>>>,

    pub active_count: AtomicI32,
    pub configured: AtomicBool,
    pub suspended: AtomicBool,
    pub state_change: AtomicBool,

    pub dtmf_hangup: String,

    pub last_error: Mutex<String>,
    pub log_tag: LogTag,

    pub driver: Arc<dyn IoDriver>,
}

impl Span {
    pub fn new(
        id: u32,
        name: impl Into<String>,
        trunk_type: TrunkType,
        start_type: AnalogStartType,
        num_channels: usize,
        driver: Arc<dyn IoDriver>,
    ) -> Self {
        let name = name.into();
        let num_channels = num_channels.min(MAX_CHANNELS_SPAN);
        let mut channels = Vec::with_capacity(num_channels + 1);
        // slot 0 is reserved, unused
        channels.push(Mutex::new(Channel::new(id, 0, crate::channel::ChannelType::B)));
        for chan_id in 1..=num_channels as u32 {
            channels.push(Mutex::new(Channel::new(id, chan_id, crate::channel::ChannelType::B)));
        }
        Self {
            log_tag: LogTag::new(format!("span{id}/{name}"), LogLevel::Warning),
            id,
            name,
            trunk_type,
            start_type,
            channels,
            tone_map: ToneMap::new(),
            state_map: None,
            signal_data: Mutex::new(None),
            event_callback: Mutex::new(None),
            active_count: AtomicI32::new(0),
            configured: AtomicBool::new(false),
            suspended: AtomicBool::new(false),
            state_change: AtomicBool::new(false),
            dtmf_hangup: String::new(),
            last_error: Mutex::new(String::new()),
            driver,
        }
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len().saturating_sub(1)
    }

    pub fn channel(&self, chan_id: u32) -> Option<&Mutex<Channel>> {
        self.channels.get(chan_id as usize)
    }

    pub fn set_last_error(&self, message: impl Into<String>) {
        let message = crate::error::truncate_last_error(message.into());
        self.log_tag.log(LogLevel::Error, &message);
        *self.last_error.lock() = message;
    }

    pub fn last_error(&self) -> String {
        self.last_error.lock().clone()
    }

    pub fn fire_event(&self, event: ChannelEvent) {
        if let Some(cb) = self.event_callback.lock().as_ref() {
            cb(event);
        }
    }
}

impl std::fmt::Debug for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Span")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("trunk_type", &self.trunk_type)
            .field("channel_count", &self.channel_count())
            .finish_non_exhaustive()
    }
}
