//! Channel hunt/selection policy: `open_any` and `open`.
//!
//! The scan order and channel-acceptance predicate mirror
//! `zap_channel_open_any` in the original C core exactly, including the
//! span-level `channel_request` delegation shortcut and the per-channel
//! `READY && !INUSE && state == Down` gate.

use std::sync::Arc;

use crate::channel::{Channel, ChannelFlags, ChannelType};
use crate::driver::DriverCapabilities;
use crate::error::{Result, ZtError};
use crate::registry::Registry;
use crate::span::Span;
use crate::state::ChannelState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HuntDirection {
    TopDown,
    BottomUp,
}

/// A hunted/opened channel identity, `(span_id, chan_id)`.
pub type ChannelHandle = (u32, u32);

fn span_ids_in_order(registry: &Registry, span_max_hint: u32, direction: HuntDirection) -> Vec<u32> {
    let mut ids: Vec<u32> = (1..=span_max_hint)
        .filter(|id| registry.find_span_by_id(*id).is_ok())
        .collect();
    if direction == HuntDirection::BottomUp {
        ids.reverse();
    }
    ids
}

fn channel_is_available(chan: &Channel) -> bool {
    chan.flags.contains(ChannelFlags::READY)
        && !chan.flags.contains(ChannelFlags::INUSE)
        && chan.state == ChannelState::Down
}

fn try_open_channel(span: &Arc<Span>, chan_id: u32) -> Result<Option<ChannelHandle>> {
    let guard = span
        .channel(chan_id)
        .ok_or(ZtError::ChannelNotFound { span: span.id, channel: chan_id })?;
    let mut chan = guard.lock();
    if !channel_is_available(&chan) {
        return Ok(None);
    }
    span.driver.open(span.id, chan_id)?;
    chan.flags.insert(ChannelFlags::INUSE | ChannelFlags::OPEN);
    Ok(Some((span.id, chan_id)))
}

/// Hunt for a free channel across one span (`span_id != 0`) or the whole
/// registry (`span_id == 0`), in `direction` order.
pub fn open_any(
    registry: &Registry,
    span_id: u32,
    direction: HuntDirection,
) -> Result<ChannelHandle> {
    if span_id != 0 {
        let span = registry.find_span_by_id(span_id)?;
        if span.active_count.load(std::sync::atomic::Ordering::SeqCst) as usize >= span.channel_count() {
            return Err(ZtError::fail("all circuits are busy"));
        }
        let caps = span.driver.capabilities();
        if caps.contains(DriverCapabilities::CHANNEL_REQUEST)
            && !caps.contains(DriverCapabilities::SUGGEST_CHAN_ID)
        {
            if let Ok(chan_id) = span.driver.channel_request(span_id, direction) {
                return try_open_channel(&span, chan_id)?.ok_or(ZtError::NoChannelAvailable);
            }
        }
        return scan_span(&span, direction);
    }

    // span_id == 0: scan every configured span in the registry.
    let span_max = highest_span_id(registry);
    for id in span_ids_in_order(registry, span_max, direction) {
        let span = registry.find_span_by_id(id)?;
        if !span.configured.load(std::sync::atomic::Ordering::SeqCst) {
            continue;
        }
        if let Ok(handle) = scan_span(&span, direction) {
            return Ok(handle);
        }
    }
    Err(ZtError::NoChannelAvailable)
}

fn highest_span_id(registry: &Registry) -> u32 {
    let mut max = 0;
    let mut probe = 1;
    while registry.find_span_by_id(probe).is_ok() {
        max = probe;
        probe += 1;
    }
    max
}

fn scan_span(span: &Arc<Span>, direction: HuntDirection) -> Result<ChannelHandle> {
    let count = span.channel_count() as u32;
    let ids: Vec<u32> = match direction {
        HuntDirection::TopDown => (1..=count).collect(),
        HuntDirection::BottomUp => (1..=count).rev().collect(),
    };
    for chan_id in ids {
        if let Some(handle) = try_open_channel(span, chan_id)? {
            return Ok(handle);
        }
    }
    Err(ZtError::NoChannelAvailable)
}

/// Open a specific, already-known channel (the `open` entry point, as
/// opposed to `open_any`'s hunting).
pub fn open(registry: &Registry, span_id: u32, chan_id: u32) -> Result<ChannelHandle> {
    let span = registry.find_span_by_id(span_id)?;
    if let Some(handle) = try_open_channel(&span, chan_id)? {
        return Ok(handle);
    }

    // FXS re-open exception (§4.3): an already-open FXS channel with
    // exactly one token attached may be re-opened for the 3-way/call-
    // waiting case.
    let guard = span
        .channel(chan_id)
        .ok_or(ZtError::ChannelNotFound { span: span.id, channel: chan_id })?;
    let chan = guard.lock();
    if chan.chan_type == ChannelType::Fxs
        && chan.flags.contains(ChannelFlags::OPEN)
        && chan.tokens.len() == 1
    {
        return Ok((span.id, chan_id));
    }
    Err(ZtError::NoChannelAvailable)
}
