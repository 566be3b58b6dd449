//! Event taxonomy delivered through a span's or channel's event callback.

use crate::channel::Channel;
use crate::span::Span;

/// Fire `event` through `channel`'s own callback if one is set, falling
/// back to the owning span's callback otherwise (§4.6: "channel takes
/// precedence if set on both").
pub fn dispatch(channel: &Channel, span: &Span, event: ChannelEvent) {
    if let Some(cb) = &channel.event_callback {
        cb(event);
    } else {
        span.fire_event(event);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    StateChange {
        span_id: u32,
        chan_id: u32,
        from: crate::state::ChannelState,
        to: crate::state::ChannelState,
    },
    Dtmf {
        span_id: u32,
        chan_id: u32,
        digits: String,
    },
    Ring {
        span_id: u32,
        chan_id: u32,
    },
    Answer {
        span_id: u32,
        chan_id: u32,
    },
    Hangup {
        span_id: u32,
        chan_id: u32,
    },
    Alarm {
        span_id: u32,
        flags: u32,
    },
    ProgressTone {
        span_id: u32,
        chan_id: u32,
        kind: crate::tone::ToneKind,
    },
}
