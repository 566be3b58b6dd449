//! The hardware driver plug-in contract.
//!
//! Grounded on the "trait with sensible no-op defaults" shape seen in the
//! retrieval pack's transport service trait: a driver only implements the
//! methods its hardware actually supports, and every other method falls
//! back to [`Status::NotImplemented`].

use bitflags::bitflags;

use crate::error::{Result, Status, ZtError};
use crate::span::Span;

bitflags! {
    /// Capabilities a driver advertises; the command dispatch table (§4.5)
    /// consults this before forwarding a command.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DriverCapabilities: u32 {
        const OFFHOOK = 1 << 0;
        const ONHOOK = 1 << 1;
        const RING = 1 << 2;
        const FLASH = 1 << 3;
        const WINK = 1 << 4;
        const PROGRESS = 1 << 5;
        const DIGIT_GENERATE = 1 << 6;
        const ALARMS = 1 << 8;
        /// Driver implements `channel_request` for hunting (§4.3).
        const CHANNEL_REQUEST = 1 << 9;
        /// Driver wants to pick the channel itself rather than have the
        /// core suggest one; suppresses delegation to `channel_request`.
        const SUGGEST_CHAN_ID = 1 << 10;
        /// Driver detects caller-ID natively; software CALLERID_DETECT
        /// becomes a no-op (§4.5).
        const CALLERID_DETECT = 1 << 11;
        /// Driver detects DTMF natively; software DTMF_DETECT becomes a
        /// no-op (§4.5).
        const DTMF_DETECT = 1 << 12;
    }
}

/// A raw media frame exchanged with the hardware.
#[derive(Debug, Clone, Default)]
pub struct RawFrame {
    pub data: Vec<u8>,
}

/// Vtable a hardware backend implements to plug into a span/channel.
///
/// All methods beyond `name`, `open`, `close`, `read` and `write` have
/// default implementations that report [`Status::NotImplemented`]; a
/// backend overrides only what its hardware actually does.
pub trait IoDriver: Send + Sync {
    /// Stable identifier used for registry lookup and autoload.
    fn name(&self) -> &str;

    /// Capabilities this driver advertises for command dispatch.
    fn capabilities(&self) -> DriverCapabilities {
        DriverCapabilities::empty()
    }

    fn open(&self, span_id: u32, chan_id: u32) -> Result<()>;
    fn close(&self, span_id: u32, chan_id: u32) -> Result<()>;
    fn read(&self, span_id: u32, chan_id: u32) -> Result<RawFrame>;
    fn write(&self, span_id: u32, chan_id: u32, frame: &RawFrame) -> Result<()>;

    fn configure_span(&self, _span: &Span, _payload: &dyn std::any::Any) -> Result<()> {
        Err(ZtError::not_implemented("configure_span"))
    }

    fn configure(&self, _span_id: u32, _chan_id: u32, _payload: &dyn std::any::Any) -> Result<()> {
        Err(ZtError::not_implemented("configure"))
    }

    fn span_destroy(&self, _span_id: u32) -> Result<()> {
        Err(ZtError::not_implemented("span_destroy"))
    }

    fn channel_destroy(&self, _span_id: u32, _chan_id: u32) -> Result<()> {
        Err(ZtError::not_implemented("channel_destroy"))
    }

    fn poll_event(&self, _span_id: u32, _timeout_ms: u32) -> Result<Status> {
        Err(ZtError::not_implemented("poll_event"))
    }

    fn next_event(&self, _span_id: u32) -> Result<Option<crate::event::ChannelEvent>> {
        Err(ZtError::not_implemented("next_event"))
    }

    fn command(
        &self,
        _span_id: u32,
        _chan_id: u32,
        _cmd: crate::command::Command,
    ) -> Result<crate::command::CommandReply> {
        Err(ZtError::not_implemented("command"))
    }

    fn wait(&self, _span_id: u32, _chan_id: u32, _flags: u32, _timeout_ms: u32) -> Result<u32> {
        Err(ZtError::not_implemented("wait"))
    }

    fn get_alarms(&self, _span_id: u32) -> Result<u32> {
        Err(ZtError::not_implemented("get_alarms"))
    }

    fn api(&self, _command: &str) -> Result<String> {
        Err(ZtError::not_implemented("api"))
    }

    /// One attempt at loading a driver module on demand when a lookup
    /// misses the registry (§4.1's one-retry autoload path). The default
    /// implementation never succeeds; a real `ModuleLoader` is supplied by
    /// the embedding application.
    fn channel_request(
        &self,
        _span_id: u32,
        _direction: crate::alloc::HuntDirection,
    ) -> Result<u32> {
        Err(ZtError::not_implemented("channel_request"))
    }
}

/// Seam for loading a driver module by name on registry miss (§4.1). Kept
/// separate from `IoDriver` because loading is a one-shot, process-global
/// concern, not a per-call hardware operation.
pub trait ModuleLoader: Send + Sync {
    fn load(&self, name: &str) -> Option<std::sync::Arc<dyn IoDriver>>;
}
