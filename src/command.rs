//! Channel command dispatch (§4.5): a closed set of in-band control
//! operations, each either handled directly against channel state or
//! forwarded to the driver when it requires hardware action.

use std::fs::File;

use crate::channel::{AlarmFlags, Channel, ChannelFlags};
use crate::driver::{DriverCapabilities, IoDriver};
use crate::error::{Result, ZtError};

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Offhook,
    Onhook,
    Ring,
    Flash,
    Wink,
    SetInterval(u32),
    GetInterval,
    SetNativeCodec(crate::codec::Codec),
    GetNativeCodec,
    EnableDtmfDetect,
    DisableDtmfDetect,
    SetDtmfOnPeriod(u32),
    GetDtmfOnPeriod,
    SetDtmfOffPeriod(u32),
    GetDtmfOffPeriod,
    EnableProgressDetect,
    DisableProgressDetect,
    EnableCalleridDetect,
    DisableCalleridDetect,
    SendDigits(String),
    GetAlarms,
    /// Open (`Some(path)`) or close (`None`) a raw-capture file mirroring
    /// native-codec bytes as they arrive from the driver.
    TraceInput(Option<String>),
    /// Open (`Some(path)`) or close (`None`) a raw-capture file mirroring
    /// native-codec bytes as they're written to the driver.
    TraceOutput(Option<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommandReply {
    Ack,
    Interval(u32),
    Codec(crate::codec::Codec),
    Period(u32),
    Alarms(u32),
}

/// Run `cmd` against `channel`, forwarding to the driver only for commands
/// that require hardware action (offhook/onhook/ring/flash/wink/alarms).
///
/// Each command is handled explicitly: `DISABLE_DTMF_DETECT` does not fall
/// through to `GET_DTMF_ON_PERIOD` handling, and `GET_DTMF_OFF_PERIOD`
/// returns `dtmf_off` (not `dtmf_on`) — both corrected relative to a
/// historical defect in the source model.
pub fn dispatch(
    channel: &mut Channel,
    driver: &dyn IoDriver,
    span_id: u32,
    chan_id: u32,
    cmd: Command,
) -> Result<CommandReply> {
    let caps = driver.capabilities();

    match cmd {
        // Hardware pass-through commands: not in the spec's explicit table,
        // so they fall under its "Others -> delegate to driver `command`"
        // row, which carries no capability precondition. A driver that
        // can't act on one reports NotImplemented itself.
        Command::Offhook => {
            driver.command(span_id, chan_id, Command::Offhook)?;
            channel.flags.insert(ChannelFlags::OFFHOOK);
            Ok(CommandReply::Ack)
        }
        Command::Onhook => {
            driver.command(span_id, chan_id, Command::Onhook)?;
            channel.flags.remove(ChannelFlags::OFFHOOK);
            Ok(CommandReply::Ack)
        }
        Command::Ring => {
            driver.command(span_id, chan_id, Command::Ring)?;
            channel.flags.insert(ChannelFlags::RINGING);
            Ok(CommandReply::Ack)
        }
        Command::Flash => {
            driver.command(span_id, chan_id, Command::Flash)?;
            channel.flags.insert(ChannelFlags::FLASH);
            Ok(CommandReply::Ack)
        }
        Command::Wink => {
            driver.command(span_id, chan_id, Command::Wink)?;
            channel.flags.insert(ChannelFlags::WINK);
            Ok(CommandReply::Ack)
        }
        Command::SetInterval(ms) => {
            channel.effective_interval = ms;
            Ok(CommandReply::Ack)
        }
        Command::GetInterval => Ok(CommandReply::Interval(channel.effective_interval)),
        Command::SetNativeCodec(codec) => {
            channel.native_codec = codec;
            Ok(CommandReply::Ack)
        }
        Command::GetNativeCodec => Ok(CommandReply::Codec(channel.native_codec)),
        Command::EnableDtmfDetect => {
            if !caps.contains(DriverCapabilities::DTMF_DETECT) {
                channel.flags.insert(ChannelFlags::DTMF_DETECT);
            }
            Ok(CommandReply::Ack)
        }
        Command::DisableDtmfDetect => {
            channel.flags.remove(ChannelFlags::DTMF_DETECT);
            Ok(CommandReply::Ack)
        }
        Command::SetDtmfOnPeriod(ms) => {
            channel.dtmf_on = ms.clamp(10, 1000);
            Ok(CommandReply::Ack)
        }
        Command::GetDtmfOnPeriod => Ok(CommandReply::Period(channel.dtmf_on)),
        Command::SetDtmfOffPeriod(ms) => {
            channel.dtmf_off = ms.clamp(10, 1000);
            Ok(CommandReply::Ack)
        }
        Command::GetDtmfOffPeriod => Ok(CommandReply::Period(channel.dtmf_off)),
        Command::EnableProgressDetect => {
            if !caps.contains(DriverCapabilities::PROGRESS) {
                channel.flags.insert(ChannelFlags::PROGRESS_DETECT);
            }
            Ok(CommandReply::Ack)
        }
        Command::DisableProgressDetect => {
            channel.flags.remove(ChannelFlags::PROGRESS_DETECT);
            Ok(CommandReply::Ack)
        }
        Command::EnableCalleridDetect => {
            if !caps.contains(DriverCapabilities::CALLERID_DETECT) {
                channel.flags.insert(ChannelFlags::CALLERID_DETECT);
            }
            Ok(CommandReply::Ack)
        }
        Command::DisableCalleridDetect => {
            channel.flags.remove(ChannelFlags::CALLERID_DETECT);
            Ok(CommandReply::Ack)
        }
        Command::SendDigits(digits) => {
            channel.gen_dtmf_buffer.extend(digits.chars());
            Ok(CommandReply::Ack)
        }
        Command::GetAlarms => {
            let bits = driver.get_alarms(span_id)?;
            channel.alarm_flags = AlarmFlags::from_bits_truncate(bits);
            Ok(CommandReply::Alarms(bits))
        }
        Command::TraceInput(path) => {
            channel.trace_input = open_trace_sink(path)?;
            Ok(CommandReply::Ack)
        }
        Command::TraceOutput(path) => {
            channel.trace_output = open_trace_sink(path)?;
            Ok(CommandReply::Ack)
        }
    }
}

fn open_trace_sink(path: Option<String>) -> Result<Option<Box<dyn std::io::Write + Send>>> {
    match path {
        Some(p) => {
            let file = File::create(&p)
                .map_err(|e| ZtError::fail(format!("trace open failed for {p}: {e}")))?;
            Ok(Some(Box::new(file) as Box<dyn std::io::Write + Send>))
        }
        None => Ok(None),
    }
}
