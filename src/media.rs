//! Media pipeline: frame read/write with inline transcoding, DTMF
//! generation/detection interleaving, FSK caller-ID demod and call-progress
//! tone detection.
//!
//! The read-path ordering (`handle_dtmf` generation mix-in, then
//! transcode, then CALLERID/PROGRESS/DTMF detection in that order) mirrors
//! `zap_channel_read`/`handle_dtmf` in the original C core exactly.

use std::io::Write;

use crate::channel::{CallerData, Channel, ChannelFlags};
use crate::codec::{self, Codec};
use crate::driver::IoDriver;
use crate::error::{Result, ZtError};
use crate::event::ChannelEvent;
use crate::span::Span;
use crate::state::ChannelState;
use crate::tone::{DtmfDetector, FskDemodulator, FskModulator, FskSendParams, ToneKind, ToneSession};

/// Characters recognised as DTMF digits.
fn is_dtmf(c: char) -> bool {
    matches!(c, '0'..='9' | 'A'..='D' | '*' | '#')
}

/// Queue `digits` onto a channel's digit buffer, running the DTMF-hangup
/// rolling-window check over the same leading run of DTMF characters.
///
/// Grounded on `zap_channel_queue_dtmf`: the hangup scan and the buffer
/// write are two independent passes over the leading run of DTMF
/// characters in `digits` — the whole run is queued even once the hangup
/// scan has matched and broken out early, since that loop only decides
/// whether to drive the channel to `Hangup`, not what gets buffered.
pub fn queue_dtmf(channel: &mut Channel, span: &Span, digits: &str) {
    let run: String = digits.chars().take_while(|&c| is_dtmf(c)).collect();
    let hangup_len = span.dtmf_hangup.len();

    let mut hangup_triggered = false;
    if hangup_len > 0 {
        for c in run.chars() {
            if channel.dtmf_hangup_buf.len() >= hangup_len {
                channel.dtmf_hangup_buf.remove(0);
            }
            channel.dtmf_hangup_buf.push(c);
            while channel.dtmf_hangup_buf.len() > hangup_len {
                channel.dtmf_hangup_buf.remove(0);
            }
            if channel.dtmf_hangup_buf == span.dtmf_hangup {
                hangup_triggered = true;
                break;
            }
        }
    }

    channel.digit_buffer.extend(run.chars());

    if hangup_triggered {
        channel.log_tag.log(crate::logging::LogLevel::Debug, "DTMF hangup detected");
        channel.state = ChannelState::Hangup;
        channel.flags.insert(ChannelFlags::STATE_CHANGE);
    }
}

pub fn dequeue_dtmf(channel: &mut Channel, max: usize) -> String {
    if !channel.flags.contains(ChannelFlags::READY) {
        return String::new();
    }
    let n = channel.digit_buffer.len().min(max);
    channel.digit_buffer.drain(..n).collect()
}

pub fn flush_dtmf(channel: &mut Channel) {
    channel.digit_buffer.clear();
}

/// Mix any queued generated-DTMF/FSK samples into the outgoing stream
/// ahead of a hardware write, per `handle_dtmf`.
///
/// `sample_count` is the number of native-codec samples the frame being
/// written holds (used to size the skip-read window and the generated
/// buffer drain length).
fn handle_dtmf(
    channel: &mut Channel,
    driver: &dyn IoDriver,
    span_id: u32,
    chan_id: u32,
    generator: Option<&mut dyn crate::tone::DtmfGenerator>,
    sample_count: usize,
) -> Result<()> {
    if let Some(gen) = generator {
        if !channel.gen_dtmf_buffer.is_empty() {
            let digits: String = channel.gen_dtmf_buffer.drain(..).collect();
            let mut digits = digits.as_str();
            if let Some(rest) = digits.strip_prefix('F') {
                driver.command(
                    span_id,
                    chan_id,
                    crate::command::Command::Flash,
                )?;
                digits = rest;
            }
            gen.put(digits);
            let mut out = vec![0i16; sample_count.max(1)];
            let written = gen.generate(&mut out);
            out.truncate(written);
            for sample in out {
                channel.dtmf_buffer.push(sample);
            }
            channel.skip_read_frames = 200 * digits.chars().count() as u32;
        }
    }

    if channel.buffer_delay > 0 {
        channel.buffer_delay -= 1;
        return Ok(());
    }

    // Generated DTMF takes priority over a queued FSK caller-ID send; only
    // one of the two buffers drives the line at a time.
    let use_fsk = channel.dtmf_buffer.is_empty() && !channel.fsk_buffer.is_empty();
    let source_len = if use_fsk {
        channel.fsk_buffer.len()
    } else {
        channel.dtmf_buffer.len()
    };

    if source_len > 0 {
        let dlen = sample_count.min(source_len);
        let mut samples: Vec<i16> = if use_fsk {
            channel.fsk_buffer.drain(..dlen).collect()
        } else {
            channel.dtmf_buffer.drain(..dlen).collect()
        };
        samples.resize(sample_count, 0);
        let frame = codec::Frame::Slin(samples);
        let out_frame = codec::transcode(channel.native_codec, &frame)?;
        let raw = frame_to_raw(&out_frame);
        driver.write(span_id, chan_id, &crate::driver::RawFrame { data: raw })?;
    }

    Ok(())
}

/// FSK caller-ID send (§4.7): runs `modulator` over `payload` into
/// `fsk_buffer`, choosing the lead/trail/prefix cadence by attached-token
/// count. The single/no-token case also sets `buffer_delay` to give the
/// line time to settle before playback starts.
pub fn send_fsk_data(channel: &mut Channel, payload: &[u8], modulator: &mut dyn FskModulator) {
    channel.fsk_buffer.clear();

    let params = if channel.tokens.len() > 1 {
        FskSendParams {
            lead: 80,
            trail: 5,
            prefix: 0,
        }
    } else {
        channel.buffer_delay = 3500 / channel.effective_interval.max(1);
        FskSendParams {
            lead: 180,
            trail: 5,
            prefix: 300,
        }
    };

    modulator.modulate(payload, params, &mut channel.fsk_buffer);
}

fn frame_to_raw(frame: &codec::Frame) -> Vec<u8> {
    match frame {
        codec::Frame::Slin(v) => v.iter().flat_map(|s| s.to_le_bytes()).collect(),
        codec::Frame::Ulaw(v) | codec::Frame::Alaw(v) => v.clone(),
    }
}

/// Parse a demodulated Bell 202 MDMF/SDMF caller-ID payload into
/// `CallerData` fields, per §4.6. MDMF (message type `0x80`) carries
/// `{param_type, len, bytes}` records; SDMF (message type `0x04`) carries a
/// fixed date/time + number layout. `'O'`/`'P'` single-byte fields mean the
/// number/name is unavailable or withheld, mapped to "unknown"/"private".
fn parse_callerid_payload(payload: &[u8]) -> CallerData {
    let mut data = CallerData::default();
    if payload.is_empty() {
        return data;
    }

    match payload[0] {
        0x80 if payload.len() > 1 => {
            let mut i = 2usize;
            while i + 1 < payload.len() {
                let param_type = payload[i];
                let len = payload[i + 1] as usize;
                let start = i + 2;
                let end = (start + len).min(payload.len());
                let field = &payload[start..end];
                match param_type {
                    0x01 => data.cid_date = String::from_utf8_lossy(field).to_string(),
                    0x02 => set_number_field(&mut data, field),
                    0x07 => set_name_field(&mut data, field),
                    _ => {}
                }
                i = end;
            }
        }
        0x04 if payload.len() > 10 => {
            let body = &payload[2..];
            data.cid_date = String::from_utf8_lossy(&body[0..8]).to_string();
            set_number_field(&mut data, &body[8..]);
        }
        _ => {}
    }

    data
}

fn set_number_field(data: &mut CallerData, field: &[u8]) {
    let value = callerid_field_string(field);
    data.ani = value.clone();
    data.cid_num = value;
}

fn set_name_field(data: &mut CallerData, field: &[u8]) {
    data.cid_name = callerid_field_string(field);
}

fn callerid_field_string(field: &[u8]) -> String {
    match field {
        b"O" => "unknown".to_string(),
        b"P" => "private".to_string(),
        other => String::from_utf8_lossy(other).to_string(),
    }
}

fn raw_to_samples(codec: Codec, data: &[u8]) -> Vec<i16> {
    match codec {
        Codec::Slin => data
            .chunks_exact(2)
            .map(|c| i16::from_le_bytes([c[0], c[1]]))
            .collect(),
        Codec::Ulaw => data.iter().map(|&b| crate::codec::ulaw_to_linear(b)).collect(),
        Codec::Alaw => data.iter().map(|&b| crate::codec::alaw_to_linear(b)).collect(),
    }
}

/// External collaborators a media read pass consults, bundled so `read`'s
/// signature stays manageable; a channel without a given detector simply
/// skips that stage (its flag should also be clear).
#[derive(Default)]
pub struct Detectors<'a> {
    pub dtmf: Option<&'a mut dyn DtmfDetector>,
    pub fsk: Option<&'a mut dyn FskDemodulator>,
    pub tone: Option<&'a mut dyn ToneSession>,
    pub generator: Option<&'a mut dyn crate::tone::DtmfGenerator>,
}

/// Read one frame from the driver, running the full pipeline: generated
/// DTMF mix-in, native->effective transcode, then
/// CALLERID/PROGRESS/DTMF detection in that order, per `zap_channel_read`.
pub fn read(
    channel: &mut Channel,
    span: &Span,
    detectors: &mut Detectors<'_>,
) -> Result<Vec<u8>> {
    if !channel.flags.contains(ChannelFlags::OPEN) {
        channel.set_last_error("channel not open");
        return Err(ZtError::fail("channel not open"));
    }

    let raw = span.driver.read(channel.span_id, channel.chan_id)?;
    let sample_count = raw.data.len();

    if let Some(trace) = channel.trace_input.as_mut() {
        trace
            .write_all(&raw.data)
            .map_err(|e| ZtError::fail(format!("trace write failed: {e}")))?;
    }

    handle_dtmf(
        channel,
        span.driver.as_ref(),
        channel.span_id,
        channel.chan_id,
        detectors.generator.as_deref_mut(),
        sample_count,
    )?;

    let mut data = raw.data;

    if channel.flags.contains(ChannelFlags::TRANSCODE) && channel.effective_codec != channel.native_codec {
        let frame = match channel.native_codec {
            Codec::Ulaw => codec::Frame::Ulaw(data.clone()),
            Codec::Alaw => codec::Frame::Alaw(data.clone()),
            Codec::Slin => codec::Frame::Slin(raw_to_samples(Codec::Slin, &data)),
        };
        let out = codec::transcode(channel.effective_codec, &frame)?;
        data = frame_to_raw(&out);
    }

    if channel.flags.intersects(
        ChannelFlags::DTMF_DETECT | ChannelFlags::PROGRESS_DETECT | ChannelFlags::CALLERID_DETECT,
    ) {
        let sln = raw_to_samples(channel.effective_codec, &data);

        if channel.flags.contains(ChannelFlags::CALLERID_DETECT) {
            if let Some(fsk) = detectors.fsk.as_deref_mut() {
                if let Some(payload) = fsk.demodulate(&sln) {
                    channel.caller_data = parse_callerid_payload(&payload);
                    channel.flags.remove(ChannelFlags::CALLERID_DETECT);
                }
            }
        }

        if channel.flags.contains(ChannelFlags::PROGRESS_DETECT) {
            if let Some(tone) = detectors.tone.as_deref_mut() {
                for kind in tone.detect(&sln) {
                    let idx = Channel::tone_kind_index(kind);
                    channel.detected_tones[idx] += 1;
                }
            }
        }

        if channel.flags.contains(ChannelFlags::DTMF_DETECT) {
            if let Some(detector) = detectors.dtmf.as_deref_mut() {
                let digit_str = detector.detect(&sln);
                if !digit_str.is_empty() {
                    if channel.state == ChannelState::CallWaiting
                        && digit_str.chars().next().is_some_and(|c| c == 'D' || c == 'A')
                    {
                        let idx = Channel::tone_kind_index(ToneKind::CallWaitingAck);
                        channel.detected_tones[idx] += 1;
                    } else {
                        queue_dtmf(channel, span, &digit_str);
                        crate::event::dispatch(
                            channel,
                            span,
                            ChannelEvent::Dtmf {
                                span_id: channel.span_id,
                                chan_id: channel.chan_id,
                                digits: digit_str,
                            },
                        );
                        if channel.flags.contains(ChannelFlags::SUPPRESS_DTMF) {
                            channel.skip_read_frames = 20;
                        }
                        if channel.skip_read_frames > 0 {
                            data.iter_mut().for_each(|b| *b = 0);
                            channel.skip_read_frames -= 1;
                        }
                    }
                }
            }
        }
    }

    Ok(data)
}

/// Write one frame to the driver, transcoding from the caller's codec to
/// the channel's native codec first when needed.
pub fn write(channel: &mut Channel, span: &Span, codec_in: Codec, data: &[u8]) -> Result<()> {
    if channel.buffer_delay == 0
        && (!channel.dtmf_buffer.is_empty() || !channel.fsk_buffer.is_empty())
    {
        // inline DTMF/FSK playback owns the line; drop the caller's frame.
        return Ok(());
    }

    if !channel.flags.contains(ChannelFlags::OPEN) {
        channel.set_last_error("channel not open");
        return Err(ZtError::fail("channel not open"));
    }

    let out_data = if codec_in != channel.native_codec {
        let frame = match codec_in {
            Codec::Slin => codec::Frame::Slin(raw_to_samples(Codec::Slin, data)),
            Codec::Ulaw => codec::Frame::Ulaw(data.to_vec()),
            Codec::Alaw => codec::Frame::Alaw(data.to_vec()),
        };
        let out = codec::transcode(channel.native_codec, &frame)?;
        frame_to_raw(&out)
    } else {
        data.to_vec()
    };

    if let Some(trace) = channel.trace_output.as_mut() {
        trace
            .write_all(&out_data)
            .map_err(|e| ZtError::fail(format!("trace write failed: {e}")))?;
    }

    span.driver.write(
        channel.span_id,
        channel.chan_id,
        &crate::driver::RawFrame { data: out_data },
    )
}
