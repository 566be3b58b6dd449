//! Integration tests, one `mod` block per subsystem, mirroring the
//! teacher's flat per-module test file layout.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use zaptel_core::alloc::{self, HuntDirection};
use zaptel_core::channel::ChannelFlags;
use zaptel_core::driver::{DriverCapabilities, IoDriver, RawFrame};
use zaptel_core::error::Result;
use zaptel_core::registry::Registry;
use zaptel_core::span::{AnalogStartType, TrunkType};

/// A driver that always succeeds, for exercising allocation/state without
/// real hardware.
struct NullDriver;

impl IoDriver for NullDriver {
    fn name(&self) -> &str {
        "null"
    }
    fn open(&self, _span_id: u32, _chan_id: u32) -> Result<()> {
        Ok(())
    }
    fn close(&self, _span_id: u32, _chan_id: u32) -> Result<()> {
        Ok(())
    }
    fn read(&self, _span_id: u32, _chan_id: u32) -> Result<RawFrame> {
        Ok(RawFrame { data: vec![0u8; 320] })
    }
    fn write(&self, _span_id: u32, _chan_id: u32, _frame: &RawFrame) -> Result<()> {
        Ok(())
    }
}

fn mark_all_ready(span: &zaptel_core::span::Span) {
    for chan_id in 1..=span.channel_count() as u32 {
        span.channel(chan_id).unwrap().lock().flags.insert(ChannelFlags::READY);
    }
}

// =========================================================================
// allocation: hunt direction and span scan order
// =========================================================================
mod allocation {
    use super::*;

    #[test]
    fn top_down_picks_lowest_free_channel_in_lowest_span() {
        let registry = Registry::new();
        let driver: Arc<dyn IoDriver> = Arc::new(NullDriver);
        registry.register_driver(driver);

        let span1 = registry.create_span("s1", TrunkType::Fxo, AnalogStartType::LoopStart, 4, "null").unwrap();
        let span2 = registry.create_span("s2", TrunkType::Fxo, AnalogStartType::LoopStart, 4, "null").unwrap();
        mark_all_ready(&span1);
        mark_all_ready(&span2);

        let (span_id, chan_id) = alloc::open_any(&registry, 0, HuntDirection::TopDown).unwrap();
        assert_eq!((span_id, chan_id), (span1.id, 1));

        // channel 1 is now INUSE; the next hunt should skip to channel 2.
        let (span_id, chan_id) = alloc::open_any(&registry, 0, HuntDirection::TopDown).unwrap();
        assert_eq!((span_id, chan_id), (span1.id, 2));
    }

    #[test]
    fn bottom_up_picks_highest_free_channel_in_highest_span() {
        let registry = Registry::new();
        let driver: Arc<dyn IoDriver> = Arc::new(NullDriver);
        registry.register_driver(driver);

        let span1 = registry.create_span("s1", TrunkType::Fxo, AnalogStartType::LoopStart, 4, "null").unwrap();
        let span2 = registry.create_span("s2", TrunkType::Fxo, AnalogStartType::LoopStart, 4, "null").unwrap();
        mark_all_ready(&span1);
        mark_all_ready(&span2);

        let (span_id, chan_id) = alloc::open_any(&registry, 0, HuntDirection::BottomUp).unwrap();
        assert_eq!((span_id, chan_id), (span2.id, 4));
    }

    #[test]
    fn busy_span_reports_no_channel_available() {
        let registry = Registry::new();
        let driver: Arc<dyn IoDriver> = Arc::new(NullDriver);
        registry.register_driver(driver);
        let span = registry.create_span("s1", TrunkType::Fxo, AnalogStartType::LoopStart, 1, "null").unwrap();
        // Never marked READY: the single channel is unavailable.
        let result = alloc::open_any(&registry, span.id, HuntDirection::TopDown);
        assert!(result.is_err());
    }

    /// Advertises `CHANNEL_REQUEST` but not `SUGGEST_CHAN_ID`: `open_any`
    /// must delegate channel selection to it rather than scanning.
    struct RequestingDriver {
        requested: AtomicUsize,
    }

    impl IoDriver for RequestingDriver {
        fn name(&self) -> &str {
            "requesting"
        }
        fn capabilities(&self) -> DriverCapabilities {
            DriverCapabilities::CHANNEL_REQUEST
        }
        fn open(&self, _span_id: u32, _chan_id: u32) -> Result<()> {
            Ok(())
        }
        fn close(&self, _span_id: u32, _chan_id: u32) -> Result<()> {
            Ok(())
        }
        fn read(&self, _span_id: u32, _chan_id: u32) -> Result<RawFrame> {
            Ok(RawFrame { data: vec![0u8; 320] })
        }
        fn write(&self, _span_id: u32, _chan_id: u32, _frame: &RawFrame) -> Result<()> {
            Ok(())
        }
        fn channel_request(&self, _span_id: u32, _direction: HuntDirection) -> Result<u32> {
            self.requested.fetch_add(1, Ordering::SeqCst);
            // Always hand back channel 3, out of scan order, to prove
            // delegation actually happened rather than a coincidental scan.
            Ok(3)
        }
    }

    #[test]
    fn open_any_delegates_to_channel_request_when_advertised() {
        let registry = Registry::new();
        let driver: Arc<dyn IoDriver> = Arc::new(RequestingDriver { requested: AtomicUsize::new(0) });
        registry.register_driver(driver);
        let span = registry.create_span("s1", TrunkType::Fxo, AnalogStartType::LoopStart, 4, "requesting").unwrap();
        mark_all_ready(&span);

        let (span_id, chan_id) = alloc::open_any(&registry, span.id, HuntDirection::TopDown).unwrap();
        assert_eq!((span_id, chan_id), (span.id, 3));
    }

    /// An FXS channel already open with exactly one token attached may be
    /// re-opened (3-way/call-waiting case); anything else still fails.
    #[test]
    fn fxs_channel_reopens_with_one_token() {
        use zaptel_core::channel::ChannelType;

        let registry = Registry::new();
        let driver: Arc<dyn IoDriver> = Arc::new(NullDriver);
        registry.register_driver(driver);
        let span = registry.create_span("s1", TrunkType::Fxs, AnalogStartType::LoopStart, 1, "null").unwrap();
        {
            let guard = span.channel(1).unwrap();
            let mut chan = guard.lock();
            chan.chan_type = ChannelType::Fxs;
            chan.flags.insert(ChannelFlags::OPEN);
            chan.push_token("call-a");
        }

        let (span_id, chan_id) = alloc::open(&registry, span.id, 1).unwrap();
        assert_eq!((span_id, chan_id), (span.id, 1));
    }

    #[test]
    fn fxs_channel_with_two_tokens_refuses_reopen() {
        use zaptel_core::channel::ChannelType;

        let registry = Registry::new();
        let driver: Arc<dyn IoDriver> = Arc::new(NullDriver);
        registry.register_driver(driver);
        let span = registry.create_span("s1", TrunkType::Fxs, AnalogStartType::LoopStart, 1, "null").unwrap();
        {
            let guard = span.channel(1).unwrap();
            let mut chan = guard.lock();
            chan.chan_type = ChannelType::Fxs;
            chan.flags.insert(ChannelFlags::OPEN);
            chan.push_token("call-a");
            chan.push_token("call-b");
        }

        assert!(alloc::open(&registry, span.id, 1).is_err());
    }
}

// =========================================================================
// media: DTMF hangup detection
// =========================================================================
mod media {
    use super::*;
    use zaptel_core::channel::{Channel, ChannelType};
    use zaptel_core::media::queue_dtmf;
    use zaptel_core::state::ChannelState;

    fn span_with_hangup(hangup: &str) -> zaptel_core::span::Span {
        let driver: Arc<dyn IoDriver> = Arc::new(NullDriver);
        let mut span = zaptel_core::span::Span::new(
            1,
            "s1",
            TrunkType::Fxo,
            AnalogStartType::LoopStart,
            1,
            driver,
        );
        span.dtmf_hangup = hangup.to_string();
        span
    }

    #[test]
    fn rolling_window_triggers_hangup_on_exact_match() {
        let span = span_with_hangup("##");
        let mut chan = Channel::new(1, 1, ChannelType::B);

        // The hangup scan matches on the second '#', but the whole leading
        // DTMF run is still queued regardless.
        queue_dtmf(&mut chan, &span, "1##");
        assert_eq!(chan.state, ChannelState::Hangup);
        let queued: String = chan.digit_buffer.iter().collect();
        assert_eq!(queued, "1##");
    }

    #[test]
    fn non_matching_digits_do_not_trigger_hangup() {
        let span = span_with_hangup("##");
        let mut chan = Channel::new(1, 1, ChannelType::B);
        queue_dtmf(&mut chan, &span, "123");
        assert_ne!(chan.state, ChannelState::Hangup);
        let queued: String = chan.digit_buffer.iter().collect();
        assert_eq!(queued, "123");
    }

    #[test]
    fn dequeue_drains_buffer() {
        let span = span_with_hangup("");
        let mut chan = Channel::new(1, 1, ChannelType::B);
        chan.flags.insert(ChannelFlags::READY);
        queue_dtmf(&mut chan, &span, "5551212");
        let out = zaptel_core::media::dequeue_dtmf(&mut chan, 80);
        assert_eq!(out, "5551212");
        assert!(chan.digit_buffer.is_empty());
    }

    struct FixedModulator;
    impl zaptel_core::tone::FskModulator for FixedModulator {
        fn modulate(
            &mut self,
            payload: &[u8],
            _params: zaptel_core::tone::FskSendParams,
            out: &mut Vec<i16>,
        ) {
            out.extend(payload.iter().map(|&b| b as i16));
        }
    }

    #[test]
    fn send_fsk_data_uses_short_cadence_with_multiple_tokens() {
        let mut chan = Channel::new(1, 1, ChannelType::B);
        chan.push_token("call-a");
        chan.push_token("call-b");
        chan.buffer_delay = 99; // must not be touched by the >1 token branch
        let mut modulator = FixedModulator;
        zaptel_core::media::send_fsk_data(&mut chan, &[1, 2, 3], &mut modulator);
        assert_eq!(chan.fsk_buffer, vec![1, 2, 3]);
        assert_eq!(chan.buffer_delay, 99);
    }

    #[test]
    fn send_fsk_data_sets_buffer_delay_with_single_token() {
        let mut chan = Channel::new(1, 1, ChannelType::B);
        chan.effective_interval = 20;
        let mut modulator = FixedModulator;
        zaptel_core::media::send_fsk_data(&mut chan, &[9], &mut modulator);
        assert_eq!(chan.fsk_buffer, vec![9]);
        assert_eq!(chan.buffer_delay, 3500 / 20);
    }

    /// A driver whose `read` hands back a canned Bell 202 SDMF caller-ID
    /// payload, wrapped as raw slin samples.
    struct CalleridDriver;
    impl IoDriver for CalleridDriver {
        fn name(&self) -> &str {
            "callerid"
        }
        fn open(&self, _span_id: u32, _chan_id: u32) -> Result<()> {
            Ok(())
        }
        fn close(&self, _span_id: u32, _chan_id: u32) -> Result<()> {
            Ok(())
        }
        fn read(&self, _span_id: u32, _chan_id: u32) -> Result<RawFrame> {
            Ok(RawFrame { data: vec![0u8; 160] })
        }
        fn write(&self, _span_id: u32, _chan_id: u32, _frame: &RawFrame) -> Result<()> {
            Ok(())
        }
    }

    struct FixedDemodulator {
        payload: Vec<u8>,
    }
    impl zaptel_core::tone::FskDemodulator for FixedDemodulator {
        fn demodulate(&mut self, _samples: &[i16]) -> Option<Vec<u8>> {
            Some(self.payload.clone())
        }
    }

    #[test]
    fn callerid_detect_parses_sdmf_payload_into_caller_data() {
        use zaptel_core::media::{read, Detectors};

        let driver: Arc<dyn IoDriver> = Arc::new(CalleridDriver);
        let span = zaptel_core::span::Span::new(1, "s1", TrunkType::Fxs, AnalogStartType::LoopStart, 1, driver);
        let mut chan = Channel::new(1, 1, ChannelType::Fxs);
        chan.flags.insert(ChannelFlags::OPEN | ChannelFlags::CALLERID_DETECT);

        let mut payload = vec![0x04u8, 0x00];
        payload.extend_from_slice(b"07311200"); // SDMF date/time field
        payload.extend_from_slice(b"5551234567");
        let mut demod = FixedDemodulator { payload };
        let mut detectors = Detectors {
            fsk: Some(&mut demod),
            ..Detectors::default()
        };

        read(&mut chan, &span, &mut detectors).unwrap();

        assert_eq!(chan.caller_data.cid_num, "5551234567");
        assert_eq!(chan.caller_data.ani, "5551234567");
        assert_eq!(chan.caller_data.cid_date, "07311200");
        assert!(!chan.flags.contains(ChannelFlags::CALLERID_DETECT));
    }

    #[test]
    fn callwaiting_ack_digit_bumps_counter_instead_of_queuing() {
        use zaptel_core::media::{read, Detectors};
        use zaptel_core::state::ChannelState;
        use zaptel_core::tone::ToneKind;

        struct DigitDriver;
        impl IoDriver for DigitDriver {
            fn name(&self) -> &str {
                "digit"
            }
            fn open(&self, _: u32, _: u32) -> Result<()> {
                Ok(())
            }
            fn close(&self, _: u32, _: u32) -> Result<()> {
                Ok(())
            }
            fn read(&self, _: u32, _: u32) -> Result<RawFrame> {
                Ok(RawFrame { data: vec![0u8; 160] })
            }
            fn write(&self, _: u32, _: u32, _: &RawFrame) -> Result<()> {
                Ok(())
            }
        }
        struct AckDetector;
        impl zaptel_core::tone::DtmfDetector for AckDetector {
            fn detect(&mut self, _samples: &[i16]) -> String {
                "D".to_string()
            }
        }

        let driver: Arc<dyn IoDriver> = Arc::new(DigitDriver);
        let span = zaptel_core::span::Span::new(1, "s1", TrunkType::Fxs, AnalogStartType::LoopStart, 1, driver);
        let mut chan = Channel::new(1, 1, ChannelType::Fxs);
        chan.flags.insert(ChannelFlags::OPEN | ChannelFlags::DTMF_DETECT);
        chan.state = ChannelState::CallWaiting;

        let mut detector = AckDetector;
        let mut detectors = Detectors {
            dtmf: Some(&mut detector),
            ..Detectors::default()
        };
        read(&mut chan, &span, &mut detectors).unwrap();

        let idx = Channel::tone_kind_index(ToneKind::CallWaitingAck);
        assert_eq!(chan.detected_tones[idx], 1);
        assert!(chan.digit_buffer.is_empty());
    }
}

// =========================================================================
// trace capture
// =========================================================================
mod trace {
    use super::*;
    use std::io::Read as _;
    use zaptel_core::channel::{Channel, ChannelType};
    use zaptel_core::command::{dispatch, Command};
    use zaptel_core::media::{read, write, Detectors};
    use zaptel_core::span::Span;

    #[test]
    fn trace_input_and_output_mirror_native_bytes() {
        let dir = std::env::temp_dir().join(format!("zaptel-trace-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let in_path = dir.join("in.raw");
        let out_path = dir.join("out.raw");

        let driver: Arc<dyn IoDriver> = Arc::new(NullDriver);
        let span = Span::new(1, "s1", TrunkType::Fxo, AnalogStartType::LoopStart, 1, driver);
        let mut chan = Channel::new(1, 1, ChannelType::B);
        chan.flags.insert(ChannelFlags::OPEN);

        dispatch(
            &mut chan,
            span.driver.as_ref(),
            1,
            1,
            Command::TraceInput(Some(in_path.to_string_lossy().to_string())),
        )
        .unwrap();
        dispatch(
            &mut chan,
            span.driver.as_ref(),
            1,
            1,
            Command::TraceOutput(Some(out_path.to_string_lossy().to_string())),
        )
        .unwrap();

        let mut detectors = Detectors::default();
        read(&mut chan, &span, &mut detectors).unwrap();
        write(&mut chan, &span, zaptel_core::codec::Codec::Slin, &[1, 2, 3, 4]).unwrap();

        // Drop the channel's sinks so the files are flushed and closed
        // before being read back.
        chan.trace_input = None;
        chan.trace_output = None;

        let mut in_bytes = Vec::new();
        std::fs::File::open(&in_path).unwrap().read_to_end(&mut in_bytes).unwrap();
        assert_eq!(in_bytes.len(), 320);

        let mut out_bytes = Vec::new();
        std::fs::File::open(&out_path).unwrap().read_to_end(&mut out_bytes).unwrap();
        assert_eq!(out_bytes, vec![1, 2, 3, 4]);

        let _ = std::fs::remove_dir_all(&dir);
    }
}

// =========================================================================
// command dispatch
// =========================================================================
mod command {
    use super::*;
    use zaptel_core::channel::{Channel, ChannelType};
    use zaptel_core::command::{dispatch, Command, CommandReply};

    #[test]
    fn get_dtmf_off_period_returns_off_not_on() {
        let mut chan = Channel::new(1, 1, ChannelType::B);
        chan.dtmf_on = 100;
        chan.dtmf_off = 250;
        let driver = NullDriver;
        let reply = dispatch(&mut chan, &driver, 1, 1, Command::GetDtmfOffPeriod).unwrap();
        assert_eq!(reply, CommandReply::Period(250));
    }

    #[test]
    fn disable_dtmf_detect_does_not_affect_dtmf_on_period() {
        let mut chan = Channel::new(1, 1, ChannelType::B);
        chan.flags.insert(ChannelFlags::DTMF_DETECT);
        chan.dtmf_on = 90;
        let driver = NullDriver;
        dispatch(&mut chan, &driver, 1, 1, Command::DisableDtmfDetect).unwrap();
        assert!(!chan.flags.contains(ChannelFlags::DTMF_DETECT));
        let reply = dispatch(&mut chan, &driver, 1, 1, Command::GetDtmfOnPeriod).unwrap();
        assert_eq!(reply, CommandReply::Period(90));
    }

    #[test]
    fn hardware_command_without_capability_is_not_implemented() {
        let mut chan = Channel::new(1, 1, ChannelType::B);
        let driver = NullDriver;
        let err = dispatch(&mut chan, &driver, 1, 1, Command::Offhook).unwrap_err();
        assert_eq!(err.status(), zaptel_core::error::Status::NotImplemented);
    }

    struct NativeDetectDriver;
    impl IoDriver for NativeDetectDriver {
        fn name(&self) -> &str {
            "native-detect"
        }
        fn capabilities(&self) -> DriverCapabilities {
            DriverCapabilities::DTMF_DETECT | DriverCapabilities::CALLERID_DETECT | DriverCapabilities::PROGRESS
        }
        fn open(&self, _: u32, _: u32) -> Result<()> {
            Ok(())
        }
        fn close(&self, _: u32, _: u32) -> Result<()> {
            Ok(())
        }
        fn read(&self, _: u32, _: u32) -> Result<RawFrame> {
            Ok(RawFrame { data: vec![] })
        }
        fn write(&self, _: u32, _: u32, _: &RawFrame) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn detect_commands_are_noops_when_driver_advertises_native_support() {
        let mut chan = Channel::new(1, 1, ChannelType::B);
        let driver = NativeDetectDriver;

        dispatch(&mut chan, &driver, 1, 1, Command::EnableDtmfDetect).unwrap();
        assert!(!chan.flags.contains(ChannelFlags::DTMF_DETECT));

        dispatch(&mut chan, &driver, 1, 1, Command::EnableCalleridDetect).unwrap();
        assert!(!chan.flags.contains(ChannelFlags::CALLERID_DETECT));

        dispatch(&mut chan, &driver, 1, 1, Command::EnableProgressDetect).unwrap();
        assert!(!chan.flags.contains(ChannelFlags::PROGRESS_DETECT));
    }

    #[test]
    fn detect_commands_arm_software_flag_without_native_support() {
        let mut chan = Channel::new(1, 1, ChannelType::B);
        let driver = NullDriver;

        dispatch(&mut chan, &driver, 1, 1, Command::EnableDtmfDetect).unwrap();
        assert!(chan.flags.contains(ChannelFlags::DTMF_DETECT));

        dispatch(&mut chan, &driver, 1, 1, Command::EnableCalleridDetect).unwrap();
        assert!(chan.flags.contains(ChannelFlags::CALLERID_DETECT));
    }
}

// =========================================================================
// tone map loader
// =========================================================================
mod tone_map {
    use zaptel_core::config::IniDocument;
    use zaptel_core::tone::{load_tone_map, ToneKind};

    #[test]
    fn loads_detect_and_generate_keys() {
        let doc = IniDocument::parse(
            "[us]\ndetect-dial = 350,440\ngenerate-dial = 350+440\ndetect-busy = 480,620\n",
        );
        let map = load_tone_map("us", &doc).unwrap();
        assert_eq!(map.detect.get(&ToneKind::Dial).unwrap(), &vec![350, 440]);
        assert_eq!(map.generate.get(&ToneKind::Dial).unwrap(), "350+440");
        assert_eq!(map.detect.get(&ToneKind::Busy).unwrap(), &vec![480, 620]);
    }

    #[test]
    fn missing_section_fails() {
        let doc = IniDocument::parse("[us]\ndetect-dial = 350,440\n");
        assert!(load_tone_map("missing", &doc).is_err());
    }

    #[test]
    fn empty_section_fails() {
        let doc = IniDocument::parse("[empty]\n");
        assert!(load_tone_map("empty", &doc).is_err());
    }

    #[test]
    fn default_tone_map_carries_dial_ring_busy_attn() {
        let map = zaptel_core::tone::default_tone_map();
        assert!(map.generate.contains_key(&ToneKind::Dial));
        assert!(map.generate.contains_key(&ToneKind::Ring));
        assert!(map.generate.contains_key(&ToneKind::Busy));
        assert!(map.generate.contains_key(&ToneKind::Attn));
        assert_eq!(map.detect.get(&ToneKind::Attn).unwrap(), &vec![1400, 2060, 2450, 2600]);
    }
}

// =========================================================================
// registry
// =========================================================================
mod registry {
    use super::*;

    #[test]
    fn duplicate_span_name_rejected() {
        let registry = Registry::new();
        let driver: Arc<dyn IoDriver> = Arc::new(NullDriver);
        registry.register_driver(driver);
        registry.create_span("s1", TrunkType::Fxo, AnalogStartType::LoopStart, 2, "null").unwrap();
        let err = registry
            .create_span("s1", TrunkType::Fxo, AnalogStartType::LoopStart, 2, "null")
            .unwrap_err();
        assert!(format!("{err}").contains("already in use"));
    }

    #[test]
    fn unknown_driver_reports_driver_not_found() {
        let registry = Registry::new();
        let err = registry
            .create_span("s1", TrunkType::Fxo, AnalogStartType::LoopStart, 2, "missing")
            .unwrap_err();
        assert!(matches!(err, zaptel_core::error::ZtError::DriverNotFound(_)));
    }

    #[test]
    fn find_span_by_name_and_id_agree() {
        let registry = Registry::new();
        let driver: Arc<dyn IoDriver> = Arc::new(NullDriver);
        registry.register_driver(driver);
        let span = registry.create_span("s1", TrunkType::Fxo, AnalogStartType::LoopStart, 2, "null").unwrap();
        let by_name = registry.find_span_by_name("s1").unwrap();
        let by_id = registry.find_span_by_id(span.id).unwrap();
        assert_eq!(by_name.id, by_id.id);
    }

    #[test]
    fn create_span_installs_default_tone_map_and_clears_trunk_type() {
        let registry = Registry::new();
        let driver: Arc<dyn IoDriver> = Arc::new(NullDriver);
        registry.register_driver(driver);
        let span = registry.create_span("s1", TrunkType::Fxs, AnalogStartType::LoopStart, 1, "null").unwrap();
        assert!(span.tone_map.generate.contains_key(&zaptel_core::tone::ToneKind::Dial));
        assert_eq!(span.trunk_type, TrunkType::None);
        assert!(span.configured.load(Ordering::SeqCst));
    }

    /// Tracks teardown calls so the ordering contract (close/destroy every
    /// channel, then destroy the span) is actually exercised, not just
    /// assumed not to panic.
    struct TeardownDriver {
        closed: std::sync::Mutex<Vec<u32>>,
        channels_destroyed: std::sync::Mutex<Vec<u32>>,
        span_destroyed: std::sync::atomic::AtomicBool,
    }

    impl IoDriver for TeardownDriver {
        fn name(&self) -> &str {
            "teardown"
        }
        fn open(&self, _: u32, _: u32) -> Result<()> {
            Ok(())
        }
        fn close(&self, _: u32, chan_id: u32) -> Result<()> {
            self.closed.lock().unwrap().push(chan_id);
            Ok(())
        }
        fn read(&self, _: u32, _: u32) -> Result<RawFrame> {
            Ok(RawFrame::default())
        }
        fn write(&self, _: u32, _: u32, _: &RawFrame) -> Result<()> {
            Ok(())
        }
        fn channel_destroy(&self, _: u32, chan_id: u32) -> Result<()> {
            self.channels_destroyed.lock().unwrap().push(chan_id);
            Ok(())
        }
        fn span_destroy(&self, _: u32) -> Result<()> {
            self.span_destroyed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn close_all_spans_closes_and_resets_every_channel() {
        let registry = Registry::new();
        let driver = Arc::new(TeardownDriver {
            closed: std::sync::Mutex::new(Vec::new()),
            channels_destroyed: std::sync::Mutex::new(Vec::new()),
            span_destroyed: std::sync::atomic::AtomicBool::new(false),
        });
        registry.register_driver(driver.clone() as Arc<dyn IoDriver>);
        let span = registry.create_span("s1", TrunkType::Fxo, AnalogStartType::LoopStart, 2, "teardown").unwrap();
        span.channel(1).unwrap().lock().flags.insert(ChannelFlags::INUSE);
        span.channel(2).unwrap().lock().flags.insert(ChannelFlags::ANSWERED);

        registry.close_all_spans();

        assert_eq!(*driver.closed.lock().unwrap(), vec![1, 2]);
        assert!(!span.channel(1).unwrap().lock().flags.contains(ChannelFlags::INUSE));
        assert!(!span.channel(2).unwrap().lock().flags.contains(ChannelFlags::ANSWERED));
    }

    #[test]
    fn destroy_all_destroys_every_channel_then_the_span_and_clears_registry() {
        let registry = Registry::new();
        let driver = Arc::new(TeardownDriver {
            closed: std::sync::Mutex::new(Vec::new()),
            channels_destroyed: std::sync::Mutex::new(Vec::new()),
            span_destroyed: std::sync::atomic::AtomicBool::new(false),
        });
        registry.register_driver(driver.clone() as Arc<dyn IoDriver>);
        let span = registry.create_span("s1", TrunkType::Fxo, AnalogStartType::LoopStart, 2, "teardown").unwrap();
        let span_id = span.id;
        drop(span);

        registry.destroy_all();

        assert_eq!(*driver.channels_destroyed.lock().unwrap(), vec![1, 2]);
        assert!(driver.span_destroyed.load(Ordering::SeqCst));
        assert!(registry.find_span_by_id(span_id).is_err());
    }
}

// =========================================================================
// text API stream
// =========================================================================
mod api {
    use super::*;
    use zaptel_core::api::api_execute;

    struct EchoDriver;
    impl IoDriver for EchoDriver {
        fn name(&self) -> &str {
            "echo"
        }
        fn open(&self, _: u32, _: u32) -> Result<()> {
            Ok(())
        }
        fn close(&self, _: u32, _: u32) -> Result<()> {
            Ok(())
        }
        fn read(&self, _: u32, _: u32) -> Result<RawFrame> {
            Ok(RawFrame::default())
        }
        fn write(&self, _: u32, _: u32, _: &RawFrame) -> Result<()> {
            Ok(())
        }
        fn api(&self, command: &str) -> Result<String> {
            Ok(format!("ok: {command}"))
        }
    }

    #[test]
    fn api_execute_forwards_command_text_to_the_named_driver() {
        let registry = Registry::new();
        let driver: Arc<dyn IoDriver> = Arc::new(EchoDriver);
        registry.register_driver(driver);
        let reply = api_execute(&registry, "echo", "show channels").unwrap();
        assert_eq!(reply, "ok: show channels");
    }

    #[test]
    fn api_execute_reports_unknown_driver() {
        let registry = Registry::new();
        assert!(api_execute(&registry, "missing", "anything").is_err());
    }
}
