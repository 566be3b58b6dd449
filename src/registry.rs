//! Process-wide directory of drivers and spans, guarded by a single mutex
//! at the top of the registry -> span -> channel lock order.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;

use crate::driver::{IoDriver, ModuleLoader};
use crate::error::{Result, ZtError};
use crate::span::{AnalogStartType, Span, TrunkType};

struct RegistryInner {
    drivers: HashMap<String, Arc<dyn IoDriver>>,
    spans_by_id: HashMap<u32, Arc<Span>>,
    spans_by_name: HashMap<String, u32>,
    next_id: u32,
    loader: Option<Arc<dyn ModuleLoader>>,
}

/// The process-wide registry of drivers and spans.
///
/// A process uses a single instance, reached through [`Registry::global`];
/// `registry -> span -> channel` is the only acquisition order callers may
/// take (never upward).
pub struct Registry {
    inner: Mutex<RegistryInner>,
}

static GLOBAL: OnceLock<Registry> = OnceLock::new();

impl Registry {
    /// The process-wide instance, lazily initialised on first use. This
    /// supersedes an explicit `global_init`/`global_destroy` pair: a
    /// `OnceLock` makes first-use initialisation race-free without one.
    pub fn global() -> &'static Registry {
        GLOBAL.get_or_init(Registry::new)
    }

    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                drivers: HashMap::new(),
                spans_by_id: HashMap::new(),
                spans_by_name: HashMap::new(),
                next_id: 1,
                loader: None,
            }),
        }
    }

    pub fn set_module_loader(&self, loader: Arc<dyn ModuleLoader>) {
        self.inner.lock().loader = Some(loader);
    }

    pub fn register_driver(&self, driver: Arc<dyn IoDriver>) {
        let name = driver.name().to_string();
        log::debug!("registering driver {name}");
        self.inner.lock().drivers.insert(name, driver);
    }

    /// Look up a driver by name, attempting one autoload retry via the
    /// configured [`ModuleLoader`] on a miss — the only retried lookup in
    /// the registry, per the concurrency model.
    pub fn lookup_driver_or_autoload(&self, name: &str) -> Result<Arc<dyn IoDriver>> {
        {
            let inner = self.inner.lock();
            if let Some(driver) = inner.drivers.get(name) {
                return Ok(driver.clone());
            }
        }
        let loaded = {
            let inner = self.inner.lock();
            inner.loader.as_ref().and_then(|loader| loader.load(name))
        };
        match loaded {
            Some(driver) => {
                self.register_driver(driver.clone());
                Ok(driver)
            }
            None => Err(ZtError::DriverNotFound(name.to_string())),
        }
    }

    pub fn create_span(
        &self,
        name: impl Into<String>,
        trunk_type: TrunkType,
        start_type: AnalogStartType,
        num_channels: usize,
        driver_name: &str,
    ) -> Result<Arc<Span>> {
        let name = name.into();
        let driver = self.lookup_driver_or_autoload(driver_name)?;

        let mut inner = self.inner.lock();
        if inner.spans_by_name.contains_key(&name) {
            return Err(ZtError::fail(format!("span name already in use: {name}")));
        }
        let id = inner.next_id;
        inner.next_id += 1;

        let mut span = Span::new(id, name.clone(), trunk_type, start_type, num_channels, driver);
        span.tone_map = crate::tone::default_tone_map();
        span.trunk_type = TrunkType::None;
        span.configured.store(true, std::sync::atomic::Ordering::SeqCst);
        let span = Arc::new(span);
        inner.spans_by_id.insert(id, span.clone());
        inner.spans_by_name.insert(name, id);
        log::info!("created span {id} with {} channels", span.channel_count());
        Ok(span)
    }

    pub fn find_span_by_id(&self, id: u32) -> Result<Arc<Span>> {
        self.inner
            .lock()
            .spans_by_id
            .get(&id)
            .cloned()
            .ok_or_else(|| ZtError::SpanNotFound(id.to_string()))
    }

    pub fn find_span_by_name(&self, name: &str) -> Result<Arc<Span>> {
        let inner = self.inner.lock();
        let id = inner
            .spans_by_name
            .get(name)
            .copied()
            .ok_or_else(|| ZtError::SpanNotFound(name.to_string()))?;
        inner
            .spans_by_id
            .get(&id)
            .cloned()
            .ok_or_else(|| ZtError::SpanNotFound(name.to_string()))
    }

    /// Close every span's driver binding and reset every channel for
    /// reuse, without freeing the Span structure itself — this is what
    /// lets a closed span be reconfigured and restarted (§4.1).
    pub fn close_all_spans(&self) {
        let inner = self.inner.lock();
        for span in inner.spans_by_id.values() {
            for chan_id in 1..=span.channel_count() as u32 {
                let _ = span.driver.close(span.id, chan_id);
                if let Some(guard) = span.channel(chan_id) {
                    guard.lock().reset_for_reuse();
                }
            }
        }
    }

    /// Tear down every span and driver, clearing the registry entirely.
    ///
    /// Per §5's destruction ordering: clear CONFIGURED first, destroy each
    /// channel (waiting out INTHREAD before asking the driver to destroy
    /// it), then destroy the span itself.
    pub fn destroy_all(&self) {
        let mut inner = self.inner.lock();
        for span in inner.spans_by_id.values() {
            span.configured.store(false, std::sync::atomic::Ordering::SeqCst);
            for chan_id in 1..=span.channel_count() as u32 {
                if let Some(guard) = span.channel(chan_id) {
                    wait_inthread_clear(guard);
                    let _ = span.driver.channel_destroy(span.id, chan_id);
                }
            }
            let _ = span.driver.span_destroy(span.id);
        }
        inner.spans_by_id.clear();
        inner.spans_by_name.clear();
        inner.drivers.clear();
        log::info!("registry destroyed");
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

/// Block until a channel's INTHREAD flag clears, per §5's destruction
/// ordering ("wait on INTHREAD" before asking the driver to tear down the
/// channel it's bound to).
fn wait_inthread_clear(guard: &Mutex<crate::channel::Channel>) {
    loop {
        if !guard.lock().flags.contains(crate::channel::ChannelFlags::INTHREAD) {
            return;
        }
        std::thread::sleep(std::time::Duration::from_millis(500));
    }
}
