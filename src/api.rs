//! Text API stream (§6): `api_execute(type, cmd)` looks up a driver by
//! type (auto-loading on miss) and forwards the raw command text to that
//! driver's own `api` method, returning its response verbatim.

use crate::error::Result;
use crate::registry::Registry;

/// Forward `cmd` to the driver named `driver_type`, returning its text
/// response. The driver interprets `cmd` however it sees fit; the core
/// only does the lookup/autoload and relays the result.
pub fn api_execute(registry: &Registry, driver_type: &str, cmd: &str) -> Result<String> {
    let driver = registry.lookup_driver_or_autoload(driver_type)?;
    driver.api(cmd)
}
