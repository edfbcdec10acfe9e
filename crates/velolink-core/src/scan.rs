//! Device discovery for FTMS indoor bikes.
//!
//! Scanning is attempt-based: each attempt opens one bounded scan window and
//! watches adapter events as they arrive, so a match ends the window early
//! instead of waiting it out. Attempt budgets live in [`ScanOptions`] and are
//! local to a single [`locate`] call.
//!
//! # Example
//!
//! ```no_run
//! use velolink_core::BikeLink;
//! use velolink_core::scan::{self, DeviceFilter, ScanOptions};
//!
//! # async fn example() -> velolink_core::Result<()> {
//! let adapter = scan::get_adapter().await?;
//! let filter = DeviceFilter::new().name_contains("BIKE");
//! let link = scan::locate(&adapter, &filter, &ScanOptions::default()).await?;
//! println!("found {}", link.label());
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::time::Duration;

use btleplug::api::{Central, CentralEvent, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, PeripheralId};
use futures::StreamExt;
use tracing::{debug, info, warn};
use uuid::Uuid;
use velolink_types::uuids::FITNESS_MACHINE_SERVICE;

use crate::error::{Error, Result};
use crate::link::{BikeLink, FtmsLink};

/// Criteria an advertisement must meet to count as the target bike.
#[derive(Debug, Clone)]
pub struct DeviceFilter {
    /// Service the advertisement must carry.
    pub service: Uuid,
    /// Optional case-insensitive substring of the advertised local name.
    pub name_contains: Option<String>,
}

impl Default for DeviceFilter {
    fn default() -> Self {
        Self {
            service: FITNESS_MACHINE_SERVICE,
            name_contains: None,
        }
    }
}

impl DeviceFilter {
    /// Filter that accepts any advertising fitness machine.
    pub fn new() -> Self {
        Self::default()
    }

    /// Require a different service than the fitness machine service.
    #[must_use]
    pub fn service(mut self, service: Uuid) -> Self {
        self.service = service;
        self
    }

    /// Only accept devices whose advertised name contains `needle`
    /// (case-insensitive).
    #[must_use]
    pub fn name_contains(mut self, needle: impl Into<String>) -> Self {
        self.name_contains = Some(needle.into());
        self
    }

    /// Whether an advertisement with these services and name passes.
    pub fn matches(&self, services: &[Uuid], local_name: Option<&str>) -> bool {
        if !services.contains(&self.service) {
            return false;
        }
        match &self.name_contains {
            Some(needle) => local_name
                .is_some_and(|name| name.to_lowercase().contains(&needle.to_lowercase())),
            None => true,
        }
    }

    /// Short description for log lines and errors.
    pub fn describe(&self) -> String {
        match &self.name_contains {
            Some(needle) => format!("service {} with name containing '{}'", self.service, needle),
            None => format!("service {}", self.service),
        }
    }
}

/// Options controlling [`locate`].
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Maximum number of scan windows before giving up.
    pub attempts: u32,
    /// Length of each scan window.
    pub window: Duration,
    /// Pause between consecutive windows.
    pub retry_delay: Duration,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            attempts: 3,
            window: Duration::from_secs(10),
            retry_delay: Duration::from_secs(3),
        }
    }
}

impl ScanOptions {
    /// Create options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of scan attempts.
    #[must_use]
    pub fn attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    /// Set the length of each scan window.
    #[must_use]
    pub fn window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    /// Set the pause between scan attempts.
    #[must_use]
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Validate option values.
    pub fn validate(&self) -> Result<()> {
        if self.attempts == 0 {
            return Err(Error::invalid_config("scan attempts must be at least 1"));
        }
        if self.window.is_zero() {
            return Err(Error::invalid_config("scan window must be non-zero"));
        }
        Ok(())
    }
}

/// Acquire the first available Bluetooth adapter.
pub async fn get_adapter() -> Result<Adapter> {
    let manager = Manager::new().await?;
    let adapters = manager.adapters().await?;
    adapters.into_iter().next().ok_or_else(Error::no_adapter)
}

/// Scan until an advertisement matches `filter`.
///
/// Runs up to `options.attempts` scan windows, pausing `options.retry_delay`
/// between them. A window ends as soon as a matching advertisement arrives;
/// the returned link has not been connected yet. Exhausting every attempt is
/// an [`Error::NotFound`].
#[tracing::instrument(level = "info", skip_all, fields(filter = %filter.describe()))]
pub async fn locate(
    adapter: &Adapter,
    filter: &DeviceFilter,
    options: &ScanOptions,
) -> Result<FtmsLink> {
    let link = locate_attempts(filter, options, || {
        scan_window(adapter, filter, options.window)
    })
    .await?;
    info!("Found fitness machine: {}", link.label());
    Ok(link)
}

/// Attempt loop behind [`locate`].
///
/// Drives `scan_attempt` up to `options.attempts` times, pausing
/// `options.retry_delay` between empty windows. The first window with a
/// match wins; a window error ends the loop at once.
async fn locate_attempts<T, F, Fut>(
    filter: &DeviceFilter,
    options: &ScanOptions,
    mut scan_attempt: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
{
    options.validate()?;

    for attempt in 1..=options.attempts {
        info!(
            "Scanning (attempt {}/{}, window {:?})",
            attempt, options.attempts, options.window
        );

        if let Some(found) = scan_attempt().await? {
            return Ok(found);
        }

        warn!(
            "No matching device in scan attempt {}/{}",
            attempt, options.attempts
        );
        if attempt < options.attempts {
            tokio::time::sleep(options.retry_delay).await;
        }
    }

    Err(Error::no_match(options.attempts, filter.describe()))
}

/// One scan window.
///
/// The event stream is subscribed before the scan starts so no advertisement
/// can slip between the two. A match aborts the window immediately. Once the
/// scan has started, discovery is always stopped before this returns.
async fn scan_window(
    adapter: &Adapter,
    filter: &DeviceFilter,
    window: Duration,
) -> Result<Option<FtmsLink>> {
    let mut events = adapter.events().await?;
    adapter.start_scan(ScanFilter::default()).await?;

    let matched = tokio::time::timeout(window, async {
        while let Some(event) = events.next().await {
            let id = match event {
                CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => id,
                CentralEvent::ServicesAdvertisement { id, .. } => id,
                _ => continue,
            };
            if let Some(link) = check_peripheral(adapter, &id, filter).await {
                return Some(link);
            }
        }
        None
    })
    .await
    .unwrap_or(None);

    // The event stream can miss peripherals the adapter already knew about,
    // so sweep the cache before declaring the window empty.
    let swept = match matched {
        Some(link) => Ok(Some(link)),
        None => sweep_known_peripherals(adapter, filter).await,
    };

    let stopped = adapter.stop_scan().await.map_err(Error::from);
    finish_window(swept, stopped)
}

/// Combine a window's outcome with the result of stopping discovery.
///
/// A found device survives a stop failure, which is only logged. An empty
/// window propagates the stop failure; a sweep error outranks it.
fn finish_window<T>(swept: Result<Option<T>>, stopped: Result<()>) -> Result<Option<T>> {
    match (swept, stopped) {
        (swept, Ok(())) => swept,
        (Ok(Some(found)), Err(stop_error)) => {
            warn!("Could not stop scan after a match: {}", stop_error);
            Ok(Some(found))
        }
        (Ok(None), Err(stop_error)) => Err(stop_error),
        (Err(sweep_error), Err(stop_error)) => {
            warn!("Could not stop scan: {}", stop_error);
            Err(sweep_error)
        }
    }
}

/// Resolve an advertised peripheral and test it against the filter.
///
/// Per-peripheral failures are logged and treated as a non-match; one
/// misbehaving advertisement must not abort the whole window.
async fn check_peripheral(
    adapter: &Adapter,
    id: &PeripheralId,
    filter: &DeviceFilter,
) -> Option<FtmsLink> {
    let peripheral = match adapter.peripheral(id).await {
        Ok(peripheral) => peripheral,
        Err(e) => {
            debug!("Could not resolve advertised peripheral {}: {}", id, e);
            return None;
        }
    };

    match peripheral.properties().await {
        Ok(Some(props)) if filter.matches(&props.services, props.local_name.as_deref()) => {
            Some(FtmsLink::new(peripheral, props.local_name))
        }
        Ok(_) => None,
        Err(e) => {
            debug!("Could not read properties of {}: {}", id, e);
            None
        }
    }
}

async fn sweep_known_peripherals(
    adapter: &Adapter,
    filter: &DeviceFilter,
) -> Result<Option<FtmsLink>> {
    for peripheral in adapter.peripherals().await? {
        if let Ok(Some(props)) = peripheral.properties().await
            && filter.matches(&props.services, props.local_name.as_deref())
        {
            return Ok(Some(FtmsLink::new(peripheral, props.local_name)));
        }
    }
    Ok(None)
}
