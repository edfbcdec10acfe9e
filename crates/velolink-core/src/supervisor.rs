//! Crash-and-restart supervision of the telemetry lifecycle.
//!
//! The supervisor runs an endless sequence of session cycles:
//!
//! ```text
//! BOOTSTRAP -> LOCATE -> CONNECT_SUBSCRIBE -> STREAM
//!     ^                                         |
//!     +------------- FAILED <------------------+
//! ```
//!
//! Any error from any stage lands in `FAILED`, which logs it and
//! immediately starts the next cycle from `BOOTSTRAP`. Nothing survives the
//! restart boundary: the session is torn down, and the retry budgets inside
//! the locator and session setup are locals that reset with every cycle.
//! Partial state, half-open connections included, is never trusted across a
//! failure.

use std::convert::Infallible;
use std::future::Future;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::pump::{self, PumpOptions};
use crate::scan::{self, DeviceFilter, ScanOptions};
use crate::session::{Session, SessionOptions};
use crate::sink::UplinkSink;

/// Lifecycle stage, used in log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Waiting for the uplink collector to answer its readiness probe.
    Bootstrap,
    /// Scanning for a matching fitness machine.
    Locate,
    /// Connecting and subscribing.
    ConnectSubscribe,
    /// Forwarding readings.
    Stream,
    /// A stage failed; the next cycle is about to begin.
    Failed,
}

impl Stage {
    /// Stable lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bootstrap => "bootstrap",
            Self::Locate => "locate",
            Self::ConnectSubscribe => "connect_subscribe",
            Self::Stream => "stream",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Options controlling [`supervise`].
#[derive(Debug, Clone)]
pub struct SupervisorOptions {
    /// Readiness probes sent before the cycle is abandoned.
    pub bootstrap_attempts: u32,
    /// Pause between readiness probes.
    pub bootstrap_delay: Duration,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            bootstrap_attempts: 50,
            bootstrap_delay: Duration::from_millis(200),
        }
    }
}

impl SupervisorOptions {
    /// Create options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of readiness probes per cycle.
    #[must_use]
    pub fn bootstrap_attempts(mut self, attempts: u32) -> Self {
        self.bootstrap_attempts = attempts;
        self
    }

    /// Set the pause between readiness probes.
    #[must_use]
    pub fn bootstrap_delay(mut self, delay: Duration) -> Self {
        self.bootstrap_delay = delay;
        self
    }

    /// Validate option values.
    pub fn validate(&self) -> Result<()> {
        if self.bootstrap_attempts == 0 {
            return Err(Error::invalid_config(
                "bootstrap attempts must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Poll the sink until it answers its readiness probe.
///
/// Probes up to `options.bootstrap_attempts` times (never fewer than one),
/// `options.bootstrap_delay` apart. Exhaustion is an
/// [`Error::LinkUnavailable`] carrying the last probe's error.
pub async fn ensure_uplink<S>(sink: &S, options: &SupervisorOptions) -> Result<()>
where
    S: UplinkSink + ?Sized,
{
    // A zero budget must still probe; the supervise loop relies on this
    // path reaching an await.
    let attempts = options.bootstrap_attempts.max(1);

    let mut last_error = String::from("no probes were sent");
    for attempt in 1..=attempts {
        match sink.ready().await {
            Ok(()) => {
                if attempt > 1 {
                    info!("Uplink reachable after {} probe(s)", attempt);
                }
                return Ok(());
            }
            Err(e) => {
                last_error = e.to_string();
                debug!("Uplink not ready (probe {}/{}): {}", attempt, attempts, e);
                if attempt < attempts {
                    tokio::time::sleep(options.bootstrap_delay).await;
                }
            }
        }
    }
    Err(Error::link_unavailable(attempts, last_error))
}

/// One full locate, connect, stream cycle against real Bluetooth.
///
/// Returns when any stage fails; the session, if one was established, is
/// torn down before the error is handed back.
pub async fn run_bluetooth_cycle<S>(
    sink: &S,
    filter: &DeviceFilter,
    scan_options: &ScanOptions,
    session_options: &SessionOptions,
    pump_options: &PumpOptions,
) -> Result<()>
where
    S: UplinkSink + ?Sized,
{
    debug!(stage = %Stage::Locate, "Locating fitness machine");
    let adapter = scan::get_adapter().await?;
    let link = scan::locate(&adapter, filter, scan_options).await?;

    debug!(stage = %Stage::ConnectSubscribe, "Establishing session");
    let session = Session::establish(link, session_options).await?;

    debug!(stage = %Stage::Stream, "Entering streaming loop");
    let outcome = pump::run(&session, sink, pump_options).await;
    session.teardown().await;
    outcome
}

/// Run session cycles forever, restarting after every failure.
///
/// Each cycle waits for the uplink, then drives `cycle` to completion. Any
/// error is logged and the next cycle starts immediately from bootstrap.
/// There is no terminal state; the future only ends when its task is
/// dropped or the process exits.
pub async fn supervise<S, F, Fut>(sink: &S, options: &SupervisorOptions, mut cycle: F) -> Infallible
where
    S: UplinkSink + ?Sized,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let mut cycles = 0u64;
    loop {
        cycles += 1;
        debug!(stage = %Stage::Bootstrap, cycle = cycles, "Waiting for uplink");

        let outcome = match ensure_uplink(sink, options).await {
            Ok(()) => cycle().await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(()) => warn!(
                stage = %Stage::Failed,
                cycle = cycles,
                "Session cycle ended without an error, restarting"
            ),
            Err(e) => error!(
                stage = %Stage::Failed,
                cycle = cycles,
                error = %e,
                "Session cycle failed, restarting"
            ),
        }
    }
}

/// Supervise real-Bluetooth session cycles with the given tunables.
///
/// Convenience wrapper binding [`supervise`] to [`run_bluetooth_cycle`].
pub async fn run<S>(
    sink: &S,
    filter: &DeviceFilter,
    scan_options: &ScanOptions,
    session_options: &SessionOptions,
    pump_options: &PumpOptions,
    options: &SupervisorOptions,
) -> Infallible
where
    S: UplinkSink + ?Sized,
{
    supervise(sink, options, || {
        run_bluetooth_cycle(sink, filter, scan_options, session_options, pump_options)
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use crate::mock::MockSink;

    #[tokio::test(start_paused = true)]
    async fn test_supervise_restarts_after_each_failure() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();

        let sink = Arc::new(MockSink::new());
        let calls = Arc::new(AtomicU32::new(0));

        let task = {
            let sink = Arc::clone(&sink);
            let calls = Arc::clone(&calls);
            tokio::spawn(async move {
                supervise(&*sink, &SupervisorOptions::default(), move || {
                    let calls = Arc::clone(&calls);
                    async move {
                        let n = calls.fetch_add(1, Ordering::SeqCst);
                        if n < 3 {
                            Err(Error::link_dropped("injected failure"))
                        } else {
                            futures::future::pending::<Result<()>>().await
                        }
                    }
                })
                .await
            })
        };

        tokio::time::sleep(Duration::from_secs(5)).await;

        // Three injected failures, three restarts, then the fourth cycle
        // streams forever.
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(sink.ready_calls(), 4);
        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_bootstrap_waits_for_uplink() {
        let sink = Arc::new(MockSink::new());
        sink.set_transient_ready_failures(2);
        let calls = Arc::new(AtomicU32::new(0));

        let task = {
            let sink = Arc::clone(&sink);
            let calls = Arc::clone(&calls);
            tokio::spawn(async move {
                supervise(&*sink, &SupervisorOptions::default(), move || {
                    let calls = Arc::clone(&calls);
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        futures::future::pending::<Result<()>>().await
                    }
                })
                .await
            })
        };

        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(sink.ready_calls(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_bootstrap_exhaustion_restarts_the_cycle() {
        let sink = Arc::new(MockSink::new());
        sink.set_fail_ready(true);
        let calls = Arc::new(AtomicU32::new(0));

        let options = SupervisorOptions::new()
            .bootstrap_attempts(5)
            .bootstrap_delay(Duration::from_millis(200));

        let task = {
            let sink = Arc::clone(&sink);
            let calls = Arc::clone(&calls);
            tokio::spawn(async move {
                supervise(&*sink, &options, move || {
                    let calls = Arc::clone(&calls);
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        futures::future::pending::<Result<()>>().await
                    }
                })
                .await
            })
        };

        tokio::time::sleep(Duration::from_secs(10)).await;

        // The cycle body never runs while the uplink is down, but probing
        // keeps restarting.
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(sink.ready_calls() >= 10);
        task.abort();
    }

    #[tokio::test]
    async fn test_ensure_uplink_succeeds_on_first_probe() {
        let sink = MockSink::new();
        ensure_uplink(&sink, &SupervisorOptions::default())
            .await
            .unwrap();
        assert_eq!(sink.ready_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ensure_uplink_reports_last_probe_error() {
        let sink = MockSink::new();
        sink.set_fail_ready(true);

        let options = SupervisorOptions::new()
            .bootstrap_attempts(3)
            .bootstrap_delay(Duration::from_millis(10));
        let err = ensure_uplink(&sink, &options).await.unwrap_err();

        assert!(matches!(
            err,
            Error::LinkUnavailable { attempts: 3, .. }
        ));
        assert!(err.to_string().contains("simulated outage"));
        assert_eq!(sink.ready_calls(), 3);
    }

    #[tokio::test]
    async fn test_ensure_uplink_probes_at_least_once_with_zero_budget() {
        let sink = MockSink::new();
        let options = SupervisorOptions::new().bootstrap_attempts(0);

        ensure_uplink(&sink, &options).await.unwrap();
        assert_eq!(sink.ready_calls(), 1);
    }

    #[tokio::test]
    async fn test_ensure_uplink_zero_budget_failure_reports_one_probe() {
        let sink = MockSink::new();
        sink.set_fail_ready(true);
        let options = SupervisorOptions::new().bootstrap_attempts(0);

        let err = ensure_uplink(&sink, &options).await.unwrap_err();

        assert!(matches!(err, Error::LinkUnavailable { attempts: 1, .. }));
        assert_eq!(sink.ready_calls(), 1);
    }

    #[test]
    fn test_stage_names() {
        assert_eq!(Stage::Bootstrap.as_str(), "bootstrap");
        assert_eq!(Stage::Locate.as_str(), "locate");
        assert_eq!(Stage::ConnectSubscribe.as_str(), "connect_subscribe");
        assert_eq!(Stage::Stream.as_str(), "stream");
        assert_eq!(Stage::Failed.to_string(), "failed");
    }

    #[test]
    fn test_supervisor_options_defaults() {
        let options = SupervisorOptions::default();
        assert_eq!(options.bootstrap_attempts, 50);
        assert_eq!(options.bootstrap_delay, Duration::from_millis(200));
    }

    #[test]
    fn test_supervisor_options_validation() {
        assert!(SupervisorOptions::default().validate().is_ok());
        assert!(
            SupervisorOptions::new()
                .bootstrap_attempts(0)
                .validate()
                .is_err()
        );
    }
}
