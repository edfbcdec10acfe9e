//! Session establishment: connect, resolve, subscribe, clean up on failure.
//!
//! A [`Session`] owns one link for its whole life. `establish` is the only
//! way to get one, and it guarantees that a failure never leaves the
//! connection half-open: whatever goes wrong, the link is closed before the
//! error surfaces. The session is never reused after a failure; the
//! supervisor rebuilds everything from scratch instead.

use std::time::Duration;

use futures::stream::BoxStream;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::link::BikeLink;

/// Options controlling [`Session::establish`].
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Deadline for the connection attempt.
    pub connect_timeout: Duration,
    /// Maximum subscribe attempts before the session is abandoned.
    pub setup_attempts: u32,
    /// Pause between subscribe attempts.
    pub setup_retry_delay: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            setup_attempts: 5,
            setup_retry_delay: Duration::from_secs(3),
        }
    }
}

impl SessionOptions {
    /// Create options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the connection deadline.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the number of subscribe attempts.
    #[must_use]
    pub fn setup_attempts(mut self, attempts: u32) -> Self {
        self.setup_attempts = attempts;
        self
    }

    /// Set the pause between subscribe attempts.
    #[must_use]
    pub fn setup_retry_delay(mut self, delay: Duration) -> Self {
        self.setup_retry_delay = delay;
        self
    }

    /// Validate option values.
    pub fn validate(&self) -> Result<()> {
        if self.setup_attempts == 0 {
            return Err(Error::invalid_config("setup attempts must be at least 1"));
        }
        if self.connect_timeout.is_zero() {
            return Err(Error::invalid_config("connect timeout must be non-zero"));
        }
        Ok(())
    }
}

/// A live, subscribed connection to one indoor bike.
#[derive(Debug)]
pub struct Session<L: BikeLink> {
    link: L,
}

impl<L: BikeLink> Session<L> {
    /// Connect and subscribe, closing the link if setup cannot complete.
    ///
    /// The connection gets one attempt under `connect_timeout`. Service and
    /// characteristic resolution plus the subscription then get
    /// `setup_attempts` tries, `setup_retry_delay` apart. On any failure the
    /// link is closed before the error is returned.
    #[tracing::instrument(level = "info", skip_all, fields(device = %link.label()))]
    pub async fn establish(link: L, options: &SessionOptions) -> Result<Self> {
        options.validate()?;

        info!("Connecting");
        if let Err(e) = Self::connect_with_timeout(&link, options).await {
            close_quietly(&link, "failed connect").await;
            return Err(e);
        }
        info!("Connected");

        let mut last_error = String::from("no subscribe attempts were made");
        for attempt in 1..=options.setup_attempts {
            match link.subscribe().await {
                Ok(()) => {
                    info!(attempt, "Subscribed to indoor bike data");
                    return Ok(Self { link });
                }
                Err(e) => {
                    warn!(
                        attempt,
                        max_attempts = options.setup_attempts,
                        error = %e,
                        "Subscribe attempt failed"
                    );
                    last_error = e.to_string();
                    if attempt < options.setup_attempts {
                        sleep(options.setup_retry_delay).await;
                    }
                }
            }
        }

        // Out of attempts. Close first so no half-open connection survives
        // the failure path.
        close_quietly(&link, "exhausted setup attempts").await;
        Err(Error::setup_failed(options.setup_attempts, last_error))
    }

    async fn connect_with_timeout(link: &L, options: &SessionOptions) -> Result<()> {
        timeout(options.connect_timeout, link.connect())
            .await
            .map_err(|_| Error::timeout("connect to device", options.connect_timeout))?
    }

    /// The underlying link.
    pub fn link(&self) -> &L {
        &self.link
    }

    /// Label for log lines and envelopes.
    pub fn device_label(&self) -> String {
        self.link.label()
    }

    /// Notification payload stream for the subscribed characteristic.
    pub async fn notifications(&self) -> Result<BoxStream<'static, Vec<u8>>> {
        self.link.notifications().await
    }

    /// Close the link. Teardown errors are logged, not returned; there is
    /// nothing useful a caller can do with them.
    pub async fn teardown(self) {
        if let Err(e) = self.link.close().await {
            warn!(device = %self.link.label(), error = %e, "Error while closing session");
        }
    }
}

async fn close_quietly<L: BikeLink>(link: &L, context: &str) {
    if let Err(e) = link.close().await {
        debug!(
            "Close after {} also failed for {}: {}",
            context,
            link.label(),
            e
        );
    }
}
