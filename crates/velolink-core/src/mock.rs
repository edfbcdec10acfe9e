//! In-memory test doubles for the link and sink seams.
//!
//! [`MockLink`] stands in for a real peripheral: notifications are scripted
//! at build time and failures are injected through atomic flags. Clones
//! share state, so a clone kept outside a [`crate::session::Session`] can
//! observe call counts after the session has consumed the original.
//! [`MockSink`] records every envelope it accepts.
//!
//! These types also back doc examples and the test suites of the session,
//! pump, and supervisor modules.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::{StreamExt, stream};
use velolink_types::ReadingEnvelope;

use crate::error::{Error, Result};
use crate::link::BikeLink;
use crate::sink::{SinkError, UplinkSink};

#[derive(Debug, Default)]
struct LinkState {
    connected: AtomicBool,
    subscribed: AtomicBool,
    fail_connect: AtomicBool,
    hang_connect: AtomicBool,
    fail_subscribe: AtomicBool,
    fail_close: AtomicBool,
    transient_subscribe_failures: AtomicU32,
    connect_calls: AtomicU32,
    subscribe_calls: AtomicU32,
    close_calls: AtomicU32,
    notifications: Mutex<Vec<Vec<u8>>>,
}

/// Scriptable [`BikeLink`] with failure injection.
#[derive(Debug, Clone)]
pub struct MockLink {
    id: String,
    name: Option<String>,
    state: Arc<LinkState>,
}

impl MockLink {
    /// A link with a random `MOCK-XXXXXX` identifier and no scripted
    /// notifications.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Start building a customized mock link.
    pub fn builder() -> MockLinkBuilder {
        MockLinkBuilder::default()
    }

    /// Make the next connect attempt fail.
    pub fn set_fail_connect(&self, fail: bool) {
        self.state.fail_connect.store(fail, Ordering::SeqCst);
    }

    /// Make connect attempts hang until the caller's deadline fires.
    pub fn set_hang_connect(&self, hang: bool) {
        self.state.hang_connect.store(hang, Ordering::SeqCst);
    }

    /// Make every subscribe attempt fail.
    pub fn set_fail_subscribe(&self, fail: bool) {
        self.state.fail_subscribe.store(fail, Ordering::SeqCst);
    }

    /// Make close attempts fail.
    pub fn set_fail_close(&self, fail: bool) {
        self.state.fail_close.store(fail, Ordering::SeqCst);
    }

    /// Fail the next `count` subscribe attempts, then succeed.
    pub fn set_transient_subscribe_failures(&self, count: u32) {
        self.state
            .transient_subscribe_failures
            .store(count, Ordering::SeqCst);
    }

    /// Number of connect calls so far.
    pub fn connect_calls(&self) -> u32 {
        self.state.connect_calls.load(Ordering::SeqCst)
    }

    /// Number of subscribe calls so far.
    pub fn subscribe_calls(&self) -> u32 {
        self.state.subscribe_calls.load(Ordering::SeqCst)
    }

    /// Number of close calls so far.
    pub fn close_calls(&self) -> u32 {
        self.state.close_calls.load(Ordering::SeqCst)
    }

    /// Whether the link believes it is connected.
    pub fn is_connected(&self) -> bool {
        self.state.connected.load(Ordering::SeqCst)
    }

    /// Whether the subscription was made and not yet closed.
    pub fn is_subscribed(&self) -> bool {
        self.state.subscribed.load(Ordering::SeqCst)
    }
}

impl Default for MockLink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BikeLink for MockLink {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn name(&self) -> Option<String> {
        self.name.clone()
    }

    async fn connect(&self) -> Result<()> {
        self.state.connect_calls.fetch_add(1, Ordering::SeqCst);
        if self.state.hang_connect.load(Ordering::SeqCst) {
            futures::future::pending::<()>().await;
        }
        if self.state.fail_connect.load(Ordering::SeqCst) {
            return Err(Error::Bluetooth(btleplug::Error::NotConnected));
        }
        self.state.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn subscribe(&self) -> Result<()> {
        self.state.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        if !self.state.connected.load(Ordering::SeqCst) {
            return Err(Error::Bluetooth(btleplug::Error::NotConnected));
        }

        let remaining = self
            .state
            .transient_subscribe_failures
            .load(Ordering::SeqCst);
        if remaining > 0 {
            self.state
                .transient_subscribe_failures
                .store(remaining - 1, Ordering::SeqCst);
            return Err(Error::service_not_found(0));
        }

        if self.state.fail_subscribe.load(Ordering::SeqCst) {
            return Err(Error::service_not_found(0));
        }

        self.state.subscribed.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn notifications(&self) -> Result<BoxStream<'static, Vec<u8>>> {
        let payloads = std::mem::take(
            &mut *self
                .state
                .notifications
                .lock()
                .expect("mock notification lock poisoned"),
        );
        Ok(stream::iter(payloads).boxed())
    }

    async fn close(&self) -> Result<()> {
        self.state.close_calls.fetch_add(1, Ordering::SeqCst);
        if self.state.fail_close.load(Ordering::SeqCst) {
            return Err(Error::Bluetooth(btleplug::Error::NotConnected));
        }
        self.state.connected.store(false, Ordering::SeqCst);
        self.state.subscribed.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// Builder for [`MockLink`].
#[derive(Debug, Default)]
pub struct MockLinkBuilder {
    name: Option<String>,
    notifications: Vec<Vec<u8>>,
}

impl MockLinkBuilder {
    /// Set the advertised name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Append one scripted notification payload.
    #[must_use]
    pub fn notification(mut self, payload: Vec<u8>) -> Self {
        self.notifications.push(payload);
        self
    }

    /// Replace the scripted notification payloads.
    #[must_use]
    pub fn notifications(mut self, payloads: Vec<Vec<u8>>) -> Self {
        self.notifications = payloads;
        self
    }

    /// Build the link.
    pub fn build(self) -> MockLink {
        MockLink {
            id: format!("MOCK-{:06X}", rand::random::<u32>() % 0xFF_FFFF),
            name: self.name,
            state: Arc::new(LinkState {
                notifications: Mutex::new(self.notifications),
                ..LinkState::default()
            }),
        }
    }
}

#[derive(Debug, Default)]
struct SinkState {
    fail_ready: AtomicBool,
    fail_submit: AtomicBool,
    transient_ready_failures: AtomicU32,
    transient_submit_failures: AtomicU32,
    ready_calls: AtomicU32,
    submit_calls: AtomicU32,
    submitted: Mutex<Vec<ReadingEnvelope>>,
}

/// [`UplinkSink`] that records accepted envelopes in memory.
#[derive(Debug, Default)]
pub struct MockSink {
    state: SinkState,
}

impl MockSink {
    /// A sink that accepts everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every readiness probe fail.
    pub fn set_fail_ready(&self, fail: bool) {
        self.state.fail_ready.store(fail, Ordering::SeqCst);
    }

    /// Fail the next `count` readiness probes, then succeed.
    pub fn set_transient_ready_failures(&self, count: u32) {
        self.state
            .transient_ready_failures
            .store(count, Ordering::SeqCst);
    }

    /// Make every submit fail.
    pub fn set_fail_submit(&self, fail: bool) {
        self.state.fail_submit.store(fail, Ordering::SeqCst);
    }

    /// Fail the next `count` submits, then succeed.
    pub fn set_transient_submit_failures(&self, count: u32) {
        self.state
            .transient_submit_failures
            .store(count, Ordering::SeqCst);
    }

    /// Number of readiness probes so far.
    pub fn ready_calls(&self) -> u32 {
        self.state.ready_calls.load(Ordering::SeqCst)
    }

    /// Number of submit calls so far, including failed ones.
    pub fn submit_calls(&self) -> u32 {
        self.state.submit_calls.load(Ordering::SeqCst)
    }

    /// Envelopes accepted so far, in submission order.
    pub fn submitted(&self) -> Vec<ReadingEnvelope> {
        self.state
            .submitted
            .lock()
            .expect("mock sink lock poisoned")
            .clone()
    }
}

#[async_trait]
impl UplinkSink for MockSink {
    async fn ready(&self) -> std::result::Result<(), SinkError> {
        self.state.ready_calls.fetch_add(1, Ordering::SeqCst);

        let remaining = self.state.transient_ready_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.state
                .transient_ready_failures
                .store(remaining - 1, Ordering::SeqCst);
            return Err(SinkError::unavailable("simulated outage"));
        }
        if self.state.fail_ready.load(Ordering::SeqCst) {
            return Err(SinkError::unavailable("simulated outage"));
        }
        Ok(())
    }

    async fn submit(&self, envelope: &ReadingEnvelope) -> std::result::Result<(), SinkError> {
        self.state.submit_calls.fetch_add(1, Ordering::SeqCst);

        let remaining = self.state.transient_submit_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.state
                .transient_submit_failures
                .store(remaining - 1, Ordering::SeqCst);
            return Err(SinkError::unavailable("simulated outage"));
        }
        if self.state.fail_submit.load(Ordering::SeqCst) {
            return Err(SinkError::unavailable("simulated outage"));
        }

        self.state
            .submitted
            .lock()
            .expect("mock sink lock poisoned")
            .push(envelope.clone());
        Ok(())
    }
}
