//! Core BLE connectivity and telemetry pipeline for FTMS indoor bikes.
//!
//! This crate drives one bike end to end:
//!
//! - [`scan`] finds an advertising fitness machine and hands back an
//!   unconnected [`FtmsLink`].
//! - [`session`] connects and subscribes to Indoor Bike Data, closing the
//!   link on any setup failure.
//! - [`pump`] decodes each notification with [`velolink_types::decode`] and
//!   forwards envelopes to an [`UplinkSink`].
//! - [`supervisor`] wraps all of it in a crash-and-restart loop, gated on a
//!   readiness probe of the collector.
//!
//! # Quick Start
//!
//! ```no_run
//! use velolink_core::scan::{self, DeviceFilter, ScanOptions};
//! use velolink_core::session::{Session, SessionOptions};
//!
//! # async fn example() -> velolink_core::Result<()> {
//! let adapter = scan::get_adapter().await?;
//! let filter = DeviceFilter::new().name_contains("BIKE");
//! let link = scan::locate(&adapter, &filter, &ScanOptions::default()).await?;
//!
//! let session = Session::establish(link, &SessionOptions::default()).await?;
//! println!("streaming from {}", session.device_label());
//! # Ok(())
//! # }
//! ```
//!
//! The usual entry point is [`supervisor::run`], which loops the whole
//! locate/connect/stream cycle forever and restarts it after any failure.
//!
//! # Features
//!
//! - `http-sink`: enables the reqwest-backed `HttpSink` collector client.
//!
//! # Testing
//!
//! [`mock::MockLink`] and [`mock::MockSink`] are in-memory stand-ins for
//! the two I/O seams; everything between them runs unmodified in tests.

pub mod error;
pub mod link;
pub mod mock;
pub mod pump;
pub mod scan;
pub mod session;
pub mod sink;
pub mod supervisor;

// Re-export the shared types so downstream crates only depend on core.
pub use velolink_types::uuid;
pub use velolink_types::{BikeReading, ReadingEnvelope, decode};

pub use error::{Error, NotFoundReason, Result};
pub use link::{BikeLink, FtmsLink};
pub use mock::{MockLink, MockLinkBuilder, MockSink};
pub use pump::PumpOptions;
pub use scan::{DeviceFilter, ScanOptions, get_adapter, locate};
pub use session::{Session, SessionOptions};
#[cfg(feature = "http-sink")]
pub use sink::HttpSink;
pub use sink::{SinkError, UplinkSink};
pub use supervisor::{Stage, SupervisorOptions, ensure_uplink, supervise};
