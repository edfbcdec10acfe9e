//! Decode-and-forward loop from the notification stream to the uplink sink.
//!
//! The pump is deliberately dumb: one notification in, at most one envelope
//! out, strictly in arrival order. Envelopes that decode to nothing are
//! skipped. Uploads are fire-and-forget; a failed submit is logged and the
//! reading dropped, because one lost upload is not a link failure. The only
//! thing that ends the loop is the notification stream dying.

use futures::StreamExt;
use time::OffsetDateTime;
use tracing::{debug, error, info, trace, warn};
use velolink_types::{ReadingEnvelope, decode};

use crate::error::{Error, Result};
use crate::link::BikeLink;
use crate::session::Session;
use crate::sink::UplinkSink;

/// Options controlling [`run`].
#[derive(Debug, Clone)]
pub struct PumpOptions {
    /// Source tag stamped on every envelope.
    pub source: String,
}

impl Default for PumpOptions {
    fn default() -> Self {
        Self {
            source: "velolink-agent".to_string(),
        }
    }
}

impl PumpOptions {
    /// Create options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the source tag.
    #[must_use]
    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }
}

/// Seconds since the Unix epoch, with sub-second precision.
fn epoch_seconds() -> f64 {
    let now = OffsetDateTime::now_utc();
    now.unix_timestamp() as f64 + f64::from(now.nanosecond()) / 1e9
}

/// Forward decoded readings from `session` into `sink` until the link dies.
///
/// Returns only on error: a closed notification stream surfaces as
/// [`Error::LinkDropped`]. Sink failures never propagate out of the loop.
#[tracing::instrument(level = "info", skip_all, fields(device = %session.device_label()))]
pub async fn run<L, S>(session: &Session<L>, sink: &S, options: &PumpOptions) -> Result<()>
where
    L: BikeLink,
    S: UplinkSink + ?Sized,
{
    let device = session.device_label();
    let mut stream = session.notifications().await?;
    let mut consecutive_failures = 0u32;

    info!("Streaming indoor bike data");
    loop {
        let Some(payload) = stream.next().await else {
            return Err(Error::link_dropped(format!(
                "notification stream from {device} ended"
            )));
        };

        let reading = decode(&payload);
        if reading.is_empty() {
            trace!(
                bytes = payload.len(),
                "Skipping notification with no decodable fields"
            );
            continue;
        }

        let envelope = ReadingEnvelope::new(epoch_seconds(), &options.source, &device, reading);
        match sink.submit(&envelope).await {
            Ok(()) => {
                consecutive_failures = 0;
                debug!(
                    fields = envelope.reading.field_count(),
                    "Forwarded reading"
                );
            }
            Err(e) => {
                consecutive_failures += 1;
                if consecutive_failures <= 3 {
                    warn!(
                        error = %e,
                        "Failed to submit reading (failure {})",
                        consecutive_failures
                    );
                } else if consecutive_failures == 4 {
                    error!(
                        "Failed to submit {} readings in a row, will keep trying silently",
                        consecutive_failures
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockLink, MockSink};
    use crate::session::SessionOptions;

    // Flag word 0x0044: instantaneous cadence and power, plus the implied
    // instantaneous speed. 25.0 km/h, 90.0 rpm, 250 W.
    const RIDING_FRAME: [u8; 8] = [0x44, 0x00, 0xC4, 0x09, 0xB4, 0x00, 0xFA, 0x00];

    // Flag word 0x0001: "more data" set, so not even speed is present.
    const EMPTY_FRAME: [u8; 2] = [0x01, 0x00];

    // Flag word 0x0061: no speed, resistance level 5, 250 W.
    const RESISTANCE_POWER_FRAME: [u8; 6] = [0x61, 0x00, 0x05, 0x00, 0xFA, 0x00];

    async fn establish_with(frames: &[&[u8]]) -> Session<MockLink> {
        let mut builder = MockLink::builder().name("BIKE-0775");
        for frame in frames {
            builder = builder.notification(frame.to_vec());
        }
        Session::establish(builder.build(), &SessionOptions::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_pump_forwards_readings_in_order() {
        let session = establish_with(&[&RIDING_FRAME, &RESISTANCE_POWER_FRAME]).await;
        let sink = MockSink::new();

        let err = run(&session, &sink, &PumpOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::LinkDropped(_)));

        let submitted = sink.submitted();
        assert_eq!(submitted.len(), 2);
        assert_eq!(submitted[0].reading.instant_speed, Some(25.0));
        assert_eq!(submitted[0].reading.instant_cadence, Some(90.0));
        assert_eq!(submitted[0].reading.instant_power, Some(250));
        assert_eq!(submitted[1].reading.instant_speed, None);
        assert_eq!(submitted[1].reading.resistance_level, Some(5));
        assert_eq!(submitted[1].reading.instant_power, Some(250));
        assert!(submitted[0].ts <= submitted[1].ts);
    }

    #[tokio::test]
    async fn test_pump_stamps_envelope_identity() {
        let session = establish_with(&[&RIDING_FRAME]).await;
        let sink = MockSink::new();
        let options = PumpOptions::new().source("bike-agent-7");

        run(&session, &sink, &options).await.unwrap_err();

        let submitted = sink.submitted();
        assert_eq!(submitted[0].src, "bike-agent-7");
        assert_eq!(submitted[0].device, "BIKE-0775");
        assert!(submitted[0].ts > 1_700_000_000.0);
    }

    #[tokio::test]
    async fn test_pump_skips_empty_readings() {
        let session = establish_with(&[&EMPTY_FRAME, &RIDING_FRAME, &EMPTY_FRAME]).await;
        let sink = MockSink::new();

        run(&session, &sink, &PumpOptions::default())
            .await
            .unwrap_err();

        assert_eq!(sink.submit_calls(), 1);
        assert_eq!(sink.submitted().len(), 1);
    }

    #[tokio::test]
    async fn test_pump_survives_sink_failures() {
        let session =
            establish_with(&[&RIDING_FRAME, &RESISTANCE_POWER_FRAME, &RIDING_FRAME]).await;
        let sink = MockSink::new();
        sink.set_transient_submit_failures(2);

        let err = run(&session, &sink, &PumpOptions::default())
            .await
            .unwrap_err();

        // All three frames were attempted; only the last landed.
        assert!(matches!(err, Error::LinkDropped(_)));
        assert_eq!(sink.submit_calls(), 3);
        let submitted = sink.submitted();
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0].reading.instant_speed, Some(25.0));
    }

    #[tokio::test]
    async fn test_pump_reports_dead_stream_as_link_dropped() {
        let session = establish_with(&[]).await;
        let sink = MockSink::new();

        let err = run(&session, &sink, &PumpOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::LinkDropped(_)));
        assert!(err.to_string().contains("BIKE-0775"));
        assert_eq!(sink.submit_calls(), 0);
    }

    #[test]
    fn test_epoch_seconds_is_recent_and_sub_second() {
        let a = epoch_seconds();
        let b = epoch_seconds();
        // 2023-11-14 in epoch seconds; anything earlier means a broken clock.
        assert!(a > 1_700_000_000.0);
        assert!(b >= a);
    }

    #[test]
    fn test_pump_options_defaults() {
        let options = PumpOptions::default();
        assert_eq!(options.source, "velolink-agent");
        let options = options.source("other");
        assert_eq!(options.source, "other");
    }
}
