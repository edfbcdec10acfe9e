//! Connection handle for a located fitness machine.
//!
//! [`BikeLink`] is the seam between session logic and the BLE stack: the
//! real implementation is [`FtmsLink`] over a btleplug peripheral, and tests
//! substitute [`crate::mock::MockLink`].

use async_trait::async_trait;
use btleplug::api::{Characteristic, Peripheral as _};
use btleplug::platform::Peripheral;
use futures::StreamExt;
use futures::stream::BoxStream;
use tracing::debug;
use velolink_types::uuids::{FITNESS_MACHINE_SERVICE, INDOOR_BIKE_DATA};

use crate::error::{Error, Result};

/// One bike's transport: connect, subscribe, stream, close.
///
/// Implementations are handles to a single peripheral. They are created by
/// the locator and consumed by [`crate::session::Session::establish`]; no
/// method is expected to be called after `close`.
#[async_trait]
pub trait BikeLink: Send + Sync {
    /// Stable identifier for logs and envelopes.
    fn id(&self) -> String;

    /// Advertised name, when one was seen.
    fn name(&self) -> Option<String>;

    /// Open the underlying connection.
    async fn connect(&self) -> Result<()>;

    /// Resolve the fitness machine service and subscribe to indoor bike
    /// data notifications. Must be preceded by a successful [`connect`].
    ///
    /// [`connect`]: BikeLink::connect
    async fn subscribe(&self) -> Result<()>;

    /// Raw notification payloads in arrival order. The stream ends when the
    /// link dies.
    async fn notifications(&self) -> Result<BoxStream<'static, Vec<u8>>>;

    /// Close the connection, releasing the subscription with it.
    async fn close(&self) -> Result<()>;

    /// Advertised name when present, identifier otherwise.
    fn label(&self) -> String {
        self.name().unwrap_or_else(|| self.id())
    }
}

/// [`BikeLink`] backed by a btleplug peripheral.
///
/// Identity is captured from the advertisement at construction so log lines
/// never need to touch the radio.
pub struct FtmsLink {
    peripheral: Peripheral,
    id: String,
    name: Option<String>,
}

impl std::fmt::Debug for FtmsLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FtmsLink")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}

impl FtmsLink {
    /// Wrap a peripheral discovered by [`crate::scan::locate`].
    pub fn new(peripheral: Peripheral, name: Option<String>) -> Self {
        let id = peripheral.id().to_string();
        Self {
            peripheral,
            id,
            name,
        }
    }

    /// Find the indoor bike data characteristic among discovered services.
    fn indoor_bike_data(&self) -> Result<Characteristic> {
        let services = self.peripheral.services();
        let service = services
            .iter()
            .find(|service| service.uuid == FITNESS_MACHINE_SERVICE)
            .ok_or_else(|| Error::service_not_found(services.len()))?;

        service
            .characteristics
            .iter()
            .find(|characteristic| characteristic.uuid == INDOOR_BIKE_DATA)
            .cloned()
            .ok_or_else(Error::characteristic_not_found)
    }
}

#[async_trait]
impl BikeLink for FtmsLink {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn name(&self) -> Option<String> {
        self.name.clone()
    }

    async fn connect(&self) -> Result<()> {
        self.peripheral.connect().await?;
        Ok(())
    }

    async fn subscribe(&self) -> Result<()> {
        self.peripheral.discover_services().await?;
        let characteristic = self.indoor_bike_data()?;
        self.peripheral.subscribe(&characteristic).await?;
        debug!("Subscribed to indoor bike data on {}", self.label());
        Ok(())
    }

    async fn notifications(&self) -> Result<BoxStream<'static, Vec<u8>>> {
        let stream = self.peripheral.notifications().await?;
        Ok(stream
            .filter_map(|notification| async move {
                (notification.uuid == INDOOR_BIKE_DATA).then_some(notification.value)
            })
            .boxed())
    }

    async fn close(&self) -> Result<()> {
        self.peripheral.disconnect().await?;
        Ok(())
    }
}
