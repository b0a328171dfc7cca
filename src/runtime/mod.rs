//! Module runtime
//!
//! An optional layer on top of [`MqttClient`](crate::MqttClient) for firmware
//! that splits its MQTT logic into independent modules (sensor telemetry,
//! actuator commands, status reporting).
//!
//! - Modules declare topics in `register`, react to messages in
//!   `on_message` and publish from `on_tick`/`on_start`.
//! - [`MqttRuntime`] owns the client, keeps it connected and moves data
//!   between the modem and the modules.
//! - Other tasks can publish through a [`PublisherHandle`] without touching
//!   the client.
//!
//! ```ignore
//! static REQUESTS: PublishRequestChannel<'static, 4> = Channel::new();
//!
//! let client = MqttClient::new(transport, &RX, Delay, reset_pin, options);
//! let mut runtime: MqttRuntime<_, _, _, _> = MqttRuntime::new(client, PumpModule::new())
//!     .with_requests(REQUESTS.receiver());
//! spawner.spawn(sensor_task(PublisherHandle::new(REQUESTS.sender())));
//! runtime.run().await
//! ```

pub(crate) mod event_loop;
pub(crate) mod publisher;
pub(crate) mod traits;

pub use event_loop::{HEALTH_INTERVAL, LOOP_INTERVAL, MqttRuntime, RECONNECT_BACKOFF};
pub use publisher::{
    BufferedOutbox, OwnedPublishRequest, PublishRequest, PublishRequestChannel,
    PublishRequestReceiver, PublishRequestSender, PublisherHandle,
};
pub use traits::{ModulePair, MqttModule, NoopModule, PublishOutbox, TopicCollector};

pub use crate::demux::InboundMessage;
