//! # MQTT over ESP-AT for Embedded Systems
//!
//! `myrtio-at-mqtt` is a `no_std`, `no_alloc` MQTT client for microcontrollers
//! that reach the network through an ESP8266/ESP32 modem running the ESP-AT
//! firmware. The modem speaks MQTT itself; this crate drives it over a UART
//! with AT commands and keeps the session alive.
//!
//! ## Core Features
//!
//! - **Interrupt-safe receive path:** the UART interrupt pushes bytes into a
//!   fixed [`RxBuffer`]; the foreground never blocks it.
//! - **Supervised bring-up:** hardware reset, modem probe, WiFi join and
//!   broker handshake, each with bounded retries. Any failure lands back in
//!   a single `Idle` state from which `connect()` starts over.
//! - **Inbound demultiplexing:** `+MQTTSUBRECV` notifications are pulled out
//!   of the byte stream without disturbing command responses.
//! - **Subscription replay:** topics are re-subscribed after every reconnect.
//! - **Module runtime:** optional [`runtime`] layer for firmware built from
//!   independent MQTT modules.
//!
//! ## Usage
//!
//! ```ignore
//! static RX: RxBuffer = RxBuffer::new();
//!
//! let options = MqttOptions::new(
//!     StationConfig::new("FarmMain", "secret"),
//!     BrokerConfig::new("192.168.0.24", "rp2040_client")
//!         .with_last_will(LastWill::new("farm/rp2040/status", "offline"))
//!         .with_online_message("online"),
//! );
//! let mut client = MqttClient::new(UartTransport::new(uart_tx), &RX, Delay, reset_pin, options);
//!
//! client.connect().await?;
//! client.subscribe("farm/pump/set", QoS::AtLeastOnce).await?;
//! client.publish("farm/pump/state", b"off", QoS::AtMostOnce, true).await?;
//!
//! loop {
//!     while let Some(msg) = client.try_extract() {
//!         // handle msg.topic(), msg.payload()
//!     }
//!     if client.poll_health().await.is_err() {
//!         let _ = client.connect().await;
//!     }
//!     Timer::after_millis(50).await;
//! }
//! ```
//!
//! ## Logging
//!
//! Enable one of the `defmt`, `log` or `esp32-log` features. Credentials are
//! never logged.

#![cfg_attr(not(test), no_std)]

#[macro_use]
mod fmt;

pub mod channel;
pub mod client;
pub mod command;
pub mod config;
pub mod demux;
pub mod error;
pub mod ring;
pub mod runtime;
pub mod subscription;
pub mod transport;
pub mod util;

pub use client::{ConnectionState, MqttClient};
pub use command::QoS;
pub use config::{BrokerConfig, LastWill, MqttOptions, ResetTiming, RetryPolicy, StationConfig, Timeouts};
pub use demux::InboundMessage;
pub use error::{ArgumentError, ConnectStage, MqttError};
pub use ring::RxBuffer;
pub use transport::{ModemTransport, TransportError, UartError, UartTransport, pump_rx};
