//! # Error Types
//!
//! This module defines the error types used throughout the client, from
//! transport write failures and response timeouts to arguments rejected
//! before anything reaches the modem.

use crate::transport;

/// The primary error enum for the client.
///
/// It is generic over the transport error type `T`, allowing it to wrap
/// specific errors from the underlying serial writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MqttError<T> {
    /// An error occurred in the underlying transport layer.
    Transport(T),
    /// The expected response marker did not show up before the deadline.
    Timeout,
    /// The operation requires an established broker connection.
    NotConnected,
    /// A publish, subscribe or health check failed while connected.
    ///
    /// The client has already dropped back to `Idle`; call `connect()` again.
    ConnectionLost,
    /// An argument was rejected before any byte was transmitted.
    InvalidArgument(ArgumentError),
    /// A bring-up stage ran out of attempts. The client is back to `Idle`.
    StageExhausted(ConnectStage),
    /// Driving the modem reset line failed.
    ResetPin,
    /// A modem response could not be parsed.
    MalformedFrame,
}

/// Allows `?` to lift transport errors into `MqttError`.
impl<T: transport::TransportError> From<T> for MqttError<T> {
    fn from(err: T) -> Self {
        MqttError::Transport(err)
    }
}

impl<T> MqttError<T> {
    /// Returns `true` if the error means the caller must run `connect()` again.
    pub fn requires_reconnect(&self) -> bool {
        matches!(
            self,
            MqttError::ConnectionLost | MqttError::NotConnected | MqttError::StageExhausted(_)
        )
    }
}

/// Reasons an argument is refused before a command is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ArgumentError {
    /// A required string was empty.
    Empty,
    /// A string exceeded its length limit.
    TooLong,
    /// A string contained a quote, backslash, comma or control character.
    DisallowedCharacter,
    /// A publish topic contained `+` or `#`.
    WildcardInTopic,
    /// The payload exceeded the largest raw publish the client will send.
    PayloadTooLarge,
    /// The encoded command does not fit the command buffer.
    CommandTooLong,
    /// An empty marker was passed to `await_marker`.
    EmptyMarker,
    /// No room left in the subscription table.
    SubscriptionTableFull,
}

/// Bring-up stage that ran out of attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectStage {
    /// `AT` never answered `OK`.
    ModemProbe,
    /// `AT+CWMODE=1` was refused.
    StationMode,
    /// `AT+CWJAP` never reported `WIFI GOT IP`.
    StationJoin,
    /// The broker user, will or connect command was refused or timed out.
    Broker,
}
