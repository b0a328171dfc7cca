//! # Connection Supervisor
//!
//! [`MqttClient`] owns the modem: it sequences bring-up from a cold reset to
//! a broker session, exposes publish/subscribe while connected, and falls
//! back to `Idle` the moment anything fails.
//!
//! ```text
//! Idle --reset--> ModemProbing --AT/OK--> ModemReady --CWMODE--> StationConfigured
//!   --CWJAP--> StationAssociated --user/will cfg--> BrokerConfiguring
//!   --MQTTCONNECTED--> BrokerConnected
//! ```
//!
//! Every stage has a bounded number of attempts (see
//! [`RetryPolicy`](crate::config::RetryPolicy)). Running out of attempts
//! anywhere leaves the client in `Idle`. Recovery always starts over from a
//! hardware reset: AT modems wedge themselves after communication errors
//! often enough that a cold start is the only dependable fix.

use embassy_time::Duration;
use embedded_hal::digital::OutputPin;
use embedded_hal_async::delay::DelayNs;

use crate::channel::CommandChannel;
use crate::command::{Command, QoS, validate_topic};
use crate::config::{MqttOptions, ResetTiming};
use crate::demux::{self, InboundMessage};
use crate::error::{ArgumentError, ConnectStage, MqttError};
use crate::ring::{DEFAULT_RX_CAPACITY, RxBuffer};
use crate::subscription::SubscriptionTable;
use crate::transport::ModemTransport;
use crate::util;

const OK: &str = "OK";
const GOT_IP: &str = "WIFI GOT IP";
const BROKER_CONNECTED: &str = "MQTTCONNECTED";
const PUBLISH_PROMPT: &str = ">";
const MQTT_STATUS_PREFIX: &str = "+MQTTCONN:";
const STATION_STATUS_PREFIX: &str = "STATUS:";

/// `+MQTTCONN` state values at or above this mean the session is up.
const MQTT_STATE_CONNECTED: usize = 4;

/// Where the client is in the bring-up sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectionState {
    Idle,
    ModemProbing,
    ModemReady,
    StationConfigured,
    StationAssociated,
    BrokerConfiguring,
    BrokerConnected,
}

/// MQTT client driving an ESP-AT modem.
///
/// - `T`: transmit side of the serial link
/// - `P`: modem reset line (active low)
/// - `D`: delay used for polling and back-offs
/// - `N`: receive buffer capacity
/// - `MAX_SUBS`: subscriptions remembered for replay after a reset
pub struct MqttClient<
    'a,
    'b,
    T,
    P,
    D,
    const N: usize = DEFAULT_RX_CAPACITY,
    const MAX_SUBS: usize = 8,
> {
    channel: CommandChannel<'b, T, D, N>,
    reset_pin: P,
    options: MqttOptions<'a>,
    state: ConnectionState,
    subscriptions: SubscriptionTable<MAX_SUBS>,
}

impl<'a, 'b, T, P, D, const N: usize, const MAX_SUBS: usize> MqttClient<'a, 'b, T, P, D, N, MAX_SUBS>
where
    T: ModemTransport,
    P: OutputPin,
    D: DelayNs,
{
    /// Creates an idle client. Nothing is sent until [`connect`](Self::connect).
    ///
    /// `rx` must be the buffer the UART receive interrupt pushes into.
    pub fn new(
        transport: T,
        rx: &'b RxBuffer<N>,
        delay: D,
        reset_pin: P,
        options: MqttOptions<'a>,
    ) -> Self {
        Self {
            channel: CommandChannel::new(transport, rx, delay),
            reset_pin,
            options,
            state: ConnectionState::Idle,
            subscriptions: SubscriptionTable::new(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// `true` while a broker session is believed to be up.
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::BrokerConnected
    }

    pub fn options(&self) -> &MqttOptions<'a> {
        &self.options
    }

    pub fn subscriptions(&self) -> &SubscriptionTable<MAX_SUBS> {
        &self.subscriptions
    }

    /// Forgets every subscription; the next `connect()` will not replay them.
    pub fn clear_subscriptions(&mut self) {
        self.subscriptions.clear();
    }

    /// Time the client has spent sleeping, a proxy for time since creation
    /// on a single foreground context.
    pub fn elapsed(&self) -> Duration {
        self.channel.elapsed()
    }

    /// Sleeps on the client's delay, counted in [`elapsed`](Self::elapsed).
    pub async fn pause(&mut self, duration: Duration) {
        self.channel.pause(duration).await;
    }

    /// Brings the modem from whatever state it is in to a broker session.
    ///
    /// Starts with a hardware reset, then probes the modem, joins the access
    /// point and performs the broker handshake, retrying each stage within
    /// its bound. Subscriptions recorded earlier are replayed and the online
    /// message, if configured, is published.
    ///
    /// Returns immediately if already connected. On failure the client is
    /// `Idle` and the caller should try again later.
    pub async fn connect(&mut self) -> Result<(), MqttError<T::Error>> {
        if self.is_connected() {
            return Ok(());
        }
        self.enter(ConnectionState::Idle);
        if let Err(e) = self.check_options() {
            error!("options rejected: {:?}", e);
            return Err(MqttError::InvalidArgument(e));
        }
        match self.bring_up().await {
            Ok(()) => {
                info!("broker session established");
                Ok(())
            }
            Err(e) => {
                warn!("connect failed in {:?}", self.state);
                self.enter(ConnectionState::Idle);
                Err(e)
            }
        }
    }

    /// Encodes every command built from the options, so a bad SSID or
    /// broker setting is refused before the modem is touched.
    fn check_options(&self) -> Result<(), ArgumentError> {
        let MqttOptions {
            station, broker, ..
        } = self.options;
        Command::JoinAccessPoint {
            ssid: station.ssid,
            password: station.password,
        }
        .encode()?;
        Command::MqttUserConfig {
            client_id: broker.client_id,
            username: broker.username,
            password: broker.password,
        }
        .encode()?;
        Command::MqttConnConfig {
            keepalive_secs: broker.keepalive_secs,
            will: broker.last_will,
        }
        .encode()?;
        Command::MqttConnect {
            host: broker.host,
            port: broker.port,
        }
        .encode()?;
        if let (Some(will), Some(message)) = (broker.last_will, broker.online_message) {
            Command::MqttPublishRaw {
                topic: will.topic,
                len: message.len(),
                qos: will.qos,
                retain: true,
            }
            .encode()?;
        }
        Ok(())
    }

    async fn bring_up(&mut self) -> Result<(), MqttError<T::Error>> {
        self.hardware_reset().await?;
        self.probe_modem().await?;
        self.configure_station().await?;
        self.join_station().await?;
        self.connect_broker().await?;
        self.restore_subscriptions().await?;
        self.announce_online().await
    }

    /// Pulses the reset line and waits for the modem to boot.
    ///
    /// Whatever the modem printed while booting is discarded.
    pub async fn hardware_reset(&mut self) -> Result<(), MqttError<T::Error>> {
        let ResetTiming { pulse, boot_settle } = self.options.reset;
        let pulse = pulse.max(ResetTiming::MIN_PULSE);
        info!("resetting modem");
        self.reset_pin.set_low().map_err(|_| MqttError::ResetPin)?;
        self.channel.pause(pulse).await;
        self.reset_pin.set_high().map_err(|_| MqttError::ResetPin)?;
        self.channel.pause(boot_settle).await;
        self.channel.rx().clear();
        self.enter(ConnectionState::ModemProbing);
        Ok(())
    }

    async fn probe_modem(&mut self) -> Result<(), MqttError<T::Error>> {
        let retry = self.options.retry;
        let timeout = self.options.timeouts.command;
        let attempts = retry.probe_attempts.max(1);
        let mut answered = false;
        for attempt in 1..=attempts {
            match self.channel.command(&Command::Probe, OK, timeout).await {
                Ok(()) => {
                    answered = true;
                    break;
                }
                Err(MqttError::Timeout) => {
                    warn!("modem probe {}/{} timed out", attempt, attempts);
                    if attempt < attempts {
                        self.channel.pause(retry.probe_backoff).await;
                    }
                }
                Err(e) => return Err(e),
            }
        }
        if !answered {
            error!("modem does not answer");
            return Err(MqttError::StageExhausted(ConnectStage::ModemProbe));
        }

        // Echo only makes responses longer; failing to turn it off is harmless.
        match self.channel.command(&Command::EchoOff, OK, timeout).await {
            Ok(()) | Err(MqttError::Timeout) => {}
            Err(e) => return Err(e),
        }
        self.enter(ConnectionState::ModemReady);
        Ok(())
    }

    async fn configure_station(&mut self) -> Result<(), MqttError<T::Error>> {
        let timeout = self.options.timeouts.command;
        match self.channel.command(&Command::StationMode, OK, timeout).await {
            Ok(()) => {
                self.enter(ConnectionState::StationConfigured);
                Ok(())
            }
            Err(MqttError::Timeout) => {
                warn!("station mode refused");
                Err(MqttError::StageExhausted(ConnectStage::StationMode))
            }
            Err(e) => Err(e),
        }
    }

    async fn join_station(&mut self) -> Result<(), MqttError<T::Error>> {
        let retry = self.options.retry;
        let timeouts = self.options.timeouts;
        let station = self.options.station;
        let join = Command::JoinAccessPoint {
            ssid: station.ssid,
            password: station.password,
        };
        let attempts = retry.join_attempts.max(1);
        for attempt in 1..=attempts {
            info!("joining {} ({}/{})", station.ssid, attempt, attempts);
            match self.channel.command(&join, GOT_IP, timeouts.join).await {
                Ok(()) => {
                    self.enter(ConnectionState::StationAssociated);
                    return Ok(());
                }
                Err(MqttError::Timeout) => {
                    warn!("join attempt {}/{} timed out", attempt, attempts);
                    if attempt < attempts {
                        self.channel.pause(retry.join_backoff).await;
                        match self
                            .channel
                            .command(&Command::QuitAccessPoint, OK, timeouts.command)
                            .await
                        {
                            Ok(()) | Err(MqttError::Timeout) => {}
                            Err(e) => return Err(e),
                        }
                    }
                }
                Err(e) => return Err(e),
            }
        }
        error!("could not join {}", station.ssid);
        Err(MqttError::StageExhausted(ConnectStage::StationJoin))
    }

    async fn connect_broker(&mut self) -> Result<(), MqttError<T::Error>> {
        let attempts = self.options.retry.broker_attempts.max(1);
        for attempt in 1..=attempts {
            self.enter(ConnectionState::StationAssociated);
            match self.broker_handshake().await {
                Ok(()) => {
                    self.enter(ConnectionState::BrokerConnected);
                    return Ok(());
                }
                Err(MqttError::Timeout) => {
                    warn!("broker handshake {}/{} timed out", attempt, attempts);
                }
                Err(e) => return Err(e),
            }
        }
        error!("broker unreachable");
        Err(MqttError::StageExhausted(ConnectStage::Broker))
    }

    async fn broker_handshake(&mut self) -> Result<(), MqttError<T::Error>> {
        let broker = self.options.broker;
        let timeouts = self.options.timeouts;
        let user = Command::MqttUserConfig {
            client_id: broker.client_id,
            username: broker.username,
            password: broker.password,
        };
        self.channel.command(&user, OK, timeouts.command).await?;
        let conn_cfg = Command::MqttConnConfig {
            keepalive_secs: broker.keepalive_secs,
            will: broker.last_will,
        };
        self.channel.command(&conn_cfg, OK, timeouts.command).await?;
        self.enter(ConnectionState::BrokerConfiguring);
        let connect = Command::MqttConnect {
            host: broker.host,
            port: broker.port,
        };
        info!("connecting to {}:{}", broker.host, broker.port);
        self.channel
            .command(&connect, BROKER_CONNECTED, timeouts.broker_connect)
            .await
    }

    async fn restore_subscriptions(&mut self) -> Result<(), MqttError<T::Error>> {
        for index in 0..self.subscriptions.len() {
            let Some(entry) = self.subscriptions.nth(index).cloned() else {
                break;
            };
            debug!("restoring subscription {}", entry.topic.as_str());
            self.send_subscribe(&entry.topic, entry.qos).await?;
        }
        Ok(())
    }

    async fn announce_online(&mut self) -> Result<(), MqttError<T::Error>> {
        let broker = self.options.broker;
        match (broker.last_will, broker.online_message) {
            (Some(will), Some(message)) => {
                self.publish(will.topic, message.as_bytes(), will.qos, true)
                    .await
            }
            (None, Some(_)) => {
                warn!("online message configured without a last will topic");
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Subscribes to `topic` and remembers it for replay after reconnects.
    ///
    /// Subscribing again with the same QoS is a no-op; a different QoS
    /// unsubscribes first. A failed exchange drops the client to `Idle` and
    /// returns [`MqttError::ConnectionLost`].
    pub async fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<(), MqttError<T::Error>> {
        self.ensure_connected()?;
        validate_topic(topic, false).map_err(MqttError::InvalidArgument)?;
        match self.subscriptions.get(topic) {
            Some(current) if current == qos => return Ok(()),
            Some(_) => {
                self.send_unsubscribe(topic).await?;
                self.subscriptions.remove(topic);
            }
            None if self.subscriptions.is_full_for(topic) => {
                return Err(MqttError::InvalidArgument(
                    ArgumentError::SubscriptionTableFull,
                ));
            }
            None => {}
        }
        self.send_subscribe(topic, qos).await?;
        self.subscriptions.insert(topic, qos);
        info!("subscribed to {}", topic);
        Ok(())
    }

    /// Drops a subscription on the modem and from the replay table.
    pub async fn unsubscribe(&mut self, topic: &str) -> Result<(), MqttError<T::Error>> {
        self.ensure_connected()?;
        validate_topic(topic, false).map_err(MqttError::InvalidArgument)?;
        if self.subscriptions.get(topic).is_none() {
            return Ok(());
        }
        self.send_unsubscribe(topic).await?;
        self.subscriptions.remove(topic);
        Ok(())
    }

    async fn send_subscribe(&mut self, topic: &str, qos: QoS) -> Result<(), MqttError<T::Error>> {
        let timeout = self.options.timeouts.subscribe;
        let result = self
            .channel
            .command(&Command::MqttSubscribe { topic, qos }, OK, timeout)
            .await;
        result.map_err(|e| self.link_failure(e))
    }

    async fn send_unsubscribe(&mut self, topic: &str) -> Result<(), MqttError<T::Error>> {
        let timeout = self.options.timeouts.subscribe;
        let result = self
            .channel
            .command(&Command::MqttUnsubscribe { topic }, OK, timeout)
            .await;
        result.map_err(|e| self.link_failure(e))
    }

    /// Publishes `payload` to `topic` using a raw, length-prefixed publish.
    ///
    /// Arguments are validated before anything is sent. A missing `>` prompt
    /// or acknowledgement drops the client to `Idle` and returns
    /// [`MqttError::ConnectionLost`].
    pub async fn publish(
        &mut self,
        topic: &str,
        payload: &[u8],
        qos: QoS,
        retain: bool,
    ) -> Result<(), MqttError<T::Error>> {
        self.ensure_connected()?;
        let command = Command::MqttPublishRaw {
            topic,
            len: payload.len(),
            qos,
            retain,
        };
        let timeouts = self.options.timeouts;
        match self
            .channel
            .command(&command, PUBLISH_PROMPT, timeouts.publish_prompt)
            .await
        {
            Ok(()) => {}
            Err(MqttError::InvalidArgument(reason)) => {
                return Err(MqttError::InvalidArgument(reason));
            }
            Err(e) => {
                warn!("no publish prompt for {}", topic);
                return Err(self.link_failure(e));
            }
        }
        if let Err(e) = self.channel.write_raw(payload).await {
            return Err(self.link_failure(e));
        }
        if let Err(e) = self.channel.await_marker(OK, timeouts.publish_ack).await {
            warn!("publish to {} not acknowledged", topic);
            return Err(self.link_failure(e));
        }
        debug!("published {} bytes to {}", payload.len(), topic);
        Ok(())
    }

    /// Asks the modem whether the broker session is still up.
    ///
    /// A negative answer or no answer drops the client to `Idle` and returns
    /// [`MqttError::ConnectionLost`]; run [`connect`](Self::connect) again.
    pub async fn poll_health(&mut self) -> Result<(), MqttError<T::Error>> {
        self.ensure_connected()?;
        let timeout = self.options.timeouts.status;
        let line = match self
            .channel
            .query(&Command::MqttStatus, MQTT_STATUS_PREFIX, timeout)
            .await
        {
            Ok(line) => line,
            Err(e) => {
                warn!("status query failed");
                return Err(self.link_failure(e));
            }
        };
        match util::nth_decimal_field(line.as_bytes(), 1) {
            Some(state) if state >= MQTT_STATE_CONNECTED => {
                trace!("broker session healthy (state {})", state);
                Ok(())
            }
            _ => {
                warn!("broker session down: {}", line.as_str());
                self.enter(ConnectionState::Idle);
                Err(MqttError::ConnectionLost)
            }
        }
    }

    /// Asks the modem whether the station has an IP address.
    ///
    /// Informational only; does not change the connection state.
    pub async fn station_connected(&mut self) -> Result<bool, MqttError<T::Error>> {
        let timeout = self.options.timeouts.status;
        let line = self
            .channel
            .query(&Command::StationStatus, STATION_STATUS_PREFIX, timeout)
            .await?;
        Ok(matches!(util::nth_decimal_field(line.as_bytes(), 0), Some(2 | 3)))
    }

    /// Best-effort clean teardown of the broker session.
    ///
    /// The client is `Idle` afterwards whether or not the modem answered.
    /// Recorded subscriptions are kept for the next `connect()`.
    pub async fn disconnect(&mut self) {
        let timeout = self.options.timeouts.command;
        if self
            .channel
            .command(&Command::MqttClean, OK, timeout)
            .await
            .is_err()
        {
            debug!("disconnect not acknowledged");
        }
        self.enter(ConnectionState::Idle);
        info!("disconnected");
    }

    /// Returns the next message received on a subscribed topic, if one has
    /// fully arrived. Call once per foreground loop iteration.
    pub fn try_extract(&mut self) -> Option<InboundMessage> {
        demux::try_extract(self.channel.rx())
    }

    fn enter(&mut self, state: ConnectionState) {
        if self.state != state {
            debug!("{:?} -> {:?}", self.state, state);
            self.state = state;
        }
    }

    fn ensure_connected(&self) -> Result<(), MqttError<T::Error>> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(MqttError::NotConnected)
        }
    }

    /// A failed exchange while connected means the session can no longer be
    /// trusted.
    fn link_failure(&mut self, err: MqttError<T::Error>) -> MqttError<T::Error> {
        self.enter(ConnectionState::Idle);
        match err {
            MqttError::Timeout | MqttError::MalformedFrame => MqttError::ConnectionLost,
            other => other,
        }
    }
}
