//! # Client Options
//!
//! Everything the client needs to bring a modem from power-on to a broker
//! session. Strings are borrowed; in firmware they are usually `'static`
//! constants.
//!
//! ```ignore
//! let options = MqttOptions::new(
//!     StationConfig::new("FarmMain", "secret"),
//!     BrokerConfig::new("192.168.0.24", "rp2040_client")
//!         .with_credentials("farmmain", "secret")
//!         .with_last_will(LastWill::new("test/rp2040/status", "offline"))
//!         .with_online_message("online"),
//! );
//! ```

use embassy_time::Duration;

use crate::command::QoS;

/// WiFi station credentials.
#[derive(Debug, Clone, Copy)]
pub struct StationConfig<'a> {
    pub ssid: &'a str,
    pub password: &'a str,
}

impl<'a> StationConfig<'a> {
    pub fn new(ssid: &'a str, password: &'a str) -> Self {
        Self { ssid, password }
    }
}

/// Message the broker publishes on the client's behalf if it drops off.
#[derive(Debug, Clone, Copy)]
pub struct LastWill<'a> {
    pub topic: &'a str,
    pub message: &'a str,
    pub qos: QoS,
    pub retain: bool,
}

impl<'a> LastWill<'a> {
    /// A QoS 1, non-retained will.
    pub fn new(topic: &'a str, message: &'a str) -> Self {
        Self {
            topic,
            message,
            qos: QoS::AtLeastOnce,
            retain: false,
        }
    }

    pub fn with_qos(mut self, qos: QoS) -> Self {
        self.qos = qos;
        self
    }

    pub fn with_retain(mut self, retain: bool) -> Self {
        self.retain = retain;
        self
    }
}

/// Broker endpoint and session settings.
#[derive(Debug, Clone, Copy)]
pub struct BrokerConfig<'a> {
    pub host: &'a str,
    pub port: u16,
    pub client_id: &'a str,
    pub username: &'a str,
    pub password: &'a str,
    pub keepalive_secs: u16,
    pub last_will: Option<LastWill<'a>>,
    /// Published retained to the will topic after every successful connect.
    pub online_message: Option<&'a str>,
}

impl<'a> BrokerConfig<'a> {
    /// Anonymous session on port 1883 with a 120 s keepalive.
    pub fn new(host: &'a str, client_id: &'a str) -> Self {
        Self {
            host,
            port: 1883,
            client_id,
            username: "",
            password: "",
            keepalive_secs: 120,
            last_will: None,
            online_message: None,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_credentials(mut self, username: &'a str, password: &'a str) -> Self {
        self.username = username;
        self.password = password;
        self
    }

    pub fn with_keepalive(mut self, secs: u16) -> Self {
        self.keepalive_secs = secs;
        self
    }

    pub fn with_last_will(mut self, will: LastWill<'a>) -> Self {
        self.last_will = Some(will);
        self
    }

    /// Requires a last will; the message goes to the will topic.
    pub fn with_online_message(mut self, message: &'a str) -> Self {
        self.online_message = Some(message);
        self
    }
}

/// Hardware reset pulse timing.
#[derive(Debug, Clone, Copy)]
pub struct ResetTiming {
    /// How long the reset line is held low. Never shorter than 500 ms.
    pub pulse: Duration,
    /// Boot time allowed before the first command.
    pub boot_settle: Duration,
}

impl ResetTiming {
    pub const MIN_PULSE: Duration = Duration::from_millis(500);

    pub fn with_pulse(mut self, pulse: Duration) -> Self {
        self.pulse = if pulse < Self::MIN_PULSE {
            Self::MIN_PULSE
        } else {
            pulse
        };
        self
    }

    pub fn with_boot_settle(mut self, settle: Duration) -> Self {
        self.boot_settle = settle;
        self
    }
}

impl Default for ResetTiming {
    fn default() -> Self {
        Self {
            pulse: Self::MIN_PULSE,
            boot_settle: Duration::from_secs(5),
        }
    }
}

/// Attempt bounds and back-offs for each bring-up stage.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub probe_attempts: u8,
    pub probe_backoff: Duration,
    pub join_attempts: u8,
    /// Pause before the disassociate that precedes the next join attempt.
    pub join_backoff: Duration,
    pub broker_attempts: u8,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            probe_attempts: 3,
            probe_backoff: Duration::from_millis(500),
            join_attempts: 3,
            join_backoff: Duration::from_secs(2),
            broker_attempts: 3,
        }
    }
}

/// Response deadlines.
#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    /// Plain `OK` answers: probe, echo, mode, disassociate, broker config.
    pub command: Duration,
    pub join: Duration,
    pub broker_connect: Duration,
    pub publish_prompt: Duration,
    pub publish_ack: Duration,
    pub subscribe: Duration,
    pub status: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            command: Duration::from_secs(2),
            join: Duration::from_secs(15),
            broker_connect: Duration::from_secs(10),
            publish_prompt: Duration::from_secs(2),
            publish_ack: Duration::from_secs(3),
            subscribe: Duration::from_secs(3),
            status: Duration::from_secs(3),
        }
    }
}

/// Options for [`MqttClient`](crate::MqttClient).
#[derive(Debug, Clone, Copy)]
pub struct MqttOptions<'a> {
    pub station: StationConfig<'a>,
    pub broker: BrokerConfig<'a>,
    pub reset: ResetTiming,
    pub retry: RetryPolicy,
    pub timeouts: Timeouts,
}

impl<'a> MqttOptions<'a> {
    pub fn new(station: StationConfig<'a>, broker: BrokerConfig<'a>) -> Self {
        Self {
            station,
            broker,
            reset: ResetTiming::default(),
            retry: RetryPolicy::default(),
            timeouts: Timeouts::default(),
        }
    }

    pub fn with_reset_timing(mut self, reset: ResetTiming) -> Self {
        self.reset = reset;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }
}
