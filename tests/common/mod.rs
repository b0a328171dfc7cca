//! A scripted ESP-AT modem for integration tests.
//!
//! Transport, delay and reset pin share one [`Sim`]. Commands written by the
//! client are parsed line by line and answered after a fixed latency. The
//! delay is the clock: sleeping advances simulated time and delivers any
//! responses that have become due into the receive buffer.

#![allow(dead_code)]

use std::cell::RefCell;
use std::convert::Infallible;
use std::rc::Rc;

use embassy_time::Duration;
use embedded_hal::digital::{ErrorType, OutputPin};
use embedded_hal_async::delay::DelayNs;
use myrtio_at_mqtt::channel::CommandChannel;
use myrtio_at_mqtt::{
    BrokerConfig, LastWill, ModemTransport, MqttClient, MqttOptions, RxBuffer, StationConfig,
};

pub type SimClient = MqttClient<'static, 'static, SimTransport, SimPin, SimDelay>;

/// Modem state and scripting knobs.
pub struct Sim {
    rx: &'static RxBuffer,
    now_ns: u64,
    pending: Vec<(u64, Vec<u8>)>,
    partial: Vec<u8>,
    raw_remaining: Option<usize>,

    /// Every command line received, without the CR LF.
    pub lines: Vec<String>,
    /// Raw publish payloads received.
    pub payloads: Vec<Vec<u8>>,
    pub resets: usize,
    pub pin_low: bool,

    pub latency_ms: u64,
    /// Modem ignores everything.
    pub mute: bool,
    /// Number of `AT` probes to leave unanswered.
    pub probe_failures: usize,
    /// Number of `AT+CWJAP` attempts to fail.
    pub join_failures: usize,
    /// Number of `AT+MQTTCONN` attempts to fail.
    pub broker_failures: usize,
    /// Value reported as the state field of `+MQTTCONN?`.
    pub mqtt_state: u8,
    /// Value reported by `AT+CIPSTATUS`.
    pub station_status: u8,
    pub subscribe_ok: bool,
    pub publish_prompt: bool,
    pub publish_ok: bool,
}

impl Sim {
    fn new(rx: &'static RxBuffer) -> Self {
        Self {
            rx,
            now_ns: 0,
            pending: Vec::new(),
            partial: Vec::new(),
            raw_remaining: None,
            lines: Vec::new(),
            payloads: Vec::new(),
            resets: 0,
            pin_low: false,
            latency_ms: 20,
            mute: false,
            probe_failures: 0,
            join_failures: 0,
            broker_failures: 0,
            mqtt_state: 4,
            station_status: 2,
            subscribe_ok: true,
            publish_prompt: true,
            publish_ok: true,
        }
    }

    pub fn now_ms(&self) -> u64 {
        self.now_ns / 1_000_000
    }

    /// Schedules bytes to arrive `at_ms` after the start of the test.
    pub fn inject_at(&mut self, at_ms: u64, bytes: &[u8]) {
        self.pending.push((at_ms * 1_000_000, bytes.to_vec()));
    }

    /// Pushes bytes into the receive buffer right now.
    pub fn inject_now(&mut self, bytes: &[u8]) {
        self.rx.push_slice(bytes);
    }

    pub fn count(&self, line: &str) -> usize {
        self.lines.iter().filter(|l| l.as_str() == line).count()
    }

    pub fn count_prefix(&self, prefix: &str) -> usize {
        self.lines.iter().filter(|l| l.starts_with(prefix)).count()
    }

    fn respond(&mut self, bytes: &[u8]) {
        let due = self.now_ns + self.latency_ms * 1_000_000;
        self.pending.push((due, bytes.to_vec()));
    }

    fn advance(&mut self, ns: u64) {
        self.now_ns += ns;
        let now = self.now_ns;
        let rx = self.rx;
        self.pending.sort_by_key(|(due, _)| *due);
        self.pending.retain(|(due, bytes)| {
            if *due <= now {
                rx.push_slice(bytes);
                false
            } else {
                true
            }
        });
    }

    fn receive(&mut self, buf: &[u8]) {
        for &byte in buf {
            if let Some(remaining) = self.raw_remaining {
                if let Some(last) = self.payloads.last_mut() {
                    last.push(byte);
                }
                if remaining == 1 {
                    self.raw_remaining = None;
                    if self.publish_ok {
                        self.respond(b"\r\n+MQTTPUB:OK\r\n");
                    } else {
                        self.respond(b"\r\n+MQTTPUB:FAIL\r\n");
                    }
                } else {
                    self.raw_remaining = Some(remaining - 1);
                }
                continue;
            }
            self.partial.push(byte);
            if self.partial.ends_with(b"\r\n") {
                let len = self.partial.len() - 2;
                let line = String::from_utf8_lossy(&self.partial[..len]).into_owned();
                self.partial.clear();
                self.handle(line);
            }
        }
    }

    fn handle(&mut self, line: String) {
        self.lines.push(line.clone());
        if self.mute {
            return;
        }
        match line.as_str() {
            "AT" => {
                if self.probe_failures > 0 {
                    self.probe_failures -= 1;
                } else {
                    self.respond(b"\r\nOK\r\n");
                }
            }
            "ATE0" | "AT+CWMODE=1" => self.respond(b"\r\nOK\r\n"),
            "AT+CWQAP" => self.respond(b"\r\nOK\r\nWIFI DISCONNECT\r\n"),
            "AT+CIPSTATUS" => {
                let reply = format!("STATUS:{}\r\n\r\nOK\r\n", self.station_status);
                self.respond(reply.as_bytes());
            }
            "AT+MQTTCONN?" => {
                let reply = format!(
                    "+MQTTCONN:0,{},0,\"broker\",\"1883\",\"\",1\r\n\r\nOK\r\n",
                    self.mqtt_state
                );
                self.respond(reply.as_bytes());
            }
            "AT+MQTTCLEAN=0" => {
                self.mqtt_state = 0;
                self.respond(b"\r\nOK\r\n");
            }
            l if l.starts_with("AT+CWJAP=") => {
                if self.join_failures > 0 {
                    self.join_failures -= 1;
                    self.respond(b"+CWJAP:1\r\n\r\nFAIL\r\n");
                } else {
                    self.respond(b"WIFI CONNECTED\r\nWIFI GOT IP\r\n\r\nOK\r\n");
                }
            }
            l if l.starts_with("AT+MQTTUSERCFG=") || l.starts_with("AT+MQTTCONNCFG=") => {
                self.respond(b"\r\nOK\r\n");
            }
            l if l.starts_with("AT+MQTTCONN=") => {
                if self.broker_failures > 0 {
                    self.broker_failures -= 1;
                    self.respond(b"\r\nERROR\r\n");
                } else {
                    self.mqtt_state = 4;
                    self.respond(b"+MQTTCONNECTED:0,1,\"broker\",\"1883\",\"\",1\r\n\r\nOK\r\n");
                }
            }
            l if l.starts_with("AT+MQTTSUB=") => {
                if self.subscribe_ok {
                    self.respond(b"\r\nOK\r\n");
                }
            }
            l if l.starts_with("AT+MQTTUNSUB=") => self.respond(b"\r\nOK\r\n"),
            l if l.starts_with("AT+MQTTPUBRAW=") => {
                if !self.publish_prompt {
                    return;
                }
                let len = l
                    .split(',')
                    .nth(2)
                    .and_then(|field| field.parse::<usize>().ok())
                    .unwrap_or(0);
                self.payloads.push(Vec::new());
                self.raw_remaining = Some(len);
                self.respond(b"\r\nOK\r\n\r\n>");
            }
            _ => self.respond(b"\r\nERROR\r\n"),
        }
    }
}

pub type Shared = Rc<RefCell<Sim>>;

pub struct SimTransport(pub Shared);

impl ModemTransport for SimTransport {
    type Error = Infallible;

    async fn send(&mut self, buf: &[u8]) -> Result<(), Self::Error> {
        self.0.borrow_mut().receive(buf);
        Ok(())
    }
}

pub struct SimDelay(pub Shared);

impl DelayNs for SimDelay {
    async fn delay_ns(&mut self, ns: u32) {
        self.0.borrow_mut().advance(u64::from(ns));
    }

    async fn delay_us(&mut self, us: u32) {
        self.0.borrow_mut().advance(u64::from(us) * 1_000);
    }

    async fn delay_ms(&mut self, ms: u32) {
        self.0.borrow_mut().advance(u64::from(ms) * 1_000_000);
    }
}

/// Reset line. Releasing it makes the modem print its boot banner.
pub struct SimPin(pub Shared);

impl ErrorType for SimPin {
    type Error = Infallible;
}

impl OutputPin for SimPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        let mut sim = self.0.borrow_mut();
        sim.pin_low = true;
        sim.resets += 1;
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        let mut sim = self.0.borrow_mut();
        if sim.pin_low && !sim.mute {
            sim.respond(b"\r\nets Jan  8 2013,rst cause:2\r\nready\r\n");
        }
        sim.pin_low = false;
        Ok(())
    }
}

/// A fresh receive buffer per test.
pub fn leak_rx() -> &'static RxBuffer {
    Box::leak(Box::new(RxBuffer::new()))
}

pub fn options() -> MqttOptions<'static> {
    MqttOptions::new(
        StationConfig::new("FarmMain", "secret"),
        BrokerConfig::new("192.168.0.24", "rp2040_client").with_credentials("farmmain", "secret"),
    )
}

pub fn options_with_will() -> MqttOptions<'static> {
    MqttOptions::new(
        StationConfig::new("FarmMain", "secret"),
        BrokerConfig::new("192.168.0.24", "rp2040_client")
            .with_last_will(LastWill::new("farm/rp2040/status", "offline"))
            .with_online_message("online"),
    )
}

pub fn client_with(options: MqttOptions<'static>) -> (SimClient, Shared) {
    let rx = leak_rx();
    let sim = Rc::new(RefCell::new(Sim::new(rx)));
    let client = MqttClient::new(
        SimTransport(sim.clone()),
        rx,
        SimDelay(sim.clone()),
        SimPin(sim.clone()),
        options,
    );
    (client, sim)
}

/// A bare command channel wired to a fresh modem.
pub fn channel() -> (CommandChannel<'static, SimTransport, SimDelay, 1024>, Shared) {
    let rx = leak_rx();
    let sim = Rc::new(RefCell::new(Sim::new(rx)));
    let channel = CommandChannel::new(SimTransport(sim.clone()), rx, SimDelay(sim.clone()));
    (channel, sim)
}

pub fn client() -> (SimClient, Shared) {
    client_with(options())
}

pub fn ms(value: u64) -> Duration {
    Duration::from_millis(value)
}
