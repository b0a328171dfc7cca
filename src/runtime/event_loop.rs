//! The runtime's foreground loop.

use embassy_time::Duration;
use embedded_hal::digital::OutputPin;
use embedded_hal_async::delay::DelayNs;

use super::publisher::{BufferedOutbox, PublishRequestReceiver};
use super::traits::MqttModule;
use crate::client::MqttClient;
use crate::error::MqttError;
use crate::ring::DEFAULT_RX_CAPACITY;
use crate::subscription::SubscriptionTable;
use crate::transport::ModemTransport;

/// Sleep at the end of every iteration.
pub const LOOP_INTERVAL: Duration = Duration::from_millis(50);

/// How often the broker session is checked while idle.
pub const HEALTH_INTERVAL: Duration = Duration::from_secs(30);

/// Wait after a failed connect before the next full bring-up.
pub const RECONNECT_BACKOFF: Duration = Duration::from_secs(5);

const OUTBOX_CAPACITY: usize = 8;
const OUTBOX_PAYLOAD: usize = 256;

/// Drives an [`MqttClient`] on behalf of an [`MqttModule`].
///
/// Each [`step`](Self::step) reconnects if needed, hands received messages
/// to the module, forwards queued publishes, ticks the module when due and
/// checks the session every [`HEALTH_INTERVAL`]. Failures never escape: the
/// client drops to `Idle` and the next step starts over.
pub struct MqttRuntime<
    'a,
    'b,
    'r,
    T,
    P,
    D,
    M,
    const N: usize = DEFAULT_RX_CAPACITY,
    const MAX_SUBS: usize = 8,
    const DEPTH: usize = 4,
> {
    client: MqttClient<'a, 'b, T, P, D, N, MAX_SUBS>,
    module: M,
    topics: SubscriptionTable<MAX_SUBS>,
    requests: Option<PublishRequestReceiver<'r, DEPTH>>,
    outbox: BufferedOutbox<OUTBOX_CAPACITY, OUTBOX_PAYLOAD>,
    next_tick: Duration,
    next_health: Duration,
}

impl<'a, 'b, 'r, T, P, D, M, const N: usize, const MAX_SUBS: usize, const DEPTH: usize>
    MqttRuntime<'a, 'b, 'r, T, P, D, M, N, MAX_SUBS, DEPTH>
where
    T: ModemTransport,
    P: OutputPin,
    D: DelayNs,
    M: MqttModule,
{
    /// Collects the module's topics. Nothing is sent until the first step.
    pub fn new(client: MqttClient<'a, 'b, T, P, D, N, MAX_SUBS>, module: M) -> Self {
        let mut topics = SubscriptionTable::new();
        module.register(&mut topics);
        Self {
            client,
            module,
            topics,
            requests: None,
            outbox: BufferedOutbox::new(),
            next_tick: Duration::from_ticks(0),
            next_health: Duration::from_ticks(0),
        }
    }

    /// Also forwards publishes sent through [`PublisherHandle`](super::PublisherHandle)s
    /// created from the same channel.
    pub fn with_requests(mut self, requests: PublishRequestReceiver<'r, DEPTH>) -> Self {
        self.requests = Some(requests);
        self
    }

    pub fn client(&self) -> &MqttClient<'a, 'b, T, P, D, N, MAX_SUBS> {
        &self.client
    }

    pub fn client_mut(&mut self) -> &mut MqttClient<'a, 'b, T, P, D, N, MAX_SUBS> {
        &mut self.client
    }

    pub fn module(&self) -> &M {
        &self.module
    }

    pub fn module_mut(&mut self) -> &mut M {
        &mut self.module
    }

    /// Runs forever.
    pub async fn run(&mut self) -> ! {
        loop {
            self.step().await;
        }
    }

    /// One pass of the loop.
    pub async fn step(&mut self) {
        if !self.client.is_connected() {
            if self.client.connect().await.is_err() {
                self.client.pause(RECONNECT_BACKOFF).await;
                return;
            }
            self.on_connected().await;
        }

        while let Some(message) = self.client.try_extract() {
            self.module.on_message(&message);
        }

        self.forward_requests().await;

        if self.module.needs_immediate_publish() || self.client.elapsed() >= self.next_tick {
            let interval = self.module.on_tick(&mut self.outbox);
            self.next_tick = self.client.elapsed() + interval;
            self.flush_outbox().await;
        }

        if self.client.is_connected() && self.client.elapsed() >= self.next_health {
            if self.client.poll_health().await.is_err() {
                warn!("broker session lost, reconnecting");
            }
            self.next_health = self.client.elapsed() + HEALTH_INTERVAL;
        }

        self.client.pause(LOOP_INTERVAL).await;
    }

    async fn on_connected(&mut self) {
        for index in 0..self.topics.len() {
            let Some(entry) = self.topics.nth(index).cloned() else {
                break;
            };
            if let Err(e) = self.client.subscribe(&entry.topic, entry.qos).await {
                warn!("subscribe to {} failed", entry.topic.as_str());
                if e.requires_reconnect() {
                    return;
                }
            }
        }
        self.module.on_start(&mut self.outbox);
        self.flush_outbox().await;
        let now = self.client.elapsed();
        self.next_tick = now;
        self.next_health = now + HEALTH_INTERVAL;
    }

    async fn forward_requests(&mut self) {
        let Some(requests) = self.requests else {
            return;
        };
        while self.client.is_connected() {
            let Ok(request) = requests.try_receive() else {
                break;
            };
            let result = self
                .client
                .publish(request.topic, request.payload, request.qos, request.retain)
                .await;
            report_publish(request.topic, result);
        }
    }

    async fn flush_outbox(&mut self) {
        while let Some(request) = self.outbox.pop_front() {
            if !self.client.is_connected() {
                self.outbox.clear();
                break;
            }
            let result = self
                .client
                .publish(&request.topic, &request.payload, request.qos, request.retain)
                .await;
            report_publish(&request.topic, result);
        }
    }
}

fn report_publish<E>(_topic: &str, result: Result<(), MqttError<E>>) {
    match result {
        Ok(()) => {}
        Err(MqttError::InvalidArgument(_reason)) => {
            warn!("publish to {} rejected: {:?}", _topic, _reason);
        }
        Err(_) => warn!("publish to {} failed", _topic),
    }
}
