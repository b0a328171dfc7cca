//! Publish queues feeding the runtime.
//!
//! Two ways in: [`BufferedOutbox`] collects publishes made from module
//! callbacks, and [`PublisherHandle`] lets other tasks push requests through
//! an `embassy-sync` channel. Both are drained by the runtime, which is the
//! only thing allowed to talk to the modem.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, Receiver, Sender};
use heapless::{String, Vec};

use super::traits::PublishOutbox;
use crate::command::{MAX_TOPIC_LEN, QoS};

/// A publish requested by another task. Topic and payload are borrowed,
/// usually from `'static` data.
#[derive(Debug, Clone)]
pub struct PublishRequest<'a> {
    pub topic: &'a str,
    pub payload: &'a [u8],
    pub qos: QoS,
    pub retain: bool,
}

pub type PublishRequestChannel<'a, const DEPTH: usize> =
    Channel<CriticalSectionRawMutex, PublishRequest<'a>, DEPTH>;

pub type PublishRequestSender<'a, const DEPTH: usize> =
    Sender<'a, CriticalSectionRawMutex, PublishRequest<'a>, DEPTH>;

pub type PublishRequestReceiver<'a, const DEPTH: usize> =
    Receiver<'a, CriticalSectionRawMutex, PublishRequest<'a>, DEPTH>;

/// Cloneable sender side for tasks that want to publish without owning the
/// client.
#[derive(Clone, Copy)]
pub struct PublisherHandle<'a, const DEPTH: usize> {
    tx: PublishRequestSender<'a, DEPTH>,
}

impl<'a, const DEPTH: usize> PublisherHandle<'a, DEPTH> {
    pub fn new(tx: PublishRequestSender<'a, DEPTH>) -> Self {
        Self { tx }
    }

    /// Queues a publish, waiting for room in the channel.
    pub async fn publish(&self, topic: &'a str, payload: &'a [u8], qos: QoS, retain: bool) {
        self.tx
            .send(PublishRequest {
                topic,
                payload,
                qos,
                retain,
            })
            .await;
    }

    /// Queues a publish if there is room. Returns `false` otherwise.
    pub fn try_publish(&self, topic: &'a str, payload: &'a [u8], qos: QoS, retain: bool) -> bool {
        self.tx
            .try_send(PublishRequest {
                topic,
                payload,
                qos,
                retain,
            })
            .is_ok()
    }
}

/// A queued publish with its own copy of topic and payload.
#[derive(Debug, Clone)]
pub struct OwnedPublishRequest<const PAYLOAD_SIZE: usize> {
    pub topic: String<MAX_TOPIC_LEN>,
    pub payload: Vec<u8, PAYLOAD_SIZE>,
    pub qos: QoS,
    pub retain: bool,
}

/// Fixed-size FIFO of publishes collected during module callbacks.
pub struct BufferedOutbox<const CAPACITY: usize, const PAYLOAD_SIZE: usize> {
    requests: Vec<OwnedPublishRequest<PAYLOAD_SIZE>, CAPACITY>,
}

impl<const CAPACITY: usize, const PAYLOAD_SIZE: usize> BufferedOutbox<CAPACITY, PAYLOAD_SIZE> {
    pub const fn new() -> Self {
        Self {
            requests: Vec::new(),
        }
    }

    /// Takes the oldest queued request.
    pub fn pop_front(&mut self) -> Option<OwnedPublishRequest<PAYLOAD_SIZE>> {
        if self.requests.is_empty() {
            None
        } else {
            Some(self.requests.remove(0))
        }
    }

    pub fn clear(&mut self) {
        self.requests.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }
}

impl<const CAPACITY: usize, const PAYLOAD_SIZE: usize> Default
    for BufferedOutbox<CAPACITY, PAYLOAD_SIZE>
{
    fn default() -> Self {
        Self::new()
    }
}

impl<const CAPACITY: usize, const PAYLOAD_SIZE: usize> PublishOutbox
    for BufferedOutbox<CAPACITY, PAYLOAD_SIZE>
{
    fn publish(&mut self, topic: &str, payload: &[u8], qos: QoS, retain: bool) -> bool {
        let mut owned_topic = String::new();
        if owned_topic.push_str(topic).is_err() {
            warn!("outbox: topic too long, dropped");
            return false;
        }
        let mut owned_payload = Vec::new();
        if owned_payload.extend_from_slice(payload).is_err() {
            warn!("outbox: {} byte payload too large, dropped", payload.len());
            return false;
        }
        let request = OwnedPublishRequest {
            topic: owned_topic,
            payload: owned_payload,
            qos,
            retain,
        };
        if self.requests.push(request).is_err() {
            warn!("outbox full, dropped publish to {}", topic);
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outbox_is_fifo() {
        let mut outbox = BufferedOutbox::<4, 8>::new();
        assert!(outbox.publish("a", b"1", QoS::AtMostOnce, false));
        assert!(outbox.publish("b", b"2", QoS::AtLeastOnce, true));
        let first = outbox.pop_front().unwrap();
        assert_eq!(first.topic.as_str(), "a");
        let second = outbox.pop_front().unwrap();
        assert_eq!(second.payload.as_slice(), b"2");
        assert!(second.retain);
        assert!(outbox.pop_front().is_none());
    }

    #[test]
    fn outbox_rejects_oversized_and_overflow() {
        let mut outbox = BufferedOutbox::<1, 2>::new();
        assert!(!outbox.publish("a", b"too long", QoS::AtMostOnce, false));
        assert!(outbox.publish("a", b"ok", QoS::AtMostOnce, false));
        assert!(!outbox.publish("b", b"no", QoS::AtMostOnce, false));
        assert_eq!(outbox.len(), 1);
    }

    #[test]
    fn handle_feeds_channel() {
        static CHANNEL: PublishRequestChannel<'static, 2> = Channel::new();
        let handle = PublisherHandle::new(CHANNEL.sender());
        assert!(handle.try_publish("t", b"x", QoS::AtMostOnce, false));
        assert!(handle.try_publish("t", b"y", QoS::AtMostOnce, false));
        assert!(!handle.try_publish("t", b"z", QoS::AtMostOnce, false));
        let received = CHANNEL.receiver().try_receive().unwrap();
        assert_eq!(received.payload, b"x");
    }
}
