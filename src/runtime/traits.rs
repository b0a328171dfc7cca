//! Module trait and the two callback surfaces handed to modules.
//!
//! Modules are plain synchronous state machines. They never touch the modem:
//! topics are declared through a [`TopicCollector`], publishes are queued on a
//! [`PublishOutbox`], and the runtime does the actual I/O once the callback
//! has returned. Keeping every method free of `async` and generics keeps the
//! trait dyn-compatible, so a firmware can hand `&mut dyn MqttModule` to a
//! task without naming the concrete type.

use embassy_time::Duration;

use crate::command::QoS;
use crate::demux::InboundMessage;
use crate::subscription::SubscriptionTable;

/// Queue for publishes requested from inside a module callback.
///
/// ```ignore
/// fn on_tick(&mut self, outbox: &mut dyn PublishOutbox) -> Duration {
///     outbox.publish("farm/pump/state", b"on", QoS::AtLeastOnce, true);
///     Duration::from_secs(30)
/// }
/// ```
pub trait PublishOutbox {
    /// Queues a publish. Returns `false` if it was dropped because the queue
    /// is full or the topic or payload do not fit.
    fn publish(&mut self, topic: &str, payload: &[u8], qos: QoS, retain: bool) -> bool;
}

/// Receives the topics a module wants to subscribe to.
pub trait TopicCollector {
    /// Records `topic`. The string is copied.
    ///
    /// Returns `false` if there is no room left.
    fn add(&mut self, topic: &str, qos: QoS) -> bool;
}

impl<const MAX_SUBS: usize> TopicCollector for SubscriptionTable<MAX_SUBS> {
    fn add(&mut self, topic: &str, qos: QoS) -> bool {
        self.insert(topic, qos)
    }
}

/// Application logic driven by [`MqttRuntime`](super::MqttRuntime).
///
/// ```ignore
/// const CMD_TOPIC: &str = "farm/pump/set";
///
/// struct Pump { on: bool, dirty: bool }
///
/// impl MqttModule for Pump {
///     fn register(&self, collector: &mut dyn TopicCollector) {
///         collector.add(CMD_TOPIC, QoS::AtLeastOnce);
///     }
///
///     fn on_message(&mut self, msg: &InboundMessage) {
///         if msg.topic() == CMD_TOPIC {
///             self.on = msg.payload() == b"on";
///             self.dirty = true;
///         }
///     }
///
///     fn on_tick(&mut self, outbox: &mut dyn PublishOutbox) -> Duration {
///         let state: &[u8] = if self.on { b"on" } else { b"off" };
///         outbox.publish("farm/pump/state", state, QoS::AtLeastOnce, true);
///         self.dirty = false;
///         Duration::from_secs(60)
///     }
///
///     fn needs_immediate_publish(&self) -> bool {
///         self.dirty
///     }
/// }
/// ```
pub trait MqttModule {
    /// Declares the topics this module listens on.
    ///
    /// Called once, before the first connect. The runtime subscribes to every
    /// collected topic after each (re)connect.
    fn register(&self, collector: &mut dyn TopicCollector);

    /// Handles a message received on any subscribed topic.
    ///
    /// Filter on `msg.topic()`. To answer, set a flag and publish from
    /// `on_tick`, which runs right away if `needs_immediate_publish` says so.
    fn on_message(&mut self, msg: &InboundMessage);

    /// Periodic work. Returns the delay until the next call.
    fn on_tick(&mut self, _outbox: &mut dyn PublishOutbox) -> Duration {
        Duration::from_secs(60)
    }

    /// Called after every successful connect, once subscriptions are in place.
    fn on_start(&mut self, _outbox: &mut dyn PublishOutbox) {}

    /// `true` makes the runtime call `on_tick` on the next iteration instead
    /// of waiting for the interval.
    fn needs_immediate_publish(&self) -> bool {
        false
    }
}

/// Module with no topics and no behavior, for runtimes that only forward
/// requests from a [`PublisherHandle`](super::PublisherHandle).
pub struct NoopModule;

impl MqttModule for NoopModule {
    fn register(&self, _collector: &mut dyn TopicCollector) {}

    fn on_message(&mut self, _msg: &InboundMessage) {}
}

/// Runs two modules side by side. Nest pairs for more.
pub struct ModulePair<M1, M2> {
    pub first: M1,
    pub second: M2,
}

impl<M1, M2> ModulePair<M1, M2> {
    pub fn new(first: M1, second: M2) -> Self {
        Self { first, second }
    }
}

impl<M1, M2> MqttModule for ModulePair<M1, M2>
where
    M1: MqttModule,
    M2: MqttModule,
{
    fn register(&self, collector: &mut dyn TopicCollector) {
        self.first.register(collector);
        self.second.register(collector);
    }

    fn on_message(&mut self, msg: &InboundMessage) {
        self.first.on_message(msg);
        self.second.on_message(msg);
    }

    fn on_tick(&mut self, outbox: &mut dyn PublishOutbox) -> Duration {
        let first = self.first.on_tick(outbox);
        let second = self.second.on_tick(outbox);
        first.min(second)
    }

    fn on_start(&mut self, outbox: &mut dyn PublishOutbox) {
        self.first.on_start(outbox);
        self.second.on_start(outbox);
    }

    fn needs_immediate_publish(&self) -> bool {
        self.first.needs_immediate_publish() || self.second.needs_immediate_publish()
    }
}

impl<M: MqttModule + ?Sized> MqttModule for &mut M {
    fn register(&self, collector: &mut dyn TopicCollector) {
        (**self).register(collector)
    }

    fn on_message(&mut self, msg: &InboundMessage) {
        (**self).on_message(msg)
    }

    fn on_tick(&mut self, outbox: &mut dyn PublishOutbox) -> Duration {
        (**self).on_tick(outbox)
    }

    fn on_start(&mut self, outbox: &mut dyn PublishOutbox) {
        (**self).on_start(outbox)
    }

    fn needs_immediate_publish(&self) -> bool {
        (**self).needs_immediate_publish()
    }
}
