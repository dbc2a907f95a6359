//! # Event Subscriber
//!
//! Defines the subscription side of the event bus.

use crate::events::{EventFilter, IpmcEvent};
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, RwLock};
use std::task::{Context, Poll};
use thiserror::Error;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::Stream;
use tracing::{debug, warn};

/// Errors from subscription operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    /// The event bus was closed.
    #[error("Event bus closed")]
    Closed,
}

/// Trait for subscribing to events.
pub trait EventSubscriber: Send + Sync {
    /// Subscribe to events matching a filter.
    fn subscribe(&self, filter: EventFilter) -> Subscription;
}

/// Keeps the bus's per-topic subscription count accurate.
struct Tracking {
    subscriptions: Arc<RwLock<HashMap<String, usize>>>,
    topic_key: String,
}

impl Drop for Tracking {
    fn drop(&mut self) {
        let Ok(mut subs) = self.subscriptions.write() else {
            return;
        };
        if let Some(count) = subs.get_mut(&self.topic_key) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                subs.remove(&self.topic_key);
            }
        }
        debug!(topic = %self.topic_key, "Subscription dropped");
    }
}

/// A subscription handle for receiving events.
///
/// When dropped, the subscription is automatically cleaned up.
pub struct Subscription {
    receiver: broadcast::Receiver<IpmcEvent>,
    filter: EventFilter,
    tracking: Tracking,
}

impl Subscription {
    pub(crate) fn new(
        receiver: broadcast::Receiver<IpmcEvent>,
        filter: EventFilter,
        subscriptions: Arc<RwLock<HashMap<String, usize>>>,
        topic_key: String,
    ) -> Self {
        Self {
            receiver,
            filter,
            tracking: Tracking {
                subscriptions,
                topic_key,
            },
        }
    }

    /// Receive the next event that matches the filter.
    ///
    /// Returns `None` once the bus has been dropped.
    pub async fn recv(&mut self) -> Option<IpmcEvent> {
        loop {
            let event = match self.receiver.recv().await {
                Ok(e) => e,
                Err(broadcast::error::RecvError::Closed) => return None,
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    warn!(lagged = count, "Subscriber lagged, some events dropped");
                    continue;
                }
            };

            if self.filter.matches(&event) {
                return Some(event);
            }
        }
    }

    /// Receive the next matching event without waiting.
    ///
    /// - `Ok(Some(event))` - An event was available and matched
    /// - `Ok(None)` - Nothing pending
    /// - `Err(SubscriptionError::Closed)` - The bus was dropped
    pub fn try_recv(&mut self) -> Result<Option<IpmcEvent>, SubscriptionError> {
        loop {
            let event = match self.receiver.try_recv() {
                Ok(e) => e,
                Err(broadcast::error::TryRecvError::Empty) => return Ok(None),
                Err(broadcast::error::TryRecvError::Closed) => {
                    return Err(SubscriptionError::Closed)
                }
                Err(broadcast::error::TryRecvError::Lagged(count)) => {
                    warn!(lagged = count, "Subscriber lagged, some events dropped");
                    continue;
                }
            };

            if self.filter.matches(&event) {
                return Ok(Some(event));
            }
        }
    }

    #[must_use]
    pub fn filter(&self) -> &EventFilter {
        &self.filter
    }
}

/// A subscription as a `tokio_stream::Stream`.
pub struct EventStream {
    inner: BroadcastStream<IpmcEvent>,
    filter: EventFilter,
    _tracking: Tracking,
}

impl EventStream {
    #[must_use]
    pub fn new(subscription: Subscription) -> Self {
        let Subscription {
            receiver,
            filter,
            tracking,
        } = subscription;
        Self {
            inner: BroadcastStream::new(receiver),
            filter,
            _tracking: tracking,
        }
    }

    #[must_use]
    pub fn filter(&self) -> &EventFilter {
        &self.filter
    }
}

impl Stream for EventStream {
    type Item = IpmcEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            match Pin::new(&mut self.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(event))) => {
                    if self.filter.matches(&event) {
                        return Poll::Ready(Some(event));
                    }
                }
                Poll::Ready(Some(Err(BroadcastStreamRecvError::Lagged(count)))) => {
                    warn!(lagged = count, "Event stream lagged, some events dropped");
                }
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventTopic;
    use crate::publisher::InMemoryEventBus;
    use crate::EventPublisher;
    use hotswap::{HotswapEvent, MState, TransitionReason};
    use ipmb_transport::BusId;
    use std::time::Duration;
    use tokio::time::timeout;
    use tokio_stream::StreamExt;

    fn hotswap_event() -> IpmcEvent {
        IpmcEvent::HotswapTransition(HotswapEvent {
            fru_id: 0,
            new_state: MState::M4,
            previous_state: MState::M3,
            reason: TransitionReason::Normal,
        })
    }

    fn bus_event() -> IpmcEvent {
        IpmcEvent::BusEnableChanged {
            bus: BusId::B,
            enabled: true,
        }
    }

    #[tokio::test]
    async fn test_subscription_filter() {
        let bus = InMemoryEventBus::new();
        let mut sub = bus.subscribe(EventFilter::topics(vec![EventTopic::Hotswap]));

        bus.publish(bus_event());
        bus.publish(hotswap_event());

        let received = timeout(Duration::from_millis(100), sub.recv())
            .await
            .expect("timeout")
            .expect("event");
        assert_eq!(received, hotswap_event());
        assert_eq!(sub.try_recv(), Ok(None));
    }

    #[tokio::test]
    async fn test_subscription_drop_cleanup() {
        let bus = InMemoryEventBus::new();
        {
            let _sub1 = bus.subscribe(EventFilter::all());
            let _stream = bus.event_stream(EventFilter::all());
            assert_eq!(bus.subscriber_count(), 2);
            assert_eq!(bus.subscriptions_by_topic().get("[All]"), Some(&2));
        }
        assert_eq!(bus.subscriber_count(), 0);
        assert!(bus.subscriptions_by_topic().is_empty());
    }

    #[tokio::test]
    async fn test_recv_returns_none_after_bus_dropped() {
        let bus = InMemoryEventBus::new();
        let mut sub = bus.subscribe(EventFilter::all());
        drop(bus);
        assert_eq!(sub.recv().await, None);
        assert_eq!(sub.try_recv(), Err(SubscriptionError::Closed));
    }

    #[tokio::test]
    async fn test_lagged_subscriber_skips_ahead() {
        let bus = InMemoryEventBus::with_capacity(2);
        let mut sub = bus.subscribe(EventFilter::all());
        bus.publish(bus_event());
        bus.publish(bus_event());
        bus.publish(hotswap_event());

        // The oldest event was overwritten; the subscriber resumes after it.
        assert_eq!(sub.try_recv(), Ok(Some(bus_event())));
        assert_eq!(sub.try_recv(), Ok(Some(hotswap_event())));
    }

    #[tokio::test]
    async fn test_event_stream_filters() {
        let bus = InMemoryEventBus::new();
        let mut stream = bus.event_stream(EventFilter::topics(vec![EventTopic::Transport]));

        bus.publish(hotswap_event());
        bus.publish(bus_event());
        drop(bus);

        let events: Vec<_> = timeout(Duration::from_millis(100), async {
            let mut events = Vec::new();
            while let Some(event) = stream.next().await {
                events.push(event);
            }
            events
        })
        .await
        .expect("timeout");
        assert_eq!(events, vec![bus_event()]);
        assert_eq!(EventStream::filter(&stream).topics, vec![EventTopic::Transport]);
    }
}
