//! # IPMC Events
//!
//! Everything that flows through the event bus.

use hotswap::HotswapEvent;
use ipmb_transport::{BusId, Message};
use serde::{Deserialize, Serialize};

/// Events published by IPMC subsystems.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IpmcEvent {
    // =========================================================================
    // HOT-SWAP
    // =========================================================================
    /// The FRU changed M-state (or the sensor was rearmed).
    HotswapTransition(HotswapEvent),

    // =========================================================================
    // TRANSPORT
    // =========================================================================
    /// An outbound request got no reply.
    DeliveryFailed {
        /// The request that was given up on.
        request: Message,
        /// Human-readable failure reason.
        reason: String,
    },

    /// A bus was administratively enabled or disabled.
    BusEnableChanged { bus: BusId, enabled: bool },
}

impl IpmcEvent {
    #[must_use]
    pub fn topic(&self) -> EventTopic {
        match self {
            Self::HotswapTransition(_) => EventTopic::Hotswap,
            Self::DeliveryFailed { .. } | Self::BusEnableChanged { .. } => EventTopic::Transport,
        }
    }
}

/// Event topics for filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventTopic {
    All,
    Hotswap,
    Transport,
}

/// Filter for subscribing to specific events.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventFilter {
    /// Topics to receive; empty means all.
    pub topics: Vec<EventTopic>,
}

impl EventFilter {
    #[must_use]
    pub fn all() -> Self {
        Self {
            topics: vec![EventTopic::All],
        }
    }

    #[must_use]
    pub fn topics(topics: Vec<EventTopic>) -> Self {
        Self { topics }
    }

    #[must_use]
    pub fn matches(&self, event: &IpmcEvent) -> bool {
        self.topics.is_empty()
            || self.topics.contains(&EventTopic::All)
            || self.topics.contains(&event.topic())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hotswap::{MState, TransitionReason};

    fn transition() -> IpmcEvent {
        IpmcEvent::HotswapTransition(HotswapEvent {
            fru_id: 0,
            new_state: MState::M2,
            previous_state: MState::M1,
            reason: TransitionReason::OperatorSwitch,
        })
    }

    #[test]
    fn test_topic_mapping() {
        assert_eq!(transition().topic(), EventTopic::Hotswap);
        let event = IpmcEvent::BusEnableChanged {
            bus: BusId::B,
            enabled: false,
        };
        assert_eq!(event.topic(), EventTopic::Transport);
    }

    #[test]
    fn test_filter_by_topic() {
        let filter = EventFilter::topics(vec![EventTopic::Transport]);
        assert!(!filter.matches(&transition()));
        assert!(EventFilter::all().matches(&transition()));
        assert!(EventFilter::default().matches(&transition()));
    }

    #[test]
    fn test_delivery_failure_serializes_with_request() {
        let event = IpmcEvent::DeliveryFailed {
            request: Message::request(0x72, 0x20, 0x04, 0x02, vec![0x04, 0xF0, 0x00]),
            reason: "no reply".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("DeliveryFailed"));

        let decoded: IpmcEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, event);
        assert_eq!(decoded.topic(), EventTopic::Transport);
    }
}
