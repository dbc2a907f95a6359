//! Hot-swap sensor events and their Platform Event Message encoding.

use super::machine::Transition;
use super::mstate::{MState, TransitionReason};
use crate::error::{HotswapError, HotswapResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Upper nibble of event data 1: "OEM codes in data 2 and 3".
pub const HOTSWAP_EVENT_MARKER: u8 = 0xA0;
/// Event message format revision for IPMI 1.5+.
pub const EVM_REV: u8 = 0x04;
/// PICMG FRU Hot Swap sensor type.
pub const SENSOR_TYPE_HOTSWAP: u8 = 0xF0;
/// Sensor-specific event type, assertion.
pub const EVENT_TYPE_SENSOR_SPECIFIC: u8 = 0x6F;
/// Platform Event Message command (Sensor/Event NetFn).
pub const CMD_PLATFORM_EVENT: u8 = 0x02;

/// One assertion of the FRU hot-swap sensor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HotswapEvent {
    pub fru_id: u8,
    pub new_state: MState,
    pub previous_state: MState,
    pub reason: TransitionReason,
}

impl HotswapEvent {
    pub fn from_transition(fru_id: u8, transition: Transition) -> Self {
        Self {
            fru_id,
            new_state: transition.to,
            previous_state: transition.from,
            reason: transition.reason,
        }
    }

    /// `[0xA0 | new, reason << 4 | previous, fru_id]`
    pub fn event_data(&self) -> [u8; 3] {
        [
            HOTSWAP_EVENT_MARKER | self.new_state.as_u8(),
            (self.reason.code() << 4) | self.previous_state.as_u8(),
            self.fru_id,
        ]
    }

    /// Parse the three event data bytes of a hot-swap sensor event.
    pub fn parse(data: [u8; 3]) -> HotswapResult<Self> {
        if data[0] & 0xF0 != HOTSWAP_EVENT_MARKER {
            return Err(HotswapError::NotAHotswapEvent(data[0]));
        }
        Ok(Self {
            fru_id: data[2],
            new_state: MState::try_from(data[0] & 0x0F)?,
            previous_state: MState::try_from(data[1] & 0x0F)?,
            reason: TransitionReason::from_code(data[1] >> 4),
        })
    }

    /// Request data of a Platform Event Message reporting this event.
    pub fn platform_event_data(&self, sensor_number: u8) -> Vec<u8> {
        let mut data = vec![
            EVM_REV,
            SENSOR_TYPE_HOTSWAP,
            sensor_number,
            EVENT_TYPE_SENSOR_SPECIFIC,
        ];
        data.extend_from_slice(&self.event_data());
        data
    }

    /// Inverse of [`platform_event_data`](Self::platform_event_data):
    /// returns the sensor number and the event.
    pub fn from_platform_event(data: &[u8]) -> HotswapResult<(u8, Self)> {
        match data {
            [EVM_REV, SENSOR_TYPE_HOTSWAP, sensor, EVENT_TYPE_SENSOR_SPECIFIC, d1, d2, d3] => {
                Ok((*sensor, Self::parse([*d1, *d2, *d3])?))
            }
            _ => Err(HotswapError::NotAHotswapEvent(data.get(1).copied().unwrap_or(0))),
        }
    }
}

impl fmt::Display for HotswapEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "FRU {}: {} -> {} ({:?})",
            self.fru_id, self.previous_state, self.new_state, self.reason
        )
    }
}
