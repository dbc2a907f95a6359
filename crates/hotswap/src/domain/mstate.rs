//! M-states, handle positions and transition reasons.

use crate::error::HotswapError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// PICMG 3.0 FRU hot-swap state.
///
/// M0 (not installed) is never represented: an IPMC that runs is installed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum MState {
    /// Inactive
    M1 = 1,
    /// Activation Request
    M2 = 2,
    /// Activation In Progress
    M3 = 3,
    /// Active
    M4 = 4,
    /// Deactivation Request
    M5 = 5,
    /// Deactivation In Progress
    M6 = 6,
    /// Communication Lost
    M7 = 7,
}

impl MState {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            MState::M1 => "Inactive",
            MState::M2 => "Activation Request",
            MState::M3 => "Activation In Progress",
            MState::M4 => "Active",
            MState::M5 => "Deactivation Request",
            MState::M6 => "Deactivation In Progress",
            MState::M7 => "Communication Lost",
        }
    }
}

impl TryFrom<u8> for MState {
    type Error = HotswapError;

    fn try_from(raw: u8) -> Result<Self, Self::Error> {
        Ok(match raw {
            1 => MState::M1,
            2 => MState::M2,
            3 => MState::M3,
            4 => MState::M4,
            5 => MState::M5,
            6 => MState::M6,
            7 => MState::M7,
            other => return Err(HotswapError::InvalidMState(other)),
        })
    }
}

impl fmt::Display for MState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "M{}", self.as_u8())
    }
}

/// Position of the ejector handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HandleState {
    Open,
    Closed,
}

/// Cause code carried in a hot-swap event (PICMG 3.0 Table 3-23).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum TransitionReason {
    Normal = 0x0,
    CommandedByShelf = 0x1,
    OperatorSwitch = 0x2,
    FruProgrammatic = 0x3,
    CommunicationLost = 0x4,
    CommunicationLostLocal = 0x5,
    SurpriseExtraction = 0x6,
    ProvidedInformation = 0x7,
    InvalidHardwareAddress = 0x8,
    UnexpectedDeactivation = 0x9,
    SurprisePowerFailure = 0xA,
    Unknown = 0xF,
}

impl TransitionReason {
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Decode a 4-bit cause; unassigned values read as `Unknown`.
    pub fn from_code(code: u8) -> Self {
        match code & 0x0F {
            0x0 => Self::Normal,
            0x1 => Self::CommandedByShelf,
            0x2 => Self::OperatorSwitch,
            0x3 => Self::FruProgrammatic,
            0x4 => Self::CommunicationLost,
            0x5 => Self::CommunicationLostLocal,
            0x6 => Self::SurpriseExtraction,
            0x7 => Self::ProvidedInformation,
            0x8 => Self::InvalidHardwareAddress,
            0x9 => Self::UnexpectedDeactivation,
            0xA => Self::SurprisePowerFailure,
            _ => Self::Unknown,
        }
    }
}
