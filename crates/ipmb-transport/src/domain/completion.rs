//! IPMI completion codes and network functions used by the core.

pub const CC_SUCCESS: u8 = 0x00;
pub const CC_NODE_BUSY: u8 = 0xC0;
pub const CC_INVALID_COMMAND: u8 = 0xC1;
pub const CC_PARAMETER_OUT_OF_RANGE: u8 = 0xC9;
pub const CC_INVALID_DATA_FIELD: u8 = 0xCC;

pub const NETFN_SENSOR_EVENT: u8 = 0x04;
pub const NETFN_APP: u8 = 0x06;
pub const NETFN_GROUP_EXTENSION: u8 = 0x2C;
