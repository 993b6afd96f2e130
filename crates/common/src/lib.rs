// uplink-common: shared types and wire protocol for the uplink workspace

pub mod protocol;
pub mod types;
