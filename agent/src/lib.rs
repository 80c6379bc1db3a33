// Crate root for the telemetry edge agent modules.

pub mod agent;
pub mod buffer;
pub mod constants;
pub mod link;
pub mod source;
pub mod transport;
pub mod utils;
