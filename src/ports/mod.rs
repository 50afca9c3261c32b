//! Port traits: the seams between the domain and the outside world.

pub mod price_port;
pub mod optimizer_port;
pub mod chain_port;
pub mod report_port;
pub mod config_port;
