//! Port traits implemented by adapters.

pub mod config_port;
pub mod notify_port;
pub mod price_port;
pub mod top_list_port;
pub mod trade_port;
