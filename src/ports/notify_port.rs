//! Outbound notification port.

use crate::domain::error::RsTraderError;

pub trait NotifierPort {
    fn send(&self, message: &str) -> Result<(), RsTraderError>;
}
