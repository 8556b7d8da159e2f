//! Notifier that only writes to the log.

use crate::domain::error::RsTraderError;
use crate::ports::notify_port::NotifierPort;

#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl NotifierPort for LogNotifier {
    fn send(&self, message: &str) -> Result<(), RsTraderError> {
        tracing::info!(target: "rstrader::notify", "{message}");
        Ok(())
    }
}
