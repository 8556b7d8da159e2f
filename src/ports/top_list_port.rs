//! Persisted list of top-ranked asset ids, best first.

use crate::domain::error::RsTraderError;

pub trait TopListPort {
    /// `Ok(None)` when no list has been written yet.
    fn read_top_list(&self) -> Result<Option<Vec<String>>, RsTraderError>;

    fn write_top_list(&self, assets: &[String]) -> Result<(), RsTraderError>;
}
