//! Plain-text top list: one asset id per line, best first.

use crate::domain::error::RsTraderError;
use crate::ports::top_list_port::TopListPort;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

pub struct TopListFile {
    path: PathBuf,
}

impl TopListFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl TopListPort for TopListFile {
    fn read_top_list(&self) -> Result<Option<Vec<String>>, RsTraderError> {
        match fs::read_to_string(&self.path) {
            Ok(content) => Ok(Some(
                content
                    .lines()
                    .map(str::trim)
                    .filter(|l| !l.is_empty())
                    .map(str::to_string)
                    .collect(),
            )),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write_top_list(&self, assets: &[String]) -> Result<(), RsTraderError> {
        let mut content = assets.join("\n");
        content.push('\n');
        fs::write(&self.path, content).map_err(|e| RsTraderError::PersistenceFailure {
            reason: format!("failed to write {}: {}", self.path.display(), e),
        })
    }
}
