//! Changes between consecutive top-ranked lists.

use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TopListChange {
    /// In the new list but not the previous one, sorted.
    pub added: Vec<String>,
    /// In the previous list but not the new one, sorted.
    pub removed: Vec<String>,
}

impl TopListChange {
    pub fn between(previous: &[String], current: &[String]) -> Self {
        let prev: BTreeSet<&String> = previous.iter().collect();
        let curr: BTreeSet<&String> = current.iter().collect();
        TopListChange {
            added: curr.difference(&prev).map(|s| (*s).clone()).collect(),
            removed: prev.difference(&curr).map(|s| (*s).clone()).collect(),
        }
    }

    pub fn is_unchanged(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }

    pub fn summary(&self) -> String {
        if self.is_unchanged() {
            return "Top list unchanged".to_string();
        }
        let mut lines = Vec::new();
        if !self.added.is_empty() {
            lines.push(format!("Added: {}", self.added.join(", ")));
        }
        if !self.removed.is_empty() {
            lines.push(format!("Removed: {}", self.removed.join(", ")));
        }
        lines.join("\n")
    }
}
