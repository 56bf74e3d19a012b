//! Ordered, human-readable error log
//!
//! Agents record call failures here instead of raising them; the manager
//! drains each agent's log into its own and flushes it to `errors.txt`.

/// Ordered list of error lines
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorLog {
    entries: Vec<String>,
}

impl ErrorLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one entry
    pub fn add(&mut self, entry: impl Into<String>) {
        self.entries.push(entry.into());
    }

    /// Append entries taken from another log, prefixed with `indent`
    pub fn extend_indented(&mut self, indent: &str, entries: impl IntoIterator<Item = String>) {
        self.entries
            .extend(entries.into_iter().map(|e| format!("{}{}", indent, e)));
    }

    /// Read and clear
    pub fn drain(&mut self) -> Vec<String> {
        std::mem::take(&mut self.entries)
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Render as text: the header line, then one entry per line
    pub fn to_text(&self, header: &str) -> String {
        let mut text = String::from(header);
        text.push('\n');
        for entry in &self.entries {
            text.push_str(entry);
            text.push('\n');
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_clears() {
        let mut log = ErrorLog::new();
        log.add("first");
        log.add("second");
        assert_eq!(log.drain(), vec!["first", "second"]);
        assert!(log.is_empty());
    }

    #[test]
    fn test_indented_merge_and_text() {
        let mut agent_log = ErrorLog::new();
        agent_log.add("HTTP 503");

        let mut log = ErrorLog::new();
        log.add("An error occurred while communicating with reviewer_1.");
        log.extend_indented("  ", agent_log.drain());

        assert_eq!(
            log.to_text("iteration n.0"),
            "iteration n.0\nAn error occurred while communicating with reviewer_1.\n  HTTP 503\n"
        );
    }
}
