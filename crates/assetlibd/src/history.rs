//! Bounded record of executed commands.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use assetlib_protocol::{Message, Status};
use serde::Serialize;

/// One executed command and how it ended.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    /// Command as displayed, e.g. `import /a.obj`.
    pub command: String,
    /// Client the result was addressed to.
    pub client: Option<String>,
    /// Outcome reported to the client.
    pub status: Status,
    /// Failure text, when the command failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<String>,
}

impl HistoryEntry {
    pub(crate) fn new(command: String, client: Option<String>, result: &Message) -> Self {
        let status = result.status_or_fail();
        Self {
            command,
            client,
            status,
            info: (status == Status::Fail).then(|| result.failure_text()),
        }
    }
}

/// Ring buffer of the most recent [`HistoryEntry`] values.
#[derive(Debug)]
pub struct History {
    limit: usize,
    entries: Mutex<VecDeque<HistoryEntry>>,
}

impl History {
    /// Keeps at most `limit` entries; `0` disables recording.
    #[must_use]
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            entries: Mutex::new(VecDeque::with_capacity(limit.min(1024))),
        }
    }

    /// Appends an entry, evicting the oldest when full.
    pub fn record(&self, entry: HistoryEntry) {
        if self.limit == 0 {
            return;
        }
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        while entries.len() >= self.limit {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// Entries from oldest to newest.
    #[must_use]
    pub fn snapshot(&self) -> Vec<HistoryEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn entry(name: &str) -> HistoryEntry {
        HistoryEntry::new(name.to_owned(), None, &Message::ok())
    }

    #[rstest]
    #[case(2, &["b", "c"])]
    #[case(5, &["a", "b", "c"])]
    #[case(0, &[])]
    fn keeps_the_newest_entries(#[case] limit: usize, #[case] expected: &[&str]) {
        let history = History::new(limit);
        for name in ["a", "b", "c"] {
            history.record(entry(name));
        }
        let names: Vec<_> = history
            .snapshot()
            .into_iter()
            .map(|entry| entry.command)
            .collect();
        assert_eq!(names, expected);
    }

    #[test]
    fn failed_entries_keep_their_reason() {
        let failed = HistoryEntry::new(
            "import /a.obj".to_owned(),
            Some("tcp://127.0.0.1:6002".to_owned()),
            &Message::fail("Command has no receiver"),
        );
        assert_eq!(failed.status, Status::Fail);
        assert_eq!(failed.info.as_deref(), Some("Command has no receiver"));
    }
}
