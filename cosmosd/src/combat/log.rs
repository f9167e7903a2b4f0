//! Append-only combat log

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What a log entry records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogKind {
    Add,
    Remove,
    Roll,
    Damage,
    Heal,
    Status,
    Turn,
    System,
    Death,
    Edit,
    Scale,
}

/// One timestamped log line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub kind: LogKind,
    pub message: String,
    /// Round in which the entry was written
    pub round: u32,
    pub timestamp: DateTime<Utc>,
}

/// Ordered record of everything that happened in an encounter
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CombatLog {
    entries: Vec<LogEntry>,
}

impl CombatLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, kind: LogKind, round: u32, message: impl Into<String>) {
        self.entries.push(LogEntry {
            kind,
            message: message.into(),
            round,
            timestamp: Utc::now(),
        });
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    /// The last `n` entries, newest first
    pub fn recent(&self, n: usize) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter().rev().take(n)
    }

    pub fn last(&self) -> Option<&LogEntry> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries of one kind, oldest first
    pub fn of_kind(&self, kind: LogKind) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter().filter(move |e| e.kind == kind)
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_and_recent() {
        let mut log = CombatLog::new();
        log.push(LogKind::System, 1, "Combat started!");
        log.push(LogKind::Turn, 1, "Vex's turn");
        log.push(LogKind::Damage, 1, "Vex takes 4 damage");

        assert_eq!(log.len(), 3);
        let recent: Vec<&str> = log.recent(2).map(|e| e.message.as_str()).collect();
        assert_eq!(recent, vec!["Vex takes 4 damage", "Vex's turn"]);
        assert_eq!(log.of_kind(LogKind::Turn).count(), 1);
        assert_eq!(log.last().unwrap().kind, LogKind::Damage);
    }

    #[test]
    fn test_entries_keep_their_round() {
        let mut log = CombatLog::new();
        log.push(LogKind::System, 1, "Combat started!");
        log.push(LogKind::System, 2, "Round 2 begins");
        let rounds: Vec<u32> = log.entries().iter().map(|e| e.round).collect();
        assert_eq!(rounds, vec![1, 2]);

        log.clear();
        assert!(log.is_empty());
    }
}
