use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::graph::GraphSeries;
use crate::result::{CalculationResult, OperationType};

/// Maximum number of retained entries; older ones are evicted first.
pub const HISTORY_CAPACITY: usize = 50;

/// A successful calculation, stamped when it was committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub expression: String,
    pub result: String,
    #[serde(default)]
    pub steps: Vec<String>,
    pub operation_type: OperationType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graph_data: Option<GraphSeries>,
}

impl HistoryEntry {
    pub fn from_result(result: CalculationResult) -> Self {
        Self {
            id: ulid::Ulid::new().to_string(),
            timestamp: Utc::now(),
            expression: result.expression,
            result: result.result,
            steps: result.steps,
            operation_type: result.operation_type,
            graph_data: result.graph_data,
        }
    }
}

/// Newest-first bounded log of calculations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<HistoryEntry>", into = "Vec<HistoryEntry>")]
pub struct History {
    entries: Vec<HistoryEntry>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adopt `entries` (newest first), dropping anything past capacity.
    pub fn from_entries(mut entries: Vec<HistoryEntry>) -> Self {
        entries.truncate(HISTORY_CAPACITY);
        Self { entries }
    }

    /// Record a successful result. Failed results are not history and
    /// are ignored.
    pub fn add(&mut self, result: CalculationResult) -> Option<&HistoryEntry> {
        if result.is_error() {
            return None;
        }
        self.entries.insert(0, HistoryEntry::from_result(result));
        self.entries.truncate(HISTORY_CAPACITY);
        self.entries.first()
    }

    /// Remove the entry with `id`. Returns whether anything was removed.
    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.id != id);
        self.entries.len() != before
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn get(&self, id: &str) -> Option<&HistoryEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn export(&self) -> HistoryExport {
        HistoryExport {
            exported_at: Utc::now(),
            count: self.entries.len(),
            entries: self.entries.clone(),
        }
    }

    pub fn filter<'a>(&'a self, filter: &'a HistoryFilter) -> impl Iterator<Item = &'a HistoryEntry> {
        self.entries.iter().filter(move |e| filter.matches(e))
    }
}

impl From<Vec<HistoryEntry>> for History {
    fn from(entries: Vec<HistoryEntry>) -> Self {
        Self::from_entries(entries)
    }
}

impl From<History> for Vec<HistoryEntry> {
    fn from(history: History) -> Self {
        history.entries
    }
}

impl From<HistoryExport> for History {
    fn from(export: HistoryExport) -> Self {
        Self::from_entries(export.entries)
    }
}

/// Read-only snapshot of the history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryExport {
    pub exported_at: DateTime<Utc>,
    pub count: usize,
    pub entries: Vec<HistoryEntry>,
}

#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    pub operation_type: Option<OperationType>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    /// Case-insensitive substring of the expression or the result.
    pub search: Option<String>,
}

impl HistoryFilter {
    pub fn matches(&self, entry: &HistoryEntry) -> bool {
        if self.operation_type.is_some_and(|op| op != entry.operation_type) {
            return false;
        }
        if self.since.is_some_and(|t| entry.timestamp < t) {
            return false;
        }
        if self.until.is_some_and(|t| entry.timestamp > t) {
            return false;
        }
        match &self.search {
            Some(term) => {
                let term = term.to_lowercase();
                entry.expression.to_lowercase().contains(&term)
                    || entry.result.to_lowercase().contains(&term)
            }
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_result(expr: &str) -> CalculationResult {
        CalculationResult::success(OperationType::Basic, expr, "1", vec![expr.to_string()])
    }

    #[test]
    fn test_add_prepends() {
        let mut h = History::new();
        h.add(make_result("a"));
        h.add(make_result("b"));
        assert_eq!(h.entries()[0].expression, "b");
        assert_eq!(h.entries()[1].expression, "a");
    }

    #[test]
    fn test_add_ignores_failures() {
        let mut h = History::new();
        let failed = CalculationResult::failure(OperationType::Basic, "1/", "bad");
        assert!(h.add(failed).is_none());
        assert!(h.is_empty());
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let mut h = History::new();
        for i in 0..75 {
            h.add(make_result(&format!("expr{i}")));
        }
        assert_eq!(h.len(), HISTORY_CAPACITY);
        let kept: Vec<&str> = h.entries().iter().map(|e| e.expression.as_str()).collect();
        let expected: Vec<String> = (25..75).rev().map(|i| format!("expr{i}")).collect();
        assert_eq!(kept, expected);
    }

    #[test]
    fn test_lookup_does_not_change_eviction_order() {
        let mut h = History::new();
        let oldest_id = h.add(make_result("first")).unwrap().id.clone();
        for i in 0..HISTORY_CAPACITY - 1 {
            h.add(make_result(&format!("n{i}")));
        }
        assert!(h.get(&oldest_id).is_some());
        h.add(make_result("overflow"));
        assert!(h.get(&oldest_id).is_none());
    }

    #[test]
    fn test_remove() {
        let mut h = History::new();
        let id = h.add(make_result("x")).unwrap().id.clone();
        h.add(make_result("y"));
        assert!(h.remove(&id));
        assert_eq!(h.len(), 1);
        assert!(!h.remove("missing"));
        assert_eq!(h.len(), 1);
    }

    #[test]
    fn test_ids_unique() {
        let mut h = History::new();
        for i in 0..20 {
            h.add(make_result(&i.to_string()));
        }
        let mut ids: Vec<&str> = h.entries().iter().map(|e| e.id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 20);
    }

    #[test]
    fn test_export_does_not_mutate() {
        let mut h = History::new();
        h.add(make_result("1+1"));
        let before = h.clone();
        let export = h.export();
        assert_eq!(export.count, 1);
        assert_eq!(h, before);
    }

    #[test]
    fn test_export_import_roundtrip() {
        let mut h = History::new();
        for i in 0..5 {
            h.add(make_result(&format!("{i}*2")));
        }
        let json = serde_json::to_string(&h.export()).unwrap();
        let parsed: HistoryExport = serde_json::from_str(&json).unwrap();
        let restored = History::from(parsed);
        assert_eq!(restored.entries(), h.entries());
    }

    #[test]
    fn test_deserialize_truncates() {
        let mut h = History::new();
        for i in 0..HISTORY_CAPACITY {
            h.add(make_result(&i.to_string()));
        }
        let mut entries: Vec<HistoryEntry> = h.entries().to_vec();
        entries.extend(h.entries().iter().cloned());
        let json = serde_json::to_string(&entries).unwrap();
        let back: History = serde_json::from_str(&json).unwrap();
        assert_eq!(back.len(), HISTORY_CAPACITY);
    }

    #[test]
    fn test_filter() {
        let mut h = History::new();
        h.add(make_result("sin(pi)"));
        h.add(CalculationResult::success(
            OperationType::Derivative,
            "x^2",
            "2 * x",
            vec![],
        ));

        let by_type = HistoryFilter {
            operation_type: Some(OperationType::Derivative),
            ..Default::default()
        };
        assert_eq!(h.filter(&by_type).count(), 1);

        let by_term = HistoryFilter {
            search: Some("SIN".into()),
            ..Default::default()
        };
        let hits: Vec<_> = h.filter(&by_term).collect();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].expression, "sin(pi)");

        let future = HistoryFilter {
            since: Some(Utc::now() + chrono::Duration::hours(1)),
            ..Default::default()
        };
        assert_eq!(h.filter(&future).count(), 0);
    }
}
