//! Durable application state and its version migrations.
//!
//! Only `history`, `graphRange`, `userSession` and `displayMode` are
//! persisted. The JSON document carries a `version`; anything older than
//! [`STATE_VERSION`] is upgraded step by step before it is deserialized.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use tracing::{info, warn};

use crate::error::{CalcError, CalcResult};
use crate::graph::GraphRange;
use crate::history::{History, HISTORY_CAPACITY};
use crate::store::StateStore;

pub const STATE_VERSION: u32 = 1;

/// Fixed key the state document lives under.
pub const STATE_KEY: &str = "calq-state";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayMode {
    #[default]
    Calculator,
    Graph,
    History,
    Image,
}

impl fmt::Display for DisplayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Calculator => write!(f, "calculator"),
            Self::Graph => write!(f, "graph"),
            Self::History => write!(f, "history"),
            Self::Image => write!(f, "image"),
        }
    }
}

impl std::str::FromStr for DisplayMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "calculator" => Ok(Self::Calculator),
            "graph" => Ok(Self::Graph),
            "history" => Ok(Self::History),
            "image" => Ok(Self::Image),
            _ => Err(format!("invalid display mode: {s}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedState {
    pub version: u32,
    pub history: History,
    pub graph_range: GraphRange,
    pub user_session: String,
    pub display_mode: DisplayMode,
    /// Fields written by other versions, carried through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for PersistedState {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            history: History::new(),
            graph_range: GraphRange::DEFAULT,
            user_session: new_session_token(),
            display_mode: DisplayMode::default(),
            extra: Map::new(),
        }
    }
}

impl PersistedState {
    pub fn to_json(&self) -> CalcResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a stored document, migrating it first if it is older.
    pub fn from_json(raw: &str) -> CalcResult<Migrated> {
        let value: Value = serde_json::from_str(raw)?;
        migrate(value)
    }
}

/// Outcome of loading a document: the current-version state, the version
/// it was stored with and whether invalid fields were reset.
#[derive(Debug)]
pub struct Migrated {
    pub state: PersistedState,
    pub from_version: u32,
    pub repaired: bool,
}

impl Migrated {
    /// Whether the stored document differs from `state` and should be
    /// written back.
    pub fn was_upgraded(&self) -> bool {
        self.from_version < STATE_VERSION || self.repaired
    }
}

/// Opaque random token identifying one user session.
pub fn new_session_token() -> String {
    ulid::Ulid::new().to_string().to_lowercase()
}

type Upgrade = fn(&mut Map<String, Value>) -> CalcResult<()>;

/// `UPGRADES[v]` turns a version `v` document into version `v + 1`.
const UPGRADES: [Upgrade; STATE_VERSION as usize] = [upgrade_v0];

pub fn migrate(value: Value) -> CalcResult<Migrated> {
    let mut doc = match value {
        Value::Object(map) => map,
        other => {
            return Err(CalcError::Migration(format!(
                "state must be a JSON object, found {}",
                json_kind(&other)
            )))
        }
    };

    // Older layouts wrapped everything as {"state": {...}, "version": n}.
    if !doc.contains_key("history") {
        if let Some(Value::Object(inner)) = doc.remove("state") {
            let outer_version = doc.remove("version");
            let mut unwrapped = inner;
            if let Some(v) = outer_version {
                unwrapped.entry("version").or_insert(v);
            }
            for (k, v) in doc {
                unwrapped.entry(k).or_insert(v);
            }
            doc = unwrapped;
        }
    }

    let from_version = match doc.get("version") {
        None | Some(Value::Null) => 0,
        Some(v) => v
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| CalcError::Migration(format!("invalid version marker: {v}")))?,
    };
    if from_version > STATE_VERSION {
        return Err(CalcError::Migration(format!(
            "state version {from_version} is newer than supported version {STATE_VERSION}"
        )));
    }

    for version in from_version..STATE_VERSION {
        UPGRADES[version as usize](&mut doc)?;
        doc.insert("version".into(), Value::from(version + 1));
        info!("migrated persisted state from v{version} to v{}", version + 1);
    }

    let repaired = repair_range(&mut doc)?;
    let state: PersistedState = serde_json::from_value(Value::Object(doc))?;
    Ok(Migrated {
        state,
        from_version,
        repaired,
    })
}

/// Reset an inverted or non-finite `graphRange` to the default, whatever
/// version wrote it. Returns whether the document changed.
fn repair_range(doc: &mut Map<String, Value>) -> CalcResult<bool> {
    let Some(raw) = doc.get("graphRange") else {
        return Ok(false);
    };
    if serde_json::from_value::<GraphRange>(raw.clone()).is_ok() {
        return Ok(false);
    }
    warn!("resetting invalid graph range {raw} to the default");
    doc.insert(
        "graphRange".into(),
        serde_json::to_value(GraphRange::DEFAULT)?,
    );
    Ok(true)
}

/// v0 documents were written without a version and with loosely typed
/// fields: numeric ids and epoch-millisecond timestamps, missing keys.
fn upgrade_v0(doc: &mut Map<String, Value>) -> CalcResult<()> {
    let history = match doc.remove("history") {
        Some(Value::Array(items)) => items,
        Some(Value::Null) | None => Vec::new(),
        Some(other) => {
            return Err(CalcError::Migration(format!(
                "history must be an array, found {}",
                json_kind(&other)
            )))
        }
    };

    let mut upgraded = Vec::with_capacity(history.len().min(HISTORY_CAPACITY));
    for (idx, item) in history.into_iter().enumerate() {
        match upgrade_entry_v0(item) {
            Some(entry) => upgraded.push(Value::Object(entry)),
            None => warn!("dropping malformed history entry #{idx} during migration"),
        }
    }
    upgraded.truncate(HISTORY_CAPACITY);
    doc.insert("history".into(), Value::Array(upgraded));

    let range_ok = doc
        .get("graphRange")
        .is_some_and(|v| serde_json::from_value::<GraphRange>(v.clone()).is_ok());
    if !range_ok {
        doc.insert(
            "graphRange".into(),
            serde_json::to_value(GraphRange::DEFAULT)?,
        );
    }

    let session_ok = doc
        .get("userSession")
        .and_then(Value::as_str)
        .is_some_and(|s| !s.is_empty());
    if !session_ok {
        doc.insert("userSession".into(), Value::from(new_session_token()));
    }

    let mode_ok = doc
        .get("displayMode")
        .and_then(Value::as_str)
        .is_some_and(|s| s.parse::<DisplayMode>().is_ok());
    if !mode_ok {
        doc.insert(
            "displayMode".into(),
            Value::from(DisplayMode::default().to_string()),
        );
    }

    Ok(())
}

fn upgrade_entry_v0(item: Value) -> Option<Map<String, Value>> {
    let Value::Object(mut entry) = item else {
        return None;
    };

    for key in ["expression", "result"] {
        if !entry.get(key).is_some_and(Value::is_string) {
            return None;
        }
    }

    let id = match entry.remove("id") {
        Some(Value::String(s)) if !s.is_empty() => s,
        Some(Value::Number(n)) => n.to_string(),
        _ => ulid::Ulid::new().to_string(),
    };
    entry.insert("id".into(), Value::from(id));

    let timestamp = match entry.remove("timestamp") {
        Some(Value::String(s)) => DateTime::parse_from_rfc3339(&s)
            .map(|d| d.with_timezone(&Utc))
            .ok(),
        Some(Value::Number(n)) => n
            .as_i64()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        _ => None,
    }
    .unwrap_or_else(Utc::now);
    entry.insert("timestamp".into(), Value::from(timestamp.to_rfc3339()));

    let op_ok = entry
        .get("operationType")
        .and_then(Value::as_str)
        .is_some_and(|s| s.parse::<crate::result::OperationType>().is_ok());
    if !op_ok {
        match entry.get("operationType") {
            None | Some(Value::Null) => {
                entry.insert("operationType".into(), Value::from("basic"));
            }
            Some(_) => return None,
        }
    } else if let Some(Value::String(s)) = entry.get_mut("operationType") {
        *s = s.to_lowercase();
    }

    if !entry.get("steps").is_some_and(Value::is_array) {
        entry.insert("steps".into(), Value::Array(Vec::new()));
    }
    if entry.get("graphData").is_some_and(Value::is_null) {
        entry.remove("graphData");
    }
    Some(entry)
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Read the state from `store`, migrating and writing back older versions.
/// A missing document yields a fresh default state.
pub fn load_state(store: &dyn StateStore) -> CalcResult<PersistedState> {
    let Some(raw) = store.load(STATE_KEY)? else {
        return Ok(PersistedState::default());
    };
    let migrated = PersistedState::from_json(&raw)?;
    if migrated.was_upgraded() {
        save_state(store, &migrated.state)?;
    }
    Ok(migrated.state)
}

pub fn save_state(store: &dyn StateStore, state: &PersistedState) -> CalcResult<()> {
    store.save(STATE_KEY, &state.to_json()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::{CalculationResult, OperationType};
    use serde_json::json;
    use std::cell::RefCell;
    use std::collections::HashMap;

    #[derive(Default)]
    struct MapStore(RefCell<HashMap<String, String>>);

    impl StateStore for MapStore {
        fn load(&self, key: &str) -> CalcResult<Option<String>> {
            Ok(self.0.borrow().get(key).cloned())
        }

        fn save(&self, key: &str, value: &str) -> CalcResult<()> {
            self.0.borrow_mut().insert(key.into(), value.into());
            Ok(())
        }

        fn remove(&self, key: &str) -> CalcResult<()> {
            self.0.borrow_mut().remove(key);
            Ok(())
        }
    }

    #[test]
    fn test_current_version_roundtrip() {
        let mut state = PersistedState::default();
        state.history.add(CalculationResult::success(
            OperationType::Basic,
            "2+2",
            "4",
            vec!["Input: 2+2".into()],
        ));
        state.display_mode = DisplayMode::Graph;

        let json = state.to_json().unwrap();
        let migrated = PersistedState::from_json(&json).unwrap();
        assert!(!migrated.was_upgraded());
        assert_eq!(migrated.state, state);
    }

    #[test]
    fn test_v0_is_upgraded() {
        let doc = json!({
            "history": [
                {
                    "id": 1700000000000u64,
                    "expression": "1+1",
                    "result": "2",
                    "operationType": "basic",
                    "timestamp": 1700000000000u64
                },
                { "expression": "x^2", "result": "2 * x", "operationType": "derivative", "steps": ["a"] }
            ],
            "graphRange": [-5, 5],
            "userSession": "abc123xyz",
            "displayMode": "history"
        });
        let migrated = migrate(doc).unwrap();
        assert_eq!(migrated.from_version, 0);
        let state = migrated.state;
        assert_eq!(state.version, STATE_VERSION);
        assert_eq!(state.history.len(), 2);
        assert_eq!(state.history.entries()[0].id, "1700000000000");
        assert_eq!(state.history.entries()[0].timestamp.timestamp(), 1_700_000_000);
        assert_eq!(state.graph_range, GraphRange { min: -5.0, max: 5.0 });
        assert_eq!(state.user_session, "abc123xyz");
        assert_eq!(state.display_mode, DisplayMode::History);
    }

    #[test]
    fn test_current_version_with_inverted_range_is_reset() {
        let mut doc = serde_json::to_value(PersistedState::default()).unwrap();
        doc["graphRange"] = json!([5, -5]);
        let migrated = migrate(doc).unwrap();
        assert_eq!(migrated.from_version, STATE_VERSION);
        assert!(migrated.repaired);
        assert!(migrated.was_upgraded());
        assert_eq!(migrated.state.graph_range, GraphRange::DEFAULT);
    }

    #[test]
    fn test_load_state_writes_back_repaired_range() {
        let store = MapStore::default();
        let mut doc = serde_json::to_value(PersistedState::default()).unwrap();
        doc["graphRange"] = json!([5, -5]);
        store.save(STATE_KEY, &doc.to_string()).unwrap();

        let state = load_state(&store).unwrap();
        assert_eq!(state.graph_range, GraphRange::DEFAULT);
        let stored: Value = serde_json::from_str(&store.load(STATE_KEY).unwrap().unwrap()).unwrap();
        assert_eq!(stored["graphRange"], json!([-10.0, 10.0]));
    }

    #[test]
    fn test_v0_fills_defaults() {
        let migrated = migrate(json!({})).unwrap();
        let state = migrated.state;
        assert!(state.history.is_empty());
        assert_eq!(state.graph_range, GraphRange::DEFAULT);
        assert!(!state.user_session.is_empty());
        assert_eq!(state.display_mode, DisplayMode::Calculator);
    }

    #[test]
    fn test_legacy_wrapper_unwrapped() {
        let doc = json!({
            "state": {
                "history": [],
                "graphRange": [-10, 10],
                "userSession": "k2j3h4g5f",
                "displayMode": "calculator"
            },
            "version": 0
        });
        let state = migrate(doc).unwrap().state;
        assert_eq!(state.user_session, "k2j3h4g5f");
        assert_eq!(state.version, STATE_VERSION);
    }

    #[test]
    fn test_unknown_fields_preserved() {
        let doc = json!({
            "history": [],
            "theme": "dark",
            "settings": { "decimalPlaces": 4 }
        });
        let state = migrate(doc).unwrap().state;
        assert_eq!(state.extra.get("theme"), Some(&json!("dark")));

        let reparsed = PersistedState::from_json(&state.to_json().unwrap()).unwrap();
        assert_eq!(reparsed.state.extra.get("settings"), Some(&json!({ "decimalPlaces": 4 })));
    }

    #[test]
    fn test_malformed_entries_dropped() {
        let doc = json!({
            "history": [
                "not an entry",
                { "expression": "1", "result": "1", "operationType": "mystery" },
                { "expression": "2", "result": "2" }
            ]
        });
        let state = migrate(doc).unwrap().state;
        assert_eq!(state.history.len(), 1);
        assert_eq!(state.history.entries()[0].operation_type, OperationType::Basic);
    }

    #[test]
    fn test_future_version_rejected() {
        let doc = json!({ "version": STATE_VERSION + 1, "history": [] });
        assert!(matches!(migrate(doc), Err(CalcError::Migration(_))));
    }

    #[test]
    fn test_non_object_rejected() {
        assert!(matches!(migrate(json!([1, 2])), Err(CalcError::Migration(_))));
    }

    #[test]
    fn test_load_state_missing_returns_default() {
        let store = MapStore::default();
        let state = load_state(&store).unwrap();
        assert_eq!(state.version, STATE_VERSION);
        assert!(store.load(STATE_KEY).unwrap().is_none());
    }

    #[test]
    fn test_load_state_writes_back_upgrade() {
        let store = MapStore::default();
        store
            .save(STATE_KEY, r#"{"history":[],"displayMode":"graph"}"#)
            .unwrap();
        let state = load_state(&store).unwrap();
        assert_eq!(state.display_mode, DisplayMode::Graph);

        let raw = store.load(STATE_KEY).unwrap().unwrap();
        let stored: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(stored["version"], json!(STATE_VERSION));
    }
}
