//! Application state machine.
//!
//! [`App`] owns all state and is the only thing that mutates it. Durable
//! fields live in [`PersistedState`] and are written back after every
//! change; [`Transient`] fields are rebuilt empty on each start.

use tracing::{debug, info};

use calq_core::{
    load_state, new_session_token, save_state, CalcResult, CalculationResult, DisplayMode,
    GraphRange, GraphSeries, History, HistoryExport, PersistedState, StateStore, STATE_KEY,
};
use calq_engine::Engine;

/// State that never survives a restart.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transient {
    pub current_expression: String,
    pub current_result: Option<CalculationResult>,
    pub is_calculating: bool,
    pub error: Option<String>,
    pub graph_data: Option<GraphSeries>,
    pub uploaded_image: Option<String>,
    pub image_analysis_result: Option<String>,
}

pub struct App<'s> {
    store: &'s dyn StateStore,
    engine: Engine,
    persisted: PersistedState,
    transient: Transient,
}

impl<'s> App<'s> {
    /// Load persisted state from `store`, upgrading older layouts.
    pub fn load(store: &'s dyn StateStore, engine: Engine) -> CalcResult<Self> {
        let persisted = load_state(store)?;
        debug!(
            history = persisted.history.len(),
            mode = %persisted.display_mode,
            "state loaded"
        );
        Ok(Self {
            store,
            engine,
            persisted,
            transient: Transient::default(),
        })
    }

    fn persist(&self) -> CalcResult<()> {
        save_state(self.store, &self.persisted)
    }

    pub fn transient(&self) -> &Transient {
        &self.transient
    }

    pub fn history(&self) -> &History {
        &self.persisted.history
    }

    pub fn graph_range(&self) -> GraphRange {
        self.persisted.graph_range
    }

    pub fn display_mode(&self) -> DisplayMode {
        self.persisted.display_mode
    }

    pub fn user_session(&self) -> &str {
        &self.persisted.user_session
    }

    // ------------------------------------------------------------------------
    // Expression input
    // ------------------------------------------------------------------------

    pub fn set_expression(&mut self, expression: impl Into<String>) {
        self.transient.current_expression = expression.into();
    }

    pub fn append_to_expression(&mut self, text: &str) {
        self.transient.current_expression.push_str(text);
    }

    pub fn clear_expression(&mut self) {
        self.transient.current_expression.clear();
        self.transient.current_result = None;
        self.transient.error = None;
    }

    /// Reset every transient field. History and settings are kept.
    pub fn clear_all(&mut self) {
        self.transient = Transient::default();
    }

    pub fn set_calculating(&mut self, calculating: bool) {
        self.transient.is_calculating = calculating;
    }

    pub fn set_error(&mut self, error: Option<String>) {
        self.transient.error = error;
    }

    // ------------------------------------------------------------------------
    // Calculations
    // ------------------------------------------------------------------------

    /// Record a finished calculation. Failures only set `error`; successes
    /// clear it, land in history and are persisted.
    pub fn commit(&mut self, result: CalculationResult) -> CalcResult<&CalculationResult> {
        self.transient.is_calculating = false;
        if let Some(error) = &result.error {
            self.transient.error = Some(error.clone());
        } else {
            self.transient.error = None;
            if let Some(series) = &result.graph_data {
                self.transient.graph_data = Some(series.clone());
            }
            self.persisted.history.add(result.clone());
            self.persist()?;
        }
        Ok(self.transient.current_result.insert(result))
    }

    /// Run one engine operation and commit its result.
    pub fn run(
        &mut self,
        op: impl FnOnce(&Engine) -> CalculationResult,
    ) -> CalcResult<&CalculationResult> {
        self.set_calculating(true);
        let result = op(&self.engine);
        self.commit(result)
    }

    /// Evaluate the current expression.
    pub fn evaluate(&mut self) -> CalcResult<&CalculationResult> {
        let expression = self.transient.current_expression.clone();
        self.run(|engine| engine.evaluate_expression(&expression))
    }

    // ------------------------------------------------------------------------
    // Display and graph
    // ------------------------------------------------------------------------

    pub fn set_display_mode(&mut self, mode: DisplayMode) -> CalcResult<()> {
        self.persisted.display_mode = mode;
        self.persist()
    }

    pub fn set_graph_data(&mut self, series: Option<GraphSeries>) {
        self.transient.graph_data = series;
    }

    pub fn set_graph_range(&mut self, range: GraphRange) -> CalcResult<()> {
        self.persisted.graph_range = range;
        self.persist()
    }

    pub fn zoom_in(&mut self) -> CalcResult<GraphRange> {
        let range = self.persisted.graph_range.zoom_in();
        self.set_graph_range(range)?;
        Ok(range)
    }

    pub fn zoom_out(&mut self) -> CalcResult<GraphRange> {
        let range = self.persisted.graph_range.zoom_out();
        self.set_graph_range(range)?;
        Ok(range)
    }

    /// Back to `[-10, 10]` with no series.
    pub fn reset_graph(&mut self) -> CalcResult<()> {
        self.transient.graph_data = None;
        self.set_graph_range(GraphRange::DEFAULT)
    }

    // ------------------------------------------------------------------------
    // Image analysis
    // ------------------------------------------------------------------------

    pub fn set_uploaded_image(&mut self, image_base64: Option<String>) {
        self.transient.uploaded_image = image_base64;
        self.transient.image_analysis_result = None;
    }

    pub fn set_image_analysis_result(&mut self, text: Option<String>) {
        self.transient.image_analysis_result = text;
    }

    // ------------------------------------------------------------------------
    // Session and history
    // ------------------------------------------------------------------------

    pub fn generate_user_session(&mut self) -> CalcResult<&str> {
        self.persisted.user_session = new_session_token();
        self.persist()?;
        info!(session = %self.persisted.user_session, "new session");
        Ok(&self.persisted.user_session)
    }

    pub fn remove_history(&mut self, id: &str) -> CalcResult<bool> {
        let removed = self.persisted.history.remove(id);
        if removed {
            self.persist()?;
        }
        Ok(removed)
    }

    pub fn clear_history(&mut self) -> CalcResult<()> {
        self.persisted.history.clear();
        self.persist()
    }

    pub fn export_history(&self) -> HistoryExport {
        self.persisted.history.export()
    }

    /// Delete the stored document and start over with fresh defaults and a
    /// new session. Nothing is written until the next change.
    pub fn forget(&mut self) -> CalcResult<()> {
        self.store.remove(STATE_KEY)?;
        self.persisted = PersistedState::default();
        self.transient = Transient::default();
        info!(session = %self.persisted.user_session, "saved state removed");
        Ok(())
    }

    /// Replace the history with an exported snapshot.
    pub fn import_history(&mut self, export: HistoryExport) -> CalcResult<usize> {
        self.persisted.history = History::from(export);
        self.persist()?;
        Ok(self.persisted.history.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calq_core::{OperationType, HISTORY_CAPACITY};
    use calq_store::SqliteStore;

    fn app(store: &SqliteStore) -> App<'_> {
        App::load(store, Engine::default()).unwrap()
    }

    #[test]
    fn test_success_commits_and_clears_error() {
        let store = SqliteStore::in_memory().unwrap();
        let mut app = app(&store);
        app.set_error(Some("stale".into()));
        app.set_expression("1 + ");
        app.append_to_expression("2");
        let result = app.evaluate().unwrap();
        assert_eq!(result.result, "3");
        assert!(app.transient().error.is_none());
        assert!(!app.transient().is_calculating);
        assert_eq!(app.history().len(), 1);
    }

    #[test]
    fn test_failure_sets_error_without_history() {
        let store = SqliteStore::in_memory().unwrap();
        let mut app = app(&store);
        app.set_expression("2 +");
        app.evaluate().unwrap();
        assert!(app.transient().error.as_deref().unwrap().starts_with("calculation error"));
        assert!(app.history().is_empty());

        // the next success replaces it
        app.set_expression("2");
        app.evaluate().unwrap();
        assert!(app.transient().error.is_none());
    }

    #[test]
    fn test_graph_result_sets_graph_data() {
        let store = SqliteStore::in_memory().unwrap();
        let mut app = app(&store);
        let range = app.graph_range();
        app.run(|e| e.generate_graph("x^2", range)).unwrap();
        assert!(app.transient().graph_data.is_some());
        assert_eq!(app.history().entries()[0].operation_type, OperationType::Graph);

        app.reset_graph().unwrap();
        assert!(app.transient().graph_data.is_none());
        assert_eq!(app.graph_range(), GraphRange::DEFAULT);
    }

    #[test]
    fn test_only_durable_fields_survive_reload() {
        let store = SqliteStore::in_memory().unwrap();
        let session = {
            let mut app = app(&store);
            app.set_expression("sin(0)");
            app.evaluate().unwrap();
            app.zoom_in().unwrap();
            app.set_display_mode(DisplayMode::History).unwrap();
            app.set_uploaded_image(Some("aGk=".into()));
            app.user_session().to_string()
        };

        let app = app(&store);
        assert_eq!(app.history().len(), 1);
        assert!((app.graph_range().width() - 14.0).abs() < 1e-12);
        assert_eq!(app.display_mode(), DisplayMode::History);
        assert_eq!(app.user_session(), session);
        assert_eq!(*app.transient(), Transient::default());
    }

    #[test]
    fn test_history_capacity_through_app() {
        let store = SqliteStore::in_memory().unwrap();
        let mut app = app(&store);
        for i in 0..(HISTORY_CAPACITY + 5) {
            app.set_expression(format!("{i} + 0"));
            app.evaluate().unwrap();
        }
        assert_eq!(app.history().len(), HISTORY_CAPACITY);
        assert_eq!(app.history().entries()[0].result, (HISTORY_CAPACITY + 4).to_string());
    }

    #[test]
    fn test_export_import_round_trip() {
        let store = SqliteStore::in_memory().unwrap();
        let mut app = app(&store);
        for expr in ["1 + 1", "2 * 3", "sqrt(81)"] {
            app.set_expression(expr);
            app.evaluate().unwrap();
        }
        let export = app.export_history();
        let json = serde_json::to_string(&export).unwrap();

        app.clear_history().unwrap();
        assert!(app.history().is_empty());

        let back: HistoryExport = serde_json::from_str(&json).unwrap();
        assert_eq!(app.import_history(back).unwrap(), 3);
        assert_eq!(app.history().entries(), export.entries.as_slice());
    }

    #[test]
    fn test_remove_and_new_session() {
        let store = SqliteStore::in_memory().unwrap();
        let mut app = app(&store);
        app.set_expression("1");
        let id = app.evaluate().unwrap().expression.clone();
        assert!(!app.remove_history("missing").unwrap());
        let entry_id = app.history().entries()[0].id.clone();
        assert!(app.remove_history(&entry_id).unwrap());
        assert_eq!(id, "1");

        let before = app.user_session().to_string();
        let after = app.generate_user_session().unwrap().to_string();
        assert_ne!(before, after);
    }

    #[test]
    fn test_forget_removes_the_stored_document() {
        let store = SqliteStore::in_memory().unwrap();
        let old_session = {
            let mut app = app(&store);
            app.set_expression("2 + 2");
            app.evaluate().unwrap();
            app.zoom_out().unwrap();
            app.set_display_mode(DisplayMode::Graph).unwrap();
            let session = app.user_session().to_string();
            app.forget().unwrap();
            assert!(app.history().is_empty());
            assert_eq!(*app.transient(), Transient::default());
            session
        };
        assert!(store.load(STATE_KEY).unwrap().is_none());

        let app = app(&store);
        assert!(app.history().is_empty());
        assert_eq!(app.graph_range(), GraphRange::DEFAULT);
        assert_eq!(app.display_mode(), DisplayMode::Calculator);
        assert_ne!(app.user_session(), old_session);
    }

    #[test]
    fn test_clear_all_keeps_history() {
        let store = SqliteStore::in_memory().unwrap();
        let mut app = app(&store);
        app.set_expression("4");
        app.evaluate().unwrap();
        app.set_image_analysis_result(Some("x = 4".into()));
        app.clear_all();
        assert_eq!(*app.transient(), Transient::default());
        assert_eq!(app.history().len(), 1);
    }
}
