pub mod backend;
pub mod error;
pub mod graph;
pub mod history;
pub mod normalize;
pub mod result;
pub mod state;
pub mod store;
pub mod value;

pub use backend::{Bindings, CompiledExpr, MathBackend};
pub use error::{CalcError, CalcResult};
pub use graph::{GraphRange, GraphSeries};
pub use history::{History, HistoryEntry, HistoryExport, HistoryFilter, HISTORY_CAPACITY};
pub use normalize::normalize;
pub use result::{CalculationResult, OperationType};
pub use state::{
    load_state, migrate, new_session_token, save_state, DisplayMode, Migrated, PersistedState,
    STATE_KEY, STATE_VERSION,
};
pub use store::StateStore;
pub use value::{format_decimals, format_number, Matrix, Value};
