use crate::error::CalcResult;

/// Durable key-value storage for the persisted state document.
pub trait StateStore {
    fn load(&self, key: &str) -> CalcResult<Option<String>>;
    fn save(&self, key: &str, value: &str) -> CalcResult<()>;
    fn remove(&self, key: &str) -> CalcResult<()>;
}
