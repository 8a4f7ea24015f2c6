use tokio::sync::Mutex;

use crate::inventory::{
    InventoryError, MutationOutcome, SensorOutcome, ToolInventory, ToolSnapshot,
};

/// Owns the singleton [`ToolInventory`] and serializes every read and mutation
/// behind one lock. With exactly one row there is nothing finer-grained to
/// protect; the lock is the system-wide serialization point, so concurrent
/// borrow/return/sensor requests observe a strict sequence of states and a
/// status is never read torn from the quantity it was derived from.
///
/// Nothing slow ever runs under the lock: history recording and all socket
/// writes happen after the outcome has been returned.
pub struct InventoryStore {
    tool: Mutex<Option<ToolInventory>>,
}

impl InventoryStore {
    /// An empty store; status queries answer "tool not found" until seeded.
    pub fn empty() -> Self {
        InventoryStore { tool: Mutex::new(None) }
    }

    pub fn new(tool: ToolInventory) -> Self {
        InventoryStore { tool: Mutex::new(Some(tool)) }
    }

    pub fn with_defaults() -> Self {
        Self::new(ToolInventory::with_defaults())
    }

    pub async fn snapshot(&self) -> Option<ToolSnapshot> {
        self.tool.lock().await.as_ref().map(ToolInventory::snapshot)
    }

    pub async fn borrow(&self, quantity: i64) -> Result<MutationOutcome, InventoryError> {
        let mut guard = self.tool.lock().await;
        let tool = guard.as_mut().ok_or(InventoryError::Uninitialized)?;
        tool.borrow(quantity)
    }

    pub async fn give_back(&self, quantity: i64) -> Result<MutationOutcome, InventoryError> {
        let mut guard = self.tool.lock().await;
        let tool = guard.as_mut().ok_or(InventoryError::Uninitialized)?;
        tool.give_back(quantity)
    }

    pub async fn apply_sensor_reading(
        &self,
        current_weight: f64,
    ) -> Result<SensorOutcome, InventoryError> {
        let mut guard = self.tool.lock().await;
        let tool = guard.as_mut().ok_or(InventoryError::Uninitialized)?;
        Ok(tool.apply_sensor_reading(current_weight))
    }
}
