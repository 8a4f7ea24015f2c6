use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The cabinet holds exactly one kind of tool; the singleton row keeps id 1.
pub const TOOL_ID: i64 = 1;
pub const DEFAULT_TOOL_NAME: &str = "general workshop tool";
pub const DEFAULT_TOTAL_QUANTITY: i64 = 10;
pub const DEFAULT_THRESHOLD: i64 = 2;
/// Standard weight of one tool in grams, used to turn scale readings into counts.
pub const DEFAULT_UNIT_WEIGHT: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Normal,
    LowStock,
    OutOfStock,
}

impl ToolStatus {
    /// Status is a pure function of quantity vs threshold; nothing else may set it.
    pub fn derive(quantity: i64, threshold: i64) -> Self {
        if quantity <= 0 {
            ToolStatus::OutOfStock
        } else if quantity <= threshold {
            ToolStatus::LowStock
        } else {
            ToolStatus::Normal
        }
    }
}

impl std::fmt::Display for ToolStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ToolStatus::Normal => "normal",
            ToolStatus::LowStock => "low_stock",
            ToolStatus::OutOfStock => "out_of_stock",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InventoryError {
    #[error("tool not found")]
    Uninitialized,
    #[error("quantity must be greater than zero")]
    InvalidQuantity,
    #[error("insufficient stock, {remaining} remaining")]
    InsufficientStock { remaining: i64 },
    #[error("return would exceed capacity, current: {current}, total: {total}")]
    WouldExceedCapacity { current: i64, total: i64 },
}

/// Result of a committed borrow/return mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutationOutcome {
    pub old_quantity: i64,
    pub new_quantity: i64,
    pub status: ToolStatus,
}

/// Result of a committed sensor-driven recount. `estimated_quantity` is the raw
/// scale-derived count before clamping into `[0, total]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorOutcome {
    pub estimated_quantity: i64,
    pub old_quantity: i64,
    pub new_quantity: i64,
    pub status: ToolStatus,
}

/// The single shared inventory record.
///
/// Invariant: `0 <= current_quantity <= total_quantity`, and `status` is always
/// exactly `ToolStatus::derive(current_quantity, threshold)`.
#[derive(Debug, Clone)]
pub struct ToolInventory {
    pub id: i64,
    pub name: String,
    pub total_quantity: i64,
    pub current_quantity: i64,
    pub threshold: i64,
    pub unit_weight: f64,
    pub status: ToolStatus,
    pub last_updated: DateTime<Utc>,
}

/// Read-only view handed out to status queries; excludes the sensor calibration
/// factor, which clients never see.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ToolSnapshot {
    pub id: i64,
    pub name: String,
    pub total_quantity: i64,
    pub current_quantity: i64,
    pub threshold: i64,
    pub status: ToolStatus,
    pub last_updated: DateTime<Utc>,
}

impl ToolInventory {
    pub fn new(name: impl Into<String>, total_quantity: i64, threshold: i64, unit_weight: f64) -> Self {
        let total_quantity = total_quantity.max(0);
        let threshold = threshold.max(0);
        ToolInventory {
            id: TOOL_ID,
            name: name.into(),
            total_quantity,
            current_quantity: total_quantity,
            threshold,
            unit_weight,
            status: ToolStatus::derive(total_quantity, threshold),
            last_updated: Utc::now(),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(
            DEFAULT_TOOL_NAME,
            DEFAULT_TOTAL_QUANTITY,
            DEFAULT_THRESHOLD,
            DEFAULT_UNIT_WEIGHT,
        )
    }

    pub fn snapshot(&self) -> ToolSnapshot {
        ToolSnapshot {
            id: self.id,
            name: self.name.clone(),
            total_quantity: self.total_quantity,
            current_quantity: self.current_quantity,
            threshold: self.threshold,
            status: self.status,
            last_updated: self.last_updated,
        }
    }

    fn commit(&mut self, new_quantity: i64) -> MutationOutcome {
        let old_quantity = self.current_quantity;
        self.current_quantity = new_quantity;
        self.status = ToolStatus::derive(new_quantity, self.threshold);
        self.last_updated = Utc::now();
        MutationOutcome {
            old_quantity,
            new_quantity,
            status: self.status,
        }
    }

    /// Take `quantity` tools out of the cabinet. State is untouched on failure.
    pub fn borrow(&mut self, quantity: i64) -> Result<MutationOutcome, InventoryError> {
        if quantity <= 0 {
            return Err(InventoryError::InvalidQuantity);
        }
        if self.current_quantity < quantity {
            return Err(InventoryError::InsufficientStock {
                remaining: self.current_quantity,
            });
        }
        Ok(self.commit(self.current_quantity - quantity))
    }

    /// Put `quantity` tools back. State is untouched on failure.
    pub fn give_back(&mut self, quantity: i64) -> Result<MutationOutcome, InventoryError> {
        if quantity <= 0 {
            return Err(InventoryError::InvalidQuantity);
        }
        // Checked add: a quantity near i64::MAX must fail the capacity check,
        // not wrap around it.
        match self.current_quantity.checked_add(quantity) {
            Some(new_quantity) if new_quantity <= self.total_quantity => Ok(self.commit(new_quantity)),
            _ => Err(InventoryError::WouldExceedCapacity {
                current: self.current_quantity,
                total: self.total_quantity,
            }),
        }
    }

    /// Recount from a scale reading. Sensor data is authoritative: the estimate
    /// is clamped into `[0, total_quantity]` and committed unconditionally.
    pub fn apply_sensor_reading(&mut self, current_weight: f64) -> SensorOutcome {
        // A miscalibrated unit weight would divide by zero; self-heal instead
        // of rejecting the reading.
        if self.unit_weight <= 0.0 {
            self.unit_weight = DEFAULT_UNIT_WEIGHT;
        }
        let estimated_quantity = (current_weight / self.unit_weight).floor() as i64;
        let clamped = estimated_quantity.clamp(0, self.total_quantity);
        let outcome = self.commit(clamped);
        SensorOutcome {
            estimated_quantity,
            old_quantity: outcome.old_quantity,
            new_quantity: outcome.new_quantity,
            status: outcome.status,
        }
    }
}
