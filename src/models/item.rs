//! Inventory item model
//!
//! Represents a single stocked item. The SKU is the natural key used for
//! merge-restore matching and duplicate detection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::ItemId;

/// A single inventory item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// Unique identifier
    pub id: ItemId,

    /// Stock keeping unit, unique across the inventory
    pub sku: String,

    /// Item name (e.g., "M6 hex bolt, 20mm")
    pub name: String,

    /// Free-form description
    #[serde(default)]
    pub description: String,

    /// Quantity on hand
    pub quantity: i64,

    /// Unit price in cents
    pub unit_price_cents: i64,

    /// Storage location (e.g., "Aisle 3, Bin 12")
    #[serde(default)]
    pub location: String,

    /// Whether this item is archived (soft-deleted)
    #[serde(default)]
    pub archived: bool,

    /// When the item was created
    pub created_at: DateTime<Utc>,

    /// When the item was last modified
    pub updated_at: DateTime<Utc>,
}

impl Item {
    /// Create a new item with default values
    pub fn new(sku: impl Into<String>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: ItemId::new(),
            sku: sku.into(),
            name: name.into(),
            description: String::new(),
            quantity: 0,
            unit_price_cents: 0,
            location: String::new(),
            archived: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Create a new item with an initial quantity and price
    pub fn with_stock(
        sku: impl Into<String>,
        name: impl Into<String>,
        quantity: i64,
        unit_price_cents: i64,
    ) -> Self {
        let mut item = Self::new(sku, name);
        item.quantity = quantity;
        item.unit_price_cents = unit_price_cents;
        item
    }

    /// Adjust the quantity on hand by a delta (negative for removals)
    pub fn adjust_quantity(&mut self, delta: i64) {
        self.quantity += delta;
        self.updated_at = Utc::now();
    }

    /// Mark this item as archived
    pub fn archive(&mut self) {
        self.archived = true;
        self.updated_at = Utc::now();
    }

    /// Validate the item
    pub fn validate(&self) -> Result<(), ItemValidationError> {
        if self.sku.trim().is_empty() {
            return Err(ItemValidationError::EmptySku);
        }

        if self.name.trim().is_empty() {
            return Err(ItemValidationError::EmptyName);
        }

        if self.name.len() > 200 {
            return Err(ItemValidationError::NameTooLong(self.name.len()));
        }

        if self.quantity < 0 {
            return Err(ItemValidationError::NegativeQuantity(self.quantity));
        }

        Ok(())
    }

    /// Compare business fields only, ignoring id and timestamps
    ///
    /// Two items from different snapshots describe the same state when the
    /// SKU and every user-visible field match. Used to classify merge-restore
    /// rows as updated vs skipped.
    pub fn content_eq(&self, other: &Item) -> bool {
        self.sku == other.sku
            && self.name == other.name
            && self.description == other.description
            && self.quantity == other.quantity
            && self.unit_price_cents == other.unit_price_cents
            && self.location == other.location
            && self.archived == other.archived
    }
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.sku)
    }
}

/// Validation errors for inventory items
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemValidationError {
    EmptySku,
    EmptyName,
    NameTooLong(usize),
    NegativeQuantity(i64),
}

impl fmt::Display for ItemValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptySku => write!(f, "Item SKU cannot be empty"),
            Self::EmptyName => write!(f, "Item name cannot be empty"),
            Self::NameTooLong(len) => {
                write!(f, "Item name too long ({} chars, max 200)", len)
            }
            Self::NegativeQuantity(qty) => {
                write!(f, "Item quantity cannot be negative (got {})", qty)
            }
        }
    }
}

impl std::error::Error for ItemValidationError {}
