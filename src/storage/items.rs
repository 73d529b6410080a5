//! Item repository for JSON storage
//!
//! Manages loading and saving inventory items to items.json

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;

use crate::error::StockpileError;
use crate::models::{Item, ItemId};

use super::file_io::{read_json, write_json_atomic};

/// Serializable item data structure
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
struct ItemData {
    items: Vec<Item>,
}

/// Repository for inventory item persistence
pub struct ItemRepository {
    path: PathBuf,
    data: RwLock<HashMap<ItemId, Item>>,
}

impl ItemRepository {
    /// Create a new item repository
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            data: RwLock::new(HashMap::new()),
        }
    }

    /// Load items from disk
    pub fn load(&self) -> Result<(), StockpileError> {
        let file_data: ItemData = read_json(&self.path)?;

        let mut data = self
            .data
            .write()
            .map_err(|e| StockpileError::Storage(format!("Failed to acquire write lock: {}", e)))?;

        data.clear();
        for item in file_data.items {
            data.insert(item.id, item);
        }

        Ok(())
    }

    /// Save items to disk
    pub fn save(&self) -> Result<(), StockpileError> {
        let data = self
            .data
            .read()
            .map_err(|e| StockpileError::Storage(format!("Failed to acquire read lock: {}", e)))?;

        let file_data = ItemData {
            items: data.values().cloned().collect(),
        };

        write_json_atomic(&self.path, &file_data)
    }

    /// Get an item by ID
    pub fn get(&self, id: ItemId) -> Result<Option<Item>, StockpileError> {
        let data = self
            .data
            .read()
            .map_err(|e| StockpileError::Storage(format!("Failed to acquire read lock: {}", e)))?;

        Ok(data.get(&id).cloned())
    }

    /// Get all items, sorted by SKU
    pub fn get_all(&self) -> Result<Vec<Item>, StockpileError> {
        let data = self
            .data
            .read()
            .map_err(|e| StockpileError::Storage(format!("Failed to acquire read lock: {}", e)))?;

        let mut items: Vec<_> = data.values().cloned().collect();
        items.sort_by(|a, b| a.sku.cmp(&b.sku));
        Ok(items)
    }

    /// Get an item by SKU (case-insensitive)
    pub fn get_by_sku(&self, sku: &str) -> Result<Option<Item>, StockpileError> {
        let data = self
            .data
            .read()
            .map_err(|e| StockpileError::Storage(format!("Failed to acquire read lock: {}", e)))?;

        let sku_lower = sku.to_lowercase();
        Ok(data
            .values()
            .find(|i| i.sku.to_lowercase() == sku_lower)
            .cloned())
    }

    /// Insert or update an item
    pub fn upsert(&self, item: Item) -> Result<(), StockpileError> {
        let mut data = self
            .data
            .write()
            .map_err(|e| StockpileError::Storage(format!("Failed to acquire write lock: {}", e)))?;

        data.insert(item.id, item);
        Ok(())
    }

    /// Replace all items with the provided set
    ///
    /// Used by full restores; the caller owns the transaction boundary.
    pub fn replace_all(&self, items: Vec<Item>) -> Result<(), StockpileError> {
        let mut data = self
            .data
            .write()
            .map_err(|e| StockpileError::Storage(format!("Failed to acquire write lock: {}", e)))?;

        data.clear();
        for item in items {
            data.insert(item.id, item);
        }
        Ok(())
    }

    /// Delete an item
    pub fn delete(&self, id: ItemId) -> Result<bool, StockpileError> {
        let mut data = self
            .data
            .write()
            .map_err(|e| StockpileError::Storage(format!("Failed to acquire write lock: {}", e)))?;

        Ok(data.remove(&id).is_some())
    }

    /// Check if a SKU is already taken
    pub fn sku_exists(&self, sku: &str, exclude_id: Option<ItemId>) -> Result<bool, StockpileError> {
        let data = self
            .data
            .read()
            .map_err(|e| StockpileError::Storage(format!("Failed to acquire read lock: {}", e)))?;

        let sku_lower = sku.to_lowercase();
        Ok(data
            .values()
            .any(|i| i.sku.to_lowercase() == sku_lower && Some(i.id) != exclude_id))
    }

    /// Count items
    pub fn count(&self) -> Result<usize, StockpileError> {
        let data = self
            .data
            .read()
            .map_err(|e| StockpileError::Storage(format!("Failed to acquire read lock: {}", e)))?;

        Ok(data.len())
    }
}
