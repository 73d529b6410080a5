//! Advisory scope locks
//!
//! In-process lock registry keyed by dataset section. At most one backup
//! creation and at most one restore may run against the same sections at a
//! time; a second overlapping operation is rejected with a conflict error
//! rather than queued. Disjoint scopes proceed in parallel.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::error::{StockpileError, StockpileResult};

/// Cheap cloneable handle to a shared registry of held dataset sections
///
/// The backup and restore services hold clones of the same handle, so they
/// exclude each other.
#[derive(Debug, Clone, Default)]
pub struct ScopeLocks {
    held: Arc<Mutex<HashMap<String, String>>>,
}

impl ScopeLocks {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire all requested sections or fail with a conflict
    ///
    /// All-or-nothing: if any section is already held, nothing is acquired
    /// and the error names the operation holding it.
    pub fn acquire(
        &self,
        operation: &str,
        sections: &[&'static str],
    ) -> StockpileResult<ScopeLockGuard> {
        let mut held = self
            .held
            .lock()
            .map_err(|e| StockpileError::Storage(format!("Scope lock poisoned: {}", e)))?;

        for section in sections {
            if let Some(holder) = held.get(*section) {
                return Err(StockpileError::Conflict(format!(
                    "Section '{}' is locked by a running {}",
                    section, holder
                )));
            }
        }

        for section in sections {
            held.insert((*section).to_string(), operation.to_string());
        }

        Ok(ScopeLockGuard {
            registry: self.clone(),
            sections: sections.iter().map(|s| s.to_string()).collect(),
        })
    }

    /// Sections currently held (for diagnostics)
    pub fn held_sections(&self) -> Vec<String> {
        self.held
            .lock()
            .map(|held| {
                let mut sections: Vec<_> = held.keys().cloned().collect();
                sections.sort();
                sections
            })
            .unwrap_or_default()
    }

    fn release(&self, sections: &[String]) {
        if let Ok(mut held) = self.held.lock() {
            for section in sections {
                held.remove(section);
            }
        }
    }
}

/// RAII guard releasing its sections on drop
#[derive(Debug)]
pub struct ScopeLockGuard {
    registry: ScopeLocks,
    sections: Vec<String>,
}

impl Drop for ScopeLockGuard {
    fn drop(&mut self) {
        self.registry.release(&self.sections);
    }
}
