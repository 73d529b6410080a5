//! Inventory CLI commands
//!
//! Minimal CRUD surface over the item repository so the dataset the backup
//! engine protects is reachable from the command line.

use clap::Subcommand;

use crate::audit::{AuditAction, AuditEntry, AuditOutcome};
use crate::config::Settings;
use crate::error::{StockpileError, StockpileResult};
use crate::models::Item;

use super::{current_actor, Engine};

/// Item subcommands
#[derive(Subcommand)]
pub enum ItemCommands {
    /// Add a new inventory item
    Add {
        /// Stock keeping unit (unique)
        sku: String,
        /// Item name
        name: String,
        /// Initial quantity
        #[arg(short, long, default_value = "0")]
        quantity: i64,
        /// Unit price in cents
        #[arg(short, long, default_value = "0")]
        price: i64,
        /// Storage location
        #[arg(short, long, default_value = "")]
        location: String,
        /// Description
        #[arg(short, long, default_value = "")]
        description: String,
    },

    /// List inventory items
    List {
        /// Include archived items
        #[arg(long)]
        all: bool,
    },

    /// Adjust an item's quantity by a delta
    Adjust {
        /// Item SKU
        sku: String,
        /// Quantity delta (negative for removals)
        delta: i64,
    },

    /// Archive an item (soft delete)
    Remove {
        /// Item SKU
        sku: String,
    },
}

/// Handle an item command
pub fn handle_item_command(
    engine: &Engine,
    settings: &Settings,
    cmd: ItemCommands,
) -> StockpileResult<()> {
    let actor = current_actor(settings);

    match cmd {
        ItemCommands::Add {
            sku,
            name,
            quantity,
            price,
            location,
            description,
        } => {
            if engine.storage.items.sku_exists(&sku, None)? {
                return Err(StockpileError::Duplicate {
                    entity_type: "Item",
                    identifier: sku,
                });
            }

            let mut item = Item::with_stock(&sku, &name, quantity, price);
            item.location = location;
            item.description = description;
            item.validate()
                .map_err(|e| StockpileError::Validation(e.to_string()))?;

            engine.storage.items.upsert(item.clone())?;
            engine.storage.items.save()?;

            engine.audit.log(
                &AuditEntry::new(&actor, AuditAction::ItemCreated, AuditOutcome::Success)
                    .with_entity(item.id.to_string())
                    .with_detail(format!("{} ({})", item.name, item.sku)),
            )?;

            println!("Added {} ({})", item.name, item.sku);
        }

        ItemCommands::List { all } => {
            let items = engine.storage.items.get_all()?;
            let items: Vec<_> = items
                .into_iter()
                .filter(|i| all || !i.archived)
                .collect();

            if items.is_empty() {
                println!("No items found.");
                return Ok(());
            }

            println!(
                "{:<16} {:<30} {:>8} {:>10}  {}",
                "SKU", "Name", "Qty", "Price", "Location"
            );
            for item in &items {
                println!(
                    "{:<16} {:<30} {:>8} {:>9.2}  {}{}",
                    item.sku,
                    item.name,
                    item.quantity,
                    item.unit_price_cents as f64 / 100.0,
                    item.location,
                    if item.archived { " [archived]" } else { "" },
                );
            }
            println!();
            println!("Total: {} item(s)", items.len());
        }

        ItemCommands::Adjust { sku, delta } => {
            let mut item = engine
                .storage
                .items
                .get_by_sku(&sku)?
                .ok_or_else(|| StockpileError::item_not_found(&sku))?;

            item.adjust_quantity(delta);
            item.validate()
                .map_err(|e| StockpileError::Validation(e.to_string()))?;

            engine.storage.items.upsert(item.clone())?;
            engine.storage.items.save()?;

            engine.audit.log(
                &AuditEntry::new(&actor, AuditAction::ItemUpdated, AuditOutcome::Success)
                    .with_entity(item.id.to_string())
                    .with_detail(format!("quantity {:+} -> {}", delta, item.quantity)),
            )?;

            println!("{}: quantity now {}", item.sku, item.quantity);
        }

        ItemCommands::Remove { sku } => {
            let mut item = engine
                .storage
                .items
                .get_by_sku(&sku)?
                .ok_or_else(|| StockpileError::item_not_found(&sku))?;

            item.archive();
            engine.storage.items.upsert(item.clone())?;
            engine.storage.items.save()?;

            engine.audit.log(
                &AuditEntry::new(&actor, AuditAction::ItemDeleted, AuditOutcome::Success)
                    .with_entity(item.id.to_string())
                    .with_detail(item.sku.clone()),
            )?;

            println!("Archived {}", item.sku);
        }
    }

    Ok(())
}
