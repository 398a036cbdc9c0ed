//! Command handlers for CLI subcommands.

use std::path::Path;
use std::sync::Arc;

use savegame_engine::{SaveConfig, SaveManager};
use savegame_loader::LoadManager;
use savegame_models::{LoadStrategy, RecordBuilder, SaveDescriptor, SaveRecord};
use savegame_persistence::FileStorage;
use savegame_validation::StandardValidator;
use tracing::info;

use crate::cli::{Commands, OutputFormat};

/// Result type for command operations.
pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;

/// Settings from `config_file` (or defaults) overridden by the environment.
pub fn load_config(config_file: Option<&Path>) -> Result<SaveConfig> {
    let config = match config_file {
        Some(path) => SaveConfig::from_file(path)?,
        None => SaveConfig::default(),
    };
    Ok(config.with_overrides(|key| std::env::var(key).ok()))
}

/// Wires storage, validator, engine and loader over `root`.
pub fn build_loader(root: &Path, config: SaveConfig) -> LoadManager {
    let engine = SaveManager::new(
        config,
        Arc::new(FileStorage::new(root)),
        Arc::new(StandardValidator::new()),
    );
    LoadManager::new(Arc::new(engine))
}

/// Execute a CLI command.
pub async fn execute(command: Commands, root: &Path, config: SaveConfig) -> Result<()> {
    let loader = build_loader(root, config);
    let engine = loader.engine();

    match command {
        Commands::List { refresh, format } => cmd_list(&loader, refresh, format).await,
        Commands::Info { slot } => cmd_info(&engine, &slot).await,
        Commands::New {
            slot,
            name,
            credits,
            play_time,
            contracts,
        } => {
            let record = RecordBuilder::new(&slot)
                .display_name(name.unwrap_or_else(|| slot.clone()))
                .credits(credits)
                .play_time(play_time)
                .contracts(contracts)
                .build();
            cmd_new(&engine, &slot, record).await
        }
        Commands::Load { slot, strategy } => cmd_load(&loader, &slot, strategy.into()).await,
        Commands::Delete { slot } => cmd_delete(&engine, &slot).await,
        Commands::Backups { slot } => cmd_backups(&engine, &slot),
        Commands::Restore { slot, backup_id } => cmd_restore(&engine, &slot, &backup_id).await,
    }
}

async fn cmd_list(loader: &LoadManager, refresh: bool, format: OutputFormat) -> Result<()> {
    let slots = loader.discover_save_files(refresh).await;

    match format {
        OutputFormat::Table => {
            if slots.is_empty() {
                println!("No save slots found.");
                return Ok(());
            }

            println!(
                "{:<20}  {:<24}  {:<8}  {:>10}  {:>8}  MODIFIED",
                "SLOT", "NAME", "VERSION", "CREDITS", "HOURS"
            );
            println!("{}", "-".repeat(96));
            for slot in &slots {
                print_descriptor_row(slot);
            }
            println!("\n{} slot(s)", slots.len());
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&slots)?;
            println!("{}", json);
        }
    }

    Ok(())
}

fn print_descriptor_row(slot: &SaveDescriptor) {
    println!(
        "{:<20}  {:<24}  {:<8}  {:>10}  {:>8.1}  {}",
        truncate(&slot.slot_name, 20),
        truncate(&slot.display_name, 24),
        slot.save_version,
        slot.current_credits,
        slot.play_time_hours,
        slot.last_modified.format("%Y-%m-%d %H:%M:%S")
    );
}

async fn cmd_info(engine: &SaveManager, slot: &str) -> Result<()> {
    let info = engine
        .get_save_slot_info(slot)
        .await
        .ok_or_else(|| format!("Slot not found: {}", slot))?;
    let d = &info.descriptor;

    println!("Slot: {} ({})", d.display_name, d.slot_name);
    println!("  Version: {}", d.save_version);
    println!("  Credits: {}", d.current_credits);
    println!("  Play time: {:.1} h", d.play_time_hours);
    println!("  Contracts: {}", d.total_contracts);
    println!("  Created: {}", d.created_at);
    println!("  Modified: {}", d.last_modified);
    println!("  Size: {} bytes", info.size_bytes);
    println!("  Valid: {}", if info.is_valid { "yes" } else { "no" });
    if d.is_minimal() {
        println!("  (no metadata sidecar)");
    }

    Ok(())
}

async fn cmd_new(engine: &SaveManager, slot: &str, record: SaveRecord) -> Result<()> {
    if !engine.save_game(slot, Some(record)).await {
        return Err(format!("Failed to save slot: {}", slot).into());
    }
    info!(slot = %slot, "slot written");
    println!("Saved slot '{}'", slot);
    Ok(())
}

async fn cmd_load(loader: &LoadManager, slot: &str, strategy: LoadStrategy) -> Result<()> {
    let record = loader
        .load_game(slot, strategy)
        .await
        .ok_or_else(|| format!("Failed to load slot: {}", slot))?;

    println!("Loaded '{}' ({} strategy)", record.display_name, strategy);
    println!("  Version: {}", record.save_version);
    println!("  Credits: {}", record.current_credits);
    println!("  Play time: {:.1} h", record.play_time_hours);
    println!("  Level: {}", record.player_progress.level);
    if record.has_deferred_data() {
        println!("  Instances: deferred");
    } else {
        println!("  Instances: {}", record.game_state.instance_count());
    }

    Ok(())
}

async fn cmd_delete(engine: &SaveManager, slot: &str) -> Result<()> {
    if !engine.delete_save_slot(slot).await {
        return Err(format!("Slot not found: {}", slot).into());
    }
    println!("Deleted slot '{}'", slot);
    Ok(())
}

fn cmd_backups(engine: &SaveManager, slot: &str) -> Result<()> {
    let backups = engine.list_backups(slot);
    if backups.is_empty() {
        println!("No backups for '{}'.", slot);
        return Ok(());
    }

    println!("{:<56}  CREATED", "ID");
    println!("{}", "-".repeat(80));
    for backup in &backups {
        println!(
            "{:<56}  {}",
            backup.id,
            backup.created_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    println!("\n{} backup(s)", backups.len());
    Ok(())
}

async fn cmd_restore(engine: &SaveManager, slot: &str, backup_id: &str) -> Result<()> {
    if !engine.restore_backup(slot, backup_id).await {
        return Err(format!("Failed to restore '{}' from {}", slot, backup_id).into());
    }
    println!("Restored slot '{}' from {}", slot, backup_id);
    Ok(())
}

/// Truncates a string to the given length, adding "..." if truncated.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
