//! Load orchestration for the savegame workspace.
//!
//! [`LoadManager`] wraps the save engine with retries and linear backoff,
//! one-shot recovery from the newest backup, Full/Lazy/Streaming strategies
//! and a TTL-cached slot discovery index ([`SlotCache`]).
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use savegame_engine::{default_save_root, SaveConfig, SaveManager};
//! use savegame_loader::LoadManager;
//! use savegame_models::LoadStrategy;
//! use savegame_persistence::FileStorage;
//! use savegame_validation::StandardValidator;
//!
//! # async fn run() {
//! let engine = Arc::new(SaveManager::new(
//!     SaveConfig::from_env(),
//!     Arc::new(FileStorage::new(default_save_root())),
//!     Arc::new(StandardValidator::new()),
//! ));
//! let loader = LoadManager::new(engine);
//!
//! for slot in loader.discover_save_files(false).await {
//!     println!("{} ({})", slot.display_name, slot.save_version);
//! }
//! let record = loader.load_game("career", LoadStrategy::Lazy).await;
//! # }
//! ```

pub mod cache;
pub mod orchestrator;

pub use cache::SlotCache;
pub use orchestrator::LoadManager;
