//! Typed pub/sub for save and load events.
//!
//! This crate provides:
//! - [`EventBus`], a synchronous bus with handler and `mpsc` channel
//!   subscribers
//! - [`SaveEvent`] and [`LoadEvent`], the payloads published by the save
//!   engine and the load orchestrator
//! - [`SaveEvents`], the pair of buses both of them share
//!
//! # Example
//!
//! ```
//! use savegame_events::{SaveEvent, SaveEvents};
//!
//! let events = SaveEvents::new();
//! events.save.subscribe(|event: &SaveEvent| {
//!     println!("save event for {}", event.slot());
//!     Ok(())
//! });
//! events.save.publish(&SaveEvent::Completed { slot: "quicksave".into() });
//! ```

pub mod bus;
pub mod error;
pub mod events;

pub use bus::{EventBus, SubscriptionId};
pub use error::{EventError, Result};
pub use events::{LoadEvent, SaveEvent, SaveEvents};
