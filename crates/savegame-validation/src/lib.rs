//! Validation, sanitization and forward migration of save records.
//!
//! The save engine and load orchestrator only see [`ValidatorService`].
//! [`StandardValidator`] is the rule set this build ships with; it
//! delegates version upgrades to a step-wise [`Migrator`].

pub mod migration;
pub mod validator;

pub use migration::{MigrationStep, Migrator};
pub use validator::{StandardValidator, ValidatorService};
