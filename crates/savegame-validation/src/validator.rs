//! Severity-graded validation and sanitization of save records.

use serde_json::Value;
use tracing::debug;

use savegame_models::{
    SaveRecord, SaveVersion, Severity, ValidationIssue, ValidationResult, CURRENT_SAVE_VERSION,
    SETTINGS_SCHEMA_VERSION,
};

use crate::migration::Migrator;

/// Top-level payload keys without which a record cannot be decoded.
const REQUIRED_KEYS: &[&str] = &[
    "slot_name",
    "display_name",
    "created_at",
    "last_modified",
    "play_time_hours",
    "current_credits",
    "total_contracts",
    "save_version",
];

/// Validity, sanitization and migration rules for save records.
pub trait ValidatorService: Send + Sync {
    /// Checks raw payload bytes before they are decoded.
    fn validate_structure(&self, bytes: &[u8]) -> ValidationResult;

    /// Checks a decoded record.
    fn validate(&self, record: &SaveRecord) -> ValidationResult;

    /// Repairs everything below `Critical` that [`validate`] reports.
    ///
    /// [`validate`]: ValidatorService::validate
    fn sanitize(&self, record: SaveRecord) -> SaveRecord;

    /// Migrates a record forward to `target_version`.
    fn migrate(&self, record: SaveRecord, target_version: &str) -> Option<SaveRecord>;
}

/// The rules this build ships with.
///
/// | Finding                                   | Severity |
/// |-------------------------------------------|----------|
/// | empty slot name                           | Critical |
/// | version newer than the running version    | Critical |
/// | unparseable version                       | Error    |
/// | settings schema newer than supported      | Error    |
/// | negative credits                          | Warning  |
/// | negative or non-finite play time          | Warning  |
/// | blank display name                        | Warning  |
/// | last modified before creation             | Warning  |
pub struct StandardValidator {
    running_version: SaveVersion,
    migrator: Migrator,
}

impl StandardValidator {
    pub fn new() -> Self {
        Self {
            running_version: SaveVersion::current(),
            migrator: Migrator::standard(),
        }
    }

    /// Validates against a different running version.
    pub fn with_running_version(mut self, version: SaveVersion) -> Self {
        self.running_version = version;
        self
    }

    pub fn with_migrator(mut self, migrator: Migrator) -> Self {
        self.migrator = migrator;
        self
    }
}

impl Default for StandardValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl ValidatorService for StandardValidator {
    fn validate_structure(&self, bytes: &[u8]) -> ValidationResult {
        if bytes.is_empty() {
            return ValidationResult::critical("payload", "payload is empty");
        }

        let value: Value = match serde_json::from_slice(bytes) {
            Ok(v) => v,
            Err(e) => return ValidationResult::critical("payload", format!("not valid JSON: {}", e)),
        };
        let Some(object) = value.as_object() else {
            return ValidationResult::critical("payload", "payload is not an object");
        };

        let mut issues: Vec<ValidationIssue> = REQUIRED_KEYS
            .iter()
            .filter(|key| !object.contains_key(**key))
            .map(|key| ValidationIssue::new(*key, "missing", Severity::Critical))
            .collect();

        match object.get("checksum").and_then(Value::as_str) {
            Some(c) if !c.is_empty() => {}
            _ => issues.push(ValidationIssue::new(
                "checksum",
                "missing checksum",
                Severity::Error,
            )),
        }

        ValidationResult::from_issues(issues)
    }

    fn validate(&self, record: &SaveRecord) -> ValidationResult {
        let mut issues = Vec::new();

        if record.slot_name.trim().is_empty() {
            issues.push(ValidationIssue::new("slot_name", "empty", Severity::Critical));
        }

        match SaveVersion::parse(&record.save_version) {
            Some(v) if v > self.running_version => issues.push(ValidationIssue::new(
                "save_version",
                format!("{} is newer than {}", v, self.running_version),
                Severity::Critical,
            )),
            Some(_) => {}
            None => issues.push(ValidationIssue::new(
                "save_version",
                format!("unparseable version {:?}", record.save_version),
                Severity::Error,
            )),
        }

        if record.settings.schema_version > SETTINGS_SCHEMA_VERSION {
            issues.push(ValidationIssue::new(
                "settings.schema_version",
                format!(
                    "schema {} is newer than {}",
                    record.settings.schema_version, SETTINGS_SCHEMA_VERSION
                ),
                Severity::Error,
            ));
        }

        if record.current_credits < 0 {
            issues.push(ValidationIssue::new(
                "current_credits",
                format!("negative balance {}", record.current_credits),
                Severity::Warning,
            ));
        }

        if !record.play_time_hours.is_finite() || record.play_time_hours < 0.0 {
            issues.push(ValidationIssue::new(
                "play_time_hours",
                format!("invalid play time {}", record.play_time_hours),
                Severity::Warning,
            ));
        }

        if record.display_name.trim().is_empty() {
            issues.push(ValidationIssue::new("display_name", "blank", Severity::Warning));
        }

        if record.last_modified < record.created_at {
            issues.push(ValidationIssue::new(
                "last_modified",
                "earlier than created_at",
                Severity::Warning,
            ));
        }

        ValidationResult::from_issues(issues)
    }

    fn sanitize(&self, mut record: SaveRecord) -> SaveRecord {
        if record.current_credits < 0 {
            record.current_credits = 0;
        }
        if !record.play_time_hours.is_finite() || record.play_time_hours < 0.0 {
            record.play_time_hours = 0.0;
        }
        if record.display_name.trim().is_empty() {
            record.display_name = record.slot_name.clone();
        }
        if record.last_modified < record.created_at {
            record.last_modified = record.created_at;
        }
        if record.settings.schema_version > SETTINGS_SCHEMA_VERSION {
            debug!(slot = %record.slot_name, "resetting unsupported settings");
            record.settings = Default::default();
        }
        if SaveVersion::parse(&record.save_version).is_none() {
            record.save_version = CURRENT_SAVE_VERSION.to_string();
        }
        record
    }

    fn migrate(&self, record: SaveRecord, target_version: &str) -> Option<SaveRecord> {
        self.migrator.migrate(record, target_version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use savegame_models::RecordBuilder;

    fn validator() -> StandardValidator {
        StandardValidator::new()
    }

    #[test]
    fn test_clean_record() {
        let record = RecordBuilder::new("career").credits(5000).play_time(2.5).build();
        let result = validator().validate(&record);
        assert!(result.is_valid);
        assert_eq!(result.severity, Severity::None);
        assert!(!result.needs_sanitizing());
    }

    #[test]
    fn test_structure_rejects_garbage() {
        let v = validator();
        assert!(v.validate_structure(b"").is_critical());
        assert!(v.validate_structure(b"{ nope").is_critical());
        assert!(v.validate_structure(b"[1, 2]").is_critical());
        assert!(v.validate_structure(br#"{"slot_name": "a"}"#).is_critical());
    }

    #[test]
    fn test_structure_accepts_encoded_record() {
        let bytes = RecordBuilder::new("career").build().to_bytes().unwrap();
        let result = validator().validate_structure(&bytes);
        assert!(result.is_valid);
        assert!(result.issues.is_empty());
    }

    #[test]
    fn test_structure_flags_missing_checksum() {
        let mut record = RecordBuilder::new("career").build();
        record.checksum.clear();
        let result = validator().validate_structure(&record.to_bytes().unwrap());
        assert_eq!(result.severity, Severity::Error);
        assert!(!result.is_valid);
    }

    #[test]
    fn test_warnings_are_sanitized() {
        let mut record = RecordBuilder::new("career").credits(-50).play_time(-1.0).build();
        record.display_name = "  ".into();
        record.last_modified = record.created_at - Duration::hours(1);

        let v = validator();
        let result = v.validate(&record);
        assert!(result.is_valid);
        assert_eq!(result.severity, Severity::Warning);
        assert_eq!(result.issues.len(), 4);
        assert!(result.needs_sanitizing());

        let fixed = v.sanitize(record);
        assert_eq!(fixed.current_credits, 0);
        assert_eq!(fixed.play_time_hours, 0.0);
        assert_eq!(fixed.display_name, "career");
        assert_eq!(fixed.last_modified, fixed.created_at);
        assert_eq!(v.validate(&fixed).severity, Severity::None);
    }

    #[test]
    fn test_newer_version_is_critical() {
        let record = RecordBuilder::new("career").version("9.0.0").build();
        let result = validator().validate(&record);
        assert!(result.is_critical());
        assert!(!result.needs_sanitizing());
    }

    #[test]
    fn test_running_version_override() {
        let record = RecordBuilder::new("career").version("1.2.0").build();
        let v = validator().with_running_version(SaveVersion::new(1, 1, 0));
        assert!(v.validate(&record).is_critical());
    }

    #[test]
    fn test_empty_slot_name_is_critical() {
        let mut record = RecordBuilder::new("career").build();
        record.slot_name.clear();
        assert!(validator().validate(&record).is_critical());
    }

    #[test]
    fn test_settings_schema_too_new() {
        let mut record = RecordBuilder::new("career").build();
        record.settings.schema_version = SETTINGS_SCHEMA_VERSION + 1;

        let v = validator();
        let result = v.validate(&record);
        assert_eq!(result.severity, Severity::Error);
        assert!(!result.is_valid);

        let fixed = v.sanitize(record);
        assert_eq!(fixed.settings.schema_version, SETTINGS_SCHEMA_VERSION);
    }

    #[test]
    fn test_migrate_delegates_to_migrator() {
        let record = RecordBuilder::new("career").version("1.0.0").build();
        let migrated = validator().migrate(record, CURRENT_SAVE_VERSION).unwrap();
        assert_eq!(migrated.save_version, CURRENT_SAVE_VERSION);
    }
}
