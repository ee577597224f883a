use crate::domain::models::{NotificationSettings, ScheduleConfig, TimetableData};
use crate::infrastructure::error::InfraError;
use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const SCHEMA_SQL: &str = include_str!("../../sql/schema.sql");

/// Single record key holding the whole persisted timetable document.
pub const TIMETABLE_STORAGE_KEY: &str = "studentTimetable";

pub fn initialize_database(path: &Path) -> Result<(), InfraError> {
    let connection = Connection::open(path)?;
    connection.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

/// The persisted document. `customization` carries only the user-edited
/// slot labels; the purely visual knobs of the original record are not
/// modeled here.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SavedDocument {
    pub config: ScheduleConfig,
    pub timetable_data: TimetableData,
    pub notification_settings: NotificationSettings,
    #[serde(default)]
    pub current_week: u32,
    #[serde(default)]
    pub customization: CustomizationSettings,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CustomizationSettings {
    #[serde(default)]
    pub custom_time_slots: Vec<String>,
}

/// Export payload: the saved document shape minus view state, stamped
/// with the export instant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExportDocument {
    pub config: ScheduleConfig,
    pub timetable_data: TimetableData,
    pub notification_settings: NotificationSettings,
    pub export_date: String,
}

pub trait StorageRepository: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, InfraError>;
    fn set(&self, key: &str, value: &str) -> Result<(), InfraError>;
}

#[derive(Debug, Clone)]
pub struct SqliteStorageRepository {
    db_path: PathBuf,
}

impl SqliteStorageRepository {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    fn connect(&self) -> Result<Connection, InfraError> {
        Connection::open(&self.db_path).map_err(InfraError::from)
    }
}

impl StorageRepository for SqliteStorageRepository {
    fn get(&self, key: &str) -> Result<Option<String>, InfraError> {
        let connection = self.connect()?;
        let value: Option<String> = connection
            .query_row(
                "SELECT value FROM storage WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), InfraError> {
        let connection = self.connect()?;
        connection.execute(
            "INSERT INTO storage (key, value)
             VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryStorageRepository {
    entries: Mutex<HashMap<String, String>>,
}

impl StorageRepository for InMemoryStorageRepository {
    fn get(&self, key: &str) -> Result<Option<String>, InfraError> {
        let entries = self
            .entries
            .lock()
            .map_err(|error| InfraError::InvalidConfig(format!("storage lock poisoned: {error}")))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), InfraError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|error| InfraError::InvalidConfig(format!("storage lock poisoned: {error}")))?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_store_get_set_roundtrip() {
        let store = InMemoryStorageRepository::default();
        assert_eq!(store.get(TIMETABLE_STORAGE_KEY).expect("get"), None);

        store.set(TIMETABLE_STORAGE_KEY, "{}").expect("set");
        assert_eq!(
            store.get(TIMETABLE_STORAGE_KEY).expect("get"),
            Some("{}".to_string())
        );

        store.set(TIMETABLE_STORAGE_KEY, "[1]").expect("overwrite");
        assert_eq!(
            store.get(TIMETABLE_STORAGE_KEY).expect("get"),
            Some("[1]".to_string())
        );
    }

    #[test]
    fn sqlite_store_upserts_under_fixed_key() {
        let path = std::env::temp_dir().join(format!(
            "timetable-storage-test-{}.sqlite",
            std::process::id()
        ));
        let _ = std::fs::remove_file(&path);
        initialize_database(&path).expect("initialize database");

        let store = SqliteStorageRepository::new(&path);
        assert_eq!(store.get(TIMETABLE_STORAGE_KEY).expect("get"), None);
        store.set(TIMETABLE_STORAGE_KEY, "first").expect("set");
        store.set(TIMETABLE_STORAGE_KEY, "second").expect("upsert");
        assert_eq!(
            store.get(TIMETABLE_STORAGE_KEY).expect("get"),
            Some("second".to_string())
        );

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn saved_document_wire_names_match_original_record() {
        let document = SavedDocument::default();
        let json = serde_json::to_value(&document).expect("serialize document");
        for key in [
            "config",
            "timetableData",
            "notificationSettings",
            "currentWeek",
            "customization",
        ] {
            assert!(json.get(key).is_some(), "missing key {key}");
        }
        assert!(
            json.get("customization")
                .and_then(|value| value.get("customTimeSlots"))
                .is_some()
        );
    }

    #[test]
    fn saved_document_tolerates_missing_optional_fields() {
        let raw = r#"{
            "config": {"weeks":1,"days":5,"startTime":"08:00","endTime":"17:00","slotDuration":60},
            "timetableData": {},
            "notificationSettings": {"enabled":false,"before5":true,"before15":false,"before30":false,"atStart":false,"custom":false}
        }"#;
        let document: SavedDocument = serde_json::from_str(raw).expect("deserialize document");
        assert_eq!(document.current_week, 0);
        assert!(document.customization.custom_time_slots.is_empty());
    }
}
