use crate::application::bootstrap::bootstrap_workspace;
use crate::application::scheduler::{NotificationScheduler, RearmOutcome};
use crate::domain::clock::derive_slot_labels;
use crate::domain::models::{
    EntryColor, EventEntry, NotificationSettings, ScheduleConfig, TimetableData, day_name,
};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::notifier::{
    InMemoryNotificationSink, InMemoryPermissionSource, Notification, NotificationSink,
    PermissionSource, PermissionStatus,
};
use crate::infrastructure::storage::{
    ExportDocument, SavedDocument, SqliteStorageRepository, StorageRepository,
    TIMETABLE_STORAGE_KEY,
};
use chrono::{DateTime, Local, SecondsFormat, Utc};
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

type NowProvider = Arc<dyn Fn() -> DateTime<Local> + Send + Sync>;

pub struct AppState {
    storage: Arc<dyn StorageRepository>,
    permissions: Arc<dyn PermissionSource>,
    sink: Arc<dyn NotificationSink>,
    scheduler: NotificationScheduler,
    runtime: Mutex<RuntimeState>,
    now_provider: NowProvider,
    logs_dir: PathBuf,
    log_guard: Mutex<()>,
}

impl AppState {
    pub fn new(workspace_root: PathBuf) -> Result<Self, InfraError> {
        let bootstrap = bootstrap_workspace(&workspace_root)?;
        Self::with_collaborators(
            workspace_root,
            Arc::new(SqliteStorageRepository::new(&bootstrap.database_path)),
            Arc::new(InMemoryPermissionSource::default()),
            Arc::new(InMemoryNotificationSink::default()),
        )
    }

    pub fn with_collaborators(
        workspace_root: PathBuf,
        storage: Arc<dyn StorageRepository>,
        permissions: Arc<dyn PermissionSource>,
        sink: Arc<dyn NotificationSink>,
    ) -> Result<Self, InfraError> {
        let logs_dir = workspace_root.join("logs");
        fs::create_dir_all(&logs_dir)?;

        let scheduler = NotificationScheduler::new(Arc::clone(&permissions), Arc::clone(&sink));
        let state = Self {
            storage,
            permissions,
            sink,
            scheduler,
            runtime: Mutex::new(RuntimeState::default()),
            now_provider: Arc::new(Local::now),
            logs_dir,
            log_guard: Mutex::new(()),
        };
        state.restore_startup_state()?;
        Ok(state)
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    pub fn scheduler(&self) -> &NotificationScheduler {
        &self.scheduler
    }

    /// Startup restores the notification settings and custom slot labels
    /// only; the grid itself stays untouched until an explicit load.
    fn restore_startup_state(&self) -> Result<(), InfraError> {
        let Some(raw) = self.storage.get(TIMETABLE_STORAGE_KEY)? else {
            return Ok(());
        };
        match serde_json::from_str::<SavedDocument>(&raw) {
            Ok(document) => {
                let mut runtime = lock_runtime(self)?;
                runtime.settings = document.notification_settings;
                runtime.custom_slots = document.customization.custom_time_slots;
            }
            Err(error) => {
                self.log_error(
                    "startup",
                    &format!("stored timetable document is corrupt; using defaults: {error}"),
                );
            }
        }
        Ok(())
    }

    pub fn command_error(&self, command: &str, error: &InfraError) -> String {
        self.log_error(command, &error.to_string());
        error.to_string()
    }

    pub fn log_info(&self, command: &str, message: &str) {
        self.append_log("info", command, message);
    }

    pub fn log_error(&self, command: &str, message: &str) {
        self.append_log("error", command, message);
    }

    fn append_log(&self, level: &str, command: &str, message: &str) {
        let Ok(_guard) = self.log_guard.lock() else {
            return;
        };
        let path = self.logs_dir.join("commands.log");
        let payload = serde_json::json!({
            "timestamp": Utc::now().to_rfc3339(),
            "level": level,
            "command": command,
            "message": message,
        });

        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
            let _ = writeln!(file, "{}", payload);
        }
    }
}

#[derive(Debug, Default)]
struct RuntimeState {
    config: ScheduleConfig,
    timetable: TimetableData,
    settings: NotificationSettings,
    current_week: u32,
    custom_slots: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct SlotInput {
    pub subject: String,
    pub location: String,
    pub instructor: String,
    pub notes: String,
    pub color: EntryColor,
    pub notifications: bool,
}

impl Default for SlotInput {
    fn default() -> Self {
        Self {
            subject: String::new(),
            location: String::new(),
            instructor: String::new(),
            notes: String::new(),
            color: EntryColor::Blue,
            notifications: true,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct NotificationToggles {
    pub before_5: bool,
    pub before_15: bool,
    pub before_30: bool,
    pub at_start: bool,
    pub custom: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct NotificationStatusResponse {
    pub permission: String,
    pub enabled: bool,
    pub armed_triggers: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SlotEntryView {
    pub day: u32,
    pub slot: u32,
    pub entry: EventEntry,
}

/// Replace the grid configuration wholesale; every stored entry is
/// discarded. Returns the effective slot labels of the new grid.
pub fn generate_timetable_impl(
    state: &AppState,
    config: ScheduleConfig,
) -> Result<Vec<String>, InfraError> {
    config.validate().map_err(InfraError::InvalidConfig)?;

    let labels = {
        let mut runtime = lock_runtime(state)?;
        let mut timetable = TimetableData::new();
        for week in 0..config.weeks {
            let week_data = timetable.entry(week).or_default();
            for day in 0..config.days {
                week_data.entry(day).or_default();
            }
        }
        runtime.config = config;
        runtime.timetable = timetable;
        effective_slot_labels(&runtime)?
    };

    rearm_from_runtime(state)?;
    state.log_info(
        "generate_timetable",
        &format!("generated grid with {} slots", labels.len()),
    );
    Ok(labels)
}

pub fn slot_labels_impl(state: &AppState) -> Result<Vec<String>, InfraError> {
    let runtime = lock_runtime(state)?;
    effective_slot_labels(&runtime)
}

pub fn save_slot_impl(
    state: &AppState,
    week: u32,
    day: u32,
    slot: u32,
    input: SlotInput,
) -> Result<Option<EventEntry>, InfraError> {
    let saved = {
        let mut runtime = lock_runtime(state)?;
        let labels = effective_slot_labels(&runtime)?;
        check_slot_coordinates(&runtime.config, &labels, week, day, slot)?;

        let subject = input.subject.trim();
        if subject.is_empty() {
            // Clearing the subject deletes the entry; an empty slot is
            // absent, not present with blank fields.
            runtime
                .timetable
                .entry(week)
                .or_default()
                .entry(day)
                .or_default()
                .remove(&slot);
            None
        } else {
            let entry = EventEntry {
                subject: subject.to_string(),
                location: input.location.trim().to_string(),
                instructor: input.instructor.trim().to_string(),
                notes: input.notes.trim().to_string(),
                color: input.color,
                notifications: input.notifications,
                time: labels
                    .get(slot as usize)
                    .cloned()
                    .unwrap_or_default(),
                day_name: day_name(day).to_string(),
            };
            runtime
                .timetable
                .entry(week)
                .or_default()
                .entry(day)
                .or_default()
                .insert(slot, entry.clone());
            Some(entry)
        }
    };

    rearm_from_runtime(state)?;
    state.log_info(
        "save_slot",
        &format!(
            "{} week={week} day={day} slot={slot}",
            if saved.is_some() { "saved" } else { "cleared" }
        ),
    );
    Ok(saved)
}

pub fn clear_slot_impl(
    state: &AppState,
    week: u32,
    day: u32,
    slot: u32,
) -> Result<bool, InfraError> {
    let removed = {
        let mut runtime = lock_runtime(state)?;
        runtime
            .timetable
            .get_mut(&week)
            .and_then(|week_data| week_data.get_mut(&day))
            .and_then(|day_data| day_data.remove(&slot))
            .is_some()
    };

    rearm_from_runtime(state)?;
    if removed {
        state.log_info("clear_slot", &format!("cleared week={week} day={day} slot={slot}"));
    }
    Ok(removed)
}

pub fn set_current_week_impl(state: &AppState, week: u32) -> Result<(), InfraError> {
    let mut runtime = lock_runtime(state)?;
    if week >= runtime.config.weeks {
        return Err(InfraError::InvalidConfig(format!(
            "week index out of range: {week}"
        )));
    }
    runtime.current_week = week;
    Ok(())
}

pub fn current_week_entries_impl(state: &AppState) -> Result<Vec<SlotEntryView>, InfraError> {
    let runtime = lock_runtime(state)?;
    let mut entries = Vec::new();
    if let Some(week_data) = runtime.timetable.get(&runtime.current_week) {
        for (day, day_data) in week_data {
            for (slot, entry) in day_data {
                entries.push(SlotEntryView {
                    day: *day,
                    slot: *slot,
                    entry: entry.clone(),
                });
            }
        }
    }
    Ok(entries)
}

pub fn update_notification_settings_impl(
    state: &AppState,
    toggles: NotificationToggles,
) -> Result<(), InfraError> {
    let enabled = {
        let mut runtime = lock_runtime(state)?;
        runtime.settings.before_5 = toggles.before_5;
        runtime.settings.before_15 = toggles.before_15;
        runtime.settings.before_30 = toggles.before_30;
        runtime.settings.at_start = toggles.at_start;
        runtime.settings.custom = toggles.custom;
        runtime.settings.enabled
    };

    if enabled {
        rearm_from_runtime(state)?;
    }
    save_timetable_impl(state)?;
    state.log_info("update_notification_settings", "updated lead-time toggles");
    Ok(())
}

pub fn set_custom_times_impl(state: &AppState, times: Vec<u32>) -> Result<Vec<u32>, InfraError> {
    let (enabled, stored) = {
        let mut runtime = lock_runtime(state)?;
        runtime.settings.set_custom_times(&times);
        (runtime.settings.enabled, runtime.settings.custom_times.clone())
    };

    if enabled {
        rearm_from_runtime(state)?;
    }
    Ok(stored)
}

pub fn set_custom_slots_impl(
    state: &AppState,
    labels: Vec<String>,
) -> Result<Vec<String>, InfraError> {
    let stored = {
        let mut runtime = lock_runtime(state)?;
        runtime.custom_slots = labels
            .into_iter()
            .map(|label| label.trim().to_string())
            .filter(|label| !label.is_empty())
            .collect();
        runtime.custom_slots.clone()
    };

    save_timetable_impl(state)?;
    state.log_info(
        "set_custom_slots",
        &format!("stored {} custom slot labels", stored.len()),
    );
    Ok(stored)
}

/// Turn scheduling on. Requests permission when it is still
/// undetermined; denial is a reported status, not an error.
pub async fn enable_notifications_impl(
    state: &AppState,
) -> Result<NotificationStatusResponse, InfraError> {
    let mut permission = state.permissions.query();
    if permission == PermissionStatus::Undetermined {
        permission = state.permissions.request().await;
    }

    if permission == PermissionStatus::Granted {
        {
            let mut runtime = lock_runtime(state)?;
            runtime.settings.enabled = true;
        }
        let outcome = rearm_from_runtime(state)?;
        state.log_info(
            "enable_notifications",
            &format!("notifications enabled; armed {} triggers", outcome.armed),
        );
    } else {
        state.log_info(
            "enable_notifications",
            &format!("permission {}; scheduling stays idle", permission.as_str()),
        );
    }

    notification_status_impl(state)
}

pub fn notification_status_impl(
    state: &AppState,
) -> Result<NotificationStatusResponse, InfraError> {
    let enabled = lock_runtime(state)?.settings.enabled;
    Ok(NotificationStatusResponse {
        permission: state.permissions.query().as_str().to_string(),
        enabled,
        armed_triggers: state.scheduler.armed_len(),
    })
}

pub fn test_notification_impl(state: &AppState) -> Result<bool, InfraError> {
    if state.permissions.query() != PermissionStatus::Granted {
        return Ok(false);
    }
    state.sink.deliver(Notification {
        title: "Test Notification".to_string(),
        body: "This is a test notification from your Time Table app!".to_string(),
        tag: "test-notification".to_string(),
        require_interaction: false,
    });
    Ok(true)
}

pub fn rearm_notifications_impl(state: &AppState) -> Result<RearmOutcome, InfraError> {
    rearm_from_runtime(state)
}

pub fn save_timetable_impl(state: &AppState) -> Result<(), InfraError> {
    let document = {
        let runtime = lock_runtime(state)?;
        SavedDocument {
            config: runtime.config.clone(),
            timetable_data: runtime.timetable.clone(),
            notification_settings: runtime.settings.clone(),
            current_week: runtime.current_week,
            customization: crate::infrastructure::storage::CustomizationSettings {
                custom_time_slots: runtime.custom_slots.clone(),
            },
        }
    };

    let raw = serde_json::to_string(&document)?;
    state.storage.set(TIMETABLE_STORAGE_KEY, &raw)?;
    state.log_info("save_timetable", "persisted timetable document");
    Ok(())
}

/// Restore the persisted document. A missing record returns `Ok(false)`;
/// a corrupt one is logged and leaves the current state untouched.
pub fn load_timetable_impl(state: &AppState) -> Result<bool, InfraError> {
    let Some(raw) = state.storage.get(TIMETABLE_STORAGE_KEY)? else {
        state.log_error("load_timetable", "no saved timetable found");
        return Ok(false);
    };

    let document = match serde_json::from_str::<SavedDocument>(&raw) {
        Ok(document) => document,
        Err(error) => {
            state.log_error(
                "load_timetable",
                &format!("stored timetable document is corrupt; keeping current state: {error}"),
            );
            return Ok(false);
        }
    };

    {
        let mut runtime = lock_runtime(state)?;
        runtime.config = document.config;
        runtime.timetable = document.timetable_data;
        runtime.settings = document.notification_settings;
        runtime.current_week = document.current_week;
        runtime.custom_slots = document.customization.custom_time_slots;
    }

    rearm_from_runtime(state)?;
    state.log_info("load_timetable", "restored timetable document");
    Ok(true)
}

/// Discard every entry (the grid shape stays) and cancel all triggers.
pub fn reset_timetable_impl(state: &AppState) -> Result<(), InfraError> {
    {
        let mut runtime = lock_runtime(state)?;
        let mut timetable = TimetableData::new();
        for week in 0..runtime.config.weeks {
            let week_data = timetable.entry(week).or_default();
            for day in 0..runtime.config.days {
                week_data.entry(day).or_default();
            }
        }
        runtime.timetable = timetable;
    }

    state.scheduler.cancel_all();
    state.log_info("reset_timetable", "cleared all entries and triggers");
    Ok(())
}

pub fn export_timetable_impl(state: &AppState) -> Result<String, InfraError> {
    let document = {
        let runtime = lock_runtime(state)?;
        ExportDocument {
            config: runtime.config.clone(),
            timetable_data: runtime.timetable.clone(),
            notification_settings: runtime.settings.clone(),
            export_date: (state.now_provider)()
                .with_timezone(&Utc)
                .to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    };

    let raw = serde_json::to_string_pretty(&document)?;
    state.log_info("export_timetable", "exported timetable document");
    Ok(raw)
}

fn rearm_from_runtime(state: &AppState) -> Result<RearmOutcome, InfraError> {
    let (timetable, current_week, settings) = {
        let runtime = lock_runtime(state)?;
        (
            runtime.timetable.clone(),
            runtime.current_week,
            runtime.settings.clone(),
        )
    };

    let now = (state.now_provider)();
    let outcome = state.scheduler.rearm(&timetable, current_week, &settings, now);
    if outcome.skipped > 0 {
        state.log_error(
            "rearm",
            &format!("skipped {} entries with malformed slot times", outcome.skipped),
        );
    }
    Ok(outcome)
}

// The user-edited custom list wins whenever it is non-empty.
fn effective_slot_labels(runtime: &RuntimeState) -> Result<Vec<String>, InfraError> {
    if !runtime.custom_slots.is_empty() {
        return Ok(runtime.custom_slots.clone());
    }
    derive_slot_labels(&runtime.config).map_err(InfraError::from)
}

fn check_slot_coordinates(
    config: &ScheduleConfig,
    labels: &[String],
    week: u32,
    day: u32,
    slot: u32,
) -> Result<(), InfraError> {
    if week >= config.weeks {
        return Err(InfraError::InvalidConfig(format!(
            "week index out of range: {week}"
        )));
    }
    if day >= config.days {
        return Err(InfraError::InvalidConfig(format!(
            "day index out of range: {day}"
        )));
    }
    if slot as usize >= labels.len() {
        return Err(InfraError::InvalidConfig(format!(
            "slot index out of range: {slot}"
        )));
    }
    Ok(())
}

fn lock_runtime(state: &AppState) -> Result<MutexGuard<'_, RuntimeState>, InfraError> {
    state
        .runtime
        .lock()
        .map_err(|error| InfraError::InvalidConfig(format!("runtime lock poisoned: {error}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::storage::InMemoryStorageRepository;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration as StdDuration;

    static NEXT_TEMP_WORKSPACE: AtomicUsize = AtomicUsize::new(0);

    struct TempWorkspace {
        path: PathBuf,
    }

    impl TempWorkspace {
        fn new() -> Self {
            let sequence = NEXT_TEMP_WORKSPACE.fetch_add(1, Ordering::Relaxed);
            let path = std::env::temp_dir().join(format!(
                "timetable-command-tests-{}-{}",
                std::process::id(),
                sequence
            ));
            fs::create_dir_all(&path).expect("create temp workspace");
            Self { path }
        }

        fn app_state(&self) -> AppState {
            AppState::new(self.path.clone()).expect("initialize app state")
        }
    }

    impl Drop for TempWorkspace {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.path);
        }
    }

    // 2026-01-05 is a Monday.
    fn monday_noon() -> DateTime<Local> {
        Local
            .with_ymd_and_hms(2026, 1, 5, 12, 0, 0)
            .single()
            .expect("valid local datetime")
    }

    fn granted_state(
        workspace: &TempWorkspace,
        storage: Arc<dyn StorageRepository>,
    ) -> (AppState, Arc<InMemoryNotificationSink>) {
        let sink = Arc::new(InMemoryNotificationSink::default());
        let state = AppState::with_collaborators(
            workspace.path.clone(),
            storage,
            Arc::new(InMemoryPermissionSource::granted()),
            sink.clone(),
        )
        .expect("initialize app state")
        .with_now_provider(Arc::new(monday_noon));
        (state, sink)
    }

    fn tuesday_slot_input(subject: &str) -> SlotInput {
        SlotInput {
            subject: subject.to_string(),
            location: "B-204".to_string(),
            instructor: "Dr. Petrov".to_string(),
            notes: String::new(),
            color: EntryColor::Green,
            notifications: true,
        }
    }

    #[test]
    fn generate_timetable_returns_labels_and_empty_grid() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state();

        let labels = generate_timetable_impl(&state, ScheduleConfig::default())
            .expect("generate timetable");
        assert_eq!(labels.len(), 9);
        assert_eq!(labels[0], "08:00 - 09:00");
        assert_eq!(labels[8], "16:00 - 17:00");

        let entries = current_week_entries_impl(&state).expect("list entries");
        assert!(entries.is_empty());
    }

    #[test]
    fn generate_timetable_rejects_invalid_config() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state();

        let mut config = ScheduleConfig::default();
        config.days = 9;
        assert!(generate_timetable_impl(&state, config).is_err());
    }

    #[test]
    fn save_slot_copies_label_and_day_name() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state();
        generate_timetable_impl(&state, ScheduleConfig::default()).expect("generate");

        let saved = save_slot_impl(&state, 0, 1, 1, tuesday_slot_input("Algebra"))
            .expect("save slot")
            .expect("entry stored");
        assert_eq!(saved.time, "09:00 - 10:00");
        assert_eq!(saved.day_name, "Tuesday");

        let entries = current_week_entries_impl(&state).expect("list entries");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].day, 1);
        assert_eq!(entries[0].slot, 1);
        assert_eq!(entries[0].entry.subject, "Algebra");
    }

    #[test]
    fn blank_subject_removes_the_occupied_slot() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state();
        generate_timetable_impl(&state, ScheduleConfig::default()).expect("generate");
        save_slot_impl(&state, 0, 1, 1, tuesday_slot_input("Algebra")).expect("save slot");

        let cleared = save_slot_impl(
            &state,
            0,
            1,
            1,
            SlotInput {
                subject: "   ".to_string(),
                ..SlotInput::default()
            },
        )
        .expect("save blank slot");
        assert!(cleared.is_none());
        assert!(current_week_entries_impl(&state).expect("list entries").is_empty());
    }

    #[test]
    fn save_slot_rejects_out_of_range_coordinates() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state();
        generate_timetable_impl(&state, ScheduleConfig::default()).expect("generate");

        assert!(save_slot_impl(&state, 1, 0, 0, tuesday_slot_input("X")).is_err());
        assert!(save_slot_impl(&state, 0, 5, 0, tuesday_slot_input("X")).is_err());
        assert!(save_slot_impl(&state, 0, 0, 9, tuesday_slot_input("X")).is_err());
    }

    #[test]
    fn clear_slot_removes_entry() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state();
        generate_timetable_impl(&state, ScheduleConfig::default()).expect("generate");
        save_slot_impl(&state, 0, 1, 1, tuesday_slot_input("Algebra")).expect("save slot");

        assert!(clear_slot_impl(&state, 0, 1, 1).expect("clear slot"));
        assert!(!clear_slot_impl(&state, 0, 1, 1).expect("clear slot again"));
        assert!(current_week_entries_impl(&state).expect("list entries").is_empty());
    }

    #[test]
    fn set_current_week_checks_bounds() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state();
        let mut config = ScheduleConfig::default();
        config.weeks = 2;
        generate_timetable_impl(&state, config).expect("generate");

        set_current_week_impl(&state, 1).expect("switch week");
        assert!(set_current_week_impl(&state, 2).is_err());
    }

    #[test]
    fn save_and_load_roundtrip_through_sqlite() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state();
        generate_timetable_impl(&state, ScheduleConfig::default()).expect("generate");
        save_slot_impl(&state, 0, 1, 1, tuesday_slot_input("Algebra")).expect("save slot");
        save_timetable_impl(&state).expect("save timetable");

        let restored = workspace.app_state();
        assert!(load_timetable_impl(&restored).expect("load timetable"));
        let entries = current_week_entries_impl(&restored).expect("list entries");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].entry.subject, "Algebra");
        assert_eq!(entries[0].entry.time, "09:00 - 10:00");
    }

    #[test]
    fn load_without_saved_document_returns_false() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state();
        assert!(!load_timetable_impl(&state).expect("load timetable"));
    }

    #[test]
    fn corrupt_document_falls_back_to_current_state() {
        let workspace = TempWorkspace::new();
        let storage: Arc<dyn StorageRepository> = Arc::new(InMemoryStorageRepository::default());
        storage
            .set(TIMETABLE_STORAGE_KEY, "not json at all")
            .expect("seed corrupt record");

        // Startup swallows the corruption and keeps defaults.
        let (state, _sink) = granted_state(&workspace, Arc::clone(&storage));
        assert!(!load_timetable_impl(&state).expect("load timetable"));
        let status = notification_status_impl(&state).expect("status");
        assert!(!status.enabled);
    }

    #[test]
    fn startup_restores_settings_and_custom_slots() {
        let workspace = TempWorkspace::new();
        let storage: Arc<dyn StorageRepository> = Arc::new(InMemoryStorageRepository::default());

        {
            let (state, _sink) = granted_state(&workspace, Arc::clone(&storage));
            update_notification_settings_impl(
                &state,
                NotificationToggles {
                    before_5: false,
                    before_15: true,
                    before_30: true,
                    at_start: false,
                    custom: false,
                },
            )
            .expect("update settings");
            set_custom_slots_impl(
                &state,
                vec!["10:00 - 11:30".to_string(), "  ".to_string()],
            )
            .expect("set custom slots");
        }

        let (restored, _sink) = granted_state(&workspace, storage);
        let labels = slot_labels_impl(&restored).expect("slot labels");
        assert_eq!(labels, vec!["10:00 - 11:30"]);
    }

    #[test]
    fn custom_slot_labels_override_derived_ones() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state();
        generate_timetable_impl(&state, ScheduleConfig::default()).expect("generate");

        set_custom_slots_impl(
            &state,
            vec!["10:00 - 11:30".to_string(), "13:00 - 14:00".to_string()],
        )
        .expect("set custom slots");

        let labels = slot_labels_impl(&state).expect("slot labels");
        assert_eq!(labels, vec!["10:00 - 11:30", "13:00 - 14:00"]);

        let saved = save_slot_impl(&state, 0, 0, 1, tuesday_slot_input("Lab"))
            .expect("save slot")
            .expect("entry stored");
        assert_eq!(saved.time, "13:00 - 14:00");

        // Slot index 2 no longer exists under the custom list.
        assert!(save_slot_impl(&state, 0, 0, 2, tuesday_slot_input("X")).is_err());
    }

    #[test]
    fn set_custom_times_returns_sanitized_list() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state();
        let stored =
            set_custom_times_impl(&state, vec![10, 10, 30, 5, 0, 2000]).expect("set custom times");
        assert_eq!(stored, vec![30, 10, 5]);
    }

    #[test]
    fn export_matches_original_document_shape() {
        let workspace = TempWorkspace::new();
        let storage: Arc<dyn StorageRepository> = Arc::new(InMemoryStorageRepository::default());
        let (state, _sink) = granted_state(&workspace, storage);
        generate_timetable_impl(&state, ScheduleConfig::default()).expect("generate");

        let raw = export_timetable_impl(&state).expect("export");
        let json: serde_json::Value = serde_json::from_str(&raw).expect("parse export");
        for key in ["config", "timetableData", "notificationSettings", "exportDate"] {
            assert!(json.get(key).is_some(), "missing key {key}");
        }
        assert!(json.get("currentWeek").is_none());
        assert!(json.get("customization").is_none());
        assert!(
            json.get("exportDate")
                .and_then(|value| value.as_str())
                .is_some_and(|value| value.ends_with('Z'))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn enable_notifications_arms_triggers_when_granted() {
        let workspace = TempWorkspace::new();
        let storage: Arc<dyn StorageRepository> = Arc::new(InMemoryStorageRepository::default());
        let (state, _sink) = granted_state(&workspace, storage);
        generate_timetable_impl(&state, ScheduleConfig::default()).expect("generate");
        save_slot_impl(&state, 0, 1, 1, tuesday_slot_input("Algebra")).expect("save slot");

        let status = enable_notifications_impl(&state).await.expect("enable");
        assert_eq!(status.permission, "granted");
        assert!(status.enabled);
        assert_eq!(status.armed_triggers, 1);
        assert!(state.scheduler().is_armed());

        state.scheduler().cancel_all();
    }

    #[tokio::test(start_paused = true)]
    async fn enable_notifications_denied_stays_idle() {
        let workspace = TempWorkspace::new();
        let sink = Arc::new(InMemoryNotificationSink::default());
        let state = AppState::with_collaborators(
            workspace.path.clone(),
            Arc::new(InMemoryStorageRepository::default()),
            Arc::new(InMemoryPermissionSource::denied()),
            sink.clone(),
        )
        .expect("initialize app state")
        .with_now_provider(Arc::new(monday_noon));

        let status = enable_notifications_impl(&state).await.expect("enable");
        assert_eq!(status.permission, "denied");
        assert!(!status.enabled);
        assert_eq!(status.armed_triggers, 0);
        assert!(sink.delivered().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn undetermined_permission_resolves_through_request() {
        let workspace = TempWorkspace::new();
        let sink = Arc::new(InMemoryNotificationSink::default());
        let state = AppState::with_collaborators(
            workspace.path.clone(),
            Arc::new(InMemoryStorageRepository::default()),
            Arc::new(InMemoryPermissionSource::undetermined_resolving_to(
                PermissionStatus::Granted,
            )),
            sink,
        )
        .expect("initialize app state")
        .with_now_provider(Arc::new(monday_noon));

        let status = enable_notifications_impl(&state).await.expect("enable");
        assert_eq!(status.permission, "granted");
        assert!(status.enabled);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_cancels_every_armed_trigger() {
        let workspace = TempWorkspace::new();
        let storage: Arc<dyn StorageRepository> = Arc::new(InMemoryStorageRepository::default());
        let (state, sink) = granted_state(&workspace, storage);
        generate_timetable_impl(&state, ScheduleConfig::default()).expect("generate");
        save_slot_impl(&state, 0, 1, 1, tuesday_slot_input("Algebra")).expect("save slot");
        enable_notifications_impl(&state).await.expect("enable");
        assert!(state.scheduler().is_armed());

        reset_timetable_impl(&state).expect("reset");
        assert!(!state.scheduler().is_armed());
        assert!(current_week_entries_impl(&state).expect("list entries").is_empty());

        tokio::time::sleep(StdDuration::from_secs(30 * 24 * 3600)).await;
        tokio::task::yield_now().await;
        assert!(sink.delivered().is_empty());
    }

    #[test]
    fn test_notification_requires_granted_permission() {
        let workspace = TempWorkspace::new();
        let storage: Arc<dyn StorageRepository> = Arc::new(InMemoryStorageRepository::default());
        let (state, sink) = granted_state(&workspace, storage);

        assert!(test_notification_impl(&state).expect("test notification"));
        let delivered = sink.delivered();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].tag, "test-notification");

        let undetermined = workspace.app_state();
        assert!(!test_notification_impl(&undetermined).expect("test notification"));
    }

    #[test]
    fn update_settings_persists_the_document() {
        let workspace = TempWorkspace::new();
        let storage: Arc<dyn StorageRepository> = Arc::new(InMemoryStorageRepository::default());
        let (state, _sink) = granted_state(&workspace, Arc::clone(&storage));

        update_notification_settings_impl(
            &state,
            NotificationToggles {
                before_5: true,
                before_15: false,
                before_30: true,
                at_start: false,
                custom: false,
            },
        )
        .expect("update settings");

        let raw = storage
            .get(TIMETABLE_STORAGE_KEY)
            .expect("get")
            .expect("document persisted");
        let json: serde_json::Value = serde_json::from_str(&raw).expect("parse document");
        assert_eq!(
            json.pointer("/notificationSettings/before30"),
            Some(&serde_json::Value::Bool(true))
        );
    }
}
