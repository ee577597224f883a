use crate::application::occurrence::next_occurrence;
use crate::domain::models::{EventEntry, LeadEntry, NotificationSettings, TimetableData};
use crate::infrastructure::notifier::{
    Notification, NotificationSink, PermissionSource, PermissionStatus,
};
use chrono::{DateTime, Duration, Local, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::task::AbortHandle;

/// Composite identity of one armed trigger. Re-arming the same
/// (day, subject, lead) pair replaces the previous trigger, so edits to
/// an entry never leak duplicate timers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TriggerKey {
    pub day_index: u32,
    pub subject: String,
    pub lead_minutes: u32,
}

impl TriggerKey {
    /// Delivery tag; the notification surface collapses duplicates by it.
    pub fn tag(&self) -> String {
        format!(
            "slot-{}-{}-{}",
            self.day_index, self.subject, self.lead_minutes
        )
    }
}

struct ArmedTrigger {
    abort: AbortHandle,
    fire_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct RearmOutcome {
    /// Triggers armed during the pass (arm operations, including ones a
    /// later week offset displaced).
    pub armed: usize,
    /// Projection attempts dropped because the entry's slot label did
    /// not parse.
    pub skipped: usize,
}

/// Owner of every armed notification trigger.
///
/// Idle (no tracked triggers) and Armed (at least one) are the only two
/// states; `rearm` always passes through Idle by cancelling everything
/// before deriving the new set, and a trigger firing removes only
/// itself. Arming spawns Tokio timer tasks, so `rearm` must run inside a
/// runtime whenever it can arm.
pub struct NotificationScheduler {
    triggers: Arc<Mutex<HashMap<TriggerKey, ArmedTrigger>>>,
    permissions: Arc<dyn PermissionSource>,
    sink: Arc<dyn NotificationSink>,
}

impl NotificationScheduler {
    pub fn new(permissions: Arc<dyn PermissionSource>, sink: Arc<dyn NotificationSink>) -> Self {
        Self {
            triggers: Arc::new(Mutex::new(HashMap::new())),
            permissions,
            sink,
        }
    }

    /// Cancel-and-recompute cycle over the schedule and settings.
    ///
    /// Only the current week's entries are read, for week offsets 0 and
    /// 1 alike; other weeks of a multi-week schedule never produce
    /// notifications while a different week is selected. That mirrors
    /// the upstream behavior and is kept as a documented limitation.
    pub fn rearm(
        &self,
        timetable: &TimetableData,
        current_week: u32,
        settings: &NotificationSettings,
        now: DateTime<Local>,
    ) -> RearmOutcome {
        self.cancel_all();

        let mut outcome = RearmOutcome::default();
        if !settings.enabled || self.permissions.query() != PermissionStatus::Granted {
            return outcome;
        }
        let leads = settings.lead_entries();
        if leads.is_empty() {
            return outcome;
        }
        let Some(week_data) = timetable.get(&current_week) else {
            return outcome;
        };

        for week_offset in 0..=1u32 {
            for (day_index, day_data) in week_data {
                for entry in day_data.values() {
                    if !entry.notifications {
                        continue;
                    }
                    let occurrence =
                        match next_occurrence(&entry.time, *day_index, week_offset, now) {
                            Ok(Some(occurrence)) => occurrence,
                            Ok(None) => continue,
                            Err(_) => {
                                outcome.skipped += 1;
                                continue;
                            }
                        };

                    for lead in &leads {
                        let fire_at = occurrence - Duration::minutes(i64::from(lead.minutes));
                        if fire_at <= now {
                            continue;
                        }
                        let Ok(delay) = (fire_at - now).to_std() else {
                            continue;
                        };

                        let key = TriggerKey {
                            day_index: *day_index,
                            subject: entry.subject.clone(),
                            lead_minutes: lead.minutes,
                        };
                        let notification = compose_notification(entry, lead, &key);
                        self.arm(key, fire_at.with_timezone(&Utc), delay, notification);
                        outcome.armed += 1;
                    }
                }
            }
        }

        outcome
    }

    fn arm(
        &self,
        key: TriggerKey,
        fire_at: DateTime<Utc>,
        delay: std::time::Duration,
        notification: Notification,
    ) {
        let registry = Arc::clone(&self.triggers);
        let sink = Arc::clone(&self.sink);
        let task_key = key.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            sink.deliver(notification);
            if let Ok(mut triggers) = registry.lock() {
                // Leave the record alone if a later re-arm replaced it.
                if triggers
                    .get(&task_key)
                    .is_some_and(|armed| armed.fire_at == fire_at)
                {
                    triggers.remove(&task_key);
                }
            }
        });

        if let Ok(mut triggers) = self.triggers.lock() {
            let armed = ArmedTrigger {
                abort: handle.abort_handle(),
                fire_at,
            };
            if let Some(previous) = triggers.insert(key, armed) {
                previous.abort.abort();
            }
        } else {
            handle.abort();
        }
    }

    /// Cancel every tracked trigger and clear the registry. Idempotent
    /// from Idle; after this returns no previously armed delivery
    /// callback runs.
    pub fn cancel_all(&self) {
        if let Ok(mut triggers) = self.triggers.lock() {
            for (_, trigger) in triggers.drain() {
                trigger.abort.abort();
            }
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed_len() > 0
    }

    pub fn armed_len(&self) -> usize {
        self.triggers.lock().map(|triggers| triggers.len()).unwrap_or(0)
    }

    /// Sorted snapshot of the tracked trigger identities.
    pub fn armed_keys(&self) -> Vec<TriggerKey> {
        let mut keys = self
            .triggers
            .lock()
            .map(|triggers| triggers.keys().cloned().collect::<Vec<_>>())
            .unwrap_or_default();
        keys.sort();
        keys
    }
}

fn compose_notification(entry: &EventEntry, lead: &LeadEntry, key: &TriggerKey) -> Notification {
    let message = if lead.minutes == 0 {
        format!("{} is starting now!", entry.subject)
    } else {
        format!("{} starts in {}", entry.subject, lead.label)
    };

    let mut lines = vec![message];
    if !entry.location.is_empty() {
        lines.push(format!("Location: {}", entry.location));
    }
    if !entry.instructor.is_empty() {
        lines.push(format!("Instructor: {}", entry.instructor));
    }

    Notification {
        title: format!("📅 {}", entry.subject),
        body: lines.join("\n"),
        tag: key.tag(),
        require_interaction: lead.minutes == 0,
    }
}
