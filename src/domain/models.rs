use crate::domain::clock::parse_clock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const DAY_NAMES: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

pub fn day_name(day_index: u32) -> &'static str {
    DAY_NAMES.get(day_index as usize).copied().unwrap_or("")
}

/// week index -> day index -> slot index -> entry. Serialized with
/// string-encoded integer keys to stay compatible with the stored
/// `timetableData` document.
pub type TimetableData = BTreeMap<u32, BTreeMap<u32, BTreeMap<u32, EventEntry>>>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleConfig {
    pub weeks: u32,
    pub days: u32,
    pub start_time: String,
    pub end_time: String,
    pub slot_duration: u32,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            weeks: 1,
            days: 5,
            start_time: "08:00".to_string(),
            end_time: "17:00".to_string(),
            slot_duration: 60,
        }
    }
}

impl ScheduleConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.weeks == 0 {
            return Err("config.weeks must be >= 1".to_string());
        }
        if self.days == 0 || self.days > 7 {
            return Err("config.days must be between 1 and 7".to_string());
        }
        if self.slot_duration == 0 {
            return Err("config.slotDuration must be > 0".to_string());
        }
        let start = parse_clock(&self.start_time)
            .map_err(|_| "config.startTime must be HH:MM".to_string())?;
        let end = parse_clock(&self.end_time)
            .map_err(|_| "config.endTime must be HH:MM".to_string())?;
        if end <= start {
            return Err("config.endTime must be after config.startTime".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EntryColor {
    #[default]
    Blue,
    Green,
    Red,
    Orange,
    Purple,
    Teal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EventEntry {
    pub subject: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub instructor: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub color: EntryColor,
    /// Per-entry opt-out; entries default to notifiable.
    #[serde(default = "default_true")]
    pub notifications: bool,
    /// Copy of the slot label (`"HH:MM - HH:MM"`) taken when the entry
    /// was saved; the scheduler reads the start clock from it.
    pub time: String,
    pub day_name: String,
}

impl EventEntry {
    pub fn validate(&self) -> Result<(), String> {
        if self.subject.trim().is_empty() {
            return Err("entry.subject must not be empty".to_string());
        }
        Ok(())
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NotificationSettings {
    pub enabled: bool,
    pub before_5: bool,
    pub before_15: bool,
    pub before_30: bool,
    pub at_start: bool,
    pub custom: bool,
    #[serde(default)]
    pub custom_times: Vec<u32>,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            before_5: true,
            before_15: false,
            before_30: false,
            at_start: false,
            custom: false,
            custom_times: Vec::new(),
        }
    }
}

/// One lead time to notify at, paired with its display label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeadEntry {
    pub minutes: u32,
    pub label: String,
}

impl NotificationSettings {
    /// Ordered lead times: fixed intervals in descending order, then the
    /// at-start entry, then custom times in descending order. Each entry
    /// arms an independent trigger, so the order only pins down iteration
    /// for deterministic assertions.
    pub fn lead_entries(&self) -> Vec<LeadEntry> {
        let mut entries = Vec::new();
        if self.before_30 {
            entries.push(LeadEntry {
                minutes: 30,
                label: "30 minutes".to_string(),
            });
        }
        if self.before_15 {
            entries.push(LeadEntry {
                minutes: 15,
                label: "15 minutes".to_string(),
            });
        }
        if self.before_5 {
            entries.push(LeadEntry {
                minutes: 5,
                label: "5 minutes".to_string(),
            });
        }
        if self.at_start {
            entries.push(LeadEntry {
                minutes: 0,
                label: "now".to_string(),
            });
        }
        if self.custom {
            for &minutes in &self.custom_times {
                if minutes > 0 {
                    entries.push(LeadEntry {
                        minutes,
                        label: format_lead_label(minutes),
                    });
                }
            }
        }
        entries
    }

    /// Replace the custom lead times: values outside (0, 1440] are
    /// silently dropped, duplicates collapse, order is descending.
    pub fn set_custom_times(&mut self, values: &[u32]) {
        let mut times = values
            .iter()
            .copied()
            .filter(|value| *value > 0 && *value <= 1440)
            .collect::<Vec<_>>();
        times.sort_unstable_by(|left, right| right.cmp(left));
        times.dedup();
        self.custom_times = times;
    }
}

/// Human label for a lead time in minutes. Leads of a day or more floor
/// to whole days and discard the remainder, matching the upstream label
/// format (a 1500 minute lead reads "1 day").
pub fn format_lead_label(minutes: u32) -> String {
    if minutes < 60 {
        format!("{minutes} minutes")
    } else if minutes == 60 {
        "1 hour".to_string()
    } else if minutes < 1440 {
        let hours = minutes / 60;
        let remainder = minutes % 60;
        if remainder == 0 {
            format!("{hours} hours")
        } else {
            format!("{hours}h {remainder}m")
        }
    } else {
        let days = minutes / 1440;
        if days == 1 {
            "1 day".to_string()
        } else {
            format!("{days} days")
        }
    }
}
