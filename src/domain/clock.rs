use crate::domain::models::ScheduleConfig;
use thiserror::Error;

pub const MINUTES_PER_DAY: u32 = 24 * 60;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid clock time '{0}': expected HH:MM")]
pub struct ClockFormatError(pub String);

/// Parse `H:MM`/`HH:MM` into a minute-of-day value.
pub fn parse_clock(text: &str) -> Result<u32, ClockFormatError> {
    let mut split = text.split(':');
    let (Some(hour_str), Some(minute_str), None) = (split.next(), split.next(), split.next())
    else {
        return Err(ClockFormatError(text.to_string()));
    };

    let hour = hour_str
        .parse::<u32>()
        .map_err(|_| ClockFormatError(text.to_string()))?;
    let minute = minute_str
        .parse::<u32>()
        .map_err(|_| ClockFormatError(text.to_string()))?;
    if hour > 23 || minute > 59 {
        return Err(ClockFormatError(text.to_string()));
    }
    Ok(hour * 60 + minute)
}

/// Format a minute-of-day value as zero-padded `HH:MM`. Values outside
/// [0, 1439] wrap via modulo; the wrap is cosmetic and callers must not
/// lean on it for scheduling math.
pub fn format_clock(minute_of_day: u32) -> String {
    let wrapped = minute_of_day % MINUTES_PER_DAY;
    format!("{:02}:{:02}", wrapped / 60, wrapped % 60)
}

/// Derive the `"HH:MM - HH:MM"` slot labels for a schedule grid.
///
/// Slots are emitted from the configured start while the slot's start is
/// before the configured end. The duration is never clipped, so the final
/// slot may extend past the end time when the span does not divide evenly.
/// That overshoot is observed upstream behavior and is kept as-is.
pub fn derive_slot_labels(config: &ScheduleConfig) -> Result<Vec<String>, ClockFormatError> {
    let start = parse_clock(&config.start_time)?;
    let end = parse_clock(&config.end_time)?;
    if config.slot_duration == 0 {
        return Ok(Vec::new());
    }

    let mut labels = Vec::new();
    let mut current = start;
    while current < end {
        let next = current + config.slot_duration;
        labels.push(format!("{} - {}", format_clock(current), format_clock(next)));
        current = next;
    }
    Ok(labels)
}
