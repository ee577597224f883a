use crate::domain::clock::{ClockFormatError, parse_clock};
use chrono::{DateTime, Datelike, Duration, Local, LocalResult, TimeZone};

/// Project the next concrete occurrence of a weekly recurring slot.
///
/// `slot_label` is the entry's `"HH:MM - HH:MM"` label (only the start
/// clock is read). `day_index` is Monday-first, zero-based. `week_offset`
/// 0 targets the upcoming instance of that weekday, 1 the one a week
/// later. A candidate at or before `now` yields `None`; the caller is
/// expected to iterate both offsets rather than rely on any roll-forward
/// here. Recurrence is implicit (weekday + clock), so callers must
/// re-project against a fresh `now` on every re-arm.
pub fn next_occurrence(
    slot_label: &str,
    day_index: u32,
    week_offset: u32,
    now: DateTime<Local>,
) -> Result<Option<DateTime<Local>>, ClockFormatError> {
    let start_clock = slot_label.split(" - ").next().unwrap_or(slot_label).trim();
    let minute_of_day = parse_clock(start_clock)?;
    let (hour, minute) = (minute_of_day / 60, minute_of_day % 60);

    // Both sides on the Monday=1..Sunday=7 scale.
    let today = now.weekday().number_from_monday();
    let target_day = day_index + 1;
    let days_until = (target_day + 7 - today) % 7 + week_offset * 7;

    let date = now.date_naive() + Duration::days(i64::from(days_until));
    let Some(naive) = date.and_hms_opt(hour, minute, 0) else {
        return Ok(None);
    };
    let candidate = match Local.from_local_datetime(&naive) {
        LocalResult::Single(candidate) => candidate,
        LocalResult::Ambiguous(earliest, _) => earliest,
        LocalResult::None => return Ok(None),
    };

    if candidate <= now {
        return Ok(None);
    }
    Ok(Some(candidate))
}
