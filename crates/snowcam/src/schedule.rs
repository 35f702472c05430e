//! Daily broadcast times in the resort timezone.

use chrono::{DateTime, Datelike, TimeDelta, Utc};
use chrono_tz::Tz;

use crate::config::ScheduleSlot;
use crate::instant::{resolve_instant, today_in};

/// Returns the first slot occurrence strictly after `now`.
///
/// Slots are resort-local wall-clock times, so the UTC fire time moves
/// with daylight saving. `None` only when there are no usable slots.
pub fn next_fire(
    now: DateTime<Utc>,
    tz: Tz,
    slots: &[ScheduleSlot],
) -> Option<(DateTime<Utc>, &ScheduleSlot)> {
    let today = today_in(tz, now);

    (0..=2)
        .filter_map(|offset| today.checked_add_signed(TimeDelta::days(offset)))
        .flat_map(|date| slots.iter().map(move |slot| (date, slot)))
        .filter_map(|(date, slot)| {
            resolve_instant(
                date.year(),
                date.month(),
                date.day(),
                slot.hour,
                slot.minute,
                tz,
            )
            .ok()
            .map(|at| (at, slot))
        })
        .filter(|(at, _)| *at > now)
        .min_by_key(|(at, _)| *at)
}

/// Caption title for a slot fired at `now`: `"{title} - 27.11.2025"`.
pub fn slot_title(slot: &ScheduleSlot, tz: Tz, now: DateTime<Utc>) -> String {
    format!("{} - {}", slot.title, today_in(tz, now).format("%d.%m.%Y"))
}
