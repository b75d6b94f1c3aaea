use time::{Duration, OffsetDateTime, Time, Weekday};

const DAY_START: Time = time::macros::time!(09:00);
const DAY_END: Time = time::macros::time!(17:00);

/// Hands out strictly increasing event times inside working hours
/// (09:00 to 17:00, Monday to Friday).
#[derive(Debug, Clone)]
pub struct WorkClock {
    next: OffsetDateTime,
    spacing: Duration,
}

impl WorkClock {
    pub fn new(start: OffsetDateTime, spacing_minutes: u32) -> Self {
        Self {
            next: start,
            spacing: Duration::minutes(i64::from(spacing_minutes.max(1))),
        }
    }

    pub fn next_slot(&mut self) -> OffsetDateTime {
        let slot = align(self.next);
        self.next = slot + self.spacing;
        slot
    }
}

/// Earliest working-hours instant at or after `t`.
fn align(mut t: OffsetDateTime) -> OffsetDateTime {
    loop {
        if is_weekend(t.weekday()) {
            t = (t + Duration::days(1)).replace_time(DAY_START);
            continue;
        }
        if t.time() < DAY_START {
            return t.replace_time(DAY_START);
        }
        if t.time() >= DAY_END {
            t = (t + Duration::days(1)).replace_time(DAY_START);
            continue;
        }
        return t;
    }
}

fn is_weekend(day: Weekday) -> bool {
    matches!(day, Weekday::Saturday | Weekday::Sunday)
}
