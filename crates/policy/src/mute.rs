use chrono::{Timelike, Utc};
use chrono_tz::Tz;
use relaychat_store::{Room, RoomUser};

/// The specific mute reason a send was rejected for, carried back to the
/// caller so it can build a user-visible window description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MuteWindow {
    User { until: i64 },
    Room { until: i64 },
    Daily { start: String, duration_min: i64 },
}

/// Evaluate per-user, room-wide and daily-recurring mute windows, in that
/// order. Owners/admins bypass this entirely — callers check
/// role before reaching here.
pub fn evaluate_mute(room: &Room, member: &RoomUser, now_ms: i64, tz: Tz) -> Option<MuteWindow> {
    if member.is_muted {
        if let Some(until) = member.muted_until {
            if until > now_ms {
                return Some(MuteWindow::User { until });
            }
        }
    }
    if room.mute_flag {
        if let Some(until) = room.mute_until {
            if until > now_ms {
                return Some(MuteWindow::Room { until });
            }
        }
    }
    evaluate_daily_mute(room, now_ms, tz)
}

fn evaluate_daily_mute(room: &Room, now_ms: i64, tz: Tz) -> Option<MuteWindow> {
    let start = room.daily_mute_start.as_deref()?;
    if room.daily_mute_duration_min <= 0 {
        return None;
    }
    let now_minute = minute_of_day(now_ms, tz);
    if daily_window_contains(start, room.daily_mute_duration_min, now_minute) {
        Some(MuteWindow::Daily {
            start: start.to_string(),
            duration_min: room.daily_mute_duration_min,
        })
    } else {
        None
    }
}

/// True iff `now_minute` (0..1440) falls in `[start, start+duration)`,
/// wrapping past midnight. Expressed as one modular comparison so a window
/// like `start=23:50,duration=30` (23:50-00:20) needs no special-casing.
fn daily_window_contains(start_hhmm: &str, duration_min: i64, now_minute: i64) -> bool {
    let Some((hour, minute)) = parse_hhmm(start_hhmm) else {
        return false;
    };
    let start_minute = hour * 60 + minute;
    let diff = (now_minute - start_minute).rem_euclid(1440);
    diff < duration_min.min(1440)
}

fn parse_hhmm(s: &str) -> Option<(i64, i64)> {
    let (h, m) = s.split_once(':')?;
    let hour: i64 = h.parse().ok()?;
    let minute: i64 = m.parse().ok()?;
    if !(0..24).contains(&hour) || !(0..60).contains(&minute) {
        return None;
    }
    Some((hour, minute))
}

fn minute_of_day(now_ms: i64, tz: Tz) -> i64 {
    let utc = chrono::DateTime::from_timestamp_millis(now_ms).unwrap_or_else(Utc::now);
    let local = utc.with_timezone(&tz);
    i64::from(local.hour()) * 60 + i64::from(local.minute())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_crossing_midnight() {
        assert!(daily_window_contains("23:50", 30, 23 * 60 + 55));
        assert!(!daily_window_contains("23:50", 30, 21));
    }

    #[test]
    fn window_not_crossing_midnight() {
        assert!(daily_window_contains("09:00", 60, 9 * 60 + 30));
        assert!(!daily_window_contains("09:00", 60, 8 * 60 + 59));
        assert!(!daily_window_contains("09:00", 60, 10 * 60));
    }

    #[test]
    fn zero_or_negative_duration_never_mutes() {
        assert!(!daily_window_contains("09:00", 0, 9 * 60 + 1));
    }

    #[test]
    fn unparseable_start_never_mutes() {
        assert!(!daily_window_contains("not-a-time", 30, 0));
    }
}
