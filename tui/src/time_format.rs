use chrono::DateTime;
use chrono::Local;

/// Short label for when a message finished: `just now`, `N min ago`, `HH:MM`
/// for earlier today, and `Mon D HH:MM` otherwise.
pub(crate) fn relative_label(at: DateTime<Local>, now: DateTime<Local>) -> String {
    let elapsed = now.signed_duration_since(at);
    if elapsed.num_seconds() < 60 {
        return "just now".to_string();
    }
    if elapsed.num_minutes() < 60 {
        return format!("{} min ago", elapsed.num_minutes());
    }
    if at.date_naive() == now.date_naive() {
        return at.format("%H:%M").to_string();
    }
    at.format("%b %-d %H:%M").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn at(hour: u32, minute: u32) -> DateTime<Local> {
        match Local.with_ymd_and_hms(2024, 3, 7, hour, minute, 0).single() {
            Some(time) => time,
            None => panic!("ambiguous local time"),
        }
    }

    #[test]
    fn under_a_minute_is_just_now() {
        let now = at(12, 0);
        assert_eq!(relative_label(now - Duration::seconds(59), now), "just now");
        // Clock skew puts the stamp in the future.
        assert_eq!(relative_label(now + Duration::seconds(5), now), "just now");
    }

    #[test]
    fn under_an_hour_counts_minutes() {
        let now = at(12, 0);
        assert_eq!(relative_label(now - Duration::minutes(1), now), "1 min ago");
        assert_eq!(relative_label(now - Duration::minutes(59), now), "59 min ago");
    }

    #[test]
    fn earlier_today_shows_clock_time() {
        assert_eq!(relative_label(at(9, 5), at(12, 0)), "09:05");
    }

    #[test]
    fn other_days_show_the_date() {
        let now = at(12, 0) + Duration::days(1);
        assert_eq!(relative_label(at(9, 5), now), "Mar 7 09:05");
    }
}
