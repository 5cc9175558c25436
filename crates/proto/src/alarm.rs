//! Alarm records as stored by the hub and evaluated by the scheduler.

use serde::{Deserialize, Serialize};

/// One scheduled wake-up.  `weekdays` uses 0 = Monday .. 6 = Sunday;
/// an empty set means every day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alarm {
    pub id: u32,
    /// "HH:MM", 24-hour clock.
    pub time: String,
    #[serde(default)]
    pub weekdays: Vec<u8>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ValidateError {
    #[error("'{0}' is not a valid HH:MM time")]
    BadTime(String),
    #[error("weekday {0} out of range 0..=6")]
    BadWeekday(u8),
    #[error("weekday {0} listed twice")]
    DuplicateWeekday(u8),
}

/// Strict "HH:MM" parse: exactly five chars, both fields two digits,
/// hour < 24, minute < 60.
pub fn parse_hhmm(s: &str) -> Option<(u8, u8)> {
    let bytes = s.as_bytes();
    if bytes.len() != 5 || bytes[2] != b':' {
        return None;
    }
    if !bytes[..2].iter().chain(&bytes[3..]).all(u8::is_ascii_digit) {
        return None;
    }
    let hour: u8 = s[..2].parse().ok()?;
    let minute: u8 = s[3..].parse().ok()?;
    if hour < 24 && minute < 60 {
        Some((hour, minute))
    } else {
        None
    }
}

/// Validate the mutable fields of an alarm record; used for both new
/// records and updates.
pub fn validate_fields(time: &str, weekdays: &[u8]) -> Result<(), ValidateError> {
    if parse_hhmm(time).is_none() {
        return Err(ValidateError::BadTime(time.to_string()));
    }
    let mut seen = [false; 7];
    for &d in weekdays {
        if d > 6 {
            return Err(ValidateError::BadWeekday(d));
        }
        if seen[d as usize] {
            return Err(ValidateError::DuplicateWeekday(d));
        }
        seen[d as usize] = true;
    }
    Ok(())
}

impl Alarm {
    pub fn validate(&self) -> Result<(), ValidateError> {
        validate_fields(&self.time, &self.weekdays)
    }

    /// Parsed time, or None for a malformed record (which then simply
    /// never matches a schedule pass).
    pub fn parse_time(&self) -> Option<(u8, u8)> {
        parse_hhmm(&self.time)
    }

    /// Whether this alarm rings on the given weekday (0 = Monday).
    pub fn rings_on(&self, weekday: u8) -> bool {
        self.weekdays.is_empty() || self.weekdays.contains(&weekday)
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn alarm(time: &str, weekdays: &[u8]) -> Alarm {
        Alarm {
            id: 1,
            time: time.to_string(),
            weekdays: weekdays.to_vec(),
            active: true,
        }
    }

    // -- parse_hhmm ----------------------------------------------------------

    #[test]
    fn parse_hhmm_valid_times() {
        assert_eq!(parse_hhmm("00:00"), Some((0, 0)));
        assert_eq!(parse_hhmm("07:30"), Some((7, 30)));
        assert_eq!(parse_hhmm("23:59"), Some((23, 59)));
    }

    #[test]
    fn parse_hhmm_rejects_out_of_range() {
        assert_eq!(parse_hhmm("24:00"), None);
        assert_eq!(parse_hhmm("12:60"), None);
        assert_eq!(parse_hhmm("29:30"), None);
    }

    #[test]
    fn parse_hhmm_rejects_malformed() {
        assert_eq!(parse_hhmm(""), None);
        assert_eq!(parse_hhmm("7:30"), None);
        assert_eq!(parse_hhmm("07-30"), None);
        assert_eq!(parse_hhmm("07:3a"), None);
        assert_eq!(parse_hhmm("07:305"), None);
        assert_eq!(parse_hhmm(" 7:30"), None);
    }

    // -- validate ------------------------------------------------------------

    #[test]
    fn validate_accepts_good_record() {
        assert!(alarm("06:45", &[0, 2, 4]).validate().is_ok());
        assert!(alarm("06:45", &[]).validate().is_ok());
    }

    #[test]
    fn validate_rejects_bad_time() {
        assert_eq!(
            alarm("6:45", &[]).validate(),
            Err(ValidateError::BadTime("6:45".into()))
        );
    }

    #[test]
    fn validate_rejects_weekday_out_of_range() {
        assert_eq!(
            alarm("06:45", &[7]).validate(),
            Err(ValidateError::BadWeekday(7))
        );
    }

    #[test]
    fn validate_rejects_duplicate_weekday() {
        assert_eq!(
            alarm("06:45", &[1, 1]).validate(),
            Err(ValidateError::DuplicateWeekday(1))
        );
    }

    // -- rings_on ------------------------------------------------------------

    #[test]
    fn rings_on_empty_set_means_every_day() {
        let a = alarm("07:00", &[]);
        for d in 0..7 {
            assert!(a.rings_on(d));
        }
    }

    #[test]
    fn rings_on_respects_listed_days() {
        let a = alarm("07:00", &[0, 4]);
        assert!(a.rings_on(0));
        assert!(a.rings_on(4));
        assert!(!a.rings_on(6));
    }

    // -- serde ---------------------------------------------------------------

    #[test]
    fn alarm_deserializes_with_defaults() {
        let a: Alarm = serde_json::from_str(r#"{"id":3,"time":"08:15"}"#).unwrap();
        assert_eq!(a.id, 3);
        assert!(a.weekdays.is_empty());
        assert!(a.active);
    }

    #[test]
    fn alarm_round_trips() {
        let a = alarm("22:05", &[5, 6]);
        let json = serde_json::to_string(&a).unwrap();
        let back: Alarm = serde_json::from_str(&json).unwrap();
        assert_eq!(back, a);
    }
}
