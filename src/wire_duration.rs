//! Durations serialized as `HH:MM:SS.fff` time-span strings, as the subscription connection
//! options payload requires (section 4.3, step 4). Distinct from `humantime_serde`, which governs
//! the human-facing config-file representation of the same fields.

use std::time::Duration;

use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format_timespan(*duration))
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    let s = String::deserialize(deserializer)?;
    parse_timespan(&s).map_err(D::Error::custom)
}

pub fn format_timespan(duration: Duration) -> String {
    let total_millis = duration.as_millis();
    let millis = total_millis % 1000;
    let total_secs = duration.as_secs();
    let secs = total_secs % 60;
    let total_mins = total_secs / 60;
    let mins = total_mins % 60;
    let hours = total_mins / 60;
    format!("{hours:02}:{mins:02}:{secs:02}.{millis:03}")
}

pub fn parse_timespan(s: &str) -> Result<Duration, String> {
    let mut parts = s.splitn(2, '.');
    let hms = parts.next().ok_or("missing time component")?;
    let mut millis_str = parts.next().unwrap_or("0").to_string();
    while millis_str.len() < 3 {
        millis_str.push('0');
    }
    millis_str.truncate(3);
    let millis: u64 = millis_str.parse().map_err(|_| "invalid milliseconds")?;

    let mut hms_parts = hms.split(':');
    let hours: u64 = hms_parts
        .next()
        .ok_or("missing hours")?
        .parse()
        .map_err(|_| "invalid hours")?;
    let minutes: u64 = hms_parts
        .next()
        .ok_or("missing minutes")?
        .parse()
        .map_err(|_| "invalid minutes")?;
    let seconds: u64 = hms_parts
        .next()
        .ok_or("missing seconds")?
        .parse()
        .map_err(|_| "invalid seconds")?;

    Ok(Duration::from_millis(
        (hours * 3600 + minutes * 60 + seconds) * 1000 + millis,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_and_parses_round_trip() {
        let duration = Duration::from_millis(5 * 60 * 1000 + 1234);
        let formatted = format_timespan(duration);
        assert_eq!(formatted, "00:05:01.234");
        assert_eq!(parse_timespan(&formatted).unwrap(), duration);
    }
}
