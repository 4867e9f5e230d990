//! Password metadata returned by every store operation.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Password age and expiry as recorded in the backing store.
///
/// Values are kept exactly as the store returned them; use
/// [`UserPasswordMeta::password_expire_at`] and
/// [`UserPasswordMeta::password_last_change_at`] for parsed timestamps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPasswordMeta {
    /// When the current password expires.
    pub password_expire_date: Option<String>,

    /// When the password was last changed.
    pub password_last_change_date: Option<String>,
}

impl UserPasswordMeta {
    /// Create metadata from raw store values.
    pub fn new(
        password_expire_date: Option<String>,
        password_last_change_date: Option<String>,
    ) -> Self {
        Self {
            password_expire_date,
            password_last_change_date,
        }
    }

    /// Expiry parsed as an LDAP GeneralizedTime.
    #[must_use]
    pub fn password_expire_at(&self) -> Option<DateTime<Utc>> {
        self.password_expire_date
            .as_deref()
            .and_then(parse_generalized_time)
    }

    /// Last change parsed as an LDAP GeneralizedTime.
    #[must_use]
    pub fn password_last_change_at(&self) -> Option<DateTime<Utc>> {
        self.password_last_change_date
            .as_deref()
            .and_then(parse_generalized_time)
    }
}

/// Parse an RFC 4517 GeneralizedTime such as `20160518123456Z`.
///
/// Minutes and seconds are optional, a fraction applies to seconds only, and
/// the zone is either `Z` or a `+hh[mm]` / `-hh[mm]` offset. Returns `None`
/// for anything else.
pub fn parse_generalized_time(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();

    let (body, offset) = split_zone(value)?;
    let (digits, fraction) = match body.find(['.', ',']) {
        Some(idx) => (&body[..idx], Some(&body[idx + 1..])),
        None => (body, None),
    };

    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let field = |range: std::ops::Range<usize>| digits.get(range)?.parse::<u32>().ok();

    let (minute, second) = match digits.len() {
        10 => (0, 0),
        12 => (field(10..12)?, 0),
        14 => (field(10..12)?, field(12..14)?),
        _ => return None,
    };

    let nanos = match fraction {
        Some(frac) if digits.len() == 14 => fraction_to_nanos(frac)?,
        Some(_) => return None,
        None => 0,
    };

    let date = NaiveDate::from_ymd_opt(digits.get(0..4)?.parse().ok()?, field(4..6)?, field(6..8)?)?;
    let time = NaiveTime::from_hms_nano_opt(field(8..10)?, minute, second, nanos)?;
    let local = NaiveDateTime::new(date, time);

    offset
        .from_local_datetime(&local)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

fn split_zone(value: &str) -> Option<(&str, FixedOffset)> {
    if let Some(body) = value.strip_suffix(['Z', 'z']) {
        return Some((body, FixedOffset::east_opt(0)?));
    }

    let idx = value.rfind(['+', '-'])?;
    let (body, zone) = value.split_at(idx);
    let sign = if zone.starts_with('-') { -1 } else { 1 };
    let zone = &zone[1..];
    if !zone.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let (hours, minutes) = match zone.len() {
        2 => (zone.parse::<i32>().ok()?, 0),
        4 => (zone[..2].parse::<i32>().ok()?, zone[2..].parse::<i32>().ok()?),
        _ => return None,
    };
    if hours > 23 || minutes > 59 {
        return None;
    }

    Some((body, FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))?))
}

fn fraction_to_nanos(fraction: &str) -> Option<u32> {
    if fraction.is_empty() || !fraction.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let truncated: String = fraction.chars().take(9).collect();
    let scale = 10u32.pow(9 - truncated.len() as u32);
    Some(truncated.parse::<u32>().ok()? * scale)
}
