use chrono::{DateTime, Datelike, Days, NaiveDate, NaiveTime, Utc};

use super::dto::RetentionVerdict;
use crate::graph::dto::ApplicationRecord;

pub const EXPIRY_TAG_PREFIX: &str = "expireOn : ";
pub const EXPIRY_DATE_FORMAT: &str = "%Y-%m-%d";
pub const RETENTION_MONTHS: u32 = 3;

/// Parses an `expireOn : YYYY-MM-DD` tag.
///
/// Returns `None` for tags that do not carry the expiry prefix at all.
pub fn parse_expiry_tag(tag: &str) -> Option<Result<NaiveDate, chrono::ParseError>> {
    tag.strip_prefix(EXPIRY_TAG_PREFIX)
        .map(|raw| NaiveDate::parse_from_str(raw, EXPIRY_DATE_FORMAT))
}

/// Instant before which an application counts as old.
///
/// Months are subtracted without clamping: a day that does not exist in the
/// target month rolls over into the next one, so May 31 gives March 3 (or
/// March 2 in a leap year).
pub fn retention_cutoff(now: DateTime<Utc>) -> DateTime<Utc> {
    let months = now.year() * 12 + now.month0() as i32 - RETENTION_MONTHS as i32;
    let year = months.div_euclid(12);
    let month = months.rem_euclid(12) as u32 + 1;

    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|first| first.checked_add_days(Days::new(u64::from(now.day() - 1))))
        .map(|date| date.and_time(now.time()).and_utc())
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Outcome of scanning an application's `expireOn` tags.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExpiryCheck<'a> {
    pub has_not_expired: bool,
    /// Expiry tags whose date could not be parsed, in tag order.
    pub unparseable: Vec<&'a str>,
}

/// Scans the `expireOn` tags in order, so the last parseable one decides.
/// Unparseable dates are logged, recorded, and leave the running value alone.
pub fn check_expiry(app: &ApplicationRecord, now: DateTime<Utc>) -> ExpiryCheck<'_> {
    let mut check = ExpiryCheck::default();

    for tag in &app.tags {
        match parse_expiry_tag(tag) {
            Some(Ok(expires_on)) => {
                check.has_not_expired = expires_on.and_time(NaiveTime::MIN).and_utc() > now;
            }
            Some(Err(e)) => {
                log::warn!(
                    "Was not able to parse expiry tag '{}' on application {} (id={}): {}",
                    tag,
                    app.display_name(),
                    app.id,
                    e
                );
                check.unparseable.push(tag);
            }
            None => {}
        }
    }

    check
}

pub fn has_not_expired(app: &ApplicationRecord, now: DateTime<Utc>) -> bool {
    check_expiry(app, now).has_not_expired
}

pub fn evaluate(app: &ApplicationRecord, sign_in_count: usize, now: DateTime<Utc>) -> RetentionVerdict {
    let cutoff = retention_cutoff(now);
    let is_older_than_three_months = app
        .created_date_time
        .map(|created| created < cutoff)
        .unwrap_or(false);

    RetentionVerdict::new(
        is_older_than_three_months,
        sign_in_count > 0,
        has_not_expired(app, now),
    )
}
