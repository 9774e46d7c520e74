use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Calendar period an energy delta is accounted over
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PeriodKind {
    Day,
    Month,
}

impl PeriodKind {
    /// Period key of `now` in the given zone: `YYYY-MM-DD` for days, `YYYY-MM` for months.
    pub fn key_at(&self, now: DateTime<Utc>, tz: &Tz) -> String {
        let local = tz.from_utc_datetime(&now.naive_utc());
        match self {
            PeriodKind::Day => local.format("%Y-%m-%d").to_string(),
            PeriodKind::Month => local.format("%Y-%m").to_string(),
        }
    }
}

/// Local calendar date of `now` in the given zone
pub fn local_date(now: DateTime<Utc>, tz: &Tz) -> NaiveDate {
    tz.from_utc_datetime(&now.naive_utc()).date_naive()
}
