use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::date_util::{monday_of_week, parse_iso_day, utc_day_of};
use crate::error::{Error, Result};

static RE_ISO_DAY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap());

/// Identifies the ISO calendar week a snapshot belongs to.
///
/// Canonical form is the ISO date of the week's Monday, so any two
/// instants inside the same Mon–Sun week (UTC-normalized) produce the
/// same key. Keys parse back from their string form, with non-Monday
/// dates normalized down to their week's Monday.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct BucketKey(NaiveDate);

impl BucketKey {
    /// Key for the week containing the given calendar day.
    pub fn from_date(d: NaiveDate) -> Self {
        BucketKey(monday_of_week(d))
    }

    /// Key for the week containing the given instant, UTC-normalized.
    pub fn from_instant(instant: DateTime<Utc>) -> Self {
        Self::from_date(utc_day_of(instant))
    }

    /// Parse a key string.
    ///
    /// Accepts canonical `YYYY-MM-DD` only; the parsed date is truncated
    /// to its week's Monday, so keys written by older clients that used
    /// other weekdays still land in the right bucket.
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if !RE_ISO_DAY.is_match(s) {
            return Err(Error::BucketParse(format!("not an ISO date: {s}")));
        }
        let day = parse_iso_day(s)
            .ok_or_else(|| Error::BucketParse(format!("invalid calendar date: {s}")))?;
        Ok(Self::from_date(day))
    }

    /// The Monday this key denotes.
    pub fn monday(&self) -> NaiveDate {
        self.0
    }

    /// Canonical string form for storage and lookup.
    pub fn to_key(&self) -> String {
        self.0.format("%Y-%m-%d").to_string()
    }
}

impl FromStr for BucketKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for BucketKey {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

impl From<BucketKey> for String {
    fn from(key: BucketKey) -> String {
        key.to_key()
    }
}

impl fmt::Display for BucketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_key())
    }
}
