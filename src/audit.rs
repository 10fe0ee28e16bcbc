//! Append-only audit trail of movement transitions.
//!
//! Each entry records the sha256 digest of the previous entry for the same request, and
//! the request keeps the digest of its newest entry, so a trail can be checked end to
//! end with [`verify_chain`].
use super::error::{StockError, StockResult};
use super::types::{LogId, MovementId, TimeStamp, UserId};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use std::collections::BTreeMap;

pub mod actions {
    pub const REQUESTED: &str = "requested";
    pub const APPROVED: &str = "approved";
    pub const REJECTED: &str = "rejected";
    pub const EXECUTED: &str = "executed";
    pub const RESUBMITTED: &str = "resubmitted";
}

/// Upper bound on a single log listing.
pub const MAX_LOG_PAGE: usize = 500;

/// Free-form request context (ip, user agent, ...). Absent values are dropped on insert.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata(BTreeMap<String, String>);

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<V: ToString>(mut self, key: &str, value: Option<V>) -> Self {
        if let Some(value) = value {
            self.0.insert(key.to_string(), value.to_string());
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn into_map(self) -> BTreeMap<String, String> {
        self.0
    }
}

impl<K, V> FromIterator<(K, Option<V>)> for Metadata
where
    K: Into<String>,
    V: ToString,
{
    fn from_iter<I: IntoIterator<Item = (K, Option<V>)>>(iter: I) -> Self {
        Metadata(
            iter.into_iter()
                .filter_map(|(k, v)| v.map(|v| (k.into(), v.to_string())))
                .collect(),
        )
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct MovementLog {
    #[n(0)]
    pub id: LogId,
    #[n(1)]
    pub movement: MovementId,
    #[n(2)]
    pub action: String,
    #[n(3)]
    pub actor: UserId,
    #[n(4)]
    pub timestamp: TimeStamp<Utc>,
    #[n(5)]
    pub metadata: BTreeMap<String, String>,
    #[n(6)]
    pub prev: Option<String>,
}

impl MovementLog {
    pub fn new(
        movement: MovementId,
        action: &str,
        actor: UserId,
        metadata: Metadata,
        prev: Option<String>,
    ) -> StockResult<Self> {
        let action = action.trim();
        if action.is_empty() {
            return Err(StockError::Validation("log action is required".into()));
        }
        Ok(Self {
            id: LogId::new(),
            movement,
            action: action.to_string(),
            actor,
            timestamp: TimeStamp::new(),
            metadata: metadata.into_map(),
            prev,
        })
    }

    /// sha256 over the CBOR encoding of the entry.
    pub fn digest(&self) -> StockResult<String> {
        let cbor = minicbor::to_vec(self)?;
        Ok(sha256::digest(&cbor))
    }

    /// Storage key: `movement id ‖ 0x00 ‖ uuid7 bytes`, so one request's entries are
    /// contiguous and in append order.
    pub fn key(&self) -> StockResult<Vec<u8>> {
        let payload = self
            .id
            .payload()
            .ok_or_else(|| StockError::Encoding(format!("malformed log id {}", self.id)))?;
        let mut key = trail_prefix(&self.movement);
        key.extend_from_slice(&payload);
        Ok(key)
    }
}

pub fn trail_prefix(movement: &MovementId) -> Vec<u8> {
    let mut prefix = movement.as_str().as_bytes().to_vec();
    prefix.push(0);
    prefix
}

/// Check that `entries` (oldest first) link up and end at `head`.
pub fn verify_chain(entries: &[MovementLog], head: Option<&str>) -> StockResult<bool> {
    let mut expected_prev: Option<String> = None;
    for entry in entries {
        if entry.prev != expected_prev {
            return Ok(false);
        }
        expected_prev = Some(entry.digest()?);
    }
    Ok(expected_prev.as_deref() == head)
}

/// Inclusive UTC bounds on the entry timestamp.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DateRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl DateRange {
    /// Builds a range from `YYYY-MM-DD` (or RFC 3339) strings. The start snaps to the
    /// beginning of its UTC day and the end to the last millisecond of its UTC day.
    /// Unparseable bounds are ignored.
    pub fn from_days(start: Option<&str>, end: Option<&str>) -> Self {
        Self {
            start: start.and_then(|s| parse_date_boundary(s, false)),
            end: end.and_then(|s| parse_date_boundary(s, true)),
        }
    }

    pub fn contains(&self, at: &DateTime<Utc>) -> bool {
        self.start.is_none_or(|start| *at >= start) && self.end.is_none_or(|end| *at <= end)
    }
}

pub fn parse_date_boundary(value: &str, end_of_day: bool) -> Option<DateTime<Utc>> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    let day = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .or_else(|| {
            DateTime::parse_from_rfc3339(trimmed)
                .ok()
                .map(|dt| dt.with_timezone(&Utc).date_naive())
        })?;
    let time = if end_of_day {
        NaiveTime::from_hms_milli_opt(23, 59, 59, 999)?
    } else {
        NaiveTime::from_hms_opt(0, 0, 0)?
    };
    Some(day.and_time(time).and_utc())
}

#[derive(Debug, Clone, Default)]
pub struct LogFilter {
    pub movement: Option<MovementId>,
    pub action: Option<String>,
    pub range: DateRange,
}

impl LogFilter {
    pub fn matches(&self, entry: &MovementLog) -> bool {
        self.movement.as_ref().is_none_or(|m| &entry.movement == m)
            && self.action.as_deref().is_none_or(|a| entry.action == a)
            && self.range.contains(&entry.timestamp.to_datetime_utc())
    }
}

/// Clamp a caller supplied page size to `1..=MAX_LOG_PAGE`.
pub fn clamp_limit(requested: Option<usize>, default: usize) -> usize {
    requested.unwrap_or(default).clamp(1, MAX_LOG_PAGE)
}
