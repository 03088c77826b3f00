//! Column values as seen by the pruning engine.
//!
//! Only the operations pruning needs are provided: a three-way comparison
//! with numeric promotion, domain coercion, a discrete predecessor for the
//! range `>` boundary, set membership and a placement hash.

use std::cmp::Ordering;
use std::fmt;

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

/// Column domain of a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DbType {
    /// 64-bit signed integer.
    Int,
    /// Double precision float.
    Double,
    /// Character string.
    String,
    /// Calendar date.
    Date,
    /// Time of day, second precision.
    Time,
    /// Date and time, second precision.
    Timestamp,
    /// Collection of values.
    Set,
}

impl fmt::Display for DbType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Int => "INTEGER",
            Self::Double => "DOUBLE",
            Self::String => "VARCHAR",
            Self::Date => "DATE",
            Self::Time => "TIME",
            Self::Timestamp => "TIMESTAMP",
            Self::Set => "SET",
        };
        f.write_str(name)
    }
}

/// A single column value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DbValue {
    /// SQL NULL.
    Null,
    /// Integer value.
    Int(i64),
    /// Floating point value.
    Double(f64),
    /// String value.
    String(String),
    /// Date value.
    Date(NaiveDate),
    /// Time value.
    Time(NaiveTime),
    /// Timestamp value.
    Timestamp(NaiveDateTime),
    /// Collection value (IN lists, LIST partition values).
    Set(Vec<DbValue>),
}

impl DbValue {
    /// Returns true for SQL NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns the domain of this value, `None` for NULL.
    #[must_use]
    pub fn db_type(&self) -> Option<DbType> {
        match self {
            Self::Null => None,
            Self::Int(_) => Some(DbType::Int),
            Self::Double(_) => Some(DbType::Double),
            Self::String(_) => Some(DbType::String),
            Self::Date(_) => Some(DbType::Date),
            Self::Time(_) => Some(DbType::Time),
            Self::Timestamp(_) => Some(DbType::Timestamp),
            Self::Set(_) => Some(DbType::Set),
        }
    }

    /// Returns the members of a collection value.
    #[must_use]
    pub fn as_set(&self) -> Option<&[DbValue]> {
        match self {
            Self::Set(values) => Some(values),
            _ => None,
        }
    }

    /// Three-way comparison.
    ///
    /// Integers and doubles are compared numerically. NULL sorts below every
    /// other value. Returns `None` when the two domains cannot be ordered
    /// against each other.
    #[must_use]
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Null, Self::Null) => Some(Ordering::Equal),
            (Self::Null, _) => Some(Ordering::Less),
            (_, Self::Null) => Some(Ordering::Greater),
            (Self::Int(a), Self::Int(b)) => Some(a.cmp(b)),
            (Self::Int(a), Self::Double(b)) => (*a as f64).partial_cmp(b),
            (Self::Double(a), Self::Int(b)) => a.partial_cmp(&(*b as f64)),
            (Self::Double(a), Self::Double(b)) => a.partial_cmp(b),
            (Self::String(a), Self::String(b)) => Some(a.cmp(b)),
            (Self::Date(a), Self::Date(b)) => Some(a.cmp(b)),
            (Self::Time(a), Self::Time(b)) => Some(a.cmp(b)),
            (Self::Timestamp(a), Self::Timestamp(b)) => Some(a.cmp(b)),
            (Self::Date(a), Self::Timestamp(b)) => Some(date_start(*a).cmp(b)),
            (Self::Timestamp(a), Self::Date(b)) => Some(a.cmp(&date_start(*b))),
            (Self::Set(a), Self::Set(b)) => compare_sets(a, b),
            _ => None,
        }
    }

    /// Value equality under [`DbValue::compare`].
    #[must_use]
    pub fn equals(&self, other: &Self) -> bool {
        self.compare(other) == Some(Ordering::Equal)
    }

    /// Coerces the value into `target`.
    ///
    /// Returns `None` when the value cannot be represented in the target
    /// domain. NULL coerces to NULL in every domain.
    #[must_use]
    pub fn cast_to(&self, target: DbType) -> Option<DbValue> {
        if self.db_type() == Some(target) || self.is_null() {
            return Some(self.clone());
        }
        match (self, target) {
            (Self::Double(d), DbType::Int) => {
                let rounded = d.round();
                if rounded.is_finite() && rounded >= i64::MIN as f64 && rounded <= i64::MAX as f64
                {
                    Some(Self::Int(rounded as i64))
                } else {
                    None
                }
            }
            (Self::Int(i), DbType::Double) => Some(Self::Double(*i as f64)),
            (Self::String(s), DbType::Int) => s.trim().parse().ok().map(Self::Int),
            (Self::String(s), DbType::Double) => s.trim().parse().ok().map(Self::Double),
            (Self::String(s), DbType::Date) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
                .ok()
                .map(Self::Date),
            (Self::String(s), DbType::Time) => NaiveTime::parse_from_str(s.trim(), "%H:%M:%S")
                .ok()
                .map(Self::Time),
            (Self::String(s), DbType::Timestamp) => {
                NaiveDateTime::parse_from_str(s.trim(), "%Y-%m-%d %H:%M:%S")
                    .ok()
                    .map(Self::Timestamp)
            }
            (Self::Int(_) | Self::Double(_), DbType::String) => Some(Self::String(self.to_string())),
            (Self::Date(d), DbType::String) => Some(Self::String(d.format("%Y-%m-%d").to_string())),
            (Self::Time(t), DbType::String) => Some(Self::String(t.format("%H:%M:%S").to_string())),
            (Self::Timestamp(ts), DbType::String) => Some(Self::String(
                ts.format("%Y-%m-%d %H:%M:%S").to_string(),
            )),
            (Self::Date(d), DbType::Timestamp) => Some(Self::Timestamp(date_start(*d))),
            (Self::Timestamp(ts), DbType::Date) => Some(Self::Date(ts.date())),
            (Self::Timestamp(ts), DbType::Time) => Some(Self::Time(ts.time())),
            _ => None,
        }
    }

    /// Returns the greatest value strictly below `self` in its domain.
    ///
    /// Only discrete domains have a predecessor: integers, dates, times and
    /// timestamps (one second). Doubles, strings and sets return `None`, as
    /// does a value already at the bottom of its domain.
    #[must_use]
    pub fn predecessor(&self) -> Option<DbValue> {
        match self {
            Self::Int(i) => i.checked_sub(1).map(Self::Int),
            Self::Date(d) => d.pred_opt().map(Self::Date),
            Self::Time(t) => {
                if *t == NaiveTime::MIN {
                    None
                } else {
                    Some(Self::Time(*t - Duration::seconds(1)))
                }
            }
            Self::Timestamp(ts) => ts.checked_sub_signed(Duration::seconds(1)).map(Self::Timestamp),
            _ => None,
        }
    }

    /// Returns true if a collection value holds a member equal to `value`.
    #[must_use]
    pub fn set_contains(&self, value: &DbValue) -> bool {
        self.as_set()
            .is_some_and(|members| members.iter().any(|m| m.equals(value)))
    }

    /// Maps the value to a bucket in `0..buckets`.
    ///
    /// The function is fixed: rows already stored in hash partitions were
    /// placed by it, so its output must not vary between processes or
    /// releases. Callers coerce the value to the key domain first so that
    /// equal keys of different literal types land in the same bucket.
    #[must_use]
    pub fn partition_hash(&self, buckets: usize) -> usize {
        if buckets == 0 {
            return 0;
        }
        let mut hash = StableHasher::new();
        self.feed(&mut hash);
        (hash.finish() % buckets as u64) as usize
    }

    fn feed(&self, hash: &mut StableHasher) {
        match self {
            Self::Null => hash.write(&[0]),
            Self::Int(i) => {
                hash.write(&[1]);
                hash.write(&i.to_le_bytes());
            }
            Self::Double(d) => {
                hash.write(&[2]);
                // -0.0 and 0.0 compare equal, so they must hash equal
                let canonical = if *d == 0.0 { 0.0f64 } else { *d };
                hash.write(&canonical.to_bits().to_le_bytes());
            }
            Self::String(s) => {
                hash.write(&[3]);
                hash.write(s.as_bytes());
            }
            Self::Date(d) => {
                hash.write(&[4]);
                hash.write(&d.num_days_from_ce().to_le_bytes());
            }
            Self::Time(t) => {
                hash.write(&[5]);
                hash.write(&t.num_seconds_from_midnight().to_le_bytes());
            }
            Self::Timestamp(ts) => {
                hash.write(&[6]);
                hash.write(&ts.and_utc().timestamp().to_le_bytes());
            }
            Self::Set(members) => {
                hash.write(&[7]);
                for member in members {
                    member.feed(hash);
                }
            }
        }
    }
}

fn date_start(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN)
}

fn compare_sets(a: &[DbValue], b: &[DbValue]) -> Option<Ordering> {
    for (x, y) in a.iter().zip(b) {
        match x.compare(y)? {
            Ordering::Equal => {}
            other => return Some(other),
        }
    }
    Some(a.len().cmp(&b.len()))
}

/// 64-bit FNV-1a. Kept private and fixed; see [`DbValue::partition_hash`].
struct StableHasher(u64);

impl StableHasher {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0100_0000_01b3;

    fn new() -> Self {
        Self(Self::OFFSET)
    }

    fn write(&mut self, bytes: &[u8]) {
        for byte in bytes {
            self.0 ^= u64::from(*byte);
            self.0 = self.0.wrapping_mul(Self::PRIME);
        }
    }

    fn finish(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for DbValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Double(d) => write!(f, "{d}"),
            Self::String(s) => write!(f, "'{s}'"),
            Self::Date(d) => write!(f, "DATE '{}'", d.format("%Y-%m-%d")),
            Self::Time(t) => write!(f, "TIME '{}'", t.format("%H:%M:%S")),
            Self::Timestamp(ts) => write!(f, "TIMESTAMP '{}'", ts.format("%Y-%m-%d %H:%M:%S")),
            Self::Set(members) => {
                f.write_str("{")?;
                for (i, member) in members.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{member}")?;
                }
                f.write_str("}")
            }
        }
    }
}

impl PartialEq for DbValue {
    fn eq(&self, other: &Self) -> bool {
        self.equals(other)
    }
}

impl From<i64> for DbValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for DbValue {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for DbValue {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

impl From<&str> for DbValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for DbValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<NaiveDate> for DbValue {
    fn from(v: NaiveDate) -> Self {
        Self::Date(v)
    }
}

impl From<NaiveDateTime> for DbValue {
    fn from(v: NaiveDateTime) -> Self {
        Self::Timestamp(v)
    }
}

impl<T: Into<DbValue>> From<Vec<T>> for DbValue {
    fn from(v: Vec<T>) -> Self {
        Self::Set(v.into_iter().map(Into::into).collect())
    }
}
