//! Five-field cron expression parsing and evaluation.
//!
//! `minute hour day-of-month month day-of-week` with `*`, values, `a-b`
//! ranges, `a,b,c` lists, and `*/n` / `a-b/n` steps. Day-of-week runs 0-6
//! with 0 = Sunday; 7 is accepted as an alias for Sunday. Matching is a
//! plain conjunction across all five fields at minute resolution.

use std::collections::BTreeSet;

use chrono::{Datelike, Duration, TimeZone, Timelike};

use crate::types::Timestamp;

/// Upper bound for the forward scan in [`CronExpr::next_run`]: one leap year
/// of minutes. Expressions with no match inside the window yield `None`.
const NEXT_RUN_SCAN_MINUTES: i64 = 366 * 24 * 60;

/// Errors produced while parsing a cron expression.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CronError {
    #[error("Cron expression must have 5 fields, found {0}")]
    FieldCount(usize),

    #[error("Invalid {field} field: \"{value}\"")]
    InvalidField { field: &'static str, value: String },

    #[error("{field} value {value} out of range {min}-{max}")]
    OutOfRange {
        field: &'static str,
        value: u32,
        min: u32,
        max: u32,
    },
}

// ---------------------------------------------------------------------------
// Field
// ---------------------------------------------------------------------------

/// One parsed cron field, expanded to the set of matching values.
#[derive(Debug, Clone, PartialEq, Eq)]
struct CronField {
    values: BTreeSet<u32>,
}

impl CronField {
    fn contains(&self, value: u32) -> bool {
        self.values.contains(&value)
    }

    /// Parse one field given its inclusive bounds.
    fn parse(spec: &str, field: &'static str, min: u32, max: u32) -> Result<Self, CronError> {
        let mut values = BTreeSet::new();

        for item in spec.split(',') {
            let (range, step) = match item.split_once('/') {
                Some((range, step)) => {
                    let step: u32 = step.parse().map_err(|_| CronError::InvalidField {
                        field,
                        value: item.to_string(),
                    })?;
                    if step == 0 {
                        return Err(CronError::InvalidField {
                            field,
                            value: item.to_string(),
                        });
                    }
                    (range, step)
                }
                None => (item, 1),
            };

            let (lo, hi) = if range == "*" {
                (min, max)
            } else if let Some((a, b)) = range.split_once('-') {
                let lo = Self::parse_value(a, field)?;
                let hi = Self::parse_value(b, field)?;
                (lo, hi)
            } else {
                let v = Self::parse_value(range, field)?;
                (v, v)
            };

            for v in [lo, hi] {
                if v < min || v > max {
                    return Err(CronError::OutOfRange {
                        field,
                        value: v,
                        min,
                        max,
                    });
                }
            }
            if lo > hi {
                return Err(CronError::InvalidField {
                    field,
                    value: item.to_string(),
                });
            }

            let mut v = lo;
            while v <= hi {
                values.insert(v);
                v += step;
            }
        }

        Ok(Self { values })
    }

    fn parse_value(s: &str, field: &'static str) -> Result<u32, CronError> {
        s.parse().map_err(|_| CronError::InvalidField {
            field,
            value: s.to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// Expression
// ---------------------------------------------------------------------------

/// A parsed five-field cron expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronExpr {
    minute: CronField,
    hour: CronField,
    day_of_month: CronField,
    month: CronField,
    day_of_week: CronField,
}

impl CronExpr {
    /// Parse a five-field expression.
    pub fn parse(expr: &str) -> Result<Self, CronError> {
        let fields: Vec<&str> = expr.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(CronError::FieldCount(fields.len()));
        }

        let mut day_of_week = CronField::parse(fields[4], "day-of-week", 0, 7)?;
        // 7 is an alias for Sunday.
        if day_of_week.values.remove(&7) {
            day_of_week.values.insert(0);
        }

        Ok(Self {
            minute: CronField::parse(fields[0], "minute", 0, 59)?,
            hour: CronField::parse(fields[1], "hour", 0, 23)?,
            day_of_month: CronField::parse(fields[2], "day-of-month", 1, 31)?,
            month: CronField::parse(fields[3], "month", 1, 12)?,
            day_of_week,
        })
    }

    /// Whether the expression fires at the given instant (minute resolution;
    /// seconds are ignored). Conjunction across all five fields.
    pub fn matches(&self, t: Timestamp) -> bool {
        self.minute.contains(t.minute())
            && self.hour.contains(t.hour())
            && self.day_of_month.contains(t.day())
            && self.month.contains(t.month())
            && self.day_of_week.contains(t.weekday().num_days_from_sunday())
    }

    /// The next firing instant strictly after `from`, walking forward
    /// minute-by-minute. `None` when nothing matches within 366 days.
    pub fn next_run(&self, from: Timestamp) -> Option<Timestamp> {
        let mut t = truncate_to_minute(from) + Duration::minutes(1);
        for _ in 0..NEXT_RUN_SCAN_MINUTES {
            if self.matches(t) {
                return Some(t);
            }
            t += Duration::minutes(1);
        }
        None
    }
}

/// Zero out seconds and sub-second precision.
fn truncate_to_minute(t: Timestamp) -> Timestamp {
    chrono::Utc
        .with_ymd_and_hms(t.year(), t.month(), t.day(), t.hour(), t.minute(), 0)
        .single()
        .expect("truncating an existing timestamp cannot be ambiguous")
}
