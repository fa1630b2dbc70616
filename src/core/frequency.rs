//! Spacing of a time index.
//!
//! Monthly, quarterly and yearly data have no fixed spacing in seconds, so
//! they are stepped in calendar months.

use crate::error::{ForecastError, Result};
use chrono::{DateTime, Datelike, Days, Duration, Months, Utc};
use std::collections::BTreeMap;
use std::fmt;

/// Step between consecutive observations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frequency {
    /// Fixed elapsed time.
    Fixed(Duration),
    /// Whole calendar months at the same day and time of month.
    ///
    /// With `month_end`, every observation falls on the last day of its
    /// month, whatever that month's length.
    Months { step: u32, month_end: bool },
}

impl Frequency {
    pub fn seconds(seconds: i64) -> Self {
        Frequency::Fixed(Duration::seconds(seconds))
    }

    pub fn months(step: u32) -> Self {
        Frequency::Months {
            step,
            month_end: false,
        }
    }

    /// `anchor` moved forward by `steps` periods.
    pub fn advance(&self, anchor: DateTime<Utc>, steps: u32) -> Result<DateTime<Utc>> {
        let out_of_range = || {
            ForecastError::TimestampError(format!("{steps} steps of {self} past {anchor} overflow"))
        };
        match *self {
            Frequency::Fixed(spacing) => {
                let offset = i32::try_from(steps)
                    .ok()
                    .and_then(|n| spacing.checked_mul(n))
                    .ok_or_else(out_of_range)?;
                anchor.checked_add_signed(offset).ok_or_else(out_of_range)
            }
            Frequency::Months { step, month_end } => {
                let months = step.checked_mul(steps).ok_or_else(out_of_range)?;
                // Each step is taken from the anchor so short months do not
                // drag the day of month down
                let moved = anchor
                    .checked_add_months(Months::new(months))
                    .ok_or_else(out_of_range)?;
                if month_end {
                    last_day_of_month(moved).ok_or_else(out_of_range)
                } else {
                    Ok(moved)
                }
            }
        }
    }

    /// Calendar-month spacing shared by at least `tolerance` of the steps
    /// of `timestamps`, if any.
    pub(crate) fn infer_months(timestamps: &[DateTime<Utc>], tolerance: f64) -> Option<Self> {
        let total = timestamps.len().checked_sub(1).filter(|n| *n > 0)?;
        let mut counts: BTreeMap<(u32, bool), usize> = BTreeMap::new();
        for w in timestamps.windows(2) {
            if let Some(step) = month_step(w[0], w[1]) {
                *counts.entry(step).or_insert(0) += 1;
            }
        }

        // Ties resolve to the shorter step
        let mut modal: Option<((u32, bool), usize)> = None;
        for (step, count) in counts {
            if modal.map_or(true, |(_, best)| count > best) {
                modal = Some((step, count));
            }
        }
        let ((step, month_end), count) = modal?;
        if (count as f64 / total as f64) < tolerance {
            return None;
        }
        Some(Frequency::Months { step, month_end })
    }
}

impl From<Duration> for Frequency {
    fn from(spacing: Duration) -> Self {
        Frequency::Fixed(spacing)
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frequency::Fixed(spacing) => write!(f, "{}s", spacing.num_seconds()),
            Frequency::Months {
                step,
                month_end: true,
            } => write!(f, "{step} month(s), month end"),
            Frequency::Months { step, .. } => write!(f, "{step} month(s)"),
        }
    }
}

fn months_since_epoch(ts: DateTime<Utc>) -> i64 {
    i64::from(ts.year()) * 12 + i64::from(ts.month0())
}

fn is_month_end(ts: DateTime<Utc>) -> bool {
    ts.date_naive().succ_opt().is_some_and(|next| next.day() == 1)
}

fn last_day_of_month(ts: DateTime<Utc>) -> Option<DateTime<Utc>> {
    ts.with_day(1)?
        .checked_add_months(Months::new(1))?
        .checked_sub_days(Days::new(1))
}

/// Whole-month distance from `a` to `b` when both sit at the same point of
/// their months, plus whether that point is the month end.
fn month_step(a: DateTime<Utc>, b: DateTime<Utc>) -> Option<(u32, bool)> {
    if a.time() != b.time() {
        return None;
    }
    let months = u32::try_from(months_since_epoch(b) - months_since_epoch(a))
        .ok()
        .filter(|m| *m > 0)?;
    let month_end = is_month_end(a) && is_month_end(b);
    (a.day() == b.day() || month_end).then_some((months, month_end))
}
