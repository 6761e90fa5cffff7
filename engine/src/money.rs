//! Money and calendar primitives.
//!
//! All monetary values are signed 64-bit integers in minor units. Assets
//! carry positive balances and liabilities negative ones; every sign
//! decision lives here so higher layers never second-guess it.

use jiff::civil::{Date, date};

/// Presentation transform for liability balances.
pub fn owed_minor(balance_minor: i64) -> i64 {
    -balance_minor
}

/// First calendar day of the month containing `d`; the canonical key for
/// monthly rollovers.
pub fn month_start(d: Date) -> Date {
    date(d.year(), d.month(), 1)
}

pub fn next_month_start(d: Date) -> Date {
    if d.month() == 12 {
        date(d.year() + 1, 1, 1)
    } else {
        date(d.year(), d.month() + 1, 1)
    }
}

pub fn prev_month_start(d: Date) -> Date {
    if d.month() == 1 {
        date(d.year() - 1, 12, 1)
    } else {
        date(d.year(), d.month() - 1, 1)
    }
}
