// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Reporting periods.
//!
//! A period has optional inclusive bounds. Records dated before the start
//! form the opening position; records up to the end form the closing one.

use crate::error::ConfigError;
use chrono::{Datelike, Months, NaiveDate};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReportingPeriod {
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
}

impl ReportingPeriod {
    /// # Errors
    ///
    /// [`ConfigError::StartAfterEnd`] when both bounds are set and reversed.
    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Result<Self, ConfigError> {
        if let (Some(start), Some(end)) = (start, end) {
            if start > end {
                return Err(ConfigError::StartAfterEnd { start, end });
            }
        }
        Ok(Self { start, end })
    }

    /// Unbounded period covering the whole ledger.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn start(&self) -> Option<NaiveDate> {
        self.start
    }

    pub fn end(&self) -> Option<NaiveDate> {
        self.end
    }

    /// Inclusive on both ends.
    pub fn contains(&self, date: NaiveDate) -> bool {
        !self.precedes(date) && self.closes(date)
    }

    /// Dated before the start: part of the opening balance.
    pub fn precedes(&self, date: NaiveDate) -> bool {
        self.start.is_some_and(|start| date < start)
    }

    /// Dated on or before the end: part of the closing balance.
    pub fn closes(&self, date: NaiveDate) -> bool {
        self.end.is_none_or(|end| date <= end)
    }

    /// Heading such as `Period: 01 Apr 2024 - 31 Mar 2025`.
    pub fn text(&self, date_format: &str) -> Option<String> {
        match (self.start, self.end) {
            (Some(start), Some(end)) => Some(format!(
                "Period: {} - {}",
                start.format(date_format),
                end.format(date_format)
            )),
            (Some(start), None) => Some(format!("Period: Starting {}", start.format(date_format))),
            (None, Some(end)) => Some(format!("Period: Ending {}", end.format(date_format))),
            (None, None) => None,
        }
    }

    /// Window for month-by-month balances: at most the twelve months ending
    /// with the period's end (or `today` when open-ended).
    pub fn monthly_window(&self, today: NaiveDate) -> (NaiveDate, NaiveDate) {
        let end = self.end.unwrap_or(today);
        let earliest = first_of_month(end)
            .checked_sub_months(Months::new(11))
            .unwrap_or(NaiveDate::MIN);
        let start = match self.start {
            Some(start) if start < earliest => {
                warn!(%start, %earliest, "Periodic summary limited to the last 12 months");
                earliest
            }
            Some(start) => start,
            None => earliest,
        };
        (start, end)
    }
}

pub fn first_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

/// First day of every month touched by `start..=end`.
pub fn months_between(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    let mut months = Vec::new();
    let mut month = first_of_month(start);
    while month <= end {
        months.push(month);
        match month.checked_add_months(Months::new(1)) {
            Some(next) => month = next,
            None => break,
        }
    }
    months
}
