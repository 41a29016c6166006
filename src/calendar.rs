//! Per-year calendar adjustments applied to granule acquisition dates.
//!
//! Most years need none. A year whose collection started partway through (2015
//! for SMAP L4, which begins on March 31st) gets a [`MissionStart`] rule that drops
//! anything earlier and can optionally relabel the remaining days.
use std::collections::HashMap;
use std::fmt::Debug;

use chrono::{Duration, NaiveDate};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{date} precedes the start of valid data on {start}")]
pub struct DateRejected {
    pub date: NaiveDate,
    pub start: NaiveDate,
}

pub trait CalendarAdjustment: Debug {
    /// Map an acquisition date to the day label its granule is grouped under.
    fn adjust(&self, date: NaiveDate) -> Result<NaiveDate, DateRejected>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MissionStart {
    start: NaiveDate,
    offset_days: i64,
}

impl MissionStart {
    pub fn new(start: NaiveDate, offset_days: i64) -> Self {
        Self { start, offset_days }
    }
}

impl CalendarAdjustment for MissionStart {
    fn adjust(&self, date: NaiveDate) -> Result<NaiveDate, DateRejected> {
        if date < self.start {
            return Err(DateRejected { date, start: self.start });
        }
        Ok(date + Duration::days(self.offset_days))
    }
}

/// Calendar adjustments keyed by the year of the acquisition date. Years without
/// a rule pass dates through unchanged.
#[derive(Debug, Default)]
pub struct CalendarRules {
    rules: HashMap<i32, Box<dyn CalendarAdjustment>>,
}

impl CalendarRules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<A: CalendarAdjustment + 'static>(&mut self, year: i32, rule: A) {
        self.rules.insert(year, Box::new(rule));
    }

    pub fn has_rule(&self, year: i32) -> bool {
        self.rules.contains_key(&year)
    }

    pub fn adjust(&self, date: NaiveDate) -> Result<NaiveDate, DateRejected> {
        use chrono::Datelike;
        match self.rules.get(&date.year()) {
            Some(rule) => rule.adjust(date),
            None => Ok(date),
        }
    }
}
