use chrono::NaiveDate;
use clap::ValueEnum;
use serde::Serialize;

use crate::error::{LedgerError, LedgerResult};

pub const DATE_FORMAT: &str = "%d.%m.%Y";

/// One visit of one student on one date.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct AttendanceRecord {
    full_name: String,
    group: String,
    #[serde(with = "date_text")]
    date: NaiveDate,
}

impl AttendanceRecord {
    /// Builds a record from user input. Name and group are trimmed and must not be blank.
    pub fn new(full_name: &str, group: &str, date: NaiveDate) -> LedgerResult<Self> {
        Ok(Self {
            full_name: non_empty(full_name, "full name")?,
            group: non_empty(group, "group")?,
            date,
        })
    }

    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn surname(&self) -> &str {
        surname_of(&self.full_name)
    }

    pub fn belongs_to(&self, full_name: &str, group: &str) -> bool {
        self.full_name == full_name && self.group == group
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StudentSummary {
    pub full_name: String,
    pub group: String,
    pub visits: usize,
}

impl StudentSummary {
    pub fn surname(&self) -> &str {
        surname_of(&self.full_name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SortOrder {
    /// Ascending by the first word of the full name
    Surname,
    /// Descending by number of distinct visit dates
    Visits,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordFilter {
    pub group: Option<String>,
    pub date: Option<NaiveDate>,
}

impl RecordFilter {
    pub fn matches(&self, record: &AttendanceRecord) -> bool {
        let group_ok = group_matches(self.group.as_deref(), record.group());
        let date_ok = self.date.map_or(true, |date| record.date() == date);
        group_ok && date_ok
    }
}

/// A missing or blank group filter matches every group.
pub fn group_matches(filter: Option<&str>, group: &str) -> bool {
    match filter.map(str::trim) {
        Some(wanted) if !wanted.is_empty() => group == wanted,
        _ => true,
    }
}

pub fn surname_of(full_name: &str) -> &str {
    full_name.split_whitespace().next().unwrap_or("")
}

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub fn parse_date(value: &str) -> Result<NaiveDate, chrono::ParseError> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT)
}

pub fn non_empty(value: &str, field: &'static str) -> LedgerResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(LedgerError::EmptyField { field });
    }
    Ok(trimmed.to_string())
}

mod date_text {
    use chrono::NaiveDate;
    use serde::Serializer;

    pub fn serialize<S: Serializer>(date: &NaiveDate, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_date(*date))
    }
}
