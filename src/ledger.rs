use std::collections::{BTreeSet, HashMap, HashSet};

use chrono::NaiveDate;
use tracing::debug;

use crate::error::LedgerResult;
use crate::models::{non_empty, AttendanceRecord, RecordFilter, SortOrder, StudentSummary};

/// In-memory attendance records plus the set of known groups.
///
/// The group set always covers every group referenced by a record; groups may
/// also exist without any records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ledger {
    records: Vec<AttendanceRecord>,
    groups: BTreeSet<String>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_record(&mut self, record: AttendanceRecord) {
        if !self.groups.contains(record.group()) {
            debug!(group = record.group(), "registering group from new record");
            self.groups.insert(record.group().to_string());
        }
        self.records.push(record);
    }

    /// Removes the first record equal to `record`. Returns `false` when none matched.
    pub fn remove_record(&mut self, record: &AttendanceRecord) -> bool {
        match self.records.iter().position(|r| r == record) {
            Some(index) => {
                self.records.remove(index);
                true
            }
            None => false,
        }
    }

    /// Returns `false` when the group was already known.
    pub fn add_group(&mut self, name: &str) -> LedgerResult<bool> {
        let name = non_empty(name, "group")?;
        Ok(self.groups.insert(name))
    }

    /// Drops the group and every record in it. Returns the number of records removed.
    pub fn remove_group(&mut self, name: &str) -> usize {
        let name = name.trim();
        self.groups.remove(name);
        let before = self.records.len();
        self.records.retain(|r| r.group() != name);
        before - self.records.len()
    }

    pub fn records(&self) -> &[AttendanceRecord] {
        &self.records
    }

    pub fn groups(&self) -> impl Iterator<Item = &str> {
        self.groups.iter().map(String::as_str)
    }

    pub fn has_group(&self, name: &str) -> bool {
        self.groups.contains(name.trim())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn replace_with(&mut self, other: Ledger) {
        *self = other;
    }

    pub fn filter_by_date(&self, date: NaiveDate) -> Vec<AttendanceRecord> {
        self.filter(&RecordFilter {
            group: None,
            date: Some(date),
        })
    }

    pub fn filter(&self, filter: &RecordFilter) -> Vec<AttendanceRecord> {
        self.records
            .iter()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect()
    }

    /// Per-student visit counts, in order of each student's first record.
    pub fn summarize(&self) -> Vec<StudentSummary> {
        let mut index: HashMap<(&str, &str), usize> = HashMap::new();
        let mut dates: Vec<HashSet<NaiveDate>> = Vec::new();
        let mut summaries: Vec<StudentSummary> = Vec::new();

        for record in &self.records {
            let slot = *index
                .entry((record.full_name(), record.group()))
                .or_insert_with(|| {
                    summaries.push(StudentSummary {
                        full_name: record.full_name().to_string(),
                        group: record.group().to_string(),
                        visits: 0,
                    });
                    dates.push(HashSet::new());
                    summaries.len() - 1
                });
            dates[slot].insert(record.date());
        }

        for (summary, seen) in summaries.iter_mut().zip(&dates) {
            summary.visits = seen.len();
        }
        summaries
    }

    pub fn sorted_summaries(&self, order: SortOrder) -> Vec<StudentSummary> {
        let mut summaries = self.summarize();
        match order {
            SortOrder::Surname => summaries.sort_by(|a, b| a.surname().cmp(b.surname())),
            SortOrder::Visits => summaries.sort_by(|a, b| b.visits.cmp(&a.visits)),
        }
        summaries
    }

    /// Distinct visit dates of one student, oldest first.
    pub fn visit_history(&self, full_name: &str, group: &str) -> Vec<NaiveDate> {
        let (full_name, group) = (full_name.trim(), group.trim());
        let dates: BTreeSet<NaiveDate> = self
            .records
            .iter()
            .filter(|r| r.belongs_to(full_name, group))
            .map(AttendanceRecord::date)
            .collect();
        dates.into_iter().collect()
    }

    pub fn visits_for(&self, full_name: &str, group: &str) -> usize {
        self.visit_history(full_name, group).len()
    }

    pub fn visit_counts(&self) -> HashMap<(String, String), usize> {
        self.summarize()
            .into_iter()
            .map(|s| ((s.full_name, s.group), s.visits))
            .collect()
    }
}

/// Sorts raw records; `Visits` ranks each row by its student's distinct visit count.
pub fn sort_records(
    mut records: Vec<AttendanceRecord>,
    order: SortOrder,
    counts: &HashMap<(String, String), usize>,
) -> Vec<AttendanceRecord> {
    match order {
        SortOrder::Surname => records.sort_by(|a, b| a.surname().cmp(b.surname())),
        SortOrder::Visits => {
            let visits = |r: &AttendanceRecord| {
                counts
                    .get(&(r.full_name().to_string(), r.group().to_string()))
                    .copied()
                    .unwrap_or(0)
            };
            records.sort_by(|a, b| visits(b).cmp(&visits(a)));
        }
    }
    records
}
