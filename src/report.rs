use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write;

use chrono::NaiveDate;

use crate::ledger::Ledger;
use crate::models::{format_date, group_matches, RecordFilter, SortOrder, StudentSummary};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupSummary {
    pub group: String,
    pub students: usize,
    pub lectures: usize,
    pub visits: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LectureTurnout {
    pub date: NaiveDate,
    pub students: usize,
}

/// Per-group totals over every known group, including groups with no records.
pub fn summarize_by_group(ledger: &Ledger) -> Vec<GroupSummary> {
    let mut map: BTreeMap<String, GroupSummary> = ledger
        .groups()
        .map(|group| {
            (
                group.to_string(),
                GroupSummary {
                    group: group.to_string(),
                    students: 0,
                    lectures: 0,
                    visits: 0,
                },
            )
        })
        .collect();

    for summary in ledger.summarize() {
        if let Some(entry) = map.get_mut(&summary.group) {
            entry.students += 1;
            entry.visits += summary.visits;
        }
    }

    let mut dates: BTreeMap<&str, BTreeSet<NaiveDate>> = BTreeMap::new();
    for record in ledger.records() {
        dates.entry(record.group()).or_default().insert(record.date());
    }
    for (group, seen) in dates {
        if let Some(entry) = map.get_mut(group) {
            entry.lectures = seen.len();
        }
    }

    map.into_values().collect()
}

/// Distinct students present at each lecture date, oldest first.
pub fn turnout_by_date(ledger: &Ledger, group: Option<&str>) -> Vec<LectureTurnout> {
    let filter = RecordFilter {
        group: group.map(str::to_string),
        date: None,
    };
    let mut map: BTreeMap<NaiveDate, BTreeSet<(String, String)>> = BTreeMap::new();
    for record in ledger.filter(&filter) {
        map.entry(record.date())
            .or_default()
            .insert((record.full_name().to_string(), record.group().to_string()));
    }

    map.into_iter()
        .map(|(date, students)| LectureTurnout {
            date,
            students: students.len(),
        })
        .collect()
}

pub fn build_report(ledger: &Ledger, group: Option<&str>, top: usize) -> String {
    let summaries: Vec<StudentSummary> = ledger
        .sorted_summaries(SortOrder::Visits)
        .into_iter()
        .filter(|s| group_matches(group, &s.group))
        .collect();
    let groups: Vec<GroupSummary> = summarize_by_group(ledger)
        .into_iter()
        .filter(|s| group_matches(group, &s.group))
        .collect();
    let turnout = turnout_by_date(ledger, group);

    let mut output = String::new();
    let group_label = group
        .map(str::trim)
        .filter(|g| !g.is_empty())
        .unwrap_or("all groups");

    let _ = writeln!(output, "# Lecture Attendance Report");
    let _ = writeln!(
        output,
        "Generated for {} ({} students, {} lectures)",
        group_label,
        summaries.len(),
        turnout.len()
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Groups");

    if groups.is_empty() {
        let _ = writeln!(output, "No groups registered.");
    } else {
        for summary in groups.iter() {
            let _ = writeln!(
                output,
                "- {}: {} students, {} lectures, {} visits",
                summary.group, summary.students, summary.lectures, summary.visits
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Most Frequent Attendees");

    if summaries.is_empty() {
        let _ = writeln!(output, "No attendance recorded.");
    } else {
        for summary in summaries.iter().take(top) {
            let _ = writeln!(
                output,
                "- {} ({}): {} visits",
                summary.full_name, summary.group, summary.visits
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Turnout by Lecture");

    if turnout.is_empty() {
        let _ = writeln!(output, "No lectures recorded.");
    } else {
        for lecture in turnout.iter() {
            let _ = writeln!(
                output,
                "- {}: {} students",
                format_date(lecture.date),
                lecture.students
            );
        }
    }

    output
}
