use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{error, info, warn};

mod config;
mod error;
mod ledger;
mod logging;
mod models;
mod report;
mod workbook;

use config::AppConfig;
use error::LedgerError;
use ledger::Ledger;
use models::{
    format_date, group_matches, parse_date, AttendanceRecord, RecordFilter, SortOrder,
    StudentSummary,
};
use workbook::{ExportOptions, SheetFormat};

#[derive(Parser)]
#[command(name = "attendance-ledger")]
#[command(about = "Lecture attendance ledger backed by a spreadsheet", long_about = None)]
struct Cli {
    /// Ledger workbook (defaults to $ATTENDANCE_FILE, then attendance.xlsx)
    #[arg(long, global = true)]
    file: Option<PathBuf>,
    /// Log progress to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record one visit
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        group: String,
        /// Visit date as dd.mm.yyyy (defaults to today)
        #[arg(long, value_parser = parse_date_arg)]
        date: Option<NaiveDate>,
    },
    /// Delete one recorded visit
    Remove {
        #[arg(long)]
        name: String,
        #[arg(long)]
        group: String,
        #[arg(long, value_parser = parse_date_arg)]
        date: NaiveDate,
    },
    /// Register a group
    AddGroup { name: String },
    /// Delete a group together with all of its visits
    RemoveGroup { name: String },
    /// List known groups
    Groups,
    /// List recorded visits
    List {
        #[arg(long)]
        group: Option<String>,
        #[arg(long, value_parser = parse_date_arg)]
        date: Option<NaiveDate>,
        #[arg(long, value_enum)]
        sort: Option<SortOrder>,
        #[arg(long)]
        json: bool,
    },
    /// Per-student visit counts
    Summary {
        #[arg(long)]
        group: Option<String>,
        #[arg(long, value_enum, default_value = "surname")]
        sort: SortOrder,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        json: bool,
    },
    /// Dates a student attended
    History {
        #[arg(long)]
        name: String,
        #[arg(long)]
        group: String,
    },
    /// Write all visits to an .xlsx or .csv file
    Export {
        #[arg(long)]
        out: PathBuf,
        /// Add a visit count column
        #[arg(long)]
        with_visits: bool,
    },
    /// Replace the ledger with the contents of an .xlsx or .csv file
    Import {
        #[arg(long)]
        from: PathBuf,
    },
    /// Generate a markdown report
    Report {
        #[arg(long)]
        group: Option<String>,
        #[arg(long, default_value_t = 10)]
        top: usize,
        #[arg(long, default_value = "attendance-report.md")]
        out: PathBuf,
    },
}

#[derive(Serialize)]
struct RecordRow<'a> {
    full_name: &'a str,
    group: &'a str,
    date: String,
    visits: usize,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    let config = AppConfig::from_env().with_overrides(cli.file);

    let result = run(cli.command, &config);
    if let Err(err) = &result {
        let rejected = err
            .downcast_ref::<LedgerError>()
            .is_some_and(LedgerError::is_validation);
        if rejected {
            warn!(error = %err, "input rejected");
        } else {
            error!(error = %format!("{err:#}"), "command failed");
        }
    }
    result
}

fn run(command: Commands, config: &AppConfig) -> anyhow::Result<()> {
    let path = config.ledger_path.as_path();
    if SheetFormat::from_path(path)? != SheetFormat::Xlsx {
        bail!(
            "ledger file {} must be an .xlsx workbook; use import/export for csv",
            path.display()
        );
    }
    let mut ledger = workbook::load_or_default(path)
        .with_context(|| format!("failed to load ledger from {}", path.display()))?;

    match command {
        Commands::Add { name, group, date } => {
            let date = date.unwrap_or_else(|| Local::now().date_naive());
            let record = AttendanceRecord::new(&name, &group, date)?;
            let recorded = format!(
                "Recorded {} ({}) on {}.",
                record.full_name(),
                record.group(),
                format_date(record.date())
            );
            ledger.add_record(record);
            save_ledger(&ledger, path)?;
            println!("{recorded}");
        }
        Commands::Remove { name, group, date } => {
            let record = AttendanceRecord::new(&name, &group, date)?;
            if ledger.remove_record(&record) {
                save_ledger(&ledger, path)?;
                println!("Removed visit on {}.", format_date(date));
            } else {
                println!("No matching visit found.");
            }
        }
        Commands::AddGroup { name } => {
            if ledger.add_group(&name)? {
                save_ledger(&ledger, path)?;
                println!("Group {} added.", name.trim());
            } else {
                println!("Group {} already exists.", name.trim());
            }
        }
        Commands::RemoveGroup { name } => {
            if !ledger.has_group(&name) {
                println!("No group named {}.", name.trim());
                return Ok(());
            }
            let removed = ledger.remove_group(&name);
            info!(group = name.trim(), removed, "group removed");
            save_ledger(&ledger, path)?;
            println!("Group {} removed along with {removed} visits.", name.trim());
        }
        Commands::Groups => {
            let groups: Vec<&str> = ledger.groups().collect();
            if groups.is_empty() {
                println!("No groups registered.");
            }
            for group in groups {
                println!("{group}");
            }
        }
        Commands::List {
            group,
            date,
            sort,
            json,
        } => {
            let counts = ledger.visit_counts();
            let mut records = match (group, date) {
                (None, Some(date)) => ledger.filter_by_date(date),
                (group, date) => ledger.filter(&RecordFilter { group, date }),
            };
            if let Some(order) = sort {
                records = ledger::sort_records(records, order, &counts);
            }

            let rows: Vec<RecordRow> = records
                .iter()
                .map(|r| RecordRow {
                    full_name: r.full_name(),
                    group: r.group(),
                    date: format_date(r.date()),
                    visits: counts
                        .get(&(r.full_name().to_string(), r.group().to_string()))
                        .copied()
                        .unwrap_or(0),
                })
                .collect();

            if json {
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else if rows.is_empty() {
                println!("No visits match.");
            } else {
                for row in rows {
                    println!(
                        "- {} ({}) on {}, {} visits total",
                        row.full_name, row.group, row.date, row.visits
                    );
                }
            }
        }
        Commands::Summary {
            group,
            sort,
            limit,
            json,
        } => {
            let summaries = select_summaries(&ledger, group.as_deref(), sort, limit);

            if json {
                println!("{}", serde_json::to_string_pretty(&summaries)?);
            } else if summaries.is_empty() {
                println!("No attendance recorded.");
            } else {
                for summary in summaries {
                    println!(
                        "- {} ({}): {} visits",
                        summary.full_name, summary.group, summary.visits
                    );
                }
            }
        }
        Commands::History { name, group } => {
            let total = ledger.visits_for(&name, &group);
            println!("{} ({}): {total} visits", name.trim(), group.trim());
            for date in ledger.visit_history(&name, &group) {
                println!("- {}", format_date(date));
            }
        }
        Commands::Export { out, with_visits } => {
            workbook::save(
                &ledger,
                &out,
                ExportOptions {
                    include_visits: with_visits,
                },
            )
            .with_context(|| format!("failed to export to {}", out.display()))?;
            println!("Exported {} visits to {}.", ledger.len(), out.display());
        }
        Commands::Import { from } => {
            let imported = workbook::load(&from)
                .with_context(|| format!("failed to import {}", from.display()))?;
            ledger.replace_with(imported);
            save_ledger(&ledger, path)?;
            println!("Imported {} visits from {}.", ledger.len(), from.display());
        }
        Commands::Report { group, top, out } => {
            let report = report::build_report(&ledger, group.as_deref().map(str::trim), top);
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}

fn select_summaries(
    ledger: &Ledger,
    group: Option<&str>,
    sort: SortOrder,
    limit: Option<usize>,
) -> Vec<StudentSummary> {
    ledger
        .sorted_summaries(sort)
        .into_iter()
        .filter(|s| group_matches(group, &s.group))
        .take(limit.unwrap_or(usize::MAX))
        .collect()
}

fn save_ledger(ledger: &Ledger, path: &Path) -> anyhow::Result<()> {
    workbook::save(ledger, path, ExportOptions::default())
        .with_context(|| format!("failed to save ledger to {}", path.display()))
}

fn parse_date_arg(value: &str) -> Result<NaiveDate, String> {
    parse_date(value).map_err(|err| format!("expected dd.mm.yyyy: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn config_in(dir: &tempfile::TempDir) -> AppConfig {
        AppConfig::from_env().with_overrides(Some(dir.path().join("attendance.xlsx")))
    }

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("attendance-ledger").chain(args.iter().copied()))
            .unwrap()
    }

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn date_arguments_use_day_month_year() {
        let cli = parse(&[
            "add",
            "--name",
            "Ivan Petrov",
            "--group",
            "G1",
            "--date",
            "01.09.2024",
        ]);
        match cli.command {
            Commands::Add { date, .. } => {
                assert_eq!(date, NaiveDate::from_ymd_opt(2024, 9, 1));
            }
            _ => panic!("expected add"),
        }

        let err = Cli::try_parse_from(["attendance-ledger", "list", "--date", "2024-09-01"]);
        assert!(err.is_err());
    }

    #[test]
    fn sort_flag_accepts_surname_and_visits() {
        let cli = parse(&["summary", "--sort", "visits", "--limit", "3"]);
        match cli.command {
            Commands::Summary { sort, limit, .. } => {
                assert_eq!(sort, SortOrder::Visits);
                assert_eq!(limit, Some(3));
            }
            _ => panic!("expected summary"),
        }
    }

    #[test]
    fn commands_persist_between_runs() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(&dir);
        let day = NaiveDate::from_ymd_opt(2024, 9, 1).unwrap();

        for _ in 0..2 {
            run(
                Commands::Add {
                    name: "Ivan Petrov".to_string(),
                    group: "G1".to_string(),
                    date: Some(day),
                },
                &config,
            )
            .unwrap();
        }
        run(
            Commands::AddGroup {
                name: "G2".to_string(),
            },
            &config,
        )
        .unwrap();

        let ledger = workbook::load(&config.ledger_path).unwrap();
        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.visits_for("Ivan Petrov", "G1"), 1);
        assert_eq!(ledger.groups().collect::<Vec<_>>(), vec!["G1", "G2"]);

        run(
            Commands::RemoveGroup {
                name: "G1".to_string(),
            },
            &config,
        )
        .unwrap();
        let ledger = workbook::load(&config.ledger_path).unwrap();
        assert!(ledger.is_empty());
        assert_eq!(ledger.groups().collect::<Vec<_>>(), vec!["G2"]);
    }

    #[test]
    fn csv_ledger_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::from_env().with_overrides(Some(dir.path().join("ledger.csv")));

        let err = run(
            Commands::AddGroup {
                name: "G2".to_string(),
            },
            &config,
        )
        .unwrap_err();

        assert!(err.to_string().contains("must be an .xlsx workbook"));
        assert!(!config.ledger_path.exists());
    }

    #[test]
    fn add_fails_cleanly_when_ledger_cannot_be_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("attendance.xlsx");
        let config = AppConfig::from_env().with_overrides(Some(path.clone()));

        let err = run(
            Commands::Add {
                name: "Ivan Petrov".to_string(),
                group: "G1".to_string(),
                date: None,
            },
            &config,
        )
        .unwrap_err();

        assert!(format!("{err:#}").contains("failed to save ledger"));
        assert!(!path.exists());
    }

    #[test]
    fn summary_group_filter_treats_blank_as_all() {
        let mut ledger = Ledger::new();
        let day = NaiveDate::from_ymd_opt(2024, 9, 1).unwrap();
        ledger.add_record(AttendanceRecord::new("Petrov Ivan", "G1", day).unwrap());
        ledger.add_record(AttendanceRecord::new("Abramova Olga", "G2", day).unwrap());

        let all = select_summaries(&ledger, Some("  "), SortOrder::Surname, None);
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].full_name, "Abramova Olga");

        let one = select_summaries(&ledger, Some(" G1 "), SortOrder::Surname, None);
        assert_eq!(one.len(), 1);
        assert_eq!(one[0].group, "G1");

        let limited = select_summaries(&ledger, None, SortOrder::Surname, Some(1));
        assert_eq!(limited.len(), 1);
    }

    #[test]
    fn blank_name_is_rejected_before_saving() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(&dir);

        let err = run(
            Commands::Add {
                name: "  ".to_string(),
                group: "G1".to_string(),
                date: None,
            },
            &config,
        )
        .unwrap_err();

        assert!(err.to_string().contains("must not be empty"));
        assert!(!config.ledger_path.exists());
    }

    #[test]
    fn failed_import_leaves_ledger_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(&dir);
        run(
            Commands::Add {
                name: "Ivan Petrov".to_string(),
                group: "G1".to_string(),
                date: None,
            },
            &config,
        )
        .unwrap();

        let bad = dir.path().join("bad.csv");
        std::fs::write(&bad, "Full name,Group,Date\nOlga Abramova,G2,not-a-date\n").unwrap();
        let err = run(Commands::Import { from: bad }, &config).unwrap_err();
        assert!(format!("{err:#}").contains("not-a-date"));

        let ledger = workbook::load(&config.ledger_path).unwrap();
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.records()[0].full_name(), "Ivan Petrov");
    }

    #[test]
    fn import_replaces_ledger_wholesale() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(&dir);
        run(
            Commands::AddGroup {
                name: "Old".to_string(),
            },
            &config,
        )
        .unwrap();

        let source = dir.path().join("new.csv");
        std::fs::write(
            &source,
            "Full name,Group,Date,Visits\nOlga Abramova,G2,02.09.2024,7\n",
        )
        .unwrap();
        run(Commands::Import { from: source }, &config).unwrap();

        let ledger = workbook::load(&config.ledger_path).unwrap();
        assert_eq!(ledger.groups().collect::<Vec<_>>(), vec!["G2"]);
        assert_eq!(ledger.visits_for("Olga Abramova", "G2"), 1);
    }
}
