use std::path::Path;

use calamine::{open_workbook, Data, DataType, Range, Reader, Xlsx};
use chrono::NaiveDate;
use rust_xlsxwriter::{Format, Workbook, Worksheet};
use tracing::{debug, info, warn};

use crate::error::{LedgerError, LedgerResult};
use crate::ledger::Ledger;
use crate::models::{format_date, parse_date, AttendanceRecord};

pub const ATTENDANCE_SHEET: &str = "Attendance";
pub const GROUPS_SHEET: &str = "Groups";

const HEADER_NAME: &str = "Full name";
const HEADER_GROUP: &str = "Group";
const HEADER_DATE: &str = "Date";
const HEADER_VISITS: &str = "Visits";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SheetFormat {
    Xlsx,
    Csv,
}

impl SheetFormat {
    pub fn from_path(path: &Path) -> LedgerResult<Self> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);

        match extension.as_deref() {
            Some("xlsx") => Ok(SheetFormat::Xlsx),
            Some("csv") => Ok(SheetFormat::Csv),
            _ => Err(LedgerError::UnsupportedFormat(path.to_path_buf())),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ExportOptions {
    /// Append a recomputed visit count column. Never read back on import.
    pub include_visits: bool,
}

/// Writes to a staging file beside `path` and renames it into place, so a
/// failed write never leaves a truncated ledger behind.
pub fn save(ledger: &Ledger, path: &Path, options: ExportOptions) -> LedgerResult<()> {
    let format = SheetFormat::from_path(path)?;
    let dir = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let staged = tempfile::Builder::new()
        .prefix(".attendance-")
        .tempfile_in(dir)?;

    match format {
        SheetFormat::Xlsx => save_xlsx(ledger, staged.path(), options)?,
        SheetFormat::Csv => save_csv(ledger, staged.path(), options)?,
    }
    staged.persist(path).map_err(|err| err.error)?;

    info!(
        path = %path.display(),
        records = ledger.len(),
        "attendance saved"
    );
    Ok(())
}

/// Parses a file into a fresh ledger. Any bad row aborts the whole load.
pub fn load(path: &Path) -> LedgerResult<Ledger> {
    let ledger = match SheetFormat::from_path(path)? {
        SheetFormat::Xlsx => load_xlsx(path)?,
        SheetFormat::Csv => load_csv(path)?,
    };
    info!(
        path = %path.display(),
        records = ledger.len(),
        "attendance loaded"
    );
    Ok(ledger)
}

/// Loads `path`, or returns an empty ledger when the file does not exist yet.
pub fn load_or_default(path: &Path) -> LedgerResult<Ledger> {
    if !path.exists() {
        info!(path = %path.display(), "no ledger file yet, starting empty");
        return Ok(Ledger::new());
    }
    load(path)
}

fn save_xlsx(ledger: &Ledger, path: &Path, options: ExportOptions) -> LedgerResult<()> {
    let mut workbook = Workbook::new();
    let header = Format::new().set_bold();
    let counts = options.include_visits.then(|| ledger.visit_counts());

    let mut attendance = Worksheet::new();
    attendance.set_name(ATTENDANCE_SHEET)?;
    attendance.write_string_with_format(0, 0, HEADER_NAME, &header)?;
    attendance.write_string_with_format(0, 1, HEADER_GROUP, &header)?;
    attendance.write_string_with_format(0, 2, HEADER_DATE, &header)?;
    if counts.is_some() {
        attendance.write_string_with_format(0, 3, HEADER_VISITS, &header)?;
    }
    attendance.set_column_width(0, 32)?;
    attendance.set_column_width(1, 12)?;
    attendance.set_column_width(2, 12)?;

    for (index, record) in ledger.records().iter().enumerate() {
        let row = (index + 1) as u32;
        attendance.write_string(row, 0, record.full_name())?;
        attendance.write_string(row, 1, record.group())?;
        attendance.write_string(row, 2, format_date(record.date()))?;
        if let Some(counts) = &counts {
            let visits = counts
                .get(&(record.full_name().to_string(), record.group().to_string()))
                .copied()
                .unwrap_or(0);
            attendance.write_number(row, 3, visits as f64)?;
        }
    }

    let mut groups = Worksheet::new();
    groups.set_name(GROUPS_SHEET)?;
    groups.write_string_with_format(0, 0, HEADER_GROUP, &header)?;
    for (index, group) in ledger.groups().enumerate() {
        groups.write_string((index + 1) as u32, 0, group)?;
    }

    workbook.push_worksheet(attendance);
    workbook.push_worksheet(groups);
    workbook.save(path)?;
    Ok(())
}

fn load_xlsx(path: &Path) -> LedgerResult<Ledger> {
    let mut workbook: Xlsx<_> = open_workbook(path)?;
    let attendance = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| LedgerError::MissingSheet(ATTENDANCE_SHEET.to_string()))??;

    let mut ledger = Ledger::new();
    for (row, cells) in data_rows(&attendance) {
        if cells.iter().take(3).all(|cell| cell.is_empty()) {
            continue;
        }
        let full_name = text_cell(cells[0], row, HEADER_NAME)?;
        let group = text_cell(cells[1], row, HEADER_GROUP)?;
        let date = date_cell(cells[2], row)?;
        ledger.add_record(AttendanceRecord::new(&full_name, &group, date)?);
    }

    if workbook.sheet_names().iter().any(|name| name == GROUPS_SHEET) {
        let groups = workbook.worksheet_range(GROUPS_SHEET)?;
        for (_, cells) in data_rows(&groups) {
            if let Some(name) = cell_text(cells[0]) {
                ledger.add_group(&name)?;
            }
        }
    } else {
        debug!(path = %path.display(), "workbook has no groups sheet");
    }

    Ok(ledger)
}

/// Yields `(1-based row number, first four cells)` for every row below sheet row 1,
/// which always holds the header.
fn data_rows(range: &Range<Data>) -> Vec<(usize, [&Data; 4])> {
    static EMPTY: Data = Data::Empty;
    let (Some(start), Some(end)) = (range.start(), range.end()) else {
        return Vec::new();
    };

    (start.0.max(1)..=end.0)
        .map(|row| {
            let cell = |col: u32| range.get_value((row, col)).unwrap_or(&EMPTY);
            (row as usize + 1, [cell(0), cell(1), cell(2), cell(3)])
        })
        .collect()
}

fn cell_text(cell: &Data) -> Option<String> {
    let text = match cell {
        Data::Empty | Data::Error(_) => return None,
        Data::String(value) => value.trim().to_string(),
        other => other.to_string().trim().to_string(),
    };
    (!text.is_empty()).then_some(text)
}

fn text_cell(cell: &Data, row: usize, column: &str) -> LedgerResult<String> {
    cell_text(cell).ok_or_else(|| LedgerError::MalformedRow {
        row,
        reason: format!("missing {column}"),
    })
}

fn date_cell(cell: &Data, row: usize) -> LedgerResult<NaiveDate> {
    match cell {
        Data::String(text) => parse_text_date(text, row),
        Data::DateTime(_) | Data::DateTimeIso(_) => {
            cell.as_date().ok_or_else(|| LedgerError::InvalidDate {
                row,
                value: cell.to_string(),
            })
        }
        Data::Empty => Err(LedgerError::MalformedRow {
            row,
            reason: format!("missing {HEADER_DATE}"),
        }),
        other => Err(LedgerError::InvalidDate {
            row,
            value: other.to_string(),
        }),
    }
}

fn parse_text_date(text: &str, row: usize) -> LedgerResult<NaiveDate> {
    parse_date(text).map_err(|_| LedgerError::InvalidDate {
        row,
        value: text.trim().to_string(),
    })
}

fn save_csv(ledger: &Ledger, path: &Path, options: ExportOptions) -> LedgerResult<()> {
    let mut writer = csv::Writer::from_path(path)?;
    let counts = options.include_visits.then(|| ledger.visit_counts());

    if counts.is_some() {
        writer.write_record([HEADER_NAME, HEADER_GROUP, HEADER_DATE, HEADER_VISITS])?;
    } else {
        writer.write_record([HEADER_NAME, HEADER_GROUP, HEADER_DATE])?;
    }

    for record in ledger.records() {
        let date = format_date(record.date());
        match &counts {
            Some(counts) => {
                let visits = counts
                    .get(&(record.full_name().to_string(), record.group().to_string()))
                    .copied()
                    .unwrap_or(0)
                    .to_string();
                writer.write_record([
                    record.full_name(),
                    record.group(),
                    date.as_str(),
                    visits.as_str(),
                ])?;
            }
            None => writer.write_record([record.full_name(), record.group(), date.as_str()])?,
        }
    }

    let empty_groups = ledger
        .groups()
        .filter(|group| !ledger.records().iter().any(|r| r.group() == *group))
        .count();
    if empty_groups > 0 {
        warn!(
            path = %path.display(),
            empty_groups,
            "csv export cannot carry groups without records"
        );
    }

    writer.flush()?;
    Ok(())
}

fn load_csv(path: &Path) -> LedgerResult<Ledger> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)?;

    let mut ledger = Ledger::new();
    for (index, result) in reader.records().enumerate() {
        let record = result?;
        let row = record
            .position()
            .map(|pos| pos.line() as usize)
            .unwrap_or(index + 2);

        if record.iter().all(|field| field.trim().is_empty()) {
            continue;
        }

        let full_name = csv_field(&record, 0, HEADER_NAME, row)?;
        let group = csv_field(&record, 1, HEADER_GROUP, row)?;
        let date = parse_text_date(csv_field(&record, 2, HEADER_DATE, row)?, row)?;
        ledger.add_record(AttendanceRecord::new(full_name, group, date)?);
    }

    Ok(ledger)
}

fn csv_field<'r>(
    record: &'r csv::StringRecord,
    col: usize,
    name: &str,
    row: usize,
) -> LedgerResult<&'r str> {
    record
        .get(col)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| LedgerError::MalformedRow {
            row,
            reason: format!("missing {name}"),
        })
}
