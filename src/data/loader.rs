//! Tabular File Loader Module
//! Reads CSV files and Excel workbooks (xlsx / xlsb) into Polars DataFrames
//! and normalizes the birthdate and tax-id columns.

use super::processor::date_to_epoch_days;
use crate::config::ColumnNames;
use calamine::{open_workbook, Data, Range, Reader, Xlsb, Xlsx};
use chrono::{Days, NaiveDate};
use polars::prelude::*;
use std::collections::HashSet;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Serial of 9999-12-31; anything beyond is not a calendar date.
const MAX_SERIAL_DAYS: f64 = 2_958_465.0;
/// Serial of 0001-01-01.
const MIN_SERIAL_DAYS: f64 = -693_593.0;

static EMPTY_CELL: Data = Data::Empty;

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("Unsupported file format: {}", .0.display())]
    UnsupportedFormat(PathBuf),
    #[error("Failed to read {}: {source}", path.display())]
    Workbook {
        path: PathBuf,
        source: calamine::Error,
    },
    #[error("First worksheet of {} has no rows", .0.display())]
    EmptySheet(PathBuf),
    #[error("Polars error: {0}")]
    PolarsError(#[from] PolarsError),
}

/// Input formats, selected by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Xlsx,
    Xlsb,
    Csv,
}

impl SourceFormat {
    pub fn from_path(path: &Path) -> Result<Self, LoaderError> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase());

        match extension.as_deref() {
            Some("xlsx") => Ok(SourceFormat::Xlsx),
            Some("xlsb") => Ok(SourceFormat::Xlsb),
            Some("csv") => Ok(SourceFormat::Csv),
            _ => Err(LoaderError::UnsupportedFormat(path.to_path_buf())),
        }
    }
}

/// Loads source files and applies the column normalizations.
pub struct DataLoader {
    columns: ColumnNames,
}

impl Default for DataLoader {
    fn default() -> Self {
        Self::new(ColumnNames::default())
    }
}

impl DataLoader {
    pub fn new(columns: ColumnNames) -> Self {
        Self { columns }
    }

    /// Read a file with the reader matching its extension, then normalize it.
    pub fn load(&self, path: &Path) -> Result<DataFrame, LoaderError> {
        let format = SourceFormat::from_path(path)?;

        let df = match format {
            SourceFormat::Csv => Self::read_csv(path)?,
            SourceFormat::Xlsx => {
                let range = read_first_sheet::<Xlsx<BufReader<File>>>(path)?;
                sheet_to_frame(path, &range)?
            }
            SourceFormat::Xlsb => {
                let range = read_first_sheet::<Xlsb<BufReader<File>>>(path)?;
                sheet_to_frame(path, &range)?
            }
        };

        info!(
            path = %path.display(),
            ?format,
            rows = df.height(),
            columns = df.width(),
            "loaded file"
        );

        Ok(normalize(df, &self.columns)?)
    }

    /// Load a CSV file using Polars.
    fn read_csv(path: &Path) -> Result<DataFrame, LoaderError> {
        // Use lazy evaluation for memory efficiency, then collect
        let df = LazyCsvReader::new(path)
            .with_has_header(true)
            .with_infer_schema_length(Some(10000))
            .with_ignore_errors(true)
            .finish()?
            .collect()?;

        Ok(df)
    }
}

fn read_first_sheet<R>(path: &Path) -> Result<Range<Data>, LoaderError>
where
    R: Reader<BufReader<File>>,
    R::Error: Into<calamine::Error>,
{
    let workbook_error = |err: R::Error| LoaderError::Workbook {
        path: path.to_path_buf(),
        source: err.into(),
    };

    let mut workbook: R = open_workbook(path).map_err(workbook_error)?;
    workbook
        .worksheet_range_at(0)
        .ok_or_else(|| LoaderError::EmptySheet(path.to_path_buf()))?
        .map_err(workbook_error)
}

/// Like `range_to_frame`, but a sheet without a header row is an error.
fn sheet_to_frame(path: &Path, range: &Range<Data>) -> Result<DataFrame, LoaderError> {
    if range.is_empty() || range.rows().next().is_none() {
        return Err(LoaderError::EmptySheet(path.to_path_buf()));
    }
    Ok(range_to_frame(range)?)
}

/// Convert a worksheet into a DataFrame, taking the first row as header.
pub fn range_to_frame(range: &Range<Data>) -> PolarsResult<DataFrame> {
    let mut rows = range.rows();
    let Some(header) = rows.next() else {
        return Ok(DataFrame::empty());
    };
    let body: Vec<&[Data]> = rows.collect();

    let names = header_names(header);
    let columns = names
        .iter()
        .enumerate()
        .map(|(idx, name)| {
            let cells: Vec<&Data> = body
                .iter()
                .map(|row| row.get(idx).unwrap_or(&EMPTY_CELL))
                .collect();
            build_column(name, &cells)
        })
        .collect();

    DataFrame::new(columns)
}

/// Header cells as column names; blanks get `column_<i>` and repeats get the
/// first free `.<n>` suffix.
fn header_names(header: &[Data]) -> Vec<String> {
    let mut used: HashSet<String> = HashSet::new();

    header
        .iter()
        .enumerate()
        .map(|(idx, cell)| {
            let base = match cell_text(cell) {
                Some(text) if !text.trim().is_empty() => text.trim().to_string(),
                _ => format!("column_{}", idx),
            };
            let mut name = base.clone();
            let mut suffix = 1;
            while used.contains(&name) {
                name = format!("{}.{}", base, suffix);
                suffix += 1;
            }
            used.insert(name.clone());
            name
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Boolean,
    Integer,
    Float,
    Text,
}

fn infer_kind(cells: &[&Data]) -> ColumnKind {
    let mut any_value = false;
    let mut all_bool = true;
    let mut all_numeric = true;
    let mut all_integral = true;
    let mut has_empty = false;

    for cell in cells {
        if is_empty(cell) {
            has_empty = true;
            continue;
        }
        any_value = true;
        match cell_number(cell) {
            Some(value) => {
                all_bool = false;
                if value.fract() != 0.0 {
                    all_integral = false;
                }
            }
            None => {
                all_numeric = false;
                if !matches!(cell, Data::Bool(_)) {
                    all_bool = false;
                }
            }
        }
    }

    if !any_value {
        ColumnKind::Text
    } else if all_bool {
        ColumnKind::Boolean
    } else if all_numeric && all_integral && !has_empty {
        ColumnKind::Integer
    } else if all_numeric {
        ColumnKind::Float
    } else {
        ColumnKind::Text
    }
}

fn build_column(name: &str, cells: &[&Data]) -> Column {
    let name = PlSmallStr::from(name);

    match infer_kind(cells) {
        ColumnKind::Boolean => {
            let values: Vec<Option<bool>> = cells
                .iter()
                .map(|cell| match cell {
                    Data::Bool(b) => Some(*b),
                    _ => None,
                })
                .collect();
            Column::new(name, values)
        }
        ColumnKind::Integer => {
            let values: Vec<Option<i64>> = cells
                .iter()
                .map(|cell| cell_number(cell).map(|v| v as i64))
                .collect();
            Column::new(name, values)
        }
        ColumnKind::Float => {
            let values: Vec<Option<f64>> = cells.iter().map(|cell| cell_number(cell)).collect();
            Column::new(name, values)
        }
        ColumnKind::Text => {
            let values: Vec<Option<String>> = cells.iter().map(|cell| cell_text(cell)).collect();
            Column::new(name, values)
        }
    }
}

fn is_empty(cell: &Data) -> bool {
    match cell {
        Data::Empty | Data::Error(_) => true,
        Data::String(s) => s.is_empty(),
        _ => false,
    }
}

/// Numeric value of a cell; date cells yield their serial day number.
fn cell_number(cell: &Data) -> Option<f64> {
    match cell {
        Data::Int(i) => Some(*i as f64),
        Data::Float(f) => Some(*f),
        Data::DateTime(dt) => Some(dt.as_f64()),
        _ => None,
    }
}

fn cell_text(cell: &Data) -> Option<String> {
    if is_empty(cell) {
        return None;
    }
    match cell {
        Data::String(s) => Some(s.clone()),
        Data::DateTime(dt) => Some(dt.as_f64().to_string()),
        other => Some(other.to_string()),
    }
}

/// Convert a spreadsheet serial day number (days since 1899-12-30) to a date.
pub fn serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() {
        return None;
    }
    let days = serial.floor();
    if !(MIN_SERIAL_DAYS..=MAX_SERIAL_DAYS).contains(&days) {
        return None;
    }

    let origin = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    let days = days as i64;
    if days >= 0 {
        origin.checked_add_days(Days::new(days as u64))
    } else {
        origin.checked_sub_days(Days::new(days.unsigned_abs()))
    }
}

/// Apply the birthdate and tax-id normalizations to whichever of the two
/// columns the frame has.
pub fn normalize(mut df: DataFrame, columns: &ColumnNames) -> PolarsResult<DataFrame> {
    let birthdate = match df.column(columns.birthdate.as_str()) {
        Ok(col) => Some(normalize_birthdate(col.as_materialized_series())?),
        Err(_) => None,
    };
    if let Some(series) = birthdate {
        debug!(column = %series.name(), nulls = series.null_count(), "normalized birthdate");
        df.with_column(series)?;
    }

    let tax_id = match df.column(columns.tax_id.as_str()) {
        Ok(col) => Some(col.as_materialized_series().cast(&DataType::String)?),
        Err(_) => None,
    };
    if let Some(series) = tax_id {
        df.with_column(series)?;
    }

    Ok(df)
}

fn normalize_birthdate(series: &Series) -> PolarsResult<Series> {
    let days: Vec<Option<i32>> = match series.dtype() {
        DataType::Date => return Ok(series.clone()),
        DataType::String => {
            let values: Vec<Option<i32>> = series
                .str()?
                .into_iter()
                .map(|v| {
                    v.and_then(|s| s.trim().parse::<f64>().ok())
                        .and_then(serial_to_date)
                        .map(date_to_epoch_days)
                })
                .collect();
            values
        }
        DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32
        | DataType::UInt64
        | DataType::Float32
        | DataType::Float64 => {
            let floats = series.cast(&DataType::Float64)?;
            let values: Vec<Option<i32>> = floats
                .f64()?
                .into_iter()
                .map(|v| v.and_then(serial_to_date).map(date_to_epoch_days))
                .collect();
            values
        }
        _ => vec![None; series.len()],
    };

    Series::new(series.name().clone(), days).cast(&DataType::Date)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::processor::DataProcessor;
    use calamine::{ExcelDateTime, ExcelDateTimeType};
    use std::fs;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn dispatches_on_extension() {
        let cases = [
            ("data/base1.xlsb", SourceFormat::Xlsb),
            ("data/case.xlsx", SourceFormat::Xlsx),
            ("data/base2.csv", SourceFormat::Csv),
            ("data/BASE2.CSV", SourceFormat::Csv),
        ];
        for (path, expected) in cases {
            assert_eq!(SourceFormat::from_path(Path::new(path)).unwrap(), expected);
        }
    }

    #[test]
    fn unknown_extensions_are_unsupported() {
        for path in ["data/base.xls", "data/base.json", "data/noext", "data/csv"] {
            let err = SourceFormat::from_path(Path::new(path)).unwrap_err();
            assert!(matches!(err, LoaderError::UnsupportedFormat(_)), "{path}");
        }
    }

    #[test]
    fn loading_unsupported_file_fails_before_reading() {
        let err = DataLoader::default()
            .load(Path::new("does/not/exist.txt"))
            .unwrap_err();
        assert!(matches!(err, LoaderError::UnsupportedFormat(_)));
        assert!(err.to_string().contains("exist.txt"));
    }

    #[test]
    fn missing_workbooks_go_through_the_excel_reader() {
        for path in ["missing.xlsx", "missing.xlsb"] {
            let err = DataLoader::default().load(Path::new(path)).unwrap_err();
            assert!(matches!(err, LoaderError::Workbook { .. }), "{path}: {err}");
        }
    }

    #[test]
    fn serial_numbers_map_to_calendar_dates() {
        assert_eq!(serial_to_date(1.0), Some(date(1899, 12, 31)));
        assert_eq!(serial_to_date(25569.0), Some(date(1970, 1, 1)));
        assert_eq!(serial_to_date(45000.0), Some(date(2023, 3, 15)));
        // time-of-day fraction is dropped
        assert_eq!(serial_to_date(45000.75), Some(date(2023, 3, 15)));
    }

    #[test]
    fn invalid_serials_become_none() {
        assert_eq!(serial_to_date(f64::NAN), None);
        assert_eq!(serial_to_date(f64::INFINITY), None);
        assert_eq!(serial_to_date(1e12), None);
    }

    #[test]
    fn birthdate_text_is_parsed_or_nulled() {
        let df = df!(
            "dt_nascimento" => [Some("45000"), Some("not a date"), None],
            "nome" => ["a", "b", "c"],
        )
        .unwrap();

        let df = normalize(df, &ColumnNames::default()).unwrap();
        let col = df.column("dt_nascimento").unwrap();
        assert_eq!(col.dtype(), &DataType::Date);

        let dates = DataProcessor::date_values(&df, "dt_nascimento").unwrap();
        assert_eq!(dates, vec![Some(date(2023, 3, 15)), None, None]);
    }

    #[test]
    fn numeric_birthdates_are_converted() {
        let df = df!("dt_nascimento" => [Some(25569.0), None, Some(f64::NAN)]).unwrap();
        let df = normalize(df, &ColumnNames::default()).unwrap();

        let dates = DataProcessor::date_values(&df, "dt_nascimento").unwrap();
        assert_eq!(dates, vec![Some(date(1970, 1, 1)), None, None]);
    }

    #[test]
    fn tax_id_becomes_text() {
        let df = df!("cpf" => [Some(12345678901i64), None]).unwrap();
        let df = normalize(df, &ColumnNames::default()).unwrap();

        let col = df.column("cpf").unwrap();
        assert_eq!(col.dtype(), &DataType::String);
        let values = DataProcessor::text_values(&df, "cpf").unwrap();
        assert_eq!(values, vec![Some("12345678901".to_string()), None]);
    }

    #[test]
    fn frames_without_known_columns_are_untouched() {
        let df = df!("uf" => ["SP", "RJ"]).unwrap();
        let out = normalize(df.clone(), &ColumnNames::default()).unwrap();
        assert!(out.equals(&df));
    }

    #[test]
    fn csv_files_load_and_normalize() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("base2.csv");
        fs::write(
            &path,
            "cpf,dt_nascimento,uf,renda\n11122233344,30000,SP,1500.5\n55566677788,,RJ,abc\n",
        )
        .unwrap();

        let df = DataLoader::default().load(&path).unwrap();
        assert_eq!(df.height(), 2);
        assert_eq!(df.column("cpf").unwrap().dtype(), &DataType::String);
        assert_eq!(df.column("dt_nascimento").unwrap().dtype(), &DataType::Date);

        let dates = DataProcessor::date_values(&df, "dt_nascimento").unwrap();
        assert_eq!(dates, vec![Some(date(1982, 2, 18)), None]);
    }

    #[test]
    fn worksheet_ranges_become_typed_columns() {
        let mut range: Range<Data> = Range::new((0, 0), (3, 3));
        range.set_value((0, 0), Data::String("nome".to_string()));
        range.set_value((0, 1), Data::String("idade".to_string()));
        range.set_value((0, 2), Data::String("renda".to_string()));
        // (0, 3) left empty: generated header
        for (row, (name, age, income)) in [("Ana", 30.0, 1200.5), ("Bia", 41.0, 900.0), ("Caio", 52.0, 0.25)]
            .into_iter()
            .enumerate()
        {
            let row = row as u32 + 1;
            range.set_value((row, 0), Data::String(name.to_string()));
            range.set_value((row, 1), Data::Float(age));
            range.set_value((row, 2), Data::Float(income));
        }
        range.set_value((2, 3), Data::Bool(true));

        let df = range_to_frame(&range).unwrap();
        assert_eq!(df.height(), 3);
        assert_eq!(df.column("nome").unwrap().dtype(), &DataType::String);
        assert_eq!(df.column("idade").unwrap().dtype(), &DataType::Int64);
        assert_eq!(df.column("renda").unwrap().dtype(), &DataType::Float64);
        assert_eq!(df.column("column_3").unwrap().dtype(), &DataType::Boolean);
    }

    #[test]
    fn duplicate_headers_are_suffixed() {
        let header = [
            Data::String("uf".to_string()),
            Data::String("uf".to_string()),
            Data::Empty,
        ];
        assert_eq!(header_names(&header), vec!["uf", "uf.1", "column_2"]);
    }

    #[test]
    fn generated_suffixes_skip_names_already_taken() {
        let header = [
            Data::String("uf".to_string()),
            Data::String("uf".to_string()),
            Data::String("uf.1".to_string()),
            Data::String("column_4".to_string()),
            Data::Empty,
        ];
        assert_eq!(
            header_names(&header),
            vec!["uf", "uf.1", "uf.1.1", "column_4", "column_4.1"]
        );

        let mut range: Range<Data> = Range::new((0, 0), (1, 2));
        for (col, cell) in header.iter().take(3).enumerate() {
            range.set_value((0, col as u32), cell.clone());
            range.set_value((1, col as u32), Data::String("SP".to_string()));
        }
        let df = range_to_frame(&range).unwrap();
        assert_eq!(df.width(), 3);
    }

    #[test]
    fn empty_worksheets_are_rejected() {
        let path = Path::new("data/base1.xlsb");
        let err = sheet_to_frame(path, &Range::<Data>::empty()).unwrap_err();
        assert!(matches!(&err, LoaderError::EmptySheet(p) if p == path));
        assert!(err.to_string().contains("base1.xlsb"));
    }

    #[test]
    fn header_only_worksheets_keep_their_columns() {
        let mut range: Range<Data> = Range::new((0, 0), (0, 1));
        range.set_value((0, 0), Data::String("uf".to_string()));
        range.set_value((0, 1), Data::String("cpf".to_string()));

        let df = sheet_to_frame(Path::new("base3.xlsb"), &range).unwrap();
        assert_eq!(df.height(), 0);
        assert_eq!(df.width(), 2);
    }

    fn serial_cell(serial: f64) -> Data {
        Data::DateTime(ExcelDateTime::new(serial, ExcelDateTimeType::DateTime, false))
    }

    #[test]
    fn date_cells_normalize_to_birthdates() {
        let mut range: Range<Data> = Range::new((0, 0), (3, 1));
        range.set_value((0, 0), Data::String("dt_nascimento".to_string()));
        range.set_value((0, 1), Data::String("uf".to_string()));
        for row in 1..=3 {
            range.set_value((row, 0), serial_cell(45000.0));
            range.set_value((row, 1), Data::String("SP".to_string()));
        }

        let df = range_to_frame(&range).unwrap();
        assert_eq!(df.column("dt_nascimento").unwrap().dtype(), &DataType::Int64);

        let df = normalize(df, &ColumnNames::default()).unwrap();
        assert_eq!(df.column("dt_nascimento").unwrap().dtype(), &DataType::Date);
        let dates = DataProcessor::date_values(&df, "dt_nascimento").unwrap();
        assert_eq!(dates, vec![Some(date(2023, 3, 15)); 3]);
    }

    #[test]
    fn date_cells_with_gaps_and_times_normalize() {
        let mut range: Range<Data> = Range::new((0, 0), (3, 0));
        range.set_value((0, 0), Data::String("dt_nascimento".to_string()));
        range.set_value((1, 0), serial_cell(25569.5));
        // (2, 0) left empty
        range.set_value((3, 0), serial_cell(45000.0));

        let df = range_to_frame(&range).unwrap();
        assert_eq!(df.column("dt_nascimento").unwrap().dtype(), &DataType::Float64);

        let df = normalize(df, &ColumnNames::default()).unwrap();
        let dates = DataProcessor::date_values(&df, "dt_nascimento").unwrap();
        assert_eq!(dates, vec![Some(date(1970, 1, 1)), None, Some(date(2023, 3, 15))]);
    }

    #[test]
    fn mixed_cells_fall_back_to_text() {
        let cells = [Data::Float(1.0), Data::String("x".to_string()), Data::Empty];
        let refs: Vec<&Data> = cells.iter().collect();
        assert_eq!(infer_kind(&refs), ColumnKind::Text);

        let cells = [Data::Float(1.0), Data::Empty];
        let refs: Vec<&Data> = cells.iter().collect();
        assert_eq!(infer_kind(&refs), ColumnKind::Float);
    }
}
