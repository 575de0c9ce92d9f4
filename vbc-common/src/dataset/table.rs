//! Raw tabular relation with explicit missing cells

use super::records::FromRow;
use crate::Result;
use std::io::Read;
use std::path::Path;

/// Tokens treated as missing in addition to the empty string
const MISSING_TOKENS: [&str; 6] = ["nan", "na", "n/a", "null", "none", "#n/a"];

/// One cell of a table
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Missing,
    Number(f64),
    Text(String),
}

impl Cell {
    /// Classify a raw CSV field.
    ///
    /// # Examples
    ///
    /// ```
    /// use vbc_common::dataset::Cell;
    ///
    /// assert_eq!(Cell::parse(""), Cell::Missing);
    /// assert_eq!(Cell::parse("NaN"), Cell::Missing);
    /// assert_eq!(Cell::parse(" 12.5 "), Cell::Number(12.5));
    /// assert_eq!(Cell::parse("TKR"), Cell::Text("TKR".to_string()));
    /// ```
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Cell::Missing;
        }
        let lowered = trimmed.to_ascii_lowercase();
        if MISSING_TOKENS.contains(&lowered.as_str()) {
            return Cell::Missing;
        }
        match trimmed.parse::<f64>() {
            // "inf"/"infinity" parse as f64 but are not data values
            Ok(value) if value.is_finite() => Cell::Number(value),
            _ => Cell::Text(trimmed.to_string()),
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Cell::Missing)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Cell::Number(v) => Some(*v),
            _ => None,
        }
    }

    /// Cell rendered as text; numbers are printed without a trailing `.0`.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Cell::Missing => None,
            Cell::Number(v) => Some(crate::human_fmt::plain(*v)),
            Cell::Text(s) => Some(s.clone()),
        }
    }

    /// Interpret the cell as a boolean (`true/false`, `yes/no`, `1/0`).
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Cell::Number(v) if *v == 1.0 => Some(true),
            Cell::Number(v) if *v == 0.0 => Some(false),
            Cell::Text(s) => match s.to_ascii_lowercase().as_str() {
                "true" | "yes" | "y" | "t" => Some(true),
                "false" | "no" | "n" | "f" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }
}

impl std::fmt::Display for Cell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Cell::Missing => f.write_str("NaN"),
            Cell::Number(v) => f.write_str(&crate::human_fmt::plain(*v)),
            Cell::Text(s) => f.write_str(s),
        }
    }
}

/// Ordered column names plus rows of cells
///
/// Every row holds exactly one cell per column.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl Table {
    pub fn new<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Append a row, padding with missing cells or dropping surplus cells.
    pub fn push_row(&mut self, mut cells: Vec<Cell>) {
        cells.resize(self.columns.len(), Cell::Missing);
        self.rows.push(cells);
    }

    /// Parse CSV (first record is the header).
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = csv_reader.headers()?.clone();
        let mut table = Table::new(headers.iter());

        for record in csv_reader.records() {
            let record = record?;
            table.push_row(record.iter().map(Cell::parse).collect());
        }

        Ok(table)
    }

    pub fn from_csv_str(content: &str) -> Result<Self> {
        Self::from_csv_reader(content.as_bytes())
    }

    pub fn from_csv_path(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        Self::from_csv_reader(file)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> impl Iterator<Item = Row<'_>> + '_ {
        self.rows.iter().map(move |cells| Row {
            table: self,
            cells,
        })
    }

    /// Cells of one column, top to bottom; `None` when the column is absent.
    pub fn column(&self, name: &str) -> Option<impl Iterator<Item = &Cell> + '_> {
        let index = self.column_index(name)?;
        Some(self.rows.iter().map(move |row| &row[index]))
    }

    /// Project every row into a typed record.
    pub fn records<T: FromRow>(&self) -> Vec<T> {
        self.rows().map(|row| T::from_row(&row)).collect()
    }
}

/// Borrowed view of one table row with by-name access
#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    table: &'a Table,
    cells: &'a [Cell],
}

impl<'a> Row<'a> {
    /// Cell for a column; `None` when the column does not exist.
    pub fn get(&self, column: &str) -> Option<&'a Cell> {
        self.table.column_index(column).map(|i| &self.cells[i])
    }

    /// Numeric value; absent when the column is missing, the cell is
    /// missing, or the cell holds text.
    pub fn number(&self, column: &str) -> Option<f64> {
        self.get(column).and_then(Cell::as_number)
    }

    pub fn text(&self, column: &str) -> Option<String> {
        self.get(column).and_then(Cell::as_text)
    }

    /// Text value or the empty string
    pub fn text_or_empty(&self, column: &str) -> String {
        self.text(column).unwrap_or_default()
    }

    pub fn boolean(&self, column: &str) -> Option<bool> {
        self.get(column).and_then(Cell::as_bool)
    }

    /// `(column, cell)` pairs in column order
    pub fn iter(&self) -> impl Iterator<Item = (&'a str, &'a Cell)> + 'a {
        self.table
            .columns
            .iter()
            .map(String::as_str)
            .zip(self.cells.iter())
    }
}
