use crate::error::{Error, Result};
use csv::{ReaderBuilder, Trim, WriterBuilder};
use std::io::{Read, Write};
use std::ops::Range;
use std::path::Path;

/// Header name of the optional acquisition time column.
pub const TIMESTAMP_COLUMN: &str = "Timestamp";
/// Header name of the trailing stimulus column.
pub const STIMULUS_COLUMN: &str = "Stimulus";

/// Numeric table with a header row: one row per sample (or per epoch for
/// feature-derived records).
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<f64>>,
}

impl Table {
    pub fn new(headers: Vec<String>) -> Self {
        Self {
            headers,
            rows: Vec::new(),
        }
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn n_cols(&self) -> usize {
        self.headers.len()
    }

    pub fn push_row(&mut self, row: Vec<f64>) -> Result<()> {
        if row.len() != self.headers.len() {
            return Err(Error::validation(format!(
                "row has {} values for {} columns",
                row.len(),
                self.headers.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers
            .iter()
            .position(|header| header.eq_ignore_ascii_case(name))
    }

    pub fn column(&self, idx: usize) -> Vec<f64> {
        self.rows.iter().map(|row| row[idx]).collect()
    }

    /// Removes a column by name, returning whether it existed.
    pub fn drop_column(&mut self, name: &str) -> bool {
        match self.column_index(name) {
            Some(idx) => {
                self.headers.remove(idx);
                for row in &mut self.rows {
                    row.remove(idx);
                }
                true
            }
            None => false,
        }
    }

    /// Rows in `range`, clamped to the table bounds.
    pub fn slice_rows(&self, range: Range<usize>) -> Table {
        let end = range.end.min(self.rows.len());
        let start = range.start.min(end);
        Table {
            headers: self.headers.clone(),
            rows: self.rows[start..end].to_vec(),
        }
    }

    /// Column-major view: one vector per column.
    pub fn columns(&self) -> Vec<Vec<f64>> {
        (0..self.n_cols()).map(|idx| self.column(idx)).collect()
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .trim(Trim::All)
            .from_reader(reader);
        let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        if headers.is_empty() {
            return Err(Error::validation("table has no header row"));
        }
        let mut table = Table::new(headers);
        for (line, record) in reader.records().enumerate() {
            let record = record?;
            let mut row = Vec::with_capacity(record.len());
            for (col, field) in record.iter().enumerate() {
                let value = parse_cell(field).ok_or_else(|| {
                    Error::validation(format!(
                        "row {} column {} is not numeric: '{}'",
                        line + 1,
                        table.headers.get(col).map(String::as_str).unwrap_or("?"),
                        field
                    ))
                })?;
                row.push(value);
            }
            table.push_row(row)?;
        }
        Ok(table)
    }

    pub fn to_writer<W: Write>(&self, writer: W) -> Result<()> {
        let mut writer = WriterBuilder::new().from_writer(writer);
        writer.write_record(&self.headers)?;
        for row in &self.rows {
            writer.write_record(row.iter().map(|value| value.to_string()))?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn read(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file)
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = std::fs::File::create(path)?;
        self.to_writer(file)
    }
}

fn parse_cell(field: &str) -> Option<f64> {
    match field {
        "" => Some(f64::NAN),
        "True" | "true" => Some(1.0),
        "False" | "false" => Some(0.0),
        other => other.parse::<f64>().ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preserves_precision_through_text() {
        let mut table = Table::new(vec!["Cz".into(), STIMULUS_COLUMN.into()]);
        table.push_row(vec![0.1 + 0.2, 0.0]).unwrap();
        table.push_row(vec![-1.234_567_890_123e-7, 2.0]).unwrap();
        let mut buf = Vec::new();
        table.to_writer(&mut buf).unwrap();
        let back = Table::from_reader(buf.as_slice()).unwrap();
        assert_eq!(back, table);
    }

    #[test]
    fn drops_columns_case_insensitively() {
        let mut table = Table::new(vec!["timestamp".into(), "Cz".into()]);
        table.push_row(vec![0.5, 1.0]).unwrap();
        assert!(table.drop_column(TIMESTAMP_COLUMN));
        assert_eq!(table.headers, vec!["Cz".to_string()]);
        assert_eq!(table.rows, vec![vec![1.0]]);
        assert!(!table.drop_column(TIMESTAMP_COLUMN));
    }

    #[test]
    fn reports_non_numeric_cells() {
        let text = "Cz,Stimulus\n1.0,0\nabc,0\n";
        let err = Table::from_reader(text.as_bytes()).unwrap_err().to_string();
        assert!(err.contains("row 2"), "{err}");
    }

    #[test]
    fn slices_are_clamped() {
        let mut table = Table::new(vec!["Cz".into()]);
        for i in 0..5 {
            table.push_row(vec![i as f64]).unwrap();
        }
        assert_eq!(table.slice_rows(3..10).n_rows(), 2);
        assert_eq!(table.slice_rows(7..10).n_rows(), 0);
    }
}
