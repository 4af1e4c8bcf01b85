use crate::{series::MarketSeries, util};
use anyhow::{bail, Result};
use std::{collections::HashMap, path::Path};

/// Time-indexed table of the metrics of every track.
///
/// Starts with the `returns` and `factor_<half_life>` columns of the series.
/// A metric column is created on its first write and back-filled with zeros.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultTable {
    n_rows: usize,
    columns: Vec<String>,
    data: Vec<Vec<f64>>,
    index: HashMap<String, usize>,
}

impl ResultTable {
    /// Table with the columns of the given series.
    pub fn new(series: &MarketSeries) -> Self {
        let mut table = Self {
            n_rows: series.len(),
            columns: vec![],
            data: vec![],
            index: HashMap::new(),
        };
        table.push_column("returns".to_string(), series.returns().to_vec());
        for (i, hl) in series.half_lives().iter().enumerate() {
            let column = series.factors().iter().map(|row| row[i]).collect();
            table.push_column(format!("factor_{}", hl), column);
        }
        table
    }

    fn push_column(&mut self, name: String, values: Vec<f64>) {
        self.index.insert(name.clone(), self.columns.len());
        self.columns.push(name);
        self.data.push(values);
    }

    /// Writes `value` at `row` of column `key`, creating the column if needed.
    pub fn set(&mut self, key: &str, row: usize, value: f64) {
        let ix = match self.index.get(key) {
            Some(ix) => *ix,
            None => {
                self.push_column(key.to_string(), vec![0.0; self.n_rows]);
                self.columns.len() - 1
            }
        };
        self.data[ix][row] = value;
    }

    /// Values of a column.
    pub fn column(&self, key: &str) -> Option<&[f64]> {
        self.index.get(key).map(|ix| self.data[*ix].as_slice())
    }

    /// Column names in creation order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Number of rows.
    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    /// Writes the table with [`util::write_csv_zip`].
    pub fn save(&self, path: &Path) -> Result<()> {
        let rows: Vec<Vec<f64>> = (0..self.n_rows)
            .map(|t| self.data.iter().map(|column| column[t]).collect())
            .collect();
        util::write_csv_zip(path, &self.columns, &rows)
    }

    /// Reads a table written by [`ResultTable::save`].
    pub fn load(path: &Path) -> Result<Self> {
        let (header, rows) = util::read_csv_zip(path)?;
        let mut table = Self {
            n_rows: rows.len(),
            columns: vec![],
            data: vec![],
            index: HashMap::new(),
        };
        for (i, name) in header.into_iter().enumerate() {
            let mut column = Vec::with_capacity(rows.len());
            for row in rows.iter() {
                match row.get(i) {
                    Some(v) => column.push(*v),
                    None => bail!("row of {} values in a table of {} columns", row.len(), i),
                }
            }
            table.push_column(name, column);
        }
        Ok(table)
    }
}
