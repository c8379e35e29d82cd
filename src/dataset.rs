use ordered_float::OrderedFloat;
use rand::Rng;
use std::ops::Range;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ColumnType {
    Numerical,
    Categorical,
}

/// Name and kind of one dataset column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureDescriptor {
    pub name: String,
    pub is_numerical: bool,
}

#[derive(Debug, Default)]
pub struct DatasetBuilder {
    names: Vec<String>,
    types: Vec<ColumnType>,
    columns: Vec<Vec<f64>>,
}

impl DatasetBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares the next column. Columns must be declared before rows are
    /// added; categorical columns hold numeric category codes.
    pub fn column(&mut self, name: &str, column_type: ColumnType) -> &mut Self {
        self.names.push(name.to_owned());
        self.types.push(column_type);
        self.columns.push(Vec::new());
        self
    }

    pub fn add_row(&mut self, values: &[f64]) -> Result<(), DatasetError> {
        if self.columns.is_empty() {
            return Err(DatasetError::NoColumns);
        }

        if values.len() != self.columns.len() {
            return Err(DatasetError::ColumnSizeMismatch);
        }

        if values.iter().any(|value| !value.is_finite()) {
            return Err(DatasetError::NonFiniteValue);
        }

        for (column, value) in self.columns.iter_mut().zip(values.iter().copied()) {
            column.push(value);
        }

        Ok(())
    }

    pub fn build(&self) -> Result<Dataset, DatasetError> {
        if self.columns.is_empty() {
            return Err(DatasetError::NoColumns);
        }

        let rows_len = self.columns[0].len();
        if rows_len == 0 {
            return Err(DatasetError::EmptyDataset);
        }
        if self.columns.iter().any(|column| column.len() != rows_len) {
            return Err(DatasetError::ColumnSizeMismatch);
        }

        Ok(Dataset {
            row_index: (0..rows_len).collect(),
            row_range: 0..rows_len,
            names: &self.names,
            types: &self.types,
            columns: &self.columns,
        })
    }
}

/// Read-only view over the builder's column storage.
///
/// The view owns only a row index plus an active range over it, so bootstrap
/// samples and recursive partitions reorder indices without touching the
/// underlying columns.
#[derive(Debug, Clone)]
pub struct Dataset<'a> {
    row_index: Vec<usize>,
    row_range: Range<usize>,
    names: &'a [String],
    types: &'a [ColumnType],
    columns: &'a [Vec<f64>],
}

impl<'a> Dataset<'a> {
    pub fn rows_len(&self) -> usize {
        self.row_range.end - self.row_range.start
    }

    pub fn columns_len(&self) -> usize {
        self.columns.len()
    }

    /// Descriptors for every column, in declaration order.
    pub fn schema(&self) -> Vec<FeatureDescriptor> {
        self.names
            .iter()
            .zip(self.types.iter())
            .map(|(name, column_type)| FeatureDescriptor {
                name: name.clone(),
                is_numerical: matches!(column_type, ColumnType::Numerical),
            })
            .collect()
    }

    pub(crate) fn column_index(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    pub(crate) fn column_type(&self, column: usize) -> ColumnType {
        self.types[column]
    }

    pub(crate) fn value(&self, row: usize, column: usize) -> f64 {
        self.columns[column][self.row_index[self.row_range.start + row]]
    }

    pub(crate) fn column<'b>(
        &'b self,
        column: usize,
    ) -> impl 'b + Iterator<Item = f64> + Clone {
        self.rows().map(move |row| self.columns[column][row])
    }

    fn rows<'b>(&'b self) -> impl 'b + Iterator<Item = usize> + Clone {
        self.row_index[self.row_range.start..self.row_range.end]
            .iter()
            .copied()
    }

    pub(crate) fn sort_rows_by_column(&mut self, column: usize) {
        let columns = &self.columns;
        self.row_index[self.row_range.start..self.row_range.end]
            .sort_by_key(|&row| OrderedFloat(columns[column][row]));
    }

    pub(crate) fn bootstrap_sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Self {
        let rows_len = self.rows_len();
        let row_index = (0..rows_len)
            .map(|_| self.row_index[rng.gen_range(self.row_range.start, self.row_range.end)])
            .collect::<Vec<_>>();
        Self {
            row_index,
            row_range: 0..rows_len,
            names: self.names,
            types: self.types,
            columns: self.columns,
        }
    }

    /// Candidate numerical split points: `(row, midpoint)` for every pair of
    /// adjacent distinct values, where `row` counts the values below the
    /// midpoint. Rows must already be sorted by `column`.
    pub(crate) fn thresholds<'b>(
        &'b self,
        column: usize,
    ) -> impl 'b + Iterator<Item = (usize, f64)> {
        let values = self.column(column);
        values
            .clone()
            .zip(values.skip(1))
            .enumerate()
            .filter_map(|(row, (below, above))| {
                if below != above {
                    Some((row + 1, (below + above) / 2.0))
                } else {
                    None
                }
            })
    }

    /// Runs of equal values as `(value, range)` pairs, ranges relative to the
    /// active row range. Rows must already be sorted by `column`.
    pub(crate) fn group_ranges(&self, column: usize) -> Vec<(f64, Range<usize>)> {
        let mut groups: Vec<(f64, Range<usize>)> = Vec::new();
        for (row, value) in self.column(column).enumerate() {
            if let Some((current, range)) = groups.last_mut() {
                if *current == value {
                    range.end = row + 1;
                    continue;
                }
            }
            groups.push((value, row..row + 1));
        }
        groups
    }

    /// Narrows the view to `range` (relative to the active row range) for the
    /// duration of `f`, then restores it.
    pub(crate) fn with_range<F, T>(&mut self, range: Range<usize>, f: F) -> T
    where
        F: FnOnce(&mut Self) -> T,
    {
        let original = self.row_range.clone();
        self.row_range = (original.start + range.start)..(original.start + range.end);
        let value = f(self);
        self.row_range = original;
        value
    }
}

#[derive(Debug, Error, Clone)]
pub enum DatasetError {
    #[error("dataset must declare at least one column")]
    NoColumns,

    #[error("dataset must contain at least one row")]
    EmptyDataset,

    #[error("some of rows have a different column count from the declared schema")]
    ColumnSizeMismatch,

    #[error("dataset values must be finite")]
    NonFiniteValue,
}
