//! Contiguous 2-D tensor.
//!
//! `Matrix` is the only tensor type the crate passes around: feature and label
//! tensors, partitions and single-sample inputs are all `(rows, cols)` row-major
//! buffers. Ownership is the release discipline: a partition or normalized tensor is
//! freed when its owner drops or replaces it.

use crate::{Error, Result};

/// A row-major `(rows, cols)` matrix of `f32`.
///
/// `data.len() == rows * cols`. Zero rows is valid (an empty partition); zero
/// columns is not.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    data: Vec<f32>,
    rows: usize,
    cols: usize,
}

impl Matrix {
    /// Build from a flat buffer with shape `(len / cols, cols)`.
    pub fn from_flat(data: Vec<f32>, cols: usize) -> Result<Self> {
        if cols == 0 {
            return Err(Error::ShapeMismatch("cols must be > 0".to_owned()));
        }
        if !data.len().is_multiple_of(cols) {
            return Err(Error::ShapeMismatch(format!(
                "data length {} is not divisible by cols {cols}",
                data.len()
            )));
        }

        let rows = data.len() / cols;
        Ok(Self { data, rows, cols })
    }

    /// Build from per-sample rows (copies into contiguous storage).
    pub fn from_rows(rows: &[Vec<f32>]) -> Result<Self> {
        let cols = rows.first().map(|r| r.len()).unwrap_or(0);
        if cols == 0 {
            return Err(Error::ShapeMismatch(
                "rows must be non-empty with at least one column".to_owned(),
            ));
        }

        let mut data = Vec::with_capacity(rows.len() * cols);
        for (i, row) in rows.iter().enumerate() {
            if row.len() != cols {
                return Err(Error::ShapeMismatch(format!(
                    "row {i} has len {}, expected {cols}",
                    row.len()
                )));
            }
            data.extend_from_slice(row);
        }

        Ok(Self {
            data,
            rows: rows.len(),
            cols,
        })
    }

    /// A single-column matrix `(values.len(), 1)`.
    #[inline]
    pub fn column(values: Vec<f32>) -> Self {
        let rows = values.len();
        Self {
            data: values,
            rows,
            cols: 1,
        }
    }

    /// One-hot encode `indices` into a `(indices.len(), depth)` matrix.
    pub fn one_hot(indices: &[usize], depth: usize) -> Result<Self> {
        if depth == 0 {
            return Err(Error::ShapeMismatch("one-hot depth must be > 0".to_owned()));
        }
        let mut data = vec![0.0_f32; indices.len() * depth];
        for (row, &idx) in indices.iter().enumerate() {
            if idx >= depth {
                return Err(Error::ShapeMismatch(format!(
                    "class index {idx} out of range for depth {depth}"
                )));
            }
            data[row * depth + idx] = 1.0;
        }
        Ok(Self {
            data,
            rows: indices.len(),
            cols: depth,
        })
    }

    /// `n` evenly spaced values in `[start, end]` as a column.
    pub fn linspace(start: f32, end: f32, n: usize) -> Self {
        let values = match n {
            0 => Vec::new(),
            1 => vec![start],
            _ => {
                let step = (end - start) / (n - 1) as f32;
                (0..n).map(|i| start + step * i as f32).collect()
            }
        };
        Self::column(values)
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    #[inline]
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    #[inline]
    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }

    /// Returns the `idx`-th row.
    ///
    /// Panics if `idx >= rows`.
    #[inline]
    pub fn row(&self, idx: usize) -> &[f32] {
        let start = idx * self.cols;
        &self.data[start..start + self.cols]
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.data[row * self.cols + col]
    }

    /// Split into one single-column matrix per column.
    pub fn split_columns(&self) -> Vec<Self> {
        (0..self.cols)
            .map(|c| Self::column((0..self.rows).map(|r| self.get(r, c)).collect()))
            .collect()
    }

    /// Concatenate matrices with equal row counts side by side.
    pub fn concat_columns(parts: &[Self]) -> Result<Self> {
        let rows = parts
            .first()
            .map(|p| p.rows)
            .ok_or_else(|| Error::ShapeMismatch("nothing to concatenate".to_owned()))?;
        if let Some(bad) = parts.iter().find(|p| p.rows != rows) {
            return Err(Error::ShapeMismatch(format!(
                "cannot concatenate {} rows with {rows} rows",
                bad.rows
            )));
        }

        let cols: usize = parts.iter().map(|p| p.cols).sum();
        let mut data = Vec::with_capacity(rows * cols);
        for r in 0..rows {
            for part in parts {
                data.extend_from_slice(part.row(r));
            }
        }
        Ok(Self { data, rows, cols })
    }

    /// Contiguous row partition `[0, at)` / `[at, rows)`.
    pub fn split_rows(&self, at: usize) -> Result<(Self, Self)> {
        if at > self.rows {
            return Err(Error::ShapeMismatch(format!(
                "split index {at} exceeds {} rows",
                self.rows
            )));
        }
        let mid = at * self.cols;
        Ok((
            Self {
                data: self.data[..mid].to_vec(),
                rows: at,
                cols: self.cols,
            },
            Self {
                data: self.data[mid..].to_vec(),
                rows: self.rows - at,
                cols: self.cols,
            },
        ))
    }

    /// Minimum and maximum of a column, `None` when there are no rows.
    pub fn column_min_max(&self, col: usize) -> Option<(f32, f32)> {
        (0..self.rows)
            .map(|r| self.get(r, col))
            .fold(None, |acc, v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    }

    /// Element-wise map into a new matrix of the same shape.
    pub fn map(&self, f: impl Fn(f32) -> f32) -> Self {
        Self {
            data: self.data.iter().map(|&v| f(v)).collect(),
            rows: self.rows,
            cols: self.cols,
        }
    }
}
