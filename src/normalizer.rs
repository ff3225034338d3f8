//! Reversible min-max scaling.
//!
//! A `Normalizer` computes per-column `min`/`max` from the first tensor it sees and
//! never recomputes them; later tensors (partitions, single prediction inputs) are
//! scaled with the same statistics. Columns are scaled independently and then
//! recombined.
//!
//! A constant column (`max == min`) maps every value to `0.0`, and denormalizing
//! returns `min`, so the round trip stays exact.

use crate::{Error, Matrix, Result};

#[derive(Debug, Clone)]
pub struct Normalizer {
    min: Vec<f32>,
    max: Vec<f32>,
    tensor: Option<Matrix>,
}

impl Normalizer {
    /// Compute statistics from `first` and keep its normalized copy.
    pub fn new(first: &Matrix) -> Result<Self> {
        if first.is_empty() {
            return Err(Error::InvalidData(
                "cannot compute normalization statistics of an empty tensor".to_owned(),
            ));
        }

        let mut min = Vec::with_capacity(first.cols());
        let mut max = Vec::with_capacity(first.cols());
        for col in 0..first.cols() {
            let (lo, hi) = first
                .column_min_max(col)
                .ok_or_else(|| Error::InvalidData(format!("column {col} has no values")))?;
            if !(lo.is_finite() && hi.is_finite()) {
                return Err(Error::InvalidData(format!(
                    "column {col} contains non-finite values"
                )));
            }
            min.push(lo);
            max.push(hi);
        }

        let mut normalizer = Self {
            min,
            max,
            tensor: None,
        };
        normalizer.tensor = Some(normalizer.normalize(first)?);
        Ok(normalizer)
    }

    /// Number of dimensions (columns) the statistics cover.
    #[inline]
    pub fn dims(&self) -> usize {
        self.min.len()
    }

    #[inline]
    pub fn min(&self) -> &[f32] {
        &self.min
    }

    #[inline]
    pub fn max(&self) -> &[f32] {
        &self.max
    }

    /// The normalized copy of the tensor the statistics came from.
    pub fn tensor(&self) -> Result<&Matrix> {
        self.tensor
            .as_ref()
            .ok_or(Error::NotInitialized("normalized tensor was released"))
    }

    /// Drop the owned normalized tensor. Statistics stay usable.
    pub fn release(&mut self) {
        self.tensor = None;
    }

    pub fn normalize(&self, tensor: &Matrix) -> Result<Matrix> {
        self.check_cols(tensor)?;
        let parts: Vec<Matrix> = tensor
            .split_columns()
            .into_iter()
            .enumerate()
            .map(|(dim, col)| col.map(|v| self.scale(v, dim)))
            .collect();
        Matrix::concat_columns(&parts)
    }

    /// Undo [`normalize`](Self::normalize).
    ///
    /// With `Some(dim)`, every element is mapped back with that one dimension's
    /// statistics, whatever the tensor's width.
    pub fn denormalize(&self, tensor: &Matrix, dim: Option<usize>) -> Result<Matrix> {
        match dim {
            Some(dim) => {
                if dim >= self.dims() {
                    return Err(Error::ShapeMismatch(format!(
                        "dimension {dim} out of range for {} normalized dimensions",
                        self.dims()
                    )));
                }
                Ok(tensor.map(|v| self.unscale(v, dim)))
            }
            None => {
                self.check_cols(tensor)?;
                let parts: Vec<Matrix> = tensor
                    .split_columns()
                    .into_iter()
                    .enumerate()
                    .map(|(dim, col)| col.map(|v| self.unscale(v, dim)))
                    .collect();
                Matrix::concat_columns(&parts)
            }
        }
    }

    /// Normalize a single value of dimension `dim`.
    #[inline]
    pub fn scale(&self, v: f32, dim: usize) -> f32 {
        let range = self.max[dim] - self.min[dim];
        if range == 0.0 {
            0.0
        } else {
            (v - self.min[dim]) / range
        }
    }

    /// Denormalize a single value of dimension `dim`.
    #[inline]
    pub fn unscale(&self, v: f32, dim: usize) -> f32 {
        v * (self.max[dim] - self.min[dim]) + self.min[dim]
    }

    fn check_cols(&self, tensor: &Matrix) -> Result<()> {
        if tensor.cols() != self.dims() {
            return Err(Error::ShapeMismatch(format!(
                "tensor has {} columns, normalizer covers {}",
                tensor.cols(),
                self.dims()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: &Matrix, b: &Matrix, tol: f32) {
        assert_eq!(a.rows(), b.rows());
        assert_eq!(a.cols(), b.cols());
        for (x, y) in a.as_slice().iter().zip(b.as_slice()) {
            assert!((x - y).abs() <= tol, "{x} vs {y}");
        }
    }

    #[test]
    fn columns_are_scaled_independently() {
        let m = Matrix::from_rows(&[vec![1000.0, 200_000.0], vec![3000.0, 600_000.0]]).unwrap();
        let n = Normalizer::new(&m).unwrap();
        assert_eq!(n.tensor().unwrap().as_slice(), &[0.0, 0.0, 1.0, 1.0]);
        assert_eq!(n.min(), &[1000.0, 200_000.0]);
        assert_eq!(n.max(), &[3000.0, 600_000.0]);
    }

    #[test]
    fn statistics_come_from_the_first_tensor_only() {
        let n = Normalizer::new(&Matrix::column(vec![0.0, 10.0])).unwrap();
        let later = n.normalize(&Matrix::column(vec![20.0])).unwrap();
        assert_eq!(later.as_slice(), &[2.0]);
    }

    #[test]
    fn roundtrip_single_and_multi_feature() {
        let single = Matrix::column(vec![3.0, -1.5, 8.25, 0.0]);
        let n = Normalizer::new(&single).unwrap();
        let back = n.denormalize(n.tensor().unwrap(), None).unwrap();
        assert_close(&back, &single, 1e-6);

        let multi = Matrix::from_rows(&[
            vec![0.1, 5.0, -2.0],
            vec![0.7, 9.0, 4.0],
            vec![0.4, 7.0, 1.0],
        ])
        .unwrap();
        let n = Normalizer::new(&multi).unwrap();
        let back = n.denormalize(n.tensor().unwrap(), None).unwrap();
        assert_close(&back, &multi, 1e-6);
    }

    #[test]
    fn constant_column_maps_to_zero_and_back() {
        let m = Matrix::column(vec![4.0, 4.0, 4.0]);
        let n = Normalizer::new(&m).unwrap();
        assert_eq!(n.tensor().unwrap().as_slice(), &[0.0, 0.0, 0.0]);
        assert_eq!(n.denormalize(n.tensor().unwrap(), None).unwrap(), m);
    }

    #[test]
    fn denormalize_single_dimension() {
        let m = Matrix::from_rows(&[vec![0.0, 100.0], vec![10.0, 300.0]]).unwrap();
        let n = Normalizer::new(&m).unwrap();
        let axis = Matrix::column(vec![0.0, 0.5, 1.0]);
        let ticks = n.denormalize(&axis, Some(1)).unwrap();
        assert_eq!(ticks.as_slice(), &[100.0, 200.0, 300.0]);
        assert!(matches!(
            n.denormalize(&axis, Some(2)),
            Err(Error::ShapeMismatch(_))
        ));
    }

    #[test]
    fn release_drops_tensor_but_keeps_statistics() {
        let mut n = Normalizer::new(&Matrix::column(vec![1.0, 2.0])).unwrap();
        n.release();
        assert!(matches!(n.tensor(), Err(Error::NotInitialized(_))));
        assert!(n.normalize(&Matrix::column(vec![1.5])).is_ok());
    }

    #[test]
    fn rejects_wrong_width_and_empty_input() {
        let n = Normalizer::new(&Matrix::column(vec![1.0, 2.0])).unwrap();
        let wide = Matrix::from_rows(&[vec![1.0, 2.0]]).unwrap();
        assert!(matches!(n.normalize(&wide), Err(Error::ShapeMismatch(_))));
        assert!(Normalizer::new(&Matrix::column(Vec::new())).is_err());
    }
}
