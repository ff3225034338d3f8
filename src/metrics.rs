//! Metrics.
//!
//! Metrics are evaluation helpers (they do not participate in backprop) and are
//! computed sample by sample without allocating.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Supported evaluation metrics.
pub enum Metric {
    /// Classification accuracy.
    ///
    /// - For `output_dim == 1`: binary accuracy at a 0.5 threshold.
    /// - For `output_dim > 1`: multiclass accuracy (argmax).
    Accuracy,
}

impl Metric {
    /// Score for one sample; averaged over a dataset by the caller.
    #[inline]
    pub fn sample(self, pred: &[f32], target: &[f32]) -> f32 {
        debug_assert_eq!(pred.len(), target.len());
        match self {
            Metric::Accuracy => {
                let hit = if pred.len() == 1 {
                    (pred[0] >= 0.5) == (target[0] >= 0.5)
                } else {
                    argmax(pred) == argmax(target)
                };
                if hit { 1.0 } else { 0.0 }
            }
        }
    }
}

#[inline]
pub(crate) fn argmax(xs: &[f32]) -> usize {
    let mut best = 0;
    for (i, &x) in xs.iter().enumerate().skip(1) {
        if x > xs[best] {
            best = i;
        }
    }
    best
}
