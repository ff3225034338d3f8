//! Training-data pipeline.
//!
//! `DataPipeline` owns the loaded records and everything derived from them for the
//! active problem: the filtered points, one [`Normalizer`] for features and one for
//! labels, and the four train/test partitions. Derived state is replaced as a whole:
//! a rebuild drops the old normalizers and partitions before creating new ones, and
//! a re-split drops the old partitions first.

use log::{debug, info, warn};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::visual::Plot;
use crate::{Error, Matrix, Normalizer, Problem, ProblemPoint, Record, RecordSource, Result};

/// Sizes of the current partition. `training_size + testing_size` is the number of
/// points that passed the problem filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Split {
    pub training_size: usize,
    pub testing_size: usize,
}

#[derive(Debug)]
struct Partitions {
    training_features: Matrix,
    training_labels: Matrix,
    testing_features: Matrix,
    testing_labels: Matrix,
}

#[derive(Debug)]
pub struct DataPipeline {
    rng: StdRng,
    records: Vec<Record>,
    problem: Problem,
    ratio: u8,
    points: Vec<ProblemPoint>,
    features: Option<Normalizer>,
    labels: Option<Normalizer>,
    partitions: Option<Partitions>,
    rebuilds: u64,
}

/// `round(n * ratio / 100)`, halves rounding up.
pub fn training_size(n: usize, ratio: u8) -> usize {
    ((n as f64 * f64::from(ratio)) / 100.0).round() as usize
}

impl DataPipeline {
    /// A pipeline seeded from OS entropy.
    pub fn new(problem: Problem, ratio: u8) -> Self {
        Self::with_rng(StdRng::from_entropy(), problem, ratio)
    }

    /// A pipeline whose shuffles are reproducible.
    pub fn with_seed(seed: u64, problem: Problem, ratio: u8) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed), problem, ratio)
    }

    fn with_rng(rng: StdRng, problem: Problem, ratio: u8) -> Self {
        Self {
            rng,
            records: Vec::new(),
            problem,
            ratio,
            points: Vec::new(),
            features: None,
            labels: None,
            partitions: None,
            rebuilds: 0,
        }
    }

    /// Read every record once, shuffle, and build the active problem's tensors.
    pub fn load(&mut self, source: &mut dyn RecordSource) -> Result<usize> {
        let records = source.read()?;
        if records.is_empty() {
            return Err(Error::InvalidData("record source is empty".to_owned()));
        }
        info!("loaded {} records", records.len());
        self.records = records;
        self.shuffle()?;
        Ok(self.records.len())
    }

    /// Re-permute the records and rebuild everything downstream.
    pub fn shuffle(&mut self) -> Result<Split> {
        self.records.shuffle(&mut self.rng);
        self.rebuild()
    }

    /// Switch the active problem and rebuild. Before any records are loaded this
    /// only records the problem.
    ///
    /// If the new problem cannot be built, the previous problem and its tensors
    /// are restored and the error is returned.
    pub fn set_problem(&mut self, problem: Problem) -> Result<Option<Split>> {
        let previous = self.problem;
        self.problem = problem;
        if !self.is_loaded() {
            self.release();
            return Ok(None);
        }
        match self.rebuild() {
            Ok(split) => Ok(Some(split)),
            Err(e) => {
                warn!("cannot switch to {}: {e}", problem.kind());
                self.problem = previous;
                self.rebuild()?;
                Err(e)
            }
        }
    }

    #[inline]
    pub fn is_loaded(&self) -> bool {
        !self.records.is_empty()
    }

    /// Filter, annotate, encode, normalize and split for the active problem.
    pub fn rebuild(&mut self) -> Result<Split> {
        self.release();
        if !self.is_loaded() {
            return Err(Error::NotReady("no records loaded"));
        }

        let problem = self.problem;
        let mut skipped = 0usize;
        self.points.clear();
        for record in self.records.iter().filter(|r| problem.filter(r)) {
            let point = problem.point(*record);
            if problem.is_classification() && point.class_name.is_none() {
                skipped += 1;
                continue;
            }
            self.points.push(point);
        }
        if skipped > 0 {
            warn!(
                "{skipped} records have no {} class and were skipped",
                problem.label_column()
            );
        }
        if self.points.is_empty() {
            return Err(Error::InvalidData(format!(
                "no records pass the {} filter",
                problem.kind()
            )));
        }

        let features = self.feature_tensor()?;
        let labels = self.label_tensor()?;
        self.features = Some(Normalizer::new(&features)?);
        self.labels = Some(Normalizer::new(&labels)?);
        self.rebuilds += 1;
        debug!(
            "rebuilt {} for {} points ({} feature / {} label columns)",
            problem.kind(),
            self.points.len(),
            features.cols(),
            labels.cols()
        );

        self.split(self.ratio)
    }

    /// Contiguous train/test partition of the normalized tensors.
    pub fn split(&mut self, ratio: u8) -> Result<Split> {
        if !(1..=99).contains(&ratio) {
            return Err(Error::InvalidConfig(format!(
                "train/test ratio must be in 1..=99, got {ratio}"
            )));
        }
        let n = self.feature_normalizer()?.tensor()?.rows();
        self.label_normalizer()?.tensor()?;
        self.partitions = None;
        self.ratio = ratio;

        let train = training_size(n, ratio);
        let (training_features, testing_features) =
            self.feature_normalizer()?.tensor()?.split_rows(train)?;
        let (training_labels, testing_labels) =
            self.label_normalizer()?.tensor()?.split_rows(train)?;
        self.partitions = Some(Partitions {
            training_features,
            training_labels,
            testing_features,
            testing_labels,
        });

        Ok(Split {
            training_size: train,
            testing_size: n - train,
        })
    }

    /// Drop normalizers and partitions.
    pub fn release(&mut self) {
        self.partitions = None;
        self.features = None;
        self.labels = None;
    }

    fn feature_tensor(&self) -> Result<Matrix> {
        let mut data = Vec::with_capacity(self.points.len() * self.problem.feature_arity());
        for p in &self.points {
            self.problem.push_features(&p.record, &mut data);
        }
        Matrix::from_flat(data, self.problem.feature_arity())
    }

    fn label_tensor(&self) -> Result<Matrix> {
        let problem = self.problem;
        if problem.is_multiclass() {
            let indices = self
                .points
                .iter()
                .map(|p| {
                    let name = p.class_name.ok_or_else(|| {
                        Error::InvalidData("classification point without a class".to_owned())
                    })?;
                    problem.class_index_for(name)
                })
                .collect::<Result<Vec<_>>>()?;
            Matrix::one_hot(&indices, problem.class_names().len())
        } else if problem.is_binary() {
            Ok(Matrix::column(
                self.points.iter().map(|p| p.record.waterfront).collect(),
            ))
        } else {
            Ok(Matrix::column(
                self.points.iter().map(|p| p.record.price).collect(),
            ))
        }
    }

    fn feature_normalizer(&self) -> Result<&Normalizer> {
        self.features
            .as_ref()
            .ok_or(Error::NotInitialized("feature normalizer"))
    }

    fn label_normalizer(&self) -> Result<&Normalizer> {
        self.labels
            .as_ref()
            .ok_or(Error::NotInitialized("label normalizer"))
    }

    fn partitions(&self) -> Result<&Partitions> {
        self.partitions
            .as_ref()
            .ok_or(Error::NotInitialized("train/test split"))
    }

    pub fn training_features(&self) -> Result<&Matrix> {
        Ok(&self.partitions()?.training_features)
    }

    pub fn training_labels(&self) -> Result<&Matrix> {
        Ok(&self.partitions()?.training_labels)
    }

    pub fn testing_features(&self) -> Result<&Matrix> {
        Ok(&self.partitions()?.testing_features)
    }

    pub fn testing_labels(&self) -> Result<&Matrix> {
        Ok(&self.partitions()?.testing_labels)
    }

    pub fn normalize_feature(&self, tensor: &Matrix) -> Result<Matrix> {
        self.feature_normalizer()?.normalize(tensor)
    }

    pub fn normalize_label(&self, tensor: &Matrix) -> Result<Matrix> {
        self.label_normalizer()?.normalize(tensor)
    }

    pub fn denormalize_feature(&self, tensor: &Matrix, dim: Option<usize>) -> Result<Matrix> {
        self.feature_normalizer()?.denormalize(tensor, dim)
    }

    pub fn denormalize_label(&self, tensor: &Matrix) -> Result<Matrix> {
        self.label_normalizer()?.denormalize(tensor, None)
    }

    #[inline]
    pub fn problem(&self) -> Problem {
        self.problem
    }

    #[inline]
    pub fn ratio(&self) -> u8 {
        self.ratio
    }

    /// Width of the feature tensor for the active problem.
    #[inline]
    pub fn feature_dim(&self) -> usize {
        self.problem.feature_arity()
    }

    #[inline]
    pub fn label_dim(&self) -> usize {
        self.problem.label_arity()
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Records that passed the active problem's filter, annotated.
    pub fn points(&self) -> &[ProblemPoint] {
        &self.points
    }

    pub fn dataset_size(&self) -> usize {
        self.points.len()
    }

    /// Number of completed rebuilds since construction.
    pub fn rebuilds(&self) -> u64 {
        self.rebuilds
    }

    pub fn current_split(&self) -> Option<Split> {
        self.partitions.as_ref().map(|p| Split {
            training_size: p.training_features.rows(),
            testing_size: p.testing_features.rows(),
        })
    }

    pub fn points_plot(&self) -> Plot {
        Plot::Points(self.points.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ProblemKind;

    fn houses() -> Vec<Record> {
        vec![
            Record::new(1000.0, 200_000.0, 0.0, 1.0),
            Record::new(2000.0, 400_000.0, 1.0, 2.0),
            Record::new(3000.0, 600_000.0, 0.0, 3.0),
            Record::new(1500.0, 300_000.0, 0.0, 0.0),
            Record::new(2500.0, 500_000.0, 1.0, 5.0),
        ]
    }

    fn loaded(kind: ProblemKind, ratio: u8) -> DataPipeline {
        let mut p = DataPipeline::with_seed(7, kind.activate().problem, ratio);
        p.load(&mut houses()).unwrap();
        p
    }

    #[test]
    fn training_size_rounds_half_up() {
        assert_eq!(training_size(3, 66), 2);
        assert_eq!(training_size(3, 50), 2);
        assert_eq!(training_size(1, 1), 0);
        assert_eq!(training_size(1, 99), 1);
    }

    #[test]
    fn split_sizes_cover_every_point() {
        let mut p = loaded(ProblemKind::HousePrice, 50);
        for ratio in 1..=99 {
            let s = p.split(ratio).unwrap();
            assert_eq!(s.training_size + s.testing_size, 5, "ratio {ratio}");
            assert_eq!(p.training_features().unwrap().rows(), s.training_size);
            assert_eq!(p.testing_labels().unwrap().rows(), s.testing_size);
        }
        assert!(p.split(0).is_err());
    }

    #[test]
    fn regression_uses_one_feature_and_price_label() {
        let p = loaded(ProblemKind::HousePrice, 60);
        assert_eq!(p.training_features().unwrap().cols(), 1);
        assert_eq!(p.training_labels().unwrap().cols(), 1);
        assert!(p.points().iter().all(|pt| pt.class_name.is_none()));
    }

    #[test]
    fn multiclass_filters_and_one_hot_encodes() {
        let p = loaded(ProblemKind::Bedrooms, 50);
        assert_eq!(p.dataset_size(), 4);
        assert_eq!(p.feature_dim(), 2);
        assert_eq!(p.training_labels().unwrap().cols(), 3);
        for pt in p.points() {
            assert!(pt.class_name.is_some());
        }
        let rows = p.training_labels().unwrap();
        for r in 0..rows.rows() {
            assert_eq!(rows.row(r).iter().sum::<f32>(), 1.0);
        }
    }

    #[test]
    fn binary_label_is_the_raw_column() {
        let p = loaded(ProblemKind::Waterfront, 99);
        let labels = p.denormalize_label(p.training_labels().unwrap()).unwrap();
        assert!(labels.as_slice().iter().all(|&v| v == 0.0 || v == 1.0));
    }

    #[test]
    fn problem_switch_rebuilds_once() {
        let mut p = loaded(ProblemKind::HousePrice, 50);
        let before = p.rebuilds();
        let split = p
            .set_problem(ProblemKind::Bedrooms.activate().problem)
            .unwrap()
            .unwrap();
        assert_eq!(p.rebuilds(), before + 1);
        assert_eq!(split.training_size + split.testing_size, 4);
        assert_eq!(p.problem().kind(), ProblemKind::Bedrooms);
    }

    #[test]
    fn failed_problem_switch_keeps_previous_problem() {
        let mut p = DataPipeline::with_seed(2, ProblemKind::HousePrice.activate().problem, 50);
        let mut src: Vec<Record> = (0..6)
            .map(|i| Record::new(1000.0 + 100.0 * i as f32, 150_000.0, 0.0, 0.0))
            .collect();
        p.load(&mut src).unwrap();
        let features = p.training_features().unwrap().clone();

        let err = p
            .set_problem(ProblemKind::Bedrooms.activate().problem)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidData(_)));
        assert_eq!(p.problem().kind(), ProblemKind::HousePrice);
        assert_eq!(p.feature_dim(), 1);
        assert_eq!(p.training_features().unwrap(), &features);
        assert_eq!(p.dataset_size(), 6);
    }

    #[test]
    fn split_before_rebuild_leaves_ratio_alone() {
        let mut p = DataPipeline::with_seed(0, Problem::default(), 50);
        assert!(matches!(p.split(70), Err(Error::NotInitialized(_))));
        assert_eq!(p.ratio(), 50);
    }

    #[test]
    fn normalization_needs_a_rebuild() {
        let p = DataPipeline::with_seed(0, Problem::default(), 50);
        let m = Matrix::column(vec![1.0]);
        assert!(matches!(
            p.normalize_feature(&m),
            Err(Error::NotInitialized(_))
        ));
        assert!(matches!(
            p.denormalize_label(&m),
            Err(Error::NotInitialized(_))
        ));
        assert!(matches!(
            p.training_features(),
            Err(Error::NotInitialized(_))
        ));
    }

    #[test]
    fn empty_filter_result_is_an_error() {
        let mut p = DataPipeline::with_seed(0, ProblemKind::Bedrooms.activate().problem, 50);
        let mut src = vec![Record::new(1000.0, 1.0, 0.0, 0.0)];
        assert!(matches!(p.load(&mut src), Err(Error::InvalidData(_))));
        assert!(p.training_features().is_err());
    }

    #[test]
    fn shuffle_is_reproducible_per_seed() {
        let a = loaded(ProblemKind::HousePrice, 50);
        let b = loaded(ProblemKind::HousePrice, 50);
        assert_eq!(a.records(), b.records());
    }
}
