use crate::criterion::Criterion;
use crate::dataset::Dataset;
use crate::decision_tree::{DecisionTree, DecisionTreeOptions};
use crate::error::ForestError;
use crate::functions;
use rand::rngs::StdRng;
use rand::seq::SliceRandom as _;
use rand::{Rng, SeedableRng};
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use std::num::NonZeroUsize;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Random forest classifier.
///
/// Starts out unfitted; [`RandomForestClassifier::fit`] trains the ensemble
/// and [`RandomForestClassifier::predict`] aggregates the per-tree votes.
#[derive(Debug)]
pub struct RandomForestClassifier<C> {
    criterion: C,
    trees: NonZeroUsize,
    max_depth: Option<usize>,
    min_samples_split: Option<usize>,
    max_features: Option<NonZeroUsize>,
    seed: Option<u64>,
    parallel: bool,
    bootstrap: bool,
    abort: Option<Arc<AtomicBool>>,
    forest: Vec<DecisionTree>,
}

impl<C: Criterion> RandomForestClassifier<C> {
    /// Makes an unfitted classifier that will train `trees` decision trees.
    pub fn new(trees: NonZeroUsize, criterion: C) -> Self {
        Self {
            criterion,
            trees,
            max_depth: None,
            min_samples_split: None,
            max_features: None,
            seed: None,
            parallel: false,
            bootstrap: true,
            abort: None,
            forest: Vec::new(),
        }
    }

    /// Sets the maximum tree depth (the root is at depth `0`).
    ///
    /// Unlimited by default.
    pub fn max_depth(&mut self, limit: usize) -> &mut Self {
        self.max_depth = Some(limit);
        self
    }

    /// Sets the minimum number of rows a node needs before it may split.
    ///
    /// Unlimited by default.
    pub fn min_samples_split(&mut self, limit: usize) -> &mut Self {
        self.min_samples_split = Some(limit);
        self
    }

    /// Sets the number of feature columns sampled for each decision tree.
    ///
    /// The default value is `floor(sqrt(the number of features))`.
    pub fn max_features(&mut self, max: NonZeroUsize) -> &mut Self {
        self.max_features = Some(max);
        self
    }

    /// Sets the random generator seed.
    ///
    /// The default value is random.
    pub fn seed(&mut self, seed: u64) -> &mut Self {
        self.seed = Some(seed);
        self
    }

    /// Enables parallel executions of `fit`.
    ///
    /// This library use `rayon` for parallel execution.
    /// Please see [the rayon document](https://docs.rs/rayon) if you want to
    /// configure the behavior (e.g., the number of worker threads).
    pub fn parallel(&mut self) -> &mut Self {
        self.parallel = true;
        self
    }

    /// Enables or disables bootstrap row sampling.
    ///
    /// Enabled by default; when disabled every tree trains on all rows.
    pub fn bootstrap(&mut self, enabled: bool) -> &mut Self {
        self.bootstrap = enabled;
        self
    }

    /// Installs a cooperative abort flag.
    ///
    /// Raising the flag makes an in-flight `fit` stop at the next node and
    /// return [`ForestError::Aborted`], keeping the previous state.
    pub fn abort_flag(&mut self, flag: Arc<AtomicBool>) -> &mut Self {
        self.abort = Some(flag);
        self
    }

    /// Trains the ensemble on `dataset` with `label` as the class column and
    /// returns the training-set accuracy.
    ///
    /// Each tree gets a bootstrap sample of the rows and its own subset of
    /// feature columns, drawn without replacement. Refitting an already
    /// fitted classifier replaces the whole ensemble; on error the previous
    /// ensemble is kept.
    pub fn fit(&mut self, dataset: &Dataset, label: &str) -> Result<f64, ForestError> {
        if dataset.rows_len() == 0 {
            return Err(ForestError::EmptyDataset);
        }
        let label_column = resolve_column(dataset, label)?;
        let columns = (0..dataset.columns_len())
            .filter(|&column| column != label_column)
            .collect::<Vec<_>>();
        let max_features = self.decide_max_features(columns.len());
        let options = DecisionTreeOptions {
            max_depth: self.max_depth,
            min_samples_split: self.min_samples_split,
            abort: self.abort.clone(),
        };

        let forest = if self.parallel {
            self.tree_rngs()
                .collect::<Vec<_>>()
                .into_par_iter()
                .map(|mut rng| {
                    self.tree_fit(&mut rng, dataset, label_column, &columns, max_features, &options)
                })
                .collect::<Result<Vec<_>, _>>()?
        } else {
            self.tree_rngs()
                .map(|mut rng| {
                    self.tree_fit(&mut rng, dataset, label_column, &columns, max_features, &options)
                })
                .collect::<Result<Vec<_>, _>>()?
        };

        self.forest = forest;
        self.evaluate(dataset, label)
    }

    /// Predicts a label for every row of `dataset` by majority vote.
    ///
    /// The dataset must have the training schema; a label column, if
    /// present, is ignored. Vote ties resolve towards the lowest label.
    pub fn predict(&self, dataset: &Dataset) -> Result<Vec<f64>, ForestError> {
        if self.forest.is_empty() {
            return Err(ForestError::NotFit);
        }
        Ok((0..dataset.rows_len())
            .map(|row| functions::mode(self.forest.iter().map(|tree| tree.predict(dataset, row))))
            .collect())
    }

    /// Fraction of rows whose predicted label matches the `label` column.
    pub fn evaluate(&self, dataset: &Dataset, label: &str) -> Result<f64, ForestError> {
        let label_column = resolve_column(dataset, label)?;
        let predictions = self.predict(dataset)?;
        let hits = predictions
            .iter()
            .zip(dataset.column(label_column))
            .filter(|&(&prediction, truth)| prediction == truth)
            .count();
        Ok(hits as f64 / predictions.len() as f64)
    }

    /// Feature column subsets chosen for each tree during the last fit.
    pub fn feature_subsets(&self) -> impl '_ + Iterator<Item = &[usize]> {
        self.forest.iter().map(|tree| tree.columns())
    }

    fn tree_fit<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        dataset: &Dataset,
        label: usize,
        columns: &[usize],
        max_features: usize,
        options: &DecisionTreeOptions,
    ) -> Result<DecisionTree, ForestError> {
        let sample = if self.bootstrap {
            dataset.bootstrap_sample(rng)
        } else {
            dataset.clone()
        };
        let mut subset = columns
            .choose_multiple(rng, max_features.min(columns.len()))
            .copied()
            .collect::<Vec<_>>();
        // Split-selection ties resolve towards the lowest column index.
        subset.sort_unstable();
        DecisionTree::fit(self.criterion.clone(), sample, label, subset, options.clone())
    }

    fn tree_rngs(&self) -> impl Iterator<Item = StdRng> {
        let seed_u64 = self.seed.unwrap_or_else(|| rand::thread_rng().gen());
        let mut seed = [0u8; 32];
        seed[0..8].copy_from_slice(&seed_u64.to_be_bytes()[..]);
        let mut rng = StdRng::from_seed(seed);
        (0..self.trees.get()).map(move |_| {
            let mut seed = [0u8; 32];
            rng.fill(&mut seed);
            StdRng::from_seed(seed)
        })
    }

    fn decide_max_features(&self, columns_len: usize) -> usize {
        if let Some(n) = self.max_features {
            n.get()
        } else {
            (columns_len as f64).sqrt().floor() as usize
        }
    }
}

fn resolve_column(dataset: &Dataset, name: &str) -> Result<usize, ForestError> {
    dataset
        .column_index(name)
        .ok_or_else(|| ForestError::UnknownColumn {
            name: name.to_owned(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criterion::{Entropy, Gini};
    use crate::dataset::{ColumnType, DatasetBuilder};
    use crate::decision_tree::Node;
    use std::sync::atomic::Ordering;

    fn trees(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).expect("unreachable")
    }

    fn mixed_builder() -> Result<DatasetBuilder, anyhow::Error> {
        let mut builder = DatasetBuilder::new();
        builder
            .column("weather", ColumnType::Categorical)
            .column("temperature", ColumnType::Numerical)
            .column("play", ColumnType::Categorical);
        for &(weather, temperature, play) in &[
            (0.0, 21.0, 1.0),
            (0.0, 25.0, 1.0),
            (0.0, 30.0, 0.0),
            (1.0, 18.0, 0.0),
            (1.0, 22.0, 0.0),
            (1.0, 24.0, 0.0),
            (2.0, 20.0, 1.0),
            (2.0, 26.0, 1.0),
            (2.0, 31.0, 0.0),
            (0.0, 19.0, 1.0),
        ] {
            builder.add_row(&[weather, temperature, play])?;
        }
        Ok(builder)
    }

    fn leaf_tree(predicted_class: f64) -> DecisionTree {
        DecisionTree {
            root: Node {
                predicted_class,
                sample_count: 1,
                depth: 0,
                is_pure: true,
                split: None,
            },
            columns: Vec::new(),
        }
    }

    #[test]
    fn classification_works() -> Result<(), anyhow::Error> {
        let builder = mixed_builder()?;
        let dataset = builder.build()?;

        let mut classifier = RandomForestClassifier::new(trees(50), Gini);
        classifier.seed(0);
        let accuracy = classifier.fit(&dataset, "play")?;
        assert!((0.0..=1.0).contains(&accuracy));

        let predictions = classifier.predict(&dataset)?;
        assert_eq!(predictions.len(), dataset.rows_len());
        assert!(predictions.iter().all(|p| *p == 0.0 || *p == 1.0));
        Ok(())
    }

    #[test]
    fn parallel_fit_matches_serial_fit() -> Result<(), anyhow::Error> {
        let builder = mixed_builder()?;
        let dataset = builder.build()?;

        let mut serial = RandomForestClassifier::new(trees(20), Gini);
        serial.seed(0);
        serial.fit(&dataset, "play")?;

        let mut parallel = RandomForestClassifier::new(trees(20), Gini);
        parallel.seed(0).parallel();
        parallel.fit(&dataset, "play")?;

        assert_eq!(serial.predict(&dataset)?, parallel.predict(&dataset)?);
        Ok(())
    }

    #[test]
    fn same_seed_is_deterministic() -> Result<(), anyhow::Error> {
        let builder = mixed_builder()?;
        let dataset = builder.build()?;

        let mut first = RandomForestClassifier::new(trees(10), Entropy);
        first.seed(7);
        first.fit(&dataset, "play")?;

        let mut second = RandomForestClassifier::new(trees(10), Entropy);
        second.seed(7);
        second.fit(&dataset, "play")?;

        assert_eq!(first.predict(&dataset)?, second.predict(&dataset)?);

        // Refitting replaces the ensemble with an identical one.
        let before = first.predict(&dataset)?;
        first.fit(&dataset, "play")?;
        assert_eq!(before, first.predict(&dataset)?);
        Ok(())
    }

    #[test]
    fn single_tree_separates_perfectly() -> Result<(), anyhow::Error> {
        let mut builder = DatasetBuilder::new();
        builder
            .column("x", ColumnType::Numerical)
            .column("y", ColumnType::Categorical);
        for &(x, y) in &[
            (1.0, 0.0),
            (2.0, 0.0),
            (3.0, 0.0),
            (10.0, 1.0),
            (11.0, 1.0),
            (12.0, 1.0),
        ] {
            builder.add_row(&[x, y])?;
        }
        let dataset = builder.build()?;

        let mut classifier = RandomForestClassifier::new(trees(1), Gini);
        classifier
            .seed(0)
            .bootstrap(false)
            .max_features(NonZeroUsize::new(1).expect("unreachable"));
        assert_eq!(classifier.fit(&dataset, "y")?, 1.0);

        let mut classifier = RandomForestClassifier::new(trees(1), Entropy);
        classifier.seed(0).bootstrap(false);
        assert_eq!(classifier.fit(&dataset, "y")?, 1.0);
        Ok(())
    }

    #[test]
    fn pure_categorical_example_is_learned_exactly() -> Result<(), anyhow::Error> {
        let mut builder = DatasetBuilder::new();
        builder
            .column("weather", ColumnType::Categorical)
            .column("play", ColumnType::Categorical);
        builder.add_row(&[0.0, 1.0])?;
        builder.add_row(&[0.0, 1.0])?;
        builder.add_row(&[1.0, 0.0])?;
        builder.add_row(&[1.0, 0.0])?;
        let dataset = builder.build()?;

        let mut classifier = RandomForestClassifier::new(trees(1), Gini);
        classifier.seed(0).bootstrap(false);
        assert_eq!(classifier.fit(&dataset, "play")?, 1.0);
        assert_eq!(classifier.evaluate(&dataset, "play")?, 1.0);
        Ok(())
    }

    #[test]
    fn majority_vote_aggregates_tree_predictions() -> Result<(), anyhow::Error> {
        let mut builder = DatasetBuilder::new();
        builder.column("x", ColumnType::Numerical);
        builder.add_row(&[0.0])?;
        let dataset = builder.build()?;

        let mut classifier = RandomForestClassifier::new(trees(3), Gini);
        classifier.forest = vec![leaf_tree(1.0), leaf_tree(1.0), leaf_tree(0.0)];
        assert_eq!(classifier.predict(&dataset)?, vec![1.0]);

        // A vote tie resolves towards the lowest label.
        let mut classifier = RandomForestClassifier::new(trees(2), Gini);
        classifier.forest = vec![leaf_tree(1.0), leaf_tree(0.0)];
        assert_eq!(classifier.predict(&dataset)?, vec![0.0]);
        Ok(())
    }

    #[test]
    fn predict_and_evaluate_require_fit() -> Result<(), anyhow::Error> {
        let builder = mixed_builder()?;
        let dataset = builder.build()?;
        let classifier = RandomForestClassifier::new(trees(3), Gini);

        assert!(matches!(
            classifier.predict(&dataset),
            Err(ForestError::NotFit)
        ));
        assert!(matches!(
            classifier.evaluate(&dataset, "play"),
            Err(ForestError::NotFit)
        ));
        Ok(())
    }

    #[test]
    fn unknown_label_column_is_rejected() -> Result<(), anyhow::Error> {
        let builder = mixed_builder()?;
        let dataset = builder.build()?;
        let mut classifier = RandomForestClassifier::new(trees(3), Gini);
        assert!(matches!(
            classifier.fit(&dataset, "humidity"),
            Err(ForestError::UnknownColumn { .. })
        ));
        Ok(())
    }

    #[test]
    fn raised_abort_flag_cancels_fit() -> Result<(), anyhow::Error> {
        let builder = mixed_builder()?;
        let dataset = builder.build()?;

        let flag = Arc::new(AtomicBool::new(false));
        flag.store(true, Ordering::Relaxed);

        let mut classifier = RandomForestClassifier::new(trees(3), Gini);
        classifier.seed(0).abort_flag(Arc::clone(&flag));
        assert!(matches!(
            classifier.fit(&dataset, "play"),
            Err(ForestError::Aborted)
        ));
        assert!(matches!(
            classifier.predict(&dataset),
            Err(ForestError::NotFit)
        ));
        Ok(())
    }

    #[test]
    fn feature_subsets_are_sampled_without_replacement() -> Result<(), anyhow::Error> {
        let mut builder = DatasetBuilder::new();
        builder
            .column("a", ColumnType::Numerical)
            .column("b", ColumnType::Numerical)
            .column("c", ColumnType::Numerical)
            .column("y", ColumnType::Categorical);
        builder.add_row(&[1.0, 2.0, 3.0, 0.0])?;
        builder.add_row(&[4.0, 5.0, 6.0, 1.0])?;
        builder.add_row(&[7.0, 8.0, 9.0, 0.0])?;
        let dataset = builder.build()?;

        let mut classifier = RandomForestClassifier::new(trees(8), Gini);
        classifier
            .seed(3)
            .max_features(NonZeroUsize::new(2).expect("unreachable"));
        classifier.fit(&dataset, "y")?;

        for subset in classifier.feature_subsets() {
            assert_eq!(subset.len(), 2);
            assert!(subset.windows(2).all(|pair| pair[0] < pair[1]));
            assert!(subset.iter().all(|column| *column < 3));
        }
        Ok(())
    }
}
