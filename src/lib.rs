//! Random forest classification over tabular datasets with numerical and
//! categorical features.
pub use self::criterion::{Criterion, Entropy, Gini};
pub use self::dataset::{ColumnType, Dataset, DatasetBuilder, DatasetError, FeatureDescriptor};
pub use self::error::ForestError;
pub use self::random_forest::RandomForestClassifier;

mod criterion;
mod dataset;
mod decision_tree;
mod error;
mod functions;
mod random_forest;
