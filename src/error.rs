use thiserror::Error;

/// Errors surfaced by forest training, prediction, and evaluation.
#[derive(Debug, Error, Clone)]
pub enum ForestError {
    /// The dataset handed to `fit` has no rows.
    #[error("dataset must contain at least one row")]
    EmptyDataset,

    /// A referenced column name is not part of the dataset schema.
    #[error("unknown column {name:?}")]
    UnknownColumn { name: String },

    /// `predict` or `evaluate` was called before a successful `fit`.
    #[error("the forest has not been fitted")]
    NotFit,

    /// The cooperative abort flag was raised while fitting.
    #[error("fit was aborted")]
    Aborted,
}
