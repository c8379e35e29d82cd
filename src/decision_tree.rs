use crate::criterion::Criterion;
use crate::dataset::{ColumnType, Dataset};
use crate::error::ForestError;
use crate::functions;
use ordered_float::OrderedFloat;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct DecisionTreeOptions {
    pub max_depth: Option<usize>,
    pub min_samples_split: Option<usize>,
    pub abort: Option<Arc<AtomicBool>>,
}

#[derive(Debug)]
pub struct Node {
    pub(crate) predicted_class: f64,
    pub(crate) sample_count: usize,
    pub(crate) depth: usize,
    pub(crate) is_pure: bool,
    pub(crate) split: Option<Split>,
}

#[derive(Debug)]
pub enum Split {
    Categorical {
        column: usize,
        children: BTreeMap<OrderedFloat<f64>, Node>,
    },
    Numerical {
        column: usize,
        threshold: f64,
        lt: Box<Node>,
        ge: Box<Node>,
    },
}

impl Node {
    fn predict(&self, dataset: &Dataset, row: usize) -> f64 {
        match &self.split {
            None => self.predicted_class,
            Some(Split::Numerical {
                column,
                threshold,
                lt,
                ge,
            }) => {
                if dataset.value(row, *column) >= *threshold {
                    ge.predict(dataset, row)
                } else {
                    lt.predict(dataset, row)
                }
            }
            Some(Split::Categorical { column, children }) => {
                match children.get(&OrderedFloat(dataset.value(row, *column))) {
                    Some(child) => child.predict(dataset, row),
                    // A category never observed while training this branch
                    // answers with the branch's own class.
                    None => self.predicted_class,
                }
            }
        }
    }
}

#[derive(Debug)]
pub struct DecisionTree {
    pub(crate) root: Node,
    pub(crate) columns: Vec<usize>,
}

impl DecisionTree {
    pub(crate) fn fit<C: Criterion>(
        criterion: C,
        mut dataset: Dataset,
        label: usize,
        columns: Vec<usize>,
        options: DecisionTreeOptions,
    ) -> Result<Self, ForestError> {
        if dataset.rows_len() == 0 {
            return Err(ForestError::EmptyDataset);
        }

        let builder = TreeBuilder {
            criterion,
            label,
            max_depth: options.max_depth,
            min_samples_split: options.min_samples_split,
            abort: options.abort,
        };
        let root = builder.build(&mut dataset, &columns, 0)?;
        Ok(Self { root, columns })
    }

    pub(crate) fn predict(&self, dataset: &Dataset, row: usize) -> f64 {
        self.root.predict(dataset, row)
    }

    /// Feature columns this tree was allowed to split on.
    pub(crate) fn columns(&self) -> &[usize] {
        &self.columns
    }
}

struct TreeBuilder<C> {
    criterion: C,
    label: usize,
    max_depth: Option<usize>,
    min_samples_split: Option<usize>,
    abort: Option<Arc<AtomicBool>>,
}

struct Candidate {
    column: usize,
    score: f64,
    // `None` for categorical columns
    threshold: Option<f64>,
}

impl<C: Criterion> TreeBuilder<C> {
    fn build(
        &self,
        dataset: &mut Dataset,
        columns: &[usize],
        depth: usize,
    ) -> Result<Node, ForestError> {
        if let Some(abort) = &self.abort {
            if abort.load(Ordering::Relaxed) {
                return Err(ForestError::Aborted);
            }
        }

        let labels = dataset.column(self.label);
        let mut node = Node {
            predicted_class: functions::mode(labels.clone()),
            sample_count: dataset.rows_len(),
            depth,
            is_pure: functions::single_class(labels),
            split: None,
        };

        if node.is_pure
            || columns.is_empty()
            || self.max_depth.map_or(false, |limit| depth >= limit)
            || self
                .min_samples_split
                .map_or(false, |limit| node.sample_count < limit)
        {
            return Ok(node);
        }

        // Equal scores keep the earlier column.
        let mut best: Option<Candidate> = None;
        for &column in columns {
            let candidate = match dataset.column_type(column) {
                ColumnType::Numerical => self.numerical_candidate(dataset, column),
                ColumnType::Categorical => self.categorical_candidate(dataset, column),
            };
            if let Some(candidate) = candidate {
                if best.as_ref().map_or(true, |b| candidate.score < b.score) {
                    best = Some(candidate);
                }
            }
        }

        let best = match best {
            Some(best) => best,
            // No remaining column separates these rows.
            None => return Ok(node),
        };

        let remaining = columns
            .iter()
            .copied()
            .filter(|&column| column != best.column)
            .collect::<Vec<_>>();
        node.split = Some(self.split_on(dataset, &best, &remaining, depth)?);
        Ok(node)
    }

    fn numerical_candidate(&self, dataset: &mut Dataset, column: usize) -> Option<Candidate> {
        dataset.sort_rows_by_column(column);
        let rows_len = dataset.rows_len();
        let mut best: Option<Candidate> = None;
        for (row, threshold) in dataset.thresholds(column) {
            let ratio_lt = row as f64 / rows_len as f64;
            let impurity_lt = self.criterion.impurity(dataset.column(self.label).take(row));
            let impurity_ge = self.criterion.impurity(dataset.column(self.label).skip(row));
            let score = ratio_lt * impurity_lt + (1.0 - ratio_lt) * impurity_ge;
            if best.as_ref().map_or(true, |b| score < b.score) {
                best = Some(Candidate {
                    column,
                    score,
                    threshold: Some(threshold),
                });
            }
        }
        best
    }

    fn categorical_candidate(&self, dataset: &mut Dataset, column: usize) -> Option<Candidate> {
        dataset.sort_rows_by_column(column);
        let groups = dataset.group_ranges(column);
        if groups.len() < 2 {
            return None;
        }

        let score = self.criterion.score(
            dataset.rows_len(),
            groups.iter().map(|(_, range)| {
                dataset
                    .column(self.label)
                    .skip(range.start)
                    .take(range.end - range.start)
            }),
        );
        Some(Candidate {
            column,
            score,
            threshold: None,
        })
    }

    fn split_on(
        &self,
        dataset: &mut Dataset,
        candidate: &Candidate,
        columns: &[usize],
        depth: usize,
    ) -> Result<Split, ForestError> {
        dataset.sort_rows_by_column(candidate.column);
        match candidate.threshold {
            Some(threshold) => {
                let lt_rows = dataset
                    .column(candidate.column)
                    .take_while(|&value| value < threshold)
                    .count();
                let rows_len = dataset.rows_len();
                let lt = dataset.with_range(0..lt_rows, |view| self.build(view, columns, depth + 1))?;
                let ge =
                    dataset.with_range(lt_rows..rows_len, |view| self.build(view, columns, depth + 1))?;
                Ok(Split::Numerical {
                    column: candidate.column,
                    threshold,
                    lt: Box::new(lt),
                    ge: Box::new(ge),
                })
            }
            None => {
                let mut children = BTreeMap::new();
                for (value, range) in dataset.group_ranges(candidate.column) {
                    let child =
                        dataset.with_range(range, |view| self.build(view, columns, depth + 1))?;
                    children.insert(OrderedFloat(value), child);
                }
                Ok(Split::Categorical {
                    column: candidate.column,
                    children,
                })
            }
        }
    }
}
