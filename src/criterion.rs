use crate::functions;

pub trait Criterion: Send + Sync + Clone {
    /// Impurity of one group of labels. Zero means the group is pure.
    fn impurity<T>(&self, labels: T) -> f64
    where
        T: Iterator<Item = f64> + Clone;

    /// Weighted impurity of a candidate partition of `total` rows.
    ///
    /// Each group contributes its impurity scaled by its share of the rows,
    /// so splitting a large mixed group weighs more than a small one.
    /// Lower is better.
    fn score<G, T>(&self, total: usize, groups: G) -> f64
    where
        G: Iterator<Item = T>,
        T: Iterator<Item = f64> + Clone,
    {
        groups
            .map(|labels| {
                let size = labels.clone().count();
                size as f64 / total as f64 * self.impurity(labels)
            })
            .sum()
    }
}

#[derive(Debug, Clone)]
pub struct Gini;

impl Criterion for Gini {
    fn impurity<T>(&self, labels: T) -> f64
    where
        T: Iterator<Item = f64> + Clone,
    {
        let (histogram, n) = functions::histogram(labels);
        1.0 - histogram
            .into_iter()
            .map(|(_, count)| (count as f64 / n as f64).powi(2))
            .sum::<f64>()
    }
}

#[derive(Debug, Clone)]
pub struct Entropy;

impl Criterion for Entropy {
    fn impurity<T>(&self, labels: T) -> f64
    where
        T: Iterator<Item = f64> + Clone,
    {
        let (histogram, n) = functions::histogram(labels);
        histogram
            .into_iter()
            .map(|(_, count)| {
                let p = count as f64 / n as f64;
                -p * p.log2()
            })
            .sum()
    }
}
