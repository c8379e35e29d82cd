use ordered_float::OrderedFloat;
use std::cmp::Reverse;
use std::collections::BTreeMap;

pub fn histogram(
    ys: impl Iterator<Item = f64>,
) -> (BTreeMap<OrderedFloat<f64>, usize>, usize) {
    let mut histogram = BTreeMap::<_, usize>::new();
    let mut n = 0;
    for y in ys {
        *histogram.entry(OrderedFloat(y)).or_default() += 1;
        n += 1;
    }
    (histogram, n)
}

/// Most frequent value; equal counts resolve to the lowest value.
pub fn mode(ys: impl Iterator<Item = f64>) -> f64 {
    let (histogram, _) = histogram(ys);
    histogram
        .into_iter()
        .max_by_key(|&(y, count)| (count, Reverse(y)))
        .map(|t| (t.0).0)
        .expect("unreachable")
}

pub fn single_class(mut ys: impl Iterator<Item = f64>) -> bool {
    match ys.next() {
        Some(first) => ys.all(|y| y == first),
        None => true,
    }
}
