//! Weighted CART decision trees.

use rand::Rng;
use rand::seq::index;
use serde::{Deserialize, Serialize};

/// How many features each split considers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaxFeatures {
    All,
    /// `max(1, floor(sqrt(n_features)))`, drawn without replacement per node.
    Sqrt,
}

impl MaxFeatures {
    pub fn resolve(self, n_features: usize) -> usize {
        match self {
            Self::All => n_features,
            Self::Sqrt => ((n_features as f64).sqrt().floor() as usize).clamp(1, n_features.max(1)),
        }
    }
}

/// Growth limits for a single tree.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TreeParams {
    /// `None` grows until leaves are pure or too small to split.
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub max_features: MaxFeatures,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self {
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: MaxFeatures::All,
        }
    }
}

/// Fit targets. The variant picks the split criterion.
#[derive(Debug, Clone, Copy)]
pub enum Targets<'a> {
    /// Weighted Gini impurity; leaves hold the class distribution.
    Classes { y: &'a [usize], n_classes: usize },
    /// Weighted squared error; leaves hold the mean.
    Values(&'a [f32]),
}

/// Tree node stored in a flat arena; children are indices into `nodes`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Node {
    /// Rows with `feature <= threshold` go left.
    Split {
        feature: u16,
        threshold: f32,
        left: u32,
        right: u32,
    },
    Leaf { value: Vec<f32> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    /// Root is `nodes[0]`.
    pub nodes: Vec<Node>,
    /// Width of each leaf value (class count, or 1 for regression).
    pub n_outputs: usize,
    /// Unnormalised weighted impurity decrease per feature.
    pub impurity_decrease: Vec<f64>,
}

impl DecisionTree {
    /// Grow a tree over `samples` (row indices into `x`), weighting row `i`
    /// by `weights[i]`.
    ///
    /// `rng` is only drawn from when `params.max_features` selects a subset.
    pub fn fit<R: Rng>(
        x: &[Vec<f32>],
        targets: Targets<'_>,
        weights: &[f64],
        samples: Vec<usize>,
        params: &TreeParams,
        rng: &mut R,
    ) -> Self {
        let n_features = x.first().map(Vec::len).unwrap_or(0);
        match targets {
            Targets::Classes { y, n_classes } => {
                let proto = ClassStats::empty(y, n_classes);
                grow(x, weights, samples, params, rng, n_features, proto)
            }
            Targets::Values(y) => {
                let proto = ValueStats::empty(y);
                grow(x, weights, samples, params, rng, n_features, proto)
            }
        }
    }

    /// Index of the leaf node `features` lands in.
    pub fn leaf_index(&self, features: &[f32]) -> usize {
        let mut idx = 0usize;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { .. } => return idx,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    let value = features.get(*feature as usize).copied().unwrap_or(0.0);
                    idx = if value <= *threshold { *left } else { *right } as usize;
                }
            }
        }
    }

    /// Leaf value for `features`.
    pub fn predict(&self, features: &[f32]) -> &[f32] {
        match &self.nodes[self.leaf_index(features)] {
            Node::Leaf { value } => value,
            Node::Split { .. } => &[],
        }
    }

    /// Replace the value of a leaf node. Split nodes are left untouched.
    pub(crate) fn set_leaf_value(&mut self, node: usize, new_value: Vec<f32>) {
        if let Some(Node::Leaf { value }) = self.nodes.get_mut(node) {
            *value = new_value;
        }
    }

    pub fn depth(&self) -> usize {
        let mut max_depth = 0usize;
        let mut stack = vec![(0usize, 0usize)];
        while let Some((idx, depth)) = stack.pop() {
            max_depth = max_depth.max(depth);
            if let Some(Node::Split { left, right, .. }) = self.nodes.get(idx) {
                stack.push((*left as usize, depth + 1));
                stack.push((*right as usize, depth + 1));
            }
        }
        max_depth
    }

    pub fn leaf_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|node| matches!(node, Node::Leaf { .. }))
            .count()
    }

    /// Structural checks used when a tree is loaded from disk.
    pub fn validate(&self, n_features: usize) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("tree has no nodes".to_string());
        }
        let n_nodes = self.nodes.len();
        for (idx, node) in self.nodes.iter().enumerate() {
            match node {
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    if *feature as usize >= n_features {
                        return Err(format!("node {idx} splits on missing feature {feature}"));
                    }
                    if !threshold.is_finite() {
                        return Err(format!("node {idx} has a non-finite threshold"));
                    }
                    // Children are always allocated after their parent.
                    for child in [*left as usize, *right as usize] {
                        if child <= idx || child >= n_nodes {
                            return Err(format!("node {idx} has invalid child {child}"));
                        }
                    }
                }
                Node::Leaf { value } => {
                    if value.len() != self.n_outputs {
                        return Err(format!(
                            "leaf {idx} has {} outputs, expected {}",
                            value.len(),
                            self.n_outputs
                        ));
                    }
                }
            }
        }
        Ok(())
    }
}

/// Sufficient statistics of a node under one split criterion.
trait NodeStats: Clone {
    fn add(&mut self, sample: usize, weight: f64);
    fn minus(&self, other: &Self) -> Self;
    fn weight(&self) -> f64;
    fn impurity(&self) -> f64;
    fn leaf_value(&self) -> Vec<f32>;
    fn n_outputs(&self) -> usize;
}

#[derive(Debug, Clone)]
struct ClassStats<'a> {
    y: &'a [usize],
    totals: Vec<f64>,
    weight: f64,
}

impl<'a> ClassStats<'a> {
    fn empty(y: &'a [usize], n_classes: usize) -> Self {
        Self {
            y,
            totals: vec![0.0; n_classes],
            weight: 0.0,
        }
    }
}

impl NodeStats for ClassStats<'_> {
    fn add(&mut self, sample: usize, weight: f64) {
        self.totals[self.y[sample]] += weight;
        self.weight += weight;
    }

    fn minus(&self, other: &Self) -> Self {
        Self {
            y: self.y,
            totals: self
                .totals
                .iter()
                .zip(&other.totals)
                .map(|(a, b)| (a - b).max(0.0))
                .collect(),
            weight: (self.weight - other.weight).max(0.0),
        }
    }

    fn weight(&self) -> f64 {
        self.weight
    }

    fn impurity(&self) -> f64 {
        if self.weight <= 0.0 {
            return 0.0;
        }
        let sum_sq: f64 = self
            .totals
            .iter()
            .map(|&total| {
                let p = total / self.weight;
                p * p
            })
            .sum();
        (1.0 - sum_sq).max(0.0)
    }

    fn leaf_value(&self) -> Vec<f32> {
        if self.weight <= 0.0 {
            return vec![1.0 / self.totals.len() as f32; self.totals.len()];
        }
        self.totals
            .iter()
            .map(|&total| (total / self.weight) as f32)
            .collect()
    }

    fn n_outputs(&self) -> usize {
        self.totals.len()
    }
}

#[derive(Debug, Clone)]
struct ValueStats<'a> {
    y: &'a [f32],
    weight: f64,
    sum: f64,
    sum_sq: f64,
}

impl<'a> ValueStats<'a> {
    fn empty(y: &'a [f32]) -> Self {
        Self {
            y,
            weight: 0.0,
            sum: 0.0,
            sum_sq: 0.0,
        }
    }
}

impl NodeStats for ValueStats<'_> {
    fn add(&mut self, sample: usize, weight: f64) {
        let v = self.y[sample] as f64;
        self.weight += weight;
        self.sum += weight * v;
        self.sum_sq += weight * v * v;
    }

    fn minus(&self, other: &Self) -> Self {
        Self {
            y: self.y,
            weight: (self.weight - other.weight).max(0.0),
            sum: self.sum - other.sum,
            sum_sq: self.sum_sq - other.sum_sq,
        }
    }

    fn weight(&self) -> f64 {
        self.weight
    }

    fn impurity(&self) -> f64 {
        if self.weight <= 0.0 {
            return 0.0;
        }
        let mean = self.sum / self.weight;
        (self.sum_sq / self.weight - mean * mean).max(0.0)
    }

    fn leaf_value(&self) -> Vec<f32> {
        if self.weight <= 0.0 {
            return vec![0.0];
        }
        vec![(self.sum / self.weight) as f32]
    }

    fn n_outputs(&self) -> usize {
        1
    }
}

const MIN_IMPURITY_DECREASE: f64 = 1e-12;

struct Pending {
    slot: usize,
    samples: Vec<usize>,
    depth: usize,
}

struct BestSplit {
    feature: usize,
    threshold: f32,
    /// `W_left * imp_left + W_right * imp_right`.
    child_cost: f64,
}

fn grow<S: NodeStats, R: Rng>(
    x: &[Vec<f32>],
    weights: &[f64],
    samples: Vec<usize>,
    params: &TreeParams,
    rng: &mut R,
    n_features: usize,
    proto: S,
) -> DecisionTree {
    let n_outputs = proto.n_outputs();
    let mut nodes = vec![Node::Leaf {
        value: vec![0.0; n_outputs],
    }];
    let mut impurity_decrease = vec![0.0f64; n_features];
    let mut stack = vec![Pending {
        slot: 0,
        samples,
        depth: 0,
    }];

    while let Some(task) = stack.pop() {
        let mut stats = proto.clone();
        for &sample in &task.samples {
            stats.add(sample, weights[sample]);
        }
        let parent_cost = stats.weight() * stats.impurity();

        let splittable = n_features > 0
            && task.samples.len() >= params.min_samples_split.max(2)
            && task.samples.len() >= 2 * params.min_samples_leaf.max(1)
            && params.max_depth.is_none_or(|max| task.depth < max)
            && stats.weight() > 0.0
            && stats.impurity() > MIN_IMPURITY_DECREASE;

        let best = if splittable {
            best_split(x, weights, &task.samples, &stats, &proto, params, rng, n_features)
                .filter(|split| parent_cost - split.child_cost > MIN_IMPURITY_DECREASE)
        } else {
            None
        };

        let Some(split) = best else {
            nodes[task.slot] = Node::Leaf {
                value: stats.leaf_value(),
            };
            continue;
        };

        impurity_decrease[split.feature] += parent_cost - split.child_cost;
        let (left_samples, right_samples): (Vec<usize>, Vec<usize>) = task
            .samples
            .iter()
            .partition(|&&sample| x[sample][split.feature] <= split.threshold);

        let left = nodes.len();
        nodes.push(Node::Leaf { value: Vec::new() });
        let right = nodes.len();
        nodes.push(Node::Leaf { value: Vec::new() });
        nodes[task.slot] = Node::Split {
            feature: split.feature as u16,
            threshold: split.threshold,
            left: left as u32,
            right: right as u32,
        };
        stack.push(Pending {
            slot: right,
            samples: right_samples,
            depth: task.depth + 1,
        });
        stack.push(Pending {
            slot: left,
            samples: left_samples,
            depth: task.depth + 1,
        });
    }

    DecisionTree {
        nodes,
        n_outputs,
        impurity_decrease,
    }
}

#[allow(clippy::too_many_arguments)]
fn best_split<S: NodeStats, R: Rng>(
    x: &[Vec<f32>],
    weights: &[f64],
    samples: &[usize],
    parent: &S,
    proto: &S,
    params: &TreeParams,
    rng: &mut R,
    n_features: usize,
) -> Option<BestSplit> {
    // Features are visited in random order until `k` non-constant ones have
    // been evaluated, so a constant feature never turns a node into a leaf.
    let k = params.max_features.resolve(n_features);
    let features: Vec<usize> = if k >= n_features {
        (0..n_features).collect()
    } else {
        index::sample(rng, n_features, n_features).into_vec()
    };

    let min_leaf = params.min_samples_leaf.max(1);
    let mut best: Option<BestSplit> = None;
    let mut order: Vec<(f32, usize)> = Vec::with_capacity(samples.len());
    let mut evaluated = 0usize;

    for feature in features {
        if evaluated >= k {
            break;
        }
        order.clear();
        order.extend(samples.iter().map(|&sample| (x[sample][feature], sample)));
        order.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        if order.first().map(|first| first.0) == order.last().map(|last| last.0) {
            continue;
        }
        evaluated += 1;

        let mut left = proto.clone();
        for pos in 0..order.len() - 1 {
            let (value, sample) = order[pos];
            left.add(sample, weights[sample]);
            let next_value = order[pos + 1].0;
            if value == next_value {
                continue;
            }
            let left_count = pos + 1;
            if left_count < min_leaf || order.len() - left_count < min_leaf {
                continue;
            }
            let right = parent.minus(&left);
            let cost = left.weight() * left.impurity() + right.weight() * right.impurity();
            if best.as_ref().is_none_or(|current| cost < current.child_cost) {
                best = Some(BestSplit {
                    feature,
                    threshold: midpoint(value, next_value),
                    child_cost: cost,
                });
            }
        }
    }
    best
}

/// A threshold in `[lo, hi)` so `lo` goes left and `hi` goes right.
fn midpoint(lo: f32, hi: f32) -> f32 {
    let mid = lo + (hi - lo) / 2.0;
    if mid >= hi || !mid.is_finite() { lo } else { mid }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    #[test]
    fn classification_tree_separates_on_the_informative_feature() {
        let x = vec![
            vec![5.0, 1.0],
            vec![5.0, 2.0],
            vec![5.0, 3.0],
            vec![5.0, 10.0],
            vec![5.0, 11.0],
            vec![5.0, 12.0],
        ];
        let y = [0, 0, 0, 1, 1, 1];
        let tree = DecisionTree::fit(
            &x,
            Targets::Classes { y: &y, n_classes: 2 },
            &[1.0; 6],
            (0..6).collect(),
            &TreeParams::default(),
            &mut rng(),
        );
        assert_eq!(tree.nodes.len(), 3);
        match &tree.nodes[0] {
            Node::Split {
                feature, threshold, ..
            } => {
                assert_eq!(*feature, 1);
                assert_eq!(*threshold, 6.5);
            }
            other => panic!("expected split, got {other:?}"),
        }
        assert_eq!(tree.predict(&[0.0, 2.5]), &[1.0, 0.0]);
        assert_eq!(tree.predict(&[0.0, 6.5]), &[1.0, 0.0]);
        assert_eq!(tree.predict(&[0.0, 6.6]), &[0.0, 1.0]);
        assert_eq!(tree.impurity_decrease[0], 0.0);
        assert!(tree.impurity_decrease[1] > 0.0);
        tree.validate(2).unwrap();
    }

    #[test]
    fn regression_tree_leaves_hold_weighted_means() {
        let x = vec![vec![0.0], vec![1.0], vec![10.0], vec![11.0]];
        let y = [1.0, 3.0, 20.0, 20.0];
        let params = TreeParams {
            max_depth: Some(1),
            ..TreeParams::default()
        };
        let tree = DecisionTree::fit(
            &x,
            Targets::Values(&y),
            &[1.0, 3.0, 1.0, 1.0],
            (0..4).collect(),
            &params,
            &mut rng(),
        );
        assert_eq!(tree.depth(), 1);
        assert_eq!(tree.predict(&[0.5]), &[2.5]);
        assert_eq!(tree.predict(&[10.5]), &[20.0]);
    }

    #[test]
    fn pure_or_constant_nodes_become_leaves() {
        let x = vec![vec![1.0], vec![1.0], vec![1.0]];
        let y = [0, 1, 0];
        let tree = DecisionTree::fit(
            &x,
            Targets::Classes { y: &y, n_classes: 2 },
            &[1.0; 3],
            (0..3).collect(),
            &TreeParams::default(),
            &mut rng(),
        );
        assert_eq!(tree.nodes.len(), 1);
        let value = tree.predict(&[1.0]);
        assert!((value[0] - 2.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn min_samples_leaf_limits_splits() {
        let x: Vec<Vec<f32>> = (0..4).map(|v| vec![v as f32]).collect();
        let y = [0, 1, 1, 1];
        let params = TreeParams {
            min_samples_leaf: 2,
            ..TreeParams::default()
        };
        let tree = DecisionTree::fit(
            &x,
            Targets::Classes { y: &y, n_classes: 2 },
            &[1.0; 4],
            (0..4).collect(),
            &params,
            &mut rng(),
        );
        match &tree.nodes[0] {
            Node::Split { threshold, .. } => assert_eq!(*threshold, 1.5),
            other => panic!("expected split, got {other:?}"),
        }
        assert_eq!(tree.leaf_count(), 2);
    }

    #[test]
    fn sqrt_feature_sampling_is_seed_deterministic() {
        let x: Vec<Vec<f32>> = (0..40)
            .map(|i| (0..9).map(|j| ((i * (j + 3)) % 17) as f32).collect())
            .collect();
        let y: Vec<usize> = (0..40).map(|i| (i * 7 % 3) as usize).collect();
        let params = TreeParams {
            max_features: MaxFeatures::Sqrt,
            ..TreeParams::default()
        };
        let fit = |seed| {
            DecisionTree::fit(
                &x,
                Targets::Classes { y: &y, n_classes: 3 },
                &[1.0; 40],
                (0..40).collect(),
                &params,
                &mut StdRng::seed_from_u64(seed),
            )
        };
        assert_eq!(fit(11), fit(11));
        assert_eq!(MaxFeatures::Sqrt.resolve(11), 3);
        assert_eq!(MaxFeatures::Sqrt.resolve(1), 1);
    }

    #[test]
    fn validate_rejects_broken_trees() {
        let tree = DecisionTree {
            nodes: vec![Node::Split {
                feature: 0,
                threshold: 1.0,
                left: 0,
                right: 5,
            }],
            n_outputs: 1,
            impurity_decrease: vec![0.0],
        };
        assert!(tree.validate(1).is_err());
    }

    #[test]
    fn midpoint_stays_below_the_upper_value() {
        assert_eq!(midpoint(1.0, 2.0), 1.5);
        let lo = 1.0f32;
        let hi = f32::from_bits(lo.to_bits() + 1);
        assert_eq!(midpoint(lo, hi), lo);
    }
}
