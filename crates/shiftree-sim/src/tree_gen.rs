//! Random trees for simulation runs.
//!
//! Every shape is grown the same way: start from a single tip and split one
//! tip into two until there are enough. The shape decides which tip splits.

use anyhow::{Result, bail};
use rand_distr::Exp;
use serde::{Deserialize, Serialize};
use shiftree_core::{ChainRng, Tree};

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum TreeShape {
    /// Split tips in breadth-first order.
    #[default]
    Balanced,
    /// Always split the newest tip, giving a maximally deep tree.
    Caterpillar,
    /// Split a uniformly chosen tip (Yule topology).
    Random,
}

/// Generate a tree with `tips` named tips (`t0`, `t1`, ...) and branch
/// lengths drawn from an exponential with the given mean.
///
/// # Errors
///
/// Fails for fewer than two tips or a non-positive mean branch length.
pub fn generate_tree(
    shape: TreeShape,
    tips: usize,
    mean_branch_length: f64,
    rng: &mut ChainRng,
) -> Result<Tree> {
    if tips < 2 {
        bail!("tips must be >= 2, got {tips}");
    }
    if !(mean_branch_length.is_finite() && mean_branch_length > 0.0) {
        bail!("mean_branch_length must be positive, got {mean_branch_length}");
    }
    let lengths = Exp::new(1.0 / mean_branch_length)?;

    let mut parents: Vec<Option<usize>> = vec![None];
    let mut open = vec![0_usize];
    while open.len() < tips {
        let index = match shape {
            TreeShape::Balanced => 0,
            TreeShape::Caterpillar => open.len() - 1,
            TreeShape::Random => pick(rng, open.len()),
        };
        let parent = open.remove(index);
        for _ in 0..2 {
            open.push(parents.len());
            parents.push(Some(parent));
        }
    }

    let branch_lengths: Vec<f64> = (0..parents.len())
        .map(|i| {
            if i == 0 {
                return 0.0;
            }
            let length = rng.sample(&lengths);
            if length > 0.0 { length } else { mean_branch_length }
        })
        .collect();

    let mut names = vec![None; parents.len()];
    let mut sorted = open;
    sorted.sort_unstable();
    for (k, node) in sorted.into_iter().enumerate() {
        names[node] = Some(format!("t{k}"));
    }

    Ok(Tree::from_structure(&parents, &branch_lengths, names)?)
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn pick(rng: &mut ChainRng, len: usize) -> usize {
    ((rng.uniform_rv() * len as f64) as usize).min(len - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn depth(tree: &Tree) -> usize {
        tree.tips()
            .map(|tip| {
                let mut steps = 0;
                let mut cursor = tree.node(tip).anc();
                while let Some(id) = cursor {
                    steps += 1;
                    cursor = tree.node(id).anc();
                }
                steps
            })
            .max()
            .unwrap_or(0)
    }

    #[test]
    fn every_shape_has_the_requested_tips() {
        for shape in [TreeShape::Balanced, TreeShape::Caterpillar, TreeShape::Random] {
            let mut rng = ChainRng::seed_from_u64(3);
            let tree = generate_tree(shape, 9, 0.5, &mut rng).unwrap();
            assert_eq!(tree.tips().count(), 9, "{shape:?}");
            assert_eq!(tree.len(), 17);
            assert!(tree.node_by_name("t8").is_ok());
        }
    }

    #[test]
    fn caterpillar_is_deeper_than_balanced() {
        let mut rng = ChainRng::seed_from_u64(5);
        let balanced = generate_tree(TreeShape::Balanced, 16, 1.0, &mut rng).unwrap();
        let caterpillar = generate_tree(TreeShape::Caterpillar, 16, 1.0, &mut rng).unwrap();
        assert_eq!(depth(&balanced), 4);
        assert_eq!(depth(&caterpillar), 15);
    }

    #[test]
    fn same_seed_same_tree() {
        let a = generate_tree(TreeShape::Random, 12, 1.0, &mut ChainRng::seed_from_u64(8)).unwrap();
        let b = generate_tree(TreeShape::Random, 12, 1.0, &mut ChainRng::seed_from_u64(8)).unwrap();
        assert_eq!(a.preorder(), b.preorder());
        assert_eq!(
            a.total_map_length().to_bits(),
            b.total_map_length().to_bits()
        );
    }

    #[test]
    fn degenerate_requests_fail() {
        let mut rng = ChainRng::seed_from_u64(0);
        assert!(generate_tree(TreeShape::Balanced, 1, 1.0, &mut rng).is_err());
        assert!(generate_tree(TreeShape::Balanced, 4, 0.0, &mut rng).is_err());
    }
}
