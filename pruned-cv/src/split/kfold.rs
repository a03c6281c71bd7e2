//! K-fold and stratified k-fold splitters.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::data::Dataset;

use super::{Fold, FoldSplitter, SplitError};

/// K-Fold cross-validator.
///
/// Splits the rows into `n_splits` consecutive blocks; each block is the
/// validation set once while the others form the training set. The first
/// `n_samples % n_splits` blocks get one extra row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KFold {
    n_splits: usize,
    shuffle: bool,
    random_state: Option<u64>,
}

impl KFold {
    pub fn new(n_splits: usize) -> Self {
        Self {
            n_splits,
            shuffle: false,
            random_state: None,
        }
    }

    /// Enable shuffling before splitting into blocks.
    pub fn with_shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    /// Set the seed for reproducible shuffling. Implies shuffling.
    pub fn with_random_state(mut self, random_state: u64) -> Self {
        self.random_state = Some(random_state);
        self.shuffle = true;
        self
    }

    /// Split `n_samples` row indices.
    pub fn split_indices(&self, n_samples: usize) -> Result<Vec<Fold>, SplitError> {
        check_split_count(self.n_splits, n_samples)?;

        let mut indices: Vec<usize> = (0..n_samples).collect();
        if self.shuffle {
            indices.shuffle(&mut rng(self.random_state));
        }

        let blocks = partition(&indices, self.n_splits);
        Ok(folds_from_blocks(&blocks))
    }
}

impl FoldSplitter for KFold {
    fn n_splits(&self) -> usize {
        self.n_splits
    }

    fn split(&self, dataset: &Dataset) -> Result<Vec<Fold>, SplitError> {
        self.split_indices(dataset.len())
    }
}

/// Stratified K-Fold cross-validator.
///
/// Uses the target values as class labels. Each class deals its rows out to
/// the folds in turn, starting where the previous class stopped, so every
/// fold keeps roughly the class proportions of the whole dataset and fold
/// sizes differ by at most one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StratifiedKFold {
    n_splits: usize,
    shuffle: bool,
    random_state: Option<u64>,
}

impl StratifiedKFold {
    pub fn new(n_splits: usize) -> Self {
        Self {
            n_splits,
            shuffle: false,
            random_state: None,
        }
    }

    pub fn with_shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    pub fn with_random_state(mut self, random_state: u64) -> Self {
        self.random_state = Some(random_state);
        self.shuffle = true;
        self
    }

    /// Split by class labels.
    ///
    /// Fails only when every class has fewer members than `n_splits`.
    pub fn split_labels(&self, labels: &[f64]) -> Result<Vec<Fold>, SplitError> {
        check_split_count(self.n_splits, labels.len())?;

        // Keyed by bit pattern so class order is deterministic
        let mut classes: BTreeMap<u64, Vec<usize>> = BTreeMap::new();
        for (i, label) in labels.iter().enumerate() {
            classes.entry(label.to_bits()).or_default().push(i);
        }

        let largest = classes.values().map(Vec::len).max().unwrap_or(0);
        if largest < self.n_splits {
            return Err(SplitError::ClassesTooSmall {
                n_splits: self.n_splits,
                largest,
            });
        }

        let mut rng = rng(self.random_state);
        let mut fold_indices: Vec<Vec<usize>> = vec![Vec::new(); self.n_splits];
        let mut offset = 0;

        for indices in classes.values_mut() {
            if self.shuffle {
                indices.shuffle(&mut rng);
            }
            for (j, &index) in indices.iter().enumerate() {
                fold_indices[(offset + j) % self.n_splits].push(index);
            }
            offset = (offset + indices.len()) % self.n_splits;
        }

        for indices in &mut fold_indices {
            indices.sort_unstable();
        }

        Ok(folds_from_blocks(&fold_indices))
    }
}

impl FoldSplitter for StratifiedKFold {
    fn n_splits(&self) -> usize {
        self.n_splits
    }

    fn split(&self, dataset: &Dataset) -> Result<Vec<Fold>, SplitError> {
        self.split_labels(dataset.targets())
    }
}

fn check_split_count(n_splits: usize, n_samples: usize) -> Result<(), SplitError> {
    if n_splits < 2 {
        return Err(SplitError::TooFewSplits(n_splits));
    }
    if n_splits > n_samples {
        return Err(SplitError::TooManySplits {
            n_splits,
            n_samples,
        });
    }
    Ok(())
}

fn rng(random_state: Option<u64>) -> StdRng {
    match random_state {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

/// Cut `indices` into `n` consecutive blocks, spreading the remainder over
/// the first blocks.
fn partition(indices: &[usize], n: usize) -> Vec<Vec<usize>> {
    let base = indices.len() / n;
    let remainder = indices.len() % n;

    let mut blocks = Vec::with_capacity(n);
    let mut start = 0;
    for i in 0..n {
        let size = if i < remainder { base + 1 } else { base };
        blocks.push(indices[start..start + size].to_vec());
        start += size;
    }
    blocks
}

fn folds_from_blocks(blocks: &[Vec<usize>]) -> Vec<Fold> {
    (0..blocks.len())
        .map(|i| {
            let train = blocks
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .flat_map(|(_, block)| block.iter().copied())
                .collect();
            Fold::new(train, blocks[i].clone())
        })
        .collect()
}
