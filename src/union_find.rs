use std::collections::HashMap;

/// Disjoint set forest over contiguous ids, with path compression and union by size.
#[derive(Debug, Clone)]
pub(crate) struct UnionFind {
    parent: Vec<usize>,
    size: Vec<usize>,
}

impl UnionFind {
    pub(crate) fn new(n_samples: usize) -> Self {
        UnionFind { parent: (0..n_samples).collect(), size: vec![1; n_samples] }
    }

    /// Merges the sets of the two roots and returns the root of the merged set.
    pub(crate) fn union(&mut self, m: usize, n: usize) -> usize {
        let (big, small) = if self.size[m] >= self.size[n] { (m, n) } else { (n, m) };
        self.parent[small] = big;
        self.size[big] += self.size[small];
        big
    }

    pub(crate) fn find(&mut self, n: usize) -> usize {
        let mut root = n;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut p = n;
        while self.parent[p] != root {
            let next = self.parent[p];
            self.parent[p] = root;
            p = next;
        }
        root
    }

    pub(crate) fn size_of(&self, n: usize) -> usize {
        self.size[n]
    }
}

/// Union find that also tracks how many members of each label a set holds. Label counts
/// live on the root only; on union the smaller map is folded into the larger one.
#[derive(Debug, Clone)]
pub(crate) struct LabelUnionFind {
    sets: UnionFind,
    label_counts: Vec<HashMap<u64, u64>>,
}

/// The pairs that become connected when two sets are merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct MergedPairs {
    pub(crate) total: u64,
    /// Pairs sharing a non-background label
    pub(crate) same_label: u64,
    /// Background-background pairs
    pub(crate) background: u64,
}

impl LabelUnionFind {
    pub(crate) fn new(labels: &[u64]) -> Self {
        let label_counts = labels.iter().map(|&label| HashMap::from([(label, 1)])).collect();
        LabelUnionFind { sets: UnionFind::new(labels.len()), label_counts }
    }

    /// Merges the sets holding `m` and `n`, returning the pairs this resolved. Returns `None`
    /// when the two are already in the same set.
    pub(crate) fn union(&mut self, m: usize, n: usize) -> Option<MergedPairs> {
        let root_m = self.sets.find(m);
        let root_n = self.sets.find(n);
        if root_m == root_n {
            return None;
        }

        let total = self.sets.size_of(root_m) as u64 * self.sets.size_of(root_n) as u64;
        let (mut same_label, mut background) = (0, 0);
        let (small, large) = if self.label_counts[root_m].len() <= self.label_counts[root_n].len() {
            (root_m, root_n)
        } else {
            (root_n, root_m)
        };
        for (label, count) in &self.label_counts[small] {
            if let Some(other) = self.label_counts[large].get(label) {
                if *label == 0 {
                    background += count * other;
                } else {
                    same_label += count * other;
                }
            }
        }

        let root = self.sets.union(root_m, root_n);
        let absorbed = if root == root_m { root_n } else { root_m };
        let mut absorbed_counts = std::mem::take(&mut self.label_counts[absorbed]);
        let mut kept_counts = std::mem::take(&mut self.label_counts[root]);
        if absorbed_counts.len() > kept_counts.len() {
            std::mem::swap(&mut absorbed_counts, &mut kept_counts);
        }
        for (label, count) in absorbed_counts {
            *kept_counts.entry(label).or_insert(0) += count;
        }
        self.label_counts[root] = kept_counts;

        Some(MergedPairs { total, same_label, background })
    }

    #[cfg(test)]
    pub(crate) fn label_count(&mut self, n: usize, label: u64) -> u64 {
        let root = self.sets.find(n);
        self.label_counts[root].get(&label).copied().unwrap_or(0)
    }
}
