use super::{
    build_kd_tree, cheapest_per_component, group_members, initial_forest, is_better,
    local_edge, nearest_foreign, sort_edges, to_point_ids, ComponentConnector, MstAlgorithm,
};
use crate::data_wrappers::MSTEdge;
use crate::UmLossError;
use num_traits::Float;
use std::collections::HashMap;

pub(crate) struct EmstCalculator<'a, T> {
    data: &'a [Vec<T>],
    mst_algo: MstAlgorithm,
}

impl<'a, T: Float> EmstCalculator<'a, T> {
    pub(crate) fn new(data: &'a [Vec<T>], mst_algo: MstAlgorithm) -> Self {
        Self { data, mst_algo }
    }
}

impl<'a, T: Float> ComponentConnector<T> for EmstCalculator<'a, T> {
    fn connect(&self, members: &[usize], components: &[usize])
        -> Result<Vec<MSTEdge<T>>, UmLossError> {
        if members.len() < 2 {
            return Ok(Vec::new());
        }
        let local_edges = match self.mst_algo.resolve() {
            MstAlgorithm::Boruvka => Boruvka::connect(self.data, members, components)?,
            _ => Prim::connect(self.data, members, components),
        };
        Ok(to_point_ids(local_edges, members))
    }
}

pub(crate) struct Prim;

impl Prim {
    /// Grows the tree from the first group. Whenever the cheapest edge leaving the tree is
    /// taken, the whole group at its far end joins the tree.
    fn connect<T: Float>(data: &[Vec<T>], members: &[usize], components: &[usize])
        -> Vec<MSTEdge<T>> {
        let n_samples = members.len();
        let (order, groups) = group_members(components);

        let mut in_tree = vec![false; n_samples];
        let mut cheapest: Vec<Option<MSTEdge<T>>> = vec![None; n_samples];
        let mut mst = Vec::with_capacity(order.len() - 1);
        let mut joining = &groups[&order[0]];

        loop {
            joining.iter().for_each(|&local| in_tree[local] = true);

            for outside in 0..n_samples {
                if in_tree[outside] {
                    continue;
                }
                for &inside in joining {
                    let candidate = local_edge(data, members, inside, outside);
                    if is_better(&candidate, &cheapest[outside]) {
                        cheapest[outside] = Some(candidate);
                    }
                }
            }

            let mut next: Option<(usize, MSTEdge<T>)> = None;
            for outside in 0..n_samples {
                if in_tree[outside] {
                    continue;
                }
                if let Some(edge) = cheapest[outside] {
                    if is_better(&edge, &next.map(|(_, e)| e)) {
                        next = Some((outside, edge));
                    }
                }
            }

            match next {
                None => break,
                Some((outside, edge)) => {
                    mst.push(edge);
                    joining = &groups[&components[outside]];
                }
            }
        }

        sort_edges(&mut mst);
        mst
    }
}

pub(crate) struct Boruvka;

impl Boruvka {
    /// Every round, each component takes its cheapest edge to another component, found
    /// with a kd-tree nearest neighbour walk.
    fn connect<T: Float>(data: &[Vec<T>], members: &[usize], components: &[usize])
        -> Result<Vec<MSTEdge<T>>, UmLossError> {
        let n_samples = members.len();
        let tree = build_kd_tree(data, members)?;
        let (mut forest, mut n_components) = initial_forest(components);
        let mut mst = Vec::with_capacity(n_components - 1);

        while n_components > 1 {
            let roots: Vec<usize> = (0..n_samples).map(|local| forest.find(local)).collect();

            // The best edge found so far for a component bounds the search of its other members
            let mut bounds: HashMap<usize, MSTEdge<T>> = HashMap::new();
            let mut candidates = Vec::with_capacity(n_samples);
            for local in 0..n_samples {
                let bound = bounds.get(&roots[local]).copied();
                if let Some(edge) = nearest_foreign(&tree, data, members, &roots, local, bound)? {
                    bounds.insert(roots[local], edge);
                    candidates.push((local, edge));
                }
            }

            for edge in cheapest_per_component(&roots, candidates) {
                let left = forest.find(edge.left_node_id);
                let right = forest.find(edge.right_node_id);
                if left != right {
                    forest.union(left, right);
                    mst.push(edge);
                    n_components -= 1;
                }
            }
        }

        sort_edges(&mut mst);
        Ok(mst)
    }
}
