#![cfg(feature = "parallel")]
use super::{
    build_kd_tree, cheapest_per_component, cmp_edges, group_members, initial_forest, is_better,
    local_edge, nearest_foreign, sort_edges, to_point_ids, ComponentConnector, MstAlgorithm,
};
use crate::data_wrappers::MSTEdge;
use crate::UmLossError;
use num_traits::Float;
use rayon::prelude::*;

pub(crate) struct EmstCalculatorPar<'a, T> {
    data: &'a [Vec<T>],
    mst_algo: MstAlgorithm,
}

impl<'a, T: Float + Send + Sync> EmstCalculatorPar<'a, T> {
    pub(crate) fn new(data: &'a [Vec<T>], mst_algo: MstAlgorithm) -> Self {
        Self { data, mst_algo }
    }
}

impl<'a, T: Float + Send + Sync> ComponentConnector<T> for EmstCalculatorPar<'a, T> {
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
    fn connect<T: Float + Send + Sync>(data: &[Vec<T>], members: &[usize], components: &[usize])
        -> Vec<MSTEdge<T>> {
        let n_samples = members.len();
        let (order, groups) = group_members(components);

        let mut in_tree = vec![false; n_samples];
        let mut cheapest: Vec<Option<MSTEdge<T>>> = vec![None; n_samples];
        let mut mst = Vec::with_capacity(order.len() - 1);
        let mut joining = &groups[&order[0]];

        loop {
            joining.iter().for_each(|&local| in_tree[local] = true);

            cheapest
                .par_iter_mut()
                .zip(in_tree.par_iter())
                .enumerate()
                .filter(|(_, (_, inside))| !**inside)
                .for_each(|(outside, (cheapest, _))| {
                    for &inside in joining {
                        let candidate = local_edge(data, members, inside, outside);
                        if is_better(&candidate, cheapest) {
                            *cheapest = Some(candidate);
                        }
                    }
                });

            // Edges are totally ordered, so the minimum does not depend on the reduction order
            let next = cheapest
                .par_iter()
                .zip(in_tree.par_iter())
                .enumerate()
                .filter_map(|(outside, (cheapest, &inside))| {
                    if inside { None } else { cheapest.map(|edge| (outside, edge)) }
                })
                .min_by(|a, b| cmp_edges(&a.1, &b.1));

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
    fn connect<T: Float + Send + Sync>(data: &[Vec<T>], members: &[usize], components: &[usize])
        -> Result<Vec<MSTEdge<T>>, UmLossError> {
        let n_samples = members.len();
        let tree = build_kd_tree(data, members)?;
        let (mut forest, mut n_components) = initial_forest(components);
        let mut mst = Vec::with_capacity(n_components - 1);

        while n_components > 1 {
            let roots: Vec<usize> = (0..n_samples).map(|local| forest.find(local)).collect();

            let nearest: Vec<Option<MSTEdge<T>>> = (0..n_samples)
                .into_par_iter()
                .map(|local| nearest_foreign(&tree, data, members, &roots, local, None))
                .collect::<Result<_, _>>()?;
            let candidates = nearest
                .into_iter()
                .enumerate()
                .filter_map(|(local, edge)| edge.map(|edge| (local, edge)));

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
