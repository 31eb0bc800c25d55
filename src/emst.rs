use crate::data_wrappers::MSTEdge;
use crate::distance::euclidean_distance;
use crate::union_find::UnionFind;
use crate::UmLossError;
use num_traits::Float;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

#[cfg(feature = "parallel")]
pub(super) mod parallel;
#[cfg(feature = "serial")]
pub(super) mod serial;

pub(crate) const BACKGROUND: u64 = 0;

pub(crate) type KdTree<'a, T> = kdtree::KdTree<T, usize, &'a Vec<T>>;

/// The minimum spanning tree algorithm options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MstAlgorithm {
    /// Prim's algorithm. The kd-tree walks of Boruvka degrade to a scan of every point once
    /// the points form a few well separated clusters, which segmented embeddings do.
    Auto,
    /// Dense Prim's algorithm, computing distances between all pairs of points.
    Prim,
    /// Boruvka's algorithm, finding the nearest foreign point of every point with a kd-tree.
    /// Only fast while the nearest foreign point of most points is close by.
    Boruvka,
}

impl MstAlgorithm {
    pub(crate) fn resolve(self) -> MstAlgorithm {
        match self {
            MstAlgorithm::Auto => MstAlgorithm::Prim,
            algo => algo,
        }
    }
}

/// Connects groups of points with the cheapest set of edges. `members` are ascending point
/// indices; `components[k]` is an arbitrary id of the group `members[k]` starts out in.
/// Returns one edge per group but one, ascending by `cmp_edges`, referring to point indices.
pub(crate) trait ComponentConnector<T> {
    fn connect(&self, members: &[usize], components: &[usize])
        -> Result<Vec<MSTEdge<T>>, UmLossError>;
}

/// Total order on edges: weight, then the smaller node id, then the larger one. With this
/// tie-break the minimum spanning tree is unique, whichever algorithm builds it.
pub(crate) fn cmp_edges<T: Float>(a: &MSTEdge<T>, b: &MSTEdge<T>) -> Ordering {
    a.distance
        .partial_cmp(&b.distance)
        // Distances are finite after data validation
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.left_node_id.cmp(&b.left_node_id))
        .then_with(|| a.right_node_id.cmp(&b.right_node_id))
}

pub(crate) fn sort_edges<T: Float>(edges: &mut [MSTEdge<T>]) {
    edges.sort_by(cmp_edges);
}

pub(crate) fn is_better<T: Float>(candidate: &MSTEdge<T>, current: &Option<MSTEdge<T>>) -> bool {
    match current {
        None => true,
        Some(current) => cmp_edges(candidate, current) == Ordering::Less,
    }
}

/// Builds the tree over all points and returns its edges in construction order.
///
/// Unconstrained, this is the Euclidean minimum spanning tree, ascending. Constrained, every
/// label is first spanned on its own (background points excepted, unless background is the
/// only label), then the label trees and remaining points are joined by the cheapest
/// connecting edges; the intra-label edges come first, each phase ascending.
pub(crate) fn build_spanning_tree<T, C>(
    connector: &C,
    labels: &[u64],
    constrained: bool,
) -> Result<Vec<MSTEdge<T>>, UmLossError>
where
    T: Float,
    C: ComponentConnector<T>,
{
    let all_points: Vec<usize> = (0..labels.len()).collect();
    if !constrained {
        return connector.connect(&all_points, &all_points);
    }

    let mut members_by_label: BTreeMap<u64, Vec<usize>> = BTreeMap::new();
    for (point, &label) in labels.iter().enumerate() {
        members_by_label.entry(label).or_default().push(point);
    }
    let only_background = members_by_label.keys().all(|&label| label == BACKGROUND);

    let mut tree = Vec::with_capacity(labels.len().saturating_sub(1));
    let mut components = all_points.clone();
    for (&label, members) in &members_by_label {
        if label == BACKGROUND && !only_background {
            continue;
        }
        let singletons: Vec<usize> = (0..members.len()).collect();
        tree.extend(connector.connect(members, &singletons)?);
        for &point in members {
            components[point] = members[0];
        }
    }
    sort_edges(&mut tree);

    tree.extend(connector.connect(&all_points, &components)?);
    Ok(tree)
}

/// An edge between two member positions, in local ids.
pub(crate) fn local_edge<T: Float>(data: &[Vec<T>], members: &[usize], a: usize, b: usize)
    -> MSTEdge<T> {
    MSTEdge {
        left_node_id: a.min(b),
        right_node_id: a.max(b),
        distance: euclidean_distance(&data[members[a]], &data[members[b]]),
    }
}

/// Maps local edges back onto point indices. Members are ascending, so the order of the
/// node ids, and with it the edge order, is unchanged.
pub(crate) fn to_point_ids<T: Float>(mut edges: Vec<MSTEdge<T>>, members: &[usize])
    -> Vec<MSTEdge<T>> {
    for edge in edges.iter_mut() {
        edge.left_node_id = members[edge.left_node_id];
        edge.right_node_id = members[edge.right_node_id];
    }
    edges
}

/// Local ids of every starting group, keyed by component id, in order of first appearance.
pub(crate) fn group_members(components: &[usize]) -> (Vec<usize>, HashMap<usize, Vec<usize>>) {
    let mut order = Vec::new();
    let mut groups: HashMap<usize, Vec<usize>> = HashMap::new();
    for (local, &component) in components.iter().enumerate() {
        groups.entry(component)
            .or_insert_with(|| {
                order.push(component);
                Vec::new()
            })
            .push(local);
    }
    (order, groups)
}

/// A union find over local ids with the starting groups already merged, along with the
/// number of groups.
pub(crate) fn initial_forest(components: &[usize]) -> (UnionFind, usize) {
    let (order, groups) = group_members(components);
    let mut forest = UnionFind::new(components.len());
    for component in &order {
        let group = &groups[component];
        for &local in &group[1..] {
            let (a, b) = (forest.find(group[0]), forest.find(local));
            if a != b {
                forest.union(a, b);
            }
        }
    }
    (forest, order.len())
}

pub(crate) fn build_kd_tree<'a, T: Float>(data: &'a [Vec<T>], members: &[usize])
    -> Result<KdTree<'a, T>, UmLossError> {
    let mut tree: KdTree<T> = kdtree::KdTree::new(data[members[0]].len());
    for (local, &point) in members.iter().enumerate() {
        tree.add(&data[point], local)
            .map_err(|e| UmLossError::NearestNeighbour(format!("{e:?}")))?;
    }
    Ok(tree)
}

/// The cheapest edge from `local` to a member of a different component, if it beats `bound`.
pub(crate) fn nearest_foreign<T: Float>(
    tree: &KdTree<T>,
    data: &[Vec<T>],
    members: &[usize],
    roots: &[usize],
    local: usize,
    bound: Option<MSTEdge<T>>,
) -> Result<Option<MSTEdge<T>>, UmLossError> {
    let query = &data[members[local]];
    let dist_func = euclidean_distance::<T>;
    let neighbours = tree.iter_nearest(query, &dist_func)
        .map_err(|e| UmLossError::NearestNeighbour(format!("{e:?}")))?;

    let mut best = bound;
    let mut found = None;
    for (distance, &other) in neighbours {
        if let Some(best) = &best {
            if distance > best.distance {
                break;
            }
        }
        if roots[other] == roots[local] {
            continue;
        }
        let candidate = MSTEdge {
            left_node_id: local.min(other),
            right_node_id: local.max(other),
            distance,
        };
        if is_better(&candidate, &best) {
            best = Some(candidate);
            found = Some(candidate);
        }
    }
    Ok(found)
}

/// Keeps the cheapest candidate edge per component, ascending and without duplicates.
pub(crate) fn cheapest_per_component<T: Float>(
    roots: &[usize],
    candidates: impl IntoIterator<Item = (usize, MSTEdge<T>)>,
) -> Vec<MSTEdge<T>> {
    let mut cheapest: HashMap<usize, MSTEdge<T>> = HashMap::new();
    for (local, edge) in candidates {
        let current = cheapest.get(&roots[local]).copied();
        if is_better(&edge, &current) {
            cheapest.insert(roots[local], edge);
        }
    }
    let mut edges: Vec<MSTEdge<T>> = cheapest.into_values().collect();
    sort_edges(&mut edges);
    // Two components can pick the same edge
    edges.dedup();
    edges
}
