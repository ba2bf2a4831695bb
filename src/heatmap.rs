// src/heatmap.rs

//! Data preparation for clustered heatmaps of an [`Archetypes`] result.
//! Rendering is left to the caller.

use ndarray::{Array2, ArrayView1, ArrayView2, Axis};

use crate::archetypes::Archetypes;
use crate::matrix::LabeledMatrix;

/// A matrix together with the row and column orders a dendrogram would draw.
#[derive(Clone, Debug)]
pub struct ClusteredHeatmap {
    /// Values in their original order.
    pub data: LabeledMatrix,
    /// Leaf order of the row clustering, as indices into `data` rows.
    pub row_order: Vec<usize>,
    /// Leaf order of the column clustering, as indices into `data` columns.
    pub col_order: Vec<usize>,
}

impl ClusteredHeatmap {
    /// Clusters rows and columns of `data` by single linkage on cosine distance.
    pub fn new(data: LabeledMatrix) -> Self {
        let row_order = single_linkage_order(data.view());
        let col_order = single_linkage_order(data.values().t());
        Self { data, row_order, col_order }
    }

    /// `data` with rows and columns permuted into leaf order.
    pub fn ordered(&self) -> LabeledMatrix {
        let rows = LabeledMatrix::from_parts(
            self.data.values().select(Axis(0), &self.row_order),
            self.row_order.iter().map(|&i| self.data.row_ids()[i].clone()).collect(),
            self.data.column_names().to_vec(),
        );
        LabeledMatrix::from_parts(
            rows.values().select(Axis(1), &self.col_order),
            rows.row_ids().to_vec(),
            self.col_order.iter().map(|&j| rows.column_names()[j].clone()).collect(),
        )
    }
}

/// Archetypes × features heatmap of squared normalized feature loadings
/// (each archetype's intensities sum to 1), z-scored per archetype row.
pub fn feature_heatmap(archetypes: &Archetypes) -> ClusteredHeatmap {
    let intensities = archetypes.h_norm().squared();
    ClusteredHeatmap::new(z_score_rows(&intensities))
}

/// Archetypes × occupations heatmap of squared normalized occupation loadings.
pub fn occupation_heatmap(archetypes: &Archetypes) -> ClusteredHeatmap {
    ClusteredHeatmap::new(archetypes.occupations().squared().transpose())
}

/// Standardizes each row with the sample standard deviation. Rows with zero
/// spread become all zeros.
pub fn z_score_rows(matrix: &LabeledMatrix) -> LabeledMatrix {
    matrix.map_rows(|row| {
        let mean = row.mean().unwrap_or(0.0);
        let std_dev = if row.len() > 1 { row.std(1.0) } else { 0.0 };
        if std_dev > 1e-12 {
            row.mapv(|v| (v - mean) / std_dev)
        } else {
            row.mapv(|_| 0.0)
        }
    })
}

/// `1 - cos(a, b)`. Two zero vectors are at distance 0, a zero and a non-zero vector at 1.
pub fn cosine_distance(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    let na = a.dot(&a).sqrt();
    let nb = b.dot(&b).sqrt();
    if na == 0.0 || nb == 0.0 {
        return if na == nb { 0.0 } else { 1.0 };
    }
    (1.0 - a.dot(&b) / (na * nb)).max(0.0)
}

fn find_root(parent: &mut [usize], mut i: usize) -> usize {
    while parent[i] != i {
        parent[i] = parent[parent[i]];
        i = parent[i];
    }
    i
}

/// Leaf order of the single-linkage dendrogram over the rows of `points`.
///
/// Single linkage merges follow the minimum spanning tree edges in ascending
/// order, so the tree is built with Prim's algorithm and then replayed through
/// a union-find; the cluster holding the smaller leaf is placed first.
pub fn single_linkage_order(points: ArrayView2<f64>) -> Vec<usize> {
    let n = points.nrows();
    if n <= 1 {
        return (0..n).collect();
    }
    let distances = Array2::from_shape_fn((n, n), |(i, j)| {
        if i == j {
            0.0
        } else {
            cosine_distance(points.row(i), points.row(j))
        }
    });

    // Prim's algorithm.
    let mut in_tree = vec![false; n];
    let mut best = vec![f64::INFINITY; n];
    let mut link = vec![0usize; n];
    let mut edges: Vec<(f64, usize, usize)> = Vec::with_capacity(n - 1);
    let mut current = 0;
    in_tree[0] = true;
    for _ in 1..n {
        for j in 0..n {
            if !in_tree[j] && distances[[current, j]] < best[j] {
                best[j] = distances[[current, j]];
                link[j] = current;
            }
        }
        let mut next = None;
        for j in (0..n).filter(|&j| !in_tree[j]) {
            if next.map_or(true, |k: usize| best[j] < best[k]) {
                next = Some(j);
            }
        }
        let Some(next) = next else { break };
        in_tree[next] = true;
        edges.push((best[next], link[next], next));
        current = next;
    }
    edges.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut parent: Vec<usize> = (0..n).collect();
    let mut order: Vec<Vec<usize>> = (0..n).map(|i| vec![i]).collect();
    let mut min_leaf: Vec<usize> = (0..n).collect();
    for (_, a, b) in edges {
        let ra = find_root(&mut parent, a);
        let rb = find_root(&mut parent, b);
        if ra == rb {
            continue;
        }
        let (first, second) = if min_leaf[ra] <= min_leaf[rb] { (ra, rb) } else { (rb, ra) };
        let tail = std::mem::take(&mut order[second]);
        order[first].extend(tail);
        min_leaf[first] = min_leaf[first].min(min_leaf[second]);
        parent[second] = first;
    }
    let root = find_root(&mut parent, 0);
    std::mem::take(&mut order[root])
}
