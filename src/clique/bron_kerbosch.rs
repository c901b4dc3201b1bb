//! Maximal-clique enumeration via Bron-Kerbosch with pivoting.

use std::collections::BTreeSet;

/// Enumerate all maximal cliques of at least `min_size` vertices.
///
/// `adjacency[v]` is the neighbour set of vertex `v`; the graph is
/// undirected and loop-free.  Enumeration is exact and deterministic for
/// a given adjacency.
pub fn maximal_cliques(adjacency: &[BTreeSet<usize>], min_size: usize) -> Vec<Vec<usize>> {
    let mut cliques = Vec::new();
    let mut r = Vec::new();
    let mut p: BTreeSet<usize> = (0..adjacency.len()).collect();
    let mut x = BTreeSet::new();
    expand(adjacency, &mut r, &mut p, &mut x, min_size, &mut cliques);
    cliques
}

fn expand(
    adjacency: &[BTreeSet<usize>],
    r: &mut Vec<usize>,
    p: &mut BTreeSet<usize>,
    x: &mut BTreeSet<usize>,
    min_size: usize,
    out: &mut Vec<Vec<usize>>,
) {
    if p.is_empty() && x.is_empty() {
        if r.len() >= min_size {
            let mut clique = r.clone();
            clique.sort_unstable();
            out.push(clique);
        }
        return;
    }
    // pivot on the vertex covering most of P
    let pivot = p
        .iter()
        .chain(x.iter())
        .copied()
        .max_by_key(|&u| adjacency[u].intersection(p).count())
        .expect("P or X is non-empty");
    let candidates: Vec<usize> = p.difference(&adjacency[pivot]).copied().collect();
    for v in candidates {
        r.push(v);
        let mut p_next: BTreeSet<usize> = p.intersection(&adjacency[v]).copied().collect();
        let mut x_next: BTreeSet<usize> = x.intersection(&adjacency[v]).copied().collect();
        expand(adjacency, r, &mut p_next, &mut x_next, min_size, out);
        r.pop();
        p.remove(&v);
        x.insert(v);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use pretty_assertions::assert_eq;

    fn adjacency(n: usize, edges: &[(usize, usize)]) -> Vec<BTreeSet<usize>> {
        let mut adjacency = vec![BTreeSet::new(); n];
        for &(u, v) in edges {
            adjacency[u].insert(v);
            adjacency[v].insert(u);
        }
        adjacency
    }

    fn sorted(mut cliques: Vec<Vec<usize>>) -> Vec<Vec<usize>> {
        cliques.sort();
        cliques
    }

    #[test]
    fn triangle_with_tail() {
        let adjacency = adjacency(4, &[(0, 1), (0, 2), (1, 2), (2, 3)]);
        let cliques = sorted(super::maximal_cliques(&adjacency, 3));
        assert_eq!(cliques, vec![vec![0, 1, 2]]);
    }

    #[test]
    fn complete_graph_is_one_clique() {
        let adjacency = adjacency(4, &[(0, 1), (0, 2), (0, 3), (1, 2), (1, 3), (2, 3)]);
        let cliques = sorted(super::maximal_cliques(&adjacency, 3));
        assert_eq!(cliques, vec![vec![0, 1, 2, 3]]);
    }

    #[test]
    fn overlapping_cliques_are_both_maximal() {
        // two triangles sharing the edge (1, 2)
        let adjacency = adjacency(4, &[(0, 1), (0, 2), (1, 2), (1, 3), (2, 3)]);
        let cliques = sorted(super::maximal_cliques(&adjacency, 3));
        assert_eq!(cliques, vec![vec![0, 1, 2], vec![1, 2, 3]]);
    }

    #[test]
    fn path_has_no_clique_of_three()  {
        let adjacency = adjacency(4, &[(0, 1), (1, 2), (2, 3)]);
        assert_eq!(super::maximal_cliques(&adjacency, 3), Vec::<Vec<usize>>::new());
    }

    #[test]
    fn min_size_filters_but_keeps_maximality() {
        // triangle plus an isolated edge; the edge is maximal but too small
        let adjacency = adjacency(5, &[(0, 1), (0, 2), (1, 2), (3, 4)]);
        let cliques = sorted(super::maximal_cliques(&adjacency, 3));
        assert_eq!(cliques, vec![vec![0, 1, 2]]);
    }

    #[test]
    fn every_pair_inside_each_clique_is_connected() {
        let adjacency = adjacency(
            6,
            &[
                (0, 1),
                (0, 2),
                (1, 2),
                (1, 3),
                (2, 3),
                (3, 4),
                (3, 5),
                (4, 5),
                (2, 4),
            ],
        );
        for clique in super::maximal_cliques(&adjacency, 3) {
            for i in 0..clique.len() {
                for j in (i + 1)..clique.len() {
                    assert!(adjacency[clique[i]].contains(&clique[j]));
                }
            }
        }
    }
}
