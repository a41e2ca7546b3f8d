//! Minimum-cost bipartite assignment
//!
//! Classical O(n³) potential-based Hungarian / Kuhn-Munkres algorithm.
//! Non-square cost matrices are padded to square with a finite sentinel
//! just above the largest real cost; exactly `min(rows, cols)` pairs
//! come back, the shorter side fully matched.

/// Solve the optimal linear assignment for `cost[row][col]`.
///
/// Returns `(row, col)` pairs of the minimum-total-cost matching,
/// sorted by row index.
pub fn min_cost_assignment(cost: &[Vec<f32>]) -> Vec<(usize, usize)> {
    if cost.is_empty() {
        return vec![];
    }
    let n_rows = cost.len();
    let n_cols = cost[0].len();
    if n_cols == 0 {
        return vec![];
    }

    let n = n_rows.max(n_cols);
    let inf = f64::MAX / 2.0;

    // Dummy cells carry a uniform cost one above the largest real
    // entry. Every padded row/column pays it exactly once, so it is
    // neutral to the matching among real cells; an astronomically
    // large sentinel instead would be folded into the potentials and
    // swamp real cost differences.
    let mut pad = f64::MIN;
    for row in cost {
        for &v in row {
            pad = pad.max(v as f64);
        }
    }
    let pad = pad + 1.0;

    let mut c = vec![vec![pad; n]; n];
    for (i, row) in cost.iter().enumerate() {
        for (j, &v) in row.iter().enumerate() {
            c[i][j] = v as f64;
        }
    }

    // u[i]/v[j]: row/column potentials (1-indexed; column 0 is a dummy
    // source). p[j]: row currently assigned to column j, 0 = free.
    let mut u = vec![0.0_f64; n + 1];
    let mut v = vec![0.0_f64; n + 1];
    let mut p = vec![0_usize; n + 1];
    let mut way = vec![0_usize; n + 1];

    for i in 1..=n {
        p[0] = i;
        let mut j0 = 0_usize;
        let mut min_val = vec![inf; n + 1];
        let mut used = vec![false; n + 1];

        // Dijkstra-style shortest augmenting path with potential updates.
        loop {
            used[j0] = true;
            let i0 = p[j0];
            let mut delta = inf;
            let mut j1 = 0_usize;

            for j in 1..=n {
                if !used[j] {
                    let val = c[i0 - 1][j - 1] - u[i0] - v[j];
                    if val < min_val[j] {
                        min_val[j] = val;
                        way[j] = j0;
                    }
                    if min_val[j] < delta {
                        delta = min_val[j];
                        j1 = j;
                    }
                }
            }

            for j in 0..=n {
                if used[j] {
                    u[p[j]] += delta;
                    v[j] -= delta;
                } else {
                    min_val[j] -= delta;
                }
            }

            j0 = j1;
            if p[j0] == 0 {
                break;
            }
        }

        // Trace back and augment.
        loop {
            p[j0] = p[way[j0]];
            j0 = way[j0];
            if j0 == 0 {
                break;
            }
        }
    }

    let mut assignments = Vec::new();
    for j in 1..=n {
        if p[j] != 0 {
            let row = p[j] - 1;
            let col = j - 1;
            if row < n_rows && col < n_cols {
                assignments.push((row, col));
            }
        }
    }
    assignments.sort_unstable_by_key(|&(row, _)| row);
    assignments
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_matrix_assigns_diagonal() {
        let cost = vec![vec![0.0, 1.0], vec![1.0, 0.0]];
        assert_eq!(min_cost_assignment(&cost), vec![(0, 0), (1, 1)]);
    }

    #[test]
    fn swapped_matrix_assigns_antidiagonal() {
        let cost = vec![vec![1.0, 0.0], vec![0.0, 1.0]];
        assert_eq!(min_cost_assignment(&cost), vec![(0, 1), (1, 0)]);
    }

    #[test]
    fn picks_globally_optimal_over_greedy() {
        // Greedy would grab (0,0)=1 and be forced into (1,1)=10 (total 11);
        // the optimal pairing is (0,1)+(1,0) with total 4.
        let cost = vec![vec![1.0, 2.0], vec![2.0, 10.0]];
        assert_eq!(min_cost_assignment(&cost), vec![(0, 1), (1, 0)]);
    }

    #[test]
    fn rectangular_matrix_matches_shorter_side() {
        let cost = vec![vec![5.0, 1.0, 3.0]];
        assert_eq!(min_cost_assignment(&cost), vec![(0, 1)]);

        let cost = vec![vec![5.0], vec![1.0], vec![3.0]];
        assert_eq!(min_cost_assignment(&cost), vec![(1, 0)]);
    }

    #[test]
    fn tall_matrix_picks_the_cheaper_row_not_the_first() {
        // With more rows than columns the padding must stay neutral:
        // row 1 at cost 1 beats row 0 at cost 5.
        let cost = vec![vec![5.0], vec![1.0]];
        assert_eq!(min_cost_assignment(&cost), vec![(1, 0)]);

        // Same property with several real columns in play.
        let cost = vec![
            vec![0.9, 0.8],
            vec![0.1, 0.9],
            vec![0.9, 0.2],
        ];
        assert_eq!(min_cost_assignment(&cost), vec![(1, 0), (2, 1)]);
    }

    #[test]
    fn empty_matrix_yields_no_pairs() {
        assert!(min_cost_assignment(&[]).is_empty());
        assert!(min_cost_assignment(&[vec![]]).is_empty());
    }
}
