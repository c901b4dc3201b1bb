//! Correlation kernels over the expression matrix.

use ndarray::Array2;
use rayon::prelude::*;

use crate::config::CorrelationMethod;

/// Tie-averaged ranks of `values`, 1-based, ascending (largest value gets
/// the largest rank).
pub fn ranks_average(values: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));
    let mut ranks = vec![0.0; values.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && values[order[j + 1]] == values[order[i]] {
            j += 1;
        }
        let rank = (i + j + 2) as f64 / 2.0;
        for &k in &order[i..=j] {
            ranks[k] = rank;
        }
        i = j + 1;
    }
    ranks
}

/// Pairwise correlation across the rows of `x` (genes by samples).
///
/// The result is symmetric with unit diagonal; a zero-variance row yields
/// NaN entries which the caller maps to `DegenerateExpression`.
pub fn correlation_matrix(x: &Array2<f64>, method: CorrelationMethod) -> Array2<f64> {
    match method {
        CorrelationMethod::Pearson => pearson(x),
        CorrelationMethod::Spearman => spearman(x),
        CorrelationMethod::Kendall => kendall(x),
    }
}

fn pearson(x: &Array2<f64>) -> Array2<f64> {
    let (n, s) = x.dim();
    let mut z = Array2::zeros((n, s));
    for i in 0..n {
        let row = x.row(i);
        let mean = row.sum() / s as f64;
        let norm = row.iter().map(|v| (v - mean).powi(2)).sum::<f64>().sqrt();
        for j in 0..s {
            z[[i, j]] = if norm > 0.0 {
                (x[[i, j]] - mean) / norm
            } else {
                f64::NAN
            };
        }
    }
    let mut c = z.dot(&z.t());
    c.mapv_inplace(|v| v.clamp(-1.0, 1.0));
    for i in 0..n {
        c[[i, i]] = 1.0;
    }
    c
}

fn spearman(x: &Array2<f64>) -> Array2<f64> {
    let (n, s) = x.dim();
    let mut ranked = Array2::zeros((n, s));
    for i in 0..n {
        let row: Vec<f64> = x.row(i).to_vec();
        let ranks = ranks_average(&row);
        for j in 0..s {
            ranked[[i, j]] = ranks[j];
        }
    }
    pearson(&ranked)
}

/// Kendall tau-b of two sample vectors.
fn kendall_tau(a: &[f64], b: &[f64]) -> f64 {
    let s = a.len();
    let mut concordant = 0u64;
    let mut discordant = 0u64;
    let mut ties_a = 0u64;
    let mut ties_b = 0u64;
    for i in 0..s {
        for j in (i + 1)..s {
            let da = a[i] - a[j];
            let db = b[i] - b[j];
            if da == 0.0 {
                ties_a += 1;
            }
            if db == 0.0 {
                ties_b += 1;
            }
            if da != 0.0 && db != 0.0 {
                if (da > 0.0) == (db > 0.0) {
                    concordant += 1;
                } else {
                    discordant += 1;
                }
            }
        }
    }
    let n0 = (s * (s - 1) / 2) as f64;
    let denom = ((n0 - ties_a as f64) * (n0 - ties_b as f64)).sqrt();
    (concordant as f64 - discordant as f64) / denom
}

fn kendall(x: &Array2<f64>) -> Array2<f64> {
    let n = x.nrows();
    let rows: Vec<Vec<f64>> = (0..n).map(|i| x.row(i).to_vec()).collect();
    let taus: Vec<Vec<f64>> = (0..n)
        .into_par_iter()
        .map(|i| {
            ((i + 1)..n)
                .map(|j| kendall_tau(&rows[i], &rows[j]))
                .collect()
        })
        .collect();
    let mut c = Array2::zeros((n, n));
    for i in 0..n {
        c[[i, i]] = 1.0;
        for j in (i + 1)..n {
            let tau = taus[i][j - i - 1].clamp(-1.0, 1.0);
            c[[i, j]] = tau;
            c[[j, i]] = tau;
        }
    }
    c
}
