//! Normalisation of the correlation matrix into a co-expression network.

use ndarray::Array2;

use super::correlation::ranks_average;
use crate::config::Normalization;

/// Apply the configured normalisation.
pub fn normalize_matrix(c: &Array2<f64>, normalization: Normalization) -> Array2<f64> {
    match normalization {
        Normalization::Mr => mutual_rank(c),
        Normalization::Clr => clr(c),
    }
}

/// Mutual Rank: `sqrt(R * R^T)` over row-wise tie-averaged ranks.
///
/// The strongest correlate of a row carries the largest rank, so a high
/// entry of the product requires both genes to rank each other's
/// neighbourhood highly.
pub fn mutual_rank(c: &Array2<f64>) -> Array2<f64> {
    let n = c.nrows();
    let mut r = Array2::zeros((n, n));
    for i in 0..n {
        let row: Vec<f64> = c.row(i).to_vec();
        let ranks = ranks_average(&row);
        for j in 0..n {
            r[[i, j]] = ranks[j];
        }
    }
    let mut out = r.dot(&r.t());
    out.mapv_inplace(f64::sqrt);
    out
}

/// CLR-like normalisation: `sqrt(Z * Z^T + Z^T * Z)` over the
/// column-standardised correlation matrix with negatives clamped to zero.
pub fn clr(c: &Array2<f64>) -> Array2<f64> {
    let n = c.nrows();
    let mut z = Array2::zeros((n, n));
    for j in 0..n {
        let col = c.column(j);
        let mean = col.sum() / n as f64;
        let sd = (col.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64).sqrt();
        for i in 0..n {
            let standardised = if sd > 0.0 { (c[[i, j]] - mean) / sd } else { 0.0 };
            z[[i, j]] = standardised.max(0.0);
        }
    }
    let mut out = z.dot(&z.t()) + z.t().dot(&z);
    out.mapv_inplace(f64::sqrt);
    out
}
