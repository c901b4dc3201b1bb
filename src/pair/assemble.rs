//! Restriction of two species networks to their shared ortholog universe.

use ndarray::Array2;

use crate::config::{Config, SignVariant};
use crate::error::WorkerError;
use crate::input::OrthoPairRecord;
use crate::network::{density_threshold, SpeciesNetwork};

/// One expanded ortholog-pair row, as indices into the label tables of
/// [`PairData`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairRow {
    /// Index into the orthogroup table.
    pub hog: u32,
    /// Index into the species-a gene table.
    pub a: u32,
    /// Index into the species-b gene table.
    pub b: u32,
}

/// Expanded ortholog-pair table for one canonical species pair.
#[derive(Debug, Clone)]
pub struct PairData {
    /// Lexicographically smaller species.
    pub species_a: String,
    /// Lexicographically larger species.
    pub species_b: String,
    /// Tissue identifier.
    pub tissue: String,
    /// Orthogroup label table, sorted.
    pub hogs: Vec<String>,
    /// Species-a gene label table, sorted; exactly `π_a(OrthoPair)`.
    pub genes_a: Vec<String>,
    /// Species-b gene label table, sorted; exactly `π_b(OrthoPair)`.
    pub genes_b: Vec<String>,
    /// Rows in (hog, gene_a, gene_b) order.
    pub rows: Vec<PairRow>,
}

impl PairData {
    /// Index the expanded string records into compact label tables.
    pub fn from_records(
        species_a: &str,
        species_b: &str,
        tissue: &str,
        records: &[OrthoPairRecord],
    ) -> PairData {
        let mut hogs: Vec<String> = records.iter().map(|r| r.hog.clone()).collect();
        hogs.sort();
        hogs.dedup();
        let mut genes_a: Vec<String> = records.iter().map(|r| r.gene_a.clone()).collect();
        genes_a.sort();
        genes_a.dedup();
        let mut genes_b: Vec<String> = records.iter().map(|r| r.gene_b.clone()).collect();
        genes_b.sort();
        genes_b.dedup();

        let rows = records
            .iter()
            .map(|r| PairRow {
                hog: hogs.binary_search(&r.hog).expect("indexed above") as u32,
                a: genes_a.binary_search(&r.gene_a).expect("indexed above") as u32,
                b: genes_b.binary_search(&r.gene_b).expect("indexed above") as u32,
            })
            .collect();

        PairData {
            species_a: species_a.to_string(),
            species_b: species_b.to_string(),
            tissue: tissue.to_string(),
            hogs,
            genes_a,
            genes_b,
            rows,
        }
    }
}

/// The two species networks restricted to the ortholog gene universe,
/// with recalibrated thresholds.
#[derive(Debug, Clone)]
pub struct PairNetworks {
    /// Lexicographically smaller species.
    pub species_a: String,
    /// Lexicographically larger species.
    pub species_b: String,
    /// Tissue identifier.
    pub tissue: String,
    /// Sign variant.
    pub variant: SignVariant,
    /// Row/column labels of `net_a`; identical to `PairData::genes_a`.
    pub genes_a: Vec<String>,
    /// Row/column labels of `net_b`; identical to `PairData::genes_b`.
    pub genes_b: Vec<String>,
    /// Restricted network of species a.
    pub net_a: Array2<f64>,
    /// Restricted network of species b.
    pub net_b: Array2<f64>,
    /// Restricted sign plane of species a (signed mode).
    pub signs_a: Option<Array2<i8>>,
    /// Restricted sign plane of species b (signed mode).
    pub signs_b: Option<Array2<i8>>,
    /// Recalibrated threshold of species a.
    pub tau_a: f64,
    /// Recalibrated threshold of species b.
    pub tau_b: f64,
}

fn restrict_to(
    network: &SpeciesNetwork,
    genes: &[String],
) -> Result<(Array2<f64>, Option<Array2<i8>>), WorkerError> {
    let index = network.gene_index();
    let mut selected = Vec::with_capacity(genes.len());
    for gene in genes {
        let i = index.get(gene.as_str()).ok_or_else(|| {
            WorkerError::OrthologGeneMissing(format!(
                "gene {} of {} is in the ortholog-pair table but not in the network",
                gene, network.species
            ))
        })?;
        selected.push(*i);
    }
    let m = selected.len();
    let matrix = Array2::from_shape_fn((m, m), |(i, j)| {
        network.matrix[[selected[i], selected[j]]]
    });
    let signs = network.signs.as_ref().map(|signs| {
        Array2::from_shape_fn((m, m), |(i, j)| signs[[selected[i], selected[j]]])
    });
    Ok((matrix, signs))
}

/// Reuse the universe-wide threshold when it still cuts the restricted
/// network; recompute the same-density quantile otherwise.
fn recalibrate(tau: f64, restricted: &Array2<f64>, d: f64) -> f64 {
    let n = restricted.nrows();
    if n < 2 {
        return tau;
    }
    let mut max = f64::NEG_INFINITY;
    for i in 0..n {
        for j in (i + 1)..n {
            max = max.max(restricted[[i, j]]);
        }
    }
    if tau <= max {
        tau
    } else {
        density_threshold(restricted, d)
    }
}

/// Restrict the two networks to the ortholog universe of one pair.
pub fn assemble(
    net_a: &SpeciesNetwork,
    net_b: &SpeciesNetwork,
    data: &PairData,
    config: &Config,
) -> Result<PairNetworks, WorkerError> {
    let (restricted_a, signs_a) = restrict_to(net_a, &data.genes_a)?;
    let (restricted_b, signs_b) = restrict_to(net_b, &data.genes_b)?;
    let tau_a = recalibrate(net_a.tau, &restricted_a, config.density_threshold);
    let tau_b = recalibrate(net_b.tau, &restricted_b, config.density_threshold);
    if tau_a != net_a.tau {
        tracing::debug!(
            "pair ({}, {}): recalibrated tau of {} from {:.4} to {:.4}",
            data.species_a,
            data.species_b,
            data.species_a,
            net_a.tau,
            tau_a
        );
    }
    if tau_b != net_b.tau {
        tracing::debug!(
            "pair ({}, {}): recalibrated tau of {} from {:.4} to {:.4}",
            data.species_a,
            data.species_b,
            data.species_b,
            net_b.tau,
            tau_b
        );
    }
    Ok(PairNetworks {
        species_a: data.species_a.clone(),
        species_b: data.species_b.clone(),
        tissue: data.tissue.clone(),
        variant: net_a.variant,
        genes_a: data.genes_a.clone(),
        genes_b: data.genes_b.clone(),
        net_a: restricted_a,
        net_b: restricted_b,
        signs_a,
        signs_b,
        tau_a,
        tau_b,
    })
}

#[cfg(test)]
mod tests {
    use ndarray::array;
    use pretty_assertions::assert_eq;

    use crate::config::{Config, SignVariant};
    use crate::input::OrthoPairRecord;
    use crate::network::SpeciesNetwork;

    fn test_config(density: f64) -> Config {
        toml::from_str(&format!(
            r#"
            density_threshold = {}
            tissues = ["leaf"]

            [species]
            annual = ["Atha"]
            perennial = ["Esal"]
            "#,
            density
        ))
        .expect("valid config")
    }

    fn record(hog: &str, a: &str, b: &str) -> OrthoPairRecord {
        OrthoPairRecord {
            hog: hog.into(),
            gene_a: a.into(),
            gene_b: b.into(),
        }
    }

    fn network(species: &str, genes: &[&str], matrix: ndarray::Array2<f64>, tau: f64) -> SpeciesNetwork {
        SpeciesNetwork {
            species: species.into(),
            tissue: "leaf".into(),
            genes: genes.iter().map(|s| s.to_string()).collect(),
            matrix,
            signs: None,
            tau,
            variant: SignVariant::Unsigned,
        }
    }

    #[test]
    fn pair_data_indexes_records() {
        let data = super::PairData::from_records(
            "Atha",
            "Esal",
            "leaf",
            &[
                record("H1", "a1", "b1"),
                record("H1", "a2", "b1"),
                record("H2", "a3", "b2"),
            ],
        );
        assert_eq!(data.hogs, vec!["H1", "H2"]);
        assert_eq!(data.genes_a, vec!["a1", "a2", "a3"]);
        assert_eq!(data.genes_b, vec!["b1", "b2"]);
        assert_eq!(
            data.rows,
            vec![
                super::PairRow { hog: 0, a: 0, b: 0 },
                super::PairRow { hog: 0, a: 1, b: 0 },
                super::PairRow { hog: 1, a: 2, b: 1 },
            ]
        );
    }

    #[test]
    fn restriction_selects_submatrix() {
        let net_a = network(
            "Atha",
            &["a1", "a2", "a3"],
            array![[0.0, 5.0, 1.0], [5.0, 0.0, 2.0], [1.0, 2.0, 0.0]],
            4.0,
        );
        let net_b = network("Esal", &["b1", "b2"], array![[0.0, 3.0], [3.0, 0.0]], 3.0);
        let data = super::PairData::from_records(
            "Atha",
            "Esal",
            "leaf",
            &[record("H1", "a1", "b1"), record("H1", "a3", "b2")],
        );
        let config = test_config(0.5);

        let pair = super::assemble(&net_a, &net_b, &data, &config).unwrap();

        assert_eq!(pair.genes_a, vec!["a1", "a3"]);
        assert_eq!(pair.net_a, array![[0.0, 1.0], [1.0, 0.0]]);
        assert_eq!(pair.net_b, array![[0.0, 3.0], [3.0, 0.0]]);
        // max of the restricted a-network (1.0) is below tau, so the pair
        // threshold is recomputed from the restricted upper triangle
        assert_eq!(pair.tau_a, 1.0);
        // tau_b still cuts the restricted network and is reused
        assert_eq!(pair.tau_b, 3.0);
    }

    #[test]
    fn missing_gene_is_fatal() {
        let net_a = network("Atha", &["a1"], array![[0.0]], 1.0);
        let net_b = network("Esal", &["b1"], array![[0.0]], 1.0);
        let data = super::PairData::from_records(
            "Atha",
            "Esal",
            "leaf",
            &[record("H1", "a9", "b1")],
        );

        let err = super::assemble(&net_a, &net_b, &data, &test_config(0.1)).unwrap_err();
        assert_eq!(err.kind(), "OrthologGeneMissing");
    }
}
