//! Reading of the long-format expression table.
//!
//! The table arrives as one row per `(species, tissue, gene, sample)` cell.
//! The loader pivots it into one dense genes-by-samples matrix per species,
//! sizing the matrix in a first pass over the collected rows and populating
//! it in a second.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;
use std::time::Instant;

use indexmap::IndexMap;
use ndarray::Array2;
use thousands::Separable;

use crate::common::io::open_read_maybe_gz;
use crate::error::WorkerError;

/// One row of the expression table.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct ExpressionRecord {
    /// Species identifier.
    pub species: String,
    /// Tissue identifier.
    pub tissue: String,
    /// Gene identifier, globally unique across species.
    pub gene_id: String,
    /// Sample identifier.
    pub sample_id: String,
    /// Variance-stabilised expression value.
    pub expression: f64,
    /// Categorical attribute of the species (informational here).
    pub attribute: String,
    /// Orthogroup of the gene (informational here, authoritative table is
    /// the orthogroup input).
    pub ortho_group: String,
}

/// Dense genes-by-samples expression matrix for one species and tissue.
#[derive(Debug, Clone)]
pub struct ExpressionMatrix {
    /// Species identifier.
    pub species: String,
    /// Tissue identifier.
    pub tissue: String,
    /// Row labels, sorted.
    pub genes: Vec<String>,
    /// Column labels, sorted.
    pub samples: Vec<String>,
    /// Expression values, row per gene.
    pub values: Array2<f64>,
}

impl ExpressionMatrix {
    /// Number of samples.
    pub fn n_samples(&self) -> usize {
        self.samples.len()
    }

    /// Gene label to row index.
    pub fn gene_index(&self) -> IndexMap<&str, usize> {
        self.genes
            .iter()
            .enumerate()
            .map(|(i, g)| (g.as_str(), i))
            .collect()
    }
}

/// Load the expression table, filtered to `tissue` and `species_set`.
///
/// Species with no sample in the tissue are absent from the result; the
/// network builder decides whether that is fatal via its sample minimum.
pub fn load_expression(
    path: &Path,
    delimiter: u8,
    tissue: &str,
    species_set: &BTreeSet<String>,
) -> Result<BTreeMap<String, ExpressionMatrix>, WorkerError> {
    tracing::debug!("reading expression table {:?}", path);
    let reader = open_read_maybe_gz(path)
        .map_err(|e| WorkerError::InputMalformed(format!("cannot open {:?}: {}", path, e)))?;
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .from_reader(reader);

    let mut seen_species: BTreeSet<String> = BTreeSet::new();
    let mut seen_tissues: BTreeSet<String> = BTreeSet::new();
    let mut seen_cells: HashSet<(String, String, String)> = HashSet::new();
    let mut rows: Vec<ExpressionRecord> = Vec::new();

    let mut prev = Instant::now();
    for (i, result) in reader.deserialize::<ExpressionRecord>().enumerate() {
        let record = result.map_err(|e| {
            WorkerError::InputMalformed(format!("expression row {}: {}", i + 2, e))
        })?;

        // Write out progress indicator every 60 seconds.
        if prev.elapsed().as_secs() >= 60 {
            tracing::info!(
                "at expression row {} ({} kept)",
                (i + 1).separate_with_commas(),
                rows.len().separate_with_commas()
            );
            prev = Instant::now();
        }

        seen_species.insert(record.species.clone());
        seen_tissues.insert(record.tissue.clone());
        if record.tissue != tissue || !species_set.contains(&record.species) {
            continue;
        }
        if !record.expression.is_finite() {
            return Err(WorkerError::InputMalformed(format!(
                "non-finite expression for gene {} sample {} ({}/{})",
                record.gene_id, record.sample_id, record.species, record.tissue
            )));
        }
        if !seen_cells.insert((
            record.species.clone(),
            record.gene_id.clone(),
            record.sample_id.clone(),
        )) {
            return Err(WorkerError::InputMalformed(format!(
                "duplicate expression row for ({}, {}, {}, {})",
                record.species, record.tissue, record.gene_id, record.sample_id
            )));
        }
        rows.push(record);
    }

    for species in species_set {
        if !seen_species.contains(species) {
            return Err(WorkerError::ConfigMismatch(format!(
                "species {} not present in expression table",
                species
            )));
        }
    }
    if !seen_tissues.contains(tissue) {
        return Err(WorkerError::ConfigMismatch(format!(
            "tissue {} not present in expression table",
            tissue
        )));
    }

    tracing::debug!(
        "kept {} expression rows for tissue {}",
        rows.len().separate_with_commas(),
        tissue
    );

    // First pass: size the per-species matrices.
    let mut genes: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    let mut samples: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for row in &rows {
        genes.entry(&row.species).or_default().insert(&row.gene_id);
        samples
            .entry(&row.species)
            .or_default()
            .insert(&row.sample_id);
    }

    let mut result: BTreeMap<String, ExpressionMatrix> = BTreeMap::new();
    for (species, species_genes) in &genes {
        let species_samples = &samples[species];
        let gene_labels: Vec<String> = species_genes.iter().map(|s| s.to_string()).collect();
        let sample_labels: Vec<String> = species_samples.iter().map(|s| s.to_string()).collect();
        result.insert(
            species.to_string(),
            ExpressionMatrix {
                species: species.to_string(),
                tissue: tissue.to_string(),
                genes: gene_labels,
                samples: sample_labels,
                values: Array2::zeros((species_genes.len(), species_samples.len())),
            },
        );
    }

    // Second pass: populate, then verify that every cell was filled.
    let mut filled: BTreeMap<&str, usize> = BTreeMap::new();
    for row in &rows {
        let matrix = result.get_mut(&row.species).expect("sized above");
        let gene = matrix
            .genes
            .binary_search_by(|g| g.as_str().cmp(&row.gene_id))
            .expect("sized above");
        let sample = matrix
            .samples
            .binary_search_by(|s| s.as_str().cmp(&row.sample_id))
            .expect("sized above");
        matrix.values[[gene, sample]] = row.expression;
        *filled.entry(&row.species).or_default() += 1;
    }
    for (species, matrix) in &result {
        let expected = matrix.genes.len() * matrix.samples.len();
        if filled.get(species.as_str()).copied().unwrap_or(0) != expected {
            return Err(WorkerError::InputMalformed(format!(
                "expression table for {}/{} is not a complete genes-by-samples block",
                species, tissue
            )));
        }
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::io::Write as _;
    use std::path::PathBuf;

    use pretty_assertions::assert_eq;

    fn write_table(dir: &std::path::Path, rows: &[&str]) -> PathBuf {
        let path = dir.join("expression.tsv");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(
            f,
            "species\ttissue\tgene_id\tsample_id\texpression\tattribute\tortho_group"
        )
        .unwrap();
        for row in rows {
            writeln!(f, "{}", row).unwrap();
        }
        path
    }

    fn species(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn pivots_to_dense_matrix() {
        let tmp = temp_testdir::TempDir::default();
        let path = write_table(
            &tmp,
            &[
                "Atha\tleaf\tg2\ts1\t2.0\tannual\tH1",
                "Atha\tleaf\tg1\ts1\t1.0\tannual\tH1",
                "Atha\tleaf\tg1\ts2\t3.0\tannual\tH1",
                "Atha\tleaf\tg2\ts2\t4.0\tannual\tH1",
                "Atha\troot\tg1\ts9\t9.0\tannual\tH1",
                "Esal\tleaf\tg3\ts1\t5.0\tannual\tH1",
            ],
        );

        let matrices =
            super::load_expression(&path, b'\t', "leaf", &species(&["Atha", "Esal"])).unwrap();

        assert_eq!(matrices.len(), 2);
        let atha = &matrices["Atha"];
        assert_eq!(atha.genes, vec!["g1", "g2"]);
        assert_eq!(atha.samples, vec!["s1", "s2"]);
        assert_eq!(atha.values[[0, 0]], 1.0);
        assert_eq!(atha.values[[0, 1]], 3.0);
        assert_eq!(atha.values[[1, 0]], 2.0);
        assert_eq!(atha.values[[1, 1]], 4.0);
        assert_eq!(matrices["Esal"].n_samples(), 1);
    }

    #[test]
    fn rejects_duplicate_cell() {
        let tmp = temp_testdir::TempDir::default();
        let path = write_table(
            &tmp,
            &[
                "Atha\tleaf\tg1\ts1\t1.0\tannual\tH1",
                "Atha\tleaf\tg1\ts1\t2.0\tannual\tH1",
            ],
        );

        let err = super::load_expression(&path, b'\t', "leaf", &species(&["Atha"])).unwrap_err();
        assert_eq!(err.kind(), "InputMalformed");
    }

    #[test]
    fn rejects_non_finite_value() {
        let tmp = temp_testdir::TempDir::default();
        let path = write_table(&tmp, &["Atha\tleaf\tg1\ts1\tNaN\tannual\tH1"]);

        let err = super::load_expression(&path, b'\t', "leaf", &species(&["Atha"])).unwrap_err();
        assert_eq!(err.kind(), "InputMalformed");
    }

    #[test]
    fn rejects_missing_species() {
        let tmp = temp_testdir::TempDir::default();
        let path = write_table(&tmp, &["Atha\tleaf\tg1\ts1\t1.0\tannual\tH1"]);

        let err =
            super::load_expression(&path, b'\t', "leaf", &species(&["Atha", "Zmay"])).unwrap_err();
        assert_eq!(err.kind(), "ConfigMismatch");
    }

    #[test]
    fn rejects_missing_tissue() {
        let tmp = temp_testdir::TempDir::default();
        let path = write_table(&tmp, &["Atha\tleaf\tg1\ts1\t1.0\tannual\tH1"]);

        let err = super::load_expression(&path, b'\t', "flower", &species(&["Atha"])).unwrap_err();
        assert_eq!(err.kind(), "ConfigMismatch");
    }

    #[test]
    fn rejects_incomplete_block() {
        let tmp = temp_testdir::TempDir::default();
        let path = write_table(
            &tmp,
            &[
                "Atha\tleaf\tg1\ts1\t1.0\tannual\tH1",
                "Atha\tleaf\tg1\ts2\t2.0\tannual\tH1",
                "Atha\tleaf\tg2\ts1\t3.0\tannual\tH1",
            ],
        );

        let err = super::load_expression(&path, b'\t', "leaf", &species(&["Atha"])).unwrap_err();
        assert_eq!(err.kind(), "InputMalformed");
    }
}
