//! Per-pair diagnostic summaries and the per-tissue manifest.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::artifact::ComparisonHeader;
use crate::clique::AnnotatedClique;
use crate::config::SignVariant;
use crate::error::WorkerError;
use crate::pair::test::ComparisonRow;

/// Diagnostic counts of one species-pair comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairSummary {
    /// Lexicographically smaller species.
    pub species_a: String,
    /// Lexicographically larger species.
    pub species_b: String,
    /// Comparison rows after the zero-overlap drop.
    pub n_rows: usize,
    /// Rows with `max(q1, q2)` below the conserved-edge threshold.
    pub n_conserved_edges: usize,
    /// Distinct species-a genes on conserved rows.
    pub n_conserved_genes_a: usize,
    /// Distinct species-b genes on conserved rows.
    pub n_conserved_genes_b: usize,
    /// Distinct orthogroups with at least one conserved row.
    pub n_conserved_hogs: usize,
}

/// Derive the diagnostic counts from a comparison table.
pub fn summarize_pair(
    header: &ComparisonHeader,
    rows: &[ComparisonRow],
    alpha: f64,
) -> PairSummary {
    let mut genes_a: BTreeSet<u32> = BTreeSet::new();
    let mut genes_b: BTreeSet<u32> = BTreeSet::new();
    let mut hogs: BTreeSet<u32> = BTreeSet::new();
    let mut conserved = 0usize;
    for row in rows {
        if row.q1.max(row.q2) < alpha {
            conserved += 1;
            genes_a.insert(row.a);
            genes_b.insert(row.b);
            hogs.insert(row.hog);
        }
    }
    PairSummary {
        species_a: header.species_a.clone(),
        species_b: header.species_b.clone(),
        n_rows: rows.len(),
        n_conserved_edges: conserved,
        n_conserved_genes_a: genes_a.len(),
        n_conserved_genes_b: genes_b.len(),
        n_conserved_hogs: hogs.len(),
    }
}

/// A pair that failed terminally, with its error kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedPair {
    /// Lexicographically smaller species.
    pub species_a: String,
    /// Lexicographically larger species.
    pub species_b: String,
    /// Machine-readable error kind.
    pub kind: String,
    /// Human-readable cause.
    pub message: String,
    /// Attempts made, including retries.
    pub attempts: usize,
}

/// Per-tissue run manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TissueManifest {
    /// Tissue identifier.
    pub tissue: String,
    /// Sign variant.
    pub sign: SignVariant,
    /// Worker version that wrote the manifest.
    pub worker_version: String,
    /// Total cliques.
    pub n_cliques: usize,
    /// Clique counts by attribute class.
    pub cliques_by_class: BTreeMap<String, usize>,
    /// Clique counts by size (key is the size).
    pub cliques_by_size: BTreeMap<String, usize>,
    /// HOGs skipped by the `max_clique_edges` guard.
    pub skipped_hogs: Vec<String>,
    /// Successful pair summaries.
    pub pairs: Vec<PairSummary>,
    /// Terminally failed pairs.
    pub failed_pairs: Vec<FailedPair>,
}

impl TissueManifest {
    /// Assemble a manifest from the clique table and the pair ledger.
    pub fn new(
        tissue: &str,
        sign: SignVariant,
        cliques: &[AnnotatedClique],
        skipped_hogs: Vec<String>,
        pairs: Vec<PairSummary>,
        failed_pairs: Vec<FailedPair>,
    ) -> TissueManifest {
        let mut by_class: BTreeMap<String, usize> = BTreeMap::new();
        let mut by_size: BTreeMap<String, usize> = BTreeMap::new();
        for clique in cliques {
            *by_class.entry(clique.attribute_class.clone()).or_default() += 1;
            *by_size.entry(clique.clique_size.to_string()).or_default() += 1;
        }
        TissueManifest {
            tissue: tissue.to_string(),
            sign,
            worker_version: crate::common::worker_version().to_string(),
            n_cliques: cliques.len(),
            cliques_by_class: by_class,
            cliques_by_size: by_size,
            skipped_hogs,
            pairs,
            failed_pairs,
        }
    }
}

/// Write the per-pair summary table as TSV.
pub fn write_pair_summaries(path: &Path, summaries: &[PairSummary]) -> Result<(), WorkerError> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .from_path(path)
        .map_err(|e| WorkerError::ArtifactCorrupt(format!("cannot write {:?}: {}", path, e)))?;
    for summary in summaries {
        writer
            .serialize(summary)
            .map_err(|e| WorkerError::ArtifactCorrupt(format!("cannot write {:?}: {}", path, e)))?;
    }
    writer
        .flush()
        .map_err(|e| WorkerError::ArtifactCorrupt(format!("cannot flush {:?}: {}", path, e)))?;
    Ok(())
}

/// Write the manifest as pretty JSON, atomically.
pub fn write_manifest(path: &Path, manifest: &TissueManifest) -> Result<(), WorkerError> {
    let json = serde_json::to_vec_pretty(manifest)
        .map_err(|e| WorkerError::ArtifactCorrupt(format!("cannot encode manifest: {}", e)))?;
    crate::common::io::atomic_write(path, &json)
        .map_err(|e| WorkerError::ArtifactCorrupt(format!("cannot write {:?}: {}", path, e)))
}
