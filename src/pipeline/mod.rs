//! End-to-end per-tissue orchestration (`pipeline run`).
//!
//! Two levels of parallelism, both without shared mutable state: species
//! pairs are dispatched to a bounded worker pool, and each pair's row loop
//! runs on parallel iterators over immutable matrices.  Species networks
//! are memoised on disk and never rebuilt concurrently for the same key.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use rayon::prelude::*;
use thousands::Separable;

use crate::clique;
use crate::config::{Config, SignVariant};
use crate::error::WorkerError;
use crate::input::TissueInputs;
use crate::pair;
use crate::summary::{FailedPair, PairSummary, TissueManifest};

/// Outcome of one (tissue, variant) round.
#[derive(Debug, Clone)]
pub struct TissueOutcome {
    /// Tissue identifier.
    pub tissue: String,
    /// Sign variant.
    pub variant: SignVariant,
    /// Successful pairs (including cache hits).
    pub n_pairs_ok: usize,
    /// Terminally failed pairs.
    pub n_pairs_failed: usize,
    /// Cliques written.
    pub n_cliques: usize,
}

/// Run one pair task, retrying `ResourceExhausted` with a doubled memory
/// budget up to the configured attempt limit.
fn run_pair_with_retry(
    workdir: &Path,
    inputs: &TissueInputs,
    tissue: &str,
    species_a: &str,
    species_b: &str,
    variant: SignVariant,
    config: &Config,
) -> Result<pair::PairOutcome, FailedPair> {
    let mut budget = config.memory_budget_mb;
    let mut attempt = 0;
    loop {
        attempt += 1;
        let deadline = Instant::now() + Duration::from_secs(config.pair_timeout_secs);
        match pair::process_pair(
            workdir,
            inputs,
            tissue,
            species_a,
            species_b,
            variant,
            config,
            budget,
            Some(deadline),
        ) {
            Ok(outcome) => return Ok(outcome),
            Err(e) if e.is_retryable() && attempt < config.max_attempts => {
                tracing::warn!(
                    "pair ({}, {}) attempt {} failed ({}); retrying with {} MiB",
                    species_a,
                    species_b,
                    attempt,
                    e,
                    budget * 2
                );
                budget *= 2;
            }
            Err(e) => {
                tracing::error!(
                    "pair ({}, {}) failed terminally after {} attempt(s): {}",
                    species_a,
                    species_b,
                    attempt,
                    e
                );
                return Err(FailedPair {
                    species_a: species_a.to_string(),
                    species_b: species_b.to_string(),
                    kind: e.kind().to_string(),
                    message: e.to_string(),
                    attempts: attempt,
                });
            }
        }
    }
}

/// Process one tissue under one sign variant: networks, pairs, cliques.
#[allow(clippy::too_many_arguments)]
pub fn process_tissue(
    config: &Config,
    path_expression: &Path,
    path_orthogroups: &Path,
    workdir: &Path,
    outdir: &Path,
    tissue: &str,
    variant: SignVariant,
    test_mode: bool,
) -> Result<TissueOutcome, WorkerError> {
    tracing::info!("processing tissue {} ({})", tissue, variant);
    let inputs = crate::input::load_tissue_inputs(config, path_expression, path_orthogroups, tissue)?;

    // Stage 1: species networks, memoised on disk.
    let mut network_failures: BTreeMap<String, (String, String)> = BTreeMap::new();
    for species in config.species_list() {
        if let Err(e) = crate::network::ensure_network(
            workdir, &inputs, &species, tissue, variant, config, test_mode,
        ) {
            tracing::error!("network build failed for {}/{}: {}", species, tissue, e);
            network_failures.insert(species, (e.kind().to_string(), e.to_string()));
        }
    }
    crate::common::trace_rss_now();

    // Stage 2: independent pair tasks on a bounded worker pool.
    let pairs = config.species_pairs();
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.max_workers.min(pairs.len().max(1)))
        .build()
        .map_err(|e| {
            WorkerError::ResourceExhausted(format!("cannot build worker pool: {}", e))
        })?;
    let results: Vec<Result<pair::PairOutcome, FailedPair>> = pool.install(|| {
        pairs
            .par_iter()
            .map(|(species_a, species_b)| {
                if let Some((kind, message)) = network_failures
                    .get(species_a)
                    .or_else(|| network_failures.get(species_b))
                {
                    return Err(FailedPair {
                        species_a: species_a.clone(),
                        species_b: species_b.clone(),
                        kind: kind.clone(),
                        message: message.clone(),
                        attempts: 0,
                    });
                }
                run_pair_with_retry(
                    workdir, &inputs, tissue, species_a, species_b, variant, config,
                )
            })
            .collect()
    });

    let mut summaries: Vec<PairSummary> = Vec::new();
    let mut failures: Vec<FailedPair> = Vec::new();
    for result in results {
        match result {
            Ok(outcome) => summaries.push(outcome.summary),
            Err(failure) => failures.push(failure),
        }
    }

    // Stage 3: cliques and summaries over all persisted comparisons.
    let comparisons = clique::gather_comparisons(workdir, tissue, variant, config)?;
    let mut edges = Vec::new();
    for (header, rows) in &comparisons {
        edges.extend(clique::conserved_edges(header, rows, config.p_threshold));
    }
    tracing::info!(
        "tissue {} ({}): {} conserved edges across {} comparisons",
        tissue,
        variant,
        edges.len().separate_with_commas(),
        comparisons.len()
    );
    let outcome = clique::enumerate_cliques(edges, variant, config)?;
    let variant_outdir = outdir.join(tissue).join(variant.to_string());
    clique::write_outputs(&variant_outdir, tissue, variant, &outcome.cliques, config)?;
    let manifest = TissueManifest::new(
        tissue,
        variant,
        &outcome.cliques,
        outcome.skipped_hogs,
        summaries.clone(),
        failures.clone(),
    );
    crate::summary::write_manifest(&variant_outdir.join("manifest.json"), &manifest)?;
    crate::summary::write_pair_summaries(&variant_outdir.join("pair_summary.tsv"), &manifest.pairs)?;

    Ok(TissueOutcome {
        tissue: tissue.to_string(),
        variant,
        n_pairs_ok: summaries.len(),
        n_pairs_failed: failures.len(),
        n_cliques: outcome.cliques.len(),
    })
}

/// Command line arguments for `pipeline run` subcommand.
#[derive(Debug, clap::Parser)]
#[command(about = "run the full engine for the configured tissues", long_about = None)]
pub struct Args {
    /// Path to the engine configuration (TOML).
    #[clap(long)]
    pub path_config: String,
    /// Path to the expression table.
    #[clap(long)]
    pub path_expression: String,
    /// Path to the orthogroup table.
    #[clap(long)]
    pub path_orthogroups: String,
    /// Working directory for cached artifacts.
    #[clap(long)]
    pub workdir: String,
    /// Output directory for cliques and manifests.
    #[clap(long)]
    pub outdir: String,
    /// Tissues to process; defaults to the configured list.
    #[clap(long)]
    pub tissues: Vec<String>,
    /// Cap the gene universe for smoke runs.
    #[clap(long, default_value_t = false)]
    pub test_mode: bool,
}

/// Main entry point for the `pipeline run` subcommand.
pub fn run(args_common: &crate::common::Args, args: &Args) -> Result<(), anyhow::Error> {
    tracing::info!("Starting `pipeline run`");
    tracing::info!("  args_common = {:?}", args_common);
    tracing::info!("  args = {:?}", args);

    let config = Config::load(shellexpand::tilde(&args.path_config).as_ref())?;
    let tissues = if args.tissues.is_empty() {
        config.tissues.clone()
    } else {
        for tissue in &args.tissues {
            if !config.tissues.contains(tissue) {
                return Err(WorkerError::ConfigMismatch(format!(
                    "tissue {} is not configured",
                    tissue
                ))
                .into());
            }
        }
        args.tissues.clone()
    };
    let path_expression = PathBuf::from(shellexpand::tilde(&args.path_expression).into_owned());
    let path_orthogroups = PathBuf::from(shellexpand::tilde(&args.path_orthogroups).into_owned());
    let workdir = PathBuf::from(shellexpand::tilde(&args.workdir).into_owned());
    let outdir = PathBuf::from(shellexpand::tilde(&args.outdir).into_owned());

    let mut outcomes: Vec<TissueOutcome> = Vec::new();
    let mut failed_tissues: BTreeSet<String> = BTreeSet::new();
    for tissue in &tissues {
        for variant in config.sign_variants() {
            match process_tissue(
                &config,
                &path_expression,
                &path_orthogroups,
                &workdir,
                &outdir,
                tissue,
                variant,
                args.test_mode,
            ) {
                Ok(outcome) => {
                    if outcome.n_pairs_ok == 0 {
                        failed_tissues.insert(tissue.clone());
                    }
                    outcomes.push(outcome);
                }
                Err(e) => {
                    tracing::error!("tissue {} ({}) failed: {}", tissue, variant, e);
                    failed_tissues.insert(tissue.clone());
                }
            }
        }
    }

    // Per-run summary.
    for outcome in &outcomes {
        tracing::info!(
            "tissue {} ({}): {} pairs ok, {} failed, {} cliques",
            outcome.tissue,
            outcome.variant,
            outcome.n_pairs_ok,
            outcome.n_pairs_failed,
            outcome.n_cliques
        );
    }
    crate::common::trace_rss_now();

    if !failed_tissues.is_empty() {
        anyhow::bail!(
            "no successful pair for tissue(s): {}",
            failed_tissues.into_iter().collect::<Vec<_>>().join(", ")
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use pretty_assertions::assert_eq;

    use crate::config::{Config, SignVariant};

    fn fixture_config() -> Config {
        Config::load("tests/data/config.toml").expect("fixture config loads")
    }

    fn run_fixture(workdir: &Path, outdir: &Path) -> super::TissueOutcome {
        super::process_tissue(
            &fixture_config(),
            Path::new("tests/data/expression.tsv"),
            Path::new("tests/data/orthogroups.tsv"),
            workdir,
            outdir,
            "leaf",
            SignVariant::Unsigned,
            false,
        )
        .expect("fixture tissue processes")
    }

    /// Two species with three perfectly separated co-expression modules;
    /// the four-member HOG around module one must come out as a single
    /// size-4 clique spanning both species.
    #[test]
    fn fixture_produces_the_expected_clique() {
        let tmp = temp_testdir::TempDir::default();
        let workdir = tmp.join("work");
        let outdir = tmp.join("out");

        let outcome = run_fixture(&workdir, &outdir);

        assert_eq!(outcome.n_pairs_ok, 1);
        assert_eq!(outcome.n_pairs_failed, 0);
        assert_eq!(outcome.n_cliques, 1);

        let table =
            std::fs::read_to_string(outdir.join("leaf").join("unsigned").join("cliques.tsv"))
                .expect("clique table exists");
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 2);
        let fields: Vec<&str> = lines[1].split('\t').collect();
        assert_eq!(fields[0], "H01");
        assert_eq!(fields[2], "4");
        assert_eq!(fields[3], "Atha_g01;Atha_g02;Esal_g01;Esal_g02");
        assert_eq!(fields[4], "Atha;Esal");
        assert_eq!(fields[5], "Mixed");
        assert_eq!(fields[9], "6");

        // binary companion round-trips
        let (_, cliques) = crate::artifact::read_cliques(
            &outdir.join("leaf").join("unsigned").join("cliques.bin"),
        )
        .expect("binary cliques load");
        assert_eq!(cliques.len(), 1);
        assert_eq!(cliques[0].clique_size, 4);
        assert_eq!(cliques[0].n_species, 2);

        // manifest reflects the counts
        let manifest: crate::summary::TissueManifest = serde_json::from_slice(
            &std::fs::read(outdir.join("leaf").join("unsigned").join("manifest.json")).unwrap(),
        )
        .expect("manifest parses");
        assert_eq!(manifest.n_cliques, 1);
        assert_eq!(manifest.cliques_by_class["Mixed"], 1);
        assert_eq!(manifest.pairs.len(), 1);
        assert_eq!(manifest.pairs[0].n_conserved_edges, 14);
        assert_eq!(manifest.pairs[0].n_conserved_hogs, 11);
        assert!(manifest.failed_pairs.is_empty());
    }

    /// The hand-computed statistics of the fixture: module rows test at
    /// p = 1/220, the four-member HOG rows at 9/495, all conserved after
    /// BH at alpha = 0.05.
    #[test]
    fn fixture_comparison_matches_hand_computation() {
        let tmp = temp_testdir::TempDir::default();
        let workdir = tmp.join("work");
        let outdir = tmp.join("out");
        run_fixture(&workdir, &outdir);

        let config = fixture_config();
        let comparisons =
            crate::clique::gather_comparisons(&workdir, "leaf", SignVariant::Unsigned, &config)
                .unwrap();
        assert_eq!(comparisons.len(), 1);
        let (header, rows) = &comparisons[0];
        assert_eq!((header.species_a.as_str(), header.species_b.as_str()), ("Atha", "Esal"));
        assert_eq!(rows.len(), 14);

        for row in rows {
            // every neighbourhood is one three-gene module
            assert_eq!((row.n1, row.x1), (12, 3));
            assert_eq!((row.n2, row.x2), (12, 3));
            let hog = header.hogs[row.hog as usize].as_str();
            if hog == "H01" {
                // k = 4: the paralog pair projects both module partners
                assert_eq!((row.k1, row.k2), (4, 4));
                assert!((row.q1 - 0.018181818181818184).abs() < 1e-12);
                assert!((row.e1 - 3.0).abs() < 1e-12);
            } else {
                assert_eq!((row.k1, row.k2), (3, 3));
                // q = (1/220) * 14 / 10 under BH
                assert!((row.q1 - 14.0 / 2200.0).abs() < 1e-12);
                assert!((row.e1 - 4.0).abs() < 1e-12);
            }
            assert_eq!(row.q1, row.q2);
        }
    }

    /// Deleting one per-pair artifact re-computes only that pair; all
    /// other artifacts are served from cache and the recomputed table is
    /// identical.
    #[test]
    fn resumption_recomputes_only_the_missing_pair() {
        let tmp = temp_testdir::TempDir::default();
        let workdir = tmp.join("work");
        let outdir = tmp.join("out");
        run_fixture(&workdir, &outdir);

        let config = fixture_config();
        let paths = crate::pair::pair_paths(
            &workdir,
            "leaf",
            "Atha",
            "Esal",
            SignVariant::Unsigned,
            &config,
        );
        let (_, original_rows) = crate::artifact::read_comparison(&paths.comparison).unwrap();
        let network_path = crate::network::network_path(
            &workdir,
            "Atha",
            "leaf",
            SignVariant::Unsigned,
            &config,
        );
        let network_bytes = std::fs::read(&network_path).unwrap();

        std::fs::remove_file(&paths.comparison).unwrap();
        let outcome = run_fixture(&workdir, &outdir);
        assert_eq!(outcome.n_pairs_ok, 1);

        // the species network was reused byte for byte
        assert_eq!(std::fs::read(&network_path).unwrap(), network_bytes);
        // the recomputed comparison is identical
        let (_, recomputed) = crate::artifact::read_comparison(&paths.comparison).unwrap();
        assert_eq!(recomputed, original_rows);
    }

    /// Raising the density threshold may only add conserved edges.
    #[test]
    fn density_increase_does_not_lose_conserved_edges() {
        let tmp = temp_testdir::TempDir::default();
        let sparse_dir = tmp.join("sparse");
        let dense_dir = tmp.join("dense");

        let mut sparse = fixture_config();
        sparse.density_threshold = 0.27;
        let mut dense = fixture_config();
        dense.density_threshold = 0.5;

        let count = |config: &Config, dir: &Path| -> usize {
            super::process_tissue(
                config,
                Path::new("tests/data/expression.tsv"),
                Path::new("tests/data/orthogroups.tsv"),
                &dir.join("work"),
                &dir.join("out"),
                "leaf",
                SignVariant::Unsigned,
                false,
            )
            .unwrap();
            let comparisons = crate::clique::gather_comparisons(
                &dir.join("work"),
                "leaf",
                SignVariant::Unsigned,
                config,
            )
            .unwrap();
            comparisons
                .iter()
                .map(|(header, rows)| {
                    crate::clique::conserved_edges(header, rows, config.p_threshold).len()
                })
                .sum()
        };

        let sparse_edges = count(&sparse, &sparse_dir);
        let dense_edges = count(&dense, &dense_dir);
        assert!(sparse_edges > 0);
        assert!(dense_edges >= sparse_edges);
    }

    /// A memory budget of zero exhausts every attempt and the tissue ends
    /// with a recorded failure instead of an abort.
    #[test]
    fn exhausted_budget_is_recorded_not_fatal() {
        let tmp = temp_testdir::TempDir::default();
        let mut config = fixture_config();
        config.memory_budget_mb = 0;
        config.max_attempts = 1;

        let outcome = super::process_tissue(
            &config,
            Path::new("tests/data/expression.tsv"),
            Path::new("tests/data/orthogroups.tsv"),
            &tmp.join("work"),
            &tmp.join("out"),
            "leaf",
            SignVariant::Unsigned,
            false,
        )
        .unwrap();

        assert_eq!(outcome.n_pairs_ok, 0);
        assert_eq!(outcome.n_pairs_failed, 1);
        let manifest: crate::summary::TissueManifest = serde_json::from_slice(
            &std::fs::read(
                tmp.join("out")
                    .join("leaf")
                    .join("unsigned")
                    .join("manifest.json"),
            )
            .unwrap(),
        )
        .unwrap();
        assert_eq!(manifest.failed_pairs.len(), 1);
        assert_eq!(manifest.failed_pairs[0].kind, "ResourceExhausted");
        assert_eq!(manifest.failed_pairs[0].attempts, 1);
    }
}
