//! Species-pair processing (`pair compare`): subnetwork assembly,
//! conservation testing and per-pair persistence.

pub mod assemble;

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::artifact;
use crate::common::canonical_pair;
use crate::config::{Config, SignVariant};
use crate::error::WorkerError;
use crate::input::TissueInputs;
use crate::summary::PairSummary;

/// Locations of the three per-pair artifacts.
#[derive(Debug, Clone)]
pub struct PairPaths {
    /// Expanded ortholog-pair table (`PRDATA1`).
    pub data: PathBuf,
    /// Restricted pair networks (`PRNET01`).
    pub networks: PathBuf,
    /// Comparison table (`PRCMP01`).
    pub comparison: PathBuf,
}

/// Content-addressed artifact paths for one pair.
pub fn pair_paths(
    workdir: &Path,
    tissue: &str,
    species_a: &str,
    species_b: &str,
    variant: SignVariant,
    config: &Config,
) -> PairPaths {
    let dir = workdir.join("pairs").join(tissue);
    let hash = format!("{:016x}", config.pair_hash());
    PairPaths {
        data: dir.join(format!("{}--{}.{}.prdata", species_a, species_b, hash)),
        networks: dir.join(format!(
            "{}--{}.{}.{}.prnet",
            species_a, species_b, variant, hash
        )),
        comparison: dir.join(format!(
            "{}--{}.{}.{}.prcmp",
            species_a, species_b, variant, hash
        )),
    }
}

/// Result of one pair task.
#[derive(Debug, Clone)]
pub struct PairOutcome {
    /// Lexicographically smaller species.
    pub species_a: String,
    /// Lexicographically larger species.
    pub species_b: String,
    /// Location of the comparison artifact.
    pub comparison: PathBuf,
    /// Diagnostic counts.
    pub summary: PairSummary,
    /// Whether the comparison was served from cache.
    pub resumed: bool,
}

/// Rough resident-set estimate of one pair task, in MiB.
fn estimate_memory_mb(n_full_a: usize, n_full_b: usize, n_pair_a: usize, n_pair_b: usize) -> u64 {
    let full = 8 * (n_full_a * n_full_a + n_full_b * n_full_b);
    let restricted = 8 * (n_pair_a * n_pair_a + n_pair_b * n_pair_b);
    ((full + restricted) as u64).div_ceil(1 << 20)
}

/// Run the Assembler -> Tester -> persistence chain for one pair.
///
/// When a valid comparison artifact already exists the pair is served
/// from cache; only the missing artifact is recomputed on resumption.
#[allow(clippy::too_many_arguments)]
pub fn process_pair(
    workdir: &Path,
    inputs: &TissueInputs,
    tissue: &str,
    species_a: &str,
    species_b: &str,
    variant: SignVariant,
    config: &Config,
    memory_budget_mb: u64,
    deadline: Option<Instant>,
) -> Result<PairOutcome, WorkerError> {
    let (species_a, species_b) = canonical_pair(species_a, species_b);
    let paths = pair_paths(workdir, tissue, species_a, species_b, variant, config);

    if paths.comparison.exists() {
        let (header, rows) = artifact::read_comparison(&paths.comparison)?;
        let summary = crate::summary::summarize_pair(&header, &rows, config.p_threshold);
        tracing::info!(
            "pair ({}, {}) served from cache: {:?}",
            species_a,
            species_b,
            paths.comparison
        );
        return Ok(PairOutcome {
            species_a: species_a.to_string(),
            species_b: species_b.to_string(),
            comparison: paths.comparison,
            summary,
            resumed: true,
        });
    }

    // Species networks are shared, immutable artifacts; each worker reads
    // its own copy from disk.
    let (_, net_a) = artifact::read_species_network(&crate::network::network_path(
        workdir, species_a, tissue, variant, config,
    ))?;
    let (_, net_b) = artifact::read_species_network(&crate::network::network_path(
        workdir, species_b, tissue, variant, config,
    ))?;

    // Expand the ortholog pairs and drop genes absent from the networks
    // (genes without expression are silently excluded from comparisons).
    let data = if paths.data.exists() {
        let (_, cached) = artifact::read_pair_data(&paths.data)?;
        tracing::debug!("pair data served from cache: {:?}", paths.data);
        cached
    } else {
        let genes_a: std::collections::HashSet<&str> =
            net_a.genes.iter().map(|g| g.as_str()).collect();
        let genes_b: std::collections::HashSet<&str> =
            net_b.genes.iter().map(|g| g.as_str()).collect();
        let records: Vec<crate::input::OrthoPairRecord> = inputs
            .orthologs
            .ortho_pairs(
                species_a,
                species_b,
                config.min_genes_per_hog,
                config.max_genes_per_hog,
            )
            .into_iter()
            .filter(|r| {
                genes_a.contains(r.gene_a.as_str()) && genes_b.contains(r.gene_b.as_str())
            })
            .collect();
        let data = assemble::PairData::from_records(species_a, species_b, tissue, &records);
        artifact::write_pair_data(&paths.data, &data, config)?;
        data
    };

    let estimate = estimate_memory_mb(
        net_a.n_genes(),
        net_b.n_genes(),
        data.genes_a.len(),
        data.genes_b.len(),
    );
    if estimate > memory_budget_mb {
        return Err(WorkerError::ResourceExhausted(format!(
            "pair ({}, {}) needs an estimated {} MiB, budget is {} MiB",
            species_a, species_b, estimate, memory_budget_mb
        )));
    }

    let pair_networks = if paths.networks.exists() {
        let (_, cached) = artifact::read_pair_networks(&paths.networks)?;
        tracing::debug!("pair networks served from cache: {:?}", paths.networks);
        cached
    } else {
        let built = assemble::assemble(&net_a, &net_b, &data, config)?;
        artifact::write_pair_networks(&paths.networks, &built, config)?;
        built
    };
    drop(net_a);
    drop(net_b);

    let rows = test::run_tests(&pair_networks, &data, deadline)?;
    let mut rows = test::drop_zero_overlap(rows);
    test::apply_fdr(&mut rows, config.fdr_method);

    let header = artifact::ComparisonHeader {
        species_a: species_a.to_string(),
        species_b: species_b.to_string(),
        tissue: tissue.to_string(),
        sign: variant,
        tau_a: pair_networks.tau_a,
        tau_b: pair_networks.tau_b,
        fdr_method: config.fdr_method,
        config_hash: format!("{:016x}", config.pair_hash()),
        created: chrono::Utc::now().to_rfc3339(),
        worker_version: crate::common::worker_version().to_string(),
        hogs: data.hogs.clone(),
        genes_a: data.genes_a.clone(),
        genes_b: data.genes_b.clone(),
        n_rows: rows.len(),
    };
    artifact::write_comparison(&paths.comparison, &header, &rows)?;
    let summary = crate::summary::summarize_pair(&header, &rows, config.p_threshold);
    tracing::info!(
        "pair ({}, {}): {} comparison rows, {} conserved edges",
        species_a,
        species_b,
        summary.n_rows,
        summary.n_conserved_edges
    );

    Ok(PairOutcome {
        species_a: species_a.to_string(),
        species_b: species_b.to_string(),
        comparison: paths.comparison,
        summary,
        resumed: false,
    })
}

/// Command line arguments for `pair compare` subcommand.
#[derive(Debug, clap::Parser)]
#[command(about = "compare the co-expression networks of one species pair", long_about = None)]
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
    /// Tissue to process.
    #[clap(long)]
    pub tissue: String,
    /// First species of the pair.
    #[clap(long)]
    pub species_a: String,
    /// Second species of the pair.
    #[clap(long)]
    pub species_b: String,
    /// Working directory for cached artifacts.
    #[clap(long)]
    pub workdir: String,
    /// Cap the gene universe for smoke runs.
    #[clap(long, default_value_t = false)]
    pub test_mode: bool,
}

/// Main entry point for the `pair compare` subcommand.
pub fn run(args_common: &crate::common::Args, args: &Args) -> Result<(), anyhow::Error> {
    tracing::info!("Starting `pair compare`");
    tracing::info!("  args_common = {:?}", args_common);
    tracing::info!("  args = {:?}", args);

    let config = Config::load(shellexpand::tilde(&args.path_config).as_ref())?;
    if !config.tissues.contains(&args.tissue) {
        return Err(WorkerError::ConfigMismatch(format!(
            "tissue {} is not configured",
            args.tissue
        ))
        .into());
    }
    for sp in [&args.species_a, &args.species_b] {
        if config.attribute_of(sp).is_none() {
            return Err(
                WorkerError::ConfigMismatch(format!("species {} is not configured", sp)).into(),
            );
        }
    }

    let inputs = crate::input::load_tissue_inputs(
        &config,
        Path::new(shellexpand::tilde(&args.path_expression).as_ref()),
        Path::new(shellexpand::tilde(&args.path_orthogroups).as_ref()),
        &args.tissue,
    )?;
    let workdir = PathBuf::from(shellexpand::tilde(&args.workdir).into_owned());
    let (species_a, species_b) = canonical_pair(&args.species_a, &args.species_b);

    for variant in config.sign_variants() {
        for species in [species_a, species_b] {
            crate::network::ensure_network(
                &workdir,
                &inputs,
                species,
                &args.tissue,
                variant,
                &config,
                args.test_mode,
            )?;
        }
        let deadline = Instant::now() + Duration::from_secs(config.pair_timeout_secs);
        let outcome = process_pair(
            &workdir,
            &inputs,
            &args.tissue,
            species_a,
            species_b,
            variant,
            &config,
            config.memory_budget_mb,
            Some(deadline),
        )?;
        tracing::info!(
            "pair ({}, {}) done ({}): {} conserved edges over {} rows{}",
            species_a,
            species_b,
            variant,
            outcome.summary.n_conserved_edges,
            outcome.summary.n_rows,
            if outcome.resumed { " [cached]" } else { "" }
        );
    }
    crate::common::trace_rss_now();

    Ok(())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    #[test]
    fn memory_estimate_rounds_up() {
        // two 1024-gene networks are 8 MiB each before restriction
        let mb = super::estimate_memory_mb(1024, 1024, 0, 0);
        assert_eq!(mb, 16);
        assert_eq!(super::estimate_memory_mb(1, 1, 1, 1), 1);
    }
}
