//! Per-species co-expression network construction (`network build`).

pub mod correlation;
pub mod normalize;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use ndarray::Array2;

use crate::config::{Config, SignVariant};
use crate::error::WorkerError;
use crate::input::{ExpressionMatrix, TissueInputs};

/// Cap on the per-species gene universe in test mode.
pub const TEST_MODE_GENE_CAP: usize = 200;

/// Symmetric co-expression network of one species and tissue.
#[derive(Debug, Clone)]
pub struct SpeciesNetwork {
    /// Species identifier.
    pub species: String,
    /// Tissue identifier.
    pub tissue: String,
    /// Row/column labels; exactly the gene universe of this network.
    pub genes: Vec<String>,
    /// Normalised co-expression strengths, zero diagonal.
    pub matrix: Array2<f64>,
    /// Sign of the underlying correlation, kept in signed mode only.
    pub signs: Option<Array2<i8>>,
    /// Density threshold.
    pub tau: f64,
    /// Sign variant the network was built under.
    pub variant: SignVariant,
}

impl SpeciesNetwork {
    /// Number of genes.
    pub fn n_genes(&self) -> usize {
        self.genes.len()
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

/// τ such that the top `d` fraction of strictly-upper-triangular entries
/// satisfies `matrix[i, j] >= τ`.
pub fn density_threshold(matrix: &Array2<f64>, d: f64) -> f64 {
    let n = matrix.nrows();
    let mut values = Vec::with_capacity(n * (n - 1) / 2);
    for i in 0..n {
        for j in (i + 1)..n {
            values.push(matrix[[i, j]]);
        }
    }
    values.sort_by(|a, b| b.total_cmp(a));
    let rank = ((d * values.len() as f64).round() as usize).clamp(1, values.len());
    values[rank - 1]
}

/// Gene universe for one species: genes with a cross-species homolog,
/// optionally capped for test mode.
pub fn gene_universe(inputs: &TissueInputs, species: &str, test_mode: bool) -> BTreeSet<String> {
    let universe = inputs.orthologs.comparable_genes(species);
    if test_mode && universe.len() > TEST_MODE_GENE_CAP {
        tracing::info!(
            "test mode: capping {} gene universe from {} to {}",
            species,
            universe.len(),
            TEST_MODE_GENE_CAP
        );
        universe.into_iter().take(TEST_MODE_GENE_CAP).collect()
    } else {
        universe
    }
}

/// Build the co-expression network of one species and tissue.
pub fn build_network(
    expr: &ExpressionMatrix,
    universe: &BTreeSet<String>,
    variant: SignVariant,
    config: &Config,
) -> Result<SpeciesNetwork, WorkerError> {
    if expr.n_samples() < config.min_samples {
        return Err(WorkerError::InsufficientSamples(format!(
            "{}/{} has {} samples, minimum is {}",
            expr.species,
            expr.tissue,
            expr.n_samples(),
            config.min_samples
        )));
    }
    let genes: Vec<String> = expr
        .genes
        .iter()
        .filter(|g| universe.contains(*g))
        .cloned()
        .collect();
    if genes.len() < 2 {
        return Err(WorkerError::DegenerateExpression(format!(
            "{}/{} has {} comparable genes, need at least 2",
            expr.species,
            expr.tissue,
            genes.len()
        )));
    }

    let index = expr.gene_index();
    let mut x = Array2::zeros((genes.len(), expr.n_samples()));
    for (i, gene) in genes.iter().enumerate() {
        let src = index[gene.as_str()];
        x.row_mut(i).assign(&expr.values.row(src));
    }

    let mut c = correlation::correlation_matrix(&x, config.correlation_method);
    if c.iter().any(|v| v.is_nan()) {
        return Err(WorkerError::DegenerateExpression(format!(
            "NaN in the {} correlation matrix of {}/{}",
            config.correlation_method, expr.species, expr.tissue
        )));
    }

    let signs = match variant {
        SignVariant::Signed => Some(c.mapv(|v| {
            if v > 0.0 {
                1i8
            } else if v < 0.0 {
                -1i8
            } else {
                0i8
            }
        })),
        SignVariant::Unsigned => None,
    };
    if variant == SignVariant::Unsigned {
        c.mapv_inplace(f64::abs);
    }

    let mut matrix = normalize::normalize_matrix(&c, config.normalization);
    for i in 0..matrix.nrows() {
        matrix[[i, i]] = 0.0;
    }
    let tau = density_threshold(&matrix, config.density_threshold);

    Ok(SpeciesNetwork {
        species: expr.species.clone(),
        tissue: expr.tissue.clone(),
        genes,
        matrix,
        signs,
        tau,
        variant,
    })
}

/// Content-addressed artifact path for a species network.
pub fn network_path(
    workdir: &Path,
    species: &str,
    tissue: &str,
    variant: SignVariant,
    config: &Config,
) -> PathBuf {
    workdir.join("networks").join(format!(
        "{}.{}.{}.{:016x}.spnet",
        species,
        tissue,
        variant,
        config.network_hash()
    ))
}

/// Return the cached network when present and valid, build and persist it
/// otherwise.
pub fn ensure_network(
    workdir: &Path,
    inputs: &TissueInputs,
    species: &str,
    tissue: &str,
    variant: SignVariant,
    config: &Config,
    test_mode: bool,
) -> Result<SpeciesNetwork, WorkerError> {
    let path = network_path(workdir, species, tissue, variant, config);
    if path.exists() {
        let (_, network) = crate::artifact::read_species_network(&path)?;
        tracing::info!("reusing cached network {:?}", path);
        return Ok(network);
    }

    let expr = inputs.expression.get(species).ok_or_else(|| {
        WorkerError::InsufficientSamples(format!(
            "{}/{} has no samples in the expression table",
            species, tissue
        ))
    })?;
    let universe = gene_universe(inputs, species, test_mode);
    let network = build_network(expr, &universe, variant, config)?;
    crate::artifact::write_species_network(&path, &network, config)?;
    tracing::info!(
        "built network for {}/{} ({}): {} genes, tau = {:.4}",
        species,
        tissue,
        variant,
        network.n_genes(),
        network.tau
    );
    Ok(network)
}

/// Command line arguments for `network build` subcommand.
#[derive(Debug, clap::Parser)]
#[command(about = "build per-species co-expression networks", long_about = None)]
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
    /// Tissue to build networks for.
    #[clap(long)]
    pub tissue: String,
    /// Species to build; defaults to every configured species.
    #[clap(long)]
    pub species: Vec<String>,
    /// Working directory for cached artifacts.
    #[clap(long)]
    pub workdir: String,
    /// Cap the gene universe for smoke runs.
    #[clap(long, default_value_t = false)]
    pub test_mode: bool,
}

/// Main entry point for the `network build` subcommand.
pub fn run(args_common: &crate::common::Args, args: &Args) -> Result<(), anyhow::Error> {
    tracing::info!("Starting `network build`");
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
    let species = if args.species.is_empty() {
        config.species_list()
    } else {
        args.species.clone()
    };
    for sp in &species {
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

    for sp in &species {
        for variant in config.sign_variants() {
            let network =
                ensure_network(&workdir, &inputs, sp, &args.tissue, variant, &config, args.test_mode)?;
            tracing::info!(
                "network {}/{} ({}): {} genes, tau = {:.4}",
                sp,
                args.tissue,
                variant,
                network.n_genes(),
                network.tau
            );
        }
    }
    crate::common::trace_rss_now();

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use float_cmp::approx_eq;
    use ndarray::{array, Array2};
    use pretty_assertions::assert_eq;

    use crate::config::{Config, SignVariant};
    use crate::input::ExpressionMatrix;

    fn test_config() -> Config {
        toml::from_str(
            r#"
            density_threshold = 0.5
            min_samples = 3
            tissues = ["leaf"]

            [species]
            annual = ["Atha"]
            perennial = ["Aalp"]
            "#,
        )
        .expect("valid config")
    }

    fn expr(genes: &[&str], values: Array2<f64>) -> ExpressionMatrix {
        let samples = (0..values.ncols()).map(|i| format!("s{}", i)).collect();
        ExpressionMatrix {
            species: "Atha".into(),
            tissue: "leaf".into(),
            genes: genes.iter().map(|s| s.to_string()).collect(),
            samples,
            values,
        }
    }

    fn universe(genes: &[&str]) -> BTreeSet<String> {
        genes.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn network_is_symmetric_with_zero_diagonal() {
        let expr = expr(
            &["g1", "g2", "g3", "g4"],
            array![
                [1.0, 2.0, 3.0, 4.0, 5.0],
                [1.1, 2.2, 2.9, 4.1, 5.2],
                [5.0, 3.0, 4.0, 1.0, 2.0],
                [0.5, 4.0, 1.5, 3.5, 2.5]
            ],
        );
        let network = super::build_network(
            &expr,
            &universe(&["g1", "g2", "g3", "g4"]),
            SignVariant::Unsigned,
            &test_config(),
        )
        .unwrap();

        for i in 0..4 {
            assert_eq!(network.matrix[[i, i]], 0.0);
            for j in 0..4 {
                assert!(approx_eq!(
                    f64,
                    network.matrix[[i, j]],
                    network.matrix[[j, i]],
                    epsilon = 1e-12
                ));
            }
        }
    }

    #[test]
    fn density_contract_holds() {
        // 8 x 8 matrix with pairwise distinct entries
        let n = 8;
        let mut matrix = Array2::zeros((n, n));
        for i in 0..n {
            for j in (i + 1)..n {
                let v = (i * 8 + j) as f64 / 100.0;
                matrix[[i, j]] = v;
                matrix[[j, i]] = v;
            }
        }
        let m = (n * (n - 1) / 2) as f64;
        for d in [0.1, 0.3, 0.5] {
            let tau = super::density_threshold(&matrix, d);
            let mut above = 0usize;
            for i in 0..n {
                for j in (i + 1)..n {
                    if matrix[[i, j]] >= tau {
                        above += 1;
                    }
                }
            }
            let fraction = above as f64 / m;
            assert!(
                (fraction - d).abs() <= 1.0 / m + 1e-9,
                "density {} gave fraction {}",
                d,
                fraction
            );
        }
    }

    #[test]
    fn insufficient_samples_is_fatal() {
        let expr = expr(&["g1", "g2"], array![[1.0, 2.0], [2.0, 1.0]]);
        let err = super::build_network(
            &expr,
            &universe(&["g1", "g2"]),
            SignVariant::Unsigned,
            &test_config(),
        )
        .unwrap_err();
        assert_eq!(err.kind(), "InsufficientSamples");
    }

    #[test]
    fn constant_gene_is_degenerate() {
        let expr = expr(
            &["g1", "g2"],
            array![[1.0, 1.0, 1.0, 1.0], [1.0, 2.0, 3.0, 4.0]],
        );
        let err = super::build_network(
            &expr,
            &universe(&["g1", "g2"]),
            SignVariant::Unsigned,
            &test_config(),
        )
        .unwrap_err();
        assert_eq!(err.kind(), "DegenerateExpression");
    }

    #[test]
    fn signed_variant_keeps_sign_plane() {
        let expr = expr(
            &["g1", "g2", "g3"],
            array![
                [1.0, 2.0, 3.0, 4.0],
                [1.5, 2.5, 3.5, 4.5],
                [4.0, 3.0, 2.0, 1.0]
            ],
        );
        let network = super::build_network(
            &expr,
            &universe(&["g1", "g2", "g3"]),
            SignVariant::Signed,
            &test_config(),
        )
        .unwrap();
        let signs = network.signs.as_ref().expect("sign plane in signed mode");
        assert_eq!(signs[[0, 1]], 1);
        assert_eq!(signs[[0, 2]], -1);

        let unsigned = super::build_network(
            &expr,
            &universe(&["g1", "g2", "g3"]),
            SignVariant::Unsigned,
            &test_config(),
        )
        .unwrap();
        assert!(unsigned.signs.is_none());
    }

    #[test]
    fn universe_restricts_genes() {
        let expr = expr(
            &["g1", "g2", "g3"],
            array![
                [1.0, 2.0, 3.0, 4.0],
                [1.5, 2.5, 3.5, 4.5],
                [4.0, 3.0, 2.0, 1.0]
            ],
        );
        let network = super::build_network(
            &expr,
            &universe(&["g1", "g3"]),
            SignVariant::Unsigned,
            &test_config(),
        )
        .unwrap();
        assert_eq!(network.genes, vec!["g1", "g3"]);
        assert_eq!(network.n_genes(), 2);
    }
}
