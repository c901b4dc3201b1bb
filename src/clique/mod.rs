//! Per-HOG conserved-edge graphs and clique enumeration
//! (`clique aggregate`).

pub mod bron_kerbosch;

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use itertools::Itertools;
use petgraph::graph::UnGraph;
use serde::{Deserialize, Serialize};
use thousands::Separable;

use crate::artifact::{self, ComparisonHeader};
use crate::config::{Config, SignVariant};
use crate::error::WorkerError;
use crate::pair::test::ComparisonRow;

/// One conserved edge, resolved to labels.
#[derive(Debug, Clone)]
pub struct ConservedEdge {
    /// Orthogroup of the ortholog pair.
    pub hog: String,
    /// Gene of the lexicographically smaller species.
    pub gene_a: String,
    /// Its species.
    pub species_a: String,
    /// Gene of the lexicographically larger species.
    pub gene_b: String,
    /// Its species.
    pub species_b: String,
    /// `max(q1, q2)` of the comparison row.
    pub q: f64,
    /// Enrichment, direction a to b.
    pub e1: f64,
    /// Enrichment, direction b to a.
    pub e2: f64,
}

/// Extract the conserved edges of one comparison table.
pub fn conserved_edges(
    header: &ComparisonHeader,
    rows: &[ComparisonRow],
    alpha: f64,
) -> Vec<ConservedEdge> {
    rows.iter()
        .filter(|row| row.q1.max(row.q2) < alpha)
        .map(|row| ConservedEdge {
            hog: header.hogs[row.hog as usize].clone(),
            gene_a: header.genes_a[row.a as usize].clone(),
            species_a: header.species_a.clone(),
            gene_b: header.genes_b[row.b as usize].clone(),
            species_b: header.species_b.clone(),
            q: row.q1.max(row.q2),
            e1: row.e1,
            e2: row.e2,
        })
        .collect()
}

/// A maximal co-expresselog clique with its annotation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnotatedClique {
    /// Orthogroup the clique lives in.
    pub hog: String,
    /// Identifier, assigned after the global sort.
    pub clique_id: u32,
    /// Number of genes.
    pub clique_size: usize,
    /// Member genes, sorted.
    pub genes: Vec<String>,
    /// Distinct species represented, sorted.
    pub species: Vec<String>,
    /// Number of distinct species.
    pub n_species: usize,
    /// Derived attribute class; an attribute value when all species share
    /// it, `Mixed` otherwise.
    pub attribute_class: String,
    /// Mean `max(q1, q2)` over the conserved edges inside the clique.
    pub mean_q: f64,
    /// Median `max(q1, q2)` over the conserved edges inside the clique.
    pub median_q: f64,
    /// Mean enrichment over both directions of those edges.
    pub mean_effect_size: f64,
    /// All unordered gene pairs of the clique.
    pub n_edges: usize,
}

/// Result of clique enumeration for one tissue and variant.
#[derive(Debug, Clone)]
pub struct CliqueOutcome {
    /// Annotated cliques, sorted by (size desc, mean q asc).
    pub cliques: Vec<AnnotatedClique>,
    /// HOGs skipped by the `max_clique_edges` guard.
    pub skipped_hogs: Vec<String>,
}

fn median(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    }
}

/// Enumerate and annotate the maximal cliques of every HOG.
pub fn enumerate_cliques(
    edges: Vec<ConservedEdge>,
    variant: SignVariant,
    config: &Config,
) -> Result<CliqueOutcome, WorkerError> {
    let mut by_hog: BTreeMap<String, Vec<ConservedEdge>> = BTreeMap::new();
    for edge in edges {
        by_hog.entry(edge.hog.clone()).or_default().push(edge);
    }

    let mut cliques = Vec::new();
    let mut skipped_hogs = Vec::new();
    for (hog, hog_edges) in by_hog {
        // In signed mode only sign-consistent edges survive: both
        // directions driven by the same correlation polarity.
        let hog_edges: Vec<ConservedEdge> = if variant == SignVariant::Signed {
            hog_edges
                .into_iter()
                .filter(|e| e.e1 * e.e2 >= 0.0)
                .collect()
        } else {
            hog_edges
        };

        // Collapse the multiset to unordered gene pairs, keeping the
        // best-supported row per pair.
        let mut collapsed: BTreeMap<(String, String), ConservedEdge> = BTreeMap::new();
        for edge in hog_edges {
            let key = if edge.gene_a <= edge.gene_b {
                (edge.gene_a.clone(), edge.gene_b.clone())
            } else {
                (edge.gene_b.clone(), edge.gene_a.clone())
            };
            match collapsed.get(&key) {
                Some(existing) if existing.q <= edge.q => {}
                _ => {
                    collapsed.insert(key, edge);
                }
            }
        }

        if collapsed.len() < 3 {
            continue;
        }
        if collapsed.len() > config.max_clique_edges {
            tracing::warn!(
                "skipping HOG {}: {} conserved edges exceed max_clique_edges = {}",
                hog,
                collapsed.len().separate_with_commas(),
                config.max_clique_edges
            );
            skipped_hogs.push(hog);
            continue;
        }

        // Vertex table with species lookup.
        let mut species_of: BTreeMap<String, String> = BTreeMap::new();
        for edge in collapsed.values() {
            species_of.insert(edge.gene_a.clone(), edge.species_a.clone());
            species_of.insert(edge.gene_b.clone(), edge.species_b.clone());
        }
        let vertices: Vec<String> = species_of.keys().cloned().collect();
        let vertex_index: BTreeMap<&str, usize> = vertices
            .iter()
            .enumerate()
            .map(|(i, g)| (g.as_str(), i))
            .collect();

        let mut graph: UnGraph<(), ()> = UnGraph::with_capacity(vertices.len(), collapsed.len());
        for _ in &vertices {
            graph.add_node(());
        }
        for edge in collapsed.values() {
            let u = vertex_index[edge.gene_a.as_str()];
            let v = vertex_index[edge.gene_b.as_str()];
            graph.update_edge(
                petgraph::graph::NodeIndex::new(u),
                petgraph::graph::NodeIndex::new(v),
                (),
            );
        }
        // Conserved edges are cross-species by construction; paralogs of
        // one species within the HOG are implicitly adjacent, making the
        // cliques complete multipartite subgraphs.
        for (i, gene_i) in vertices.iter().enumerate() {
            for (j, gene_j) in vertices.iter().enumerate().skip(i + 1) {
                if species_of[gene_i] == species_of[gene_j] {
                    graph.update_edge(
                        petgraph::graph::NodeIndex::new(i),
                        petgraph::graph::NodeIndex::new(j),
                        (),
                    );
                }
            }
        }
        let adjacency: Vec<BTreeSet<usize>> = (0..vertices.len())
            .map(|i| {
                graph
                    .neighbors(petgraph::graph::NodeIndex::new(i))
                    .map(|n| n.index())
                    .collect()
            })
            .collect();

        for member_ids in bron_kerbosch::maximal_cliques(&adjacency, config.min_clique_size) {
            let genes: Vec<String> = member_ids.iter().map(|&i| vertices[i].clone()).collect();
            let species: Vec<String> = genes
                .iter()
                .map(|g| species_of[g].clone())
                .sorted()
                .dedup()
                .collect();
            if species.len() < 2 {
                // paralogs of one species are only implicitly adjacent;
                // without a cross-species edge there is nothing conserved
                continue;
            }
            let attributes: Vec<&str> = species
                .iter()
                .map(|sp| {
                    config.attribute_of(sp).ok_or_else(|| {
                        WorkerError::ConfigMismatch(format!("species {} is not configured", sp))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?
                .into_iter()
                .sorted()
                .dedup()
                .collect();
            let attribute_class = if attributes.len() == 1 {
                attributes[0].to_string()
            } else {
                "Mixed".to_string()
            };

            let mut qs = Vec::new();
            let mut effects = Vec::new();
            for pair in genes.iter().combinations(2) {
                let key = if pair[0] <= pair[1] {
                    (pair[0].clone(), pair[1].clone())
                } else {
                    (pair[1].clone(), pair[0].clone())
                };
                if let Some(edge) = collapsed.get(&key) {
                    qs.push(edge.q);
                    effects.push(edge.e1);
                    effects.push(edge.e2);
                }
            }
            qs.sort_by(|a, b| a.total_cmp(b));
            let mean_q = qs.iter().sum::<f64>() / qs.len() as f64;
            let mean_effect_size = effects.iter().sum::<f64>() / effects.len() as f64;

            cliques.push(AnnotatedClique {
                hog: hog.clone(),
                clique_id: 0,
                clique_size: genes.len(),
                n_species: species.len(),
                species,
                attribute_class,
                mean_q,
                median_q: median(&qs),
                mean_effect_size,
                n_edges: genes.len() * (genes.len() - 1) / 2,
                genes,
            });
        }
    }

    cliques.sort_by(|a, b| {
        b.clique_size
            .cmp(&a.clique_size)
            .then_with(|| a.mean_q.total_cmp(&b.mean_q))
            .then_with(|| a.hog.cmp(&b.hog))
            .then_with(|| a.genes.cmp(&b.genes))
    });
    for (i, clique) in cliques.iter_mut().enumerate() {
        clique.clique_id = (i + 1) as u32;
    }

    Ok(CliqueOutcome {
        cliques,
        skipped_hogs,
    })
}

/// Write the clique table as TSV.
pub fn write_clique_table(path: &Path, cliques: &[AnnotatedClique]) -> Result<(), WorkerError> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .from_path(path)
        .map_err(|e| WorkerError::ArtifactCorrupt(format!("cannot write {:?}: {}", path, e)))?;
    writer
        .write_record([
            "hog",
            "clique_id",
            "clique_size",
            "genes",
            "species",
            "attribute_class",
            "mean_q",
            "median_q",
            "mean_effect_size",
            "n_edges",
        ])
        .map_err(|e| WorkerError::ArtifactCorrupt(format!("cannot write {:?}: {}", path, e)))?;
    for clique in cliques {
        writer
            .write_record([
                clique.hog.as_str(),
                &clique.clique_id.to_string(),
                &clique.clique_size.to_string(),
                &clique.genes.join(";"),
                &clique.species.join(";"),
                clique.attribute_class.as_str(),
                &format!("{}", clique.mean_q),
                &format!("{}", clique.median_q),
                &format!("{}", clique.mean_effect_size),
                &clique.n_edges.to_string(),
            ])
            .map_err(|e| WorkerError::ArtifactCorrupt(format!("cannot write {:?}: {}", path, e)))?;
    }
    writer
        .flush()
        .map_err(|e| WorkerError::ArtifactCorrupt(format!("cannot flush {:?}: {}", path, e)))?;
    Ok(())
}

/// Write the full clique output set: TSV, per-class splits, binary
/// companion.
pub fn write_outputs(
    outdir: &Path,
    tissue: &str,
    variant: SignVariant,
    cliques: &[AnnotatedClique],
    config: &Config,
) -> Result<(), WorkerError> {
    std::fs::create_dir_all(outdir)
        .map_err(|e| WorkerError::ArtifactCorrupt(format!("cannot create {:?}: {}", outdir, e)))?;
    write_clique_table(&outdir.join("cliques.tsv"), cliques)?;
    let classes: BTreeSet<String> = cliques.iter().map(|c| c.attribute_class.clone()).collect();
    for class in classes {
        let subset: Vec<AnnotatedClique> = cliques
            .iter()
            .filter(|c| c.attribute_class == class)
            .cloned()
            .collect();
        write_clique_table(&outdir.join(format!("cliques.{}.tsv", class)), &subset)?;
    }
    artifact::write_cliques(&outdir.join("cliques.bin"), tissue, variant, cliques, config)?;
    Ok(())
}

/// Read all comparison artifacts of one tissue and variant, sorted by
/// file name.
pub fn gather_comparisons(
    workdir: &Path,
    tissue: &str,
    variant: SignVariant,
    config: &Config,
) -> Result<Vec<(ComparisonHeader, Vec<ComparisonRow>)>, WorkerError> {
    let dir = workdir.join("pairs").join(tissue);
    let suffix = format!(".{}.{:016x}.prcmp", variant, config.pair_hash());
    let mut paths: Vec<PathBuf> = Vec::new();
    if dir.is_dir() {
        let entries = std::fs::read_dir(&dir)
            .map_err(|e| WorkerError::ArtifactCorrupt(format!("cannot list {:?}: {}", dir, e)))?;
        for entry in entries {
            let entry = entry.map_err(|e| {
                WorkerError::ArtifactCorrupt(format!("cannot list {:?}: {}", dir, e))
            })?;
            let path = entry.path();
            if path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(&suffix))
            {
                paths.push(path);
            }
        }
    }
    paths.sort();
    let mut comparisons = Vec::with_capacity(paths.len());
    for path in paths {
        comparisons.push(artifact::read_comparison(&path)?);
    }
    Ok(comparisons)
}

/// Command line arguments for `clique aggregate` subcommand.
#[derive(Debug, clap::Parser)]
#[command(about = "aggregate conserved pairs into maximal cliques", long_about = None)]
pub struct Args {
    /// Path to the engine configuration (TOML).
    #[clap(long)]
    pub path_config: String,
    /// Tissue to aggregate.
    #[clap(long)]
    pub tissue: String,
    /// Working directory holding the pair artifacts.
    #[clap(long)]
    pub workdir: String,
    /// Output directory for the clique tables.
    #[clap(long)]
    pub outdir: String,
}

/// Main entry point for the `clique aggregate` subcommand.
pub fn run(args_common: &crate::common::Args, args: &Args) -> Result<(), anyhow::Error> {
    tracing::info!("Starting `clique aggregate`");
    tracing::info!("  args_common = {:?}", args_common);
    tracing::info!("  args = {:?}", args);

    let config = Config::load(shellexpand::tilde(&args.path_config).as_ref())?;
    let workdir = PathBuf::from(shellexpand::tilde(&args.workdir).into_owned());
    let outdir = PathBuf::from(shellexpand::tilde(&args.outdir).into_owned());

    for variant in config.sign_variants() {
        let comparisons = gather_comparisons(&workdir, &args.tissue, variant, &config)?;
        if comparisons.is_empty() {
            tracing::warn!(
                "no comparison artifacts for tissue {} ({})",
                args.tissue,
                variant
            );
            continue;
        }
        let mut edges = Vec::new();
        let mut pair_summaries = Vec::new();
        for (header, rows) in &comparisons {
            edges.extend(conserved_edges(header, rows, config.p_threshold));
            pair_summaries.push(crate::summary::summarize_pair(
                header,
                rows,
                config.p_threshold,
            ));
        }
        tracing::info!(
            "{} conserved edges across {} pairs for tissue {} ({})",
            edges.len().separate_with_commas(),
            comparisons.len(),
            args.tissue,
            variant
        );
        let outcome = enumerate_cliques(edges, variant, &config)?;
        let variant_outdir = outdir.join(&args.tissue).join(variant.to_string());
        write_outputs(&variant_outdir, &args.tissue, variant, &outcome.cliques, &config)?;
        let manifest = crate::summary::TissueManifest::new(
            &args.tissue,
            variant,
            &outcome.cliques,
            outcome.skipped_hogs,
            pair_summaries,
            Vec::new(),
        );
        crate::summary::write_manifest(&variant_outdir.join("manifest.json"), &manifest)?;
        crate::summary::write_pair_summaries(
            &variant_outdir.join("pair_summary.tsv"),
            &manifest.pairs,
        )?;
        tracing::info!(
            "wrote {} cliques for tissue {} ({})",
            outcome.cliques.len().separate_with_commas(),
            args.tissue,
            variant
        );
    }

    Ok(())
}
