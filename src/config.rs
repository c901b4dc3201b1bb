//! Engine configuration.
//!
//! The configuration is read once from a TOML document, validated, and then
//! passed by shared reference into every stage constructor.  There is no
//! global configuration state.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::WorkerError;

/// Correlation method used by the network builder.
#[derive(
    Serialize,
    Deserialize,
    clap::ValueEnum,
    strum_macros::Display,
    strum_macros::EnumString,
    PartialEq,
    Eq,
    Clone,
    Copy,
    Debug,
    Default,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CorrelationMethod {
    /// Pearson product-moment correlation.
    Pearson,
    /// Spearman rank correlation.
    #[default]
    Spearman,
    /// Kendall tau-b correlation.
    Kendall,
}

/// Sign handling for the correlation matrix.
#[derive(
    Serialize,
    Deserialize,
    clap::ValueEnum,
    strum_macros::Display,
    strum_macros::EnumString,
    PartialEq,
    Eq,
    Clone,
    Copy,
    Debug,
    Default,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CorrelationSign {
    /// Keep the correlation matrix as is.
    Signed,
    /// Fold to absolute values before normalisation.
    #[default]
    Unsigned,
    /// Emit both variants (diagnostic polarity pipeline).
    Both,
}

/// Concrete sign variant of one network artifact.
#[derive(
    Serialize,
    Deserialize,
    clap::ValueEnum,
    strum_macros::Display,
    strum_macros::EnumString,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Clone,
    Copy,
    Debug,
    Default,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SignVariant {
    Signed,
    #[default]
    Unsigned,
}

/// Normalisation applied to the correlation matrix.
#[derive(
    Serialize,
    Deserialize,
    clap::ValueEnum,
    strum_macros::Display,
    strum_macros::EnumString,
    PartialEq,
    Eq,
    Clone,
    Copy,
    Debug,
    Default,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Normalization {
    /// Mutual Rank, `sqrt(R * R^T)` over row-wise ranks.
    #[default]
    Mr,
    /// CLR-like, `sqrt(Z * Z^T + Z^T * Z)` over column-standardised values.
    Clr,
}

/// Multiple-testing correction applied per species-pair.
#[derive(
    Serialize,
    Deserialize,
    clap::ValueEnum,
    strum_macros::Display,
    strum_macros::EnumString,
    PartialEq,
    Eq,
    Clone,
    Copy,
    Debug,
    Default,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum FdrMethod {
    /// Benjamini-Hochberg.
    #[default]
    Bh,
    /// Bonferroni.
    Bonferroni,
}

fn default_delimiter() -> String {
    "\t".to_string()
}

fn default_min_samples() -> usize {
    3
}

fn default_density() -> f64 {
    0.03
}

fn default_alpha() -> f64 {
    0.05
}

fn default_min_clique_size() -> usize {
    3
}

fn default_max_clique_edges() -> usize {
    10_000
}

fn default_max_workers() -> usize {
    10
}

fn default_pair_timeout() -> u64 {
    86_400
}

fn default_memory_budget() -> u64 {
    16_384
}

fn default_max_attempts() -> usize {
    2
}

/// Immutable engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Column delimiter of both input tables (single character).
    #[serde(default = "default_delimiter")]
    pub delimiter: String,
    /// Minimum number of samples required per species/tissue.
    #[serde(default = "default_min_samples")]
    pub min_samples: usize,
    /// Correlation method.
    #[serde(default)]
    pub correlation_method: CorrelationMethod,
    /// Sign handling of the correlation matrix.
    #[serde(default)]
    pub correlation_sign: CorrelationSign,
    /// Normalisation of the correlation matrix.
    #[serde(default)]
    pub normalization: Normalization,
    /// Fraction `d` of upper-triangular entries above the network threshold.
    #[serde(default = "default_density")]
    pub density_threshold: f64,
    /// Conserved-edge threshold on `max(q1, q2)`.
    #[serde(default = "default_alpha")]
    pub p_threshold: f64,
    /// Multiple-testing correction.
    #[serde(default)]
    pub fdr_method: FdrMethod,
    /// Minimum clique size to report.
    #[serde(default = "default_min_clique_size")]
    pub min_clique_size: usize,
    /// Per-HOG guard against exponential clique enumeration.
    #[serde(default = "default_max_clique_edges")]
    pub max_clique_edges: usize,
    /// Skip HOGs with fewer members per species side.
    #[serde(default)]
    pub min_genes_per_hog: Option<usize>,
    /// Skip HOGs with more members per species side.
    #[serde(default)]
    pub max_genes_per_hog: Option<usize>,
    /// Group orthologs by `sub_group` instead of `ortho_group`.
    #[serde(default)]
    pub group_by_subgroup: bool,
    /// Restrict orthogroup membership to `is_core` rows.
    #[serde(default)]
    pub core_members_only: bool,
    /// Concurrent species-pair workers.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    /// Wall-time budget per species-pair task, in seconds.
    #[serde(default = "default_pair_timeout")]
    pub pair_timeout_secs: u64,
    /// Initial memory budget per species-pair task, in MiB.
    #[serde(default = "default_memory_budget")]
    pub memory_budget_mb: u64,
    /// Maximum attempts per pair, `ResourceExhausted` doubles the budget.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,
    /// Tissues to process.
    pub tissues: Vec<String>,
    /// Attribute value to the species carrying it.
    pub species: BTreeMap<String, Vec<String>>,
}

impl Config {
    /// Load and validate a configuration document.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Config, WorkerError> {
        let text = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            WorkerError::InputMalformed(format!(
                "cannot read configuration {:?}: {}",
                path.as_ref(),
                e
            ))
        })?;
        let config: Config = toml::from_str(&text)
            .map_err(|e| WorkerError::InputMalformed(format!("invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check internal consistency of the configuration.
    pub fn validate(&self) -> Result<(), WorkerError> {
        if self.delimiter.as_bytes().len() != 1 {
            return Err(WorkerError::InputMalformed(format!(
                "delimiter must be a single byte, got {:?}",
                self.delimiter
            )));
        }
        if !(self.density_threshold > 0.0 && self.density_threshold < 1.0) {
            return Err(WorkerError::ConfigMismatch(format!(
                "density_threshold must be in (0, 1), got {}",
                self.density_threshold
            )));
        }
        if !(self.p_threshold > 0.0 && self.p_threshold < 1.0) {
            return Err(WorkerError::ConfigMismatch(format!(
                "p_threshold must be in (0, 1), got {}",
                self.p_threshold
            )));
        }
        if self.min_clique_size < 3 {
            return Err(WorkerError::ConfigMismatch(format!(
                "min_clique_size must be >= 3, got {}",
                self.min_clique_size
            )));
        }
        if self.max_workers == 0 || self.max_attempts == 0 {
            return Err(WorkerError::ConfigMismatch(
                "max_workers and max_attempts must be positive".into(),
            ));
        }
        if let (Some(lo), Some(hi)) = (self.min_genes_per_hog, self.max_genes_per_hog) {
            if lo > hi {
                return Err(WorkerError::ConfigMismatch(format!(
                    "min_genes_per_hog ({}) exceeds max_genes_per_hog ({})",
                    lo, hi
                )));
            }
        }
        if self.tissues.is_empty() {
            return Err(WorkerError::ConfigMismatch("no tissues configured".into()));
        }
        let mut seen: BTreeMap<&str, &str> = BTreeMap::new();
        for (attribute, species) in &self.species {
            if attribute.is_empty() {
                return Err(WorkerError::ConfigMismatch("empty attribute name".into()));
            }
            for sp in species {
                if let Some(other) = seen.insert(sp.as_str(), attribute.as_str()) {
                    return Err(WorkerError::ConfigMismatch(format!(
                        "species {} listed under both {} and {}",
                        sp, other, attribute
                    )));
                }
            }
        }
        if seen.len() < 2 {
            return Err(WorkerError::ConfigMismatch(format!(
                "need at least two species, got {}",
                seen.len()
            )));
        }
        Ok(())
    }

    /// Delimiter as a single byte.
    pub fn delimiter_byte(&self) -> u8 {
        self.delimiter.as_bytes()[0]
    }

    /// All configured species, sorted.
    pub fn species_list(&self) -> Vec<String> {
        let mut all: Vec<String> = self
            .species
            .values()
            .flat_map(|v| v.iter().cloned())
            .collect();
        all.sort();
        all.dedup();
        all
    }

    /// Categorical attribute of one species, if configured.
    pub fn attribute_of(&self, species: &str) -> Option<&str> {
        self.species
            .iter()
            .find(|(_, members)| members.iter().any(|s| s == species))
            .map(|(attribute, _)| attribute.as_str())
    }

    /// All unordered species pairs in canonical (lexicographic) order.
    pub fn species_pairs(&self) -> Vec<(String, String)> {
        let all = self.species_list();
        let mut pairs = Vec::new();
        for (i, a) in all.iter().enumerate() {
            for b in all.iter().skip(i + 1) {
                pairs.push((a.clone(), b.clone()));
            }
        }
        pairs
    }

    /// Concrete sign variants to run.
    pub fn sign_variants(&self) -> Vec<SignVariant> {
        match self.correlation_sign {
            CorrelationSign::Signed => vec![SignVariant::Signed],
            CorrelationSign::Unsigned => vec![SignVariant::Unsigned],
            CorrelationSign::Both => vec![SignVariant::Unsigned, SignVariant::Signed],
        }
    }

    /// Stable hash over the parameters that shape network artifacts.
    ///
    /// Species-network files are content-addressed by this value so that a
    /// parameter change invalidates the cache while a re-run with identical
    /// parameters reuses it.
    pub fn network_hash(&self) -> u64 {
        let key = format!(
            "method={};normalization={};density={:.6};min_samples={}",
            self.correlation_method, self.normalization, self.density_threshold, self.min_samples,
        );
        xxhash_rust::xxh3::xxh3_64(key.as_bytes())
    }

    /// Stable hash over the parameters that shape pair-stage artifacts.
    ///
    /// Extends [`Config::network_hash`] with the parameters that influence
    /// the OrthoPair expansion and the comparison table.
    pub fn pair_hash(&self) -> u64 {
        let key = format!(
            "network={:016x};fdr={};min_hog={:?};max_hog={:?};subgroup={};core={}",
            self.network_hash(),
            self.fdr_method,
            self.min_genes_per_hog,
            self.max_genes_per_hog,
            self.group_by_subgroup,
            self.core_members_only,
        );
        xxhash_rust::xxh3::xxh3_64(key.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn example() -> Config {
        toml::from_str(
            r#"
            tissues = ["leaf"]

            [species]
            annual = ["Atha", "Esal"]
            perennial = ["Aalp"]
            "#,
        )
        .expect("valid example config")
    }

    #[test]
    fn defaults() {
        let config = example();
        config.validate().unwrap();
        assert_eq!(config.correlation_method, CorrelationMethod::Spearman);
        assert_eq!(config.correlation_sign, CorrelationSign::Unsigned);
        assert_eq!(config.normalization, Normalization::Mr);
        assert_eq!(config.density_threshold, 0.03);
        assert_eq!(config.p_threshold, 0.05);
        assert_eq!(config.min_clique_size, 3);
        assert_eq!(config.max_clique_edges, 10_000);
        assert_eq!(config.delimiter_byte(), b'\t');
    }

    #[test]
    fn species_helpers() {
        let config = example();
        assert_eq!(config.species_list(), vec!["Aalp", "Atha", "Esal"]);
        assert_eq!(config.attribute_of("Atha"), Some("annual"));
        assert_eq!(config.attribute_of("Aalp"), Some("perennial"));
        assert_eq!(config.attribute_of("Zmay"), None);
        assert_eq!(
            config.species_pairs(),
            vec![
                ("Aalp".to_string(), "Atha".to_string()),
                ("Aalp".to_string(), "Esal".to_string()),
                ("Atha".to_string(), "Esal".to_string()),
            ]
        );
    }

    #[test]
    fn sign_variants() {
        let mut config = example();
        assert_eq!(config.sign_variants(), vec![SignVariant::Unsigned]);
        config.correlation_sign = CorrelationSign::Both;
        assert_eq!(
            config.sign_variants(),
            vec![SignVariant::Unsigned, SignVariant::Signed]
        );
    }

    #[test]
    fn network_hash_tracks_parameters() {
        let config = example();
        let mut other = example();
        assert_eq!(config.network_hash(), other.network_hash());
        other.density_threshold = 0.3;
        assert_ne!(config.network_hash(), other.network_hash());
        // pair-stage parameters do not invalidate network artifacts
        let mut pairwise = example();
        pairwise.p_threshold = 0.01;
        assert_eq!(config.network_hash(), pairwise.network_hash());
    }

    #[rstest::rstest]
    #[case("density_threshold = 1.5")]
    #[case("p_threshold = 0.0")]
    #[case("min_clique_size = 2")]
    #[case("delimiter = \",,\"")]
    #[case("min_genes_per_hog = 9\nmax_genes_per_hog = 3")]
    fn rejects_bad_values(#[case] line: &str) {
        let text = format!(
            "{}\ntissues = [\"leaf\"]\n[species]\nannual = [\"Atha\"]\nperennial = [\"Aalp\"]\n",
            line
        );
        let config: Config = toml::from_str(&text).expect("parses");
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_duplicate_species() {
        let config: Result<Config, _> = toml::from_str(
            r#"
            tissues = ["leaf"]
            [species]
            annual = ["Atha"]
            perennial = ["Atha"]
            "#,
        );
        assert!(config.expect("parses").validate().is_err());
    }
}
