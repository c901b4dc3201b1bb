//! Reading of the hierarchical orthogroup table.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use std::time::Instant;

use multimap::MultiMap;
use serde::Deserialize;
use thousands::Separable;

use crate::error::WorkerError;

/// One row of the orthogroup table.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct OrthoGroupRecord {
    /// Hierarchical orthogroup identifier.
    pub ortho_group: String,
    /// Finer-grained subgroup identifier.
    pub sub_group: String,
    /// Species of the member gene.
    pub species: String,
    /// Member gene identifier.
    pub gene_id: String,
    /// Categorical attribute of the species (informational here).
    pub attribute: String,
    /// Whether the member belongs to the core of the group.
    #[serde(deserialize_with = "deserialize_flag")]
    pub is_core: bool,
}

fn deserialize_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "t" | "yes" | "y" => Ok(true),
        "0" | "false" | "f" | "no" | "n" | "" => Ok(false),
        _ => Err(serde::de::Error::custom(format!(
            "invalid is_core flag: {:?}",
            raw
        ))),
    }
}

/// One member of an orthogroup.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Member {
    /// Species identifier.
    pub species: String,
    /// Gene identifier.
    pub gene_id: String,
}

/// One row of the expanded ortholog-pair table for a species pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrthoPairRecord {
    /// Source orthogroup.
    pub hog: String,
    /// Gene of the lexicographically smaller species.
    pub gene_a: String,
    /// Gene of the lexicographically larger species.
    pub gene_b: String,
}

/// Orthogroup membership restricted to the configured species set.
#[derive(Debug, Clone)]
pub struct OrthologTable {
    /// Group id to sorted members.
    members: BTreeMap<String, Vec<Member>>,
    /// Gene id to its single group and species.
    gene_info: HashMap<String, (String, String)>,
}

impl OrthologTable {
    /// Number of groups.
    pub fn n_groups(&self) -> usize {
        self.members.len()
    }

    /// Group of a gene, if any.
    pub fn group_of(&self, gene: &str) -> Option<&str> {
        self.gene_info.get(gene).map(|(group, _)| group.as_str())
    }

    /// Species of a gene, if any.
    pub fn species_of(&self, gene: &str) -> Option<&str> {
        self.gene_info.get(gene).map(|(_, species)| species.as_str())
    }

    /// Genes of `species` whose group is shared with at least one other
    /// species.  Genes with no cross-species homolog cannot contribute to
    /// any comparison and are excluded from the network gene universe.
    pub fn comparable_genes(&self, species: &str) -> BTreeSet<String> {
        let mut result = BTreeSet::new();
        for members in self.members.values() {
            if !members.iter().any(|m| m.species != species) {
                continue;
            }
            for member in members.iter().filter(|m| m.species == species) {
                result.insert(member.gene_id.clone());
            }
        }
        result
    }

    /// Expand the ortholog-pair table for the canonical species pair
    /// `(species_a, species_b)` with `species_a < species_b`.
    ///
    /// Per group, the Cartesian product of the two member sets; groups
    /// whose per-side member count falls outside `[min_side, max_side]`
    /// are skipped.  Rows are emitted in (group, gene_a, gene_b) order so
    /// downstream output is deterministic.
    pub fn ortho_pairs(
        &self,
        species_a: &str,
        species_b: &str,
        min_side: Option<usize>,
        max_side: Option<usize>,
    ) -> Vec<OrthoPairRecord> {
        let mut rows = Vec::new();
        for (group, members) in &self.members {
            let side_a: Vec<&Member> = members.iter().filter(|m| m.species == species_a).collect();
            let side_b: Vec<&Member> = members.iter().filter(|m| m.species == species_b).collect();
            if side_a.is_empty() || side_b.is_empty() {
                continue;
            }
            if let Some(lo) = min_side {
                if side_a.len() < lo || side_b.len() < lo {
                    continue;
                }
            }
            if let Some(hi) = max_side {
                if side_a.len() > hi || side_b.len() > hi {
                    continue;
                }
            }
            for a in &side_a {
                for b in &side_b {
                    if a.gene_id == b.gene_id {
                        continue;
                    }
                    rows.push(OrthoPairRecord {
                        hog: group.clone(),
                        gene_a: a.gene_id.clone(),
                        gene_b: b.gene_id.clone(),
                    });
                }
            }
        }
        rows
    }
}

/// Load the orthogroup table, filtered to `species_set`.
pub fn load_orthologs(
    path: &Path,
    delimiter: u8,
    species_set: &BTreeSet<String>,
    group_by_subgroup: bool,
    core_members_only: bool,
) -> Result<OrthologTable, WorkerError> {
    tracing::debug!("reading orthogroup table {:?}", path);
    let reader = crate::common::io::open_read_maybe_gz(path)
        .map_err(|e| WorkerError::InputMalformed(format!("cannot open {:?}: {}", path, e)))?;
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .from_reader(reader);

    let mut seen_species: BTreeSet<String> = BTreeSet::new();
    let mut raw: MultiMap<String, Member> = MultiMap::new();
    let mut gene_info: HashMap<String, (String, String)> = HashMap::new();

    let mut prev = Instant::now();
    for (i, result) in reader.deserialize::<OrthoGroupRecord>().enumerate() {
        let record = result.map_err(|e| {
            WorkerError::InputMalformed(format!("orthogroup row {}: {}", i + 2, e))
        })?;

        // Write out progress indicator every 60 seconds.
        if prev.elapsed().as_secs() >= 60 {
            tracing::info!(
                "at orthogroup row {} ({} members kept)",
                (i + 1).separate_with_commas(),
                gene_info.len().separate_with_commas()
            );
            prev = Instant::now();
        }

        seen_species.insert(record.species.clone());
        if !species_set.contains(&record.species) {
            continue;
        }
        if core_members_only && !record.is_core {
            continue;
        }
        let group = if group_by_subgroup {
            if record.sub_group.is_empty() {
                return Err(WorkerError::InputMalformed(format!(
                    "empty sub_group for gene {} (row {})",
                    record.gene_id,
                    i + 2
                )));
            }
            record.sub_group.clone()
        } else {
            record.ortho_group.clone()
        };
        match gene_info.get(&record.gene_id) {
            Some((existing, _)) if *existing != group => {
                return Err(WorkerError::InputMalformed(format!(
                    "gene {} is a member of both {} and {}",
                    record.gene_id, existing, group
                )));
            }
            Some(_) => continue, // identical duplicate row
            None => {}
        }
        gene_info.insert(
            record.gene_id.clone(),
            (group.clone(), record.species.clone()),
        );
        raw.insert(
            group,
            Member {
                species: record.species,
                gene_id: record.gene_id,
            },
        );
    }

    for species in species_set {
        if !seen_species.contains(species) {
            return Err(WorkerError::ConfigMismatch(format!(
                "species {} not present in orthogroup table",
                species
            )));
        }
    }

    let mut members: BTreeMap<String, Vec<Member>> = BTreeMap::new();
    for (group, group_members) in raw {
        let mut group_members = group_members;
        group_members.sort();
        members.insert(group, group_members);
    }

    Ok(OrthologTable { members, gene_info })
}
