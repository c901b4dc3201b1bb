//! Input loading: expression and orthogroup tables.

pub mod expression;
pub mod orthologs;

use std::collections::BTreeMap;
use std::path::Path;

pub use expression::ExpressionMatrix;
pub use orthologs::{OrthoPairRecord, OrthologTable};

use crate::config::Config;
use crate::error::WorkerError;

/// Typed in-memory view of both inputs for one tissue.
#[derive(Debug, Clone)]
pub struct TissueInputs {
    /// Tissue the view is filtered to.
    pub tissue: String,
    /// Per-species expression matrices.
    pub expression: BTreeMap<String, ExpressionMatrix>,
    /// Orthogroup membership for the configured species.
    pub orthologs: OrthologTable,
}

/// Load and validate both input tables for one tissue.
pub fn load_tissue_inputs(
    config: &Config,
    path_expression: &Path,
    path_orthogroups: &Path,
    tissue: &str,
) -> Result<TissueInputs, WorkerError> {
    let species_set = config.species_list().into_iter().collect();
    let expression = expression::load_expression(
        path_expression,
        config.delimiter_byte(),
        tissue,
        &species_set,
    )?;
    let orthologs = orthologs::load_orthologs(
        path_orthogroups,
        config.delimiter_byte(),
        &species_set,
        config.group_by_subgroup,
        config.core_members_only,
    )?;
    Ok(TissueInputs {
        tissue: tissue.to_string(),
        expression,
        orthologs,
    })
}
