use crate::db_types::{CaseFolding, ColumnDef};
use serde::{Deserialize, Serialize};

/// Explicit source-to-target column rename.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnRename {
    pub source: String,
    pub target: String,
}

impl ColumnRename {
    pub fn new(source: &str, target: &str) -> Self {
        Self {
            source: source.to_string(),
            target: target.to_string(),
        }
    }
}

pub fn validate_renames(renames: &[ColumnRename]) -> Result<(), String> {
    for (index, rename) in renames.iter().enumerate() {
        if rename.source.trim().is_empty() {
            return Err(format!("Mapping entry {} has an empty source column", index + 1));
        }
        if rename.target.trim().is_empty() {
            return Err(format!("Mapping entry {} has an empty target column", index + 1));
        }
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnPair {
    pub source: ColumnDef,
    pub target: ColumnDef,
}

/// Ordered source-to-target column association. Source names are unique
/// under the mapping's case folding.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnMapping {
    pairs: Vec<ColumnPair>,
    folding: CaseFolding,
}

impl ColumnMapping {
    pub fn new(folding: CaseFolding) -> Self {
        Self {
            pairs: Vec::new(),
            folding,
        }
    }

    /// Appends a pair; returns false when the source column is already mapped.
    pub fn push(&mut self, source: ColumnDef, target: ColumnDef) -> bool {
        if self.position_of_source(&source.name).is_some() {
            return false;
        }
        self.pairs.push(ColumnPair { source, target });
        true
    }

    pub fn pairs(&self) -> &[ColumnPair] {
        &self.pairs
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn folding(&self) -> CaseFolding {
        self.folding
    }

    pub fn source_columns(&self) -> Vec<&ColumnDef> {
        self.pairs.iter().map(|pair| &pair.source).collect()
    }

    pub fn target_columns(&self) -> Vec<ColumnDef> {
        self.pairs.iter().map(|pair| pair.target.clone()).collect()
    }

    pub fn target_names(&self) -> Vec<String> {
        self.pairs.iter().map(|pair| pair.target.name.clone()).collect()
    }

    pub fn position_of_source(&self, name: &str) -> Option<usize> {
        self.pairs
            .iter()
            .position(|pair| self.folding.matches(&pair.source.name, name))
    }

    pub fn position_of_target(&self, name: &str) -> Option<usize> {
        self.pairs
            .iter()
            .position(|pair| self.folding.matches(&pair.target.name, name))
    }

    pub fn set_target(&mut self, index: usize, target: ColumnDef) {
        if let Some(pair) = self.pairs.get_mut(index) {
            pair.target = target;
        }
    }

    /// Zero-based indexes into a source row, one per pair.
    pub fn source_row_indexes(&self) -> Vec<usize> {
        self.pairs
            .iter()
            .enumerate()
            .map(|(index, pair)| pair.source.position.checked_sub(1).unwrap_or(index))
            .collect()
    }
}

/// Target side of the mapping resolution.
pub enum TargetColumns<'a> {
    /// Target table exists; entries must match its columns.
    Existing(&'a [ColumnDef]),
    /// Target table will be created from the source shape.
    Synthesized,
}

/// Builds the column mapping and the warnings for dropped entries.
pub fn resolve_mapping(
    source_columns: &[ColumnDef],
    target: TargetColumns<'_>,
    renames: Option<&[ColumnRename]>,
    folding: CaseFolding,
) -> (ColumnMapping, Vec<String>) {
    let mut mapping = ColumnMapping::new(folding);
    let mut warnings = Vec::new();

    let find_source = |name: &str| {
        source_columns
            .iter()
            .find(|column| folding.matches(&column.name, name))
    };

    match renames.filter(|renames| !renames.is_empty()) {
        Some(renames) => {
            let mut accepted = Vec::new();
            for rename in renames {
                let Some(source) = find_source(&rename.source) else {
                    warnings.push(format!(
                        "Source column '{}' not found, mapping entry dropped",
                        rename.source
                    ));
                    continue;
                };
                let target_def = match &target {
                    TargetColumns::Existing(columns) => {
                        match columns
                            .iter()
                            .find(|column| folding.matches(&column.name, &rename.target))
                        {
                            Some(column) => column.clone(),
                            None => {
                                warnings.push(format!(
                                    "Target column '{}' not found, mapping entry dropped",
                                    rename.target
                                ));
                                continue;
                            }
                        }
                    }
                    TargetColumns::Synthesized => {
                        let mut column = source.clone();
                        column.name = rename.target.trim().to_string();
                        column
                    }
                };
                accepted.push((source.clone(), target_def));
            }

            // New tables get their columns in source order.
            if matches!(target, TargetColumns::Synthesized) {
                accepted.sort_by_key(|(source, _)| source.position);
            }
            for (source, target_def) in accepted {
                let name = source.name.clone();
                if !mapping.push(source, target_def) {
                    warnings.push(format!(
                        "Source column '{}' mapped more than once, later entry dropped",
                        name
                    ));
                }
            }
        }
        None => {
            for source in source_columns {
                let target_def = match &target {
                    TargetColumns::Existing(columns) => {
                        match columns
                            .iter()
                            .find(|column| folding.matches(&column.name, &source.name))
                        {
                            Some(column) => column.clone(),
                            None => {
                                warnings.push(format!(
                                    "Source column '{}' has no matching target column, skipped",
                                    source.name
                                ));
                                continue;
                            }
                        }
                    }
                    TargetColumns::Synthesized => source.clone(),
                };
                if !mapping.push(source.clone(), target_def) {
                    warnings.push(format!(
                        "Duplicate source column '{}' skipped",
                        source.name
                    ));
                }
            }
        }
    }

    (mapping, warnings)
}
