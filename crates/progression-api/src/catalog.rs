//! Reference catalog loading: an override file named by the environment, or the
//! catalog compiled into the crate.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use contracts::ReferenceCatalog;
use thiserror::Error;

use crate::config::TrackerConfig;

pub const BUILTIN_REFERENCE_CATALOG: &str = include_str!("data/reference_catalog.json");

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to parse reference catalog: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to read reference catalog from {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("duplicate {kind} id `{id}` in reference catalog")]
    Duplicate { kind: &'static str, id: String },
    #[error("adventure `{id}` has roll range {min}..={max}")]
    RollRange { id: String, min: u8, max: u8 },
    #[error("monster `{id}` lists {levels} levels for {stages} bestiary stages")]
    LevelColumns {
        id: String,
        levels: usize,
        stages: usize,
    },
}

/// Where the active catalog came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogSource {
    Builtin,
    File(PathBuf),
}

pub fn builtin_catalog() -> Result<ReferenceCatalog, CatalogError> {
    catalog_from_json_str(BUILTIN_REFERENCE_CATALOG)
}

pub fn catalog_from_json_str(json: &str) -> Result<ReferenceCatalog, CatalogError> {
    let catalog: ReferenceCatalog = serde_json::from_str(json)?;
    validate(&catalog)?;
    Ok(catalog)
}

pub fn catalog_from_file(path: &Path) -> Result<ReferenceCatalog, CatalogError> {
    let contents = fs::read_to_string(path).map_err(|source| CatalogError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    catalog_from_json_str(&contents)
}

/// Loads the configured override catalog, falling back to the built-in one
/// when no override is set or the override cannot be used.
pub fn load_catalog(
    config: &TrackerConfig,
) -> Result<(ReferenceCatalog, CatalogSource), CatalogError> {
    if let Some(path) = config.catalog_path.as_ref() {
        match catalog_from_file(path) {
            Ok(catalog) => {
                tracing::info!(
                    target: "progression::catalog",
                    path = %path.display(),
                    kingdoms = catalog.kingdoms.len(),
                    "catalog.loaded=file"
                );
                return Ok((catalog, CatalogSource::File(path.clone())));
            }
            Err(err) => {
                tracing::warn!(
                    target: "progression::catalog",
                    path = %path.display(),
                    error = %err,
                    "catalog.load_failed"
                );
            }
        }
    }

    let catalog = builtin_catalog()?;
    tracing::info!(
        target: "progression::catalog",
        kingdoms = catalog.kingdoms.len(),
        "catalog.loaded=builtin"
    );
    Ok((catalog, CatalogSource::Builtin))
}

fn validate(catalog: &ReferenceCatalog) -> Result<(), CatalogError> {
    let mut kingdoms = HashSet::new();
    for kingdom in &catalog.kingdoms {
        if !kingdoms.insert(kingdom.kingdom_id.as_str()) {
            return Err(duplicate("kingdom", &kingdom.kingdom_id));
        }

        let mut districts = HashSet::new();
        for district in &kingdom.districts {
            if !districts.insert(district.as_str()) {
                return Err(duplicate("district", district));
            }
        }

        let stages = kingdom.bestiary.stages.len();
        let mut monsters = HashSet::new();
        for monster in &kingdom.bestiary.monsters {
            if !monsters.insert(monster.monster_id.as_str()) {
                return Err(duplicate("monster", &monster.monster_id));
            }
            if monster.levels.len() > stages {
                return Err(CatalogError::LevelColumns {
                    id: monster.monster_id.clone(),
                    levels: monster.levels.len(),
                    stages,
                });
            }
        }

        let mut contracts = HashSet::new();
        for contract in &kingdom.contracts {
            if !contracts.insert(contract.contract_id.as_str()) {
                return Err(duplicate("contract", &contract.contract_id));
            }
        }

        let mut adventures = HashSet::new();
        for adventure in &kingdom.adventures {
            if !adventures.insert(adventure.adventure_id.as_str()) {
                return Err(duplicate("adventure", &adventure.adventure_id));
            }
            if adventure.roll_min > adventure.roll_max {
                return Err(CatalogError::RollRange {
                    id: adventure.adventure_id.clone(),
                    min: adventure.roll_min,
                    max: adventure.roll_max,
                });
            }
        }
    }
    Ok(())
}

fn duplicate(kind: &'static str, id: &str) -> CatalogError {
    CatalogError::Duplicate {
        kind,
        id: id.to_string(),
    }
}
