// Catalog valuation: item point costs under a ruleset.

use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use super::ItemId;

/// Value of any item the ruleset does not list explicitly.
pub const DEFAULT_ITEM_VALUE: u32 = 1;

#[derive(Debug, Error)]
pub enum RulesetError {
    #[error("failed to read ruleset file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("malformed ruleset row on line {line}: {source}")]
    Csv { line: u64, source: csv::Error },

    #[error("invalid value {value} for `{item}` on line {line}: must be >= 0")]
    InvalidValue { line: u64, item: String, value: i64 },

    #[error("item `{item}` listed twice (second time on line {line})")]
    DuplicateItem { line: u64, item: String },

    #[error("empty item id on line {line}")]
    EmptyItem { line: u64 },

    #[error("ruleset file name is not valid UTF-8: {path}")]
    InvalidName { path: PathBuf },
}

/// Canonical form of an item id: trimmed and lowercased. `None` when
/// nothing is left.
pub fn normalize_item_id(raw: &str) -> Option<ItemId> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_lowercase())
    }
}

/// A point-cost table for the catalog. Keys are always normalized with
/// [`normalize_item_id`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ruleset {
    pub id: String,
    /// Catalog generation the values were written for.
    pub generation: u32,
    /// Explicit per-item values. A value of 0 bans the item.
    pub values: HashMap<ItemId, u32>,
}

/// One row of a ruleset CSV (`item_id,value`).
#[derive(Debug, Deserialize)]
struct ValueRow {
    item_id: String,
    value: i64,
}

impl Ruleset {
    pub fn new(id: impl Into<String>, generation: u32) -> Self {
        Ruleset {
            id: id.into(),
            generation,
            values: HashMap::new(),
        }
    }

    /// Builder-style helper used when assembling rulesets in code.
    pub fn with_value(mut self, item_id: impl Into<ItemId>, value: u32) -> Self {
        let item_id = item_id.into();
        let key = normalize_item_id(&item_id).unwrap_or(item_id);
        self.values.insert(key, value);
        self
    }

    /// Point cost of `item_id`. Items absent from the table cost
    /// [`DEFAULT_ITEM_VALUE`].
    pub fn value_of(&self, item_id: &str) -> u32 {
        let found = match normalize_item_id(item_id) {
            Some(key) => self.values.get(&key),
            None => self.values.get(item_id),
        };
        found.copied().unwrap_or(DEFAULT_ITEM_VALUE)
    }

    /// Banned items carry an explicit value of 0 and can never be selected.
    pub fn is_banned(&self, item_id: &str) -> bool {
        self.value_of(item_id) == 0
    }

    /// Parse a ruleset from CSV with an `item_id,value` header.
    pub fn from_csv_reader<R: Read>(
        id: impl Into<String>,
        generation: u32,
        reader: R,
    ) -> Result<Self, RulesetError> {
        let mut ruleset = Ruleset::new(id, generation);
        let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);

        for (idx, row) in rdr.deserialize::<ValueRow>().enumerate() {
            // Line 1 is the header.
            let line = idx as u64 + 2;
            let row = row.map_err(|source| RulesetError::Csv { line, source })?;
            let item = normalize_item_id(&row.item_id).ok_or(RulesetError::EmptyItem { line })?;
            let value = u32::try_from(row.value).map_err(|_| RulesetError::InvalidValue {
                line,
                item: item.clone(),
                value: row.value,
            })?;
            if ruleset.values.insert(item.clone(), value).is_some() {
                return Err(RulesetError::DuplicateItem { line, item });
            }
        }

        Ok(ruleset)
    }

    /// Load a ruleset from a CSV file. The file stem becomes the ruleset id.
    pub fn load_csv(path: &Path, generation: u32) -> Result<Self, RulesetError> {
        let id = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| RulesetError::InvalidName {
                path: path.to_path_buf(),
            })?
            .to_string();
        let file = std::fs::File::open(path).map_err(|source| RulesetError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_csv_reader(id, generation, file)
    }
}

/// Load every `*.csv` file in `dir` as a ruleset, sorted by id.
///
/// A missing directory yields an empty list so a fresh install can start
/// without any catalog data.
pub fn load_dir(dir: &Path, generation: u32) -> Result<Vec<Ruleset>, RulesetError> {
    if !dir.exists() {
        debug!("Ruleset directory {} does not exist", dir.display());
        return Ok(Vec::new());
    }

    let entries = std::fs::read_dir(dir).map_err(|source| RulesetError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut rulesets = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| RulesetError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if !path.is_file() || path.extension().and_then(|ext| ext.to_str()) != Some("csv") {
            continue;
        }
        rulesets.push(Ruleset::load_csv(&path, generation)?);
    }

    rulesets.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(rulesets)
}
