//! Configuration for phrase matching and the CLI.
//!
//! Stored as JSON. Every field has a default, so a partial file is valid.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Phrase matcher settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhraseConfig {
    /// Output is dense when matches exceed `max_doc >> dense_shift`.
    /// 5 puts the crossover at one match per 32 docs: a bit per doc versus
    /// 32 bits per sparse entry.
    pub dense_shift: u32,
    /// Evaluate leaves on the rayon pool
    pub parallel_leaves: bool,
    /// Intersect rarest terms first. Disabling only costs speed.
    pub frequency_order: bool,
}

impl Default for PhraseConfig {
    fn default() -> Self {
        Self {
            dense_shift: 5,
            parallel_leaves: false,
            frequency_order: true,
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SieveConfig {
    pub phrase: PhraseConfig,
    /// Documents per committed segment when the CLI builds an index
    pub segment_size: usize,
    /// Field the CLI indexes lines into
    pub field: String,
}

impl Default for SieveConfig {
    fn default() -> Self {
        Self {
            phrase: PhraseConfig::default(),
            segment_size: 10_000,
            field: "body".to_string(),
        }
    }
}

impl SieveConfig {
    /// Load and validate a JSON config file
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let config: SieveConfig = serde_json::from_reader(BufReader::new(file))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.phrase.dense_shift >= 32 {
            return Err(Error::Config(format!(
                "phrase.dense_shift must be below 32, got {}",
                self.phrase.dense_shift
            )));
        }
        if self.segment_size == 0 {
            return Err(Error::Config("segment_size must be positive".to_string()));
        }
        if self.field.is_empty() {
            return Err(Error::Config("field must not be empty".to_string()));
        }
        Ok(())
    }
}
