use std::{path::PathBuf, sync::OnceLock};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::{PathExt, loader::Loader};

use super::{Conflict, FieldSpecs};

const IMAGES: &str = include_str!("images.yaml");

/// Field specs for each builtin transformer, keyed by the transformer's capability.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformerConfig {
    #[serde(default, skip_serializing_if = "FieldSpecs::is_empty")]
    pub images: FieldSpecs,
}

impl TransformerConfig {
    pub fn builtin() -> &'static Self {
        static INSTANCE: OnceLock<TransformerConfig> = OnceLock::new();
        INSTANCE.get_or_init(|| TransformerConfig {
            images: serde_yaml::from_str(IMAGES).expect("builtin image field specs"),
        })
    }

    pub fn merge(&mut self, other: TransformerConfig) -> Result<(), Conflict> {
        self.images.merge(other.images)
    }

    /// The builtin config extended with the given `configurations` files.
    #[tracing::instrument(skip_all, fields(files = paths.len()))]
    pub fn load(loader: &dyn Loader, paths: &[PathBuf]) -> anyhow::Result<Self> {
        let mut config = Self::builtin().clone();
        for path in paths {
            let bytes = loader
                .load(path)
                .with_context(|| format!("loading transformer configuration {}", path.pretty()))?;
            let other = crate::yaml::from_slice::<TransformerConfig>(&bytes)
                .with_context(|| format!("parsing transformer configuration {}", path.pretty()))?;
            config
                .merge(other)
                .with_context(|| format!("merging transformer configuration {}", path.pretty()))?;
        }
        Ok(config)
    }
}
