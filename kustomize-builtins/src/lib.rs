use std::{
    ops::Deref,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Context;

use self::manifest::Kustomization;

pub mod build;
pub mod builtins;
pub mod factory;
pub mod fieldspec;
pub mod generator;
pub mod loader;
pub mod manifest;
pub mod plugin;
pub mod resmap;
pub mod resource;
pub mod transform;

mod serde_ex;
mod yaml;

pub use self::{
    build::Builder,
    builtins::{BuiltinGenerator, BuiltinTransformer, Builtins, ConfigureError},
    factory::ResourceFactory,
    fieldspec::TransformerConfig,
    loader::{FileLoader, LoadRestrictor, Loader, MemoryLoader},
    resmap::ResourceMap,
};

/// File names recognized as a kustomization, in lookup order.
pub const KUSTOMIZATION_FILE_NAMES: [&str; 3] =
    ["kustomization.yaml", "kustomization.yml", "Kustomization"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Located<T> {
    pub value: T,
    pub path: PathBuf,
}

impl<T> Located<T> {
    /// The directory containing the located file.
    pub fn dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }
}

impl<T> Deref for Located<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.value
    }
}

pub fn load_kustomization(path: impl AsRef<Path>) -> anyhow::Result<Located<Kustomization>> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(anyhow::anyhow!(
            "load kustomization: path does not exist: {}",
            path.pretty()
        ));
    }

    let mut path = path.canonicalize()?;
    if path.is_dir() {
        path = KUSTOMIZATION_FILE_NAMES
            .iter()
            .map(|name| path.join(name))
            .find(|candidate| candidate.is_file())
            .ok_or_else(|| {
                anyhow::anyhow!("no kustomization file found in {}", path.pretty())
            })?;
    }

    let file = std::fs::read(&path)?;
    let value = yaml::from_slice(&file)
        .with_context(|| format!("parsing kustomization {}", path.pretty()))?;
    Ok(Located { value, path })
}

/// Builds the kustomization at `path` (a kustomization file or its directory), reading files
/// from the kustomization's directory with the given restriction.
pub fn build(path: impl AsRef<Path>, restrictor: LoadRestrictor) -> anyhow::Result<ResourceMap> {
    let kustomization = load_kustomization(path)?;
    let loader = FileLoader::new(kustomization.dir())?.with_restrictor(restrictor);
    Builder::new(Arc::new(loader))
        .build(&kustomization)
        .with_context(|| format!("building kustomization {}", kustomization.path.pretty()))
}

pub trait PathExt {
    fn pretty(&self) -> std::path::Display<'_>;
}

impl PathExt for Path {
    fn pretty(&self) -> std::path::Display<'_> {
        self.display()
    }
}
