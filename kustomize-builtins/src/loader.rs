use core::fmt;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, bail};
use indexmap::IndexMap;

use crate::PathExt;

/// Reads files referenced by a kustomization, relative to its root directory.
pub trait Loader: fmt::Debug + Send + Sync {
    fn root(&self) -> &Path;

    fn load(&self, path: &Path) -> anyhow::Result<Vec<u8>>;

    fn load_to_string(&self, path: &Path) -> anyhow::Result<String> {
        let bytes = self.load(path)?;
        String::from_utf8(bytes).with_context(|| format!("{} is not valid utf-8", path.pretty()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadRestrictor {
    /// Files must resolve to a location inside the loader root.
    #[default]
    RootOnly,
    None,
}

#[derive(Debug, Clone)]
pub struct FileLoader {
    root: PathBuf,
    restrictor: LoadRestrictor,
}

impl FileLoader {
    pub fn new(root: impl AsRef<Path>) -> anyhow::Result<Self> {
        let root = root.as_ref();
        let root = root
            .canonicalize()
            .with_context(|| format!("canonicalizing loader root {}", root.pretty()))?;
        if !root.is_dir() {
            bail!("loader root {} is not a directory", root.pretty());
        }

        Ok(Self {
            root,
            restrictor: LoadRestrictor::default(),
        })
    }

    pub fn with_restrictor(mut self, restrictor: LoadRestrictor) -> Self {
        self.restrictor = restrictor;
        self
    }
}

impl Loader for FileLoader {
    fn root(&self) -> &Path {
        &self.root
    }

    #[tracing::instrument(skip_all, level = "debug", fields(path = %path.display()))]
    fn load(&self, path: &Path) -> anyhow::Result<Vec<u8>> {
        let full = self.root.join(path);
        let full = full
            .canonicalize()
            .with_context(|| format!("resolving {}", full.pretty()))?;

        if self.restrictor == LoadRestrictor::RootOnly && !full.starts_with(&self.root) {
            bail!(
                "security; file {} is not in or below {}",
                full.pretty(),
                self.root.pretty()
            );
        }

        std::fs::read(&full).with_context(|| format!("reading {}", full.pretty()))
    }
}

/// Serves files from memory. Paths are normalized lexically against the root.
#[derive(Debug, Clone, Default)]
pub struct MemoryLoader {
    root: PathBuf,
    files: IndexMap<PathBuf, Vec<u8>>,
}

impl MemoryLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            files: IndexMap::new(),
        }
    }

    pub fn with_file(mut self, path: impl AsRef<Path>, contents: impl Into<Vec<u8>>) -> Self {
        let path = normalize(&self.root.join(path));
        self.files.insert(path, contents.into());
        self
    }
}

impl Loader for MemoryLoader {
    fn root(&self) -> &Path {
        &self.root
    }

    fn load(&self, path: &Path) -> anyhow::Result<Vec<u8>> {
        let full = normalize(&self.root.join(path));
        if !full.starts_with(&self.root) {
            bail!(
                "security; file {} is not in or below {}",
                full.pretty(),
                self.root.pretty()
            );
        }

        self.files
            .get(&full)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("file not found: {}", full.pretty()))
    }
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}
