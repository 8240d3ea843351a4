use std::sync::Arc;

use anyhow::{Context, bail};

use crate::{
    PathExt,
    builtins::Builtins,
    factory::ResourceFactory,
    fieldspec::TransformerConfig,
    generator::Generator,
    loader::Loader,
    manifest::{Behavior, Kustomization},
    resmap::ResourceMap,
    transform::Transformer,
};

/// Builds a single kustomization: its `resources`, followed by the output of its builtin
/// generators, with its builtin transformers applied in order.
#[derive(Debug, Clone)]
pub struct Builder {
    builtins: Builtins,
}

impl Builder {
    pub fn new(loader: Arc<dyn Loader>) -> Self {
        Self {
            builtins: Builtins::new(loader, ResourceFactory::new()),
        }
    }

    #[tracing::instrument(skip_all, fields(root = %self.builtins.loader().root().pretty()))]
    pub fn build(&self, kustomization: &Kustomization) -> anyhow::Result<ResourceMap> {
        let loader = self.builtins.loader();
        let mut resources = self.gather_resources(kustomization)?;

        let config = TransformerConfig::load(&**loader, &kustomization.configurations)?;
        let generators = self.builtins.configure_generators(kustomization)?;
        let transformers = self
            .builtins
            .configure_transformers(kustomization, &config)?;

        for generator in &generators {
            let behavior = generator.args().map_or(Behavior::Create, |args| args.behavior);
            if behavior != Behavior::Create {
                bail!(
                    "generator behavior `{behavior}` requires a base kustomization to {behavior} into"
                );
            }

            resources
                .merge(generator.generate()?)
                .context("adding generated resources")?;
        }

        for transformer in &transformers {
            transformer.transform(&mut resources)?;
        }

        tracing::debug!(
            resources = resources.len(),
            generators = generators.len(),
            transformers = transformers.len(),
            "built kustomization"
        );
        Ok(resources)
    }

    fn gather_resources(&self, kustomization: &Kustomization) -> anyhow::Result<ResourceMap> {
        let loader = self.builtins.loader();
        let factory = self.builtins.factory();

        let mut resources = ResourceMap::default();
        for path in &kustomization.resources {
            let bytes = loader
                .load(path)
                .with_context(|| format!("loading resource {}", path.pretty()))?;
            for resource in factory
                .from_bytes(&bytes)
                .with_context(|| format!("parsing resource {}", path.pretty()))?
            {
                resources.insert(resource)?;
            }
        }

        Ok(resources)
    }
}
