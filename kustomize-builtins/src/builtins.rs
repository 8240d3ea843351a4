use core::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::{
    factory::ResourceFactory,
    fieldspec::TransformerConfig,
    generator::{
        ConfigMapGenerator, ConfigMapGeneratorConfig, Generator, SecretGenerator,
        SecretGeneratorConfig,
    },
    loader::Loader,
    manifest::{GeneratorArgs, Kustomization, TypeMeta},
    plugin::Configurable,
    resmap::ResourceMap,
    transform::{ImageTagTransformer, ImageTagTransformerConfig, Transformer},
};

const CONFIG_MAP: &str = "configmap";
const SECRET: &str = "secret";
const IMAGE_TAG: &str = "imageTag";

type GeneratorConfigurator =
    fn(&Builtins, &Kustomization) -> Result<Vec<BuiltinGenerator>, ConfigureError>;

type TransformerConfigurator = fn(
    &Builtins,
    &Kustomization,
    &TransformerConfig,
) -> Result<Vec<BuiltinTransformer>, ConfigureError>;

/// Generator capabilities in the order their plugins are produced.
const GENERATORS: [(&str, GeneratorConfigurator); 2] = [
    (CONFIG_MAP, Builtins::configure_config_map_generators),
    (SECRET, Builtins::configure_secret_generators),
];

/// Transformer capabilities in the order their plugins are produced.
const TRANSFORMERS: [(&str, TransformerConfigurator); 1] =
    [(IMAGE_TAG, Builtins::configure_image_tag_transformers)];

/// Turns the builtin sections of a kustomization into configured plugins.
#[derive(Debug, Clone)]
pub struct Builtins {
    loader: Arc<dyn Loader>,
    factory: ResourceFactory,
}

impl Builtins {
    pub fn new(loader: Arc<dyn Loader>, factory: ResourceFactory) -> Self {
        Self { loader, factory }
    }

    pub fn loader(&self) -> &Arc<dyn Loader> {
        &self.loader
    }

    pub fn factory(&self) -> &ResourceFactory {
        &self.factory
    }

    /// Configures one generator per generator entry. The first failure aborts the whole
    /// operation.
    #[tracing::instrument(skip_all)]
    pub fn configure_generators(
        &self,
        kustomization: &Kustomization,
    ) -> Result<Vec<BuiltinGenerator>, ConfigureError> {
        let mut generators = vec![];
        for (id, configure) in GENERATORS {
            let configured = configure(self, kustomization)?;
            tracing::debug!(id, count = configured.len(), "configured generators");
            generators.extend(configured);
        }
        Ok(generators)
    }

    /// Configures one transformer per transformer entry. The first failure aborts the whole
    /// operation.
    #[tracing::instrument(skip_all)]
    pub fn configure_transformers(
        &self,
        kustomization: &Kustomization,
        config: &TransformerConfig,
    ) -> Result<Vec<BuiltinTransformer>, ConfigureError> {
        let mut transformers = vec![];
        for (id, configure) in TRANSFORMERS {
            let configured = configure(self, kustomization, config)?;
            tracing::debug!(id, count = configured.len(), "configured transformers");
            transformers.extend(configured);
        }
        Ok(transformers)
    }

    #[tracing::instrument(skip_all, fields(entries = kustomization.config_map_generators.len()))]
    fn configure_config_map_generators(
        &self,
        kustomization: &Kustomization,
    ) -> Result<Vec<BuiltinGenerator>, ConfigureError> {
        let shared = &kustomization.generator_options;
        kustomization
            .config_map_generators
            .iter()
            .map(|entry| {
                let config = ConfigMapGeneratorConfig {
                    type_meta: TypeMeta::default(),
                    options: shared.merge(&entry.options),
                    args: entry.args.clone(),
                };
                let plugin =
                    self.configure_builtin(ConfigMapGenerator::new(), &config, CONFIG_MAP)?;
                tracing::debug!(name = %entry.args.name, "configured config map generator");
                Ok(BuiltinGenerator::ConfigMap(plugin))
            })
            .collect()
    }

    #[tracing::instrument(skip_all, fields(entries = kustomization.secret_generators.len()))]
    fn configure_secret_generators(
        &self,
        kustomization: &Kustomization,
    ) -> Result<Vec<BuiltinGenerator>, ConfigureError> {
        let shared = &kustomization.generator_options;
        kustomization
            .secret_generators
            .iter()
            .map(|entry| {
                let config = SecretGeneratorConfig {
                    type_meta: TypeMeta::default(),
                    options: shared.merge(&entry.options),
                    args: entry.args.clone(),
                    ty: entry.ty.clone(),
                };
                let plugin = self.configure_builtin(SecretGenerator::new(), &config, SECRET)?;
                tracing::debug!(name = %entry.args.name, "configured secret generator");
                Ok(BuiltinGenerator::Secret(plugin))
            })
            .collect()
    }

    #[tracing::instrument(skip_all, fields(entries = kustomization.images.len()))]
    fn configure_image_tag_transformers(
        &self,
        kustomization: &Kustomization,
        transformer_config: &TransformerConfig,
    ) -> Result<Vec<BuiltinTransformer>, ConfigureError> {
        kustomization
            .images
            .iter()
            .map(|image_tag| {
                let config = ImageTagTransformerConfig {
                    type_meta: TypeMeta::default(),
                    image_tag: image_tag.clone(),
                    field_specs: transformer_config.images.clone(),
                };
                let plugin =
                    self.configure_builtin(ImageTagTransformer::new(), &config, IMAGE_TAG)?;
                tracing::debug!(name = %image_tag.name, "configured image tag transformer");
                Ok(BuiltinTransformer::ImageTag(plugin))
            })
            .collect()
    }

    /// Serializes `config` and hands the payload to `plugin`.
    fn configure_builtin<P: Configurable>(
        &self,
        mut plugin: P,
        config: &impl Serialize,
        id: &'static str,
    ) -> Result<P, ConfigureError> {
        let payload = crate::yaml::to_string(config)
            .map_err(|source| ConfigureError::Marshal { id, source })?;
        match plugin.configure(&self.loader, &self.factory, payload.as_bytes()) {
            Ok(()) => Ok(plugin),
            Err(source) => Err(ConfigureError::Config {
                id,
                payload,
                source,
            }),
        }
    }
}

#[derive(Debug)]
pub enum ConfigureError {
    /// The composite configuration could not be serialized.
    Marshal {
        id: &'static str,
        source: anyhow::Error,
    },
    /// The plugin rejected its payload.
    Config {
        id: &'static str,
        payload: String,
        source: anyhow::Error,
    },
}

impl ConfigureError {
    /// The capability whose configuration failed.
    pub fn id(&self) -> &'static str {
        match self {
            ConfigureError::Marshal { id, .. } | ConfigureError::Config { id, .. } => id,
        }
    }
}

impl fmt::Display for ConfigureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigureError::Marshal { id, .. } => write!(f, "builtin {id} marshal"),
            ConfigureError::Config { id, payload, .. } => {
                write!(f, "builtin {id} config: {}", payload.trim_end())
            }
        }
    }
}

impl std::error::Error for ConfigureError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigureError::Marshal { source, .. } | ConfigureError::Config { source, .. } => {
                Some(&**source)
            }
        }
    }
}

#[derive(Debug)]
pub enum BuiltinGenerator {
    ConfigMap(ConfigMapGenerator),
    Secret(SecretGenerator),
}

impl BuiltinGenerator {
    /// The generator entry this plugin was configured from.
    pub fn args(&self) -> Option<&GeneratorArgs> {
        match self {
            BuiltinGenerator::ConfigMap(generator) => generator.config().map(|c| &c.args),
            BuiltinGenerator::Secret(generator) => generator.config().map(|c| &c.args),
        }
    }
}

impl Configurable for BuiltinGenerator {
    fn configure(
        &mut self,
        loader: &Arc<dyn Loader>,
        factory: &ResourceFactory,
        config: &[u8],
    ) -> anyhow::Result<()> {
        match self {
            BuiltinGenerator::ConfigMap(generator) => generator.configure(loader, factory, config),
            BuiltinGenerator::Secret(generator) => generator.configure(loader, factory, config),
        }
    }
}

impl Generator for BuiltinGenerator {
    fn generate(&self) -> anyhow::Result<ResourceMap> {
        match self {
            BuiltinGenerator::ConfigMap(generator) => generator.generate(),
            BuiltinGenerator::Secret(generator) => generator.generate(),
        }
    }
}

#[derive(Debug)]
pub enum BuiltinTransformer {
    ImageTag(ImageTagTransformer),
}

impl Configurable for BuiltinTransformer {
    fn configure(
        &mut self,
        loader: &Arc<dyn Loader>,
        factory: &ResourceFactory,
        config: &[u8],
    ) -> anyhow::Result<()> {
        match self {
            BuiltinTransformer::ImageTag(transformer) => {
                transformer.configure(loader, factory, config)
            }
        }
    }
}

impl Transformer for BuiltinTransformer {
    fn transform(&self, resources: &mut ResourceMap) -> anyhow::Result<()> {
        match self {
            BuiltinTransformer::ImageTag(transformer) => transformer.transform(resources),
        }
    }
}
