use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{
    factory::ResourceFactory,
    loader::Loader,
    manifest::{GeneratorArgs, GeneratorOptions, SecretType, TypeMeta, apiversion, kind},
    plugin::{Configurable, PluginConfig, PluginState, State},
    resmap::ResourceMap,
};

use super::{Generator, validate_args};

/// The configuration of one `secretGenerator` entry with the shared options merged in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretGeneratorConfig {
    #[serde(flatten)]
    pub type_meta: TypeMeta<apiversion::Builtin, kind::SecretGenerator>,
    #[serde(default, skip_serializing_if = "GeneratorOptions::is_empty")]
    pub options: GeneratorOptions,
    #[serde(flatten)]
    pub args: GeneratorArgs,
    #[serde(default, rename = "type")]
    pub ty: SecretType,
}

impl PluginConfig for SecretGeneratorConfig {
    fn validate(&self) -> anyhow::Result<()> {
        validate_args(&self.args)
    }
}

#[derive(Debug, Default)]
pub struct SecretGenerator {
    state: PluginState<SecretGeneratorConfig>,
}

impl SecretGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> State {
        self.state.state()
    }

    pub fn config(&self) -> Option<&SecretGeneratorConfig> {
        self.state.config()
    }
}

impl Configurable for SecretGenerator {
    fn configure(
        &mut self,
        loader: &Arc<dyn Loader>,
        factory: &ResourceFactory,
        config: &[u8],
    ) -> anyhow::Result<()> {
        self.state.configure(loader, factory, config)
    }
}

impl Generator for SecretGenerator {
    #[tracing::instrument(skip_all, name = "generate_secret")]
    fn generate(&self) -> anyhow::Result<ResourceMap> {
        let ready = self.state.ready()?;
        let config = &ready.config;
        let secret =
            ready
                .factory
                .make_secret(&*ready.loader, &config.options, &config.args, &config.ty)?;

        let mut resources = ResourceMap::default();
        resources.insert(secret)?;
        Ok(resources)
    }
}
