use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{
    factory::ResourceFactory,
    loader::Loader,
    manifest::{GeneratorArgs, GeneratorOptions, TypeMeta, apiversion, kind},
    plugin::{Configurable, PluginConfig, PluginState, State},
    resmap::ResourceMap,
};

use super::{Generator, validate_args};

/// The configuration of one `configMapGenerator` entry with the shared options merged in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigMapGeneratorConfig {
    #[serde(flatten)]
    pub type_meta: TypeMeta<apiversion::Builtin, kind::ConfigMapGenerator>,
    #[serde(default, skip_serializing_if = "GeneratorOptions::is_empty")]
    pub options: GeneratorOptions,
    #[serde(flatten)]
    pub args: GeneratorArgs,
}

impl PluginConfig for ConfigMapGeneratorConfig {
    fn validate(&self) -> anyhow::Result<()> {
        validate_args(&self.args)
    }
}

#[derive(Debug, Default)]
pub struct ConfigMapGenerator {
    state: PluginState<ConfigMapGeneratorConfig>,
}

impl ConfigMapGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> State {
        self.state.state()
    }

    pub fn config(&self) -> Option<&ConfigMapGeneratorConfig> {
        self.state.config()
    }
}

impl Configurable for ConfigMapGenerator {
    fn configure(
        &mut self,
        loader: &Arc<dyn Loader>,
        factory: &ResourceFactory,
        config: &[u8],
    ) -> anyhow::Result<()> {
        self.state.configure(loader, factory, config)
    }
}

impl Generator for ConfigMapGenerator {
    #[tracing::instrument(skip_all, name = "generate_config_map")]
    fn generate(&self) -> anyhow::Result<ResourceMap> {
        let ready = self.state.ready()?;
        let config_map =
            ready
                .factory
                .make_config_map(&*ready.loader, &ready.config.options, &ready.config.args)?;

        let mut resources = ResourceMap::default();
        resources.insert(config_map)?;
        Ok(resources)
    }
}

#[cfg(test)]
mod tests {
    use crate::loader::MemoryLoader;

    use super::*;

    fn configure(payload: &str) -> (ConfigMapGenerator, anyhow::Result<()>) {
        let loader: Arc<dyn Loader> =
            Arc::new(MemoryLoader::new("/app").with_file("app.properties", "color=blue\n"));
        let mut generator = ConfigMapGenerator::new();
        let result = generator.configure(&loader, &ResourceFactory::new(), payload.as_bytes());
        (generator, result)
    }

    #[test]
    fn generate_from_payload() -> anyhow::Result<()> {
        let (generator, result) = configure(
            r#"
apiVersion: builtin
kind: ConfigMapGenerator
name: app
literals:
- mode=prod
files:
- app.properties
options:
  disableNameSuffixHash: true
  labels:
    team: infra
"#,
        );
        result?;
        assert_eq!(generator.state(), State::Configured);

        let resources = generator.generate()?;
        assert_eq!(resources.len(), 1);
        let config_map = resources.iter().next().unwrap();
        assert_eq!(config_map.name(), "app");
        assert_eq!(config_map.root()["data"]["mode"], "prod");
        assert_eq!(config_map.root()["data"]["app.properties"], "color=blue\n");
        assert_eq!(config_map.root()["metadata"]["labels"]["team"], "infra");
        Ok(())
    }

    #[test]
    fn reject_invalid_payloads() {
        for (payload, expected) in [
            ("literals:\n- a=b\n", "must have a `name`"),
            ("name: app\nliterals:\n- a=b\n- a=c\n", "duplicate literal key `a`"),
            ("name: app\nliterals:\n- a*b=c\n", "not a valid key"),
            ("kind: SecretGenerator\nname: app\n", "expected `ConfigMapGenerator`"),
        ] {
            let (generator, result) = configure(payload);
            let err = result.unwrap_err();
            assert!(format!("{err:#}").contains(expected), "{payload}: {err:#}");
            assert_eq!(generator.state(), State::Failed);
            assert!(generator.generate().is_err());
        }
    }

    #[test]
    fn generate_requires_configuration() {
        let err = ConfigMapGenerator::new().generate().unwrap_err();
        assert!(err.to_string().contains("not been configured"), "{err}");
    }
}
