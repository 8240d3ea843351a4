mod configmap;
mod secret;

use std::collections::HashSet;

use anyhow::{bail, ensure};

pub use self::{
    configmap::{ConfigMapGenerator, ConfigMapGeneratorConfig},
    secret::{SecretGenerator, SecretGeneratorConfig},
};

use crate::{factory::validate_data_key, manifest::GeneratorArgs, resmap::ResourceMap};

pub trait Generator {
    fn generate(&self) -> anyhow::Result<ResourceMap>;
}

/// Checks the constraints shared by every key/value generator.
fn validate_args(args: &GeneratorArgs) -> anyhow::Result<()> {
    ensure!(!args.name.is_empty(), "a generator must have a `name`");

    let mut seen = HashSet::with_capacity(args.sources.literals.len());
    for literal in &args.sources.literals {
        validate_data_key(&literal.key)?;
        if !seen.insert(literal.key.as_str()) {
            bail!("duplicate literal key `{}`", literal.key);
        }
    }

    Ok(())
}
