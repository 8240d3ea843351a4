use std::sync::Arc;

use anyhow::{Context, bail};
use serde::de::DeserializeOwned;

use crate::{factory::ResourceFactory, loader::Loader};

/// A builtin plugin that absorbs a serialized configuration before it can be run.
pub trait Configurable {
    /// Validates and stores `config`. `loader` and `factory` are retained for later use by the
    /// plugin's generate or transform step.
    fn configure(
        &mut self,
        loader: &Arc<dyn Loader>,
        factory: &ResourceFactory,
        config: &[u8],
    ) -> anyhow::Result<()>;
}

/// Parsed plugin configuration that can check its own semantic constraints.
pub trait PluginConfig: DeserializeOwned {
    fn validate(&self) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Created,
    Configuring,
    Configured,
    Failed,
}

/// Lifecycle of a plugin: `Created`, then `Configuring` for the duration of one `configure`
/// call, which leaves it `Configured` or `Failed`.
#[derive(Debug)]
pub enum PluginState<C> {
    Created,
    Configuring,
    Configured(Ready<C>),
    Failed,
}

impl<C> Default for PluginState<C> {
    fn default() -> Self {
        PluginState::Created
    }
}

/// Everything a configured plugin needs to run.
#[derive(Debug)]
pub struct Ready<C> {
    pub config: C,
    pub loader: Arc<dyn Loader>,
    pub factory: ResourceFactory,
}

impl<C: PluginConfig> PluginState<C> {
    pub fn configure(
        &mut self,
        loader: &Arc<dyn Loader>,
        factory: &ResourceFactory,
        payload: &[u8],
    ) -> anyhow::Result<()> {
        if !matches!(self, PluginState::Created) {
            bail!("plugin may only be configured once");
        }

        *self = PluginState::Configuring;
        match parse::<C>(payload) {
            Ok(config) => {
                *self = PluginState::Configured(Ready {
                    config,
                    loader: Arc::clone(loader),
                    factory: *factory,
                });
                Ok(())
            }
            Err(err) => {
                *self = PluginState::Failed;
                Err(err)
            }
        }
    }
}

impl<C> PluginState<C> {
    pub fn state(&self) -> State {
        match self {
            PluginState::Created => State::Created,
            PluginState::Configuring => State::Configuring,
            PluginState::Configured(_) => State::Configured,
            PluginState::Failed => State::Failed,
        }
    }

    pub fn config(&self) -> Option<&C> {
        match self {
            PluginState::Configured(ready) => Some(&ready.config),
            _ => None,
        }
    }

    pub fn ready(&self) -> anyhow::Result<&Ready<C>> {
        match self {
            PluginState::Configured(ready) => Ok(ready),
            PluginState::Created | PluginState::Configuring => {
                bail!("plugin has not been configured")
            }
            PluginState::Failed => bail!("plugin configuration failed"),
        }
    }
}

fn parse<C: PluginConfig>(payload: &[u8]) -> anyhow::Result<C> {
    let config = crate::yaml::from_slice::<C>(payload).context("parsing plugin configuration")?;
    config.validate()?;
    Ok(config)
}
