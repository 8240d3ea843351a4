use std::sync::Arc;

use anyhow::ensure;
use serde::{Deserialize, Serialize};

use crate::{
    factory::ResourceFactory,
    fieldspec::FieldSpecs,
    loader::Loader,
    manifest::{ImageTag, TypeMeta, apiversion, kind},
    plugin::{Configurable, PluginConfig, PluginState, State},
};

use super::{ResourceMap, Transformer};

/// One `images` entry together with the locations of image references it may rewrite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageTagTransformerConfig {
    #[serde(flatten)]
    pub type_meta: TypeMeta<apiversion::Builtin, kind::ImageTagTransformer>,
    pub image_tag: ImageTag,
    #[serde(default)]
    pub field_specs: FieldSpecs,
}

impl PluginConfig for ImageTagTransformerConfig {
    fn validate(&self) -> anyhow::Result<()> {
        ensure!(
            !self.image_tag.name.is_empty(),
            "an image tag must have a `name`"
        );
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct ImageTagTransformer {
    state: PluginState<ImageTagTransformerConfig>,
}

impl ImageTagTransformer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> State {
        self.state.state()
    }

    pub fn config(&self) -> Option<&ImageTagTransformerConfig> {
        self.state.config()
    }
}

impl Configurable for ImageTagTransformer {
    fn configure(
        &mut self,
        loader: &Arc<dyn Loader>,
        factory: &ResourceFactory,
        config: &[u8],
    ) -> anyhow::Result<()> {
        self.state.configure(loader, factory, config)
    }
}

impl Transformer for ImageTagTransformer {
    #[tracing::instrument(skip_all, name = "image_tag_transform")]
    fn transform(&self, resources: &mut ResourceMap) -> anyhow::Result<()> {
        let config = &self.state.ready()?.config;
        let image_tag = &config.image_tag;
        tracing::debug!(
            name = %image_tag.name,
            new_name = %image_tag.new_name,
            new_tag = %image_tag.new_tag,
            digest = %image_tag.digest,
            "rewriting images"
        );

        for resource in resources.iter_mut() {
            config.field_specs.apply::<String>(resource, |image| {
                if let Some(updated) = rewrite(image_tag, image) {
                    *image = updated;
                }
                Ok(())
            })?;
        }

        Ok(())
    }
}

/// Splits an image reference into its name and the tag or digest suffix (with its separator).
/// A `:` before the last `/` belongs to a registry port, not a tag.
fn split_image(image: &str) -> (&str, &str) {
    if let Some(at) = image.find('@') {
        return image.split_at(at);
    }

    let start = image.rfind('/').map_or(0, |slash| slash + 1);
    match image[start..].rfind(':') {
        Some(colon) => image.split_at(start + colon),
        None => (image, ""),
    }
}

fn rewrite(image_tag: &ImageTag, image: &str) -> Option<String> {
    let (name, suffix) = split_image(image);
    if name != image_tag.name {
        return None;
    }

    let new_name = if image_tag.new_name.is_empty() {
        name
    } else {
        image_tag.new_name.as_str()
    };

    // `digest` takes precedence over `new_tag`
    Some(if !image_tag.digest.is_empty() {
        format!("{new_name}@{}", image_tag.digest)
    } else if !image_tag.new_tag.is_empty() {
        format!("{new_name}:{}", image_tag.new_tag)
    } else {
        format!("{new_name}{suffix}")
    })
}
