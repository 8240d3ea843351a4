mod image;

pub use self::image::{ImageTagTransformer, ImageTagTransformerConfig};

use crate::resmap::ResourceMap;

pub trait Transformer {
    fn transform(&self, resources: &mut ResourceMap) -> anyhow::Result<()>;
}
