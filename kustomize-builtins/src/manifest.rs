use core::fmt;
use std::path::PathBuf;

use compact_str::CompactString;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

pub type Str = CompactString;

/// A parsed kustomization file. Only the fields consumed by the builtin plugins and the build
/// driver are modelled, anything else in the document is ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Kustomization {
    #[serde(flatten)]
    pub type_meta: TypeMeta<apiversion::V1Beta1, kind::Kustomization>,
    #[serde(default, skip_serializing_if = "<[_]>::is_empty")]
    pub resources: Box<[PathBuf]>,
    /// Extra transformer configuration files merged into the builtin field specs.
    #[serde(default, skip_serializing_if = "<[_]>::is_empty")]
    pub configurations: Box<[PathBuf]>,
    #[serde(
        default,
        skip_serializing_if = "<[_]>::is_empty",
        rename = "configMapGenerator"
    )]
    pub config_map_generators: Box<[ConfigMapArgs]>,
    #[serde(
        default,
        skip_serializing_if = "<[_]>::is_empty",
        rename = "secretGenerator"
    )]
    pub secret_generators: Box<[SecretArgs]>,
    #[serde(default, skip_serializing_if = "GeneratorOptions::is_empty")]
    pub generator_options: GeneratorOptions,
    #[serde(default, skip_serializing_if = "<[_]>::is_empty")]
    pub images: Box<[ImageTag]>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct ImageTag {
    pub name: Str,
    #[serde(default, skip_serializing_if = "Str::is_empty")]
    pub new_name: Str,
    // `new_tag` is the value used to replace the original tag.
    #[serde(default, skip_serializing_if = "Str::is_empty")]
    pub new_tag: Str,
    // `digest` is the value used to replace the original image tag.
    // If `digest` is present `new_tag` is ignored.
    #[serde(default, skip_serializing_if = "Str::is_empty")]
    pub digest: Str,
}

/// Fields shared by every generator entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratorArgs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<Str>,
    #[serde(default)]
    pub name: Str,
    #[serde(default)]
    pub behavior: Behavior,
    #[serde(flatten)]
    pub sources: KeyValuePairSources,
}

/// One `configMapGenerator` entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigMapArgs {
    #[serde(flatten)]
    pub args: GeneratorArgs,
    #[serde(default, skip_serializing_if = "GeneratorOptions::is_empty")]
    pub options: GeneratorOptions,
}

/// One `secretGenerator` entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretArgs {
    #[serde(flatten)]
    pub args: GeneratorArgs,
    #[serde(default, rename = "type")]
    pub ty: SecretType,
    #[serde(default, skip_serializing_if = "GeneratorOptions::is_empty")]
    pub options: GeneratorOptions,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, Default)]
pub enum SecretType {
    #[default]
    Opaque,
    #[serde(rename = "kubernetes.io/tls")]
    Tls,
    #[serde(untagged)]
    Other(Str),
}

impl fmt::Display for SecretType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Opaque => write!(f, "Opaque"),
            Self::Tls => write!(f, "kubernetes.io/tls"),
            Self::Other(ty) => write!(f, "{ty}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct GeneratorOptions {
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub labels: IndexMap<Str, Str>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub annotations: IndexMap<Str, Str>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disable_name_suffix_hash: Option<bool>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub immutable: bool,
}

impl GeneratorOptions {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Layers `local` on top of `self`. Map entries from `local` win per key, an explicit
    /// `disable_name_suffix_hash` in `local` overrides, `immutable` is sticky.
    pub fn merge(&self, local: &GeneratorOptions) -> GeneratorOptions {
        GeneratorOptions {
            labels: self
                .labels
                .iter()
                .chain(&local.labels)
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            annotations: self
                .annotations
                .iter()
                .chain(&local.annotations)
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            disable_name_suffix_hash: local
                .disable_name_suffix_hash
                .or(self.disable_name_suffix_hash),
            immutable: self.immutable || local.immutable,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct KeyValuePairSources {
    #[serde(default, skip_serializing_if = "<[_]>::is_empty")]
    pub literals: Box<[KeyValuePair]>,
    #[serde(default, skip_serializing_if = "<[_]>::is_empty")]
    pub files: Box<[MaybeKeyValuePair]>,
    #[serde(default, skip_serializing_if = "<[_]>::is_empty")]
    pub envs: Box<[PathBuf]>,
}

impl<'de> Deserialize<'de> for KeyValuePairSources {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Helper {
            #[serde(default)]
            literals: Box<[KeyValuePair]>,
            #[serde(default)]
            files: Box<[MaybeKeyValuePair]>,
            #[serde(default)]
            envs: Vec<PathBuf>,
            // Support for legacy singular `env` field
            env: Option<PathBuf>,
        }

        let mut helper = Helper::deserialize(deserializer)?;
        helper.envs.extend(helper.env);

        Ok(KeyValuePairSources {
            literals: helper.literals,
            files: helper.files,
            envs: helper.envs.into_boxed_slice(),
        })
    }
}

/// A file source, either `path` or `key=path`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaybeKeyValuePair {
    pub key: Option<Str>,
    pub value: Str,
}

impl Serialize for MaybeKeyValuePair {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match &self.key {
            Some(key) => serializer.collect_str(&format_args!("{key}={}", self.value)),
            None => serializer.serialize_str(&self.value),
        }
    }
}

impl<'de> Deserialize<'de> for MaybeKeyValuePair {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value: Str = Deserialize::deserialize(deserializer)?;
        Ok(match value.split_once('=') {
            Some((key, value)) => MaybeKeyValuePair {
                key: Some(key.into()),
                value: value.into(),
            },
            None => MaybeKeyValuePair { key: None, value },
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValuePair {
    pub key: Str,
    pub value: Str,
}

impl Serialize for KeyValuePair {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(&format_args!("{}={}", self.key, self.value))
    }
}

impl<'de> Deserialize<'de> for KeyValuePair {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let maybe_pair: MaybeKeyValuePair = Deserialize::deserialize(deserializer)?;
        Ok(KeyValuePair {
            key: maybe_pair.key.ok_or_else(|| {
                serde::de::Error::custom("missing key, must be in the format `<key>=<value>`")
            })?,
            value: maybe_pair.value,
        })
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum Behavior {
    #[default]
    Create,
    Merge,
    Replace,
}

impl fmt::Display for Behavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Merge => write!(f, "merge"),
            Self::Replace => write!(f, "replace"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeMeta<V, K> {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<V>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<K>,
}

impl<V, K> Default for TypeMeta<V, K>
where
    V: Default,
    K: Default,
{
    fn default() -> Self {
        Self {
            api_version: Some(V::default()),
            kind: Some(K::default()),
        }
    }
}

pub mod kind {
    use super::define_symbol;

    define_symbol!(Kustomization = "Kustomization");
    define_symbol!(ConfigMapGenerator = "ConfigMapGenerator");
    define_symbol!(SecretGenerator = "SecretGenerator");
    define_symbol!(ImageTagTransformer = "ImageTagTransformer");
}

pub mod apiversion {
    use super::define_symbol;

    define_symbol!(V1Beta1 = "kustomize.config.k8s.io/v1beta1");
    define_symbol!(Builtin = "builtin");
}

/// Defines a unit type that (de)serializes as exactly one string, so that a mismatched
/// `kind` or `apiVersion` fails to parse.
macro_rules! define_symbol {
    ($name:ident = $value:literal) => {
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
        pub struct $name;

        impl $name {
            pub const VALUE: &'static str = $value;
        }

        impl ::core::fmt::Debug for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                f.write_str(Self::VALUE)
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                f.write_str(Self::VALUE)
            }
        }

        impl ::serde::Serialize for $name {
            fn serialize<S: ::serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(Self::VALUE)
            }
        }

        impl<'de> ::serde::Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: ::serde::Deserializer<'de>,
            {
                let found: $crate::manifest::Str = ::serde::Deserialize::deserialize(deserializer)?;
                if found != Self::VALUE {
                    return Err(<D::Error as ::serde::de::Error>::custom(format_args!(
                        "expected `{}`, found `{found}`",
                        Self::VALUE
                    )));
                }
                Ok($name)
            }
        }
    };
}

use define_symbol;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_generators_and_images() -> anyhow::Result<()> {
        let kustomization: Kustomization = crate::yaml::from_str(
            r#"
apiVersion: kustomize.config.k8s.io/v1beta1
kind: Kustomization
namespace: ignored
configMapGenerator:
- name: app
  literals:
  - key=value
  files:
  - app.properties
  - renamed=other.properties
  env: legacy.env
  options:
    labels:
      local: "true"
secretGenerator:
- name: creds
  type: kubernetes.io/tls
- name: custom
  type: example.com/thing
generatorOptions:
  disableNameSuffixHash: true
images:
- name: nginx
  newTag: "1.3"
"#,
        )?;

        let cm = &kustomization.config_map_generators[0];
        assert_eq!(cm.args.name, "app");
        assert_eq!(
            cm.args.sources.literals[0],
            KeyValuePair {
                key: "key".into(),
                value: "value".into()
            }
        );
        assert_eq!(cm.args.sources.files[0].key, None);
        assert_eq!(cm.args.sources.files[1].key.as_deref(), Some("renamed"));
        assert_eq!(&*cm.args.sources.envs, [PathBuf::from("legacy.env")]);
        assert_eq!(cm.options.labels["local"], "true");

        assert_eq!(kustomization.secret_generators[0].ty, SecretType::Tls);
        assert_eq!(
            kustomization.secret_generators[1].ty,
            SecretType::Other("example.com/thing".into())
        );
        assert_eq!(
            kustomization.generator_options.disable_name_suffix_hash,
            Some(true)
        );
        assert_eq!(kustomization.images[0].new_tag, "1.3");
        Ok(())
    }

    #[test]
    fn literal_without_key_is_rejected() {
        let err = crate::yaml::from_str::<Kustomization>(
            r#"
configMapGenerator:
- name: app
  literals:
  - novalue
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("missing key"), "{err}");
    }

    #[test]
    fn wrong_kind_is_rejected() {
        let err = crate::yaml::from_str::<Kustomization>("kind: Component\n").unwrap_err();
        assert!(
            err.to_string().contains("expected `Kustomization`"),
            "{err}"
        );
    }

    #[test]
    fn merge_options_layers_local_over_global() {
        let global = GeneratorOptions {
            labels: IndexMap::from_iter([("team".into(), "infra".into())]),
            disable_name_suffix_hash: Some(true),
            ..Default::default()
        };
        let local = GeneratorOptions {
            labels: IndexMap::from_iter([("team".into(), "web".into())]),
            annotations: IndexMap::from_iter([("note".into(), "x".into())]),
            disable_name_suffix_hash: Some(false),
            immutable: true,
        };

        let merged = global.merge(&local);
        assert_eq!(merged.labels["team"], "web");
        assert_eq!(merged.annotations["note"], "x");
        assert_eq!(merged.disable_name_suffix_hash, Some(false));
        assert!(merged.immutable);

        assert_eq!(global.merge(&GeneratorOptions::default()), global);
    }
}
