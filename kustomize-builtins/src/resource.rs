mod shorthash;

use std::{fmt, ops::Deref};

use anyhow::{Context, ensure};
use compact_str::format_compact;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::manifest::Str;

pub type Object = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Gvk {
    pub group: Str,
    pub version: Str,
    pub kind: Str,
}

impl Gvk {
    /// A resource in the core (empty) group at `v1`.
    pub fn core_v1(kind: &str) -> Self {
        Gvk {
            group: Str::default(),
            version: "v1".into(),
            kind: kind.into(),
        }
    }
}

impl fmt::Display for Gvk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group.is_empty() {
            write!(f, "{}.{}", self.kind, self.version)
        } else {
            write!(f, "{}.{}.{}", self.kind, self.version, self.group)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct GvkMatcher {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<Str>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<Str>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<Str>,
}

impl fmt::Display for GvkMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(kind) = &self.kind {
            write!(f, "{kind}.")?;
        }

        if let Some(version) = &self.version {
            write!(f, "{version}.")?;
        }

        if let Some(group) = &self.group {
            write!(f, "{group}")
        } else {
            write!(f, "*")
        }
    }
}

impl GvkMatcher {
    pub fn matches(&self, gvk: &Gvk) -> bool {
        self.group.as_ref().is_none_or(|group| *group == gvk.group)
            && self.version.as_ref().is_none_or(|version| *version == gvk.version)
            && self.kind.as_ref().is_none_or(|kind| *kind == gvk.kind)
    }
}

#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ResId {
    pub gvk: Gvk,
    pub name: Str,
    pub namespace: Option<Str>,
}

impl Deref for ResId {
    type Target = Gvk;

    fn deref(&self) -> &Self::Target {
        &self.gvk
    }
}

impl fmt::Debug for ResId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl fmt::Display for ResId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(namespace) = &self.namespace {
            write!(f, "{}/{}.{namespace}", self.gvk, self.name)
        } else {
            write!(f, "{}/{}", self.gvk, self.name)
        }
    }
}

/// A structured resource document. `root` holds every top-level field except `apiVersion`
/// and `kind`, which live in `id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    id: ResId,
    root: Object,
}

impl Resource {
    pub fn new(id: ResId, metadata: Metadata, mut root: Object) -> anyhow::Result<Self> {
        ensure!(
            root.insert("metadata".into(), serde_json::to_value(&metadata)?)
                .is_none(),
            "root must not duplicate metadata"
        );

        Ok(Resource { id, root })
    }

    pub fn id(&self) -> &ResId {
        &self.id
    }

    pub fn name(&self) -> &Str {
        &self.id.name
    }

    pub fn namespace(&self) -> Option<&Str> {
        self.id.namespace.as_ref()
    }

    pub fn gvk(&self) -> &Gvk {
        &self.id.gvk
    }

    pub fn kind(&self) -> &Str {
        &self.id.kind
    }

    pub fn root(&self) -> &Object {
        &self.root
    }

    pub fn root_mut(&mut self) -> &mut Object {
        &mut self.root
    }

    /// Renames the resource, keeping `metadata.name` and the id in sync.
    pub fn set_name(&mut self, name: Str) {
        if let Some(metadata) = self
            .root
            .get_mut("metadata")
            .and_then(|metadata| metadata.as_object_mut())
        {
            metadata.insert(
                "name".into(),
                serde_json::Value::String(name.to_string()),
            );
        }
        self.id.name = name;
    }

    /// Appends `-<hash>` of the resource contents to its name.
    pub fn with_name_suffix_hash(mut self) -> anyhow::Result<Self> {
        let hash = self
            .shorthash()
            .with_context(|| format!("hashing resource `{}`", self.id))?;
        let name = format_compact!("{}-{hash}", self.id.name);
        self.set_name(name);
        Ok(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Metadata {
    pub name: Str,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<Str>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub labels: IndexMap<Str, Str>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub annotations: IndexMap<Str, Str>,
    #[serde(flatten)]
    pub rest: Object,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Res {
    api_version: Str,
    kind: Str,
    metadata: Metadata,
    #[serde(flatten)]
    root: Object,
}

impl Serialize for Resource {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        let api_version = if self.id.gvk.group.is_empty() {
            self.id.gvk.version.clone()
        } else {
            format_compact!("{}/{}", self.id.gvk.group, self.id.gvk.version)
        };

        let mut root = self.root.clone();
        let metadata = root
            .remove("metadata")
            .ok_or_else(|| serde::ser::Error::custom("resource root must contain metadata"))?;
        let metadata = serde_json::from_value(metadata).map_err(serde::ser::Error::custom)?;

        Res {
            api_version,
            kind: self.kind().clone(),
            metadata,
            root,
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Resource {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::de::Deserializer<'de>,
    {
        let res = Res::deserialize(deserializer)
            .map_err(|err| serde::de::Error::custom(format!("parsing resource: {err}")))?;

        let (group, version) = res
            .api_version
            .split_once('/')
            .map_or(("".into(), res.api_version.clone()), |(g, v)| {
                (g.into(), v.into())
            });

        let id = ResId {
            gvk: Gvk {
                group,
                version,
                kind: res.kind,
            },
            name: res.metadata.name.clone(),
            namespace: res.metadata.namespace.clone(),
        };

        Resource::new(id, res.metadata, res.root).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_preserves_identity_and_fields() -> anyhow::Result<()> {
        let resource: Resource = crate::yaml::from_str(
            r#"
apiVersion: apps/v1
kind: Deployment
metadata:
  name: web
  namespace: prod
  labels:
    app: web
spec:
  replicas: 2
"#,
        )?;

        assert_eq!(resource.gvk().group, "apps");
        assert_eq!(resource.gvk().version, "v1");
        assert_eq!(resource.name(), "web");
        assert_eq!(resource.namespace().map(|ns| ns.as_str()), Some("prod"));
        assert_eq!(resource.id().to_string(), "Deployment.v1.apps/web.prod");

        let yaml = crate::yaml::to_string(&resource)?;
        let reparsed: Resource = crate::yaml::from_str(&yaml)?;
        assert_eq!(reparsed, resource);
        Ok(())
    }

    #[test]
    fn set_name_updates_metadata() -> anyhow::Result<()> {
        let mut resource = Resource::new(
            ResId {
                gvk: Gvk::core_v1("ConfigMap"),
                name: "app".into(),
                namespace: None,
            },
            Metadata {
                name: "app".into(),
                ..Default::default()
            },
            Object::new(),
        )?;

        resource.set_name("app-x".into());
        assert_eq!(resource.name(), "app-x");
        assert_eq!(resource.root()["metadata"]["name"], "app-x");
        Ok(())
    }

    #[test]
    fn gvk_matcher_wildcards() {
        let deployment = Gvk {
            group: "apps".into(),
            version: "v1".into(),
            kind: "Deployment".into(),
        };
        let any = GvkMatcher {
            group: None,
            version: None,
            kind: None,
        };
        let pods = GvkMatcher {
            kind: Some("Pod".into()),
            ..any.clone()
        };

        assert!(any.matches(&deployment));
        assert!(!pods.matches(&deployment));
    }
}
