mod config;

use core::fmt;
use std::{ops::Deref, str::FromStr};

use anyhow::{Context as _, bail};
use serde::{Deserialize, Serialize};
use serde_json::{Value, map::Entry};

pub use self::config::TransformerConfig;

use crate::{
    manifest::Str,
    resource::{GvkMatcher, Object, Resource},
};

/// A location within resources of the matched types that a transformer may modify.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    #[serde(flatten)]
    pub matcher: GvkMatcher,
    #[serde(with = "crate::serde_ex::string")]
    pub path: FieldPath,
    /// The `create` field indicates whether the field should be created if it does not exist.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub create: bool,
}

#[derive(Clone, PartialEq, Eq)]
pub struct FieldPath {
    segments: Box<[FieldPathSegment]>,
}

impl fmt::Debug for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, r#""{self}""#)
    }
}

impl Deref for FieldPath {
    type Target = [FieldPathSegment];

    fn deref(&self) -> &Self::Target {
        &self.segments
    }
}

type PathRef<'a> = &'a [FieldPathSegment];

impl FromStr for FieldPath {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            bail!("field path cannot be empty");
        }

        let segments = s
            .split('/')
            .map(|segment| segment.parse::<FieldPathSegment>())
            .collect::<Result<Box<_>, _>>()
            .with_context(|| format!("invalid field path `{s}`"))?;
        Ok(FieldPath { segments })
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                write!(f, "/")?;
            }
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldPathSegment {
    Field(Str),
    Array(Str),
}

impl fmt::Display for FieldPathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldPathSegment::Field(field) => write!(f, "{field}"),
            FieldPathSegment::Array(field) => write!(f, "{field}[]"),
        }
    }
}

impl FromStr for FieldPathSegment {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let segment = match s.strip_suffix("[]") {
            Some(field) => FieldPathSegment::Array(field.into()),
            None => FieldPathSegment::Field(s.into()),
        };

        match &segment {
            FieldPathSegment::Field(field) | FieldPathSegment::Array(field)
                if field.is_empty() =>
            {
                bail!("empty field path segment")
            }
            _ => Ok(segment),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldSpecs {
    specs: Vec<FieldSpec>,
}

impl Deref for FieldSpecs {
    type Target = [FieldSpec];

    fn deref(&self) -> &Self::Target {
        &self.specs
    }
}

impl From<Vec<FieldSpec>> for FieldSpecs {
    fn from(specs: Vec<FieldSpec>) -> Self {
        Self { specs }
    }
}

#[derive(Debug)]
pub struct Conflict {
    pub conflicts_with: Box<FieldSpec>,
    pub field_spec: Box<FieldSpec>,
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cannot add field spec `{}` `{}` because it conflicts with existing field spec `{}` `{}`",
            self.field_spec.matcher,
            self.field_spec.path,
            self.conflicts_with.matcher,
            self.conflicts_with.path
        )
    }
}

impl std::error::Error for Conflict {}

impl FieldSpecs {
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    pub fn merge(&mut self, other: FieldSpecs) -> Result<(), Conflict> {
        for spec in other.specs {
            self.add(spec)?;
        }

        Ok(())
    }

    /// Adds `spec` unless an identical spec is already present. A spec for the same types and
    /// path that disagrees on `create` is a conflict.
    pub fn add(&mut self, spec: FieldSpec) -> Result<(), Conflict> {
        match self
            .specs
            .iter()
            .find(|s| s.matcher == spec.matcher && s.path == spec.path)
        {
            Some(existing) if existing.create == spec.create => Ok(()),
            Some(existing) => Err(Conflict {
                conflicts_with: Box::new(existing.clone()),
                field_spec: Box::new(spec),
            }),
            None => {
                self.specs.push(spec);
                Ok(())
            }
        }
    }

    pub fn apply<T: JsonValue>(
        &self,
        resource: &mut Resource,
        mut f: impl FnMut(&mut T) -> anyhow::Result<()>,
    ) -> anyhow::Result<()> {
        for spec in &self.specs {
            spec.apply(resource, &mut f)?;
        }

        Ok(())
    }
}

impl FieldSpec {
    pub fn apply<T>(
        &self,
        resource: &mut Resource,
        f: &mut impl FnMut(&mut T) -> anyhow::Result<()>,
    ) -> anyhow::Result<()>
    where
        T: JsonValue,
    {
        if !self.matcher.matches(resource.gvk()) {
            return Ok(());
        }

        let id = resource.id().clone();
        walk(resource.root_mut(), &self.path, f, self.create).with_context(|| {
            format!(
                "applying field spec `{}` `{}` to resource {id}",
                self.matcher, self.path,
            )
        })
    }
}

fn walk<T: JsonValue>(
    obj: &mut Object,
    path: PathRef<'_>,
    f: &mut impl FnMut(&mut T) -> anyhow::Result<()>,
    create: bool,
) -> anyhow::Result<()> {
    let Some((segment, rest)) = path.split_first() else {
        return Ok(());
    };

    match segment {
        FieldPathSegment::Field(field) => {
            let value = match obj.entry(field.as_str()) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(_) if !create => return Ok(()),
                Entry::Vacant(entry) if rest.is_empty() => entry.insert(T::default().into_value()),
                Entry::Vacant(entry) => entry.insert(Value::Object(Object::new())),
            };
            descend(value, field, rest, f, create)
        }
        FieldPathSegment::Array(field) => match obj.get_mut(field.as_str()) {
            None | Some(Value::Null) => Ok(()),
            Some(Value::Array(items)) => {
                for item in items {
                    descend(item, field, rest, f, create)?;
                }
                Ok(())
            }
            Some(_) => {
                bail!("expected a sequence at `{field}` but found a value of different type")
            }
        },
    }
}

fn descend<T: JsonValue>(
    value: &mut Value,
    field: &str,
    rest: PathRef<'_>,
    f: &mut impl FnMut(&mut T) -> anyhow::Result<()>,
    create: bool,
) -> anyhow::Result<()> {
    if rest.is_empty() {
        return f(T::try_as_mut(value)?);
    }

    match value {
        Value::Null => Ok(()),
        Value::Object(obj) => walk(obj, rest, f, create),
        _ => bail!("expected an object value at `{field}`"),
    }
}

pub trait JsonValue: Default {
    fn try_as_mut(value: &mut Value) -> anyhow::Result<&mut Self>;

    fn into_value(self) -> Value
    where
        Self: Sized;
}

impl JsonValue for Value {
    fn try_as_mut(value: &mut Value) -> anyhow::Result<&mut Self> {
        Ok(value)
    }

    fn into_value(self) -> Value {
        self
    }
}

impl JsonValue for String {
    fn try_as_mut(value: &mut Value) -> anyhow::Result<&mut Self> {
        match value {
            Value::String(s) => Ok(s),
            _ => bail!("expected a string but found a different type"),
        }
    }

    fn into_value(self) -> Value {
        Value::String(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(yaml: &str) -> FieldSpec {
        crate::yaml::from_str(yaml).unwrap()
    }

    fn deployment() -> Resource {
        crate::yaml::from_str(
            r#"
apiVersion: apps/v1
kind: Deployment
metadata:
  name: web
spec:
  template:
    spec:
      containers:
      - name: a
        image: nginx:1.2
      - name: b
        image: redis
"#,
        )
        .unwrap()
    }

    #[test]
    fn parse_and_display_path() -> anyhow::Result<()> {
        let path = "spec/template/spec/containers[]/image".parse::<FieldPath>()?;
        assert_eq!(path.len(), 5);
        assert_eq!(
            path[3],
            FieldPathSegment::Array("containers".into())
        );
        assert_eq!(path.to_string(), "spec/template/spec/containers[]/image");

        assert!("".parse::<FieldPath>().is_err());
        assert!("spec//image".parse::<FieldPath>().is_err());
        Ok(())
    }

    #[test]
    fn apply_visits_every_array_item() -> anyhow::Result<()> {
        let mut resource = deployment();
        let mut seen = vec![];
        spec("path: spec/template/spec/containers[]/image").apply::<String>(
            &mut resource,
            &mut |image| {
                seen.push(image.clone());
                Ok(())
            },
        )?;
        assert_eq!(seen, ["nginx:1.2", "redis"]);
        Ok(())
    }

    #[test]
    fn apply_respects_matcher_and_missing_fields() -> anyhow::Result<()> {
        let mut resource = deployment();
        let mut calls = 0;
        spec("kind: Pod\npath: spec/template/spec/containers[]/image").apply::<String>(
            &mut resource,
            &mut |_| {
                calls += 1;
                Ok(())
            },
        )?;
        spec("path: spec/missing/field").apply::<String>(&mut resource, &mut |_| {
            calls += 1;
            Ok(())
        })?;
        assert_eq!(calls, 0);
        Ok(())
    }

    #[test]
    fn apply_creates_missing_fields() -> anyhow::Result<()> {
        let mut resource = deployment();
        spec("path: spec/selector/app\ncreate: true").apply::<String>(
            &mut resource,
            &mut |value| {
                *value = "web".into();
                Ok(())
            },
        )?;
        assert_eq!(resource.root()["spec"]["selector"]["app"], "web");
        Ok(())
    }

    #[test]
    fn merge_dedups_and_detects_conflicts() {
        let mut specs = FieldSpecs::from(vec![spec("path: spec/containers[]/image")]);
        specs
            .merge(FieldSpecs::from(vec![spec("path: spec/containers[]/image")]))
            .unwrap();
        assert_eq!(specs.len(), 1);

        let err = specs
            .add(spec("path: spec/containers[]/image\ncreate: true"))
            .unwrap_err();
        assert!(err.to_string().contains("conflicts"), "{err}");
    }
}
