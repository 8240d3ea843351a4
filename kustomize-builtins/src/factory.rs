use std::{path::Path, sync::LazyLock};

use anyhow::{Context, bail, ensure};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use indexmap::{IndexMap, map::Entry};
use regex::Regex;
use serde_json::Value;

use crate::{
    PathExt,
    loader::Loader,
    manifest::{GeneratorArgs, GeneratorOptions, KeyValuePairSources, SecretType, Str},
    resource::{Gvk, Metadata, Object, ResId, Resource},
};

static CONFIG_MAP_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[-._a-zA-Z0-9]+$").expect("valid config map key regex"));

/// Checks `key` is usable as a ConfigMap or Secret data key.
pub fn validate_data_key(key: &str) -> anyhow::Result<()> {
    ensure!(
        key.len() <= 253 && CONFIG_MAP_KEY.is_match(key),
        "`{key}` is not a valid key name: must consist of alphanumeric characters, `-`, `_` or `.`"
    );
    ensure!(key != "." && key != "..", "`{key}` is not a valid key name");
    Ok(())
}

/// Constructs resources, either generated from key/value sources or parsed from documents.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResourceFactory(());

impl ResourceFactory {
    pub fn new() -> Self {
        Self::default()
    }

    #[tracing::instrument(skip_all, fields(name = %args.name))]
    pub fn make_config_map(
        &self,
        loader: &dyn Loader,
        options: &GeneratorOptions,
        args: &GeneratorArgs,
    ) -> anyhow::Result<Resource> {
        let mut data = Object::new();
        let mut binary_data = Object::new();
        for (key, value) in collect_sources(loader, &args.sources)? {
            match String::from_utf8(value) {
                Ok(text) => {
                    data.insert(key.to_string(), Value::String(text));
                }
                Err(err) => {
                    let encoded = BASE64.encode(err.into_bytes());
                    binary_data.insert(key.to_string(), Value::String(encoded));
                }
            }
        }

        let mut root = Object::from_iter([("data".into(), Value::Object(data))]);
        if !binary_data.is_empty() {
            root.insert("binaryData".into(), Value::Object(binary_data));
        }
        self.make_generated(Gvk::core_v1("ConfigMap"), options, args, root)
    }

    #[tracing::instrument(skip_all, fields(name = %args.name))]
    pub fn make_secret(
        &self,
        loader: &dyn Loader,
        options: &GeneratorOptions,
        args: &GeneratorArgs,
        ty: &SecretType,
    ) -> anyhow::Result<Resource> {
        let data = collect_sources(loader, &args.sources)?
            .into_iter()
            .map(|(key, value)| (key.to_string(), Value::String(BASE64.encode(value))))
            .collect::<Object>();
        let root = Object::from_iter([
            ("type".into(), Value::String(ty.to_string())),
            ("data".into(), Value::Object(data)),
        ]);
        self.make_generated(Gvk::core_v1("Secret"), options, args, root)
    }

    /// Parses a `---` separated stream of resource documents.
    pub fn from_bytes(&self, bytes: &[u8]) -> anyhow::Result<Vec<Resource>> {
        crate::yaml::from_slice_multi(bytes)
    }

    fn make_generated(
        &self,
        gvk: Gvk,
        options: &GeneratorOptions,
        args: &GeneratorArgs,
        mut root: Object,
    ) -> anyhow::Result<Resource> {
        if options.immutable {
            root.insert("immutable".into(), Value::Bool(true));
        }

        let resource = Resource::new(
            ResId {
                gvk,
                name: args.name.clone(),
                namespace: args.namespace.clone(),
            },
            Metadata {
                name: args.name.clone(),
                namespace: args.namespace.clone(),
                labels: options.labels.clone(),
                annotations: options.annotations.clone(),
                ..Default::default()
            },
            root,
        )?;

        if options.disable_name_suffix_hash.unwrap_or(false) {
            Ok(resource)
        } else {
            resource.with_name_suffix_hash()
        }
    }
}

/// Gathers env file, literal and file sources, in that order, as raw bytes keyed by data key.
fn collect_sources(
    loader: &dyn Loader,
    sources: &KeyValuePairSources,
) -> anyhow::Result<IndexMap<Str, Vec<u8>>> {
    let mut pairs: Vec<(Str, Vec<u8>)> = vec![];

    for path in &sources.envs {
        let contents = loader.load_to_string(path)?;
        let env = parse_env_file(&contents)
            .with_context(|| format!("parsing env file {}", path.pretty()))?;
        pairs.extend(env.into_iter().map(|(key, value)| (key, value.into_bytes())));
    }

    for kv in &sources.literals {
        pairs.push((kv.key.clone(), unquote(&kv.value).as_bytes().to_vec()));
    }

    for kv in &sources.files {
        let path = Path::new(kv.value.as_str());
        let key = match &kv.key {
            Some(key) => key.clone(),
            None => path
                .file_name()
                .map(|name| Str::from(name.to_string_lossy().as_ref()))
                .with_context(|| format!("cannot derive a key from file path {}", path.pretty()))?,
        };
        pairs.push((key, loader.load(path)?));
    }

    let mut collected = IndexMap::with_capacity(pairs.len());
    for (key, value) in pairs {
        validate_data_key(&key)?;
        match collected.entry(key) {
            Entry::Occupied(entry) => bail!("duplicate key `{}` in generator sources", entry.key()),
            Entry::Vacant(entry) => {
                entry.insert(value);
            }
        }
    }

    Ok(collected)
}

/// Literal values may be wrapped in a single pair of matching quotes.
fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if let Some(inner) = value
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return inner;
        }
    }
    value
}

/// Parses `KEY=VALUE` lines. Blank lines and `#` comments are skipped, and a line without
/// `=` takes its value from the process environment.
fn parse_env_file(contents: &str) -> anyhow::Result<Vec<(Str, String)>> {
    let contents = contents.strip_prefix('\u{feff}').unwrap_or(contents);
    let mut pairs = vec![];
    for (lineno, line) in contents.lines().enumerate() {
        let line = line.trim_start();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let (key, value) = match line.split_once('=') {
            Some((key, value)) => (key, value.to_string()),
            None => (line, std::env::var(line).unwrap_or_default()),
        };
        if key.chars().any(char::is_whitespace) {
            bail!("line {}: key `{key}` must not contain whitespace", lineno + 1);
        }
        pairs.push((key.into(), value));
    }
    Ok(pairs)
}
