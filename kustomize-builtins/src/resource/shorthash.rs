use std::collections::BTreeMap;

use anyhow::bail;
use serde::Serialize;
use serde_json::Value;

use crate::manifest::Str;

use super::{Object, Resource};

impl Resource {
    /// The kubectl-compatible ten character content hash of a ConfigMap or Secret.
    pub fn shorthash(&self) -> anyhow::Result<Str> {
        let encoded = match self.kind().as_str() {
            "ConfigMap" => encode_config_map(self.root())?,
            "Secret" => encode_secret(self.root())?,
            kind => bail!("cannot hash a resource of kind `{kind}`, expected ConfigMap or Secret"),
        };

        encode_hex(&sha256::digest(html_escape(&encoded).as_str()))
    }
}

// Field order mirrors go's `json.Marshal` of a map, which sorts keys.
#[derive(Serialize)]
struct ConfigMapHashInput {
    #[serde(rename = "binaryData", skip_serializing_if = "Option::is_none")]
    binary_data: Option<Value>,
    data: Value,
    kind: &'static str,
    name: &'static str,
}

#[derive(Serialize)]
struct SecretHashInput {
    data: Value,
    kind: &'static str,
    name: &'static str,
    #[serde(rename = "stringData", skip_serializing_if = "Option::is_none")]
    string_data: Option<Value>,
    #[serde(rename = "type")]
    ty: Value,
}

fn sorted(root: &Object, field: &str) -> anyhow::Result<Option<Value>> {
    let Some(object) = root.get(field).and_then(Value::as_object) else {
        return Ok(None);
    };
    let sorted = object.iter().collect::<BTreeMap<_, _>>();
    Ok(Some(serde_json::to_value(sorted)?))
}

// Generated resources are hashed before they are named, so `name` is empty.
fn encode_config_map(root: &Object) -> anyhow::Result<String> {
    let input = ConfigMapHashInput {
        binary_data: sorted(root, "binaryData")?,
        data: sorted(root, "data")?.unwrap_or_else(|| Value::String(String::new())),
        kind: "ConfigMap",
        name: "",
    };
    Ok(serde_json::to_string(&input)?)
}

fn encode_secret(root: &Object) -> anyhow::Result<String> {
    let input = SecretHashInput {
        data: sorted(root, "data")?.unwrap_or_else(|| Value::String(String::new())),
        kind: "Secret",
        name: "",
        string_data: sorted(root, "stringData")?,
        ty: root
            .get("type")
            .cloned()
            .unwrap_or_else(|| Value::String(String::new())),
    };
    Ok(serde_json::to_string(&input)?)
}

/// Escapes `<`, `>`, `&`, U+2028 and U+2029 the way go's `json.HTMLEscape` does, since
/// kustomize hashes html-escaped json.
fn html_escape(src: &str) -> String {
    let mut out = String::with_capacity(src.len());
    for c in src.chars() {
        match c {
            '<' | '>' | '&' | '\u{2028}' | '\u{2029}' => {
                out.push_str(&format!("\\u{:04x}", c as u32));
            }
            _ => out.push(c),
        }
    }
    out
}

// See kubernetes pkg/kubectl/util/hash/hash.go
fn encode_hex(hex: &str) -> anyhow::Result<Str> {
    if hex.len() < 10 {
        bail!("input hex string must be at least 10 characters long");
    }

    Ok(hex
        .chars()
        .take(10)
        .map(|c| match c {
            '0' => 'g',
            '1' => 'h',
            '3' => 'k',
            'a' => 'm',
            'e' => 't',
            _ => c,
        })
        .collect())
}

#[cfg(test)]
mod tests;
