use serde::{Deserialize, de::DeserializeOwned};

pub fn from_str<T>(s: &str) -> anyhow::Result<T>
where
    T: DeserializeOwned,
{
    serde_yaml::from_str(s).map_err(Into::into)
}

pub fn from_slice<T>(s: &[u8]) -> anyhow::Result<T>
where
    T: DeserializeOwned,
{
    serde_yaml::from_slice(s).map_err(Into::into)
}

/// Parses a `---` separated stream, skipping empty documents.
pub fn from_slice_multi<T>(s: &[u8]) -> anyhow::Result<Vec<T>>
where
    T: DeserializeOwned,
{
    let mut out = vec![];
    for document in serde_yaml::Deserializer::from_slice(s) {
        let value = serde_yaml::Value::deserialize(document)?;
        if value.is_null() {
            continue;
        }
        out.push(serde_yaml::from_value(value)?);
    }
    Ok(out)
}

pub fn to_string<T>(value: &T) -> anyhow::Result<String>
where
    T: serde::Serialize,
{
    serde_yaml::to_string(value).map_err(Into::into)
}
