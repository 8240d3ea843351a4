use std::path::Path;

use anyhow::Context;
use kustomize_builtins::LoadRestrictor;

datatest_stable::harness! {
    { test = test, root = "tests/kustomize-builtins/testdata", pattern = r".*/kustomization.yaml" },
}

fn test(path: &Path) -> datatest_stable::Result<()> {
    let dir = path.parent().context("kustomization path has no parent")?;

    match kustomize_builtins::build(path, LoadRestrictor::RootOnly) {
        Ok(resources) => {
            let actual = resources.to_yaml()?;
            snapshot(&dir.join("expected.yaml"), &actual)?;
        }
        Err(err) => {
            let actual = format!("{err:#}");
            let expected_path = dir.join("expected.stderr");
            if !expected_path.exists() {
                let message = format!("unexpected error building {}: {actual}", path.display());
                return Err(message.into());
            }

            let expected =
                std::fs::read_to_string(&expected_path).context("reading expected error")?;
            if !actual.contains(expected.trim()) {
                return Err(format!(
                    "error for {} does not contain `{}`:\n{actual}",
                    path.display(),
                    expected.trim()
                )
                .into());
            }
        }
    }
    Ok(())
}

/// Compares documents structurally so that formatting and quoting differences in the snapshot
/// are not significant.
fn snapshot(path: &Path, actual: &str) -> datatest_stable::Result<()> {
    if !path.exists() || std::env::var("UPDATE_SNAPSHOTS").is_ok() {
        std::fs::write(path, actual).context("writing snapshot")?;
        return Ok(());
    }

    let expected = std::fs::read_to_string(path).context("reading snapshot")?;
    if documents(&expected)? == documents(actual)? {
        return Ok(());
    }

    let formatted = format_chunks(dissimilar::diff(&expected, actual));
    eprintln!("Snapshot mismatch for {}:\n{}", path.display(), formatted);

    Err(format!("Snapshot mismatch for {}", path.display()).into())
}

fn documents(s: &str) -> anyhow::Result<Vec<serde_yaml::Value>> {
    use serde::Deserialize;

    serde_yaml::Deserializer::from_str(s)
        .map(serde_yaml::Value::deserialize)
        .filter(|document| !matches!(document, Ok(serde_yaml::Value::Null)))
        .collect::<Result<_, _>>()
        .context("parsing yaml documents")
}

fn format_chunks(chunks: Vec<dissimilar::Chunk<'_>>) -> String {
    let mut buf = String::new();
    for chunk in chunks {
        let formatted = match chunk {
            dissimilar::Chunk::Equal(text) => text.into(),
            dissimilar::Chunk::Delete(text) => format!("\x1b[4m\x1b[31m{text}\x1b[0m"),
            dissimilar::Chunk::Insert(text) => format!("\x1b[4m\x1b[32m{text}\x1b[0m"),
        };
        buf.push_str(&formatted);
    }
    buf
}
