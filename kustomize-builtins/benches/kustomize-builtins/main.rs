use std::sync::Arc;

use kustomize_builtins::{
    Builtins, MemoryLoader, ResourceFactory, TransformerConfig, manifest::Kustomization,
};

fn main() {
    divan::main();
}

fn kustomization(entries: usize) -> Kustomization {
    let mut yaml = String::from("generatorOptions:\n  labels:\n    team: infra\n");
    yaml.push_str("configMapGenerator:\n");
    for i in 0..entries {
        yaml.push_str(&format!("- name: config-{i}\n  literals:\n  - key=value-{i}\n"));
    }
    yaml.push_str("secretGenerator:\n");
    for i in 0..entries {
        yaml.push_str(&format!("- name: secret-{i}\n  literals:\n  - password=p{i}\n"));
    }
    yaml.push_str("images:\n");
    for i in 0..entries {
        yaml.push_str(&format!("- name: image-{i}\n  newTag: v{i}\n"));
    }
    serde_yaml::from_str(&yaml).unwrap()
}

fn builtins() -> Builtins {
    Builtins::new(Arc::new(MemoryLoader::new("/")), ResourceFactory::new())
}

#[divan::bench(args = [1, 10, 100])]
fn configure_generators(bencher: divan::Bencher<'_, '_>, entries: usize) {
    let kustomization = kustomization(entries);
    let builtins = builtins();
    bencher.bench_local(|| builtins.configure_generators(&kustomization).unwrap());
}

#[divan::bench(args = [1, 10, 100])]
fn configure_transformers(bencher: divan::Bencher<'_, '_>, entries: usize) {
    let kustomization = kustomization(entries);
    let builtins = builtins();
    let config = TransformerConfig::builtin();
    bencher.bench_local(|| {
        builtins
            .configure_transformers(&kustomization, config)
            .unwrap()
    });
}
