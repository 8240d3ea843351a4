use crate::resource::Resource;

fn hash(yaml: &str) -> anyhow::Result<String> {
    let value: serde_json::Value = serde_yaml::from_str(yaml)?;
    let resource: Resource = serde_json::from_value(value)?;
    Ok(resource.shorthash()?.to_string())
}

fn check(cases: &[(&str, &str, &str)]) -> anyhow::Result<()> {
    for (desc, yaml, expected) in cases {
        let actual = hash(yaml)?;
        assert_eq!(*expected, actual, "case `{desc}`");
    }
    Ok(())
}

#[test]
fn config_map_hash() -> anyhow::Result<()> {
    check(&[
        (
            "empty data",
            "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: \"\"\n",
            "6ct58987ht",
        ),
        (
            "one key",
            "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: \"\"\ndata:\n  one: \"\"\n",
            "9g67k2htb6",
        ),
        (
            "three keys are sorted",
            "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: \"\"\ndata:\n  two: 2\n  one: \"\"\n  three: 3\n",
            "7757f9kkct",
        ),
        (
            "one key with binary data",
            "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: \"\"\nbinaryData:\n  one: \"\"\n",
            "6mtk2m274t",
        ),
        (
            "one key each",
            "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: \"\"\ndata:\n  one: \"\"\nbinaryData:\n  two: \"\"\n",
            "698h7c7t9m",
        ),
    ])
}

#[test]
fn secret_hash() -> anyhow::Result<()> {
    check(&[
        (
            "empty data",
            "apiVersion: v1\nkind: Secret\nmetadata:\n  name: \"\"\ntype: my-type\n",
            "5gmgkf8578",
        ),
        (
            "one key",
            "apiVersion: v1\nkind: Secret\nmetadata:\n  name: \"\"\ntype: my-type\ndata:\n  one: \"\"\n",
            "74bd68bm66",
        ),
        (
            "three keys are sorted",
            "apiVersion: v1\nkind: Secret\nmetadata:\n  name: \"\"\ntype: my-type\ndata:\n  two: 2\n  one: \"\"\n  three: 3\n",
            "4gf75c7476",
        ),
        (
            "string data",
            "apiVersion: v1\nkind: Secret\nmetadata:\n  name: \"\"\ntype: my-type\ndata:\n  one: \"\"\nstringData:\n  two: 2\n",
            "c4h4264gdb",
        ),
    ])
}

#[test]
fn other_kinds_cannot_be_hashed() {
    let err = hash("apiVersion: v1\nkind: Pod\nmetadata:\n  name: p\n").unwrap_err();
    assert!(err.to_string().contains("cannot hash"), "{err}");
}

#[test]
fn html_characters_are_escaped() {
    assert_eq!(super::html_escape("a<b>&\u{2028}"), "a\\u003cb\\u003e\\u0026\\u2028");
}

#[test]
fn sorted_orders_keys_and_skips_absent_fields() -> anyhow::Result<()> {
    let root = serde_json::json!({ "data": { "b": "2", "a": "1" }, "binaryData": "x" });
    let root = root.as_object().unwrap();

    let data = super::sorted(root, "data")?.unwrap();
    assert_eq!(serde_json::to_string(&data)?, r#"{"a":"1","b":"2"}"#);
    assert!(super::sorted(root, "stringData")?.is_none());
    // only mappings are hashed as data
    assert!(super::sorted(root, "binaryData")?.is_none());
    Ok(())
}
