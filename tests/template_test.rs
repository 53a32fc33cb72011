use bpfman_catalog::bundle::fbc::TemplateEntry;
use bpfman_catalog::bundle::{catalog_entry_name, BundleInfo, BundleMetadata, FbcTemplate};
use bpfman_catalog::error::ErrorKind;
use std::collections::HashSet;

fn bundle(tag: &str, version: &str, build_date: &str, digest_fill: char) -> BundleMetadata {
    BundleMetadata {
        image: format!("quay.io/demo/demo-operator-bundle:{}", tag),
        digest: format!("sha256:{}", digest_fill.to_string().repeat(64)),
        tag: tag.to_string(),
        version: version.to_string(),
        build_date: build_date.to_string(),
        pr_title: None,
        git_commit: None,
    }
}

fn channel_names(template: &FbcTemplate) -> Vec<(String, Option<String>)> {
    template
        .channel()
        .unwrap()
        .entries
        .iter()
        .map(|e| (e.name.clone(), e.replaces.clone()))
        .collect()
}

#[test]
fn test_two_bundle_chain() {
    // newest first, as listing returns them
    let bundles = vec![
        bundle("v1.1-bbbbbbbb", "1.1", "2025-02-01", 'b'),
        bundle("v1.0-aaaaaaaa", "1.0", "2025-01-01", 'a'),
    ];
    let template = FbcTemplate::chain("demo-operator", &bundles, "preview").unwrap();

    let first = "demo-operator.v1.0-gaaaaaaaa-2025-01-01T0000".to_string();
    let second = "demo-operator.v1.1-gbbbbbbbb-2025-02-01T0000".to_string();
    assert_eq!(
        channel_names(&template),
        vec![(first.clone(), None), (second, Some(first))]
    );

    let package = template.package().unwrap();
    assert_eq!(package.name, "demo-operator");
    assert_eq!(package.default_channel, "preview");

    let images = template.bundle_images();
    assert_eq!(images.len(), 2);
    assert!(images[0].ends_with(&format!("@sha256:{}", "a".repeat(64))));
}

#[test]
fn test_chain_is_idempotent() {
    let bundles = vec![
        bundle("v0.5.7-1234567890ab", "0.5.7", "2025-10-03T08:15:00Z", 'c'),
        bundle("v0.5.6-abcdef012345", "0.5.6", "2025-10-02T12:05:37Z", 'd'),
        bundle("v0.5.5-0f0f0f0f0f0f", "0.5.5", "2025-09-30T23:59:59Z", 'e'),
    ];
    let a = FbcTemplate::chain("bpfman-operator", &bundles, "").unwrap().to_yaml().unwrap();
    let b = FbcTemplate::chain("bpfman-operator", &bundles, "").unwrap().to_yaml().unwrap();
    assert_eq!(a, b);
    assert!(a.contains("name: preview"));
}

#[test]
fn test_chain_is_strictly_linear() {
    let bundles: Vec<BundleMetadata> = (1..=6)
        .rev()
        .map(|i| bundle(&format!("v0.{i}.0-{i:08}"), &format!("0.{i}.0"), &format!("2025-0{i}-15T10:30:00Z"), 'f'))
        .collect();
    let template = FbcTemplate::chain("bpfman-operator", &bundles, "stable").unwrap();
    let entries = channel_names(&template);

    assert_eq!(entries.len(), 6);
    assert!(entries[0].1.is_none());
    for i in 1..entries.len() {
        assert_eq!(entries[i].1.as_deref(), Some(entries[i - 1].0.as_str()));
    }
    let replaced: Vec<&String> = entries.iter().filter_map(|(_, r)| r.as_ref()).collect();
    let unique: HashSet<&&String> = replaced.iter().collect();
    assert_eq!(unique.len(), replaced.len());
    assert!(entries[0].0.ends_with("-2025-01-15T1030"));
}

#[test]
fn test_every_channel_entry_has_a_bundle() {
    let bundles = vec![
        bundle("v1.1-bbbbbbbb", "1.1", "2025-02-01", 'b'),
        bundle("v1.0-aaaaaaaa", "1.0", "2025-01-01", 'a'),
    ];
    let template = FbcTemplate::chain("demo-operator", &bundles, "preview").unwrap();
    let bundle_names: HashSet<String> = template
        .entries
        .iter()
        .filter_map(|e| match e {
            TemplateEntry::Bundle(b) => b.name.clone(),
            _ => None,
        })
        .collect();
    for (name, _) in channel_names(&template) {
        assert!(bundle_names.contains(&name), "{name} has no bundle entry");
    }
}

#[test]
fn test_missing_build_date_is_not_invented() {
    let meta = bundle("v1.0-aaaaaaaa", "1.0", "", 'a');
    assert_eq!(catalog_entry_name("demo-operator", &meta), "demo-operator.v1.0-gaaaaaaaa");
    let short = bundle("v1.0-aaaaaaaa", "1.0", "2025-01", 'a');
    assert_eq!(catalog_entry_name("demo-operator", &short), "demo-operator.v1.0-gaaaaaaaa");
}

#[test]
fn test_single_bundle_template() {
    let info = BundleInfo {
        name: "bpfman-operator.v0.5.6".to_string(),
        package: "bpfman-operator".to_string(),
    };
    let template = FbcTemplate::single("quay.io/a/bundle:v0.5.6", &info, "").unwrap();
    assert_eq!(channel_names(&template), vec![("bpfman-operator.v0.5.6".to_string(), None)]);
    assert_eq!(template.channel().unwrap().name, "preview");

    let yaml = template.to_yaml().unwrap();
    assert!(yaml.contains("schema: olm.template.basic"));
    assert_eq!(FbcTemplate::from_yaml(&yaml).unwrap(), template);
}

#[test]
fn test_empty_inputs_rejected() {
    let err = FbcTemplate::chain("demo-operator", &[], "preview").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let info = BundleInfo {
        name: "x".to_string(),
        package: "p".to_string(),
    };
    assert!(FbcTemplate::single("", &info, "preview").is_err());
}
