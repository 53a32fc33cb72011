use bpfman_catalog::bundle::{catalog_entry_name, BundleMetadata, FbcTemplate};
use bpfman_catalog::config::CatalogConfig;
use bpfman_catalog::manifests::{CatalogMetadata, ManifestGenerator};
use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;

fn bundles(n: usize) -> Vec<BundleMetadata> {
    (0..n)
        .map(|i| BundleMetadata {
            image: format!("quay.io/demo/demo-operator-bundle:v0.{}.0-{:012x}", i, i * 7919),
            digest: format!("sha256:{:064x}", i + 1),
            tag: format!("v0.{}.0-{:012x}", i, i * 7919),
            version: format!("0.{}.0", i),
            build_date: format!("2025-{:02}-{:02}T10:30:00Z", i % 12 + 1, i % 28 + 1),
            pr_title: None,
            git_commit: None,
        })
        .collect()
}

fn bench_templates(c: &mut Criterion) {
    let list = bundles(50);

    c.bench_function("catalog entry name", |b| {
        b.iter(|| catalog_entry_name(black_box("demo-operator"), black_box(&list[7])))
    });

    c.bench_function("chain template (50 bundles)", |b| {
        b.iter(|| {
            let template = FbcTemplate::chain("demo-operator", black_box(&list), "preview").unwrap();
            template.to_yaml().unwrap()
        })
    });
}

fn bench_manifests(c: &mut Criterion) {
    let generator = ManifestGenerator::new(&CatalogConfig::default());
    let meta = CatalogMetadata {
        image: format!("quay.io/demo/catalog-ystream@sha256:{:064x}", 42),
        digest: format!("sha256:{:064x}", 42),
        short_digest: "00000000".to_string(),
        catalog_type: "catalog-ystream".to_string(),
        version: "4.19".to_string(),
        default_channel: "stable".to_string(),
        package: "demo-operator".to_string(),
    };

    c.bench_function("manifest set", |b| {
        b.iter(|| generator.generate(black_box(&meta), "bpfman").unwrap())
    });
}

criterion_group!(benches, bench_templates, bench_manifests);
criterion_main!(benches);
