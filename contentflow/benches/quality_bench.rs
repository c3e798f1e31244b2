//! Benchmarks for quality scoring and citation injection.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use contentflow::core::{ExternalReference, JobId};
use contentflow::pipeline::inject_citations;
use contentflow::quality::QualityGate;
use contentflow::testing::sample_artifact;

fn quality_benchmark(c: &mut Criterion) {
    let gate = QualityGate::default();

    let mut group = c.benchmark_group("quality_gate");
    for target in [600_u32, 1500, 3000] {
        let artifact = sample_artifact(JobId::from("bench"), target);
        group.bench_function(format!("score_{target}"), |b| {
            b.iter(|| gate.score(black_box(&artifact), target));
        });
    }
    group.finish();
}

fn citation_benchmark(c: &mut Criterion) {
    let artifact = sample_artifact(JobId::from("bench"), 1500);
    let references: Vec<ExternalReference> = artifact
        .sections
        .iter()
        .map(|section| ExternalReference {
            url: format!("https://example.org/{}", section.heading_text.len()),
            publisher: "Example Research".to_string(),
            context_for_citation: "survey data".to_string(),
            placement_section: section.heading_text.clone(),
        })
        .collect();

    c.bench_function("inject_citations", |b| {
        b.iter(|| {
            let mut sections = artifact.sections.clone();
            inject_citations(&mut sections, black_box(&references));
            sections
        });
    });
}

criterion_group!(benches, quality_benchmark, citation_benchmark);
criterion_main!(benches);
