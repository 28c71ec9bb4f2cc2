//! Criterion benchmarks for tagstore.
//!
//! - Decomposition of a synthetic document into an in-memory store
//! - Reconstruction of the stored document

use std::hint::black_box;

use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use tagstore::config::{GenerateOptions, IngestConfig};
use tagstore::decompose::{Decomposer, xml};
use tagstore::reconstruct::DocumentGenerator;
use tagstore::store::SqliteStore;

/// Generate a document with `sections` sections of a few paragraphs each.
fn generate_document(sections: usize) -> String {
    let words = [
        "markup", "interval", "offset", "token", "parent", "sibling", "document", "attribute",
        "nesting", "buffer", "spool", "index",
    ];

    let mut xml = String::from(r#"<book lang="en">"#);
    for s in 0..sections {
        xml.push_str(&format!(r#"<section n="{s}"><title>Section {s}</title>"#));
        for p in 0..4 {
            xml.push_str("<p>");
            for w in 0..20 {
                xml.push_str(words[(s * 7 + p * 3 + w) % words.len()]);
                xml.push(' ');
                if w == 10 {
                    xml.push_str("<b>bold</b> <br/>");
                }
            }
            xml.push_str("</p>");
        }
        xml.push_str("</section>");
    }
    xml.push_str("</book>");
    xml
}

fn decompose(markup: &str) -> SqliteStore {
    let store = SqliteStore::open_in_memory().unwrap();
    let mut decomposer = Decomposer::new(store, &IngestConfig::default()).unwrap();
    decomposer.start_document(Some("bench.xml")).unwrap();
    xml::feed(markup.as_bytes(), &mut decomposer).unwrap();
    decomposer.end_document().unwrap();
    decomposer.close().unwrap();
    decomposer.into_store()
}

fn bench_decompose(c: &mut Criterion) {
    let markup = generate_document(100);
    let mut group = c.benchmark_group("decompose");
    group.throughput(Throughput::Bytes(markup.len() as u64));
    group.bench_function("100_sections", |b| {
        b.iter(|| decompose(black_box(&markup)))
    });
    group.finish();
}

fn bench_reconstruct(c: &mut Criterion) {
    let store = decompose(&generate_document(100));
    let generator = DocumentGenerator::new(&store);
    let compact = GenerateOptions::default();
    let pretty = GenerateOptions::pretty(2).exclude("b");

    let mut group = c.benchmark_group("reconstruct");
    group.bench_function("compact", |b| {
        b.iter(|| generator.reconstruct(black_box(1), &compact).unwrap())
    });
    group.bench_function("pretty", |b| {
        b.iter(|| generator.reconstruct(black_box(1), &pretty).unwrap())
    });
    group.finish();
}

criterion_group!(benches, bench_decompose, bench_reconstruct);
criterion_main!(benches);
