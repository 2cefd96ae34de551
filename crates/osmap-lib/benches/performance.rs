//! Performance benchmarks for osmap-lib
//!
//! Run with: cargo bench --package osmap-lib

use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use osmap_lib::{
    ApiKeyState, Attributes, MapConfigCompiler, PageSession, ResolverChain, Settings, SiteContext,
    SpecifierParser, ViewerIdentity, gridref,
};
use std::hint::black_box;

/// Grid references spread over Great Britain at every supported precision
fn generate_grid_refs(count: usize) -> Vec<String> {
    const SQUARES: [&str; 8] = ["SU", "TG", "NT", "NN", "SD", "TQ", "HP", "SV"];
    (0..count)
        .map(|i| {
            let digits = 1 + i % 5;
            let easting = (i * 7919) % 10usize.pow(digits as u32);
            let northing = (i * 104_729) % 10usize.pow(digits as u32);
            format!(
                "{} {:0width$} {:0width$}",
                SQUARES[i % SQUARES.len()],
                easting,
                northing,
                width = digits
            )
        })
        .collect()
}

fn bench_convert(c: &mut Criterion) {
    let mut group = c.benchmark_group("convert");
    let grid_refs = generate_grid_refs(1_000);
    let pairs: Vec<String> = (0..1_000)
        .map(|i| format!("{:.5},{:.5}", 50.0 + i as f64 * 0.008, -5.0 + i as f64 * 0.006))
        .collect();

    group.throughput(Throughput::Elements(grid_refs.len() as u64));
    group.bench_function("grid_refs_1k", |b| {
        b.iter(|| {
            for text in &grid_refs {
                black_box(gridref::convert(black_box(text)));
            }
        });
    });
    group.bench_function("decimal_pairs_1k", |b| {
        b.iter(|| {
            for text in &pairs {
                black_box(gridref::convert(black_box(text)));
            }
        });
    });
    group.finish();
}

fn bench_specifiers(c: &mut Criterion) {
    let mut group = c.benchmark_group("specifier");
    let site = SiteContext::new("https://example.org").expect("valid site URL");
    let parser = SpecifierParser::new(&site);
    let specifiers: Vec<String> = (0..1_000)
        .map(|i| format!("routes/day{i}.gpx${}!#3366cc;Day {i}; the long way round", i % 4))
        .collect();

    group.throughput(Throughput::Elements(specifiers.len() as u64));
    group.bench_function("parse_routes_1k", |b| {
        b.iter(|| {
            for text in &specifiers {
                black_box(parser.parse(black_box(text), true));
            }
        });
    });
    group.finish();
}

fn bench_compile(c: &mut Criterion) {
    let mut group = c.benchmark_group("compile");
    let settings = Settings {
        apikey_state: ApiKeyState::Good,
        ..Settings::default()
    };
    let site = SiteContext::new("https://example.org").expect("valid site URL");
    let viewer = ViewerIdentity::anonymous();
    let compiler =
        MapConfigCompiler::new(&settings, &site, &viewer).with_resolvers(ResolverChain::default());
    let markers = generate_grid_refs(200).join("|");
    let attrs: Attributes = [
        ("markers".to_string(), markers),
        ("layers".to_string(), "Walks|-Pubs".to_string()),
        ("marker_link".to_string(), "auto".to_string()),
    ]
    .into_iter()
    .collect();

    group.bench_function("inline_markers_200", |b| {
        b.iter(|| {
            let mut session = PageSession::new();
            black_box(compiler.compile(&mut session, black_box(&attrs)))
        });
    });
    group.finish();
}

// ============================================================================
// Criterion Configuration
// ============================================================================

criterion_group!(benches, bench_convert, bench_specifiers, bench_compile);

criterion_main!(benches);
