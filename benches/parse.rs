use criterion::{black_box, criterion_group, criterion_main, Criterion};
use opnsense_exporter::pfstats::{InterfaceFilter, StatField, StatsParser};
use std::fmt::Write;

/// Synthetic `pfctl -vvsInterface` output with `count` interface sections.
fn pfctl_output(count: usize) -> String {
    let mut out = String::new();
    for i in 0..count {
        writeln!(out, "vlan0.{i}").unwrap();
        writeln!(out, "\tCleared:     Thu Jan  1 00:00:00 2024").unwrap();
        writeln!(out, "\tReferences:  [ States:  {i}  Rules: 12 ]").unwrap();
        for field in StatField::ALL {
            writeln!(
                out,
                "\t{}:{:<4}[ Packets: {:<18} Bytes: {:<18} ]",
                field,
                "",
                i * 1000,
                i * 150_000
            )
            .unwrap();
        }
    }
    out
}

fn bench_parse(c: &mut Criterion) {
    let parser = StatsParser::new().unwrap();
    let output = pfctl_output(500);

    let few: InterfaceFilter = (0..4)
        .map(|i| (format!("vlan0.{i}"), format!("VLAN{i}")))
        .collect();
    let all: InterfaceFilter = (0..500)
        .map(|i| (format!("vlan0.{i}"), format!("VLAN{i}")))
        .collect();

    c.bench_function("parse 500 sections, 4 interesting", |b| {
        b.iter(|| parser.parse(black_box(output.as_bytes()), &few).count())
    });
    c.bench_function("parse 500 sections, all interesting", |b| {
        b.iter(|| parser.parse(black_box(output.as_bytes()), &all).count())
    });
}

criterion_group!(benches, bench_parse);
criterion_main!(benches);
