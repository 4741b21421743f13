//! # Pipeline Benchmarks
//!
//! Performance benchmarks for reflow-core table operations.
//!
//! Run with: `cargo bench -p reflow-core`

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use reflow_core::{
    Attribute, FieldId, FlowPolicy, Flows, Record, Rule, Ruleset, Table, Tracer, UnitMap,
    VdOptions, parse_vd,
};
use std::hint::black_box;

const FUEL_RULE_COUNT: usize = 50;

fn flow(attribute: Attribute, process: &str, commodity: &str, value: f64) -> Record {
    Record::new()
        .with_attribute(attribute)
        .with(FieldId::Scenario, "Kea")
        .with(FieldId::Process, process)
        .with(FieldId::Commodity, commodity)
        .with(FieldId::Period, "2030")
        .with_value(value)
}

/// A table of N output rows cycling through the rule vocabulary.
fn labelled_table(size: usize) -> Table {
    let records = (0..size)
        .map(|i| {
            flow(
                Attribute::Output,
                &format!("PROC{}", i % 200),
                &format!("COM{}", i % FUEL_RULE_COUNT),
                1.0,
            )
        })
        .collect();
    Table::from_records(records)
}

/// One mutate rule per commodity in the vocabulary.
fn fuel_ruleset() -> Ruleset {
    let rules = (0..FUEL_RULE_COUNT)
        .map(|i| {
            Rule::mutate()
                .when(FieldId::Commodity, format!("COM{i}"))
                .set(FieldId::Fuel, format!("Fuel {i}"))
        })
        .collect();
    Ruleset::new("fuels", rules)
}

/// A linear process chain SRC -> C0 -> P0 -> C1 -> ... of the given length.
fn chain_table(length: usize) -> (Table, UnitMap) {
    let mut records = vec![flow(Attribute::Output, "SRC", "C0", 1.0)];
    for i in 0..length {
        let process = format!("P{i}");
        records.push(flow(Attribute::Input, &process, &format!("C{i}"), 1.0));
        records.push(flow(Attribute::Output, &process, &format!("C{}", i + 1), 1.0));
    }

    let mut dd = String::from("SET COM_UNIT\n/\n");
    for i in 0..=length {
        dd.push_str(&format!("'NI'.'C{i}'.'PJ'\n"));
    }
    dd.push_str("/\n");

    (Table::from_records(records), UnitMap::parse(&dd))
}

/// One producer feeding N terminal consumers.
fn fan_table(width: usize) -> (Table, UnitMap) {
    let mut records = vec![flow(Attribute::Output, "SRC", "C0", 1.0)];
    for i in 0..width {
        let process = format!("P{i}");
        records.push(flow(Attribute::Input, &process, "C0", 1.0));
        records.push(flow(Attribute::Output, &process, &format!("D{i}"), 1.0));
    }

    let mut dd = String::from("SET COM_UNIT\n/\n'NI'.'C0'.'PJ'\n");
    for i in 0..width {
        dd.push_str(&format!("'NI'.'D{i}'.'PJ'\n"));
    }
    dd.push_str("/\n");

    (Table::from_records(records), UnitMap::parse(&dd))
}

/// Synthesize a VD export body with N data rows.
fn vd_content(rows: usize) -> String {
    let mut content = String::from(
        "* Dimensions- Attribute;Commodity;Process;Period;Region;Vintage;TimeSlice;UserConstraint;PV\n",
    );
    for i in 0..rows {
        content.push_str(&format!(
            "\"VAR_FOut\",\"COM{}\",\"PROC{}\",\"2030\",\"NI\",\"2030\",\"ANNUAL\",\"-\",\"1.5\"\n",
            i % 40,
            i % 200,
        ));
    }
    content
}

// =============================================================================
// BENCHMARKS
// =============================================================================

fn bench_rule_application(c: &mut Criterion) {
    let mut group = c.benchmark_group("rule_application");
    let ruleset = fuel_ruleset();

    for size in [100, 1000, 10000].iter() {
        let table = labelled_table(*size);

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| black_box(ruleset.apply(table.clone())));
        });
    }

    group.finish();
}

fn bench_group_sum(c: &mut Criterion) {
    let mut group = c.benchmark_group("group_sum");

    for size in [100, 1000, 10000].iter() {
        let table = labelled_table(*size);

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                black_box(table.group_sum(&[
                    FieldId::Process,
                    FieldId::Commodity,
                    FieldId::Period,
                ]))
            });
        });
    }

    group.finish();
}

fn bench_trace_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("trace_chain");
    let policy = FlowPolicy::default();

    for length in [8, 16, 32].iter() {
        let (table, units) = chain_table(*length);

        group.bench_with_input(BenchmarkId::from_parameter(length), length, |b, _| {
            let tracer = Tracer::new(Flows::new(&table, &policy), &units);
            b.iter(|| black_box(tracer.trace("SRC", "Kea", "2030")));
        });
    }

    group.finish();
}

fn bench_trace_fanout(c: &mut Criterion) {
    let mut group = c.benchmark_group("trace_fanout");
    let policy = FlowPolicy::default();

    for width in [10, 100, 1000].iter() {
        let (table, units) = fan_table(*width);

        group.bench_with_input(BenchmarkId::from_parameter(width), width, |b, _| {
            let tracer = Tracer::new(Flows::new(&table, &policy), &units);
            b.iter(|| black_box(tracer.trace("SRC", "Kea", "2030")));
        });
    }

    group.finish();
}

fn bench_vd_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("vd_parse");
    let options = VdOptions::default();

    for rows in [1000, 10000].iter() {
        let content = vd_content(*rows);

        group.bench_with_input(BenchmarkId::from_parameter(rows), rows, |b, _| {
            b.iter(|| black_box(parse_vd(&content, "Kea", &options)));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_rule_application,
    bench_group_sum,
    bench_trace_chain,
    bench_trace_fanout,
    bench_vd_parse,
);

criterion_main!(benches);
