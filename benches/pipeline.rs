use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use efficiency_recon::{
    analytics::{AnomalyThresholds, analyze},
    config::ReconConfig,
    data::Cell,
    join::{JoinMode, JoinOptions, Suffixes, join},
    pipeline::Pipeline,
    table::Table,
};

const STATIONS: &[&str] = &["A1 組裝", "B2 測試", "C3 包裝", "D4 焊接", "E5 檢驗"];

fn generate_sources(rows: usize) -> (Table, Table) {
    let labor = Table::from_rows(
        vec![
            "工號".into(),
            "姓名".into(),
            "工作內容".into(),
            "作業時間".into(),
            "理論產出".into(),
        ],
        (0..rows)
            .map(|i| {
                vec![
                    Cell::text(format!("E{:05}", i % (rows / 2).max(1))),
                    Cell::text(format!("op{i}")),
                    Cell::text(STATIONS[i % STATIONS.len()]),
                    Cell::text(format!("{}", 20 + i % 30)),
                    Cell::text(format!("{}", 80 + i % 60)),
                ]
            })
            .collect(),
    );
    let output = Table::from_rows(
        vec!["工號".into(), "產出".into(), "RUN總時數".into()],
        (0..rows)
            .map(|i| {
                vec![
                    Cell::text(format!("E{i:05}")),
                    Cell::text(format!("{}", 60 + i % 90)),
                    Cell::text(format!("{:.2}", 0.5 + (i % 8) as f64 / 4.0)),
                ]
            })
            .collect(),
    );
    (labor, output)
}

fn bench_join(c: &mut Criterion) {
    let keys = vec!["工號".to_string()];
    let suffixes = Suffixes::default();
    let mut group = c.benchmark_group("join");
    for rows in [1_000usize, 10_000] {
        let (labor, output) = generate_sources(rows);
        group.bench_with_input(BenchmarkId::new("inner", rows), &rows, |b, _| {
            let options = JoinOptions {
                keys: &keys,
                mode: JoinMode::Inner,
                suffixes: &suffixes,
            };
            b.iter(|| join(&labor, &output, &options).expect("join"));
        });
    }
    group.finish();
}

fn bench_pipeline(c: &mut Criterion) {
    let mut config = ReconConfig::default();
    config.join.keys = vec!["工號".to_string()];
    let (labor, output) = generate_sources(10_000);

    c.bench_function("pipeline_run_10k", |b| {
        b.iter(|| Pipeline::new(&config).run(&labor, &output).expect("run"));
    });

    let run = Pipeline::new(&config).run(&labor, &output).expect("run");
    let filtered = run.filtered_table().clone();
    let thresholds = AnomalyThresholds::default();
    c.bench_function("analyze_filtered_10k", |b| {
        b.iter(|| analyze(&filtered, &thresholds).expect("analyze"));
    });
}

criterion_group!(benches, bench_join, bench_pipeline);
criterion_main!(benches);
