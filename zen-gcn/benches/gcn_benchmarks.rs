use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::time::Duration;
use zen_gcn::gnn::data::generate_random_graph;
use zen_gcn::gnn::{karate, GCNModel, GCNTrainer, TrainingConfig};
use zen_gcn::AggregationMethod;

/// GCN benchmarks
///
/// - forward pass on the karate graph for each reducer
/// - forward pass on larger seeded random graphs
/// - the full 30-epoch karate training run

fn benchmark_karate_forward(c: &mut Criterion) {
    let graph = karate::karate_club_graph().unwrap();
    let mut group = c.benchmark_group("karate_forward");

    for aggregation in [AggregationMethod::Sum, AggregationMethod::Mean, AggregationMethod::Max] {
        let model = GCNModel::builder().aggregation(aggregation).build().unwrap();
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{:?}", aggregation).to_lowercase()),
            &model,
            |b, model| b.iter(|| black_box(model.predict(black_box(&graph)).unwrap())),
        );
    }

    group.finish();
}

fn benchmark_random_graph_forward(c: &mut Criterion) {
    let mut group = c.benchmark_group("random_graph_forward");

    for &(num_nodes, num_edges) in &[(100, 500), (1_000, 5_000), (5_000, 25_000)] {
        let graph = generate_random_graph(num_nodes, num_edges, 16, 7).unwrap();
        let model = GCNModel::builder()
            .node_dimensions(16)
            .hidden_dimensions(16)
            .output_dimensions(4)
            .build()
            .unwrap();

        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}n_{}e", num_nodes, num_edges)),
            &graph,
            |b, graph| b.iter(|| black_box(model.predict(graph).unwrap())),
        );
    }

    group.finish();
}

fn benchmark_karate_training(c: &mut Criterion) {
    let graph = karate::karate_club_graph().unwrap();
    let labeled = karate::default_labeled_nodes();

    c.bench_function("karate_training_30_epochs", |b| {
        b.iter(|| {
            let mut model = GCNModel::new().unwrap();
            let mut trainer = GCNTrainer::new(TrainingConfig::default()).unwrap();
            black_box(trainer.train(&mut model, &graph, &labeled).unwrap())
        })
    });
}

criterion_group!(
    name = benches;
    config = Criterion::default()
        .warm_up_time(Duration::from_secs(2))
        .measurement_time(Duration::from_secs(10))
        .sample_size(50);
    targets = benchmark_karate_forward, benchmark_random_graph_forward, benchmark_karate_training
);
criterion_main!(benches);
