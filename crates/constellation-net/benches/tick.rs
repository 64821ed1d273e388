use constellation_net::{ConstellationShape, LinkingPolicy, RoutingTable, TopologyBuilder};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use orbital_mechanics::limits::LinkLimits;
use orbital_mechanics::walker::WalkerDelta;
use orbital_mechanics::{ConstellationModel, EarthModel, GeodeticPosition, EARTH_RADIUS_M};

fn starlink_model() -> ConstellationModel {
    let mut model =
        ConstellationModel::new(WalkerDelta::starlink_shell(), EarthModel::default()).unwrap();
    for lat in (-60..=60).step_by(15) {
        for lon in (-180..180).step_by(30) {
            model
                .add_ground(&GeodeticPosition::new(lat as f64, lon as f64).unwrap())
                .unwrap();
        }
    }
    model
}

fn bench_tick(c: &mut Criterion) {
    let model = starlink_model();
    let walker = model.walker().clone();
    let limits =
        LinkLimits::for_shell(walker.semi_major_axis_m, EARTH_RADIUS_M, 100_000.0, 30.0).unwrap();
    let builder = TopologyBuilder::new(
        ConstellationShape::from_walker(&walker),
        LinkingPolicy::default(),
    )
    .unwrap();
    let grounds: Vec<_> = (0..model.ground_count())
        .filter_map(orbital_mechanics::GroundId::from_index)
        .collect();

    c.bench_function("positions_24x66", |b| {
        b.iter(|| model.positions_at(black_box(3_600.0)))
    });

    let snapshot = model.positions_at(3_600.0);
    c.bench_function("plus_grid_topology_24x66", |b| {
        b.iter(|| builder.build_snapshot(black_box(&snapshot), &limits).unwrap())
    });

    let topology = builder.build_snapshot(&snapshot, &limits).unwrap();
    c.bench_function("routing_table_24x66", |b| {
        b.iter(|| RoutingTable::compute(black_box(&topology), grounds.iter().copied()))
    });
}

criterion_group!(benches, bench_tick);
criterion_main!(benches);
