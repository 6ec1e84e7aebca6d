//! End-to-end scenarios against the public API.

use rts_spatial::cell::CellKey;
use rts_spatial::components::{AreaMask, EntityKind, KindFilter, MarkerId, ObstacleId, ReservationMarker, ReservationQuery};
use rts_spatial::config::{SpatialConfig, WorldBounds};
use rts_spatial::error::{ConfigError, SpatialError};
use rts_spatial::formation::{
    FormationDescriptor, FormationPlacementEngine, FormationType, PlacementRequest,
    PROP_UNITS_PER_ROW,
};
use rts_spatial::index::SpatialIndex;
use rts_spatial::search::{SearchRect, TargetSearch};
use rts_test_utils::determinism::verify_determinism;
use rts_test_utils::fixtures::{
    agents_in_line, building_at, fixed, pos, rock, small_world, unit_at, BlockedPathing,
    BoundedPathing, OpenPathing,
};
use rts_test_utils::logging::init_test_tracing;

#[test]
fn test_world_layout_and_basic_search() {
    init_test_tracing();
    let mut index = small_world();
    assert_eq!(index.cell_count(), 100);

    index.add(unit_at(1, 5, 5)).unwrap();
    index.add(unit_at(2, 14, 5)).unwrap();
    assert_eq!(index.locate(pos(5, 5)).unwrap(), CellKey::new(0, 0));

    let hits = index
        .nearest_or_any(&TargetSearch::new(pos(5, 5), fixed(12)).with_min_radius(fixed(1)), |_| true)
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].entity, 2);
    assert_eq!(hits[0].distance_squared, fixed(81));
}

#[test]
fn test_search_filters_and_ordering() {
    let mut index = small_world();
    index.add(unit_at(1, 50, 50)).unwrap();
    index.add(building_at(2, 52, 50)).unwrap();
    index.add(unit_at(3, 56, 50)).unwrap();
    index.add(unit_at(4, 47, 50).hidden()).unwrap();
    index.add(unit_at(5, 90, 90)).unwrap();

    let search = TargetSearch::new(pos(50, 50), fixed(20))
        .with_max_count(10)
        .with_kinds(KindFilter::only(EntityKind::Unit));
    let hits = index.nearest_or_any(&search, |_| true).unwrap();
    let ids: Vec<_> = hits.iter().map(|h| h.entity).collect();
    assert_eq!(ids, vec![1, 3]);

    // Validity test sees every candidate and can veto it.
    let hits = index
        .nearest_or_any(&search, |candidate| candidate.entity != 1)
        .unwrap();
    assert_eq!(hits[0].entity, 3);

    let none = index.nearest_or_any(
        &TargetSearch::new(pos(5, 5), fixed(10)).with_kinds(KindFilter::only(EntityKind::Resource)),
        |_| true,
    );
    assert_eq!(none, Err(SpatialError::TargetNotFound));
}

#[test]
fn test_equal_distance_ties_break_by_id() {
    let mut index = small_world();
    index.add(unit_at(9, 40, 50)).unwrap();
    index.add(unit_at(3, 60, 50)).unwrap();
    index.add(unit_at(6, 50, 40)).unwrap();

    let hits = index
        .nearest_or_any(&TargetSearch::new(pos(50, 50), fixed(15)).with_max_count(2), |_| true)
        .unwrap();
    let ids: Vec<_> = hits.iter().map(|h| h.entity).collect();
    assert_eq!(ids, vec![3, 6]);
}

#[test]
fn test_large_world_distances_stay_exact() {
    let oversized = SpatialIndex::new(SpatialConfig::new(WorldBounds::new(
        (0, 0),
        (100_000, 100_000),
        1000,
    )));
    assert!(matches!(oversized, Err(ConfigError::WorldTooLarge { .. })));

    let mut index = SpatialIndex::new(SpatialConfig::new(WorldBounds::new(
        (0, 0),
        (30_000, 30_000),
        1000,
    )))
    .unwrap();
    index.add(unit_at(1, 29_500, 29_500)).unwrap();
    index.add(unit_at(2, 29_500, 500)).unwrap();

    // Radius far beyond the world; corner-to-corner distances still order correctly.
    let search = TargetSearch::new(pos(500, 500), fixed(90_000)).with_max_count(2);
    let hits = index.nearest_or_any(&search, |_| true).unwrap();
    let ids: Vec<_> = hits.iter().map(|h| h.entity).collect();
    assert_eq!(ids, vec![2, 1]);
    assert_eq!(hits[0].distance_squared, fixed(841_000_000));
    assert_eq!(hits[1].distance_squared, fixed(1_682_000_000));

    index.register_obstacle(rock(1, 29_000, 29_000, 600)).unwrap();
    let far = ReservationQuery::new(pos(500, 500), fixed(2), AreaMask::ALL);
    assert_eq!(index.is_position_reserved(&far), Ok(()));
    let near = ReservationQuery::new(pos(29_300, 29_300), fixed(2), AreaMask::ALL);
    assert_eq!(
        index.is_position_reserved(&near),
        Err(SpatialError::PositionObstacleReserved(ObstacleId(1)))
    );
}

#[test]
fn test_rectangle_selection() {
    let mut index = small_world();
    index.add(unit_at(1, 12, 12)).unwrap();
    index.add(unit_at(2, 28, 28)).unwrap();
    index.add(building_at(3, 20, 20)).unwrap();
    index.add(unit_at(4, 31, 12)).unwrap();

    let rect = SearchRect::from_corners(pos(30, 30), pos(10, 10));
    let units = index
        .search_rectangle(&rect, KindFilter::only(EntityKind::Unit), |_| true)
        .unwrap();
    assert_eq!(units, vec![1, 2]);

    let all = index.search_rectangle(&rect, KindFilter::ANY, |_| true).unwrap();
    assert_eq!(all.len(), 3);

    let outside = SearchRect::from_corners(pos(90, 90), pos(120, 95));
    assert!(matches!(
        index.search_rectangle(&outside, KindFilter::ANY, |_| true),
        Err(SpatialError::CellNotFound { .. })
    ));
}

#[test]
fn test_obstacle_reservation_lifecycle() {
    let mut index = small_world();
    index.register_obstacle(rock(1, 50, 50, 5)).unwrap();

    let query = ReservationQuery::new(pos(50, 50), fixed(1), AreaMask::ALL);
    assert_eq!(
        index.is_position_reserved(&query),
        Err(SpatialError::PositionObstacleReserved(ObstacleId(1)))
    );

    index.on_obstacle_removed(ObstacleId(1)).unwrap();
    assert_eq!(index.is_position_reserved(&query), Ok(()));
    for cell in index.cells() {
        assert!(cell.obstacles().is_empty());
    }
}

#[test]
fn test_explicit_only_obstacle() {
    let mut index = small_world();
    let mut gate = rock(1, 30, 30, 3);
    gate.explicit_commands_only = true;
    index.register_obstacle(gate).unwrap();

    let query = ReservationQuery::new(pos(30, 30), fixed(1), AreaMask::ALL);
    assert!(index.is_position_reserved(&query).is_err());
    assert!(index.is_position_reserved(&query.explicit(false)).is_ok());
}

#[test]
fn test_marker_moves_with_claim() {
    let mut index = small_world();
    index
        .place_marker(ReservationMarker::new(MarkerId(1), pos(20, 20), fixed(2), AreaMask::ALL))
        .unwrap();
    index.move_marker(MarkerId(1), pos(70, 70)).unwrap();

    let old_spot = ReservationQuery::new(pos(20, 20), fixed(1), AreaMask::ALL);
    let new_spot = ReservationQuery::new(pos(70, 70), fixed(1), AreaMask::ALL);
    assert_eq!(index.is_position_reserved(&old_spot), Ok(()));
    assert_eq!(
        index.is_position_reserved(&new_spot),
        Err(SpatialError::PositionMarkerReserved(MarkerId(1)))
    );
}

#[test]
fn test_motion_migration_over_recheck_interval() {
    init_test_tracing();
    let mut index = small_world();
    index.add(unit_at(1, 5, 5).moving()).unwrap();
    assert!(index.is_tracking_motion(CellKey::new(0, 0)));

    index.set_entity_position(1, pos(15, 5)).unwrap();
    assert_eq!(index.tick(), 0);
    assert_eq!(index.cell_of(1), Some(CellKey::new(0, 0)));

    assert_eq!(index.tick(), 1);
    assert_eq!(index.cell_of(1), Some(CellKey::new(10, 0)));
    assert!(!index.is_tracking_motion(CellKey::new(0, 0)));
    assert!(index.is_tracking_motion(CellKey::new(10, 0)));

    // Search sees the entity in its new cell.
    let hits = index
        .nearest_or_any(&TargetSearch::new(pos(15, 5), fixed(1)), |_| true)
        .unwrap();
    assert_eq!(hits[0].entity, 1);

    index.on_motion_stop(1).unwrap();
    assert_eq!(index.active_motion_tasks(), 0);
}

#[test]
fn test_recheck_interval_from_config() {
    let config = SpatialConfig::from_ron_str(
        "(bounds: (lower_left: (0, 0), upper_right: (100, 100), cell_size: 10), motion_recheck_interval: 5)",
    )
    .unwrap();
    let mut index = SpatialIndex::new(config).unwrap();
    index.add(unit_at(1, 5, 5).moving()).unwrap();
    index.set_entity_position(1, pos(25, 5)).unwrap();

    for _ in 0..4 {
        index.tick();
    }
    assert_eq!(index.cell_of(1), Some(CellKey::new(0, 0)));
    index.tick();
    assert_eq!(index.cell_of(1), Some(CellKey::new(20, 0)));
}

#[test]
fn test_lifecycle_hooks() {
    let mut index = small_world();
    index.on_entity_initiated(unit_at(7, 33, 44)).unwrap();
    assert_eq!(index.entity_count(), 1);
    assert_eq!(
        index.on_entity_initiated(unit_at(7, 1, 1)),
        Err(SpatialError::DuplicateId(7))
    );

    let removed = index.on_entity_removed(7).unwrap();
    assert_eq!(removed.position, pos(33, 44));
    assert_eq!(index.on_entity_removed(7), Err(SpatialError::UnknownEntity(7)));
}

#[test]
fn test_formation_avoids_reserved_positions() {
    init_test_tracing();
    let mut index = small_world();
    index.register_obstacle(rock(1, 50, 60, 2)).unwrap();

    let engine =
        FormationPlacementEngine::with_builtin_handlers(BoundedPathing::for_world(&index.bounds()));
    let agents = agents_in_line(6, pos(40, 20), fixed(1));
    let descriptor = FormationDescriptor::new(FormationType::Row).with_int(PROP_UNITS_PER_ROW, 3);
    let request = PlacementRequest::new(&agents, pos(50, 60), &descriptor);

    let placement = engine
        .place(&request, |point| {
            index.is_position_reserved(&ReservationQuery::new(point, fixed(1), AreaMask::ALL))
        })
        .unwrap();

    assert!(placement.is_complete());
    for point in &placement.points {
        assert!(point.distance_squared(pos(50, 60)) > fixed(9));
    }
}

#[test]
fn test_formation_partial_placement() {
    // A 20x20 world only fits a handful of radius-4 agents.
    let index = SpatialIndex::new(SpatialConfig::new(WorldBounds::new((0, 0), (20, 20), 10))).unwrap();
    let engine = FormationPlacementEngine::with_builtin_handlers(BoundedPathing::for_world(&index.bounds()));
    let agents = agents_in_line(12, pos(2, 2), fixed(4));
    let descriptor = FormationDescriptor::new(FormationType::Wedge);
    let request = PlacementRequest::new(&agents, pos(10, 10), &descriptor);

    let placement = engine.place(&request, |_| Ok(())).unwrap();
    assert!(!placement.is_complete());
    assert!(!placement.points.is_empty());
    assert_eq!(placement.missing(), 12 - placement.points.len());
    assert!(matches!(
        placement.shortfall(),
        Some(SpatialError::FormationPlacementFailed { requested: 12, .. })
    ));
}

#[test]
fn test_formation_with_no_walkable_terrain_fails() {
    let engine = FormationPlacementEngine::with_builtin_handlers(BlockedPathing);
    let agents = agents_in_line(3, pos(0, 0), fixed(1));
    let descriptor = FormationDescriptor::new(FormationType::Wedge);
    let request = PlacementRequest::new(&agents, pos(10, 10), &descriptor);

    assert_eq!(
        engine.place(&request, |_| Ok(())),
        Err(SpatialError::FormationPlacementFailed {
            formation: FormationType::Circle,
            requested: 3,
            placed: 0,
        })
    );
}

#[test]
fn test_formation_placement_is_deterministic() {
    let engine = FormationPlacementEngine::with_builtin_handlers(OpenPathing);
    let agents = agents_in_line(15, pos(-30, -40), fixed(1));
    let descriptor = FormationDescriptor::new(FormationType::Circle);
    let request = PlacementRequest::new(&agents, pos(25, 35), &descriptor);

    let first = engine.place(&request, |_| Ok(())).unwrap();
    let second = engine.place(&request, |_| Ok(())).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.points.len(), 15);
}

#[test]
fn test_moving_crowd_replays_identically() {
    let result = verify_determinism(
        4,
        60,
        || {
            let mut index = small_world();
            for id in 0..25_u64 {
                let offset = i32::try_from(id).unwrap();
                index.add(unit_at(id, 2 + offset * 3, 50).moving()).unwrap();
            }
            index
        },
        |index, tick| {
            let step = i32::try_from(tick).unwrap();
            for id in 0..25_u64 {
                let offset = i32::try_from(id).unwrap();
                let x = (2 + offset * 3 + step) % 100;
                let y = (50 + step * (offset % 3)) % 100;
                index.set_entity_position(id, pos(x, y)).unwrap();
            }
            index.tick();
        },
        SpatialIndex::state_hash,
    );
    result.assert_deterministic();
}
