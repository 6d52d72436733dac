use std::sync::Arc;

use patrol_view_core::{
    AgentId, AgentRenderState, CellCoord, Episode, EpisodeBatch, EnvironmentMetadata, Frame,
    GridMatrix, Position,
};
use patrol_view_system_frame_derivation::{FrameDerivationEngine, FrameSource, LiveFeed};
use serde_json::json;

fn frame_at(x: f32, y: f32) -> Frame {
    Frame {
        agents: vec![agent(0, x, y)],
        ..Frame::default()
    }
}

fn agent(id: u64, x: f32, y: f32) -> AgentRenderState {
    AgentRenderState {
        id: AgentId::Numeric(id),
        position: Position::new(x, y),
        orientation: None,
        battery: 100.0,
        is_charging: false,
    }
}

fn feed_of(points: &[(f32, f32)]) -> LiveFeed {
    let mut feed = LiveFeed::new();
    for (x, y) in points {
        feed.push(frame_at(*x, *y));
    }
    feed
}

#[test]
fn suppresses_consecutive_duplicate_positions() {
    let feed = feed_of(&[(0.0, 0.0), (1.0, 0.0), (1.0, 0.0), (2.0, 2.0)]);
    let mut engine = FrameDerivationEngine::new(Some(EnvironmentMetadata::new(3, 3)));

    assert!(engine.observe(FrameSource::Live(&feed)));

    assert_eq!(
        engine.trajectory().points(),
        &[
            Position::new(0.0, 0.0),
            Position::new(1.0, 0.0),
            Position::new(2.0, 2.0)
        ]
    );
    let stats = engine.route_stats();
    assert_eq!(stats.path_length, 3);
    assert_eq!(stats.step_count, 4);
    assert_eq!(stats.start, Some(Position::new(0.0, 0.0)));
    assert_eq!(stats.end, Some(Position::new(2.0, 2.0)));
}

#[test]
fn unchanged_source_keeps_flattened_list_reference() {
    let feed = feed_of(&[(0.0, 0.0), (1.0, 0.0)]);
    let mut engine = FrameDerivationEngine::default();

    assert!(engine.observe(FrameSource::Live(&feed)));
    let first = Arc::clone(engine.frames());

    assert!(!engine.observe(FrameSource::Live(&feed)));
    assert!(Arc::ptr_eq(&first, engine.frames()));
}

#[test]
fn growing_feed_only_scans_new_frames() {
    let mut feed = feed_of(&[(0.0, 0.0), (1.0, 0.0)]).with_retention(2);
    let mut engine = FrameDerivationEngine::default();
    let _ = engine.observe(FrameSource::Live(&feed));

    // Both earlier frames are evicted, so only an incremental scan still knows (0, 0).
    feed.push(frame_at(1.0, 0.0));
    feed.push(frame_at(1.0, 1.0));
    assert_eq!(feed.evicted(), 2);
    assert!(engine.observe(FrameSource::Live(&feed)));

    let expected = [
        Position::new(0.0, 0.0),
        Position::new(1.0, 0.0),
        Position::new(1.0, 1.0),
    ];
    assert_eq!(engine.trajectory().points(), &expected);
    assert_eq!(
        engine.agent_trajectories()[&AgentId::Numeric(0)].points(),
        &expected
    );
    assert_eq!(engine.route_stats().step_count, 2);
}

#[test]
fn live_frames_are_shared_with_the_feed() {
    let feed = feed_of(&[(0.0, 0.0), (1.0, 0.0), (2.0, 0.0)]);
    let mut engine = FrameDerivationEngine::default();

    assert!(engine.observe(FrameSource::Live(&feed)));

    assert!(std::ptr::eq(engine.frames().as_slice(), feed.frames()));
}

#[test]
fn feed_retention_evicts_the_oldest_frames() {
    let mut feed = LiveFeed::new().with_retention(3);
    for x in 0..5 {
        feed.push(frame_at(x as f32, 0.0));
    }

    assert_eq!(feed.len(), 3);
    assert_eq!(feed.evicted(), 2);
    assert_eq!(
        feed.frames()[0].primary_position(),
        Some(Position::new(2.0, 0.0))
    );

    feed.restart();
    assert_eq!(feed.retention(), 3);
    assert_eq!(feed.evicted(), 0);
    assert!(feed.is_empty());
}

#[test]
fn full_feed_still_reports_new_frames() {
    let mut feed = feed_of(&[(0.0, 0.0), (1.0, 0.0)]).with_retention(2);
    let mut engine = FrameDerivationEngine::default();
    let _ = engine.observe(FrameSource::Live(&feed));

    feed.push(frame_at(2.0, 0.0));
    assert_eq!(feed.len(), 2);
    assert!(engine.observe(FrameSource::Live(&feed)));
    assert!(!engine.observe(FrameSource::Live(&feed)));

    assert_eq!(engine.trajectory().len(), 3);
    assert_eq!(
        engine.latest_frame().and_then(|frame| frame.primary_position()),
        Some(Position::new(2.0, 0.0))
    );
}

#[test]
fn restarting_a_full_feed_rebuilds_trajectories() {
    let mut feed = feed_of(&[(0.0, 0.0), (1.0, 0.0), (2.0, 0.0)]).with_retention(2);
    let mut engine = FrameDerivationEngine::default();
    let _ = engine.observe(FrameSource::Live(&feed));

    feed.restart();
    feed.push(frame_at(7.0, 7.0));
    assert!(engine.observe(FrameSource::Live(&feed)));

    assert_eq!(engine.trajectory().points(), &[Position::new(7.0, 7.0)]);
    assert_eq!(engine.agent_trajectories().len(), 1);
}

#[test]
fn shorter_source_rebuilds_from_scratch() {
    let long = feed_of(&[(0.0, 0.0), (1.0, 0.0), (2.0, 0.0)]);
    let short = feed_of(&[(5.0, 5.0)]);
    let mut engine = FrameDerivationEngine::default();

    let _ = engine.observe(FrameSource::Live(&long));
    let _ = engine.observe(FrameSource::Live(&short));

    assert_eq!(engine.trajectory().points(), &[Position::new(5.0, 5.0)]);
}

#[test]
fn restarted_feed_is_treated_as_a_new_source() {
    let mut feed = feed_of(&[(0.0, 0.0), (1.0, 0.0)]);
    let mut engine = FrameDerivationEngine::default();
    let _ = engine.observe(FrameSource::Live(&feed));

    feed.restart();
    for x in 0..3 {
        feed.push(frame_at(9.0, x as f32));
    }
    let _ = engine.observe(FrameSource::Live(&feed));

    assert_eq!(engine.trajectory().len(), 3);
    assert_eq!(engine.trajectory().first(), Some(Position::new(9.0, 0.0)));
}

#[test]
fn batches_flatten_episodes_in_order() {
    let batch = EpisodeBatch::new(vec![
        Episode::new(vec![frame_at(0.0, 0.0), frame_at(0.0, 1.0)]),
        Episode::new(vec![frame_at(0.0, 2.0)]),
    ]);
    let mut engine = FrameDerivationEngine::default();

    assert!(engine.observe(FrameSource::Batch(&batch)));
    assert_eq!(engine.frames().len(), 3);
    assert_eq!(
        engine.latest_frame().and_then(|frame| frame.primary_position()),
        Some(Position::new(0.0, 2.0))
    );

    let shared = batch.clone();
    assert!(!engine.observe(FrameSource::Batch(&shared)));

    let replacement = EpisodeBatch::new(vec![Episode::new(vec![
        frame_at(3.0, 3.0),
        frame_at(4.0, 3.0),
        frame_at(5.0, 3.0),
    ])]);
    assert!(engine.observe(FrameSource::Batch(&replacement)));
    assert_eq!(engine.trajectory().first(), Some(Position::new(3.0, 3.0)));
}

#[test]
fn tracks_every_agent_separately() {
    let mut feed = LiveFeed::new();
    for step in 0..3 {
        feed.push(Frame {
            agents: vec![agent(1, step as f32, 0.0), agent(2, 4.0, 4.0)],
            ..Frame::default()
        });
    }
    let mut engine = FrameDerivationEngine::default();
    let _ = engine.observe(FrameSource::Live(&feed));

    let trajectories = engine.agent_trajectories();
    assert_eq!(trajectories[&AgentId::Numeric(1)].len(), 3);
    assert_eq!(trajectories[&AgentId::Numeric(2)].len(), 1);
    assert_eq!(engine.trajectory().len(), 3);
}

#[test]
fn grids_fall_back_to_metadata_then_zeros() {
    let mut metadata = EnvironmentMetadata::new(4, 2);
    metadata.threat_grid = Some(GridMatrix::from_rows(vec![vec![0.5; 4], vec![0.0; 4]]));
    let feed = feed_of(&[(0.0, 0.0)]);
    let mut engine = FrameDerivationEngine::new(Some(metadata));
    let _ = engine.observe(FrameSource::Live(&feed));

    assert_eq!(engine.threat_grid().get(0, 0), Some(0.5));
    let coverage = engine.coverage_grid();
    assert_eq!((coverage.width(), coverage.height()), (4, 2));
    assert_eq!(coverage.positive_count(), 0);

    engine.set_metadata(None);
    assert!(engine.coverage_grid().is_empty());
}

#[test]
fn latest_frame_grids_take_priority() {
    let frame = Frame::from_value(&json!({
        "agent_position": [0, 0],
        "coverage_grid": [[1, 1], [0, "1"]],
        "threat_grid": [[0, 1], [0, 0]],
        "recency_grid": [[0.5, 1], [0, 0]],
        "obstacles": [[1, 1]],
    }))
    .expect("frame decodes");
    let mut feed = LiveFeed::new();
    feed.push(frame);

    let mut metadata = EnvironmentMetadata::new(2, 2);
    metadata.threat_grid = Some(GridMatrix::zeros(2, 2));
    metadata.obstacles = vec![CellCoord::new(0, 1)];
    let mut engine = FrameDerivationEngine::new(Some(metadata));
    let _ = engine.observe(FrameSource::Live(&feed));

    assert_eq!(engine.threat_grid().get(1, 0), Some(1.0));
    assert_eq!(engine.recency_grid().and_then(|grid| grid.get(0, 0)), Some(0.5));
    assert_eq!(engine.obstacles(), &[CellCoord::new(1, 1)]);

    let stats = engine.route_stats();
    assert_eq!(stats.visited_tiles, 3);
    assert_eq!(stats.total_tiles, 4);
    assert!((stats.visited_ratio - 75.0).abs() < f32::EPSILON);
}

#[test]
fn stats_without_metadata_report_zero_ratio() {
    let engine = FrameDerivationEngine::default();
    let stats = engine.route_stats();

    assert_eq!(stats.total_tiles, 0);
    assert_eq!(stats.visited_ratio, 0.0);
    assert_eq!(stats.start, None);
}

#[test]
fn clear_cache_resets_derived_state() {
    let feed = feed_of(&[(0.0, 0.0), (1.0, 0.0)]);
    let mut engine = FrameDerivationEngine::default();
    let _ = engine.observe(FrameSource::Live(&feed));

    engine.clear_cache();

    assert!(engine.frames().is_empty());
    assert!(engine.trajectory().is_empty());
    assert!(engine.latest_frame().is_none());
    assert!(engine.observe(FrameSource::Live(&feed)));
    assert_eq!(engine.trajectory().len(), 2);
}

#[test]
fn engine_preview_honours_configured_limit() {
    let points: Vec<(f32, f32)> = (0..10).map(|x| (x as f32, 0.0)).collect();
    let feed = feed_of(&points);
    let mut engine = FrameDerivationEngine::default().with_preview_limit(4);
    let _ = engine.observe(FrameSource::Live(&feed));

    let preview = engine.waypoint_preview();
    assert_eq!(preview.first(), Some(&Position::new(0.0, 0.0)));
    assert_eq!(preview.last(), Some(&Position::new(9.0, 0.0)));
    assert!(preview.len() <= 5);
}
