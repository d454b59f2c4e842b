//! End-to-end tests of the refinement and decimation pipelines

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tinsimp_core::{BoundingBox, CellExtent, CellId, CellJob, Error, Grid, TerrainPoint};
use tinsimp_io::Record;
use tinsimp_pipeline::{
    CellScheduler, DecimationProcessor, ProcessorConfig, RefinementProcessor, SchedulerConfig,
};
use tinsimp_simplification::{DecimationConfig, RefinementConfig, RefinementStrategy, Tin};

fn scheduler_config(workers: usize) -> SchedulerConfig {
    SchedulerConfig::default()
        .with_max_workers(workers)
        .with_poll_interval(Duration::from_millis(2))
}

fn processor(workers: usize, refinement: RefinementConfig) -> RefinementProcessor<Vec<u8>> {
    let config = ProcessorConfig::default()
        .with_refinement(refinement)
        .with_scheduler(scheduler_config(workers));
    RefinementProcessor::new(config, Vec::new()).unwrap()
}

fn run_lines(processor: &mut RefinementProcessor<Vec<u8>>, lines: &[&str]) {
    for line in lines {
        processor.process_line(line).unwrap();
    }
}

/// Group output vertices by the cell-end line that closes their batch
fn batches(output: &str) -> Vec<(CellId, Vec<TerrainPoint>)> {
    let mut result = Vec::new();
    let mut current = Vec::new();
    for line in output.lines() {
        match Record::parse(line).unwrap() {
            Record::Vertex(p) => current.push(p),
            Record::CellEnd(cell) => result.push((cell, std::mem::take(&mut current))),
            _ => assert!(current.is_empty(), "header inside a batch: {}", line),
        }
    }
    assert!(current.is_empty(), "vertices without a cell-end line");
    result
}

fn job(cell: CellId, points: Vec<TerrainPoint>) -> CellJob {
    CellJob {
        cell,
        extent: CellExtent {
            min_x: cell.x as f64,
            min_y: cell.y as f64,
            size: 1.0,
        },
        points,
        end_line: format!("x {}", cell),
    }
}

#[test]
fn test_concurrency_ceiling() {
    let current = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let (c, p) = (Arc::clone(&current), Arc::clone(&peak));

    let mut scheduler = CellScheduler::new(scheduler_config(3), Vec::new(), move |job: &CellJob| {
        let now = c.fetch_add(1, Ordering::SeqCst) + 1;
        p.fetch_max(now, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(15));
        c.fetch_sub(1, Ordering::SeqCst);
        Ok(job.points.clone())
    })
    .unwrap();

    for i in 0..12 {
        scheduler
            .submit(job(CellId::new(i, 0), vec![TerrainPoint::new(i as f64 + 0.5, 0.5, 1.0)]))
            .unwrap();
        assert!(scheduler.live() <= 3);
    }
    let stats = scheduler.finish().unwrap();

    assert!(peak.load(Ordering::SeqCst) <= 3);
    assert!(stats.peak_live <= 3);
    assert_eq!(stats.dispatched, 12);
    assert_eq!(stats.completed, 12);
    assert!(stats.stalls > 0);

    let out = String::from_utf8(scheduler.into_sink().unwrap()).unwrap();
    assert_eq!(batches(&out).len(), 12);
}

#[test]
fn test_batches_never_interleave() {
    let mut scheduler = CellScheduler::new(scheduler_config(2), Vec::new(), |job: &CellJob| {
        thread::sleep(Duration::from_millis(1 + (job.cell.x % 3) as u64));
        Ok(job.points.clone())
    })
    .unwrap();

    for i in 0..20 {
        let cell = CellId::new(i, i % 4);
        let count = if i % 2 == 0 { 3 } else { 2 };
        let points = (0..count)
            .map(|k| TerrainPoint::new(i as f64 + 0.1 * (k + 1) as f64, (i % 4) as f64 + 0.5, k as f64))
            .collect();
        scheduler.submit(job(cell, points)).unwrap();
    }
    let out = String::from_utf8(scheduler.into_sink().unwrap()).unwrap();

    let batches = batches(&out);
    assert_eq!(batches.len(), 20);
    for (cell, vertices) in batches {
        let expected = if cell.x % 2 == 0 { 3 } else { 2 };
        assert_eq!(vertices.len(), expected);
        for v in vertices {
            assert_eq!(v.x.floor() as usize, cell.x);
            assert_eq!(v.y.floor() as usize, cell.y);
        }
    }
}

#[test]
fn test_worker_failure_is_reported_on_submit() {
    let mut scheduler = CellScheduler::new(scheduler_config(1), Vec::new(), |job: &CellJob| {
        if job.cell.x == 0 {
            Err(Error::InvalidData("corrupt cell".to_string()))
        } else {
            Ok(job.points.clone())
        }
    })
    .unwrap();
    scheduler.submit(job(CellId::new(0, 0), Vec::new())).unwrap();

    // The second submit has to wait for the first cell and sees its failure
    let err = scheduler.submit(job(CellId::new(1, 0), Vec::new())).unwrap_err();
    match err {
        Error::WorkerFailed { cell, message } => {
            assert_eq!(cell, CellId::new(0, 0));
            assert!(message.contains("corrupt cell"));
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert!(scheduler.into_sink().unwrap().is_empty());
}

#[test]
fn test_single_cell_peak() {
    let mut p = processor(2, RefinementConfig::default().with_threshold(0.2));
    run_lines(
        &mut p,
        &["n 3", "c 1", "s 10", "b 0 0 10 10", "v 1 1 0", "v 9 1 0", "v 5 5 5", "x 0 0"],
    );
    let (summary, out) = p.finish().unwrap();
    assert_eq!(summary.points, 3);
    assert_eq!(summary.cells_finalized, 1);

    let out = String::from_utf8(out).unwrap();
    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(&lines[..4], &["n 3", "c 1", "s 10", "b 0 0 10 10"]);
    assert_eq!(lines.last(), Some(&"x 0 0"));
    assert!(lines.contains(&"v 5 5 5"));

    let (cell, vertices) = batches(&out).remove(0);
    assert_eq!(cell, CellId::new(0, 0));
    let tin = Tin::from_points(&vertices).unwrap();
    for p in [
        TerrainPoint::new(1.0, 1.0, 0.0),
        TerrainPoint::new(9.0, 1.0, 0.0),
        TerrainPoint::new(5.0, 5.0, 5.0),
    ] {
        assert!(tin.error_at(&p).unwrap() < 0.2);
    }
}

#[test]
fn test_empty_cell_is_echoed() {
    let mut p = processor(2, RefinementConfig::default());
    run_lines(&mut p, &["c 2", "s 5", "b 0 0 10 10", "x 1 1", "v 2 2 1", "x 0 0"]);
    let (summary, out) = p.finish().unwrap();
    assert_eq!(summary.empty_cells, 1);

    let out = String::from_utf8(out).unwrap();
    let batches = batches(&out);
    assert_eq!(batches[0], (CellId::new(1, 1), Vec::new()));
    // A single point is reproduced exactly by the seeded corners
    assert_eq!(batches[1].0, CellId::new(0, 0));
    assert_eq!(batches[1].1.len(), 4);
    assert!(batches[1].1.iter().all(|v| v.z == 1.0));
}

#[test]
fn test_grid_violations_are_surfaced() {
    let mut p = processor(1, RefinementConfig::default());
    run_lines(&mut p, &["c 2", "s 5", "b 0 0 10 10", "v 1 1 1", "x 0 0"]);

    assert!(matches!(
        p.process_line("x 0 0"),
        Err(Error::DuplicateFinalize { cell }) if cell == CellId::new(0, 0)
    ));
    assert!(matches!(
        p.process_line("v 2 2 2"),
        Err(Error::PointAfterFinalize { .. })
    ));
    assert!(matches!(
        p.process_line("v 11 2 2"),
        Err(Error::OutOfBounds { .. })
    ));
    assert!(matches!(
        p.process_line("x 2 0"),
        Err(Error::CellOutOfRange { .. })
    ));
    // A point on the maximum edge belongs to the last cell
    p.process_line("v 10 10 1").unwrap();
    p.process_line("x 1 1").unwrap();
    p.finish().unwrap();
}

#[test]
fn test_sprinkle_points_pass_through() {
    let config = ProcessorConfig::default()
        .with_scheduler(scheduler_config(2))
        .with_expect_sprinkle(true);
    let mut p = RefinementProcessor::new(config, Vec::new()).unwrap();
    run_lines(
        &mut p,
        &[
            "c 1",
            "s 10",
            "b 0 0 10 10",
            "v 0.5 0.5 3",
            "v 9.5 9.5 4",
            "x 0 0",
            "# endsprinkle",
            "v 5 5 1",
            "x 0 0",
        ],
    );
    let (summary, out) = p.finish().unwrap();
    assert_eq!(summary.sprinkle_lines, 3);
    assert_eq!(summary.points, 1);

    let out = String::from_utf8(out).unwrap();
    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(&lines[..6], &["c 1", "s 10", "b 0 0 10 10", "v 0.5 0.5 3", "v 9.5 9.5 4", "x 0 0"]);
    assert_eq!(lines.last(), Some(&"x 0 0"));
}

fn synthetic_stream(seed: u64, dimension: usize, cell_size: f64, per_cell: usize) -> (Vec<String>, Vec<TerrainPoint>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let extent = dimension as f64 * cell_size;
    let mut lines = vec![
        format!("n {}", dimension * dimension * per_cell),
        format!("c {}", dimension),
        format!("s {}", cell_size),
        format!("b 0 0 {} {}", extent, extent),
    ];
    let mut points = Vec::new();
    for gy in 0..dimension {
        for gx in 0..dimension {
            for _ in 0..per_cell {
                let x = gx as f64 * cell_size + rng.gen_range(0.0..cell_size);
                let y = gy as f64 * cell_size + rng.gen_range(0.0..cell_size);
                let z = 12.0 * (x / 37.0).sin() * (y / 23.0).cos() + 0.01 * x;
                lines.push(format!("v {} {} {}", x, y, z));
                points.push(TerrainPoint::new(x, y, z));
            }
            lines.push(format!("x {} {}", gx, gy));
        }
    }
    (lines, points)
}

#[test]
fn test_multi_cell_stream_within_threshold() {
    let threshold = 0.5;
    let (lines, points) = synthetic_stream(99, 3, 40.0, 400);

    for strategy in [RefinementStrategy::TriangleScan, RefinementStrategy::LazyRecheck] {
        let mut p = processor(
            3,
            RefinementConfig::default()
                .with_threshold(threshold)
                .with_strategy(strategy),
        );
        let input = lines.join("\n");
        p.run(input.as_bytes()).unwrap();
        let (summary, out) = p.finish().unwrap();
        assert_eq!(summary.cells_finalized, 9);
        assert_eq!(summary.scheduler.completed, 9);

        let out = String::from_utf8(out).unwrap();
        let cells: HashMap<CellId, Vec<TerrainPoint>> = batches(&out).into_iter().collect();
        assert_eq!(cells.len(), 9);

        let grid = Grid::new(BoundingBox::new(0.0, 0.0, 120.0, 120.0).unwrap(), 3, 40.0).unwrap();
        let tins: HashMap<CellId, Tin> = cells
            .iter()
            .map(|(cell, vertices)| (*cell, Tin::from_points(vertices).unwrap()))
            .collect();
        for point in &points {
            let cell = grid.cell_of(point.x, point.y).unwrap();
            let error = tins[&cell].error_at(point).unwrap();
            assert!(error < threshold, "{:?}: error {} in cell {}", strategy, error, cell);
        }

        let written: usize = cells.values().map(Vec::len).sum();
        assert_eq!(written, summary.scheduler.vertices_written);
        assert!(written < points.len());
    }
}

#[test]
fn test_decimation_stream() {
    let mut rng = StdRng::seed_from_u64(8);
    let mut input = String::from("b 0 0 30 30\n");
    let corners = [(0.0, 0.0), (30.0, 0.0), (0.0, 30.0), (30.0, 30.0)];
    for (x, y) in corners {
        input.push_str(&format!("v {} {} 0\n", x, y));
    }
    let n = 300;
    for i in 0..n {
        let x: f64 = rng.gen_range(0.5..29.5);
        let y: f64 = rng.gen_range(0.5..29.5);
        input.push_str(&format!("v {} {} {}\n", x, y, 2.0 * (x / 6.0).sin()));
        input.push_str(&format!("x {} []\n", i + 5));
    }

    let config = DecimationConfig::default().with_threshold(0.25).with_batch_size(100);
    let mut processor = DecimationProcessor::new(config, Vec::new()).unwrap();
    processor.run(input.as_bytes()).unwrap();
    let (_, stats, out) = processor.finish().unwrap();

    assert_eq!(stats.received, n + 4);
    assert!(stats.removed > 0);
    assert_eq!(stats.written_vertices, n + 4 - stats.removed);

    let out = String::from_utf8(out).unwrap();
    let vertex_lines = out.lines().filter(|l| l.starts_with("v ")).count();
    let face_lines = out.lines().filter(|l| l.starts_with("f ")).count();
    assert_eq!(vertex_lines, stats.written_vertices);
    assert_eq!(face_lines, stats.written_faces);
    for corner in ["v 0 0 0", "v 30 0 0", "v 0 30 0", "v 30 30 0"] {
        assert!(out.lines().any(|l| l == corner));
    }
}
