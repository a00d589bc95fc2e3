use anyhow::{anyhow, Context, Result};
use clap::Parser;
use env_logger::Builder;
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn, LevelFilter};
use plotters::prelude::*;
use plotters_bitmap::BitMapBackend;
use rayon::prelude::*;
use simulation_common::{ConservedRecord, Snapshot};
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Command-line arguments for the visualizer
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Snapshot archive written by the engine (bincode, `<prefix>_snapshots.bin`)
    #[arg(short, long)]
    input: PathBuf,

    /// Optional conserved-quantity log (`<prefix>.csv`) for the energy plot
    #[arg(short, long)]
    conserved: Option<PathBuf>,

    /// Directory the PNG frames are written to
    #[arg(short, long, default_value = "frames")]
    output_dir: PathBuf,

    /// Width of each frame in pixels
    #[arg(long, default_value_t = 800)]
    width: u32,

    /// Height of each frame in pixels
    #[arg(long, default_value_t = 800)]
    height: u32,

    /// Half-width of the plotted xy window in simulation length units
    #[arg(long, default_value_t = 200.0)]
    extent: f64,

    /// Chunk size for parallel processing
    #[arg(long, default_value_t = 10)]
    chunk_size: usize,
}

const BACKGROUND: RGBColor = RGBColor(8, 8, 24);
const TRACER_RADIUS: i32 = 1;
const CENTER_RADIUS: i32 = 4;

fn frame_path(dir: &Path, index: u32) -> PathBuf {
    dir.join(format!("frame_{:05}.png", index))
}

/// Draws the xy projection of one snapshot; galaxy centers are highlighted.
fn draw_frame(snapshot: &Snapshot, path: &Path, width: u32, height: u32, extent: f64) -> Result<()> {
    let root = BitMapBackend::new(path, (width, height)).into_drawing_area();
    root.fill(&BACKGROUND)
        .map_err(|e| anyhow!("Failed to clear frame {}: {}", snapshot.index, e))?;

    let mut chart = ChartBuilder::on(&root)
        .margin(5)
        .build_cartesian_2d(-extent..extent, -extent..extent)
        .map_err(|e| anyhow!("Failed to set up frame {}: {}", snapshot.index, e))?;

    let tracers = snapshot
        .positions
        .iter()
        .zip(&snapshot.masses)
        .filter(|(_, &m)| m == 0.0)
        .map(|(p, _)| Circle::new((p.x, p.y), TRACER_RADIUS, WHITE.mix(0.7).filled()));
    chart
        .draw_series(tracers)
        .map_err(|e| anyhow!("Failed to draw tracers of frame {}: {}", snapshot.index, e))?;

    let centers = snapshot
        .massive_indices()
        .map(|i| Circle::new((snapshot.positions[i].x, snapshot.positions[i].y), CENTER_RADIUS, RED.filled()));
    chart
        .draw_series(centers)
        .map_err(|e| anyhow!("Failed to draw centers of frame {}: {}", snapshot.index, e))?;

    root.present()
        .map_err(|e| anyhow!("Failed to write frame '{}': {}", path.display(), e))?;
    Ok(())
}

/// `(time, |E - E0| / |E0|)` for every logged row.
fn energy_error_series(records: &[ConservedRecord]) -> Vec<(f64, f64)> {
    let Some(first) = records.first() else {
        return Vec::new();
    };
    let e0 = first.total_energy();
    let scale = if e0.abs() > 1e-12 { e0.abs() } else { 1.0 };
    records
        .iter()
        .map(|r| (r.time, (r.total_energy() - e0).abs() / scale))
        .collect()
}

fn read_conserved(path: &Path) -> Result<Vec<ConservedRecord>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open conserved log '{}'", path.display()))?;
    let records = reader
        .deserialize()
        .collect::<std::result::Result<Vec<ConservedRecord>, _>>()
        .with_context(|| format!("Failed to parse conserved log '{}'", path.display()))?;
    Ok(records)
}

fn draw_energy_plot(records: &[ConservedRecord], path: &Path, width: u32, height: u32) -> Result<()> {
    let series = energy_error_series(records);
    if series.len() < 2 {
        warn!("Conserved log has fewer than two rows; skipping energy plot.");
        return Ok(());
    }
    let t_end = series.last().map(|&(t, _)| t).unwrap_or(1.0).max(f64::EPSILON);
    let max_error = series.iter().map(|&(_, e)| e).fold(0.0, f64::max).max(1e-16);

    let root = BitMapBackend::new(path, (width, height)).into_drawing_area();
    root.fill(&WHITE).map_err(|e| anyhow!("Failed to clear energy plot: {}", e))?;
    let mut chart = ChartBuilder::on(&root)
        .margin(10)
        .build_cartesian_2d(0.0..t_end, 0.0..max_error * 1.1)
        .map_err(|e| anyhow!("Failed to set up energy plot: {}", e))?;
    chart
        .draw_series(LineSeries::new(series, &BLUE))
        .map_err(|e| anyhow!("Failed to draw energy plot: {}", e))?;
    root.present()
        .map_err(|e| anyhow!("Failed to write energy plot '{}': {}", path.display(), e))?;

    info!("Maximum relative energy error {:.3e}; plot saved to {}", max_error, path.display());
    Ok(())
}

fn main() -> Result<()> {
    Builder::from_default_env().filter(None, LevelFilter::Info).init();

    let args = Args::parse();
    run_with_args(args)
}

fn run_with_args(args: Args) -> Result<()> {
    info!("Starting Simulation Visualizer...");
    info!("Input file: {}", args.input.display());
    info!("Frame dimensions: {}x{}, xy window ±{}", args.width, args.height, args.extent);

    fs::create_dir_all(&args.output_dir)
        .with_context(|| format!("Failed to create output directory '{}'", args.output_dir.display()))?;

    if let Some(conserved_path) = &args.conserved {
        let records = read_conserved(conserved_path)?;
        info!("Loaded {} conserved-quantity rows from {}", records.len(), conserved_path.display());
        draw_energy_plot(&records, &args.output_dir.join("energy.png"), args.width, args.height)?;
    }

    let file = File::open(&args.input)
        .with_context(|| format!("Failed to open snapshot archive '{}'", args.input.display()))?;
    let snapshots: Vec<Snapshot> = bincode::deserialize_from(BufReader::new(file))
        .with_context(|| format!("Failed to decode snapshot archive '{}'", args.input.display()))?;
    info!("Found {} snapshots in the file", snapshots.len());

    if snapshots.is_empty() {
        warn!("Input file contains no snapshots. Exiting.");
        return Ok(());
    }
    info!(
        "First snapshot: t = {}, {} particles ({} massive)",
        snapshots[0].time,
        snapshots[0].particle_count(),
        snapshots[0].massive_indices().count()
    );

    let progress_bar = ProgressBar::new(snapshots.len() as u64);
    progress_bar.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} frames ({percent}%) [{eta}]")
            .context("Invalid progress bar template")?
            .progress_chars("#>-"),
    );

    let start_time = Instant::now();
    for chunk in snapshots.chunks(args.chunk_size.max(1)) {
        chunk
            .par_iter()
            .map(|snapshot| {
                let path = frame_path(&args.output_dir, snapshot.index);
                draw_frame(snapshot, &path, args.width, args.height, args.extent)
            })
            .collect::<Result<Vec<()>>>()?;
        progress_bar.inc(chunk.len() as u64);
    }
    progress_bar.finish_with_message(format!("Rendered {} frames", snapshots.len()));

    let duration = start_time.elapsed();
    info!(
        "Rendering completed in {:.2?} ({:.1} frames per second)",
        duration,
        snapshots.len() as f64 / duration.as_secs_f64()
    );
    info!("Frames saved to: {}", args.output_dir.display());
    Ok(())
}
