mod realtime;
mod records;

use anyhow::{Context, Result};
use clap::Parser;
use itertools::{Itertools, MinMaxResult};
use mot_rs::{MeasurementBatch, PublishedObjects, TrackerConfig, TrackerNode, TrackingEngine};
use realtime::{CollectingSink, ReplayClock};
use records::TrackRecord;
use std::{
    fs::File,
    path::PathBuf,
    sync::Arc,
    thread,
    time::{Duration, Instant},
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Replay a recorded detection log through the tracking engine
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// The detection log (CSV)
    #[arg(short, long)]
    input: PathBuf,

    /// Tracker configuration (JSON). Defaults are used if not given
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Where to write the published tracks (CSV)
    #[arg(short, long, default_value = "tracks.csv")]
    output: PathBuf,

    /// Override the publish rate of the configuration (Hz)
    #[arg(short, long)]
    publish_rate_hz: Option<f64>,

    /// Run the threaded node against the wall clock instead of simulated ticks
    #[arg(short, long, default_value_t = false)]
    realtime: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("cannot read {}", path.display()))?;
            TrackerConfig::from_json_str(&json)?
        }
        None => TrackerConfig::default(),
    };
    if let Some(rate) = args.publish_rate_hz {
        config.publish_rate_hz = rate;
    }

    let file = File::open(&args.input)
        .with_context(|| format!("cannot open {}", args.input.display()))?;
    let batches = records::read_batches(file)?;

    match batches.iter().map(|batch| batch.timestamp).minmax() {
        MinMaxResult::NoElements => {
            warn!(input = %args.input.display(), "no detections to replay");
            return Ok(());
        }
        MinMaxResult::OneElement(t) => info!(batches = 1, start = t, end = t, "replaying"),
        MinMaxResult::MinMax(start, end) => {
            info!(batches = batches.len(), start, end, "replaying")
        }
    }

    let engine = Arc::new(TrackingEngine::new(config)?);
    let end = batches.last().map_or(0.0, |batch| batch.timestamp);

    let published = if args.realtime {
        replay_realtime(engine.clone(), batches)?
    } else {
        replay_simulated(&engine, batches)?
    };

    let mut writer = csv::Writer::from_path(&args.output)
        .with_context(|| format!("cannot create {}", args.output.display()))?;
    published
        .iter()
        .flat_map(TrackRecord::from_published)
        .try_for_each(|record| writer.serialize(record))?;
    writer.flush()?;

    info!(
        ticks = published.len(),
        output = %args.output.display(),
        "replay finished"
    );
    println!(
        "{}",
        serde_json::to_string_pretty(&engine.diagnostics(end))?
    );

    Ok(())
}

/// Interleave publish ticks at a fixed period of log time with the measurement batches.
fn replay_simulated(
    engine: &TrackingEngine,
    batches: Vec<MeasurementBatch>,
) -> Result<Vec<PublishedObjects>> {
    let period = engine.config().publish_period().as_secs_f64();
    let Some(start) = batches.first().map(|batch| batch.timestamp) else {
        return Ok(vec![]);
    };

    let mut published = Vec::new();
    let mut tick = 0u64;
    let tick_time = |tick: u64| start + tick as f64 * period;

    for batch in batches {
        while tick_time(tick) < batch.timestamp {
            published.push(engine.on_publish_tick(tick_time(tick))?);
            tick += 1;
        }
        process(engine, batch)?;
    }
    published.push(engine.on_publish_tick(tick_time(tick))?);

    Ok(published)
}

/// Feed the batches to a running node at the pace of their timestamps.
fn replay_realtime(
    engine: Arc<TrackingEngine>,
    batches: Vec<MeasurementBatch>,
) -> Result<Vec<PublishedObjects>> {
    let Some(start) = batches.first().map(|batch| batch.timestamp) else {
        return Ok(vec![]);
    };

    let sink = Arc::new(CollectingSink::default());
    let mut node = TrackerNode::spawn(engine, sink.clone(), Arc::new(ReplayClock::new(start)));
    let started = Instant::now();

    for batch in batches {
        let due = Duration::from_secs_f64((batch.timestamp - start).max(0.0));
        if let Some(wait) = due.checked_sub(started.elapsed()) {
            thread::sleep(wait);
        }
        node.submit(batch)?;
    }
    node.stop();

    Ok(sink.take())
}

fn process(engine: &TrackingEngine, batch: MeasurementBatch) -> Result<()> {
    match engine.on_measurement(batch) {
        Ok(_) => Ok(()),
        // rejected batches are skipped, as the node does
        Err(err) if err.is_rejection() => Ok(()),
        Err(err) => {
            error!(%err, "replay aborted");
            Err(err.into())
        }
    }
}
