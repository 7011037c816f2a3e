use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDate};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

use stride_tracker::calibration::{load_calibration, Calibration, CalibrationEngine, Topology};
use stride_tracker::config::Config;
use stride_tracker::drill::{all_templates, find_template, DrillTemplate};
use stride_tracker::geometry::Point2D;
use stride_tracker::kinematics::{MetricStatistics, PerformanceRecord, TimeOverrides};
use stride_tracker::tracking::{ManualPoint, Track, TrackedFrame, TrackingMode};
use stride_tracker::units::Unit;
use stride_tracker::AnalysisSession;

const CONFIG_PATH: &str = "config.toml";

/// 解析入力。トラックは JSON で渡すか、desktop ビルドなら動画から作る
#[derive(Debug, Deserialize)]
struct AnalysisInput {
    #[serde(default)]
    fps: Option<f64>,
    #[serde(default)]
    calibration_file: Option<PathBuf>,
    #[serde(default)]
    markers: Vec<Point2D>,
    #[serde(default)]
    reference_distance: Option<f64>,
    #[serde(default)]
    unit: Option<Unit>,
    #[serde(default)]
    track: Vec<TrackedFrame>,
    #[serde(default)]
    manual_points: Vec<ManualPoint>,
    #[serde(default)]
    video: Option<PathBuf>,
    #[serde(default)]
    model: Option<PathBuf>,
    /// ネイティブ長に対する割合 [start, end]
    #[serde(default)]
    trim: Option<[f64; 2]>,
    #[serde(default)]
    overrides: TimeOverrides,
    #[serde(default)]
    mass_kg: Option<f64>,
}

struct Args {
    input: PathBuf,
    drill: Option<String>,
    date: Option<NaiveDate>,
    history: Option<PathBuf>,
}

fn parse_args() -> Result<Args> {
    // Usage: analyze <input.json> [--drill NAME] [--date YYYY-MM-DD] [--history records.json]
    let mut args = std::env::args().skip(1);
    let mut input = None;
    let mut drill = None;
    let mut date = None;
    let mut history = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--drill" => drill = Some(args.next().context("--drill needs a name")?),
            "--date" => {
                let s = args.next().context("--date needs YYYY-MM-DD")?;
                date = Some(
                    NaiveDate::parse_from_str(&s, "%Y-%m-%d")
                        .with_context(|| format!("Invalid date {}", s))?,
                );
            }
            "--history" => history = Some(PathBuf::from(args.next().context("--history needs a path")?)),
            _ if input.is_none() => input = Some(PathBuf::from(arg)),
            other => bail!("Unexpected argument: {}", other),
        }
    }

    let input = input.context("Usage: analyze <input.json> [--drill NAME] [--date YYYY-MM-DD] [--history records.json]")?;
    Ok(Args {
        input,
        drill,
        date,
        history,
    })
}

fn build_calibration(input: &AnalysisInput, drill: Option<&DrillTemplate>) -> Result<Option<Calibration>> {
    if let Some(path) = &input.calibration_file {
        return load_calibration(path).map(Some);
    }
    if input.markers.is_empty() {
        return Ok(None);
    }

    let unit = input.unit.or(drill.map(|d| d.unit)).unwrap_or_default();
    let mut engine = CalibrationEngine::new(Topology::TwoPoint, unit);
    if let Some(template) = drill {
        engine.apply_template(template);
    }
    for &marker in &input.markers {
        if !engine.place_marker(marker) {
            info!("extra marker {:?} ignored", marker);
        }
    }

    let calibration = match input.reference_distance {
        Some(distance) => engine.compute(distance)?,
        None => engine.compute_with_prefilled()?,
    };
    Ok(Some(calibration))
}

#[cfg(feature = "desktop")]
fn track_video(session: &mut AnalysisSession, input: &AnalysisInput, video: &Path) -> Result<()> {
    use stride_tracker::pose::MoveNetEstimator;
    use stride_tracker::tracking::CancellationToken;
    use stride_tracker::video::OpenCvVideoSource;

    let model = input.model.as_deref().unwrap_or(Path::new("models/movenet_lightning.onnx"));
    let mut source = OpenCvVideoSource::open(video)?;
    let mut estimator = MoveNetEstimator::new(model)?;

    session.load_video(source.duration_sec(), source.fps())?;
    if let Some([start, end]) = input.trim {
        session.apply_trim(start, end)?;
    }

    let mut last_reported = 0;
    let quality = session.run_tracking(
        &mut source,
        &mut estimator,
        &mut |percent| {
            let decile = (percent / 10.0) as i32;
            if decile > last_reported {
                last_reported = decile;
                info!("tracking {:.0}%", percent);
            }
        },
        &CancellationToken::new(),
    )?;
    info!(
        "quality: {:?} (avg {:.2}, {} missing)",
        quality.rating, quality.avg_confidence, quality.missing_frame_count
    );
    Ok(())
}

#[cfg(not(feature = "desktop"))]
fn track_video(_session: &mut AnalysisSession, _input: &AnalysisInput, video: &Path) -> Result<()> {
    bail!(
        "Tracking {} requires the `desktop` feature; pass `track` or `manual_points` instead",
        video.display()
    )
}

/// JSON のトラックまたは手動ポイントからセッションを組み立てる
fn load_track(session: &mut AnalysisSession, input: &AnalysisInput) -> Result<()> {
    let fps = input.fps.context("`fps` is required without a video")?;
    let last_frame = input
        .track
        .iter()
        .map(|f| f.frame)
        .chain(input.manual_points.iter().map(|p| p.frame))
        .max()
        .context("Input has no `track`, `manual_points` or `video`")?;
    session.load_video((last_frame + 1) as f64 / fps, fps)?;

    if !input.track.is_empty() {
        session.set_track(Track::new(TrackingMode::Ai, input.track.clone()))?;
    } else {
        for p in &input.manual_points {
            session.add_manual_point(p.frame as i64, p.point)?;
        }
        session.interpolate_manual()?;
    }
    Ok(())
}

fn read_history(path: &Path) -> Result<Vec<PerformanceRecord>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read history {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse history {}", path.display()))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("stride_tracker=info,analyze=info")))
        .init();

    info!("Stride Tracker analyze ({})", env!("GIT_VERSION"));

    let args = parse_args()?;
    let mut config = Config::load_or_default(CONFIG_PATH);
    let templates = all_templates(&config.drills);
    let drill = match &args.drill {
        Some(name) => Some(
            find_template(&templates, name)
                .with_context(|| format!("Unknown drill: {}", name))?
                .clone(),
        ),
        None => None,
    };
    if let Some(d) = &drill {
        if !d.split_distances.is_empty() {
            config.kinematics.split_distances = d.split_distances.clone();
        }
    }

    let content = fs::read_to_string(&args.input)
        .with_context(|| format!("Failed to read input {}", args.input.display()))?;
    let input: AnalysisInput = serde_json::from_str(&content).context("Failed to parse input")?;

    let mut session = AnalysisSession::new(config);
    match &input.video {
        Some(video) => track_video(&mut session, &input, video)?,
        None => load_track(&mut session, &input)?,
    }

    session.set_calibration(build_calibration(&input, drill.as_ref())?)?;
    session.set_mass(input.mass_kg)?;
    session.set_overrides(input.overrides.clone())?;

    let result = session
        .kinematics()
        .context("No kinematics derived; a calibration is required")?;
    println!("{}", serde_json::to_string_pretty(result)?);

    let drill_name = drill.as_ref().map(|d| d.name.as_str()).unwrap_or("custom");
    let date = args.date.unwrap_or_else(|| Local::now().date_naive());
    let record = PerformanceRecord::from_result(date, drill_name, result);

    if let Some(history_path) = &args.history {
        let mut history = read_history(history_path)?;
        history.push(record);
        fs::write(history_path, serde_json::to_string_pretty(&history)?)
            .with_context(|| format!("Failed to write history {}", history_path.display()))?;

        let same_drill: Vec<PerformanceRecord> = history
            .into_iter()
            .filter(|r| r.drill_name == drill_name)
            .collect();
        let stats = MetricStatistics::from_records(&same_drill);
        info!("{} records for {}", same_drill.len(), drill_name);
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        println!("{}", serde_json::to_string_pretty(&record)?);
    }

    Ok(())
}
