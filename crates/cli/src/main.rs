use anyhow::Context;
use clap::Parser;
use speech_coach_core::analysis::SimulatedAnalysisProvider;
use speech_coach_core::bus::{BusSubscriptions, EventBus};
use speech_coach_core::capture::{DeviceError, SimulatedCapture};
use speech_coach_core::config::{
    resolve_u64_with_default, Env, SessionConfig, StdEnv, DEFAULT_AUDIO_TICK_MS,
    DEFAULT_JOIN_TIMEOUT_MS, DEFAULT_SESSION_SECS, DEFAULT_VIDEO_FRAME_MS, ENV_AUDIO_TICK_MS,
    ENV_JOIN_TIMEOUT_MS, ENV_SESSION_SECS, ENV_VIDEO_FRAME_MS,
};
use speech_coach_core::feedback::FeedbackEntry;
use speech_coach_core::report::{SessionReport, SubReport};
use speech_coach_core::rewards::LoggingRewards;
use speech_coach_core::session::{SessionController, SessionPhase};
use speech_coach_core::transcription::{
    ScriptedTranscription, TranscriptEvent, TranscriptionProvider, UnavailableTranscription,
    UtteranceSignals,
};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "speech-coach")]
#[command(about = "Timed speaking practice with live voice and facial analysis")]
struct Args {
    /// Recording length.
    #[arg(long, env = ENV_SESSION_SECS)]
    duration_secs: Option<u64>,

    /// Seed for the simulated analysis readings.
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Run without a speech recognizer; voice analysis falls back to volume only.
    #[arg(long)]
    no_transcription: bool,

    /// End the camera track this many seconds into the recording.
    #[arg(long)]
    lose_video_after_secs: Option<u64>,

    /// Refuse device access, as a user declining the permission prompt would.
    #[arg(long)]
    deny_permission: bool,

    #[arg(long, env = ENV_JOIN_TIMEOUT_MS)]
    join_timeout_ms: Option<u64>,

    #[arg(long, env = ENV_AUDIO_TICK_MS)]
    audio_tick_ms: Option<u64>,

    #[arg(long, env = ENV_VIDEO_FRAME_MS)]
    video_frame_ms: Option<u64>,

    /// Print the full report as JSON instead of a summary.
    #[arg(long)]
    json: bool,

    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level)?;

    let env = StdEnv;
    let config = build_config(&args, &env)?;

    tracing::info!(
        duration_secs = config.session_duration.as_secs(),
        join_timeout_ms = config.join_timeout.as_millis() as u64,
        seed = args.seed,
        "config loaded"
    );

    let capture = Arc::new(if args.deny_permission {
        SimulatedCapture::failing(DeviceError::PermissionDenied)
    } else {
        SimulatedCapture::new()
    });
    let analysis = Arc::new(SimulatedAnalysisProvider::new(args.seed));
    let (bus, subs) = EventBus::new(config.snapshot_buffer);
    let consumers = spawn_consumers(subs);

    let report = if args.no_transcription {
        run_session(
            &args,
            config,
            capture,
            analysis,
            UnavailableTranscription,
            bus,
        )
        .await?
    } else {
        let script = demo_script(config.session_duration);
        run_session(&args, config, capture, analysis, script, bus).await?
    };

    let snapshots = consumers.await.context("event consumer failed")?;
    tracing::debug!(snapshots, "realtime snapshots delivered");

    if args.json {
        let json = serde_json::to_string_pretty(report.as_ref()).context("serialize report")?;
        println!("{json}");
    } else {
        print_summary(&report);
    }
    Ok(())
}

async fn run_session<T>(
    args: &Args,
    config: SessionConfig,
    capture: Arc<SimulatedCapture>,
    analysis: Arc<SimulatedAnalysisProvider>,
    transcription: T,
    bus: EventBus,
) -> anyhow::Result<Arc<SessionReport>>
where
    T: TranscriptionProvider + 'static,
{
    let duration = config.session_duration;
    let mut controller = SessionController::new(
        Arc::clone(&capture),
        analysis,
        Arc::new(transcription),
        config,
    )?
    .with_bus(bus)
    .with_rewards(Arc::new(LoggingRewards));

    if let Err(e) = controller.start_session().await {
        controller.reset();
        return Err(e).context("could not start practice session");
    }
    controller.start_recording()?;

    if let Some(after) = args.lose_video_after_secs {
        let capture = Arc::clone(&capture);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(after)).await;
            tracing::info!(after_secs = after, "simulating camera loss");
            capture.end_video_track();
        });
    }

    tokio::time::sleep(duration).await;
    let report = controller
        .stop_recording()
        .await?
        .context("recording produced no report")?;
    controller.reset();
    Ok(report)
}

/// Drains both bus topics until the controller goes away. Returns how many snapshots
/// were seen.
fn spawn_consumers(subs: BusSubscriptions) -> tokio::task::JoinHandle<u64> {
    let BusSubscriptions {
        mut snapshots,
        mut states,
    } = subs;

    tokio::spawn(async move {
        let states_task = tokio::spawn(async move {
            while let Some(change) = states.recv().await {
                if change.to == SessionPhase::Reported {
                    tracing::debug!(session_id = ?change.session_id, "report published");
                }
            }
        });

        let mut seen = 0u64;
        while let Some(produced) = snapshots.recv().await {
            seen += 1;
            tracing::trace!(
                session_id = %produced.session_id,
                snapshot = ?produced.snapshot,
                "realtime snapshot"
            );
        }
        if let Err(e) = states_task.await {
            tracing::warn!(error = %e, "state consumer failed");
        }
        seen
    })
}

/// A short talk replayed by the scripted recognizer, spread over the recording.
fn demo_script(duration: Duration) -> ScriptedTranscription {
    const LINES: [&str; 8] = [
        "Good morning everyone and thank you for coming",
        "Today I want to talk about how we ship software",
        "Um the first idea is to keep changes small",
        "Small changes are easier to review and easier to roll back",
        "The second idea is well about testing early",
        "So write the test before you fix the bug",
        "The last idea is to measure what you ship",
        "Thank you and I am happy to take questions",
    ];
    let signals = [
        UtteranceSignals {
            confidence: 78.0,
            clarity: 82.0,
            enthusiasm: 74.0,
        },
        UtteranceSignals {
            confidence: 84.0,
            clarity: 79.0,
            enthusiasm: 81.0,
        },
        UtteranceSignals {
            confidence: 71.0,
            clarity: 88.0,
            enthusiasm: 69.0,
        },
    ];

    let mut events = Vec::new();
    let mut at = Duration::from_secs(2);
    for (i, line) in LINES.iter().cycle().enumerate() {
        if at >= duration {
            break;
        }
        events.push(
            TranscriptEvent::final_text(*line, at).with_signals(signals[i % signals.len()]),
        );
        // every third gap is long enough to count as a pause
        at += Duration::from_secs(if i % 3 == 2 { 6 } else { 4 });
    }
    ScriptedTranscription::new(events)
}

fn print_summary(report: &SessionReport) {
    let c = &report.combined;
    println!(
        "Session {} ({:.0}s){}",
        report.session_id,
        report.recorded_for.as_secs_f64(),
        if report.partial { " [partial]" } else { "" }
    );
    println!(
        "Overall {}/100  confidence {}  engagement {}  naturalness {}  effectiveness {}",
        c.overall_score, c.confidence, c.engagement, c.naturalness, c.effectiveness
    );
    print_sub_report("Voice", &report.voice);
    print_sub_report("Facial", &report.facial);
    print_entries("Strengths", &report.strengths);
    print_entries("Recommendations", &report.recommendations);
    print_entries("Areas to improve", &report.improvements);
}

fn print_sub_report(name: &str, sub: &SubReport) {
    println!("{name} {}/100 ({:?})", sub.overall_score, sub.reliability);
    for (metric, value) in &sub.metrics {
        println!("  {metric}: {value}");
    }
    for note in &sub.notes {
        println!("  note: {note}");
    }
}

fn print_entries(title: &str, entries: &[FeedbackEntry]) {
    if entries.is_empty() {
        return;
    }
    println!("{title}:");
    for entry in entries {
        println!("  - {}", entry.text);
    }
}

fn init_tracing(level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(
            level
                .parse()
                .with_context(|| format!("invalid --log-level: {level}"))?,
        )
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

fn build_config(args: &Args, env: &impl Env) -> anyhow::Result<SessionConfig> {
    let session_secs = resolve_u64_with_default(
        args.duration_secs,
        ENV_SESSION_SECS,
        env,
        DEFAULT_SESSION_SECS,
    )?;
    let join_ms = resolve_u64_with_default(
        args.join_timeout_ms,
        ENV_JOIN_TIMEOUT_MS,
        env,
        DEFAULT_JOIN_TIMEOUT_MS,
    )?;
    let audio_ms = resolve_u64_with_default(
        args.audio_tick_ms,
        ENV_AUDIO_TICK_MS,
        env,
        DEFAULT_AUDIO_TICK_MS,
    )?;
    let video_ms = resolve_u64_with_default(
        args.video_frame_ms,
        ENV_VIDEO_FRAME_MS,
        env,
        DEFAULT_VIDEO_FRAME_MS,
    )?;

    let config = SessionConfig {
        session_duration: Duration::from_secs(session_secs),
        join_timeout: Duration::from_millis(join_ms),
        audio_tick: Duration::from_millis(audio_ms),
        video_frame: Duration::from_millis(video_ms),
        ..SessionConfig::default()
    };
    config.validate().context("invalid session settings")?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use speech_coach_core::config::MapEnv;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["speech-coach"];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn flags_override_environment() {
        let env = MapEnv::default().with_var(ENV_SESSION_SECS, "90");
        let config = build_config(&args(&["--duration-secs", "30"]), &env).unwrap();
        assert_eq!(config.session_duration, Duration::from_secs(30));

        let config = build_config(&args(&[]), &env).unwrap();
        assert_eq!(config.session_duration, Duration::from_secs(90));
    }

    #[test]
    fn zero_interval_rejected() {
        let env = MapEnv::default();
        let zero_tick = args(&["--audio-tick-ms", "0"]);
        assert!(build_config(&zero_tick, &env).is_err());
    }

    #[test]
    fn demo_script_stays_within_the_recording() {
        let script = demo_script(Duration::from_secs(30));
        assert_eq!(script.len(), 6);
        assert!(demo_script(Duration::from_secs(1)).is_empty());
    }
}
