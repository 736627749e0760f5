use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use telemetry_recorder::bus::local::LocalBus;
use telemetry_recorder::bus::mock::RecordingCollector;
use telemetry_recorder::{EventId, EventRecorder, PayloadValue, RecorderConfig};

const SMOKE_EVENT: &str = "350ac4ff-3026-4c25-9e7e-e8103b4fd5d8";
const SMOKE_SEQUENCE: &str = "d936cd5c-08de-4d4e-8a87-8df1f4a33cba";

fn payload(round: u32) -> Option<PayloadValue> {
    match round % 3 {
        0 => Some(PayloadValue::Tuple(vec![
            PayloadValue::Uint32(round),
            PayloadValue::Double(f64::from(round) * 7.5),
            PayloadValue::Bool(round % 2 == 0),
        ])),
        1 => Some(PayloadValue::Str("The Sand-Cake is a Lie!".to_string())),
        _ => None,
    }
}

/// Records every kind of event against an in-process collector and checks
/// that each one arrived.
#[tokio::main]
async fn main() -> Result<()> {
    // 1. Setup Logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("setting default subscriber failed")?;

    let rounds: u32 = match std::env::args().nth(1) {
        Some(arg) => arg.parse().context("round count must be a number")?,
        None => 20,
    };

    // 2. Connect to the collector stand-in
    let collector = RecordingCollector::new();
    let config = RecorderConfig::from_env();
    let bus = LocalBus::connect(collector.clone(), config.call_timeout)?;
    let recorder = EventRecorder::new(Arc::new(bus), config);

    let event_id = EventId::parse(SMOKE_EVENT)?;
    let sequence_id = EventId::parse(SMOKE_SEQUENCE)?;
    tracing::info!(rounds, "recording smoke events");

    // 3. Record
    for round in 0..rounds {
        recorder.record_singular(event_id, None, payload(round))?;
        recorder.record_aggregate(event_id, i64::from(round) + 1, None, payload(round + 1))?;

        let key = PayloadValue::Uint32(round);
        recorder.record_start(sequence_id, Some(&key), payload(round))?;
        recorder.record_progress(sequence_id, Some(&key), None)?;
        recorder.record_stop(sequence_id, Some(&key), payload(round + 2))?;

        let timer = recorder.start_aggregate_timer(event_id, payload(round), None)?;
        if round % 2 == 0 {
            timer.stop();
        }
        // Odd rounds let the drop path stop the timer.
    }

    // 4. Check delivery: singular, aggregate, sequence, timer start and stop per round
    let expected = if recorder.config().submission_enabled {
        rounds as usize * 5
    } else {
        0
    };
    if !collector.wait_for_calls(expected, Duration::from_secs(10)).await {
        bail!(
            "collector saw {} calls, expected {expected}",
            collector.call_count()
        );
    }

    let stats = recorder.stats();
    tracing::info!(in_flight = stats.in_flight(), "smoke run finished");
    println!("{}", serde_json::to_string(&stats)?);
    Ok(())
}
