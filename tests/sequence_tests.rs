use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use telemetry_recorder::bus::local::LocalBus;
use telemetry_recorder::bus::mock::RecordingCollector;
use telemetry_recorder::bus::{BusPeer, ObjectPath, SequenceEntry};
use telemetry_recorder::payload::WirePayload;
use telemetry_recorder::{
    BusCall, BusReply, EventRecorder, PayloadValue, RecorderConfig, RecorderError, TransportError,
};

const MEANINGLESS_EVENT: &str = "350ac4ff-3026-4c25-9e7e-e8103b4fd5d8";
const MEANINGLESS_EVENT_2: &str = "d936cd5c-08de-4d4e-8a87-8df1f4a33cba";
const WAIT: Duration = Duration::from_secs(5);

fn setup() -> (EventRecorder, Arc<RecordingCollector>) {
    let collector = RecordingCollector::new();
    let bus = LocalBus::connect(collector.clone(), WAIT).expect("bus thread should start");
    let config = RecorderConfig {
        default_actor: Some(1000),
        ..RecorderConfig::default()
    };
    (EventRecorder::new(Arc::new(bus), config), collector)
}

fn sequences(collector: &RecordingCollector) -> Vec<(u32, [u8; 16], Vec<SequenceEntry>)> {
    collector
        .calls_named("RecordEventSequence")
        .into_iter()
        .map(|call| match call {
            BusCall::RecordEventSequence {
                actor,
                event_id,
                events,
            } => (actor, event_id, events),
            other => panic!("unexpected {other:?}"),
        })
        .collect()
}

fn payloads(events: &[SequenceEntry]) -> Vec<WirePayload> {
    events.iter().map(|entry| entry.payload.clone()).collect()
}

fn present(value: PayloadValue) -> WirePayload {
    WirePayload {
        present: true,
        value,
    }
}

fn absent() -> WirePayload {
    WirePayload {
        present: false,
        value: PayloadValue::Bool(false),
    }
}

#[test]
fn test_start_progress_stop_is_one_message() {
    let (recorder, collector) = setup();
    let key = PayloadValue::Int32(2);

    // 1. Buffered locally
    recorder
        .record_start(MEANINGLESS_EVENT, Some(&key), Some(PayloadValue::Int32(1)))
        .unwrap();
    recorder.record_progress(MEANINGLESS_EVENT, Some(&key), None).unwrap();
    assert_eq!(collector.call_count(), 0, "Nothing is sent before stop");

    // 2. Stop flushes everything
    recorder
        .record_stop_sync(MEANINGLESS_EVENT, Some(&key), Some(PayloadValue::Int32(3)))
        .unwrap();

    let sent = sequences(&collector);
    assert_eq!(sent.len(), 1);
    let (actor, event_id, events) = &sent[0];
    assert_eq!(*actor, 1000);
    assert_eq!(
        telemetry_recorder::EventId::from_bytes(event_id).unwrap().to_string(),
        MEANINGLESS_EVENT
    );
    assert_eq!(
        payloads(events),
        vec![
            present(PayloadValue::Int32(1)),
            absent(),
            present(PayloadValue::Int32(3)),
        ]
    );
    assert!(
        events
            .windows(2)
            .all(|pair| pair[0].relative_timestamp <= pair[1].relative_timestamp),
        "Entries must be chronological"
    );

    // Wire shape: array of (timestamp, has_payload, payload)
    let call = &collector.calls_named("RecordEventSequence")[0];
    assert_eq!(call.signature(), "uaya(xbv)");
    let PayloadValue::Array(entries) = &call.arguments()[2] else {
        panic!("third argument should be an array");
    };
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0].type_signature(), "(xbv)");
}

#[test]
fn test_stop_without_start_is_an_error() {
    let (recorder, collector) = setup();

    let err = recorder
        .record_stop_sync(MEANINGLESS_EVENT, None, None)
        .unwrap_err();
    assert!(matches!(err, RecorderError::Sequence { ref key, .. } if key == "NULL"));
    assert!(err.is_programmer_error());
    assert!(matches!(
        recorder.record_progress(MEANINGLESS_EVENT, None, None),
        Err(RecorderError::Sequence { .. })
    ));

    // A completed sequence leaves the key idle again
    recorder.record_start(MEANINGLESS_EVENT, None, None).unwrap();
    recorder.record_stop_sync(MEANINGLESS_EVENT, None, None).unwrap();
    assert!(recorder.record_stop(MEANINGLESS_EVENT, None, None).is_err());

    assert_eq!(collector.call_count(), 1, "Only the real sequence was sent");
}

#[test]
fn test_keys_are_independent() {
    let (recorder, collector) = setup();
    let first = PayloadValue::Str("first".to_string());
    let second = PayloadValue::Str("second".to_string());

    recorder.record_start(MEANINGLESS_EVENT, Some(&first), None).unwrap();
    recorder.record_start(MEANINGLESS_EVENT, Some(&second), None).unwrap();
    recorder.record_start(MEANINGLESS_EVENT_2, Some(&first), None).unwrap();

    recorder
        .record_stop_sync(MEANINGLESS_EVENT, Some(&second), Some(PayloadValue::Uint32(2)))
        .unwrap();
    recorder
        .record_stop_sync(MEANINGLESS_EVENT_2, Some(&first), Some(PayloadValue::Uint32(3)))
        .unwrap();
    recorder
        .record_stop_sync(MEANINGLESS_EVENT, Some(&first), Some(PayloadValue::Uint32(1)))
        .unwrap();

    let stops: Vec<WirePayload> = sequences(&collector)
        .iter()
        .map(|(_, _, events)| {
            assert_eq!(events.len(), 2, "Each sequence has its own start and stop");
            events[1].payload.clone()
        })
        .collect();
    assert_eq!(
        stops,
        vec![
            present(PayloadValue::Uint32(2)),
            present(PayloadValue::Uint32(3)),
            present(PayloadValue::Uint32(1)),
        ]
    );

    // Same number, different type: a different key
    recorder
        .record_start(MEANINGLESS_EVENT, Some(&PayloadValue::Int32(7)), None)
        .unwrap();
    assert!(recorder
        .record_stop_sync(MEANINGLESS_EVENT, Some(&PayloadValue::Uint32(7)), None)
        .is_err());
}

#[test]
fn test_restart_discards_the_open_sequence() {
    let (recorder, collector) = setup();

    recorder
        .record_start(MEANINGLESS_EVENT, None, Some(PayloadValue::Str("old".into())))
        .unwrap();
    recorder.record_progress(MEANINGLESS_EVENT, None, None).unwrap();
    recorder
        .record_start(MEANINGLESS_EVENT, None, Some(PayloadValue::Str("new".into())))
        .unwrap();
    recorder.record_stop_sync(MEANINGLESS_EVENT, None, None).unwrap();

    let sent = sequences(&collector);
    assert_eq!(sent.len(), 1);
    assert_eq!(
        payloads(&sent[0].2),
        vec![present(PayloadValue::Str("new".into())), absent()]
    );
}

#[test]
fn test_concurrent_sequences_on_separate_keys() {
    let (recorder, collector) = setup();
    let recorder = Arc::new(recorder);

    let workers: Vec<_> = (0..8)
        .map(|worker| {
            let recorder = Arc::clone(&recorder);
            thread::spawn(move || {
                let key = PayloadValue::Int32(worker);
                recorder.record_start(MEANINGLESS_EVENT, Some(&key), None).unwrap();
                for step in 0..5 {
                    recorder
                        .record_progress(MEANINGLESS_EVENT, Some(&key), Some(PayloadValue::Int32(step)))
                        .unwrap();
                }
                recorder
                    .record_stop_sync(MEANINGLESS_EVENT, Some(&key), None)
                    .unwrap();
            })
        })
        .collect();
    for worker in workers {
        worker.join().expect("worker thread panicked");
    }

    let sent = sequences(&collector);
    assert_eq!(sent.len(), 8);
    for (_, _, events) in &sent {
        assert_eq!(events.len(), 7);
        assert!(events
            .windows(2)
            .all(|pair| pair[0].relative_timestamp <= pair[1].relative_timestamp));
    }
}

#[tokio::test]
async fn test_async_stop_reports_outcome() {
    let (recorder, collector) = setup();

    recorder.record_start(MEANINGLESS_EVENT, None, None).unwrap();
    let outcome = recorder
        .record_stop(MEANINGLESS_EVENT, None, None)
        .unwrap()
        .outcome()
        .await;
    assert_eq!(outcome, Ok(BusReply::Unit));
    assert_eq!(collector.call_count(), 1);
}

/// Holds every call until the gate is released.
struct GatedPeer {
    gate: Mutex<()>,
    inner: Arc<RecordingCollector>,
}

impl BusPeer for GatedPeer {
    fn handle(&self, target: &ObjectPath, call: &BusCall) -> Result<BusReply, TransportError> {
        let _open = self.gate.lock().unwrap();
        self.inner.handle(target, call)
    }
}

#[tokio::test]
async fn test_cancelled_stop_sends_no_part_of_the_sequence() {
    let collector = RecordingCollector::new();
    let peer = Arc::new(GatedPeer {
        gate: Mutex::new(()),
        inner: collector.clone(),
    });
    let bus = LocalBus::connect(peer.clone(), WAIT).unwrap();
    let recorder = EventRecorder::new(Arc::new(bus), RecorderConfig::default());

    // 1. Stall the dispatch thread behind a first call
    let held = peer.gate.lock().unwrap();
    let blocker = recorder.record_singular(MEANINGLESS_EVENT, None, None).unwrap();

    // 2. Queue the sequence and cancel it before it is dispatched
    recorder.record_start(MEANINGLESS_EVENT, None, None).unwrap();
    recorder.record_progress(MEANINGLESS_EVENT, None, None).unwrap();
    let stop = recorder.record_stop(MEANINGLESS_EVENT, None, None).unwrap();
    stop.cancel();
    assert!(stop.is_cancelled());
    drop(held);

    // 3. The first call lands, the sequence never does
    assert_eq!(blocker.outcome().await, Ok(BusReply::Unit));
    assert_eq!(stop.outcome().await, Err(TransportError::Cancelled));
    assert_eq!(collector.call_count(), 1);
    assert!(collector.calls_named("RecordEventSequence").is_empty());

    let stats = recorder.stats();
    assert_eq!(stats.cancelled, 1);
    assert_eq!(stats.delivered, 1);
}

#[test]
fn test_infinite_sub_ids_keep_separate_sequences() {
    let (recorder, collector) = setup();
    let plus = PayloadValue::Double(f64::INFINITY);
    let minus = PayloadValue::Double(f64::NEG_INFINITY);

    // 1. Two concurrent instances keyed by opposite infinities
    recorder
        .record_start(MEANINGLESS_EVENT, Some(&plus), Some(PayloadValue::Str("plus".into())))
        .unwrap();
    recorder
        .record_start(MEANINGLESS_EVENT, Some(&minus), Some(PayloadValue::Str("minus".into())))
        .unwrap();

    // 2. Both stop cleanly
    recorder.record_stop_sync(MEANINGLESS_EVENT, Some(&plus), None).unwrap();
    recorder
        .record_stop_sync(MEANINGLESS_EVENT, Some(&minus), None)
        .expect("-inf sequence should still be open");

    let sent = sequences(&collector);
    assert_eq!(sent.len(), 2, "Each key sends its own sequence");
    assert_eq!(
        payloads(&sent[0].2),
        vec![present(PayloadValue::Str("plus".into())), absent()]
    );
    assert_eq!(
        payloads(&sent[1].2),
        vec![present(PayloadValue::Str("minus".into())), absent()]
    );
}
