// Integration tests for the recording session state machine
//
// These verify the lifecycle transitions, the non-empty-artifact guarantee
// (silent fallback included), idempotent artifact retrieval, and partial
// artifact salvage on failure.

use speech_pulse::audio::{decode_wav, AudioFrame};
use speech_pulse::session::{RecordingSession, SessionConfig, SessionPhase};

fn session() -> RecordingSession {
    RecordingSession::new(
        SessionConfig {
            session_id: "test-session".to_string(),
            ..SessionConfig::default()
        },
        1,
    )
}

fn frame(samples: Vec<f32>, timestamp_ms: u64) -> AudioFrame {
    AudioFrame {
        samples,
        sample_rate: 16000,
        channels: 1,
        timestamp_ms,
    }
}

#[test]
fn zero_chunk_session_still_yields_a_nonempty_artifact() {
    let session = session();
    session.begin_capture().unwrap();
    session.begin_stopping().unwrap();
    let artifact = session.finalize().unwrap();

    assert_eq!(session.phase(), SessionPhase::Ready);
    assert!(artifact.len() > 0, "artifact must never be empty once Ready");

    // The fallback is one second of encoded silence.
    let (samples, rate) = decode_wav(&artifact).unwrap();
    assert_eq!(rate, 16000);
    assert_eq!(samples.len(), 16000);
    assert!(samples.iter().all(|&s| s == 0));
}

#[test]
fn accumulated_chunks_survive_into_the_artifact() {
    let session = session();
    session.begin_capture().unwrap();
    for i in 0..3u64 {
        session.push_chunk(frame(vec![0.25; 1600], i * 100)).unwrap();
    }
    session.begin_stopping().unwrap();
    let artifact = session.finalize().unwrap();

    let (samples, rate) = decode_wav(&artifact).unwrap();
    assert_eq!(rate, 16000);
    assert_eq!(samples.len(), 3 * 1600);

    let stats = session.stats();
    assert_eq!(stats.phase, "ready");
    assert_eq!(stats.chunks_count, 3);
    assert_eq!(stats.artifact_bytes, artifact.len());
}

#[test]
fn trailing_chunks_are_accepted_while_stopping() {
    let session = session();
    session.begin_capture().unwrap();
    session.push_chunk(frame(vec![0.1; 1600], 0)).unwrap();
    session.begin_stopping().unwrap();
    // Some recorders deliver the final chunk after the stop signal.
    session.push_chunk(frame(vec![0.1; 1600], 100)).unwrap();
    let artifact = session.finalize().unwrap();

    let (samples, _) = decode_wav(&artifact).unwrap();
    assert_eq!(samples.len(), 2 * 1600);
}

#[test]
fn artifact_retrieval_is_idempotent() {
    let session = session();
    session.begin_capture().unwrap();
    session.push_chunk(frame(vec![0.5; 800], 0)).unwrap();
    session.begin_stopping().unwrap();

    let first = session.finalize().unwrap();
    let second = session.finalize().unwrap();
    assert_eq!(first.as_bytes(), second.as_bytes());
    assert_eq!(session.artifact().unwrap().as_bytes(), first.as_bytes());
}

#[test]
fn invalid_transitions_are_rejected() {
    let session = session();

    // Chunks are refused before capture starts.
    assert!(session.push_chunk(frame(vec![0.1; 10], 0)).is_err());
    // Finalize is only reachable from Stopping.
    assert!(session.finalize().is_err());

    session.begin_capture().unwrap();
    assert!(session.begin_capture().is_err(), "double start must fail");
    assert!(session.finalize().is_err(), "cannot finalize while capturing");

    session.begin_stopping().unwrap();
    // Stop is idempotent.
    session.begin_stopping().unwrap();
    session.finalize().unwrap();

    // Terminal sessions refuse new capture.
    assert!(session.begin_capture().is_err());
    assert!(session.push_chunk(frame(vec![0.1; 10], 0)).is_err());
}

#[test]
fn device_failure_salvages_a_partial_artifact() {
    let session = session();
    session.begin_capture().unwrap();
    session.push_chunk(frame(vec![0.3; 1600], 0)).unwrap();

    session.fail("device unplugged");

    assert_eq!(session.phase(), SessionPhase::Error);
    assert_eq!(session.error_message().as_deref(), Some("device unplugged"));

    let artifact = session.artifact().expect("partial artifact");
    let (samples, _) = decode_wav(&artifact).unwrap();
    assert_eq!(samples.len(), 1600);
}

#[test]
fn device_failure_with_no_data_reports_no_artifact() {
    let session = session();
    session.begin_capture().unwrap();
    session.fail("permission revoked");

    assert_eq!(session.phase(), SessionPhase::Error);
    assert!(session.artifact().is_none(), "no data to salvage");
}

#[test]
fn failure_after_terminal_phase_is_ignored() {
    let session = session();
    session.begin_capture().unwrap();
    session.begin_stopping().unwrap();
    session.finalize().unwrap();

    session.fail("late error");
    assert_eq!(session.phase(), SessionPhase::Ready);
    assert!(session.artifact().is_some());
}
