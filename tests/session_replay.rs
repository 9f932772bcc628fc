use std::path::PathBuf;
use std::sync::atomic::Ordering;

use posture_ai_lib::alerts::AlertSeverity;
use posture_ai_lib::capture::PipelineStatus;
use posture_ai_lib::db::{Database, SessionStatus};
use posture_ai_lib::monitor::PostureMonitor;
use posture_ai_lib::posture::PostureStatus;
use posture_ai_lib::settings::PipelineSettings;
use posture_ai_lib::source::ReplaySource;
use serde_json::{json, Value};
use tokio::time::Duration;

fn frame(lean_px: f64) -> Value {
    json!({
        "keypoints": [
            {"name": "nose", "x": 320.0 + lean_px, "y": 120.0, "score": 0.95},
            {"name": "left_ear", "x": 350.0 + lean_px, "y": 110.0, "score": 0.9},
            {"part": "rightEar", "x": 290.0 + lean_px, "y": 110.0, "score": 0.9},
            {"name": "leftShoulder", "x": 400.0 + lean_px, "y": 240.0, "confidence": 0.9},
            {"name": "right_shoulder", "x": 240.0 + lean_px, "y": 240.0, "confidence": 0.9},
            {"name": "left_hip", "x": 380.0, "y": 480.0, "score": 0.8},
            {"name": "rightHip", "x": 260.0, "y": 480.0, "score": 0.8}
        ]
    })
}

fn write_recording(lines: &[Value]) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("posture-ai-it-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("frames.jsonl");
    let body: Vec<String> = lines.iter().map(Value::to_string).collect();
    std::fs::write(&path, body.join("\n")).unwrap();
    path
}

fn settings() -> PipelineSettings {
    PipelineSettings {
        min_frame_interval_ms: 0,
        emit_interval_ms: 0,
        blink_seed: Some(42),
        ..PipelineSettings::default()
    }
}

#[tokio::test]
async fn test_replayed_session_scores_alerts_and_persists() {
    let recording = write_recording(&[
        frame(0.0),
        frame(0.0),
        json!({"keypoints": [{"name": "nose", "x": 320.0, "y": 120.0, "score": 0.9}]}),
        frame(120.0),
        frame(120.0),
    ]);
    let db_path = recording.with_file_name("posture.db");
    let db = Database::new(db_path.clone()).unwrap();
    let monitor = PostureMonitor::new(db.clone(), settings());

    let source = ReplaySource::from_path(&recording, Duration::from_millis(5)).unwrap();
    let released = source.released_flag();
    let feed = monitor.feed().await;
    let mut status = feed.watch_status();
    let session = monitor.start_session("user-1", Box::new(source)).await.unwrap();

    tokio::time::timeout(
        Duration::from_secs(5),
        status.wait_for(|state| matches!(state, PipelineStatus::Stopped { .. })),
    )
    .await
    .expect("replay should run out")
    .unwrap();
    drop(status);
    assert!(released.load(Ordering::SeqCst));

    let report = monitor.end_session().await.unwrap();
    assert_eq!(report.session.id, session.id);
    assert_eq!(report.session.status, SessionStatus::Interrupted);
    assert_eq!(report.session.sample_count, 1);
    assert_eq!(
        report.status,
        PipelineStatus::Stopped {
            reason: "replay exhausted".into()
        }
    );

    let last = report.snapshot.expect("final snapshot");
    assert_eq!(last.status, PostureStatus::Bad);
    assert!(last.wellness.is_some());
    assert_eq!(report.alerts.len(), 1);
    assert_eq!(report.alerts[0].severity, AlertSeverity::Bad);
    assert_eq!(report.alerts[0].message, last.issues[0]);

    assert_eq!(report.analytics.daily.len(), 7);
    assert_eq!(report.analytics.total_samples, 1);
    assert_eq!(report.analytics.week_average, Some(u32::from(last.score)));

    let stored = db.get_samples_for_session(&session.id).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].score, Some(last.score));

    drop(monitor);
    drop(db);
    let reopened = PostureMonitor::new(Database::new(db_path.clone()).unwrap(), settings());
    assert_eq!(reopened.refresh_analytics("user-1").await.total_samples, 1);
    assert_eq!(reopened.refresh_analytics("someone-else").await.total_samples, 0);
    let _ = std::fs::remove_dir_all(recording.parent().unwrap());
}

#[tokio::test]
async fn test_interrupted_process_is_recovered_on_next_start() {
    let recording = write_recording(&vec![frame(0.0); 500]);
    let db_path = recording.with_file_name("posture.db");

    let session_id = {
        let monitor = PostureMonitor::new(Database::new(db_path.clone()).unwrap(), settings());
        let source = ReplaySource::from_path(&recording, Duration::from_millis(10)).unwrap();
        let session = monitor.start_session("user-1", Box::new(source)).await.unwrap();
        // Simulates a crash: the monitor goes away without ending the session.
        session.id
    };

    let db = Database::new(db_path.clone()).unwrap();
    let monitor = PostureMonitor::new(db.clone(), settings());
    assert_eq!(monitor.recover_incomplete_sessions().await.unwrap(), 1);
    let stored = db.get_session(&session_id).await.unwrap().unwrap();
    assert_eq!(stored.status, SessionStatus::Interrupted);
    assert!(stored.stopped_at.is_some());
    let _ = std::fs::remove_dir_all(recording.parent().unwrap());
}
