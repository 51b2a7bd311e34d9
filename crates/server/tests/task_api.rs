//! Conversion task endpoints driven through the in-process router.

mod common;

use std::time::Duration;

use axum::http::StatusCode;
use serde_json::json;

use avcnv_core::testing::MockScript;
use common::TestFixture;

#[tokio::test]
async fn test_health() {
    let fixture = TestFixture::new().await;

    let response = fixture.get("/api/v1/health").await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], "ok");
}

#[tokio::test]
async fn test_config_is_sanitized() {
    let fixture = TestFixture::new().await;

    let response = fixture.get("/api/v1/config").await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["server"]["port"], 8000);
    assert_eq!(response.body["converter"]["extra_args_configured"], false);
    assert!(response.body["converter"].get("extra_args").is_none());
}

#[tokio::test]
async fn test_capabilities_lists_formats() {
    let fixture = TestFixture::new().await;

    let response = fixture.get("/api/v1/capabilities").await;

    assert_eq!(response.status, StatusCode::OK);
    let audio = response.body["audio_formats"].as_array().unwrap();
    let video = response.body["video_formats"].as_array().unwrap();
    assert!(audio.contains(&json!("mp3")));
    assert!(video.contains(&json!("mp4")));
    assert!(!audio.contains(&json!("mp4")));
}

#[tokio::test]
async fn test_convert_runs_to_completion() {
    let fixture = TestFixture::new().await;

    let response = fixture.convert(&["a.wav", "b.wav"], "mp3").await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["total_files"], 2);
    let task_id = response.body["task_id"].as_str().unwrap().to_string();

    fixture.wait_finished(&task_id).await;

    let status = fixture.get(&format!("/api/v1/status/{}", task_id)).await;
    assert_eq!(status.status, StatusCode::OK);
    assert_eq!(status.body["status"], "completed");
    assert_eq!(status.body["overall_progress"], 1.0);
    for file in status.body["files"].as_array().unwrap() {
        assert_eq!(file["status"], "completed");
        assert_eq!(file["progress"], 1.0);
        assert!(file["output_file"].as_str().unwrap().ends_with(".mp3"));
        assert!(file["output_size"].as_u64().unwrap() > 0);
    }
}

#[tokio::test]
async fn test_failed_file_reports_reason() {
    let fixture = TestFixture::new().await;
    fixture.transcoder.fail_encode("bad.wav", 1).await;

    let response = fixture.convert(&["bad.wav", "good.wav"], "ogg").await;
    let task_id = response.body["task_id"].as_str().unwrap().to_string();
    fixture.wait_finished(&task_id).await;

    let status = fixture.get(&format!("/api/v1/status/{}", task_id)).await;
    let files = status.body["files"].as_array().unwrap();
    assert_eq!(files[0]["status"], "failed");
    assert!(files[0]["error"].as_str().unwrap().contains("code 1"));
    assert!(files[0]["output_file"].is_null());
    assert_eq!(files[1]["status"], "completed");
    assert_eq!(status.body["status"], "completed");
}

#[tokio::test]
async fn test_convert_validation_errors() {
    let fixture = TestFixture::new().await;

    let empty = fixture
        .post("/api/v1/convert", json!({ "files": [], "output_format": "mp3" }))
        .await;
    assert_eq!(empty.status, StatusCode::BAD_REQUEST);
    assert_eq!(empty.body["kind"], "validation_error");

    fixture.env.add_upload("clip.mp4").await.unwrap();
    fixture.env.add_upload("song.wav").await.unwrap();
    let mixed = fixture
        .post(
            "/api/v1/convert",
            json!({ "files": ["clip.mp4", "song.wav"], "output_format": "mp3" }),
        )
        .await;
    assert_eq!(mixed.status, StatusCode::BAD_REQUEST);

    let bad_option = fixture
        .post(
            "/api/v1/convert",
            json!({
                "files": ["song.wav"],
                "output_format": "mp3",
                "options": { "sample_rate": 100 }
            }),
        )
        .await;
    assert_eq!(bad_option.status, StatusCode::BAD_REQUEST);

    let tasks = fixture.get("/api/v1/tasks").await;
    assert_eq!(tasks.body["total"], 0);
}

#[tokio::test]
async fn test_convert_missing_source_is_not_found() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .post(
            "/api/v1/convert",
            json!({ "files": ["ghost.wav"], "output_format": "mp3" }),
        )
        .await;

    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.body["kind"], "not_found");
}

#[tokio::test]
async fn test_unknown_task_is_not_found() {
    let fixture = TestFixture::new().await;

    for response in [
        fixture.get("/api/v1/status/nope").await,
        fixture.post_empty("/api/v1/pause/nope").await,
        fixture.post_empty("/api/v1/resume/nope").await,
        fixture.delete("/api/v1/tasks/nope").await,
    ] {
        assert_eq!(response.status, StatusCode::NOT_FOUND);
        assert_eq!(response.body["kind"], "not_found");
    }
}

#[tokio::test]
async fn test_pause_and_resume() {
    let fixture = TestFixture::new().await;
    fixture.transcoder.hold("movie.mp4", 0.4).await;

    let response = fixture.convert(&["movie.mp4"], "webm").await;
    let task_id = response.body["task_id"].as_str().unwrap().to_string();
    fixture.transcoder.wait_until_held("movie.mp4").await;

    let paused = fixture.post_empty(&format!("/api/v1/pause/{}", task_id)).await;
    assert_eq!(paused.status, StatusCode::OK);
    assert_eq!(paused.body["paused"], true);
    assert_eq!(paused.body["files"][0]["status"], "pending");
    assert_eq!(paused.body["files"][0]["progress"], 0.0);
    assert_eq!(fixture.transcoder.live_processes(), 0);

    fixture.transcoder.release("movie.mp4").await;
    let resumed = fixture.post_empty(&format!("/api/v1/resume/{}", task_id)).await;
    assert_eq!(resumed.status, StatusCode::OK);
    assert_eq!(resumed.body["paused"], false);

    let done = fixture.wait_finished(&task_id).await;
    assert_eq!(done.files[0].progress, 1.0);
    assert_eq!(fixture.transcoder.start_count("movie.mp4").await, 2);
}

#[tokio::test]
async fn test_stop_finishes_current_file_only() {
    let fixture = TestFixture::new().await;
    fixture
        .transcoder
        .script(
            "first.mp4",
            MockScript {
                step_delay: Duration::from_millis(100),
                ..Default::default()
            },
        )
        .await;

    let response = fixture.convert(&["first.mp4", "second.mp4"], "mkv").await;
    let task_id = response.body["task_id"].as_str().unwrap().to_string();
    fixture
        .wait_until(&task_id, |s| s.files[0].progress > 0.0)
        .await;

    let stopped = fixture.post_empty(&format!("/api/v1/stop/{}", task_id)).await;
    assert_eq!(stopped.status, StatusCode::OK);
    assert_eq!(stopped.body["stopped"], true);
    assert_eq!(stopped.body["paused"], false);
    assert_eq!(stopped.body["files"][0]["status"], "processing");

    let snapshot = fixture
        .wait_until(&task_id, |s| s.files[0].status.is_terminal())
        .await;
    assert_eq!(snapshot.files[0].progress, 1.0);
    fixture
        .state
        .orchestrator()
        .registry()
        .get(&task_id)
        .await
        .unwrap()
        .wait_idle()
        .await;

    let status = fixture.get(&format!("/api/v1/status/{}", task_id)).await;
    assert_eq!(status.body["status"], "pending");
    assert_eq!(status.body["files"][1]["status"], "pending");
    assert_eq!(fixture.transcoder.start_count("second.mp4").await, 0);

    let resumed = fixture.post_empty(&format!("/api/v1/resume/{}", task_id)).await;
    assert_eq!(resumed.body["stopped"], false);
    let done = fixture.wait_finished(&task_id).await;
    assert!(done.files.iter().all(|f| f.progress == 1.0));
    assert_eq!(fixture.transcoder.start_count("first.mp4").await, 1);

    let unknown = fixture.post_empty("/api/v1/stop/not-a-task").await;
    assert_eq!(unknown.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_resume_with_subset() {
    let fixture = TestFixture::new().await;
    fixture.transcoder.hold("one.mp4", 0.3).await;

    let response = fixture.convert(&["one.mp4", "two.mp4"], "mkv").await;
    let task_id = response.body["task_id"].as_str().unwrap().to_string();
    fixture.transcoder.wait_until_held("one.mp4").await;
    fixture.post_empty(&format!("/api/v1/pause/{}", task_id)).await;
    fixture.transcoder.release("one.mp4").await;

    let resumed = fixture
        .post(
            &format!("/api/v1/resume/{}", task_id),
            json!({ "filenames": ["two.mp4", "unknown.mp4"] }),
        )
        .await;
    assert_eq!(resumed.status, StatusCode::OK);

    let snapshot = fixture
        .wait_until(&task_id, |s| {
            s.file("two.mp4").map(|f| f.status.is_terminal()) == Some(true)
        })
        .await;
    assert_eq!(snapshot.file("one.mp4").unwrap().status.as_str(), "pending");
    assert_eq!(fixture.transcoder.start_count("one.mp4").await, 1);
}

#[tokio::test]
async fn test_list_and_delete_tasks() {
    let fixture = TestFixture::new().await;

    let first = fixture.convert(&["a.wav"], "flac").await;
    let second = fixture.convert(&["b.wav"], "flac").await;
    let first_id = first.body["task_id"].as_str().unwrap().to_string();
    let second_id = second.body["task_id"].as_str().unwrap().to_string();
    fixture.wait_finished(&first_id).await;
    fixture.wait_finished(&second_id).await;

    let listed = fixture.get("/api/v1/tasks").await;
    assert_eq!(listed.status, StatusCode::OK);
    assert_eq!(listed.body["total"], 2);
    // newest first
    assert_eq!(listed.body["tasks"][0]["task_id"], second_id.as_str());

    let deleted = fixture.delete(&format!("/api/v1/tasks/{}", first_id)).await;
    assert_eq!(deleted.status, StatusCode::OK);
    assert_eq!(deleted.body["task_id"], first_id.as_str());

    let gone = fixture.get(&format!("/api/v1/status/{}", first_id)).await;
    assert_eq!(gone.status, StatusCode::NOT_FOUND);
    assert_eq!(fixture.get("/api/v1/tasks").await.body["total"], 1);
}

#[tokio::test]
async fn test_delete_running_task_stops_process() {
    let fixture = TestFixture::new().await;
    fixture.transcoder.hold("long.wav", 0.5).await;

    let response = fixture.convert(&["long.wav"], "mp3").await;
    let task_id = response.body["task_id"].as_str().unwrap().to_string();
    fixture.transcoder.wait_until_held("long.wav").await;

    let deleted = fixture.delete(&format!("/api/v1/tasks/{}", task_id)).await;

    assert_eq!(deleted.status, StatusCode::OK);
    assert_eq!(fixture.transcoder.live_processes(), 0);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let fixture = TestFixture::new().await;
    let response = fixture.convert(&["m.wav"], "mp3").await;
    let task_id = response.body["task_id"].as_str().unwrap().to_string();
    fixture.wait_finished(&task_id).await;

    let metrics = fixture.get("/metrics").await;

    assert_eq!(metrics.status, StatusCode::OK);
    let text = String::from_utf8(metrics.bytes).unwrap();
    assert!(text.contains("avcnv_tasks_by_status"));
    assert!(text.contains("avcnv_http_requests_total"));
    assert!(text.contains("avcnv_tasks_submitted_total"));
}
