mod common;

use common::{GENERATE_PATH, jpeg, model_reply, png, start_server};
use crop_doctor::client::{ClientError, DoctorClient};
use httpmock::prelude::*;
use std::time::Duration;

const POLL: Duration = Duration::from_millis(20);

#[tokio::test]
async fn diagnose_polls_until_the_report_is_ready() {
    let model = MockServer::start_async().await;
    let text = "Health Rating: 4 stars\n🌿 Plant: Basil";
    let mock = model
        .mock_async(|when, then| {
            when.method(POST).path(GENERATE_PATH);
            then.status(200)
                .delay(Duration::from_millis(150))
                .json_body(model_reply(text));
        })
        .await;

    let base = start_server(&model.base_url(), &[]).await;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("basil.jpg");
    std::fs::write(&path, jpeg()).unwrap();

    let client = DoctorClient::new(base);
    let status = client.diagnose(&path, POLL).await.unwrap();

    assert_eq!(status.state, "done");
    assert_eq!(status.diagnosis.as_deref(), Some(text));
    assert_eq!(status.rating.as_deref(), Some("★★★☆☆"));
    assert_eq!(client.report().await.unwrap(), text);
    mock.assert_hits_async(1).await;
}

#[tokio::test]
async fn diagnose_returns_the_failed_status() {
    let model = MockServer::start_async().await;
    model
        .mock_async(|when, then| {
            when.method(POST).path(GENERATE_PATH);
            then.status(500).body("boom");
        })
        .await;

    let base = start_server(&model.base_url(), &[]).await;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("leaf.png");
    std::fs::write(&path, png()).unwrap();

    let client = DoctorClient::new(base);
    let status = client.diagnose(&path, POLL).await.unwrap();

    assert_eq!(status.state, "failed");
    assert!(status.diagnosis.is_none());
    assert!(matches!(client.report().await, Err(ClientError::Http(_))));
}

#[tokio::test]
async fn diagnose_stops_at_a_rejected_upload() {
    let model = MockServer::start_async().await;
    let mock = model
        .mock_async(|when, then| {
            when.method(POST).path(GENERATE_PATH);
            then.status(200).json_body(model_reply("unreachable"));
        })
        .await;

    let base = start_server(&model.base_url(), &[]).await;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("leaf.png");
    std::fs::write(&path, b"not a png").unwrap();

    let client = DoctorClient::new(base);
    let err = client.diagnose(&path, POLL).await.unwrap_err();

    assert!(matches!(err, ClientError::UploadRejected(ref reason) if reason.contains("Error processing image")));
    mock.assert_hits_async(0).await;
}

#[tokio::test]
async fn upload_checks_the_extension_locally() {
    let client = DoctorClient::new("http://127.0.0.1:9");
    let err = client
        .upload(std::path::Path::new("notes.txt"))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Image(_)));
}
