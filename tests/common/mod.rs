#![allow(dead_code)]

use argh::FromArgs;
use crop_doctor::{
    config::{ServerArgs, ServerConfig},
    server::{self, AppState, messages::StatusResponse},
};
use serde_json::{Value, json};
use std::{io::Cursor, sync::Arc, time::Duration};

pub const API_KEY: &str = "test-key";
pub const GENERATE_PATH: &str = "/v1beta/models/gemini-1.5-flash:generateContent";

pub fn encode(format: image::ImageFormat) -> Vec<u8> {
    let mut buffer = Cursor::new(Vec::new());
    image::RgbImage::from_pixel(8, 6, image::Rgb([46, 125, 50]))
        .write_to(&mut buffer, format)
        .unwrap();
    buffer.into_inner()
}

pub fn jpeg() -> Vec<u8> {
    encode(image::ImageFormat::Jpeg)
}

pub fn png() -> Vec<u8> {
    encode(image::ImageFormat::Png)
}

/// A `generateContent` reply carrying `text` as its only part.
pub fn model_reply(text: &str) -> Value {
    json!({
        "candidates": [{
            "content": { "role": "model", "parts": [{ "text": text }] },
            "finishReason": "STOP"
        }]
    })
}

pub fn config(endpoint: &str, extra: &[&str]) -> ServerConfig {
    let mut args = vec!["--endpoint", endpoint, "--progress-ms", "0"];
    args.extend_from_slice(extra);
    let args = ServerArgs::from_args(&["crop-doctor"], &args).unwrap();
    ServerConfig::from_args(args, |_| Some(API_KEY.to_string())).unwrap()
}

/// Serves the app on an ephemeral port and returns its base URL.
pub async fn start_server(endpoint: &str, extra: &[&str]) -> String {
    let config = config(endpoint, extra);
    let state = Arc::new(AppState::new(&config));
    let app = server::router(state, config.max_upload_bytes);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

pub async fn upload(client: &reqwest::Client, base: &str, file_name: &str, bytes: Vec<u8>) {
    let part = reqwest::multipart::Part::bytes(bytes).file_name(file_name.to_string());
    let form = reqwest::multipart::Form::new().part("file", part);
    let response = client
        .post(format!("{base}/upload"))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());
}

pub async fn trigger(client: &reqwest::Client, base: &str) {
    let response = client.post(format!("{base}/analyze")).send().await.unwrap();
    assert!(response.status().is_success());
}

pub async fn status(client: &reqwest::Client, base: &str) -> StatusResponse {
    client
        .get(format!("{base}/status"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

/// Polls `/status` until the session leaves `analyzing`.
pub async fn settled(client: &reqwest::Client, base: &str) -> StatusResponse {
    for _ in 0..400 {
        let current = status(client, base).await;
        if current.state != "analyzing" {
            return current;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("analysis did not settle");
}
