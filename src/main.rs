use crop_doctor::{
    config::{ServerArgs, ServerConfig},
    server::{self, AppState},
};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: ServerArgs = argh::from_env();

    let config = ServerConfig::from_args(args, |name| std::env::var(name).ok())?;

    let state = Arc::new(AppState::new(&config));
    let app = server::router(state, config.max_upload_bytes);

    log::info!("🚀 Starting Crop Doctor");
    log::info!("🌿 Model: {} at {}", config.gemini.model, config.gemini.endpoint);
    log::info!("🔥 Listening on: {}", config.addr);
    log::info!("🔧 Press Ctrl+C to stop the server");

    let listener = tokio::net::TcpListener::bind(&config.addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
