mod backend;
mod booking;
mod chat;
mod config;
mod error;
mod routes;
mod seats;
mod state;

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt::init();

    let config = config::AppConfig::from_env().expect("invalid configuration");
    let port = config.port;
    tracing::info!(
        backend = %config.backend_url,
        broker = %config.broker_url,
        cookie_secure = config.cookie_secure,
        google_oauth = config.google_authorize_url.is_some(),
        "config loaded"
    );

    let state = state::AppState::new(config).expect("backend client init failed");

    let app = routes::app(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .expect("failed to bind");

    tracing::info!(%port, "busline portal listening");
    axum::serve(listener, app).await.expect("server failed");
}
