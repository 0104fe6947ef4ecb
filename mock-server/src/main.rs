use mock_server::{AppState, DEMO_EMAIL, DEMO_PASSWORD};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("mock_server=info")),
        )
        .init();

    let port = std::env::var("PORT").unwrap_or_else(|_| "8080".to_string());
    let email = std::env::var("MOCK_EMAIL").unwrap_or_else(|_| DEMO_EMAIL.to_string());
    let password = std::env::var("MOCK_PASSWORD").unwrap_or_else(|_| DEMO_PASSWORD.to_string());

    let state = AppState::new(&email, &password);
    {
        let mut repo = state.repo.write().await;
        let community = repo.add_community("Demo community", None);
        repo.add_collection(community.uuid, "Demo collection");
    }

    let addr = format!("127.0.0.1:{port}");
    let listener = TcpListener::bind(&addr).await?;
    info!(%addr, %email, "listening on /rest");
    mock_server::run_with(listener, state).await
}
