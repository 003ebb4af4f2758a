/// HTTP API server
///
/// Read-only JSON API over the `sent_mail` table.

pub mod auth;
pub mod handlers;
pub mod routes;

pub use handlers::AppState;
pub use routes::create_router;

use std::net::SocketAddr;

pub async fn run(host: String, port: u16, enable_cors: bool, state: AppState) -> anyhow::Result<()> {
    let auth_enabled = state.settings.api_token.is_some();
    let app = create_router(state, enable_cors);

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    println!("🚀 postfix-parser API");
    println!("   🔌 API:    http://{}/api", addr);

    if auth_enabled {
        println!("   🔒 Auth:   Enabled (API_TOKEN required)");
    } else {
        println!("   ⚠️  Auth:   Disabled (API_TOKEN not set)");
    }

    println!();
    println!("📚 API Endpoints:");
    println!("   GET  /api/emails        - List/filter emails (limit, offset, page, order, order_dir)");
    println!("   GET  /api/emails/:id    - Get one email by queue id");
    println!("   GET  /api/health        - Health check");
    println!();

    tracing::info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
