use axum::Router;
use dotenvy::dotenv;
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

use odeon_server::config::Config;
use odeon_server::routes::create_routes;
use odeon_server::state::AppState;
use odeon_server::utils::mail::{HttpMailSender, LogMailSender, MailSender};
use odeon_server::utils::payment::PolarClient;

#[tokio::main]
async fn main() {
    dotenv().ok();
    tracing_subscriber::fmt::init();

    let config = Arc::new(Config::from_env());

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await
        .expect("Failed to connect to database");

    tracing::info!("Successfully connected to database");

    sqlx::migrate!()
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    tracing::info!("Migrations run successfully");

    let mailer: Arc<dyn MailSender> = if config.skip_email {
        Arc::new(LogMailSender)
    } else {
        Arc::new(HttpMailSender::new(config.mail.clone()))
    };

    let state = AppState {
        pool,
        payments: Arc::new(PolarClient::new(config.payment.clone())),
        mailer,
        config: config.clone(),
    };

    let app: Router = create_routes(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("🚀 Server running at http://{}", addr);

    let listener = TcpListener::bind(addr)
        .await
        .expect("Failed to bind address");

    axum::serve(listener, app).await.expect("Server failed");
}
