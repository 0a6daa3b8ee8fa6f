mod db;
mod entities;
mod error;
mod homeserver;
mod models;
mod routes;
mod share_link;
mod state;
mod token;
mod uri;

use std::path::PathBuf;
use std::sync::Arc;

use axum::routing::{get, post, put};
use axum::Router;
use clap::Parser;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;

use homeserver::MatrixHomeserver;
use state::{AppState, ServerConfig};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value_t = 8228)]
    port: u16,

    /// Database path
    #[arg(short, long, env = "DATABASE_PATH", default_value = "super_invites.db")]
    db_path: String,

    /// Base URL of the homeserver whose rooms tokens invite into
    #[arg(long, env = "HOMESERVER_URL", default_value = "http://localhost:8008")]
    homeserver_url: String,

    /// Application-service token used for homeserver calls
    #[arg(long, env = "AS_TOKEN")]
    as_token: String,

    /// Mirror new tokens into the homeserver registration-token store
    #[arg(
        long,
        env = "GENERATE_REGISTRATION_TOKEN",
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    generate_registration_token: bool,

    /// Public prefix of published share links
    #[arg(long, env = "URL_PREFIX", default_value = "https://app.example.com/p/")]
    url_prefix: String,

    /// Directory the share-link artifacts are written to
    #[arg(long, env = "TARGET_PATH", default_value = "./share_links")]
    target_path: PathBuf,

    /// Optional directory searched for template overrides
    #[arg(long, env = "TEMPLATE_DIR")]
    template_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    // Ensure the artifact directory exists before the first share link
    tokio::fs::create_dir_all(&args.target_path).await.ok();

    tracing::info!("Initializing database at {}", args.db_path);
    let db = db::init(&args.db_path).await;

    let homeserver = Arc::new(MatrixHomeserver::new(args.homeserver_url, args.as_token));
    let config = ServerConfig {
        generate_registration_token: args.generate_registration_token,
        url_prefix: args.url_prefix,
        target_path: args.target_path.clone(),
        template_dir: args.template_dir,
    };
    let state = AppState::new(db, homeserver, config);

    let app = Router::new()
        .route(
            "/tokens",
            get(routes::tokens::get_tokens)
                .post(routes::tokens::upsert)
                .delete(routes::tokens::delete),
        )
        .route("/info", get(routes::info::get_info))
        .route("/redeem", post(routes::redeem::redeem))
        .route("/share_link/", put(routes::share_link::create_share_link))
        // generated artifacts are served read-only next to the API
        .nest_service("/links", ServeDir::new(&args.target_path))
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = format!("0.0.0.0:{}", args.port);
    tracing::info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
