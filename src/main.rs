use std::sync::Arc;

use clap::Parser;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use catwalk::config::Config;
use catwalk::db::{create_pool, init_db, queries, AppState};
use catwalk::payments::StripeClient;

#[derive(Parser, Debug)]
#[command(name = "catwalk")]
#[command(about = "Payment reconciliation service for the Catwalk marketplace")]
struct Cli {
    /// Seed the database with dev data (users, tiers, a model, products)
    #[arg(long)]
    seed: bool,
}

/// Seeds the database with dev data for exercising the webhook flows.
/// Only runs in dev mode and when the database is empty.
fn seed_dev_data(state: &AppState) {
    let conn = state.db.get().expect("Failed to get db connection for seeding");

    let count = queries::count_users(&conn).expect("Failed to count users");
    if count > 0 {
        tracing::info!("Database already has data, skipping seed");
        return;
    }

    tracing::info!("============================================");
    tracing::info!("SEEDING DEV DATA");
    tracing::info!("============================================");

    let brand = queries::create_user(&conn, "brand@catwalk.local", "Seed Brand")
        .expect("Failed to create brand user");
    let model_user = queries::create_user(&conn, "model@catwalk.local", "Seed Model")
        .expect("Failed to create model user");
    let model = queries::create_model(&conn, &model_user.id, "Seed Model", 0.10)
        .expect("Failed to create model");

    queries::upsert_tier(&conn, "starter", 500).expect("Failed to seed tier");
    queries::upsert_tier(&conn, "pro", 2000).expect("Failed to seed tier");

    let product_id = queries::create_shop_product(&conn, "Tote Bag", 2500)
        .expect("Failed to create shop product");
    queries::create_affiliate_code(&conn, "SEEDMODEL", &model.id)
        .expect("Failed to create affiliate code");

    let trip_id = queries::create_trip(&conn, "Milan Editorial Trip", 12)
        .expect("Failed to create trip");
    let workshop_id = queries::create_workshop(&conn, "Runway Intensive", 45000)
        .expect("Failed to create workshop");

    tracing::info!("DEV DATA SEEDED SUCCESSFULLY");

    println!();
    println!("--- COPY FROM HERE ---");
    println!("  brand_user_id: {}", brand.id);
    println!("  model_user_id: {}", model_user.id);
    println!("  model_id: {}", model.id);
    println!("  shop_product_id: {}", product_id);
    println!("  trip_id: {}", trip_id);
    println!("  workshop_id: {}", workshop_id);
    println!("--- END COPY ---");
    println!();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "catwalk=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();

    if config.dev_mode {
        tracing::info!("Running in DEVELOPMENT mode");
    }

    if config.stripe_webhook_secret.is_none() {
        tracing::warn!("STRIPE_WEBHOOK_SECRET not set - inbound webhooks will be rejected with 500");
    }

    let db_pool = create_pool(&config.database_path).expect("Failed to create database pool");

    {
        let conn = db_pool.get().expect("Failed to get connection");
        init_db(&conn).expect("Failed to initialize database");
    }

    let state = AppState {
        db: db_pool,
        provider: Arc::new(StripeClient::new(config.stripe_secret_key.clone())),
        webhook_secret: config.stripe_webhook_secret.clone(),
    };

    if cli.seed {
        if !config.dev_mode {
            tracing::warn!("--seed flag ignored: not in dev mode (set CATWALK_ENV=dev)");
        } else {
            seed_dev_data(&state);
        }
    }

    let app = catwalk::app(state).layer(TraceLayer::new_for_http());

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Catwalk server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Failed to start server");
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    tracing::info!("Shutdown signal received, stopping server...");
}
