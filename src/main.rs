use clap::Parser;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use htslice::{
    Config,
    handlers::{AppState, create_router},
    slicing::GencodeMap,
    storage::{LocalStorage, Storage},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    config.validate().map_err(anyhow::Error::msg)?;

    let storage = create_storage(&config)?;
    let gencode = Arc::new(GencodeMap::load_or_default(config.gencode.as_deref()));

    let state = AppState {
        storage,
        gencode,
        block_size: config.block_size,
    };

    let app = create_router(state);
    let app = if config.cors {
        app.layer(CorsLayer::permissive())
    } else {
        app
    };

    let addr = config.bind_address();
    tracing::info!("Starting htslice server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn create_storage(config: &Config) -> anyhow::Result<Arc<dyn Storage>> {
    match &config.remote_url {
        #[cfg(feature = "http")]
        Some(url) => {
            tracing::info!("Remote data URL: {}", url);
            let storage =
                htslice::storage::HttpStorage::new(url, config.remote_index_url.as_deref())?;
            Ok(Arc::new(storage))
        }
        #[cfg(not(feature = "http"))]
        Some(_) => anyhow::bail!("remote storage requires the `http` feature"),
        None => {
            tracing::info!("Data directory: {:?}", config.data_dir);
            Ok(Arc::new(LocalStorage::new(config.data_dir.clone())))
        }
    }
}
