// transcript-service-rs/src/main.rs

use std::sync::Arc;

use transcript_service::config::AppConfig;
use transcript_service::quota_store::{KeyValueStore, RedisStore};
use transcript_service::{build_router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = AppConfig::from_env();

    let store: Option<Arc<dyn KeyValueStore>> = match &config.redis_url {
        Some(url) => match RedisStore::connect(url).await {
            Ok(store) => {
                log::info!("connected to quota store at {}", url);
                Some(Arc::new(store))
            }
            Err(err) => {
                log::warn!(
                    "quota store unreachable ({}), rate limiting disabled: {}",
                    url,
                    err
                );
                None
            }
        },
        None => {
            log::warn!("REDIS_URL not set, rate limiting disabled");
            None
        }
    };

    if config.admin_token.is_none() {
        log::warn!("ADMIN_TOKEN not set, admin endpoints disabled");
    }
    if config.openai_api_key.is_none() {
        log::warn!("OPENAI_API_KEY not set, summarization disabled");
    }
    match &config.webshare {
        Some(proxy) => log::info!(
            "outbound proxy enabled (countries: {})",
            proxy.countries.join(", ")
        ),
        None => log::info!("outbound proxy not configured"),
    }

    let state = AppState::new(config, store)?;
    let app = build_router(state);

    let addr = config_rs::get_bind_address(8000);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    log::info!("transcript service listening on {}", addr);
    println!("transcript-service listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await?;

    Ok(())
}
