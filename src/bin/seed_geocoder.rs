//! Warms the geocoder cache with every prefix from `a` to `zzz`.
//!
//! Usage: `seed-geocoder [max_prefix_len]` (default 3). Reads the same
//! config file as the server and writes into the same cache directory.

use anyhow::Context;
use fountain_finder::config::Config;
use fountain_finder::geocode::{seed_queries, NominatimClient, Seeder};
use fountain_finder::response_cache::ResponseCache;
use tracing::info;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .compact()
        .init();

    let max_len = match std::env::args().nth(1) {
        Some(arg) => arg.parse::<usize>().with_context(|| format!("invalid prefix length {arg:?}"))?,
        None => 3,
    };
    let config = Config::load()?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(seed(config, max_len))
}

async fn seed(config: Config, max_len: usize) -> anyhow::Result<()> {
    let http = reqwest::Client::builder()
        .user_agent(config.user_agent.clone())
        .timeout(config.query_timeout())
        .build()?;
    let client = NominatimClient::new(http, config.nominatim_url.clone());
    let cache = ResponseCache::new(config.cache_dir.clone(), config.cache_size_bytes(), config.cache_ttl()).await?;

    let queries = seed_queries(max_len);
    info!("seeding {} queries against {}", queries.len(), config.nominatim_url);
    let seeder = Seeder {
        client: &client,
        cache: &cache,
        delay: config.seed_delay(),
        ttl: config.geocode_ttl(),
    };
    let stats = seeder.run(&queries).await?;
    info!(
        "done: {} fetched, {} already cached, {} failed",
        stats.fetched, stats.skipped, stats.failed
    );
    Ok(())
}
