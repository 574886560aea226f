use std::{sync::Arc, time::Duration};

use clap::Parser;
use tracing_subscriber::EnvFilter;
use transfer_shortener::{
    config::Config,
    db::Db,
    gateway::TransferProxy,
    router::RequestRouter,
    shortener::{RandomMinter, ShortLinkService},
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // construct a subscriber that prints formatted traces to stdout
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .finish();
    // use that subscriber to process traces emitted after this point
    tracing::subscriber::set_global_default(subscriber)?;

    let config = Config::parse();
    tracing::info!("{:?}", &config);

    let db = Db::open(&config.db_path)?;
    let links = ShortLinkService::new(db, RandomMinter::new(usize::from(config.token_length)));
    let gateway = TransferProxy::new(
        config.backend_url.clone(),
        config.public_url.clone(),
        config.backend_timeout(),
    )?;

    let router = RequestRouter::new(Arc::new(links), Arc::new(gateway), config.public_url.as_str());
    let routes = transfer_shortener::routes::get_routes(router);

    tracing::info!("starting warp server: {}", &config.listen_addr);
    tracing::info!("backend: {}", &config.backend_url);
    tracing::info!("public url: {}", &config.public_url);
    tracing::info!("sqlitedb: {}", config.db_path.display());
    warp::serve(routes)
        .bind(config.listen_addr)
        .await
        .graceful(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("failed to install CTRL+C signal handler: {e}");
                std::future::pending::<()>().await;
            }
        })
        .run()
        .await;

    tracing::info!("gracefully exited.");
    tokio::time::sleep(Duration::from_secs(2)).await;

    Ok(())
}
