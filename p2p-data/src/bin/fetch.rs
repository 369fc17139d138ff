use p2p_data::{BinanceP2pClient, Fetcher, config::FetchConfig, init_logging};
use std::process::ExitCode;
use tracing::{error, info};

/// Run one poll cycle: fetch both sides, aggregate, append to the store and
/// print the appended row as JSON.
#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    init_logging();

    let config = match FetchConfig::from_env() {
        Ok(config) => config,
        Err(error) => {
            error!(%error, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    let client = match BinanceP2pClient::new(&config.url, config.timeout) {
        Ok(client) => client,
        Err(error) => {
            error!(%error, "failed to build HTTP client");
            return ExitCode::FAILURE;
        }
    };

    info!(asset = %config.asset, fiat = %config.fiat, store = ?config.store, "starting poll cycle");

    let fetcher = Fetcher::new(client, config.retry.clone(), config.rows);
    let row = fetcher.build_row(&config.asset, &config.fiat).await;

    let store = config.store.open();
    let total = match tokio::task::spawn_blocking({
        let row = row.clone();
        move || store.append(&row)
    })
    .await
    {
        Ok(Ok(total)) => total,
        Ok(Err(error)) => {
            error!(%error, "failed to append row");
            return ExitCode::FAILURE;
        }
        Err(error) => {
            error!(%error, "store task panicked");
            return ExitCode::FAILURE;
        }
    };

    info!(total, market_median = ?row.market_median, "appended row");

    match serde_json::to_string(&row.to_record()) {
        Ok(json) => {
            println!("{json}");
            ExitCode::SUCCESS
        }
        Err(error) => {
            error!(%error, "failed to encode row");
            ExitCode::FAILURE
        }
    }
}
