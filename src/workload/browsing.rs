use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::settings::BrowsingSettings;

use super::IterationCounter;

const ENABLE_LOGS: bool = false;

use crate::log_info;

const MIN_INTERVAL: Duration = Duration::from_millis(10);

/// Cycles through the configured sites, firing one fetch per interval.
/// Fetches are detached; the loop itself never waits on the network.
pub async fn browsing_loop(
    client: reqwest::Client,
    settings: BrowsingSettings,
    cancel_token: CancellationToken,
    counter: IterationCounter,
) {
    if settings.urls.is_empty() {
        return;
    }
    let interval = Duration::from_secs(settings.interval_secs).max(MIN_INTERVAL);

    for url in settings.urls.iter().cycle() {
        if cancel_token.is_cancelled() {
            break;
        }

        let request = client.get(url.as_str()).send();
        let url_for_log = url.clone();
        tokio::spawn(async move {
            match request.await {
                Ok(response) => {
                    let status = response.status();
                    let bytes = response.bytes().await.map(|b| b.len()).unwrap_or(0);
                    log_info!("fetched {url_for_log}: {status} ({bytes} bytes)");
                }
                Err(err) => log_info!("fetch of {url_for_log} failed: {err}"),
            }
        });
        counter.bump();

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = cancel_token.cancelled() => break,
        }
    }

    log_info!("browsing loop shutting down");
}
