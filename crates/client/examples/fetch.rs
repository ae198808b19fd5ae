//! Fetches the given URLs concurrently and logs each outcome.
//!
//! ```text
//! cargo run --example fetch -- http://127.0.0.1:8080/ http://127.0.0.1:8080/status
//! ```

use std::time::Duration;

use http::Uri;
use micro_http_client::client::Client;
use micro_http_client::config::ClientConfig;
use micro_http_client::handler::make_handler;
use micro_http_client::protocol::RequestDescriptor;
use tokio::task::LocalSet;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let urls: Vec<String> = std::env::args().skip(1).collect();
    if urls.is_empty() {
        warn!("no url given, usage: fetch <url>...");
        return;
    }

    let config = match ClientConfig::builder().response_timeout(Duration::from_secs(30)).build() {
        Ok(config) => config,
        Err(e) => {
            error!(cause = %e, "invalid client config");
            return;
        }
    };

    LocalSet::new()
        .run_until(async move {
            let mut client = Client::with_config(config);

            for url in urls {
                let uri = match url.parse::<Uri>() {
                    Ok(uri) => uri,
                    Err(e) => {
                        warn!(%url, cause = %e, "skip unparsable url");
                        continue;
                    }
                };

                let handler = make_handler({
                    let url = url.clone();
                    move |result| match result {
                        Ok(response) => info!(%url, status = %response.status(), body_len = response.body().len(), "receive response"),
                        Err(e) => error!(%url, cause = %e, "request failed"),
                    }
                });

                if let Err(e) = client.request(RequestDescriptor::get(uri), handler) {
                    warn!(%url, cause = %e, "request rejected");
                }
            }

            client.run_until_idle().await;
            client.shutdown();
        })
        .await;
}
