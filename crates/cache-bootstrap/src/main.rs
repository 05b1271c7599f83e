//! Host binary wiring the cache core together: parses CLI arguments, wires
//! up `tracing`, resolves the [`http_cache::Chc`] singleton (or a
//! custom-rooted instance when `--max-cache-size` is given), and optionally
//! serves its cache out over the loopback range proxy.

mod args;

use std::sync::Arc;

use args::Args;
use clap::Parser;
use http_cache::{Chc, ChcError};
use network::clients::reqwest::ReqwestClient;
use range_proxy::{RangeProxy, RangeProxyError};
use thiserror::Error;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Error, Debug)]
enum BootstrapError {
    #[error("cache error: {0}")]
    Chc(#[from] ChcError),

    #[error("cache directory could not be resolved")]
    NoCacheDir,

    #[error("range proxy error: {0}")]
    Proxy(#[from] RangeProxyError),
}

fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(
                "warn,cache_bootstrap=info,http_cache=info,lfc=info,pcf=info,range_proxy=info",
            )
        }))
        .with(fmt::layer().with_target(true))
        .init();

    let args = Args::parse();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("failed to start the Tokio runtime");

    if let Err(err) = runtime.block_on(run(args)) {
        error!("cache-bootstrap exited with an error: {err}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), BootstrapError> {
    let chc = match args.max_cache_size {
        Some(max_size) => {
            let root = storage::cache_root().ok_or(BootstrapError::NoCacheDir)?;
            Arc::new(Chc::with_root(
                root,
                max_size,
                Arc::new(ReqwestClient::new()),
            )?)
        }
        None => Chc::singleton()?,
    };

    if let Some(url) = args.url.as_deref() {
        let path = chc.get_file(url, Vec::new(), None).await?;
        info!("cached {url} at {}", path.display());
    }

    if args.serve {
        let proxy = RangeProxy::start(chc.lfc(), chc.http_client()).await?;
        info!("range proxy listening at {}", proxy.base_url());

        let _ = tokio::signal::ctrl_c().await;
        proxy.stop().await;
    }

    Ok(())
}
