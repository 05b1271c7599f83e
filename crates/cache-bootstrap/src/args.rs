use clap::Parser;

/// Exercises the caching HTTP layer from the command line: fetch a URL
/// through the cached HTTP coordinator and, optionally, serve it back out
/// over the local range proxy.
#[derive(Parser, Debug)]
#[command(name = "cache-bootstrap", version, about)]
pub struct Args {
    /// URL to resolve through the cached HTTP coordinator.
    pub url: Option<String>,

    /// Start the loopback range-proxy server and print its base URL.
    #[arg(long)]
    pub serve: bool,

    /// Maximum size, in bytes, of the coordinator's LRU file cache.
    #[arg(long)]
    pub max_cache_size: Option<u64>,
}
