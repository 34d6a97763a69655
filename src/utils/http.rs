use reqwest::Client;
use std::time::Duration;

/// Build a `reqwest::Client` with standard timeouts (10 s connect, 30 s overall).
///
/// Falls back to the default client if the builder fails.
pub fn default_http_client() -> Client {
    Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(30))
        .build()
        .unwrap_or_else(|_| Client::new())
}

/// Client for long-poll endpoints: the overall timeout must outlast the
/// server-side hold of `poll_timeout_secs`.
pub fn long_poll_http_client(poll_timeout_secs: u64) -> Client {
    Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(poll_timeout_secs + 15))
        .build()
        .unwrap_or_else(|_| Client::new())
}
