//! HTTP client construction.

use std::time::Duration;

const KEEP_ALIVE: Duration = Duration::from_secs(30);

/// Build the HTTP client shared by sources and the sender.
///
/// `connect_timeout` bounds connection establishment; `request_timeout`,
/// when set, bounds each whole request. Proxies are taken from the
/// environment.
pub fn new_client(
    skip_tls_verification: bool,
    connect_timeout: Duration,
    request_timeout: Option<Duration>,
) -> reqwest::Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .danger_accept_invalid_certs(skip_tls_verification)
        .min_tls_version(reqwest::tls::Version::TLS_1_2)
        .connect_timeout(connect_timeout)
        .tcp_keepalive(KEEP_ALIVE);

    if let Some(timeout) = request_timeout {
        builder = builder.timeout(timeout);
    }

    builder.build()
}
