//! Live channels that talk to the real image hosts.

pub mod chatglm;
pub mod jd;
pub mod miyoushe;

use std::time::Duration;

use reqwest::Client;

/// Build the HTTP client shared by browser-mimicking channels.
///
/// Header names go out in Title-Case on HTTP/1 so requests look like the
/// clients these hosts expect.
///
/// # Errors
///
/// Returns an error if the TLS backend cannot be initialized.
pub fn browser_client(timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder().timeout(timeout).http1_title_case_headers().build()
}

/// Build a plain HTTP client with the given per-request timeout.
///
/// # Errors
///
/// Returns an error if the TLS backend cannot be initialized.
pub fn plain_client(timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder().timeout(timeout).build()
}
