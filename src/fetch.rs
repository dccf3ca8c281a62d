//! HTTP fetching with redirect tracking.
//!
//! All article and image requests go through a shared [`reqwest::Client`]
//! whose redirect policy is capped at ten hops. The URL returned alongside a
//! body is always the final URL after every redirect, so relative image
//! references resolve against the page that was actually served.

use reqwest::header;
use reqwest::{redirect, Client, Response};
use url::Url;

use crate::error::{Error, Result};

const MAX_REDIRECTS: usize = 10;

/// Build the shared HTTP client.
///
/// The client itself carries no timeout; callers are expected to run
/// requests under their own deadline (see [`crate::pipeline::get_epub`]).
pub fn new_client() -> Result<Client> {
    Client::builder()
        .redirect(redirect::Policy::custom(|attempt| {
            if attempt.previous().len() >= MAX_REDIRECTS {
                attempt.error("stopped after 10 redirects")
            } else {
                attempt.follow()
            }
        }))
        .build()
        .map_err(Error::Client)
}

/// HTTP GET with an optional User-Agent header.
///
/// Non-2xx responses are consumed and reported as
/// `unexpected status code: <N>`. On success the response body has not been
/// read yet; `Response::url()` is the final URL after redirects.
pub async fn get(client: &Client, url: Url, user_agent: &str) -> Result<Response> {
    let mut request = client.get(url.clone());
    if !user_agent.is_empty() {
        request = request.header(header::USER_AGENT, user_agent);
    }
    let response = request.send().await.map_err(|source| Error::Fetch {
        url: url.to_string(),
        source,
    })?;
    let status = response.status();
    if !status.is_success() {
        return Err(Error::UnexpectedStatus(status.as_u16()));
    }
    Ok(response)
}

/// Fetch an HTML page, returning the body and the final URL.
///
/// Parsing is a separate, synchronous step (see [`crate::Document::parse`]):
/// the DOM handles are not `Send`, so they must never be held across an
/// await point.
pub async fn get_html(client: &Client, url: &str, user_agent: &str) -> Result<(String, Url)> {
    let src = Url::parse(url).map_err(|source| Error::InvalidUrl {
        url: url.to_string(),
        source,
    })?;
    let response = get(client, src, user_agent).await?;
    let final_url = response.url().clone();
    let body = response.text().await.map_err(|source| Error::Fetch {
        url: final_url.to_string(),
        source,
    })?;
    Ok((body, final_url))
}
