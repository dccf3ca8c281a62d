//! bindery - web article to EPUB service

use std::process::ExitCode;

use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use clap::Parser;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

use bindery::readable::{Element, Node};
use bindery::{pipeline, EpubRequest, EPUB_MIME_TYPE};

#[derive(Parser)]
#[command(name = "bindery")]
#[command(version, about = "Web article to EPUB service", long_about = None)]
struct Cli {
    /// Address to listen on
    #[arg(long, default_value = "0.0.0.0:8080")]
    listen: String,

    /// Default User-Agent for article and image fetches
    #[arg(long)]
    user_agent: Option<String>,
}

#[derive(Clone)]
struct AppState {
    client: reqwest::Client,
    user_agent: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> bindery::Result<()> {
    let user_agent = cli
        .user_agent
        .unwrap_or_else(|| format!("bindery/{}", env!("CARGO_PKG_VERSION")));
    let state = AppState {
        client: bindery::fetch::new_client()?,
        user_agent,
    };

    let app = Router::new()
        .route("/epub", get(epub_handler).post(epub_handler))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&cli.listen).await?;
    tracing::info!(addr = %cli.listen, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}

#[derive(Debug, Deserialize)]
struct EpubQuery {
    url: Option<String>,
    gray: Option<String>,
    fit: Option<String>,
    lang: Option<String>,
    #[serde(rename = "font-size")]
    font_size: Option<String>,
    #[serde(rename = "passthrough-user-agent")]
    passthrough_user_agent: Option<String>,
}

async fn epub_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<EpubQuery>,
) -> Response {
    let mut user_agent = state.user_agent.clone();
    if parse_bool(query.passthrough_user_agent.as_deref()) {
        if let Some(caller_ua) = headers.get(header::USER_AGENT).and_then(|v| v.to_str().ok()) {
            if !caller_ua.is_empty() {
                user_agent = caller_ua.to_string();
            }
        }
    }

    let mut req = EpubRequest::new(query.url.unwrap_or_default());
    req.user_agent = user_agent;
    req.override_lang = query.lang.unwrap_or_default();
    req.grayscale = parse_bool(query.gray.as_deref());
    req.fit_image = query
        .fit
        .as_deref()
        .and_then(|fit| fit.parse().ok())
        .unwrap_or(0);
    req.extra_head_nodes = font_size_style_nodes(query.font_size.as_deref().unwrap_or_default());

    match pipeline::get_epub(&state.client, &req).await {
        Ok(epub) => {
            let disposition = format!(
                "attachment; filename*=UTF-8''{}.epub",
                percent_encode_filename(&epub.title)
            );
            (
                [
                    (header::CONTENT_TYPE, EPUB_MIME_TYPE.to_string()),
                    (header::CONTENT_DISPOSITION, disposition),
                ],
                epub.data,
            )
                .into_response()
        }
        Err(err) => (StatusCode::BAD_REQUEST, err.to_string()).into_response(),
    }
}

/// Accepted bool spellings, everything else (including absence) reads false.
fn parse_bool(value: Option<&str>) -> bool {
    matches!(value, Some("1" | "t" | "T" | "true" | "TRUE" | "True"))
}

/// A `<style>` head node setting the root font size, when requested.
fn font_size_style_nodes(size: &str) -> Vec<Node> {
    if size.is_empty() {
        return Vec::new();
    }
    let mut style = Element::new("style");
    style
        .children
        .push(Node::Text(format!("\nhtml {{\n\tfont-size: {size};\n}}\n")));
    vec![Node::Element(style)]
}

// RFC 5987 attr-char: keep unreserved characters only.
const FILENAME_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

fn percent_encode_filename(title: &str) -> String {
    utf8_percent_encode(title, FILENAME_ENCODE_SET).to_string()
}
