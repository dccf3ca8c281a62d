//! The article-to-EPUB pipeline controller.
//!
//! [`get_epub`] sequences the whole flow (fetch, AMP fallback,
//! distillation, image downloads, packaging) under a single deadline.
//! Cancellation is the drop-the-future model: when the deadline elapses,
//! in-flight fetches and downloads are dropped and the packager is never
//! invoked.

use std::io::Cursor;
use std::time::{Duration, Instant};

use reqwest::Client;
use tokio::sync::oneshot;
use tokio::time::timeout;

use crate::dom::Document;
use crate::epub::{write_epub, EpubArgs};
use crate::error::{Error, Result};
use crate::fetch;
use crate::readable::{self, Node, ReadableOptions};

/// Total cap on fetching, distilling, and downloading images for one
/// article.
pub const EPUB_TIMEOUT: Duration = Duration::from_secs(15);

/// Default threshold for preferring an `<article>` subtree over `<body>`.
pub const DEFAULT_MIN_ARTICLE_NODES: usize = 20;

const ARCHIVE_PREFIX: &str = "https://archive.is/";
const ARCHIVE_NEWEST: &str = "https://archive.is/newest/";

/// One article-to-EPUB request.
#[derive(Debug, Clone)]
pub struct EpubRequest {
    pub url: String,

    /// User-Agent for the article fetch and all image fetches.
    pub user_agent: String,

    /// If non-empty, overrides the language detected from the page.
    pub override_lang: String,

    /// Convert images to grayscale JPEG.
    pub grayscale: bool,

    /// Maximum image edge size; 0 disables downscaling.
    pub fit_image: u32,

    pub min_article_nodes: usize,

    /// Extra nodes injected into the readable `<head>`.
    pub extra_head_nodes: Vec<Node>,
}

impl EpubRequest {
    pub fn new(url: impl Into<String>) -> EpubRequest {
        EpubRequest {
            url: url.into(),
            user_agent: String::new(),
            override_lang: String::new(),
            grayscale: false,
            fit_image: 0,
            min_article_nodes: DEFAULT_MIN_ARTICLE_NODES,
            extra_head_nodes: Vec::new(),
        }
    }
}

/// A packaged article, ready for delivery to a sink.
#[derive(Debug, Clone)]
pub struct Epub {
    /// The package's `dc:identifier` (a UUIDv4).
    pub id: String,
    pub title: String,
    pub data: Vec<u8>,
}

/// Convert the article at `req.url` into an EPUB.
pub async fn get_epub(client: &Client, req: &EpubRequest) -> Result<Epub> {
    let start = Instant::now();
    let result = match timeout(EPUB_TIMEOUT, generate(client, req)).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout(EPUB_TIMEOUT)),
    };
    match &result {
        Ok(epub) => tracing::debug!(
            took = ?start.elapsed(),
            url = %req.url,
            id = %epub.id,
            title = %epub.title,
            size = epub.data.len(),
            "epub generated"
        ),
        Err(err) => tracing::error!(
            took = ?start.elapsed(),
            url = %req.url,
            %err,
            "epub generation failed"
        ),
    }
    result
}

async fn generate(client: &Client, req: &EpubRequest) -> Result<Epub> {
    let (mut html, mut base_url) = fetch::get_html(client, &req.url, &req.user_agent).await?;

    // When the page is not already AMP but advertises an AMP version, prefer
    // that: AMP pages distill much more cleanly. Failure here is not fatal.
    let amp_target = {
        let doc = Document::parse(&html);
        if !doc.is_amp() {
            let amp_url = doc.amp_url();
            if amp_url.is_empty() {
                None
            } else {
                base_url.join(&amp_url).ok()
            }
        } else {
            None
        }
    };
    if let Some(amp_url) = amp_target {
        match fetch::get_html(client, amp_url.as_str(), &req.user_agent).await {
            Ok((amp_html, amp_base)) => {
                html = amp_html;
                base_url = amp_base;
            }
            Err(err) => {
                tracing::warn!(url = %amp_url, %err, "unable to fetch AMP page, using original");
            }
        }
    }

    let opts = ReadableOptions {
        base_url,
        images_dir: "images".to_string(),
        user_agent: req.user_agent.clone(),
        grayscale: req.grayscale,
        fit_image: req.fit_image,
        min_article_nodes: req.min_article_nodes,
        extra_head_nodes: req.extra_head_nodes.clone(),
    };
    // The document is parsed and dropped inside this scope: its handles are
    // not Send and must not live across the downloads below.
    let (meta, distilled) = {
        let doc = Document::parse(&html);
        let meta = doc.meta();
        let distilled = readable::distill(&doc, &opts)?;
        (meta, distilled)
    };
    if distilled.root.element().is_none() {
        // Should not happen: distill always roots the tree at an element.
        return Err(Error::UnsupportedUrl(req.url.clone()));
    }

    let images = readable::fetch_images(client, &opts, distilled.jobs).await;

    let mut buf = Cursor::new(Vec::new());
    let id = write_epub(
        &mut buf,
        &EpubArgs {
            title: &meta.title,
            author: &meta.author,
            root: &distilled.root,
            override_lang: &req.override_lang,
            images: &images,
        },
    )?;
    Ok(Epub {
        id,
        title: meta.title,
        data: buf.into_inner(),
    })
}

/// The archive.is URL to retry with, unless the URL already points there.
pub fn archive_fallback_url(url: &str) -> Option<String> {
    if url.starts_with(ARCHIVE_PREFIX) {
        return None;
    }
    Some(format!("{ARCHIVE_NEWEST}{url}"))
}

/// Run a second attempt on a detached task.
///
/// The task is not tied to the caller's future, so it survives the caller
/// giving up; the result arrives on the returned channel. Intended for
/// archive.is retries after a failed first attempt (see
/// [`archive_fallback_url`]).
pub fn spawn_detached_retry(client: Client, req: EpubRequest) -> oneshot::Receiver<Result<Epub>> {
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
        let result = get_epub(&client, &req).await;
        let _ = tx.send(result);
    });
    rx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_archive_fallback_url() {
        assert_eq!(
            archive_fallback_url("https://example.com/a").as_deref(),
            Some("https://archive.is/newest/https://example.com/a")
        );
        assert_eq!(archive_fallback_url("https://archive.is/abc"), None);
        assert_eq!(archive_fallback_url("https://archive.is/newest/x"), None);
    }
}
