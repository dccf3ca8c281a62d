//! Distilling a parsed page into a readable tree.
//!
//! [`distill`] walks the source DOM and builds a fresh tree containing only
//! whitelisted elements and attributes, resolving image references to local
//! filenames as it goes. Distillation is synchronous and borrows nothing
//! from the source document; the image downloads it schedules are run
//! afterwards by [`fetch_images`], one concurrent task per distinct URL.

use std::collections::HashMap;
use std::path::Path;

use bytes::Bytes;
use chrono::{SecondsFormat, Utc};
use futures_util::future::join_all;
use html5ever::Attribute;
use markup5ever_rcdom::{Handle, NodeData};
use reqwest::Client;
use url::Url;

use crate::dom::{self, Document};
use crate::error::{Error, Result};
use crate::{fetch, grayscale};

mod srcset;
mod tree;
mod whitelist;

pub use tree::{Element, Node};

const JPG_EXT: &str = ".jpg";

/// Configuration for [`distill`].
#[derive(Debug, Clone)]
pub struct ReadableOptions {
    /// Base URL of the document, used to resolve relative image URLs.
    pub base_url: Url,

    /// Directory prefix for downloaded images inside the package.
    pub images_dir: String,

    /// User-Agent used to download images.
    pub user_agent: String,

    /// Convert all images to grayscale JPEG.
    pub grayscale: bool,

    /// Downscale images to fit NxN. 0 disables downscaling.
    /// Only applies when `grayscale` is set.
    pub fit_image: u32,

    /// Minimum number of readable nodes under the first `<article>` for it
    /// to be used instead of `<body>`. 0 always uses the first article.
    pub min_article_nodes: usize,

    /// Extra nodes appended to the readable `<head>`, after the provenance
    /// markers.
    pub extra_head_nodes: Vec<Node>,
}

impl ReadableOptions {
    pub fn new(base_url: Url) -> ReadableOptions {
        ReadableOptions {
            base_url,
            images_dir: "images".to_string(),
            user_agent: String::new(),
            grayscale: false,
            fit_image: 0,
            min_article_nodes: 0,
            extra_head_nodes: Vec::new(),
        }
    }
}

/// A scheduled image download: the local filename was assigned at discovery
/// time, so downloads can complete in any order without affecting output.
#[derive(Debug, Clone)]
pub struct ImageJob {
    pub filename: String,
    pub url: Url,
}

/// A downloaded (or failed, then empty) image payload.
#[derive(Debug, Clone)]
pub struct ImageEntry {
    pub filename: String,
    pub data: Bytes,
}

/// The result of [`distill`]: the readable tree plus the image downloads it
/// scheduled, in discovery order.
#[derive(Debug, Clone)]
pub struct Distilled {
    pub root: Node,
    pub jobs: Vec<ImageJob>,
}

/// Strip the document into a readable tree.
///
/// The returned tree is rooted at `<html>` and contains a `<head>` carrying
/// three provenance `<meta itemprop>` markers, then the body: the first
/// `<article>` subtree when one exists and clears `min_article_nodes`,
/// otherwise the whole distilled `<body>`. Fails with
/// [`Error::NoBody`] when nothing usable remains.
pub fn distill(doc: &Document, opts: &ReadableOptions) -> Result<Distilled> {
    let mut distiller = Distiller {
        opts,
        mapping: HashMap::new(),
        jobs: Vec::new(),
        counter: 0,
    };

    let head = doc
        .find_first("head")
        .and_then(|head| distiller.transform(&head));
    let mut head = match head {
        Some(Node::Element(el)) => el,
        _ => Element::new("head"),
    };
    head.children.push(meta_itemprop(format!(
        "generated-by: bindery/{}",
        env!("CARGO_PKG_VERSION")
    )));
    head.children.push(meta_itemprop(format!(
        "generated-at: {}",
        Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
    )));
    head.children
        .push(meta_itemprop(format!("generated-from: {}", opts.base_url)));
    for node in &opts.extra_head_nodes {
        head.children.push(node.clone());
    }

    let mut article_handle = doc.find_first("article");
    if let Some(article) = &article_handle {
        if opts.min_article_nodes > 0 {
            let (count, has_min) = count_readable_nodes(article, opts.min_article_nodes);
            tracing::debug!(
                nodes = count,
                min = opts.min_article_nodes,
                has_min,
                "found article node"
            );
            if !has_min {
                article_handle = None;
            }
        }
    }

    let article = article_handle.and_then(|article| distiller.transform(&article));
    let body = match article {
        Some(node) => {
            let mut body = Element::new("body");
            body.children.push(node);
            body
        }
        None => {
            let body = doc
                .find_first("body")
                .and_then(|body| distiller.transform(&body));
            match body {
                Some(Node::Element(el)) => el,
                _ => return Err(Error::NoBody),
            }
        }
    };

    let mut root = Element::new("html");
    let lang = doc.lang();
    if !lang.is_empty() {
        root.attrs.push(("lang".to_string(), lang));
    }
    root.children.push(Node::Element(head));
    root.children.push(Node::Element(body));

    Ok(Distilled {
        root: Node::Element(root),
        jobs: distiller.jobs,
    })
}

/// Run the scheduled image downloads concurrently.
///
/// Returns one entry per job, in the same (discovery) order. A failed
/// download is logged and yields an empty payload rather than failing the
/// request; a failed grayscale transform falls back to the original bytes.
pub async fn fetch_images(
    client: &Client,
    opts: &ReadableOptions,
    jobs: Vec<ImageJob>,
) -> Vec<ImageEntry> {
    let tasks = jobs.into_iter().map(|job| {
        let client = client.clone();
        let user_agent = opts.user_agent.clone();
        let grayscale = opts.grayscale;
        let fit = opts.fit_image;
        async move {
            let data = download_image(&client, &job.url, &user_agent, grayscale, fit).await;
            ImageEntry {
                filename: job.filename,
                data,
            }
        }
    });
    join_all(tasks).await
}

/// Parse, distill, and download in one call.
///
/// The source document only lives inside this function's synchronous scope,
/// so the returned future is `Send`.
pub async fn readable(
    client: &Client,
    html: &str,
    opts: &ReadableOptions,
) -> Result<(Node, Vec<ImageEntry>)> {
    let distilled = {
        let doc = Document::parse(html);
        distill(&doc, opts)?
    };
    let images = fetch_images(client, opts, distilled.jobs).await;
    Ok((distilled.root, images))
}

fn meta_itemprop(value: String) -> Node {
    Node::Element(Element::new("meta").with_attr("itemprop", &value))
}

async fn download_image(
    client: &Client,
    url: &Url,
    user_agent: &str,
    grayscale: bool,
    fit: u32,
) -> Bytes {
    let response = match fetch::get(client, url.clone(), user_agent).await {
        Ok(response) => response,
        Err(err) => {
            tracing::error!(url = %url, %err, "error while trying to get image");
            return Bytes::new();
        }
    };
    let data = match response.bytes().await {
        Ok(data) => data,
        Err(err) => {
            tracing::error!(url = %url, %err, "error while reading image body");
            return Bytes::new();
        }
    };
    if !grayscale {
        return data;
    }
    let original = data.clone();
    match tokio::task::spawn_blocking(move || grayscale::transform(&data, fit)).await {
        Ok(Ok(jpeg)) => Bytes::from(jpeg),
        Ok(Err(err)) => {
            tracing::error!(url = %url, %err, "error while trying to grayscale");
            original
        }
        Err(err) => {
            tracing::error!(url = %url, %err, "grayscale task failed");
            original
        }
    }
}

struct Distiller<'a> {
    opts: &'a ReadableOptions,
    // Absolute source URL -> assigned local filename.
    mapping: HashMap<String, String>,
    jobs: Vec<ImageJob>,
    counter: usize,
}

impl Distiller<'_> {
    /// Transform one source node into its readable mirror, or drop it.
    fn transform(&mut self, handle: &Handle) -> Option<Node> {
        match handle.data {
            NodeData::Text { ref contents } => {
                let text = contents.borrow();
                if text.trim().is_empty() {
                    return None;
                }
                Some(Node::Text(text.to_string()))
            }
            NodeData::Element { ref name, .. } => {
                if name.local.as_ref() == "noscript" {
                    // A noscript block is only interesting when its single
                    // text child is itself HTML containing an image; that
                    // image replaces the whole block.
                    let inner = single_text_child(handle)?;
                    let doc = Document::parse(&inner);
                    let img = dom::find_first(doc.document(), "img")?;
                    return self.transform_element(&img);
                }
                self.transform_element(handle)
            }
            _ => None,
        }
    }

    fn transform_element(&mut self, handle: &Handle) -> Option<Node> {
        let NodeData::Element {
            ref name,
            ref attrs,
            ..
        } = handle.data
        else {
            return None;
        };
        let mut tag = name.local.as_ref();
        if let Some(alias) = whitelist::amp_alias(tag) {
            tag = alias;
        }
        let allowed = whitelist::allowed_attrs(tag)?;

        if whitelist::is_img_tag(tag) {
            // Image elements are emitted without children: they render as
            // void tags, and amp-img fallback children would make the
            // serializer fail.
            return self.transform_image(name.local.as_ref(), &attrs.borrow()[..]);
        }

        let mut el = Element::new(tag);
        for attr in attrs.borrow().iter() {
            let key = attr.name.local.as_ref();
            if allowed.iter().any(|allowed_key| *allowed_key == key) {
                el.attrs.push((key.to_string(), attr.value.to_string()));
            }
        }
        for child in handle.children.borrow().iter() {
            if let Some(node) = self.transform(child) {
                el.children.push(node);
            }
        }
        if el.attrs.is_empty() && el.children.is_empty() && !whitelist::keep_when_empty(tag) {
            return None;
        }
        Some(Node::Element(el))
    }

    /// Emit an `<img>` with its `src` pointed at a local filename, assigning
    /// a new one and scheduling a download on first sight of the URL.
    fn transform_image(&mut self, source_tag: &str, attrs: &[Attribute]) -> Option<Node> {
        // Candidate order: src, then lazy-loading alternatives, then the
        // highest-width srcset entry. The alternatives apply to <img> only;
        // a <source> is resolved from src/srcset alone.
        let mut url = attr_value(attrs, "src")
            .and_then(|v| srcset::try_parse_img_url(&self.opts.base_url, v));
        if url.is_none() && source_tag != "source" {
            for &alt in whitelist::IMG_SRC_ALTERNATIVES {
                url = attr_value(attrs, alt)
                    .and_then(|v| srcset::try_parse_img_url(&self.opts.base_url, v));
                if url.is_some() {
                    break;
                }
            }
        }
        if url.is_none() {
            url = attr_value(attrs, "srcset")
                .and_then(|v| srcset::parse_srcset(&self.opts.base_url, v));
        }
        // No usable source: drop the element entirely.
        let url = url?;

        let filename = match self.mapping.get(url.as_str()) {
            // This image URL already appeared before; reuse the same local
            // file.
            Some(existing) => existing.clone(),
            None => {
                self.counter += 1;
                let ext = if self.opts.grayscale {
                    JPG_EXT.to_string()
                } else {
                    url_extension(&url)
                };
                let name = format!("{:03}{}", self.counter, ext);
                let filename = if self.opts.images_dir.is_empty() {
                    name
                } else {
                    format!("{}/{}", self.opts.images_dir, name)
                };
                self.mapping.insert(url.to_string(), filename.clone());
                self.jobs.push(ImageJob {
                    filename: filename.clone(),
                    url,
                });
                filename
            }
        };

        let mut el = Element::new("img");
        el.attrs.push(("src".to_string(), filename));
        if source_tag != "source" {
            if let Some(alt) = attr_value(attrs, "alt") {
                el.attrs.push(("alt".to_string(), alt.to_string()));
            }
        }
        Some(Node::Element(el))
    }
}

fn attr_value<'a>(attrs: &'a [Attribute], key: &str) -> Option<&'a str> {
    attrs
        .iter()
        .find(|attr| attr.name.local.as_ref() == key)
        .map(|attr| &*attr.value)
}

fn url_extension(url: &Url) -> String {
    Path::new(url.path())
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default()
}

fn single_text_child(handle: &Handle) -> Option<String> {
    let children = handle.children.borrow();
    if children.len() != 1 {
        return None;
    }
    match children[0].data {
        NodeData::Text { ref contents } => Some(contents.borrow().to_string()),
        _ => None,
    }
}

/// Count whitelisted element and non-whitespace text nodes under `handle`,
/// short-circuiting as soon as `min` is reached.
fn count_readable_nodes(handle: &Handle, min: usize) -> (usize, bool) {
    match handle.data {
        NodeData::Text { ref contents } => {
            if contents.borrow().trim().is_empty() {
                (0, false)
            } else if min <= 1 {
                (0, true)
            } else {
                (1, false)
            }
        }
        NodeData::Element { ref name, .. } => {
            if whitelist::allowed_attrs(name.local.as_ref()).is_none() {
                return (0, false);
            }
            if min <= 1 {
                return (0, true);
            }
            let mut count = 1usize;
            let mut remaining = min - 1;
            for child in handle.children.borrow().iter() {
                let (sub, hit) = count_readable_nodes(child, remaining);
                if hit {
                    return (0, true);
                }
                count += sub;
                remaining = remaining.saturating_sub(sub);
            }
            (count, false)
        }
        _ => (0, false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_short_circuits_at_threshold() {
        let doc = Document::parse(
            "<html><body><article><p>a</p><p>b</p><p>c</p></article></body></html>",
        );
        let article = doc.find_first("article").unwrap();
        let (_, has_min) = count_readable_nodes(&article, 3);
        assert!(has_min);
    }

    #[test]
    fn test_count_below_threshold() {
        let doc = Document::parse(
            "<html><body><article><p>a</p><p>b</p><p>c</p></article></body></html>",
        );
        let article = doc.find_first("article").unwrap();
        // article + three paragraphs + three text nodes
        let (count, has_min) = count_readable_nodes(&article, 20);
        assert!(!has_min);
        assert_eq!(count, 7);
    }

    #[test]
    fn test_count_skips_non_whitelisted_subtrees() {
        let doc = Document::parse(
            "<html><body><article><iframe><p>x</p></iframe></article></body></html>",
        );
        let article = doc.find_first("article").unwrap();
        let (count, has_min) = count_readable_nodes(&article, 20);
        assert!(!has_min);
        assert_eq!(count, 1);
    }

    #[test]
    fn test_url_extension() {
        let url = Url::parse("https://example.com/a/b.png?v=2").unwrap();
        assert_eq!(url_extension(&url), ".png");
        let url = Url::parse("https://example.com/a/b").unwrap();
        assert_eq!(url_extension(&url), "");
    }
}
