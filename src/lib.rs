//! # bindery
//!
//! A library for turning web articles into self-contained EPUB 3 documents.
//!
//! ## Features
//!
//! - Fetch an article over HTTP with redirect tracking and AMP fallback
//! - Distill the page into a whitelisted "readable" tree
//! - Download referenced images concurrently, optionally grayscaled and
//!   downscaled to fit an e-reader screen
//! - Package everything as a valid EPUB 3.0 file
//!
//! ## Quick Start
//!
//! ```no_run
//! # async fn run() -> bindery::Result<()> {
//! let client = bindery::fetch::new_client()?;
//! let req = bindery::EpubRequest::new("https://example.com/article");
//! let epub = bindery::get_epub(&client, &req).await?;
//! std::fs::write(format!("{}.epub", epub.id), &epub.data)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Working with the pieces
//!
//! The pipeline stages are exposed individually: [`fetch::get_html`] fetches
//! a page and reports the final URL after redirects, [`Document`] gives
//! read-only access to the parsed DOM, [`distill`] strips it down to the
//! readable tree and schedules image downloads, [`fetch_images`] runs the
//! downloads, and [`write_epub`] packages the result. [`get_epub`] sequences
//! all of the above under a deadline.

pub mod dom;
pub mod epub;
pub mod error;
pub mod fetch;
pub mod grayscale;
pub mod pipeline;
pub mod readable;
pub mod sink;
pub(crate) mod util;

pub use dom::{Document, PageMeta};
pub use epub::{write_epub, EpubArgs, EPUB_MIME_TYPE};
pub use error::{Error, Result};
pub use pipeline::{get_epub, Epub, EpubRequest};
pub use readable::{
    distill, fetch_images, Distilled, Element, ImageEntry, ImageJob, Node, ReadableOptions,
};
