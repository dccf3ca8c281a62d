//! Read-only access to a parsed HTML document.
//!
//! [`Document`] wraps an html5ever [`RcDom`] and exposes the handful of
//! lookups the pipeline needs: first element by tag, language, AMP
//! detection, and title/author extraction. The handles are `Rc`-based and
//! not `Send`; callers extract what they need into owned values (see
//! [`Document::meta`]) before crossing an await point.

use std::collections::HashMap;

use html5ever::tendril::TendrilSink;
use html5ever::tree_builder::TreeBuilderOpts;
use html5ever::{parse_document, ParseOpts};
use markup5ever_rcdom::{Handle, NodeData, RcDom};

use crate::util::decode_html_entities;

/// A parsed HTML document.
pub struct Document {
    dom: RcDom,
}

/// Owned snapshot of the document metadata the pipeline cares about.
#[derive(Debug, Clone, Default)]
pub struct PageMeta {
    pub title: String,
    pub author: String,
    pub lang: String,
    pub is_amp: bool,
    pub amp_url: String,
}

impl Document {
    /// Parse HTML with the permissive html5ever parser.
    ///
    /// Parsing never fails; malformed input produces a best-effort tree the
    /// same way a browser would.
    pub fn parse(html: &str) -> Document {
        let opts = ParseOpts {
            tree_builder: TreeBuilderOpts {
                drop_doctype: true,
                ..Default::default()
            },
            ..Default::default()
        };
        let dom = parse_document(RcDom::default(), opts)
            .from_utf8()
            .one(html.as_bytes());
        Document { dom }
    }

    /// The document root handle (above `<html>`).
    pub fn document(&self) -> &Handle {
        &self.dom.document
    }

    /// The first `<html>` element.
    pub fn html(&self) -> Option<Handle> {
        self.find_first("html")
    }

    /// Depth-first search for the first element with the given tag name.
    pub fn find_first(&self, tag: &str) -> Option<Handle> {
        find_first(&self.dom.document, tag)
    }

    /// The `lang` attribute of the `<html>` element, or empty.
    pub fn lang(&self) -> String {
        self.html()
            .and_then(|html| get_attr(&html, "lang"))
            .unwrap_or_default()
    }

    /// True iff the `<html>` element carries an `amp` or `⚡` attribute.
    pub fn is_amp(&self) -> bool {
        let Some(html) = self.html() else {
            return false;
        };
        if let NodeData::Element { ref attrs, .. } = html.data {
            attrs.borrow().iter().any(|attr| {
                let key = attr.name.local.as_ref();
                key == "amp" || key == "⚡"
            })
        } else {
            false
        }
    }

    /// The `href` of the first `<link rel="amphtml">` in `<head>`, or empty.
    pub fn amp_url(&self) -> String {
        let Some(head) = self.find_first("head") else {
            return String::new();
        };
        for child in head.children.borrow().iter() {
            if element_name(child) != Some("link") {
                continue;
            }
            let attrs = attr_map(child);
            if attrs.get("rel").map(String::as_str) == Some("amphtml") {
                return attrs.get("href").cloned().unwrap_or_default();
            }
        }
        String::new()
    }

    /// The document title.
    ///
    /// `og:title` from the meta header is preferred over `<title>`.
    pub fn title(&self) -> String {
        let Some(head) = self.find_first("head") else {
            return String::new();
        };
        for child in head.children.borrow().iter() {
            if element_name(child) != Some("meta") {
                continue;
            }
            let attrs = attr_map(child);
            if attrs.get("property").map(String::as_str) == Some("og:title") {
                if let Some(title) = attrs.get("content") {
                    return decode_html_entities(title).into_owned();
                }
            }
        }
        if let Some(title) = find_first(&head, "title") {
            for child in title.children.borrow().iter() {
                if let NodeData::Text { ref contents } = child.data {
                    return decode_html_entities(contents.borrow().trim()).into_owned();
                }
            }
        }
        String::new()
    }

    /// The document author from `<meta name="author">` or
    /// `<meta property="author">`, or empty.
    pub fn author(&self) -> String {
        let Some(head) = self.find_first("head") else {
            return String::new();
        };
        for child in head.children.borrow().iter() {
            if element_name(child) != Some("meta") {
                continue;
            }
            let attrs = attr_map(child);
            if attrs.get("name").map(String::as_str) == Some("author")
                || attrs.get("property").map(String::as_str) == Some("author")
            {
                return attrs
                    .get("content")
                    .map(|content| decode_html_entities(content).into_owned())
                    .unwrap_or_default();
            }
        }
        String::new()
    }

    /// Extract all accessor results into one owned struct.
    pub fn meta(&self) -> PageMeta {
        PageMeta {
            title: self.title(),
            author: self.author(),
            lang: self.lang(),
            is_amp: self.is_amp(),
            amp_url: self.amp_url(),
        }
    }
}

/// Get the first element with the given local name, depth first.
pub(crate) fn find_first(handle: &Handle, tag: &str) -> Option<Handle> {
    if element_name(handle) == Some(tag) {
        return Some(handle.clone());
    }
    for child in handle.children.borrow().iter() {
        if let Some(found) = find_first(child, tag) {
            return Some(found);
        }
    }
    None
}

/// The element's local tag name, if it is an element.
pub(crate) fn element_name(handle: &Handle) -> Option<&str> {
    if let NodeData::Element { ref name, .. } = handle.data {
        Some(name.local.as_ref())
    } else {
        None
    }
}

/// Get an attribute value from an element.
pub(crate) fn get_attr(handle: &Handle, attr_name: &str) -> Option<String> {
    if let NodeData::Element { ref attrs, .. } = handle.data {
        for attr in attrs.borrow().iter() {
            if attr.name.local.as_ref() == attr_name {
                return Some(attr.value.to_string());
            }
        }
    }
    None
}

/// Collect an element's attributes into a map.
pub(crate) fn attr_map(handle: &Handle) -> HashMap<String, String> {
    let mut map = HashMap::new();
    if let NodeData::Element { ref attrs, .. } = handle.data {
        for attr in attrs.borrow().iter() {
            map.insert(attr.name.local.to_string(), attr.value.to_string());
        }
    }
    map
}
