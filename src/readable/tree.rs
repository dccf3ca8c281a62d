//! The owned output tree produced by distillation.
//!
//! Unlike the source DOM, the readable tree owns its nodes outright
//! (parent-owns-children, no shared handles), which makes it `Send` and lets
//! the pipeline carry it across await points while image downloads run.

use crate::error::{Error, Result};
use crate::util::escape_xml;

/// A node in the readable tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element(Element),
    Text(String),
}

/// An element node: tag, attributes in insertion order, owned children.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub tag: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(tag: &str) -> Element {
        Element {
            tag: tag.to_string(),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn with_attr(mut self, key: &str, value: &str) -> Element {
        self.attrs.push((key.to_string(), value.to_string()));
        self
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

impl Node {
    pub fn element(&self) -> Option<&Element> {
        match self {
            Node::Element(el) => Some(el),
            Node::Text(_) => None,
        }
    }

    /// Serialize the node as XHTML.
    pub fn to_xhtml(&self) -> Result<String> {
        let mut out = String::new();
        serialize_xhtml(self, &mut out)?;
        Ok(out)
    }
}

impl From<Element> for Node {
    fn from(el: Element) -> Node {
        Node::Element(el)
    }
}

/// Void elements are rendered self-closing and must not have children.
fn is_void(tag: &str) -> bool {
    matches!(
        tag,
        "area"
            | "base"
            | "br"
            | "col"
            | "embed"
            | "hr"
            | "img"
            | "input"
            | "link"
            | "meta"
            | "param"
            | "source"
            | "track"
            | "wbr"
    )
}

pub(crate) fn serialize_xhtml(node: &Node, out: &mut String) -> Result<()> {
    match node {
        Node::Text(text) => {
            out.push_str(&escape_xml(text));
            Ok(())
        }
        Node::Element(el) => {
            out.push('<');
            out.push_str(&el.tag);
            for (key, value) in &el.attrs {
                out.push(' ');
                out.push_str(key);
                out.push_str("=\"");
                out.push_str(&escape_xml(value));
                out.push('"');
            }
            if is_void(&el.tag) {
                if !el.children.is_empty() {
                    return Err(Error::VoidElementWithChildren(el.tag.clone()));
                }
                out.push_str("/>");
                return Ok(());
            }
            out.push('>');
            for child in &el.children {
                serialize_xhtml(child, out)?;
            }
            out.push_str("</");
            out.push_str(&el.tag);
            out.push('>');
            Ok(())
        }
    }
}
