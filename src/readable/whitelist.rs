//! Element and attribute whitelists for distillation.
//!
//! Everything not listed here is stripped from the readable tree.

/// The attributes kept for a whitelisted tag, or `None` when the tag itself
/// is stripped. Structural tags keep no attributes at all.
pub(crate) fn allowed_attrs(tag: &str) -> Option<&'static [&'static str]> {
    match tag {
        "a" => Some(&["href"]),
        "abbr" | "acronym" => Some(&["title"]),
        "html" => Some(&["lang"]),
        // Width and height are dropped on purpose: the image may be
        // downscaled later.
        "img" => Some(&["src", "srcset", "alt"]),
        "source" => Some(&["src", "srcset", "type"]),
        t if is_structural(t) => Some(&[]),
        _ => None,
    }
}

fn is_structural(tag: &str) -> bool {
    matches!(
        tag,
        "article"
            | "b"
            | "big"
            | "blockquote"
            | "body"
            | "br"
            | "center"
            | "cite"
            | "code"
            | "content"
            | "del"
            | "details"
            | "dd"
            | "dfn"
            | "div"
            | "dl"
            | "dt"
            | "em"
            | "figure"
            | "figcaption"
            | "footer"
            | "h1"
            | "h2"
            | "h3"
            | "h4"
            | "h5"
            | "h6"
            | "head"
            | "header"
            | "i"
            | "li"
            | "main"
            | "mark"
            | "noscript"
            | "ol"
            | "p"
            | "picture"
            | "pre"
            | "q"
            | "s"
            | "section"
            | "small"
            | "span"
            | "strike"
            | "strong"
            | "sub"
            | "summary"
            | "sup"
            | "table"
            | "tbody"
            | "tfoot"
            | "td"
            | "th"
            | "thead"
            | "tr"
            | "time"
            | "title"
            | "u"
            | "ul"
    )
}

/// Tags kept even when they end up with no attributes and no children.
pub(crate) fn keep_when_empty(tag: &str) -> bool {
    matches!(tag, "br" | "td")
}

/// Tags that go through image handling.
pub(crate) fn is_img_tag(tag: &str) -> bool {
    matches!(tag, "img" | "source")
}

/// AMP elements rewritten to their standard equivalents before filtering.
pub(crate) fn amp_alias(tag: &str) -> Option<&'static str> {
    match tag {
        "amp-img" => Some("img"),
        _ => None,
    }
}

/// Lazy-loading attributes consulted for an `<img>` URL when `src` is
/// unusable. Discovery only; they are never copied to the output, and they
/// do not apply to `<source>` elements.
pub(crate) const IMG_SRC_ALTERNATIVES: &[&str] = &["nitro-lazy-src", "data-src"];
