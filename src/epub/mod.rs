//! EPUB 3.0 packaging.
//!
//! The entry order and compression discipline are load-bearing: `mimetype`
//! must be the first entry in the ZIP and must be stored uncompressed for
//! the file to be recognized as an EPUB.

use std::io::{Seek, Write};

use chrono::{SecondsFormat, Utc};
use uuid::Uuid;
use zip::ZipWriter;

use crate::error::{Error, Result};
use crate::readable::{ImageEntry, Node};
use crate::util::escape_xml;

mod ziputil;

/// The EPUB MIME type.
pub const EPUB_MIME_TYPE: &str = "application/epub+zip";

const CONTENT_DIR: &str = "content";
const ARTICLE_FILENAME: &str = "article.xhtml";
const NAV_FILENAME: &str = "nav.xhtml";
const OPF_PATH: &str = "content/content.opf";

const XHTML_NS: &str = "http://www.w3.org/1999/xhtml";

const CONTAINER_XML: &str = r#"<?xml version="1.0"?>
<container xmlns="urn:oasis:names:tc:opendocument:xmlns:container" version="1.0">
 <rootfiles>
  <rootfile full-path="content/content.opf" media-type="application/oebps-package+xml"/>
 </rootfiles>
</container>
"#;

/// Everything needed to package one article.
pub struct EpubArgs<'a> {
    /// The title of the epub.
    pub title: &'a str,

    /// The author of the epub, if any.
    pub author: &'a str,

    /// The readable tree rooted at `<html>`.
    pub root: &'a Node,

    /// If non-empty, overrides the language detected from the tree.
    pub override_lang: &'a str,

    /// Downloaded images, in manifest order.
    pub images: &'a [ImageEntry],
}

/// Create an EPUB 3.0 file from the given content.
///
/// Returns the freshly generated UUIDv4 written as the package's
/// `dc:identifier`.
pub fn write_epub<W: Write + Seek>(dest: W, args: &EpubArgs<'_>) -> Result<String> {
    let id = Uuid::new_v4().to_string();
    let mut zip = ZipWriter::new(dest);
    let written = write_entries(&mut zip, &id, args);
    let finished = zip.finish().map(|_| ()).map_err(Error::from);
    written.and(finished)?;
    Ok(id)
}

fn write_entries<W: Write + Seek>(
    zip: &mut ZipWriter<W>,
    id: &str,
    args: &EpubArgs<'_>,
) -> Result<()> {
    // mimetype must be the first file in the zip, and must use Store
    // instead of Deflate.
    ziputil::store_file(zip, "mimetype", EPUB_MIME_TYPE.as_bytes())?;

    ziputil::write_file(zip, "META-INF/container.xml", CONTAINER_XML.as_bytes())?;

    let article = article_xhtml(args.root)?;
    ziputil::write_file(
        zip,
        &format!("{CONTENT_DIR}/{ARTICLE_FILENAME}"),
        article.as_bytes(),
    )?;

    let mut media_types = Vec::with_capacity(args.images.len());
    for entry in args.images {
        media_types.push((entry.filename.as_str(), sniff_media_type(&entry.data)));
        ziputil::write_file(zip, &format!("{CONTENT_DIR}/{}", entry.filename), &entry.data)?;
    }

    ziputil::write_file(
        zip,
        &format!("{CONTENT_DIR}/{NAV_FILENAME}"),
        generate_nav(args.title).as_bytes(),
    )?;

    ziputil::write_file(
        zip,
        OPF_PATH,
        generate_opf(id, args, &media_types).as_bytes(),
    )?;

    Ok(())
}

/// Serialize the readable tree with the XHTML namespace forced onto the
/// `<html>` element, prepended so it is the first attribute.
fn article_xhtml(root: &Node) -> Result<String> {
    match root {
        Node::Element(el) if el.tag == "html" => {
            let mut el = el.clone();
            el.attrs
                .insert(0, ("xmlns".to_string(), XHTML_NS.to_string()));
            Node::Element(el).to_xhtml()
        }
        other => other.to_xhtml(),
    }
}

/// Detect an image payload's media type from its magic bytes.
///
/// The manifest only ever carries image payloads; entries whose download
/// failed (or that are not a recognized image) are declared as opaque bytes.
fn sniff_media_type(data: &[u8]) -> &'static str {
    match image::guess_format(data) {
        Ok(format) => format.to_mime_type(),
        Err(_) => "application/octet-stream",
    }
}

fn generate_nav(title: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<html xmlns="http://www.w3.org/1999/xhtml">
 <head>
  <title>{title}</title>
  <meta http-equiv="default-style" content="text/html; charset=utf-8"></meta>
 </head>
 <body>
  <nav xmlns:epub="http://www.idpf.org/2007/ops" epub:type="toc">
   <h2>Contents</h2>
   <ol epub:type="list">
    <li><a href="{ARTICLE_FILENAME}">Content</a></li>
   </ol>
  </nav>
 </body>
</html>
"#,
        title = escape_xml(title),
    )
}

fn generate_opf(id: &str, args: &EpubArgs<'_>, images: &[(&str, &'static str)]) -> String {
    let lang = if !args.override_lang.is_empty() {
        args.override_lang
    } else {
        tree_lang(args.root)
    };
    let lang = if lang.is_empty() { "en" } else { lang };
    let modified = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);

    let mut opf = String::new();
    opf.push_str(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" xmlns:opf="http://www.idpf.org/2007/opf" version="3.0" unique-identifier="BookID">
 <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
"#,
    );
    opf.push_str(&format!(
        "  <dc:identifier id=\"BookID\">{}</dc:identifier>\n",
        escape_xml(id)
    ));
    opf.push_str(&format!("  <dc:title>{}</dc:title>\n", escape_xml(args.title)));
    opf.push_str(&format!("  <dc:language>{}</dc:language>\n", escape_xml(lang)));
    if !args.author.is_empty() {
        let author = escape_xml(args.author);
        opf.push_str(&format!(
            "  <dc:creator id=\"creator\">{author}</dc:creator>\n"
        ));
        opf.push_str(
            "  <meta refines=\"#creator\" property=\"role\" scheme=\"marc:relators\" id=\"role\">aut</meta>\n",
        );
        opf.push_str(&format!(
            "  <meta property=\"dcterms:creator\" id=\"auth\">{author}</meta>\n"
        ));
    }
    opf.push_str(&format!(
        "  <meta property=\"dcterms:modified\">{modified}</meta>\n"
    ));
    opf.push_str(" </metadata>\n <manifest>\n");
    opf.push_str(&format!(
        "  <item id=\"nav\" href=\"{NAV_FILENAME}\" media-type=\"application/xhtml+xml\" properties=\"nav\"/>\n"
    ));
    opf.push_str(&format!(
        "  <item id=\"{ARTICLE_FILENAME}\" href=\"{ARTICLE_FILENAME}\" media-type=\"application/xhtml+xml\"/>\n"
    ));
    for (filename, media_type) in images {
        opf.push_str(&format!(
            "  <item id=\"{}\" href=\"{}\" media-type=\"{}\"/>\n",
            item_id(filename),
            escape_xml(filename),
            media_type
        ));
    }
    opf.push_str(" </manifest>\n <spine>\n");
    opf.push_str(&format!("  <itemref idref=\"{ARTICLE_FILENAME}\"/>\n"));
    opf.push_str(" </spine>\n</package>\n");
    opf
}

/// Derive a manifest item id from an image path. Path separators are not
/// valid in ids.
fn item_id(filename: &str) -> String {
    filename.replace(['.', '/'], "_")
}

fn tree_lang(root: &Node) -> &str {
    root.element()
        .and_then(|el| el.attr("lang"))
        .unwrap_or_default()
}
