//! Streaming RSS/Atom parser.
//!
//! Walks the document with `quick-xml`'s event reader and collects one
//! [`RawItem`] per `<item>` (RSS 0.9x/2.0, RDF) or `<entry>` (Atom). Only
//! fields directly under the item are read for title, link and timestamp, so
//! nested `<source><title>` and similar never leak into the article.
//!
//! Image discovery order per item:
//! 1. `media:content` (images only)
//! 2. `<enclosure>` / Atom `link rel="enclosure"` with an image type
//! 3. `media:thumbnail`
//! 4. an explicit `<image>` field (`<image><url>`, text, or `href`/`url` attribute)
//! 5. the first `<img src>` inside the item's embedded HTML, whether escaped
//!    text or XHTML child elements

use crate::error::FetchError;
use crate::models::RawItem;
use crate::utils::{absolute_image_url, canonicalize_url, normalize_whitespace};
use once_cell::sync::Lazy;
use quick_xml::escape::unescape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use regex::Regex;

static INLINE_IMG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)<img\b[^>]*?\bsrc\s*=\s*["']([^"']+)["']"#).unwrap());
static TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").unwrap());
static IMAGE_EXT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\.(jpe?g|png|gif|webp|avif)(\?|$)").unwrap());

/// Parse a feed document into item stubs.
///
/// Items missing a title or link are dropped. A document whose root is not
/// `rss`, `feed` or `RDF`, or which is not well-formed XML, is an error.
pub fn parse_feed(xml: &str) -> Result<Vec<RawItem>, FetchError> {
    let xml = escape_bare_ampersands(xml);
    let mut reader = Reader::from_str(&xml);

    let mut items = Vec::new();
    let mut root_checked = false;
    let mut current: Option<ItemBuilder> = None;
    // Elements open inside the current item, with their accumulated text.
    let mut stack: Vec<(String, String)> = Vec::new();

    loop {
        let event = reader.read_event().map_err(|e| {
            FetchError::Parse(format!("at byte {}: {e}", reader.error_position()))
        })?;
        match event {
            Event::Start(e) => {
                let name = qualified_name(&e);
                if !root_checked {
                    check_root(&name)?;
                    root_checked = true;
                    continue;
                }
                if let Some(item) = current.as_mut() {
                    item.on_attributes(&name, &e, stack.is_empty(), in_markup(&stack));
                    stack.push((name, String::new()));
                } else if is_item(&name) {
                    current = Some(ItemBuilder::default());
                    stack.clear();
                }
            }
            Event::Empty(e) => {
                let name = qualified_name(&e);
                if !root_checked {
                    check_root(&name)?;
                    root_checked = true;
                    continue;
                }
                if let Some(item) = current.as_mut() {
                    item.on_attributes(&name, &e, stack.is_empty(), in_markup(&stack));
                }
            }
            Event::Text(t) => {
                if let Some((_, text)) = stack.last_mut() {
                    let raw = String::from_utf8_lossy(&t.into_inner()).into_owned();
                    match unescape(&raw) {
                        Ok(decoded) => text.push_str(&decoded),
                        Err(_) => text.push_str(&raw),
                    }
                }
            }
            Event::CData(c) => {
                if let Some((_, text)) = stack.last_mut() {
                    text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                }
            }
            Event::GeneralRef(r) => {
                if let Some((_, text)) = stack.last_mut() {
                    let name = String::from_utf8_lossy(&r).into_owned();
                    text.push_str(&resolve_entity(&name));
                }
            }
            Event::End(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                if current.is_none() {
                    continue;
                }
                if stack.is_empty() {
                    if is_item(&name) {
                        if let Some(done) = current.take().and_then(ItemBuilder::build) {
                            items.push(done);
                        }
                    }
                    continue;
                }
                if let (Some(item), Some((open, text))) = (current.as_mut(), stack.pop()) {
                    let parent = stack.last().map(|(n, _)| local(n).to_string());
                    item.on_text(&open, parent.as_deref(), text);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !root_checked {
        return Err(FetchError::Parse("empty document".into()));
    }
    Ok(items)
}

#[derive(Debug, Default)]
struct ItemBuilder {
    title: Option<String>,
    link: Option<String>,
    guid: Option<String>,
    published: Option<String>,
    updated: Option<String>,
    media: Option<String>,
    enclosure: Option<String>,
    thumbnail: Option<String>,
    image: Option<String>,
    /// First `<img>` found as a child element of inline XHTML content.
    markup_image: Option<String>,
    html: Vec<String>,
}

impl ItemBuilder {
    /// Attribute-borne fields. `direct` is true for children of the item itself,
    /// `markup` for elements nested in its content or summary.
    fn on_attributes(&mut self, name: &str, e: &BytesStart<'_>, direct: bool, markup: bool) {
        match (name, local(name)) {
            ("media:content", _) => {
                let medium = attr(e, b"medium").unwrap_or_default();
                let mime = attr(e, b"type").unwrap_or_default();
                let is_image = medium == "image"
                    || mime.starts_with("image/")
                    || (medium.is_empty() && mime.is_empty());
                if is_image {
                    set_image(&mut self.media, attr(e, b"url"));
                }
            }
            ("media:thumbnail", _) => set_image(&mut self.thumbnail, attr(e, b"url")),
            (_, "enclosure") => {
                let url = attr(e, b"url");
                if looks_like_image(attr(e, b"type").as_deref(), url.as_deref()) {
                    set_image(&mut self.enclosure, url);
                }
            }
            (_, "link") if direct => {
                let href = attr(e, b"href");
                match attr(e, b"rel").as_deref() {
                    None | Some("alternate") => {
                        if self.link.is_none() {
                            self.link = href.filter(|h| !h.is_empty());
                        }
                    }
                    Some("enclosure") => {
                        if looks_like_image(attr(e, b"type").as_deref(), href.as_deref()) {
                            set_image(&mut self.enclosure, href);
                        }
                    }
                    Some(_) => {}
                }
            }
            (_, "image") => {
                set_image(&mut self.image, attr(e, b"href").or_else(|| attr(e, b"url")));
            }
            (_, "img") if markup => set_image(&mut self.markup_image, attr(e, b"src")),
            _ => {}
        }
    }

    /// Text-borne fields, applied when an element closes.
    fn on_text(&mut self, name: &str, parent: Option<&str>, text: String) {
        let value = text.trim();
        if value.is_empty() {
            return;
        }
        match (local(name), parent) {
            ("title", None) => set_once(&mut self.title, normalize_whitespace(&strip_tags(value))),
            ("link", None) => set_once(&mut self.link, value.to_string()),
            ("guid" | "id", None) => set_once(&mut self.guid, value.to_string()),
            ("pubDate" | "published" | "date" | "issued", None) => {
                set_once(&mut self.published, value.to_string())
            }
            ("updated" | "modified", None) => set_once(&mut self.updated, value.to_string()),
            ("description" | "summary" | "content" | "encoded", _) => self.html.push(value.to_string()),
            ("url", Some("image")) => set_image(&mut self.image, Some(value.to_string())),
            ("image", None) => set_image(&mut self.image, Some(value.to_string())),
            _ => {}
        }
    }

    fn build(self) -> Option<RawItem> {
        let title = self.title.filter(|t| !t.is_empty())?;
        let link = self
            .link
            .or_else(|| self.guid.filter(|g| g.starts_with("http://") || g.starts_with("https://")))?;
        let canonical_url = canonicalize_url(&link)?;
        let inline = self.markup_image.or_else(|| {
            self.html.iter().find_map(|html| {
                INLINE_IMG
                    .captures_iter(html)
                    .find_map(|c| absolute_image_url(&c[1]))
            })
        });
        let embedded_image_url = self
            .media
            .or(self.enclosure)
            .or(self.thumbnail)
            .or(self.image)
            .or(inline);
        Some(RawItem {
            title,
            canonical_url,
            published_at_raw: self.published.or(self.updated),
            embedded_image_url,
        })
    }
}

fn qualified_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.name().as_ref()).into_owned()
}

/// Name without its namespace prefix.
fn local(name: &str) -> &str {
    name.rsplit(':').next().unwrap_or(name)
}

/// Whether the innermost open elements sit inside the item's HTML payload.
fn in_markup(stack: &[(String, String)]) -> bool {
    stack
        .iter()
        .any(|(name, _)| matches!(local(name), "content" | "summary" | "description"))
}

fn is_item(name: &str) -> bool {
    matches!(local(name), "item" | "entry")
}

fn check_root(name: &str) -> Result<(), FetchError> {
    match local(name) {
        "rss" | "feed" | "RDF" => Ok(()),
        other => Err(FetchError::Parse(format!("unexpected root element <{other}>"))),
    }
}

fn attr(e: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == key)
        .map(|a| {
            let raw = String::from_utf8_lossy(&a.value).into_owned();
            unescape(&raw).map(|v| v.into_owned()).unwrap_or(raw)
        })
        .map(|v| v.trim().to_string())
}

fn looks_like_image(mime: Option<&str>, url: Option<&str>) -> bool {
    match mime {
        Some(mime) if !mime.is_empty() => mime.starts_with("image/"),
        _ => url.is_some_and(|u| IMAGE_EXT.is_match(u)),
    }
}

fn set_once(slot: &mut Option<String>, value: String) {
    if slot.is_none() && !value.is_empty() {
        *slot = Some(value);
    }
}

fn set_image(slot: &mut Option<String>, candidate: Option<String>) {
    if slot.is_none() {
        *slot = candidate.as_deref().and_then(absolute_image_url);
    }
}

fn strip_tags(s: &str) -> String {
    TAGS.replace_all(s, " ").into_owned()
}

fn resolve_entity(name: &str) -> String {
    match name {
        "nbsp" => " ".to_string(),
        "ndash" | "mdash" => "-".to_string(),
        "lsquo" | "rsquo" => "'".to_string(),
        "ldquo" | "rdquo" => "\"".to_string(),
        "hellip" => "...".to_string(),
        _ => {
            let reference = format!("&{name};");
            unescape(&reference)
                .map(|v| v.into_owned())
                .unwrap_or(reference)
        }
    }
}

/// Feeds routinely put raw `&` into links and titles. Escape any `&` that
/// does not start an entity or character reference, leaving CDATA untouched.
fn escape_bare_ampersands(xml: &str) -> String {
    const CDATA_OPEN: &str = "<![CDATA[";
    const CDATA_CLOSE: &str = "]]>";

    let mut out = String::with_capacity(xml.len());
    let mut rest = xml;
    while !rest.is_empty() {
        if rest.starts_with(CDATA_OPEN) {
            let end = rest
                .find(CDATA_CLOSE)
                .map(|i| i + CDATA_CLOSE.len())
                .unwrap_or(rest.len());
            out.push_str(&rest[..end]);
            rest = &rest[end..];
            continue;
        }
        let Some(c) = rest.chars().next() else { break };
        if c == '&' && !starts_reference(&rest[1..]) {
            out.push_str("&amp;");
        } else {
            out.push(c);
        }
        rest = &rest[c.len_utf8()..];
    }
    out
}

fn starts_reference(after_amp: &str) -> bool {
    let Some(end) = after_amp.find(';') else {
        return false;
    };
    if end == 0 || end > 32 {
        return false;
    }
    let body = &after_amp[..end];
    if let Some(num) = body.strip_prefix('#') {
        return match num.strip_prefix(['x', 'X']) {
            Some(hex) => !hex.is_empty() && hex.chars().all(|c| c.is_ascii_hexdigit()),
            None => !num.is_empty() && num.chars().all(|c| c.is_ascii_digit()),
        };
    }
    body.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
        && body.chars().all(|c| c.is_ascii_alphanumeric())
}
