//! Parsed page wrapper and the chapter-body sanitizer.

use reqwest::Url;
use scraper::{ElementRef, Html, Node, Selector};

/// Elements never carried into chapter bodies.
const ALWAYS_DROPPED: &[&str] = &[
    "script", "style", "noscript", "iframe", "form", "input", "button", "ins", "svg",
];
/// XHTML 1.1 body elements written as tags. Anything else (`o:p`, `font`, custom
/// elements) is unwrapped: its children are kept, the tag is not.
const XHTML_ELEMENTS: &[&str] = &[
    "a", "abbr", "acronym", "address", "b", "bdo", "big", "blockquote", "br", "caption", "cite",
    "code", "col", "colgroup", "dd", "del", "dfn", "div", "dl", "dt", "em", "h1", "h2", "h3",
    "h4", "h5", "h6", "hr", "i", "kbd", "li", "ol", "p", "pre", "q", "samp", "small", "span",
    "strong", "sub", "sup", "table", "tbody", "td", "tfoot", "th", "thead", "tr", "tt", "u",
    "ul", "var",
];
/// Elements serialized as `<name/>`.
const VOID_ELEMENTS: &[&str] = &["br", "hr"];
/// Attributes kept on serialized elements.
const KEPT_ATTRIBUTES: &[&str] = &["href", "title"];

/// Compile a CSS selector. Invalid selectors are logged and treated as matching nothing.
pub fn selector(sel: &str) -> Option<Selector> {
    match Selector::parse(sel) {
        Ok(s) => Some(s),
        Err(e) => {
            tracing::warn!(selector = sel, error = %e, "Invalid CSS selector");
            None
        }
    }
}

/// A fetched HTML page and the URL it was served from.
pub struct Document {
    html: Html,
    url: Url,
}

impl Document {
    pub fn parse(html: &str, url: Url) -> Self {
        Self {
            html: Html::parse_document(html),
            url,
        }
    }

    /// URL relative links are resolved against.
    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn select_first(&self, sel: &str) -> Option<ElementRef<'_>> {
        let s = selector(sel)?;
        self.html.select(&s).next()
    }

    pub fn select_all(&self, sel: &str) -> Vec<ElementRef<'_>> {
        match selector(sel) {
            Some(s) => self.html.select(&s).collect(),
            None => Vec::new(),
        }
    }

    /// Trimmed text of the first match, if non-empty.
    pub fn text_of(&self, sel: &str) -> Option<String> {
        self.select_first(sel).and_then(|e| element_text(&e))
    }

    /// Trimmed attribute of the first match, if non-empty.
    pub fn attr_of(&self, sel: &str, attr: &str) -> Option<String> {
        self.select_first(sel)
            .and_then(|e| e.value().attr(attr))
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    /// Content of `<meta property="...">`, or `<meta name="...">` when no property tag exists.
    pub fn meta_content(&self, property: &str) -> Option<String> {
        self.attr_of(&format!("meta[property=\"{}\"]", property), "content")
            .or_else(|| self.attr_of(&format!("meta[name=\"{}\"]", property), "content"))
    }

    /// Page `<title>` text.
    pub fn page_title(&self) -> Option<String> {
        self.text_of("title")
    }

    /// Resolve `href` against the page URL.
    pub fn absolute_url(&self, href: &str) -> Option<String> {
        absolutize(&self.url, href)
    }
}

/// Joined, trimmed text content of an element; `None` when blank.
pub fn element_text(el: &ElementRef<'_>) -> Option<String> {
    let text = el.text().collect::<String>();
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

fn absolutize(base: &Url, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    base.join(href).ok().map(|u| u.to_string())
}

/// Serialize the children of `root` as XHTML, dropping scripts, comments and
/// anything matching `noise`. Relative `href`/`src` values are resolved against `base`.
pub fn clean_html(root: ElementRef<'_>, noise: &[&str], base: &Url) -> String {
    let noise: Vec<Selector> = noise.iter().filter_map(|s| selector(s)).collect();
    let mut out = String::new();
    write_children(root, &noise, base, &mut out);
    out.trim().to_string()
}

fn write_children(el: ElementRef<'_>, noise: &[Selector], base: &Url, out: &mut String) {
    for child in el.children() {
        match child.value() {
            Node::Text(text) => out.push_str(&escape_text(text)),
            Node::Element(_) => {
                if let Some(child_el) = ElementRef::wrap(child) {
                    write_element(child_el, noise, base, out);
                }
            }
            _ => {}
        }
    }
}

fn write_element(el: ElementRef<'_>, noise: &[Selector], base: &Url, out: &mut String) {
    let name = el.value().name();
    if ALWAYS_DROPPED.contains(&name) || noise.iter().any(|s| s.matches(&el)) {
        return;
    }
    // Remote images are not in the package manifest; keep their description only.
    if name == "img" {
        if let Some(alt) = el.value().attr("alt").map(str::trim).filter(|a| !a.is_empty()) {
            out.push_str(&escape_text(alt));
        }
        return;
    }
    if !XHTML_ELEMENTS.contains(&name) {
        write_children(el, noise, base, out);
        return;
    }
    out.push('<');
    out.push_str(name);
    for (attr, value) in el.value().attrs() {
        if !KEPT_ATTRIBUTES.contains(&attr) {
            continue;
        }
        let value = if attr == "href" {
            absolutize(base, value).unwrap_or_else(|| value.to_string())
        } else {
            value.to_string()
        };
        out.push(' ');
        out.push_str(attr);
        out.push_str("=\"");
        out.push_str(&escape_attr(&value));
        out.push('"');
    }
    if VOID_ELEMENTS.contains(&name) {
        out.push_str("/>");
        return;
    }
    out.push('>');
    write_children(el, noise, base, out);
    out.push_str("</");
    out.push_str(name);
    out.push('>');
}

/// Escape markup characters and drop code points XML 1.0 does not allow.
pub fn escape_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars().filter(|c| is_xml_char(*c)) {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

/// [`escape_text`] plus double quotes, for attribute values.
pub fn escape_attr(s: &str) -> String {
    escape_text(s).replace('"', "&quot;")
}

fn is_xml_char(c: char) -> bool {
    matches!(c, '\t' | '\n' | '\r' | '\u{20}'..='\u{D7FF}' | '\u{E000}'..='\u{FFFD}' | '\u{10000}'..='\u{10FFFF}')
}
