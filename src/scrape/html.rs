// src/scrape/html.rs
//! Forum page parsing: engine fingerprinting, thread discovery, and post
//! content extraction. Pure functions over HTML text.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use sha2::{Digest, Sha256};
use url::Url;

use crate::model::{ForumEngine, ThreadContent};

/// Upper bound on stored post body length (chars).
pub const MAX_BODY_CHARS: usize = 20_000;

// Checked in order; first hit wins.
const ENGINE_SIGNATURES: &[(&str, ForumEngine)] = &[
    (r#"id="XF""#, ForumEngine::XenForo),
    ("my_post_key", ForumEngine::MyBB),
    ("wp-content", ForumEngine::WordPress),
    ("machina", ForumEngine::Machina),
    ("milligram.css", ForumEngine::RansomExxCustom),
];

const THREAD_PATH_MARKERS: &[&str] = &["/threads/", "showthread.php", "/thread-", "/topic/"];

fn selector(css: &str) -> Selector {
    Selector::parse(css).unwrap_or_else(|e| panic!("static selector {css:?}: {e:?}"))
}

static XF_TITLE_LINKS: Lazy<Selector> = Lazy::new(|| selector("div.structItem-title a"));
static MYBB_SUBJECT_LINKS: Lazy<Selector> =
    Lazy::new(|| selector("span.subject_new a, span.subject_old a"));
static ANCHORS: Lazy<Selector> = Lazy::new(|| selector("a[href]"));

static TITLE: Lazy<Vec<Selector>> =
    Lazy::new(|| ["h1.p-title-value", "h1", "title"].map(selector).to_vec());
static BODY: Lazy<Vec<Selector>> = Lazy::new(|| {
    ["div.bbWrapper", "div.post_body", "article", "body"]
        .map(selector)
        .to_vec()
});
static AUTHOR_LINK: Lazy<Selector> = Lazy::new(|| selector("a.username"));
static AUTHOR_ATTR: Lazy<Selector> = Lazy::new(|| selector("[data-author]"));
static TIME: Lazy<Selector> = Lazy::new(|| selector("time"));

pub fn identify_engine(html: &str) -> ForumEngine {
    ENGINE_SIGNATURES
        .iter()
        .find(|(sig, _)| html.contains(sig))
        .map(|(_, engine)| *engine)
        .unwrap_or(ForumEngine::Unknown)
}

/// Hex SHA-256 of the page body.
pub fn digest(html: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(html.as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// Absolute, de-duplicated thread addresses on the same host as `base`, in
/// page order.
pub fn thread_links(html: &str, base: &Url) -> Vec<String> {
    let doc = Html::parse_document(html);
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    let mut push = |joined: Result<Url, url::ParseError>| {
        let Ok(mut u) = joined else { return };
        if u.host_str() != base.host_str() {
            return;
        }
        u.set_fragment(None);
        let s = u.to_string();
        if seen.insert(s.clone()) {
            out.push(s);
        }
    };

    for a in doc.select(&XF_TITLE_LINKS) {
        if let Some(href) = a.value().attr("href") {
            if href.contains("/threads/") {
                push(base.join(reroot(href)));
            }
        }
    }
    for a in doc.select(&MYBB_SUBJECT_LINKS) {
        if let Some(href) = a.value().attr("href") {
            push(base.join(href));
        }
    }
    for a in doc.select(&ANCHORS) {
        if let Some(href) = a.value().attr("href") {
            if THREAD_PATH_MARKERS.iter().any(|m| href.contains(m)) {
                push(base.join(reroot(href)));
            }
        }
    }

    out
}

// XenForo hrefs may carry a board prefix (`/forum/threads/..`); threads live
// at the host root.
fn reroot(href: &str) -> &str {
    href.find("/threads/").map_or(href, |idx| &href[idx..])
}

pub fn thread_content(html: &str) -> ThreadContent {
    let doc = Html::parse_document(html);

    let title = first_text(&doc, &TITLE).unwrap_or_default();
    let body = first_text(&doc, &BODY)
        .map(|b| b.chars().take(MAX_BODY_CHARS).collect())
        .unwrap_or_default();
    let author = doc
        .select(&AUTHOR_LINK)
        .map(element_text)
        .find(|s| !s.is_empty())
        .or_else(|| {
            doc.select(&AUTHOR_ATTR)
                .filter_map(|el| el.value().attr("data-author"))
                .map(normalize_text)
                .find(|s| !s.is_empty())
        })
        .unwrap_or_default();
    let posted = doc
        .select(&TIME)
        .find_map(|el| {
            el.value()
                .attr("datetime")
                .map(normalize_text)
                .or_else(|| Some(element_text(el)))
                .filter(|s| !s.is_empty())
        })
        .unwrap_or_default();

    ThreadContent {
        title,
        body,
        author,
        posted,
    }
}

fn first_text(doc: &Html, selectors: &[Selector]) -> Option<String> {
    selectors.iter().find_map(|sel| {
        doc.select(sel)
            .map(element_text)
            .find(|s| !s.is_empty())
    })
}

fn element_text(el: ElementRef<'_>) -> String {
    normalize_text(&el.text().collect::<Vec<_>>().join(" "))
}

/// Decode entities left over from double-escaped forum markup and collapse
/// whitespace.
pub fn normalize_text(s: &str) -> String {
    static RE_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
    let decoded = html_escape::decode_html_entities(s);
    RE_WS.replace_all(&decoded, " ").trim().to_string()
}
