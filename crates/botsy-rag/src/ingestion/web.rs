//! Web page fetching and visible-text extraction

use reqwest::{Client, Url};
use scraper::{ElementRef, Html, Selector};
use std::time::Duration;

use crate::config::IngestionConfig;
use crate::error::{Error, Result};

use super::parser::decode_text;

/// Elements whose text is never content
const SKIPPED_ELEMENTS: &[&str] = &[
    "script", "style", "noscript", "nav", "header", "footer", "aside", "template", "svg",
    "iframe", "form",
];

/// Elements that end a paragraph of extracted text
const BLOCK_ELEMENTS: &[&str] = &[
    "p", "div", "section", "article", "main", "h1", "h2", "h3", "h4", "h5", "h6", "li", "ul",
    "ol", "table", "tr", "blockquote", "pre", "br", "hr", "dd", "dt", "figcaption",
];

/// Content regions tried before falling back to `body`
const MAIN_REGIONS: &[&str] = &[
    "main",
    "article",
    "[role=main]",
    "#content",
    ".content",
    "#main",
    ".main-content",
];

/// Text and metadata pulled out of an HTML document
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HtmlPage {
    pub title: Option<String>,
    pub description: Option<String>,
    /// Absolute `<link rel="canonical">` target, if present
    pub canonical_url: Option<String>,
    pub text: String,
}

/// Raw fetch result
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// URL after redirects
    pub final_url: String,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl FetchedPage {
    pub fn is_html(&self) -> bool {
        match self.content_type.as_deref() {
            Some(ct) => ct.contains("html") || ct.contains("xml"),
            None => true,
        }
    }
}

/// HTTP fetcher for URL sources
pub struct WebFetcher {
    client: Client,
    max_page_bytes: usize,
}

impl WebFetcher {
    pub fn new(config: &IngestionConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.fetch_timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            max_page_bytes: config.max_page_bytes,
        })
    }

    /// Fetch a URL, following redirects
    pub async fn fetch(&self, url: &str) -> Result<FetchedPage> {
        let parsed = validate_url(url)?;

        tracing::info!("[{}] Fetching", url);
        let mut response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|e| Error::fetch_failed(url, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::fetch_failed(url, format!("HTTP {}", status)));
        }

        if let Some(len) = response.content_length() {
            if len as usize > self.max_page_bytes {
                return Err(Error::fetch_failed(
                    url,
                    format!("page is {} bytes, limit is {}", len, self.max_page_bytes),
                ));
            }
        }

        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_ascii_lowercase());

        // Content-Length may be absent or wrong; the cap holds while streaming
        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| Error::fetch_failed(url, e.to_string()))?
        {
            if body.len() + chunk.len() > self.max_page_bytes {
                return Err(Error::fetch_failed(
                    url,
                    format!("page exceeds {} bytes", self.max_page_bytes),
                ));
            }
            body.extend_from_slice(&chunk);
        }

        Ok(FetchedPage {
            final_url,
            content_type,
            body,
        })
    }
}

/// Only absolute http(s) URLs are fetchable
pub fn validate_url(url: &str) -> Result<Url> {
    let parsed = Url::parse(url.trim()).map_err(|e| Error::fetch_failed(url, e.to_string()))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(Error::fetch_failed(
            url,
            format!("unsupported URL scheme '{}'", other),
        )),
    }
}

/// Extract title, description, canonical link and visible text
pub fn extract_html(raw: &[u8]) -> HtmlPage {
    let html = decode_text(raw);
    let document = Html::parse_document(&html);

    let title = select_first(&document, "title")
        .map(|el| collapse_whitespace(&el.text().collect::<String>()))
        .filter(|t| !t.is_empty())
        .or_else(|| {
            select_first(&document, "h1")
                .map(|el| collapse_whitespace(&el.text().collect::<String>()))
                .filter(|t| !t.is_empty())
        });

    let description = select_first(&document, "meta[name=description]")
        .and_then(|el| el.value().attr("content"))
        .map(collapse_whitespace)
        .filter(|d| !d.is_empty());

    let canonical_url = select_first(&document, "link[rel=canonical]")
        .and_then(|el| el.value().attr("href"))
        .and_then(|href| validate_url(href).ok())
        .map(|url| url.to_string());

    let text = MAIN_REGIONS
        .iter()
        .filter_map(|css| select_first(&document, css))
        .map(visible_text)
        .find(|t| !t.is_empty())
        .or_else(|| select_first(&document, "body").map(visible_text))
        .unwrap_or_else(|| visible_text(document.root_element()));

    HtmlPage {
        title,
        description,
        canonical_url,
        text,
    }
}

fn select_first<'a>(document: &'a Html, css: &str) -> Option<ElementRef<'a>> {
    let selector = Selector::parse(css).ok()?;
    document.select(&selector).next()
}

/// Visible text of an element, paragraphs separated by blank lines
fn visible_text(root: ElementRef<'_>) -> String {
    let mut raw = String::new();
    collect_text(root, &mut raw);

    raw.split("\n\n")
        .map(collapse_whitespace)
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn collect_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        if let Some(child_element) = ElementRef::wrap(child) {
            let name = child_element.value().name();
            if SKIPPED_ELEMENTS.contains(&name) {
                continue;
            }
            let block = BLOCK_ELEMENTS.contains(&name);
            if block {
                out.push_str("\n\n");
            }
            collect_text(child_element, out);
            if block {
                out.push_str("\n\n");
            }
        } else if let Some(text) = child.value().as_text() {
            out.push_str(text);
            out.push(' ');
        }
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
