//! Live book catalog (Aladin Open API) and the summary shape handed to callers.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::CatalogSettings;
use crate::core::record::RawBookRecord;
use crate::error::{RagError, Result};
use crate::search::engine::ScoredDocument;

pub const UNKNOWN_AUTHOR: &str = "Unknown Author";
pub const UNKNOWN_CATEGORY: &str = "Unknown Category";
pub const UNKNOWN_DATE: &str = "Unknown Date";
pub const NO_TOC: &str = "No table of contents";

/// What the conversational layer receives for one book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookSummary {
    pub title: String,
    pub author: String,
    #[serde(rename = "pubDate")]
    pub pub_date: String,
    #[serde(rename = "categoryName")]
    pub category_name: String,
    pub toc: String,
}

impl BookSummary {
    /// Blank fields are replaced by the placeholders above.
    pub fn new(title: String, author: &str, pub_date: &str, category_name: &str, toc: &str) -> Self {
        Self {
            title,
            author: or_placeholder(author, UNKNOWN_AUTHOR),
            pub_date: or_placeholder(pub_date, UNKNOWN_DATE),
            category_name: or_placeholder(category_name, UNKNOWN_CATEGORY),
            toc: or_placeholder(toc, NO_TOC),
        }
    }
}

fn or_placeholder(value: &str, placeholder: &str) -> String {
    if value.trim().is_empty() {
        placeholder.to_string()
    } else {
        value.to_string()
    }
}

impl From<&ScoredDocument> for BookSummary {
    fn from(doc: &ScoredDocument) -> Self {
        let a = &doc.attributes;
        BookSummary::new(doc.document_key.clone(), &a.author, &a.pub_date, &a.category_name, &a.toc)
    }
}

/// A full catalog record, as returned by the item lookup.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogBook {
    pub isbn13: Option<String>,
    pub title: String,
    pub author: String,
    pub pub_date: String,
    pub description: String,
    pub category_name: String,
    pub toc: String,
}

impl From<&CatalogBook> for BookSummary {
    fn from(book: &CatalogBook) -> Self {
        BookSummary::new(
            book.title.clone(),
            &book.author,
            &book.pub_date,
            &book.category_name,
            &book.toc,
        )
    }
}

impl From<CatalogBook> for RawBookRecord {
    fn from(book: CatalogBook) -> Self {
        RawBookRecord {
            title: book.title,
            author: book.author,
            pub_date: book.pub_date,
            description: book.description,
            category_name: book.category_name,
            toc: book.toc,
        }
    }
}

/// Keyword search against a live catalog.
pub trait CatalogSearch: Send + Sync {
    fn search_catalog(&self, query: &str, k: usize) -> Result<Vec<CatalogBook>>;
}

#[derive(Deserialize)]
struct SearchPayload {
    #[serde(default)]
    item: Vec<SearchItem>,
}

#[derive(Deserialize)]
struct SearchItem {
    #[serde(default)]
    isbn13: String,
}

#[derive(Deserialize)]
struct LookupPayload {
    #[serde(default)]
    item: Vec<LookupItem>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LookupItem {
    title: Option<String>,
    #[serde(default)]
    author: String,
    #[serde(default)]
    pub_date: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    category_name: String,
    #[serde(default)]
    isbn13: String,
    bookinfo: Option<TocInfo>,
    sub_info: Option<TocInfo>,
}

#[derive(Deserialize)]
struct TocInfo {
    toc: Option<String>,
}

impl LookupItem {
    fn into_book(self) -> Option<CatalogBook> {
        let title = self.title.filter(|t| !t.trim().is_empty())?;
        let toc = self
            .bookinfo
            .and_then(|b| b.toc)
            .or_else(|| self.sub_info.and_then(|s| s.toc))
            .unwrap_or_default();
        Some(CatalogBook {
            isbn13: Some(self.isbn13).filter(|i| !i.is_empty()),
            title,
            author: self.author,
            pub_date: self.pub_date,
            description: self.description,
            category_name: self.category_name,
            toc,
        })
    }
}

/// Aladin returns JSONP-ish bodies (`{...};`) and occasionally stray
/// backslashes that are not valid JSON escapes.
fn parse_payload<T: for<'de> Deserialize<'de>>(body: &str) -> Result<T> {
    let trimmed = body.trim().trim_end_matches(';').trim_end();
    match serde_json::from_str(trimmed) {
        Ok(parsed) => Ok(parsed),
        Err(first) => serde_json::from_str(&trimmed.replace('\\', "\\\\"))
            .map_err(|_| RagError::Catalog(format!("unparseable catalog payload: {}", first))),
    }
}

/// Aladin TTB client: `ItemSearch` for ISBNs, then `ItemLookUp` per ISBN.
pub struct AladinCatalog {
    client: reqwest::blocking::Client,
    base_url: String,
    api_key: Option<String>,
}

impl AladinCatalog {
    pub fn new(settings: &CatalogSettings) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("bookrag/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(settings.timeout_secs))
            .pool_max_idle_per_host(4)
            .build()?;
        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
        })
    }

    fn get(&self, endpoint: &str, params: &[(&str, &str)]) -> Result<String> {
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| RagError::Catalog("catalog.api_key (or ALADIN_API_KEY) is not set".into()))?;
        let url = format!("{}/{}", self.base_url, endpoint);
        let response = self
            .client
            .get(&url)
            .query(&[("ttbkey", key)])
            .query(params)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(RagError::Catalog(format!("{} returned {}", endpoint, status)));
        }
        Ok(response.text()?)
    }

    fn search_isbns(&self, query: &str, k: usize) -> Result<Vec<String>> {
        let max = k.to_string();
        let body = self.get(
            "ItemSearch.aspx",
            &[
                ("Query", query),
                ("QueryType", "Keyword"),
                ("SearchTarget", "Book"),
                ("start", "1"),
                ("MaxResults", &max),
                ("output", "js"),
            ],
        )?;
        let payload: SearchPayload = parse_payload(&body)?;
        Ok(payload
            .item
            .into_iter()
            .map(|i| i.isbn13)
            .filter(|isbn| !isbn.is_empty())
            .take(k)
            .collect())
    }

    fn lookup(&self, isbn13: &str) -> Result<Option<CatalogBook>> {
        let body = self.get(
            "ItemLookUp.aspx",
            &[
                ("ItemId", isbn13),
                ("ItemIdType", "ISBN13"),
                ("output", "js"),
                ("OptResult", "Toc,categoryIdList"),
            ],
        )?;
        let payload: LookupPayload = match parse_payload(&body) {
            Ok(p) => p,
            Err(e) => {
                warn!(isbn13, error = %e, "skipping catalog item");
                return Ok(None);
            }
        };
        Ok(payload.item.into_iter().next().and_then(LookupItem::into_book))
    }
}

impl CatalogSearch for AladinCatalog {
    fn search_catalog(&self, query: &str, k: usize) -> Result<Vec<CatalogBook>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let isbns = self.search_isbns(query, k)?;
        debug!(query, hits = isbns.len(), "catalog keyword search");

        let mut books = Vec::with_capacity(isbns.len());
        for isbn in &isbns {
            match self.lookup(isbn)? {
                Some(book) => books.push(book),
                None => warn!(isbn13 = %isbn, "catalog item without a title"),
            }
        }
        info!(query, books = books.len(), "catalog search");
        Ok(books)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::unit::BookAttributes;
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;

    /// Answer `count` requests, choosing the body by endpoint name.
    fn serve(count: usize, status: u16, search: &'static str, lookup: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        std::thread::spawn(move || {
            for stream in listener.incoming().take(count) {
                let mut stream = stream.unwrap();
                let mut reader = BufReader::new(stream.try_clone().unwrap());
                let mut request_line = String::new();
                reader.read_line(&mut request_line).unwrap();
                loop {
                    let mut line = String::new();
                    reader.read_line(&mut line).unwrap();
                    if line == "\r\n" || line.is_empty() {
                        break;
                    }
                }
                let body = if request_line.contains("ItemSearch") { search } else { lookup };
                write!(
                    stream,
                    "HTTP/1.1 {} X\r\nContent-Type: text/javascript\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                )
                .unwrap();
            }
        });
        format!("http://{}", addr)
    }

    fn catalog(base_url: String) -> AladinCatalog {
        AladinCatalog::new(&CatalogSettings {
            base_url,
            api_key: Some("ttb-test".into()),
            timeout_secs: 5,
        })
        .unwrap()
    }

    #[test]
    fn test_parse_payload_strips_semicolon() {
        let payload: SearchPayload = parse_payload("{\"item\":[{\"isbn13\":\"979\"}]};\n").unwrap();
        assert_eq!(payload.item[0].isbn13, "979");
    }

    #[test]
    fn test_parse_payload_tolerates_stray_backslash() {
        let payload: LookupPayload = parse_payload(r#"{"item":[{"title":"C:\path"}]};"#).unwrap();
        assert_eq!(payload.item[0].title.as_deref(), Some(r"C:\path"));
    }

    #[test]
    fn test_lookup_item_defaults_and_skip() {
        let payload: LookupPayload = parse_payload(
            r#"{"item":[{"title":"전기기사 필기","isbn13":"9791","subInfo":{"toc":"<b>1장</b>전기자기학<br>"}}]}"#,
        )
        .unwrap();
        let book = payload.item.into_iter().next().and_then(LookupItem::into_book).unwrap();
        assert_eq!(book.toc, "<b>1장</b>전기자기학<br>");
        let summary = BookSummary::from(&book);
        assert_eq!(summary.author, UNKNOWN_AUTHOR);
        assert_eq!(summary.category_name, UNKNOWN_CATEGORY);
        assert_eq!(summary.pub_date, UNKNOWN_DATE);

        let untitled: LookupPayload = parse_payload(r#"{"item":[{"author":"x"}]}"#).unwrap();
        assert!(untitled.item.into_iter().next().and_then(LookupItem::into_book).is_none());
    }

    #[test]
    fn test_summary_from_scored_document() {
        let doc = ScoredDocument {
            document_key: "Circuit Theory".into(),
            score: 0.7,
            attributes: BookAttributes {
                author: "Kim".into(),
                pub_date: "2023-05-01".into(),
                category_name: String::new(),
                toc: "  ".into(),
            },
        };
        let summary = BookSummary::from(&doc);
        assert_eq!(summary.title, "Circuit Theory");
        assert_eq!(summary.author, "Kim");
        assert_eq!(summary.category_name, UNKNOWN_CATEGORY);
        assert_eq!(summary.toc, NO_TOC);
    }

    #[test]
    fn test_search_then_lookup() {
        let base = serve(
            2,
            200,
            r#"{"item":[{"isbn13":"9791100000001"}]};"#,
            r#"{"item":[{"title":"Power Systems","author":"Lee","pubDate":"2024-02-01","description":"grids","categoryName":"Exam","isbn13":"9791100000001","bookinfo":{"toc":"<b>Ch1</b>lines<br>"}}]};"#,
        );
        let books = catalog(base).search_catalog("power", 1).unwrap();
        assert_eq!(books.len(), 1);
        assert_eq!(books[0].title, "Power Systems");
        assert_eq!(books[0].isbn13.as_deref(), Some("9791100000001"));

        let record = RawBookRecord::from(books[0].clone());
        assert_eq!(record.toc, "<b>Ch1</b>lines<br>");
    }

    #[test]
    fn test_error_status_is_catalog_error() {
        let base = serve(1, 500, "", "");
        let err = catalog(base).search_catalog("power", 3).unwrap_err();
        assert!(matches!(err, RagError::Catalog(_)));
    }

    #[test]
    fn test_missing_key_and_zero_k() {
        let catalog = AladinCatalog::new(&CatalogSettings {
            base_url: "http://127.0.0.1:9".into(),
            api_key: None,
            timeout_secs: 1,
        })
        .unwrap();
        assert!(catalog.search_catalog("power", 0).unwrap().is_empty());
        assert!(matches!(catalog.search_catalog("power", 1), Err(RagError::Catalog(_))));
    }
}
