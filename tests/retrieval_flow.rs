//! Corpus directory → index → hybrid search → book-search tool.

use std::path::Path;
use std::sync::Arc;

use book_rag::search::engine::build_and_save;
use book_rag::{
    load_corpus, BookSearchTool, CatalogBook, CatalogSearch, EmbeddingProvider, HybridRanker,
    RagError, ResultSource, Settings,
};

const VOCAB: [&str; 8] = [
    "circuit",
    "resistor",
    "ohm",
    "korean",
    "joseon",
    "power",
    "grid",
    "transmission",
];

/// Bag-of-keywords embedding with a constant bias axis.
struct KeywordEmbedder;

impl EmbeddingProvider for KeywordEmbedder {
    fn id(&self) -> String {
        "keyword:test".to_string()
    }

    fn dim(&self) -> usize {
        VOCAB.len() + 1
    }

    fn embed(&self, text: &str) -> book_rag::Result<Vec<f32>> {
        let lower = text.to_lowercase();
        let mut v: Vec<f32> = VOCAB.iter().map(|w| lower.matches(w).count() as f32).collect();
        v.push(0.1);
        Ok(v)
    }
}

struct StaticCatalog;

impl CatalogSearch for StaticCatalog {
    fn search_catalog(&self, query: &str, k: usize) -> book_rag::Result<Vec<CatalogBook>> {
        Ok(vec![CatalogBook {
            isbn13: Some("9791100000009".to_string()),
            title: format!("Catalog pick for {}", query),
            author: "Park".to_string(),
            pub_date: "2025-01-01".to_string(),
            description: String::new(),
            category_name: String::new(),
            toc: String::new(),
        }]
        .into_iter()
        .take(k)
        .collect())
    }
}

fn write_record(dir: &Path, name: &str, title: &str, description: &str, toc: &str) {
    let body = serde_json::json!({
        "title": title,
        "author": format!("{} author", title),
        "pubDate": "2024-03-01",
        "description": description,
        "categoryName": "국내도서>수험서",
        "toc": toc,
    });
    std::fs::write(dir.join(name), body.to_string()).unwrap();
}

fn corpus_dir() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    write_record(dir.path(), "0.json", "Circuit Theory", "resistor networks and ohm", "<b>Ch1</b>ohm law<br>");
    write_record(dir.path(), "1.json", "Korean History", "joseon dynasty", "<b>Part 1</b>joseon kings<br>");
    write_record(dir.path(), "2.json", "Power Systems", "transmission lines and grid", "<b>Ch1</b>grid stability<br>");
    std::fs::write(dir.path().join("3.json"), "{not json").unwrap();
    dir
}

fn settings(dir: &Path) -> Settings {
    Settings {
        corpus_dir: dir.to_path_buf(),
        index_path: dir.join("index/index.db"),
        ..Settings::default()
    }
}

fn tool(ranker: HybridRanker, settings: &Settings) -> BookSearchTool {
    BookSearchTool::new(Arc::new(ranker), Arc::new(StaticCatalog), settings)
}

#[test]
fn malformed_record_is_skipped() {
    let dir = corpus_dir();
    let load = load_corpus(dir.path()).unwrap();
    assert_eq!(load.records.len(), 3);
    assert_eq!(load.skipped.len(), 1);
    assert!(matches!(load.skipped[0], RagError::MalformedRecord { .. }));
}

#[test]
fn confident_query_answers_from_index() {
    let dir = corpus_dir();
    let settings = settings(dir.path());
    let ranker = HybridRanker::open(&settings, Arc::new(KeywordEmbedder)).unwrap();
    assert!(settings.index_path.exists());

    let result = tool(ranker, &settings).search_books("grid", 3).unwrap();
    assert_eq!(result.source, ResultSource::Hybrid);
    assert!(result.top_score.unwrap() >= 0.5);
    assert_eq!(result.books[0].title, "Power Systems");
    assert_eq!(result.books[0].author, "Power Systems author");
    assert_eq!(result.books[0].toc, "<b>Ch1</b>grid stability<br>");
}

#[test]
fn unknown_query_falls_back_to_catalog() {
    let dir = corpus_dir();
    let settings = settings(dir.path());
    let ranker = HybridRanker::open(&settings, Arc::new(KeywordEmbedder)).unwrap();

    let result = tool(ranker, &settings).search_books("zzz", 1).unwrap();
    assert_eq!(result.source, ResultSource::Catalog);
    assert!(result.top_score.unwrap() < 0.5);
    assert_eq!(result.books.len(), 1);
    assert_eq!(result.books[0].title, "Catalog pick for zzz");
    assert_eq!(result.books[0].category_name, "Unknown Category");
}

#[test]
fn off_topic_query_with_default_settings_falls_back() {
    let dir = corpus_dir();
    let settings = settings(dir.path());
    assert_eq!(settings.search.k, 5);
    let ranker = HybridRanker::open(&settings, Arc::new(KeywordEmbedder)).unwrap();

    // accumulation over every book's units must not lift unrelated text over the threshold
    let result = tool(ranker, &settings)
        .search_books("zzz", settings.search.k)
        .unwrap();
    assert_eq!(result.source, ResultSource::Catalog);
    assert!(result.top_score.unwrap() < settings.search.confidence_threshold);
    assert_eq!(result.books[0].title, "Catalog pick for zzz");
}

#[test]
fn reopened_index_gives_identical_results() {
    let dir = corpus_dir();
    let settings = settings(dir.path());
    let provider: Arc<dyn EmbeddingProvider> = Arc::new(KeywordEmbedder);

    let built = build_and_save(&settings.corpus_dir, &settings.index_path, provider.clone()).unwrap();
    let reopened = HybridRanker::open(&settings, provider).unwrap();
    assert_eq!(reopened.corpus().units(), built.units());

    for query in ["ohm law", "joseon kings", "transmission grid", "nothing here"] {
        for weight in [0.0, 0.5, 1.0] {
            assert_eq!(
                built
                    .search(query, 3, weight, settings.search.normalization)
                    .unwrap(),
                reopened.search_weighted(query, 3, weight).unwrap()
            );
        }
    }
}

#[test]
fn zero_k_is_empty_not_error() {
    let dir = corpus_dir();
    let settings = settings(dir.path());
    let ranker = HybridRanker::open(&settings, Arc::new(KeywordEmbedder)).unwrap();
    assert!(ranker.search("grid", 0).unwrap().is_empty());
}
