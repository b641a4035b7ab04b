use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

lazy_static! {
    // <b>heading</b> | <br> | any other tag
    static ref TOC_TOKEN_RE: Regex = Regex::new(
        r"(?is)(?P<heading><\s*b\b[^>]*>(?P<title>.*?)<\s*/\s*b\s*>)|(?P<br><\s*br\s*/?\s*>)|(?P<tag><[^>]*>)"
    )
    .unwrap();
    static ref TAG_RE: Regex = Regex::new(r"<[^>]*>").unwrap();
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    #[serde(rename = "chapter")]
    pub title: String,
    pub items: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableOfContents {
    pub chapters: Vec<Chapter>,
}

impl TableOfContents {
    pub fn is_empty(&self) -> bool {
        self.chapters.is_empty()
    }

    /// `(chapter, item)` pairs in document order.
    pub fn leaves(&self) -> impl Iterator<Item = (&str, &str)> {
        self.chapters
            .iter()
            .flat_map(|c| c.items.iter().map(move |i| (c.title.as_str(), i.as_str())))
    }

    pub fn leaf_count(&self) -> usize {
        self.chapters.iter().map(|c| c.items.len()).sum()
    }
}

/// Parse catalog TOC markup into chapters and their leaf items.
///
/// Bold spans are chapter headings; text between line breaks is a leaf item
/// attached to the most recent heading. Text before the first heading, or
/// after a heading with no text, has no chapter and is dropped.
pub fn parse_toc(markup: &str) -> TableOfContents {
    let mut toc = TableOfContents::default();
    let mut pending = String::new();
    let mut last = 0;
    let mut in_chapter = false;

    for caps in TOC_TOKEN_RE.captures_iter(markup) {
        let Some(m) = caps.get(0) else { continue };
        pending.push_str(&markup[last..m.start()]);
        last = m.end();

        if caps.name("heading").is_some() {
            flush_item(&mut toc, &mut pending, in_chapter);
            let raw = caps.name("title").map(|t| t.as_str()).unwrap_or("");
            let title = clean_text(&TAG_RE.replace_all(raw, ""));
            in_chapter = !title.is_empty();
            if in_chapter {
                toc.chapters.push(Chapter {
                    title,
                    items: Vec::new(),
                });
            }
        } else if caps.name("br").is_some() {
            flush_item(&mut toc, &mut pending, in_chapter);
        }
        // other tags are transparent
    }
    pending.push_str(&markup[last..]);
    flush_item(&mut toc, &mut pending, in_chapter);

    toc
}

fn flush_item(toc: &mut TableOfContents, pending: &mut String, in_chapter: bool) {
    let item = clean_text(pending);
    pending.clear();
    if item.is_empty() || !in_chapter {
        return;
    }
    if let Some(chapter) = toc.chapters.last_mut() {
        chapter.items.push(item);
    }
}

fn clean_text(raw: &str) -> String {
    decode_entities(raw)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn decode_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    s.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chapters_and_items() {
        let toc = parse_toc("<b>Ch1</b>item1<br>item2<br><b>Ch2</b>item3<br>");
        assert_eq!(
            toc.chapters,
            vec![
                Chapter {
                    title: "Ch1".into(),
                    items: vec!["item1".into(), "item2".into()]
                },
                Chapter {
                    title: "Ch2".into(),
                    items: vec!["item3".into()]
                },
            ]
        );
        assert_eq!(toc.leaf_count(), 3);
    }

    #[test]
    fn test_no_headings_is_empty() {
        let toc = parse_toc("item1<br>item2<br>item3");
        assert!(toc.is_empty());
        assert!(parse_toc("").is_empty());
    }

    #[test]
    fn test_items_before_first_heading_dropped() {
        let toc = parse_toc("preface<br><b>Part 1</b><br>Basics<br>");
        assert_eq!(toc.chapters.len(), 1);
        assert_eq!(toc.chapters[0].items, vec!["Basics".to_string()]);
    }

    #[test]
    fn test_blank_heading_closes_chapter() {
        let toc = parse_toc("<b>A</b>x<br><b> &nbsp;</b>orphan<br><b>B</b>z<br>");
        assert_eq!(toc.chapters.len(), 2);
        assert_eq!(toc.chapters[0].items, vec!["x".to_string()]);
        assert_eq!(toc.chapters[1].title, "B");
        assert_eq!(toc.chapters[1].items, vec!["z".to_string()]);
    }

    #[test]
    fn test_catalog_style_markup() {
        let markup = "<p><B>1부 전기자기학</B><BR>1장 벡터 &amp; 스칼라<BR/>2장 정전계<BR>\n<B>2부 <i>전력공학</i></B><BR>3장 송전<BR></p>";
        let toc = parse_toc(markup);
        assert_eq!(toc.chapters.len(), 2);
        assert_eq!(toc.chapters[0].title, "1부 전기자기학");
        assert_eq!(
            toc.chapters[0].items,
            vec!["1장 벡터 & 스칼라".to_string(), "2장 정전계".to_string()]
        );
        assert_eq!(toc.chapters[1].title, "2부 전력공학");
        assert_eq!(toc.chapters[1].items, vec!["3장 송전".to_string()]);
    }

    #[test]
    fn test_leaves_in_document_order() {
        let toc = parse_toc("<b>A</b>x<br>y<br><b>B</b>z");
        let leaves: Vec<_> = toc.leaves().collect();
        assert_eq!(leaves, vec![("A", "x"), ("A", "y"), ("B", "z")]);
    }
}
