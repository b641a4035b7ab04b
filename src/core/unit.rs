use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::record::RawBookRecord;
use super::toc::parse_toc;

/// Which part of a book an atomic unit was cut from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    Title,
    Description,
    TocEntry,
}

impl UnitKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitKind::Title => "title",
            UnitKind::Description => "description",
            UnitKind::TocEntry => "toc_entry",
        }
    }
}

impl fmt::Display for UnitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UnitKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "title" => Ok(UnitKind::Title),
            "description" => Ok(UnitKind::Description),
            "toc_entry" => Ok(UnitKind::TocEntry),
            other => Err(format!("unknown unit kind '{}'", other)),
        }
    }
}

/// Book-level fields copied onto every unit of that book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookAttributes {
    pub author: String,
    #[serde(rename = "pubDate")]
    pub pub_date: String,
    #[serde(rename = "categoryName")]
    pub category_name: String,
    pub toc: String,
}

/// The smallest indexed text fragment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtomicUnit {
    pub text: String,
    pub kind: UnitKind,
    /// Parent book key (its title).
    pub document_key: String,
    pub attributes: BookAttributes,
}

impl From<&RawBookRecord> for BookAttributes {
    fn from(record: &RawBookRecord) -> Self {
        Self {
            author: record.author.clone(),
            pub_date: record.pub_date.clone(),
            category_name: record.category_name.clone(),
            toc: record.toc.clone(),
        }
    }
}

/// Split a record into its title unit, description unit and one unit per
/// TOC leaf (`"<chapter> - <item>"`).
pub fn to_units(record: &RawBookRecord) -> Vec<AtomicUnit> {
    let attributes = BookAttributes::from(record);
    let toc = parse_toc(&record.toc);
    let mut units = Vec::with_capacity(2 + toc.leaf_count());

    let unit = |text: String, kind: UnitKind| AtomicUnit {
        text,
        kind,
        document_key: record.title.clone(),
        attributes: attributes.clone(),
    };

    units.push(unit(record.title.clone(), UnitKind::Title));
    units.push(unit(record.description.clone(), UnitKind::Description));
    for (chapter, item) in toc.leaves() {
        units.push(unit(format!("{} - {}", chapter, item), UnitKind::TocEntry));
    }

    units
}

/// Units of every record, in record order.
pub fn corpus_units(records: &[RawBookRecord]) -> Vec<AtomicUnit> {
    records.iter().flat_map(to_units).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(toc: &str) -> RawBookRecord {
        RawBookRecord {
            title: "Power Engineering".into(),
            author: "Lee".into(),
            pub_date: "2023-05-01".into(),
            description: "Exam prep for electrical engineers".into(),
            category_name: "Exam".into(),
            toc: toc.into(),
        }
    }

    #[test]
    fn test_title_and_description_always_present() {
        let units = to_units(&record(""));
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].kind, UnitKind::Title);
        assert_eq!(units[0].text, "Power Engineering");
        assert_eq!(units[1].kind, UnitKind::Description);
        assert!(units.iter().all(|u| u.document_key == "Power Engineering"));
    }

    #[test]
    fn test_toc_entries_carry_chapter_context() {
        let units = to_units(&record("<b>Ch1</b>Ohm's law<br>Kirchhoff<br>"));
        assert_eq!(units.len(), 4);
        assert_eq!(units[2].kind, UnitKind::TocEntry);
        assert_eq!(units[2].text, "Ch1 - Ohm's law");
        assert_eq!(units[3].text, "Ch1 - Kirchhoff");
        // full toc markup is denormalized onto every unit
        assert!(units.iter().all(|u| u.attributes.toc.contains("Kirchhoff")));
    }

    #[test]
    fn test_kind_round_trips_through_str() {
        for kind in [UnitKind::Title, UnitKind::Description, UnitKind::TocEntry] {
            assert_eq!(kind.as_str().parse::<UnitKind>().unwrap(), kind);
        }
        assert!("chapter".parse::<UnitKind>().is_err());
    }
}
