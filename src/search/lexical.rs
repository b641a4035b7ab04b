//! BM25 (Okapi) lexical index over atomic units.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use crate::core::unit::AtomicUnit;

#[derive(Debug, Clone, Copy)]
pub struct Bm25Params {
    pub k1: f64,
    pub b: f64,
    /// Floor for negative IDFs, as a fraction of the mean IDF.
    pub epsilon: f64,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self {
            k1: 1.5,
            b: 0.75,
            epsilon: 0.25,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LexicalIndex {
    /// term → (ordinal, term frequency), ordinals ascending. Ordered so the
    /// IDF floor is summed identically on every build.
    postings: BTreeMap<String, Vec<(usize, u32)>>,
    idf: HashMap<String, f64>,
    doc_lens: Vec<usize>,
    avgdl: f64,
    params: Bm25Params,
}

/// Lower-case, split on whitespace. No stemming, no stop words.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

impl LexicalIndex {
    pub fn build(units: &[AtomicUnit]) -> Self {
        Self::build_with(units, Bm25Params::default())
    }

    pub fn build_with(units: &[AtomicUnit], params: Bm25Params) -> Self {
        let mut postings: BTreeMap<String, Vec<(usize, u32)>> = BTreeMap::new();
        let mut doc_lens = Vec::with_capacity(units.len());

        for (ordinal, unit) in units.iter().enumerate() {
            let tokens = tokenize(&unit.text);
            doc_lens.push(tokens.len());

            let mut freqs: HashMap<String, u32> = HashMap::new();
            for token in tokens {
                *freqs.entry(token).or_insert(0) += 1;
            }
            for (term, tf) in freqs {
                postings.entry(term).or_default().push((ordinal, tf));
            }
        }

        let n = units.len() as f64;
        let avgdl = if units.is_empty() {
            0.0
        } else {
            doc_lens.iter().sum::<usize>() as f64 / n
        };

        let mut idf: HashMap<String, f64> = HashMap::with_capacity(postings.len());
        let mut idf_sum = 0.0;
        let mut negative = Vec::new();
        for (term, docs) in &postings {
            let df = docs.len() as f64;
            let value = (n - df + 0.5).ln() - (df + 0.5).ln();
            idf_sum += value;
            if value < 0.0 {
                negative.push(term.clone());
            }
            idf.insert(term.clone(), value);
        }
        if !idf.is_empty() {
            let floor = params.epsilon * idf_sum / idf.len() as f64;
            for term in negative {
                idf.insert(term, floor);
            }
        }

        Self {
            postings,
            idf,
            doc_lens,
            avgdl,
            params,
        }
    }

    pub fn len(&self) -> usize {
        self.doc_lens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.doc_lens.is_empty()
    }

    /// BM25 score of every unit, indexed by ordinal.
    ///
    /// Repeated query terms count once per occurrence.
    pub fn scores(&self, text: &str) -> Vec<f32> {
        let Bm25Params { k1, b, .. } = self.params;
        let mut scores = vec![0.0f64; self.doc_lens.len()];

        for term in tokenize(text) {
            let (Some(docs), Some(idf)) = (self.postings.get(&term), self.idf.get(&term)) else {
                continue;
            };
            for &(ordinal, tf) in docs {
                let tf = tf as f64;
                let len_norm = 1.0 - b + b * self.doc_lens[ordinal] as f64 / self.avgdl;
                scores[ordinal] += idf * (tf * (k1 + 1.0)) / (tf + k1 * len_norm);
            }
        }

        scores.into_iter().map(|s| s as f32).collect()
    }

    /// Top `k` units as `(ordinal, score)`, score descending, ties by ordinal.
    ///
    /// Every unit competes, so zero-score units fill the tail when fewer than
    /// `k` units match.
    pub fn query(&self, text: &str, k: usize) -> Vec<(usize, f32)> {
        if k == 0 || self.is_empty() {
            return Vec::new();
        }

        let mut ranked: Vec<(usize, f32)> = self.scores(text).into_iter().enumerate().collect();
        ranked.sort_by(|a, b| match b.1.total_cmp(&a.1) {
            Ordering::Equal => a.0.cmp(&b.0),
            other => other,
        });
        ranked.truncate(k);
        ranked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::unit::{BookAttributes, UnitKind};

    fn units(texts: &[&str]) -> Vec<AtomicUnit> {
        texts
            .iter()
            .enumerate()
            .map(|(i, t)| AtomicUnit {
                text: t.to_string(),
                kind: UnitKind::Description,
                document_key: format!("doc{}", i),
                attributes: BookAttributes {
                    author: String::new(),
                    pub_date: String::new(),
                    category_name: String::new(),
                    toc: String::new(),
                },
            })
            .collect()
    }

    #[test]
    fn test_tokenize_lowercases_on_whitespace() {
        assert_eq!(tokenize("  Hello\tWORLD, again "), vec!["hello", "world,", "again"]);
    }

    #[test]
    fn test_matching_unit_ranks_first() {
        let index = LexicalIndex::build(&units(&[
            "the quick brown fox",
            "lazy cat sleeps all day",
            "quick brown rabbits hop in the garden",
            "power systems exam",
        ]));
        let hits = index.query("lazy cat", 2);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].0, 1);
        assert!(hits[0].1 > 0.0);
    }

    #[test]
    fn test_ties_broken_by_ordinal_and_deterministic() {
        let index = LexicalIndex::build(&units(&["alpha beta", "gamma", "alpha beta", "delta", "epsilon"]));
        let first = index.query("alpha", 4);
        assert_eq!(first, index.query("alpha", 4));
        let order: Vec<usize> = first.iter().map(|h| h.0).collect();
        // two equal matches, then zero-score units in ordinal order
        assert_eq!(order, vec![0, 2, 1, 3]);
        assert_eq!(first[0].1, first[1].1);
        assert_eq!(first[2].1, 0.0);
    }

    #[test]
    fn test_case_insensitive() {
        let index = LexicalIndex::build(&units(&["Chef", "Electrical Engineer", "Baker"]));
        let top = index.query("ELECTRICAL", 1);
        assert_eq!(top[0].0, 1);
        assert!(top[0].1 > 0.0);
    }

    #[test]
    fn test_common_term_gets_positive_floor() {
        // "exam" appears in 3 of 4 units: raw idf is negative and is floored
        let index = LexicalIndex::build(&units(&["exam one", "exam two", "exam three", "other"]));
        let scores = index.scores("exam");
        assert!(scores[0] > 0.0);
        assert_eq!(scores[3], 0.0);
    }

    #[test]
    fn test_zero_k_and_empty_index() {
        let index = LexicalIndex::build(&units(&["a b c"]));
        assert!(index.query("a", 0).is_empty());
        assert!(LexicalIndex::build(&[]).query("a", 5).is_empty());
    }
}
