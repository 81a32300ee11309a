//! Core data types: keywords, documents and the boolean term query tree.

use serde::{Deserialize, Serialize};

/// Separator between the field and word halves of a keyword's canonical form.
pub const KEYWORD_SEPARATOR: char = '\u{1}';

/// A single indexable keyword, scoped to a field.
///
/// The canonical string form `field \x01 word` is what the inverted index
/// keys posting lists by. A keyword with an empty word has an empty
/// canonical form and is never indexed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Keyword {
    #[serde(default)]
    pub field: String,
    pub word: String,
}

impl Keyword {
    pub fn new<F: Into<String>, W: Into<String>>(field: F, word: W) -> Self {
        Keyword {
            field: field.into(),
            word: word.into(),
        }
    }

    /// The canonical map key for this keyword, empty when the word is empty.
    pub fn canonical(&self) -> String {
        if self.word.is_empty() {
            String::new()
        } else {
            format!("{}{}{}", self.field, KEYWORD_SEPARATOR, self.word)
        }
    }
}

/// A document as submitted by clients and stored in the forward store.
///
/// `int_id` is assigned by the owning worker on every (re)insert and is
/// strictly increasing within the worker's process lifetime. Clients leave
/// it zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Business-side identifier, unique within a worker.
    pub id: String,
    /// Worker-local monotonic identifier, the posting list key.
    #[serde(default)]
    pub int_id: u64,
    /// 64-bit feature word evaluated by the bitmask filter.
    #[serde(default)]
    pub bits_feature: u64,
    #[serde(default)]
    pub keywords: Vec<Keyword>,
    /// Opaque payload carried along with the record.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub payload: Vec<u8>,
}

impl Document {
    pub fn new<S: Into<String>>(id: S) -> Self {
        Document {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn with_keyword(mut self, keyword: Keyword) -> Self {
        self.keywords.push(keyword);
        self
    }

    pub fn with_bits(mut self, bits: u64) -> Self {
        self.bits_feature = bits;
        self
    }
}

/// A node of the boolean query tree.
///
/// Exactly one of `keyword`, `must` or `should` is populated in a non-empty
/// node: a populated `keyword` is a leaf, `must` is a conjunction over its
/// children and `should` a disjunction. Trees are assembled with
/// [`TermQuery::keyword`], [`TermQuery::and`] and [`TermQuery::or`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TermQuery {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub keyword: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub must: Vec<TermQuery>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub should: Vec<TermQuery>,
}

impl TermQuery {
    /// A leaf node matching the keyword's canonical form.
    pub fn keyword(kw: &Keyword) -> Self {
        TermQuery {
            keyword: kw.canonical(),
            ..Default::default()
        }
    }

    /// A leaf node from an already canonical keyword string.
    pub fn raw<S: Into<String>>(canonical: S) -> Self {
        TermQuery {
            keyword: canonical.into(),
            ..Default::default()
        }
    }

    /// True when no field of the node is populated. Empty nodes match
    /// nothing and are dropped by the combinators.
    pub fn is_empty(&self) -> bool {
        self.keyword.is_empty() && self.must.is_empty() && self.should.is_empty()
    }

    fn is_pure_must(&self) -> bool {
        self.keyword.is_empty() && self.should.is_empty() && !self.must.is_empty()
    }

    fn is_pure_should(&self) -> bool {
        self.keyword.is_empty() && self.must.is_empty() && !self.should.is_empty()
    }

    /// Conjunction of `self` and `others`.
    ///
    /// Nodes that are themselves bare conjunctions are flattened into the
    /// merged child list instead of nesting one level deeper.
    pub fn and<I: IntoIterator<Item = TermQuery>>(self, others: I) -> TermQuery {
        let mut merged = Vec::new();
        if self.is_pure_must() {
            merged.extend(self.must);
        } else if !self.is_empty() {
            merged.push(self);
        }
        for query in others {
            if query.is_empty() {
                continue;
            }
            if query.is_pure_must() {
                merged.extend(query.must);
            } else {
                merged.push(query);
            }
        }
        TermQuery {
            must: merged,
            ..Default::default()
        }
    }

    /// Disjunction of `self` and `others`, flattening bare disjunctions.
    pub fn or<I: IntoIterator<Item = TermQuery>>(self, others: I) -> TermQuery {
        let mut merged = Vec::new();
        if self.is_pure_should() {
            merged.extend(self.should);
        } else if !self.is_empty() {
            merged.push(self);
        }
        for query in others {
            if query.is_empty() {
                continue;
            }
            if query.is_pure_should() {
                merged.extend(query.should);
            } else {
                merged.push(query);
            }
        }
        TermQuery {
            should: merged,
            ..Default::default()
        }
    }
}
