//! Term matching over chunk content and metadata tags.

use scribe_store::{EntryRecord, RetrievalResult, keys};

/// Score for a query term found in the chunk text.
pub const CONTENT_WEIGHT: f32 = 1.0;
/// Score for a query term found in a metadata value (path, language ...).
pub const TAG_WEIGHT: f32 = 0.5;

/// Metadata keys whose values are bookkeeping rather than tags.
const UNTAGGED_KEYS: &[&str] = &[
    keys::CHUNK_INDEX,
    keys::START_LINE,
    keys::END_LINE,
    keys::FILE_HASH,
];

/// Lowercased, de-duplicated terms of at least two characters, in query order.
#[must_use]
pub fn query_terms(query: &str) -> Vec<String> {
    let mut terms: Vec<String> = Vec::new();
    for term in query
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|t| t.chars().count() >= 2)
        .map(str::to_lowercase)
    {
        if !terms.contains(&term) {
            terms.push(term);
        }
    }
    terms
}

/// Raw (unnormalized) keyword score of one record.
#[must_use]
pub fn score_record(terms: &[String], record: &EntryRecord) -> f32 {
    let content = record.content.as_deref().unwrap_or_default().to_lowercase();
    let tags: Vec<String> = record
        .metadata
        .iter()
        .filter(|(k, _)| !UNTAGGED_KEYS.contains(&k.as_str()))
        .map(|(_, v)| v.to_lowercase())
        .collect();

    terms
        .iter()
        .map(|term| {
            let mut score = 0.0;
            if content.contains(term.as_str()) {
                score += CONTENT_WEIGHT;
            }
            if tags.iter().any(|t| t.contains(term.as_str())) {
                score += TAG_WEIGHT;
            }
            score
        })
        .sum()
}

/// Records with a positive score, normalized into `(0, 1]` by the best score.
/// Order is unspecified.
#[must_use]
pub fn keyword_search(query: &str, records: Vec<EntryRecord>) -> Vec<RetrievalResult> {
    let terms = query_terms(query);
    if terms.is_empty() {
        return Vec::new();
    }

    let scored: Vec<(f32, EntryRecord)> = records
        .into_iter()
        .filter_map(|record| {
            let score = score_record(&terms, &record);
            (score > 0.0).then_some((score, record))
        })
        .collect();

    let max = scored.iter().map(|(s, _)| *s).fold(0.0_f32, f32::max);
    if max <= 0.0 {
        return Vec::new();
    }
    scored
        .into_iter()
        .map(|(score, record)| RetrievalResult::from_record(record, score / max))
        .collect()
}
