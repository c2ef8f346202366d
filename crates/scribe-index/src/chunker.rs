//! Overlapping word-window chunking aligned to syntax or paragraph
//! boundaries.
//!
//! A word is a run of non-whitespace plus the whitespace that follows it
//! (leading whitespace belongs to the first word), so every chunk is an exact
//! slice of the source. A window holds at most `target_size` words and
//! consecutive windows share exactly `overlap` words. Inside each window the
//! chunker ends at the last semantic boundary (start of a function, class,
//! paragraph or heading) that still fills `min_fill` of the target, and falls
//! back to a plain word-count cut otherwise.

use serde::{Deserialize, Serialize};
use tree_sitter::{Node, Parser};

use crate::document::Document;
use crate::error::{IndexError, Result};
use crate::languages::Lang;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkerConfig {
    /// Maximum words per chunk.
    pub target_size: usize,
    /// Words shared by consecutive chunks. Must be below `target_size`.
    pub overlap: usize,
    /// Fraction of `target_size` a chunk must reach before it may end early
    /// on a semantic boundary.
    pub min_fill: f32,
    /// Longer non-whitespace runs are cut into pieces of at most this many
    /// bytes, each counting as a word.
    pub max_word_bytes: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            target_size: 200,
            overlap: 20,
            min_fill: 0.5,
            max_word_bytes: 256,
        }
    }
}

impl ChunkerConfig {
    /// # Errors
    ///
    /// Returns [`IndexError::Config`] when the size/overlap contract is violated.
    pub fn validate(&self) -> Result<()> {
        if self.target_size == 0 {
            return Err(IndexError::Config("chunker.target_size must be positive".into()));
        }
        if self.overlap >= self.target_size {
            return Err(IndexError::Config(format!(
                "chunker.overlap ({}) must be below target_size ({})",
                self.overlap, self.target_size
            )));
        }
        if !(0.0..=1.0).contains(&self.min_fill) {
            return Err(IndexError::Config(format!(
                "chunker.min_fill must be within [0, 1], got {}",
                self.min_fill
            )));
        }
        if self.max_word_bytes < 4 {
            return Err(IndexError::Config("chunker.max_word_bytes must be at least 4".into()));
        }
        Ok(())
    }

    fn min_fill_words(&self) -> usize {
        #[allow(
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss,
            clippy::cast_precision_loss
        )]
        let words = (self.target_size as f32 * self.min_fill).ceil() as usize;
        words.clamp(1, self.target_size)
    }
}

/// Contiguous slice of one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// `blake3(file_path \0 index)`, stable across re-indexing.
    pub id: String,
    pub file_path: String,
    /// Position of the chunk within its file, from 0.
    pub index: usize,
    pub start_byte: usize,
    pub end_byte: usize,
    pub start_line: usize,
    pub end_line: usize,
    pub word_count: usize,
    pub language: Option<Lang>,
    pub text: String,
}

#[must_use]
pub fn chunk_id(file_path: &str, index: usize) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(file_path.as_bytes());
    hasher.update(&[0]);
    hasher.update(index.to_string().as_bytes());
    hasher.finalize().to_hex().to_string()
}

/// Rebuild the source from chunks of one file by dropping overlapping bytes.
#[must_use]
pub fn reconstruct(chunks: &[Chunk]) -> String {
    let mut out = String::new();
    let mut covered = 0usize;
    for chunk in chunks {
        if chunk.end_byte <= covered {
            continue;
        }
        let skip = covered.saturating_sub(chunk.start_byte);
        out.push_str(&chunk.text[skip..]);
        covered = chunk.end_byte;
    }
    out
}

#[derive(Debug, Clone)]
pub struct Chunker {
    config: ChunkerConfig,
}

impl Chunker {
    /// # Errors
    ///
    /// Returns [`IndexError::Config`] if `config` is invalid.
    pub fn new(config: ChunkerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    #[must_use]
    pub fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    #[must_use]
    pub fn chunk_document(&self, doc: &Document) -> Vec<Chunk> {
        self.chunk(&doc.content, &doc.path, doc.language)
    }

    /// Split `content` into chunks in file order. Empty or whitespace-only
    /// content yields no chunks.
    #[must_use]
    pub fn chunk(&self, content: &str, file_path: &str, language: Option<Lang>) -> Vec<Chunk> {
        let tokens = tokenize(content, self.config.max_word_bytes);
        if tokens.is_empty() {
            return Vec::new();
        }

        let boundaries = match language {
            Some(lang) if lang.is_prose() => prose_boundaries(content, &tokens),
            Some(lang) => syntax_boundaries(content, lang, &tokens),
            None => Vec::new(),
        };

        let windows = self.windows(tokens.len(), &boundaries);
        let newlines: Vec<usize> = content
            .bytes()
            .enumerate()
            .filter_map(|(i, b)| (b == b'\n').then_some(i))
            .collect();
        let line_of = |byte: usize| newlines.partition_point(|&p| p < byte) + 1;

        windows
            .into_iter()
            .enumerate()
            .map(|(index, (s, e))| {
                let start_byte = if s == 0 { 0 } else { tokens[s].0 };
                let end_byte = tokens.get(e).map_or(content.len(), |t| t.0);
                Chunk {
                    id: chunk_id(file_path, index),
                    file_path: file_path.to_owned(),
                    index,
                    start_byte,
                    end_byte,
                    start_line: line_of(tokens[s].0),
                    end_line: line_of(tokens[e - 1].1),
                    word_count: e - s,
                    language,
                    text: content[start_byte..end_byte].to_owned(),
                }
            })
            .collect()
    }

    /// Word ranges `[start, end)` of every chunk.
    fn windows(&self, n: usize, boundaries: &[usize]) -> Vec<(usize, usize)> {
        let target = self.config.target_size;
        let overlap = self.config.overlap;
        let min_len = self.config.min_fill_words().max(overlap + 1);

        let mut out = Vec::new();
        let mut start = 0;
        loop {
            let limit = start + target;
            let end = if limit >= n {
                n
            } else {
                let hi = boundaries.partition_point(|&b| b <= limit);
                boundaries[..hi]
                    .last()
                    .copied()
                    .filter(|&b| b >= start + min_len)
                    .unwrap_or(limit)
            };
            out.push((start, end));
            if end >= n {
                return out;
            }
            start = end - overlap;
        }
    }
}

/// Byte ranges of the non-whitespace runs, long runs cut at char boundaries.
fn tokenize(content: &str, max_word_bytes: usize) -> Vec<(usize, usize)> {
    let mut tokens = Vec::new();
    let mut push = |start: usize, end: usize| {
        let mut s = start;
        while s < end {
            let mut next = (s + max_word_bytes).min(end);
            while !content.is_char_boundary(next) {
                next -= 1;
            }
            if next <= s {
                next = s + content[s..].chars().next().map_or(1, char::len_utf8);
            }
            tokens.push((s, next));
            s = next;
        }
    };

    let mut token_start = None;
    for (i, c) in content.char_indices() {
        match (c.is_whitespace(), token_start) {
            (true, Some(start)) => {
                push(start, i);
                token_start = None;
            }
            (false, None) => token_start = Some(i),
            _ => {}
        }
    }
    if let Some(start) = token_start {
        push(start, content.len());
    }
    tokens
}

/// Map byte offsets to the index of the first word starting at or after
/// them. Drops offsets that map to the first word or past the end.
fn to_word_indices(mut offsets: Vec<usize>, tokens: &[(usize, usize)]) -> Vec<usize> {
    offsets.sort_unstable();
    let mut words: Vec<usize> = offsets
        .into_iter()
        .map(|b| tokens.partition_point(|t| t.0 < b))
        .filter(|&w| w > 0 && w < tokens.len())
        .collect();
    words.dedup();
    words
}

/// Word indices starting a paragraph, heading or fenced block.
fn prose_boundaries(content: &str, tokens: &[(usize, usize)]) -> Vec<usize> {
    tokens
        .windows(2)
        .enumerate()
        .filter_map(|(i, pair)| {
            let gap = &content[pair[0].1..pair[1].0];
            let newlines = gap.matches('\n').count();
            let word = &content[pair[1].0..pair[1].1];
            let starts_block = newlines >= 2
                || (newlines == 1 && (word.starts_with('#') || word.starts_with("```")));
            starts_block.then_some(i + 1)
        })
        .collect()
}

/// Word indices where a top-level or nested entity (function, class, impl
/// ...) begins, including its leading comments and attributes. Empty when
/// no grammar is available or the parse contains errors.
fn syntax_boundaries(content: &str, lang: Lang, tokens: &[(usize, usize)]) -> Vec<usize> {
    let kinds = lang.entity_node_kinds();
    let Some(grammar) = lang.grammar() else {
        return Vec::new();
    };
    if kinds.is_empty() {
        return Vec::new();
    }

    let mut parser = Parser::new();
    if let Err(e) = parser.set_language(&grammar) {
        tracing::debug!(lang = lang.id(), "grammar rejected: {e}");
        return Vec::new();
    }
    let Some(tree) = parser.parse(content, None) else {
        return Vec::new();
    };
    let root = tree.root_node();
    if root.has_error() {
        tracing::debug!(lang = lang.id(), "syntax errors, using word-count splitting");
        return Vec::new();
    }

    let mut offsets = Vec::new();
    let mut cursor = root.walk();
    'walk: loop {
        let node = cursor.node();
        if kinds.contains(&node.kind()) {
            offsets.push(leading_trivia_start(node));
        }
        if cursor.goto_first_child() {
            continue;
        }
        loop {
            if cursor.goto_next_sibling() {
                break;
            }
            if !cursor.goto_parent() {
                break 'walk;
            }
        }
    }

    to_word_indices(offsets, tokens)
}

/// Start of the comments and attributes directly above `node`.
fn leading_trivia_start(node: Node<'_>) -> usize {
    let mut start = node.start_byte();
    let mut current = node;
    while let Some(prev) = current.prev_sibling() {
        let kind = prev.kind();
        let trivia = kind.contains("comment") || kind == "attribute_item" || kind == "decorator";
        if !trivia || prev.end_position().row + 1 < current.start_position().row {
            break;
        }
        start = prev.start_byte();
        current = prev;
    }
    start
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn chunker(target: usize, overlap: usize) -> Chunker {
        Chunker::new(ChunkerConfig {
            target_size: target,
            overlap,
            ..ChunkerConfig::default()
        })
        .unwrap()
    }

    fn words(text: &str) -> Vec<&str> {
        text.split_whitespace().collect()
    }

    #[test]
    fn empty_and_whitespace_yield_nothing() {
        let c = chunker(10, 2);
        assert!(c.chunk("", "a.txt", None).is_empty());
        assert!(c.chunk(" \n\t  \n", "a.txt", None).is_empty());
    }

    #[test]
    fn short_file_is_single_chunk() {
        let chunks = chunker(10, 3).chunk("  one two three\n", "a.txt", None);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "  one two three\n");
        assert_eq!(chunks[0].word_count, 3);
        assert_eq!(chunks[0].start_byte, 0);
    }

    #[test]
    fn exact_overlap_between_windows() {
        let text = (0..24).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ");
        let chunks = chunker(10, 3).chunk(&text, "a.txt", None);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].word_count, 10);
        assert_eq!(words(&chunks[1].text)[0], "w7");
        assert_eq!(words(&chunks[2].text)[0], "w14");
        assert_eq!(*words(&chunks[2].text).last().unwrap(), "w23");
        for pair in chunks.windows(2) {
            let a = words(&pair[0].text);
            let b = words(&pair[1].text);
            assert_eq!(&a[a.len() - 3..], &b[..3]);
        }
        assert_eq!(reconstruct(&chunks), text);
    }

    #[test]
    fn ids_are_stable_and_distinct() {
        let text = "a b c d e f g h";
        let first = chunker(3, 1).chunk(text, "x.txt", None);
        let second = chunker(3, 1).chunk(text, "x.txt", None);
        assert_eq!(first, second);
        assert_ne!(first[0].id, first[1].id);
        assert_eq!(first[2].id, chunk_id("x.txt", 2));
        assert_ne!(chunk_id("x.txt", 0), chunk_id("y.txt", 0));
    }

    #[test]
    fn line_numbers_are_one_based() {
        let text = "\n\nalpha beta\ngamma\ndelta epsilon\n";
        let chunks = chunker(2, 0).chunk(text, "a.txt", None);
        assert_eq!(chunks[0].start_line, 3);
        assert_eq!(chunks[0].end_line, 3);
        assert_eq!(chunks[1].start_line, 4);
        assert_eq!(chunks[1].end_line, 5);
    }

    #[test]
    fn long_tokens_are_cut_at_char_boundaries() {
        let text = "é".repeat(100);
        let c = Chunker::new(ChunkerConfig {
            target_size: 5,
            overlap: 1,
            max_word_bytes: 7,
            ..ChunkerConfig::default()
        })
        .unwrap();
        let chunks = c.chunk(&text, "blob.min.js", None);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.word_count <= 5);
        }
        assert_eq!(reconstruct(&chunks), text);
    }

    #[test]
    fn prose_breaks_on_paragraphs() {
        let para = |tag: &str| (0..6).map(|i| format!("{tag}{i}")).collect::<Vec<_>>().join(" ");
        let text = format!("{}\n\n{}\n\n{}\n", para("a"), para("b"), para("c"));
        let c = Chunker::new(ChunkerConfig {
            target_size: 10,
            overlap: 0,
            min_fill: 0.5,
            ..ChunkerConfig::default()
        })
        .unwrap();
        let chunks = c.chunk(&text, "notes.md", Some(Lang::Markdown));
        assert_eq!(chunks.len(), 3);
        assert!(chunks[0].text.starts_with("a0"));
        assert!(chunks[1].text.starts_with("b0"));
        assert!(chunks[2].text.starts_with("c0"));
        assert_eq!(reconstruct(&chunks), text);
    }

    #[test]
    fn headings_are_boundaries() {
        let text = "intro words here and there\n# Title\nbody text follows now";
        let c = Chunker::new(ChunkerConfig {
            target_size: 8,
            overlap: 0,
            min_fill: 0.5,
            ..ChunkerConfig::default()
        })
        .unwrap();
        let chunks = c.chunk(text, "doc.md", Some(Lang::Markdown));
        assert!(chunks[1].text.starts_with("# Title"));
    }

    #[test]
    fn boundary_too_early_is_ignored() {
        let text = "a\n\nb c d e f g h i j";
        let c = Chunker::new(ChunkerConfig {
            target_size: 6,
            overlap: 0,
            min_fill: 0.5,
            ..ChunkerConfig::default()
        })
        .unwrap();
        let chunks = c.chunk(text, "doc.txt", Some(Lang::Text));
        assert_eq!(chunks[0].word_count, 6);
    }

    #[cfg(feature = "lang-rust")]
    #[test]
    fn rust_chunks_start_at_items() {
        let body = |name: &str| {
            format!(
                "/// Docs for {name}.\nfn {name}() {{\n    let x = 1;\n    let y = x + 2;\n    println!(\"{{}}\", y);\n}}\n\n"
            )
        };
        let source = format!("{}{}{}", body("alpha"), body("beta"), body("gamma"));
        let c = Chunker::new(ChunkerConfig {
            target_size: 30,
            overlap: 0,
            min_fill: 0.3,
            ..ChunkerConfig::default()
        })
        .unwrap();
        let chunks = c.chunk(&source, "src/lib.rs", Some(Lang::Rust));
        assert!(chunks.len() >= 2);
        assert!(chunks[0].text.starts_with("/// Docs for alpha."));
        assert!(chunks[1].text.starts_with("/// Docs for beta."), "{:?}", chunks[1].text);
        assert_eq!(reconstruct(&chunks), source);
    }

    #[cfg(feature = "lang-rust")]
    #[test]
    fn broken_rust_falls_back_to_word_count() {
        let source = "fn broken( {{ let = ; }} ".repeat(20);
        let c = chunker(12, 2);
        let with_lang = c.chunk(&source, "bad.rs", Some(Lang::Rust));
        let without = c.chunk(&source, "bad.rs", None);
        let spans = |v: &[Chunk]| v.iter().map(|c| (c.start_byte, c.end_byte)).collect::<Vec<_>>();
        assert_eq!(spans(&with_lang), spans(&without));
    }

    #[cfg(feature = "lang-python")]
    #[test]
    fn python_boundaries_detected() {
        let source = "import os\n\ndef a():\n    return 1\n\nclass B:\n    def m(self):\n        pass\n";
        let tokens = tokenize(source, 256);
        let boundaries = syntax_boundaries(source, Lang::Python, &tokens);
        let starts: Vec<&str> = boundaries
            .iter()
            .map(|&w| &source[tokens[w].0..tokens[w].1])
            .collect();
        assert!(starts.contains(&"def"));
        assert!(starts.contains(&"class"));
    }

    #[test]
    fn config_validation() {
        assert!(Chunker::new(ChunkerConfig { target_size: 0, ..ChunkerConfig::default() }).is_err());
        assert!(
            Chunker::new(ChunkerConfig {
                target_size: 10,
                overlap: 10,
                ..ChunkerConfig::default()
            })
            .is_err()
        );
        assert!(Chunker::new(ChunkerConfig { min_fill: 1.5, ..ChunkerConfig::default() }).is_err());
        assert!(Chunker::new(ChunkerConfig::default()).is_ok());
    }

    proptest! {
        #[test]
        fn reconstruction_is_exact(
            content in "[a-zé日 \\t\\n#`]{0,400}",
            target in 1usize..20,
            overlap_seed in 0usize..20,
        ) {
            let overlap = overlap_seed % target;
            let c = Chunker::new(ChunkerConfig {
                target_size: target,
                overlap,
                max_word_bytes: 8,
                ..ChunkerConfig::default()
            })
            .unwrap();
            let chunks = c.chunk(&content, "p.md", Some(Lang::Markdown));
            if content.trim().is_empty() {
                prop_assert!(chunks.is_empty());
            } else {
                prop_assert_eq!(reconstruct(&chunks), content.clone());
            }
            for chunk in &chunks {
                prop_assert!(chunk.word_count <= target);
                prop_assert_eq!(&content[chunk.start_byte..chunk.end_byte], chunk.text.as_str());
            }
        }

        #[test]
        fn adjacent_chunks_share_exactly_overlap_words(
            words_in in prop::collection::vec("[a-z]{1,6}", 1..200),
            seps in prop::collection::vec(prop::sample::select(vec![" ", "\n", "\n\n", "  \t"]), 200),
            target in 2usize..30,
            overlap_seed in 0usize..30,
        ) {
            let overlap = overlap_seed % target;
            let mut content = String::new();
            for (i, w) in words_in.iter().enumerate() {
                content.push_str(w);
                content.push_str(seps[i]);
            }
            let c = Chunker::new(ChunkerConfig {
                target_size: target,
                overlap,
                min_fill: 0.4,
                max_word_bytes: 64,
            })
            .unwrap();
            let chunks = c.chunk(&content, "p.txt", Some(Lang::Text));
            if words_in.len() <= target {
                prop_assert_eq!(chunks.len(), 1);
            }
            for pair in chunks.windows(2) {
                let a = words(&pair[0].text);
                let b = words(&pair[1].text);
                prop_assert_eq!(&a[a.len() - overlap..], &b[..overlap]);
                prop_assert!(pair[1].start_byte > pair[0].start_byte);
            }
            let rebuilt = reconstruct(&chunks);
            prop_assert_eq!(words(&rebuilt).len(), words_in.len());
        }
    }
}
