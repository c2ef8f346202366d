//! Language detection and tree-sitter grammar registry.

use std::path::Path;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lang {
    Rust,
    Python,
    JavaScript,
    TypeScript,
    Go,
    Markdown,
    /// Plain prose: `.txt`, `.rst`, `.adoc`.
    Text,
}

impl Lang {
    /// Identifier stored in entry metadata.
    #[must_use]
    pub fn id(self) -> &'static str {
        match self {
            Self::Rust => "rust",
            Self::Python => "python",
            Self::JavaScript => "javascript",
            Self::TypeScript => "typescript",
            Self::Go => "go",
            Self::Markdown => "markdown",
            Self::Text => "text",
        }
    }

    #[must_use]
    pub fn from_id(id: &str) -> Option<Self> {
        match id.to_ascii_lowercase().as_str() {
            "rust" | "rs" => Some(Self::Rust),
            "python" | "py" => Some(Self::Python),
            "javascript" | "js" => Some(Self::JavaScript),
            "typescript" | "ts" => Some(Self::TypeScript),
            "go" | "golang" => Some(Self::Go),
            "markdown" | "md" => Some(Self::Markdown),
            "text" | "txt" | "prose" => Some(Self::Text),
            _ => None,
        }
    }

    /// Get the tree-sitter grammar. Returns `None` for prose and when the
    /// corresponding feature is not enabled.
    #[must_use]
    pub fn grammar(self) -> Option<tree_sitter::Language> {
        match self {
            #[cfg(feature = "lang-rust")]
            Self::Rust => Some(tree_sitter_rust::LANGUAGE.into()),
            #[cfg(feature = "lang-python")]
            Self::Python => Some(tree_sitter_python::LANGUAGE.into()),
            #[cfg(feature = "lang-js")]
            Self::JavaScript => Some(tree_sitter_javascript::LANGUAGE.into()),
            #[cfg(feature = "lang-js")]
            Self::TypeScript => Some(tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()),
            #[cfg(feature = "lang-go")]
            Self::Go => Some(tree_sitter_go::LANGUAGE.into()),
            #[allow(unreachable_patterns)]
            _ => None,
        }
    }

    /// AST node kinds whose start is a good place to begin a chunk.
    #[must_use]
    pub fn entity_node_kinds(self) -> &'static [&'static str] {
        match self {
            Self::Rust => &[
                "function_item",
                "struct_item",
                "enum_item",
                "trait_item",
                "impl_item",
                "type_item",
                "const_item",
                "static_item",
                "macro_definition",
                "mod_item",
            ],
            Self::Python => &[
                "function_definition",
                "class_definition",
                "decorated_definition",
            ],
            Self::JavaScript | Self::TypeScript => &[
                "function_declaration",
                "class_declaration",
                "method_definition",
                "export_statement",
                "lexical_declaration",
                "interface_declaration",
                "type_alias_declaration",
            ],
            Self::Go => &[
                "function_declaration",
                "method_declaration",
                "type_declaration",
                "const_declaration",
            ],
            Self::Markdown | Self::Text => &[],
        }
    }

    /// Split on paragraphs and headings instead of syntax.
    #[must_use]
    pub fn is_prose(self) -> bool {
        matches!(self, Self::Markdown | Self::Text)
    }
}

impl std::fmt::Display for Lang {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

/// Detect language from file extension.
#[must_use]
pub fn detect_language(path: &Path) -> Option<Lang> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "rs" => Some(Lang::Rust),
        "py" | "pyi" => Some(Lang::Python),
        "js" | "jsx" | "mjs" | "cjs" => Some(Lang::JavaScript),
        "ts" | "tsx" | "mts" | "cts" => Some(Lang::TypeScript),
        "go" => Some(Lang::Go),
        "md" | "markdown" | "mdx" => Some(Lang::Markdown),
        "txt" | "rst" | "adoc" => Some(Lang::Text),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detect_language_by_extension() {
        assert_eq!(detect_language(Path::new("src/main.rs")), Some(Lang::Rust));
        assert_eq!(detect_language(Path::new("script.py")), Some(Lang::Python));
        assert_eq!(detect_language(Path::new("app.tsx")), Some(Lang::TypeScript));
        assert_eq!(detect_language(Path::new("README.MD")), Some(Lang::Markdown));
        assert_eq!(detect_language(Path::new("notes.txt")), Some(Lang::Text));
    }

    #[test]
    fn detect_language_unknown() {
        assert_eq!(detect_language(Path::new("Cargo.lock")), None);
        assert_eq!(detect_language(Path::new("Makefile")), None);
    }

    #[test]
    fn id_roundtrips_through_from_id() {
        for lang in [
            Lang::Rust,
            Lang::Python,
            Lang::JavaScript,
            Lang::TypeScript,
            Lang::Go,
            Lang::Markdown,
            Lang::Text,
        ] {
            assert_eq!(Lang::from_id(lang.id()), Some(lang));
        }
        assert_eq!(Lang::from_id("cobol"), None);
    }

    #[test]
    fn prose_has_no_grammar() {
        assert!(Lang::Markdown.grammar().is_none());
        assert!(Lang::Text.entity_node_kinds().is_empty());
        assert!(Lang::Markdown.is_prose());
        assert!(!Lang::Rust.is_prose());
    }

    #[cfg(feature = "lang-rust")]
    #[test]
    fn rust_grammar_available() {
        assert!(Lang::Rust.grammar().is_some());
    }

    #[test]
    fn display_uses_id() {
        assert_eq!(Lang::JavaScript.to_string(), "javascript");
    }
}
