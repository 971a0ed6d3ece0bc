use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::HashSet;

/// Source of ranking stopwords, per language.
pub trait Lexicon: Send + Sync {
    /// Whether `token` (already case-folded as the caller needs) carries no
    /// ranking signal for `language`.
    fn is_ranking_stopword(&self, language: Option<&str>, token: &str) -> bool;

    fn status(&self, language: Option<&str>) -> LexiconStatus;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LexiconStatus {
    pub source: String,
    pub language: String,
    pub stopwords: usize,
}

const ENGLISH: &[&str] = &[
    "a", "about", "an", "and", "any", "are", "as", "at", "be", "by", "can", "do", "does", "for",
    "from", "get", "has", "have", "how", "i", "in", "into", "is", "it", "its", "me", "my", "of",
    "on", "or", "set", "should", "so", "some", "that", "the", "their", "then", "there", "these",
    "this", "to", "use", "used", "uses", "using", "was", "what", "when", "where", "which", "who",
    "why", "will", "with", "you",
];

const RUST: &[&str] = &[
    "as", "async", "await", "crate", "dyn", "else", "enum", "false", "fn", "for", "if", "impl",
    "in", "let", "loop", "match", "mod", "move", "mut", "pub", "ref", "return", "self", "static",
    "struct", "super", "trait", "true", "type", "unsafe", "use", "where", "while", "ok", "err",
    "some", "none", "unwrap", "clone", "new",
];

const PYTHON: &[&str] = &[
    "and", "as", "assert", "async", "await", "class", "def", "del", "elif", "else", "except",
    "false", "finally", "for", "from", "global", "if", "import", "in", "is", "lambda", "none",
    "nonlocal", "not", "or", "pass", "raise", "return", "self", "true", "try", "while", "with",
    "yield", "init",
];

const JAVASCRIPT: &[&str] = &[
    "async", "await", "break", "case", "catch", "class", "const", "continue", "default",
    "delete", "else", "export", "extends", "false", "finally", "for", "function", "if", "import",
    "in", "instanceof", "interface", "let", "new", "null", "of", "return", "static", "super",
    "switch", "this", "throw", "true", "try", "type", "typeof", "undefined", "var", "void",
    "while", "yield",
];

const GO: &[&str] = &[
    "break", "case", "chan", "const", "continue", "default", "defer", "else", "err", "false",
    "for", "func", "go", "goto", "if", "import", "interface", "map", "nil", "package", "range",
    "return", "select", "struct", "switch", "true", "type", "var",
];

const JAVA: &[&str] = &[
    "abstract", "boolean", "break", "case", "catch", "class", "extends", "final", "finally",
    "for", "if", "implements", "import", "instanceof", "int", "interface", "new", "null",
    "package", "private", "protected", "public", "return", "static", "super", "this", "throw",
    "throws", "try", "void", "while",
];

struct LanguageSet {
    name: &'static str,
    words: HashSet<&'static str>,
}

fn language_set(name: &'static str, keywords: &[&'static str]) -> LanguageSet {
    LanguageSet {
        name,
        words: ENGLISH.iter().chain(keywords).copied().collect(),
    }
}

static GENERIC: Lazy<LanguageSet> = Lazy::new(|| language_set("generic", &[]));
static RUST_SET: Lazy<LanguageSet> = Lazy::new(|| language_set("rust", RUST));
static PYTHON_SET: Lazy<LanguageSet> = Lazy::new(|| language_set("python", PYTHON));
static JAVASCRIPT_SET: Lazy<LanguageSet> = Lazy::new(|| language_set("javascript", JAVASCRIPT));
static GO_SET: Lazy<LanguageSet> = Lazy::new(|| language_set("go", GO));
static JAVA_SET: Lazy<LanguageSet> = Lazy::new(|| language_set("java", JAVA));

/// Shared English stopwords plus per-language keywords for rust, python,
/// javascript/typescript, go and java.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinLexicon;

impl BuiltinLexicon {
    fn set_for(language: Option<&str>) -> &'static LanguageSet {
        let Some(language) = language else {
            return &*GENERIC;
        };
        match language.to_ascii_lowercase().as_str() {
            "rust" | "rs" => &*RUST_SET,
            "python" | "py" | "pyi" => &*PYTHON_SET,
            "javascript" | "typescript" | "js" | "jsx" | "mjs" | "cjs" | "ts" | "tsx" => {
                &*JAVASCRIPT_SET
            }
            "go" | "golang" => &*GO_SET,
            "java" => &*JAVA_SET,
            _ => &*GENERIC,
        }
    }
}

impl Lexicon for BuiltinLexicon {
    fn is_ranking_stopword(&self, language: Option<&str>, token: &str) -> bool {
        let words = &Self::set_for(language).words;
        words.contains(token) || words.contains(token.to_lowercase().as_str())
    }

    fn status(&self, language: Option<&str>) -> LexiconStatus {
        let set = Self::set_for(language);
        LexiconStatus {
            source: "builtin".to_string(),
            language: set.name.to_string(),
            stopwords: set.words.len(),
        }
    }
}
