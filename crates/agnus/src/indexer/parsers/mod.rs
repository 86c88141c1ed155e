// crates/agnus/src/indexer/parsers/mod.rs
// Language-specific symbol/edge extractors using tree-sitter

pub mod csharp;
pub mod go;
pub mod java;
pub mod python;
pub mod typescript;

use anyhow::{Result, anyhow};
use std::collections::HashMap;
use std::sync::LazyLock;
use tree_sitter::{Node, Parser};

use crate::graph::SymbolKind;

pub use self::csharp::CsharpParser;
pub use self::go::GoParser;
pub use self::java::JavaParser;
pub use self::python::PythonParser;
pub use self::typescript::TypeScriptParser;

/// A declaration extracted from one file. The indexer attaches the file path,
/// repo and branch, and derives the stable symbol id.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedSymbol {
    pub name: String,
    pub qualified_name: String,
    pub kind: SymbolKind,
    pub signature: String,
    pub start_line: u32,
    pub end_line: u32,
    pub doc_comment: Option<String>,
}

/// A relation extracted from one file. Targets are bare identifiers; the
/// graph resolves them against its name index per batch.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedRelation {
    /// `caller` is the qualified name of the enclosing declaration
    Call { caller: String, callee: String },
    /// A file-scope import of a bare symbol or module name
    Import { name: String },
    Inherits { child: String, parent: String },
    Implements { child: String, iface: String },
}

/// Result of parsing one file's source
pub type ParseResult = (Vec<ParsedSymbol>, Vec<ParsedRelation>);

/// Trait for language-specific parsers.
///
/// `parse` must be deterministic (same bytes, same output) and total: syntax
/// errors yield a partial result, never an error for ill-formed input.
/// Parsing performs no I/O.
pub trait LanguageParser: Send + Sync {
    /// Language identifier (e.g., "typescript", "python")
    fn language_id(&self) -> &'static str;

    /// File extensions this parser handles
    fn extensions(&self) -> &'static [&'static str];

    /// Configure a tree-sitter parser with the language grammar
    fn configure_parser(&self, parser: &mut Parser) -> Result<()>;

    /// Parse source code and extract symbols and relations
    fn parse(&self, parser: &mut Parser, content: &str) -> Result<ParseResult>;
}

/// Registry of available language parsers, keyed by extension and language.
///
/// Grammar load failures (ABI mismatch, missing grammar) disable only the
/// affected language; the rest keep operating.
pub struct ParserRegistry {
    by_extension: HashMap<&'static str, &'static dyn LanguageParser>,
    by_language: HashMap<&'static str, &'static dyn LanguageParser>,
}

impl ParserRegistry {
    pub fn by_extension(&self, ext: &str) -> Option<&'static dyn LanguageParser> {
        self.by_extension.get(ext).copied()
    }

    pub fn by_language(&self, lang: &str) -> Option<&'static dyn LanguageParser> {
        self.by_language.get(lang).copied()
    }

    pub fn all(&self) -> impl Iterator<Item = &'static dyn LanguageParser> {
        self.by_language.values().copied()
    }

    /// Check whether a file path has a supported extension
    pub fn supports(&self, path: &str) -> bool {
        path.rsplit('.')
            .next()
            .is_some_and(|ext| self.by_extension.contains_key(ext))
    }
}

static TYPESCRIPT_PARSER: TypeScriptParser = TypeScriptParser;
static PYTHON_PARSER: PythonParser = PythonParser;
static JAVA_PARSER: JavaParser = JavaParser;
static CSHARP_PARSER: CsharpParser = CsharpParser;
static GO_PARSER: GoParser = GoParser;

/// Global parser registry - use this for all parser lookups
pub static PARSERS: LazyLock<ParserRegistry> = LazyLock::new(|| {
    let candidates: &[&'static dyn LanguageParser] = &[
        &TYPESCRIPT_PARSER,
        &PYTHON_PARSER,
        &JAVA_PARSER,
        &CSHARP_PARSER,
        &GO_PARSER,
    ];

    let mut by_extension = HashMap::new();
    let mut by_language = HashMap::new();

    for parser in candidates {
        let mut probe = Parser::new();
        if let Err(e) = parser.configure_parser(&mut probe) {
            tracing::warn!(
                language = parser.language_id(),
                error = %e,
                "Grammar failed to load; language disabled"
            );
            continue;
        }
        by_language.insert(parser.language_id(), *parser);
        for ext in parser.extensions() {
            by_extension.insert(*ext, *parser);
        }
    }

    ParserRegistry {
        by_extension,
        by_language,
    }
});

/// Parse `content` with the given language parser, handling the tree-sitter
/// setup boilerplate. Used by the indexer and by parser tests.
pub fn parse_with(parser: &dyn LanguageParser, content: &str) -> Result<ParseResult> {
    let mut ts_parser = Parser::new();
    parser.configure_parser(&mut ts_parser)?;
    parser.parse(&mut ts_parser, content)
}

/// Parsing context bundling source bytes and result collectors, passed down
/// the AST walk of each tree-sitter language.
pub struct ParseContext<'a> {
    pub source: &'a [u8],
    pub symbols: Vec<ParsedSymbol>,
    pub relations: Vec<ParsedRelation>,
}

impl<'a> ParseContext<'a> {
    pub fn new(source: &'a [u8]) -> Self {
        Self {
            source,
            symbols: Vec::new(),
            relations: Vec::new(),
        }
    }

    pub fn into_result(self) -> ParseResult {
        (self.symbols, self.relations)
    }
}

/// Shared parse implementation for the tree-sitter languages
pub fn default_parse<F>(parser: &mut Parser, content: &str, language: &str, walk_fn: F) -> Result<ParseResult>
where
    F: FnOnce(Node, &mut ParseContext, Option<&str>, Option<&str>),
{
    let tree = parser
        .parse(content, None)
        .ok_or_else(|| anyhow!("Failed to parse {} code", language))?;

    let mut ctx = ParseContext::new(content.as_bytes());
    walk_fn(tree.root_node(), &mut ctx, None, None);
    Ok(ctx.into_result())
}

/// Helper to extract text from a tree-sitter node
pub fn node_text(node: Node, source: &[u8]) -> String {
    std::str::from_utf8(&source[node.byte_range()])
        .unwrap_or("")
        .to_string()
}

/// Qualify a name with its parent scope
pub fn qualify(parent: Option<&str>, name: &str) -> String {
    match parent {
        Some(p) => format!("{}.{}", p, name),
        None => name.to_string(),
    }
}

/// Extension trait for tree-sitter Node with common helper methods
pub trait NodeExt<'a> {
    /// Get 1-indexed start line number
    fn start_line(&self) -> u32;

    /// Get 1-indexed end line number
    fn end_line(&self) -> u32;

    /// Get text of a named field child
    fn field_text(&self, field: &str, source: &[u8]) -> Option<String>;

    /// Find first child with given kind and return its text
    fn find_child_text(&self, kind: &str, source: &[u8]) -> Option<String>;

    /// Check if any direct child has the given kind
    fn has_child_kind(&self, kind: &str) -> bool;
}

impl<'a> NodeExt<'a> for Node<'a> {
    fn start_line(&self) -> u32 {
        self.start_position().row as u32 + 1
    }

    fn end_line(&self) -> u32 {
        self.end_position().row as u32 + 1
    }

    fn field_text(&self, field: &str, source: &[u8]) -> Option<String> {
        self.child_by_field_name(field)
            .map(|n| node_text(n, source))
    }

    fn find_child_text(&self, kind: &str, source: &[u8]) -> Option<String> {
        self.children(&mut self.walk())
            .find(|n| n.kind() == kind)
            .map(|n| node_text(n, source))
    }

    fn has_child_kind(&self, kind: &str) -> bool {
        self.children(&mut self.walk()).any(|n| n.kind() == kind)
    }
}

/// Extract a block doc comment (`/** ... */`) preceding a node, walking
/// backwards through unnamed siblings.
pub fn preceding_block_doc(node: Node, source: &[u8]) -> Option<String> {
    let mut sib = node.prev_sibling();
    while let Some(n) = sib {
        if n.kind() == "comment" || n.kind() == "block_comment" {
            let text = node_text(n, source);
            if text.starts_with("/**") {
                let inner = text
                    .trim_start_matches("/**")
                    .trim_end_matches("*/")
                    .lines()
                    .map(|l| l.trim().trim_start_matches('*').trim())
                    .filter(|l| !l.is_empty())
                    .collect::<Vec<_>>()
                    .join(" ");
                return if inner.is_empty() { None } else { Some(inner) };
            }
            break;
        } else if n.is_named() {
            break;
        }
        sib = n.prev_sibling();
    }
    None
}
