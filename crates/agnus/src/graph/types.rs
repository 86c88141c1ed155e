// crates/agnus/src/graph/types.rs
// Core types for the symbol dependency graph

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of a named declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolKind {
    Function,
    Method,
    Class,
    Interface,
    Type,
    Const,
}

impl SymbolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::Method => "method",
            Self::Class => "class",
            Self::Interface => "interface",
            Self::Type => "type",
            Self::Const => "const",
        }
    }
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Kind of a directed relation between symbols
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeKind {
    Calls,
    Imports,
    Inherits,
    Implements,
    Uses,
    Overrides,
}

impl EdgeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Calls => "calls",
            Self::Imports => "imports",
            Self::Inherits => "inherits",
            Self::Implements => "implements",
            Self::Uses => "uses",
            Self::Overrides => "overrides",
        }
    }
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Edge target: a bare name at extraction time, a symbol id once resolved.
///
/// Parsers cannot resolve arbitrary references, so call sites are captured as
/// bare callee names and resolved against the graph's name index per batch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeTarget {
    Name(String),
    Id(String),
}

impl EdgeTarget {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Name(s) | Self::Id(s) => s,
        }
    }
}

/// A named declaration with a stable id of the form `<filePath>:<qualifiedName>`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Symbol {
    pub id: String,
    pub file_path: String,
    pub name: String,
    pub qualified_name: String,
    pub kind: SymbolKind,
    pub signature: String,
    pub start_line: u32,
    pub end_line: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc_comment: Option<String>,
    pub repo_id: String,
    pub branch: String,
}

impl Symbol {
    /// Build the stable symbol id for a declaration
    pub fn make_id(file_path: &str, qualified_name: &str) -> String {
        format!("{}:{}", file_path, qualified_name)
    }
}

/// A directed relation between two symbols
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Edge {
    pub from: String,
    pub to: EdgeTarget,
    pub kind: EdgeKind,
}

impl Edge {
    /// Edge whose target is a bare name awaiting resolution
    pub fn named(from: impl Into<String>, name: impl Into<String>, kind: EdgeKind) -> Self {
        Self {
            from: from.into(),
            to: EdgeTarget::Name(name.into()),
            kind,
        }
    }

    /// Edge whose target is already a symbol id
    pub fn resolved(from: impl Into<String>, to_id: impl Into<String>, kind: EdgeKind) -> Self {
        Self {
            from: from.into(),
            to: EdgeTarget::Id(to_id.into()),
            kind,
        }
    }
}

/// Impact of a set of changed symbols: direct and transitive callers, the
/// files they live in, and a 0-100 risk score.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlastRadius {
    pub direct_callers: Vec<Symbol>,
    pub transitive_callers: Vec<Symbol>,
    pub affected_files: Vec<String>,
    pub risk_score: u32,
}
