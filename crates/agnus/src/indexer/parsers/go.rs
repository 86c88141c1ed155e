// crates/agnus/src/indexer/parsers/go.rs
// Go parser using tree-sitter

use anyhow::{Result, anyhow};
use tree_sitter::{Node, Parser};

use super::{
    LanguageParser, NodeExt, ParseContext, ParseResult, ParsedRelation, ParsedSymbol,
    default_parse, node_text,
};
use crate::graph::SymbolKind;

/// Go language parser
pub struct GoParser;

impl LanguageParser for GoParser {
    fn language_id(&self) -> &'static str {
        "go"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["go"]
    }

    fn configure_parser(&self, parser: &mut Parser) -> Result<()> {
        parser
            .set_language(&tree_sitter_go::LANGUAGE.into())
            .map_err(|e| anyhow!("Failed to set Go language: {}", e))
    }

    fn parse(&self, parser: &mut Parser, content: &str) -> Result<ParseResult> {
        default_parse(parser, content, "go", walk)
    }
}

fn walk(node: Node, ctx: &mut ParseContext, parent_name: Option<&str>, current_function: Option<&str>) {
    match node.kind() {
        "function_declaration" | "method_declaration" => {
            if let Some(sym) = extract_function(node, ctx.source) {
                let func_name = sym.qualified_name.clone();
                ctx.symbols.push(sym);
                if let Some(body) = node.child_by_field_name("body") {
                    for child in body.children(&mut body.walk()) {
                        walk(child, ctx, parent_name, Some(&func_name));
                    }
                }
                return;
            }
        }
        "type_declaration" => {
            for sym in extract_types(node, ctx.source) {
                ctx.symbols.push(sym);
            }
        }
        "import_declaration" => {
            for name in extract_imports(node, ctx.source) {
                ctx.relations.push(ParsedRelation::Import { name });
            }
        }
        "call_expression" => {
            if let Some(caller) = current_function
                && let Some(callee) = extract_callee(node, ctx.source)
            {
                ctx.relations.push(ParsedRelation::Call {
                    caller: caller.to_string(),
                    callee,
                });
            }
        }
        _ => {}
    }

    for child in node.children(&mut node.walk()) {
        walk(child, ctx, parent_name, current_function);
    }
}

/// Doc comment: the run of `//` comments directly above a declaration
fn get_doc_comment(node: Node, source: &[u8]) -> Option<String> {
    let mut lines: Vec<String> = Vec::new();
    let mut sib = node.prev_sibling();
    let mut expected_row = node.start_position().row;

    while let Some(n) = sib {
        if n.kind() != "comment" || n.end_position().row + 1 != expected_row {
            break;
        }
        let text = node_text(n, source);
        lines.push(text.trim_start_matches("//").trim().to_string());
        expected_row = n.start_position().row;
        sib = n.prev_sibling();
    }

    if lines.is_empty() {
        None
    } else {
        lines.reverse();
        Some(lines.join(" "))
    }
}

fn extract_function(node: Node, source: &[u8]) -> Option<ParsedSymbol> {
    let name = node.field_text("name", source)?;

    // Methods qualify as Receiver.Name
    let receiver = if node.kind() == "method_declaration" {
        node.child_by_field_name("receiver").and_then(|r| {
            let mut cursor = r.walk();
            for child in r.children(&mut cursor) {
                if child.kind() == "parameter_declaration" {
                    if let Some(ty) = child.child_by_field_name("type") {
                        let text = node_text(ty, source);
                        return Some(text.trim_start_matches('*').to_string());
                    }
                }
            }
            None
        })
    } else {
        None
    };

    let (kind, qualified_name) = match receiver {
        Some(recv) => (SymbolKind::Method, format!("{}.{}", recv, name)),
        None => (SymbolKind::Function, name.clone()),
    };

    let params = node
        .field_text("parameters", source)
        .unwrap_or_else(|| "()".to_string());
    let result = node.field_text("result", source).unwrap_or_default();

    Some(ParsedSymbol {
        signature: format!("func {}{} {}", qualified_name, params, result)
            .trim_end()
            .to_string(),
        name,
        qualified_name,
        kind,
        start_line: node.start_line(),
        end_line: node.end_line(),
        doc_comment: get_doc_comment(node, source),
    })
}

fn extract_types(node: Node, source: &[u8]) -> Vec<ParsedSymbol> {
    let mut symbols = Vec::new();

    for child in node.children(&mut node.walk()) {
        if child.kind() != "type_spec" {
            continue;
        }
        let Some(name) = child.field_text("name", source) else {
            continue;
        };

        let kind = child
            .child_by_field_name("type")
            .map(|t| match t.kind() {
                "struct_type" => SymbolKind::Class,
                "interface_type" => SymbolKind::Interface,
                _ => SymbolKind::Type,
            })
            .unwrap_or(SymbolKind::Type);

        let keyword = match kind {
            SymbolKind::Class => "struct",
            SymbolKind::Interface => "interface",
            _ => "type",
        };

        symbols.push(ParsedSymbol {
            qualified_name: name.clone(),
            signature: format!("type {} {}", name, keyword),
            name,
            kind,
            start_line: child.start_line(),
            end_line: child.end_line(),
            doc_comment: get_doc_comment(node, source),
        });
    }

    symbols
}

/// Imported package names: `import "net/http"` binds `http`,
/// `import db "database/sql"` binds `db`.
fn extract_imports(node: Node, source: &[u8]) -> Vec<String> {
    let mut names = Vec::new();

    let mut handle_spec = |spec: Node| {
        if spec.kind() != "import_spec" {
            return;
        }
        if let Some(alias) = spec.field_text("name", source) {
            if alias != "_" && alias != "." {
                names.push(alias);
            }
        } else if let Some(path) = spec.field_text("path", source) {
            let trimmed = path.trim_matches('"');
            if let Some(last) = trimmed.rsplit('/').next() {
                names.push(last.to_string());
            }
        }
    };

    for child in node.children(&mut node.walk()) {
        if child.kind() == "import_spec" {
            handle_spec(child);
        } else if child.kind() == "import_spec_list" {
            for spec in child.children(&mut child.walk()) {
                handle_spec(spec);
            }
        }
    }

    names
}

/// Bare callee name from a call site; selector expressions yield the method
/// name (`svc.Process(x)` calls `Process`).
fn extract_callee(node: Node, source: &[u8]) -> Option<String> {
    let function_node = node.child_by_field_name("function")?;
    let callee = match function_node.kind() {
        "identifier" => node_text(function_node, source),
        "selector_expression" => function_node.field_text("field", source)?,
        _ => return None,
    };

    // Skip common builtins
    if matches!(
        callee.as_str(),
        "len" | "cap" | "make" | "new" | "append" | "copy" | "delete" | "panic" | "recover"
            | "print" | "println" | "close" | "Sprintf" | "Printf" | "Errorf" | "Println"
    ) {
        return None;
    }

    Some(callee)
}
