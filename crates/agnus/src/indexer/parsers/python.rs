// crates/agnus/src/indexer/parsers/python.rs
// Python parser using tree-sitter

use anyhow::{Result, anyhow};
use tree_sitter::{Node, Parser};

use super::{
    LanguageParser, NodeExt, ParseContext, ParseResult, ParsedRelation, ParsedSymbol,
    default_parse, node_text, qualify,
};
use crate::graph::SymbolKind;

/// Python language parser
pub struct PythonParser;

impl LanguageParser for PythonParser {
    fn language_id(&self) -> &'static str {
        "python"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["py"]
    }

    fn configure_parser(&self, parser: &mut Parser) -> Result<()> {
        parser
            .set_language(&tree_sitter_python::LANGUAGE.into())
            .map_err(|e| anyhow!("Failed to set Python language: {}", e))
    }

    fn parse(&self, parser: &mut Parser, content: &str) -> Result<ParseResult> {
        default_parse(parser, content, "python", walk)
    }
}

fn walk(node: Node, ctx: &mut ParseContext, parent_name: Option<&str>, current_function: Option<&str>) {
    match node.kind() {
        "function_definition" => {
            if let Some(sym) = extract_function(node, ctx.source, parent_name) {
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
        "class_definition" => {
            if let Some(sym) = extract_class(node, ctx, parent_name) {
                let name = sym.name.clone();
                ctx.symbols.push(sym);
                if let Some(body) = node.child_by_field_name("body") {
                    for child in body.children(&mut body.walk()) {
                        walk(child, ctx, Some(&name), current_function);
                    }
                }
                return;
            }
        }
        "import_statement" | "import_from_statement" => {
            for name in extract_imports(node, ctx.source) {
                ctx.relations.push(ParsedRelation::Import { name });
            }
        }
        "call" => {
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

/// Extract the docstring: the first expression statement of a body when it
/// is a plain string literal.
fn extract_docstring(node: Node, source: &[u8]) -> Option<String> {
    let body = node.child_by_field_name("body")?;
    let first = body.named_child(0)?;
    if first.kind() != "expression_statement" {
        return None;
    }
    let string = first.named_child(0)?;
    if string.kind() != "string" {
        return None;
    }
    let text = node_text(string, source);
    let trimmed = text
        .trim_matches(|c| c == '"' || c == '\'')
        .trim()
        .to_string();
    (!trimmed.is_empty()).then_some(trimmed)
}

fn extract_function(node: Node, source: &[u8], parent_name: Option<&str>) -> Option<ParsedSymbol> {
    let name = node.field_text("name", source)?;
    let params = node
        .field_text("parameters", source)
        .unwrap_or_else(|| "()".to_string());
    let is_async = node.has_child_kind("async");

    Some(ParsedSymbol {
        qualified_name: qualify(parent_name, &name),
        signature: format!(
            "{}def {}{}",
            if is_async { "async " } else { "" },
            name,
            params
        ),
        name,
        kind: SymbolKind::Function,
        start_line: node.start_line(),
        end_line: node.end_line(),
        doc_comment: extract_docstring(node, source),
    })
}

fn extract_class(node: Node, ctx: &mut ParseContext, parent_name: Option<&str>) -> Option<ParsedSymbol> {
    let name = node.field_text("name", ctx.source)?;

    // Superclasses become inheritance relations
    if let Some(superclasses) = node.child_by_field_name("superclasses") {
        for base in superclasses.children(&mut superclasses.walk()) {
            if base.kind() == "identifier" {
                ctx.relations.push(ParsedRelation::Inherits {
                    child: name.clone(),
                    parent: node_text(base, ctx.source),
                });
            } else if base.kind() == "attribute"
                && let Some(attr) = base.field_text("attribute", ctx.source)
            {
                ctx.relations.push(ParsedRelation::Inherits {
                    child: name.clone(),
                    parent: attr,
                });
            }
        }
    }

    let bases = node
        .field_text("superclasses", ctx.source)
        .unwrap_or_default();

    Some(ParsedSymbol {
        qualified_name: qualify(parent_name, &name),
        signature: format!("class {}{}", name, bases),
        name,
        kind: SymbolKind::Class,
        start_line: node.start_line(),
        end_line: node.end_line(),
        doc_comment: extract_docstring(node, ctx.source),
    })
}

fn extract_imports(node: Node, source: &[u8]) -> Vec<String> {
    let mut names = Vec::new();

    if node.kind() == "import_from_statement" {
        // from module import a, b: the imported names are what may resolve
        let mut saw_module = false;
        for child in node.children(&mut node.walk()) {
            match child.kind() {
                "dotted_name" | "relative_import" => {
                    if !saw_module {
                        saw_module = true;
                        continue;
                    }
                    let text = node_text(child, source);
                    if let Some(last) = text.rsplit('.').next() {
                        names.push(last.to_string());
                    }
                }
                "aliased_import" => {
                    if let Some(alias) = child.field_text("alias", source) {
                        names.push(alias);
                    }
                }
                "wildcard_import" => {}
                _ => {}
            }
        }
    } else {
        // import a.b.c binds the first segment
        for child in node.children(&mut node.walk()) {
            match child.kind() {
                "dotted_name" => {
                    let text = node_text(child, source);
                    if let Some(first) = text.split('.').next() {
                        names.push(first.to_string());
                    }
                }
                "aliased_import" => {
                    if let Some(alias) = child.field_text("alias", source) {
                        names.push(alias);
                    }
                }
                _ => {}
            }
        }
    }

    names
}

fn extract_callee(node: Node, source: &[u8]) -> Option<String> {
    let function_node = node.child_by_field_name("function")?;
    let callee = match function_node.kind() {
        "identifier" => node_text(function_node, source),
        "attribute" => function_node.field_text("attribute", source)?,
        _ => return None,
    };

    // Skip common builtins
    if matches!(
        callee.as_str(),
        "print"
            | "len"
            | "str"
            | "int"
            | "float"
            | "list"
            | "dict"
            | "set"
            | "tuple"
            | "range"
            | "enumerate"
            | "zip"
            | "open"
            | "type"
            | "isinstance"
            | "hasattr"
            | "getattr"
            | "setattr"
            | "super"
            | "sorted"
            | "reversed"
            | "map"
            | "filter"
            | "any"
            | "all"
            | "append"
            | "join"
            | "format"
    ) {
        return None;
    }

    Some(callee)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::parsers::parse_with;

    fn parse_python(code: &str) -> ParseResult {
        parse_with(&PythonParser, code).unwrap()
    }

    #[test]
    fn test_parse_function() {
        let code = r#"
def process_order(order):
    validate_order(order)
"#;
        let (symbols, relations) = parse_python(code);
        assert_eq!(symbols.len(), 1);
        assert_eq!(symbols[0].name, "process_order");
        assert_eq!(symbols[0].kind, SymbolKind::Function);
        assert!(relations.contains(&ParsedRelation::Call {
            caller: "process_order".to_string(),
            callee: "validate_order".to_string(),
        }));
    }

    #[test]
    fn test_parse_async_function() {
        let code = r#"
async def fetch_data():
    return "data"
"#;
        let (symbols, _) = parse_python(code);
        assert_eq!(symbols.len(), 1);
        assert!(symbols[0].signature.starts_with("async def"));
    }

    #[test]
    fn test_parse_class_with_methods() {
        let code = r#"
class OrderService:
    def __init__(self):
        self.orders = []

    def submit(self, order):
        self.orders.append(order)
"#;
        let (symbols, _) = parse_python(code);

        let class_sym = symbols.iter().find(|s| s.name == "OrderService").unwrap();
        assert_eq!(class_sym.kind, SymbolKind::Class);

        let init = symbols.iter().find(|s| s.name == "__init__").unwrap();
        assert_eq!(init.qualified_name, "OrderService.__init__");
    }

    #[test]
    fn test_inheritance() {
        let code = r#"
class AdminUser(User, AuditMixin):
    pass
"#;
        let (_, relations) = parse_python(code);
        assert!(relations.contains(&ParsedRelation::Inherits {
            child: "AdminUser".to_string(),
            parent: "User".to_string(),
        }));
        assert!(relations.contains(&ParsedRelation::Inherits {
            child: "AdminUser".to_string(),
            parent: "AuditMixin".to_string(),
        }));
    }

    #[test]
    fn test_imports() {
        let code = r#"
import os
import numpy.random
from typing import List, Dict
from .local_module import helper
"#;
        let (_, relations) = parse_python(code);
        let imports: Vec<&str> = relations
            .iter()
            .filter_map(|r| match r {
                ParsedRelation::Import { name } => Some(name.as_str()),
                _ => None,
            })
            .collect();
        assert!(imports.contains(&"os"));
        assert!(imports.contains(&"numpy"));
        assert!(imports.contains(&"List"));
        assert!(imports.contains(&"helper"));
    }

    #[test]
    fn test_docstring_extraction() {
        let code = r#"
def documented():
    """Does the documented thing."""
    return 1

def undocumented():
    return 2
"#;
        let (symbols, _) = parse_python(code);
        let documented = symbols.iter().find(|s| s.name == "documented").unwrap();
        assert!(documented
            .doc_comment
            .as_deref()
            .unwrap()
            .contains("documented thing"));
        let undocumented = symbols.iter().find(|s| s.name == "undocumented").unwrap();
        assert!(undocumented.doc_comment.is_none());
    }
}
