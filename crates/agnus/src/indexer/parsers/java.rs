// crates/agnus/src/indexer/parsers/java.rs
// Java parser using tree-sitter

use anyhow::{Result, anyhow};
use tree_sitter::{Node, Parser};

use super::{
    LanguageParser, NodeExt, ParseContext, ParseResult, ParsedRelation, ParsedSymbol,
    default_parse, node_text, preceding_block_doc, qualify,
};
use crate::graph::SymbolKind;

/// Java language parser
pub struct JavaParser;

impl LanguageParser for JavaParser {
    fn language_id(&self) -> &'static str {
        "java"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["java"]
    }

    fn configure_parser(&self, parser: &mut Parser) -> Result<()> {
        parser
            .set_language(&tree_sitter_java::LANGUAGE.into())
            .map_err(|e| anyhow!("Failed to set Java language: {}", e))
    }

    fn parse(&self, parser: &mut Parser, content: &str) -> Result<ParseResult> {
        default_parse(parser, content, "java", walk)
    }
}

fn walk(node: Node, ctx: &mut ParseContext, parent_name: Option<&str>, current_function: Option<&str>) {
    match node.kind() {
        "class_declaration" => {
            if let Some(sym) = extract_class(node, ctx) {
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
        "interface_declaration" => {
            if let Some(sym) = extract_interface(node, ctx.source) {
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
        "method_declaration" | "constructor_declaration" => {
            if let Some(sym) = extract_method(node, ctx.source, parent_name) {
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
        "import_declaration" => {
            if let Some(name) = extract_import(node, ctx.source) {
                ctx.relations.push(ParsedRelation::Import { name });
            }
        }
        "method_invocation" => {
            if let Some(caller) = current_function
                && let Some(callee) = node.field_text("name", ctx.source)
            {
                ctx.relations.push(ParsedRelation::Call {
                    caller: caller.to_string(),
                    callee,
                });
            }
        }
        "object_creation_expression" => {
            // `new Foo(...)` counts as a call to the constructor's class
            if let Some(caller) = current_function
                && let Some(type_node) = node.child_by_field_name("type")
            {
                let callee = match type_node.kind() {
                    "type_identifier" => Some(node_text(type_node, ctx.source)),
                    "generic_type" => type_node.find_child_text("type_identifier", ctx.source),
                    _ => None,
                };
                if let Some(callee) = callee {
                    ctx.relations.push(ParsedRelation::Call {
                        caller: caller.to_string(),
                        callee,
                    });
                }
            }
        }
        _ => {}
    }

    for child in node.children(&mut node.walk()) {
        walk(child, ctx, parent_name, current_function);
    }
}

fn extract_class(node: Node, ctx: &mut ParseContext) -> Option<ParsedSymbol> {
    let name = node.field_text("name", ctx.source)?;

    // extends Base
    if let Some(superclass) = node.child_by_field_name("superclass")
        && let Some(base) = superclass.find_child_text("type_identifier", ctx.source)
    {
        ctx.relations.push(ParsedRelation::Inherits {
            child: name.clone(),
            parent: base,
        });
    }

    // implements A, B
    if let Some(interfaces) = node.child_by_field_name("interfaces") {
        collect_type_identifiers(interfaces, ctx.source, &mut |iface| {
            ctx.relations.push(ParsedRelation::Implements {
                child: name.clone(),
                iface,
            });
        });
    }

    Some(ParsedSymbol {
        qualified_name: name.clone(),
        signature: format!("class {}", name),
        name,
        kind: SymbolKind::Class,
        start_line: node.start_line(),
        end_line: node.end_line(),
        doc_comment: preceding_block_doc(node, ctx.source),
    })
}

fn extract_interface(node: Node, source: &[u8]) -> Option<ParsedSymbol> {
    let name = node.field_text("name", source)?;
    Some(ParsedSymbol {
        qualified_name: name.clone(),
        signature: format!("interface {}", name),
        name,
        kind: SymbolKind::Interface,
        start_line: node.start_line(),
        end_line: node.end_line(),
        doc_comment: preceding_block_doc(node, source),
    })
}

fn extract_method(node: Node, source: &[u8], parent_name: Option<&str>) -> Option<ParsedSymbol> {
    let name = node.field_text("name", source)?;
    let params = node
        .field_text("parameters", source)
        .unwrap_or_else(|| "()".to_string());
    let return_type = node.field_text("type", source);

    let signature = match return_type {
        Some(ret) => format!("{} {}{}", ret, name, params),
        None => format!("{}{}", name, params),
    };

    Some(ParsedSymbol {
        qualified_name: qualify(parent_name, &name),
        name,
        kind: SymbolKind::Method,
        signature,
        start_line: node.start_line(),
        end_line: node.end_line(),
        doc_comment: preceding_block_doc(node, source),
    })
}

/// Imported bare class name: `import com.acme.auth.AuthService;` yields
/// `AuthService`; wildcard imports yield nothing resolvable.
fn extract_import(node: Node, source: &[u8]) -> Option<String> {
    if node.has_child_kind("asterisk") {
        return None;
    }
    let path = node.find_child_text("scoped_identifier", source)
        .or_else(|| node.find_child_text("identifier", source))?;
    path.rsplit('.').next().map(|s| s.to_string())
}

fn collect_type_identifiers(node: Node, source: &[u8], f: &mut impl FnMut(String)) {
    for child in node.children(&mut node.walk()) {
        match child.kind() {
            "type_identifier" => f(node_text(child, source)),
            _ => collect_type_identifiers(child, source, f),
        }
    }
}
