// crates/agnus/src/indexer/parsers/typescript.rs
// TypeScript/JavaScript parser using the TypeScript grammar

use anyhow::{Result, anyhow};
use tree_sitter::{Node, Parser};

use super::{
    LanguageParser, NodeExt, ParseContext, ParseResult, ParsedRelation, ParsedSymbol,
    default_parse, node_text, preceding_block_doc, qualify,
};
use crate::graph::SymbolKind;

/// TypeScript/JavaScript language parser
/// Handles .ts, .tsx, .js, .jsx files using the TypeScript grammar
pub struct TypeScriptParser;

impl LanguageParser for TypeScriptParser {
    fn language_id(&self) -> &'static str {
        "typescript"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["ts", "tsx", "js", "jsx"]
    }

    fn configure_parser(&self, parser: &mut Parser) -> Result<()> {
        parser
            .set_language(&tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into())
            .map_err(|e| anyhow!("Failed to set TypeScript language: {}", e))
    }

    fn parse(&self, parser: &mut Parser, content: &str) -> Result<ParseResult> {
        default_parse(parser, content, "typescript", walk)
    }
}

/// Walk the AST and extract symbols and relations
fn walk(node: Node, ctx: &mut ParseContext, parent_name: Option<&str>, current_function: Option<&str>) {
    match node.kind() {
        "function_declaration" | "method_definition" => {
            let kind = if node.kind() == "method_definition" {
                SymbolKind::Method
            } else {
                SymbolKind::Function
            };
            if let Some(sym) = extract_function(node, ctx.source, parent_name, kind) {
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
        "arrow_function" => {
            // Named arrow functions are handled by the lexical_declaration arm;
            // bare callbacks would only pollute the graph with anonymous nodes
            return;
        }
        "class_declaration" => {
            if let Some(sym) = extract_class(node, ctx.source) {
                let name = sym.name.clone();
                extract_heritage(node, ctx, &name);
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
            if let Some(sym) = extract_named(node, ctx.source, SymbolKind::Interface) {
                ctx.symbols.push(sym);
            }
        }
        "type_alias_declaration" => {
            if let Some(sym) = extract_named(node, ctx.source, SymbolKind::Type) {
                ctx.symbols.push(sym);
            }
        }
        "import_statement" => {
            for name in extract_named_imports(node, ctx.source) {
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
        "export_statement" => {
            for child in node.children(&mut node.walk()) {
                walk(child, ctx, parent_name, current_function);
            }
            return;
        }
        "lexical_declaration" | "variable_declaration" => {
            // const foo = () => {} and const foo = function () {}
            for declarator in node.children(&mut node.walk()) {
                if declarator.kind() == "variable_declarator"
                    && let Some(value) = declarator.child_by_field_name("value")
                    && (value.kind() == "arrow_function"
                        || value.kind() == "function_expression"
                        || value.kind() == "function")
                    && let Some(name_node) = declarator.child_by_field_name("name")
                {
                    let name = node_text(name_node, ctx.source);
                    let qualified = qualify(parent_name, &name);
                    let signature = value
                        .field_text("parameters", ctx.source)
                        .unwrap_or_else(|| "()".to_string());
                    ctx.symbols.push(ParsedSymbol {
                        qualified_name: qualified.clone(),
                        name: name.clone(),
                        kind: SymbolKind::Const,
                        signature: format!("const {} = {} => ...", name, signature),
                        start_line: node.start_line(),
                        end_line: node.end_line(),
                        doc_comment: preceding_block_doc(node, ctx.source),
                    });
                    // Calls inside the arrow body attribute to the const
                    if let Some(body) = value.child_by_field_name("body") {
                        for child in body.children(&mut body.walk()) {
                            walk(child, ctx, parent_name, Some(&qualified));
                        }
                    }
                }
            }
        }
        _ => {}
    }

    for child in node.children(&mut node.walk()) {
        walk(child, ctx, parent_name, current_function);
    }
}

fn extract_function(
    node: Node,
    source: &[u8],
    parent_name: Option<&str>,
    kind: SymbolKind,
) -> Option<ParsedSymbol> {
    let name = node.field_text("name", source)?;
    let params = node
        .field_text("parameters", source)
        .unwrap_or_else(|| "()".to_string());
    let return_type = node.field_text("return_type", source).unwrap_or_default();
    let is_async = node.children(&mut node.walk()).any(|n| n.kind() == "async");

    let signature = format!(
        "{}{}{}{}",
        if is_async { "async " } else { "" },
        name,
        params,
        return_type
    );

    Some(ParsedSymbol {
        qualified_name: qualify(parent_name, &name),
        name,
        kind,
        signature,
        start_line: node.start_line(),
        end_line: node.end_line(),
        doc_comment: preceding_block_doc(node, source),
    })
}

fn extract_class(node: Node, source: &[u8]) -> Option<ParsedSymbol> {
    let name = node.field_text("name", source)?;
    Some(ParsedSymbol {
        qualified_name: name.clone(),
        signature: format!("class {}", name),
        name,
        kind: SymbolKind::Class,
        start_line: node.start_line(),
        end_line: node.end_line(),
        doc_comment: preceding_block_doc(node, source),
    })
}

fn extract_named(node: Node, source: &[u8], kind: SymbolKind) -> Option<ParsedSymbol> {
    let name = node.field_text("name", source)?;
    let keyword = match kind {
        SymbolKind::Interface => "interface",
        SymbolKind::Type => "type",
        _ => "",
    };
    Some(ParsedSymbol {
        qualified_name: name.clone(),
        signature: format!("{} {}", keyword, name).trim().to_string(),
        name,
        kind,
        start_line: node.start_line(),
        end_line: node.end_line(),
        doc_comment: preceding_block_doc(node, source),
    })
}

/// Extract extends/implements clauses into inheritance relations
fn extract_heritage(node: Node, ctx: &mut ParseContext, class_name: &str) {
    let Some(heritage) = node
        .children(&mut node.walk())
        .find(|n| n.kind() == "class_heritage")
    else {
        return;
    };

    for clause in heritage.children(&mut heritage.walk()) {
        let implements = clause.kind() == "implements_clause";
        let extends = clause.kind() == "extends_clause";
        if !implements && !extends {
            continue;
        }
        for target in clause.children(&mut clause.walk()) {
            let base = match target.kind() {
                "identifier" | "type_identifier" => node_text(target, ctx.source),
                "generic_type" => target
                    .field_text("name", ctx.source)
                    .unwrap_or_else(|| node_text(target, ctx.source)),
                _ => continue,
            };
            if implements {
                ctx.relations.push(ParsedRelation::Implements {
                    child: class_name.to_string(),
                    iface: base,
                });
            } else {
                ctx.relations.push(ParsedRelation::Inherits {
                    child: class_name.to_string(),
                    parent: base,
                });
            }
        }
    }
}

/// Extract named imports: `import { Foo, Bar } from '...'` yields Foo, Bar.
/// Wildcard and default imports yield the binding name.
fn extract_named_imports(node: Node, source: &[u8]) -> Vec<String> {
    let mut names = Vec::new();
    let Some(import_clause) = node
        .children(&mut node.walk())
        .find(|n| n.kind() == "import_clause")
    else {
        return names;
    };

    for child in import_clause.children(&mut import_clause.walk()) {
        match child.kind() {
            "identifier" => names.push(node_text(child, source)),
            "named_imports" => {
                for spec in child.children(&mut child.walk()) {
                    if spec.kind() == "import_specifier"
                        && let Some(name) = spec.field_text("name", source)
                    {
                        names.push(name);
                    }
                }
            }
            "namespace_import" => {
                if let Some(name) = child.find_child_text("identifier", source) {
                    names.push(name);
                }
            }
            _ => {}
        }
    }
    names
}

/// Extract the bare callee identifier from a call site
fn extract_callee(node: Node, source: &[u8]) -> Option<String> {
    let function_node = node.child_by_field_name("function")?;
    let callee = match function_node.kind() {
        "identifier" => node_text(function_node, source),
        "member_expression" => function_node.field_text("property", source)?,
        _ => return None,
    };

    // Skip common builtins
    if matches!(
        callee.as_str(),
        "console"
            | "log"
            | "error"
            | "warn"
            | "info"
            | "setTimeout"
            | "setInterval"
            | "clearTimeout"
            | "clearInterval"
            | "parseInt"
            | "parseFloat"
            | "require"
            | "import"
            | "push"
            | "pop"
            | "map"
            | "filter"
            | "forEach"
            | "join"
            | "split"
            | "stringify"
            | "parse"
    ) {
        return None;
    }

    Some(callee)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::parsers::parse_with;

    fn parse_ts(code: &str) -> ParseResult {
        parse_with(&TypeScriptParser, code).unwrap()
    }

    #[test]
    fn test_parse_function() {
        let code = r#"
function helloWorld() {
    greetUser();
}
"#;
        let (symbols, relations) = parse_ts(code);
        assert_eq!(symbols.len(), 1);
        assert_eq!(symbols[0].name, "helloWorld");
        assert_eq!(symbols[0].kind, SymbolKind::Function);
        assert!(relations.contains(&ParsedRelation::Call {
            caller: "helloWorld".to_string(),
            callee: "greetUser".to_string(),
        }));
    }

    #[test]
    fn test_parse_class_with_methods() {
        let code = r#"
export class AuthService {
    login(user: string): boolean {
        return this.validate(user);
    }

    validate(user: string): boolean {
        return user.length > 0;
    }
}
"#;
        let (symbols, relations) = parse_ts(code);

        let class_sym = symbols.iter().find(|s| s.name == "AuthService").unwrap();
        assert_eq!(class_sym.kind, SymbolKind::Class);

        let login = symbols.iter().find(|s| s.name == "login").unwrap();
        assert_eq!(login.kind, SymbolKind::Method);
        assert_eq!(login.qualified_name, "AuthService.login");

        assert!(relations.iter().any(|r| matches!(
            r,
            ParsedRelation::Call { caller, callee }
                if caller == "AuthService.login" && callee == "validate"
        )));
    }

    #[test]
    fn test_parse_interface_and_type_alias() {
        let code = r#"
export interface User {
    id: number;
}
type Status = "active" | "inactive";
"#;
        let (symbols, _) = parse_ts(code);
        assert!(symbols
            .iter()
            .any(|s| s.name == "User" && s.kind == SymbolKind::Interface));
        assert!(symbols
            .iter()
            .any(|s| s.name == "Status" && s.kind == SymbolKind::Type));
    }

    #[test]
    fn test_arrow_bound_const() {
        let code = r#"
const add = (a: number, b: number): number => a + b;
export const fetchUser = async (id: string) => {
    return loadUser(id);
};
"#;
        let (symbols, relations) = parse_ts(code);
        let add = symbols.iter().find(|s| s.name == "add").unwrap();
        assert_eq!(add.kind, SymbolKind::Const);
        assert!(symbols.iter().any(|s| s.name == "fetchUser"));
        assert!(relations.iter().any(|r| matches!(
            r,
            ParsedRelation::Call { caller, callee }
                if caller == "fetchUser" && callee == "loadUser"
        )));
    }

    #[test]
    fn test_no_anonymous_symbols_from_callbacks() {
        let code = r#"
const arr = [1, 2, 3];
arr.forEach((x) => {
    handle(x);
});
"#;
        let (symbols, _) = parse_ts(code);
        assert!(symbols.is_empty());
    }

    #[test]
    fn test_heritage_clauses() {
        let code = r#"
class AdminService extends BaseService implements Audited, Disposable {
}
"#;
        let (_, relations) = parse_ts(code);
        assert!(relations.contains(&ParsedRelation::Inherits {
            child: "AdminService".to_string(),
            parent: "BaseService".to_string(),
        }));
        assert!(relations.contains(&ParsedRelation::Implements {
            child: "AdminService".to_string(),
            iface: "Audited".to_string(),
        }));
        assert!(relations.contains(&ParsedRelation::Implements {
            child: "AdminService".to_string(),
            iface: "Disposable".to_string(),
        }));
    }

    #[test]
    fn test_named_imports() {
        let code = r#"
import { Component, useState } from 'react';
import * as path from 'path';
import defaultExport from './local';
"#;
        let (_, relations) = parse_ts(code);
        let imports: Vec<&str> = relations
            .iter()
            .filter_map(|r| match r {
                ParsedRelation::Import { name } => Some(name.as_str()),
                _ => None,
            })
            .collect();
        assert!(imports.contains(&"Component"));
        assert!(imports.contains(&"useState"));
        assert!(imports.contains(&"path"));
        assert!(imports.contains(&"defaultExport"));
    }

    #[test]
    fn test_jsdoc_extraction() {
        let code = r#"
/** Adds two numbers together. */
function add(a: number, b: number): number {
    return a + b;
}

// Plain comment, not a doc comment
function noDoc() {}
"#;
        let (symbols, _) = parse_ts(code);
        let add = symbols.iter().find(|s| s.name == "add").unwrap();
        assert!(add.doc_comment.as_deref().unwrap().contains("Adds two"));
        let no_doc = symbols.iter().find(|s| s.name == "noDoc").unwrap();
        assert!(no_doc.doc_comment.is_none());
    }

    #[test]
    fn test_javascript_parses_with_ts_grammar() {
        let code = r#"
function helloWorld() {
    return 1;
}
class MyClass {
    constructor() {
        this.value = 0;
    }
}
"#;
        let (symbols, _) = parse_ts(code);
        assert!(symbols.iter().any(|s| s.name == "helloWorld"));
        assert!(symbols.iter().any(|s| s.name == "MyClass"));
    }
}
