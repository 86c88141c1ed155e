// crates/agnus/src/indexer/parsers/csharp.rs
// C# parser using regex-based extraction (no tree-sitter grammar needed)

use anyhow::Result;
use regex::Regex;
use std::sync::LazyLock;
use tree_sitter::Parser;

use super::{LanguageParser, ParseResult, ParsedRelation, ParsedSymbol};
use crate::graph::SymbolKind;

/// Compiled regex patterns for C# symbol extraction
struct CsharpPatterns {
    using_directive: Regex,
    namespace: Regex,
    class_like: Regex,
    method: Regex,
    call: Regex,
    doc_comment: Regex,
}

static PATTERNS: LazyLock<CsharpPatterns> = LazyLock::new(|| CsharpPatterns {
    // using Foo.Bar; or using static Foo; or using Alias = Foo;
    using_directive: Regex::new(r"^\s*using\s+(?:static\s+|[\w]+\s*=\s*)?([\w.]+(?:<[^>]+>)?);")
        .expect("using regex"),

    // namespace Foo.Bar.Baz
    namespace: Regex::new(r"^\s*namespace\s+([\w.]+)").expect("namespace regex"),

    // class / interface / record declarations, with an optional base list
    class_like: Regex::new(
        r"^\s*(?:(?:public|private|protected|internal|static|abstract|sealed|partial|readonly)\s+)*(class|interface|record)\s+([\w<>, ]+?)(\s*:\s*[\w<>, .]+?)?\s*(?:\{|\(|$|where)",
    )
    .expect("class regex"),

    // Method declarations: modifiers + return type + name + (params).
    // The terminator accepts end-of-line so Allman-style bodies match too.
    method: Regex::new(
        r"^\s*((?:(?:public|private|protected|internal|static|virtual|override|abstract|sealed|new|async|extern)\s+)+)([\w<>\[\]?,. ]+?)\s+([\w]+)\s*(\([^)]*\))\s*(?:\{|=>|;|where|$)",
    )
    .expect("method regex"),

    // Call sites: Identifier( with keywords filtered afterwards
    call: Regex::new(r"(?:^|[^\w.])([A-Za-z_]\w*)\s*\(").expect("call regex"),

    // /// doc comment lines
    doc_comment: Regex::new(r"^\s*///\s*(.*)").expect("doc regex"),
});

const KEYWORDS: &[&str] = &[
    "if", "while", "for", "foreach", "switch", "catch", "using", "lock", "return", "new",
    "throw", "nameof", "typeof", "sizeof", "base", "this", "var", "await", "checked",
    "unchecked", "default",
];

/// C# language parser (regex-based)
pub struct CsharpParser;

impl LanguageParser for CsharpParser {
    fn language_id(&self) -> &'static str {
        "csharp"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["cs"]
    }

    /// C# does not use tree-sitter; this leaves the parser unconfigured
    fn configure_parser(&self, _parser: &mut Parser) -> Result<()> {
        Ok(())
    }

    fn parse(&self, _parser: &mut Parser, content: &str) -> Result<ParseResult> {
        Ok(parse_csharp(content))
    }
}

/// Line-walking C# extractor: tracks brace depth to scope classes and
/// methods, and accumulates `///` doc comments for the next declaration.
fn parse_csharp(content: &str) -> ParseResult {
    let p = &*PATTERNS;
    let lines: Vec<&str> = content.lines().collect();
    let total = lines.len() as u32;

    let mut symbols: Vec<ParsedSymbol> = Vec::new();
    let mut relations: Vec<ParsedRelation> = Vec::new();

    let mut current_class: Option<String> = None;
    let mut current_method: Option<String> = None;
    let mut pending_docs: Vec<String> = Vec::new();
    let mut brace_depth: i32 = 0;
    let mut class_brace_depth: i32 = -1;
    let mut method_brace_depth: i32 = -1;
    // Index into `symbols` of the open method, to set its end line on close
    let mut open_method_idx: Option<usize> = None;
    let mut open_class_idx: Option<usize> = None;

    let is_blank_or_comment = |line: &str| {
        let t = line.trim();
        t.is_empty() || t.starts_with("//") || t.starts_with("/*") || t.starts_with('*')
    };

    for (idx, &line) in lines.iter().enumerate() {
        let lineno = idx as u32 + 1;

        // --- Doc comments accumulate for the next declaration ---
        if let Some(caps) = p.doc_comment.captures(line) {
            pending_docs.push(caps[1].trim().to_string());
            continue;
        }

        // --- using directives become import relations ---
        if current_class.is_none()
            && let Some(caps) = p.using_directive.captures(line)
        {
            if let Some(last) = caps[1].split('.').next_back() {
                let bare = last.split('<').next().unwrap_or(last);
                relations.push(ParsedRelation::Import {
                    name: bare.to_string(),
                });
            }
            pending_docs.clear();
            continue;
        }

        if p.namespace.is_match(line) {
            pending_docs.clear();
        } else if let Some(caps) = p.class_like.captures(line) {
            let kind = match &caps[1] {
                "interface" => SymbolKind::Interface,
                _ => SymbolKind::Class,
            };
            let raw_name = caps[2].trim();
            let name = raw_name.split('<').next().unwrap_or(raw_name).trim().to_string();

            if !name.is_empty() {
                // Base list: first entry may be a base class or interface;
                // all entries become inheritance relations
                if let Some(bases) = caps.get(3) {
                    for base in bases.as_str().trim_start_matches(':').split(',') {
                        let base = base.trim();
                        let bare = base
                            .rsplit('.')
                            .next()
                            .and_then(|b| b.split('<').next())
                            .unwrap_or(base)
                            .trim();
                        if !bare.is_empty() {
                            relations.push(ParsedRelation::Inherits {
                                child: name.clone(),
                                parent: bare.to_string(),
                            });
                        }
                    }
                }

                symbols.push(ParsedSymbol {
                    qualified_name: name.clone(),
                    signature: format!("{} {}", &caps[1], name),
                    name: name.clone(),
                    kind,
                    start_line: lineno,
                    end_line: total,
                    doc_comment: take_docs(&mut pending_docs),
                });
                if line.trim_end().ends_with(';') {
                    // record Foo(...); declares without a body
                    let last = symbols.len() - 1;
                    symbols[last].end_line = lineno;
                } else {
                    open_class_idx = Some(symbols.len() - 1);
                    current_class = Some(name);
                    class_brace_depth = brace_depth + 1;
                }
            }
        } else if let Some(caps) = p.method.captures(line) {
            // Regular method: modifiers + return type + name(params)
            let name = caps[3].to_string();
            let params = caps[4].to_string();
            let return_type = caps[2].trim().to_string();

            if !KEYWORDS.contains(&name.as_str()) {
                let qualified = match &current_class {
                    Some(class) => format!("{}.{}", class, name),
                    None => name.clone(),
                };
                symbols.push(ParsedSymbol {
                    signature: format!("{} {}{}", return_type, name, params),
                    name,
                    qualified_name: qualified.clone(),
                    kind: SymbolKind::Method,
                    start_line: lineno,
                    end_line: lineno,
                    doc_comment: take_docs(&mut pending_docs),
                });
                // Expression-bodied and abstract members close on their own line
                let self_closing = !line.contains('{')
                    && (line.contains("=>") || line.trim_end().ends_with(';'));
                if !self_closing {
                    open_method_idx = Some(symbols.len() - 1);
                    current_method = Some(qualified);
                    method_brace_depth = brace_depth + 1;
                }
            }
        } else if let Some((name, params)) = match_constructor(line, current_class.as_deref()) {
            let class = current_class.clone().unwrap_or_default();
            let qualified = format!("{}.{}", class, name);
            symbols.push(ParsedSymbol {
                signature: format!("{}{}", name, params),
                name,
                qualified_name: qualified.clone(),
                kind: SymbolKind::Method,
                start_line: lineno,
                end_line: lineno,
                doc_comment: take_docs(&mut pending_docs),
            });
            open_method_idx = Some(symbols.len() - 1);
            current_method = Some(qualified);
            method_brace_depth = brace_depth + 1;
        } else if let Some(method) = &current_method {
            // Call sites inside a method body
            if !is_blank_or_comment(line) {
                for caps in p.call.captures_iter(line) {
                    let callee = caps[1].to_string();
                    if !KEYWORDS.contains(&callee.as_str()) && callee != *method {
                        relations.push(ParsedRelation::Call {
                            caller: method.clone(),
                            callee,
                        });
                    }
                }
            }
        }

        // --- Track brace depth and close scopes ---
        for ch in line.chars() {
            match ch {
                '{' => brace_depth += 1,
                '}' => {
                    brace_depth -= 1;
                    if brace_depth < 0 {
                        brace_depth = 0;
                    }
                    if method_brace_depth >= 0 && brace_depth < method_brace_depth {
                        if let Some(i) = open_method_idx.take() {
                            symbols[i].end_line = lineno;
                        }
                        current_method = None;
                        method_brace_depth = -1;
                    }
                    if class_brace_depth >= 0 && brace_depth < class_brace_depth {
                        if let Some(i) = open_class_idx.take() {
                            symbols[i].end_line = lineno;
                        }
                        current_class = None;
                        class_brace_depth = -1;
                    }
                }
                _ => {}
            }
        }

    }

    (symbols, relations)
}

fn take_docs(pending: &mut Vec<String>) -> Option<String> {
    if pending.is_empty() {
        None
    } else {
        Some(std::mem::take(pending).join("\n"))
    }
}

/// Constructors have no return type, so the method regex misses them:
/// `public ClassName(params)` where the name equals the enclosing class.
fn match_constructor(line: &str, current_class: Option<&str>) -> Option<(String, String)> {
    static CTOR: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"^\s*((?:(?:public|private|protected|internal|static)\s+)+)([\w]+)\s*(\([^)]*\))\s*(?:\{|:|$)")
            .expect("ctor regex")
    });
    let class = current_class?;
    let caps = CTOR.captures(line)?;
    let name = caps[2].to_string();
    (name == class).then(|| (name, caps[3].to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(code: &str) -> ParseResult {
        parse_csharp(code)
    }

    #[test]
    fn test_class_with_methods() {
        let code = r#"
using System;

namespace Acme.Auth
{
    /// Validates user credentials.
    public class AuthService
    {
        public AuthService(IConfig config)
        {
            _config = config;
        }

        public bool Login(string user)
        {
            return Validate(user);
        }
    }
}
"#;
        let (symbols, relations) = parse(code);

        let class_sym = symbols.iter().find(|s| s.name == "AuthService" && s.kind == SymbolKind::Class).unwrap();
        assert!(class_sym.doc_comment.as_deref().unwrap().contains("Validates"));

        let ctor = symbols
            .iter()
            .find(|s| s.qualified_name == "AuthService.AuthService")
            .unwrap();
        assert_eq!(ctor.kind, SymbolKind::Method);

        let login = symbols.iter().find(|s| s.name == "Login").unwrap();
        assert_eq!(login.qualified_name, "AuthService.Login");
        assert!(login.signature.contains("bool"));

        assert!(relations.iter().any(|r| matches!(
            r,
            ParsedRelation::Call { caller, callee }
                if caller == "AuthService.Login" && callee == "Validate"
        )));
    }

    #[test]
    fn test_record_and_interface() {
        let code = r#"
public interface IRepository
{
    void Save(object entity);
}

public record UserDto(string Name, int Age);
"#;
        let (symbols, _) = parse(code);
        assert!(symbols
            .iter()
            .any(|s| s.name == "IRepository" && s.kind == SymbolKind::Interface));
        assert!(symbols
            .iter()
            .any(|s| s.name == "UserDto" && s.kind == SymbolKind::Class));
    }

    #[test]
    fn test_base_list_inheritance() {
        let code = r#"
public class UserRepository : BaseRepository, IRepository
{
}
"#;
        let (_, relations) = parse(code);
        assert!(relations.contains(&ParsedRelation::Inherits {
            child: "UserRepository".to_string(),
            parent: "BaseRepository".to_string(),
        }));
        assert!(relations.contains(&ParsedRelation::Inherits {
            child: "UserRepository".to_string(),
            parent: "IRepository".to_string(),
        }));
    }

    #[test]
    fn test_usings_become_imports() {
        let code = r#"
using System;
using System.Collections.Generic;
using Acme.Auth.AuthService;
"#;
        let (_, relations) = parse(code);
        let imports: Vec<&str> = relations
            .iter()
            .filter_map(|r| match r {
                ParsedRelation::Import { name } => Some(name.as_str()),
                _ => None,
            })
            .collect();
        assert!(imports.contains(&"System"));
        assert!(imports.contains(&"Generic"));
        assert!(imports.contains(&"AuthService"));
    }

    #[test]
    fn test_method_end_lines_follow_braces() {
        let code = r#"
public class Worker
{
    public void Run()
    {
        Step();
        Step();
    }
}
"#;
        let (symbols, _) = parse(code);
        let run = symbols.iter().find(|s| s.name == "Run").unwrap();
        assert!(run.end_line > run.start_line);
    }

    #[test]
    fn test_keywords_not_calls() {
        let code = r#"
public class C
{
    public void M()
    {
        if (x) { return; }
        while (y) { Process(); }
    }
}
"#;
        let (_, relations) = parse(code);
        let callees: Vec<&str> = relations
            .iter()
            .filter_map(|r| match r {
                ParsedRelation::Call { callee, .. } => Some(callee.as_str()),
                _ => None,
            })
            .collect();
        assert!(callees.contains(&"Process"));
        assert!(!callees.contains(&"if"));
        assert!(!callees.contains(&"while"));
        assert!(!callees.contains(&"return"));
    }
}
