// crates/agnus/src/review/skills.rs
// Skill snippets: plain-text rules injected when a changed file matches
// their glob patterns

use anyhow::{Context, Result};
use std::path::Path;

use glob::Pattern;

/// A rule snippet keyed by file globs.
///
/// Skill files are markdown with a frontmatter block carrying the globs:
/// ```text
/// ---
/// globs: src/**/*.ts, **/*.py
/// ---
/// Never use any() in production code.
/// ```
#[derive(Debug, Clone)]
pub struct Skill {
    pub name: String,
    pub patterns: Vec<Pattern>,
    pub content: String,
}

impl Skill {
    /// Does any changed file match this skill's globs?
    pub fn matches(&self, changed_files: &[String]) -> bool {
        self.patterns
            .iter()
            .any(|pattern| changed_files.iter().any(|file| pattern.matches(file)))
    }

    /// Parse a skill from markdown with frontmatter
    fn parse(name: &str, content: &str) -> Option<Self> {
        let mut patterns = Vec::new();
        let mut body_lines = Vec::new();
        let mut in_frontmatter = false;
        let mut frontmatter_done = false;

        for line in content.lines() {
            if line.trim() == "---" && !frontmatter_done {
                if in_frontmatter {
                    frontmatter_done = true;
                } else {
                    in_frontmatter = true;
                }
                continue;
            }

            if in_frontmatter && !frontmatter_done {
                if let Some((key, value)) = line.split_once(':')
                    && key.trim() == "globs"
                {
                    for raw in value.split(',') {
                        match Pattern::new(raw.trim()) {
                            Ok(pattern) => patterns.push(pattern),
                            Err(e) => {
                                tracing::warn!(skill = name, pattern = raw.trim(), error = %e, "Invalid skill glob");
                            }
                        }
                    }
                }
            } else {
                body_lines.push(line);
            }
        }

        let content = body_lines.join("\n").trim().to_string();
        if patterns.is_empty() || content.is_empty() {
            return None;
        }

        Some(Self {
            name: name.to_string(),
            patterns,
            content,
        })
    }
}

/// Load every skill file (.md or .txt) from a directory. Unparseable files
/// are skipped with a warning.
pub fn load_skills(dir: &Path) -> Result<Vec<Skill>> {
    let mut skills = Vec::new();

    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read skills directory: {}", dir.display()))?;

    for entry in entries {
        let path = entry?.path();
        let ext = path.extension().and_then(|e| e.to_str());
        if !matches!(ext, Some("md") | Some("txt")) {
            continue;
        }
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("skill")
            .to_string();

        match std::fs::read_to_string(&path) {
            Ok(content) => match Skill::parse(&name, &content) {
                Some(skill) => skills.push(skill),
                None => {
                    tracing::warn!(skill = %name, "Skill has no globs or no content; skipped");
                }
            },
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to read skill file");
            }
        }
    }

    skills.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(skills)
}

/// Contents of the skills whose globs match any changed file
pub fn matching_skills(skills: &[Skill], changed_files: &[String]) -> Vec<String> {
    skills
        .iter()
        .filter(|skill| skill.matches(changed_files))
        .map(|skill| skill.content.clone())
        .collect()
}
