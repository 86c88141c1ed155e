// crates/agnus/src/config/ignore.rs
// Centralized ignore lists for indexing and review

/// Directories skipped during indexing
pub const SKIP_DIRS: &[&str] = &[
    "node_modules",
    "dist",
    "build",
    ".git",
    ".next",
    "__pycache__",
    "coverage",
    ".turbo",
    "target",
];

/// Lock files are never parsed and never reviewed
pub const LOCK_FILES: &[&str] = &[
    "package-lock.json",
    "yarn.lock",
    "pnpm-lock.yaml",
    "Cargo.lock",
    "poetry.lock",
    "Pipfile.lock",
    "composer.lock",
    "Gemfile.lock",
    "go.sum",
];

/// File extensions of binary content skipped during review
const BINARY_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "ico", "webp", "pdf", "zip", "gz", "tar", "jar", "war", "class",
    "exe", "dll", "so", "dylib", "a", "o", "bin", "woff", "woff2", "ttf", "eot", "mp3", "mp4",
];

/// Check if a directory should be skipped during indexing
pub fn should_skip_dir(name: &str) -> bool {
    SKIP_DIRS.contains(&name)
}

/// Check if a file name is a recognised lock file
pub fn is_lock_file(file_name: &str) -> bool {
    LOCK_FILES.contains(&file_name)
}

/// Check if a path matches a recognised generated-file pattern
pub fn is_generated_file(path: &str) -> bool {
    let path = path.replace('\\', "/");
    let file_name = path.rsplit('/').next().unwrap_or(&path);

    if is_lock_file(file_name) {
        return true;
    }
    if path.split('/').any(|seg| seg == "__generated__") {
        return true;
    }

    // *.min.*, *.bundle.*, *.pb.*, *.generated.*, *.gen.*
    let lowered = file_name.to_lowercase();
    for infix in [".min.", ".bundle.", ".pb.", ".generated.", ".gen."] {
        if lowered.contains(infix) {
            return true;
        }
    }
    false
}

/// Check if a changed file is eligible for review comments.
///
/// Binary, lock and generated files are skipped; config/data files
/// (JSON/YAML/TOML) are reviewed like any source file.
pub fn is_reviewable(path: &str) -> bool {
    let file_name = path.rsplit('/').next().unwrap_or(path);
    if is_lock_file(file_name) || is_generated_file(path) {
        return false;
    }
    let ext = file_name.rsplit('.').next().unwrap_or("").to_lowercase();
    !BINARY_EXTENSIONS.contains(&ext.as_str())
}

/// Check if a path should be skipped entirely during indexing
pub fn should_skip_path(path: &str) -> bool {
    let normalized = path.replace('\\', "/");
    if normalized
        .split('/')
        .any(|seg| should_skip_dir(seg) || (seg.starts_with('.') && seg.len() > 1))
    {
        return true;
    }
    is_generated_file(&normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_skip_common_dirs() {
        assert!(should_skip_dir("node_modules"));
        assert!(should_skip_dir("target"));
        assert!(should_skip_dir(".git"));
        assert!(should_skip_dir("__pycache__"));
        assert!(!should_skip_dir("src"));
    }

    #[test]
    fn test_generated_patterns() {
        assert!(is_generated_file("lib/app.min.js"));
        assert!(is_generated_file("bundle/main.bundle.js"));
        assert!(is_generated_file("proto/events.pb.go"));
        assert!(is_generated_file("models/user.generated.ts"));
        assert!(is_generated_file("api/client.gen.ts"));
        assert!(is_generated_file("src/__generated__/schema.ts"));
        assert!(is_generated_file("yarn.lock"));
        assert!(!is_generated_file("src/generator.ts"));
        assert!(!is_generated_file("src/min_heap.py"));
    }

    #[test]
    fn test_reviewable_files() {
        assert!(is_reviewable("src/auth.ts"));
        // Config/data files receive comments
        assert!(is_reviewable("config/settings.json"));
        assert!(is_reviewable(".github/workflows/ci.yaml"));
        assert!(is_reviewable("pyproject.toml"));
        // Binary, lock, generated do not
        assert!(!is_reviewable("assets/logo.png"));
        assert!(!is_reviewable("package-lock.json"));
        assert!(!is_reviewable("dist/app.min.js"));
    }

    #[test]
    fn test_should_skip_path() {
        assert!(should_skip_path("node_modules/react/index.js"));
        assert!(should_skip_path("web/.next/chunk.js"));
        assert!(should_skip_path("src/__generated__/types.ts"));
        assert!(!should_skip_path("src/index.ts"));
    }
}
