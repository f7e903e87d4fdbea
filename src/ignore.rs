//! Ignore rules for discovery.
//!
//! The effective rule set is the built-in defaults plus any patterns from a
//! `.codectxignore` file at the scan root (one glob per line, `#` comments,
//! blank lines skipped). Matching follows shell-glob semantics where `*`
//! also crosses `/`:
//!
//! - `dir/*` matches the directory `dir` itself or anything under `dir/`.
//! - Any other pattern matches the root-relative path or the bare file name.
//!
//! A pattern that does not compile as a glob is compared as literal text.

use globset::{Glob, GlobMatcher};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{debug, warn};

/// Name of the project ignore file looked up under the scan root.
pub const IGNORE_FILE_NAME: &str = ".codectxignore";

pub const DEFAULT_IGNORE_PATTERNS: &[&str] = &[
    // Version control
    ".git/*", ".svn/*", ".hg/*", ".bzr/*",
    // Python
    "__pycache__/*", "*.pyc", "*.pyo", "*.pyd", ".Python",
    "build/*", "develop-eggs/*", "dist/*", "downloads/*", "eggs/*", ".eggs/*",
    "lib/*", "lib64/*", "parts/*", "sdist/*", "var/*", "wheels/*",
    "*.egg-info/*", ".installed.cfg", "*.egg", "MANIFEST",
    // Virtual environments
    "venv/*", "env/*", ".venv/*", ".env/*", "ENV/*", "env.bak/*", "venv.bak/*",
    // Editors
    ".vscode/*", ".idea/*", "*.swp", "*.swo", "*~", ".DS_Store", "Thumbs.db",
    // Logs and databases
    "*.log", "*.sql", "*.sqlite", "*.db",
    // Compiled objects
    "*.com", "*.class", "*.dll", "*.exe", "*.o", "*.so", "*.a", "*.lib", "*.dylib",
    // Archives
    "*.7z", "*.dmg", "*.gz", "*.iso", "*.jar", "*.rar", "*.tar", "*.zip", "*.war", "*.ear",
    // Media
    "*.jpg", "*.jpeg", "*.png", "*.gif", "*.bmp", "*.tiff", "*.svg", "*.ico",
    "*.mp3", "*.mp4", "*.avi", "*.mov", "*.wmv", "*.flv", "*.pdf",
    // Generated documentation
    "docs/_build/*", "site/*", ".mkdocs/*",
    // Node.js
    "node_modules/*", "npm-debug.log*", "yarn-debug.log*", "yarn-error.log*",
    // Rust / Java
    "target/*", "Cargo.lock",
    // Go / Ruby
    "vendor/*", ".bundle/*", "vendor/bundle/*", ".byebug_history",
    // OS generated
    ".DS_Store*", "ehthumbs.db", "Icon\r",
    // Temporary files
    "*.tmp", "*.temp", "*.bak", "*.backup", "*.old",
    // Coverage and test caches
    "htmlcov/*", ".coverage", ".coverage.*", "coverage.xml", "*.cover",
    ".pytest_cache/*", ".tox/*", ".nox/*", ".ipynb_checkpoints/*",
    // Environment files
    ".env", ".env.local", ".env.*.local",
    // codectx's own files
    ".codectxignore", ".codectx.toml",
];

enum Pattern {
    Glob(GlobMatcher),
    Literal(String),
}

impl Pattern {
    fn compile(text: &str) -> Self {
        match Glob::new(text) {
            Ok(glob) => Pattern::Glob(glob.compile_matcher()),
            Err(e) => {
                debug!("ignore pattern '{}' treated as literal: {}", text, e);
                Pattern::Literal(text.to_string())
            }
        }
    }

    fn matches(&self, candidate: &str) -> bool {
        match self {
            Pattern::Glob(m) => m.is_match(candidate),
            Pattern::Literal(s) => s == candidate,
        }
    }
}

enum Rule {
    /// `dir/*`: the directory pattern and its literal prefix.
    Dir { dir: Pattern, prefix: String },
    File(Pattern),
}

/// Immutable set of ignore rules for one run.
pub struct IgnoreRuleSet {
    rules: Vec<Rule>,
    pattern_count: usize,
    output_name: Option<String>,
}

impl IgnoreRuleSet {
    /// Compile `patterns`. Duplicates are collapsed; order does not matter.
    ///
    /// `output_name` is the digest's own file name, which is always ignored.
    pub fn new<I, S>(patterns: I, output_name: Option<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let unique: BTreeSet<String> = patterns
            .into_iter()
            .map(|p| p.as_ref().to_string())
            .filter(|p| !p.is_empty())
            .collect();

        let rules = unique
            .iter()
            .map(|p| match p.strip_suffix("/*") {
                Some(dir) => Rule::Dir {
                    dir: Pattern::compile(dir),
                    prefix: format!("{}/", dir),
                },
                None => Rule::File(Pattern::compile(p)),
            })
            .collect();

        Self {
            rules,
            pattern_count: unique.len(),
            output_name,
        }
    }

    /// Built-in defaults merged with `<root>/.codectxignore`.
    ///
    /// A missing ignore file is normal; an unreadable one is logged and the
    /// defaults are used alone.
    pub fn load(root: &Path, output_name: Option<String>) -> Self {
        let mut patterns: Vec<String> = DEFAULT_IGNORE_PATTERNS
            .iter()
            .map(|p| p.to_string())
            .collect();

        let ignore_file = root.join(IGNORE_FILE_NAME);
        if ignore_file.exists() {
            match std::fs::read_to_string(&ignore_file) {
                Ok(content) => {
                    let custom = parse_ignore_file(&content);
                    debug!(
                        "loaded {} patterns from {}",
                        custom.len(),
                        ignore_file.display()
                    );
                    patterns.extend(custom);
                }
                Err(e) => warn!(
                    "could not read {}, using default patterns: {}",
                    ignore_file.display(),
                    e
                ),
            }
        }

        Self::new(patterns, output_name)
    }

    /// Number of distinct patterns in effect.
    pub fn pattern_count(&self) -> usize {
        self.pattern_count
    }

    /// Test a root-relative, `/`-separated path.
    pub fn is_ignored(&self, relative_path: &str) -> bool {
        let file_name = relative_path.rsplit('/').next().unwrap_or(relative_path);

        if self.output_name.as_deref() == Some(file_name) {
            return true;
        }

        self.rules.iter().any(|rule| match rule {
            Rule::Dir { dir, prefix } => {
                dir.matches(relative_path) || relative_path.starts_with(prefix.as_str())
            }
            Rule::File(p) => p.matches(relative_path) || p.matches(file_name),
        })
    }
}

/// Patterns from ignore-file text: trimmed, non-blank, non-comment lines.
pub fn parse_ignore_file(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}
