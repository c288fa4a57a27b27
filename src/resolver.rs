//! Code-reference resolution: walk a stack trace top-down, skip framework
//! frames, and read a snippet around the first user-code site.

use crate::constants::SNIPPET_CONTEXT_LINES;
use crate::models::CodeReference;
use regex::Regex;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default path fragments that mark a frame as framework or runtime code.
const DEFAULT_SKIP_PREFIXES: [&str; 14] = [
    "site-packages",
    "dist-packages",
    "_pytest",
    "pytest",
    "unittest",
    "selenium",
    "playwright",
    "robot",
    "node_modules",
    "cypress/runner",
    "<frozen",
    "/usr/lib",
    "java.base",
    "org.junit",
];

#[derive(Debug, Clone, PartialEq)]
struct StackFrame {
    file: String,
    line: u32,
    function: Option<String>,
    language: &'static str,
}

pub struct CodeReferenceResolver {
    workspace_root: PathBuf,
    skip_prefixes: Vec<String>,
    context_lines: usize,
    py_frame: Regex,
    java_frame: Regex,
    js_frame: Regex,
    class_decl: Regex,
}

impl CodeReferenceResolver {
    pub fn new(workspace_root: &Path) -> Self {
        Self::with_skip_prefixes(
            workspace_root,
            DEFAULT_SKIP_PREFIXES.iter().map(|s| s.to_string()).collect(),
        )
    }

    pub fn with_skip_prefixes(workspace_root: &Path, skip_prefixes: Vec<String>) -> Self {
        Self {
            workspace_root: workspace_root.to_path_buf(),
            skip_prefixes,
            context_lines: SNIPPET_CONTEXT_LINES,
            py_frame: Regex::new(
                r#"File "(?P<file>[^"]+)", line (?P<line>\d+)(?:, in (?P<func>[\w<>]+))?"#,
            )
            .unwrap(),
            java_frame: Regex::new(
                r"at (?P<qualified>[\w.$]+)\.(?P<func>[\w$<>]+)\((?P<file>[\w.]+):(?P<line>\d+)\)",
            )
            .unwrap(),
            js_frame: Regex::new(
                r"at (?:(?P<func>[\w.$<>\[\] ]+?) \()?(?P<file>[^():\s]+):(?P<line>\d+):\d+\)?",
            )
            .unwrap(),
            class_decl: Regex::new(r"^\s*(?:public\s+|export\s+)?(?:abstract\s+)?class\s+(?P<name>\w+)").unwrap(),
        }
    }

    /// Resolve the user-code site for a stack trace. Unknown formats and
    /// fully-framework traces yield None rather than an error.
    pub fn resolve(&self, stacktrace: &str) -> Option<CodeReference> {
        let frames = self.parse_frames(stacktrace);
        if frames.is_empty() {
            debug!("No parseable stack frames");
            return None;
        }

        let user_frame = frames.iter().find(|f| !self.is_framework_frame(&f.file))?;

        let mut reference = CodeReference {
            file: user_frame.file.clone(),
            line: user_frame.line,
            function: user_frame.function.clone(),
            class_name: None,
            snippet: None,
            language_hint: Some(user_frame.language.to_string()),
        };

        // Snippet and enclosing class come from the source if we can read
        // it; an unreadable file leaves them null and is not an error.
        if let Some(source) = self.read_source(&user_frame.file) {
            let (snippet, class_name) = self.snippet_at(&source, user_frame.line);
            reference.snippet = snippet;
            reference.class_name = class_name;
        }
        Some(reference)
    }

    fn parse_frames(&self, stacktrace: &str) -> Vec<StackFrame> {
        let mut frames = Vec::new();
        for line in stacktrace.lines() {
            if let Some(caps) = self.py_frame.captures(line) {
                frames.push(StackFrame {
                    file: caps["file"].to_string(),
                    line: caps["line"].parse().unwrap_or(0),
                    function: caps.name("func").map(|m| m.as_str().to_string()),
                    language: "python",
                });
            } else if let Some(caps) = self.java_frame.captures(line) {
                frames.push(StackFrame {
                    file: format!(
                        "{}/{}",
                        caps["qualified"].rsplit_once('.').map(|(pkg, _)| pkg.replace('.', "/")).unwrap_or_default(),
                        caps["file"].to_string()
                    ),
                    line: caps["line"].parse().unwrap_or(0),
                    function: Some(caps["func"].to_string()),
                    language: "java",
                });
            } else if let Some(caps) = self.js_frame.captures(line) {
                frames.push(StackFrame {
                    file: caps["file"].to_string(),
                    line: caps["line"].parse().unwrap_or(0),
                    function: caps.name("func").map(|m| m.as_str().trim().to_string()),
                    language: "javascript",
                });
            }
        }
        frames
    }

    fn is_framework_frame(&self, file: &str) -> bool {
        let lowered = file.to_lowercase();
        // Java frames carry dotted package paths; match both spellings.
        let dotted = lowered.replace('/', ".");
        self.skip_prefixes.iter().any(|prefix| {
            let prefix = prefix.to_lowercase();
            lowered.contains(&prefix) || dotted.contains(&prefix)
        })
    }

    fn read_source(&self, file: &str) -> Option<String> {
        let direct = Path::new(file);
        let candidates: Vec<PathBuf> = if direct.is_absolute() {
            vec![
                direct.to_path_buf(),
                self.workspace_root
                    .join(direct.file_name().map(PathBuf::from).unwrap_or_default()),
            ]
        } else {
            vec![self.workspace_root.join(direct), direct.to_path_buf()]
        };
        for candidate in candidates {
            if let Ok(source) = std::fs::read_to_string(&candidate) {
                return Some(source);
            }
        }
        debug!(file, "Source not readable, leaving snippet null");
        None
    }

    /// Snippet of `line` ± context, plus the enclosing class found by
    /// back-scanning declarations above the failure line.
    fn snippet_at(&self, source: &str, line: u32) -> (Option<String>, Option<String>) {
        let lines: Vec<&str> = source.lines().collect();
        if lines.is_empty() || line == 0 {
            return (None, None);
        }
        let target = (line as usize - 1).min(lines.len() - 1);
        let start = target.saturating_sub(self.context_lines);
        let end = (target + self.context_lines + 1).min(lines.len());
        let snippet = lines[start..end].join("\n");

        let class_name = lines[..=target]
            .iter()
            .rev()
            .find_map(|l| self.class_decl.captures(l).map(|c| c["name"].to_string()));

        (Some(snippet), class_name)
    }
}
