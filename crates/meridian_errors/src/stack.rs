//! Stack trace sanitization for persisted diagnostics.
//!
//! Backtraces rendered by `std::backtrace::Backtrace` list one numbered frame
//! per symbol followed by indented `at <path>:<line>:<col>` lines. The
//! sanitizer drops frames whose source lives in a dependency or toolchain
//! directory, rewrites absolute paths relative to a base path, and bounds the
//! result length.

use serde::{Deserialize, Serialize};

/// Default maximum length of a sanitized stack.
pub const DEFAULT_MAX_STACK_LEN: usize = 2000;

/// Appended when a stack is cut to fit.
pub const TRUNCATION_MARKER: &str = "\n... [truncated]";

/// Path fragments identifying frames that are not the caller's code.
const DEFAULT_VENDOR_MARKERS: &[&str] = &[
    "/.cargo/registry/",
    "/.cargo/git/",
    "/rustc/",
    "/target/",
    "node_modules",
];

/// Cleans up stack traces before they are persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StackSanitizer {
    /// Prefix stripped from absolute paths.
    pub base_path: Option<String>,
    /// Maximum length of the sanitized output, marker included.
    pub max_len: usize,
    /// Path fragments whose frames are dropped.
    pub vendor_markers: Vec<String>,
}

impl Default for StackSanitizer {
    fn default() -> Self {
        Self {
            base_path: None,
            max_len: DEFAULT_MAX_STACK_LEN,
            vendor_markers: DEFAULT_VENDOR_MARKERS
                .iter()
                .map(|m| (*m).to_string())
                .collect(),
        }
    }
}

impl StackSanitizer {
    /// Creates a sanitizer with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the base path that absolute paths are rewritten against.
    #[must_use]
    pub fn with_base_path(mut self, base_path: impl Into<String>) -> Self {
        self.base_path = Some(base_path.into());
        self
    }

    /// Sets the maximum output length.
    #[must_use]
    pub fn with_max_len(mut self, max_len: usize) -> Self {
        self.max_len = max_len;
        self
    }

    /// Sanitizes a rendered backtrace.
    #[must_use]
    pub fn sanitize(&self, stack: &str) -> String {
        let kept = self.drop_vendor_frames(stack);
        let relative = self.relativize(&kept);
        self.truncate(relative)
    }

    fn drop_vendor_frames(&self, stack: &str) -> String {
        let mut out: Vec<&str> = Vec::new();
        let mut frame: Vec<&str> = Vec::new();

        for line in stack.lines() {
            if is_frame_header(line) {
                self.flush_frame(&mut frame, &mut out);
            }
            frame.push(line);
        }
        self.flush_frame(&mut frame, &mut out);

        out.join("\n")
    }

    fn flush_frame<'a>(&self, frame: &mut Vec<&'a str>, out: &mut Vec<&'a str>) {
        let vendored = frame
            .iter()
            .any(|line| self.vendor_markers.iter().any(|m| line.contains(m.as_str())));
        if !vendored {
            out.append(frame);
        }
        frame.clear();
    }

    /// Strips the base path from the `at <path>` line of each frame.
    fn relativize(&self, stack: &str) -> String {
        let Some(base) = self
            .base_path
            .as_deref()
            .map(|b| b.trim_end_matches('/'))
            .filter(|b| !b.is_empty())
        else {
            return stack.to_string();
        };
        let prefix = format!("{base}/");

        stack
            .lines()
            .map(|line| {
                let indent = line.len() - line.trim_start().len();
                match line[indent..]
                    .strip_prefix("at ")
                    .and_then(|path| path.strip_prefix(prefix.as_str()))
                {
                    Some(rest) => format!("{}at {rest}", &line[..indent]),
                    None => line.to_string(),
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn truncate(&self, stack: String) -> String {
        if stack.len() <= self.max_len {
            return stack;
        }
        let budget = self.max_len.saturating_sub(TRUNCATION_MARKER.len());
        let mut cut = budget;
        while cut > 0 && !stack.is_char_boundary(cut) {
            cut -= 1;
        }
        tracing::debug!(
            original_len = stack.len(),
            max_len = self.max_len,
            "truncating stack trace"
        );
        let mut truncated = stack[..cut].to_string();
        truncated.push_str(TRUNCATION_MARKER);
        truncated
    }
}

/// Returns `true` for lines like `  12: crate::module::function`.
fn is_frame_header(line: &str) -> bool {
    let trimmed = line.trim_start();
    let digits = trimmed.chars().take_while(char::is_ascii_digit).count();
    digits > 0 && trimmed[digits..].starts_with(':')
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "   0: std::backtrace::Backtrace::capture
             at /rustc/abc123/library/std/src/backtrace.rs:296:13
   1: my_app::jobs::fetch
             at /home/dev/my_app/src/jobs.rs:42:9
   2: tokio::runtime::task::core::Core::poll
             at /home/dev/.cargo/registry/src/index.crates.io/tokio-1.43.0/src/runtime/task/core.rs:331:17
   3: my_app::main
             at /home/dev/my_app/src/main.rs:10:5";

    #[test]
    fn vendor_frames_are_dropped() {
        let out = StackSanitizer::new().sanitize(SAMPLE);
        assert!(!out.contains("/rustc/"));
        assert!(!out.contains(".cargo/registry"));
        assert!(out.contains("my_app::jobs::fetch"));
        assert!(out.contains("my_app::main"));
        assert_eq!(out.lines().count(), 4);
    }

    #[test]
    fn absolute_paths_become_relative() {
        let out = StackSanitizer::new()
            .with_base_path("/home/dev/my_app/")
            .sanitize(SAMPLE);
        assert!(out.contains("at src/jobs.rs:42:9"));
        assert!(!out.contains("/home/dev/my_app"));
    }

    #[test]
    fn root_base_path_leaves_paths_intact() {
        let out = StackSanitizer::new()
            .with_base_path("/")
            .sanitize("   1: app::jobs::run\n             at /srv/app/src/jobs.rs:42:9");
        assert!(out.ends_with("at /srv/app/src/jobs.rs:42:9"), "{out}");
    }

    #[test]
    fn base_path_is_only_stripped_as_a_prefix() {
        let out = StackSanitizer::new().with_base_path("/srv/app").sanitize(
            "   1: app::copy\n             at /srv/app/src/copy.rs:7:1\n             at /mnt/srv/app/src/copy.rs:8:1",
        );
        assert!(out.contains("at src/copy.rs:7:1"));
        assert!(out.contains("at /mnt/srv/app/src/copy.rs:8:1"), "{out}");
    }

    #[test]
    fn long_stacks_are_truncated_with_marker() {
        let long = "   0: frame\n".repeat(500);
        let out = StackSanitizer::new().with_max_len(100).sanitize(&long);
        assert!(out.len() <= 100);
        assert!(out.ends_with(TRUNCATION_MARKER));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let wide = "é".repeat(100);
        let out = StackSanitizer::new().with_max_len(51).sanitize(&wide);
        assert!(out.len() <= 51);
        assert!(out.ends_with(TRUNCATION_MARKER));
    }

    #[test]
    fn short_stacks_pass_through() {
        let out = StackSanitizer::new().sanitize("disabled backtrace");
        assert_eq!(out, "disabled backtrace");
    }

    #[test]
    fn frame_header_detection() {
        assert!(is_frame_header("  12: foo::bar"));
        assert!(!is_frame_header("      at src/lib.rs:1:1"));
        assert!(!is_frame_header("12abc"));
    }
}
