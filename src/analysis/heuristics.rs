//! Rule-based signals computed before any LLM call
//!
//! These never fail and never block a stage: they enrich prompts and fill in
//! fields the model leaves out.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Error-type patterns per language, checked in order
const ERROR_PATTERNS: &[(&str, &[(&str, &str)])] = &[
    (
        "python",
        &[
            ("syntax", "SyntaxError"),
            ("type", "TypeError"),
            ("name", "NameError"),
            ("attribute", "AttributeError"),
            ("index", "IndexError"),
            ("key", "KeyError"),
            ("value", "ValueError"),
            ("import", "ImportError"),
            ("zero_division", "ZeroDivisionError"),
            ("assertion", "AssertionError"),
            ("runtime", "RuntimeError"),
            ("indentation", "IndentationError"),
        ],
    ),
    (
        "javascript",
        &[
            ("reference", "ReferenceError"),
            ("range", "RangeError"),
            ("uri", "URIError"),
            ("eval", "EvalError"),
            ("internal", "InternalError"),
        ],
    ),
    (
        "java",
        &[
            ("null_pointer", "NullPointerException"),
            ("class_cast", "ClassCastException"),
            ("index_out_of_bounds", "IndexOutOfBoundsException"),
            ("arithmetic", "ArithmeticException"),
            ("illegal_argument", "IllegalArgumentException"),
            ("io", "IOException"),
        ],
    ),
];

/// One frame of a parsed stack trace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackFrame {
    pub file: String,
    pub line: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
}

/// What the pattern tables could tell about an error message
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorHints {
    /// Exception class as written (`ZeroDivisionError`) or the table key
    pub error_type: Option<String>,
    pub language: Option<String>,
    /// Message following the exception class
    pub message: Option<String>,
    #[serde(default)]
    pub frames: Vec<StackFrame>,
}

impl ErrorHints {
    /// Innermost frame, where the error surfaced
    pub fn location(&self) -> Option<&StackFrame> {
        match self.language.as_deref() {
            // JS traces list the innermost frame first
            Some("javascript") => self.frames.first(),
            _ => self.frames.last(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.error_type.is_none() && self.frames.is_empty()
    }

    /// One-paragraph rendering for prompts
    pub fn describe(&self) -> String {
        if self.is_empty() {
            return "No known error pattern matched.".to_string();
        }
        let mut parts = Vec::new();
        if let Some(error_type) = &self.error_type {
            parts.push(format!("type: {}", error_type));
        }
        if let Some(language) = &self.language {
            parts.push(format!("language: {}", language));
        }
        if let Some(frame) = self.location() {
            let mut location = format!("location: {}:{}", frame.file, frame.line);
            if let Some(function) = &frame.function {
                location.push_str(&format!(" in {}", function));
            }
            parts.push(location);
        }
        if self.frames.len() > 1 {
            parts.push(format!("stack depth: {}", self.frames.len()));
        }
        parts.join(", ")
    }

    pub fn from_error_text(raw: &str) -> Self {
        let mut hints = ErrorHints::default();

        'tables: for (language, patterns) in ERROR_PATTERNS {
            for (key, needle) in patterns.iter() {
                if raw.contains(needle) {
                    hints.error_type = Some((*key).to_string());
                    hints.language = Some((*language).to_string());
                    break 'tables;
                }
            }
        }

        if raw.contains("Traceback (most recent call last)") {
            hints.language = Some("python".to_string());
            hints.frames = python_frames(raw);
            if let Some(caps) = python_error_line().captures_iter(raw).last() {
                hints.error_type = Some(caps[1].to_string());
                hints.message = Some(caps[2].trim().to_string());
            }
        } else if raw.contains("at ") && (raw.contains("TypeError") || raw.contains("ReferenceError"))
        {
            hints.language = Some("javascript".to_string());
            if let Some(caps) = js_error_line().captures(raw) {
                hints.error_type = Some(caps[1].to_string());
                hints.message = Some(caps[2].trim().to_string());
            }
            hints.frames = js_frames(raw);
        }

        hints
    }
}

fn python_frame_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"File "([^"]+)", line (\d+), in (\S+)"#).expect("python frame pattern")
    })
}

fn python_error_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^([A-Za-z0-9_.]+(?:Error|Exception)): (.+)$")
            .expect("python error line pattern")
    })
}

fn js_error_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"([A-Za-z0-9_]+Error):?[ \t]*([^\n]*)").expect("js error line pattern")
    })
}

fn js_frame_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"at (?:(\S+) \(([^():]+(?::[^():\d][^():]*)*):(\d+):(\d+)\)|([^\s():]+):(\d+):(\d+))")
            .expect("js frame pattern")
    })
}

fn python_frames(raw: &str) -> Vec<StackFrame> {
    python_frame_pattern()
        .captures_iter(raw)
        .filter_map(|caps| {
            Some(StackFrame {
                file: caps[1].to_string(),
                line: caps[2].parse().ok()?,
                column: None,
                function: Some(caps[3].to_string()),
            })
        })
        .collect()
}

fn js_frames(raw: &str) -> Vec<StackFrame> {
    js_frame_pattern()
        .captures_iter(raw)
        .filter_map(|caps| {
            if let Some(function) = caps.get(1) {
                Some(StackFrame {
                    file: caps[2].to_string(),
                    line: caps[3].parse().ok()?,
                    column: caps[4].parse().ok(),
                    function: Some(function.as_str().to_string()),
                })
            } else {
                Some(StackFrame {
                    file: caps.get(5)?.as_str().to_string(),
                    line: caps[6].parse().ok()?,
                    column: caps[7].parse().ok(),
                    function: None,
                })
            }
        })
        .collect()
}

/// Guesses the language of a code snippet from syntax markers
pub fn detect_language(code: &str) -> &'static str {
    const MARKERS: &[(&str, &[&str])] = &[
        ("rust", &["fn main(", "let mut ", "impl ", "pub fn ", "::new("]),
        ("python", &["def ", "import ", "elif ", "self.", "print("]),
        (
            "java",
            &["public class ", "public static void", "System.out.", "private final "],
        ),
        ("go", &["package main", "func ", ":= ", "fmt."]),
        (
            "javascript",
            &["function ", "const ", "=> ", "console.log", "require("],
        ),
        ("cpp", &["#include", "std::", "int main("]),
    ];

    MARKERS
        .iter()
        .map(|(language, markers)| {
            let hits = markers.iter().filter(|m| code.contains(*m)).count();
            (*language, hits)
        })
        .filter(|(_, hits)| *hits > 0)
        // max_by_key keeps the last maximum; reverse so ties go to the earlier entry
        .rev()
        .max_by_key(|(_, hits)| *hits)
        .map(|(language, _)| language)
        .unwrap_or("unknown")
}

const LOG_SIGNALS: [&str; 9] = [
    "ERROR",
    "FATAL",
    "CRITICAL",
    "Exception",
    "Traceback",
    "panic",
    "WARN",
    "failed",
    "refused",
];

/// Picks the lines of a log most likely to explain a failure
pub fn extract_key_log_lines(log: &str, max_lines: usize) -> Vec<String> {
    log.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| LOG_SIGNALS.iter().any(|signal| line.contains(signal)))
        .take(max_lines)
        .map(|line| line.chars().take(300).collect())
        .collect()
}

/// Problem-category prior computed from raw error text and findings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CauseScores {
    pub data: f32,
    pub logic: f32,
    pub system: f32,
    pub code: f32,
}

impl Default for CauseScores {
    fn default() -> Self {
        Self {
            data: 0.25,
            logic: 0.25,
            system: 0.25,
            code: 0.25,
        }
    }
}

impl CauseScores {
    /// Scores categories from error text and affected components.
    ///
    /// Normalized to sum to 1; uniform when nothing matched.
    pub fn score(error_text: &str, affected_components: &[String]) -> Self {
        let mut data = 0.0f32;
        let mut logic = 0.0f32;
        let mut system = 0.0f32;
        let mut code = 0.0f32;

        let has = |needles: &[&str]| needles.iter().any(|n| error_text.contains(n));

        if has(&["TypeError", "ValueError", "ZeroDivisionError"]) {
            data += 0.3;
        }
        if has(&["IndexError", "KeyError"]) {
            logic += 0.3;
            data += 0.2;
        }
        if has(&["AssertionError", "ZeroDivisionError"]) {
            logic += 0.2;
        }
        if has(&[
            "PermissionError",
            "ConnectionError",
            "MemoryError",
            "IOException",
            "TimeoutError",
        ]) {
            system += 0.4;
        }
        if has(&[
            "SyntaxError",
            "ImportError",
            "NameError",
            "AttributeError",
            "ReferenceError",
        ]) {
            code += 0.4;
        }

        for component in affected_components {
            let component = component.to_lowercase();
            if component.contains("data") || component.contains("database") {
                data += 0.2;
            }
            if component.contains("network")
                || component.contains("config")
                || component.contains("filesystem")
            {
                system += 0.2;
            }
        }

        let total = data + logic + system + code;
        if total <= f32::EPSILON {
            return Self::default();
        }

        Self {
            data: data / total,
            logic: logic / total,
            system: system / total,
            code: code / total,
        }
    }

    /// Highest-scoring category, `None` when the scores are uniform
    pub fn dominant(&self) -> Option<&'static str> {
        let entries = [
            ("data", self.data),
            ("logic", self.logic),
            ("system", self.system),
            ("code", self.code),
        ];
        let (name, best) = entries
            .iter()
            .copied()
            .fold(("", f32::MIN), |acc, e| if e.1 > acc.1 { e } else { acc });
        let uniform = entries.iter().all(|(_, v)| (v - best).abs() < 1e-6);
        (!uniform).then_some(name)
    }
}
