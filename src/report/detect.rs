//! Structured report detection
//!
//! A file qualifies as a structured crash report when its JSON starts with an
//! object carrying a non-empty `metadata.dumpId` string and at least one
//! recognized analysis section. Detection scans a bounded prefix with a
//! hand-rolled tokenizer at depth <= 2, so a multi-megabyte report is never
//! read (or parsed) whole just to classify it.

use std::io::Read;
use std::path::Path;

use crate::error::Result;

/// How much of the file the detector reads
pub const DETECT_PREFIX_BYTES: usize = 512 * 1024;

const RECOGNIZED_SECTIONS: &[&str] = &[
    "environment",
    "threads",
    "modules",
    "assemblies",
    "signature",
    "symbols",
    "stackSelection",
    "timeline",
    "memory",
    "async",
    "synchronization",
];

/// Outcome of a successful detection
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedReport {
    /// `metadata.dumpId`
    pub dump_id: String,
    /// Recognized top-level analysis sections seen in the prefix
    pub sections: Vec<String>,
}

/// Detect whether `path` is a structured report, reading only the prefix.
pub fn detect_structured_report(path: &Path) -> Result<Option<DetectedReport>> {
    let mut file = std::fs::File::open(path)?;
    let mut buffer = vec![0u8; DETECT_PREFIX_BYTES];
    let mut filled = 0;
    while filled < buffer.len() {
        let n = file.read(&mut buffer[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    buffer.truncate(filled);
    let prefix = crate::chat::util::utf8_safe_prefix_bytes(&buffer, buffer.len());
    Ok(scan_report_prefix(&prefix))
}

/// Scan a JSON prefix for `metadata.dumpId` and recognized sections.
///
/// The prefix may end mid-document; scanning stops quietly at end of input.
pub fn scan_report_prefix(prefix: &str) -> Option<DetectedReport> {
    let mut scanner = Scanner::new(prefix);
    scanner.skip_ws();
    if !scanner.eat('{') {
        return None;
    }

    let mut dump_id: Option<String> = None;
    let mut sections: Vec<String> = Vec::new();

    loop {
        scanner.skip_ws();
        if scanner.eat('}') || scanner.at_end() {
            break;
        }
        scanner.eat(',');
        scanner.skip_ws();

        let key = match scanner.parse_string() {
            Some(k) => k,
            None => break,
        };
        scanner.skip_ws();
        if !scanner.eat(':') {
            break;
        }
        scanner.skip_ws();

        if key == "metadata" && scanner.peek() == Some('{') {
            if let Some(id) = scanner.scan_object_string_field("dumpId") {
                if !id.is_empty() {
                    dump_id = Some(id);
                }
            }
        } else {
            if RECOGNIZED_SECTIONS.contains(&key.as_str()) {
                sections.push(key);
            }
            if !scanner.skip_value() {
                break;
            }
        }
    }

    match dump_id {
        Some(dump_id) if !sections.is_empty() => Some(DetectedReport { dump_id, sections }),
        _ => None,
    }
}

/// Minimal JSON tokenizer over a (possibly truncated) prefix
struct Scanner<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
}

impl<'a> Scanner<'a> {
    fn new(input: &'a str) -> Self {
        Scanner { chars: input.chars().peekable() }
    }

    fn at_end(&mut self) -> bool {
        self.chars.peek().is_none()
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn skip_ws(&mut self) {
        while matches!(self.chars.peek(), Some(c) if c.is_whitespace()) {
            self.chars.next();
        }
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.chars.peek() == Some(&expected) {
            self.chars.next();
            true
        } else {
            false
        }
    }

    /// Parse a JSON string literal at the cursor
    fn parse_string(&mut self) -> Option<String> {
        if !self.eat('"') {
            return None;
        }
        let mut out = String::new();
        while let Some(c) = self.chars.next() {
            match c {
                '"' => return Some(out),
                '\\' => match self.chars.next() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some('r') => out.push('\r'),
                    Some('u') => {
                        let code: String = (0..4).filter_map(|_| self.chars.next()).collect();
                        if let Some(ch) =
                            u32::from_str_radix(&code, 16).ok().and_then(char::from_u32)
                        {
                            out.push(ch);
                        }
                    }
                    Some(other) => out.push(other),
                    None => return None,
                },
                other => out.push(other),
            }
        }
        None
    }

    /// Skip one complete JSON value. Returns false if the input ended first.
    fn skip_value(&mut self) -> bool {
        self.skip_ws();
        match self.peek() {
            Some('"') => self.parse_string().is_some(),
            Some('{') | Some('[') => {
                let mut depth = 0i64;
                while let Some(c) = self.peek() {
                    match c {
                        '"' => {
                            if self.parse_string().is_none() {
                                return false;
                            }
                            continue;
                        }
                        '{' | '[' => depth += 1,
                        '}' | ']' => {
                            depth -= 1;
                            if depth == 0 {
                                self.chars.next();
                                return true;
                            }
                        }
                        _ => {}
                    }
                    self.chars.next();
                }
                false
            }
            Some(_) => {
                // number, true, false, null
                while let Some(c) = self.peek() {
                    if matches!(c, ',' | '}' | ']') || c.is_whitespace() {
                        break;
                    }
                    self.chars.next();
                }
                true
            }
            None => false,
        }
    }

    /// Inside an object whose `{` is at the cursor, find a string field by
    /// name and return its value, consuming the whole object.
    fn scan_object_string_field(&mut self, field: &str) -> Option<String> {
        if !self.eat('{') {
            return None;
        }
        let mut found: Option<String> = None;
        loop {
            self.skip_ws();
            if self.eat('}') || self.at_end() {
                break;
            }
            self.eat(',');
            self.skip_ws();
            let key = self.parse_string()?;
            self.skip_ws();
            if !self.eat(':') {
                break;
            }
            self.skip_ws();
            if key == field && self.peek() == Some('"') {
                found = self.parse_string();
            } else if !self.skip_value() {
                break;
            }
        }
        found
    }
}
