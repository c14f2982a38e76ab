//! Stack capture and frame filtering.

use std::backtrace::Backtrace;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// One resolved stack frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Frame {
    pub func: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
}

impl Frame {
    /// `source:line`, when both are known.
    pub fn location(&self) -> Option<String> {
        match (&self.source, self.line) {
            (Some(source), Some(line)) => Some(format!("{source}:{line}")),
            _ => None,
        }
    }
}

/// Rules for removing runtime and toolchain frames from stack traces.
///
/// A frame is excluded when its source file ends with one of `suffixes`,
/// contains one of `substrings`, or has a file name equal to one of
/// `file_names`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameFilter {
    pub suffixes: Vec<String>,
    pub substrings: Vec<String>,
    pub file_names: Vec<String>,
    /// Drop frames whose source location could not be resolved.
    pub drop_unresolved: bool,
}

impl Default for FrameFilter {
    fn default() -> Self {
        Self {
            suffixes: vec![".s".to_string(), ".S".to_string()],
            substrings: vec![
                "/rustc/".to_string(),
                "/library/std/".to_string(),
                "/library/core/".to_string(),
                "/library/alloc/".to_string(),
            ],
            file_names: vec![
                "libc-start.c".to_string(),
                "libc_start_call_main.h".to_string(),
            ],
            drop_unresolved: true,
        }
    }
}

impl FrameFilter {
    pub fn excludes(&self, frame: &Frame) -> bool {
        let Some(source) = frame.source.as_deref() else {
            return self.drop_unresolved;
        };
        let normalized = source.replace('\\', "/");

        if self.suffixes.iter().any(|s| normalized.ends_with(s.as_str())) {
            return true;
        }
        if self.substrings.iter().any(|s| normalized.contains(s.as_str())) {
            return true;
        }
        let file_name = Path::new(&normalized)
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default();
        self.file_names.iter().any(|name| name == file_name)
    }
}

/// Parse the textual form of a [`Backtrace`] into frames.
///
/// Every symbol line becomes a frame, including the unnumbered lines that
/// stand for inlined calls; an `at path:line:col` line fills in the
/// location of the frame above it.
pub fn parse(text: &str) -> Vec<Frame> {
    let mut frames: Vec<Frame> = Vec::new();
    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(location) = line.strip_prefix("at ") {
            if let Some(frame) = frames.last_mut().filter(|f| f.source.is_none()) {
                let (source, line) = split_location(location);
                frame.source = Some(source);
                frame.line = line;
            }
            continue;
        }
        frames.push(Frame {
            func: strip_index(line).to_string(),
            source: None,
            line: None,
        });
    }
    frames
}

fn strip_index(line: &str) -> &str {
    match line.split_once(": ") {
        Some((index, rest)) if !index.is_empty() && index.bytes().all(|b| b.is_ascii_digit()) => {
            rest
        }
        _ => line,
    }
}

// path:line:column, the column being optional. A leading `./` is removed
// so paths read the same as `Location::file()`.
fn split_location(location: &str) -> (String, Option<u32>) {
    let mut numbers = Vec::with_capacity(2);
    let mut rest = location;
    while numbers.len() < 2 {
        match rest.rsplit_once(':') {
            Some((head, tail)) if !tail.is_empty() && tail.bytes().all(|b| b.is_ascii_digit()) => {
                numbers.push(tail);
                rest = head;
            }
            _ => break,
        }
    }
    let line = numbers.last().and_then(|n| n.parse().ok());
    let path = rest.strip_prefix("./").unwrap_or(rest);
    (path.to_string(), line)
}

/// Frames located after the first frame whose function contains `marker`,
/// minus `skip` further frames. Without a marker every frame is returned.
pub(crate) fn after_marker(frames: Vec<Frame>, marker: &str, skip: usize) -> Vec<Frame> {
    match frames.iter().position(|f| f.func.contains(marker)) {
        Some(index) => frames.into_iter().skip(index + 1 + skip).collect(),
        None => frames,
    }
}

/// Frames of the bridge entry points.
const BRIDGE_MARKERS: [&str; 2] = ["TracingBridge as ", "LogBridge as "];

/// Path prefixes of facade and runtime code between a bridge and the code
/// that emitted the record.
const FACADE_PREFIXES: [&str; 7] = [
    "tracing::",
    "tracing_core::",
    "tracing_subscriber::",
    "log::",
    "std::",
    "core::",
    "alloc::",
];

fn is_facade(func: &str) -> bool {
    let func = func.trim_start_matches(|c| c == '<' || c == '&');
    FACADE_PREFIXES.iter().any(|prefix| func.starts_with(prefix))
}

/// For bridged records, drop the bridge and the facade frames above it so
/// the stack starts at the code that logged.
pub(crate) fn after_bridge(frames: Vec<Frame>) -> Vec<Frame> {
    let bridge = frames
        .iter()
        .position(|f| BRIDGE_MARKERS.iter().any(|marker| f.func.contains(marker)));
    match bridge {
        Some(index) => frames
            .into_iter()
            .skip(index + 1)
            .skip_while(|f| is_facade(&f.func))
            .collect(),
        None => frames,
    }
}

/// Capture the current stack, drop `skip` frames above the caller and
/// apply `filter`.
#[inline(never)]
pub(crate) fn capture(skip: usize, filter: &FrameFilter) -> Vec<Frame> {
    let frames = parse(&Backtrace::force_capture().to_string());
    after_bridge(after_marker(frames, "stack::capture", skip))
        .into_iter()
        .filter(|frame| !filter.excludes(frame))
        .collect()
}
