//! Call-site resolution.
//!
//! The call site is the frame `skip` levels above the logger's internal
//! entry constructor. With the default skip that frame is the caller of
//! the public level method, which `#[track_caller]` already knows, so the
//! backtrace is only walked when the skip count was changed.

use std::backtrace::Backtrace;
use std::panic::Location;

use crate::logger::stack;

/// Internal frames between the capture point and the public level method.
pub const CALLER_SKIP_FRAME_COUNT: usize = 1;

/// Default skip: the internal frames plus the level method itself.
pub const DEFAULT_CALLER_SKIP: usize = CALLER_SKIP_FRAME_COUNT + 1;

pub(crate) fn format_location(location: &Location<'_>) -> String {
    format!("{}:{}", location.file(), location.line())
}

/// Walk the current stack and return the location `skip` frames above
/// this function's caller.
#[inline(never)]
pub(crate) fn capture(skip: usize) -> Option<String> {
    let frames = stack::parse(&Backtrace::force_capture().to_string());
    let marker = frames.iter().position(|f| f.func.contains("caller::capture"))?;
    frames.get(marker + 1 + skip).and_then(stack::Frame::location)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_location() {
        let location = Location::caller();
        let formatted = format_location(location);
        assert!(formatted.starts_with("src/logger/caller.rs:"));
    }

    #[test]
    fn test_capture_matches_track_caller_format() {
        // Skip 0 is this test function itself.
        let (captured, expected) = (capture(0), format_location(Location::caller()));
        assert_eq!(captured.as_deref(), Some(expected.as_str()));
    }
}
