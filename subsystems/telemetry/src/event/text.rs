//! Bounded text helpers.
//!
//! Everything written into a fixed-capacity string goes through here so
//! truncation always lands on a character boundary.

use core::fmt::{self, Write};

/// Metric name bound
pub const NAME_LEN: usize = 64;
/// Metric description bound
pub const DESCRIPTION_LEN: usize = 128;
/// Event message bound
pub const MESSAGE_LEN: usize = 256;
/// Event details bound
pub const DETAILS_LEN: usize = 512;

static_assertions::const_assert!(MESSAGE_LEN < DETAILS_LEN);
static_assertions::const_assert!(NAME_LEN <= DESCRIPTION_LEN);

/// Metric or operation name
pub type Name = heapless::String<NAME_LEN>;
/// Metric description
pub type Description = heapless::String<DESCRIPTION_LEN>;
/// Event message
pub type Message = heapless::String<MESSAGE_LEN>;
/// Event details
pub type Details = heapless::String<DETAILS_LEN>;

/// `fmt::Write` sink that stops silently at capacity
struct Truncating<'a, const N: usize> {
    out: &'a mut heapless::String<N>,
    truncated: bool,
}

impl<const N: usize> Write for Truncating<'_, N> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        if self.truncated {
            return Ok(());
        }
        let room = N - self.out.len();
        if s.len() <= room {
            // Cannot fail: length checked above.
            let _ = self.out.push_str(s);
            return Ok(());
        }
        let cut = floor_char_boundary(s, room);
        let _ = self.out.push_str(&s[..cut]);
        self.truncated = true;
        Ok(())
    }
}

/// Largest index `<= max` that is a char boundary of `s`
pub fn floor_char_boundary(s: &str, max: usize) -> usize {
    if max >= s.len() {
        return s.len();
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    cut
}

/// Replace `out` with formatted text, truncating at capacity
///
/// Returns `true` if the text was cut.
pub fn write_bounded<const N: usize>(out: &mut heapless::String<N>, args: fmt::Arguments<'_>) -> bool {
    out.clear();
    let mut sink = Truncating {
        out,
        truncated: false,
    };
    let _ = sink.write_fmt(args);
    sink.truncated
}

/// Replace `out` with `text`, truncating at capacity
pub fn copy_bounded<const N: usize>(out: &mut heapless::String<N>, text: &str) -> bool {
    write_bounded(out, format_args!("{}", text))
}

/// Build a bounded string from `text`
pub fn bounded<const N: usize>(text: &str) -> heapless::String<N> {
    let mut out = heapless::String::new();
    copy_bounded(&mut out, text);
    out
}
