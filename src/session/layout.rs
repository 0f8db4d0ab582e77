//! Overlay height estimate.
//!
//! The panel wraps message text at roughly [`CHARS_PER_LINE`] characters; each
//! message bubble adds padding and spacing around its lines.

/// Header, footer, spacing and padding around the message list
pub const PANEL_CHROME: f64 = 106.0;

/// Content never shrinks below this
pub const MIN_CONTENT_HEIGHT: f64 = 30.0;

const CHARS_PER_LINE: usize = 70;
const LINE_HEIGHT: f64 = 14.0;
// Vertical padding (8 * 2) plus spacing between bubbles
const BUBBLE_EXTRA: f64 = 24.0;

fn wrapped_lines(text: &str) -> usize {
    text.split('\n')
        .map(|line| line.chars().count().div_ceil(CHARS_PER_LINE).max(1))
        .sum()
}

fn to_f64(n: usize) -> f64 {
    f64::from(u32::try_from(n).unwrap_or(u32::MAX))
}

/// Estimated height of the message list for `texts`
pub fn content_height<'a>(texts: impl IntoIterator<Item = &'a str>) -> f64 {
    let height: f64 = texts
        .into_iter()
        .map(|text| to_f64(wrapped_lines(text)).mul_add(LINE_HEIGHT, BUBBLE_EXTRA))
        .sum();
    height.max(MIN_CONTENT_HEIGHT)
}

/// Height to request from the presenter: content plus chrome
pub fn desired_height<'a>(texts: impl IntoIterator<Item = &'a str>) -> f64 {
    content_height(texts) + PANEL_CHROME
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_conversation_uses_minimum() {
        let none = std::iter::empty::<&str>;
        assert!((content_height(none()) - MIN_CONTENT_HEIGHT).abs() < f64::EPSILON);
        assert!(
            (desired_height(none()) - (MIN_CONTENT_HEIGHT + PANEL_CHROME)).abs() < f64::EPSILON
        );
    }

    #[test]
    fn test_empty_message_counts_as_one_line() {
        assert_eq!(wrapped_lines(""), 1);
        assert!((content_height([""]) - (LINE_HEIGHT + BUBBLE_EXTRA)).abs() < f64::EPSILON);
    }

    #[test]
    fn test_wrapping() {
        assert_eq!(wrapped_lines(&"a".repeat(70)), 1);
        assert_eq!(wrapped_lines(&"a".repeat(71)), 2);
        assert_eq!(wrapped_lines("one\ntwo\n\nfour"), 4);
    }

    #[test]
    fn test_height_grows_with_text() {
        let mut previous = content_height(["Hi"]);
        let mut text = String::from("Hi");
        for _ in 0..20 {
            text.push_str(" and a few more words");
            let next = content_height(["Hi", text.as_str()]);
            assert!(next >= previous);
            previous = next;
        }
        assert!(previous > content_height(["Hi"]));
    }
}
