//! Deterministic upload title sanitization, applied before every upload.

const UNTITLED: &str = "Untitled Video";
const MAX_LEN: usize = 100;

/// Sanitize a raw VOD title into something safe to hand to the upload API.
///
/// Steps, applied in order: drop characters outside Basic Latin / Latin-1 Supplement and
/// whitespace; collapse runs of whitespace and trim; drop `<`/`>`; substitute a default
/// for an empty result; truncate to 100 characters.
pub fn sanitize_title(raw: &str) -> String {
    let filtered: String = raw.chars().filter(|c| is_allowed_char(*c)).collect();

    let collapsed = collapse_whitespace(&filtered);
    let bracketless: String = collapsed.chars().filter(|c| *c != '<' && *c != '>').collect();

    let result = if bracketless.trim().is_empty() {
        UNTITLED.to_string()
    } else {
        bracketless
    };

    truncate_chars(&result, MAX_LEN)
}

fn is_allowed_char(c: char) -> bool {
    c.is_whitespace() || matches!(c, '\u{0020}'..='\u{007E}' | '\u{00A0}'..='\u{00FF}')
}

fn collapse_whitespace(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut last_was_space = false;
    for c in s.trim().chars() {
        if c.is_whitespace() {
            if !last_was_space {
                out.push(' ');
            }
            last_was_space = true;
        } else {
            out.push(c);
            last_was_space = false;
        }
    }
    out.trim().to_string()
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    s.chars().take(max).collect::<String>().trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn strips_emoji_and_angle_brackets() {
        assert_eq!(sanitize_title("  Epic   <Stream> \u{1F3AE}  "), "Epic Stream");
    }

    #[test]
    fn falls_back_to_untitled_when_nothing_survives() {
        assert_eq!(sanitize_title("\u{1F3AE}\u{1F3AE}"), "Untitled Video");
    }

    #[test]
    fn truncates_to_exactly_100_chars() {
        let long = "A".repeat(150);
        let sanitized = sanitize_title(&long);
        assert_eq!(sanitized.chars().count(), 100);
    }

    #[test]
    fn is_idempotent() {
        let cases = ["  Epic   <Stream> \u{1F3AE}  ", "\u{1F3AE}\u{1F3AE}", "plain title"];
        for case in cases {
            let once = sanitize_title(case);
            let twice = sanitize_title(&once);
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn sanitized_length_never_exceeds_100() {
        for len in [0, 1, 50, 99, 100, 101, 300] {
            let input = "x".repeat(len);
            assert!(sanitize_title(&input).chars().count() <= MAX_LEN);
        }
    }

    proptest! {
        /// Invariant 7: sanitize(sanitize(x)) = sanitize(x) and len(sanitize(x)) <= 100,
        /// for arbitrary input including characters outside the allowed range.
        #[test]
        fn sanitize_is_idempotent_and_bounded(raw in ".{0,200}") {
            let once = sanitize_title(&raw);
            let twice = sanitize_title(&once);
            prop_assert_eq!(&once, &twice);
            prop_assert!(once.chars().count() <= MAX_LEN);
        }
    }
}
