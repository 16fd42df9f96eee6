use crate::font::MeasureText;
use crate::types::Pt;

/// Replaces every line break and tab with a single space, then trims the ends.
pub fn sanitize_text(input: &str) -> String {
    input
        .chars()
        .map(|ch| match ch {
            '\r' | '\n' | '\t' => ' ',
            other => other,
        })
        .collect::<String>()
        .trim()
        .to_string()
}

/// Greedy line fill. Words are never split; a single word wider than
/// `max_width` is emitted on a line of its own.
pub fn wrap<M: MeasureText + ?Sized>(text: &str, max_width: Pt, metrics: &M, size: Pt) -> Vec<String> {
    let clean = sanitize_text(text);
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in clean.split(' ').filter(|w| !w.is_empty()) {
        if current.is_empty() {
            current.push_str(word);
            continue;
        }
        let candidate_width =
            metrics.measure(&current, size) + metrics.measure(" ", size) + metrics.measure(word, size);
        if candidate_width > max_width {
            lines.push(std::mem::take(&mut current));
            current.push_str(word);
        } else {
            current.push(' ');
            current.push_str(word);
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::font::StandardFont;

    struct Monospace;

    impl MeasureText for Monospace {
        fn measure(&self, text: &str, size: Pt) -> Pt {
            size.mul_ratio(text.chars().count() as i32 * 500, 1000)
        }
    }

    #[test]
    fn sanitize_replaces_breaks_and_tabs() {
        assert_eq!(sanitize_text("  a\r\nb\tc\n"), "a  b c");
        assert_eq!(sanitize_text("\n\t"), "");
    }

    #[test]
    fn empty_input_yields_no_lines() {
        let lines = wrap("", Pt::from_i32(100), &Monospace, Pt::from_i32(10));
        assert!(lines.is_empty());
        let lines = wrap(" \r\n\t ", Pt::from_i32(100), &Monospace, Pt::from_i32(10));
        assert!(lines.is_empty());
    }

    #[test]
    fn wraps_greedily_at_width() {
        // Each char is 5pt at size 10; 30pt fits six chars.
        let lines = wrap("aa bb cc dd", Pt::from_i32(30), &Monospace, Pt::from_i32(10));
        assert_eq!(lines, vec!["aa bb", "cc dd"]);
    }

    #[test]
    fn overwide_word_gets_its_own_line() {
        let lines = wrap(
            "hi supercalifragilistic yo",
            Pt::from_i32(30),
            &Monospace,
            Pt::from_i32(10),
        );
        assert_eq!(lines, vec!["hi", "supercalifragilistic", "yo"]);
    }

    #[test]
    fn runs_of_spaces_do_not_create_empty_words() {
        let lines = wrap("a    b", Pt::from_i32(300), &Monospace, Pt::from_i32(10));
        assert_eq!(lines, vec!["a b"]);
    }

    #[test]
    fn joined_lines_reconstruct_normalized_input_and_fit() {
        let text = "I certify that the above information is complete and accurate\nto the best of my knowledge.\tIf the health plan   information is not accurate, I understand.";
        let max = Pt::from_i32(180);
        let size = Pt::from_i32(9);
        let font = StandardFont::Helvetica;
        let lines = wrap(text, max, &font, size);
        let sanitized = sanitize_text(text);
        let normalized: Vec<&str> = sanitized
            .split(' ')
            .filter(|w| !w.is_empty())
            .collect();
        assert_eq!(lines.join(" "), normalized.join(" "));
        for line in &lines {
            let fits = font.measure(line, size) <= max;
            assert!(fits || !line.contains(' '), "line overflows: {line}");
        }
        assert!(lines.len() > 1);
    }
}
