use ammonia::Builder;

/// Reports whether `input` carries HTML markup instead of plain text.
///
/// The input goes through ammonia with an empty tag whitelist. Plain text comes
/// back identical except for the entity escaping of the serializer, so any
/// other difference means tags, comments or entities were parsed.
/// Generated text is displayed as text, so it is checked, never rewritten.
pub fn contains_markup(input: &str) -> bool {
    let cleaned = Builder::empty().clean(input).to_string();
    cleaned != escape_text(input)
}

/// Escapes text the way the HTML serializer writes a text node.
fn escape_text(input: &str) -> String {
    let normalized = input.replace("\r\n", "\n").replace('\r', "\n");
    let mut out = String::with_capacity(normalized.len());
    for c in normalized.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_with_special_characters_is_not_markup() {
        assert!(!contains_markup("Costs rose 5% & margins < 3%."));
        assert!(!contains_markup("Report & log"));
        assert!(!contains_markup("If delay > 10 min, inform \"control\".\nThen log it."));
    }

    #[test]
    fn tags_are_markup() {
        assert!(contains_markup("<b>Escalate</b>"));
        assert!(contains_markup("Ask the team<script>alert(1)</script>"));
        assert!(contains_markup("<img src=x onerror=alert(1)>"));
    }
}
