// replace placeholder in template with data
pub fn render_template(template: &str, data: &[(&str, &str)]) -> String {
    let mut result = String::from(template);

    for (placeholder, value) in data {
        result = result.replace(placeholder, value);
    }

    result
}

// convert uint to readable format
pub fn readable_uint(n: usize) -> String {
    let mut s = String::new();
    for (i, char) in n.to_string().chars().rev().enumerate() {
        if i % 3 == 0 && i != 0 {
            s.insert(0, ',');
        }
        s.insert(0, char);
    }
    s
}

pub fn escape_html(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Cuts `text` down to at most `max_chars` characters, appending `...` when
/// anything was dropped.
pub fn excerpt(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        None => text.to_string(),
        Some((cut, _)) => format!("{}...", text[..cut].trim_end()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readable_uint_groups_thousands() {
        assert_eq!(readable_uint(0), "0");
        assert_eq!(readable_uint(999), "999");
        assert_eq!(readable_uint(1000), "1,000");
        assert_eq!(readable_uint(1234567), "1,234,567");
    }

    #[test]
    fn render_template_replaces_every_placeholder() {
        let out = render_template("{{a}} and {{b}} and {{a}}", &[("{{a}}", "x"), ("{{b}}", "y")]);
        assert_eq!(out, "x and y and x");
    }

    #[test]
    fn escape_html_neutralises_markup() {
        assert_eq!(
            escape_html(r#"<script>alert("hi") & 'bye'</script>"#),
            "&lt;script&gt;alert(&quot;hi&quot;) &amp; &#39;bye&#39;&lt;/script&gt;"
        );
    }

    #[test]
    fn excerpt_keeps_short_text_untouched() {
        assert_eq!(excerpt("short body", 150), "short body");
        let exact = "a".repeat(150);
        assert_eq!(excerpt(&exact, 150), exact);
    }

    #[test]
    fn excerpt_truncates_on_char_boundaries() {
        let long = format!("{} {}", "a".repeat(149), "tail");
        assert_eq!(excerpt(&long, 150), format!("{}...", "a".repeat(149)));

        let wolves = "🐺".repeat(10);
        assert_eq!(excerpt(&wolves, 3), "🐺🐺🐺...");
    }
}
