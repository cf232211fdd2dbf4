//! String helpers used when building messages and log lines.

/// Split text into pieces of at most `max_chars` characters.
///
/// Prefers to break after a newline when one falls inside the window; falls
/// back to a hard cut otherwise. Returns an empty vector for empty input.
pub fn chunk_by_chars(text: &str, max_chars: usize) -> Vec<String> {
    if text.is_empty() || max_chars == 0 {
        return Vec::new();
    }

    let chars: Vec<char> = text.chars().collect();
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let hard_end = (start + max_chars).min(chars.len());
        let end = if hard_end == chars.len() {
            hard_end
        } else {
            chars[start..hard_end]
                .iter()
                .rposition(|&c| c == '\n')
                .map(|pos| start + pos + 1)
                .filter(|&pos| pos > start)
                .unwrap_or(hard_end)
        };

        chunks.push(chars[start..end].iter().collect());
        start = end;
    }

    chunks
}

/// Sanitize a string for safe logging (redact sensitive patterns).
pub fn sanitize_for_log(s: &str) -> String {
    let patterns: &[(&str, &str)] = &[
        (r"(?i)(api[_-]?key|apikey)[=:]\s*\S{20,}", "$1=***REDACTED***"),
        (r"(?i)(token|secret|bearer)\s*[=:]\s*\S{10,}", "$1=***REDACTED***"),
        (r"(?i)bearer\s+\S{10,}", "Bearer ***REDACTED***"),
        (r"sk-[a-zA-Z0-9_-]{20,}", "***REDACTED_API_KEY***"),
    ];

    let mut result = s.to_string();
    for (pattern, replacement) in patterns {
        if let Ok(re) = regex::Regex::new(pattern) {
            result = re.replace_all(&result, *replacement).to_string();
        }
    }
    result
}

/// Format an integer with thousands separators (`12345` → `12,345`).
pub fn format_thousands(value: i64) -> String {
    let digits = value.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    if value < 0 {
        out.insert(0, '-');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_short_text() {
        assert_eq!(chunk_by_chars("abc", 10), vec!["abc".to_string()]);
        assert!(chunk_by_chars("", 10).is_empty());
    }

    #[test]
    fn test_chunk_hard_cut() {
        let chunks = chunk_by_chars("abcdefg", 3);
        assert_eq!(chunks, vec!["abc", "def", "g"]);
    }

    #[test]
    fn test_chunk_prefers_newline() {
        let chunks = chunk_by_chars("ab\ncdef", 4);
        assert_eq!(chunks, vec!["ab\n", "cdef"]);
    }

    #[test]
    fn test_chunk_multibyte() {
        let text = "漲".repeat(4500);
        let chunks = chunk_by_chars(&text, 2000);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.chars().count() <= 2000));
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn test_sanitize_for_log() {
        let input = "Using api_key=sk-proj-12345678901234567890";
        let output = sanitize_for_log(input);
        assert!(!output.contains("sk-proj-12345678901234567890"));
        assert!(output.contains("REDACTED"));

        let header = sanitize_for_log("Authorization: Bearer abcdefghijklmnop");
        assert!(!header.contains("abcdefghijklmnop"));
    }

    #[test]
    fn test_format_thousands() {
        assert_eq!(format_thousands(0), "0");
        assert_eq!(format_thousands(999), "999");
        assert_eq!(format_thousands(12345), "12,345");
        assert_eq!(format_thousands(-1234567), "-1,234,567");
    }
}
