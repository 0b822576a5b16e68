/// Last non-empty line of a process stream, trimmed
pub fn last_line(text: &str) -> Option<&str> {
    text.lines().map(str::trim).rev().find(|line| !line.is_empty())
}

/// Truncate to at most `max_chars` characters, respecting char boundaries
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_line() {
        let stderr = concat!(
            "Traceback (most recent call last):\n",
            "  File \"x\", line 1\n",
            "ZeroDivisionError: division by zero\n\n",
        );
        assert_eq!(last_line(stderr), Some("ZeroDivisionError: division by zero"));
        assert_eq!(last_line("  \n\n"), None);
        assert_eq!(last_line(""), None);
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("hello", 10), "hello");
        assert_eq!(truncate_chars("hello", 3), "hel");
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("", 0), "");
    }
}
