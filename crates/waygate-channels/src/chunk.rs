// SPDX-License-Identifier: Apache-2.0

fn char_split(s: &str, n: usize) -> (&str, &str) {
    match s.char_indices().nth(n) {
        Some((idx, _)) => s.split_at(idx),
        None => (s, ""),
    }
}

/// Greedily packs newline-delimited lines into chunks never exceeding
/// `max_len` characters, joining packed lines with `\n`. A single line
/// longer than `max_len` is hard-split at the limit.
pub fn chunk_text(text: &str, max_len: usize) -> Vec<String> {
    if max_len == 0 || text.is_empty() {
        return Vec::new();
    }

    let mut chunks = Vec::new();
    let mut current = String::new();

    for line in text.split('\n') {
        let mut remaining = line;
        loop {
            let remaining_len = remaining.chars().count();
            if remaining_len <= max_len {
                let joined_len =
                    if current.is_empty() { remaining_len } else { current.chars().count() + 1 + remaining_len };
                if joined_len <= max_len {
                    if !current.is_empty() {
                        current.push('\n');
                    }
                    current.push_str(remaining);
                } else {
                    chunks.push(std::mem::take(&mut current));
                    current.push_str(remaining);
                }
                break;
            }

            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            let (head, tail) = char_split(remaining, max_len);
            chunks.push(head.to_string());
            remaining = tail;
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packs_short_lines_into_one_chunk() {
        let chunks = chunk_text("line one\nline two\nline three", 1000);
        assert_eq!(chunks, vec!["line one\nline two\nline three".to_string()]);
    }

    #[test]
    fn no_chunk_exceeds_max_length() {
        let text = "a".repeat(250);
        let chunks = chunk_text(&text, 80);
        assert!(chunks.iter().all(|c| c.chars().count() <= 80));
    }

    #[test]
    fn hard_split_long_line_reconstructs_via_plain_concatenation() {
        let text = "x".repeat(205);
        let chunks = chunk_text(&text, 80);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn paragraph_packing_round_trips_with_newline_join() {
        let text = "short a\nshort b\nshort c";
        let chunks = chunk_text(text, 1000);
        assert_eq!(chunks.join("\n"), text);
    }

    #[test]
    fn splits_when_packed_line_would_exceed_limit() {
        let chunks = chunk_text("12345\n12345\n12345", 11);
        assert_eq!(chunks, vec!["12345\n12345".to_string(), "12345".to_string()]);
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        assert!(chunk_text("", 100).is_empty());
    }
}
