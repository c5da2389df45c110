/// Telegram's per-message text limit, in characters.
pub const TELEGRAM_MAX_MESSAGE_LEN: usize = 4096;

/// Split text into messages of at most `max_chars` characters.
///
/// Splits happen between lines so digest items stay whole. A single line
/// longer than the limit is cut at character boundaries.
#[must_use]
pub fn split_message(text: &str, max_chars: usize) -> Vec<String> {
    if max_chars == 0 || text.is_empty() {
        return Vec::new();
    }
    if text.chars().count() <= max_chars {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for line in text.split('\n') {
        let line_len = line.chars().count();

        if line_len > max_chars {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
                current_len = 0;
            }
            let chars: Vec<char> = line.chars().collect();
            chunks.extend(chars.chunks(max_chars).map(String::from_iter));
            continue;
        }

        let joined_len = if current.is_empty() {
            line_len
        } else {
            current_len + 1 + line_len
        };
        if joined_len > max_chars {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if !current.is_empty() {
            current.push('\n');
            current_len += 1;
        }
        current.push_str(line);
        current_len += line_len;
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    #[test]
    fn short_text_is_one_chunk() {
        assert_eq!(split_message("hello\nworld", 4096), vec!["hello\nworld"]);
        assert!(split_message("", 4096).is_empty());
    }

    #[test]
    fn splits_between_lines() {
        let text = "aaaa\nbbbb\ncccc";
        assert_eq!(split_message(text, 9), vec!["aaaa\nbbbb", "cccc"]);
    }

    #[test]
    fn counts_characters_not_bytes() {
        let line = "ж".repeat(6);
        let text = format!("{line}\n{line}");
        assert_eq!(split_message(&text, 13), vec![text.clone()]);
        assert_eq!(split_message(&text, 12), vec![line.clone(), line]);
    }

    #[rstest]
    #[case(10, 3)]
    #[case(4, 7)]
    fn overlong_line_is_cut(#[case] max: usize, #[case] expected_chunks: usize) {
        let text = "x".repeat(25);
        let chunks = split_message(&text, max);
        assert_eq!(chunks.len(), expected_chunks);
        assert!(chunks.iter().all(|c| c.chars().count() <= max));
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn long_digest_respects_telegram_limit() {
        let line = format!("• Contact #123 · inbound CRM_EMAIL at {}", "2024-05-10T12:00:00+03:00");
        let text = vec![line; 200].join("\n");
        let chunks = split_message(&text, TELEGRAM_MAX_MESSAGE_LEN);
        assert!(chunks.len() > 1);
        assert!(chunks
            .iter()
            .all(|c| c.chars().count() <= TELEGRAM_MAX_MESSAGE_LEN));
        assert_eq!(chunks.join("\n"), text);
    }
}
