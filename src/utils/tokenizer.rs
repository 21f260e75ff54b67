use memchr::memchr_iter;

/// Maximum token length to index.
/// Longer runs are likely base64, hex dumps, or other non-searchable content.
const MAX_TOKEN_LENGTH: usize = 128;

/// Split text into lowercase word tokens, in order.
///
/// A token is a maximal run of alphanumeric characters; everything else
/// separates tokens. The index of a token in the returned vector is its
/// position, so dropped (overlong) tokens still consume a position and phrase
/// adjacency across them is not invented.
pub fn tokenize(text: &str) -> Vec<Option<String>> {
    let mut tokens = Vec::new();
    let mut current = String::new();

    for ch in text.chars() {
        if ch.is_alphanumeric() {
            current.extend(ch.to_lowercase());
        } else if !current.is_empty() {
            tokens.push(finish_token(&mut current));
        }
    }
    if !current.is_empty() {
        tokens.push(finish_token(&mut current));
    }

    tokens
}

fn finish_token(current: &mut String) -> Option<String> {
    let token = std::mem::take(current);
    (token.len() <= MAX_TOKEN_LENGTH).then_some(token)
}

/// Tokenize and keep only the indexable words (for building queries)
pub fn words(text: &str) -> Vec<String> {
    tokenize(text).into_iter().flatten().collect()
}

/// Split a buffer into its non-empty lines as (1-based line number, text).
/// Invalid UTF-8 is replaced rather than rejected.
pub fn split_lines(content: &[u8]) -> Vec<(u32, String)> {
    let mut lines = Vec::new();
    let mut start = 0;
    let mut line_number = 1u32;

    for end in memchr_iter(b'\n', content).chain(std::iter::once(content.len())) {
        if end < start {
            continue;
        }
        let mut line = &content[start..end];
        if line.last() == Some(&b'\r') {
            line = &line[..line.len() - 1];
        }
        if !line.iter().all(|b| b.is_ascii_whitespace()) {
            lines.push((line_number, String::from_utf8_lossy(line).into_owned()));
        }
        start = end + 1;
        line_number += 1;
    }

    lines
}
