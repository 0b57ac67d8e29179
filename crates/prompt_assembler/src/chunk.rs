use crate::tokenizer::Tokenizer;

/// Splits `text` into consecutive pieces of at most `chunk_size` tokens.
///
/// A piece is extended past `chunk_size` only when its last token ends inside
/// a multi-byte character. Concatenating the chunks yields `text` again. A zero
/// `chunk_size` keeps the text whole.
#[must_use]
pub fn chunk_by_tokens(tokenizer: &dyn Tokenizer, text: &str, chunk_size: usize) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }
    if chunk_size == 0 {
        return vec![text.to_string()];
    }

    let tokens = tokenizer.encode(text);
    let mut chunks = Vec::new();
    let mut start = 0;
    while start < tokens.len() {
        let mut end = (start + chunk_size).min(tokens.len());
        loop {
            if let Some(chunk) = tokenizer.decode(&tokens[start..end]) {
                chunks.push(chunk);
                break;
            }
            if end == tokens.len() {
                // Unreachable for tokens produced by `encode`.
                return vec![text.to_string()];
            }
            end += 1;
        }
        start = end;
    }
    chunks
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::chunk_by_tokens;
    use crate::tokenizer::{BpeTokenizer, Tokenizer};

    #[test]
    fn chunks_respect_size_and_reassemble() {
        let tokenizer = BpeTokenizer::cl100k().expect("cl100k table");
        let text = "one two three four five";

        let chunks = chunk_by_tokens(&tokenizer, text, 2);

        assert_eq!(chunks, vec!["one two", " three four", " five"]);
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn chunks_never_split_a_character() {
        let tokenizer = BpeTokenizer::cl100k().expect("cl100k table");
        let text = "𓀀 and 𓀁 and 你好，世界";

        let chunks = chunk_by_tokens(&tokenizer, text, 1);

        assert_eq!(chunks.concat(), text);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(!chunk.is_empty());
            assert!(tokenizer.count(chunk) >= 1);
        }
    }

    #[test]
    fn empty_text_and_zero_size_edge_cases() {
        let tokenizer = BpeTokenizer::cl100k().expect("cl100k table");
        assert!(chunk_by_tokens(&tokenizer, "", 3).is_empty());
        assert_eq!(chunk_by_tokens(&tokenizer, "a b", 0), vec!["a b"]);
    }
}
