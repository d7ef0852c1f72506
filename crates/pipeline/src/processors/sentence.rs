//! Sentence aggregation for streaming LLM output
//!
//! Buffers response fragments and hands back complete sentences so speech
//! synthesis starts on natural boundaries instead of arbitrary token splits.

/// Sentence terminators, including CJK and Devanagari full stops
const TERMINATORS: &[char] = &['.', '!', '?', '。', '！', '？', '।', '॥'];

/// Closing characters kept with the sentence they end
const CLOSERS: &[char] = &['"', '\'', ')', ']', '\u{201D}', '\u{2019}', '」'];

/// Accumulates text and splits it into sentences
#[derive(Debug, Default)]
pub struct SentenceAggregator {
    buffer: String,
    /// Sentences shorter than this are held and joined with the next one
    min_chars: usize,
}

impl SentenceAggregator {
    pub fn new(min_chars: usize) -> Self {
        Self {
            buffer: String::new(),
            min_chars,
        }
    }

    /// Append a fragment and return every sentence it completed
    pub fn push(&mut self, text: &str) -> Vec<String> {
        self.buffer.push_str(text);

        let mut sentences = Vec::new();
        while let Some(end) = self.next_boundary() {
            let sentence = self.buffer[..end].trim().to_string();
            self.buffer.drain(..end);
            sentences.push(sentence);
        }
        sentences
    }

    /// Take whatever is left, e.g. at the end of a response
    pub fn flush(&mut self) -> Option<String> {
        let text = self.buffer.trim().to_string();
        self.buffer.clear();
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.trim().is_empty()
    }

    /// Byte offset just past the first complete sentence, if any.
    ///
    /// A terminator only ends a sentence once it is followed by whitespace,
    /// after any closing quotes. A terminator at the very end of the buffer
    /// is not a boundary yet: the next fragment may continue a number
    /// ("3.5") or an ellipsis. Sentences shorter than `min_chars` run on
    /// into the next one.
    fn next_boundary(&self) -> Option<usize> {
        let mut chars = self.buffer.char_indices().peekable();

        while let Some((_, c)) = chars.next() {
            if !TERMINATORS.contains(&c) {
                continue;
            }

            while let Some(&(_, next)) = chars.peek() {
                if CLOSERS.contains(&next) || TERMINATORS.contains(&next) {
                    chars.next();
                } else {
                    break;
                }
            }

            match chars.peek() {
                Some(&(idx, next)) if next.is_whitespace() => {
                    let end = idx + next.len_utf8();
                    let sentence = self.buffer[..end].trim();
                    if !sentence.is_empty() && sentence.chars().count() >= self.min_chars {
                        return Some(end);
                    }
                }
                Some(_) => {}
                None => return None,
            }
        }

        None
    }
}
