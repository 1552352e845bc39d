//! Word-bounded splitting with overlap.
//!
//! Length is measured in whitespace-separated words, never characters. Each
//! produced chunk is a contiguous slice of the original text, so
//! `start_offset` always points at real content and overlapping words appear
//! verbatim in both neighbours.

/// Preference order for break positions between words.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum BreakKind {
    /// Plain whitespace.
    Word = 0,
    /// The previous word ends a sentence.
    Sentence = 1,
    /// The gap contains a line break.
    Line = 2,
    /// The gap contains a blank line.
    Paragraph = 3,
}

struct Word {
    byte_start: usize,
    byte_end: usize,
    char_start: usize,
    /// Kind of the gap immediately before this word.
    break_before: BreakKind,
}

/// One piece of a split document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    pub content: String,

    /// Char offset of `content` within the original text.
    pub start_offset: usize,
}

/// Splits text into word-bounded, overlapping chunks.
///
/// Chunks target `size` words. Consecutive chunks share `overlap` words.
/// Within the second half of each window the splitter prefers to break at a
/// paragraph break, then a line break, then a sentence break, then any
/// whitespace.
pub struct WordSplitter {
    size: usize,
    overlap: usize,
}

impl WordSplitter {
    pub fn new(size: usize, overlap: usize) -> Self {
        let size = size.max(1);
        // Overlap must leave room for forward progress.
        let overlap = overlap.min(size.saturating_sub(1) / 2);
        Self { size, overlap }
    }

    fn collect_words(text: &str) -> Vec<Word> {
        let mut spans: Vec<(usize, usize, usize)> = Vec::new(); // (byte_start, byte_end, char_start)
        let mut current: Option<(usize, usize)> = None;
        for (char_idx, (byte_idx, ch)) in text.char_indices().enumerate() {
            if ch.is_whitespace() {
                if let Some((byte_start, char_start)) = current.take() {
                    spans.push((byte_start, byte_idx, char_start));
                }
            } else if current.is_none() {
                current = Some((byte_idx, char_idx));
            }
        }
        if let Some((byte_start, char_start)) = current {
            spans.push((byte_start, text.len(), char_start));
        }

        spans
            .iter()
            .enumerate()
            .map(|(i, &(byte_start, byte_end, char_start))| {
                let break_before = if i == 0 {
                    BreakKind::Word
                } else {
                    let (prev_start, prev_end, _) = spans[i - 1];
                    let gap = &text[prev_end..byte_start];
                    if gap.matches('\n').count() >= 2 {
                        BreakKind::Paragraph
                    } else if gap.contains('\n') {
                        BreakKind::Line
                    } else if text[prev_start..prev_end].ends_with(['.', '!', '?']) {
                        BreakKind::Sentence
                    } else {
                        BreakKind::Word
                    }
                };
                Word {
                    byte_start,
                    byte_end,
                    char_start,
                    break_before,
                }
            })
            .collect()
    }

    /// Split `text` into overlapping word-bounded pieces.
    pub fn split(&self, text: &str) -> Vec<Split> {
        let words = Self::collect_words(text);
        if words.is_empty() {
            return Vec::new();
        }

        let slice = |from: usize, to: usize| Split {
            content: text[words[from].byte_start..words[to - 1].byte_end].to_string(),
            start_offset: words[from].char_start,
        };

        if words.len() <= self.size {
            return vec![slice(0, words.len())];
        }

        let mut splits = Vec::new();
        let mut start = 0usize;

        loop {
            let remaining = words.len() - start;
            if remaining <= self.size {
                splits.push(slice(start, words.len()));
                break;
            }

            let window_end = start + self.size;
            let floor = start + self.size / 2;
            let mut best = window_end;
            let mut best_kind = BreakKind::Word;

            // Scan right-to-left so ties resolve to the latest position of
            // the strongest break kind.
            for candidate in ((floor + 1)..=window_end).rev() {
                let kind = words[candidate].break_before;
                if kind > best_kind {
                    best_kind = kind;
                    best = candidate;
                    if best_kind == BreakKind::Paragraph {
                        break;
                    }
                }
            }

            splits.push(slice(start, best));
            start = best.saturating_sub(self.overlap).max(start + 1);
        }

        splits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word_count(s: &str) -> usize {
        s.split_whitespace().count()
    }

    #[test]
    fn short_text_is_one_chunk() {
        let splitter = WordSplitter::new(750, 50);
        let splits = splitter.split("just a handful of words here");
        assert_eq!(splits.len(), 1);
        assert_eq!(splits[0].content, "just a handful of words here");
        assert_eq!(splits[0].start_offset, 0);
    }

    #[test]
    fn single_word_text() {
        let splitter = WordSplitter::new(750, 50);
        let splits = splitter.split("word");
        assert_eq!(splits.len(), 1);
        assert_eq!(splits[0].content, "word");
        assert_eq!(splits[0].start_offset, 0);
    }

    #[test]
    fn whitespace_only_yields_nothing() {
        let splitter = WordSplitter::new(750, 50);
        assert!(splitter.split("  \n\n \t ").is_empty());
    }

    #[test]
    fn leading_whitespace_offsets() {
        let splitter = WordSplitter::new(750, 50);
        let splits = splitter.split("   indented text");
        assert_eq!(splits[0].start_offset, 3);
        assert_eq!(splits[0].content, "indented text");
    }

    #[test]
    fn long_text_respects_size() {
        let text = (0..100).map(|i| format!("w{}", i)).collect::<Vec<_>>().join(" ");
        let splitter = WordSplitter::new(20, 5);
        let splits = splitter.split(&text);

        assert!(splits.len() > 1);
        for split in &splits {
            assert!(word_count(&split.content) <= 20);
        }
        // Last chunk ends with the final word.
        assert!(splits.last().unwrap().content.ends_with("w99"));
    }

    #[test]
    fn consecutive_chunks_overlap() {
        let text = (0..100).map(|i| format!("w{}", i)).collect::<Vec<_>>().join(" ");
        let splitter = WordSplitter::new(20, 5);
        let splits = splitter.split(&text);

        for pair in splits.windows(2) {
            let first: Vec<&str> = pair[0].content.split_whitespace().collect();
            let second: Vec<&str> = pair[1].content.split_whitespace().collect();
            let tail = &first[first.len() - 5..];
            assert_eq!(tail, &second[..5], "adjacent chunks must share the overlap words");
        }
    }

    #[test]
    fn prefers_paragraph_breaks() {
        // 30 words, paragraph break after word 17 (inside the second half of
        // a 20-word window), so the first chunk should end exactly there.
        let first_para = (0..17).map(|i| format!("a{}", i)).collect::<Vec<_>>().join(" ");
        let second_para = (0..13).map(|i| format!("b{}", i)).collect::<Vec<_>>().join(" ");
        let text = format!("{}\n\n{}", first_para, second_para);

        let splitter = WordSplitter::new(20, 0);
        let splits = splitter.split(&text);

        assert_eq!(word_count(&splits[0].content), 17);
        assert!(splits[0].content.ends_with("a16"));
        assert!(splits[1].content.starts_with("b0"));
    }

    #[test]
    fn prefers_sentence_over_plain_whitespace() {
        let words: Vec<String> = (0..30)
            .map(|i| {
                if i == 14 {
                    format!("s{}.", i)
                } else {
                    format!("s{}", i)
                }
            })
            .collect();
        let text = words.join(" ");

        let splitter = WordSplitter::new(20, 0);
        let splits = splitter.split(&text);

        assert!(splits[0].content.ends_with("s14."));
        assert!(splits[1].content.starts_with("s15"));
    }

    #[test]
    fn start_offsets_point_into_original() {
        let text = (0..80).map(|i| format!("tok{}", i)).collect::<Vec<_>>().join(" ");
        let splitter = WordSplitter::new(25, 5);
        let splits = splitter.split(&text);

        let chars: Vec<char> = text.chars().collect();
        for split in &splits {
            let window: String = chars[split.start_offset..]
                .iter()
                .take(split.content.chars().count())
                .collect();
            assert_eq!(window, split.content);
        }
    }
}
