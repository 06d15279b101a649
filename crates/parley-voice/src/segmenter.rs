//! Speakable-unit segmentation of a streamed response.
//!
//! Fragments are appended to a buffer and cut at sentence boundaries as soon
//! as they appear. Long buffers without a sentence end fall back to clause
//! boundaries. Everything else waits for the flush timer
//! ([`Segmenter::flush_delay`]) or the end of the stream.
//!
//! The timer is short before the first unit of a response (fast first audio)
//! and longer afterwards (fewer, more natural chunks).

use std::time::Duration;

use parley_core::SegmenterSettings;

/// Words that end in `.` without ending a sentence (compared lowercase).
const ABBREVIATIONS: &[&str] = &[
    "dr", "mr", "mrs", "ms", "st", "prof", "jr", "sr", "vs", "etc", "e.g", "i.e",
];

/// Characters that may trail terminal punctuation (`"Done."` or `(yes!)`).
const CLOSERS: &[char] = &['"', '\'', '\u{201D}', '\u{2019}', ')', ']'];

/// Per-response segmentation state.
#[derive(Debug, Clone)]
pub struct Segmenter {
    buffer: String,
    flushed_any: bool,
    clause_min_chars: usize,
    first_flush: Duration,
    next_flush: Duration,
}

impl Segmenter {
    pub fn new(settings: &SegmenterSettings) -> Self {
        Self {
            buffer: String::new(),
            flushed_any: false,
            clause_min_chars: settings.clause_min_chars,
            first_flush: settings.first_flush(),
            next_flush: settings.next_flush(),
        }
    }

    /// Append a fragment and return every unit it completes, in order.
    pub fn push(&mut self, fragment: &str) -> Vec<String> {
        self.buffer.push_str(fragment);
        let mut units = Vec::new();

        while let Some(end) = sentence_boundary(&self.buffer) {
            self.cut(end, &mut units);
        }

        if units.is_empty() && self.buffer.chars().count() > self.clause_min_chars {
            if let Some(end) = clause_boundary(&self.buffer) {
                self.cut(end, &mut units);
            }
        }

        units
    }

    /// Flush timer fired: emit everything buffered.
    pub fn flush(&mut self) -> Option<String> {
        let mut units = Vec::with_capacity(1);
        self.cut(self.buffer.len(), &mut units);
        units.pop()
    }

    /// Upstream ended: emit the remainder regardless of boundaries.
    pub fn finish(&mut self) -> Option<String> {
        self.flush()
    }

    /// Delay before [`flush`](Self::flush) should fire, or `None` when nothing
    /// is buffered.
    pub fn flush_delay(&self) -> Option<Duration> {
        if self.buffer.trim().is_empty() {
            None
        } else if self.flushed_any {
            Some(self.next_flush)
        } else {
            Some(self.first_flush)
        }
    }

    /// Whether any unit has been emitted for this response.
    pub const fn has_flushed(&self) -> bool {
        self.flushed_any
    }

    /// Text waiting for a boundary or the timer.
    pub fn pending(&self) -> &str {
        &self.buffer
    }

    fn cut(&mut self, end: usize, units: &mut Vec<String>) {
        let unit = self.buffer[..end].trim().to_owned();
        let rest = self.buffer[end..].trim_start().to_owned();
        self.buffer = rest;
        if !unit.is_empty() {
            self.flushed_any = true;
            units.push(unit);
        }
    }
}

/// Byte index just past the first sentence boundary, if any.
fn sentence_boundary(text: &str) -> Option<usize> {
    for (idx, c) in text.char_indices() {
        if !matches!(c, '.' | '!' | '?') {
            continue;
        }
        let mut end = idx + c.len_utf8();
        let rest = &text[end..];
        let closers: usize = rest
            .chars()
            .take_while(|ch| CLOSERS.contains(ch))
            .map(char::len_utf8)
            .sum();
        end += closers;
        let rest = &text[end..];

        let boundary = if rest.is_empty() {
            // End of buffer: a digit before '.' may be a decimal still streaming.
            !(c == '.' && text[..idx].ends_with(|ch: char| ch.is_ascii_digit()))
        } else if rest.starts_with(char::is_whitespace) {
            !rest.trim_start().starts_with(char::is_lowercase)
        } else {
            false
        };

        if boundary && !(c == '.' && is_abbreviation(&text[..idx])) {
            return Some(end);
        }
    }
    None
}

/// Whether the word right before a `.` is a known non-terminal abbreviation
/// or a name initial.
fn is_abbreviation(before: &str) -> bool {
    let mut words = before
        .split_whitespace()
        .rev()
        .map(|w| w.trim_start_matches(|c: char| !c.is_alphanumeric()));
    let Some(word) = words.next().filter(|w| !w.is_empty()) else {
        return false;
    };
    let mut chars = word.chars();
    if let (Some(first), None) = (chars.next(), chars.next()) {
        // "John F. Kennedy", "J. R. R. Tolkien"; but not "vitamin C."
        return first.is_uppercase()
            && words
                .next()
                .is_none_or(|prev| prev.starts_with(char::is_uppercase));
    }
    let lower = word.to_lowercase();
    ABBREVIATIONS.contains(&lower.as_str())
}

/// Byte index just past the first clause boundary, if any.
fn clause_boundary(text: &str) -> Option<usize> {
    let punct = text.char_indices().find_map(|(idx, c)| {
        let after = idx + c.len_utf8();
        (matches!(c, ',' | ';' | ':') && text[after..].starts_with(char::is_whitespace))
            .then_some(after)
    });
    let dash = [" \u{2014} ", " -- ", " \u{2013} "]
        .iter()
        .filter_map(|sep| text.find(sep).map(|pos| pos + sep.trim_end().len()))
        .min();
    match (punct, dash) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segmenter() -> Segmenter {
        Segmenter::new(&SegmenterSettings::default())
    }

    fn run(fragments: &[&str]) -> Vec<String> {
        let mut seg = segmenter();
        let mut units: Vec<String> = fragments.iter().flat_map(|f| seg.push(f)).collect();
        units.extend(seg.finish());
        units
    }

    #[test]
    fn splits_at_sentence_end() {
        assert_eq!(
            run(&["Hello there. How are", " you? Fine!"]),
            vec!["Hello there.", "How are you?", "Fine!"]
        );
    }

    #[test]
    fn fragments_join_into_one_unit() {
        assert_eq!(run(&["Hello", " there."]), vec!["Hello there."]);
    }

    #[test]
    fn title_abbreviation_does_not_split() {
        assert_eq!(run(&["Dr.", " Smith arrived."]), vec!["Dr. Smith arrived."]);
        assert_eq!(run(&["Ask Mrs. Jones. She knows."]), vec!["Ask Mrs. Jones.", "She knows."]);
    }

    #[test]
    fn lowercase_continuation_does_not_split() {
        let mut seg = segmenter();
        assert!(seg.push("It costs approx. five").is_empty());
        assert_eq!(seg.pending(), "It costs approx. five");
    }

    #[test]
    fn decimal_waits_for_next_fragment() {
        let mut seg = segmenter();
        assert!(seg.push("Pi is 3.").is_empty());
        assert_eq!(seg.push("14 roughly. Next"), vec!["Pi is 3.14 roughly."]);
        assert_eq!(seg.pending(), "Next");
    }

    #[test]
    fn initials_do_not_split() {
        assert_eq!(run(&["J. R. R. Tolkien wrote it."]), vec!["J. R. R. Tolkien wrote it."]);
        assert_eq!(
            run(&["John F. Kennedy spoke. Then he left."]),
            vec!["John F. Kennedy spoke.", "Then he left."]
        );
    }

    #[test]
    fn lone_capital_after_lowercase_word_ends_a_sentence() {
        assert_eq!(
            run(&["Take vitamin C. It helps."]),
            vec!["Take vitamin C.", "It helps."]
        );
    }

    #[test]
    fn closing_quote_stays_with_sentence() {
        assert_eq!(
            run(&["He said \"stop.\" Then left."]),
            vec!["He said \"stop.\"", "Then left."]
        );
    }

    #[test]
    fn clause_fallback_only_when_long() {
        let mut seg = segmenter();
        assert!(seg.push("Well, ok").is_empty());
        let units = seg.push(" then we go on and on");
        assert_eq!(units, vec!["Well,"]);
        assert_eq!(seg.pending(), "ok then we go on and on");
    }

    #[test]
    fn clause_fallback_on_spaced_dash() {
        let mut seg = segmenter();
        let units = seg.push("The answer is simple \u{2014} just wait");
        assert_eq!(units, vec!["The answer is simple \u{2014}"]);
        let mut seg = segmenter();
        let units = seg.push("The answer is simple -- just wait");
        assert_eq!(units, vec!["The answer is simple --"]);
    }

    #[test]
    fn comma_without_space_is_not_a_clause() {
        let mut seg = segmenter();
        assert!(seg.push("The number 1,000,000 is large").is_empty());
    }

    #[test]
    fn sentence_beats_clause() {
        let mut seg = segmenter();
        assert_eq!(
            seg.push("First, a long sentence here. And"),
            vec!["First, a long sentence here."]
        );
    }

    #[test]
    fn flush_delay_policy() {
        let mut seg = segmenter();
        assert_eq!(seg.flush_delay(), None);
        seg.push("no punctuation yet");
        assert_eq!(seg.flush_delay(), Some(Duration::from_millis(400)));
        assert_eq!(seg.flush().as_deref(), Some("no punctuation yet"));
        assert_eq!(seg.flush_delay(), None);
        seg.push("still going");
        assert_eq!(seg.flush_delay(), Some(Duration::from_millis(800)));
    }

    #[test]
    fn whitespace_only_never_flushes() {
        let mut seg = segmenter();
        seg.push("   ");
        assert_eq!(seg.flush_delay(), None);
        assert_eq!(seg.finish(), None);
        assert!(!seg.has_flushed());
    }

    #[test]
    fn finish_emits_remainder() {
        let mut seg = segmenter();
        seg.push("Trailing words");
        assert_eq!(seg.finish().as_deref(), Some("Trailing words"));
        assert!(seg.has_flushed());
    }
}
