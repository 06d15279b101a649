//! Speech cleanup for LLM output.
//!
//! Response text arrives as markdown, sometimes wrapped in reasoning blocks
//! that must never be spoken. [`ReasoningFilter`] removes those blocks from the
//! fragment stream (blocks span many fragments), and [`clean_for_speech`]
//! turns one speakable unit into plain text for synthesis.

/// Reasoning tag pairs emitted by common models.
const REASONING_TAGS: &[(&str, &str)] = &[
    ("<think>", "</think>"),
    ("<reasoning>", "</reasoning>"),
    ("<seed:think>", "</seed:think>"),
    ("<|start_thinking|>", "<|end_thinking|>"),
];

/// Streaming filter that drops reasoning blocks across fragment boundaries.
///
/// Tags are matched case-insensitively. A partial tag at the end of a
/// fragment is held back until the next fragment decides it.
#[derive(Debug, Default)]
pub struct ReasoningFilter {
    inside: Option<&'static str>,
    carry: String,
}

impl ReasoningFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one fragment, returning the speakable part of it.
    pub fn push(&mut self, fragment: &str) -> String {
        let mut buf = std::mem::take(&mut self.carry);
        buf.push_str(fragment);
        let mut out = String::new();

        loop {
            let lower = buf.to_ascii_lowercase();
            if let Some(close) = self.inside {
                if let Some(pos) = lower.find(close) {
                    buf.drain(..pos + close.len());
                    self.inside = None;
                    continue;
                }
                self.carry = partial_tag_suffix(&buf, &lower, &[close]).to_owned();
                return out;
            }

            let next_open = REASONING_TAGS
                .iter()
                .filter_map(|&(open, close)| lower.find(open).map(|pos| (pos, open, close)))
                .min_by_key(|&(pos, _, _)| pos);
            if let Some((pos, open, close)) = next_open {
                out.push_str(&buf[..pos]);
                buf.drain(..pos + open.len());
                self.inside = Some(close);
                continue;
            }

            let opens: Vec<&str> = REASONING_TAGS.iter().map(|&(open, _)| open).collect();
            let held = partial_tag_suffix(&buf, &lower, &opens).len();
            let split = buf.len() - held;
            out.push_str(&buf[..split]);
            self.carry = buf[split..].to_owned();
            return out;
        }
    }

    /// End of stream: release held-back text unless inside a block.
    pub fn finish(&mut self) -> String {
        let carry = std::mem::take(&mut self.carry);
        if self.inside.take().is_some() {
            String::new()
        } else {
            carry
        }
    }
}

/// Suffix of `buf` starting at its last `<` that could still grow into a tag.
fn partial_tag_suffix<'a>(buf: &'a str, lower: &str, tags: &[&str]) -> &'a str {
    match lower.rfind('<') {
        Some(idx) if tags.iter().any(|tag| tag.starts_with(&lower[idx..])) => &buf[idx..],
        _ => "",
    }
}

/// Strip markdown syntax from one speakable unit.
///
/// Code fences and horizontal rules are dropped, link and image targets are
/// removed, emphasis markers and HTML tags disappear, and whitespace is
/// collapsed. Returns an empty string when nothing speakable remains.
pub fn clean_for_speech(unit: &str) -> String {
    let mut out = String::with_capacity(unit.len());
    for line in unit.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("```") || is_horizontal_rule(trimmed) {
            continue;
        }
        let line = strip_line_prefix(trimmed);
        let line = strip_inline(line);
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(&line);
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_horizontal_rule(line: &str) -> bool {
    let chars: Vec<char> = line.chars().filter(|c| !c.is_whitespace()).collect();
    chars.len() >= 3
        && matches!(chars[0], '-' | '*' | '_')
        && chars.iter().all(|&c| c == chars[0])
}

/// Blockquote, heading and list markers.
fn strip_line_prefix(line: &str) -> &str {
    let mut s = line;
    while let Some(rest) = s.strip_prefix('>') {
        s = rest.trim_start();
    }
    if s.starts_with('#') {
        s = s.trim_start_matches('#').trim_start();
    }
    for marker in ["- ", "* ", "+ "] {
        if let Some(rest) = s.strip_prefix(marker) {
            return rest;
        }
    }
    let digits = s.chars().take_while(char::is_ascii_digit).count();
    if digits > 0 {
        let rest = &s[digits..];
        if let Some(rest) = rest.strip_prefix(". ").or_else(|| rest.strip_prefix(") ")) {
            return rest;
        }
    }
    s
}

fn strip_inline(line: &str) -> String {
    let chars: Vec<char> = line.chars().collect();
    let mut out = String::with_capacity(line.len());
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            // ![alt](url) and [text](url) keep only the visible text.
            '!' if chars.get(i + 1) == Some(&'[') => i += 1,
            '[' => {
                if let Some((text, next)) = link_parts(&chars, i) {
                    out.push_str(&text);
                    i = next;
                    continue;
                }
                out.push('[');
                i += 1;
            }
            '<' => {
                if let Some(end) = html_tag_end(&chars, i) {
                    i = end;
                    continue;
                }
                out.push('<');
                i += 1;
            }
            '*' | '`' | '~' => i += 1,
            '_' if chars.get(i + 1) == Some(&'_') => i += 2,
            c => {
                out.push(c);
                i += 1;
            }
        }
    }
    out
}

/// `[text](url)` starting at `start`: the text and the index after `)`.
fn link_parts(chars: &[char], start: usize) -> Option<(String, usize)> {
    let close = start + chars[start..].iter().position(|&c| c == ']')?;
    if chars.get(close + 1) != Some(&'(') {
        return None;
    }
    let end = close + 1 + chars[close + 1..].iter().position(|&c| c == ')')?;
    Some((chars[start + 1..close].iter().collect(), end + 1))
}

/// End index (exclusive) of an HTML-looking tag starting at `start`.
fn html_tag_end(chars: &[char], start: usize) -> Option<usize> {
    let first = *chars.get(start + 1)?;
    if !(first.is_ascii_alphabetic() || first == '/') {
        return None;
    }
    let close = chars[start..].iter().position(|&c| c == '>')?;
    Some(start + close + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_emphasis_and_code() {
        assert_eq!(clean_for_speech("**Bold** and *it* with `code`."), "Bold and it with code.");
    }

    #[test]
    fn keeps_link_text_only() {
        assert_eq!(
            clean_for_speech("See [the docs](https://example.com) now."),
            "See the docs now."
        );
        assert_eq!(clean_for_speech("![a cat](cat.png) here"), "a cat here");
    }

    #[test]
    fn strips_line_markers() {
        assert_eq!(clean_for_speech("## Heading"), "Heading");
        assert_eq!(clean_for_speech("- first item"), "first item");
        assert_eq!(clean_for_speech("2. second item"), "second item");
        assert_eq!(clean_for_speech("> quoted"), "quoted");
    }

    #[test]
    fn drops_rules_fences_and_tags() {
        assert_eq!(clean_for_speech("---"), "");
        assert_eq!(clean_for_speech("```rust"), "");
        assert_eq!(clean_for_speech("line<br/>break"), "linebreak");
        assert_eq!(clean_for_speech("3 < 4"), "3 < 4");
    }

    #[test]
    fn keeps_snake_case() {
        assert_eq!(clean_for_speech("call my_function"), "call my_function");
    }

    #[test]
    fn reasoning_block_in_one_fragment() {
        let mut filter = ReasoningFilter::new();
        assert_eq!(filter.push("<think>plan</think>Hello."), "Hello.");
        assert_eq!(filter.finish(), "");
    }

    #[test]
    fn reasoning_block_across_fragments() {
        let mut filter = ReasoningFilter::new();
        let mut spoken = String::new();
        for fragment in ["Sure. <thi", "nk>secret", " stuff</th", "ink> Done."] {
            spoken.push_str(&filter.push(fragment));
        }
        spoken.push_str(&filter.finish());
        assert_eq!(spoken, "Sure.  Done.");
    }

    #[test]
    fn unclosed_block_is_dropped_at_end() {
        let mut filter = ReasoningFilter::new();
        assert_eq!(filter.push("Hi <reasoning>never closed"), "Hi ");
        assert_eq!(filter.finish(), "");
    }

    #[test]
    fn lone_angle_bracket_is_released() {
        let mut filter = ReasoningFilter::new();
        assert_eq!(filter.push("a <"), "a ");
        assert_eq!(filter.push(" b"), "< b");
        assert_eq!(filter.push("x <t"), "x ");
        assert_eq!(filter.finish(), "<t");
    }

    #[test]
    fn uppercase_tags_match() {
        let mut filter = ReasoningFilter::new();
        assert_eq!(filter.push("<THINK>x</THINK>ok"), "ok");
    }
}
