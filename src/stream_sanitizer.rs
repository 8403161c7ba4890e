//! Cleanup of victim replies, whole and streamed
//!
//! Models sometimes write stage directions: inline effect tags, narrator
//! lines or a speaker label in front of the reply. Only the spoken words
//! may reach the listener.

use std::sync::LazyLock;

use regex::Regex;

/// Said when nothing speakable is left after cleanup
pub const FALLBACK_LINE: &str = "Pardon ? Vous pouvez repeter calmement ?";

/// Characters held back while streaming
pub const CARRY_WINDOW: usize = 64;

static SOUND_EFFECT_INLINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\[SOUND_EFFECT:\s*[A-Z_]+\s*\]").unwrap());

static NARRATION_PREFIX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*(?:annonceur|annoncer|narrateur|narration|voix off|sfx|sound effect|sound_effect|effet sonore)\s*:\s*",
    )
    .unwrap()
});

static SPEAKER_PREFIX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:victime|victim|assistant|ai|jean|jean dubois)\s*:\s*").unwrap()
});

/// Any label at the start of the text or right after whitespace
static INLINE_LABEL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(^|\s)(?:annonceur|annoncer|narrateur|narration|voix off|sfx|sound effect|sound_effect|effet sonore|victime|victim|assistant|ai|jean|jean dubois)\s*:\s*",
    )
    .unwrap()
});

static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

static WORD_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\S+\s*").unwrap());

/// Stand-in for already-emitted text ending mid-word, so the carry's first
/// char is not mistaken for the start of the reply.
const WORD_GUARD: char = '\u{1}';

/// Final spoken text of a reply.
///
/// Effect tags are removed, narrator lines dropped, a leading speaker label
/// stripped from every line, and the lines joined with single spaces. The
/// result may be empty; see [`spoken_or_fallback`].
pub fn sanitize_spoken_text(raw: &str) -> String {
    let without_tags = SOUND_EFFECT_INLINE_RE.replace_all(raw, " ");
    let lines: Vec<String> = without_tags
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !NARRATION_PREFIX_RE.is_match(line))
        .map(|line| SPEAKER_PREFIX_RE.replace(line, "").trim().to_string())
        .filter(|line| !line.is_empty())
        .collect();

    WHITESPACE_RE
        .replace_all(&lines.join(" "), " ")
        .trim()
        .to_string()
}

/// [`sanitize_spoken_text`], or the fixed clarifying line when nothing is left
pub fn spoken_or_fallback(raw: &str) -> String {
    let text = sanitize_spoken_text(raw);
    if text.is_empty() {
        FALLBACK_LINE.to_string()
    } else {
        text
    }
}

/// Cleanup applied to streamed text.
///
/// Tags and labels are removed and whitespace runs collapsed; the text is
/// not trimmed. Passes repeat until nothing changes, so the result is
/// stable under re-application.
pub fn sanitize_preview(raw: &str) -> String {
    let mut current = raw.to_string();
    loop {
        let without_tags = SOUND_EFFECT_INLINE_RE.replace_all(&current, " ");
        let without_labels = INLINE_LABEL_RE.replace_all(&without_tags, "${1}");
        let next = WHITESPACE_RE.replace_all(&without_labels, " ").into_owned();
        if next == current {
            return next;
        }
        current = next;
    }
}

/// Split text into words, each with its trailing whitespace
pub fn split_words(text: &str) -> Vec<String> {
    WORD_RE
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Incremental cleaner for streamed fragments.
///
/// The cleaned text is emitted except for its last `window` characters,
/// which wait for the next fragment so a tag or label split across
/// fragments is still recognised. [`finish`](Self::finish) releases the
/// remainder.
#[derive(Debug)]
pub struct StreamSanitizer {
    carry: String,
    window: usize,
    last_emitted: Option<char>,
    emitted_speech: bool,
    /// A leading label was removed and nothing has been emitted yet
    after_leading_label: bool,
}

impl Default for StreamSanitizer {
    fn default() -> Self {
        Self::new(CARRY_WINDOW)
    }
}

impl StreamSanitizer {
    pub fn new(window: usize) -> Self {
        Self {
            carry: String::new(),
            window,
            last_emitted: None,
            emitted_speech: false,
            after_leading_label: false,
        }
    }

    /// Feed one raw fragment; returns the text that is now safe to emit
    pub fn push(&mut self, fragment: &str) -> Option<String> {
        if fragment.is_empty() {
            return None;
        }
        let mut buffer = std::mem::take(&mut self.carry);
        buffer.push_str(fragment);
        let clean = self.clean_head(&buffer);

        let len = clean.chars().count();
        if len <= self.window {
            self.carry = clean;
            return None;
        }

        let cut = clean
            .char_indices()
            .nth(len - self.window)
            .map(|(idx, _)| idx)
            .unwrap_or(clean.len());
        self.carry = clean[cut..].to_string();
        let emitted = &clean[..cut];
        self.record(emitted);
        (!emitted.is_empty()).then(|| emitted.to_string())
    }

    /// End of stream: the cleaned remainder, if any
    pub fn finish(&mut self) -> Option<String> {
        let carry = std::mem::take(&mut self.carry);
        if carry.is_empty() {
            return None;
        }
        let rest = self.clean_head(&carry);
        self.record(&rest);
        (!rest.is_empty()).then_some(rest)
    }

    /// True once any emitted piece contained more than whitespace
    pub fn emitted_speech(&self) -> bool {
        self.emitted_speech
    }

    /// True when the last emitted character is whitespace
    pub fn ends_with_whitespace(&self) -> bool {
        self.last_emitted.is_some_and(|c| c.is_whitespace())
    }

    /// [`clean`](Self::clean), dropping the whitespace a one-pass cleanup
    /// would have eaten together with a leading label.
    fn clean_head(&mut self, buffer: &str) -> String {
        let clean = self.clean(buffer);
        if self.last_emitted.is_some() {
            return clean;
        }
        let clean = if self.after_leading_label {
            clean.trim_start().to_string()
        } else {
            clean
        };
        if clean.is_empty() && !buffer.is_empty() {
            self.after_leading_label = true;
        }
        clean
    }

    fn clean(&self, text: &str) -> String {
        match self.last_emitted {
            Some(c) if !c.is_whitespace() => {
                let guarded = sanitize_preview(&format!("{}{}", WORD_GUARD, text));
                guarded
                    .strip_prefix(WORD_GUARD)
                    .map(str::to_string)
                    .unwrap_or(guarded)
            }
            _ => sanitize_preview(text),
        }
    }

    fn record(&mut self, emitted: &str) {
        if let Some(last) = emitted.chars().last() {
            self.last_emitted = Some(last);
        }
        if !emitted.trim().is_empty() {
            self.emitted_speech = true;
        }
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn arb_piece() -> impl Strategy<Value = &'static str> {
        prop_oneof![
            Just("Jean: "),
            Just("jean dubois :"),
            Just("Victime : "),
            Just("ai:"),
            Just("ai"),
            Just(" : "),
            Just("Narrateur:"),
            Just("Bonjour"),
            Just("ça va"),
            Just("x"),
            Just(" "),
            Just("  "),
            Just("\n"),
            Just(","),
            Just("[SOUND_EFFECT: DOG_BARKING]"),
            Just("[SOUND_EFFECT: DOORBELL]"),
        ]
    }

    /// Raw text plus the char offsets at which it is split into fragments
    fn arb_stream() -> impl Strategy<Value = (String, Vec<usize>)> {
        prop::collection::vec(arb_piece(), 0..40).prop_flat_map(|pieces| {
            let raw = pieces.concat();
            let len = raw.chars().count();
            (Just(raw), prop::collection::vec(0..=len, 0..12))
        })
    }

    fn fragments(raw: &str, mut cuts: Vec<usize>) -> Vec<String> {
        cuts.sort_unstable();
        cuts.dedup();
        let chars: Vec<char> = raw.chars().collect();
        let mut out = Vec::new();
        let mut start = 0;
        for cut in cuts.into_iter().chain(std::iter::once(chars.len())) {
            out.push(chars[start..cut].iter().collect::<String>());
            start = cut;
        }
        out
    }

    proptest! {
        #[test]
        fn windowed_output_matches_one_pass(
            (raw, cuts) in arb_stream(),
            window in 48usize..96,
        ) {
            let mut sanitizer = StreamSanitizer::new(window);
            let mut emitted = String::new();
            for fragment in fragments(&raw, cuts) {
                if let Some(piece) = sanitizer.push(&fragment) {
                    emitted.push_str(&piece);
                }
            }
            if let Some(rest) = sanitizer.finish() {
                emitted.push_str(&rest);
            }
            prop_assert_eq!(sanitize_preview(&emitted), sanitize_preview(&raw));
        }

        #[test]
        fn preview_is_stable(raw in prop::collection::vec(arb_piece(), 0..30)) {
            let once = sanitize_preview(&raw.concat());
            prop_assert_eq!(sanitize_preview(&once), once.clone());
        }
    }
}
