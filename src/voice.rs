// Speech-synthesis helpers: which voice to use, and how to cut text into utterances
// short enough for engines that silently stop on long input.

use serde::{Deserialize, Serialize};

/// A voice offered by the platform speech engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Voice {
    pub name: String,
    pub lang: String,
    /// Runs on-device rather than through a network service.
    #[serde(default)]
    pub local_service: bool,
}

impl Voice {
    pub fn new(name: &str, lang: &str, local_service: bool) -> Self {
        Voice {
            name: name.to_string(),
            lang: lang.to_string(),
            local_service,
        }
    }
}

/// Which rule picked the voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceRule {
    SavedPreference,
    Neural,
    PremiumLocal,
    GenderHint,
    Language,
    FirstAvailable,
}

const NEURAL_MARKERS: &[&str] = &["natural", "neural", "wavenet", "studio"];
const PREMIUM_LOCAL_MARKERS: &[&str] = &["premium", "enhanced", "samantha", "karen", "daniel", "moira"];
const GENDER_HINTS: &[&str] = &["female", "aria", "jenny", "zira", "susan", "hazel", "victoria", "google us english"];

/// Priority-ordered voice matching.
#[derive(Debug, Clone)]
pub struct VoiceSelector {
    preferred: Option<String>,
    language: String,
}

impl VoiceSelector {
    pub fn new(preferred: Option<String>, language: &str) -> Self {
        VoiceSelector {
            preferred,
            language: language.to_string(),
        }
    }

    pub fn set_preferred(&mut self, preferred: Option<String>) {
        self.preferred = preferred;
    }

    pub fn pick<'a>(&self, voices: &'a [Voice]) -> Option<(&'a Voice, VoiceRule)> {
        if let Some(name) = self.preferred.as_deref() {
            if let Some(voice) = voices.iter().find(|v| v.name == name) {
                return Some((voice, VoiceRule::SavedPreference));
            }
        }

        let in_language: Vec<&Voice> = voices.iter().filter(|v| self.speaks_language(v)).collect();

        let rules: [(VoiceRule, fn(&Voice) -> bool); 3] = [
            (VoiceRule::Neural, |v| name_has(v, NEURAL_MARKERS)),
            (VoiceRule::PremiumLocal, |v| v.local_service && name_has(v, PREMIUM_LOCAL_MARKERS)),
            (VoiceRule::GenderHint, |v| !v.local_service && name_has(v, GENDER_HINTS)),
        ];
        for (rule, rule_matches) in rules {
            if let Some(voice) = in_language.iter().find(|v| rule_matches(v)) {
                return Some((*voice, rule));
            }
        }

        if let Some(voice) = in_language.first() {
            return Some((*voice, VoiceRule::Language));
        }
        voices.first().map(|v| (v, VoiceRule::FirstAvailable))
    }

    /// Primary subtag match, so `en-US` accepts `en-GB` and `en_AU`.
    fn speaks_language(&self, voice: &Voice) -> bool {
        let wanted = primary_subtag(&self.language);
        !wanted.is_empty() && primary_subtag(&voice.lang).eq_ignore_ascii_case(wanted)
    }
}

fn primary_subtag(lang: &str) -> &str {
    lang.split(['-', '_']).next().unwrap_or("")
}

fn name_has(voice: &Voice, markers: &[&str]) -> bool {
    let name = voice.name.to_lowercase();
    markers.iter().any(|m| name.contains(m))
}

/// Split narration into sentence-sized chunks of at most `max_chars` characters.
/// Sentences longer than the limit are broken at the last space that fits.
pub fn chunk_sentences(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    for sentence in sentences(text) {
        split_long(sentence, max_chars, &mut chunks);
    }
    chunks
}

fn sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if matches!(c, '.' | '!' | '?' | '…') {
            let next_is_break = chars.peek().map_or(true, |(_, n)| n.is_whitespace());
            if next_is_break {
                let end = i + c.len_utf8();
                push_trimmed(&mut out, &text[start..end]);
                start = end;
            }
        }
    }
    push_trimmed(&mut out, &text[start..]);
    out
}

fn push_trimmed<'a>(out: &mut Vec<&'a str>, piece: &'a str) {
    let piece = piece.trim();
    if !piece.is_empty() {
        out.push(piece);
    }
}

fn split_long(sentence: &str, max_chars: usize, chunks: &mut Vec<String>) {
    let mut rest = sentence;
    while rest.chars().count() > max_chars {
        let limit = rest
            .char_indices()
            .nth(max_chars)
            .map_or(rest.len(), |(i, _)| i);
        let cut = rest[..limit].rfind(char::is_whitespace).filter(|&i| i > 0).unwrap_or(limit);
        chunks.push(rest[..cut].trim_end().to_string());
        rest = rest[cut..].trim_start();
    }
    if !rest.is_empty() {
        chunks.push(rest.to_string());
    }
}
