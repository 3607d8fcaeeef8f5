//! Text normalization for the Tier 1 scanner.
//!
//! Canonicalizes untrusted prompt text so that obfuscated attacks
//! (base64 payloads, leetspeak, unicode homoglyphs, zero-width
//! padding) match the same patterns as their plain forms.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

/// Maximum recursion depth for base64 unwrapping. Nesting beyond this
/// bound is treated as already-normalized rather than decoded further.
const MAX_DECODE_DEPTH: usize = 3;

/// Minimum candidate length for base64 detection.
const MIN_BASE64_LEN: usize = 16;

/// A transform stage that changed the text during normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transform {
    /// One or more base64 segments were decoded in place.
    Base64Decoded,
    /// Unicode homoglyphs or zero-width characters were folded out.
    HomoglyphFolded,
    /// Leetspeak stand-ins were substituted with letters.
    LeetspeakFolded,
    /// Whitespace runs were collapsed.
    WhitespaceCollapsed,
}

/// The result of normalizing a prompt.
///
/// Owned by the pipeline invocation that produced it. The transform
/// record exists for audit logging only and is never re-used.
#[derive(Debug, Clone)]
pub struct NormalizedText {
    /// The raw prompt as received.
    pub original: String,
    /// The fully normalized text the Tier 1 scanner matches against.
    pub normalized: String,
    /// Which transform stages changed the text.
    pub transforms: Vec<Transform>,
}

impl NormalizedText {
    /// Returns true if any stage altered the text beyond lowercasing.
    pub fn was_transformed(&self) -> bool {
        !self.transforms.is_empty()
    }
}

/// Prompt normalizer.
///
/// Pure and stateless after construction; safe to share across
/// concurrent evaluations without synchronization.
pub struct Normalizer {
    base64_re: Regex,
}

impl Normalizer {
    pub fn new() -> Self {
        Self {
            base64_re: Regex::new(&format!(r"[A-Za-z0-9+/]{{{MIN_BASE64_LEN},}}={{0,2}}"))
                .expect("base64 candidate regex is valid"),
        }
    }

    /// Normalizes text through the fixed transform pipeline.
    ///
    /// Stage order: base64 unwrapping, lowercasing, homoglyph folding,
    /// leetspeak folding, whitespace collapsing. Homoglyph folding runs
    /// before leetspeak so that fullwidth digits fold all the way to
    /// letters in a single pass, keeping `normalize` idempotent.
    pub fn normalize(&self, text: &str) -> NormalizedText {
        let mut transforms = Vec::new();

        if text.is_empty() {
            return NormalizedText {
                original: String::new(),
                normalized: String::new(),
                transforms,
            };
        }

        let (unwrapped, decoded_any) = self.unwrap_base64(text);
        if decoded_any {
            transforms.push(Transform::Base64Decoded);
        }

        let lowered = unwrapped.to_lowercase();

        let folded = fold_homoglyphs(&lowered);
        if folded != lowered {
            transforms.push(Transform::HomoglyphFolded);
        }

        let unleeted = fold_leetspeak(&folded);
        if unleeted != folded {
            transforms.push(Transform::LeetspeakFolded);
        }

        let collapsed = unleeted.split_whitespace().collect::<Vec<_>>().join(" ");
        if collapsed != unleeted {
            transforms.push(Transform::WhitespaceCollapsed);
        }

        NormalizedText {
            original: text.to_string(),
            normalized: collapsed,
            transforms,
        }
    }

    /// Replaces base64 candidate substrings with their decoded text so
    /// patterns can match the hidden payload. Replacing (rather than
    /// keeping the encoded form alongside) consumes each candidate,
    /// which is what makes `normalize` idempotent: a spent candidate
    /// cannot decode again on a later pass. Re-scans the result up to
    /// `MAX_DECODE_DEPTH` times for nested encodings; deeper nesting
    /// is treated as already-normalized.
    fn unwrap_base64(&self, text: &str) -> (String, bool) {
        let mut out = text.to_string();
        let mut decoded_any = false;

        for _ in 0..MAX_DECODE_DEPTH {
            let mut next = String::with_capacity(out.len());
            let mut last = 0;
            for m in self.base64_re.find_iter(&out) {
                if let Some(decoded) = decode_printable(m.as_str()) {
                    next.push_str(&out[last..m.start()]);
                    next.push_str(&decoded);
                    last = m.end();
                }
            }
            if last == 0 {
                break;
            }
            next.push_str(&out[last..]);
            out = next;
            decoded_any = true;
        }

        (out, decoded_any)
    }
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new()
    }
}

/// Strictly decodes a base64 candidate, keeping it only if the result
/// is non-empty printable UTF-8.
fn decode_printable(candidate: &str) -> Option<String> {
    let bytes = BASE64.decode(candidate).ok()?;
    let decoded = String::from_utf8(bytes).ok()?;
    if decoded.is_empty() {
        return None;
    }
    if decoded
        .chars()
        .all(|c| !c.is_control() || c.is_whitespace())
    {
        Some(decoded)
    } else {
        None
    }
}

/// Maps lookalike code points to ASCII, decomposes the rest with NFKD,
/// and drops zero-width characters and any remaining non-ASCII.
fn fold_homoglyphs(text: &str) -> String {
    text.chars()
        .filter(|c| !is_zero_width_or_directional(*c))
        .map(homoglyph_to_ascii)
        .collect::<String>()
        .nfkd()
        .filter(char::is_ascii)
        .collect()
}

/// Common Cyrillic and Greek lookalikes for Latin letters.
fn homoglyph_to_ascii(c: char) -> char {
    match c {
        // Cyrillic
        'а' => 'a',
        'в' => 'b',
        'е' => 'e',
        'і' => 'i',
        'ј' => 'j',
        'о' => 'o',
        'р' => 'p',
        'с' => 'c',
        'ѕ' => 's',
        'у' => 'y',
        'х' => 'x',
        // Greek
        'α' => 'a',
        'ε' => 'e',
        'ι' => 'i',
        'κ' => 'k',
        'ν' => 'v',
        'ο' => 'o',
        'ρ' => 'p',
        'τ' => 't',
        'υ' => 'u',
        'χ' => 'x',
        other => other,
    }
}

/// Zero-width and directional-control characters used to split words.
fn is_zero_width_or_directional(c: char) -> bool {
    matches!(
        c,
        '\u{00AD}'
            | '\u{180E}'
            | '\u{200B}'
            | '\u{200C}'
            | '\u{200D}'
            | '\u{200E}'
            | '\u{200F}'
            | '\u{202A}'
            | '\u{202B}'
            | '\u{202C}'
            | '\u{202D}'
            | '\u{202E}'
            | '\u{2060}'
            | '\u{2066}'
            | '\u{2067}'
            | '\u{2068}'
            | '\u{2069}'
            | '\u{FEFF}'
    )
}

/// Single-character digit/symbol stand-ins for letters.
fn fold_leetspeak(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '0' => 'o',
            '1' => 'i',
            '3' => 'e',
            '4' => 'a',
            '5' => 's',
            '7' => 't',
            '@' => 'a',
            '$' => 's',
            other => other,
        })
        .collect()
}
