//! Cell tokenization
//!
//! Turns one cell string into the bag of tokens the index and the scoring
//! pipeline operate on:
//! - whole-input sentinel replication for long strings (exact-substring boost)
//! - per-word sentinels plus even-offset substring cuts
//! - numeric identifiers kept whole and replicated instead of shredded
//! - sliding n-gram joins over the stop-word-filtered word list
//!
//! Equal inputs always produce equal token sequences.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static NUMERIC_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4,}$").expect("valid regex"));

/// Corporate suffixes (English and Spanish) plus a small frequency blacklist.
/// Frozen: scores are only comparable across runs built with the same list.
pub const DEFAULT_STOP_WORDS: &[&str] = &[
    // English corporate suffixes
    "llc", "inc", "ltd", "co", "corp", "corporation", "company", "plc", "lp", "llp", "gmbh",
    // Spanish corporate suffixes
    "sa", "srl", "sl", "cv", "rl", "sociedad", "anonima", "an\u{f3}nima", "cia", "compania",
    "compa\u{f1}ia",
    // frequency blacklist
    "de", "del", "la", "el", "las", "los", "y", "the", "and", "of",
];

/// Tuning knobs for the tokenizer. Defaults are load-bearing: the sentinel
/// replication counts interact with the bucket-size damping during scoring.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenizerProfile {
    /// Inputs longer than this get the whole-input sentinel at `long_repeat`
    pub long_input_len: usize,
    pub long_repeat: usize,
    /// Inputs longer than this (but not long) get it at `mid_repeat`
    pub mid_input_len: usize,
    pub mid_repeat: usize,
    /// Replication count for numeric identifiers (`\d{4,}`)
    pub numeric_repeat: usize,
    /// Substring cut sizes; duplicates emit the same cuts twice
    pub cut_sizes: Vec<usize>,
    /// Offset step between substring starts
    pub cut_step: usize,
    /// Sliding window sizes for n-gram joins
    pub ngram_windows: Vec<usize>,
    /// Words removed before shredding, matched case-insensitively
    pub stop_words: Vec<String>,
}

impl Default for TokenizerProfile {
    fn default() -> Self {
        Self {
            long_input_len: 10,
            long_repeat: 400,
            mid_input_len: 7,
            mid_repeat: 100,
            numeric_repeat: 3,
            cut_sizes: vec![4, 5, 7, 8, 10, 10, 13, 14, 15, 17, 17],
            cut_step: 2,
            ngram_windows: vec![2, 3, 4],
            stop_words: DEFAULT_STOP_WORDS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Stateless cell tokenizer
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Tokenizer {
    profile: TokenizerProfile,
}

impl Tokenizer {
    /// Tokenizer with custom tuning
    pub fn new(profile: TokenizerProfile) -> Self {
        Self { profile }
    }

    /// The active profile
    pub fn profile(&self) -> &TokenizerProfile {
        &self.profile
    }

    /// Tokenize one cell. Empty or whitespace-only input yields no tokens.
    pub fn tokenize(&self, input: &str) -> Vec<String> {
        let trimmed = input
            .trim_matches(|c: char| c.is_whitespace() || c.is_ascii_punctuation())
            .to_lowercase();
        if trimmed.is_empty() {
            return Vec::new();
        }

        let mut tokens = Vec::new();

        let trimmed_len = trimmed.chars().count();
        if trimmed_len > self.profile.long_input_len {
            let sentinel = format!("${trimmed}$");
            tokens.extend(std::iter::repeat(sentinel).take(self.profile.long_repeat));
        } else if trimmed_len > self.profile.mid_input_len {
            let sentinel = format!("${trimmed}$");
            tokens.extend(std::iter::repeat(sentinel).take(self.profile.mid_repeat));
        }

        let cleaned: String = trimmed
            .chars()
            .map(|c| if c.is_ascii_punctuation() { ' ' } else { c })
            .collect();
        let kept: Vec<&str> = cleaned
            .split_whitespace()
            .filter(|w| !self.is_stop_word(w))
            .collect();

        for word in &kept {
            tokens.push(format!("${word}$"));
            tokens.push(format!("$#{word}$#"));

            if NUMERIC_ID.is_match(word) {
                tokens.extend(std::iter::repeat(word.to_string()).take(self.profile.numeric_repeat));
                continue;
            }

            let chars: Vec<char> = word.chars().collect();
            let step = self.profile.cut_step.max(1);
            for &cut in &self.profile.cut_sizes {
                if cut == 0 || chars.len() < cut {
                    continue;
                }
                let mut start = 0;
                while start + cut <= chars.len() {
                    tokens.push(chars[start..start + cut].iter().collect());
                    start += step;
                }
            }
        }

        for &window in &self.profile.ngram_windows {
            if window < 2 || kept.len() < window {
                continue;
            }
            for slice in kept.windows(window) {
                tokens.push(slice.join(" "));
            }
        }

        tokens
    }

    fn is_stop_word(&self, word: &str) -> bool {
        self.profile
            .stop_words
            .iter()
            .any(|s| s.eq_ignore_ascii_case(word))
    }
}
