//! Splitting and truncating content to fit request budgets.
//!
//! Two families of operations:
//!
//! - **Truncation** ([`truncate_to_token_budget`], [`truncate_to_byte_budget`])
//!   keeps a prefix of the text. It drops trailing paragraphs first, then
//!   trailing sentences of the last paragraph, and only then cuts raw
//!   characters, ~10% per step.
//! - **Splitting** ([`split_into_chunks`]) cuts the text at whitespace
//!   into consecutive chunks that each fit the budget. Concatenating the
//!   chunk texts reproduces the input exactly; separating whitespace stays
//!   at the end of the chunk before the cut.
//!
//! Every estimator used here is non-decreasing in prefix length, so
//! "drop one unit and re-check" is computed as a binary search over unit
//! boundaries. The result is the same, in logarithmically many estimates.

use serde::Deserialize;

use crate::tokenizer::TokenEstimator;
use crate::types::Chunk;

/// Fraction of characters removed per raw-cut step.
const CUT_SHRINK_FACTOR: f64 = 0.10;

/// Static per-request limits, shared by the chunker and the executor.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CostBudget {
    /// Model context budget for one request (input + output). Default: 6,000.
    pub max_tokens_per_request: usize,
    /// Output tokens requested from the model. Default: 1,000.
    pub max_response_tokens: u32,
    /// Minimum tokens reserved for the system instruction. Default: 300.
    pub system_overhead_tokens: usize,
    /// Hard transport limit on the serialized request. Default: 100,000.
    pub max_request_bytes: usize,
}

impl Default for CostBudget {
    fn default() -> Self {
        Self {
            max_tokens_per_request: 6_000,
            max_response_tokens: 1_000,
            system_overhead_tokens: 300,
            max_request_bytes: 100_000,
        }
    }
}

impl CostBudget {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_tokens_per_request(mut self, tokens: usize) -> Self {
        self.max_tokens_per_request = tokens;
        self
    }

    pub fn max_response_tokens(mut self, tokens: u32) -> Self {
        self.max_response_tokens = tokens;
        self
    }

    pub fn system_overhead_tokens(mut self, tokens: usize) -> Self {
        self.system_overhead_tokens = tokens;
        self
    }

    pub fn max_request_bytes(mut self, bytes: usize) -> Self {
        self.max_request_bytes = bytes;
        self
    }

    /// Tokens left for content once the system instruction (at least
    /// `system_overhead_tokens`) and the response are accounted for.
    /// Never less than 1.
    pub fn content_tokens(&self, system_tokens: usize) -> usize {
        self.max_tokens_per_request
            .saturating_sub(system_tokens.max(self.system_overhead_tokens))
            .saturating_sub(self.max_response_tokens as usize)
            .max(1)
    }

    /// Byte budget left for content after the system instruction.
    pub fn content_bytes(&self, system: &str) -> usize {
        self.max_request_bytes.saturating_sub(system.len())
    }
}

/// Shorten `text` until its estimated token count is at most `max_tokens`.
///
/// Returns the input unchanged if it already fits.
pub fn truncate_to_token_budget(
    estimator: &dyn TokenEstimator,
    text: &str,
    max_tokens: usize,
) -> String {
    shrink_to_fit(text, |s| estimator.estimate_tokens(s) <= max_tokens)
}

/// Shorten `text` until the estimated request size is at most `max_bytes`.
///
/// Used as the last guard before transmission: the byte budget models a
/// transport limit independent of the model's token limit.
pub fn truncate_to_byte_budget(
    estimator: &dyn TokenEstimator,
    text: &str,
    max_bytes: usize,
) -> String {
    shrink_to_fit(text, |s| estimator.estimate_request_bytes(s) <= max_bytes)
}

/// Split `text` into ordered chunks of at most `max_tokens_per_chunk`
/// estimated tokens each.
///
/// Words are accumulated greedily; a new chunk starts when the next word
/// would overflow the current one. A single word larger than the budget is
/// cut by characters. Empty input yields no chunks.
pub fn split_into_chunks(
    estimator: &dyn TokenEstimator,
    text: &str,
    max_tokens_per_chunk: usize,
) -> Vec<Chunk> {
    let fits = |s: &str| estimator.estimate_tokens(s) <= max_tokens_per_chunk;
    let bounds = word_boundaries(text);
    let mut spans: Vec<(usize, usize)> = Vec::new();

    let mut i = 0;
    while i + 1 < bounds.len() {
        let start = bounds[i];
        // Largest j > i such that text[start..bounds[j]] fits.
        let candidates = &bounds[i + 1..];
        let n = candidates.partition_point(|&end| fits(&text[start..end]));
        if n > 0 {
            spans.push((start, candidates[n - 1]));
            i += n;
        } else {
            // A single word does not fit on its own.
            let end = bounds[i + 1];
            spans.extend(hard_split(&text[start..end], &fits).map(|(a, b)| (start + a, start + b)));
            i += 1;
        }
    }

    spans
        .into_iter()
        .enumerate()
        .map(|(index, (a, b))| {
            let text = text[a..b].to_string();
            Chunk {
                index,
                estimated_tokens: estimator.estimate_tokens(&text),
                text,
            }
        })
        .collect()
}

/// Three-tier prefix shrink: paragraphs, sentences, raw characters.
fn shrink_to_fit(text: &str, fits: impl Fn(&str) -> bool) -> String {
    if fits(text) {
        return text.to_string();
    }

    let mut current = text;

    let paragraphs = paragraph_ends(current);
    if paragraphs.len() > 1 {
        current = longest_fitting_prefix(current, &paragraphs, &fits);
        if fits(current) {
            return current.to_string();
        }
    }

    let sentences = sentence_ends(current);
    if sentences.len() > 1 {
        current = longest_fitting_prefix(current, &sentences, &fits);
        if fits(current) {
            return current.to_string();
        }
    }

    // Raw cut. Each step removes at least one character, so this ends.
    let mut chars: Vec<char> = current.chars().collect();
    let mut cut: String = chars.iter().collect();
    while !chars.is_empty() && !fits(&cut) {
        let remove = ((chars.len() as f64 * CUT_SHRINK_FACTOR) as usize).max(1);
        chars.truncate(chars.len() - remove);
        cut = chars.iter().collect();
    }
    cut
}

/// Longest prefix `text[..end]` (trailing whitespace trimmed) that fits,
/// where `end` is one of `ends`. Falls back to the first unit, which the
/// next tier shrinks further.
fn longest_fitting_prefix<'a>(text: &'a str, ends: &[usize], fits: &impl Fn(&str) -> bool) -> &'a str {
    let n = ends.partition_point(|&end| fits(text[..end].trim_end()));
    let end = ends[n.saturating_sub(1)];
    text[..end].trim_end()
}

/// Byte offsets where each paragraph ends. Paragraphs are separated by one
/// or more blank lines. The last offset is `text.len()`.
fn paragraph_ends(text: &str) -> Vec<usize> {
    let mut ends = Vec::new();
    let mut offset = 0;
    let mut in_paragraph = false;
    let mut paragraph_end = 0;
    for line in text.split_inclusive('\n') {
        if line.trim().is_empty() {
            if in_paragraph {
                ends.push(paragraph_end);
                in_paragraph = false;
            }
        } else {
            in_paragraph = true;
            paragraph_end = offset + line.len();
        }
        offset += line.len();
    }
    if in_paragraph || ends.is_empty() {
        ends.push(text.len());
    }
    ends
}

/// Byte offsets just past each sentence terminator (`.`, `!`, `?`) that is
/// followed by whitespace. The last offset is `text.len()`.
fn sentence_ends(text: &str) -> Vec<usize> {
    let mut ends = Vec::new();
    let mut iter = text.char_indices().peekable();
    while let Some((i, c)) = iter.next() {
        if matches!(c, '.' | '!' | '?')
            && let Some(&(_, next)) = iter.peek()
            && next.is_whitespace()
        {
            ends.push(i + c.len_utf8());
        }
    }
    if ends.last() != Some(&text.len()) {
        ends.push(text.len());
    }
    ends
}

/// Cut positions for chunking: 0, the start of every word that follows
/// whitespace, and `text.len()`. Empty text has no spans.
fn word_boundaries(text: &str) -> Vec<usize> {
    if text.is_empty() {
        return Vec::new();
    }
    let mut bounds = vec![0];
    let mut prev_ws = false;
    for (i, c) in text.char_indices() {
        let ws = c.is_whitespace();
        if prev_ws && !ws && i > 0 {
            bounds.push(i);
        }
        prev_ws = ws;
    }
    bounds.push(text.len());
    bounds
}

/// Split one oversized word into character runs that each fit.
///
/// If even a single character does not fit (degenerate estimator
/// settings), it is emitted on its own rather than looping forever.
fn hard_split<'a>(
    word: &'a str,
    fits: &'a impl Fn(&str) -> bool,
) -> impl Iterator<Item = (usize, usize)> + 'a {
    let char_ends: Vec<usize> = word
        .char_indices()
        .map(|(i, c)| i + c.len_utf8())
        .collect();
    let mut start = 0;
    let mut k = 0;
    std::iter::from_fn(move || {
        if k >= char_ends.len() {
            return None;
        }
        let rest = &char_ends[k..];
        let n = rest.partition_point(|&end| fits(&word[start..end])).max(1);
        let span = (start, rest[n - 1]);
        start = rest[n - 1];
        k += n;
        Some(span)
    })
}
