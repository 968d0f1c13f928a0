//! Heuristic workload labelling of a worklog, for presentation only.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};
use strum::Display;
use time::{Duration, OffsetDateTime};

use super::Clock;

const MIN_SCORE: i32 = -4;
const MAX_SCORE: i32 = 14;
const HIGH_THRESHOLD: i32 = 7;
const MEDIUM_THRESHOLD: i32 = 2;

static TOKEN_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\p{L}\p{N}]+").expect("valid token pattern"));
static THREE_DIGIT_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{3}\b").expect("valid number pattern"));
static ERROR_MARKER_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(error|exception|stack\s*trace|traceback|panic)").expect("valid marker pattern")
});

struct Keyword {
    term: &'static str,
    weight: i32,
    /// Also match tokens that start with `term`.
    prefix: bool,
}

const fn exact(term: &'static str, weight: i32) -> Keyword {
    Keyword {
        term,
        weight,
        prefix: false,
    }
}

const fn prefix(term: &'static str, weight: i32) -> Keyword {
    Keyword {
        term,
        weight,
        prefix: true,
    }
}

const KEYWORDS: &[Keyword] = &[
    exact("urgent", 3),
    exact("critical", 3),
    exact("outage", 3),
    exact("hotfix", 3),
    prefix("incident", 3),
    exact("bug", 2),
    exact("bugs", 2),
    prefix("debug", 2),
    prefix("investigat", 2),
    prefix("refactor", 2),
    prefix("migrat", 2),
    prefix("architect", 2),
    prefix("optimi", 2),
    exact("performance", 2),
    exact("security", 2),
    exact("production", 2),
    prefix("complex", 2),
    exact("fix", 1),
    exact("fixed", 1),
    prefix("deploy", 1),
    prefix("release", 1),
    prefix("integrat", 1),
    prefix("implement", 1),
    prefix("design", 1),
    exact("review", 1),
    exact("minor", -2),
    exact("simple", -2),
    exact("trivial", -2),
    exact("typo", -2),
    exact("small", -1),
    exact("quick", -1),
    exact("cleanup", -1),
    exact("docs", -1),
    exact("readme", -1),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum IntensityTier {
    Low,
    Medium,
    High,
}

impl IntensityTier {
    fn from_score(score: i32) -> Self {
        if score >= HIGH_THRESHOLD {
            IntensityTier::High
        } else if score >= MEDIUM_THRESHOLD {
            IntensityTier::Medium
        } else {
            IntensityTier::Low
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Intensity {
    pub score: i32,
    pub tier: IntensityTier,
}

fn tokenize(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    TOKEN_PATTERN
        .find_iter(&lowered)
        .map(|m| m.as_str().to_string())
        .collect()
}

fn keyword_weight(token: &str) -> i32 {
    KEYWORDS
        .iter()
        .find(|k| {
            if k.prefix {
                token.starts_with(k.term)
            } else {
                token == k.term
            }
        })
        .map_or(0, |k| k.weight)
}

fn duration_adjustment(hours: f64) -> i32 {
    if hours >= 6.0 {
        5
    } else if hours >= 4.0 {
        4
    } else if hours >= 2.0 {
        2
    } else if hours < 0.5 {
        -2
    } else {
        0
    }
}

fn verbosity_adjustment(comment_tokens: usize) -> i32 {
    if comment_tokens >= 30 {
        2
    } else if comment_tokens >= 14 {
        1
    } else if comment_tokens <= 2 {
        -1
    } else {
        0
    }
}

/// Score how demanding a worklog looks and bucket it into a tier.
///
/// Deterministic and free of I/O; see [`IntensityCache`] for memoisation.
pub fn classify(comment: &str, summary: &str, hours: f64) -> Intensity {
    let tokens = tokenize(&format!("{comment} {summary}"));
    let keywords: i32 = tokens.iter().map(|t| keyword_weight(t)).sum();

    let comment_tokens = TOKEN_PATTERN.find_iter(comment).count();
    let marker = i32::from(
        THREE_DIGIT_PATTERN.is_match(comment) || ERROR_MARKER_PATTERN.is_match(comment),
    );

    let raw = keywords + duration_adjustment(hours) + verbosity_adjustment(comment_tokens) + marker;
    let score = raw.clamp(MIN_SCORE, MAX_SCORE);

    Intensity {
        score,
        tier: IntensityTier::from_score(score),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    comment: String,
    summary: String,
    hours_bits: u64,
}

impl CacheKey {
    fn new(comment: &str, summary: &str, hours: f64) -> Self {
        Self {
            comment: comment.to_string(),
            summary: summary.to_string(),
            hours_bits: hours.to_bits(),
        }
    }
}

/// Memoises [`classify`] for as long as its owner keeps it around.
///
/// Entries expire after `ttl` as measured by the injected clock, and can be
/// dropped explicitly when the underlying worklog changes.
pub struct IntensityCache {
    entries: HashMap<CacheKey, (Intensity, OffsetDateTime)>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for IntensityCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntensityCache")
            .field("entries", &self.entries.len())
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl IntensityCache {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
            clock,
        }
    }

    pub fn classify(&mut self, comment: &str, summary: &str, hours: f64) -> Intensity {
        let key = CacheKey::new(comment, summary, hours);
        let now = self.clock.now();

        if let Some((intensity, stored_at)) = self.entries.get(&key) {
            if now - *stored_at < self.ttl {
                return *intensity;
            }
        }

        let intensity = classify(comment, summary, hours);
        self.entries.insert(key, (intensity, now));
        intensity
    }

    pub fn invalidate(&mut self, comment: &str, summary: &str, hours: f64) {
        self.entries.remove(&CacheKey::new(comment, summary, hours));
    }

    /// Drop expired entries.
    pub fn purge_expired(&mut self) {
        let now = self.clock.now();
        let ttl = self.ttl;
        self.entries.retain(|_, (_, stored_at)| now - *stored_at < ttl);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
