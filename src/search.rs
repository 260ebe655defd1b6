//! Keyword search over the session's cached file bodies.
//!
//! Scoring is deliberately simple: a file-level score (path-name bonus plus
//! weighted occurrence count) multiplied per window by the window's own
//! occurrence count. Only cached bodies are searched; nothing is fetched on
//! a query.

use std::cmp::Ordering;
use std::sync::Arc;

use regex::Regex;
use tracing::debug;

use crate::storage::{ContentCache, FileBody};
use crate::types::SearchWindow;

pub const DEFAULT_TOP_K: usize = 5;
pub const DEFAULT_WINDOW_LINES: usize = 10;

const PATH_BONUS: f64 = 2.0;
const OCCURRENCE_WEIGHT: f64 = 0.1;

pub struct SearchEngine {
    cache: Arc<ContentCache>,
    top_k: usize,
    window_lines: usize,
}

impl SearchEngine {
    pub fn new(cache: Arc<ContentCache>) -> Self {
        Self::with_limits(cache, DEFAULT_TOP_K, DEFAULT_WINDOW_LINES)
    }

    pub fn with_limits(cache: Arc<ContentCache>, top_k: usize, window_lines: usize) -> Self {
        Self {
            cache,
            top_k: top_k.max(1),
            window_lines: window_lines.max(1),
        }
    }

    /// Highest-scoring windows across every cached body, best first. Ties
    /// keep cache insertion order. Empty and whitespace-only queries return
    /// nothing without touching the cache.
    pub fn search(&self, query: &str) -> Vec<SearchWindow> {
        let terms = tokenize(query);
        if terms.is_empty() {
            return Vec::new();
        }
        let matchers = matchers_for(&terms);

        let mut windows = self.cache.with_bodies(|bodies| {
            let mut windows = Vec::new();
            for body in bodies {
                let score = file_score(&terms, &matchers, body);
                if score <= 0.0 {
                    continue;
                }
                self.collect_windows(body, &matchers, score, &mut windows);
            }
            windows
        });

        // Stable sort, so equal scores stay in insertion order.
        windows.sort_by(|a, b| {
            b.relevance
                .partial_cmp(&a.relevance)
                .unwrap_or(Ordering::Equal)
        });
        windows.truncate(self.top_k);
        debug!(query, results = windows.len(), "search complete");
        windows
    }

    fn collect_windows(
        &self,
        body: &FileBody,
        matchers: &[Regex],
        file_score: f64,
        out: &mut Vec<SearchWindow>,
    ) {
        let lines: Vec<&str> = body.text.lines().collect();
        for (index, chunk) in lines.chunks(self.window_lines).enumerate() {
            let text = chunk.join("\n");
            let occurrences = count_occurrences(matchers, &text);
            if occurrences == 0 {
                continue;
            }
            let start_line = index * self.window_lines + 1;
            out.push(SearchWindow {
                path: body.path.clone(),
                end_line: start_line + chunk.len() - 1,
                start_line,
                text,
                relevance: file_score * occurrences as f64,
            });
        }
    }
}

/// Lowercase whitespace tokenization. Repeated terms stay repeated, so they
/// count double; scoring is a pure function of the raw query.
fn tokenize(query: &str) -> Vec<String> {
    query
        .split_whitespace()
        .map(|term| term.to_lowercase())
        .collect()
}

fn matchers_for(terms: &[String]) -> Vec<Regex> {
    terms
        .iter()
        .filter_map(|term| Regex::new(&format!("(?i){}", regex::escape(term))).ok())
        .collect()
}

/// Non-overlapping case-insensitive matches, summed over all terms.
fn count_occurrences(matchers: &[Regex], text: &str) -> usize {
    matchers
        .iter()
        .map(|matcher| matcher.find_iter(text).count())
        .sum()
}

fn file_score(terms: &[String], matchers: &[Regex], body: &FileBody) -> f64 {
    let path = body.path.to_lowercase();
    let path_bonus = if terms.iter().any(|term| path.contains(term)) {
        PATH_BONUS
    } else {
        0.0
    };
    path_bonus + OCCURRENCE_WEIGHT * count_occurrences(matchers, &body.text) as f64
}
