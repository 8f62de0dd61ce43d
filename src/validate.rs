//! Input validation and intent detection for agent ergonomics.
//!
//! Provides O(1) validation sets and synonym maps so agents can use
//! natural language for step types, work statuses, and gate statuses.
//! Three-tier resolution: exact match → synonym lookup → error with suggestion.

use crate::model::{GateStatus, StepType, WorkStatus};
use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

// ── Valid value sets (O(1) lookups) ──────────────────────────

pub static VALID_STEP_TYPES: LazyLock<HashSet<&str>> = LazyLock::new(|| {
    ["agent_work", "agent_review", "human_review"]
        .into_iter()
        .collect()
});

pub static VALID_WORK_STATUSES: LazyLock<HashSet<&str>> = LazyLock::new(|| {
    ["todo", "in_progress", "review", "done", "blocked"]
        .into_iter()
        .collect()
});

pub static VALID_GATE_STATUSES: LazyLock<HashSet<&str>> = LazyLock::new(|| {
    ["succeeded", "failed", "bypassed"].into_iter().collect()
});

// ── Synonym maps (agent typo recovery) ───────────────────────

pub static STEP_TYPE_SYNONYMS: LazyLock<HashMap<&str, &str>> = LazyLock::new(|| {
    [
        ("work", "agent_work"),
        ("agent", "agent_work"),
        ("build", "agent_work"),
        ("draft", "agent_work"),
        ("review", "agent_review"),
        ("agent-review", "agent_review"),
        ("qa", "agent_review"),
        ("human", "human_review"),
        ("human-review", "human_review"),
        ("approval", "human_review"),
        ("approve", "human_review"),
        ("signoff", "human_review"),
        ("gate", "human_review"),
    ]
    .into_iter()
    .collect()
});

pub static WORK_STATUS_SYNONYMS: LazyLock<HashMap<&str, &str>> = LazyLock::new(|| {
    [
        ("open", "todo"),
        ("new", "todo"),
        ("backlog", "todo"),
        ("wip", "in_progress"),
        ("active", "in_progress"),
        ("working", "in_progress"),
        ("reviewing", "review"),
        ("in_review", "review"),
        ("closed", "done"),
        ("complete", "done"),
        ("completed", "done"),
        ("waiting", "blocked"),
    ]
    .into_iter()
    .collect()
});

pub static GATE_STATUS_SYNONYMS: LazyLock<HashMap<&str, &str>> = LazyLock::new(|| {
    [
        ("ok", "succeeded"),
        ("pass", "succeeded"),
        ("passed", "succeeded"),
        ("success", "succeeded"),
        ("fail", "failed"),
        ("error", "failed"),
        ("skip", "bypassed"),
        ("skipped", "bypassed"),
        ("bypass", "bypassed"),
    ]
    .into_iter()
    .collect()
});

/// Resolve `input` against a valid set and a synonym map.
fn normalize_with(
    input: &str,
    valid: &HashSet<&str>,
    synonyms: &HashMap<&str, &str>,
) -> Result<String, (String, Option<String>)> {
    let lower = input.trim().to_lowercase();

    // Tier 1: exact match
    if valid.contains(lower.as_str()) {
        return Ok(lower);
    }

    // Tier 2: synonym lookup
    if let Some(&canonical) = synonyms.get(lower.as_str()) {
        return Ok(canonical.to_string());
    }

    // Tier 3: find closest suggestion
    let suggestion = find_closest_match(&lower, valid, synonyms);
    Err((input.to_string(), suggestion))
}

/// Normalize a step type via exact match or synonym lookup.
pub fn normalize_step_type(input: &str) -> Result<StepType, (String, Option<String>)> {
    let canonical = normalize_with(input, &VALID_STEP_TYPES, &STEP_TYPE_SYNONYMS)?;
    StepType::parse(&canonical).ok_or((input.to_string(), None))
}

/// Normalize a work status via exact match or synonym lookup.
pub fn normalize_work_status(input: &str) -> Result<WorkStatus, (String, Option<String>)> {
    let canonical = normalize_with(input, &VALID_WORK_STATUSES, &WORK_STATUS_SYNONYMS)?;
    WorkStatus::parse(&canonical).ok_or((input.to_string(), None))
}

/// Normalize a gate status via exact match or synonym lookup.
pub fn normalize_gate_status(input: &str) -> Result<GateStatus, (String, Option<String>)> {
    let canonical = normalize_with(input, &VALID_GATE_STATUSES, &GATE_STATUS_SYNONYMS)?;
    GateStatus::parse(&canonical).ok_or((input.to_string(), None))
}

/// Trim a free-text value, mapping blank input to `None`.
#[must_use]
pub fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(ToString::to_string)
}

/// Find the closest matching value across valid set and synonyms.
fn find_closest_match(
    input: &str,
    valid: &HashSet<&str>,
    synonyms: &HashMap<&str, &str>,
) -> Option<String> {
    let mut best: Option<(&str, usize)> = None;

    for &v in valid.iter().chain(synonyms.keys()) {
        let dist = levenshtein_distance(input, v);
        if dist <= 3 && best.is_none_or(|(_, d)| dist < d) {
            // For synonyms, show what it maps to
            let shown = synonyms.get(v).copied().unwrap_or(v);
            best = Some((shown, dist));
        }
    }

    best.map(|(v, _)| v.to_string())
}

// ── Levenshtein distance ─────────────────────────────────────

/// Compute the Levenshtein edit distance between two strings.
pub fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let a_len = a.len();
    let b_len = b.len();

    if a_len == 0 {
        return b_len;
    }
    if b_len == 0 {
        return a_len;
    }

    // Single-row optimization (O(min(m,n)) space)
    let mut prev: Vec<usize> = (0..=b_len).collect();
    let mut curr = vec![0; b_len + 1];

    for i in 1..=a_len {
        curr[0] = i;
        for j in 1..=b_len {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            curr[j] = (prev[j] + 1) // deletion
                .min(curr[j - 1] + 1) // insertion
                .min(prev[j - 1] + cost); // substitution
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b_len]
}

/// Find existing IDs similar to the searched ID.
///
/// Returns up to `max` suggestions with edit distance ≤ 3,
/// sorted by distance then alphabetically.
pub fn find_similar_ids(searched: &str, existing: &[String], max: usize) -> Vec<String> {
    let mut candidates: Vec<(usize, &str)> = existing
        .iter()
        .map(|id| (levenshtein_distance(searched, id), id.as_str()))
        .filter(|(dist, _)| *dist <= 3)
        .collect();

    candidates.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(b.1)));

    candidates
        .into_iter()
        .take(max)
        .map(|(_, id)| id.to_string())
        .collect()
}
