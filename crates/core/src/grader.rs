//! Scoring of a session's items against the learner's answers.
//!
//! Pure functions only: no clock, no storage. Every item weighs
//! `100 / item_count`; per-item credit follows the question kind:
//!
//! - `single`: 1.0 for the exact correct option, else 0.0.
//! - `multi`: Jaccard similarity `|S ∩ A| / |S ∪ A|` between the selected set
//!   `S` and the correct set `A`. Unknown selected ids stay in `S` and lower
//!   the score. Correct only when `S == A`.
//! - `short`: share of key points found (case-insensitive substring) in the
//!   answer text. Correct once at least 60% of key points (rounded up) match.
//!
//! An empty or absent answer always earns 0.0.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::model::{
    AnswerKey, AnswerValue, Item, ItemId, OptionId, Response, TopicId, TopicScore,
};

/// Output of grading a whole session.
#[derive(Debug, Clone, PartialEq)]
pub struct Grade {
    pub responses: Vec<Response>,
    /// Unrounded `Σ credit × weight`.
    pub raw_score: f64,
    /// `raw_score` rounded to the nearest integer and clamped to `0..=100`.
    pub total_score: u8,
}

/// Equal weight of one item in a session of `total_items`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn item_weight(total_items: usize) -> f64 {
    if total_items == 0 {
        return 0.0;
    }
    100.0 / total_items as f64
}

/// Minimum key points needed for a short answer to count as correct:
/// `ceil(0.6 × key_points)`, computed in integers.
#[must_use]
pub fn short_answer_threshold(key_points: usize) -> usize {
    (3 * key_points).div_ceil(5)
}

/// Grade a single item.
#[must_use]
pub fn grade_item(item: &Item, answer: Option<&AnswerValue>) -> Response {
    let (is_correct, credit) = match answer.filter(|a| !a.is_empty()) {
        None => (false, 0.0),
        Some(value) => score_value(&item.key, value),
    };
    Response {
        item_id: item.id,
        order_no: item.order_no,
        is_correct,
        credit,
    }
}

/// Grade every item in order. Missing answers score 0.
#[must_use]
pub fn grade(items: &[Item], answers: &HashMap<ItemId, AnswerValue>) -> Grade {
    let weight = item_weight(items.len());
    let responses: Vec<Response> = items
        .iter()
        .map(|item| grade_item(item, answers.get(&item.id)))
        .collect();

    let raw_score: f64 = responses.iter().map(|r| r.credit * weight).sum();
    Grade {
        responses,
        raw_score,
        total_score: round_score(raw_score),
    }
}

/// Per-topic scores, ordered by topic id.
///
/// An item tagged with several topics counts toward each of them.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn topic_breakdown(items: &[Item], responses: &[Response]) -> Vec<TopicScore> {
    let credit_by_item: HashMap<ItemId, f64> =
        responses.iter().map(|r| (r.item_id, r.credit)).collect();

    let mut totals: BTreeMap<TopicId, (u32, f64)> = BTreeMap::new();
    for item in items {
        let credit = credit_by_item.get(&item.id).copied().unwrap_or(0.0);
        for topic in &item.topic_ids {
            let entry = totals.entry(*topic).or_insert((0, 0.0));
            entry.0 += 1;
            entry.1 += credit;
        }
    }

    totals
        .into_iter()
        .map(|(topic_id, (item_count, credit))| TopicScore {
            topic_id,
            item_count,
            score: round_score(100.0 * credit / f64::from(item_count)),
        })
        .collect()
}

fn score_value(key: &AnswerKey, value: &AnswerValue) -> (bool, f64) {
    match (key, value) {
        (AnswerKey::Single { correct }, AnswerValue::Single(selected)) => {
            let hit = selected == correct;
            (hit, if hit { 1.0 } else { 0.0 })
        }
        (AnswerKey::Multi { correct }, AnswerValue::Multi(selected)) => {
            (selected == correct, jaccard(selected, correct))
        }
        (AnswerKey::Short { key_points }, AnswerValue::Short(text)) => {
            score_short(key_points, text)
        }
        // A value parsed for another kind cannot earn credit.
        _ => (false, 0.0),
    }
}

#[allow(clippy::cast_precision_loss)]
fn jaccard(selected: &BTreeSet<OptionId>, correct: &BTreeSet<OptionId>) -> f64 {
    let union = selected.union(correct).count();
    if union == 0 {
        return 0.0;
    }
    let intersection = selected.intersection(correct).count();
    intersection as f64 / union as f64
}

#[allow(clippy::cast_precision_loss)]
fn score_short(key_points: &[String], text: &str) -> (bool, f64) {
    if key_points.is_empty() {
        return (false, 0.0);
    }
    let haystack = text.to_lowercase();
    let matched = key_points
        .iter()
        .filter(|k| haystack.contains(&k.to_lowercase()))
        .count();
    let credit = matched as f64 / key_points.len() as f64;
    (matched >= short_answer_threshold(key_points.len()), credit)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn round_score(value: f64) -> u8 {
    if !value.is_finite() || value <= 0.0 {
        return 0;
    }
    value.round().min(100.0) as u8
}
