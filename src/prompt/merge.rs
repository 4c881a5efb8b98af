//! Prompt merging.
//!
//! A merge picks one subject clause from the selected prompts, then interleaves
//! randomly sampled descriptive clauses from every contributor until the word
//! budget would be exceeded.

use super::SessionError;
use rand::seq::SliceRandom;
use rand::Rng;
use regex::Regex;
use std::sync::OnceLock;

/// Separator between clauses of a prompt.
pub const CLAUSE_SEPARATOR: &str = ", ";

/// Maximum number of words in a merged prompt (the CLIP text encoder budget).
pub const WORD_LIMIT: usize = 77;

static NON_WORD: OnceLock<Regex> = OnceLock::new();

/// Count words after stripping every character that is neither a word
/// character nor whitespace.
pub fn count_words(text: &str) -> usize {
    let re = NON_WORD.get_or_init(|| Regex::new(r"[^\w\s]").expect("static regex is valid"));
    re.replace_all(text, "").split_whitespace().count()
}

/// A selected prompt split into its subject clause and descriptive pool.
struct Contributor<'a> {
    subject: &'a str,
    pool: Vec<&'a str>,
}

impl<'a> Contributor<'a> {
    fn split(prompt: &'a str) -> Self {
        let mut clauses = prompt.split(CLAUSE_SEPARATOR);
        let subject = clauses.next().unwrap_or_default();
        let pool = clauses.filter(|c| !c.is_empty()).collect();
        Self { subject, pool }
    }
}

/// Trim an oversized subject clause to its longest leading run of tokens that
/// fits the word budget.
fn fit_subject(subject: &str, word_limit: usize) -> String {
    if count_words(subject) <= word_limit {
        return subject.to_string();
    }
    let mut fitted = String::new();
    for token in subject.split_whitespace() {
        let candidate = if fitted.is_empty() {
            token.to_string()
        } else {
            format!("{fitted} {token}")
        };
        if count_words(&candidate) > word_limit {
            break;
        }
        fitted = candidate;
    }
    fitted
}

/// Merge at least two prompts into a new one that stays within `word_limit`.
///
/// The result always starts with one contributor's subject clause followed by
/// the separator, and every following clause is terminated by the separator.
pub fn merge_prompts<R: Rng + ?Sized>(
    prompts: &[&str],
    word_limit: usize,
    rng: &mut R,
) -> Result<String, SessionError> {
    if prompts.len() < 2 {
        return Err(SessionError::TooFewSelected {
            selected: prompts.len(),
        });
    }

    let contributors: Vec<Contributor<'_>> =
        prompts.iter().map(|p| Contributor::split(p)).collect();

    let subject = contributors
        .choose(rng)
        .map(|c| c.subject)
        .unwrap_or_default();
    let mut merged = format!("{}{CLAUSE_SEPARATOR}", fit_subject(subject, word_limit));

    let keep_threshold = 1.0 / contributors.len() as f64;
    let rounds = contributors.iter().map(|c| c.pool.len()).max().unwrap_or(0);

    'rounds: for round in 0..rounds {
        for contributor in &contributors {
            let mut pool = contributor.pool.clone();
            pool.shuffle(rng);
            let Some(clause) = pool.get(round) else {
                continue;
            };
            if rng.gen::<f64>() <= keep_threshold {
                continue;
            }
            let candidate = format!("{merged}{clause}{CLAUSE_SEPARATOR}");
            if count_words(&candidate) > word_limit {
                break 'rounds;
            }
            merged = candidate;
        }
    }

    Ok(merged)
}
