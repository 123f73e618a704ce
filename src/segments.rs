use std::collections::{BTreeMap, HashSet};
use unicode_segmentation::UnicodeSegmentation;

/// A trimmed sentence and its byte range in the source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentenceSpan {
    pub start: usize,
    pub end: usize,
    pub text: String,
}

pub fn sentence_spans(text: &str) -> Vec<SentenceSpan> {
    text.split_sentence_bound_indices()
        .filter_map(|(idx, raw)| {
            let lead = raw.len() - raw.trim_start().len();
            let trimmed = raw.trim();
            if trimmed.is_empty() { return None; }
            let start = idx + lead;
            Some(SentenceSpan { start, end: start + trimmed.len(), text: trimmed.to_string() })
        })
        .collect()
}

pub struct SlidingWinCfg { pub left: usize, pub right: usize }

/// Surrounding sentences of `sentences[i]`, as (left, right) context strings.
pub fn window_context(sentences: &[SentenceSpan], i: usize, cfg: &SlidingWinCfg) -> (String, String) {
    let left = i.saturating_sub(cfg.left);
    let right = (i + cfg.right + 1).min(sentences.len());
    let join = |s: &[SentenceSpan]| s.iter().map(|x| x.text.as_str()).collect::<Vec<_>>().join(" ");
    let l = join(&sentences[left..i]);
    let r = if i + 1 < right { join(&sentences[i + 1..right]) } else { String::new() };
    (l, r)
}

fn words(s: &str) -> HashSet<String> {
    s.unicode_words().map(|w| w.to_lowercase()).collect()
}

/// Jaccard overlap of the lowercase word sets.
pub fn word_similarity(a: &str, b: &str) -> f64 {
    let (wa, wb) = (words(a), words(b));
    if wa.is_empty() || wb.is_empty() { return 0.0; }
    let inter = wa.intersection(&wb).count() as f64;
    let union = wa.union(&wb).count() as f64;
    inter / union
}

const MIN_OVERLAP: f64 = 0.5;

/// Map each sentence index to the claims it carries. Claims matching no sentence are returned separately.
pub fn locate_claims(sentences: &[SentenceSpan], claims: &[&str]) -> (BTreeMap<usize, Vec<usize>>, Vec<usize>) {
    let mut located: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    let mut missing = Vec::new();
    for (ci, claim) in claims.iter().enumerate() {
        let needle = claim.trim().to_lowercase();
        if needle.is_empty() { missing.push(ci); continue; }
        let exact = sentences.iter().position(|s| {
            let hay = s.text.to_lowercase();
            hay.contains(&needle) || needle.contains(&hay)
        });
        let hit = exact.or_else(|| {
            sentences.iter()
                .enumerate()
                .map(|(i, s)| (i, word_similarity(&s.text, claim)))
                .filter(|(_, sim)| *sim >= MIN_OVERLAP)
                .max_by(|a, b| a.1.total_cmp(&b.1))
                .map(|(i, _)| i)
        });
        match hit {
            Some(i) => located.entry(i).or_default().push(ci),
            None => missing.push(ci),
        }
    }
    (located, missing)
}
