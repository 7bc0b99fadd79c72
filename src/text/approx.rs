//! Approximate substring search
//!
//! Semi-global Levenshtein (Sellers) over chars: every text position is a
//! possible match end, the pattern must be consumed entirely. Starts are
//! recovered with an anchored edit-distance pass run backwards from each end.

/// One occurrence of a pattern, in char indices
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApproxMatch {
    pub start: usize,
    pub end: usize,
    pub errors: usize,
}

/// Find occurrences of `pattern` in `text` with at most `max_errors` edits.
///
/// Exact occurrences (overlapping ones included) short-circuit the fuzzy
/// pass: if any exist only they are returned.
pub fn search(text: &[char], pattern: &[char], max_errors: usize) -> Vec<ApproxMatch> {
    if pattern.is_empty() || text.is_empty() {
        return Vec::new();
    }

    let exact = exact_matches(text, pattern);
    if !exact.is_empty() {
        return exact;
    }

    approximate_matches(text, pattern, max_errors)
}

/// Similarity in [0, 1] between `pattern` and its best-matching substring
/// of `text`. Empty inputs score 0.
pub fn similarity(text: &[char], pattern: &[char]) -> f64 {
    if pattern.is_empty() || text.is_empty() {
        return 0.0;
    }
    let errors = end_errors(text, pattern)
        .into_iter()
        .min()
        .unwrap_or(pattern.len())
        .min(pattern.len());
    1.0 - errors as f64 / pattern.len() as f64
}

fn exact_matches(text: &[char], pattern: &[char]) -> Vec<ApproxMatch> {
    if pattern.len() > text.len() {
        return Vec::new();
    }
    text.windows(pattern.len())
        .enumerate()
        .filter(|(_, window)| *window == pattern)
        .map(|(start, _)| ApproxMatch {
            start,
            end: start + pattern.len(),
            errors: 0,
        })
        .collect()
}

fn approximate_matches(text: &[char], pattern: &[char], max_errors: usize) -> Vec<ApproxMatch> {
    let errors = end_errors(text, pattern);
    let mut matches: Vec<ApproxMatch> = Vec::new();

    for (j, &e) in errors.iter().enumerate() {
        if e > max_errors {
            continue;
        }
        // Keep only the first position of each local minimum so one fuzzy
        // occurrence does not show up once per neighbouring end position.
        let falling = j == 0 || errors[j - 1] > e;
        let not_rising = errors.get(j + 1).map_or(true, |next| *next >= e);
        if !(falling && not_rising) {
            continue;
        }

        let end = j + 1;
        let (start, errors) = best_start(text, pattern, end, max_errors);
        if errors > max_errors {
            continue;
        }
        let candidate = ApproxMatch { start, end, errors };
        if !matches.contains(&candidate) {
            matches.push(candidate);
        }
    }

    matches
}

/// Minimum edit distance of `pattern` against a substring of `text` ending
/// just after each text position.
fn end_errors(text: &[char], pattern: &[char]) -> Vec<usize> {
    let m = pattern.len();
    let mut column: Vec<usize> = (0..=m).collect();
    let mut out = Vec::with_capacity(text.len());

    for &tc in text {
        let mut diagonal = column[0];
        column[0] = 0;
        for i in 1..=m {
            let above = column[i];
            let cost = usize::from(pattern[i - 1] != tc);
            column[i] = (diagonal + cost).min(above + 1).min(column[i - 1] + 1);
            diagonal = above;
        }
        out.push(column[m]);
    }

    out
}

/// Start of the cheapest alignment of `pattern` ending exactly at `end`.
///
/// Ties prefer the alignment whose length is closest to the pattern's.
fn best_start(text: &[char], pattern: &[char], end: usize, max_errors: usize) -> (usize, usize) {
    let m = pattern.len();
    let lo = end.saturating_sub(m + max_errors);
    let window: Vec<char> = text[lo..end].iter().rev().copied().collect();
    let reversed: Vec<char> = pattern.iter().rev().copied().collect();

    // column[i] = distance between reversed[..i] and window[..j]
    let mut column: Vec<usize> = (0..=m).collect();
    let mut best = (usize::MAX, usize::MAX, end);

    for (j, &wc) in window.iter().enumerate() {
        let mut diagonal = column[0];
        column[0] = j + 1;
        for i in 1..=m {
            let above = column[i];
            let cost = usize::from(reversed[i - 1] != wc);
            column[i] = (diagonal + cost).min(above + 1).min(column[i - 1] + 1);
            diagonal = above;
        }
        let length = j + 1;
        let key = (column[m], length.abs_diff(m), end - length);
        if key < best {
            best = key;
        }
    }

    (best.2, best.0)
}
