//! Clean-up of generated ids before detokenization.

/// Default longest run of one token kept by [`collapse_repeats`].
pub const DEFAULT_MAX_RUN: usize = 2;

/// Keep at most `max_run` consecutive copies of each token (minimum 1).
///
/// The counter resets whenever the token changes, so `[a, a, a, b, a, a, a]`
/// with `max_run = 2` becomes `[a, a, b, a, a]`.
pub fn collapse_repeats(tokens: &[u32], max_run: usize) -> Vec<u32> {
    let max_run = max_run.max(1);
    let mut out = Vec::with_capacity(tokens.len());
    let mut run = 0usize;
    let mut prev: Option<u32> = None;
    for &tok in tokens {
        if prev == Some(tok) {
            run += 1;
        } else {
            run = 1;
            prev = Some(tok);
        }
        if run <= max_run {
            out.push(tok);
        }
    }
    out
}
