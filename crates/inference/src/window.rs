//! Fixed-length context window fed to the model each step.

/// Exactly `window` ids: the last `window` tokens when the sequence is
/// longer, otherwise the whole sequence right-padded with `pad`.
pub fn build_context_window(tokens: &[u32], window: usize, pad: u32) -> Vec<u32> {
    let start = tokens.len().saturating_sub(window);
    let mut out = Vec::with_capacity(window);
    out.extend_from_slice(&tokens[start..]);
    out.resize(window, pad);
    out
}

/// Slot whose logits predict the next token: the last real (non-pad) one.
pub fn next_token_position(total: usize, window: usize) -> usize {
    total.min(window).saturating_sub(1)
}
