// src/util.rs — Small text helpers shared by rendering and logging

/// Cut `s` to at most `max_len` bytes on a UTF-8 boundary.
pub fn truncate_str(s: &str, max_len: usize) -> &str {
    if s.len() <= max_len {
        s
    } else {
        let mut end = max_len;
        while end > 0 && !s.is_char_boundary(end) {
            end -= 1;
        }
        &s[..end]
    }
}

/// Like [`truncate_str`], but marks the cut with "…".
pub fn ellipsize(s: &str, max_len: usize) -> String {
    let cut = truncate_str(s, max_len);
    if cut.len() == s.len() {
        s.to_string()
    } else {
        format!("{}…", cut.trim_end())
    }
}
