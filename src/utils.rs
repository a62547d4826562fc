use std::borrow::Cow;

pub fn make_single_line(s: &str) -> Cow<str> {
    if s.contains('\n') {
        Cow::Owned(s.replace('\n', "↵"))
    } else {
        Cow::Borrowed(s)
    }
}

/// Single line version of `s` cut to at most `max_chars` characters, for use in log messages
pub fn log_preview(s: &str, max_chars: usize) -> Cow<str> {
    let single = make_single_line(s);
    match single.char_indices().nth(max_chars) {
        Some((cut, _)) => Cow::Owned(format!("{}...", &single[..cut])),
        None => single,
    }
}
