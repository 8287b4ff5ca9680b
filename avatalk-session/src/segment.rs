//! Sentence segmentation for spoken replies.

fn is_terminal(c: char) -> bool {
    matches!(c, '.' | '!' | '?')
}

fn is_closing(c: char) -> bool {
    matches!(c, '"' | '\'' | ')' | ']' | '”' | '’')
}

/// Split `reply` into sentences in order.
///
/// A boundary is a run of `.`, `!` or `?` (plus any closing quotes or
/// brackets) followed by whitespace or the end of the text, so decimals
/// like `2.5` stay intact. Text after the last boundary is kept as the final
/// segment; a reply without boundaries is a single segment.
pub fn split_sentences(reply: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut chars = reply.chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);
        if !is_terminal(c) {
            continue;
        }
        while let Some(&next) = chars.peek() {
            if is_terminal(next) || is_closing(next) {
                current.push(next);
                chars.next();
            } else {
                break;
            }
        }
        let at_boundary = match chars.peek() {
            None => true,
            Some(next) => next.is_whitespace(),
        };
        if at_boundary {
            push_segment(&mut segments, &current);
            current.clear();
        }
    }
    push_segment(&mut segments, &current);
    segments
}

fn push_segment(segments: &mut Vec<String>, text: &str) {
    let trimmed = text.trim();
    if !trimmed.is_empty() {
        segments.push(trimmed.to_string());
    }
}
