//! Lightweight text normalization applied before chunking.
//!
//! Extracted PDF/DOCX text is full of NUL bytes, zero-width joiners and
//! ragged whitespace. None of that carries meaning for embeddings, and
//! leaving it in makes chunk windows uneven.

/// Zero-width space/joiners, directional marks, and the byte-order mark.
fn is_invisible(c: char) -> bool {
    matches!(c, '\u{200b}'..='\u{200f}' | '\u{feff}')
}

/// Normalize extracted text for embedding.
///
/// NUL becomes a space, invisible characters are dropped, and every run
/// of whitespace (newlines included) collapses to a single space. The
/// result is trimmed.
///
/// ```rust
/// use talk_to_docs_core::clean::clean_text;
///
/// assert_eq!(clean_text("  Hello\u{200b}\n\n\n\tworld\0 "), "Hello world");
/// ```
pub fn clean_text(text: &str) -> String {
    let stripped: String = text
        .chars()
        .filter(|c| !is_invisible(*c))
        .map(|c| if c == '\0' { ' ' } else { c })
        .collect();

    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}
