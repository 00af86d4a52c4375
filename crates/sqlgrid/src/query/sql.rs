//! SQL text helpers: literal/identifier quoting and keyword search that
//! skips quoted regions and subexpressions.

/// Quote a value as a SQL string literal, doubling embedded single quotes.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Quote an identifier only when it is not a plain word.
///
/// `severity` stays `severity`; `alarm time` becomes `"alarm time"`.
pub fn quote_identifier(name: &str) -> String {
    if is_plain_identifier(name) {
        name.to_string()
    } else {
        format!("\"{}\"", name.replace('"', "\"\""))
    }
}

fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Per-byte mask of the parts of `text` that are at the top level: outside
/// string literals, quoted identifiers and parentheses.
fn top_level_mask(text: &str) -> Vec<bool> {
    let bytes = text.as_bytes();
    let mut mask = vec![true; bytes.len()];
    let mut close: Option<u8> = None;
    let mut depth = 0usize;
    for (i, &b) in bytes.iter().enumerate() {
        match close {
            Some(c) => {
                mask[i] = false;
                if b == c {
                    close = None;
                }
            }
            None => {
                match b {
                    b'\'' | b'"' | b'`' => close = Some(b),
                    b'[' => close = Some(b']'),
                    b'(' => depth += 1,
                    b')' => depth = depth.saturating_sub(1),
                    _ => {}
                }
                mask[i] = depth == 0 && close.is_none() && b != b')';
            }
        }
    }
    mask
}

/// Find a top-level keyword (possibly several words, e.g. `"order by"`),
/// case-insensitively and on word boundaries. Quoted text and anything
/// inside parentheses is skipped.
///
/// Returns the byte range of the match. Words may be separated by any run of
/// whitespace.
pub fn find_keyword(text: &str, keyword: &str) -> Option<(usize, usize)> {
    find_keyword_from(text, keyword, 0)
}

/// Like [`find_keyword`], starting the search at byte `from`.
pub fn find_keyword_from(text: &str, keyword: &str, from: usize) -> Option<(usize, usize)> {
    let bytes = text.as_bytes();
    let mask = top_level_mask(text);
    let words: Vec<&str> = keyword.split_whitespace().collect();
    if words.is_empty() {
        return None;
    }

    let mut start = from;
    while start < bytes.len() {
        if mask[start] && (start == 0 || !is_word_byte(bytes[start - 1])) {
            if let Some(end) = match_words(bytes, &mask, start, &words) {
                return Some((start, end));
            }
        }
        start += 1;
    }
    None
}

fn match_words(bytes: &[u8], mask: &[bool], start: usize, words: &[&str]) -> Option<usize> {
    let mut pos = start;
    for (i, word) in words.iter().enumerate() {
        if i > 0 {
            let ws_start = pos;
            while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
                pos += 1;
            }
            if pos == ws_start {
                return None;
            }
        }
        let w = word.as_bytes();
        let end = pos + w.len();
        if end > bytes.len() || !mask[pos..end].iter().all(|m| *m) {
            return None;
        }
        if !bytes[pos..end].eq_ignore_ascii_case(w) {
            return None;
        }
        pos = end;
    }
    if pos < bytes.len() && is_word_byte(bytes[pos]) {
        return None;
    }
    Some(pos)
}

/// Whether the statement starts with the given keyword (ignoring leading
/// whitespace and case).
pub fn starts_with_keyword(sql: &str, keyword: &str) -> bool {
    let trimmed = sql.trim_start();
    matches!(find_keyword(trimmed, keyword), Some((0, _)))
}

/// Split `text` on a keyword that occurs at the top level.
pub fn split_on_keyword<'a>(text: &'a str, keyword: &str) -> Vec<&'a str> {
    let mut parts = Vec::new();
    let mut last = 0;
    let mut from = 0;
    while let Some((start, end)) = find_keyword_from(text, keyword, from) {
        parts.push(&text[last..start]);
        last = end;
        from = end;
    }
    parts.push(&text[last..]);
    parts
}

/// Read one identifier token at the start of `text` (after whitespace).
///
/// Returns the raw token as written and the remaining text. Quoted
/// identifiers and dotted names (`main.events`) are kept together.
pub fn leading_identifier(text: &str) -> Option<(&str, &str)> {
    let trimmed = text.trim_start();
    let offset = text.len() - trimmed.len();
    let bytes = trimmed.as_bytes();
    let mut pos = 0;

    loop {
        match bytes.get(pos) {
            Some(b'"') | Some(b'`') | Some(b'[') => {
                let close = match bytes[pos] {
                    b'[' => b']',
                    q => q,
                };
                let end = bytes[pos + 1..].iter().position(|b| *b == close)?;
                pos += end + 2;
            }
            Some(b) if is_word_byte(*b) => {
                while pos < bytes.len() && is_word_byte(bytes[pos]) {
                    pos += 1;
                }
            }
            _ => return None,
        }
        if bytes.get(pos) == Some(&b'.') {
            pos += 1;
            continue;
        }
        break;
    }

    let token = &text[offset..offset + pos];
    Some((token, &text[offset + pos..]))
}

/// Strip quoting from an identifier token and keep only its last dotted part.
pub fn unqualified_name(token: &str) -> String {
    let last = split_dotted(token).pop().unwrap_or_default();
    unquote_identifier(&last)
}

fn split_dotted(token: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut close: Option<char> = None;
    for c in token.chars() {
        match close {
            Some(q) => {
                current.push(c);
                if c == q {
                    close = None;
                }
            }
            None => match c {
                '.' => parts.push(std::mem::take(&mut current)),
                '"' | '`' => {
                    close = Some(c);
                    current.push(c);
                }
                '[' => {
                    close = Some(']');
                    current.push(c);
                }
                _ => current.push(c),
            },
        }
    }
    parts.push(current);
    parts
}

fn unquote_identifier(token: &str) -> String {
    let t = token.trim();
    if t.len() >= 2 {
        let first = t.as_bytes()[0];
        let last = t.as_bytes()[t.len() - 1];
        match (first, last) {
            (b'"', b'"') => return t[1..t.len() - 1].replace("\"\"", "\""),
            (b'`', b'`') => return t[1..t.len() - 1].replace("``", "`"),
            (b'[', b']') => return t[1..t.len() - 1].to_string(),
            _ => {}
        }
    }
    t.to_string()
}

/// Parse `column='literal'` exactly as [`quote_identifier`] and
/// [`quote_literal`] would render it.
pub fn parse_equality(predicate: &str) -> Option<(String, String)> {
    let (ident, rest) = leading_identifier(predicate)?;
    if ident.len() != predicate.len() - rest.len() {
        return None;
    }
    let column = unquote_identifier(ident);
    let literal = rest.strip_prefix('=')?;
    let inner = literal.strip_prefix('\'')?.strip_suffix('\'')?;

    // A lone quote inside means the literal ended early.
    let value = inner.replace("''", "'");
    if quote_literal(&value) != literal {
        return None;
    }
    Some((column, value))
}
