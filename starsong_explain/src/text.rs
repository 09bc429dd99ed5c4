// Word-level string utilities shared by the realizer and table validation.
//
// Everything here works on whole words: a word is a maximal run of
// alphanumeric characters, underscores and apostrophes, so `step_bias` and
// `today's` are single words while `mid-piece` is two. All functions are
// pure and allocation-light; none of them consult a locale.

use std::collections::BTreeMap;

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '\''
}

/// Split `text` into alternating word / non-word runs. The flag is true for
/// word runs. Concatenating the runs gives back `text`.
pub fn runs(text: &str) -> Vec<(&str, bool)> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut current: Option<bool> = None;
    for (i, c) in text.char_indices() {
        let word = is_word_char(c);
        match current {
            Some(prev) if prev != word => {
                out.push((&text[start..i], prev));
                start = i;
            }
            _ => {}
        }
        current = Some(word);
    }
    if let Some(word) = current {
        out.push((&text[start..], word));
    }
    out
}

/// Uppercase the first character, leaving the rest untouched.
pub fn capitalize_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Uppercase the first letter of the text and of every sentence after a
/// period.
pub fn capitalize_sentences(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut sentence_start = true;
    for c in s.chars() {
        if sentence_start && c.is_alphabetic() {
            out.extend(c.to_uppercase());
            sentence_start = false;
            continue;
        }
        if c.is_alphanumeric() {
            sentence_start = false;
        }
        if c == '.' {
            sentence_start = true;
        }
        out.push(c);
    }
    out
}

/// Case-insensitive whole-word search.
pub fn contains_word(text: &str, word: &str) -> bool {
    runs(text)
        .into_iter()
        .any(|(run, is_word)| is_word && run.eq_ignore_ascii_case(word))
}

/// Replace whole words using `synonyms` (lowercase key -> replacement).
///
/// A word matches when it equals a key exactly or equals the key with its
/// first letter capitalized; in the second case the replacement is
/// capitalized too. Anything else (ALL CAPS, mixed case) is left alone.
pub fn substitute_words(text: &str, synonyms: &BTreeMap<String, String>) -> String {
    if synonyms.is_empty() {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    for (run, is_word) in runs(text) {
        if !is_word {
            out.push_str(run);
            continue;
        }
        if let Some(replacement) = synonyms.get(run) {
            out.push_str(replacement);
            continue;
        }
        let lowered = lowercase_first(run);
        match synonyms.get(&lowered) {
            Some(replacement) if lowered != run && capitalize_first(&lowered) == run => {
                out.push_str(&capitalize_first(replacement));
            }
            _ => out.push_str(run),
        }
    }
    out
}

fn lowercase_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Clip `text` to at most `max_chars` characters.
///
/// Cuts after the last complete sentence that fits. Without one, cuts at the
/// last word boundary and drops trailing separators. A single overlong word
/// is hard-cut.
pub fn truncate(text: &str, max_chars: usize) -> String {
    let Some((cut, _)) = text.char_indices().nth(max_chars) else {
        return text.to_string();
    };
    let head = &text[..cut];

    let sentence_end = head
        .match_indices('.')
        .map(|(i, _)| i)
        .filter(|&i| {
            text[i + 1..]
                .chars()
                .next()
                .is_none_or(char::is_whitespace)
        })
        .last();
    if let Some(i) = sentence_end {
        return text[..=i].to_string();
    }

    let word_end = if text[cut..].starts_with(char::is_whitespace) {
        Some(cut)
    } else {
        head.rfind(char::is_whitespace)
    };
    match word_end {
        Some(i) => text[..i]
            .trim_end_matches(|c: char| c.is_whitespace() || matches!(c, ',' | ';' | ':'))
            .to_string(),
        None => head.to_string(),
    }
}

/// Placeholder names (`{name}`) used in a template, in order of appearance.
/// `Err` carries the unterminated remainder when a brace is never closed.
pub fn placeholders(template: &str) -> Result<Vec<&str>, &str> {
    let mut names = Vec::new();
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            return Err(&rest[open..]);
        };
        names.push(&after[..close]);
        rest = &after[close + 1..];
    }
    Ok(names)
}

/// Substitute `{name}` placeholders via `lookup`. Unknown names are left in
/// place.
pub fn fill_template<'a>(template: &str, lookup: impl Fn(&str) -> Option<&'a str>) -> String {
    let mut out = String::with_capacity(template.len() * 2);
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) => {
                let name = &after[..close];
                match lookup(name) {
                    Some(value) => out.push_str(value),
                    None => {
                        out.push('{');
                        out.push_str(name);
                        out.push('}');
                    }
                }
                rest = &after[close + 1..];
            }
            None => {
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}
