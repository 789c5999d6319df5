/// Iterator over the characters of a string that sit outside quotes and at
/// bracket depth zero.
///
/// An opening bracket at depth zero is yielded, as is the bracket that
/// closes it; nothing in between is. Quote characters are never yielded.
pub(crate) struct TopLevel<'a> {
    chars: std::str::CharIndices<'a>,
    depth: usize,
    quote: Option<char>,
    escaped: bool,
}

impl<'a> TopLevel<'a> {
    pub(crate) fn new(s: &'a str) -> Self {
        Self {
            chars: s.char_indices(),
            depth: 0,
            quote: None,
            escaped: false,
        }
    }
}

impl Iterator for TopLevel<'_> {
    type Item = (usize, char);

    fn next(&mut self) -> Option<Self::Item> {
        for (i, c) in self.chars.by_ref() {
            if let Some(q) = self.quote {
                if self.escaped {
                    self.escaped = false;
                } else if c == '\\' {
                    self.escaped = true;
                } else if c == q {
                    self.quote = None;
                }
                continue;
            }
            match c {
                '"' | '\'' => self.quote = Some(c),
                '(' | '[' | '{' => {
                    self.depth += 1;
                    if self.depth == 1 {
                        return Some((i, c));
                    }
                }
                ')' | ']' | '}' => {
                    self.depth = self.depth.saturating_sub(1);
                    if self.depth == 0 {
                        return Some((i, c));
                    }
                }
                _ if self.depth == 0 => return Some((i, c)),
                _ => {}
            }
        }
        None
    }
}

pub(crate) fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Split on a separator that appears outside quotes and brackets. Pieces
/// are trimmed; an all-blank input yields nothing.
pub(crate) fn split_top_level(s: &str, sep: char) -> Vec<&str> {
    if s.trim().is_empty() {
        return Vec::new();
    }
    let mut pieces = Vec::new();
    let mut start = 0;
    for (i, c) in TopLevel::new(s) {
        if c == sep {
            pieces.push(s[start..i].trim());
            start = i + c.len_utf8();
        }
    }
    pieces.push(s[start..].trim());
    pieces
}

/// Position of the first top-level occurrence of `pat`.
pub(crate) fn find_top_level(s: &str, pat: &str) -> Option<usize> {
    TopLevel::new(s)
        .map(|(i, _)| i)
        .find(|&i| s[i..].starts_with(pat))
}

/// Position of the first top-level occurrence of `word` as a whole word.
pub(crate) fn find_keyword(s: &str, word: &str) -> Option<usize> {
    TopLevel::new(s).map(|(i, _)| i).find(|&i| {
        s[i..].starts_with(word)
            && !s[..i].chars().next_back().is_some_and(is_ident_char)
            && !s[i + word.len()..].chars().next().is_some_and(is_ident_char)
    })
}

/// Position of a top-level assignment `=`, ignoring `==`, `!=`, `<=` and `>=`.
pub(crate) fn find_assign(s: &str) -> Option<usize> {
    TopLevel::new(s).map(|(i, _)| i).find(|&i| {
        s[i..].starts_with('=')
            && !s[i + 1..].starts_with('=')
            && !s[..i].ends_with(['=', '!', '<', '>'])
    })
}

/// Position of the bracket closing the one at `open`.
pub(crate) fn matching_close(s: &str, open: usize) -> Option<usize> {
    let (offset, c) = TopLevel::new(&s[open..]).nth(1)?;
    matches!(c, ')' | ']' | '}').then_some(open + offset)
}

/// Remove one pair of matching surrounding quotes, if present.
pub(crate) fn unquote(s: &str) -> &str {
    for q in ['"', '\''] {
        if let Some(inner) = s.strip_prefix(q).and_then(|r| r.strip_suffix(q)) {
            return inner;
        }
    }
    s
}
