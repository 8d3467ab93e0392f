use super::DiagnosticKind;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Token<'a> {
    /// `$keyword`, without the `$`.
    Block(&'a str),
    /// `.keyword`, without the `.`.
    Statement(&'a str),
    /// Decimal or `$hex` number.
    Number(u32),
    /// Contents of a `'quoted'` string.
    Str(&'a str),
    /// Any other run of non blank chars, e.g. `absolute/14` or `R1`.
    Word(&'a str),
}

impl<'a> Token<'a> {
    pub fn describe(&self) -> String {
        match self {
            Token::Block(kw) => format!("${kw}"),
            Token::Statement(kw) => format!(".{kw}"),
            Token::Number(val) => val.to_string(),
            Token::Str(text) => format!("'{text}'"),
            Token::Word(word) => word.to_string(),
        }
    }
}

/// Removes the `;` comment from `line`, if any.
pub fn strip_comment(line: &str) -> &str {
    let mut in_str = false;
    for (idx, c) in line.char_indices() {
        match c {
            '\'' => in_str = !in_str,
            ';' if !in_str => return &line[..idx],
            _ => (),
        }
    }

    line
}

/// Splits one BCL line into tokens.
///
/// Comments are skipped. Returns an empty list for blank & comment lines.
pub fn tokenize(line: &str) -> Result<Vec<Token<'_>>, DiagnosticKind> {
    let line = strip_comment(line);
    let mut tokens = Vec::new();
    let mut rest = line.trim_start();

    while !rest.is_empty() {
        if let Some(quoted) = rest.strip_prefix('\'') {
            let end = quoted
                .find('\'')
                .ok_or(DiagnosticKind::UnterminatedString)?;
            tokens.push(Token::Str(&quoted[..end]));
            rest = quoted[end + 1..].trim_start();
            continue;
        }

        let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        let raw = &rest[..end];
        rest = rest[end..].trim_start();

        tokens.push(classify(raw)?);
    }

    Ok(tokens)
}

fn classify(raw: &str) -> Result<Token<'_>, DiagnosticKind> {
    let malformed = || DiagnosticKind::MalformedOperand {
        operand: "number",
        found: raw.to_string(),
    };

    if let Some(name) = raw.strip_prefix('$') {
        if !name.is_empty() && name.chars().all(|c| c.is_ascii_hexdigit()) {
            return u32::from_str_radix(name, 16)
                .map(Token::Number)
                .map_err(|_| malformed());
        }
        return Ok(Token::Block(name));
    }

    if let Some(name) = raw.strip_prefix('.') {
        if !name.is_empty() && !name.starts_with(|c: char| c.is_ascii_digit()) {
            return Ok(Token::Statement(name));
        }
    }

    if raw.chars().all(|c| c.is_ascii_digit()) {
        return raw.parse().map(Token::Number).map_err(|_| malformed());
    }

    Ok(Token::Word(raw))
}
