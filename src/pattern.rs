//! Route templates compiled into matchers.
//!
//! A template such as `/api/order/{uuid}` is split once, at registration,
//! into literal runs and placeholders. Matching is anchored at both ends and
//! behaves like the regular expression obtained by replacing each
//! `{name}` with `([A-Za-z0-9_=\-]+)`:
//!
//! - a placeholder never spans a `/`, a space or any other character outside
//!   that class;
//! - placeholders are greedy and give characters back when the rest of the
//!   template needs them, so `/{a}-{b}` splits `x-y-z` as `("x-y", "z")`.
//!
//! Values are positional. Placeholder names only document the template.

use std::fmt;

#[derive(Clone, Debug, Eq, PartialEq)]
enum Token {
    Literal(String),
    Capture,
}

/// A compiled route template.
#[derive(Clone, Eq, PartialEq)]
pub struct PathPattern {
    source: String,
    tokens: Vec<Token>,
}

impl PathPattern {
    pub fn compile(source: &str) -> Self {
        let mut tokens = Vec::new();
        let mut literal = String::new();
        let mut rest = source;

        while let Some(open) = rest.find('{') {
            let after = &rest[open + 1..];
            match after.find('}') {
                Some(close) if is_placeholder_name(&after[..close]) => {
                    literal.push_str(&rest[..open]);
                    if !literal.is_empty() {
                        tokens.push(Token::Literal(std::mem::take(&mut literal)));
                    }
                    tokens.push(Token::Capture);
                    rest = &after[close + 1..];
                }
                // Not a placeholder: keep the brace as a literal character.
                _ => {
                    literal.push_str(&rest[..=open]);
                    rest = after;
                }
            }
        }
        literal.push_str(rest);
        if !literal.is_empty() {
            tokens.push(Token::Literal(literal));
        }

        Self { source: source.to_owned(), tokens }
    }

    /// The template as registered.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Number of placeholders.
    pub fn arity(&self) -> usize {
        self.tokens.iter().filter(|t| matches!(t, Token::Capture)).count()
    }

    /// Matches the whole of `path`, returning captured values left to right.
    pub fn captures(&self, path: &str) -> Option<Vec<String>> {
        let table = self.viable(path)?;
        Some(table.walk(&self.tokens, path).into_iter().map(str::to_owned).collect())
    }

    pub fn is_match(&self, path: &str) -> bool {
        self.viable(path).is_some()
    }

    /// The suffix table for `path`, or `None` when the template cannot match.
    fn viable(&self, path: &str) -> Option<Viable> {
        if let Some(Token::Literal(head)) = self.tokens.first() {
            if !path.starts_with(head.as_str()) {
                return None;
            }
        }
        let table = Viable::build(&self.tokens, path.as_bytes());
        table.get(0, 0).then_some(table)
    }
}

impl fmt::Debug for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PathPattern").field(&self.source).finish()
    }
}

fn is_placeholder_name(name: &str) -> bool {
    !name.is_empty() && name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

fn is_capture_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'_' | b'=' | b'-')
}

/// `get(i, o)` is true when `tokens[i..]` matches `path[o..]` exactly.
///
/// Filled right to left, each `(token, offset)` cell once, so matching costs
/// O(path length × template length) whatever the input.
struct Viable {
    width: usize,
    cells: Vec<bool>,
}

impl Viable {
    fn build(tokens: &[Token], path: &[u8]) -> Self {
        let width = path.len() + 1;
        let mut cells = vec![false; (tokens.len() + 1) * width];
        cells[tokens.len() * width + path.len()] = true;

        for (i, token) in tokens.iter().enumerate().rev() {
            let (here, next) = cells[i * width..].split_at_mut(width);
            match token {
                Token::Literal(lit) => {
                    let lit = lit.as_bytes();
                    for o in 0..width {
                        here[o] = path[o..].starts_with(lit) && next[o + lit.len()];
                    }
                }
                // One or more capture bytes, then the rest of the template.
                Token::Capture => {
                    for o in (0..path.len()).rev() {
                        here[o] = is_capture_byte(path[o]) && (next[o + 1] || here[o + 1]);
                    }
                }
            }
        }

        Self { width, cells }
    }

    fn get(&self, token: usize, offset: usize) -> bool {
        self.cells[token * self.width + offset]
    }

    /// Extracts the captures of a matching path. Each placeholder takes the
    /// longest run that still lets the rest of the template match.
    fn walk<'p>(&self, tokens: &[Token], path: &'p str) -> Vec<&'p str> {
        let bytes = path.as_bytes();
        let mut found = Vec::new();
        let mut offset = 0;

        for (i, token) in tokens.iter().enumerate() {
            match token {
                Token::Literal(lit) => offset += lit.len(),
                Token::Capture => {
                    let run = bytes[offset..].iter().take_while(|&&b| is_capture_byte(b)).count();
                    let len = (1..=run).rev().find(|&len| self.get(i + 1, offset + len)).unwrap_or(run);
                    // Capture bytes are ASCII, so both ends are char boundaries.
                    found.push(&path[offset..offset + len]);
                    offset += len;
                }
            }
        }
        found
    }
}
