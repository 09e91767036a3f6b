// ── EdgeOS config.boot editing ──
//
// Just enough of a scanner for the curly-brace config format to find one
// setting: `system { flow-accounting { netflow { server <ipv4> ... } } }`.
// The document is held as raw text and every read re-scans it, so the
// byte span of the located value always refers to the current text.

use std::fmt;
use std::fs;
use std::net::Ipv4Addr;
use std::ops::Range;
use std::path::Path;

use thiserror::Error;

use crate::error::CoreError;
use crate::files;

/// Block path that encloses the collector address.
const NETFLOW_BLOCK: [&str; 3] = ["system", "flow-accounting", "netflow"];
const SERVER_KEY: &str = "server";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EditError {
    #[error("netflow server setting not present")]
    NotFound,
}

/// Result of [`ConfigDocument::set_value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    /// The document already carried the requested address; no bytes changed.
    Unchanged,
    /// The address literal was replaced.
    Rewritten { previous: Ipv4Addr },
}

/// The located collector address and where its literal sits in the text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetflowServer {
    pub address: Ipv4Addr,
    pub span: Range<usize>,
}

/// A device configuration file, kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigDocument {
    raw_text: String,
}

impl ConfigDocument {
    pub fn new(raw_text: impl Into<String>) -> Self {
        Self {
            raw_text: raw_text.into(),
        }
    }

    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let raw_text = fs::read_to_string(path).map_err(|e| CoreError::io(path, e))?;
        Ok(Self { raw_text })
    }

    /// Atomically replace `path` with the current text.
    pub fn save(&self, path: &Path) -> Result<(), CoreError> {
        files::write_atomic(path, self.raw_text.as_bytes())
    }

    pub fn as_str(&self) -> &str {
        &self.raw_text
    }

    /// First `server <ipv4>` statement directly inside
    /// `system > flow-accounting > netflow`.
    pub fn find(&self) -> Option<NetflowServer> {
        let text = self.raw_text.as_str();
        let mut blocks: Vec<&str> = Vec::new();
        let mut statement: Vec<&Token> = Vec::new();
        let tokens = tokenize(text);

        for token in &tokens {
            match token.kind {
                TokenKind::Word | TokenKind::Quoted => {
                    statement.push(token);
                    continue;
                }
                TokenKind::LineEnd | TokenKind::Open | TokenKind::Close => {}
            }

            if let Some(found) = match_server(text, &blocks, &statement) {
                return Some(found);
            }
            match token.kind {
                TokenKind::Open => {
                    blocks.push(statement.first().map_or("", |t| t.text(text)));
                }
                TokenKind::Close => {
                    blocks.pop();
                }
                _ => {}
            }
            statement.clear();
        }

        match_server(text, &blocks, &statement)
    }

    /// Point the collector at `value`, touching only the address literal.
    pub fn set_value(&mut self, value: Ipv4Addr) -> Result<Change, EditError> {
        let found = self.find().ok_or(EditError::NotFound)?;
        if found.address == value {
            return Ok(Change::Unchanged);
        }
        self.raw_text.replace_range(found.span, &value.to_string());
        Ok(Change::Rewritten {
            previous: found.address,
        })
    }
}

impl fmt::Display for ConfigDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw_text)
    }
}

fn match_server(text: &str, blocks: &[&str], statement: &[&Token]) -> Option<NetflowServer> {
    if blocks != NETFLOW_BLOCK.as_slice() {
        return None;
    }
    let [key, value, ..] = statement else {
        return None;
    };
    if key.kind != TokenKind::Word || key.text(text) != SERVER_KEY || value.kind != TokenKind::Word
    {
        return None;
    }
    let address = value.text(text).parse::<Ipv4Addr>().ok()?;
    Some(NetflowServer {
        address,
        span: value.span.clone(),
    })
}

// ── Scanner ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenKind {
    Word,
    Quoted,
    Open,
    Close,
    LineEnd,
}

#[derive(Debug)]
struct Token {
    kind: TokenKind,
    span: Range<usize>,
}

impl Token {
    /// Token text; quoted strings without their quotes.
    fn text<'a>(&self, source: &'a str) -> &'a str {
        let raw = source.get(self.span.clone()).unwrap_or_default();
        match self.kind {
            TokenKind::Quoted => raw
                .strip_prefix('"')
                .map_or(raw, |s| s.strip_suffix('"').unwrap_or(s)),
            _ => raw,
        }
    }
}

fn is_delimiter(b: u8) -> bool {
    b.is_ascii_whitespace() || matches!(b, b'{' | b'}' | b'"')
}

// Every delimiter is ASCII, so spans always fall on char boundaries.
fn tokenize(text: &str) -> Vec<Token> {
    let bytes = text.as_bytes();
    let len = bytes.len();
    let mut tokens = Vec::new();
    let mut i = 0;

    while let Some(&b) = bytes.get(i) {
        match b {
            b'\n' => {
                tokens.push(Token {
                    kind: TokenKind::LineEnd,
                    span: i..i + 1,
                });
                i += 1;
            }
            b'{' | b'}' => {
                let kind = if b == b'{' {
                    TokenKind::Open
                } else {
                    TokenKind::Close
                };
                tokens.push(Token {
                    kind,
                    span: i..i + 1,
                });
                i += 1;
            }
            b'#' => {
                while bytes.get(i).is_some_and(|&c| c != b'\n') {
                    i += 1;
                }
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i = text
                    .get(i + 2..)
                    .and_then(|rest| rest.find("*/"))
                    .map_or(len, |end| i + 2 + end + 2);
            }
            b'"' => {
                let start = i;
                i += 1;
                while let Some(&c) = bytes.get(i) {
                    i += if c == b'\\' { 2 } else { 1 };
                    if c == b'"' {
                        break;
                    }
                }
                i = i.min(len);
                tokens.push(Token {
                    kind: TokenKind::Quoted,
                    span: start..i,
                });
            }
            c if c.is_ascii_whitespace() => i += 1,
            _ => {
                let start = i;
                while bytes.get(i).is_some_and(|&c| !is_delimiter(c)) {
                    i += 1;
                }
                tokens.push(Token {
                    kind: TokenKind::Word,
                    span: start..i,
                });
            }
        }
    }

    tokens
}
