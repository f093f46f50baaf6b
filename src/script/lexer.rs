// src/script/lexer.rs

//! Tokenizer for transform scripts.

use super::ScriptError;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Identifiers and keywords; the parser tells them apart.
    Ident(String),
    Str(String),
    Num(f64),
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Dot,
    Comma,
    Semi,
    Colon,
    Assign,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Not,
    And,
    Or,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
}

pub fn tokenize(source: &str) -> Result<Vec<Token>, ScriptError> {
    let mut tokens = Vec::new();
    let mut chars = source.chars().peekable();
    let mut line = 1;

    let syntax = |line: usize, message: String| ScriptError::Syntax { line, message };

    while let Some(&ch) = chars.peek() {
        let kind = match ch {
            '\n' => {
                line += 1;
                chars.next();
                continue;
            }
            c if c.is_whitespace() => {
                chars.next();
                continue;
            }
            '/' => {
                chars.next();
                if chars.peek() == Some(&'/') {
                    while let Some(&c) = chars.peek() {
                        if c == '\n' {
                            break;
                        }
                        chars.next();
                    }
                    continue;
                }
                TokenKind::Slash
            }
            '"' | '\'' => {
                let quote = ch;
                chars.next();
                let mut s = String::new();
                loop {
                    match chars.next() {
                        Some(c) if c == quote => break,
                        Some('\\') => {
                            let escaped = match chars.next() {
                                Some('n') => '\n',
                                Some('t') => '\t',
                                Some('r') => '\r',
                                Some('0') => '\0',
                                Some('\\') => '\\',
                                Some('"') => '"',
                                Some('\'') => '\'',
                                Some(other) => {
                                    return Err(syntax(
                                        line,
                                        format!("unknown escape sequence '\\{other}'"),
                                    ));
                                }
                                None => return Err(syntax(line, "unterminated string".into())),
                            };
                            s.push(escaped);
                        }
                        Some('\n') => {
                            return Err(syntax(line, "newline in string literal".into()));
                        }
                        Some(c) => s.push(c),
                        None => return Err(syntax(line, "unterminated string".into())),
                    }
                }
                TokenKind::Str(s)
            }
            c if c.is_ascii_digit() => {
                let mut text = String::new();
                let mut seen_dot = false;
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_digit() {
                        text.push(c);
                    } else if c == '.' && !seen_dot {
                        // `1.` followed by an identifier is member access, not a fraction.
                        let mut ahead = chars.clone();
                        ahead.next();
                        if !ahead.peek().is_some_and(|d| d.is_ascii_digit()) {
                            break;
                        }
                        seen_dot = true;
                        text.push(c);
                    } else {
                        break;
                    }
                    chars.next();
                }
                let n = text
                    .parse::<f64>()
                    .map_err(|e| syntax(line, format!("invalid number '{text}': {e}")))?;
                TokenKind::Num(n)
            }
            c if c.is_alphabetic() || c == '_' || c == '$' => {
                let mut ident = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_alphanumeric() || c == '_' || c == '$' {
                        ident.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                TokenKind::Ident(ident)
            }
            _ => {
                chars.next();
                let next_is = |chars: &mut std::iter::Peekable<std::str::Chars<'_>>, want: char| {
                    if chars.peek() == Some(&want) {
                        chars.next();
                        true
                    } else {
                        false
                    }
                };
                match ch {
                    '(' => TokenKind::LParen,
                    ')' => TokenKind::RParen,
                    '[' => TokenKind::LBracket,
                    ']' => TokenKind::RBracket,
                    '{' => TokenKind::LBrace,
                    '}' => TokenKind::RBrace,
                    '.' => TokenKind::Dot,
                    ',' => TokenKind::Comma,
                    ';' => TokenKind::Semi,
                    ':' => TokenKind::Colon,
                    '+' => TokenKind::Plus,
                    '-' => TokenKind::Minus,
                    '*' => TokenKind::Star,
                    '%' => TokenKind::Percent,
                    '=' if next_is(&mut chars, '=') => TokenKind::Eq,
                    '=' => TokenKind::Assign,
                    '!' if next_is(&mut chars, '=') => TokenKind::Ne,
                    '!' => TokenKind::Not,
                    '<' if next_is(&mut chars, '=') => TokenKind::Le,
                    '<' => TokenKind::Lt,
                    '>' if next_is(&mut chars, '=') => TokenKind::Ge,
                    '>' => TokenKind::Gt,
                    '&' if next_is(&mut chars, '&') => TokenKind::And,
                    '|' if next_is(&mut chars, '|') => TokenKind::Or,
                    other => {
                        return Err(syntax(line, format!("unexpected character '{other}'")));
                    }
                }
            }
        };
        tokens.push(Token { kind, line });
    }

    tokens.push(Token {
        kind: TokenKind::Eof,
        line,
    });
    Ok(tokens)
}
