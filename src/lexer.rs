//! Lexer for SPL source text
//!
//! Hand-written scanner producing a flat token stream with source
//! ranges. Unknown characters are reported and skipped; lexing aborts
//! once five errors have accumulated. Comments are `//` to end of line
//! and non-nested `/* ... */`.

use crate::ast::{CodePos, CodeRange};
use crate::errors::CompilerError;

/// Lexing stops after this many errors
pub const MAX_LEX_ERRORS: usize = 5;

const KEYWORDS: &[&str] = &[
    "True", "False", "if", "else", "while", "return", "var", "Int", "Bool", "Char", "Void",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Operator,
    Identifier,
    Keyword,
    ParenOpen,    // (
    ParenClose,   // )
    CurlyOpen,    // {
    CurlyClose,   // }
    BracketOpen,  // [
    BracketClose, // ]
    Int,
    Char,
    Str,
    Semicolon,
    Comma,
    Dot,
    DoubleColon,
    Arrow,
    Eof,
    Unexpected,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Token text; char and string tokens hold the decoded content
    pub text: String,
    pub range: CodeRange,
}

impl Token {
    fn new(kind: TokenKind, text: impl Into<String>, range: CodeRange) -> Self {
        Token {
            kind,
            text: text.into(),
            range,
        }
    }
}

struct Lexer {
    chars: Vec<char>,
    index: usize,
    line: usize,
    col: usize,
}

/// Lex the whole input, returning the token stream (always terminated by
/// an `Eof` token) and any accumulated errors
pub fn lex(source: &str) -> (Vec<Token>, Vec<CompilerError>) {
    let mut lexer = Lexer {
        chars: source.chars().collect(),
        index: 0,
        line: 1,
        col: 1,
    };
    let mut tokens = Vec::new();
    let mut errors = Vec::new();
    loop {
        let token = lexer.next_token(&mut errors);
        let done = token.kind == TokenKind::Eof;
        tokens.push(token);
        if done || errors.len() >= MAX_LEX_ERRORS {
            break;
        }
    }
    if tokens.last().map(|t| t.kind) != Some(TokenKind::Eof) {
        let pos = lexer.pos();
        tokens.push(Token::new(TokenKind::Eof, "", CodeRange::new(pos, pos)));
    }
    (tokens, errors)
}

impl Lexer {
    fn pos(&self) -> CodePos {
        CodePos::new(self.line, self.col)
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.index).copied()
    }

    fn peek_at(&self, ahead: usize) -> Option<char> {
        self.chars.get(self.index + ahead).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.index += 1;
        if c == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(c)
    }

    fn range_from(&self, start: CodePos) -> CodeRange {
        CodeRange::new(start, self.pos())
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some('/') if self.peek_at(1) == Some('/') => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                Some('/') if self.peek_at(1) == Some('*') => {
                    self.bump();
                    self.bump();
                    // not nested; an unterminated comment runs to end of input
                    while let Some(c) = self.bump() {
                        if c == '*' && self.peek() == Some('/') {
                            self.bump();
                            break;
                        }
                    }
                }
                _ => break,
            }
        }
    }

    fn next_token(&mut self, errors: &mut Vec<CompilerError>) -> Token {
        self.skip_whitespace_and_comments();
        let start = self.pos();
        let Some(c) = self.peek() else {
            let mut end = start;
            end.col += 1;
            return Token::new(TokenKind::Eof, "", CodeRange::new(start, end));
        };

        if c.is_ascii_digit() {
            return self.lex_number(start);
        }
        if c.is_ascii_alphabetic() || c == '_' {
            return self.lex_word(start, errors);
        }
        match c {
            '\'' => return self.lex_char(start, errors),
            '"' => return self.lex_string(start, errors),
            _ => {}
        }

        // fixed two-character sequences first
        if let Some(next) = self.peek_at(1) {
            let kind = match (c, next) {
                (':', ':') => Some(TokenKind::DoubleColon),
                ('-', '>') => Some(TokenKind::Arrow),
                ('=', '=') | ('<', '=') | ('>', '=') | ('!', '=') | ('&', '&') | ('|', '|') => {
                    Some(TokenKind::Operator)
                }
                _ => None,
            };
            if let Some(kind) = kind {
                self.bump();
                self.bump();
                let text: String = [c, next].iter().collect();
                return Token::new(kind, text, self.range_from(start));
            }
        }

        let kind = match c {
            '(' => Some(TokenKind::ParenOpen),
            ')' => Some(TokenKind::ParenClose),
            '{' => Some(TokenKind::CurlyOpen),
            '}' => Some(TokenKind::CurlyClose),
            '[' => Some(TokenKind::BracketOpen),
            ']' => Some(TokenKind::BracketClose),
            ';' => Some(TokenKind::Semicolon),
            ',' => Some(TokenKind::Comma),
            '.' => Some(TokenKind::Dot),
            '+' | '-' | '*' | '/' | '%' | '<' | '>' | '=' | '!' | ':' => Some(TokenKind::Operator),
            _ => None,
        };
        self.bump();
        match kind {
            Some(kind) => Token::new(kind, c.to_string(), self.range_from(start)),
            None => {
                let range = self.range_from(start);
                errors.push(CompilerError::UnexpectedChar { ch: c, range });
                Token::new(TokenKind::Unexpected, c.to_string(), range)
            }
        }
    }

    fn lex_number(&mut self, start: CodePos) -> Token {
        let mut text = String::new();
        while let Some(c) = self.peek() {
            if !c.is_ascii_digit() {
                break;
            }
            text.push(c);
            self.bump();
        }
        Token::new(TokenKind::Int, text, self.range_from(start))
    }

    fn lex_word(&mut self, start: CodePos, errors: &mut Vec<CompilerError>) -> Token {
        let mut text = String::new();
        while self.peek() == Some('_') {
            text.push('_');
            self.bump();
        }
        // identifiers need a letter after any leading underscores
        if !self.peek().is_some_and(|c| c.is_ascii_alphabetic()) {
            let range = self.range_from(start);
            errors.push(CompilerError::UnexpectedChar { ch: '_', range });
            return Token::new(TokenKind::Unexpected, text, range);
        }
        while let Some(c) = self.peek() {
            if !c.is_ascii_alphanumeric() && c != '_' {
                break;
            }
            text.push(c);
            self.bump();
        }
        let kind = if KEYWORDS.contains(&text.as_str()) {
            TokenKind::Keyword
        } else {
            TokenKind::Identifier
        };
        Token::new(kind, text, self.range_from(start))
    }

    fn lex_char(&mut self, start: CodePos, errors: &mut Vec<CompilerError>) -> Token {
        self.bump(); // opening quote
        let value = match self.peek() {
            Some('\\') => {
                self.bump();
                self.bump().map(unescape)
            }
            Some(c) if c != '\'' && c != '\n' => {
                self.bump();
                Some(c)
            }
            _ => None,
        };
        let closed = self.peek() == Some('\'');
        if closed {
            self.bump();
        }
        match value {
            Some(c) if closed => Token::new(TokenKind::Char, c.to_string(), self.range_from(start)),
            _ => {
                let range = self.range_from(start);
                errors.push(CompilerError::UnterminatedChar { range });
                Token::new(TokenKind::Unexpected, "'", range)
            }
        }
    }

    fn lex_string(&mut self, start: CodePos, errors: &mut Vec<CompilerError>) -> Token {
        self.bump(); // opening quote
        let mut text = String::new();
        loop {
            match self.peek() {
                None => {
                    let range = self.range_from(start);
                    errors.push(CompilerError::UnterminatedString { range });
                    return Token::new(TokenKind::Unexpected, text, range);
                }
                Some('"') => {
                    self.bump();
                    return Token::new(TokenKind::Str, text, self.range_from(start));
                }
                Some('\\') => {
                    self.bump();
                    if let Some(c) = self.bump() {
                        text.push(unescape(c));
                    }
                }
                Some(c) => {
                    text.push(c);
                    self.bump();
                }
            }
        }
    }
}

fn unescape(c: char) -> char {
    match c {
        'n' => '\n',
        't' => '\t',
        'r' => '\r',
        '0' => '\0',
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        let (tokens, errors) = lex(source);
        assert!(errors.is_empty(), "unexpected lex errors: {:?}", errors);
        tokens.iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_simple_declaration() {
        let ks = kinds("var x = 12;");
        assert_eq!(
            ks,
            vec![
                TokenKind::Keyword,
                TokenKind::Identifier,
                TokenKind::Operator,
                TokenKind::Int,
                TokenKind::Semicolon,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_operators_and_arrows() {
        let (tokens, errors) = lex(":: -> == <= != && || : - < .");
        assert!(errors.is_empty());
        let kinds: Vec<TokenKind> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::DoubleColon,
                TokenKind::Arrow,
                TokenKind::Operator,
                TokenKind::Operator,
                TokenKind::Operator,
                TokenKind::Operator,
                TokenKind::Operator,
                TokenKind::Operator,
                TokenKind::Operator,
                TokenKind::Operator,
                TokenKind::Dot,
                TokenKind::Eof,
            ]
        );
        assert_eq!(tokens[7].text, ":");
        assert_eq!(tokens[8].text, "-");
    }

    #[test]
    fn test_comments_and_positions() {
        let source = "// leading\nx /* mid\nline */ y";
        let (tokens, errors) = lex(source);
        assert!(errors.is_empty());
        assert_eq!(tokens[0].text, "x");
        assert_eq!(tokens[0].range.start.line, 2);
        assert_eq!(tokens[1].text, "y");
        assert_eq!(tokens[1].range.start.line, 3);
    }

    #[test]
    fn test_char_and_string_literals() {
        let (tokens, errors) = lex(r#"'a' '\n' "hi\n""#);
        assert!(errors.is_empty());
        assert_eq!(tokens[0].kind, TokenKind::Char);
        assert_eq!(tokens[0].text, "a");
        assert_eq!(tokens[1].text, "\n");
        assert_eq!(tokens[2].kind, TokenKind::Str);
        assert_eq!(tokens[2].text, "hi\n");
    }

    #[test]
    fn test_keywords_vs_identifiers() {
        let (tokens, _) = lex("if iffy True Truthy");
        assert_eq!(tokens[0].kind, TokenKind::Keyword);
        assert_eq!(tokens[1].kind, TokenKind::Identifier);
        assert_eq!(tokens[2].kind, TokenKind::Keyword);
        assert_eq!(tokens[3].kind, TokenKind::Identifier);
    }

    #[test]
    fn test_unexpected_char_reported() {
        let (tokens, errors) = lex("x # y");
        assert_eq!(errors.len(), 1);
        assert!(matches!(
            errors[0],
            CompilerError::UnexpectedChar { ch: '#', .. }
        ));
        assert!(tokens.iter().any(|t| t.kind == TokenKind::Unexpected));
    }

    #[test]
    fn test_error_limit() {
        let (_, errors) = lex("# # # # # # # #");
        assert_eq!(errors.len(), MAX_LEX_ERRORS);
    }

    #[test]
    fn test_unterminated_string() {
        let (_, errors) = lex("\"abc");
        assert!(matches!(
            errors[0],
            CompilerError::UnterminatedString { .. }
        ));
    }

    #[test]
    fn test_underscored_identifier() {
        let (tokens, errors) = lex("__add _x");
        assert!(errors.is_empty());
        assert_eq!(tokens[0].kind, TokenKind::Identifier);
        assert_eq!(tokens[0].text, "__add");
        assert_eq!(tokens[1].text, "_x");
    }
}
