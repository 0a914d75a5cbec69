//! Scanner for TADS 3 source text.
//!
//! This is the token source's concrete backend: a single-pass scanner with
//! no preprocessor. It produces the full token vocabulary of [`crate::token`],
//! including the Start/Mid/End segmentation of strings with `<<expr>>`
//! embeddings: the embedded expression's tokens are emitted between the
//! segments, and `>>` resumes the enclosing string.

use crate::token::{keyword, Token, TokenKind};
use tadsc_base::{ErrorCode, ErrorSink, FileId, Interner, SourcePos};

/// Scanner state for one source file.
pub struct Lexer<'s, 'i> {
    src: &'s [u8],
    pos: usize,
    line: u32,
    file: FileId,
    interner: &'i mut Interner,
    /// Stack of strings interrupted by `<<expr>>` embeddings. Each entry is
    /// the quote character that will resume the string when `>>` is seen.
    embeds: Vec<u8>,
}

impl<'s, 'i> Lexer<'s, 'i> {
    pub fn new(src: &'s str, file: FileId, interner: &'i mut Interner) -> Self {
        Lexer {
            src: src.as_bytes(),
            pos: 0,
            line: 1,
            file,
            interner,
            embeds: Vec::new(),
        }
    }

    /// Scans the whole file into a token list, logging lexical errors.
    pub fn tokenize(mut self, sink: &mut ErrorSink) -> Vec<Token> {
        let mut out = Vec::new();
        loop {
            let tok = self.scan_token(sink);
            let done = tok.kind == TokenKind::Eof;
            out.push(tok);
            if done {
                break;
            }
        }
        out
    }

    fn here(&self) -> SourcePos {
        SourcePos::new(self.file, self.line)
    }

    fn peek(&self) -> u8 {
        *self.src.get(self.pos).unwrap_or(&0)
    }

    fn peek2(&self) -> u8 {
        *self.src.get(self.pos + 1).unwrap_or(&0)
    }

    fn bump(&mut self) -> u8 {
        let c = self.peek();
        self.pos += 1;
        if c == b'\n' {
            self.line += 1;
        }
        c
    }

    fn eat(&mut self, c: u8) -> bool {
        if self.peek() == c {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn skip_trivia(&mut self, sink: &mut ErrorSink) {
        loop {
            match self.peek() {
                b' ' | b'\t' | b'\r' | b'\n' => {
                    self.bump();
                }
                b'/' if self.peek2() == b'/' => {
                    while self.pos < self.src.len() && self.peek() != b'\n' {
                        self.pos += 1;
                    }
                }
                b'/' if self.peek2() == b'*' => {
                    let start = self.here();
                    self.bump();
                    self.bump();
                    loop {
                        if self.pos >= self.src.len() {
                            sink.log(
                                ErrorCode::UnterminatedString,
                                start,
                                "unterminated block comment",
                            );
                            break;
                        }
                        if self.peek() == b'*' && self.peek2() == b'/' {
                            self.bump();
                            self.bump();
                            break;
                        }
                        self.bump();
                    }
                }
                _ => break,
            }
        }
    }

    fn scan_token(&mut self, sink: &mut ErrorSink) -> Token {
        self.skip_trivia(sink);
        let pos = self.here();
        if self.pos >= self.src.len() {
            return Token::eof(pos);
        }

        let c = self.peek();
        match c {
            b'\'' | b'"' => {
                self.bump();
                self.scan_string(c, false, pos, sink)
            }
            b'0'..=b'9' => self.scan_number(pos),
            c if c == b'_' || c.is_ascii_alphabetic() => self.scan_word(pos),
            _ => self.scan_operator(pos, sink),
        }
    }

    fn scan_word(&mut self, pos: SourcePos) -> Token {
        let start = self.pos;
        while {
            let c = self.peek();
            c == b'_' || c.is_ascii_alphanumeric()
        } {
            self.pos += 1;
        }
        let text = std::str::from_utf8(&self.src[start..self.pos]).unwrap_or("");
        if let Some(kw) = keyword(text) {
            Token::new(kw, pos)
        } else {
            Token::new(TokenKind::Sym(self.interner.intern(text)), pos)
        }
    }

    fn scan_number(&mut self, pos: SourcePos) -> Token {
        let start = self.pos;
        let mut radix = 10;
        if self.peek() == b'0' && (self.peek2() == b'x' || self.peek2() == b'X') {
            self.pos += 2;
            radix = 16;
        }
        let digits_start = self.pos;
        while {
            let c = self.peek();
            c.is_ascii_hexdigit() && (radix == 16 || c.is_ascii_digit())
        } {
            self.pos += 1;
        }
        let text = if radix == 16 {
            std::str::from_utf8(&self.src[digits_start..self.pos]).unwrap_or("0")
        } else {
            std::str::from_utf8(&self.src[start..self.pos]).unwrap_or("0")
        };
        let val = i64::from_str_radix(text, radix).unwrap_or(0);
        Token::new(TokenKind::Int(val), pos)
    }

    /// Scans a string body starting just past the quote (or just past a
    /// resuming `>>`). Emits the appropriate plain / Start / Mid / End token.
    fn scan_string(
        &mut self,
        quote: u8,
        resuming: bool,
        pos: SourcePos,
        sink: &mut ErrorSink,
    ) -> Token {
        let mut text = String::new();
        loop {
            if self.pos >= self.src.len() {
                sink.log(ErrorCode::UnterminatedString, pos, "unterminated string literal");
                let id = self.interner.intern(&text);
                return Token::new(
                    match (quote, resuming) {
                        (b'\'', false) => TokenKind::SStr(id),
                        (b'\'', true) => TokenKind::SStrEnd(id),
                        (_, false) => TokenKind::DStr(id),
                        (_, true) => TokenKind::DStrEnd(id),
                    },
                    pos,
                );
            }
            let c = self.bump();
            if c == quote {
                let id = self.interner.intern(&text);
                let kind = match (quote, resuming) {
                    (b'\'', false) => TokenKind::SStr(id),
                    (b'\'', true) => TokenKind::SStrEnd(id),
                    (_, false) => TokenKind::DStr(id),
                    (_, true) => TokenKind::DStrEnd(id),
                };
                return Token::new(kind, pos);
            }
            if c == b'<' && self.peek() == b'<' {
                // embedding: emit this segment and switch to expression mode
                self.pos += 1;
                self.embeds.push(quote);
                let id = self.interner.intern(&text);
                let kind = match (quote, resuming) {
                    (b'\'', false) => TokenKind::SStrStart(id),
                    (b'\'', true) => TokenKind::SStrMid(id),
                    (_, false) => TokenKind::DStrStart(id),
                    (_, true) => TokenKind::DStrMid(id),
                };
                return Token::new(kind, pos);
            }
            if c == b'\\' {
                let esc = self.bump();
                match esc {
                    b'n' => text.push('\n'),
                    b't' => text.push('\t'),
                    b'r' => text.push('\r'),
                    b'\\' | b'\'' | b'"' | b'<' | b'>' => text.push(esc as char),
                    0 => {}
                    other => {
                        text.push('\\');
                        text.push(other as char);
                    }
                }
                continue;
            }
            text.push(c as char);
        }
    }

    fn scan_operator(&mut self, pos: SourcePos, sink: &mut ErrorSink) -> Token {
        let c = self.bump();
        let kind = match c {
            b'(' => TokenKind::LParen,
            b')' => TokenKind::RParen,
            b'{' => TokenKind::LBrace,
            b'}' => TokenKind::RBrace,
            b'[' => TokenKind::LBracket,
            b']' => TokenKind::RBracket,
            b';' => TokenKind::Semi,
            b':' => TokenKind::Colon,
            b',' => TokenKind::Comma,
            b'.' => {
                if self.peek() == b'.' && self.peek2() == b'.' {
                    self.pos += 2;
                    TokenKind::Ellipsis
                } else {
                    TokenKind::Dot
                }
            }
            b'?' => TokenKind::Question,
            b'@' => TokenKind::At,
            b'+' => {
                if self.eat(b'+') {
                    TokenKind::Inc
                } else if self.eat(b'=') {
                    TokenKind::PlusAssign
                } else {
                    TokenKind::Plus
                }
            }
            b'-' => {
                if self.eat(b'-') {
                    TokenKind::Dec
                } else if self.eat(b'=') {
                    TokenKind::MinusAssign
                } else if self.eat(b'>') {
                    TokenKind::Arrow
                } else {
                    TokenKind::Minus
                }
            }
            b'*' => {
                if self.eat(b'=') {
                    TokenKind::TimesAssign
                } else {
                    TokenKind::Times
                }
            }
            b'/' => {
                if self.eat(b'=') {
                    TokenKind::DivAssign
                } else {
                    TokenKind::Div
                }
            }
            b'%' => {
                if self.eat(b'=') {
                    TokenKind::ModAssign
                } else {
                    TokenKind::Mod
                }
            }
            b'=' => {
                if self.eat(b'=') {
                    TokenKind::Eq
                } else {
                    TokenKind::Assign
                }
            }
            b'!' => {
                if self.eat(b'=') {
                    TokenKind::Ne
                } else {
                    TokenKind::Not
                }
            }
            b'~' => TokenKind::BNot,
            b'^' => TokenKind::Caret,
            b'&' => {
                if self.eat(b'&') {
                    TokenKind::AndAnd
                } else {
                    TokenKind::Amp
                }
            }
            b'|' => {
                if self.eat(b'|') {
                    TokenKind::OrOr
                } else {
                    TokenKind::Pipe
                }
            }
            b'<' => {
                if self.eat(b'=') {
                    TokenKind::Le
                } else if self.eat(b'<') {
                    TokenKind::Shl
                } else {
                    TokenKind::Lt
                }
            }
            b'>' => {
                if self.peek() == b'>' && !self.embeds.is_empty() {
                    // terminates an embedding: resume the enclosing string
                    self.pos += 1;
                    let quote = self.embeds.pop().unwrap_or(b'"');
                    return self.scan_string(quote, true, pos, sink);
                } else if self.eat(b'=') {
                    TokenKind::Ge
                } else if self.eat(b'>') {
                    TokenKind::Shr
                } else {
                    TokenKind::Gt
                }
            }
            other => {
                sink.log(
                    ErrorCode::InvalidCharacter,
                    pos,
                    format!("invalid character '{}'", other as char),
                );
                // deliver the next real token instead
                return self.scan_token(sink);
            }
        };
        Token::new(kind, pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(src: &str) -> (Vec<Token>, Interner, ErrorSink) {
        let mut interner = Interner::new();
        let mut sink = ErrorSink::new();
        let toks = Lexer::new(src, FileId(0), &mut interner).tokenize(&mut sink);
        (toks, interner, sink)
    }

    fn kinds(toks: &[Token]) -> Vec<TokenKind> {
        toks.iter().map(|t| t.kind).collect()
    }

    #[test]
    fn scans_object_definition() {
        let (toks, mut i, sink) = lex("bedroom: Room 'bedroom';");
        assert!(!sink.has_errors());
        let bedroom = i.intern("bedroom");
        let room = i.intern("Room");
        let desc = i.intern("bedroom");
        assert_eq!(
            kinds(&toks),
            vec![
                TokenKind::Sym(bedroom),
                TokenKind::Colon,
                TokenKind::Sym(room),
                TokenKind::SStr(desc),
                TokenKind::Semi,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn keywords_versus_identifiers() {
        let (toks, mut i, _) = lex("class classy");
        let classy = i.intern("classy");
        assert_eq!(
            kinds(&toks),
            vec![TokenKind::KwClass, TokenKind::Sym(classy), TokenKind::Eof]
        );
    }

    #[test]
    fn embedded_expression_segments() {
        let (toks, mut i, sink) = lex(r#""count: <<n>> items""#);
        assert!(!sink.has_errors());
        let head = i.intern("count: ");
        let n = i.intern("n");
        let tail = i.intern(" items");
        assert_eq!(
            kinds(&toks),
            vec![
                TokenKind::DStrStart(head),
                TokenKind::Sym(n),
                TokenKind::DStrEnd(tail),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn multiple_embeddings_produce_mid_segments() {
        let (toks, _, sink) = lex(r#""a <<x>> b <<y>> c""#);
        assert!(!sink.has_errors());
        let shapes: Vec<&str> = toks
            .iter()
            .map(|t| match t.kind {
                TokenKind::DStrStart(_) => "start",
                TokenKind::DStrMid(_) => "mid",
                TokenKind::DStrEnd(_) => "end",
                TokenKind::Sym(_) => "sym",
                TokenKind::Eof => "eof",
                _ => "?",
            })
            .collect();
        assert_eq!(shapes, vec!["start", "sym", "mid", "sym", "end", "eof"]);
    }

    #[test]
    fn shift_outside_string_is_shl() {
        let (toks, _, _) = lex("a << 2");
        assert!(matches!(toks[1].kind, TokenKind::Shl));
    }

    #[test]
    fn comments_and_lines() {
        let (toks, _, _) = lex("// comment\n/* block\nspan */ foo");
        assert!(matches!(toks[0].kind, TokenKind::Sym(_)));
        assert_eq!(toks[0].pos.line, 3);
    }

    #[test]
    fn numbers_decimal_and_hex() {
        let (toks, _, _) = lex("42 0x2A");
        assert_eq!(toks[0].kind, TokenKind::Int(42));
        assert_eq!(toks[1].kind, TokenKind::Int(42));
    }

    #[test]
    fn compound_operators() {
        let (toks, _, _) = lex("++ -- += -> ... >= !=");
        assert_eq!(
            kinds(&toks[..7]),
            vec![
                TokenKind::Inc,
                TokenKind::Dec,
                TokenKind::PlusAssign,
                TokenKind::Arrow,
                TokenKind::Ellipsis,
                TokenKind::Ge,
                TokenKind::Ne,
            ]
        );
    }

    #[test]
    fn unterminated_string_is_reported() {
        let (_, _, sink) = lex("'oops");
        assert_eq!(sink.count_of(ErrorCode::UnterminatedString), 1);
    }
}
