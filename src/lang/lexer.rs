//! Logos-based lexer for the configuration language.
//!
//! The raw token enum recognizes identifiers, variables, punctuation,
//! and comments; a wrapper pass tracks line numbers, honors `#line`
//! directives, promotes keywords, and scans configuration strings
//! (balanced-parenthesis bodies, which are not regular) directly from
//! the remaining input when a `(` follows an element or directive
//! head.

use logos::Logos;
use smol_str::SmolStr;

use crate::base::{Landmark, LandmarkBuilder};
use crate::errors::{ErrorSink, ErrorSinkExt};

/// A lexed token with its kind, text, and landmark.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: SmolStr,
    pub landmark: Landmark,
}

impl Token {
    pub fn is(&self, kind: TokenKind) -> bool {
        self.kind == kind
    }
}

/// Token kinds seen by the parser.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Ident,
    /// `$name`; the token text omits the sigil.
    Variable,
    /// The body of a balanced-parentheses configuration string.
    Config,
    Arrow,
    Arrow2,
    ColonColon,
    BarBar,
    Dots3,
    Elementclass,
    Require,
    Provide,
    Define,
    Comma,
    Semicolon,
    Colon,
    Bar,
    LBracket,
    RBracket,
    LParen,
    RParen,
    LBrace,
    RBrace,
    /// A character no rule matched; the parser reports it.
    Error,
    Eof,
}

impl TokenKind {
    /// Human-readable name for diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            TokenKind::Ident => "identifier",
            TokenKind::Variable => "variable",
            TokenKind::Config => "configuration string",
            TokenKind::Arrow => "'->'",
            TokenKind::Arrow2 => "'=>'",
            TokenKind::ColonColon => "'::'",
            TokenKind::BarBar => "'||'",
            TokenKind::Dots3 => "'...'",
            TokenKind::Elementclass => "'elementclass'",
            TokenKind::Require => "'require'",
            TokenKind::Provide => "'provide'",
            TokenKind::Define => "'define'",
            TokenKind::Comma => "','",
            TokenKind::Semicolon => "';'",
            TokenKind::Colon => "':'",
            TokenKind::Bar => "'|'",
            TokenKind::LBracket => "'['",
            TokenKind::RBracket => "']'",
            TokenKind::LParen => "'('",
            TokenKind::RParen => "')'",
            TokenKind::LBrace => "'{'",
            TokenKind::RBrace => "'}'",
            TokenKind::Error => "stray character",
            TokenKind::Eof => "end of file",
        }
    }
}

/// Raw tokens produced by logos. Trivia stays in the stream so the
/// wrapper can count lines and spot line-start `#` directives.
#[derive(Logos, Debug, Clone, Copy, PartialEq)]
enum RawTok {
    #[regex(r"[ \t\r\x0c\n]+")]
    Whitespace,

    #[regex(r"//[^\n]*")]
    LineComment,

    #[regex(r"/\*([^*]|\*+[^*/])*\*+/")]
    BlockComment,

    // identifiers may embed '/' between identifier characters
    #[regex(r"[A-Za-z0-9_@]+(/[A-Za-z0-9_@]+)*")]
    Ident,

    #[regex(r"\$[A-Za-z0-9_]+")]
    Variable,

    #[token("->")]
    Arrow,
    #[token("=>")]
    Arrow2,
    #[token("::")]
    ColonColon,
    #[token("||")]
    BarBar,
    #[token("...")]
    Dots3,

    #[token(",")]
    Comma,
    #[token(";")]
    Semicolon,
    #[token(":")]
    Colon,
    #[token("|")]
    Bar,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,

    #[token("#")]
    Hash,
}

/// Tokenize a whole source text. Lexical errors are reported through
/// `errh`; lexing continues so later errors surface too.
pub fn tokenize(
    source: &str,
    filename: &str,
    ignore_line_directives: bool,
    errh: &mut dyn ErrorSink,
) -> Vec<Token> {
    let mut lx = RawTok::lexer(source);
    let mut marks = LandmarkBuilder::new(filename);
    let mut counted_to = 0usize;
    let mut out: Vec<Token> = Vec::new();
    // kind of the last significant token, used to recognize the '('
    // that opens a configuration string
    let mut last: Option<TokenKind> = None;

    while let Some(raw) = lx.next() {
        let span = lx.span();
        count_lines(source, &mut counted_to, span.start, &mut marks);
        let landmark = marks.landmark();

        let raw = match raw {
            Ok(r) => r,
            Err(()) => {
                if source[span.start..].starts_with("/*") {
                    errh.error(&landmark, "unterminated comment");
                    // nothing sensible follows; skip the rest
                    break;
                }
                out.push(Token {
                    kind: TokenKind::Error,
                    text: SmolStr::new(&source[span.clone()]),
                    landmark,
                });
                last = Some(TokenKind::Error);
                continue;
            }
        };

        match raw {
            RawTok::Whitespace | RawTok::LineComment | RawTok::BlockComment => continue,
            RawTok::Hash => {
                let at_line_start = span.start == 0
                    || matches!(source.as_bytes()[span.start - 1], b'\n' | b'\r');
                if at_line_start {
                    process_line_directive(
                        &mut lx,
                        &mut counted_to,
                        &mut marks,
                        ignore_line_directives,
                        &landmark,
                        errh,
                    );
                } else {
                    out.push(Token {
                        kind: TokenKind::Error,
                        text: SmolStr::new("#"),
                        landmark,
                    });
                    last = Some(TokenKind::Error);
                }
                continue;
            }
            _ => {}
        }

        let kind = match raw {
            RawTok::Ident => match &source[span.clone()] {
                "elementclass" => TokenKind::Elementclass,
                "require" => TokenKind::Require,
                "provide" => TokenKind::Provide,
                "define" => TokenKind::Define,
                _ => TokenKind::Ident,
            },
            RawTok::Variable => TokenKind::Variable,
            RawTok::Arrow => TokenKind::Arrow,
            RawTok::Arrow2 => TokenKind::Arrow2,
            RawTok::ColonColon => TokenKind::ColonColon,
            RawTok::BarBar => TokenKind::BarBar,
            RawTok::Dots3 => TokenKind::Dots3,
            RawTok::Comma => TokenKind::Comma,
            RawTok::Semicolon => TokenKind::Semicolon,
            RawTok::Colon => TokenKind::Colon,
            RawTok::Bar => TokenKind::Bar,
            RawTok::LBracket => TokenKind::LBracket,
            RawTok::RBracket => TokenKind::RBracket,
            RawTok::LParen => TokenKind::LParen,
            RawTok::RParen => TokenKind::RParen,
            RawTok::LBrace => TokenKind::LBrace,
            RawTok::RBrace => TokenKind::RBrace,
            _ => unreachable!("trivia handled above"),
        };

        let text = match kind {
            // variables drop the '$' sigil
            TokenKind::Variable => SmolStr::new(&source[span.start + 1..span.end]),
            _ => SmolStr::new(&source[span.clone()]),
        };
        out.push(Token {
            kind,
            text,
            landmark,
        });

        // a '(' after an element head or directive keyword opens a
        // configuration string; scan it here since it is not regular
        if kind == TokenKind::LParen
            && matches!(
                last,
                Some(
                    TokenKind::Ident
                        | TokenKind::RBrace
                        | TokenKind::Require
                        | TokenKind::Provide
                        | TokenKind::Define
                )
            )
        {
            let config_landmark = marks.landmark();
            let body = scan_config(lx.remainder(), &config_landmark, errh);
            lx.bump(body.len());
            count_lines(source, &mut counted_to, lx.span().end, &mut marks);
            out.push(Token {
                kind: TokenKind::Config,
                text: SmolStr::new(body),
                landmark: config_landmark,
            });
            last = Some(TokenKind::Config);
        } else {
            last = Some(kind);
        }
    }

    count_lines(source, &mut counted_to, source.len(), &mut marks);
    out.push(Token {
        kind: TokenKind::Eof,
        text: SmolStr::default(),
        landmark: marks.landmark(),
    });
    out
}

/// Count newlines in `source[*counted_to..upto)` into the landmark
/// builder.
fn count_lines(source: &str, counted_to: &mut usize, upto: usize, marks: &mut LandmarkBuilder) {
    if upto > *counted_to {
        let n = source.as_bytes()[*counted_to..upto]
            .iter()
            .filter(|&&b| b == b'\n')
            .count();
        marks.advance_lines(n as u32);
        *counted_to = upto;
    }
}

/// Consume a `#[line] N ["FILE"]` directive from the raw lexer, whose
/// `#` was just lexed. The rest of the physical line is consumed; its
/// terminating newline stays in the stream and is counted normally.
fn process_line_directive(
    lx: &mut logos::Lexer<'_, RawTok>,
    counted_to: &mut usize,
    marks: &mut LandmarkBuilder,
    ignore: bool,
    landmark: &Landmark,
    errh: &mut dyn ErrorSink,
) {
    let rest = lx.remainder();
    let line_end = rest.find(['\n', '\r']).unwrap_or(rest.len());
    let line = &rest[..line_end];

    let mut s = line.trim_start_matches([' ', '\t']);
    if let Some(after) = s.strip_prefix("line") {
        if after.starts_with([' ', '\t']) {
            s = after.trim_start_matches([' ', '\t']);
        }
    }

    let digits_end = s.bytes().take_while(|b| b.is_ascii_digit()).count();
    if digits_end == 0 {
        errh.error(landmark, "unknown preprocessor directive");
    } else if !ignore {
        let lineno: u32 = s[..digits_end].parse().unwrap_or(1);
        let mut file: Option<String> = None;
        let s = s[digits_end..].trim_start_matches([' ', '\t']);
        if let Some(rest) = s.strip_prefix('"') {
            let name_end = rest.find('"').unwrap_or(rest.len());
            file = Some(rest[..name_end].to_string());
        }
        // the directive's own newline, still pending in the stream,
        // advances onto the named line
        marks.set_position(lineno.saturating_sub(1), file.as_deref());
    }

    lx.bump(line_end);
    *counted_to = (*counted_to).max(source_offset(lx));
}

fn source_offset(lx: &logos::Lexer<'_, RawTok>) -> usize {
    lx.span().end
}

/// Scan a configuration-string body from text starting just after the
/// opening `(`, returning the body (without the closing `)`).
/// Honors nested parens, quotes, comments, and `\<...>` segments.
/// A body that runs to end-of-input is reported at `landmark`: as an
/// unterminated string when a quote or `\<...>` segment never closed,
/// otherwise as an unterminated configuration string.
fn scan_config<'s>(rest: &'s str, landmark: &Landmark, errh: &mut dyn ErrorSink) -> &'s str {
    let b = rest.as_bytes();
    let mut depth = 1u32;
    let mut i = 0;
    let mut open_string = false;
    while i < b.len() {
        match b[i] {
            b'(' => {
                depth += 1;
                i += 1;
            }
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return &rest[..i];
                }
                i += 1;
            }
            b'/' if i + 1 < b.len() && b[i + 1] == b'/' => {
                while i < b.len() && b[i] != b'\n' {
                    i += 1;
                }
            }
            b'/' if i + 1 < b.len() && b[i + 1] == b'*' => {
                i += 2;
                while i + 1 < b.len() && !(b[i] == b'*' && b[i + 1] == b'/') {
                    i += 1;
                }
                i = (i + 2).min(b.len());
            }
            q @ (b'\'' | b'"') => {
                i += 1;
                while i < b.len() && b[i] != q {
                    if q == b'"' && b[i] == b'\\' && i + 1 < b.len() {
                        if b[i + 1] == b'<' {
                            i += 2;
                            while i < b.len() && b[i] != b'>' {
                                i += 1;
                            }
                            if i == b.len() {
                                open_string = true;
                            }
                        } else {
                            i += 1;
                        }
                    }
                    i += 1;
                }
                if i == b.len() {
                    open_string = true;
                }
                i += 1;
            }
            b'\\' if i + 1 < b.len() && b[i + 1] == b'<' => {
                i += 2;
                while i < b.len() && b[i] != b'>' {
                    i += 1;
                }
                if i == b.len() {
                    open_string = true;
                }
                i += 1;
            }
            _ => i += 1,
        }
    }
    if open_string {
        errh.error(landmark, "unterminated string");
    } else {
        errh.error(landmark, "unterminated configuration string");
    }
    rest
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::BufferSink;

    fn lex(src: &str) -> Vec<Token> {
        let mut errh = BufferSink::new();
        let toks = tokenize(src, "test", false, &mut errh);
        assert_eq!(errh.nerrors(), 0, "{}", errh.take_text());
        toks
    }

    fn kinds(src: &str) -> Vec<TokenKind> {
        lex(src).iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_basic_stream() {
        use TokenKind::*;
        assert_eq!(
            kinds("a -> b;"),
            vec![Ident, Arrow, Ident, Semicolon, Eof]
        );
        assert_eq!(
            kinds("x :: Foo(1, 2) => y"),
            vec![Ident, ColonColon, Ident, LParen, Config, RParen, Arrow2, Ident, Eof]
        );
    }

    #[test]
    fn test_keywords_and_idents() {
        use TokenKind::*;
        assert_eq!(
            kinds("elementclass require provide define elementclasses"),
            vec![Elementclass, Require, Provide, Define, Ident, Eof]
        );
    }

    #[test]
    fn test_ident_with_slash() {
        let toks = lex("a/b/c -> d");
        assert_eq!(toks[0].text, "a/b/c");
    }

    #[test]
    fn test_variable_token_strips_sigil() {
        let toks = lex("$limit");
        assert_eq!(toks[0].kind, TokenKind::Variable);
        assert_eq!(toks[0].text, "limit");
    }

    #[test]
    fn test_config_string_balancing() {
        let toks = lex("Foo(bar(1,2), \"a)b\", \\<00 29>)");
        let config = toks.iter().find(|t| t.kind == TokenKind::Config).unwrap();
        assert_eq!(config.text, "bar(1,2), \"a)b\", \\<00 29>");
    }

    #[test]
    fn test_group_paren_is_not_config() {
        use TokenKind::*;
        assert_eq!(
            kinds("a -> (input -> output) -> b"),
            vec![Ident, Arrow, LParen, Ident, Arrow, Ident, RParen, Arrow, Ident, Eof]
        );
    }

    #[test]
    fn test_comments_and_lines() {
        let toks = lex("a // comment\n/* block\ncomment */ b");
        assert_eq!(toks[0].landmark.line(), 1);
        assert_eq!(toks[1].landmark.line(), 3);
    }

    #[test]
    fn test_line_directive() {
        let toks = lex("#line 10 \"other.conf\"\na");
        assert_eq!(toks[0].landmark.to_string(), "other.conf:10");
        let toks = lex("# 5\na");
        assert_eq!(toks[0].landmark.line(), 5);
    }

    #[test]
    fn test_line_directive_ignored() {
        let mut errh = BufferSink::new();
        let toks = tokenize("#line 10\na", "t", true, &mut errh);
        assert_eq!(toks[0].landmark.line(), 2);
    }

    #[test]
    fn test_bad_directive_reports() {
        let mut errh = BufferSink::new();
        tokenize("#bogus\na", "t", false, &mut errh);
        assert_eq!(errh.nerrors(), 1);
    }

    #[test]
    fn test_config_counts_lines() {
        let toks = lex("Foo(a,\nb)\nnext");
        let next = toks.iter().find(|t| t.text == "next").unwrap();
        assert_eq!(next.landmark.line(), 3);
    }

    #[test]
    fn test_unterminated_comment() {
        let mut errh = BufferSink::new();
        tokenize("a /* never ends", "t", false, &mut errh);
        assert_eq!(errh.nerrors(), 1);
    }

    #[test]
    fn test_unterminated_config_string() {
        let mut errh = BufferSink::new();
        tokenize("x :: Foo(1, 2", "t", false, &mut errh);
        assert_eq!(errh.nerrors(), 1);
        let d = &errh.diagnostics()[0];
        assert_eq!(d.message, "unterminated configuration string");
        // reported at the configuration string, not at end of file
        assert_eq!(d.landmark.to_string(), "t:1");
    }

    #[test]
    fn test_unterminated_string_in_config() {
        let mut errh = BufferSink::new();
        tokenize("\n\nx :: Foo(\"no closing quote)", "t", false, &mut errh);
        assert_eq!(errh.nerrors(), 1);
        let d = &errh.diagnostics()[0];
        assert_eq!(d.message, "unterminated string");
        assert_eq!(d.landmark.line(), 3);
    }
}
