//! The scanner (C2): longest-match-by-priority tokenization over the
//! merged alternation built from [`token::PRIORITY_ORDER`].

use derive_more::Display;
use regex::Regex;

use crate::common::{line_col_of, LineCol};
use crate::front::token::{Token, TokenKind, PRIORITY_ORDER};

/// A lexical error: an error-classified token, or a single unrecognized
/// byte when nothing in the priority list matches at the current position.
#[derive(Debug, Clone, Display)]
#[display("{}", self.display_message())]
pub struct LexError {
    pub kind: TokenKind,
    pub at: LineCol,
    pub lexeme: String,
}

impl LexError {
    fn display_message(&self) -> String {
        format!("{}: {:?}", self.kind.error_message(), self.lexeme)
    }
}

/// Compiles every token kind's pattern once, anchored at the start of
/// whatever slice of the source it is asked to match against.
pub struct Lexer<'src> {
    source: &'src str,
    pos: usize,
    matchers: Vec<(Regex, TokenKind)>,
}

impl<'src> Lexer<'src> {
    pub fn new(source: &'src str) -> Self {
        let matchers = PRIORITY_ORDER
            .iter()
            .map(|&kind| {
                let anchored = format!(r"\A(?:{})", kind.pattern());
                let regex = Regex::new(&anchored)
                    .unwrap_or_else(|e| panic!("internal error: bad pattern for {kind}: {e}"));
                (regex, kind)
            })
            .collect();

        Lexer {
            source,
            pos: 0,
            matchers,
        }
    }

    /// Has the lexer reached the end of input?
    pub fn end_of_input(&self) -> bool {
        self.pos >= self.source.len()
    }

    /// Get the next non-ignored token, or the next lexical error.
    ///
    /// Returns `Ok(None)` at end of input. Whitespace and comments are
    /// consumed silently by this same call; they never surface as tokens.
    pub fn next(&mut self) -> Result<Option<Token<'src>>, LexError> {
        loop {
            if self.end_of_input() {
                return Ok(None);
            }

            let rest = &self.source[self.pos..];
            let matched = self
                .matchers
                .iter()
                .find_map(|(regex, kind)| regex.find(rest).map(|m| (m.end(), *kind)));

            let (len, kind) = match matched {
                Some(hit) => hit,
                None => {
                    let ch_len = rest.chars().next().map(|c| c.len_utf8()).unwrap_or(1);
                    let start = self.pos;
                    self.pos += ch_len;
                    return Err(LexError {
                        kind: TokenKind::Unknown,
                        at: line_col_of(self.source, start),
                        lexeme: self.source[start..start + ch_len].to_string(),
                    });
                }
            };

            let start = self.pos;
            self.pos += len.max(1);
            let text = &self.source[start..start + len];

            if kind.is_ignored() {
                continue;
            }

            if kind.is_error() {
                return Err(LexError {
                    kind,
                    at: line_col_of(self.source, start),
                    lexeme: text.to_string(),
                });
            }

            return Ok(Some(Token {
                kind,
                offset: start as u32,
                len: len as u32,
                text,
            }));
        }
    }

    /// Scan the whole source, collecting every non-ignored token and every
    /// lexical error encountered along the way. Scanning continues past an
    /// error so that later diagnostics are also reported.
    pub fn tokenize(source: &'src str) -> (Vec<Token<'src>>, Vec<LexError>) {
        let mut lexer = Lexer::new(source);
        let mut tokens = Vec::new();
        let mut errors = Vec::new();
        loop {
            match lexer.next() {
                Ok(Some(token)) => tokens.push(token),
                Ok(None) => break,
                Err(err) => errors.push(err),
            }
        }
        (tokens, errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use TokenKind::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        let (tokens, errors) = Lexer::tokenize(src);
        assert!(errors.is_empty(), "unexpected lex errors: {errors:?}");
        tokens.into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn keywords_and_identifiers() {
        assert_eq!(kinds("int"), vec![KeywordInt]);
        assert_eq!(kinds("intx"), vec![Identifier]);
        assert_eq!(kinds("int x"), vec![KeywordInt, Identifier]);
    }

    #[test]
    fn literals() {
        assert_eq!(kinds("123"), vec![DecimalLiteral]);
        assert_eq!(kinds("0x1F"), vec![HexLiteral]);
        assert_eq!(kinds("true false"), vec![KeywordTrue, KeywordFalse]);
        assert_eq!(kinds("'a'"), vec![CharLiteral]);
        assert_eq!(kinds("\"hi\""), vec![StringLiteral]);
    }

    #[test]
    fn ignored_tokens_never_surface() {
        let (tokens, errors) = Lexer::tokenize("  // comment\n  /* block */ int");
        assert!(errors.is_empty());
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].kind, KeywordInt);
    }

    #[test]
    fn multi_char_operators_beat_prefixes() {
        assert_eq!(kinds("+="), vec![AddAssign]);
        assert_eq!(kinds("++"), vec![Increment]);
        assert_eq!(kinds("<="), vec![LessEqual]);
        assert_eq!(kinds("&&"), vec![And]);
        assert_eq!(kinds("a+=1"), vec![Identifier, AddAssign, DecimalLiteral]);
    }

    #[test]
    fn unterminated_string_runs_to_end_of_source() {
        let (_, errors) = Lexer::tokenize("\"abc");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, StringLiteralUnterminated);
        assert_eq!(errors[0].lexeme, "\"abc");
    }

    #[test]
    fn unterminated_char_and_comment() {
        let (_, errors) = Lexer::tokenize("'a");
        assert_eq!(errors[0].kind, CharLiteralUnterminated);

        let (_, errors) = Lexer::tokenize("/* never closed");
        assert_eq!(errors[0].kind, MultilineCommentUnterminated);
    }

    #[test]
    fn empty_char_literal_is_an_error() {
        let (_, errors) = Lexer::tokenize("''");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, CharLiteralEmpty);
    }

    #[test]
    fn incomplete_hex_literal() {
        let (tokens, errors) = Lexer::tokenize("0x");
        assert!(tokens.is_empty());
        assert_eq!(errors[0].kind, HexLiteralIncomplete);
    }

    #[test]
    fn line_and_column_tracking() {
        let src = "int x;\nint y;";
        let (tokens, _) = Lexer::tokenize(src);
        let y_tok = tokens.iter().find(|t| t.text == "y").unwrap();
        let lc = y_tok.line_col(src);
        assert_eq!(lc.line, 2);
    }
}
