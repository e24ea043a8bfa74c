//! The token model (C1): token kinds, their regex patterns in priority
//! order, and classification of ignored/error kinds.

use derive_more::Display;

use crate::common::{line_col_of, LineCol};

/// Every token class the scanner recognizes, in the exact priority order
/// the merged alternation is built from. Ordering matters: keywords use a
/// trailing word boundary so they never win over a longer identifier,
/// multi-character operators are listed ahead of the single-character
/// prefixes they extend, and comment patterns are listed ahead of the
/// division operators so `//`/`/*` never lex as `/` followed by garbage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display)]
pub enum TokenKind {
    #[display("whitespace")]
    Whitespace,

    #[display("bool")]
    KeywordBool,
    #[display("break")]
    KeywordBreak,
    #[display("const")]
    KeywordConst,
    #[display("continue")]
    KeywordContinue,
    #[display("else")]
    KeywordElse,
    #[display("false")]
    KeywordFalse,
    #[display("for")]
    KeywordFor,
    #[display("if")]
    KeywordIf,
    #[display("import")]
    KeywordImport,
    #[display("int")]
    KeywordInt,
    #[display("len")]
    KeywordLen,
    #[display("return")]
    KeywordReturn,
    #[display("true")]
    KeywordTrue,
    #[display("void")]
    KeywordVoid,
    #[display("while")]
    KeywordWhile,

    #[display("hex literal")]
    HexLiteral,
    #[display("incomplete hex literal")]
    HexLiteralIncomplete,
    #[display("decimal literal")]
    DecimalLiteral,
    #[display("char literal")]
    CharLiteral,
    #[display("empty char literal")]
    CharLiteralEmpty,
    #[display("invalid character in char literal")]
    CharLiteralInvalidChar,
    #[display("char literal with more than one character")]
    CharLiteralInvalidLength,
    #[display("unterminated char literal")]
    CharLiteralUnterminated,
    #[display("string literal")]
    StringLiteral,
    #[display("invalid character in string literal")]
    StringLiteralInvalidChar,
    #[display("unterminated string literal")]
    StringLiteralUnterminated,

    #[display("identifier")]
    Identifier,

    #[display("line comment")]
    LineComment,
    #[display("block comment")]
    MultilineComment,
    #[display("unterminated block comment")]
    MultilineCommentUnterminated,

    #[display("+=")]
    AddAssign,
    #[display("-=")]
    SubAssign,
    #[display("*=")]
    MulAssign,
    #[display("/=")]
    DivAssign,
    #[display("%=")]
    ModAssign,
    #[display("++")]
    Increment,
    #[display("--")]
    Decrement,
    #[display("==")]
    Equal,
    #[display("!=")]
    NotEqual,
    #[display("<=")]
    LessEqual,
    #[display(">=")]
    GreaterEqual,
    #[display("&&")]
    And,
    #[display("||")]
    Or,

    #[display("(")]
    OpenParen,
    #[display(")")]
    CloseParen,
    #[display("[")]
    OpenBracket,
    #[display("]")]
    CloseBracket,
    #[display("{{")]
    OpenBrace,
    #[display("}}")]
    CloseBrace,
    #[display("=")]
    Assign,
    #[display("+")]
    Add,
    #[display("-")]
    Sub,
    #[display("*")]
    Mul,
    #[display("/")]
    Div,
    #[display("%")]
    Mod,
    #[display("<")]
    Less,
    #[display(">")]
    Greater,
    #[display("!")]
    Not,
    #[display(",")]
    Comma,
    #[display(";")]
    Semicolon,

    #[display("unrecognized token")]
    Unknown,
}

/// All token kinds the scanner tries, in priority order. `Unknown` is not
/// listed: it is the fallback when nothing in this list matches at the
/// current position.
pub const PRIORITY_ORDER: &[TokenKind] = {
    use TokenKind::*;
    &[
        Whitespace,
        KeywordBool,
        KeywordBreak,
        KeywordConst,
        KeywordContinue,
        KeywordElse,
        KeywordFalse,
        KeywordFor,
        KeywordIf,
        KeywordImport,
        KeywordInt,
        KeywordLen,
        KeywordReturn,
        KeywordTrue,
        KeywordVoid,
        KeywordWhile,
        HexLiteral,
        HexLiteralIncomplete,
        DecimalLiteral,
        CharLiteral,
        CharLiteralEmpty,
        CharLiteralInvalidChar,
        CharLiteralInvalidLength,
        CharLiteralUnterminated,
        StringLiteral,
        StringLiteralInvalidChar,
        StringLiteralUnterminated,
        Identifier,
        LineComment,
        MultilineComment,
        MultilineCommentUnterminated,
        AddAssign,
        SubAssign,
        MulAssign,
        DivAssign,
        ModAssign,
        Increment,
        Decrement,
        Equal,
        NotEqual,
        LessEqual,
        GreaterEqual,
        And,
        Or,
        OpenParen,
        CloseParen,
        OpenBracket,
        CloseBracket,
        OpenBrace,
        CloseBrace,
        Assign,
        Add,
        Sub,
        Mul,
        Div,
        Mod,
        Less,
        Greater,
        Not,
        Comma,
        Semicolon,
    ]
};

/// `(?:[ -!#-&\(-\[\]-~]|\\['"\\tn])`: a printable ASCII character outside
/// quote/backslash, or one of the recognized backslash escapes.
const VALID_CHAR: &str = r#"(?:[ -!#-&\(-\[\]-~]|\\['"\\tn])"#;

/// A wider class used only to detect (and reject) characters that are
/// printable but not valid inside a char/string literal.
const EXTENDED_CHAR: &str = r#"(?:[ -\[\]-~]|\\[ -~])"#;

impl TokenKind {
    /// The regex pattern for this token class, anchored by the caller at
    /// the current scan position.
    pub fn pattern(&self) -> String {
        use TokenKind::*;
        match self {
            Whitespace => r"\s+".to_string(),

            KeywordBool => r"bool\b".to_string(),
            KeywordBreak => r"break\b".to_string(),
            KeywordConst => r"const\b".to_string(),
            KeywordContinue => r"continue\b".to_string(),
            KeywordElse => r"else\b".to_string(),
            KeywordFalse => r"false\b".to_string(),
            KeywordFor => r"for\b".to_string(),
            KeywordIf => r"if\b".to_string(),
            KeywordImport => r"import\b".to_string(),
            KeywordInt => r"int\b".to_string(),
            KeywordLen => r"len\b".to_string(),
            KeywordReturn => r"return\b".to_string(),
            KeywordTrue => r"true\b".to_string(),
            KeywordVoid => r"void\b".to_string(),
            KeywordWhile => r"while\b".to_string(),

            HexLiteral => r"0x[0-9a-fA-F]+".to_string(),
            HexLiteralIncomplete => r"0x\b".to_string(),
            DecimalLiteral => r"[0-9]+".to_string(),
            CharLiteral => format!("'{VALID_CHAR}'"),
            CharLiteralEmpty => "''".to_string(),
            CharLiteralInvalidChar => format!("'{EXTENDED_CHAR}'"),
            CharLiteralInvalidLength => format!("'{EXTENDED_CHAR}*?'"),
            CharLiteralUnterminated => format!("'{EXTENDED_CHAR}*"),
            StringLiteral => format!("\"{VALID_CHAR}*?\""),
            StringLiteralInvalidChar => format!("\"{EXTENDED_CHAR}*?\""),
            StringLiteralUnterminated => format!("\"{EXTENDED_CHAR}*"),

            Identifier => r"[a-zA-Z_][a-zA-Z0-9_]*".to_string(),

            LineComment => r"//.*".to_string(),
            MultilineComment => r"(?s)/\*.*?\*/".to_string(),
            MultilineCommentUnterminated => r"(?s)/\*.*".to_string(),

            AddAssign => r"\+=".to_string(),
            SubAssign => r"-=".to_string(),
            MulAssign => r"\*=".to_string(),
            DivAssign => r"/=".to_string(),
            ModAssign => r"%=".to_string(),
            Increment => r"\+\+".to_string(),
            Decrement => r"--".to_string(),
            Equal => r"==".to_string(),
            NotEqual => r"!=".to_string(),
            LessEqual => r"<=".to_string(),
            GreaterEqual => r">=".to_string(),
            And => r"&&".to_string(),
            Or => r"\|\|".to_string(),

            OpenParen => r"\(".to_string(),
            CloseParen => r"\)".to_string(),
            OpenBracket => r"\[".to_string(),
            CloseBracket => r"\]".to_string(),
            OpenBrace => r"\{".to_string(),
            CloseBrace => r"\}".to_string(),
            Assign => r"=".to_string(),
            Add => r"\+".to_string(),
            Sub => r"-".to_string(),
            Mul => r"\*".to_string(),
            Div => r"/".to_string(),
            Mod => r"%".to_string(),
            Less => r"<".to_string(),
            Greater => r">".to_string(),
            Not => r"!".to_string(),
            Comma => r",".to_string(),
            Semicolon => r";".to_string(),

            Unknown => unreachable!("Unknown has no pattern; it is the scanner's fallback"),
        }
    }

    /// Whitespace and comments never reach the parser.
    pub fn is_ignored(&self) -> bool {
        matches!(
            self,
            TokenKind::Whitespace | TokenKind::LineComment | TokenKind::MultilineComment
        )
    }

    /// Kinds that represent a lexical error rather than a valid token.
    pub fn is_error(&self) -> bool {
        use TokenKind::*;
        matches!(
            self,
            HexLiteralIncomplete
                | CharLiteralEmpty
                | CharLiteralInvalidChar
                | CharLiteralInvalidLength
                | CharLiteralUnterminated
                | StringLiteralInvalidChar
                | StringLiteralUnterminated
                | MultilineCommentUnterminated
                | Unknown
        )
    }

    /// Human-readable message for an error kind.
    pub fn error_message(&self) -> &'static str {
        use TokenKind::*;
        match self {
            HexLiteralIncomplete => "incomplete hex literal",
            CharLiteralEmpty => "empty char literal",
            CharLiteralInvalidChar => "invalid character in char literal",
            CharLiteralInvalidLength => "char literal must contain exactly one character",
            CharLiteralUnterminated => "unterminated char literal",
            StringLiteralInvalidChar => "invalid character in string literal",
            StringLiteralUnterminated => "unterminated string literal",
            MultilineCommentUnterminated => "unterminated comment",
            Unknown => "unrecognized character",
            _ => "",
        }
    }

    /// The `CATEGORY` word the `scan` CLI target prints ahead of a token's
    /// lexeme, or `None` for operators/keywords/punctuation.
    pub fn scan_category(&self) -> Option<&'static str> {
        use TokenKind::*;
        match self {
            CharLiteral => Some("CHARLITERAL"),
            HexLiteral | DecimalLiteral => Some("INTLITERAL"),
            KeywordTrue | KeywordFalse => Some("BOOLEANLITERAL"),
            StringLiteral => Some("STRINGLITERAL"),
            Identifier => Some("IDENTIFIER"),
            _ => None,
        }
    }
}

/// A single scanned token: its kind, byte span, and the slice of source it
/// covers. Tokens are value types that borrow the source buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'src> {
    pub kind: TokenKind,
    pub offset: u32,
    pub len: u32,
    pub text: &'src str,
}

impl<'src> Token<'src> {
    pub fn line_col(&self, source: &str) -> LineCol {
        line_col_of(source, self.offset as usize)
    }
}

impl std::fmt::Display for Token<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {:?}", self.kind, self.text)
    }
}
