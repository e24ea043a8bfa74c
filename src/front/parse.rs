//! The parser: hand-written recursive descent for all grammar except
//! binary expressions, which use a forward-scanning precedence resolver
//! over the flat token stream (see [`Parser::parse_binary_expression`]).

use crate::common::{intern, Diagnostic, Id};
use crate::front::ast::*;
use crate::front::lex::Lexer;
use crate::front::token::{Token, TokenKind};

pub struct ParseResult {
    pub program: Option<Program>,
    pub diagnostics: Vec<Diagnostic>,
}

pub fn parse(source: &str) -> ParseResult {
    let (tokens, lex_errors) = Lexer::tokenize(source);
    let mut diagnostics: Vec<Diagnostic> = lex_errors
        .iter()
        .map(|e| Diagnostic::new(e.at, e.to_string()))
        .collect();
    let lex_failed = !lex_errors.is_empty();

    let mut parser = Parser::new(source, tokens);
    let program = parser.parse_program();
    diagnostics.extend(parser.diagnostics);

    let failed = lex_failed || parser.failed;
    ParseResult {
        program: if failed { None } else { Some(program) },
        diagnostics,
    }
}

struct Parser<'src> {
    source: &'src str,
    tokens: Vec<Token<'src>>,
    pos: usize,
    failed: bool,
    diagnostics: Vec<Diagnostic>,
}

fn is_keyword(kind: TokenKind) -> bool {
    use TokenKind::*;
    matches!(
        kind,
        KeywordBool
            | KeywordBreak
            | KeywordConst
            | KeywordContinue
            | KeywordElse
            | KeywordFalse
            | KeywordFor
            | KeywordIf
            | KeywordImport
            | KeywordInt
            | KeywordLen
            | KeywordReturn
            | KeywordTrue
            | KeywordVoid
            | KeywordWhile
    )
}

/// Binary operator and precedence (low binds loosest) for a token kind,
/// or `None` if the kind is not a binary operator.
fn binary_operator(kind: TokenKind) -> Option<(BOp, u8)> {
    use TokenKind::*;
    Some(match kind {
        Or => (BOp::Or, 0),
        And => (BOp::And, 1),
        Equal => (BOp::Eq, 2),
        NotEqual => (BOp::Ne, 2),
        Less => (BOp::Lt, 3),
        LessEqual => (BOp::Le, 3),
        GreaterEqual => (BOp::Ge, 3),
        Greater => (BOp::Gt, 3),
        Add => (BOp::Add, 4),
        Sub => (BOp::Sub, 4),
        Mul => (BOp::Mul, 5),
        Div => (BOp::Div, 5),
        Mod => (BOp::Mod, 5),
        _ => return None,
    })
}

fn assign_operator(kind: TokenKind) -> Option<AssignOp> {
    use TokenKind::*;
    Some(match kind {
        Assign => AssignOp::Set,
        AddAssign => AssignOp::Add,
        SubAssign => AssignOp::Sub,
        MulAssign => AssignOp::Mul,
        DivAssign => AssignOp::Div,
        ModAssign => AssignOp::Mod,
        _ => return None,
    })
}

fn increment_operator(kind: TokenKind) -> Option<AssignOp> {
    use TokenKind::*;
    Some(match kind {
        Increment => AssignOp::Add,
        Decrement => AssignOp::Sub,
        _ => return None,
    })
}

fn sentinel_expr() -> Expr {
    Expr::Unary(Unary::Literal(Literal {
        negate: false,
        kind: LiteralKind::Int(0),
    }))
}

fn empty_block() -> Block {
    Block {
        fields: Vec::new(),
        stmts: Vec::new(),
    }
}

fn unescape_string_literal(text: &str) -> String {
    let inner = &text[1..text.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

fn char_literal_value(text: &str) -> u8 {
    let inner = &text[1..text.len() - 1];
    let mut chars = inner.chars();
    match chars.next() {
        Some('\\') => match chars.next() {
            Some('n') => b'\n',
            Some('t') => b'\t',
            Some(other) => other as u8,
            None => 0,
        },
        Some(c) => c as u8,
        None => 0,
    }
}

fn parse_hex_literal(text: &str) -> i64 {
    i64::from_str_radix(&text[2..], 16).unwrap_or(i64::MAX)
}

impl<'src> Parser<'src> {
    fn new(source: &'src str, tokens: Vec<Token<'src>>) -> Self {
        Parser {
            source,
            tokens,
            pos: 0,
            failed: false,
            diagnostics: Vec::new(),
        }
    }

    fn peek_kind(&self, rel: usize) -> Option<TokenKind> {
        self.tokens.get(self.pos + rel).map(|t| t.kind)
    }

    fn accept(&mut self, kind: TokenKind) -> Option<Token<'src>> {
        if self.peek_kind(0) == Some(kind) {
            let tok = self.tokens[self.pos];
            self.pos += 1;
            Some(tok)
        } else {
            None
        }
    }

    fn expect(&mut self, kind: TokenKind, msg: &str) -> Option<Token<'src>> {
        match self.accept(kind) {
            Some(tok) => Some(tok),
            None => {
                self.error(msg);
                None
            }
        }
    }

    fn accept_keyword(&mut self) -> Option<Token<'src>> {
        match self.peek_kind(0) {
            Some(kind) if is_keyword(kind) => {
                let tok = self.tokens[self.pos];
                self.pos += 1;
                Some(tok)
            }
            _ => None,
        }
    }

    fn accept_binary_operator(&mut self) -> Option<BOp> {
        let kind = self.peek_kind(0)?;
        let (op, _) = binary_operator(kind)?;
        self.pos += 1;
        Some(op)
    }

    fn accept_assign_operator(&mut self) -> Option<AssignOp> {
        let kind = self.peek_kind(0)?;
        let op = assign_operator(kind)?;
        self.pos += 1;
        Some(op)
    }

    fn accept_increment_operator(&mut self) -> Option<AssignOp> {
        let kind = self.peek_kind(0)?;
        let op = increment_operator(kind)?;
        self.pos += 1;
        Some(op)
    }

    /// Reports `message` at the most recently consumed token (or the
    /// very first token, if nothing has been consumed yet).
    fn error(&mut self, message: impl Into<String>) {
        self.failed = true;
        let at = if self.pos == 0 {
            self.tokens.first()
        } else {
            self.tokens.get(self.pos - 1)
        }
        .map(|t| t.line_col(self.source));
        self.diagnostics.push(match at {
            Some(at) => Diagnostic::new(at, message),
            None => Diagnostic::without_location(message),
        });
    }

    fn parse_identifier(&mut self) -> Option<Id> {
        if let Some(tok) = self.accept_keyword() {
            self.error("keyword cannot be used as identifier");
            return Some(intern(tok.text));
        }
        self.accept(TokenKind::Identifier).map(|t| intern(t.text))
    }

    fn parse_int_literal(&mut self) -> Option<i64> {
        if let Some(tok) = self.accept(TokenKind::HexLiteral) {
            return Some(parse_hex_literal(tok.text));
        }
        if let Some(tok) = self.accept(TokenKind::DecimalLiteral) {
            return Some(tok.text.parse().unwrap_or(i64::MAX));
        }
        None
    }

    fn parse_literal(&mut self) -> Option<Literal> {
        let start = self.pos;
        let negate = self.accept(TokenKind::Sub).is_some();
        if self.accept(TokenKind::KeywordTrue).is_some() {
            return Some(Literal {
                negate,
                kind: LiteralKind::Bool(true),
            });
        }
        if self.accept(TokenKind::KeywordFalse).is_some() {
            return Some(Literal {
                negate,
                kind: LiteralKind::Bool(false),
            });
        }
        if let Some(value) = self.parse_int_literal() {
            return Some(Literal {
                negate,
                kind: LiteralKind::Int(value),
            });
        }
        if let Some(tok) = self.accept(TokenKind::CharLiteral) {
            return Some(Literal {
                negate,
                kind: LiteralKind::Char(char_literal_value(tok.text)),
            });
        }
        if self.accept(TokenKind::StringLiteral).is_some() {
            self.error("string literal not permitted here");
            return Some(Literal {
                negate,
                kind: LiteralKind::Int(0),
            });
        }
        if negate {
            // Not actually a negated literal — back off the `-` we
            // speculatively consumed so `parse_unary_expression` can fall
            // through to `parse_negate_expression` instead (`-x`, `a - -b`,
            // `-foo()`, `-len(a)`).
            self.pos = start;
            return None;
        }
        None
    }

    fn parse_array_literal(&mut self) -> Option<Vec<Literal>> {
        self.accept(TokenKind::OpenBrace)?;
        let mut literals = Vec::new();
        loop {
            match self.parse_literal() {
                Some(lit) => literals.push(lit),
                None => self.error("expected literal in array literal"),
            }
            if self.accept(TokenKind::Comma).is_some() {
                continue;
            }
            if self.accept(TokenKind::CloseBrace).is_some() {
                break;
            }
            self.error("expected closing brace or comma in array literal");
            break;
        }
        Some(literals)
    }

    fn parse_initializer(&mut self) -> Option<Initializer> {
        if let Some(arr) = self.parse_array_literal() {
            return Some(Initializer::ArrayLiteral(arr));
        }
        self.parse_literal().map(Initializer::Literal)
    }

    fn parse_type(&mut self) -> Option<ScalarType> {
        if self.accept(TokenKind::KeywordVoid).is_some() {
            self.error("void type not permitted here");
            return Some(ScalarType::Int);
        }
        if self.accept(TokenKind::KeywordInt).is_some() {
            return Some(ScalarType::Int);
        }
        if self.accept(TokenKind::KeywordBool).is_some() {
            return Some(ScalarType::Bool);
        }
        None
    }

    fn looks_like_field(&self) -> bool {
        let mut i = 0;
        if self.peek_kind(i) == Some(TokenKind::KeywordConst) {
            i += 1;
        }
        match self.peek_kind(i) {
            Some(TokenKind::KeywordInt) | Some(TokenKind::KeywordBool) => {}
            _ => return false,
        }
        i += 1;
        if self.peek_kind(i) != Some(TokenKind::Identifier) {
            return false;
        }
        self.peek_kind(i + 1) != Some(TokenKind::OpenParen)
    }

    fn parse_field_identifier(&mut self) -> Option<FieldIdent> {
        let name = self.parse_identifier()?;

        let mut array_len = None;
        if self.accept(TokenKind::OpenBracket).is_some() {
            array_len = self.parse_int_literal();
            if array_len.is_none() {
                self.error("expected array length in field declaration");
            }
            self.expect(
                TokenKind::CloseBracket,
                "expected closing square bracket in field declaration",
            );
        }

        let mut init = None;
        if self.accept(TokenKind::Assign).is_some() {
            init = self.parse_initializer();
            if init.is_none() {
                self.error("expected initializer in field declaration");
            }
        }

        Some(FieldIdent {
            name,
            array_len,
            init,
        })
    }

    fn parse_field(&mut self) -> Option<FieldDecl> {
        let is_const = self.accept(TokenKind::KeywordConst).is_some();
        let ty = match self.parse_type() {
            Some(ty) => ty,
            None => {
                if is_const {
                    self.error("expected type in field declaration");
                }
                return None;
            }
        };

        let mut decls = Vec::new();
        loop {
            match self.parse_field_identifier() {
                Some(fi) => decls.push(fi),
                None => self.error("expected identifier in field declaration"),
            }
            if self.accept(TokenKind::Comma).is_some() {
                continue;
            }
            if self.accept(TokenKind::Semicolon).is_some() {
                break;
            }
            self.error("expected comma or semicolon in field declaration");
            break;
        }

        Some(FieldDecl { is_const, ty, decls })
    }

    fn parse_import(&mut self) -> Option<Id> {
        self.accept(TokenKind::KeywordImport)?;
        let name = self.parse_identifier().unwrap_or_else(|| {
            self.error("expected identifier in import declaration");
            intern("")
        });
        self.expect(TokenKind::Semicolon, "expected semicolon in import declaration");
        Some(name)
    }

    fn parse_method_argument(&mut self) -> Option<(ScalarType, Id)> {
        let ty = self.parse_type()?;
        let name = self.parse_identifier().unwrap_or_else(|| {
            self.error("expected identifier in method argument");
            intern("")
        });
        Some((ty, name))
    }

    fn parse_method(&mut self) -> Option<Method> {
        let ret = if self.accept(TokenKind::KeywordVoid).is_some() {
            ReturnType::Void
        } else {
            match self.parse_type()? {
                ScalarType::Int => ReturnType::Int,
                ScalarType::Bool => ReturnType::Bool,
            }
        };

        let name = self.parse_identifier().unwrap_or_else(|| {
            self.error("expected identifier in method declaration");
            intern("")
        });

        self.expect(TokenKind::OpenParen, "expected parenthesis in method declaration");

        let mut params = Vec::new();
        while self.accept(TokenKind::CloseParen).is_none() {
            match self.parse_method_argument() {
                Some(arg) => params.push(arg),
                None => {
                    self.error("expected argument in method declaration");
                    break;
                }
            }
            if self.accept(TokenKind::Comma).is_some()
                && self.peek_kind(0) == Some(TokenKind::CloseParen)
            {
                self.error("extra comma in method declaration");
            }
        }

        let body = self.parse_block().unwrap_or_else(|| {
            self.error("expected block after method declaration");
            empty_block()
        });

        Some(Method {
            ret,
            name,
            params,
            body,
        })
    }

    fn parse_block(&mut self) -> Option<Block> {
        self.accept(TokenKind::OpenBrace)?;

        let mut fields = Vec::new();
        while let Some(f) = self.parse_field() {
            fields.push(f);
        }

        let mut stmts = Vec::new();
        while let Some(s) = self.parse_statement() {
            stmts.push(s);
        }

        self.expect(
            TokenKind::CloseBrace,
            "expected closing curly bracket in block",
        );
        Some(Block { fields, stmts })
    }

    fn parse_location(&mut self) -> Option<Location> {
        let name = self.parse_identifier()?;
        let mut index = None;
        if self.accept(TokenKind::OpenBracket).is_some() {
            let expr = self.parse_expression();
            if expr.is_none() {
                self.error("expected expression in identifier index");
            }
            self.expect(
                TokenKind::CloseBracket,
                "expected closing square bracket in index expression",
            );
            index = Some(Box::new(expr.unwrap_or_else(sentinel_expr)));
        }
        Some(Location { name, index })
    }

    fn parse_method_call(&mut self) -> Option<MethodCall> {
        if self.peek_kind(0) != Some(TokenKind::Identifier)
            || self.peek_kind(1) != Some(TokenKind::OpenParen)
        {
            return None;
        }
        let name = self.parse_identifier().expect("checked by peek above");
        self.accept(TokenKind::OpenParen);

        let mut args = Vec::new();
        if self.accept(TokenKind::CloseParen).is_some() {
            return Some(MethodCall { name, args });
        }
        loop {
            match self.parse_method_call_argument() {
                Some(arg) => args.push(arg),
                None => self.error("expected argument in method call"),
            }
            if self.accept(TokenKind::Comma).is_some() {
                continue;
            }
            if self.accept(TokenKind::CloseParen).is_some() {
                break;
            }
            self.error("expected comma or closing parenthesis in method call");
            break;
        }
        Some(MethodCall { name, args })
    }

    fn parse_method_call_argument(&mut self) -> Option<CallArg> {
        if let Some(tok) = self.accept(TokenKind::StringLiteral) {
            return Some(CallArg::Str(intern(&unescape_string_literal(tok.text))));
        }
        self.parse_expression().map(CallArg::Expr)
    }

    fn parse_not_expression(&mut self) -> Option<Unary> {
        self.accept(TokenKind::Not)?;
        let inner = self.parse_unary_expression();
        if inner.is_none() {
            self.error("expected expression after not operator");
        }
        inner
    }

    fn parse_negate_expression(&mut self) -> Option<Unary> {
        self.accept(TokenKind::Sub)?;
        let inner = self.parse_unary_expression();
        if inner.is_none() {
            self.error("expected expression after negate operator");
        }
        inner
    }

    fn parse_len_expression(&mut self) -> Option<Id> {
        self.accept(TokenKind::KeywordLen)?;
        self.expect(
            TokenKind::OpenParen,
            "expected open parenthesis in len expression",
        );
        let id = self.parse_identifier();
        if id.is_none() {
            self.error("expected identifier in len expression");
        }
        self.expect(
            TokenKind::CloseParen,
            "expected closing parenthesis in len expression",
        );
        id.or_else(|| Some(intern("")))
    }

    fn parse_parenthesis_expression(&mut self) -> Option<Expr> {
        self.accept(TokenKind::OpenParen)?;
        let expr = self.parse_expression();
        if expr.is_none() {
            self.error("expected expression in parenthesis");
        }
        self.expect(
            TokenKind::CloseParen,
            "expected closing parenthesis in expression",
        );
        Some(expr.unwrap_or_else(sentinel_expr))
    }

    fn parse_unary_expression(&mut self) -> Option<Unary> {
        if let Some(lit) = self.parse_literal() {
            return Some(Unary::Literal(lit));
        }
        if let Some(id) = self.parse_len_expression() {
            return Some(Unary::Len(id));
        }
        if let Some(call) = self.parse_method_call() {
            return Some(Unary::Call(call));
        }
        if let Some(loc) = self.parse_location() {
            return Some(Unary::Location(loc));
        }
        if let Some(inner) = self.parse_not_expression() {
            return Some(Unary::Not(Box::new(inner)));
        }
        if let Some(inner) = self.parse_negate_expression() {
            return Some(Unary::Negate(Box::new(inner)));
        }
        if let Some(expr) = self.parse_parenthesis_expression() {
            return Some(Unary::Paren(Box::new(expr)));
        }
        None
    }

    /// `i` is relative to the current parser position. A leading `-` only
    /// counts as binary when the token before it is neither itself a
    /// binary operator nor `!` — that's what lets `-x` and `a - -b` parse
    /// as a unary minus rather than a dangling binary one.
    fn is_binary_operator_at(&self, i: usize) -> bool {
        if self.peek_kind(i) == Some(TokenKind::Sub) {
            if i == 0 {
                return false;
            }
            if self
                .peek_kind(i - 1)
                .is_some_and(|k| binary_operator(k).is_some())
            {
                return false;
            }
            if self.peek_kind(i - 1) == Some(TokenKind::Not) {
                return false;
            }
        }
        self.peek_kind(i).is_some_and(|k| binary_operator(k).is_some())
    }

    /// Running out of tokens counts as termination too (the original only
    /// lists explicit closing punctuation), so a truncated expression
    /// stops the scan instead of running past the end of the stream.
    fn is_expression_termination_at(&self, depth: i32, i: usize) -> bool {
        match self.peek_kind(i) {
            None => true,
            Some(k) => {
                depth == 0
                    && matches!(
                        k,
                        TokenKind::CloseParen
                            | TokenKind::CloseBracket
                            | TokenKind::Semicolon
                            | TokenKind::Comma
                    )
            }
        }
    }

    fn find_binary_operator_indices(&self, bound: Option<usize>) -> Vec<usize> {
        let mut indices = Vec::new();
        let mut depth = 0i32;
        let mut i = 0usize;
        while bound.is_none_or(|b| i < b) && !self.is_expression_termination_at(depth, i) {
            match self.peek_kind(i) {
                Some(TokenKind::OpenParen) | Some(TokenKind::OpenBracket) => depth += 1,
                Some(TokenKind::CloseParen) | Some(TokenKind::CloseBracket) => depth -= 1,
                _ => {}
            }
            if depth == 0 && self.is_binary_operator_at(i) {
                indices.push(i);
            }
            i += 1;
        }
        indices
    }

    /// Ties break to the rightmost index (`<=` rather than `<`), which is
    /// what makes same-precedence chains like `a - b - c` parse
    /// left-associatively.
    fn lowest_precedence_index(&self, indices: &[usize]) -> usize {
        let mut lowest_index = 0;
        let mut lowest_precedence = i32::MAX;
        for &index in indices {
            if let Some((_, precedence)) = self.peek_kind(index).and_then(binary_operator) {
                if i32::from(precedence) <= lowest_precedence {
                    lowest_precedence = i32::from(precedence);
                    lowest_index = index;
                }
            }
        }
        lowest_index
    }

    fn parse_binary_expression(&mut self, bound: Option<usize>) -> Option<Expr> {
        let indices = self.find_binary_operator_indices(bound);
        if indices.is_empty() {
            return None;
        }

        let operator_index = self.lowest_precedence_index(&indices);
        let expected_position = self.pos + operator_index;

        let left = self.parse_expression_bounded(Some(operator_index));
        if left.is_none() {
            self.error("expected expression before operator");
        }
        if self.pos != expected_position {
            self.error("expected binary operator in expression");
            self.pos = expected_position;
        }
        let op = self.accept_binary_operator();

        let remaining_bound = bound.map(|b| b - operator_index - 1);
        let right = self.parse_expression_bounded(remaining_bound);
        if right.is_none() {
            self.error("expected expression after operator");
        }

        Some(Expr::Binary {
            op: op.unwrap_or(BOp::Add),
            left: Box::new(left.unwrap_or_else(sentinel_expr)),
            right: Box::new(right.unwrap_or_else(sentinel_expr)),
        })
    }

    fn parse_expression_bounded(&mut self, bound: Option<usize>) -> Option<Expr> {
        if let Some(binary) = self.parse_binary_expression(bound) {
            return Some(binary);
        }
        self.parse_unary_expression().map(Expr::Unary)
    }

    fn parse_expression(&mut self) -> Option<Expr> {
        self.parse_expression_bounded(None)
    }

    fn parse_assign_tail(&mut self) -> Option<(AssignOp, Option<Expr>)> {
        if let Some(op) = self.accept_assign_operator() {
            let expr = self.parse_expression();
            if expr.is_none() {
                self.error("expected expression in assignment");
            }
            return Some((op, expr));
        }
        if let Some(op) = self.accept_increment_operator() {
            return Some((op, None));
        }
        None
    }

    fn parse_for_update(&mut self) -> Option<ForUpdate> {
        if let Some(call) = self.parse_method_call() {
            return Some(ForUpdate::MethodCall(call));
        }
        let loc = self.parse_location()?;
        let (op, expr) = self.parse_assign_tail().unwrap_or_else(|| {
            self.error("expected assignment in for update");
            (AssignOp::Set, None)
        });
        Some(ForUpdate::Assign { loc, op, expr })
    }

    fn parse_assign_statement(&mut self) -> Option<Stmt> {
        let loc = self.parse_location()?;
        let (op, expr) = self.parse_assign_tail().unwrap_or_else(|| {
            self.error("expected assignment in statement");
            (AssignOp::Set, None)
        });
        self.expect(
            TokenKind::Semicolon,
            "expected semicolon in assignment statement",
        );
        Some(Stmt::Assign { loc, op, expr })
    }

    fn parse_method_call_statement(&mut self) -> Option<Stmt> {
        let call = self.parse_method_call()?;
        self.expect(
            TokenKind::Semicolon,
            "expected semicolon in method call statement",
        );
        Some(Stmt::MethodCall(call))
    }

    fn parse_if_statement(&mut self) -> Option<Stmt> {
        self.accept(TokenKind::KeywordIf)?;
        self.expect(TokenKind::OpenParen, "expected open parenthesis in if statement");
        let cond = self.parse_expression();
        if cond.is_none() {
            self.error("expected expression in if statement");
        }
        self.expect(
            TokenKind::CloseParen,
            "expected close parenthesis in if statement",
        );
        let then_block = self.parse_block();
        if then_block.is_none() {
            self.error("expected block in if statement");
        }
        let else_block = if self.accept(TokenKind::KeywordElse).is_some() {
            let block = self.parse_block();
            if block.is_none() {
                self.error("expected block in else statement");
            }
            Some(block.unwrap_or_else(empty_block))
        } else {
            None
        };
        Some(Stmt::If {
            cond: cond.unwrap_or_else(sentinel_expr),
            then_block: then_block.unwrap_or_else(empty_block),
            else_block,
        })
    }

    fn parse_for_statement(&mut self) -> Option<Stmt> {
        self.accept(TokenKind::KeywordFor)?;
        self.expect(TokenKind::OpenParen, "expected open parenthesis in for statement");
        let var = self.parse_identifier().unwrap_or_else(|| {
            self.error("expected identifier in for statement assignment");
            intern("")
        });
        self.expect(TokenKind::Assign, "expected assignment in for statement");
        let init = self.parse_expression();
        if init.is_none() {
            self.error("expected expression in for statement assignment");
        }
        self.expect(
            TokenKind::Semicolon,
            "expected semicolon in for statement assignment",
        );
        let cond = self.parse_expression();
        if cond.is_none() {
            self.error("expected expression in for statement condition");
        }
        self.expect(
            TokenKind::Semicolon,
            "expected semicolon in for statement condition",
        );
        let update = self.parse_for_update();
        if update.is_none() {
            self.error("expected update expression in for statement");
        }
        self.expect(
            TokenKind::CloseParen,
            "expected closing parenthesis in for statement",
        );
        let body = self.parse_block();
        if body.is_none() {
            self.error("expected block in for statement");
        }
        Some(Stmt::For {
            var,
            init: init.unwrap_or_else(sentinel_expr),
            cond: cond.unwrap_or_else(sentinel_expr),
            update: update.unwrap_or(ForUpdate::Assign {
                loc: Location {
                    name: intern(""),
                    index: None,
                },
                op: AssignOp::Set,
                expr: None,
            }),
            body: body.unwrap_or_else(empty_block),
        })
    }

    fn parse_while_statement(&mut self) -> Option<Stmt> {
        self.accept(TokenKind::KeywordWhile)?;
        self.expect(
            TokenKind::OpenParen,
            "expected open parenthesis in while statement",
        );
        let cond = self.parse_expression();
        if cond.is_none() {
            self.error("expected expression in while statement");
        }
        self.expect(
            TokenKind::CloseParen,
            "expected closing parenthesis in while statement",
        );
        let body = self.parse_block();
        if body.is_none() {
            self.error("expected block in while statement");
        }
        Some(Stmt::While {
            cond: cond.unwrap_or_else(sentinel_expr),
            body: body.unwrap_or_else(empty_block),
        })
    }

    /// A bare `return;` is legal here (unlike the grammar this was ported
    /// from, which always demanded an expression): `Stmt::Return` carries
    /// an `Option<Expr>` precisely so void methods can return with none.
    fn parse_return_statement(&mut self) -> Option<Stmt> {
        self.accept(TokenKind::KeywordReturn)?;
        let expr = self.parse_expression();
        self.expect(TokenKind::Semicolon, "expected semicolon in return statement");
        Some(Stmt::Return(expr))
    }

    fn parse_break_statement(&mut self) -> bool {
        if self.accept(TokenKind::KeywordBreak).is_none() {
            return false;
        }
        self.expect(TokenKind::Semicolon, "expected semicolon in break statement");
        true
    }

    fn parse_continue_statement(&mut self) -> bool {
        if self.accept(TokenKind::KeywordContinue).is_none() {
            return false;
        }
        self.expect(
            TokenKind::Semicolon,
            "expected semicolon in continue statement",
        );
        true
    }

    fn parse_statement(&mut self) -> Option<Stmt> {
        if let Some(s) = self.parse_if_statement() {
            return Some(s);
        }
        if let Some(s) = self.parse_for_statement() {
            return Some(s);
        }
        if let Some(s) = self.parse_while_statement() {
            return Some(s);
        }
        if let Some(s) = self.parse_return_statement() {
            return Some(s);
        }
        if self.parse_break_statement() {
            return Some(Stmt::Break);
        }
        if self.parse_continue_statement() {
            return Some(Stmt::Continue);
        }
        if let Some(s) = self.parse_method_call_statement() {
            return Some(s);
        }
        self.parse_assign_statement()
    }

    fn parse_program(&mut self) -> Program {
        let mut imports = Vec::new();
        while let Some(name) = self.parse_import() {
            imports.push(name);
        }

        let mut fields = Vec::new();
        while self.looks_like_field() {
            match self.parse_field() {
                Some(f) => fields.push(f),
                None => break,
            }
        }

        let mut methods = Vec::new();
        while let Some(m) = self.parse_method() {
            methods.push(m);
        }

        if self.pos != self.tokens.len() {
            self.error("unrecognized or unexpected declaration in program");
        }

        Program {
            imports,
            fields,
            methods,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(src: &str) -> Program {
        let result = parse(src);
        assert!(
            result.diagnostics.is_empty(),
            "unexpected diagnostics: {:?}",
            result
                .diagnostics
                .iter()
                .map(|d| d.to_string())
                .collect::<Vec<_>>()
        );
        result.program.expect("parse should have succeeded")
    }

    #[test]
    fn parses_a_minimal_main() {
        let program = parse_ok("void main() { return; }");
        assert_eq!(program.methods.len(), 1);
        assert_eq!(program.methods[0].name.as_str(), "main");
        assert!(matches!(program.methods[0].body.stmts[0], Stmt::Return(None)));
    }

    #[test]
    fn field_before_method_disambiguation() {
        let program = parse_ok("int g; void main() { return; }");
        assert_eq!(program.fields.len(), 1);
        assert_eq!(program.methods.len(), 1);
    }

    #[test]
    fn additive_chain_is_left_associative() {
        let program = parse_ok("int f() { return 1 - 2 - 3; }");
        let Stmt::Return(Some(Expr::Binary { op, left, right })) = &program.methods[0].body.stmts[0]
        else {
            panic!("expected a binary return expression");
        };
        assert_eq!(*op, BOp::Sub);
        assert!(matches!(**right, Expr::Unary(Unary::Literal(_))));
        assert!(matches!(**left, Expr::Binary { op: BOp::Sub, .. }));
    }

    #[test]
    fn precedence_splits_at_loosest_operator() {
        let program = parse_ok("int f() { return 1 + 2 * 3; }");
        let Stmt::Return(Some(Expr::Binary { op, .. })) = &program.methods[0].body.stmts[0] else {
            panic!("expected a binary return expression");
        };
        assert_eq!(*op, BOp::Add);
    }

    #[test]
    fn unary_minus_does_not_need_parens() {
        let program = parse_ok("int f() { return -1; }");
        let Stmt::Return(Some(Expr::Unary(Unary::Literal(lit)))) = &program.methods[0].body.stmts[0]
        else {
            panic!("expected a negated literal");
        };
        assert!(lit.negate);
    }

    #[test]
    fn negating_a_location_falls_through_to_unary_negate() {
        let program = parse_ok("int f() { int x; return -x; }");
        let Stmt::Return(Some(Expr::Unary(Unary::Negate(inner)))) =
            &program.methods[0].body.stmts[0]
        else {
            panic!("expected a Negate(Location) unary, not a spurious literal-parse error");
        };
        assert!(matches!(**inner, Unary::Location(_)));
    }

    #[test]
    fn negating_a_call_falls_through_to_unary_negate() {
        let program = parse_ok("int f() { return -foo(); }");
        let Stmt::Return(Some(Expr::Unary(Unary::Negate(inner)))) = &program.methods[0].body.stmts[0]
        else {
            panic!("expected a Negate(Call) unary");
        };
        assert!(matches!(**inner, Unary::Call(_)));
    }

    #[test]
    fn subtracting_a_negated_location_parses_as_binary_sub_of_a_negate() {
        let program = parse_ok("int f() { int a, b; return a - -b; }");
        let Stmt::Return(Some(Expr::Binary { op, right, .. })) = &program.methods[0].body.stmts[0]
        else {
            panic!("expected a binary return expression");
        };
        assert_eq!(*op, BOp::Sub);
        assert!(matches!(**right, Expr::Unary(Unary::Negate(_))));
    }

    #[test]
    fn array_field_and_method_call_roundtrip_shape() {
        let program = parse_ok("int a[10]; void main() { a[0] = foo(1, \"x\"); }");
        assert_eq!(program.fields[0].decls[0].array_len, Some(10));
        let Stmt::Assign { loc, .. } = &program.methods[0].body.stmts[0] else {
            panic!("expected an assign statement");
        };
        assert!(loc.index.is_some());
    }

    #[test]
    fn for_loop_structure() {
        let program = parse_ok("void main() { for (i = 0; i < 10; i++) { } }");
        assert!(matches!(program.methods[0].body.stmts[0], Stmt::For { .. }));
    }

    #[test]
    fn missing_semicolon_reports_error_and_fails_parse() {
        let result = parse("void main() { int x }");
        assert!(result.program.is_none());
        assert!(!result.diagnostics.is_empty());
        assert!(result.diagnostics[0].to_string().starts_with("ERROR at"));
    }

    #[test]
    fn increment_desugars_to_compound_add_with_no_expr() {
        let program = parse_ok("void main() { int x; x++; }");
        let Stmt::Assign { op, expr, .. } = &program.methods[0].body.stmts[0] else {
            panic!("expected assign statement");
        };
        assert_eq!(*op, AssignOp::Add);
        assert!(expr.is_none());
    }
}
