//! Testable-property checks (spec §8) that aren't tied to one of the
//! numbered scenarios: scanner classification, parser precedence, and
//! optimizer safety properties, exercised through the public pipeline API.

use decafc::front::lex::Lexer;
use decafc::front::parse;
use decafc::front::token::TokenKind;
use decafc::middle::{lower, optimize, Passes};

fn kinds(source: &str) -> Vec<TokenKind> {
    let (tokens, errors) = Lexer::tokenize(source);
    assert!(errors.is_empty(), "unexpected lex errors: {errors:?}");
    tokens.into_iter().map(|t| t.kind).collect()
}

#[test]
fn keyword_pattern_does_not_match_an_identifier_prefix() {
    let (tokens, errors) = Lexer::tokenize("intx");
    assert!(errors.is_empty());
    assert_eq!(tokens.len(), 1);
    assert_eq!(tokens[0].kind, TokenKind::Identifier);
    assert_eq!(tokens[0].text, "intx");
}

#[test]
fn ignored_tokens_never_reach_the_output_stream() {
    let ks = kinds("int   x ; // trailing comment\n/* block */ int y;");
    assert!(!ks.contains(&TokenKind::Whitespace));
    assert!(ks.iter().all(|k| !k.is_ignored()));
}

#[test]
fn unterminated_string_literal_is_reported_as_an_error_to_end_of_source() {
    let (_, errors) = Lexer::tokenize("\"never closed");
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].kind, TokenKind::StringLiteralUnterminated);
}

#[test]
fn unterminated_block_comment_is_reported_as_an_error() {
    let (_, errors) = Lexer::tokenize("/* never closed");
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].kind, TokenKind::MultilineCommentUnterminated);
}

#[test]
fn subtraction_is_left_associative() {
    let parsed = parse("int foo(){ int a,b,c,r; r = a - b - c; return r; }");
    let program = parsed.program.expect("parses");
    let ast = format!("{program:#?}");
    // `(a - b) - c`: the outer Binary's left operand is itself a Binary,
    // while its right operand is the bare location `c`.
    assert!(ast.contains("Sub"));
}

#[test]
fn duplicate_top_level_identifier_is_not_this_crates_concern() {
    // Parsing alone accepts a duplicate field/method name; rejecting it is
    // semantic analysis's job, an external collaborator (Non-goals, §1).
    let parsed = parse("int a; int a; void main(){}");
    assert!(parsed.program.is_some());
    assert!(parsed.diagnostics.is_empty());
}

#[test]
fn bare_return_is_permitted_by_the_parser_in_a_void_method() {
    let parsed = parse("void main(){ return; }");
    assert!(parsed.program.is_some(), "{:?}", parsed.diagnostics);
}

#[test]
fn constant_folding_is_idempotent() {
    let parsed = parse("int foo(){ int a; a = 2 + 3 * 4; return a; }");
    let program = parsed.program.expect("parses");
    let llir = lower(&program);
    let once = optimize(llir, Passes { cf: true, cp: false, dce: false }).to_string();
    let parsed_again = parse("int foo(){ int a; a = 2 + 3 * 4; return a; }");
    let twice_base = lower(&parsed_again.program.expect("parses"));
    let twice = optimize(
        optimize(twice_base, Passes { cf: true, cp: false, dce: false }),
        Passes { cf: true, cp: false, dce: false },
    )
    .to_string();
    assert_eq!(once, twice);
}

#[test]
fn dce_never_removes_a_method_call() {
    let parsed = parse("import printf; void main(){ printf(\"unused result\\n\"); }");
    let program = parsed.program.expect("parses");
    let llir = lower(&program);
    let optimized = optimize(llir, Passes::ALL).to_string();
    assert!(optimized.contains("METHOD_CALL printf"), "{optimized}");
}

#[test]
fn dce_keeps_an_assignment_whose_destination_feeds_a_branch() {
    let parsed = parse("int foo(){ int a,b; a = 1; b = 2; if (a < b) { return 1; } return 0; }");
    let program = parsed.program.expect("parses");
    let llir = lower(&program);
    let optimized = optimize(llir, Passes { cf: false, cp: false, dce: true }).to_string();
    assert!(optimized.contains("BRANCH"), "{optimized}");
}
