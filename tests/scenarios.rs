//! Scenario-level integration tests (spec §8). Each test drives the public
//! pipeline (`parse` -> `lower` -> `optimize` -> `code_gen`) the way
//! `bin/decafc.rs` does, and asserts on the LLIR or assembly text produced
//! rather than on intermediate struct shapes, since nothing here runs the
//! produced assembly.

use decafc::common::intern;
use decafc::front::parse;
use decafc::middle::llir::{AssignKind, BinOp, Operand, Term};
use decafc::middle::{lower, optimize, Passes};

fn compile_llir(src: &str, passes: Passes) -> String {
    let parsed = parse(src);
    let program = parsed
        .program
        .unwrap_or_else(|| panic!("source failed to parse: {:?}", parsed.diagnostics));
    let llir = lower(&program);
    optimize(llir, passes).to_string()
}

fn compile_asm(src: &str, passes: Passes) -> String {
    let parsed = parse(src);
    let program = parsed
        .program
        .unwrap_or_else(|| panic!("source failed to parse: {:?}", parsed.diagnostics));
    let llir = lower(&program);
    let llir = optimize(llir, passes);
    decafc::back::code_gen(llir).asm_code()
}

#[test]
fn scenario_hello_emits_string_constant_and_printf_call() {
    let asm = compile_asm(
        r#"import printf; void main(){ printf("Hello\n"); }"#,
        Passes::NONE,
    );
    assert!(asm.contains(".string \"Hello\\n\""), "{asm}");
    assert!(asm.contains("call printf"), "{asm}");
    assert!(asm.contains("main:"), "{asm}");
    assert!(asm.contains("leave"), "{asm}");
    assert!(asm.contains("ret"), "{asm}");
}

#[test]
fn scenario_constant_fold_collapses_arithmetic_to_a_single_literal() {
    let llir = compile_llir(
        "int foo(){ int a; a = 2 + 3 * 4; return a; }",
        Passes { cf: true, cp: false, dce: false },
    );
    assert!(llir.contains("MOVE 14"), "{llir}");
    assert!(!llir.contains("MUL"), "{llir}");
    assert!(!llir.contains("ADD"), "{llir}");
}

#[test]
fn scenario_constant_fold_and_dce_drop_the_dead_materialization() {
    let llir = compile_llir("int foo(){ int a; a = 2 + 3 * 4; return a; }", Passes::ALL);
    assert!(llir.contains("RETURN 14"), "{llir}");
}

#[test]
fn scenario_array_oob_store_is_preceded_by_a_bounds_check_branch() {
    let llir = compile_llir("void main(){ int a[3]; a[5] = 1; }", Passes::NONE);
    assert!(llir.contains("BRANCH"), "{llir}");
    assert!(llir.contains("EXIT -1"), "{llir}");
}

#[test]
fn scenario_short_circuit_or_does_not_lower_to_an_unconditional_call_of_both_sides() {
    let llir = compile_llir(
        "bool f(){ return true; } bool g(){ exit(7); return false; } \
         void main(){ if (f() || g()) {} }",
        Passes::NONE,
    );
    // Both calls are lowered (the optimizer doesn't fold function calls away),
    // but `g` must sit behind a branch rather than run unconditionally.
    assert!(llir.contains("METHOD_CALL f("), "{llir}");
    assert!(llir.contains("METHOD_CALL g("), "{llir}");
    assert!(llir.contains("BRANCH"), "{llir}");
}

#[test]
fn scenario_for_continue_targets_the_update_block_not_the_condition_block() {
    let parsed = parse(
        "int main(){ int s; s=0; for(i=0; i<10; i+=1){ \
         if (i==5) break; if (i%2==0) continue; s += i; } return s; }",
    );
    let program = parsed
        .program
        .unwrap_or_else(|| panic!("source failed to parse: {:?}", parsed.diagnostics));
    let llir = lower(&program);
    let main = llir
        .methods
        .iter()
        .find(|m| m.name == intern("main"))
        .expect("main method lowered");

    // The update block is the one that increments `i`.
    let update_block = main
        .blocks
        .iter()
        .find(|b| {
            b.insns.iter().any(|a| {
                a.dst == intern("i")
                    && matches!(
                        &a.kind,
                        AssignKind::Bin(BinOp::Add, Operand::Field(i), Operand::Lit(1))
                            if *i == intern("i")
                    )
            })
        })
        .expect("loop lowers an update block incrementing i");

    // `continue` jumps straight to that update block, not back to the
    // condition block that tests `i < 10`.
    let continue_jumps_to_update = main
        .blocks
        .iter()
        .any(|b| matches!(b.term, Term::Jump(target) if target == update_block.id));
    assert!(
        continue_jumps_to_update,
        "expected some block to Jump directly into the update block (the continue target)"
    );

    // The update block itself jumps back to the condition, forming the
    // loop's back edge — it does not fall through to `break`'s target.
    let update_jumps_somewhere = matches!(update_block.term, Term::Jump(_));
    assert!(update_jumps_somewhere, "update block should end in a plain Jump back to the condition");
}

#[test]
fn scenario_copy_propagation_and_fold_collapse_a_chain_of_moves() {
    let llir = compile_llir(
        "int main(){ int a,b,c; a = 5; b = a; c = b + 1; return c; }",
        Passes::ALL,
    );
    assert!(llir.contains("RETURN 6"), "{llir}");
}
