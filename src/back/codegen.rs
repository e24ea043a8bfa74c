//! LLIR-to-assembly code generation (C9), grounded in the original's
//! `assembly/code_generator.c`: walk every field, method and block once,
//! load operands into the scratch pair, compute, and store the result
//! back. No register allocation (Non-goals) — every field round-trips
//! through `.data` or a stack slot on every use.

use std::collections::BTreeSet;

use crate::common::{Id, Map, Set};
use crate::middle::llir;

use super::asm::{
    BasicBlock, Condition, GlobalField, Instruction, Location, Memory, MethodAsm, Program,
    Register, StringConst, ARG_REGISTERS, SCRATCH_A, SCRATCH_B,
};

/// Applies the platform's C symbol-naming convention: macOS prefixes every
/// extern symbol with an underscore, Linux does not.
fn symbol(name: &str) -> String {
    if cfg!(target_os = "macos") {
        format!("_{name}")
    } else {
        name.to_string()
    }
}

fn round_up_16(bytes: i32) -> i32 {
    if bytes % 16 == 0 {
        bytes
    } else {
        bytes + 8
    }
}

/// Per-method storage layout and string-label lookup, threaded through
/// every instruction-emitting helper below.
struct MethodCtx<'a> {
    globals: &'a Map<Id, String>,
    locals: Map<Id, i32>,
    strings: &'a Map<Id, String>,
}

impl MethodCtx<'_> {
    fn location(&self, id: Id) -> Location {
        if let Some(label) = self.globals.get(&id) {
            Location::Mem(Memory::Global(label.clone()))
        } else {
            let offset = *self
                .locals
                .get(&id)
                .unwrap_or_else(|| panic!("field `{id}` has no stack slot assigned"));
            Location::Mem(Memory::Stack(offset))
        }
    }

    fn string_label(&self, id: Id) -> String {
        self.strings
            .get(&id)
            .unwrap_or_else(|| panic!("string constant `{id}` was never collected"))
            .clone()
    }
}

pub fn code_gen(program: llir::Program) -> Program {
    let globals: Map<Id, String> = program
        .fields
        .iter()
        .map(|f| (f.name, symbol(f.name.as_str())))
        .collect();

    let global_defs: Vec<GlobalField> = program
        .fields
        .iter()
        .map(|f| GlobalField {
            label: globals[&f.name].clone(),
            size_bytes: 8 * f.len() as u32,
        })
        .collect();

    let strings = collect_strings(&program);
    let string_defs: Vec<StringConst> = strings
        .iter()
        .map(|(id, label)| StringConst {
            label: label.clone(),
            value: id.as_str().to_string(),
        })
        .collect();

    let methods = program
        .methods
        .iter()
        .map(|method| generate_method(method, &program.fields, &globals, &strings))
        .collect();

    Program {
        globals: global_defs,
        strings: string_defs,
        methods,
    }
}

/// Every distinct string literal passed as a call argument anywhere in the
/// program, labeled `string_<N>` in a fixed (sorted-`Id`) order so the
/// emitted labels never depend on traversal order.
fn collect_strings(program: &llir::Program) -> Map<Id, String> {
    let mut ids: Set<Id> = Set::new();
    for method in &program.methods {
        for block in &method.blocks {
            for insn in &block.insns {
                if let llir::AssignKind::Call { args, .. } = &insn.kind {
                    for arg in args {
                        if let llir::Operand::Str(s) = arg {
                            ids.insert(*s);
                        }
                    }
                }
            }
        }
    }
    ids.into_iter()
        .enumerate()
        .map(|(i, id)| (id, format!("string_{i}")))
        .collect()
}

fn generate_method(
    method: &llir::Method,
    global_fields: &[llir::Field],
    globals: &Map<Id, String>,
    strings: &Map<Id, String>,
) -> MethodAsm {
    let mut locals: Map<Id, i32> = Map::new();
    let mut offset = 0i32;
    let mut seen: BTreeSet<Id> = BTreeSet::new();

    let slot_names = method.params.iter().copied().chain(
        method
            .blocks
            .iter()
            .flat_map(|b| b.locals.iter().map(|f| f.name)),
    );
    for name in slot_names {
        if globals.contains_key(&name) || seen.contains(&name) {
            continue;
        }
        seen.insert(name);
        offset -= 8;
        locals.insert(name, offset);
    }
    let frame_size = round_up_16(-offset);

    let ctx = MethodCtx {
        globals,
        locals,
        strings,
    };

    let method_label = symbol(method.name.as_str());
    let is_main = method.name.as_str() == "main";

    let mut prologue = vec![
        Instruction::Push(Register::Rbp),
        Instruction::MovRegToReg(Register::Rsp, Register::Rbp),
    ];
    if frame_size > 0 {
        prologue.push(Instruction::ShrinkStack(frame_size));
    }
    for (i, param) in method.params.iter().enumerate().take(ARG_REGISTERS.len()) {
        prologue.push(Instruction::MovRegToLoc(
            ARG_REGISTERS[i],
            ctx.location(*param),
        ));
    }
    if is_main {
        emit_global_initializers(global_fields, globals, &mut prologue);
    }

    let mut blocks = vec![BasicBlock {
        label: method_label.clone(),
        instructions: prologue,
    }];
    for block in &method.blocks {
        blocks.push(BasicBlock {
            label: block.id.to_string(),
            instructions: generate_block(block, &ctx),
        });
    }

    MethodAsm {
        label: method_label,
        frame_size,
        blocks,
    }
}

/// Globals carry their initializer values in `llir::Field::values`, but
/// `.data`/`.bss` storage is always zero-filled (`asm::Program::asm_code`'s
/// `.fill` directive), so non-zero initial values are materialized by
/// storing them at the top of `main`, exactly once, through the same
/// indexed-store path array element writes use elsewhere.
fn emit_global_initializers(
    fields: &[llir::Field],
    globals: &Map<Id, String>,
    out: &mut Vec<Instruction>,
) {
    for field in fields {
        let label = globals[&field.name].clone();
        for (i, value) in field.values.iter().enumerate() {
            if *value == 0 {
                continue;
            }
            out.push(Instruction::MovImmToReg(*value, SCRATCH_A));
            out.push(Instruction::MovImmToReg(i as i64, SCRATCH_B));
            out.push(Instruction::LeaToReg(Memory::Global(label.clone()), Register::Rax));
            out.push(Instruction::StoreIndexed {
                base: Register::Rax,
                index: SCRATCH_B,
                src: SCRATCH_A,
            });
        }
    }
}

fn generate_block(block: &llir::Block, ctx: &MethodCtx) -> Vec<Instruction> {
    let mut out = Vec::new();
    for assign in &block.insns {
        emit_assign(assign, ctx, &mut out);
    }
    emit_terminal(&block.term, ctx, &mut out);
    out
}

fn load_operand(op: &llir::Operand, dst: Register, ctx: &MethodCtx, out: &mut Vec<Instruction>) {
    match op {
        llir::Operand::Lit(n) => out.push(Instruction::MovImmToReg(*n, dst)),
        llir::Operand::Field(id) => out.push(Instruction::MovLocToReg(ctx.location(*id), dst)),
        llir::Operand::Str(_) => {
            unreachable!("internal error: string operand used outside a call argument")
        }
    }
}

fn load_call_arg(op: &llir::Operand, dst: Register, ctx: &MethodCtx, out: &mut Vec<Instruction>) {
    match op {
        llir::Operand::Str(s) => out.push(Instruction::LeaToReg(
            Memory::Global(ctx.string_label(*s)),
            dst,
        )),
        _ => load_operand(op, dst, ctx, out),
    }
}

fn store_reg(src: Register, dst: Id, ctx: &MethodCtx, out: &mut Vec<Instruction>) {
    out.push(Instruction::MovRegToLoc(src, ctx.location(dst)));
}

fn branch_condition(op: llir::BranchOp, unsigned: bool) -> Condition {
    use llir::BranchOp::*;
    match (op, unsigned) {
        (Eq, _) => Condition::Eq,
        (Ne, _) => Condition::Ne,
        (Lt, false) => Condition::Lt,
        (Lt, true) => Condition::Ltu,
        (Le, false) => Condition::Le,
        (Le, true) => Condition::Leu,
        (Gt, false) => Condition::Gt,
        (Gt, true) => Condition::Gtu,
        (Ge, false) => Condition::Ge,
        (Ge, true) => Condition::Geu,
    }
}

fn binop_condition(op: llir::BinOp) -> Condition {
    use llir::BinOp::*;
    match op {
        Eq => Condition::Eq,
        Ne => Condition::Ne,
        Lt => Condition::Lt,
        Le => Condition::Le,
        Gt => Condition::Gt,
        Ge => Condition::Ge,
        _ => unreachable!("internal error: not a comparison operator"),
    }
}

fn emit_assign(assign: &llir::Assign, ctx: &MethodCtx, out: &mut Vec<Instruction>) {
    match &assign.kind {
        llir::AssignKind::Move(op) => {
            load_operand(op, SCRATCH_A, ctx, out);
            store_reg(SCRATCH_A, assign.dst, ctx, out);
        }
        llir::AssignKind::Unary(llir::UnOp::Negate, op) => {
            load_operand(op, SCRATCH_A, ctx, out);
            out.push(Instruction::Neg(SCRATCH_A));
            store_reg(SCRATCH_A, assign.dst, ctx, out);
        }
        llir::AssignKind::Unary(llir::UnOp::Not, op) => {
            load_operand(op, SCRATCH_A, ctx, out);
            out.push(Instruction::MovImmToReg(0, SCRATCH_B));
            out.push(Instruction::Cmp(SCRATCH_B, SCRATCH_A));
            out.push(Instruction::SetCc(Condition::Eq, SCRATCH_A));
            out.push(Instruction::Movzbq(SCRATCH_A, SCRATCH_A));
            store_reg(SCRATCH_A, assign.dst, ctx, out);
        }
        llir::AssignKind::Bin(op, left, right) => {
            load_operand(left, SCRATCH_A, ctx, out);
            load_operand(right, SCRATCH_B, ctx, out);
            use llir::BinOp::*;
            match op {
                Add => out.push(Instruction::Add(SCRATCH_B, SCRATCH_A)),
                Sub => out.push(Instruction::Sub(SCRATCH_B, SCRATCH_A)),
                Mul => out.push(Instruction::Imul(SCRATCH_B, SCRATCH_A)),
                Div => {
                    out.push(Instruction::MovRegToReg(SCRATCH_A, Register::Rax));
                    out.push(Instruction::Cqto);
                    out.push(Instruction::Idiv(SCRATCH_B));
                    out.push(Instruction::MovRegToReg(Register::Rax, SCRATCH_A));
                }
                Mod => {
                    out.push(Instruction::MovRegToReg(SCRATCH_A, Register::Rax));
                    out.push(Instruction::Cqto);
                    out.push(Instruction::Idiv(SCRATCH_B));
                    out.push(Instruction::MovRegToReg(Register::Rdx, SCRATCH_A));
                }
                Eq | Ne | Lt | Le | Gt | Ge => {
                    out.push(Instruction::Cmp(SCRATCH_B, SCRATCH_A));
                    out.push(Instruction::SetCc(binop_condition(*op), SCRATCH_A));
                    out.push(Instruction::Movzbq(SCRATCH_A, SCRATCH_A));
                }
            }
            store_reg(SCRATCH_A, assign.dst, ctx, out);
        }
        llir::AssignKind::ArrayAccess { index, array } => {
            array_base_addr(*array, SCRATCH_A, ctx, out);
            load_operand(index, SCRATCH_B, ctx, out);
            out.push(Instruction::LoadIndexed {
                base: SCRATCH_A,
                index: SCRATCH_B,
                dst: SCRATCH_A,
            });
            store_reg(SCRATCH_A, assign.dst, ctx, out);
        }
        llir::AssignKind::ArrayUpdate { index, value } => {
            load_operand(value, SCRATCH_A, ctx, out);
            load_operand(index, SCRATCH_B, ctx, out);
            array_base_addr(assign.dst, Register::Rax, ctx, out);
            out.push(Instruction::StoreIndexed {
                base: Register::Rax,
                index: SCRATCH_B,
                src: SCRATCH_A,
            });
        }
        llir::AssignKind::Call { callee, args } => {
            emit_call(*callee, args, ctx, out);
            store_reg(Register::Rax, assign.dst, ctx, out);
        }
        llir::AssignKind::Phi(_) => {
            unreachable!("internal error: Phi reached code generation")
        }
    }
}

/// Loads the address of an array field (its base, for indexing) into `dst`.
fn array_base_addr(array: Id, dst: Register, ctx: &MethodCtx, out: &mut Vec<Instruction>) {
    match ctx.location(array) {
        Location::Mem(mem) => out.push(Instruction::LeaToReg(mem, dst)),
        Location::Reg(_) => unreachable!("internal error: field never lives in a register"),
    }
}

fn emit_call(callee: Id, args: &[llir::Operand], ctx: &MethodCtx, out: &mut Vec<Instruction>) {
    let register_args = args.len().min(ARG_REGISTERS.len());
    let stack_args = args.len().saturating_sub(ARG_REGISTERS.len());
    let extra_bytes = 8 * (stack_args + stack_args % 2) as i32;

    if stack_args > 0 {
        out.push(Instruction::ShrinkStack(extra_bytes));
        for (i, arg) in args.iter().enumerate().skip(ARG_REGISTERS.len()) {
            load_call_arg(arg, SCRATCH_A, ctx, out);
            let offset = 8 * (i - ARG_REGISTERS.len()) as i32;
            out.push(Instruction::MovRegToLoc(
                SCRATCH_A,
                Location::Mem(Memory::OutgoingArg(offset)),
            ));
        }
    }
    for (i, arg) in args.iter().take(register_args).enumerate() {
        load_call_arg(arg, ARG_REGISTERS[i], ctx, out);
    }

    // No floating-point arguments are ever passed, but the SysV varargs
    // convention still requires %al to hold the vector-register count.
    out.push(Instruction::MovImmToReg(0, Register::Rax));
    out.push(Instruction::Call(symbol(callee.as_str())));

    if stack_args > 0 {
        out.push(Instruction::GrowStack(extra_bytes));
    }
}

fn emit_terminal(term: &llir::Term, ctx: &MethodCtx, out: &mut Vec<Instruction>) {
    match term {
        llir::Term::Jump(target) => out.push(Instruction::Jmp(target.to_string())),
        llir::Term::Branch {
            op,
            unsigned,
            left,
            right,
            if_true,
            if_false,
        } => {
            load_operand(left, SCRATCH_A, ctx, out);
            load_operand(right, SCRATCH_B, ctx, out);
            out.push(Instruction::Cmp(SCRATCH_B, SCRATCH_A));
            out.push(Instruction::Jcc(
                branch_condition(*op, *unsigned),
                if_true.to_string(),
            ));
            out.push(Instruction::Jmp(if_false.to_string()));
        }
        llir::Term::Return(value) => {
            if let Some(op) = value {
                load_operand(op, Register::Rax, ctx, out);
            }
            out.push(Instruction::Leave);
            out.push(Instruction::Ret);
        }
        llir::Term::Exit(code) => {
            out.push(Instruction::MovImmToReg(*code, Register::Rdi));
            out.push(Instruction::Call(symbol("exit")));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::front::parse;
    use crate::middle::lower;

    fn compiled(src: &str) -> Program {
        let result = parse(src);
        let ast = result.program.expect("source should parse");
        let llir = lower(&ast);
        code_gen(llir)
    }

    #[test]
    fn every_method_prologue_saves_the_frame_pointer() {
        let asm = compiled("void main() { int x; x = 1; return; }");
        let main = asm.methods.iter().find(|m| m.label.ends_with("main")).unwrap();
        let entry = &main.blocks[0];
        assert!(matches!(entry.instructions[0], Instruction::Push(Register::Rbp)));
    }

    #[test]
    fn global_array_gets_a_fill_directive_sized_to_its_length() {
        let asm = compiled("int a[10]; void main() { return; }");
        let global = asm.globals.iter().find(|g| g.label.ends_with('a')).unwrap();
        assert_eq!(global.size_bytes, 80);
    }

    #[test]
    fn string_literal_argument_is_collected_once() {
        let asm = compiled(r#"void main() { printf("hi"); printf("hi"); return; }"#);
        assert_eq!(asm.strings.len(), 1);
        assert_eq!(asm.strings[0].value, "hi");
    }

    #[test]
    fn calls_past_the_sixth_argument_spill_to_rsp_relative_slots_not_rbp() {
        let asm = compiled(
            "import f; void main() { f(1, 2, 3, 4, 5, 6, 7, 8); return; }",
        );
        let main = asm.methods.iter().find(|m| m.label.ends_with("main")).unwrap();
        let stores: Vec<&Instruction> = main
            .blocks
            .iter()
            .flat_map(|b| &b.instructions)
            .filter(|i| matches!(i, Instruction::MovRegToLoc(_, Location::Mem(_))))
            .collect();
        let spilled_to_rsp = stores.iter().any(|i| {
            matches!(
                i,
                Instruction::MovRegToLoc(_, Location::Mem(Memory::OutgoingArg(_)))
            )
        });
        assert!(
            spilled_to_rsp,
            "7th/8th call arguments should spill to rsp-relative outgoing-argument slots, not rbp-relative ones"
        );
        let corrupts_saved_rbp_or_return_address = stores.iter().any(|i| {
            matches!(i, Instruction::MovRegToLoc(_, Location::Mem(Memory::Stack(o))) if *o >= 0)
        });
        assert!(
            !corrupts_saved_rbp_or_return_address,
            "no store should land on or above the saved frame pointer / return address"
        );
    }

    #[test]
    fn exit_terminal_loads_status_and_calls_exit() {
        let asm = compiled("int main() { int x; x = 0; }");
        let main = asm.methods.iter().find(|m| m.label.ends_with("main")).unwrap();
        let has_exit_call = main.blocks.iter().any(|b| {
            b.instructions
                .iter()
                .any(|i| matches!(i, Instruction::Call(label) if label.ends_with("exit")))
        });
        assert!(has_exit_call, "falling-off-the-end path should call exit");
    }
}
