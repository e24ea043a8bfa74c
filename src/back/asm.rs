//! The x86-64 instruction/operand model (C9), generalized from the
//! teacher's RISC-V `back::asm` to the System V AMD64 conventions in
//! spec §6.2: a flat `Instruction` enum with a hand-written `Display`
//! impl emitting one AT&T-syntax line each, a `Register` enum, and a
//! `Memory`/`Location` pair standing in for real register allocation.
//!
//! There is no register allocator here (Non-goals §11): every LLIR field
//! lives on the stack or in `.data`, and an instruction needing two
//! values in registers loads them into the fixed scratch pair
//! [`SCRATCH_A`]/[`SCRATCH_B`], computes, and stores the result back.

use derive_more::Display;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Register {
    #[display("%rax")]
    Rax,
    #[display("%rbx")]
    Rbx,
    #[display("%rcx")]
    Rcx,
    #[display("%rdx")]
    Rdx,
    #[display("%rsi")]
    Rsi,
    #[display("%rdi")]
    Rdi,
    #[display("%rbp")]
    Rbp,
    #[display("%rsp")]
    Rsp,
    #[display("%r8")]
    R8,
    #[display("%r9")]
    R9,
    #[display("%r10")]
    R10,
    #[display("%r11")]
    R11,
    #[display("%r12")]
    R12,
    #[display("%r13")]
    R13,
    #[display("%r14")]
    R14,
    #[display("%r15")]
    R15,
}

impl Register {
    /// The 8-bit sub-register `setcc` writes into before a `movzbq`
    /// widens the result back to a full field width.
    pub fn low_byte(&self) -> &'static str {
        match self {
            Register::Rax => "%al",
            Register::Rbx => "%bl",
            Register::Rcx => "%cl",
            Register::Rdx => "%dl",
            Register::Rsi => "%sil",
            Register::Rdi => "%dil",
            Register::Rbp => "%bpl",
            Register::Rsp => "%spl",
            Register::R8 => "%r8b",
            Register::R9 => "%r9b",
            Register::R10 => "%r10b",
            Register::R11 => "%r11b",
            Register::R12 => "%r12b",
            Register::R13 => "%r13b",
            Register::R14 => "%r14b",
            Register::R15 => "%r15b",
        }
    }
}

/// System V AMD64 integer argument registers, in order.
pub const ARG_REGISTERS: [Register; 6] = [
    Register::Rdi,
    Register::Rsi,
    Register::Rdx,
    Register::Rcx,
    Register::R8,
    Register::R9,
];

pub const SCRATCH_A: Register = Register::R10;
pub const SCRATCH_B: Register = Register::R11;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Memory {
    /// `offset(%rbp)`; offsets are negative, locals live below the frame pointer.
    Stack(i32),
    /// `offset(%rsp)`; a non-negative offset into the outgoing-argument
    /// area a call's own `ShrinkStack` just reserved. Distinct from
    /// `Stack` because it's rsp-relative rather than rbp-relative — a
    /// positive offset here would otherwise land on the saved frame
    /// pointer or return address if read back as `Stack`.
    OutgoingArg(i32),
    /// A RIP-relative reference to an already-resolved assembly symbol
    /// (platform symbol-prefixing has already been applied by the caller).
    Global(String),
    /// `(base, index, scale)` — used for array element addresses.
    Indexed { base: Register, index: Register, scale: u8 },
}

impl fmt::Display for Memory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Memory::Stack(offset) => write!(f, "{offset}(%rbp)"),
            Memory::OutgoingArg(offset) => write!(f, "{offset}(%rsp)"),
            Memory::Global(label) => write!(f, "{label}(%rip)"),
            Memory::Indexed { base, index, scale } => write!(f, "({base}, {index}, {scale})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    Mem(Memory),
    Reg(Register),
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Mem(mem) => write!(f, "{mem}"),
            Location::Reg(reg) => write!(f, "{reg}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Condition {
    #[display("e")]
    Eq,
    #[display("ne")]
    Ne,
    #[display("l")]
    Lt,
    #[display("le")]
    Le,
    #[display("g")]
    Gt,
    #[display("ge")]
    Ge,
    #[display("b")]
    Ltu,
    #[display("be")]
    Leu,
    #[display("a")]
    Gtu,
    #[display("ae")]
    Geu,
}

/// One assembly instruction. `Display` renders exactly one AT&T-syntax
/// line, indented to match the surrounding block body; `Label`/`Comment`
/// render unindented.
#[derive(Debug, Clone)]
pub enum Instruction {
    Comment(String),
    Label(String),
    Push(Register),
    Pop(Register),
    /// `subq $n, %rsp` — frame allocation.
    ShrinkStack(i32),
    /// `addq $n, %rsp` — frame teardown / extra-argument cleanup.
    GrowStack(i32),
    MovRegToLoc(Register, Location),
    MovLocToReg(Location, Register),
    MovImmToReg(i64, Register),
    MovRegToReg(Register, Register),
    LeaToReg(Memory, Register),
    LoadIndexed { base: Register, index: Register, dst: Register },
    StoreIndexed { base: Register, index: Register, src: Register },
    Add(Register, Register),
    Sub(Register, Register),
    Imul(Register, Register),
    Cqto,
    Idiv(Register),
    Neg(Register),
    Cmp(Register, Register),
    SetCc(Condition, Register),
    Movzbq(Register, Register),
    Jmp(String),
    Jcc(Condition, String),
    Call(String),
    Leave,
    Ret,
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::Comment(text) => write!(f, "    # {text}"),
            Instruction::Label(label) => write!(f, "{label}:"),
            Instruction::Push(r) => write!(f, "    pushq {r}"),
            Instruction::Pop(r) => write!(f, "    popq {r}"),
            Instruction::MovRegToLoc(src, dst) => write!(f, "    movq {src}, {dst}"),
            Instruction::MovLocToReg(src, dst) => write!(f, "    movq {src}, {dst}"),
            Instruction::MovImmToReg(imm, dst) => write!(f, "    movq ${imm}, {dst}"),
            Instruction::MovRegToReg(src, dst) => write!(f, "    movq {src}, {dst}"),
            Instruction::LeaToReg(mem, dst) => write!(f, "    leaq {mem}, {dst}"),
            Instruction::LoadIndexed { base, index, dst } => {
                write!(f, "    movq ({base}, {index}, 8), {dst}")
            }
            Instruction::StoreIndexed { base, index, src } => {
                write!(f, "    movq {src}, ({base}, {index}, 8)")
            }
            Instruction::Add(src, dst) => write!(f, "    addq {src}, {dst}"),
            Instruction::Sub(src, dst) => write!(f, "    subq {src}, {dst}"),
            Instruction::Imul(src, dst) => write!(f, "    imulq {src}, {dst}"),
            Instruction::Cqto => write!(f, "    cqto"),
            Instruction::Idiv(r) => write!(f, "    idivq {r}"),
            Instruction::Neg(r) => write!(f, "    negq {r}"),
            Instruction::Cmp(src, dst) => write!(f, "    cmpq {src}, {dst}"),
            Instruction::SetCc(cond, r) => write!(f, "    set{cond} {}", r.low_byte()),
            Instruction::Movzbq(src, dst) => write!(f, "    movzbq {}, {dst}", src.low_byte()),
            Instruction::Jmp(label) => write!(f, "    jmp {label}"),
            Instruction::Jcc(cond, label) => write!(f, "    j{cond} {label}"),
            Instruction::Call(label) => write!(f, "    call {label}"),
            Instruction::Leave => write!(f, "    leave"),
            Instruction::Ret => write!(f, "    ret"),
        }
    }
}

#[derive(Debug)]
pub struct BasicBlock {
    pub label: String,
    pub instructions: Vec<Instruction>,
}

#[derive(Debug)]
pub struct MethodAsm {
    pub label: String,
    /// Bytes reserved below `%rbp` for this method's fields, 16-byte aligned.
    pub frame_size: i32,
    pub blocks: Vec<BasicBlock>,
}

#[derive(Debug)]
pub struct GlobalField {
    pub label: String,
    pub size_bytes: u32,
}

#[derive(Debug)]
pub struct StringConst {
    pub label: String,
    pub value: String,
}

#[derive(Debug)]
pub struct Program {
    pub globals: Vec<GlobalField>,
    pub strings: Vec<StringConst>,
    pub methods: Vec<MethodAsm>,
}

impl Program {
    pub fn asm_code(&self) -> String {
        let mut out = String::new();

        out.push_str(".data\n");
        for global in &self.globals {
            out.push_str(&format!(
                ".align 8\n.globl {}\n{}:\n.fill {}\n",
                global.label, global.label, global.size_bytes
            ));
        }
        for string in &self.strings {
            out.push_str(&format!(
                "{}:\n.string {}\n",
                string.label,
                escape_string_literal(&string.value)
            ));
        }

        out.push_str(".text\n");
        for method in &self.methods {
            out.push_str(&format!(".globl {}\n", method.label));
            for block in &method.blocks {
                out.push_str(&format!("{}:\n", block.label));
                for insn in &block.instructions {
                    out.push_str(&insn.to_string());
                    out.push('\n');
                }
            }
        }

        out
    }
}

/// Quotes and escapes a raw string constant for a GNU-as `.string` directive.
pub fn escape_string_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for ch in value.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            _ => out.push(ch),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn displays_mov_immediate_in_att_syntax() {
        let insn = Instruction::MovImmToReg(5, Register::Rax);
        assert_eq!(insn.to_string(), "    movq $5, %rax");
    }

    #[test]
    fn displays_stack_operand() {
        let loc = Location::Mem(Memory::Stack(-16));
        assert_eq!(loc.to_string(), "-16(%rbp)");
    }

    #[test]
    fn displays_outgoing_arg_operand_rsp_relative() {
        let loc = Location::Mem(Memory::OutgoingArg(8));
        assert_eq!(loc.to_string(), "8(%rsp)");
    }

    #[test]
    fn escapes_quotes_and_newlines() {
        assert_eq!(escape_string_literal("hi\n\"there\""), "\"hi\\n\\\"there\\\"\"");
    }

    #[test]
    fn set_and_movzbq_use_the_low_byte_register() {
        let insn = Instruction::SetCc(Condition::Lt, Register::R10);
        assert_eq!(insn.to_string(), "    setl %r10b");
    }
}
