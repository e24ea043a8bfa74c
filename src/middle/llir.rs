//! The low-level IR (C6): a three-address, block-structured form that
//! lowering builds and the optimizer and code emitter both walk.
//!
//! Generalizes the teacher's tiny IR (`Program`/`Block`/`Instruction`/
//! `Terminator`) to the full block-IR in the original's
//! `llir.h`/`llir_generator.c` pair. The coexisting linked-list IR
//! (`llir.c`) is vestigial there and has no counterpart here: blocks are
//! owned by a `Vec` on their method, and control edges are plain
//! `BlockId` indices rather than pointers, so cycles (loops) need no
//! unsafe graph-freeing code.

use std::fmt;

use derive_more::Display;

use crate::common::{Id, Set};

#[derive(Debug)]
pub struct Program {
    pub fields: Vec<Field>,
    pub methods: Vec<Method>,
}

/// A global or local field. Scalars have `values.len() == 1`; arrays
/// carry one entry per element. Missing initializers are zero, never
/// absent, so `values` is always fully populated.
#[derive(Debug, Clone)]
pub struct Field {
    pub name: Id,
    pub scope_level: u32,
    pub is_array: bool,
    pub values: Vec<i64>,
}

impl Field {
    pub fn len(&self) -> usize {
        self.values.len()
    }
}

#[derive(Debug)]
pub struct Method {
    pub name: Id,
    pub params: Vec<Id>,
    pub blocks: Vec<Block>,
}

/// A stable per-program index, used both to address a block within its
/// method's `Vec<Block>` and to synthesize its assembly label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display)]
#[display("L{_0}")]
pub struct BlockId(pub u32);

#[derive(Debug)]
pub struct Block {
    pub id: BlockId,
    pub locals: Vec<Field>,
    pub insns: Vec<Assign>,
    pub term: Term,
    pub preds: Set<BlockId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    Lit(i64),
    Field(Id),
    Str(Id),
}

impl Operand {
    pub fn as_field(&self) -> Option<Id> {
        match self {
            Operand::Field(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_lit(&self) -> Option<i64> {
        match self {
            Operand::Lit(n) => Some(*n),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub struct Assign {
    pub dst: Id,
    pub kind: AssignKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum UnOp {
    #[display("NOT")]
    Not,
    #[display("NEGATE")]
    Negate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum BinOp {
    #[display("ADD")]
    Add,
    #[display("SUB")]
    Sub,
    #[display("MUL")]
    Mul,
    #[display("DIV")]
    Div,
    #[display("MOD")]
    Mod,
    #[display("EQ")]
    Eq,
    #[display("NE")]
    Ne,
    #[display("LT")]
    Lt,
    #[display("LE")]
    Le,
    #[display("GT")]
    Gt,
    #[display("GE")]
    Ge,
}

impl BinOp {
    pub fn is_comparison(&self) -> bool {
        use BinOp::*;
        matches!(self, Eq | Ne | Lt | Le | Gt | Ge)
    }
}

#[derive(Debug)]
pub enum AssignKind {
    Move(Operand),
    Unary(UnOp, Operand),
    Bin(BinOp, Operand, Operand),
    ArrayAccess { index: Operand, array: Id },
    /// `dst` names the array being stored into, not the value.
    ArrayUpdate { index: Operand, value: Operand },
    Call { callee: Id, args: Vec<Operand> },
    /// SSA-only; no pass in this pipeline ever constructs one (spec §9 —
    /// kept for shape-completeness should SSA construction be added later).
    Phi(Vec<Operand>),
}

impl AssignKind {
    /// Every field-ref operand this assignment reads. Used by CF/CP's
    /// reaching-definition walk and by DCE's liveness propagation.
    pub fn reads(&self) -> Vec<Id> {
        let ops: Vec<&Operand> = match self {
            AssignKind::Move(op) => vec![op],
            AssignKind::Unary(_, op) => vec![op],
            AssignKind::Bin(_, l, r) => vec![l, r],
            AssignKind::ArrayAccess { index, .. } => vec![index],
            AssignKind::ArrayUpdate { index, value } => vec![index, value],
            AssignKind::Call { args, .. } => args.iter().collect(),
            AssignKind::Phi(args) => args.iter().collect(),
        };
        ops.into_iter().filter_map(Operand::as_field).collect()
    }

    pub fn reads_mut(&mut self) -> Vec<&mut Operand> {
        match self {
            AssignKind::Move(op) => vec![op],
            AssignKind::Unary(_, op) => vec![op],
            AssignKind::Bin(_, l, r) => vec![l, r],
            AssignKind::ArrayAccess { index, .. } => vec![index],
            AssignKind::ArrayUpdate { index, value } => vec![index, value],
            AssignKind::Call { args, .. } => args.iter_mut().collect(),
            AssignKind::Phi(args) => args.iter_mut().collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum BranchOp {
    #[display("EQ")]
    Eq,
    #[display("NE")]
    Ne,
    #[display("LT")]
    Lt,
    #[display("LE")]
    Le,
    #[display("GT")]
    Gt,
    #[display("GE")]
    Ge,
}

#[derive(Debug)]
pub enum Term {
    Jump(BlockId),
    Branch {
        op: BranchOp,
        unsigned: bool,
        left: Operand,
        right: Operand,
        if_true: BlockId,
        if_false: BlockId,
    },
    Return(Option<Operand>),
    /// Calls the runtime `exit` with this literal status. Used for the
    /// array-bounds-check failure path (-1) and for a non-void method
    /// falling off its end without an explicit `return` (-2).
    Exit(i64),
}

impl Term {
    /// The blocks this terminal can transfer control to, in target order.
    pub fn targets(&self) -> Vec<BlockId> {
        match self {
            Term::Jump(b) => vec![*b],
            Term::Branch {
                if_true, if_false, ..
            } => vec![*if_true, *if_false],
            Term::Return(_) | Term::Exit(_) => vec![],
        }
    }

    /// Every field-ref operand read directly by this terminal (branch
    /// operands, a return value). Seeds DCE's liveness set.
    pub fn reads(&self) -> Vec<Id> {
        match self {
            Term::Branch { left, right, .. } => [left, right]
                .into_iter()
                .filter_map(Operand::as_field)
                .collect(),
            Term::Return(Some(op)) => op.as_field().into_iter().collect(),
            Term::Return(None) | Term::Jump(_) | Term::Exit(_) => vec![],
        }
    }
}

/// Recomputes every block's `preds` set from its method's terminals.
/// Lowering keeps `preds` correct as it wires blocks, but the optimizer
/// recomputes it before every pass (spec §8) so pass order never matters
/// even though none of CF/CP/DCE currently rewrite a `Term`'s targets.
pub fn recompute_predecessors(method: &mut Method) {
    for block in &mut method.blocks {
        block.preds.clear();
    }
    let edges: Vec<(BlockId, BlockId)> = method
        .blocks
        .iter()
        .flat_map(|b| b.term.targets().into_iter().map(move |t| (b.id, t)))
        .collect();
    for (from, to) in edges {
        if let Some(block) = method.blocks.iter_mut().find(|b| b.id == to) {
            block.preds.insert(from);
        }
    }
}

/// Textual dump of LLIR, used by the `-d`/`--debug` CLI flag and the
/// `inter` compilation target in place of assembly text. One line per
/// field or assignment, the three-address shape of §3.4 spelled out
/// directly rather than relying on `Debug`.
impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Lit(n) => write!(f, "{n}"),
            Operand::Field(id) => write!(f, "{id}"),
            Operand::Str(s) => write!(f, "{s:?}"),
        }
    }
}

impl fmt::Display for AssignKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssignKind::Move(op) => write!(f, "MOVE {op}"),
            AssignKind::Unary(op, a) => write!(f, "{op} {a}"),
            AssignKind::Bin(op, l, r) => write!(f, "{op} {l}, {r}"),
            AssignKind::ArrayAccess { index, array } => write!(f, "ARRAY_ACCESS {array}[{index}]"),
            AssignKind::ArrayUpdate { index, value } => write!(f, "ARRAY_UPDATE [{index}] = {value}"),
            AssignKind::Call { callee, args } => {
                write!(f, "METHOD_CALL {callee}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ")")
            }
            AssignKind::Phi(args) => {
                write!(f, "PHI(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ")")
            }
        }
    }
}

impl fmt::Display for Assign {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "    {} = {}", self.dst, self.kind)
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Jump(target) => write!(f, "    JUMP {target}"),
            Term::Branch { op, unsigned, left, right, if_true, if_false } => write!(
                f,
                "    BRANCH {op}{} {left}, {right} ? {if_true} : {if_false}",
                if *unsigned { "u" } else { "" }
            ),
            Term::Return(Some(op)) => write!(f, "    RETURN {op}"),
            Term::Return(None) => write!(f, "    RETURN"),
            Term::Exit(code) => write!(f, "    EXIT {code}"),
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_array {
            write!(f, "{}[{}]", self.name, self.len())?;
        } else {
            write!(f, "{}", self.name)?;
        }
        if self.values.iter().any(|v| *v != 0) {
            write!(f, " = {:?}", self.values)?;
        }
        Ok(())
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}:", self.id)?;
        for local in &self.locals {
            writeln!(f, "    local {local}")?;
        }
        for insn in &self.insns {
            writeln!(f, "{insn}")?;
        }
        write!(f, "{}", self.term)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{param}")?;
        }
        writeln!(f, "):")?;
        for block in &self.blocks {
            writeln!(f, "{block}")?;
        }
        Ok(())
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for field in &self.fields {
            writeln!(f, "field {field}")?;
        }
        for method in &self.methods {
            writeln!(f)?;
            write!(f, "{method}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::intern;

    fn field(name: &str) -> Id {
        intern(name)
    }

    #[test]
    fn move_and_bin_assigns_render_as_three_address_lines() {
        let assign = Assign {
            dst: field("t0"),
            kind: AssignKind::Bin(BinOp::Add, Operand::Field(field("a")), Operand::Lit(1)),
        };
        assert_eq!(assign.to_string(), "    t0 = ADD a, 1");
    }

    #[test]
    fn branch_term_renders_both_targets_and_the_unsigned_suffix() {
        let term = Term::Branch {
            op: BranchOp::Lt,
            unsigned: true,
            left: Operand::Field(field("i")),
            right: Operand::Lit(10),
            if_true: BlockId(1),
            if_false: BlockId(2),
        };
        assert_eq!(term.to_string(), "    BRANCH LTu i, 10 ? L1 : L2");
    }

    #[test]
    fn array_field_display_includes_its_length() {
        let f = Field {
            name: field("a"),
            scope_level: 0,
            is_array: true,
            values: vec![0, 0, 3],
        };
        assert_eq!(f.to_string(), "a[3] = [0, 0, 3]");
    }

    #[test]
    fn program_display_lists_fields_before_methods() {
        let program = Program {
            fields: vec![Field {
                name: field("g"),
                scope_level: 0,
                is_array: false,
                values: vec![0],
            }],
            methods: vec![Method {
                name: field("main"),
                params: vec![],
                blocks: vec![Block {
                    id: BlockId(0),
                    locals: vec![],
                    insns: vec![],
                    term: Term::Return(None),
                    preds: Set::new(),
                }],
            }],
        };
        let text = program.to_string();
        assert!(text.starts_with("field g\n"));
        assert!(text.contains("main():\n"));
        assert!(text.contains("L0:\n"));
    }
}
