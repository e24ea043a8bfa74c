//! The abstract syntax tree (C3): the full Decaf-style grammar a parsed
//! program is shaped into before lowering.

use crate::common::Id;

#[derive(Debug, Clone)]
pub struct Program {
    pub imports: Vec<Id>,
    pub fields: Vec<FieldDecl>,
    pub methods: Vec<Method>,
}

#[derive(Debug, Clone)]
pub struct FieldDecl {
    pub is_const: bool,
    pub ty: ScalarType,
    pub decls: Vec<FieldIdent>,
}

#[derive(Debug, Clone)]
pub struct FieldIdent {
    pub name: Id,
    pub array_len: Option<i64>,
    pub init: Option<Initializer>,
}

#[derive(Debug, Clone)]
pub enum Initializer {
    Literal(Literal),
    ArrayLiteral(Vec<Literal>),
}

#[derive(Debug, Clone)]
pub struct Method {
    pub ret: ReturnType,
    pub name: Id,
    pub params: Vec<(ScalarType, Id)>,
    pub body: Block,
}

#[derive(Debug, Clone)]
pub struct Block {
    pub fields: Vec<FieldDecl>,
    pub stmts: Vec<Stmt>,
}

#[derive(Debug, Clone)]
pub enum Stmt {
    Assign {
        loc: Location,
        op: AssignOp,
        expr: Option<Expr>,
    },
    MethodCall(MethodCall),
    If {
        cond: Expr,
        then_block: Block,
        else_block: Option<Block>,
    },
    For {
        var: Id,
        init: Expr,
        cond: Expr,
        update: ForUpdate,
        body: Block,
    },
    While {
        cond: Expr,
        body: Block,
    },
    Return(Option<Expr>),
    Break,
    Continue,
}

#[derive(Debug, Clone)]
pub enum ForUpdate {
    Assign {
        loc: Location,
        op: AssignOp,
        expr: Option<Expr>,
    },
    MethodCall(MethodCall),
}

/// `=`, `+=`, `-=`, `*=`, `/=`, `%=`. `++`/`--` desugar to `Add`/`Sub` with
/// `expr: None` at parse time, matching `ast_increment_operator` folding
/// into `ast_assign_operator` in the C original.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Set,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

#[derive(Debug, Clone)]
pub struct Location {
    pub name: Id,
    pub index: Option<Box<Expr>>,
}

#[derive(Debug, Clone)]
pub struct MethodCall {
    pub name: Id,
    pub args: Vec<CallArg>,
}

#[derive(Debug, Clone)]
pub enum CallArg {
    Expr(Expr),
    Str(Id),
}

#[derive(Debug, Clone)]
pub enum Expr {
    Binary {
        op: BOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary(Unary),
}

#[derive(Debug, Clone)]
pub enum Unary {
    Location(Location),
    Call(MethodCall),
    Literal(Literal),
    Len(Id),
    Negate(Box<Unary>),
    Not(Box<Unary>),
    Paren(Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BOp {
    Mul,
    Div,
    Mod,
    Add,
    Sub,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
}

/// A literal's sign lives here, never folded into `Expr`: a leading `-`
/// in front of a literal is part of the literal, not a unary-negate node
/// (matches `ast_literal.negate` in the C original).
#[derive(Debug, Clone, Copy)]
pub struct Literal {
    pub negate: bool,
    pub kind: LiteralKind,
}

#[derive(Debug, Clone, Copy)]
pub enum LiteralKind {
    Int(i64),
    Char(u8),
    Bool(bool),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarType {
    Int,
    Bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnType {
    Int,
    Bool,
    Void,
}
