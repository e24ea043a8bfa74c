//! AST -> LLIR lowering (C7): one stateful walk that turns a parsed
//! program into the block IR in [`crate::middle::llir`].
//!
//! Grounded in `examples/original_source/src/assembly/llir_generator.c`.
//! Persistent state matches that source's globals, just scoped to a
//! value instead of process-wide: a per-method temporary counter, a
//! per-program block counter, break/continue target stacks, and the
//! assembly-stage symbol table from [`crate::front::symbol`].

use crate::common::{intern, Id, Set};
use crate::front::ast::{
    self, AssignOp, BOp, CallArg, Expr, ForUpdate, Initializer, Literal, LiteralKind, Location,
    Method as AstMethod, MethodCall, Program as AstProgram, Stmt, Unary,
};
use crate::front::symbol::{FieldDescriptor, MethodDescriptor, SymbolTable};
use crate::middle::llir::{
    recompute_predecessors, AssignKind, BinOp, Block, BlockId, BranchOp, Field, Method, Operand,
    Program, Term, UnOp,
};

pub fn lower(program: &AstProgram) -> Program {
    let mut lowerer = Lowerer::new();

    let mut fields = Vec::new();
    let mut global_inits: Vec<(Id, bool, Option<Initializer>)> = Vec::new();
    for decl in &program.fields {
        for ident in &decl.decls {
            let is_array = ident.array_len.is_some();
            let length = ident.array_len.map(|n| n as usize).unwrap_or(1);
            lowerer
                .symtab
                .declare_field(ident.name, FieldDescriptor { is_array, length })
                .expect("duplicate global field should have been rejected before lowering");
            fields.push(Field {
                name: ident.name,
                scope_level: 0,
                is_array,
                values: initial_values(ident, is_array, length),
            });
            global_inits.push((ident.name, is_array, ident.init.clone()));
        }
    }

    for method in &program.methods {
        lowerer
            .symtab
            .declare_method(
                method.name,
                MethodDescriptor {
                    param_count: method.params.len(),
                },
            )
            .expect("duplicate method should have been rejected before lowering");
    }

    let methods = program
        .methods
        .iter()
        .map(|m| lowerer.lower_method(m, &global_inits))
        .collect();

    Program { fields, methods }
}

fn initial_values(ident: &ast::FieldIdent, is_array: bool, length: usize) -> Vec<i64> {
    if is_array {
        let mut values = vec![0; length];
        if let Some(Initializer::ArrayLiteral(lits)) = &ident.init {
            for (i, lit) in lits.iter().enumerate() {
                if i < length {
                    values[i] = literal_value(lit);
                }
            }
        }
        values
    } else {
        let mut values = vec![0];
        if let Some(Initializer::Literal(lit)) = &ident.init {
            values[0] = literal_value(lit);
        }
        values
    }
}

fn literal_value(lit: &Literal) -> i64 {
    let base = match lit.kind {
        LiteralKind::Int(n) => n,
        LiteralKind::Char(c) => c as i64,
        LiteralKind::Bool(b) => b as i64,
    };
    if lit.negate {
        base.wrapping_neg()
    } else {
        base
    }
}

fn assign_op_to_binop(op: AssignOp) -> BinOp {
    match op {
        AssignOp::Add => BinOp::Add,
        AssignOp::Sub => BinOp::Sub,
        AssignOp::Mul => BinOp::Mul,
        AssignOp::Div => BinOp::Div,
        AssignOp::Mod => BinOp::Mod,
        AssignOp::Set => unreachable!("internal error: `=` has no corresponding binary op"),
    }
}

fn bop_to_binop(op: BOp) -> BinOp {
    match op {
        BOp::Mul => BinOp::Mul,
        BOp::Div => BinOp::Div,
        BOp::Mod => BinOp::Mod,
        BOp::Add => BinOp::Add,
        BOp::Sub => BinOp::Sub,
        BOp::Lt => BinOp::Lt,
        BOp::Le => BinOp::Le,
        BOp::Gt => BinOp::Gt,
        BOp::Ge => BinOp::Ge,
        BOp::Eq => BinOp::Eq,
        BOp::Ne => BinOp::Ne,
        BOp::And | BOp::Or => unreachable!("internal error: short-circuit ops never reach here"),
    }
}

struct Lowerer {
    symtab: SymbolTable,
    next_block: u32,
    next_temp: u32,
    blocks: Vec<Block>,
    cur_id: BlockId,
    cur_locals: Vec<Field>,
    cur_insns: Vec<crate::middle::llir::Assign>,
    cur_term: Option<Term>,
    break_stack: Vec<BlockId>,
    continue_stack: Vec<BlockId>,
}

impl Lowerer {
    fn new() -> Self {
        Lowerer {
            symtab: SymbolTable::new(),
            next_block: 0,
            next_temp: 0,
            blocks: Vec::new(),
            cur_id: BlockId(0),
            cur_locals: Vec::new(),
            cur_insns: Vec::new(),
            cur_term: None,
            break_stack: Vec::new(),
            continue_stack: Vec::new(),
        }
    }

    fn new_block(&mut self) -> BlockId {
        let id = BlockId(self.next_block);
        self.next_block += 1;
        id
    }

    /// Allocates `$N`, declares it as a scalar field of the current scope
    /// and block, and returns its identifier.
    fn new_temp(&mut self) -> Id {
        let name = intern(&format!("${}", self.next_temp));
        self.next_temp += 1;
        self.symtab
            .declare_field(
                name,
                FieldDescriptor {
                    is_array: false,
                    length: 1,
                },
            )
            .expect("internal error: temporary name collided");
        self.cur_locals.push(Field {
            name,
            scope_level: self.symtab.scope_level(),
            is_array: false,
            values: vec![0],
        });
        name
    }

    fn emit(&mut self, dst: Id, kind: AssignKind) {
        self.cur_insns.push(crate::middle::llir::Assign { dst, kind });
    }

    fn set_terminal(&mut self, term: Term) {
        assert!(
            self.cur_term.is_none(),
            "internal error: block terminal set twice"
        );
        self.cur_term = Some(term);
    }

    /// Finishes the current block with its already-set terminal, then
    /// makes `next` the new current block.
    fn switch_to(&mut self, next: BlockId) {
        let term = self
            .cur_term
            .take()
            .expect("internal error: block must have a terminal before switching");
        self.blocks.push(Block {
            id: self.cur_id,
            locals: std::mem::take(&mut self.cur_locals),
            insns: std::mem::take(&mut self.cur_insns),
            term,
            preds: Set::new(),
        });
        self.cur_id = next;
    }

    fn finish_method(&mut self) {
        let term = self
            .cur_term
            .take()
            .expect("internal error: method must end with a terminal");
        self.blocks.push(Block {
            id: self.cur_id,
            locals: std::mem::take(&mut self.cur_locals),
            insns: std::mem::take(&mut self.cur_insns),
            term,
            preds: Set::new(),
        });
    }

    fn lower_method(
        &mut self,
        method: &AstMethod,
        global_inits: &[(Id, bool, Option<Initializer>)],
    ) -> Method {
        self.next_temp = 0;
        self.blocks.clear();
        self.break_stack.clear();
        self.continue_stack.clear();
        self.symtab.push_scope();

        let params: Vec<Id> = method
            .params
            .iter()
            .map(|(_, name)| {
                self.symtab
                    .declare_field(
                        *name,
                        FieldDescriptor {
                            is_array: false,
                            length: 1,
                        },
                    )
                    .expect("duplicate parameter should have been rejected before lowering");
                *name
            })
            .collect();

        self.cur_id = self.new_block();
        self.cur_locals.clear();
        self.cur_insns.clear();
        self.cur_term = None;

        if method.name.as_str() == "main" {
            for (name, is_array, init) in global_inits {
                self.emit_initializer(*name, *is_array, init);
            }
        }

        self.lower_block(&method.body);

        if self.cur_term.is_none() {
            let epilogue = match method.ret {
                ast::ReturnType::Void => Term::Return(None),
                ast::ReturnType::Int | ast::ReturnType::Bool => Term::Exit(-2),
            };
            self.set_terminal(epilogue);
        }
        self.finish_method();

        self.symtab.pop_scope();

        let mut built = Method {
            name: method.name,
            params,
            blocks: std::mem::take(&mut self.blocks),
        };
        recompute_predecessors(&mut built);
        built
    }

    fn lower_block(&mut self, block: &ast::Block) {
        for decl in &block.fields {
            for ident in &decl.decls {
                self.declare_local(ident);
            }
        }
        for stmt in &block.stmts {
            self.lower_stmt(stmt);
        }
    }

    fn declare_local(&mut self, ident: &ast::FieldIdent) {
        let is_array = ident.array_len.is_some();
        let length = ident.array_len.map(|n| n as usize).unwrap_or(1);
        self.symtab
            .declare_field(ident.name, FieldDescriptor { is_array, length })
            .expect("duplicate local field should have been rejected before lowering");
        self.cur_locals.push(Field {
            name: ident.name,
            scope_level: self.symtab.scope_level(),
            is_array,
            values: vec![0; length],
        });
        self.emit_initializer(ident.name, is_array, &ident.init);
    }

    fn emit_initializer(&mut self, name: Id, is_array: bool, init: &Option<Initializer>) {
        match init {
            None => {}
            Some(Initializer::Literal(lit)) => {
                let value = literal_value(lit);
                self.emit(name, AssignKind::Move(Operand::Lit(value)));
            }
            Some(Initializer::ArrayLiteral(lits)) => {
                debug_assert!(is_array, "internal error: array initializer on a scalar");
                for (i, lit) in lits.iter().enumerate() {
                    self.emit(
                        name,
                        AssignKind::ArrayUpdate {
                            index: Operand::Lit(i as i64),
                            value: Operand::Lit(literal_value(lit)),
                        },
                    );
                }
            }
        }
    }

    fn lower_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Assign { loc, op, expr } => self.lower_assign(loc, *op, expr),
            Stmt::MethodCall(call) => {
                self.lower_call(call);
            }
            Stmt::If {
                cond,
                then_block,
                else_block,
            } => self.lower_if(cond, then_block, else_block.as_ref()),
            Stmt::For {
                var,
                init,
                cond,
                update,
                body,
            } => self.lower_for(*var, init, cond, update, body),
            Stmt::While { cond, body } => self.lower_while(cond, body),
            Stmt::Return(expr) => self.lower_return(expr),
            Stmt::Break => self.lower_break(),
            Stmt::Continue => self.lower_continue(),
        }
    }

    fn lower_for_update(&mut self, update: &ForUpdate) {
        match update {
            ForUpdate::Assign { loc, op, expr } => self.lower_assign(loc, *op, expr),
            ForUpdate::MethodCall(call) => {
                self.lower_call(call);
            }
        }
    }

    /// Shared by plain assignment, compound assignment, and `++`/`--`
    /// (which parse to a compound op with `expr: None`, read as literal 1).
    fn lower_assign(&mut self, loc: &Location, op: AssignOp, expr: &Option<Expr>) {
        let rhs = match expr {
            Some(e) => self.lower_expr(e),
            None => {
                let t = self.new_temp();
                self.emit(t, AssignKind::Move(Operand::Lit(1)));
                t
            }
        };

        match &loc.index {
            None => match op {
                AssignOp::Set => self.emit(loc.name, AssignKind::Move(Operand::Field(rhs))),
                _ => {
                    let binop = assign_op_to_binop(op);
                    let result = self.new_temp();
                    self.emit(
                        result,
                        AssignKind::Bin(binop, Operand::Field(loc.name), Operand::Field(rhs)),
                    );
                    self.emit(loc.name, AssignKind::Move(Operand::Field(result)));
                }
            },
            Some(index_expr) => {
                let index = self.lower_expr(index_expr);
                self.bounds_check(loc.name, index);
                match op {
                    AssignOp::Set => self.emit(
                        loc.name,
                        AssignKind::ArrayUpdate {
                            index: Operand::Field(index),
                            value: Operand::Field(rhs),
                        },
                    ),
                    _ => {
                        let binop = assign_op_to_binop(op);
                        let old = self.new_temp();
                        self.emit(
                            old,
                            AssignKind::ArrayAccess {
                                index: Operand::Field(index),
                                array: loc.name,
                            },
                        );
                        let result = self.new_temp();
                        self.emit(
                            result,
                            AssignKind::Bin(binop, Operand::Field(old), Operand::Field(rhs)),
                        );
                        self.emit(
                            loc.name,
                            AssignKind::ArrayUpdate {
                                index: Operand::Field(index),
                                value: Operand::Field(result),
                            },
                        );
                    }
                }
            }
        }
    }

    /// Emits the safe/out-of-bounds block pair ahead of a dynamic array
    /// access, then leaves the safe block current so lowering continues
    /// there (spec: every dynamic-index access is preceded by exactly
    /// this branch).
    fn bounds_check(&mut self, array: Id, index: Id) {
        let length = self
            .symtab
            .lookup_field(array)
            .expect("array field must be declared before use")
            .length as i64;
        let safe = self.new_block();
        let oob = self.new_block();
        self.set_terminal(Term::Branch {
            op: BranchOp::Lt,
            unsigned: true,
            left: Operand::Field(index),
            right: Operand::Lit(length),
            if_true: safe,
            if_false: oob,
        });
        self.switch_to(oob);
        self.set_terminal(Term::Exit(-1));
        self.switch_to(safe);
    }

    fn lower_if(&mut self, cond: &Expr, then_block: &ast::Block, else_block: Option<&ast::Block>) {
        let cond_val = self.lower_expr(cond);
        let then_id = self.new_block();
        let end_id = self.new_block();
        let else_id = else_block.map(|_| self.new_block());
        let false_target = else_id.unwrap_or(end_id);

        self.set_terminal(Term::Branch {
            op: BranchOp::Eq,
            unsigned: false,
            left: Operand::Field(cond_val),
            right: Operand::Lit(0),
            if_true: false_target,
            if_false: then_id,
        });

        self.switch_to(then_id);
        self.symtab.push_scope();
        self.lower_block(then_block);
        self.symtab.pop_scope();
        self.set_terminal(Term::Jump(end_id));

        if let (Some(else_id), Some(else_block)) = (else_id, else_block) {
            self.switch_to(else_id);
            self.symtab.push_scope();
            self.lower_block(else_block);
            self.symtab.pop_scope();
            self.set_terminal(Term::Jump(end_id));
        }

        self.switch_to(end_id);
    }

    fn lower_for(&mut self, var: Id, init: &Expr, cond: &Expr, update: &ForUpdate, body: &ast::Block) {
        let init_val = self.lower_expr(init);
        self.emit(var, AssignKind::Move(Operand::Field(init_val)));

        let cond_id = self.new_block();
        let body_id = self.new_block();
        let update_id = self.new_block();
        let end_id = self.new_block();

        self.set_terminal(Term::Jump(cond_id));
        self.switch_to(cond_id);
        let cond_val = self.lower_expr(cond);
        self.set_terminal(Term::Branch {
            op: BranchOp::Eq,
            unsigned: false,
            left: Operand::Field(cond_val),
            right: Operand::Lit(0),
            if_true: end_id,
            if_false: body_id,
        });

        self.switch_to(body_id);
        self.break_stack.push(end_id);
        self.continue_stack.push(update_id);
        self.symtab.push_scope();
        self.lower_block(body);
        self.symtab.pop_scope();
        self.break_stack.pop();
        self.continue_stack.pop();
        self.set_terminal(Term::Jump(update_id));

        self.switch_to(update_id);
        self.lower_for_update(update);
        self.set_terminal(Term::Jump(cond_id));

        self.switch_to(end_id);
    }

    fn lower_while(&mut self, cond: &Expr, body: &ast::Block) {
        let cond_id = self.new_block();
        let body_id = self.new_block();
        let end_id = self.new_block();

        self.set_terminal(Term::Jump(cond_id));
        self.switch_to(cond_id);
        let cond_val = self.lower_expr(cond);
        self.set_terminal(Term::Branch {
            op: BranchOp::Eq,
            unsigned: false,
            left: Operand::Field(cond_val),
            right: Operand::Lit(0),
            if_true: end_id,
            if_false: body_id,
        });

        self.switch_to(body_id);
        self.break_stack.push(end_id);
        self.continue_stack.push(cond_id);
        self.symtab.push_scope();
        self.lower_block(body);
        self.symtab.pop_scope();
        self.break_stack.pop();
        self.continue_stack.pop();
        self.set_terminal(Term::Jump(cond_id));

        self.switch_to(end_id);
    }

    fn lower_return(&mut self, expr: &Option<Expr>) {
        let operand = expr.as_ref().map(|e| Operand::Field(self.lower_expr(e)));
        self.set_terminal(Term::Return(operand));
        let next = self.new_block();
        self.switch_to(next);
    }

    fn lower_break(&mut self) {
        let target = *self
            .break_stack
            .last()
            .expect("break outside a loop should have been rejected before lowering");
        self.set_terminal(Term::Jump(target));
        let next = self.new_block();
        self.switch_to(next);
    }

    fn lower_continue(&mut self) {
        let target = *self
            .continue_stack
            .last()
            .expect("continue outside a loop should have been rejected before lowering");
        self.set_terminal(Term::Jump(target));
        let next = self.new_block();
        self.switch_to(next);
    }

    fn lower_expr(&mut self, expr: &Expr) -> Id {
        match expr {
            Expr::Unary(u) => self.lower_unary(u),
            Expr::Binary { op, left, right } => match op {
                BOp::And | BOp::Or => self.lower_short_circuit(*op, left, right),
                _ => {
                    let l = self.lower_expr(left);
                    let r = self.lower_expr(right);
                    let dst = self.new_temp();
                    self.emit(
                        dst,
                        AssignKind::Bin(bop_to_binop(*op), Operand::Field(l), Operand::Field(r)),
                    );
                    dst
                }
            },
        }
    }

    /// `L && R` / `L || R` with destination `t`: `t` starts out holding
    /// `L`; if that already decides the result we jump straight past `R`,
    /// otherwise a second block evaluates `R` and moves it into `t`.
    fn lower_short_circuit(&mut self, op: BOp, left: &Expr, right: &Expr) -> Id {
        let t = self.lower_expr(left);
        let rhs_block = self.new_block();
        let end_block = self.new_block();

        // `&&`: short-circuits (skips R) when t != 1. `||`: short-circuits when t == 1.
        let short_circuits_on = match op {
            BOp::And => BranchOp::Ne,
            BOp::Or => BranchOp::Eq,
            _ => unreachable!("internal error: not a short-circuit operator"),
        };

        self.set_terminal(Term::Branch {
            op: short_circuits_on,
            unsigned: false,
            left: Operand::Field(t),
            right: Operand::Lit(1),
            if_true: end_block,
            if_false: rhs_block,
        });

        self.switch_to(rhs_block);
        let r = self.lower_expr(right);
        self.emit(t, AssignKind::Move(Operand::Field(r)));
        self.set_terminal(Term::Jump(end_block));

        self.switch_to(end_block);
        t
    }

    fn lower_unary(&mut self, unary: &Unary) -> Id {
        match unary {
            Unary::Location(loc) => self.lower_location_read(loc),
            Unary::Call(call) => self.lower_call(call),
            Unary::Literal(lit) => {
                let value = literal_value(lit);
                let dst = self.new_temp();
                self.emit(dst, AssignKind::Move(Operand::Lit(value)));
                dst
            }
            Unary::Len(name) => {
                let length = self
                    .symtab
                    .lookup_field(*name)
                    .expect("array field must be declared before `len`")
                    .length as i64;
                let dst = self.new_temp();
                self.emit(dst, AssignKind::Move(Operand::Lit(length)));
                dst
            }
            Unary::Negate(inner) => {
                let v = self.lower_unary(inner);
                let dst = self.new_temp();
                self.emit(dst, AssignKind::Unary(UnOp::Negate, Operand::Field(v)));
                dst
            }
            Unary::Not(inner) => {
                let v = self.lower_unary(inner);
                let dst = self.new_temp();
                self.emit(dst, AssignKind::Unary(UnOp::Not, Operand::Field(v)));
                dst
            }
            Unary::Paren(expr) => self.lower_expr(expr),
        }
    }

    fn lower_location_read(&mut self, loc: &Location) -> Id {
        match &loc.index {
            None => {
                let dst = self.new_temp();
                self.emit(dst, AssignKind::Move(Operand::Field(loc.name)));
                dst
            }
            Some(index_expr) => {
                let index = self.lower_expr(index_expr);
                self.bounds_check(loc.name, index);
                let dst = self.new_temp();
                self.emit(
                    dst,
                    AssignKind::ArrayAccess {
                        index: Operand::Field(index),
                        array: loc.name,
                    },
                );
                dst
            }
        }
    }

    fn lower_call(&mut self, call: &MethodCall) -> Id {
        let args = call
            .args
            .iter()
            .map(|arg| match arg {
                CallArg::Expr(e) => Operand::Field(self.lower_expr(e)),
                CallArg::Str(s) => Operand::Str(*s),
            })
            .collect();
        let dst = self.new_temp();
        self.emit(
            dst,
            AssignKind::Call {
                callee: call.name,
                args,
            },
        );
        dst
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::front::parse::parse;

    fn lower_src(src: &str) -> Program {
        let result = parse(src);
        lower(&result.program.expect("source should parse"))
    }

    #[test]
    fn every_block_has_exactly_one_terminal_shape() {
        let program = lower_src("void main() { int x; x = 1; if (x == 1) { x = 2; } }");
        let main = &program.methods[0];
        assert!(!main.blocks.is_empty());
    }

    #[test]
    fn for_loop_continue_target_is_update_block() {
        let program = lower_src(
            "int main() { int s; s = 0; for (i = 0; i < 10; i += 1) { continue; } return s; }",
        );
        let main = &program.methods[0];
        // body block's continue jumps to the update block, not the condition block.
        let body = &main.blocks[2];
        assert!(matches!(body.term, Term::Jump(_)));
    }

    #[test]
    fn array_access_is_preceded_by_a_bounds_check_branch() {
        let program = lower_src("void main() { int a[3]; a[0] = 1; }");
        let main = &program.methods[0];
        let has_branch = main
            .blocks
            .iter()
            .any(|b| matches!(b.term, Term::Branch { op: BranchOp::Lt, unsigned: true, .. }));
        assert!(has_branch);
        let has_oob_exit = main.blocks.iter().any(|b| matches!(b.term, Term::Exit(-1)));
        assert!(has_oob_exit);
    }

    #[test]
    fn void_method_falling_off_the_end_gets_return_zero() {
        let program = lower_src("void main() { }");
        let last = program.methods[0].blocks.last().unwrap();
        assert!(matches!(last.term, Term::Return(None)));
    }

    #[test]
    fn non_void_method_falling_off_the_end_exits_negative_two() {
        let program = lower_src("int f() { int x; x = 1; }");
        let last = program.methods[0].blocks.last().unwrap();
        assert!(matches!(last.term, Term::Exit(-2)));
    }

    #[test]
    fn increment_lowers_to_compound_add_of_one() {
        let program = lower_src("void main() { int x; x++; }");
        let main = &program.methods[0];
        let found = main.blocks.iter().flat_map(|b| &b.insns).any(|a| {
            matches!(&a.kind, AssignKind::Bin(BinOp::Add, _, Operand::Field(_)))
                || matches!(&a.kind, AssignKind::Move(Operand::Lit(1)))
        });
        assert!(found);
    }
}
