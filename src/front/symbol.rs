//! The assembly-stage symbol table (C5): tracks field and method shapes
//! while lowering walks the AST. This is distinct from (and runs after)
//! whatever semantic-analysis symbol table a front end of this language
//! would use to check types; that pass is an external collaborator we
//! assume has already run.

use crate::common::{Id, Map};

#[derive(Debug, Clone, Copy)]
pub struct FieldDescriptor {
    pub is_array: bool,
    pub length: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct MethodDescriptor {
    pub param_count: usize,
}

#[derive(Debug, Default)]
struct Scope {
    methods: Map<Id, MethodDescriptor>,
    fields: Map<Id, FieldDescriptor>,
}

/// A stack of scopes, innermost last. Lookups walk outward-to-in so an
/// inner declaration shadows an outer one of the same name.
#[derive(Debug, Default)]
pub struct SymbolTable {
    scopes: Vec<Scope>,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable {
            scopes: vec![Scope::default()],
        }
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(Scope::default());
    }

    pub fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    pub fn scope_level(&self) -> u32 {
        self.scopes.len() as u32 - 1
    }

    /// Declares a field in the current (innermost) scope. Fails if the
    /// name is already bound in this same scope.
    pub fn declare_field(&mut self, name: Id, descriptor: FieldDescriptor) -> Result<(), ()> {
        let scope = self.scopes.last_mut().expect("at least one scope");
        if scope.fields.contains_key(&name) {
            return Err(());
        }
        scope.fields.insert(name, descriptor);
        Ok(())
    }

    pub fn declare_method(&mut self, name: Id, descriptor: MethodDescriptor) -> Result<(), ()> {
        let scope = self.scopes.last_mut().expect("at least one scope");
        if scope.methods.contains_key(&name) {
            return Err(());
        }
        scope.methods.insert(name, descriptor);
        Ok(())
    }

    pub fn lookup_field(&self, name: Id) -> Option<FieldDescriptor> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.fields.get(&name).copied())
    }

    pub fn lookup_method(&self, name: Id) -> Option<MethodDescriptor> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.methods.get(&name).copied())
    }

    /// Is `name` declared anywhere outside the current innermost scope?
    /// Used by copy propagation's "not a global" and lowering's
    /// scope-level tagging (spec §3.4: `Field.scope_level`).
    pub fn is_global(&self, name: Id) -> bool {
        self.scopes[0].fields.contains_key(&name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::intern;

    #[test]
    fn inner_scope_shadows_outer() {
        let mut table = SymbolTable::new();
        let x = intern("x");
        table
            .declare_field(x, FieldDescriptor { is_array: false, length: 0 })
            .unwrap();
        table.push_scope();
        table
            .declare_field(x, FieldDescriptor { is_array: true, length: 4 })
            .unwrap();
        assert!(table.lookup_field(x).unwrap().is_array);
        table.pop_scope();
        assert!(!table.lookup_field(x).unwrap().is_array);
    }

    #[test]
    fn redeclaration_in_same_scope_fails() {
        let mut table = SymbolTable::new();
        let x = intern("x");
        table
            .declare_field(x, FieldDescriptor { is_array: false, length: 0 })
            .unwrap();
        assert!(table
            .declare_field(x, FieldDescriptor { is_array: false, length: 0 })
            .is_err());
    }

    #[test]
    fn global_detection() {
        let mut table = SymbolTable::new();
        let g = intern("g");
        table
            .declare_field(g, FieldDescriptor { is_array: false, length: 0 })
            .unwrap();
        table.push_scope();
        let l = intern("l");
        table
            .declare_field(l, FieldDescriptor { is_array: false, length: 0 })
            .unwrap();
        assert!(table.is_global(g));
        assert!(!table.is_global(l));
    }
}
