//! Binding analysis for SPL
//!
//! Resolves every name to a process-unique integer id using a scope
//! stack, writing the ids back into the tree. Declared type variables
//! get ids from the same counter so the typing environment can treat
//! them uniformly. Errors and hiding warnings go into the feedback bag.

use crate::ast::*;
use crate::errors::{CompilerError, CompilerWarning, Feedback};
use std::collections::{HashMap, HashSet};

/// Scope stack shared by variables and declared type variables
pub struct Context {
    scopes: Vec<HashMap<String, usize>>,
    type_scopes: Vec<HashMap<String, usize>>,
    functions: HashSet<String>,
    counter: usize,
}

impl Context {
    pub fn new() -> Self {
        Context {
            scopes: Vec::new(),
            type_scopes: Vec::new(),
            functions: HashSet::new(),
            counter: 0,
        }
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
        self.type_scopes.push(HashMap::new());
    }

    pub fn pop_scope(&mut self) {
        self.scopes.pop();
        self.type_scopes.pop();
    }

    /// Look a variable up through all scopes, innermost first
    pub fn get_variable(&self, name: &str) -> Option<usize> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name).copied())
    }

    pub fn get_variable_current_scope(&self, name: &str) -> Option<usize> {
        self.scopes.last().and_then(|s| s.get(name).copied())
    }

    pub fn add_variable(&mut self, name: &str) -> usize {
        let id = self.counter;
        self.counter += 1;
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), id);
        }
        id
    }

    /// Declared type variables resolve through all scopes and are created
    /// on first sight
    pub fn get_or_add_type(&mut self, name: &str) -> usize {
        if let Some(id) = self
            .type_scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name).copied())
        {
            return id;
        }
        let id = self.counter;
        self.counter += 1;
        if let Some(scope) = self.type_scopes.last_mut() {
            scope.insert(name.to_string(), id);
        }
        id
    }

    pub fn add_function(&mut self, name: &str) {
        self.functions.insert(name.to_string());
    }

    pub fn has_function(&self, name: &str) -> bool {
        self.functions.contains(name)
    }
}

impl Default for Context {
    fn default() -> Self {
        Context::new()
    }
}

/// Run binding analysis over a whole file. `builtins` are the function
/// names the code generator can materialize on demand.
pub fn analyze(file: &mut SplFile, builtins: &[&str]) -> Feedback {
    let mut ctx = Context::new();
    for name in builtins {
        ctx.add_function(name);
    }
    let mut fb = Feedback::new();

    ctx.push_scope();
    // register all top-level names first so functions may forward-reference
    let mut has_main = false;
    for decl in &file.declarations {
        match decl {
            Decl::Var(v) => {
                if ctx.get_variable_current_scope(&v.name.name).is_some() {
                    fb.error(CompilerError::DuplicateIdentifier {
                        name: v.name.name.clone(),
                        range: v.name.range,
                    });
                }
                ctx.add_variable(&v.name.name);
            }
            Decl::Fun(f) => {
                if f.name.name == "main" {
                    has_main = true;
                }
                if ctx.has_function(&f.name.name) {
                    fb.error(CompilerError::DuplicateFunction {
                        name: f.name.name.clone(),
                        range: f.name.range,
                    });
                }
                ctx.add_function(&f.name.name);
            }
        }
    }
    if !has_main {
        fb.error(CompilerError::MissingMain);
    }

    for decl in &mut file.declarations {
        match decl {
            Decl::Var(v) => bind_var_decl(v, &mut ctx, &mut fb),
            Decl::Fun(f) => bind_fun_decl(f, &mut ctx, &mut fb),
        }
    }
    ctx.pop_scope();
    fb
}

fn bind_var_decl(v: &mut VarDecl, ctx: &mut Context, fb: &mut Feedback) {
    let id = ctx
        .get_variable_current_scope(&v.name.name)
        .unwrap_or_else(|| ctx.add_variable(&v.name.name));
    v.id = Some(id);
    if let Some(t) = &mut v.declared {
        bind_type(t, ctx);
    }
    bind_expr(&mut v.init, ctx, fb);
}

fn bind_fun_decl(f: &mut FunDecl, ctx: &mut Context, fb: &mut Feedback) {
    ctx.push_scope();
    f.param_ids = f
        .params
        .iter()
        .map(|param| ctx.add_variable(&param.name))
        .collect();
    if let Some(sig) = &mut f.signature {
        for t in &mut sig.arg_types {
            bind_type(t, ctx);
        }
        if let ReturnTypeExpr::Value(t) = &mut sig.ret {
            bind_type(t, ctx);
        }
    }
    bind_block(&mut f.body, ctx, fb);
    ctx.pop_scope();
}

fn bind_type(t: &mut TypeExpr, ctx: &mut Context) {
    match t {
        TypeExpr::Var { name, id, .. } => *id = Some(ctx.get_or_add_type(name)),
        TypeExpr::List(inner, _) => bind_type(inner, ctx),
        TypeExpr::Tuple(t1, t2, _) => {
            bind_type(t1, ctx);
            bind_type(t2, ctx);
        }
        _ => {}
    }
}

fn bind_block(block: &mut Block, ctx: &mut Context, fb: &mut Feedback) {
    ctx.push_scope();
    for stmt in &mut block.statements {
        bind_stmt(stmt, ctx, fb);
    }
    ctx.pop_scope();
}

fn bind_stmt(stmt: &mut Statement, ctx: &mut Context, fb: &mut Feedback) {
    match stmt {
        Statement::If(s) => {
            bind_expr(&mut s.condition, ctx, fb);
            bind_block(&mut s.then_block, ctx, fb);
            if let Some(else_block) = &mut s.else_block {
                bind_block(else_block, ctx, fb);
            }
        }
        Statement::While(s) => {
            bind_expr(&mut s.condition, ctx, fb);
            bind_block(&mut s.body, ctx, fb);
        }
        Statement::Assign(s) => {
            bind_field(&mut s.target, ctx, fb);
            bind_expr(&mut s.value, ctx, fb);
        }
        Statement::Return(s) => {
            if let Some(e) = &mut s.value {
                bind_expr(e, ctx, fb);
            }
        }
        Statement::Block(b) => bind_block(b, ctx, fb),
        Statement::Var(v) => {
            let name = v.name.name.clone();
            if ctx.get_variable_current_scope(&name).is_some() {
                fb.error(CompilerError::DuplicateIdentifier {
                    name,
                    range: v.name.range,
                });
            } else {
                if ctx.get_variable(&name).is_some() {
                    fb.warning(CompilerWarning::VariableHiding {
                        name: name.clone(),
                        range: v.range,
                    });
                }
                ctx.add_variable(&name);
                bind_var_decl(v, ctx, fb);
            }
        }
        Statement::Expr(s) => bind_expr(&mut s.expr, ctx, fb),
        Statement::Error(_) => {}
    }
}

fn bind_field(field: &mut FieldAccess, ctx: &mut Context, fb: &mut Feedback) {
    match field {
        FieldAccess::Var { name, id, range } => match ctx.get_variable(name) {
            Some(found) => *id = Some(found),
            None => fb.error(CompilerError::UnknownVariable {
                name: name.clone(),
                range: *range,
            }),
        },
        FieldAccess::Accessor { base, .. } => bind_field(base, ctx, fb),
    }
}

fn bind_expr(expr: &mut Expr, ctx: &mut Context, fb: &mut Feedback) {
    match expr {
        Expr::Binary { lhs, rhs, .. } => {
            bind_expr(lhs, ctx, fb);
            bind_expr(rhs, ctx, fb);
        }
        Expr::Unary { operand, .. } => bind_expr(operand, ctx, fb),
        Expr::Tuple { fst, snd, .. } => {
            bind_expr(fst, ctx, fb);
            bind_expr(snd, ctx, fb);
        }
        Expr::Call(call) => {
            if !ctx.has_function(&call.name.name) {
                fb.error(CompilerError::UnknownFunction {
                    name: call.name.name.clone(),
                    range: call.range,
                });
            }
            for arg in &mut call.args {
                bind_expr(arg, ctx, fb);
            }
        }
        Expr::Field(field) => bind_field(field, ctx, fb),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::builtins::BUILTIN_NAMES;
    use crate::lexer::lex;
    use crate::parser::parse;

    fn bind(source: &str) -> (SplFile, Feedback) {
        let (tokens, lex_errors) = lex(source);
        assert!(lex_errors.is_empty());
        let (mut file, parse_errors) = parse(tokens);
        assert!(parse_errors.is_empty(), "parse errors: {:?}", parse_errors);
        let fb = analyze(&mut file, &BUILTIN_NAMES);
        (file, fb)
    }

    #[test]
    fn test_ids_assigned() {
        let (file, fb) = bind("var g = 1;\nmain() { var x = g; return; }");
        assert!(!fb.has_errors());
        let Decl::Var(g) = &file.declarations[0] else {
            panic!()
        };
        assert!(g.id.is_some());
        let Decl::Fun(f) = &file.declarations[1] else {
            panic!()
        };
        let Statement::Var(x) = &f.body.statements[0] else {
            panic!()
        };
        let Expr::Field(FieldAccess::Var { id, .. }) = &x.init else {
            panic!()
        };
        assert_eq!(*id, g.id);
        assert_ne!(x.id, g.id);
    }

    #[test]
    fn test_param_ids() {
        let (file, fb) = bind("f(a, b) { return a; }\nmain() { return; }");
        assert!(!fb.has_errors());
        let Decl::Fun(f) = &file.declarations[0] else {
            panic!()
        };
        assert_eq!(f.param_ids.len(), 2);
        assert_ne!(f.param_ids[0], f.param_ids[1]);
    }

    #[test]
    fn test_unknown_variable() {
        let (_, fb) = bind("main() { var x = y; return; }");
        assert!(fb
            .errors
            .iter()
            .any(|e| matches!(e, CompilerError::UnknownVariable { .. })));
    }

    #[test]
    fn test_unknown_function() {
        let (_, fb) = bind("main() { nope(); }");
        assert!(fb
            .errors
            .iter()
            .any(|e| matches!(e, CompilerError::UnknownFunction { .. })));
    }

    #[test]
    fn test_builtins_are_known() {
        let (_, fb) = bind("main() { println(1); }");
        assert!(!fb.has_errors());
    }

    #[test]
    fn test_variable_hiding_warning() {
        let (_, fb) = bind("main() { var x = 1; { var x = 2; } return; }");
        assert!(!fb.has_errors());
        assert!(fb
            .warnings
            .iter()
            .any(|w| matches!(w, CompilerWarning::VariableHiding { .. })));
    }

    #[test]
    fn test_duplicate_in_same_scope() {
        let (_, fb) = bind("main() { var x = 1; var x = 2; return; }");
        assert!(fb
            .errors
            .iter()
            .any(|e| matches!(e, CompilerError::DuplicateIdentifier { .. })));
    }

    #[test]
    fn test_missing_main() {
        let (_, fb) = bind("f() { return; }");
        assert!(fb
            .errors
            .iter()
            .any(|e| matches!(e, CompilerError::MissingMain)));
    }

    #[test]
    fn test_forward_reference_allowed() {
        let (_, fb) = bind("main() { var x = later(); return; }\nlater() :: -> Int { return 1; }");
        assert!(!fb.has_errors());
    }

    #[test]
    fn test_type_vars_share_ids_within_signature() {
        let (file, fb) = bind("id(x) :: a -> a { return x; }\nmain() { return; }");
        assert!(!fb.has_errors());
        let Decl::Fun(f) = &file.declarations[0] else {
            panic!()
        };
        let sig = f.signature.as_ref().unwrap();
        let TypeExpr::Var { id: arg_id, .. } = &sig.arg_types[0] else {
            panic!()
        };
        let ReturnTypeExpr::Value(TypeExpr::Var { id: ret_id, .. }) = &sig.ret else {
            panic!()
        };
        assert_eq!(arg_id, ret_id);
    }
}
