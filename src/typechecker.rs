//! Type inference for SPL
//!
//! Algorithm-W-style inference over the ground algebra in [`crate::types`].
//! Declarations are typed in source order; every function is generalized
//! at its boundary and deferred usages of forward-referenced callees are
//! discharged there. The environment is a plain owning map so the code
//! generator can deep-copy it per monomorphic instance.

use crate::ast::*;
use crate::errors::CompilerError;
use crate::types::{FunctionScheme, FunctionUsage, InferenceType};
use crate::unification::{unify, Subst, UnifyError};
use std::collections::HashMap;
use tracing::debug;

/// The typing environment
#[derive(Debug, Clone, Default)]
pub struct Env {
    next_var: usize,
    variables: HashMap<usize, InferenceType>,
    functions: HashMap<String, FunctionScheme>,
    global_var_ids: Vec<usize>,
    postponed: HashMap<String, Vec<(FunctionUsage, CodeRange)>>,
}

impl Env {
    pub fn new() -> Self {
        Env::default()
    }

    pub fn fresh_var(&mut self) -> InferenceType {
        let tv = InferenceType::Var(self.next_var);
        self.next_var += 1;
        tv
    }

    /// The type recorded for a binding id, lazily seeded with a fresh
    /// variable on first lookup
    pub fn get_var(&mut self, id: usize) -> InferenceType {
        if let Some(t) = self.variables.get(&id) {
            return t.clone();
        }
        let tv = self.fresh_var();
        self.variables.insert(id, tv.clone());
        tv
    }

    pub fn scheme(&self, name: &str) -> Option<&FunctionScheme> {
        self.functions.get(name)
    }

    pub fn function_names(&self) -> impl Iterator<Item = &String> {
        self.functions.keys()
    }

    pub fn set_global_ids(&mut self, ids: Vec<usize>) {
        self.global_var_ids = ids;
    }

    /// Register a new signature: the arguments get the current types of
    /// their binding ids, the return type a fresh variable
    pub fn add_function(&mut self, name: &str, arg_ids: &[usize]) {
        let args: Vec<InferenceType> = arg_ids.iter().map(|id| self.get_var(*id)).collect();
        let ret = self.fresh_var();
        let quantified = args
            .iter()
            .filter_map(|t| match t {
                InferenceType::Var(n) => Some(*n),
                _ => None,
            })
            .collect();
        self.functions.insert(
            name.to_string(),
            FunctionScheme::new(quantified, FunctionUsage::new(args, ret)),
        );
    }

    pub fn update_quantifiers(&mut self, name: &str, quantified: Vec<usize>) {
        if let Some(scheme) = self.functions.get_mut(name) {
            scheme.quantified = quantified;
        }
    }

    /// Queue a usage constraint for a callee that has not been typed yet
    pub fn record_deferred_call(
        &mut self,
        name: &str,
        arg_types: Vec<InferenceType>,
        ret_type: InferenceType,
        range: CodeRange,
    ) {
        self.postponed
            .entry(name.to_string())
            .or_default()
            .push((FunctionUsage::new(arg_types, ret_type), range));
    }

    pub fn take_deferred(&mut self, name: &str) -> Option<Vec<(FunctionUsage, CodeRange)>> {
        self.postponed.remove(name)
    }

    /// Seed a polymorphic builtin signature
    pub fn add_builtin(
        &mut self,
        name: &str,
        quantified: Vec<usize>,
        arg_types: Vec<InferenceType>,
        ret_type: InferenceType,
    ) {
        self.functions.insert(
            name.to_string(),
            FunctionScheme::new(quantified, FunctionUsage::new(arg_types, ret_type)),
        );
    }

    /// Fresh instantiation of a scheme: every quantified variable is
    /// replaced by a new one
    pub fn instantiate(&mut self, scheme: &FunctionScheme) -> FunctionScheme {
        let mut subst = Subst::empty();
        for q in &scheme.quantified {
            let fresh = self.fresh_var();
            subst = Subst::single(*q, fresh).compose(&subst);
        }
        subst.apply_scheme(scheme)
    }

    /// Type variables free in the environment: those of every scheme whose
    /// name satisfies `filter` plus those of all global variables
    pub fn free_type_vars(&self, filter: impl Fn(&str) -> bool) -> Vec<usize> {
        let mut result = Vec::new();
        for (name, scheme) in &self.functions {
            if filter(name) {
                scheme.collect_free_vars(&mut result);
            }
        }
        for id in &self.global_var_ids {
            if let Some(t) = self.variables.get(id) {
                t.collect_vars(&mut result);
            }
        }
        result
    }

    /// Push a substitution through every stored type
    pub fn apply(&mut self, subst: &Subst) {
        for t in self.variables.values_mut() {
            *t = subst.apply(t);
        }
        for scheme in self.functions.values_mut() {
            *scheme = subst.apply_scheme(scheme);
        }
        for usages in self.postponed.values_mut() {
            for (usage, _) in usages.iter_mut() {
                *usage = subst.apply_usage(usage);
            }
        }
    }

    /// Globals whose type still contains a variable after inference
    pub fn globals_with_vars(&self) -> Vec<(usize, InferenceType)> {
        self.global_var_ids
            .iter()
            .filter_map(|id| {
                let t = self.variables.get(id)?;
                t.contains_any_var().then(|| (*id, t.clone()))
            })
            .collect()
    }
}

/// Unify two types, attaching a source range to any failure
fn unify_at(
    expected: &InferenceType,
    actual: &InferenceType,
    range: CodeRange,
) -> Result<Subst, CompilerError> {
    unify(expected, actual).map_err(|e| match e {
        UnifyError::Mismatch(t1, t2) => CompilerError::TypeMismatch {
            expected: t1,
            actual: t2,
            range,
        },
        UnifyError::Recursive(var, ty) => CompilerError::RecursiveType { var, ty, range },
    })
}

fn bound_id(id: Option<usize>) -> usize {
    id.expect("binding analysis runs before type inference")
}

/// Type a whole file in declaration order. The returned substitution has
/// already been applied to the environment.
pub fn infer_file(env: &mut Env, file: &SplFile) -> Result<Subst, CompilerError> {
    let global_ids = file
        .declarations
        .iter()
        .filter_map(|d| match d {
            Decl::Var(v) => Some(bound_id(v.id)),
            _ => None,
        })
        .collect();
    env.set_global_ids(global_ids);

    let mut subst = Subst::empty();
    for decl in &file.declarations {
        let s = match decl {
            Decl::Var(v) => infer_var_decl(env, v)?,
            Decl::Fun(f) => infer_fun_decl(env, f)?,
        };
        subst = s.compose(&subst);
        env.apply(&subst);
    }

    // every global must have a ground type by now
    for (id, t) in env.globals_with_vars() {
        for decl in &file.declarations {
            if let Decl::Var(v) = decl {
                if v.id == Some(id) {
                    return Err(CompilerError::IndeterminateGlobalType {
                        name: v.name.name.clone(),
                        ty: t,
                        range: v.range,
                    });
                }
            }
        }
    }
    Ok(subst)
}

fn infer_var_decl(env: &mut Env, v: &VarDecl) -> Result<Subst, CompilerError> {
    let t = env.get_var(bound_id(v.id));
    let star = match &v.declared {
        Some(declared) => infer_type_expr(env, declared, &t)?,
        None => Subst::empty(),
    };
    env.apply(&star);
    let s = infer_expr(env, &v.init, &star.apply(&t))?;
    Ok(s.compose(&star))
}

fn infer_fun_decl(env: &mut Env, f: &FunDecl) -> Result<Subst, CompilerError> {
    let name = f.name.name.as_str();
    debug!("typing function {}", name);
    if name == "main" && !f.param_ids.is_empty() {
        return Err(CompilerError::MainWithParams {
            count: f.param_ids.len(),
            range: f.range,
        });
    }

    env.add_function(name, &f.param_ids);
    // monomorphic while its own body is typed
    env.update_quantifiers(name, Vec::new());

    let mut star = Subst::empty();
    if let Some(sig) = &f.signature {
        let usage = env
            .scheme(name)
            .map(|s| s.usage.clone())
            .expect("signature was just registered");
        if usage.arg_types.len() != sig.arg_types.len() {
            return Err(CompilerError::FunArgsTypesMismatch {
                name: name.to_string(),
                params: usage.arg_types.len(),
                types: sig.arg_types.len(),
                range: f.range,
            });
        }
        for (arg_tv, declared) in usage.arg_types.iter().zip(&sig.arg_types) {
            star = infer_type_expr(env, declared, &star.apply(arg_tv))?.compose(&star);
            env.apply(&star);
        }
        star = infer_return_type(env, &sig.ret, &star.apply(&usage.ret_type))?.compose(&star);
        env.apply(&star);
    }

    let ret_type = env
        .scheme(name)
        .map(|s| s.usage.ret_type.clone())
        .expect("signature was just registered");
    star = infer_block(env, &f.body, &star.apply(&ret_type))?.compose(&star);

    // generalize: quantify the argument variables not free elsewhere
    let usage = env
        .scheme(name)
        .map(|s| s.usage.clone())
        .expect("signature was just registered");
    let mut type_vars = Vec::new();
    for arg in &usage.arg_types {
        star.apply(arg).collect_vars(&mut type_vars);
    }
    let free = env.free_type_vars(|other| other != name);
    type_vars.retain(|v| !free.contains(v));
    debug!("generalizing {} over {:?}", name, type_vars);
    env.update_quantifiers(name, type_vars);

    // discharge deferred usages now that the scheme is final
    if let Some(postponed) = env.take_deferred(name) {
        for (usage, range) in postponed {
            let scheme = env
                .scheme(name)
                .cloned()
                .expect("scheme still present after generalization");
            let instantiated = env.instantiate(&scheme);
            if instantiated.usage.arg_types.len() != usage.arg_types.len() {
                return Err(CompilerError::CallArityMismatch {
                    name: name.to_string(),
                    given: usage.arg_types.len(),
                    expected: instantiated.usage.arg_types.len(),
                    range,
                });
            }
            for (actual, deferred) in instantiated.usage.arg_types.iter().zip(&usage.arg_types) {
                star = unify_at(actual, &star.apply(deferred), range)?.compose(&star);
                env.apply(&star);
            }
            star = unify_at(
                &star.apply(&usage.ret_type),
                &star.apply(&instantiated.usage.ret_type),
                range,
            )?
            .compose(&star);
            env.apply(&star);
        }
    }
    debug!("finished typing function {}", name);
    Ok(star)
}

fn infer_block(env: &mut Env, block: &Block, sigma: &InferenceType) -> Result<Subst, CompilerError> {
    let mut subst = Subst::empty();
    for stmt in &block.statements {
        let s = infer_stmt(env, stmt, &subst.apply(sigma))?;
        subst = s.compose(&subst);
        env.apply(&subst);
    }
    Ok(subst)
}

/// `sigma` is the function's return type; every `return e` unifies
/// against it
fn infer_stmt(env: &mut Env, stmt: &Statement, sigma: &InferenceType) -> Result<Subst, CompilerError> {
    match stmt {
        Statement::If(s) => {
            let star1 = infer_expr(env, &s.condition, &InferenceType::Bool)?;
            env.apply(&star1);
            let star2 = infer_block(env, &s.then_block, &star1.apply(sigma))?.compose(&star1);
            if let Some(else_block) = &s.else_block {
                env.apply(&star2);
                Ok(infer_block(env, else_block, &star2.apply(sigma))?.compose(&star2))
            } else {
                Ok(star2)
            }
        }
        Statement::While(s) => {
            let star = infer_expr(env, &s.condition, &InferenceType::Bool)?;
            env.apply(&star);
            Ok(infer_block(env, &s.body, &star.apply(sigma))?.compose(&star))
        }
        Statement::Assign(s) => {
            let tv = env.fresh_var();
            let star = infer_field(env, &s.target, &tv)?;
            Ok(infer_expr(env, &s.value, &star.apply(&tv))?.compose(&star))
        }
        Statement::Return(s) => match &s.value {
            Some(e) => infer_expr(env, e, sigma),
            None => unify_at(sigma, &InferenceType::Void, s.range),
        },
        Statement::Block(b) => infer_block(env, b, sigma),
        Statement::Var(v) => infer_var_decl(env, v),
        Statement::Expr(s) => {
            // the value is discarded, so the target type is a throwaway
            let tv = env.fresh_var();
            infer_expr(env, &s.expr, &tv)
        }
        Statement::Error(_) => Ok(Subst::empty()),
    }
}

pub fn infer_expr(env: &mut Env, expr: &Expr, sigma: &InferenceType) -> Result<Subst, CompilerError> {
    match expr {
        Expr::Binary {
            op,
            lhs,
            rhs,
            range,
        } => infer_binary(env, *op, lhs, rhs, sigma, *range),
        Expr::Unary { op, operand, range } => {
            let required = match op {
                UnaryOp::Not => InferenceType::Bool,
                UnaryOp::Minus => InferenceType::Int,
            };
            let star = infer_expr(env, operand, &required)?;
            Ok(unify_at(&star.apply(sigma), &star.apply(&required), *range)?.compose(&star))
        }
        Expr::Number {
            value,
            negated,
            range,
        } => {
            if !negated && *value > 0x7fff_ffff {
                return Err(CompilerError::IntOverflow {
                    literal: value.to_string(),
                    range: *range,
                });
            }
            if *negated && *value > 0x8000_0000 {
                return Err(CompilerError::IntUnderflow {
                    literal: value.to_string(),
                    range: *range,
                });
            }
            unify_at(sigma, &InferenceType::Int, *range)
        }
        Expr::Char { range, .. } => unify_at(sigma, &InferenceType::Char, *range),
        Expr::Bool { range, .. } => unify_at(sigma, &InferenceType::Bool, *range),
        Expr::EmptyList { range } => {
            let elem = env.fresh_var();
            unify_at(sigma, &InferenceType::list(elem), *range)
        }
        Expr::Tuple {
            fst,
            snd,
            range,
        } => {
            let a1 = env.fresh_var();
            let a2 = env.fresh_var();
            let star1 = infer_expr(env, fst, &a1)?;
            env.apply(&star1);
            let star2 = infer_expr(env, snd, &a2)?.compose(&star1);
            let tuple = star2.apply(&InferenceType::tuple(a1, a2));
            Ok(unify_at(&star2.apply(sigma), &tuple, *range)?.compose(&star2))
        }
        Expr::Call(call) => infer_call(env, call, sigma),
        Expr::Field(field) => infer_field(env, field, sigma),
        Expr::Error { .. } => Ok(Subst::empty()),
    }
}

fn infer_binary(
    env: &mut Env,
    op: BinaryOp,
    lhs: &Expr,
    rhs: &Expr,
    sigma: &InferenceType,
    range: CodeRange,
) -> Result<Subst, CompilerError> {
    use BinaryOp::*;
    use InferenceType::{Bool, Int};
    let (e1, e2, result) = match op {
        Sub | Mul | Div | Mod => (Int, Int, Int),
        Eq | Ne | Lt | Le | Ge | Gt => {
            let tv = env.fresh_var();
            (tv.clone(), tv, Bool)
        }
        // + is overloaded over int, char and list
        Add => {
            let tv = env.fresh_var();
            (tv.clone(), tv.clone(), tv)
        }
        And | Or => (Bool, Bool, Bool),
        Cons => {
            let tv = env.fresh_var();
            (
                tv.clone(),
                InferenceType::list(tv.clone()),
                InferenceType::list(tv),
            )
        }
    };
    let star1 = infer_expr(env, lhs, &e1)?;
    env.apply(&star1);
    let star2 = infer_expr(env, rhs, &star1.apply(&e2))?.compose(&star1);
    Ok(unify_at(&star2.apply(sigma), &star2.apply(&result), range)?.compose(&star2))
}

fn infer_call(env: &mut Env, call: &CallExpr, sigma: &InferenceType) -> Result<Subst, CompilerError> {
    let name = call.name.name.as_str();
    if let Some(scheme) = env.scheme(name).cloned() {
        let instantiated = env.instantiate(&scheme);
        if call.args.len() != instantiated.usage.arg_types.len() {
            return Err(CompilerError::CallArityMismatch {
                name: name.to_string(),
                given: call.args.len(),
                expected: instantiated.usage.arg_types.len(),
                range: call.range,
            });
        }
        let mut subst = Subst::empty();
        for (arg, tv) in call.args.iter().zip(&instantiated.usage.arg_types) {
            subst = infer_expr(env, arg, &subst.apply(tv))?.compose(&subst);
            env.apply(&subst);
        }
        Ok(unify_at(sigma, &subst.apply(&instantiated.usage.ret_type), call.range)?.compose(&subst))
    } else {
        // callee not declared yet: queue the usage for later discharge
        let mut arg_types = Vec::new();
        let mut subst = Subst::empty();
        for arg in &call.args {
            let tv = env.fresh_var();
            arg_types.push(tv.clone());
            subst = infer_expr(env, arg, &tv)?.compose(&subst);
            env.apply(&subst);
        }
        env.record_deferred_call(name, arg_types, sigma.clone(), call.range);
        Ok(subst)
    }
}

pub fn infer_field(
    env: &mut Env,
    field: &FieldAccess,
    sigma: &InferenceType,
) -> Result<Subst, CompilerError> {
    match field {
        FieldAccess::Var { id, range, .. } => {
            let tv = env.get_var(bound_id(*id));
            let result = unify_at(sigma, &tv, *range)?;
            env.apply(&result);
            Ok(result)
        }
        FieldAccess::Accessor { sel, base, range } => match sel {
            Selector::Fst => {
                let tup = InferenceType::tuple(sigma.clone(), env.fresh_var());
                infer_field(env, base, &tup)
            }
            Selector::Snd => {
                let tup = InferenceType::tuple(env.fresh_var(), sigma.clone());
                infer_field(env, base, &tup)
            }
            Selector::Hd => {
                let list = InferenceType::list(sigma.clone());
                infer_field(env, base, &list)
            }
            Selector::Tl => {
                let list = InferenceType::list(env.fresh_var());
                let star = unify_at(sigma, &list, *range)?;
                env.apply(&star);
                Ok(infer_field(env, base, &star.apply(sigma))?.compose(&star))
            }
        },
    }
}

fn infer_type_expr(
    env: &mut Env,
    t: &TypeExpr,
    sigma: &InferenceType,
) -> Result<Subst, CompilerError> {
    match t {
        TypeExpr::Int(range) => unify_at(sigma, &InferenceType::Int, *range),
        TypeExpr::Bool(range) => unify_at(sigma, &InferenceType::Bool, *range),
        TypeExpr::Char(range) => unify_at(sigma, &InferenceType::Char, *range),
        TypeExpr::Var { id, range, .. } => {
            let tv = env.get_var(bound_id(*id));
            unify_at(sigma, &tv, *range)
        }
        TypeExpr::Tuple(t1, t2, range) => {
            let a1 = env.fresh_var();
            let a2 = env.fresh_var();
            let star1 = infer_type_expr(env, t1, &a1)?;
            env.apply(&star1);
            let star2 = infer_type_expr(env, t2, &star1.apply(&a2))?.compose(&star1);
            let tuple = star2.apply(&InferenceType::tuple(a1, a2));
            Ok(unify_at(sigma, &tuple, *range)?.compose(&star2))
        }
        TypeExpr::List(inner, range) => {
            let a = env.fresh_var();
            let star = infer_type_expr(env, inner, &a)?;
            env.apply(&star);
            let list = star.apply(&InferenceType::list(a));
            Ok(unify_at(sigma, &list, *range)?.compose(&star))
        }
        TypeExpr::Error(_) => Ok(Subst::empty()),
    }
}

fn infer_return_type(
    env: &mut Env,
    ret: &ReturnTypeExpr,
    sigma: &InferenceType,
) -> Result<Subst, CompilerError> {
    match ret {
        ReturnTypeExpr::Value(t) => infer_type_expr(env, t, sigma),
        ReturnTypeExpr::Void(range) => unify_at(sigma, &InferenceType::Void, *range),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::builtins;
    use crate::lexer::lex;
    use crate::parser::parse;

    fn typed_env(source: &str) -> Result<Env, CompilerError> {
        let (tokens, lex_errors) = lex(source);
        assert!(lex_errors.is_empty());
        let (mut file, parse_errors) = parse(tokens);
        assert!(parse_errors.is_empty(), "parse errors: {:?}", parse_errors);
        let fb = crate::binding::analyze(&mut file, &builtins::BUILTIN_NAMES);
        assert!(!fb.has_errors(), "binding errors: {:?}", fb.errors);
        let mut env = Env::new();
        builtins::seed_env(&mut env);
        let subst = infer_file(&mut env, &file)?;
        env.apply(&subst);
        Ok(env)
    }

    fn usage(env: &Env, name: &str) -> FunctionUsage {
        env.scheme(name).unwrap().usage.clone()
    }

    #[test]
    fn test_factorial_types_as_int_to_int() {
        let env = typed_env(
            "factorial(n) :: Int -> Int { if(n == 0) { return 1; } return n * factorial(n - 1); }\n\
             main() { println(factorial(5)); }",
        )
        .unwrap();
        let u = usage(&env, "factorial");
        assert_eq!(u.arg_types, vec![InferenceType::Int]);
        assert_eq!(u.ret_type, InferenceType::Int);
    }

    #[test]
    fn test_inferred_without_signature() {
        let env = typed_env(
            "double(n) { return n + n; }\nmain() { println(double(2)); }",
        )
        .unwrap();
        // + stays overloaded, but the call at int fixes nothing globally:
        // the scheme must still be polymorphic over its argument
        let scheme = env.scheme("double").unwrap();
        assert_eq!(scheme.usage.arg_types.len(), 1);
        assert!(!scheme.quantified.is_empty());
    }

    #[test]
    fn test_generalization_soundness() {
        // after typing, no quantifier of f may appear free in the rest of
        // the environment
        let env = typed_env(
            "id(x) { return x; }\nmain() { println(id(1)); println(id(True)); }",
        )
        .unwrap();
        let scheme = env.scheme("id").unwrap().clone();
        assert!(!scheme.quantified.is_empty());
        let free = env.free_type_vars(|name| name != "id");
        for q in &scheme.quantified {
            assert!(!free.contains(q), "quantifier v{} leaked into the env", q);
        }
    }

    #[test]
    fn test_forward_reference_discharged() {
        let env = typed_env(
            "main() { println(later(1)); }\nlater(x) :: Int -> Int { return x + 1; }",
        )
        .unwrap();
        let u = usage(&env, "later");
        assert_eq!(u.arg_types, vec![InferenceType::Int]);
    }

    #[test]
    fn test_forward_reference_arity_mismatch() {
        let err = typed_env("main() { println(later(1, 2)); }\nlater(x) { return x; }")
            .unwrap_err();
        assert!(matches!(err, CompilerError::CallArityMismatch { .. }));
    }

    #[test]
    fn test_type_mismatch() {
        let err = typed_env("main() { Int x = True; return; }").unwrap_err();
        assert!(matches!(err, CompilerError::TypeMismatch { .. }));
    }

    #[test]
    fn test_indeterminate_global() {
        let err = typed_env("var g = [];\nmain() { return; }").unwrap_err();
        assert!(matches!(err, CompilerError::IndeterminateGlobalType { .. }));
    }

    #[test]
    fn test_global_fixed_by_later_use() {
        let env = typed_env("var g = [];\nmain() { g = 1 : g; return; }").unwrap();
        let ids = env.global_var_ids.clone();
        assert_eq!(ids.len(), 1);
        assert_eq!(
            env.variables.get(&ids[0]),
            Some(&InferenceType::list(InferenceType::Int))
        );
    }

    #[test]
    fn test_main_with_params_rejected() {
        let err = typed_env("main(x) { return; }").unwrap_err();
        assert!(matches!(err, CompilerError::MainWithParams { .. }));
    }

    #[test]
    fn test_literal_bounds() {
        assert!(typed_env("main() { var x = 2147483647; println(x); }").is_ok());
        let err = typed_env("main() { var x = 2147483648; println(x); }").unwrap_err();
        assert!(matches!(err, CompilerError::IntOverflow { .. }));
        assert!(typed_env("main() { var x = -2147483648; println(x); }").is_ok());
        let err = typed_env("main() { var x = -2147483649; println(x); }").unwrap_err();
        assert!(matches!(err, CompilerError::IntUnderflow { .. }));
    }

    #[test]
    fn test_cons_and_accessors() {
        let env = typed_env(
            "main() { var xs = 1 : 2 : []; var h = xs.hd; var t = xs.tl; println(h); println(len(t)); }",
        )
        .unwrap();
        assert!(env.scheme("len").is_some());
    }

    #[test]
    fn test_signature_constrains_body() {
        let err = typed_env("f(x) :: Int -> Bool { return x; }\nmain() { println(f(1)); }")
            .unwrap_err();
        assert!(matches!(err, CompilerError::TypeMismatch { .. }));
    }

    #[test]
    fn test_tuple_swap_signature() {
        let env = typed_env(
            "swap(p) :: (Int, Int) -> (Int, Int) { return (p.snd, p.fst); }\n\
             main() { println(swap((7, 9))); }",
        )
        .unwrap();
        let u = usage(&env, "swap");
        let expected = InferenceType::tuple(InferenceType::Int, InferenceType::Int);
        assert_eq!(u.arg_types, vec![expected.clone()]);
        assert_eq!(u.ret_type, expected);
    }

    #[test]
    fn test_occurs_check_in_program() {
        let err = typed_env("f(x) { return x : x; }\nmain() { println(1); }").unwrap_err();
        assert!(matches!(err, CompilerError::RecursiveType { .. }));
    }
}
