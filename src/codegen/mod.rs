//! Generic code generation for SPL
//!
//! Lowers the typed AST to a stack-oriented opcode IR. A worklist driver
//! starts from a synthesized entry routine (initialize globals, call
//! `main`, halt) and materializes one concrete body per used
//! `(function, argument-types)` instance, builtins included. The SSM and
//! x86-64 backends translate the finished instance list.

pub mod builtins;
pub mod ssm;
pub mod x64;

use crate::ast::*;
use crate::errors::CompilerError;
use crate::typechecker::{self, Env};
use crate::types::InferenceType;
use crate::unification::{unify, Subst};
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::debug;

/// A frame slot. Negative offsets denote function arguments
/// (`-arity ..= -1`), non-negative offsets denote locals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Local {
    pub offset: i64,
}

impl Local {
    pub fn new(offset: i64) -> Self {
        Local { offset }
    }
}

/// Index into the per-program global table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Global {
    pub offset: usize,
}

/// Function-local label; its emitted name is qualified by the instance id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label {
    pub id: usize,
}

impl Label {
    /// The globally unique name this label gets in the listing
    pub fn distinct_name(&self, instance: &FunctionInstance) -> String {
        format!("lbl_{}_{}", instance.mangled_id(), self.id)
    }
}

/// A call target: the mangled instance id plus its arity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionRef {
    pub ident: String,
    pub arity: usize,
}

impl std::fmt::Display for FunctionRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "f_{}", self.ident)
    }
}

/// Identity of one monomorphized function
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionInstance {
    pub name: String,
    pub arg_types: Vec<InferenceType>,
    /// Hidden instances get an underscore prefix so internal helpers can
    /// never collide with user functions
    pub hidden: bool,
    pub entry_point: bool,
}

impl FunctionInstance {
    pub fn new(name: impl Into<String>, arg_types: Vec<InferenceType>) -> Self {
        FunctionInstance {
            name: name.into(),
            arg_types,
            hidden: false,
            entry_point: false,
        }
    }

    pub fn hidden(name: impl Into<String>, arg_types: Vec<InferenceType>) -> Self {
        FunctionInstance {
            name: name.into(),
            arg_types,
            hidden: true,
            entry_point: false,
        }
    }

    pub fn entry(name: impl Into<String>) -> Self {
        FunctionInstance {
            name: name.into(),
            arg_types: Vec::new(),
            hidden: true,
            entry_point: true,
        }
    }

    /// Deterministic identifier built from name, arity and the printed
    /// argument types, with punctuation rewritten to safe sequences
    pub fn mangled_id(&self) -> String {
        if self.entry_point {
            return self.name.clone();
        }
        let prefix = if self.hidden { "_" } else { "" };
        let args: Vec<String> = self.arg_types.iter().map(|t| t.to_string()).collect();
        let raw = format!(
            "{}{}_{}_{}",
            prefix,
            self.name,
            self.arg_types.len(),
            args.join("_")
        );
        let mut ident = String::new();
        for c in raw.chars() {
            match c {
                '(' => ident.push_str("_PO_"),
                ')' => ident.push_str("_PC_"),
                '[' => ident.push_str("_BO_"),
                ']' => ident.push_str("_BC_"),
                ',' => ident.push_str("_CM_"),
                ' ' => ident.push('_'),
                other => ident.push(other),
            }
        }
        ident
    }
}

/// The stack-machine opcode set the backends consume
#[derive(Debug, Clone, PartialEq)]
pub enum OpCode {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Neg,
    Not,
    And,
    Or,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    PushConst(i64),
    CreateListNil,
    CreateListCons,
    CreateTuple,
    LdLoc(Local),
    StLoc(Local),
    LdGlob(Global),
    StGlob(Global),
    LdFld(Selector),
    StFld(Selector),
    Br(Label),
    BrTrue(Label),
    BrFalse(Label),
    BrEq(Label),
    BrNe(Label),
    BrGe(Label),
    BrGt(Label),
    BrLe(Label),
    BrLt(Label),
    MarkLabel(Label),
    Call(FunctionRef),
    Ret,
    RetNoValue,
    Halt,
    PrintInt,
    PrintChar,
    Swp,
    Pop,
}

/// Opcode body of one emitted instance
#[derive(Debug, Clone)]
pub struct FunctionImpl {
    pub ops: Vec<OpCode>,
}

impl FunctionImpl {
    /// Frame slots this body needs: one past the highest local offset
    /// referenced by a load or store
    pub fn frame_slot_count(&self) -> i64 {
        let mut size = 0;
        for op in &self.ops {
            if let OpCode::LdLoc(local) | OpCode::StLoc(local) = op {
                let needed = local.offset + 1;
                if needed > size {
                    size = needed;
                }
            }
        }
        size
    }
}

/// Worklist plus the global table, shared across all instance builders
#[derive(Debug, Default)]
pub struct GeneratorContext {
    worklist: VecDeque<FunctionInstance>,
    queued: HashSet<String>,
    globals: HashMap<usize, usize>,
}

impl GeneratorContext {
    pub fn new() -> Self {
        GeneratorContext::default()
    }

    /// Queue an instance unless its mangled id was already requested
    pub fn require_instance(&mut self, instance: FunctionInstance) {
        if self.queued.insert(instance.mangled_id()) {
            self.worklist.push_back(instance);
        }
    }

    fn next_instance(&mut self) -> Option<FunctionInstance> {
        self.worklist.pop_front()
    }

    /// Register a global binding id (loads included) and return its slot
    pub fn register_global(&mut self, id: usize) -> Global {
        let next = self.globals.len();
        let offset = *self.globals.entry(id).or_insert(next);
        Global { offset }
    }

    pub fn is_global(&self, id: usize) -> bool {
        self.globals.contains_key(&id)
    }

    pub fn globals_count(&self) -> usize {
        self.globals.len()
    }
}

/// Per-instance opcode builder. Owns a deep copy of the typing
/// environment so unifying formals against concrete instance types never
/// pollutes other instances.
pub struct OpCodeBuilder<'a> {
    pub ops: Vec<OpCode>,
    pub env: Env,
    context: &'a mut GeneratorContext,
    label_counter: usize,
    locals: HashMap<usize, i64>,
}

impl<'a> OpCodeBuilder<'a> {
    pub fn new(context: &'a mut GeneratorContext, env: Env) -> Self {
        OpCodeBuilder {
            ops: Vec::new(),
            env,
            context,
            label_counter: 0,
            locals: HashMap::new(),
        }
    }

    pub fn add(&mut self, op: OpCode) {
        self.ops.push(op);
    }

    pub fn fresh_label(&mut self) -> Label {
        self.label_counter += 1;
        Label {
            id: self.label_counter,
        }
    }

    pub fn mark(&mut self, label: Label) {
        self.ops.push(OpCode::MarkLabel(label));
    }

    /// Frame slot for a binding id, allocating the next one when new
    pub fn local(&mut self, id: usize) -> Local {
        if let Some(offset) = self.locals.get(&id) {
            return Local::new(*offset);
        }
        let offset = self.locals.len() as i64;
        self.add_local(id, offset)
    }

    pub fn add_local(&mut self, id: usize, offset: i64) -> Local {
        self.locals.insert(id, offset);
        Local::new(offset)
    }

    pub fn is_global(&self, id: usize) -> bool {
        self.context.is_global(id)
    }

    pub fn global(&mut self, id: usize) -> Global {
        self.context.register_global(id)
    }

    /// Concrete type of an expression under this instance's environment
    pub fn expr_type(&mut self, expr: &Expr) -> Result<InferenceType, CompilerError> {
        let tv = self.env.fresh_var();
        let subst = typechecker::infer_expr(&mut self.env, expr, &tv)?;
        Ok(subst.apply(&tv))
    }

    /// Emit the characters of `s` through `PrintChar`
    pub fn print_str(&mut self, s: &str) {
        for c in s.chars() {
            self.add(OpCode::PushConst(c as i64));
            self.add(OpCode::PrintChar);
        }
    }

    /// Emit a call, queueing the target instance for generation
    pub fn call(&mut self, name: &str, arg_types: Vec<InferenceType>, hidden: bool) {
        let instance = if hidden {
            FunctionInstance::hidden(name, arg_types)
        } else {
            FunctionInstance::new(name, arg_types)
        };
        let target = FunctionRef {
            ident: instance.mangled_id(),
            arity: instance.arg_types.len(),
        };
        self.context.require_instance(instance);
        self.add(OpCode::Call(target));
    }

    pub fn ends_with_return(&self) -> bool {
        matches!(self.ops.last(), Some(OpCode::Ret) | Some(OpCode::RetNoValue))
    }
}

/// Output of the generic stage, handed to either backend
#[derive(Debug)]
pub struct GenericProgram {
    pub functions: Vec<(FunctionInstance, FunctionImpl)>,
    pub globals_count: usize,
}

fn bound_id(id: Option<usize>) -> usize {
    id.expect("binding analysis runs before code generation")
}

/// Run the worklist to fixpoint and return every emitted instance
pub fn generate(file: &SplFile, env: &Env) -> Result<GenericProgram, CompilerError> {
    let mut fun_asts: HashMap<&str, &FunDecl> = HashMap::new();
    for decl in &file.declarations {
        if let Decl::Fun(f) = decl {
            fun_asts.insert(f.name.name.as_str(), f);
        }
    }

    let mut context = GeneratorContext::new();
    let mut functions = Vec::new();

    // synthesize the hidden entry routine: reserve and initialize every
    // global, call main, halt
    let mut builder = OpCodeBuilder::new(&mut context, env.clone());
    for decl in &file.declarations {
        if let Decl::Var(v) = decl {
            builder.global(bound_id(v.id));
        }
    }
    for decl in &file.declarations {
        if let Decl::Var(v) = decl {
            emit_expr(&v.init, &mut builder)?;
            let global = builder.global(bound_id(v.id));
            builder.add(OpCode::StGlob(global));
        }
    }
    builder.call("main", Vec::new(), false);
    builder.add(OpCode::Halt);
    let init_ops = builder.ops;
    functions.push((FunctionInstance::entry("init"), FunctionImpl { ops: init_ops }));

    while let Some(instance) = context.next_instance() {
        debug!("generating instance {}", instance.mangled_id());
        let mut builder = OpCodeBuilder::new(&mut context, env.clone());
        if let Some(fun) = fun_asts.get(instance.name.as_str()).copied() {
            // pin the formals to this instance's concrete argument types
            let mut subst = Subst::empty();
            for (arg_id, arg_type) in fun.param_ids.iter().zip(&instance.arg_types) {
                let current = builder.env.get_var(*arg_id);
                let s = unify(&subst.apply(&current), arg_type).map_err(|e| {
                    CompilerError::internal(format!(
                        "instance argument unification failed for '{}': {:?}",
                        instance.name, e
                    ))
                })?;
                subst = s.compose(&subst);
            }
            builder.env.apply(&subst);
            let num_args = fun.param_ids.len() as i64;
            for (i, arg_id) in fun.param_ids.iter().enumerate() {
                builder.add_local(*arg_id, -num_args + i as i64);
            }
            emit_block(&fun.body, &mut builder)?;
        } else if !builtins::emit(&instance.name, &instance.arg_types, &mut builder)? {
            return Err(CompilerError::UnknownCallee {
                name: instance.name.clone(),
            });
        }
        if !builder.ends_with_return() {
            builder.add(OpCode::RetNoValue);
        }
        let ops = builder.ops;
        functions.push((instance, FunctionImpl { ops }));
    }

    Ok(GenericProgram {
        functions,
        globals_count: context.globals_count(),
    })
}

// ---- AST lowering ----

pub fn emit_block(block: &Block, b: &mut OpCodeBuilder) -> Result<(), CompilerError> {
    for stmt in &block.statements {
        emit_stmt(stmt, b)?;
    }
    Ok(())
}

fn emit_stmt(stmt: &Statement, b: &mut OpCodeBuilder) -> Result<(), CompilerError> {
    match stmt {
        Statement::If(s) => {
            let end_label = b.fresh_label();
            let else_label = if s.else_block.is_some() {
                b.fresh_label()
            } else {
                end_label
            };
            emit_expr(&s.condition, b)?;
            b.add(OpCode::BrFalse(else_label));
            emit_block(&s.then_block, b)?;
            if let Some(else_block) = &s.else_block {
                b.add(OpCode::Br(end_label));
                b.mark(else_label);
                emit_block(else_block, b)?;
            }
            b.mark(end_label);
            Ok(())
        }
        Statement::While(s) => {
            let while_label = b.fresh_label();
            let end_label = b.fresh_label();
            b.mark(while_label);
            emit_expr(&s.condition, b)?;
            b.add(OpCode::BrFalse(end_label));
            emit_block(&s.body, b)?;
            b.add(OpCode::Br(while_label));
            b.mark(end_label);
            Ok(())
        }
        Statement::Assign(s) => {
            emit_expr(&s.value, b)?;
            emit_field_store(&s.target, b)
        }
        Statement::Return(s) => match &s.value {
            Some(e) => {
                emit_expr(e, b)?;
                b.add(OpCode::Ret);
                Ok(())
            }
            None => {
                b.add(OpCode::RetNoValue);
                Ok(())
            }
        },
        Statement::Block(block) => emit_block(block, b),
        Statement::Var(v) => {
            emit_expr(&v.init, b)?;
            let local = b.local(bound_id(v.id));
            b.add(OpCode::StLoc(local));
            Ok(())
        }
        Statement::Expr(s) => {
            emit_expr(&s.expr, b)?;
            b.add(OpCode::Pop);
            Ok(())
        }
        Statement::Error(_) => Err(CompilerError::internal(
            "error placeholder survived to code generation",
        )),
    }
}

pub fn emit_expr(expr: &Expr, b: &mut OpCodeBuilder) -> Result<(), CompilerError> {
    match expr {
        Expr::Binary { op, lhs, rhs, .. } => emit_binary(*op, lhs, rhs, b),
        Expr::Unary { op, operand, .. } => {
            emit_expr(operand, b)?;
            b.add(match op {
                UnaryOp::Minus => OpCode::Neg,
                UnaryOp::Not => OpCode::Not,
            });
            Ok(())
        }
        Expr::Number { value, .. } => {
            b.add(OpCode::PushConst(*value));
            Ok(())
        }
        Expr::Char { value, .. } => {
            b.add(OpCode::PushConst(*value as i64));
            Ok(())
        }
        Expr::Bool { value, .. } => {
            // true is all ones so bitwise not works as logical not
            b.add(OpCode::PushConst(if *value { -1 } else { 0 }));
            Ok(())
        }
        Expr::EmptyList { .. } => {
            b.add(OpCode::CreateListNil);
            Ok(())
        }
        Expr::Tuple { fst, snd, .. } => {
            emit_expr(fst, b)?;
            emit_expr(snd, b)?;
            b.add(OpCode::CreateTuple);
            Ok(())
        }
        Expr::Call(call) => {
            let mut arg_types = Vec::new();
            for arg in &call.args {
                arg_types.push(b.expr_type(arg)?);
            }
            for arg in &call.args {
                emit_expr(arg, b)?;
            }
            b.call(&call.name.name, arg_types, false);
            Ok(())
        }
        Expr::Field(field) => emit_field_load(field, b),
        Expr::Error { .. } => Err(CompilerError::internal(
            "error placeholder survived to code generation",
        )),
    }
}

fn emit_binary(
    op: BinaryOp,
    lhs: &Expr,
    rhs: &Expr,
    b: &mut OpCodeBuilder,
) -> Result<(), CompilerError> {
    emit_expr(lhs, b)?;
    emit_expr(rhs, b)?;

    match op {
        // the overloaded operators dispatch on the concrete operand types
        BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Add => {
            let t1 = b.expr_type(lhs)?;
            let t2 = b.expr_type(rhs)?;
            // unify to cover a still-open side, e.g. an empty list literal
            let s = unify(&t1, &t2).map_err(|e| {
                CompilerError::internal(format!("operand types diverged after typing: {:?}", e))
            })?;
            let t1 = s.apply(&t1);
            let t2 = s.apply(&t2);
            match op {
                BinaryOp::Add => {
                    if matches!(t1, InferenceType::Bool | InferenceType::Tuple(_, _)) {
                        return Err(CompilerError::NoFunctionInstance {
                            name: "__add".to_string(),
                            arg_types: format!("{}, {}", t1, t2),
                        });
                    }
                    if t1.is_scalar() && t2.is_scalar() {
                        b.add(OpCode::Add);
                    } else {
                        b.call("__add", vec![t1, t2], true);
                    }
                }
                BinaryOp::Eq | BinaryOp::Ne => {
                    let negate = op == BinaryOp::Ne;
                    if t1.is_scalar() && t2.is_scalar() {
                        b.add(if negate { OpCode::Ne } else { OpCode::Eq });
                    } else {
                        // an operand type that never became concrete can only
                        // be compared by reference
                        if t1.is_type_var() {
                            b.call("__refeq", vec![t1, t2], true);
                        } else {
                            b.call("equals", vec![t1, t2], false);
                        }
                        if negate {
                            b.add(OpCode::Not);
                        }
                    }
                }
                _ => unreachable!(),
            }
            Ok(())
        }
        BinaryOp::Sub => {
            b.add(OpCode::Sub);
            Ok(())
        }
        BinaryOp::Mul => {
            b.add(OpCode::Mul);
            Ok(())
        }
        BinaryOp::Div => {
            b.add(OpCode::Div);
            Ok(())
        }
        BinaryOp::Mod => {
            b.add(OpCode::Mod);
            Ok(())
        }
        BinaryOp::Lt => {
            b.add(OpCode::Lt);
            Ok(())
        }
        BinaryOp::Le => {
            b.add(OpCode::Le);
            Ok(())
        }
        BinaryOp::Ge => {
            b.add(OpCode::Ge);
            Ok(())
        }
        BinaryOp::Gt => {
            b.add(OpCode::Gt);
            Ok(())
        }
        BinaryOp::And => {
            b.add(OpCode::And);
            Ok(())
        }
        BinaryOp::Or => {
            b.add(OpCode::Or);
            Ok(())
        }
        BinaryOp::Cons => {
            b.add(OpCode::CreateListCons);
            Ok(())
        }
    }
}

fn emit_field_load(field: &FieldAccess, b: &mut OpCodeBuilder) -> Result<(), CompilerError> {
    match field {
        FieldAccess::Var { id, .. } => {
            let id = bound_id(*id);
            if b.is_global(id) {
                let global = b.global(id);
                b.add(OpCode::LdGlob(global));
            } else {
                let local = b.local(id);
                b.add(OpCode::LdLoc(local));
            }
            Ok(())
        }
        FieldAccess::Accessor { sel, base, .. } => {
            emit_field_load(base, b)?;
            b.add(OpCode::LdFld(*sel));
            Ok(())
        }
    }
}

fn emit_field_store(field: &FieldAccess, b: &mut OpCodeBuilder) -> Result<(), CompilerError> {
    match field {
        FieldAccess::Var { id, .. } => {
            let id = bound_id(*id);
            if b.is_global(id) {
                let global = b.global(id);
                b.add(OpCode::StGlob(global));
            } else {
                let local = b.local(id);
                b.add(OpCode::StLoc(local));
            }
            Ok(())
        }
        FieldAccess::Accessor { sel, base, .. } => {
            // the value is on the stack; load the cell address, swap so
            // the address is on top for the store
            emit_field_load(base, b)?;
            b.add(OpCode::Swp);
            b.add(OpCode::StFld(*sel));
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::builtins::{seed_env, BUILTIN_NAMES};
    use crate::lexer::lex;
    use crate::parser::parse;
    use std::collections::HashSet;

    pub(crate) fn generate_program(source: &str) -> GenericProgram {
        let (tokens, lex_errors) = lex(source);
        assert!(lex_errors.is_empty());
        let (mut file, parse_errors) = parse(tokens);
        assert!(parse_errors.is_empty(), "parse errors: {:?}", parse_errors);
        let fb = crate::binding::analyze(&mut file, &BUILTIN_NAMES);
        assert!(!fb.has_errors(), "binding errors: {:?}", fb.errors);
        let mut env = Env::new();
        seed_env(&mut env);
        let subst = crate::typechecker::infer_file(&mut env, &file).expect("typing failed");
        env.apply(&subst);
        generate(&file, &env).expect("codegen failed")
    }

    #[test]
    fn test_mangled_ids() {
        let inst = FunctionInstance::new(
            "print",
            vec![InferenceType::tuple(InferenceType::Int, InferenceType::Int)],
        );
        assert_eq!(inst.mangled_id(), "print_1__PO_int_CM__int_PC_");
        let hidden = FunctionInstance::hidden("__add", vec![InferenceType::Int, InferenceType::Int]);
        assert_eq!(hidden.mangled_id(), "___add_2_int_int");
        assert_eq!(FunctionInstance::entry("init").mangled_id(), "init");
    }

    #[test]
    fn test_entry_routine_synthesized() {
        let program = generate_program("var g = 41;\nmain() { println(g + 1); }");
        let (init, init_impl) = &program.functions[0];
        assert!(init.entry_point);
        assert_eq!(init.name, "init");
        // globals initialized, then main called, then halt
        assert!(init_impl
            .ops
            .iter()
            .any(|op| matches!(op, OpCode::StGlob(_))));
        assert!(matches!(init_impl.ops.last(), Some(OpCode::Halt)));
        let call = init_impl
            .ops
            .iter()
            .find_map(|op| match op {
                OpCode::Call(f) => Some(f.ident.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(call, "main_0_");
        assert_eq!(program.globals_count, 1);
    }

    #[test]
    fn test_instances_deduplicated() {
        let program = generate_program(
            "main() { println(1); println(2); println(True); }",
        );
        let ids: Vec<String> = program
            .functions
            .iter()
            .map(|(inst, _)| inst.mangled_id())
            .collect();
        let unique: HashSet<&String> = ids.iter().collect();
        assert_eq!(ids.len(), unique.len(), "duplicate instance emitted: {:?}", ids);
        // println at int appears once even though called twice
        assert_eq!(
            ids.iter().filter(|id| id.as_str() == "println_1_int").count(),
            1
        );
        assert!(ids.iter().any(|id| id == "println_1_bool"));
    }

    #[test]
    fn test_builtin_instances_cascade() {
        // printing a list of tuples needs print instances for the list,
        // the tuple and the scalars
        let program = generate_program("main() { println((1, True) : []); }");
        let ids: Vec<String> = program
            .functions
            .iter()
            .map(|(inst, _)| inst.mangled_id())
            .collect();
        assert!(ids.iter().any(|id| id.contains("print_1__BO_")));
        assert!(ids.iter().any(|id| id == "print_1__PO_int_CM__bool_PC_"));
        assert!(ids.iter().any(|id| id == "print_1_int"));
        assert!(ids.iter().any(|id| id == "print_1_bool"));
    }

    #[test]
    fn test_polymorphic_function_monomorphized_per_type() {
        let program = generate_program(
            "id(x) { return x; }\nmain() { println(id(1)); println(id('c')); }",
        );
        let ids: Vec<String> = program
            .functions
            .iter()
            .map(|(inst, _)| inst.mangled_id())
            .collect();
        assert!(ids.iter().any(|id| id == "id_1_int"));
        assert!(ids.iter().any(|id| id == "id_1_char"));
    }

    #[test]
    fn test_arguments_map_to_negative_offsets() {
        let program = generate_program("sub(a, b) { return a - b; }\nmain() { println(sub(5, 3)); }");
        let (_, body) = program
            .functions
            .iter()
            .find(|(inst, _)| inst.name == "sub")
            .unwrap();
        assert!(body.ops.contains(&OpCode::LdLoc(Local::new(-2))));
        assert!(body.ops.contains(&OpCode::LdLoc(Local::new(-1))));
    }

    #[test]
    fn test_equality_on_lists_routes_to_equals() {
        let program = generate_program(
            "main() { var xs = 1 : []; var ys = 2 : []; println(xs == ys); }",
        );
        let ids: Vec<String> = program
            .functions
            .iter()
            .map(|(inst, _)| inst.mangled_id())
            .collect();
        assert!(ids.iter().any(|id| id == "equals_2__BO_int_BC___BO_int_BC_"));
    }

    #[test]
    fn test_scalar_equality_stays_inline() {
        let program = generate_program("main() { println(1 == 2); }");
        let (_, main_impl) = program
            .functions
            .iter()
            .find(|(inst, _)| inst.name == "main")
            .unwrap();
        assert!(main_impl.ops.contains(&OpCode::Eq));
    }

    #[test]
    fn test_list_append_routes_to_add_builtin() {
        let program = generate_program(
            "main() { var xs = 1 : []; var ys = 2 : []; println(xs + ys); }",
        );
        let ids: Vec<String> = program
            .functions
            .iter()
            .map(|(inst, _)| inst.mangled_id())
            .collect();
        assert!(ids.iter().any(|id| id.starts_with("___add_2__BO_int")));
    }

    #[test]
    fn test_implicit_return_appended() {
        let program = generate_program("main() { println(1); }");
        let (_, main_impl) = program
            .functions
            .iter()
            .find(|(inst, _)| inst.name == "main")
            .unwrap();
        assert!(matches!(main_impl.ops.last(), Some(OpCode::RetNoValue)));
    }

    #[test]
    fn test_field_assignment_emits_swap_and_store() {
        let program = generate_program("main() { var x = \"ab\"; x.hd = 'z'; println(x); }");
        let (_, main_impl) = program
            .functions
            .iter()
            .find(|(inst, _)| inst.name == "main")
            .unwrap();
        let swap_pos = main_impl
            .ops
            .iter()
            .position(|op| matches!(op, OpCode::Swp))
            .expect("no swap emitted");
        assert!(matches!(
            main_impl.ops[swap_pos + 1],
            OpCode::StFld(Selector::Hd)
        ));
    }
}
