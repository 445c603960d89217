//! Monomorphized builtin generators
//!
//! Each builtin seeds a polymorphic scheme into the typing environment
//! and, per concrete instance the worklist requests, emits a structural
//! body: printing, equality and append recurse through list and tuple
//! shapes, terminating at scalars. A list whose element type never
//! became concrete can hold no values; the generated bodies guard the
//! contents branch with a runtime diagnostic and halt.

use super::{Local, OpCode, OpCodeBuilder};
use crate::ast::Selector;
use crate::errors::CompilerError;
use crate::typechecker::Env;
use crate::types::InferenceType;

/// Names the code generator can materialize on demand
pub const BUILTIN_NAMES: [&str; 7] = [
    "print", "println", "equals", "__refeq", "__add", "len", "isEmpty",
];

const TYPE_VAR_LIST_DIAGNOSTIC: &str = "Error: type var list has contents";

fn fresh_quant(env: &mut Env) -> (usize, InferenceType) {
    let tv = env.fresh_var();
    let InferenceType::Var(n) = tv else {
        unreachable!("fresh_var returns a variable");
    };
    (n, InferenceType::Var(n))
}

/// Seed every builtin scheme into the environment
pub fn seed_env(env: &mut Env) {
    let (n, tv) = fresh_quant(env);
    env.add_builtin("print", vec![n], vec![tv], InferenceType::Void);

    let (n, tv) = fresh_quant(env);
    env.add_builtin("println", vec![n], vec![tv], InferenceType::Void);

    let (n, tv) = fresh_quant(env);
    env.add_builtin(
        "equals",
        vec![n],
        vec![tv.clone(), tv],
        InferenceType::Bool,
    );

    let (n, tv) = fresh_quant(env);
    env.add_builtin(
        "__refeq",
        vec![n],
        vec![tv.clone(), tv],
        InferenceType::Bool,
    );

    let (n, tv) = fresh_quant(env);
    env.add_builtin("__add", vec![n], vec![tv.clone(), tv.clone()], tv);

    let (n, tv) = fresh_quant(env);
    env.add_builtin(
        "len",
        vec![n],
        vec![InferenceType::list(tv)],
        InferenceType::Int,
    );

    let (n, tv) = fresh_quant(env);
    env.add_builtin(
        "isEmpty",
        vec![n],
        vec![InferenceType::list(tv)],
        InferenceType::Bool,
    );
}

/// Emit the body of builtin `name` for the given concrete argument
/// types. Returns `Ok(false)` when the name is not a builtin.
pub fn emit(
    name: &str,
    arg_types: &[InferenceType],
    b: &mut OpCodeBuilder,
) -> Result<bool, CompilerError> {
    match name {
        "print" => emit_print(arg_types, b)?,
        "println" => emit_println(arg_types, b)?,
        "equals" => emit_equals(arg_types, b)?,
        "__refeq" => emit_refeq(b),
        "__add" => emit_add(arg_types, b)?,
        "len" => emit_len(arg_types, b)?,
        "isEmpty" => emit_is_empty(arg_types, b)?,
        _ => return Ok(false),
    }
    Ok(true)
}

fn single_arg<'t>(
    name: &str,
    arg_types: &'t [InferenceType],
) -> Result<&'t InferenceType, CompilerError> {
    match arg_types {
        [t] => Ok(t),
        _ => Err(CompilerError::internal(format!(
            "'{}' expects 1 argument but found {}",
            name,
            arg_types.len()
        ))),
    }
}

fn pair_args<'t>(
    name: &str,
    arg_types: &'t [InferenceType],
) -> Result<(&'t InferenceType, &'t InferenceType), CompilerError> {
    match arg_types {
        [t1, t2] => Ok((t1, t2)),
        _ => Err(CompilerError::internal(format!(
            "'{}' expects 2 arguments but found {}",
            name,
            arg_types.len()
        ))),
    }
}

/// Both arguments must share a shape; two lists of open element type are
/// also acceptable (nothing to recurse into)
fn check_same_shape(
    name: &str,
    t1: &InferenceType,
    t2: &InferenceType,
) -> Result<(), CompilerError> {
    let open_lists = matches!(
        (t1, t2),
        (InferenceType::List(a), InferenceType::List(b))
            if a.is_type_var() && b.is_type_var()
    );
    if t1 == t2 || open_lists {
        Ok(())
    } else {
        Err(CompilerError::internal(format!(
            "'{}' expects both arguments to be of the same type, found {} and {}",
            name, t1, t2
        )))
    }
}

fn emit_print(arg_types: &[InferenceType], b: &mut OpCodeBuilder) -> Result<(), CompilerError> {
    let arg_type = single_arg("print", arg_types)?;
    let arg = Local::new(-1);
    match arg_type {
        InferenceType::Int => {
            b.add(OpCode::LdLoc(arg));
            b.add(OpCode::PrintInt);
        }
        InferenceType::Bool => {
            let false_label = b.fresh_label();
            let end_label = b.fresh_label();
            b.add(OpCode::LdLoc(arg));
            b.add(OpCode::BrFalse(false_label));
            b.print_str("True");
            b.add(OpCode::Br(end_label));
            b.mark(false_label);
            b.print_str("False");
            b.mark(end_label);
        }
        InferenceType::Char => {
            b.add(OpCode::LdLoc(arg));
            b.add(OpCode::PrintChar);
        }
        InferenceType::List(elem) => {
            let nil_label = b.fresh_label();
            let end_label = b.fresh_label();
            let is_string = **elem == InferenceType::Char;

            b.add(OpCode::LdLoc(arg));
            b.add(OpCode::BrFalse(nil_label));
            if elem.is_type_var() {
                b.print_str(TYPE_VAR_LIST_DIAGNOSTIC);
                b.add(OpCode::Halt);
            } else {
                b.add(OpCode::LdLoc(arg));
                b.add(OpCode::LdFld(Selector::Hd));
                b.call("print", vec![(**elem).clone()], false);
                b.add(OpCode::Pop);
            }
            // strings print flat; other lists show the cons structure
            if !is_string {
                b.print_str(" : ");
            }
            b.add(OpCode::LdLoc(arg));
            b.add(OpCode::LdFld(Selector::Tl));
            b.call("print", vec![arg_type.clone()], false);
            b.add(OpCode::Pop);
            b.add(OpCode::Br(end_label));
            b.mark(nil_label);
            if !is_string {
                b.print_str("[]");
            }
            b.mark(end_label);
        }
        InferenceType::Tuple(t1, t2) => {
            b.print_str("(");
            b.add(OpCode::LdLoc(arg));
            b.add(OpCode::LdFld(Selector::Fst));
            b.call("print", vec![(**t1).clone()], false);
            b.add(OpCode::Pop);
            b.print_str(", ");
            b.add(OpCode::LdLoc(arg));
            b.add(OpCode::LdFld(Selector::Snd));
            b.call("print", vec![(**t2).clone()], false);
            b.add(OpCode::Pop);
            b.print_str(")");
        }
        InferenceType::Var(_) | InferenceType::Void => {
            return Err(CompilerError::internal(format!(
                "could not generate print code for type {}",
                arg_type
            )));
        }
    }
    Ok(())
}

fn emit_println(arg_types: &[InferenceType], b: &mut OpCodeBuilder) -> Result<(), CompilerError> {
    let arg_type = single_arg("println", arg_types)?;
    if arg_type.is_type_var() || *arg_type == InferenceType::Void {
        return Err(CompilerError::internal(format!(
            "could not generate println code for type {}",
            arg_type
        )));
    }
    b.add(OpCode::LdLoc(Local::new(-1)));
    b.call("print", vec![arg_type.clone()], false);
    b.add(OpCode::PushConst('\n' as i64));
    b.add(OpCode::PrintChar);
    Ok(())
}

fn emit_equals(arg_types: &[InferenceType], b: &mut OpCodeBuilder) -> Result<(), CompilerError> {
    let (t1, t2) = pair_args("equals", arg_types)?;
    check_same_shape("equals", t1, t2)?;
    let arg1 = Local::new(-1);
    let arg2 = Local::new(-2);

    match t1 {
        InferenceType::Int | InferenceType::Bool | InferenceType::Char => {
            b.add(OpCode::LdLoc(arg1));
            b.add(OpCode::LdLoc(arg2));
            b.add(OpCode::Eq);
            b.add(OpCode::Ret);
        }
        InferenceType::List(elem) => {
            let nil_label = b.fresh_label();
            let false_label = b.fresh_label();
            b.add(OpCode::LdLoc(arg1));
            b.add(OpCode::BrFalse(nil_label));
            if elem.is_type_var() {
                b.print_str(TYPE_VAR_LIST_DIAGNOSTIC);
                b.add(OpCode::Halt);
            } else {
                b.add(OpCode::LdLoc(arg1));
                b.add(OpCode::LdFld(Selector::Hd));
                b.add(OpCode::LdLoc(arg2));
                b.add(OpCode::LdFld(Selector::Hd));
                b.call("equals", vec![(**elem).clone(), (**elem).clone()], false);
                b.add(OpCode::BrFalse(false_label));
            }
            b.add(OpCode::LdLoc(arg1));
            b.add(OpCode::LdFld(Selector::Tl));
            b.add(OpCode::LdLoc(arg2));
            b.add(OpCode::LdFld(Selector::Tl));
            b.call("equals", vec![t1.clone(), t1.clone()], false);
            b.add(OpCode::Ret);

            // one side nil: equal exactly when the other is nil too
            b.mark(nil_label);
            b.add(OpCode::LdLoc(arg1));
            b.add(OpCode::LdLoc(arg2));
            b.add(OpCode::Eq);
            b.add(OpCode::Ret);

            b.mark(false_label);
            b.add(OpCode::PushConst(0));
            b.add(OpCode::Ret);
        }
        InferenceType::Tuple(fst, snd) => {
            let false_label = b.fresh_label();
            b.add(OpCode::LdLoc(arg1));
            b.add(OpCode::LdFld(Selector::Fst));
            b.add(OpCode::LdLoc(arg2));
            b.add(OpCode::LdFld(Selector::Fst));
            b.call("equals", vec![(**fst).clone(), (**fst).clone()], false);
            b.add(OpCode::BrFalse(false_label));

            b.add(OpCode::LdLoc(arg1));
            b.add(OpCode::LdFld(Selector::Snd));
            b.add(OpCode::LdLoc(arg2));
            b.add(OpCode::LdFld(Selector::Snd));
            b.call("equals", vec![(**snd).clone(), (**snd).clone()], false);
            b.add(OpCode::Ret);

            b.mark(false_label);
            b.add(OpCode::PushConst(0));
            b.add(OpCode::Ret);
        }
        InferenceType::Var(_) | InferenceType::Void => {
            return Err(CompilerError::internal(format!(
                "could not generate equals code for type {}",
                t1
            )));
        }
    }
    Ok(())
}

fn emit_refeq(b: &mut OpCodeBuilder) {
    b.add(OpCode::LdLoc(Local::new(-1)));
    b.add(OpCode::LdLoc(Local::new(-2)));
    b.add(OpCode::Eq);
    b.add(OpCode::Ret);
}

fn emit_add(arg_types: &[InferenceType], b: &mut OpCodeBuilder) -> Result<(), CompilerError> {
    let (t1, t2) = pair_args("__add", arg_types)?;
    check_same_shape("__add", t1, t2)?;
    let arg1 = Local::new(-2);
    let arg2 = Local::new(-1);

    match t1 {
        InferenceType::Int | InferenceType::Char => {
            b.add(OpCode::LdLoc(arg1));
            b.add(OpCode::LdLoc(arg2));
            b.add(OpCode::Add);
            b.add(OpCode::Ret);
        }
        InferenceType::List(_) => {
            let nil1_label = b.fresh_label();
            let nil2_label = b.fresh_label();
            // cons of the left head onto the appended tails
            b.add(OpCode::LdLoc(arg1));
            b.add(OpCode::BrFalse(nil1_label));
            b.add(OpCode::LdLoc(arg1));
            b.add(OpCode::LdFld(Selector::Hd));
            b.add(OpCode::LdLoc(arg1));
            b.add(OpCode::LdFld(Selector::Tl));
            b.add(OpCode::LdLoc(arg2));
            b.call("__add", vec![t1.clone(), t1.clone()], true);
            b.add(OpCode::CreateListCons);
            b.add(OpCode::Ret);

            // left side exhausted: copy the remainder of the right side
            b.mark(nil1_label);
            b.add(OpCode::LdLoc(arg2));
            b.add(OpCode::BrFalse(nil2_label));
            if let InferenceType::List(elem) = t2 {
                if elem.is_type_var() {
                    b.print_str(TYPE_VAR_LIST_DIAGNOSTIC);
                    b.add(OpCode::Halt);
                }
            }
            b.add(OpCode::LdLoc(arg2));
            b.add(OpCode::LdFld(Selector::Hd));
            b.add(OpCode::PushConst(0));
            b.add(OpCode::LdLoc(arg2));
            b.add(OpCode::LdFld(Selector::Tl));
            b.call("__add", vec![t1.clone(), t1.clone()], true);
            b.add(OpCode::CreateListCons);
            b.add(OpCode::Ret);

            b.mark(nil2_label);
            b.add(OpCode::CreateListNil);
            b.add(OpCode::Ret);
        }
        _ => {
            return Err(CompilerError::NoFunctionInstance {
                name: "__add".to_string(),
                arg_types: format!("{}, {}", t1, t2),
            });
        }
    }
    Ok(())
}

fn emit_len(arg_types: &[InferenceType], b: &mut OpCodeBuilder) -> Result<(), CompilerError> {
    let t = single_arg("len", arg_types)?;
    let InferenceType::List(elem) = t else {
        return Err(CompilerError::internal(format!(
            "'len' expects a list argument, but type {} was given",
            t
        )));
    };
    let arg = Local::new(-1);
    let empty_label = b.fresh_label();
    b.add(OpCode::LdLoc(arg));
    b.add(OpCode::BrFalse(empty_label));
    if elem.is_type_var() {
        b.print_str(TYPE_VAR_LIST_DIAGNOSTIC);
        b.add(OpCode::Halt);
    }
    b.add(OpCode::LdLoc(arg));
    b.add(OpCode::LdFld(Selector::Tl));
    b.call("len", vec![t.clone()], false);
    b.add(OpCode::PushConst(1));
    b.add(OpCode::Add);
    b.add(OpCode::Ret);

    b.mark(empty_label);
    b.add(OpCode::PushConst(0));
    b.add(OpCode::Ret);
    Ok(())
}

fn emit_is_empty(arg_types: &[InferenceType], b: &mut OpCodeBuilder) -> Result<(), CompilerError> {
    let t = single_arg("isEmpty", arg_types)?;
    if !matches!(t, InferenceType::List(_)) {
        return Err(CompilerError::internal(format!(
            "'isEmpty' expects a list argument, but type {} was given",
            t
        )));
    }
    // a list is a nil pointer exactly when it is empty
    b.add(OpCode::LdLoc(Local::new(-1)));
    b.add(OpCode::PushConst(0));
    b.add(OpCode::Eq);
    b.add(OpCode::Ret);
    Ok(())
}
