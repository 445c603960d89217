//! SSM backend
//!
//! One-to-one translation of the generic opcodes to Simple Stack Machine
//! mnemonics. Every function body gets a `link`/`unlink` frame; the
//! entry point additionally reserves a heap region for the globals,
//! addressed at a fixed offset on every access.

use super::{FunctionImpl, FunctionInstance, GenericProgram, OpCode};
use crate::ast::Selector;
use crate::errors::CompilerError;
use std::fmt::Write as _;

/// Fixed heap address where the global block lives
const HEAP_LOCATION: i64 = 2000;

/// SSM machine registers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SsmRegister {
    PC,
    SP,
    MP,
    HP,
    RR,
}

impl std::fmt::Display for SsmRegister {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SsmRegister::PC => "PC",
            SsmRegister::SP => "SP",
            SsmRegister::MP => "MP",
            SsmRegister::HP => "HP",
            SsmRegister::RR => "RR",
        };
        write!(f, "{}", s)
    }
}

/// SSM instructions, rendered one per line. Function markers sit at
/// column 0, labels are indented two spaces, instructions four.
#[derive(Debug, Clone, PartialEq)]
pub enum SsmOp {
    Ldc(i64),
    Ldl(i64),
    Stl(i64),
    Lda(i64),
    Sta(i64),
    Ldr(SsmRegister),
    Str(SsmRegister),
    Ajs(i64),
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    And,
    Or,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Neg,
    Not,
    Swp,
    Bsr(String),
    Bra(String),
    Brf(String),
    Brt(String),
    Ret,
    Link(i64),
    Unlink,
    Halt,
    Trap(u8),
    Stmh(usize),
    MarkFunction(String),
    MarkLabel(String),
}

impl std::fmt::Display for SsmOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SsmOp::MarkFunction(name) => write!(f, "f_{}: ", name),
            SsmOp::MarkLabel(name) => write!(f, "  {}: ", name),
            other => {
                write!(f, "    ")?;
                match other {
                    SsmOp::Ldc(i) => write!(f, "ldc {}", i),
                    SsmOp::Ldl(i) => write!(f, "ldl {}", i),
                    SsmOp::Stl(i) => write!(f, "stl {}", i),
                    SsmOp::Lda(i) => write!(f, "lda {}", i),
                    SsmOp::Sta(i) => write!(f, "sta {}", i),
                    SsmOp::Ldr(r) => write!(f, "ldr {}", r),
                    SsmOp::Str(r) => write!(f, "str {}", r),
                    SsmOp::Ajs(i) => write!(f, "ajs {}", i),
                    SsmOp::Add => write!(f, "add"),
                    SsmOp::Sub => write!(f, "sub"),
                    SsmOp::Mul => write!(f, "mul"),
                    SsmOp::Div => write!(f, "div"),
                    SsmOp::Mod => write!(f, "mod"),
                    SsmOp::And => write!(f, "and"),
                    SsmOp::Or => write!(f, "or"),
                    SsmOp::Eq => write!(f, "eq"),
                    SsmOp::Ne => write!(f, "ne"),
                    SsmOp::Lt => write!(f, "lt"),
                    SsmOp::Le => write!(f, "le"),
                    SsmOp::Gt => write!(f, "gt"),
                    SsmOp::Ge => write!(f, "ge"),
                    SsmOp::Neg => write!(f, "neg"),
                    SsmOp::Not => write!(f, "not"),
                    SsmOp::Swp => write!(f, "swp"),
                    SsmOp::Bsr(target) => write!(f, "bsr f_{}", target),
                    SsmOp::Bra(l) => write!(f, "bra {}", l),
                    SsmOp::Brf(l) => write!(f, "brf {}", l),
                    SsmOp::Brt(l) => write!(f, "brt {}", l),
                    SsmOp::Ret => write!(f, "ret"),
                    SsmOp::Link(i) => write!(f, "link {}", i),
                    SsmOp::Unlink => write!(f, "unlink"),
                    SsmOp::Halt => write!(f, "halt"),
                    SsmOp::Trap(i) => write!(f, "trap {}", i),
                    SsmOp::Stmh(i) => write!(f, "stmh {}", i),
                    SsmOp::MarkFunction(_) | SsmOp::MarkLabel(_) => unreachable!(),
                }
            }
        }
    }
}

pub struct SsmGenerator<'a> {
    program: &'a GenericProgram,
    code: Vec<Vec<SsmOp>>,
    entry_point: Option<String>,
}

impl<'a> SsmGenerator<'a> {
    pub fn new(program: &'a GenericProgram) -> Self {
        SsmGenerator {
            program,
            code: Vec::new(),
            entry_point: None,
        }
    }

    pub fn generate(&mut self) -> Result<(), CompilerError> {
        for (instance, body) in &self.program.functions {
            self.generate_function(instance, body)?;
        }
        Ok(())
    }

    /// The finished listing, one instruction per line
    pub fn write_to_string(&self) -> String {
        let mut out = String::new();
        for ops in &self.code {
            for op in ops {
                let _ = writeln!(out, "{}", op);
            }
        }
        out
    }

    fn generate_function(
        &mut self,
        instance: &FunctionInstance,
        body: &FunctionImpl,
    ) -> Result<(), CompilerError> {
        let mut ops = Vec::new();
        let local_count = body.frame_slot_count();

        ops.push(SsmOp::MarkFunction(instance.mangled_id()));
        ops.push(SsmOp::Link(local_count));

        if instance.entry_point {
            if let Some(first) = &self.entry_point {
                return Err(CompilerError::DuplicateEntryPoint {
                    first: first.clone(),
                    second: instance.name.clone(),
                });
            }
            self.entry_point = Some(instance.name.clone());
            self.reserve_globals(&mut ops);
        }

        for op in &body.ops {
            map_opcode(instance, op, &mut ops);
        }
        self.code.push(ops);
        Ok(())
    }

    /// Reserve a heap word per global by storing a block of zeros
    fn reserve_globals(&self, ops: &mut Vec<SsmOp>) {
        let count = self.program.globals_count;
        if count == 0 {
            return;
        }
        for _ in 0..count {
            ops.push(SsmOp::Ldc(0));
        }
        ops.push(SsmOp::Stmh(count));
        // stmh leaves the block address on the stack
        ops.push(SsmOp::Ajs(-1));
    }
}

fn selector_offset(sel: Selector) -> i64 {
    // stmh leaves the address of the last pushed word
    match sel {
        Selector::Fst | Selector::Hd => -1,
        Selector::Snd | Selector::Tl => 0,
    }
}

fn map_opcode(instance: &FunctionInstance, op: &OpCode, ops: &mut Vec<SsmOp>) {
    match op {
        OpCode::Add => ops.push(SsmOp::Add),
        OpCode::Sub => ops.push(SsmOp::Sub),
        OpCode::Mul => ops.push(SsmOp::Mul),
        OpCode::Div => ops.push(SsmOp::Div),
        OpCode::Mod => ops.push(SsmOp::Mod),
        OpCode::And => ops.push(SsmOp::And),
        OpCode::Or => ops.push(SsmOp::Or),
        OpCode::Eq => ops.push(SsmOp::Eq),
        OpCode::Ne => ops.push(SsmOp::Ne),
        OpCode::Lt => ops.push(SsmOp::Lt),
        OpCode::Le => ops.push(SsmOp::Le),
        OpCode::Gt => ops.push(SsmOp::Gt),
        OpCode::Ge => ops.push(SsmOp::Ge),
        OpCode::Neg => ops.push(SsmOp::Neg),
        OpCode::Not => ops.push(SsmOp::Not),
        OpCode::Swp => ops.push(SsmOp::Swp),
        OpCode::Pop => ops.push(SsmOp::Ajs(-1)),
        OpCode::Halt => ops.push(SsmOp::Halt),
        OpCode::PushConst(k) => ops.push(SsmOp::Ldc(*k)),
        OpCode::Br(l) => ops.push(SsmOp::Bra(l.distinct_name(instance))),
        OpCode::BrTrue(l) => ops.push(SsmOp::Brt(l.distinct_name(instance))),
        OpCode::BrFalse(l) => ops.push(SsmOp::Brf(l.distinct_name(instance))),
        OpCode::BrEq(l) => {
            ops.push(SsmOp::Eq);
            ops.push(SsmOp::Brt(l.distinct_name(instance)));
        }
        OpCode::BrNe(l) => {
            ops.push(SsmOp::Ne);
            ops.push(SsmOp::Brt(l.distinct_name(instance)));
        }
        OpCode::BrGe(l) => {
            ops.push(SsmOp::Ge);
            ops.push(SsmOp::Brt(l.distinct_name(instance)));
        }
        OpCode::BrGt(l) => {
            ops.push(SsmOp::Gt);
            ops.push(SsmOp::Brt(l.distinct_name(instance)));
        }
        OpCode::BrLe(l) => {
            ops.push(SsmOp::Le);
            ops.push(SsmOp::Brt(l.distinct_name(instance)));
        }
        OpCode::BrLt(l) => {
            ops.push(SsmOp::Lt);
            ops.push(SsmOp::Brt(l.distinct_name(instance)));
        }
        OpCode::MarkLabel(l) => ops.push(SsmOp::MarkLabel(l.distinct_name(instance))),
        OpCode::PrintInt => ops.push(SsmOp::Trap(0)),
        OpCode::PrintChar => ops.push(SsmOp::Trap(1)),
        OpCode::Call(target) => {
            ops.push(SsmOp::Bsr(target.ident.clone()));
            // the caller pushed the arguments; drop them and fetch the result
            ops.push(SsmOp::Ajs(-(target.arity as i64)));
            ops.push(SsmOp::Ldr(SsmRegister::RR));
        }
        OpCode::Ret => {
            ops.push(SsmOp::Str(SsmRegister::RR));
            ops.push(SsmOp::Unlink);
            ops.push(SsmOp::Ret);
        }
        OpCode::RetNoValue => {
            ops.push(SsmOp::Unlink);
            ops.push(SsmOp::Ret);
        }
        OpCode::LdLoc(local) => {
            // arguments sit below the saved MP
            let offset = if local.offset < 0 {
                local.offset - 1
            } else {
                local.offset
            };
            ops.push(SsmOp::Ldl(offset));
        }
        OpCode::StLoc(local) => {
            let offset = if local.offset < 0 {
                local.offset - 1
            } else {
                local.offset
            };
            ops.push(SsmOp::Stl(offset));
        }
        OpCode::LdGlob(global) => {
            ops.push(SsmOp::Ldc(HEAP_LOCATION + global.offset as i64));
            ops.push(SsmOp::Lda(0));
        }
        OpCode::StGlob(global) => {
            ops.push(SsmOp::Ldc(HEAP_LOCATION + global.offset as i64));
            ops.push(SsmOp::Sta(0));
        }
        OpCode::CreateListCons | OpCode::CreateTuple => ops.push(SsmOp::Stmh(2)),
        OpCode::CreateListNil => ops.push(SsmOp::Ldc(0)),
        OpCode::LdFld(sel) => ops.push(SsmOp::Lda(selector_offset(*sel))),
        OpCode::StFld(sel) => ops.push(SsmOp::Sta(selector_offset(*sel))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::tests::generate_program;

    fn listing(source: &str) -> String {
        let program = generate_program(source);
        let mut generator = SsmGenerator::new(&program);
        generator.generate().expect("ssm generation failed");
        generator.write_to_string()
    }

    #[test]
    fn test_add_scenario() {
        let out = listing("main() { println(1 + 2); }");
        assert!(out.contains("    ldc 1\n"));
        assert!(out.contains("    ldc 2\n"));
        assert!(out.contains("    add\n"));
        assert!(out.contains("    bsr f_println_1_int\n"));
        // println ends with the newline trap
        assert!(out.contains("    ldc 10\n    trap 1\n"));
        assert!(out.contains("    halt\n"));
    }

    #[test]
    fn test_listing_starts_at_entry_point() {
        let out = listing("main() { println(1); }");
        assert!(out.starts_with("f_init: \n"));
    }

    #[test]
    fn test_function_frames() {
        let out = listing("f(n) :: Int -> Int { var m = n + 1; return m; }\nmain() { println(f(1)); }");
        // f stores one local: link 1, stl 0, and returns through RR
        assert!(out.contains("f_f_1_int: \n    link 1\n"));
        assert!(out.contains("    stl 0\n"));
        assert!(out.contains("    str RR\n    unlink\n    ret\n"));
        // the argument sits below the saved mark pointer
        assert!(out.contains("    ldl -2\n"));
    }

    #[test]
    fn test_call_cleans_arguments() {
        let out = listing("f(a, b) :: Int Int -> Int { return a + b; }\nmain() { println(f(1, 2)); }");
        assert!(out.contains("    bsr f_f_2_int_int\n    ajs -2\n    ldr RR\n"));
    }

    #[test]
    fn test_globals_prelude_and_access() {
        let out = listing("var g = 5;\nmain() { g = g + 1; println(g); }");
        // one global: a zero pushed, stored to the heap, address dropped
        assert!(out.contains("    ldc 0\n    stmh 1\n    ajs -1\n"));
        // accesses go through the fixed heap offset
        assert!(out.contains("    ldc 2000\n    lda 0\n"));
        assert!(out.contains("    ldc 2000\n    sta 0\n"));
    }

    #[test]
    fn test_no_globals_no_prelude() {
        let out = listing("main() { println(1); }");
        assert!(!out.contains("stmh 1\n"));
    }

    #[test]
    fn test_field_store_uses_sta() {
        let out = listing("main() { var x = \"ab\"; x.hd = 'z'; println(x); }");
        // hd lives one word below the stmh address
        assert!(out.contains("    swp\n    sta -1\n"));
    }

    #[test]
    fn test_cons_and_tuple_allocate_heap_pairs() {
        let out = listing("main() { println((1, 2)); println(1 : []); }");
        assert!(out.contains("    stmh 2\n"));
    }

    #[test]
    fn test_labels_are_instance_qualified() {
        let out = listing("main() { if(True) { println(1); } else { println(2); } }");
        assert!(out.contains("brf lbl_main_0__2\n"));
        assert!(out.contains("  lbl_main_0__1: \n"));
    }

    #[test]
    fn test_factorial_scenario() {
        let out = listing(
            "factorial(n) :: Int -> Int { if(n == 0) { return 1; } return n * factorial(n - 1); }\n\
             main() { println(factorial(5)); }",
        );
        assert!(out.contains("f_factorial_1_int: \n"));
        assert!(out.contains("    bsr f_factorial_1_int\n"));
        assert!(out.contains("    mul\n"));
        assert!(out.contains("    ldc 5\n"));
    }

    #[test]
    fn test_len_scenario() {
        let out = listing("main() { var xs = 1 : 2 : 3 : []; println(len(xs)); }");
        assert!(out.contains("f_len_1__BO_int_BC_: \n"));
        assert!(out.contains("    bsr f_len_1__BO_int_BC_\n"));
    }
}
