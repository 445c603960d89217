//! x86-64 backend
//!
//! Lowers the generic opcodes to NASM macho64 listings. Values live on a
//! virtual stack of slots managed by [`data::DataManager`]; registers
//! are allocated on demand with spilling, calls follow the System V
//! AMD64 convention with 16-byte stack alignment, and branch targets are
//! entered with a consistent argument-register layout.

pub mod data;
pub mod instr;

use self::data::{DataManager, Slot, ALL_REGISTERS, ARGUMENT_REGISTERS};
use self::instr::{BssDecl, Instruction, Mnemonic, Operand, Reg};
use super::{FunctionImpl, FunctionInstance, GenericProgram, OpCode};
use crate::ast::Selector;
use crate::errors::CompilerError;
use std::fmt::Write as _;
use tracing::debug;

const CALLEE_SAVED: [Reg; 5] = [Reg::RBX, Reg::R12, Reg::R13, Reg::R14, Reg::R15];
const CALLER_SAVED: [Reg; 9] = [
    Reg::RAX,
    Reg::RDI,
    Reg::RSI,
    Reg::RDX,
    Reg::RCX,
    Reg::R8,
    Reg::R9,
    Reg::R10,
    Reg::R11,
];
const CALLER_SAVED_WITHOUT_RAX: [Reg; 8] = [
    Reg::RDI,
    Reg::RSI,
    Reg::RDX,
    Reg::RCX,
    Reg::R8,
    Reg::R9,
    Reg::R10,
    Reg::R11,
];

/// Heap cells hold two machine words
const CELL_BYTES: i64 = 16;

pub struct X64Generator<'a> {
    program: &'a GenericProgram,
    pub code: Vec<(String, Vec<Instruction>)>,
    externals: Vec<String>,
    entry_point: Option<String>,
}

fn round_up_16(bytes: i64) -> i64 {
    if bytes % 16 == 0 {
        bytes
    } else {
        bytes + 8
    }
}

/// Emit a call, bracketing it with a temporary adjustment when the stack
/// is not 16-byte aligned at the call site
fn add_function_call(insts: &mut Vec<Instruction>, aligned: bool, name: &str) {
    if aligned {
        insts.push(Instruction::unary(
            Mnemonic::Call,
            Operand::Label(name.to_string()),
        ));
    } else {
        insts.push(Instruction::binary(
            Mnemonic::Sub,
            Operand::Direct(Reg::RSP),
            Operand::Literal(8),
        ));
        insts.push(Instruction::unary(
            Mnemonic::Call,
            Operand::Label(name.to_string()),
        ));
        insts.push(Instruction::binary(
            Mnemonic::Add,
            Operand::Direct(Reg::RSP),
            Operand::Literal(8),
        ));
    }
}

fn selector_displacement(sel: Selector) -> i64 {
    match sel {
        Selector::Fst | Selector::Hd => 0,
        Selector::Snd | Selector::Tl => 8,
    }
}

impl<'a> X64Generator<'a> {
    pub fn new(program: &'a GenericProgram) -> Self {
        X64Generator {
            program,
            code: Vec::new(),
            externals: Vec::new(),
            entry_point: None,
        }
    }

    pub fn generate(&mut self) -> Result<(), CompilerError> {
        for (instance, body) in &self.program.functions {
            self.generate_function(instance, body)?;
        }
        Ok(())
    }

    fn require_external(&mut self, name: &str) {
        if !self.externals.iter().any(|e| e == name) {
            self.externals.push(name.to_string());
        }
    }

    fn generate_function(
        &mut self,
        instance: &FunctionInstance,
        body: &FunctionImpl,
    ) -> Result<(), CompilerError> {
        debug!("lowering instance {}", instance.mangled_id());
        if instance.entry_point {
            if let Some(first) = &self.entry_point {
                return Err(CompilerError::DuplicateEntryPoint {
                    first: first.clone(),
                    second: instance.name.clone(),
                });
            }
            self.entry_point = Some(instance.name.clone());
        }

        let locals = body.frame_slot_count();
        let mut dm = DataManager::new(instance.arg_types.len(), locals);
        let mut insts = Vec::new();

        dm.push_instr(&mut insts, Operand::Direct(Reg::RBP));
        insts.push(Instruction::binary(
            Mnemonic::Mov,
            Operand::Direct(Reg::RBP),
            Operand::Direct(Reg::RSP),
        ));
        // placeholder frame reservation, patched once the spill high-water
        // mark is known
        let initial_size = round_up_16(locals * 8);
        let sub_index = insts.len();
        insts.push(Instruction::binary(
            Mnemonic::Sub,
            Operand::Direct(Reg::RSP),
            Operand::Literal(initial_size),
        ));
        for reg in CALLEE_SAVED {
            dm.push_instr(&mut insts, Operand::Direct(reg));
        }

        for op in &body.ops {
            self.lower(instance, &mut dm, op, &mut insts)?;
        }

        let used = dm.max_stack_used * 8;
        if used > initial_size {
            insts[sub_index] = Instruction::binary(
                Mnemonic::Sub,
                Operand::Direct(Reg::RSP),
                Operand::Literal(round_up_16(used)),
            );
        }

        let name = if instance.entry_point {
            "_main".to_string()
        } else {
            format!("f_{}", instance.mangled_id())
        };
        self.code.push((name, insts));
        Ok(())
    }

    fn lower(
        &mut self,
        instance: &FunctionInstance,
        dm: &mut DataManager,
        op: &OpCode,
        insts: &mut Vec<Instruction>,
    ) -> Result<(), CompilerError> {
        match op {
            // two-operand forms: destination must be a register
            OpCode::Add | OpCode::Sub | OpCode::Mul | OpCode::And | OpCode::Or => {
                let op2 = dm.pop();
                dm.reserve_if_register(&op2);
                dm.copy_to_register(insts, 0, &ALL_REGISTERS)?;
                let op1 = dm.pop();
                dm.reserve_if_register(&op1);
                let mnemonic = match op {
                    OpCode::Add => Mnemonic::Add,
                    OpCode::Sub => Mnemonic::Sub,
                    OpCode::Mul => Mnemonic::Imul,
                    OpCode::And => Mnemonic::And,
                    _ => Mnemonic::Or,
                };
                insts.push(Instruction::binary(
                    mnemonic,
                    op1.to_operand(),
                    op2.to_operand(),
                ));
                dm.push(op1.clone());
                dm.release_if_register(&op1);
                dm.release_if_register(&op2);
            }
            OpCode::Div | OpCode::Mod => {
                // idiv divides RDX:RAX, quotient in RAX, remainder in RDX
                dm.reserve_register(Reg::RDX);
                dm.move_to_register(insts, 0, &ALL_REGISTERS)?;
                let divisor = dm.pop();
                dm.reserve_if_register(&divisor);
                dm.copy_to_register(insts, 0, &[Reg::RAX])?;
                let dividend = dm.pop();
                dm.reserve_if_register(&dividend);
                insts.push(Instruction::binary(
                    Mnemonic::Xor,
                    Operand::Direct(Reg::RDX),
                    Operand::Direct(Reg::RDX),
                ));
                insts.push(Instruction::unary(Mnemonic::Idiv, divisor.to_operand()));
                let result = if matches!(op, OpCode::Div) {
                    Reg::RAX
                } else {
                    Reg::RDX
                };
                dm.push(Slot::Register(result));
                dm.release_if_register(&divisor);
                dm.release_if_register(&dividend);
                dm.release_register(Reg::RDX);
            }
            OpCode::Eq | OpCode::Ne | OpCode::Lt | OpCode::Le | OpCode::Gt | OpCode::Ge => {
                let target = dm.find_free_register(insts, &ALL_REGISTERS)?;
                dm.reserve_register(target);
                let op2 = dm.pop();
                dm.reserve_if_register(&op2);
                dm.move_to_register(insts, 0, &ALL_REGISTERS)?;
                let op1 = dm.pop();
                dm.reserve_if_register(&op1);
                insts.push(Instruction::binary(
                    Mnemonic::Xor,
                    Operand::Direct(target),
                    Operand::Direct(target),
                ));
                insts.push(Instruction::binary(
                    Mnemonic::Cmp,
                    op1.to_operand(),
                    op2.to_operand(),
                ));
                // jump over the true assignment on the opposite condition
                let jump = match op {
                    OpCode::Eq => Mnemonic::Jne,
                    OpCode::Ne => Mnemonic::Je,
                    OpCode::Lt => Mnemonic::Jge,
                    OpCode::Le => Mnemonic::Jg,
                    OpCode::Gt => Mnemonic::Jle,
                    _ => Mnemonic::Jl,
                };
                let label = dm.fresh_label(instance);
                insts.push(Instruction::unary(jump, Operand::Label(label.clone())));
                insts.push(Instruction::binary(
                    Mnemonic::Mov,
                    Operand::Direct(target),
                    Operand::Literal(-1),
                ));
                insts.push(Instruction::unary(
                    Mnemonic::MarkLabel,
                    Operand::Label(label),
                ));
                dm.push(Slot::Register(target));
                dm.release_register(target);
                dm.release_if_register(&op2);
                dm.release_if_register(&op1);
            }
            OpCode::Not => {
                // valid on the -1/0 encoding: bitwise not flips both ways
                dm.move_to_register(insts, 0, &ALL_REGISTERS)?;
                let val = dm.pop();
                dm.reserve_if_register(&val);
                insts.push(Instruction::unary(Mnemonic::Not, val.to_operand()));
                dm.push(val.clone());
                dm.release_if_register(&val);
            }
            OpCode::Neg => {
                dm.copy_to_register(insts, 0, &ALL_REGISTERS)?;
                let val = dm.pop();
                dm.reserve_if_register(&val);
                if let Slot::Constant(k) = &val {
                    dm.push(Slot::Constant(-k));
                } else {
                    insts.push(Instruction::unary(Mnemonic::Neg, val.to_operand()));
                    dm.push(val.clone());
                }
                dm.release_if_register(&val);
            }
            OpCode::Swp => {
                let v1 = dm.pop();
                let v2 = dm.pop();
                dm.push(v1);
                dm.push(v2);
            }
            OpCode::Pop => {
                dm.pop();
            }
            OpCode::PushConst(k) => dm.push(Slot::Constant(*k)),
            OpCode::Br(label) => {
                dm.restore_arguments(insts, *label)?;
                insts.push(Instruction::unary(
                    Mnemonic::Jmp,
                    Operand::Label(label.distinct_name(instance)),
                ));
            }
            OpCode::BrEq(label)
            | OpCode::BrNe(label)
            | OpCode::BrGe(label)
            | OpCode::BrGt(label)
            | OpCode::BrLe(label)
            | OpCode::BrLt(label) => {
                let op2 = dm.pop();
                dm.reserve_if_register(&op2);
                dm.move_to_register(insts, 0, &ALL_REGISTERS)?;
                let op1 = dm.pop();
                dm.reserve_if_register(&op1);
                insts.push(Instruction::binary(
                    Mnemonic::Cmp,
                    op1.to_operand(),
                    op2.to_operand(),
                ));
                // mov does not touch the flags, so restoring here is safe
                dm.restore_arguments(insts, *label)?;
                let jump = match op {
                    OpCode::BrEq(_) => Mnemonic::Je,
                    OpCode::BrNe(_) => Mnemonic::Jne,
                    OpCode::BrGe(_) => Mnemonic::Jge,
                    OpCode::BrGt(_) => Mnemonic::Jg,
                    OpCode::BrLe(_) => Mnemonic::Jle,
                    _ => Mnemonic::Jl,
                };
                insts.push(Instruction::unary(
                    jump,
                    Operand::Label(label.distinct_name(instance)),
                ));
                dm.release_if_register(&op1);
                dm.release_if_register(&op2);
            }
            OpCode::BrTrue(label) | OpCode::BrFalse(label) => {
                dm.move_to_register(insts, 0, &ALL_REGISTERS)?;
                let val = dm.pop();
                dm.reserve_if_register(&val);
                dm.restore_arguments(insts, *label)?;
                insts.push(Instruction::binary(
                    Mnemonic::Cmp,
                    val.to_operand(),
                    Operand::Literal(0),
                ));
                let jump = if matches!(op, OpCode::BrTrue(_)) {
                    Mnemonic::Jne
                } else {
                    Mnemonic::Je
                };
                insts.push(Instruction::unary(
                    jump,
                    Operand::Label(label.distinct_name(instance)),
                ));
                dm.release_if_register(&val);
            }
            OpCode::MarkLabel(label) => {
                dm.restore_arguments(insts, *label)?;
                insts.push(Instruction::unary(
                    Mnemonic::MarkLabel,
                    Operand::Label(label.distinct_name(instance)),
                ));
            }
            OpCode::PrintInt => {
                // the integer is printf's second argument
                dm.move_to_register(insts, 0, &[ARGUMENT_REGISTERS[1]])?;
                let val = dm.pop();
                dm.reserve_if_register(&val);
                for reg in CALLER_SAVED {
                    dm.clear_register(insts, reg)?;
                    dm.reserve_register(reg);
                }
                insts.push(Instruction::binary(
                    Mnemonic::Lea,
                    Operand::Direct(Reg::RDI),
                    Operand::AddressOf {
                        name: "int_format".to_string(),
                    },
                ));
                add_function_call(insts, dm.is_aligned(), "_printf");
                self.require_external("_printf");
                for reg in CALLER_SAVED {
                    dm.release_register(reg);
                }
                dm.release_if_register(&val);
            }
            OpCode::PrintChar => {
                dm.move_to_register(insts, 0, &[ARGUMENT_REGISTERS[0]])?;
                let val = dm.pop();
                dm.reserve_if_register(&val);
                for reg in CALLER_SAVED {
                    dm.clear_register(insts, reg)?;
                    dm.reserve_register(reg);
                }
                add_function_call(insts, dm.is_aligned(), "_putchar");
                self.require_external("_putchar");
                for reg in CALLER_SAVED {
                    dm.release_register(reg);
                }
                dm.release_if_register(&val);
            }
            OpCode::Call(target) => {
                let mut overflow_slots = Vec::new();
                let mut overflow_bytes: i64 = 0;
                for i in (0..target.arity).rev() {
                    if i < ARGUMENT_REGISTERS.len() {
                        dm.move_to_register(insts, 0, &[ARGUMENT_REGISTERS[i]])?;
                        dm.pop();
                        dm.reserve_register(ARGUMENT_REGISTERS[i]);
                    } else {
                        dm.move_to_register(insts, 0, &ALL_REGISTERS)?;
                        let slot = dm.pop();
                        dm.reserve_if_register(&slot);
                        let operand = slot.to_operand();
                        overflow_slots.push(slot);
                        dm.push_instr(insts, operand);
                        overflow_bytes += 8;
                    }
                }

                dm.clear_register(insts, Reg::RAX)?;
                dm.reserve_register(Reg::RAX);
                for reg in CALLER_SAVED_WITHOUT_RAX {
                    dm.clear_register(insts, reg)?;
                    dm.reserve_register(reg);
                }
                add_function_call(insts, dm.is_aligned(), &target.to_string());
                dm.push(Slot::Register(Reg::RAX));
                for reg in CALLER_SAVED_WITHOUT_RAX {
                    dm.release_register(reg);
                }
                if overflow_bytes > 0 {
                    insts.push(Instruction::binary(
                        Mnemonic::Add,
                        Operand::Direct(Reg::RSP),
                        Operand::Literal(overflow_bytes),
                    ));
                    dm.current_stack_alignment -= overflow_bytes;
                }
                dm.release_register(Reg::RAX);
                for slot in &overflow_slots {
                    dm.release_if_register(slot);
                }
                for i in (0..target.arity.min(ARGUMENT_REGISTERS.len())).rev() {
                    dm.release_register(ARGUMENT_REGISTERS[i]);
                }
            }
            OpCode::CreateListCons | OpCode::CreateTuple => {
                dm.clear_register(insts, Reg::RAX)?;
                dm.reserve_register(Reg::RAX);
                dm.clear_register(insts, Reg::RDI)?;
                dm.reserve_register(Reg::RDI);
                for reg in CALLER_SAVED_WITHOUT_RAX {
                    dm.clear_register(insts, reg)?;
                    dm.reserve_register(reg);
                }
                insts.push(Instruction::binary(
                    Mnemonic::Mov,
                    Operand::Direct(Reg::RDI),
                    Operand::Literal(CELL_BYTES),
                ));
                add_function_call(insts, dm.is_aligned(), "_malloc");
                self.require_external("_malloc");
                for reg in CALLER_SAVED_WITHOUT_RAX {
                    dm.release_register(reg);
                }
                // second word first, then the first word
                for disp in [8, 0] {
                    dm.move_to_register(insts, 0, &ALL_REGISTERS)?;
                    let val = dm.pop();
                    dm.reserve_if_register(&val);
                    insts.push(Instruction::binary(
                        Mnemonic::Mov,
                        Operand::IndirectDisplaced {
                            base: Reg::RAX,
                            disp,
                        },
                        val.to_operand(),
                    ));
                    dm.release_if_register(&val);
                }
                dm.push(Slot::Register(Reg::RAX));
                dm.release_register(Reg::RDI);
                dm.release_register(Reg::RAX);
            }
            OpCode::CreateListNil => dm.push(Slot::Constant(0)),
            OpCode::LdLoc(local) => {
                if local.offset < 0 {
                    let index = (instance.arg_types.len() as i64 + local.offset) as usize;
                    dm.push_arg(index);
                } else {
                    dm.push(Slot::FrameLocal(-local.offset - 1));
                }
            }
            OpCode::StLoc(local) => {
                dm.move_to_register(insts, 0, &ALL_REGISTERS)?;
                let val = dm.pop();
                dm.reserve_if_register(&val);
                if local.offset < 0 {
                    let index = (instance.arg_types.len() as i64 + local.offset) as usize;
                    let home = dm.args[index].clone();
                    insts.push(Instruction::binary(
                        Mnemonic::Mov,
                        home.to_operand(),
                        val.to_operand(),
                    ));
                } else {
                    insts.push(Instruction::binary(
                        Mnemonic::Mov,
                        Operand::IndirectDisplaced {
                            base: Reg::RBP,
                            disp: (-local.offset - 1) * 8,
                        },
                        val.to_operand(),
                    ));
                }
                dm.release_if_register(&val);
            }
            OpCode::LdGlob(global) => {
                let reg = dm.find_free_register(insts, &ALL_REGISTERS)?;
                insts.push(Instruction::binary(
                    Mnemonic::Mov,
                    Operand::Direct(reg),
                    Operand::IndirectVar {
                        name: BssDecl::global(global.offset).name,
                    },
                ));
                dm.push(Slot::Register(reg));
            }
            OpCode::StGlob(global) => {
                dm.move_to_register(insts, 0, &ALL_REGISTERS)?;
                let val = dm.pop();
                dm.reserve_if_register(&val);
                insts.push(Instruction::binary(
                    Mnemonic::Mov,
                    Operand::IndirectVar {
                        name: BssDecl::global(global.offset).name,
                    },
                    val.to_operand(),
                ));
                dm.release_if_register(&val);
            }
            OpCode::LdFld(sel) => {
                let reg = dm.find_free_register(insts, &ALL_REGISTERS)?;
                dm.clear_register(insts, reg)?;
                dm.reserve_register(reg);
                dm.move_to_register(insts, 0, &ALL_REGISTERS)?;
                let val = dm.pop();
                dm.reserve_if_register(&val);
                let Slot::Register(base) = val else {
                    return Err(CompilerError::internal(
                        "field base must be in a register",
                    ));
                };
                insts.push(Instruction::binary(
                    Mnemonic::Mov,
                    Operand::Direct(reg),
                    Operand::IndirectDisplaced {
                        base,
                        disp: selector_displacement(*sel),
                    },
                ));
                dm.push(Slot::Register(reg));
                dm.release_register(base);
                dm.release_register(reg);
            }
            OpCode::StFld(sel) => {
                dm.move_to_register(insts, 0, &ALL_REGISTERS)?;
                let val = dm.pop();
                dm.reserve_if_register(&val);
                dm.move_to_register(insts, 0, &ALL_REGISTERS)?;
                let addr = dm.pop();
                dm.reserve_if_register(&addr);
                let Slot::Register(base) = addr else {
                    return Err(CompilerError::internal(
                        "field base must be in a register",
                    ));
                };
                insts.push(Instruction::binary(
                    Mnemonic::Mov,
                    Operand::IndirectDisplaced {
                        base,
                        disp: selector_displacement(*sel),
                    },
                    val.to_operand(),
                ));
                dm.release_if_register(&val);
                dm.release_register(base);
            }
            OpCode::Ret | OpCode::RetNoValue | OpCode::Halt => {
                let ret_val = if matches!(op, OpCode::Ret) {
                    dm.move_to_register(insts, 0, &[Reg::RAX])?;
                    let val = dm.pop();
                    dm.reserve_if_register(&val);
                    Some(val)
                } else {
                    None
                };
                for reg in CALLEE_SAVED.iter().rev() {
                    dm.pop_instr(insts, Operand::Direct(*reg));
                }
                insts.push(Instruction::binary(
                    Mnemonic::Mov,
                    Operand::Direct(Reg::RSP),
                    Operand::Direct(Reg::RBP),
                ));
                dm.pop_instr(insts, Operand::Direct(Reg::RBP));
                insts.push(Instruction::nullary(Mnemonic::Ret));
                if let Some(val) = ret_val {
                    dm.release_if_register(&val);
                }
            }
        }
        Ok(())
    }

    /// The complete NASM listing
    pub fn write_to_string(&self) -> String {
        let mut out = String::new();
        out.push_str("default rel\n");
        out.push_str("global _main\n");
        for external in &self.externals {
            let _ = writeln!(out, "extern {}", external);
        }

        out.push_str("        section .text\n");
        for (name, insts) in &self.code {
            let _ = writeln!(out, "    {}:", name);
            for inst in insts {
                if inst.mnemonic == Mnemonic::MarkLabel {
                    let _ = writeln!(out, "      {}:", inst.operands[0]);
                } else {
                    let _ = writeln!(out, "        {}", inst);
                }
            }
        }

        if self.program.globals_count > 0 {
            out.push_str("        section .bss\n");
            for slot in 0..self.program.globals_count {
                let _ = writeln!(out, "    {}", BssDecl::global(slot));
            }
        }

        if self.externals.iter().any(|e| e == "_printf") {
            out.push_str("        section .data\n");
            out.push_str("    int_format:     db      \"%d\", 0\n");
        }
        out
    }
}
