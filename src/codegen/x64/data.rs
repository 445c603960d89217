//! Virtual-stack data manager
//!
//! Models the logical IR stack as a sequence of slots (register, frame
//! slot, constant) while lowering to x86-64. Registers are handed out
//! from a fixed candidate order and reclaimed by spilling to fresh frame
//! slots. Argument homes are tracked separately so every branch target
//! can be entered with one consistent layout.

use super::instr::{Instruction, Mnemonic, Operand, Reg};
use crate::codegen::{FunctionInstance, Label};
use crate::errors::CompilerError;
use std::collections::HashMap;

/// Allocation candidates, in preference order
pub const ALL_REGISTERS: [Reg; 14] = [
    Reg::R12,
    Reg::R13,
    Reg::R14,
    Reg::R15,
    Reg::R10,
    Reg::RBX,
    Reg::R11,
    Reg::RAX,
    Reg::R9,
    Reg::R8,
    Reg::RCX,
    Reg::RDX,
    Reg::RSI,
    Reg::RDI,
];

/// System V AMD64 integer argument registers
pub const ARGUMENT_REGISTERS: [Reg; 6] = [Reg::RDI, Reg::RSI, Reg::RDX, Reg::RCX, Reg::R8, Reg::R9];

/// Where a logical stack value currently lives
#[derive(Debug, Clone, PartialEq)]
pub enum Slot {
    Register(Reg),
    /// Frame slot, addressed relative to RBP in words
    FrameLocal(i64),
    Constant(i64),
}

impl Slot {
    pub fn to_operand(&self) -> Operand {
        match self {
            Slot::Register(reg) => Operand::Direct(*reg),
            Slot::FrameLocal(offset) => Operand::IndirectDisplaced {
                base: Reg::RBP,
                disp: offset * 8,
            },
            Slot::Constant(k) => Operand::Literal(*k),
        }
    }
}

pub struct DataManager {
    pub stack: Vec<Slot>,
    /// Current physical home of each incoming argument
    pub args: Vec<Slot>,
    reserved: Vec<Reg>,
    /// High-water mark of frame words, patched into the prologue
    pub max_stack_used: i64,
    locals_space: i64,
    label_counter: usize,
    /// Bytes pushed since function entry; starts at 8 for the return
    /// address
    pub current_stack_alignment: i64,
    restore_points: HashMap<usize, Vec<Slot>>,
}

impl DataManager {
    pub fn new(num_args: usize, locals_space: i64) -> Self {
        let args = (0..num_args)
            .map(|i| {
                if i < ARGUMENT_REGISTERS.len() {
                    Slot::Register(ARGUMENT_REGISTERS[i])
                } else {
                    // overflow arguments live above the return address
                    Slot::FrameLocal((i + 2 - ARGUMENT_REGISTERS.len()) as i64)
                }
            })
            .collect();
        DataManager {
            stack: Vec::new(),
            args,
            reserved: Vec::new(),
            max_stack_used: 0,
            locals_space,
            label_counter: 0,
            current_stack_alignment: 8,
            restore_points: HashMap::new(),
        }
    }

    pub fn is_aligned(&self) -> bool {
        self.current_stack_alignment % 16 == 0
    }

    pub fn push_instr(&mut self, insts: &mut Vec<Instruction>, operand: Operand) {
        self.current_stack_alignment += 8;
        insts.push(Instruction::unary(Mnemonic::Push, operand));
    }

    pub fn pop_instr(&mut self, insts: &mut Vec<Instruction>, operand: Operand) {
        self.current_stack_alignment -= 8;
        insts.push(Instruction::unary(Mnemonic::Pop, operand));
    }

    /// Backend-private label, distinct from the IR labels of the same
    /// function
    pub fn fresh_label(&mut self, instance: &FunctionInstance) -> String {
        self.label_counter += 1;
        let label = Label {
            id: self.label_counter,
        };
        format!("{}_f", label.distinct_name(instance))
    }

    pub fn push(&mut self, slot: Slot) {
        if let Slot::FrameLocal(offset) = &slot {
            if *offset <= 0 && self.max_stack_used < -offset {
                self.max_stack_used = -offset;
            }
        }
        self.stack.push(slot);
    }

    pub fn push_arg(&mut self, index: usize) {
        self.push(self.args[index].clone());
    }

    pub fn pop(&mut self) -> Slot {
        self.stack.pop().expect("virtual stack underflow")
    }

    pub fn reserve_register(&mut self, reg: Reg) {
        self.reserved.push(reg);
    }

    pub fn release_register(&mut self, reg: Reg) {
        if let Some(pos) = self.reserved.iter().position(|r| *r == reg) {
            self.reserved.remove(pos);
        }
    }

    pub fn reserve_if_register(&mut self, slot: &Slot) {
        if let Slot::Register(reg) = slot {
            self.reserve_register(*reg);
        }
    }

    pub fn release_if_register(&mut self, slot: &Slot) {
        if let Slot::Register(reg) = slot {
            self.release_register(*reg);
        }
    }

    fn register_in_use(&self, reg: Reg) -> bool {
        self.stack
            .iter()
            .chain(self.args.iter())
            .any(|slot| matches!(slot, Slot::Register(r) if *r == reg))
    }

    /// A frame slot not referenced by any live value, below the locals
    fn allocate_stack_space(&mut self) -> Slot {
        let mut pos = self.locals_space + 1;
        loop {
            let candidate = Slot::FrameLocal(-pos);
            let taken = self
                .stack
                .iter()
                .chain(self.args.iter())
                .any(|slot| *slot == candidate);
            if !taken {
                if self.max_stack_used < pos {
                    self.max_stack_used = pos;
                }
                return candidate;
            }
            pos += 1;
        }
    }

    /// Return a register that holds no live value, spilling one to a
    /// frame slot if every candidate is occupied
    pub fn find_free_register(
        &mut self,
        insts: &mut Vec<Instruction>,
        allowed: &[Reg],
    ) -> Result<Reg, CompilerError> {
        loop {
            for reg in allowed {
                if !self.register_in_use(*reg) && !self.reserved.contains(reg) {
                    return Ok(*reg);
                }
            }
            let victim = self
                .stack
                .iter()
                .chain(self.args.iter())
                .find_map(|slot| match slot {
                    Slot::Register(r) if allowed.contains(r) && !self.reserved.contains(r) => {
                        Some(*r)
                    }
                    _ => None,
                });
            let Some(victim) = victim else {
                return Err(CompilerError::internal("unable to find a free register"));
            };
            let spill = self.allocate_stack_space();
            self.move_register_to_frame(insts, victim, &spill);
        }
    }

    /// Evict `reg` by moving its value into some free register,
    /// rewriting every slot that referred to it
    pub fn clear_register(
        &mut self,
        insts: &mut Vec<Instruction>,
        reg: Reg,
    ) -> Result<(), CompilerError> {
        let mut free_reg = None;
        for index in 0..self.stack.len() {
            if matches!(&self.stack[index], Slot::Register(r) if *r == reg) {
                let free = match free_reg {
                    Some(r) => r,
                    None => {
                        let r = self.find_free_register(insts, &ALL_REGISTERS)?;
                        free_reg = Some(r);
                        r
                    }
                };
                self.stack[index] = Slot::Register(free);
            }
        }
        for index in 0..self.args.len() {
            if matches!(&self.args[index], Slot::Register(r) if *r == reg) {
                let free = match free_reg {
                    Some(r) => r,
                    None => {
                        let r = self.find_free_register(insts, &ALL_REGISTERS)?;
                        free_reg = Some(r);
                        r
                    }
                };
                self.args[index] = Slot::Register(free);
            }
        }
        if let Some(free) = free_reg {
            insts.push(Instruction::binary(
                Mnemonic::Mov,
                Operand::Direct(free),
                Operand::Direct(reg),
            ));
        }
        Ok(())
    }

    /// Materialize the value at `depth` from the top in a register
    /// without disturbing other references to it
    pub fn copy_to_register(
        &mut self,
        insts: &mut Vec<Instruction>,
        depth: usize,
        allowed: &[Reg],
    ) -> Result<Reg, CompilerError> {
        let index = self.stack.len() - 1 - depth;
        let item = self.stack[index].clone();
        if let Slot::Register(reg) = &item {
            let occurrences = self
                .stack
                .iter()
                .chain(self.args.iter())
                .filter(|slot| matches!(slot, Slot::Register(r) if r == reg))
                .count();
            if allowed.contains(reg) && occurrences == 1 {
                // sole reference: usable in place
                return Ok(*reg);
            }
        }
        let free = self.find_free_register(insts, allowed)?;
        insts.push(Instruction::binary(
            Mnemonic::Mov,
            Operand::Direct(free),
            item.to_operand(),
        ));
        self.stack[index] = Slot::Register(free);
        Ok(free)
    }

    /// Like [`copy_to_register`](Self::copy_to_register), but rewrite
    /// every reference so later uses see the register
    pub fn move_to_register(
        &mut self,
        insts: &mut Vec<Instruction>,
        depth: usize,
        allowed: &[Reg],
    ) -> Result<Reg, CompilerError> {
        let index = self.stack.len() - 1 - depth;
        let item = self.stack[index].clone();
        if let Slot::Register(reg) = &item {
            if allowed.contains(reg) {
                return Ok(*reg);
            }
        }
        self.move_slot_to_register(insts, &item, allowed)
    }

    /// Move `value` into a freshly allocated register, rewriting every
    /// occurrence on the stack and in the argument homes
    pub fn move_slot_to_register(
        &mut self,
        insts: &mut Vec<Instruction>,
        value: &Slot,
        allowed: &[Reg],
    ) -> Result<Reg, CompilerError> {
        let free = self.find_free_register(insts, allowed)?;
        insts.push(Instruction::binary(
            Mnemonic::Mov,
            Operand::Direct(free),
            value.to_operand(),
        ));
        for slot in self.stack.iter_mut().chain(self.args.iter_mut()) {
            if slot == value {
                *slot = Slot::Register(free);
            }
        }
        Ok(free)
    }

    fn move_register_to_frame(&mut self, insts: &mut Vec<Instruction>, reg: Reg, target: &Slot) {
        insts.push(Instruction::binary(
            Mnemonic::Mov,
            target.to_operand(),
            Operand::Direct(reg),
        ));
        for slot in self.stack.iter_mut().chain(self.args.iter_mut()) {
            if matches!(slot, Slot::Register(r) if *r == reg) {
                *slot = target.clone();
            }
        }
    }

    /// Make the argument layout at a branch to `label` match the layout
    /// recorded by the first branch there
    pub fn restore_arguments(
        &mut self,
        insts: &mut Vec<Instruction>,
        label: Label,
    ) -> Result<(), CompilerError> {
        if !self.stack.is_empty() {
            return Err(CompilerError::internal(
                "virtual stack must be empty when restoring arguments",
            ));
        }
        let Some(snapshot) = self.restore_points.get(&label.id).cloned() else {
            self.restore_points.insert(label.id, self.args.clone());
            return Ok(());
        };
        if snapshot.len() != self.args.len() {
            return Err(CompilerError::internal(
                "argument snapshot length changed between branches",
            ));
        }
        let diff: Vec<usize> = (0..snapshot.len())
            .filter(|i| snapshot[*i] != self.args[*i])
            .collect();
        let mut reserved_count = 0;
        for i in diff {
            let from = self.args[i].clone();
            let to = snapshot[i].clone();
            match to {
                Slot::Register(reg) => {
                    reserved_count += 1;
                    self.move_slot_to_register(insts, &from, &[reg])?;
                    self.reserved.push(reg);
                }
                Slot::FrameLocal(_) => {
                    let tmp = self.move_slot_to_register(insts, &from, &ALL_REGISTERS)?;
                    insts.push(Instruction::binary(
                        Mnemonic::Mov,
                        to.to_operand(),
                        Operand::Direct(tmp),
                    ));
                    self.args[i] = to;
                }
                Slot::Constant(_) => {
                    return Err(CompilerError::internal("argument cannot be a constant"));
                }
            }
        }
        for _ in 0..reserved_count {
            self.reserved.pop();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instance() -> FunctionInstance {
        FunctionInstance::new("f", vec![])
    }

    #[test]
    fn test_arguments_start_in_convention_registers() {
        let dm = DataManager::new(8, 0);
        assert_eq!(dm.args[0], Slot::Register(Reg::RDI));
        assert_eq!(dm.args[5], Slot::Register(Reg::R9));
        // the 7th and 8th arguments sit above the return address
        assert_eq!(dm.args[6], Slot::FrameLocal(2));
        assert_eq!(dm.args[7], Slot::FrameLocal(3));
    }

    #[test]
    fn test_find_free_register_prefers_callee_saved() {
        let mut dm = DataManager::new(0, 0);
        let mut insts = Vec::new();
        let reg = dm.find_free_register(&mut insts, &ALL_REGISTERS).unwrap();
        assert_eq!(reg, Reg::R12);
        assert!(insts.is_empty());
    }

    #[test]
    fn test_find_free_register_skips_used_and_reserved() {
        let mut dm = DataManager::new(0, 0);
        dm.push(Slot::Register(Reg::R12));
        dm.reserve_register(Reg::R13);
        let mut insts = Vec::new();
        let reg = dm.find_free_register(&mut insts, &ALL_REGISTERS).unwrap();
        assert_eq!(reg, Reg::R14);
    }

    #[test]
    fn test_spill_when_all_registers_taken() {
        let mut dm = DataManager::new(0, 3);
        for reg in ALL_REGISTERS {
            dm.push(Slot::Register(reg));
        }
        let mut insts = Vec::new();
        let reg = dm.find_free_register(&mut insts, &ALL_REGISTERS).unwrap();
        // the victim was moved below the locals and its register reused
        assert_eq!(reg, Reg::R12);
        assert_eq!(insts.len(), 1);
        assert_eq!(
            insts[0].to_string(),
            "mov    qword [RBP - 32], R12"
        );
        assert!(dm.stack.contains(&Slot::FrameLocal(-4)));
        assert_eq!(dm.max_stack_used, 4);
    }

    #[test]
    fn test_copy_to_register_leaves_shared_register_alone() {
        let mut dm = DataManager::new(1, 0);
        // RDI is also an argument home, so copying must not steal it
        dm.push(Slot::Register(Reg::RDI));
        let mut insts = Vec::new();
        let reg = dm.copy_to_register(&mut insts, 0, &ALL_REGISTERS).unwrap();
        assert_ne!(reg, Reg::RDI);
        assert_eq!(insts.len(), 1);
        assert_eq!(dm.args[0], Slot::Register(Reg::RDI));
    }

    #[test]
    fn test_move_to_register_rewrites_all_references() {
        let mut dm = DataManager::new(1, 0);
        dm.args[0] = Slot::FrameLocal(-1);
        dm.push(Slot::FrameLocal(-1));
        let mut insts = Vec::new();
        let reg = dm.move_to_register(&mut insts, 0, &ALL_REGISTERS).unwrap();
        assert_eq!(dm.stack[0], Slot::Register(reg));
        assert_eq!(dm.args[0], Slot::Register(reg));
    }

    #[test]
    fn test_alignment_tracking() {
        let mut dm = DataManager::new(0, 0);
        assert!(!dm.is_aligned());
        let mut insts = Vec::new();
        dm.push_instr(&mut insts, Operand::Direct(Reg::RBP));
        assert!(dm.is_aligned());
        dm.pop_instr(&mut insts, Operand::Direct(Reg::RBP));
        assert!(!dm.is_aligned());
    }

    // Argument-register reconvergence: after the second branch restores,
    // the layout equals the snapshot taken at the first branch.
    #[test]
    fn test_restore_arguments_reconverges() {
        let mut dm = DataManager::new(2, 0);
        let label = Label { id: 1 };
        let mut insts = Vec::new();

        // first branch records the pristine layout
        dm.restore_arguments(&mut insts, label).unwrap();
        assert!(insts.is_empty());
        let snapshot = dm.args.clone();

        // the fall-through path shuffles both arguments around
        dm.args[0] = Slot::FrameLocal(-3);
        dm.args[1] = Slot::Register(Reg::R12);

        dm.restore_arguments(&mut insts, label).unwrap();
        assert!(!insts.is_empty());
        assert_eq!(dm.args, snapshot);
    }

    #[test]
    fn test_restore_rejects_nonempty_stack() {
        let mut dm = DataManager::new(0, 0);
        dm.push(Slot::Constant(1));
        let mut insts = Vec::new();
        assert!(dm.restore_arguments(&mut insts, Label { id: 1 }).is_err());
    }

    #[test]
    fn test_fresh_labels_are_function_qualified() {
        let mut dm = DataManager::new(0, 0);
        let inst = instance();
        let l1 = dm.fresh_label(&inst);
        let l2 = dm.fresh_label(&inst);
        assert_ne!(l1, l2);
        assert!(l1.starts_with("lbl_f_0__"));
        assert!(l1.ends_with("_f"));
    }
}
