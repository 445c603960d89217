//! x86-64 instruction layer
//!
//! Registers, the mnemonics the backend emits, operands and their NASM
//! rendering. `MarkLabel` is not a real instruction; the writer turns it
//! into a label line.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reg {
    RAX,
    RBX,
    RCX,
    RDX,
    RSI,
    RDI,
    RBP,
    RSP,
    R8,
    R9,
    R10,
    R11,
    R12,
    R13,
    R14,
    R15,
}

impl std::fmt::Display for Reg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mnemonic {
    MarkLabel,
    Mov,
    Lea,
    Add,
    Sub,
    Imul,
    Idiv,
    And,
    Or,
    Xor,
    Not,
    Neg,
    Cmp,
    Push,
    Pop,
    Call,
    Ret,
    Jmp,
    Je,
    Jne,
    Jl,
    Jle,
    Jg,
    Jge,
}

impl std::fmt::Display for Mnemonic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Mnemonic::MarkLabel => "<label>",
            Mnemonic::Mov => "mov",
            Mnemonic::Lea => "lea",
            Mnemonic::Add => "add",
            Mnemonic::Sub => "sub",
            Mnemonic::Imul => "imul",
            Mnemonic::Idiv => "idiv",
            Mnemonic::And => "and",
            Mnemonic::Or => "or",
            Mnemonic::Xor => "xor",
            Mnemonic::Not => "not",
            Mnemonic::Neg => "neg",
            Mnemonic::Cmp => "cmp",
            Mnemonic::Push => "push",
            Mnemonic::Pop => "pop",
            Mnemonic::Call => "call",
            Mnemonic::Ret => "ret",
            Mnemonic::Jmp => "jmp",
            Mnemonic::Je => "je",
            Mnemonic::Jne => "jne",
            Mnemonic::Jl => "jl",
            Mnemonic::Jle => "jle",
            Mnemonic::Jg => "jg",
            Mnemonic::Jge => "jge",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    /// Register operand
    Direct(Reg),
    /// `qword [reg +/- disp]`
    IndirectDisplaced { base: Reg, disp: i64 },
    /// `qword [name]`, a named memory location
    IndirectVar { name: String },
    /// Plain address of a named location, for `lea`
    AddressOf { name: String },
    Literal(i64),
    Label(String),
}

impl std::fmt::Display for Operand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operand::Direct(reg) => write!(f, "{}", reg),
            Operand::IndirectDisplaced { base, disp } => {
                if *disp >= 0 {
                    write!(f, "qword [{} + {}]", base, disp)
                } else {
                    write!(f, "qword [{} - {}]", base, -disp)
                }
            }
            Operand::IndirectVar { name } => write!(f, "qword [{}]", name),
            Operand::AddressOf { name } => write!(f, "[{}]", name),
            Operand::Literal(lit) => write!(f, "{}", lit),
            Operand::Label(name) => write!(f, "{}", name),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub mnemonic: Mnemonic,
    pub operands: Vec<Operand>,
}

impl Instruction {
    pub fn nullary(mnemonic: Mnemonic) -> Self {
        Instruction {
            mnemonic,
            operands: Vec::new(),
        }
    }

    pub fn unary(mnemonic: Mnemonic, op: Operand) -> Self {
        Instruction {
            mnemonic,
            operands: vec![op],
        }
    }

    pub fn binary(mnemonic: Mnemonic, dst: Operand, src: Operand) -> Self {
        Instruction {
            mnemonic,
            operands: vec![dst, src],
        }
    }
}

impl std::fmt::Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.operands.is_empty() {
            return write!(f, "{}", self.mnemonic);
        }
        let ops: Vec<String> = self.operands.iter().map(|o| o.to_string()).collect();
        write!(f, "{}    {}", self.mnemonic, ops.join(", "))
    }
}

/// One `resq` reservation in the `.bss` section
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BssDecl {
    pub name: String,
}

impl BssDecl {
    pub fn global(slot: usize) -> Self {
        BssDecl {
            name: format!("global_{}", slot),
        }
    }
}

impl std::fmt::Display for BssDecl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:    resq    1", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instruction_rendering() {
        let i = Instruction::binary(
            Mnemonic::Mov,
            Operand::Direct(Reg::RBP),
            Operand::Direct(Reg::RSP),
        );
        assert_eq!(i.to_string(), "mov    RBP, RSP");
        let i = Instruction::nullary(Mnemonic::Ret);
        assert_eq!(i.to_string(), "ret");
    }

    #[test]
    fn test_displacement_rendering() {
        let i = Instruction::binary(
            Mnemonic::Mov,
            Operand::IndirectDisplaced {
                base: Reg::RBP,
                disp: -8,
            },
            Operand::Direct(Reg::R12),
        );
        assert_eq!(i.to_string(), "mov    qword [RBP - 8], R12");
        let op = Operand::IndirectDisplaced {
            base: Reg::RAX,
            disp: 8,
        };
        assert_eq!(op.to_string(), "qword [RAX + 8]");
    }

    #[test]
    fn test_bss_rendering() {
        assert_eq!(BssDecl::global(3).to_string(), "global_3:    resq    1");
    }
}
