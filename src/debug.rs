//! Bytecode disassembly: `<offset:04d> <OpName> [operands...]`, one instruction per line,
//! used by tests and the `print_code` feature (spec §6).

use std::fmt::Write as _;

use crate::code::{self, Opcode};

pub fn disassemble(instructions: &[u8]) -> String {
    let mut out = String::new();
    let mut offset = 0;
    while offset < instructions.len() {
        offset = disassemble_instruction(&mut out, instructions, offset);
    }
    out
}

fn disassemble_instruction(out: &mut String, instructions: &[u8], offset: usize) -> usize {
    let op = match Opcode::try_from(instructions[offset]) {
        Ok(op) => op,
        Err(()) => {
            let _ = writeln!(out, "{offset:04} ERROR: unknown opcode {}", instructions[offset]);
            return offset + 1;
        }
    };
    let def = code::lookup(op);
    let (operands, read) = code::read_operands(&def, &instructions[offset + 1..]);

    let rendered: Vec<String> = operands.iter().map(|o| o.to_string()).collect();
    if rendered.is_empty() {
        let _ = writeln!(out, "{offset:04} {}", def.name);
    } else {
        let _ = writeln!(out, "{offset:04} {} {}", def.name, rendered.join(" "));
    }

    offset + 1 + read
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code::make;

    #[test]
    fn disassembles_mixed_operand_widths() {
        let instructions = [
            make(Opcode::Constant, &[1]),
            make(Opcode::GetLocal, &[1]),
            make(Opcode::Closure, &[65535, 255]),
        ]
        .concat();

        let expected = "0000 OpConstant 1\n0003 OpGetLocal 1\n0005 OpClosure 65535 255\n";
        assert_eq!(disassemble(&instructions), expected);
    }

    #[test]
    fn disassembles_zero_operand_opcode() {
        let instructions = make(Opcode::Add, &[]);
        assert_eq!(disassemble(&instructions), "0000 OpAdd\n");
    }
}
