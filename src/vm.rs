//! Virtual machine that runs the bytecode

use crate::{
    bytecode::{Bytecode, Instruction},
    error::{Error, Result, RuntimeErrorKind},
};
use log::{debug, trace};
use std::{
    collections::VecDeque,
    io::{BufRead, Write},
};

/// Default number of memory cells
pub const MEMORY_CELLS: usize = 1000;

type Exec<T> = std::result::Result<T, RuntimeErrorKind>;

/// Virtual machine representation
///
/// Variables live in a flat memory array at the cells the compiler assigned.
/// Expressions and procedure arguments go through the operand stack, and
/// return addresses through a separate return stack.
#[derive(Debug)]
pub struct Vm {
    bytecode: Bytecode,
    pc: usize,                 // program counter
    halted: bool,              // set by PARA
    steps: usize,              // executed instructions
    memory: Vec<f64>,          // storage cells
    stack: Vec<f64>,           // operand stack
    returns: Vec<usize>,       // return addresses
    pending: VecDeque<String>, // input words not consumed yet
}

impl Vm {
    pub fn new(bytecode: Bytecode) -> Self {
        Vm::with_memory(bytecode, MEMORY_CELLS)
    }

    pub fn with_memory(bytecode: Bytecode, cells: usize) -> Self {
        Vm {
            bytecode,
            pc: 0,
            halted: false,
            steps: 0,
            memory: vec![0.0; cells],
            stack: Vec::new(),
            returns: Vec::new(),
            pending: VecDeque::new(),
        }
    }

    /// Run until `PARA`. `read` blocks on `input` until a value is available.
    pub fn run(&mut self, input: &mut dyn BufRead, output: &mut dyn Write) -> Result<()> {
        if self.halted {
            return Err(self.fail(RuntimeErrorKind::AlreadyHalted));
        }

        while !self.halted {
            self.step(input, output)?;
        }
        output.flush().map_err(|e| self.fail(e.into()))?;
        debug!("halted after {} instructions", self.steps);
        Ok(())
    }

    /// Execute a single instruction.
    pub fn step(&mut self, input: &mut dyn BufRead, output: &mut dyn Write) -> Result<()> {
        let instruction = match self.bytecode.get(self.pc) {
            Some(instruction) => instruction.clone(),
            None => return Err(self.fail(RuntimeErrorKind::RanOffEnd)),
        };
        trace!("{:>4}: {:<10} {:?}", self.pc, instruction.to_string(), self.stack);

        let next = self
            .execute(instruction, input, output)
            .map_err(|kind| self.fail(kind))?;
        self.steps += 1;
        if let Some(next) = next {
            self.pc = next;
        }
        Ok(())
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn pc(&self) -> usize {
        self.pc
    }

    pub fn memory(&self) -> &[f64] {
        &self.memory
    }

    pub fn stack(&self) -> &[f64] {
        &self.stack
    }

    pub fn bytecode(&self) -> &Bytecode {
        &self.bytecode
    }

    /// Returns where to continue, `None` when the machine stopped.
    fn execute(
        &mut self,
        instruction: Instruction,
        input: &mut dyn BufRead,
        output: &mut dyn Write,
    ) -> Exec<Option<usize>> {
        use Instruction::*;

        match instruction {
            Start | Alloc(_) => {}
            Halt => {
                self.halted = true;
                return Ok(None);
            }
            LoadConst(literal) => self.ins_load_const(&literal)?,
            LoadVar(cell) | Param(cell) => {
                let value = *self.cell(cell)?;
                self.push_stack(value);
            }
            Store(cell) => {
                let value = self.pop_stack()?;
                *self.cell(cell)? = value;
            }
            Add => self.ins_arithmetic(|lhs, rhs| lhs + rhs)?,
            Sub => self.ins_arithmetic(|lhs, rhs| lhs - rhs)?,
            Mul => self.ins_arithmetic(|lhs, rhs| lhs * rhs)?,
            Div => self.ins_arithmetic(|lhs, rhs| lhs / rhs)?,
            Equal => self.ins_compare(|lhs, rhs| lhs == rhs)?,
            NotEqual => self.ins_compare(|lhs, rhs| lhs != rhs)?,
            GreaterEqual => self.ins_compare(|lhs, rhs| lhs >= rhs)?,
            LessEqual => self.ins_compare(|lhs, rhs| lhs <= rhs)?,
            Greater => self.ins_compare(|lhs, rhs| lhs > rhs)?,
            Less => self.ins_compare(|lhs, rhs| lhs < rhs)?,
            Read => {
                let value = self.ins_read(input)?;
                self.push_stack(value);
            }
            Print => {
                let value = self.pop_stack()?;
                writeln!(output, "{}", value)?;
            }
            Jump(target) | Call(target) => return self.jump(target),
            JumpFalse(target) => {
                if self.pop_stack()? == 0.0 {
                    return self.jump(target);
                }
            }
            PushReturn(target) => self.returns.push(target),
            Return => {
                let target = self
                    .returns
                    .pop()
                    .ok_or(RuntimeErrorKind::ReturnStackUnderflow)?;
                return self.jump(target);
            }
            // Cells are fixed addresses, releasing them is bookkeeping only
            Free(cells) => trace!("release {} activation cells", cells),
        }

        Ok(Some(self.pc + 1))
    }

    /// Push a literal, parsed from its text
    fn ins_load_const(&mut self, literal: &str) -> Exec<()> {
        let value = literal
            .parse::<f64>()
            .map_err(|_| RuntimeErrorKind::InvalidLiteral(literal.to_string()))?;
        self.push_stack(value);
        Ok(())
    }

    /// Pop the right then the left operand, push `lhs <op> rhs`
    fn ins_arithmetic(&mut self, op: fn(f64, f64) -> f64) -> Exec<()> {
        let rhs = self.pop_stack()?;
        let lhs = self.pop_stack()?;
        self.push_stack(op(lhs, rhs));
        Ok(())
    }

    /// Same operand order as arithmetic, pushes `1` when the relation holds and `0` otherwise
    fn ins_compare(&mut self, relation: fn(f64, f64) -> bool) -> Exec<()> {
        let rhs = self.pop_stack()?;
        let lhs = self.pop_stack()?;
        self.push_stack(if relation(lhs, rhs) { 1.0 } else { 0.0 });
        Ok(())
    }

    /// Read the next whitespace-separated number, blocking for more lines as needed
    fn ins_read(&mut self, input: &mut dyn BufRead) -> Exec<f64> {
        while self.pending.is_empty() {
            let mut line = String::new();
            if input.read_line(&mut line)? == 0 {
                return Err(RuntimeErrorKind::MissingInput);
            }
            self.pending
                .extend(line.split_whitespace().map(str::to_string));
        }

        let word = self.pending.pop_front().unwrap_or_default();
        word.parse::<f64>()
            .map_err(|_| RuntimeErrorKind::InvalidInput(word))
    }

    fn jump(&self, target: usize) -> Exec<Option<usize>> {
        if target >= self.bytecode.len() {
            return Err(RuntimeErrorKind::JumpOutOfRange(target));
        }
        Ok(Some(target))
    }

    fn cell(&mut self, cell: usize) -> Exec<&mut f64> {
        self.memory
            .get_mut(cell)
            .ok_or(RuntimeErrorKind::AddressOutOfRange(cell))
    }

    fn pop_stack(&mut self) -> Exec<f64> {
        self.stack.pop().ok_or(RuntimeErrorKind::StackUnderflow)
    }

    fn push_stack(&mut self, value: f64) {
        self.stack.push(value);
    }

    fn fail(&self, kind: RuntimeErrorKind) -> Error {
        Error::Runtime { pc: self.pc, kind }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn load(program: &str) -> Vm {
        Vm::new(Bytecode::load(program).unwrap())
    }

    fn run_with(program: &str, input: &str) -> (Vm, Result<()>, String) {
        let mut vm = load(program);
        let mut output = Vec::new();
        let result = vm.run(&mut Cursor::new(input.as_bytes()), &mut output);
        (vm, result, String::from_utf8(output).unwrap())
    }

    fn run_until_pc(program: &str, pc: usize) -> Vm {
        let mut vm = load(program);
        let mut input = Cursor::new(&b""[..]);
        let mut output = Vec::new();
        while vm.pc() != pc {
            vm.step(&mut input, &mut output).unwrap();
        }
        vm
    }

    #[test]
    fn load_and_store() {
        let program = "INPP\nALME 1\nCRCT 10\nARMZ 0\nCRVL 0\nCRCT 2.5\nPARA";
        let vm = run_until_pc(program, 6);
        assert_eq!(vm.stack(), &[10.0, 2.5]);
        assert_eq!(vm.memory()[0], 10.0);
    }

    #[test]
    fn arithmetic_operand_order() {
        let base = "CRCT 7\nCRCT 2\n";
        for (op, expected) in [("SOMA", 9.0), ("SUBT", 5.0), ("MULT", 14.0), ("DIVI", 3.5)] {
            let vm = run_until_pc(&format!("{}{}\nPARA", base, op), 3);
            assert_eq!(vm.stack(), &[expected], "{}", op);
        }
    }

    #[test]
    fn comparisons_use_left_then_right() {
        let cases = [
            ("CMIG", 3.0, 3.0, 1.0),
            ("CMIG", 3.0, 4.0, 0.0),
            ("CMDG", 3.0, 4.0, 1.0),
            ("CMAI", 4.0, 3.0, 1.0),
            ("CMAI", 3.0, 4.0, 0.0),
            ("CPMI", 3.0, 4.0, 1.0),
            ("CPMI", 4.0, 3.0, 0.0),
            ("CMMA", 4.0, 3.0, 1.0),
            ("CMMA", 3.0, 4.0, 0.0),
            ("CMME", 3.0, 4.0, 1.0),
            ("CMME", 4.0, 3.0, 0.0),
        ];
        for (op, lhs, rhs, expected) in cases {
            let program = format!("CRCT {}\nCRCT {}\n{}\nPARA", lhs, rhs, op);
            let vm = run_until_pc(&program, 3);
            assert_eq!(vm.stack(), &[expected], "{} {} {}", lhs, op, rhs);
        }
    }

    #[test]
    fn read_and_print() {
        let program = "INPP\nLEIT\nLEIT\nSOMA\nIMPR\nLEIT\nIMPR\nPARA";
        let (vm, result, output) = run_with(program, "2 3\n\n  0.5\n");
        result.unwrap();
        assert!(vm.is_halted());
        assert_eq!(output, "5\n0.5\n");
        assert_eq!(vm.bytecode().len(), 8);
        assert_eq!(vm.bytecode()[1], Instruction::Read);
    }

    #[test]
    fn jumps() {
        // a zero flag takes the DSVF branch
        let program = "CRCT 0\nDSVF 4\nCRCT 1\nIMPR\nCRCT 9\nIMPR\nPARA";
        let (_, result, output) = run_with(program, "");
        result.unwrap();
        assert_eq!(output, "9\n");

        let program = "CRCT 1\nDSVF 4\nCRCT 1\nIMPR\nDSVI 6\nIMPR\nPARA";
        let (_, result, output) = run_with(program, "");
        result.unwrap();
        assert_eq!(output, "1\n");
    }

    #[test]
    fn call_and_return() {
        let program = "\
INPP
ALME 1
DSVI 9
ARMZ 1
CRVL 1
CRVL 1
MULT
IMPR
RTPR
CRCT 6
ARMZ 0
PUSHER 14
PARAM 0
CHPR 3
CRCT 1
IMPR
PARA";
        let (vm, result, output) = run_with(program, "");
        result.unwrap();
        assert_eq!(output, "36\n1\n");
        assert!(vm.stack().is_empty());
        assert_eq!(vm.memory()[1], 6.0);
    }

    #[test]
    fn stack_underflow() {
        let (_, result, _) = run_with("INPP\nSOMA\nPARA", "");
        assert!(matches!(
            result,
            Err(Error::Runtime {
                pc: 1,
                kind: RuntimeErrorKind::StackUnderflow
            })
        ));

        let (_, result, _) = run_with("RTPR", "");
        assert!(matches!(
            result,
            Err(Error::Runtime {
                kind: RuntimeErrorKind::ReturnStackUnderflow,
                ..
            })
        ));
    }

    #[test]
    fn bad_addresses() {
        let (_, result, _) = run_with("CRVL 5000\nPARA", "");
        assert!(matches!(
            result,
            Err(Error::Runtime {
                kind: RuntimeErrorKind::AddressOutOfRange(5000),
                ..
            })
        ));

        let (_, result, _) = run_with("DSVI 42\nPARA", "");
        assert!(matches!(
            result,
            Err(Error::Runtime {
                kind: RuntimeErrorKind::JumpOutOfRange(42),
                ..
            })
        ));

        let mut vm = Vm::with_memory(Bytecode::load("CRCT 1\nARMZ 3\nPARA").unwrap(), 2);
        let result = vm.run(&mut Cursor::new(&b""[..]), &mut Vec::new());
        assert!(matches!(
            result,
            Err(Error::Runtime {
                pc: 1,
                kind: RuntimeErrorKind::AddressOutOfRange(3)
            })
        ));
    }

    #[test]
    fn input_errors() {
        let (_, result, _) = run_with("LEIT\nPARA", "");
        assert!(matches!(
            result,
            Err(Error::Runtime {
                kind: RuntimeErrorKind::MissingInput,
                ..
            })
        ));

        let (_, result, _) = run_with("LEIT\nPARA", "abc\n");
        assert!(matches!(
            result,
            Err(Error::Runtime {
                kind: RuntimeErrorKind::InvalidInput(ref word),
                ..
            }) if word == "abc"
        ));
    }

    #[test]
    fn invalid_literal() {
        let (_, result, _) = run_with("CRCT x1\nPARA", "");
        assert!(matches!(
            result,
            Err(Error::Runtime {
                kind: RuntimeErrorKind::InvalidLiteral(_),
                ..
            })
        ));
    }

    #[test]
    fn halting() {
        let (_, result, _) = run_with("INPP\nCRCT 1", "");
        assert!(matches!(
            result,
            Err(Error::Runtime {
                pc: 2,
                kind: RuntimeErrorKind::RanOffEnd
            })
        ));

        let (mut vm, result, _) = run_with("PARA", "");
        result.unwrap();
        let again = vm.run(&mut Cursor::new(&b""[..]), &mut Vec::new());
        assert!(matches!(
            again,
            Err(Error::Runtime {
                kind: RuntimeErrorKind::AlreadyHalted,
                ..
            })
        ));
    }

    #[test]
    fn free_is_bookkeeping() {
        let program = "CRCT 4\nDESM 3\nPARA";
        let (vm, result, _) = run_with(program, "");
        result.unwrap();
        assert_eq!(vm.stack(), &[4.0]);
    }
}
