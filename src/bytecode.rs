//! Bytecode representation and its object-file text format

use anyhow::anyhow;
use log::trace;
use std::{fmt, ops::Index};

/// Supported instructions of the bytecode
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    /// Mark the start of the program
    Start,
    /// Stop the machine
    Halt,
    /// Reserve memory cells (sized at compile time, no-op when run)
    Alloc(usize),
    /// Push a numeric literal, kept as source text
    LoadConst(String),
    /// Push the value of a memory cell
    LoadVar(usize),
    /// Pop a value into a memory cell
    Store(usize),
    Add,
    Sub,
    Mul,
    Div,
    Equal,
    NotEqual,
    GreaterEqual,
    LessEqual,
    Greater,
    Less,
    /// Read a number from input and push it
    Read,
    /// Pop a number and print it
    Print,
    /// Unconditionally jump to an instruction
    Jump(usize),
    /// Pop a value, jump if it is zero
    JumpFalse(usize),
    /// Push a return address on the return stack
    PushReturn(usize),
    /// Jump to a procedure entry
    Call(usize),
    /// Jump to the popped return address
    Return,
    /// Push the value of a memory cell as an argument
    Param(usize),
    /// Release the cells of an activation record
    Free(usize),
}

impl Instruction {
    pub fn mnemonic(&self) -> &'static str {
        use Instruction::*;
        match self {
            Start => "INPP",
            Halt => "PARA",
            Alloc(_) => "ALME",
            LoadConst(_) => "CRCT",
            LoadVar(_) => "CRVL",
            Store(_) => "ARMZ",
            Add => "SOMA",
            Sub => "SUBT",
            Mul => "MULT",
            Div => "DIVI",
            Equal => "CMIG",
            NotEqual => "CMDG",
            GreaterEqual => "CMAI",
            LessEqual => "CPMI",
            Greater => "CMMA",
            Less => "CMME",
            Read => "LEIT",
            Print => "IMPR",
            Jump(_) => "DSVI",
            JumpFalse(_) => "DSVF",
            PushReturn(_) => "PUSHER",
            Call(_) => "CHPR",
            Return => "RTPR",
            Param(_) => "PARAM",
            Free(_) => "DESM",
        }
    }

    /// Jump target of a control-flow instruction
    pub fn target(&self) -> Option<usize> {
        match self {
            Instruction::Jump(t)
            | Instruction::JumpFalse(t)
            | Instruction::PushReturn(t)
            | Instruction::Call(t) => Some(*t),
            _ => None,
        }
    }

    /// Memory cell read or written by this instruction
    pub fn cell(&self) -> Option<usize> {
        match self {
            Instruction::LoadVar(a) | Instruction::Store(a) | Instruction::Param(a) => Some(*a),
            _ => None,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Instruction::*;
        match self {
            Alloc(n) | LoadVar(n) | Store(n) | Jump(n) | JumpFalse(n) | PushReturn(n)
            | Call(n) | Param(n) | Free(n) => write!(f, "{} {}", self.mnemonic(), n),
            LoadConst(literal) => write!(f, "{} {}", self.mnemonic(), literal),
            _ => f.write_str(self.mnemonic()),
        }
    }
}

/// Instructions of one program together with the memory allocator that
/// assigned its storage cells.
///
/// Instructions are only ever appended; the targets of jumps may be patched
/// in place once they are known.
#[derive(Debug, Clone, Default)]
pub struct Bytecode {
    instructions: Vec<Instruction>,
    /// Next free memory cell. Never reset, so every cell is unique program-wide.
    next_cell: usize,
}

impl Bytecode {
    pub fn new() -> Self {
        Bytecode::default()
    }

    /// Append an instruction and return its index.
    pub fn emit(&mut self, instruction: Instruction) -> usize {
        let index = self.instructions.len();
        trace!("emit {:>4}: {}", index, instruction);
        self.instructions.push(instruction);
        index
    }

    /// Index the next emitted instruction will get.
    pub fn next_index(&self) -> usize {
        self.instructions.len()
    }

    /// Hand out a fresh memory cell.
    pub fn allocate(&mut self) -> usize {
        let cell = self.next_cell;
        self.next_cell += 1;
        cell
    }

    /// Number of memory cells the program uses.
    pub fn cells(&self) -> usize {
        self.next_cell
    }

    /// Replace the target of the jump-like instruction at `index`.
    pub fn patch(&mut self, index: usize, target: usize) -> anyhow::Result<()> {
        let instruction = self
            .instructions
            .get_mut(index)
            .ok_or_else(|| anyhow!("cannot patch missing instruction {}", index))?;

        match instruction {
            Instruction::Jump(t)
            | Instruction::JumpFalse(t)
            | Instruction::PushReturn(t)
            | Instruction::Call(t) => *t = target,
            other => return Err(anyhow!("instruction {} ({}) has no target", index, other)),
        }
        trace!("patch {:>4}: {}", index, self.instructions[index]);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Instruction> {
        self.instructions.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Instruction> {
        self.instructions.iter()
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Human-readable listing, one `index: instruction` per line.
    pub fn listing(&self) -> String {
        self.instructions
            .iter()
            .enumerate()
            .map(|(i, instruction)| format!("{:>4}: {}\n", i, instruction))
            .collect()
    }

    /// Parse the object-file format written by the `Display` impl.
    pub fn load(text: &str) -> anyhow::Result<Bytecode> {
        let mut bytecode = Bytecode::new();

        for (number, line) in text.lines().enumerate() {
            let mut words = line.split_whitespace();
            let mnemonic = match words.next() {
                Some(mnemonic) => mnemonic,
                None => continue,
            };
            let arg = words.next();
            if let Some(extra) = words.next() {
                return Err(anyhow!("line {}: unexpected '{}'", number + 1, extra));
            }

            let decode = decoder(mnemonic)
                .ok_or_else(|| anyhow!("line {}: unknown instruction '{}'", number + 1, mnemonic))?;
            let instruction = decode(arg).map_err(|e| anyhow!("line {}: {}", number + 1, e))?;
            bytecode.instructions.push(instruction);
        }

        // The allocator is not stored, recover it from the highest cell in use
        bytecode.next_cell = bytecode
            .instructions
            .iter()
            .filter_map(Instruction::cell)
            .max()
            .map_or(0, |cell| cell + 1);

        Ok(bytecode)
    }
}

impl Index<usize> for Bytecode {
    type Output = Instruction;

    fn index(&self, index: usize) -> &Instruction {
        &self.instructions[index]
    }
}

/// Object-file format: one `MNEMONIC [ARGUMENT]` per line
impl fmt::Display for Bytecode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for instruction in &self.instructions {
            writeln!(f, "{}", instruction)?;
        }
        Ok(())
    }
}

type DecodeFn = fn(Option<&str>) -> anyhow::Result<Instruction>;

macro_rules! impl_decode_fn {
    ($fn_name:ident; $instruction:ident(address)) => {
        fn $fn_name(arg: Option<&str>) -> anyhow::Result<Instruction> {
            match arg {
                Some(text) => text
                    .parse::<usize>()
                    .map(Instruction::$instruction)
                    .map_err(|_| anyhow!("expected an address, got '{}'", text)),
                None => Err(anyhow!("{} needs an address", stringify!($instruction))),
            }
        }
    };

    ($fn_name:ident; $instruction:ident(literal)) => {
        fn $fn_name(arg: Option<&str>) -> anyhow::Result<Instruction> {
            match arg {
                Some(text) => Ok(Instruction::$instruction(text.to_string())),
                None => Err(anyhow!("{} needs a literal", stringify!($instruction))),
            }
        }
    };

    ($fn_name:ident; $instruction:ident) => {
        fn $fn_name(arg: Option<&str>) -> anyhow::Result<Instruction> {
            match arg {
                None => Ok(Instruction::$instruction),
                Some(text) => Err(anyhow!(
                    "{} takes no argument, got '{}'",
                    stringify!($instruction),
                    text
                )),
            }
        }
    };
}

// Instructions with data check and convert their argument, the rest
// reject one.
impl_decode_fn! {decode_alloc; Alloc(address)}
impl_decode_fn! {decode_load_var; LoadVar(address)}
impl_decode_fn! {decode_store; Store(address)}
impl_decode_fn! {decode_jump; Jump(address)}
impl_decode_fn! {decode_jump_false; JumpFalse(address)}
impl_decode_fn! {decode_push_return; PushReturn(address)}
impl_decode_fn! {decode_call; Call(address)}
impl_decode_fn! {decode_param; Param(address)}
impl_decode_fn! {decode_free; Free(address)}
impl_decode_fn! {decode_load_const; LoadConst(literal)}

impl_decode_fn! {decode_start; Start}
impl_decode_fn! {decode_halt; Halt}
impl_decode_fn! {decode_add; Add}
impl_decode_fn! {decode_sub; Sub}
impl_decode_fn! {decode_mul; Mul}
impl_decode_fn! {decode_div; Div}
impl_decode_fn! {decode_equal; Equal}
impl_decode_fn! {decode_not_equal; NotEqual}
impl_decode_fn! {decode_greater_equal; GreaterEqual}
impl_decode_fn! {decode_less_equal; LessEqual}
impl_decode_fn! {decode_greater; Greater}
impl_decode_fn! {decode_less; Less}
impl_decode_fn! {decode_read; Read}
impl_decode_fn! {decode_print; Print}
impl_decode_fn! {decode_return; Return}

fn decoder(mnemonic: &str) -> Option<DecodeFn> {
    let decode: DecodeFn = match mnemonic {
        "INPP" => decode_start,
        "PARA" => decode_halt,
        "ALME" => decode_alloc,
        "CRCT" => decode_load_const,
        "CRVL" => decode_load_var,
        "ARMZ" => decode_store,
        "SOMA" => decode_add,
        "SUBT" => decode_sub,
        "MULT" => decode_mul,
        "DIVI" => decode_div,
        "CMIG" => decode_equal,
        "CMDG" => decode_not_equal,
        "CMAI" => decode_greater_equal,
        "CPMI" => decode_less_equal,
        "CMMA" => decode_greater,
        "CMME" => decode_less,
        "LEIT" => decode_read,
        "IMPR" => decode_print,
        "DSVI" => decode_jump,
        "DSVF" => decode_jump_false,
        "PUSHER" => decode_push_return,
        "CHPR" => decode_call,
        "RTPR" => decode_return,
        "PARAM" => decode_param,
        "DESM" => decode_free,
        _ => return None,
    };
    Some(decode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn emit_and_patch() {
        let mut bytecode = Bytecode::new();
        bytecode.emit(Instruction::Start);
        let jump = bytecode.emit(Instruction::Jump(0));
        bytecode.emit(Instruction::Halt);

        bytecode.patch(jump, 2).unwrap();
        assert_eq!(bytecode[jump], Instruction::Jump(2));
        assert_eq!(bytecode.next_index(), 3);
    }

    #[test]
    fn patch_rejects_non_jumps() {
        let mut bytecode = Bytecode::new();
        bytecode.emit(Instruction::Print);
        assert!(bytecode.patch(0, 5).is_err());
        assert!(bytecode.patch(9, 5).is_err());
    }

    #[test]
    fn allocator_is_monotonic() {
        let mut bytecode = Bytecode::new();
        assert_eq!(bytecode.allocate(), 0);
        assert_eq!(bytecode.allocate(), 1);
        assert_eq!(bytecode.allocate(), 2);
        assert_eq!(bytecode.cells(), 3);
    }

    #[test]
    fn object_format() {
        let mut bytecode = Bytecode::new();
        bytecode.emit(Instruction::Start);
        bytecode.emit(Instruction::Alloc(1));
        bytecode.emit(Instruction::LoadConst("2.5".to_string()));
        bytecode.emit(Instruction::Store(0));
        bytecode.emit(Instruction::PushReturn(7));
        bytecode.emit(Instruction::Halt);

        assert_eq!(
            bytecode.to_string(),
            "INPP\nALME 1\nCRCT 2.5\nARMZ 0\nPUSHER 7\nPARA\n"
        );
    }

    #[test]
    fn load() {
        let text = "INPP\n\n  ALME 1\nCRCT 3\nARMZ   4\nCRVL 4\nIMPR\nPARA\n";
        let bytecode = Bytecode::load(text).unwrap();
        assert_eq!(
            bytecode.instructions(),
            &[
                Instruction::Start,
                Instruction::Alloc(1),
                Instruction::LoadConst("3".to_string()),
                Instruction::Store(4),
                Instruction::LoadVar(4),
                Instruction::Print,
                Instruction::Halt,
            ]
        );
        assert_eq!(bytecode.cells(), 5);
    }

    #[test]
    fn load_errors() {
        let err = Bytecode::load("INPP\nNOPE\n").unwrap_err();
        assert_eq!(err.to_string(), "line 2: unknown instruction 'NOPE'");

        assert!(Bytecode::load("ARMZ").is_err());
        assert!(Bytecode::load("ARMZ x").is_err());
        assert!(Bytecode::load("ARMZ -1").is_err());
        assert!(Bytecode::load("SOMA 1").is_err());
        assert!(Bytecode::load("CRCT 1 2").is_err());
    }

    #[test]
    fn listing() {
        let mut bytecode = Bytecode::new();
        bytecode.emit(Instruction::Start);
        bytecode.emit(Instruction::Call(12));
        assert_eq!(bytecode.listing(), "   0: INPP\n   1: CHPR 12\n");
    }
}
