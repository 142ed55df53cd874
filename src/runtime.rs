use std::{
    fmt,
    io::{self, Read, Write},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use crate::error::MachineError;
use crate::isa::Instruction;
use crate::memory::{Memory, Stack};
use crate::registers::RegisterFile;
use crate::symbol::SymbolTable;
use crate::word::{Register, MODULUS};

/// Outcome of executing one instruction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Control {
    /// Set when the machine must stop after this instruction.
    pub halt: Option<HaltReason>,
    /// Address of the next instruction; the following word unless control was transferred.
    pub next_pc: u16,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HaltReason {
    /// `hlt` was executed.
    Instruction,
    /// `ret` found the stack empty.
    EmptyReturn,
    /// The requested halt address was executed.
    Breakpoint,
}

/// Where and why a run stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Halt {
    pub pc: u16,
    pub reason: HaltReason,
}

impl fmt::Display for Halt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.reason {
            HaltReason::Instruction => write!(f, "hlt requested at {}", self.pc),
            HaltReason::EmptyReturn => write!(f, "ret with empty stack at {}", self.pc),
            HaltReason::Breakpoint => write!(f, "hlt requested by flag at {}", self.pc),
        }
    }
}

/// Shared switch for instruction tracing.
///
/// Polled before every instruction without blocking, so it may be flipped from
/// another thread while the machine runs.
#[derive(Clone, Debug, Default)]
pub struct TraceToggle(Arc<AtomicBool>);

impl TraceToggle {
    pub fn new(enabled: bool) -> Self {
        Self(Arc::new(AtomicBool::new(enabled)))
    }

    pub fn is_enabled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// Returns the new state.
    pub fn toggle(&self) -> bool {
        !self.0.fetch_xor(true, Ordering::Relaxed)
    }
}

/// Destination and settings for instruction traces.
pub struct Tracer {
    sink: Box<dyn Write>,
    toggle: TraceToggle,
    dump_registers: bool,
}

impl Tracer {
    pub fn new(sink: Box<dyn Write>, toggle: TraceToggle) -> Self {
        Self {
            sink,
            toggle,
            dump_registers: false,
        }
    }

    pub fn dump_registers(mut self, value: bool) -> Self {
        self.dump_registers = value;
        self
    }
}

/// Complete machine state during a run.
pub struct Machine<I, O> {
    memory: Memory,
    registers: RegisterFile,
    stack: Stack,
    /// Program counter
    pc: u16,
    input: I,
    output: O,
    /// Stop after executing the instruction at this address.
    halt_at: Option<u16>,
    tracer: Option<Tracer>,
}

impl<I: Read, O: Write> Machine<I, O> {
    pub fn new(memory: Memory, input: I, output: O) -> Self {
        Self {
            memory,
            registers: RegisterFile::new(),
            stack: Stack::new(),
            pc: 0,
            input,
            output,
            halt_at: None,
            tracer: None,
        }
    }

    pub fn with_registers(mut self, registers: RegisterFile) -> Self {
        self.registers = registers;
        self
    }

    pub fn with_pc(mut self, pc: u16) -> Self {
        self.pc = pc;
        self
    }

    pub fn with_halt_at(mut self, halt_at: Option<u16>) -> Self {
        self.halt_at = halt_at;
        self
    }

    pub fn with_tracer(mut self, tracer: Tracer) -> Self {
        self.tracer = Some(tracer);
        self
    }

    pub fn pc(&self) -> u16 {
        self.pc
    }

    pub fn registers(&self) -> &RegisterFile {
        &self.registers
    }

    pub fn stack(&self) -> &Stack {
        &self.stack
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub fn output(&self) -> &O {
        &self.output
    }

    /// Run until the program halts.
    pub fn run(&mut self, symbols: &SymbolTable) -> Result<Halt, MachineError> {
        let result = self.run_loop(symbols);
        let flushed = self.output.flush();
        let halt = result?;
        flushed?;
        Ok(halt)
    }

    fn run_loop(&mut self, symbols: &SymbolTable) -> Result<Halt, MachineError> {
        loop {
            let pc = self.pc;
            let control = self.step(symbols)?;
            if self.halt_at == Some(pc) {
                return Ok(Halt {
                    pc,
                    reason: HaltReason::Breakpoint,
                });
            }
            if let Some(reason) = control.halt {
                return Ok(Halt { pc, reason });
            }
        }
    }

    /// Fetch, decode and execute the instruction at the program counter.
    ///
    /// The program counter only moves when the machine did not halt.
    pub fn step(&mut self, symbols: &SymbolTable) -> Result<Control, MachineError> {
        let pc = self.pc;
        let (instr, len) = Instruction::decode(self.memory.words(), pc as usize)
            .map_err(|error| MachineError::Decode { pc, error })?;

        if self.is_tracing() {
            let line = format!("{:>30}: {}", symbols.addr_to_name(pc), instr.render(symbols));
            self.trace(format_args!("{}", line))?;
        }

        let control = self.execute(instr, pc, pc.wrapping_add(len as u16))?;

        if self.is_tracing() && self.tracer.as_ref().is_some_and(|t| t.dump_registers) {
            let registers = self.registers.to_string();
            self.trace(format_args!("{}", registers))?;
        }

        if control.halt.is_none() {
            self.pc = control.next_pc;
        }
        Ok(control)
    }

    /// Execute a decoded instruction located at `pc`.
    pub fn execute(
        &mut self,
        instr: Instruction,
        pc: u16,
        next_pc: u16,
    ) -> Result<Control, MachineError> {
        let mut control = Control {
            halt: None,
            next_pc,
        };
        let r = &self.registers;

        match instr {
            Instruction::Halt => control.halt = Some(HaltReason::Instruction),
            Instruction::Set { a, b } => {
                let val = r.resolve(b);
                self.set(a, val);
            }
            Instruction::Push { a } => self.stack.push(r.resolve(a)),
            Instruction::Pop { a } => {
                let val = self.stack.pop().ok_or(MachineError::StackUnderflow { pc })?;
                self.set(a, val);
            }
            Instruction::Eq { a, b, c } => {
                let val = (r.resolve(b) == r.resolve(c)) as u16;
                self.set(a, val);
            }
            Instruction::Gt { a, b, c } => {
                let val = (r.resolve(b) > r.resolve(c)) as u16;
                self.set(a, val);
            }
            Instruction::Jmp { a } => control.next_pc = r.resolve(a),
            Instruction::Jt { a, b } => {
                if r.resolve(a) != 0 {
                    control.next_pc = r.resolve(b);
                }
            }
            Instruction::Jf { a, b } => {
                if r.resolve(a) == 0 {
                    control.next_pc = r.resolve(b);
                }
            }
            Instruction::Add { a, b, c } => {
                let val = (r.resolve(b) as u32 + r.resolve(c) as u32) % MODULUS;
                self.set(a, val as u16);
            }
            Instruction::Mult { a, b, c } => {
                let val = (r.resolve(b) as u32 * r.resolve(c) as u32) % MODULUS;
                self.set(a, val as u16);
            }
            Instruction::Mod { a, b, c } => {
                let divisor = r.resolve(c);
                if divisor == 0 {
                    return Err(MachineError::DivisionByZero { pc });
                }
                let val = r.resolve(b) % divisor;
                self.set(a, val);
            }
            Instruction::And { a, b, c } => {
                let val = r.resolve(b) & r.resolve(c);
                self.set(a, val);
            }
            Instruction::Or { a, b, c } => {
                let val = r.resolve(b) | r.resolve(c);
                self.set(a, val);
            }
            Instruction::Not { a, b } => {
                let val = !r.resolve(b) & 0x7fff;
                self.set(a, val);
            }
            Instruction::Rmem { a, b } => {
                let addr = r.resolve(b);
                let val = self
                    .memory
                    .read(addr)
                    .map_err(|e| MachineError::AddressOutOfRange { pc, addr: e.addr })?;
                self.set(a, val);
            }
            Instruction::Wmem { a, b } => {
                let (addr, val) = (r.resolve(a), r.resolve(b));
                if self.is_tracing() {
                    self.trace(format_args!("writing {} to {}", val, addr))?;
                }
                self.memory
                    .write(addr, val)
                    .map_err(|e| MachineError::AddressOutOfRange { pc, addr: e.addr })?;
            }
            Instruction::Call { a } => {
                self.stack.push(next_pc);
                control.next_pc = r.resolve(a);
            }
            Instruction::Ret => match self.stack.pop() {
                Some(addr) => control.next_pc = addr,
                None => control.halt = Some(HaltReason::EmptyReturn),
            },
            Instruction::Out { a } => {
                let byte = r.resolve(a) as u8;
                if self.is_tracing() {
                    self.trace(format_args!("=== out: {:?} ({}) ===", byte as char, byte))?;
                }
                self.output.write_all(&[byte])?;
            }
            Instruction::In { a } => {
                // Prompts must be visible before blocking
                self.output.flush()?;
                let byte = self.read_byte(pc)?;
                self.set(a, byte as u16);
            }
            Instruction::Noop => (),
        }

        Ok(control)
    }

    fn set(&mut self, reg: Register, val: u16) {
        self.registers.set(reg.index(), val);
    }

    /// Block until one byte of input is available.
    fn read_byte(&mut self, pc: u16) -> Result<u8, MachineError> {
        let mut buf = [0u8; 1];
        match self.input.read_exact(&mut buf) {
            Ok(()) => Ok(buf[0]),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                Err(MachineError::InputExhausted { pc })
            }
            Err(e) => Err(e.into()),
        }
    }

    fn is_tracing(&self) -> bool {
        self.tracer
            .as_ref()
            .is_some_and(|tracer| tracer.toggle.is_enabled())
    }

    fn trace(&mut self, args: fmt::Arguments) -> Result<(), MachineError> {
        if let Some(tracer) = self.tracer.as_mut() {
            tracer.sink.write_fmt(args)?;
            tracer.sink.write_all(b"\n")?;
        }
        Ok(())
    }
}
