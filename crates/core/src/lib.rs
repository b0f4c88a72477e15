pub mod cpu;
pub mod decoder;
pub mod dos;
pub mod memory;
pub mod metrics;
pub mod snapshot;

mod tests;

use memory::{phys, Memory, Program, CODE_SEGMENT, DATA_SEGMENT};
use snapshot::{FlagSnapshot, RegisterSnapshot};
use std::collections::HashSet;
use std::sync::Arc;
use wired86_config::MachineConfig;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Fault {
    #[error("Invalid opcode {opcode:#04x} at {phys:#07x}")]
    InvalidOpcode { opcode: u8, phys: u32 },
    #[error("Divide error at {phys:#07x}")]
    DivideError { phys: u32 },
    #[error("Unhandled interrupt {number:#04x} (AH={ah:#04x})")]
    UnhandledInterrupt { number: u8, ah: u8 },
    #[error("Console I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for Fault {
    fn from(e: std::io::Error) -> Self {
        Fault::Io(e.to_string())
    }
}

pub type SimResult<T> = Result<T, Fault>;

/// Passive observer of memory traffic. Every read, write and
/// instruction fetch reports here; observers cannot alter semantics.
pub trait MemoryObserver: Send + Sync {
    fn on_read(&self, _phys: u32, _size: u8) {}
    fn on_write(&self, _phys: u32, _size: u8, _value: u16) {}
    fn on_execute(&self, _phys: u32) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Continue,
    Halted,
    BreakpointHit(u32),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    Halted,
    Breakpoint(u32),
    OutOfBudget,
    Fault(Fault),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub stop: StopReason,
    pub retired: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecState {
    Idle,
    Running,
    Paused,
    Halted,
    Faulted,
}

pub struct Machine {
    pub cpu: cpu::Cpu,
    pub mem: Memory,
    pub console: dos::DosConsole,
    config: MachineConfig,
    breakpoints: HashSet<u32>,
    /// Breakpoint address the last stop landed on; stepping past it must
    /// not immediately re-trigger.
    resumed_at: Option<u32>,
    state: ExecState,
    fault: Option<Fault>,
}

impl Default for Machine {
    fn default() -> Self {
        Self::new()
    }
}

impl Machine {
    pub fn new() -> Self {
        Self::with_config(MachineConfig::default())
    }

    pub fn with_config(config: MachineConfig) -> Self {
        Self {
            cpu: cpu::Cpu::new(),
            mem: Memory::new(),
            console: dos::DosConsole::new(config.echo_stdout),
            config,
            breakpoints: HashSet::new(),
            resumed_at: None,
            state: ExecState::Idle,
            fault: None,
        }
    }

    /// Copy an assembled program into memory at the conventional segment
    /// bases and point CS:IP at its entry.
    pub fn load(&mut self, program: &Program) {
        self.mem.load(phys(CODE_SEGMENT, 0), &program.code);
        self.mem.load(phys(DATA_SEGMENT, 0), &program.data);
        self.cpu.reset();
        self.cpu.ip = program.entry_offset;
        self.console.reset();
        self.state = ExecState::Idle;
        self.fault = None;
        self.resumed_at = None;
        tracing::info!(
            "Loaded program: {} code bytes, {} data bytes, entry {:#06x}",
            program.code.len(),
            program.data.len(),
            program.entry_offset
        );
    }

    /// Zero memory, restore default segment registers and SP, clear
    /// breakpoints and flags.
    pub fn reset(&mut self) {
        self.mem.clear();
        self.cpu.reset();
        self.console.reset();
        self.breakpoints.clear();
        self.resumed_at = None;
        self.state = ExecState::Idle;
        self.fault = None;
    }

    pub fn add_breakpoint(&mut self, phys: u32) {
        self.breakpoints.insert(phys);
    }

    pub fn remove_breakpoint(&mut self, phys: u32) {
        self.breakpoints.remove(&phys);
    }

    pub fn state(&self) -> ExecState {
        self.state
    }

    /// The fault that froze the machine, until `reset`.
    pub fn last_fault(&self) -> Option<&Fault> {
        self.fault.as_ref()
    }

    /// Exit code from INT 21h AH=4Ch, if the program terminated that way.
    pub fn exit_code(&self) -> Option<u8> {
        self.console.exit_code()
    }

    pub fn attach_observer(&mut self, observer: Arc<dyn MemoryObserver>) {
        self.mem.attach_observer(observer);
    }

    pub fn read_memory(&self, phys: u32, len: usize) -> Vec<u8> {
        self.mem.dump(phys, len)
    }

    pub fn write_memory(&mut self, phys: u32, bytes: &[u8]) {
        self.mem.load(phys, bytes);
    }

    pub fn registers(&self) -> RegisterSnapshot {
        RegisterSnapshot::of(&self.cpu)
    }

    pub fn flags(&self) -> FlagSnapshot {
        FlagSnapshot::of(&self.cpu)
    }

    /// Execute exactly one instruction. Halted and Faulted are terminal
    /// until `reset`.
    pub fn step(&mut self) -> SimResult<StepOutcome> {
        match self.state {
            ExecState::Halted => return Ok(StepOutcome::Halted),
            ExecState::Faulted => {
                if let Some(fault) = &self.fault {
                    return Err(fault.clone());
                }
            }
            _ => {}
        }

        let fetch_phys = phys(self.cpu.cs, self.cpu.ip);
        if self.breakpoints.contains(&fetch_phys) && self.resumed_at != Some(fetch_phys) {
            self.resumed_at = Some(fetch_phys);
            self.state = ExecState::Paused;
            tracing::debug!("Breakpoint hit at {:#07x}", fetch_phys);
            return Ok(StepOutcome::BreakpointHit(fetch_phys));
        }
        self.resumed_at = None;

        self.state = ExecState::Running;
        match self
            .cpu
            .step(&mut self.mem, &mut self.console, self.config.interrupt_policy)
        {
            Ok(cpu::CpuStep::Normal) => Ok(StepOutcome::Continue),
            Ok(cpu::CpuStep::Halt) => {
                self.state = ExecState::Halted;
                Ok(StepOutcome::Halted)
            }
            Err(fault) => {
                tracing::warn!("Fault: {}", fault);
                self.fault = Some(fault.clone());
                self.state = ExecState::Faulted;
                Err(fault)
            }
        }
    }

    /// Step until halt, breakpoint, fault, or the instruction budget is
    /// exhausted. The budget is the caller's cancellation mechanism.
    pub fn run(&mut self, max_instructions: Option<u64>) -> RunOutcome {
        let mut retired = 0u64;
        loop {
            if let Some(max) = max_instructions {
                if retired >= max {
                    self.state = ExecState::Paused;
                    return RunOutcome {
                        stop: StopReason::OutOfBudget,
                        retired,
                    };
                }
            }
            let was_halted = self.state == ExecState::Halted;
            match self.step() {
                Ok(StepOutcome::Continue) => retired += 1,
                Ok(StepOutcome::Halted) => {
                    // The HLT instruction itself retires, unless the
                    // machine was already halted before this call.
                    return RunOutcome {
                        stop: StopReason::Halted,
                        retired: if was_halted { retired } else { retired + 1 },
                    };
                }
                Ok(StepOutcome::BreakpointHit(addr)) => {
                    return RunOutcome {
                        stop: StopReason::Breakpoint(addr),
                        retired,
                    }
                }
                Err(fault) => {
                    return RunOutcome {
                        stop: StopReason::Fault(fault),
                        retired,
                    }
                }
            }
        }
    }

    pub fn run_to_breakpoint(&mut self) -> RunOutcome {
        self.run(None)
    }
}
