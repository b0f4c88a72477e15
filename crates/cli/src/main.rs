use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::info;
use wired86_config::{MachineConfig, RunScript, ScriptAssertion, StopExpectation};
use wired86_core::{Machine, StopReason};

#[derive(Parser, Debug)]
#[command(author, version, about = "Wired86 8086 Simulator", long_about = None)]
struct Args {
    /// Path to the assembly source file
    #[arg(short, long, required_unless_present = "script")]
    program: Option<PathBuf>,

    /// Maximum number of instructions to execute
    #[arg(long, default_value_t = 100_000)]
    max_steps: u64,

    /// Breakpoint at a physical address (hex), repeatable
    #[arg(long = "break", value_parser = parse_phys)]
    breakpoints: Vec<u32>,

    /// Machine configuration YAML
    #[arg(long)]
    config: Option<PathBuf>,

    /// Run script YAML with inputs, limits and assertions
    #[arg(long)]
    script: Option<PathBuf>,

    /// Log every executed instruction
    #[arg(long)]
    trace: bool,

    /// Dump the final register state as JSON
    #[arg(long)]
    json: bool,
}

fn parse_phys(text: &str) -> Result<u32, String> {
    let t = text.trim_start_matches("0x").trim_start_matches("0X");
    u32::from_str_radix(t, 16).map_err(|e| e.to_string())
}

fn main() -> Result<()> {
    let args = Args::parse();

    let default_filter = if args.trace { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let script = match &args.script {
        Some(path) => Some((RunScript::from_file(path)?, path.clone())),
        None => None,
    };

    let (program_path, max_steps) = match &script {
        Some((script, path)) => {
            let base = path.parent().unwrap_or_else(|| Path::new("."));
            (base.join(&script.inputs.program), script.limits.max_steps)
        }
        None => (
            args.program.clone().ok_or_else(|| anyhow!("no program given"))?,
            args.max_steps,
        ),
    };

    info!("Assembling {:?}", program_path);
    let source = std::fs::read_to_string(&program_path)
        .with_context(|| format!("Failed to read program {:?}", program_path))?;
    let program = wired86_asm::assemble(&source)
        .map_err(|e| anyhow!("{}: {}", program_path.display(), e))?;

    let config = match &args.config {
        Some(path) => MachineConfig::from_file(path)?,
        None => MachineConfig::default(),
    };

    let mut machine = Machine::with_config(config);
    machine.load(&program);
    for bp in &args.breakpoints {
        machine.add_breakpoint(*bp);
        info!("Breakpoint at {:#07x}", bp);
    }

    let sink = Arc::new(Mutex::new(Vec::new()));
    machine.console.set_sink(Some(sink.clone()));

    let outcome = machine.run(Some(max_steps));
    info!(
        "Stopped after {} instructions: {:?}",
        outcome.retired, outcome.stop
    );

    if args.json {
        println!("{}", serde_json::to_string_pretty(&machine.registers())?);
    } else {
        print_state(&machine);
    }

    match &script {
        Some((script, _)) => {
            let captured = sink
                .lock()
                .map_err(|_| anyhow!("console sink poisoned"))?
                .clone();
            check_assertions(script, &machine, &outcome.stop, &captured)?;
            info!("All assertions passed");
        }
        None => {
            if let StopReason::Fault(fault) = &outcome.stop {
                bail!("execution faulted: {}", fault);
            }
        }
    }

    Ok(())
}

fn print_state(machine: &Machine) {
    let r = machine.registers();
    let f = machine.flags();
    println!(
        "AX={:04X} BX={:04X} CX={:04X} DX={:04X} SI={:04X} DI={:04X} BP={:04X} SP={:04X}",
        r.ax, r.bx, r.cx, r.dx, r.si, r.di, r.bp, r.sp
    );
    println!(
        "CS={:04X} DS={:04X} SS={:04X} ES={:04X} IP={:04X} CF={} PF={} AF={} ZF={} SF={} DF={} OF={}",
        r.cs,
        r.ds,
        r.ss,
        r.es,
        r.ip,
        f.cf as u8,
        f.pf as u8,
        f.af as u8,
        f.zf as u8,
        f.sf as u8,
        f.df as u8,
        f.of as u8
    );
    if let Some(code) = machine.exit_code() {
        println!("Exit code: {}", code);
    }
}

fn check_assertions(
    script: &RunScript,
    machine: &Machine,
    stop: &StopReason,
    captured: &[u8],
) -> Result<()> {
    let stdout_text = String::from_utf8_lossy(captured);
    let mut failures = Vec::new();

    for assertion in &script.assertions {
        match assertion {
            ScriptAssertion::StdoutContains(a) => {
                if !stdout_text.contains(&a.stdout_contains) {
                    failures.push(format!(
                        "stdout does not contain {:?} (got {:?})",
                        a.stdout_contains, stdout_text
                    ));
                }
            }
            ScriptAssertion::ExpectedStop(a) => {
                let matches = matches!(
                    (a.expected_stop, stop),
                    (StopExpectation::Halt, StopReason::Halted)
                        | (StopExpectation::Breakpoint, StopReason::Breakpoint(_))
                        | (StopExpectation::MaxSteps, StopReason::OutOfBudget)
                        | (StopExpectation::Fault, StopReason::Fault(_))
                );
                if !matches {
                    failures.push(format!(
                        "expected stop {:?}, got {:?}",
                        a.expected_stop, stop
                    ));
                }
            }
            ScriptAssertion::Register(a) => {
                let actual = machine.registers().get(&a.register);
                if actual != Some(a.equals) {
                    failures.push(format!(
                        "register {} is {:?}, expected {:#06x}",
                        a.register, actual, a.equals
                    ));
                }
            }
        }
    }

    if !failures.is_empty() {
        for failure in &failures {
            tracing::error!("Assertion failed: {}", failure);
        }
        bail!("{} assertion(s) failed", failures.len());
    }
    Ok(())
}
