use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// What the executor does with a software interrupt it has no handler for.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum InterruptPolicy {
    /// Stop execution with an `UnhandledInterrupt` fault.
    #[default]
    Fault,
    /// Log and continue as if the interrupt were a no-op.
    Ignore,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct MachineConfig {
    #[serde(default)]
    pub interrupt_policy: InterruptPolicy,
    #[serde(default = "default_echo_stdout")]
    pub echo_stdout: bool,
}

fn default_echo_stdout() -> bool {
    true
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            interrupt_policy: InterruptPolicy::default(),
            echo_stdout: true,
        }
    }
}

impl MachineConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let f = std::fs::File::open(&path)
            .with_context(|| format!("Failed to open machine config at {:?}", path.as_ref()))?;
        serde_yaml::from_reader(f).context("Failed to parse machine config YAML")
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct ScriptInputs {
    pub program: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct ScriptLimits {
    pub max_steps: u64,
}

/// How a scripted run is expected to stop.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StopExpectation {
    Halt,
    Breakpoint,
    MaxSteps,
    Fault,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct StdoutContainsAssertion {
    pub stdout_contains: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct StopAssertion {
    pub expected_stop: StopExpectation,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct RegisterAssertion {
    pub register: String,
    pub equals: u16,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(untagged)]
pub enum ScriptAssertion {
    StdoutContains(StdoutContainsAssertion),
    ExpectedStop(StopAssertion),
    Register(RegisterAssertion),
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct RunScript {
    pub schema_version: String,
    pub inputs: ScriptInputs,
    pub limits: ScriptLimits,
    #[serde(default)]
    pub assertions: Vec<ScriptAssertion>,
}

impl RunScript {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let f = std::fs::File::open(&path)
            .with_context(|| format!("Failed to open run script at {:?}", path.as_ref()))?;
        let script: Self =
            serde_yaml::from_reader(f).context("Failed to parse run script YAML")?;
        script.validate()?;
        Ok(script)
    }

    pub fn validate(&self) -> Result<()> {
        if self.schema_version != "1.0" {
            anyhow::bail!(
                "Unsupported schema_version '{}'. Supported versions: '1.0'",
                self.schema_version
            );
        }

        if self.inputs.program.trim().is_empty() {
            anyhow::bail!("Input 'program' path cannot be empty");
        }

        if self.limits.max_steps == 0 {
            anyhow::bail!("Limit 'max_steps' must be greater than zero");
        }

        for assertion in &self.assertions {
            if let ScriptAssertion::Register(reg) = assertion {
                if !is_known_register(&reg.register) {
                    anyhow::bail!("Unknown register '{}' in assertion", reg.register);
                }
            }
        }

        Ok(())
    }
}

fn is_known_register(name: &str) -> bool {
    matches!(
        name.to_ascii_uppercase().as_str(),
        "AX" | "BX" | "CX" | "DX" | "SP" | "BP" | "SI" | "DI" | "CS" | "DS" | "SS" | "ES" | "IP"
    )
}
