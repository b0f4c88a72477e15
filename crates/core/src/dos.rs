// Wired86 - 8086 Instruction Set Simulator
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

/// Console backing the DOS INT 21h output stub.
/// Bytes go to stdout and, when a sink is attached, into the sink so
/// hosts and tests can read back what the program printed.
#[derive(Debug, Default)]
pub struct DosConsole {
    sink: Option<Arc<Mutex<Vec<u8>>>>,
    echo_stdout: bool,
    exit_code: Option<u8>,
}

impl DosConsole {
    pub fn new(echo_stdout: bool) -> Self {
        Self {
            sink: None,
            echo_stdout,
            exit_code: None,
        }
    }

    pub fn set_sink(&mut self, sink: Option<Arc<Mutex<Vec<u8>>>>) {
        self.sink = sink;
    }

    pub fn put_byte(&mut self, value: u8) -> io::Result<()> {
        if let Some(sink) = &self.sink {
            if let Ok(mut guard) = sink.lock() {
                guard.push(value);
            }
        }

        if self.echo_stdout {
            let mut stdout = io::stdout();
            stdout.write_all(&[value])?;
            stdout.flush()?;
        }
        Ok(())
    }

    pub fn set_exit_code(&mut self, code: u8) {
        self.exit_code = Some(code);
    }

    /// AL value passed to INT 21h AH=4Ch, if the program terminated that way.
    pub fn exit_code(&self) -> Option<u8> {
        self.exit_code
    }

    pub fn reset(&mut self) {
        self.exit_code = None;
        if let Some(sink) = &self.sink {
            if let Ok(mut guard) = sink.lock() {
                guard.clear();
            }
        }
    }
}
