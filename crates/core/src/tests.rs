#[cfg(test)]
mod tests {
    use crate::cpu::{Flag, Reg8};
    use crate::memory::{phys, Program, CODE_SEGMENT, DATA_SEGMENT};
    use crate::{ExecState, Fault, Machine, MemoryObserver, StepOutcome, StopReason};
    use std::sync::{Arc, Mutex};
    use wired86_config::{InterruptPolicy, MachineConfig};

    fn quiet_config() -> MachineConfig {
        MachineConfig {
            interrupt_policy: InterruptPolicy::Fault,
            echo_stdout: false,
        }
    }

    fn machine_with(code: &[u8], data: &[u8]) -> Machine {
        let mut machine = Machine::with_config(quiet_config());
        let program = Program {
            code: code.to_vec(),
            data: data.to_vec(),
            ..Program::default()
        };
        machine.load(&program);
        machine
    }

    #[test]
    fn test_arithmetic_chain() {
        // MOV AX,10; MOV BX,20; MOV CX,30; MOV DX,40
        // ADD AX,BX; ADD AX,CX; ADD AX,DX; HLT
        let mut machine = machine_with(
            &[
                0xB8, 0x0A, 0x00, 0xBB, 0x14, 0x00, 0xB9, 0x1E, 0x00, 0xBA, 0x28, 0x00, 0x03,
                0xC3, 0x03, 0xC1, 0x03, 0xC2, 0xF4,
            ],
            &[],
        );
        let outcome = machine.run(Some(100));
        assert_eq!(outcome.stop, StopReason::Halted);
        assert_eq!(machine.cpu.ax, 100);
        assert_eq!(machine.cpu.bx, 20);
        assert_eq!(machine.cpu.cx, 30);
        assert_eq!(machine.cpu.dx, 40);
        assert!(!machine.cpu.flag(Flag::Zero));
        assert!(!machine.cpu.flag(Flag::Carry));
    }

    #[test]
    fn test_dec_jnz_loop() {
        // MOV CX,5; MOV AX,0; L: ADD AX,CX; DEC CX; JNZ L; HLT
        let mut machine = machine_with(
            &[
                0xB9, 0x05, 0x00, 0xB8, 0x00, 0x00, 0x03, 0xC1, 0x49, 0x75, 0xFB, 0xF4,
            ],
            &[],
        );
        let outcome = machine.run(Some(100));
        assert_eq!(outcome.stop, StopReason::Halted);
        assert_eq!(machine.cpu.ax, 15);
        assert_eq!(machine.cpu.cx, 0);
        assert!(machine.cpu.flag(Flag::Zero));
    }

    #[test]
    fn test_loop_instruction() {
        // MOV CX,5; MOV AX,0; L: INC AX; LOOP L; HLT
        let mut machine = machine_with(
            &[0xB9, 0x05, 0x00, 0xB8, 0x00, 0x00, 0x40, 0xE2, 0xFD, 0xF4],
            &[],
        );
        let outcome = machine.run(Some(100));
        assert_eq!(outcome.stop, StopReason::Halted);
        assert_eq!(machine.cpu.ax, 5);
        assert_eq!(machine.cpu.cx, 0);
    }

    #[test]
    fn test_cbw_sign_extends() {
        // MOV AL,0x80; CBW; HLT
        let mut machine = machine_with(&[0xB0, 0x80, 0x98, 0xF4], &[]);
        machine.run(Some(10));
        assert_eq!(machine.cpu.ax, 0xFF80);
    }

    #[test]
    fn test_mul_and_div() {
        // MOV AL,5; MOV BL,10; MUL BL; HLT
        let mut machine = machine_with(&[0xB0, 0x05, 0xB3, 0x0A, 0xF6, 0xE3, 0xF4], &[]);
        machine.run(Some(10));
        assert_eq!(machine.cpu.ax, 0x0032);
        assert!(!machine.cpu.flag(Flag::Carry));
        assert!(!machine.cpu.flag(Flag::Overflow));

        // MOV AX,100; MOV BL,3; DIV BL; HLT
        let mut machine = machine_with(&[0xB8, 0x64, 0x00, 0xB3, 0x03, 0xF6, 0xF3, 0xF4], &[]);
        machine.run(Some(10));
        assert_eq!(machine.cpu.reg8(Reg8::AL), 33);
        assert_eq!(machine.cpu.reg8(Reg8::AH), 1);
    }

    #[test]
    fn test_mul_sets_carry_when_high_half_used() {
        // MOV AL,0x80; MOV BL,4; MUL BL -> AX=0x0200
        let mut machine = machine_with(&[0xB0, 0x80, 0xB3, 0x04, 0xF6, 0xE3, 0xF4], &[]);
        machine.run(Some(10));
        assert_eq!(machine.cpu.ax, 0x0200);
        assert!(machine.cpu.flag(Flag::Carry));
        assert!(machine.cpu.flag(Flag::Overflow));
    }

    #[test]
    fn test_rotates() {
        // MOV AL,0x81; ROL AL,1; HLT
        let mut machine = machine_with(&[0xB0, 0x81, 0xD0, 0xC0, 0xF4], &[]);
        machine.run(Some(10));
        assert_eq!(machine.cpu.reg8(Reg8::AL), 0x03);
        assert!(machine.cpu.flag(Flag::Carry));

        // MOV AL,0x81; ROR AL,1; HLT
        let mut machine = machine_with(&[0xB0, 0x81, 0xD0, 0xC8, 0xF4], &[]);
        machine.run(Some(10));
        assert_eq!(machine.cpu.reg8(Reg8::AL), 0xC0);
        assert!(machine.cpu.flag(Flag::Carry));
    }

    #[test]
    fn test_dos_print_and_exit() {
        // msg DB 'Hi$' in the data segment
        // MOV AX,@DATA; MOV DS,AX; MOV AH,9; MOV DX,0; INT 21h
        // MOV AX,4C00h; INT 21h
        let mut machine = machine_with(
            &[
                0xB8, 0x20, 0x00, 0x8E, 0xD8, 0xB4, 0x09, 0xBA, 0x00, 0x00, 0xCD, 0x21, 0xB8,
                0x00, 0x4C, 0xCD, 0x21,
            ],
            b"Hi$",
        );
        let sink = Arc::new(Mutex::new(Vec::new()));
        machine.console.set_sink(Some(sink.clone()));

        let outcome = machine.run(Some(100));
        assert_eq!(outcome.stop, StopReason::Halted);
        assert_eq!(&*sink.lock().unwrap(), b"Hi");
        assert_eq!(machine.exit_code(), Some(0));
        assert_eq!(machine.state(), ExecState::Halted);
    }

    #[test]
    fn test_char_output() {
        // MOV AH,2; MOV DL,'A'; INT 21h; HLT
        let mut machine = machine_with(&[0xB4, 0x02, 0xB2, 0x41, 0xCD, 0x21, 0xF4], &[]);
        let sink = Arc::new(Mutex::new(Vec::new()));
        machine.console.set_sink(Some(sink.clone()));
        machine.run(Some(10));
        assert_eq!(&*sink.lock().unwrap(), b"A");
    }

    #[test]
    fn test_rep_movsb_copies_exactly_cx_bytes() {
        // CLD; REP MOVSB; HLT  with DS=ES=data, SI=0, DI=8, CX=5
        let mut machine = machine_with(&[0xFC, 0xF3, 0xA4, 0xF4], b"abcde\0\0\0\0\0\0\0\0");
        machine.cpu.es = DATA_SEGMENT;
        machine.cpu.si = 0;
        machine.cpu.di = 8;
        machine.cpu.cx = 5;

        let outcome = machine.run(Some(10));
        assert_eq!(outcome.stop, StopReason::Halted);
        assert_eq!(machine.cpu.cx, 0);
        assert_eq!(machine.cpu.si, 5);
        assert_eq!(machine.cpu.di, 13);
        assert_eq!(machine.read_memory(phys(DATA_SEGMENT, 8), 5), b"abcde");
    }

    #[test]
    fn test_rep_movsb_with_zero_cx_is_noop() {
        let mut machine = machine_with(&[0xF3, 0xA4, 0xF4], b"xy");
        machine.cpu.es = DATA_SEGMENT;
        machine.cpu.cx = 0;
        machine.cpu.di = 1;
        machine.run(Some(10));
        assert_eq!(machine.cpu.si, 0);
        assert_eq!(machine.cpu.di, 1);
        assert_eq!(machine.read_memory(phys(DATA_SEGMENT, 1), 1), b"y");
    }

    #[test]
    fn test_repne_scasb_finds_byte() {
        // Scan "abcX" for 'X': MOV AL,'X'; REPNE SCASB; HLT
        let mut machine = machine_with(&[0xB0, 0x58, 0xF2, 0xAE, 0xF4], b"abcX...");
        machine.cpu.es = DATA_SEGMENT;
        machine.cpu.di = 0;
        machine.cpu.cx = 7;
        machine.run(Some(10));
        // Stopped after matching position 3
        assert_eq!(machine.cpu.di, 4);
        assert_eq!(machine.cpu.cx, 3);
        assert!(machine.cpu.flag(Flag::Zero));
    }

    #[test]
    fn test_call_ret_is_stack_balanced() {
        // CALL sub; HLT; sub: RET
        let mut machine = machine_with(&[0xE8, 0x01, 0x00, 0xF4, 0xC3], &[]);
        let sp_before = machine.cpu.sp;
        let outcome = machine.run(Some(10));
        assert_eq!(outcome.stop, StopReason::Halted);
        assert_eq!(machine.cpu.sp, sp_before);
    }

    #[test]
    fn test_push_pop_round_trip() {
        // MOV AX,0x1234; PUSH AX; POP BX; HLT
        let mut machine = machine_with(&[0xB8, 0x34, 0x12, 0x50, 0x5B, 0xF4], &[]);
        machine.run(Some(10));
        assert_eq!(machine.cpu.bx, 0x1234);
        assert_eq!(machine.cpu.sp, 0x00FF);
    }

    #[test]
    fn test_stack_pointer_wraps_without_fault() {
        // PUSH AX with SP=0 wraps to 0xFFFE inside SS
        let mut machine = machine_with(&[0x50, 0xF4], &[]);
        machine.cpu.sp = 0;
        machine.cpu.ax = 0xABCD;
        let outcome = machine.run(Some(10));
        assert_eq!(outcome.stop, StopReason::Halted);
        assert_eq!(machine.cpu.sp, 0xFFFE);
    }

    #[test]
    fn test_ip_advances_by_instruction_length() {
        let mut machine = machine_with(&[0xB8, 0x34, 0x12, 0x90, 0xF4], &[]);
        assert_eq!(machine.cpu.ip, 0);
        machine.step().unwrap();
        assert_eq!(machine.cpu.ip, 3);
        machine.step().unwrap();
        assert_eq!(machine.cpu.ip, 4);
    }

    #[test]
    fn test_byte_add_carry_property() {
        // AL=200, BL=100: ADD AL,BL -> AL=44, CF=1
        let mut machine = machine_with(&[0xB0, 0xC8, 0xB3, 0x64, 0x02, 0xC3, 0xF4], &[]);
        machine.run(Some(10));
        assert_eq!(machine.cpu.reg8(Reg8::AL), 44);
        assert!(machine.cpu.flag(Flag::Carry));
    }

    #[test]
    fn test_half_register_views() {
        let mut machine = machine_with(&[0xF4], &[]);
        machine.cpu.set_reg8(Reg8::AH, 0x12);
        machine.cpu.set_reg8(Reg8::AL, 0x34);
        assert_eq!(machine.cpu.ax, 0x1234);
        machine.cpu.ax = 0xBEEF;
        assert_eq!(machine.cpu.reg8(Reg8::AH), 0xBE);
        assert_eq!(machine.cpu.reg8(Reg8::AL), 0xEF);
    }

    #[test]
    fn test_breakpoint_pause_and_resume() {
        // MOV AX,1; MOV BX,2; HLT
        let mut machine = machine_with(&[0xB8, 0x01, 0x00, 0xBB, 0x02, 0x00, 0xF4], &[]);
        let second_instr = phys(CODE_SEGMENT, 3);
        machine.add_breakpoint(second_instr);

        let outcome = machine.run_to_breakpoint();
        assert_eq!(outcome.stop, StopReason::Breakpoint(second_instr));
        assert_eq!(machine.cpu.ax, 1);
        assert_eq!(machine.cpu.bx, 0);
        assert_eq!(machine.state(), ExecState::Paused);

        // Resuming steps past the breakpoint without re-triggering
        let outcome = machine.run(None);
        assert_eq!(outcome.stop, StopReason::Halted);
        assert_eq!(machine.cpu.bx, 2);
    }

    #[test]
    fn test_step_past_breakpoint() {
        let mut machine = machine_with(&[0xB8, 0x01, 0x00, 0xF4], &[]);
        let entry = phys(CODE_SEGMENT, 0);
        machine.add_breakpoint(entry);

        assert_eq!(machine.step().unwrap(), StepOutcome::BreakpointHit(entry));
        assert_eq!(machine.step().unwrap(), StepOutcome::Continue);
        assert_eq!(machine.cpu.ax, 1);
    }

    #[test]
    fn test_divide_by_zero_faults() {
        // XOR BL,BL; DIV BL
        let mut machine = machine_with(&[0x30, 0xDB, 0xF6, 0xF3], &[]);
        let outcome = machine.run(Some(10));
        assert!(matches!(
            outcome.stop,
            StopReason::Fault(Fault::DivideError { .. })
        ));
        assert_eq!(machine.state(), ExecState::Faulted);

        // Faulted machine stays faulted until reset
        assert!(machine.step().is_err());
        machine.reset();
        assert_eq!(machine.state(), ExecState::Idle);
    }

    #[test]
    fn test_divide_overflow_faults() {
        // MOV AX,0x1000; MOV BL,1; DIV BL -> quotient > 0xFF
        let mut machine = machine_with(&[0xB8, 0x00, 0x10, 0xB3, 0x01, 0xF6, 0xF3], &[]);
        let outcome = machine.run(Some(10));
        assert!(matches!(
            outcome.stop,
            StopReason::Fault(Fault::DivideError { .. })
        ));
    }

    #[test]
    fn test_invalid_opcode_faults() {
        let mut machine = machine_with(&[0x0F], &[]);
        let outcome = machine.run(Some(10));
        assert!(matches!(
            outcome.stop,
            StopReason::Fault(Fault::InvalidOpcode { opcode: 0x0F, .. })
        ));
        // Register snapshot is preserved for inspection
        assert_eq!(machine.registers().ip, 0);
    }

    #[test]
    fn test_unhandled_interrupt_policy() {
        // INT 10h faults under the default policy
        let mut machine = machine_with(&[0xCD, 0x10, 0xF4], &[]);
        let outcome = machine.run(Some(10));
        assert!(matches!(
            outcome.stop,
            StopReason::Fault(Fault::UnhandledInterrupt { number: 0x10, .. })
        ));

        // ...and is skipped under `ignore`
        let mut machine = Machine::with_config(MachineConfig {
            interrupt_policy: InterruptPolicy::Ignore,
            echo_stdout: false,
        });
        machine.load(&Program {
            code: vec![0xCD, 0x10, 0xF4],
            ..Program::default()
        });
        let outcome = machine.run(Some(10));
        assert_eq!(outcome.stop, StopReason::Halted);
    }

    #[test]
    fn test_out_of_budget_pauses() {
        // JMP $ spins forever
        let mut machine = machine_with(&[0xEB, 0xFE], &[]);
        let outcome = machine.run(Some(10));
        assert_eq!(outcome.stop, StopReason::OutOfBudget);
        assert_eq!(outcome.retired, 10);
        assert_eq!(machine.state(), ExecState::Paused);

        // Paused re-enters Running on the next run
        let outcome = machine.run(Some(5));
        assert_eq!(outcome.stop, StopReason::OutOfBudget);
    }

    #[test]
    fn test_lahf_sahf_round_trip() {
        // STC; LAHF; CLC; SAHF; HLT
        let mut machine = machine_with(&[0xF9, 0x9F, 0xF8, 0x9E, 0xF4], &[]);
        machine.run(Some(10));
        assert!(machine.cpu.flag(Flag::Carry));
    }

    #[test]
    fn test_pushf_popf_round_trip() {
        // STC; PUSHF; CLC; POPF; HLT
        let mut machine = machine_with(&[0xF9, 0x9C, 0xF8, 0x9D, 0xF4], &[]);
        machine.run(Some(10));
        assert!(machine.cpu.flag(Flag::Carry));
    }

    #[test]
    fn test_memory_operand_read_before_write() {
        #[derive(Debug, Default)]
        struct EventLog(Mutex<Vec<(char, u32)>>);
        impl MemoryObserver for EventLog {
            fn on_read(&self, phys: u32, _size: u8) {
                self.0.lock().unwrap().push(('r', phys));
            }
            fn on_write(&self, phys: u32, _size: u8, _value: u16) {
                self.0.lock().unwrap().push(('w', phys));
            }
            fn on_execute(&self, phys: u32) {
                self.0.lock().unwrap().push(('x', phys));
            }
        }

        // ADD [0x10], AX -> 01 06 10 00
        let mut machine = machine_with(&[0x01, 0x06, 0x10, 0x00, 0xF4], &[]);
        let log = Arc::new(EventLog::default());
        machine.attach_observer(log.clone());
        machine.run(Some(10));

        let events = log.0.lock().unwrap();
        let target = phys(DATA_SEGMENT, 0x10);
        let read_pos = events.iter().position(|e| *e == ('r', target));
        let write_pos = events.iter().position(|e| *e == ('w', target));
        let exec_pos = events.iter().position(|e| e.0 == 'x');
        assert!(exec_pos.unwrap() < read_pos.unwrap());
        assert!(read_pos.unwrap() < write_pos.unwrap());
    }

    #[test]
    fn test_access_profiler_counts_fetches() {
        use crate::metrics::AccessProfiler;

        // MOV CX,5; MOV AX,0; L: ADD AX,CX; DEC CX; JNZ L; HLT
        let mut machine = machine_with(
            &[
                0xB9, 0x05, 0x00, 0xB8, 0x00, 0x00, 0x03, 0xC1, 0x49, 0x75, 0xFB, 0xF4,
            ],
            &[],
        );
        let profiler = Arc::new(AccessProfiler::new());
        machine.attach_observer(profiler.clone());

        let outcome = machine.run(Some(100));
        assert_eq!(outcome.stop, StopReason::Halted);
        // One fetch per retired instruction: 2 + 5 loop bodies of 3 + HLT
        assert_eq!(outcome.retired, 18);
        assert_eq!(profiler.instructions_fetched(), 18);
        // The loop body is the hottest code: its first byte is read once
        // per iteration
        let hot = profiler.hotspots(1);
        assert_eq!(hot[0], (phys(CODE_SEGMENT, 6), 5));
    }

    #[test]
    fn test_conditional_jump_family() {
        // MOV AX,5; CMP AX,5; JE taken -> MOV BX,1 skipped, MOV CX,7
        // 0: B8 05 00
        // 3: 3D 05 00   CMP AX,5
        // 6: 74 03      JE +3
        // 8: BB 01 00   MOV BX,1
        // 11: B9 07 00  MOV CX,7
        // 14: F4
        let mut machine = machine_with(
            &[
                0xB8, 0x05, 0x00, 0x3D, 0x05, 0x00, 0x74, 0x03, 0xBB, 0x01, 0x00, 0xB9, 0x07,
                0x00, 0xF4,
            ],
            &[],
        );
        machine.run(Some(10));
        assert_eq!(machine.cpu.bx, 0);
        assert_eq!(machine.cpu.cx, 7);
    }

    #[test]
    fn test_signed_conditions() {
        // MOV AX,-5 (0xFFFB); CMP AX,3; JL taken
        // 0: B8 FB FF; 3: 3D 03 00; 6: 7C 03; 8: BB 01 00; 11: B9 07 00; 14: F4
        let mut machine = machine_with(
            &[
                0xB8, 0xFB, 0xFF, 0x3D, 0x03, 0x00, 0x7C, 0x03, 0xBB, 0x01, 0x00, 0xB9, 0x07,
                0x00, 0xF4,
            ],
            &[],
        );
        machine.run(Some(10));
        assert_eq!(machine.cpu.bx, 0);
        assert_eq!(machine.cpu.cx, 7);
    }

    #[test]
    fn test_far_call_and_return() {
        // CALL 0010:000A; HLT ... at offset 10: RETF
        let mut machine = machine_with(
            &[
                0x9A, 0x0A, 0x00, 0x10, 0x00, 0xF4, 0x90, 0x90, 0x90, 0x90, 0xCB,
            ],
            &[],
        );
        let outcome = machine.run(Some(10));
        assert_eq!(outcome.stop, StopReason::Halted);
        assert_eq!(machine.cpu.ip, 6);
        assert_eq!(machine.cpu.sp, 0x00FF);
    }

    #[test]
    fn test_memory_round_trip_via_machine_api() {
        let mut machine = machine_with(&[0xF4], &[]);
        machine.write_memory(0x00500, &[0xDE, 0xAD]);
        assert_eq!(machine.read_memory(0x00500, 2), vec![0xDE, 0xAD]);
    }

    #[test]
    fn test_neg_and_not() {
        // MOV AL,1; NEG AL; HLT
        let mut machine = machine_with(&[0xB0, 0x01, 0xF6, 0xD8, 0xF4], &[]);
        machine.run(Some(10));
        assert_eq!(machine.cpu.reg8(Reg8::AL), 0xFF);
        assert!(machine.cpu.flag(Flag::Carry));
        assert!(machine.cpu.flag(Flag::Sign));

        // MOV AL,0x0F; NOT AL; HLT - flags untouched by NOT
        let mut machine = machine_with(&[0xB0, 0x0F, 0xF6, 0xD0, 0xF4], &[]);
        machine.run(Some(10));
        assert_eq!(machine.cpu.reg8(Reg8::AL), 0xF0);
    }

    #[test]
    fn test_inc_preserves_carry() {
        // STC; MOV AX,0xFFFF; INC AX; HLT -> AX=0, ZF=1, CF still 1
        let mut machine = machine_with(&[0xF9, 0xB8, 0xFF, 0xFF, 0x40, 0xF4], &[]);
        machine.run(Some(10));
        assert_eq!(machine.cpu.ax, 0);
        assert!(machine.cpu.flag(Flag::Zero));
        assert!(machine.cpu.flag(Flag::Carry));
    }

    #[test]
    fn test_xchg_and_lea() {
        // MOV AX,1; MOV BX,2; XCHG AX,BX; HLT
        let mut machine = machine_with(&[0xB8, 0x01, 0x00, 0xBB, 0x02, 0x00, 0x93, 0xF4], &[]);
        machine.run(Some(10));
        assert_eq!(machine.cpu.ax, 2);
        assert_eq!(machine.cpu.bx, 1);

        // MOV BX,0x10; LEA AX,[BX+4] -> AX=0x14 (8D 47 04)
        let mut machine = machine_with(&[0xBB, 0x10, 0x00, 0x8D, 0x47, 0x04, 0xF4], &[]);
        machine.run(Some(10));
        assert_eq!(machine.cpu.ax, 0x14);
    }
}
