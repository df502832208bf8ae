use criterion::{criterion_group, criterion_main, Criterion};
use core::hint::black_box;

use nos_bios_thunk::ivt::vectors;
use nos_bios_thunk::{initialize_real_mode_caller, install_interrupt_redirection, invoke_real_mode_interrupt, Irq, PhysAddr, RegisterSet};
use nos_realmode_emu::RealModeMachine;

// INC AX; IRET
const ECHO: [u8; 2] = [0x40, 0xCF];
// PUSH AX; MOV AL, 0x20; OUT 0x20, AL; POP AX; IRET
const TIMER: [u8; 7] = [0x50, 0xB0, 0x20, 0xE6, 0x20, 0x58, 0xCF];

fn bench_invoke(c: &mut Criterion) {
    let mut machine = RealModeMachine::new();
    let mut pic = machine.pic();
    machine.install_handler(vectors::VIDEO, PhysAddr::new(0xF1000), &ECHO);
    machine.install_handler(vectors::IRQ0_TIMER, PhysAddr::new(0xF2000), &TIMER);
    let mut context = initialize_real_mode_caller(&mut machine);
    install_interrupt_redirection(&pic, &mut machine);

    c.bench_function("invoke_echo", |b| {
        b.iter(|| {
            let mut regs = RegisterSet::new();
            let failed = invoke_real_mode_interrupt(&mut pic, &mut context, &mut machine, black_box(vectors::VIDEO), &mut regs);
            black_box((failed, regs.get_ax()));
            machine.clear_calls();
        });
    });
    c.bench_function("invoke_with_redirected_irq", |b| {
        b.iter(|| {
            machine.raise_irq(Irq::Irq0);
            let mut regs = RegisterSet::new();
            let failed = invoke_real_mode_interrupt(&mut pic, &mut context, &mut machine, black_box(vectors::VIDEO), &mut regs);
            black_box(failed);
            machine.clear_calls();
        });
    });
}

criterion_group!(benches, bench_invoke);
criterion_main!(benches);
