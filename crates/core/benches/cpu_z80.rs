use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use emu_core::cpu_z80::{CpuZ80, MemoryZ80};

/// Flat 64KB memory with a looping test program at 0x0000
struct BenchMemory {
    ram: Vec<u8>,
}

impl BenchMemory {
    fn new() -> Self {
        let mut ram = vec![0; 0x10000];
        let program = [
            0x31, 0xF0, 0xDF, // LD SP,$DFF0
            0x3E, 0x42, // LD A,$42
            0x21, 0x00, 0xC0, // LD HL,$C000
            0x77, // LD (HL),A
            0x06, 0x10, // LD B,$10
            0x80, // ADD A,B
            0xCB, 0x27, // SLA A
            0xDD, 0x21, 0x00, 0xC1, // LD IX,$C100
            0xDD, 0x77, 0x05, // LD (IX+5),A
            0xFD, 0xCB, 0x00, 0xC6, // SET 0,(IY+0)
            0xED, 0x44, // NEG
            0xC5, // PUSH BC
            0xC1, // POP BC
            0x10, 0xF5, // DJNZ back to ADD A,B
            0xC3, 0x03, 0x00, // JP $0003
        ];
        ram[..program.len()].copy_from_slice(&program);
        Self { ram }
    }
}

impl MemoryZ80 for BenchMemory {
    fn read(&self, addr: u16) -> u8 {
        self.ram[addr as usize]
    }

    fn write(&mut self, addr: u16, val: u8) {
        self.ram[addr as usize] = val;
    }
}

fn bench_cpu_multiple_steps(c: &mut Criterion) {
    let mut group = c.benchmark_group("cpu_z80_multiple_steps");

    for step_count in [10, 100, 1000].iter() {
        group.bench_with_input(
            BenchmarkId::from_parameter(step_count),
            step_count,
            |b, &count| {
                b.iter(|| {
                    let mut cpu = CpuZ80::new(BenchMemory::new());
                    for _ in 0..count {
                        cpu.step();
                    }
                    black_box(cpu.cycles);
                });
            },
        );
    }

    group.finish();
}

fn bench_block_copy(c: &mut Criterion) {
    c.bench_function("cpu_z80_ldir_4k", |b| {
        b.iter(|| {
            let mut memory = BenchMemory::new();
            // LD HL,$4000 ; LD DE,$8000 ; LD BC,$1000 ; LDIR ; HALT
            memory.ram[..12].copy_from_slice(&[
                0x21, 0x00, 0x40, 0x11, 0x00, 0x80, 0x01, 0x00, 0x10, 0xED, 0xB0, 0x76,
            ]);
            let mut cpu = CpuZ80::new(memory);
            while !cpu.halted {
                cpu.step();
            }
            black_box(cpu.cycles);
        });
    });
}

fn bench_disassemble(c: &mut Criterion) {
    let cpu = CpuZ80::new(BenchMemory::new());
    c.bench_function("cpu_z80_disassemble_program", |b| {
        b.iter(|| {
            let mut addr = 0u16;
            while addr < 0x24 {
                let decoded = cpu.disassemble(addr);
                addr = decoded.next_address();
                black_box(decoded.to_string());
            }
        });
    });
}

criterion_group!(
    benches,
    bench_cpu_multiple_steps,
    bench_block_copy,
    bench_disassemble
);
criterion_main!(benches);
