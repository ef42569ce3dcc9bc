//! Register-level model of the reference designs: AXI DMA engines feeding
//! AXI streams, and a vector-sum accelerator behind an AXI-Lite control
//! block. Buffers come from a fake u-dma-buf module living in a temporary
//! directory.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;
use std::rc::Rc;

use axi_dmabuf::RegisterIo;
use axi_dmabuf::UdmaBuffer;
use axi_dmabuf::UdmaConfig;
use axi_dmabuf::Word;
use tempfile::TempDir;

const INSMOD: &str = include_str!("../fake_udmabuf/insmod.sh");
const RMMOD: &str = include_str!("../fake_udmabuf/rmmod.sh");

pub fn fake_udmabuf() -> (TempDir, UdmaConfig) {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    fs::create_dir(root.join("dev")).unwrap();
    fs::create_dir(root.join("class")).unwrap();
    fs::write(root.join("modules"), "").unwrap();
    fs::write(root.join("insmod.sh"), INSMOD).unwrap();
    fs::write(root.join("rmmod.sh"), RMMOD).unwrap();

    let sh = |script: &str| vec!["sh".to_string(), root.join(script).display().to_string()];
    let config = UdmaConfig {
        device_dir: root.join("dev"),
        class_dir: root.join("class"),
        modules_list: root.join("modules"),
        insert_command: sh("insmod.sh"),
        remove_command: sh("rmmod.sh"),
        ..UdmaConfig::default()
    };
    (dir, config)
}

// AXI DMA
pub const MM2S: usize = 0x00;
pub const S2MM: usize = 0x30;
pub const DMACR: usize = 0x00;
pub const DMASR: usize = 0x04;
pub const ADDR: usize = 0x18;
pub const ADDR_MSB: usize = 0x1C;
pub const LENGTH: usize = 0x28;
pub const RUN: u32 = 1;
pub const RESET: u32 = 1 << 2;
pub const HALTED: u32 = 1;
pub const IDLE: u32 = 1 << 1;
pub const SG_INCLD: u32 = 1 << 3;
pub const DMA_DEC_ERR: u32 = 1 << 6;

// AXI-Lite control
pub const AP_START: u32 = 1;
pub const AP_DONE: u32 = 1 << 1;
pub const AP_IDLE: u32 = 1 << 2;
pub const AP_READY: u32 = 1 << 3;

struct Region {
    phys: u64,
    ptr: *mut u8,
    len: usize,
}

#[derive(Default)]
struct Channel {
    pending: bool,
    /// Stream fed (MM2S) or drained (S2MM) by the channel.
    stream: usize,
}

struct Dma {
    regs: [u8; 0x60],
    sg: bool,
    chan: [Channel; 2],
}

struct Accel {
    regs: Vec<u8>,
    inputs: [usize; 2],
    output: usize,
}

#[derive(Default)]
pub struct Bus {
    regions: Vec<Region>,
    streams: Vec<VecDeque<u8>>,
    dmas: Vec<Dma>,
    accel: Option<Accel>,
    pub reg_writes: usize,
}

fn get32(regs: &[u8], off: usize) -> u32 {
    let mut b = [0u8; 4];
    b.copy_from_slice(&regs[off..off + 4]);
    u32::from_le_bytes(b)
}

fn set32(regs: &mut [u8], off: usize, v: u32) {
    regs[off..off + 4].copy_from_slice(&v.to_le_bytes());
}

impl Bus {
    fn region(&self, addr: u64, len: usize) -> Option<*mut u8> {
        self.regions
            .iter()
            .find(|r| addr >= r.phys && addr + len as u64 <= r.phys + r.len as u64)
            .map(|r| unsafe { r.ptr.add((addr - r.phys) as usize) })
    }

    fn stream(&mut self, id: usize) -> &mut VecDeque<u8> {
        if self.streams.len() <= id {
            self.streams.resize_with(id + 1, VecDeque::new);
        }
        &mut self.streams[id]
    }

    pub fn stream_len(&self, id: usize) -> usize {
        self.streams.get(id).map_or(0, |s| s.len())
    }

    fn write_dma(&mut self, idx: usize, off: usize, v: u32) {
        let ch = off / S2MM;
        let b = ch * S2MM;
        let dma = &mut self.dmas[idx];
        match off - b {
            DMACR if v & RESET != 0 => {
                set32(&mut dma.regs, b + DMACR, 0);
                let sg = if dma.sg { SG_INCLD } else { 0 };
                set32(&mut dma.regs, b + DMASR, HALTED | sg);
                dma.chan[ch].pending = false;
            }
            DMACR => {
                set32(&mut dma.regs, off, v);
                if v & RUN != 0 {
                    let s = get32(&dma.regs, b + DMASR);
                    set32(&mut dma.regs, b + DMASR, s & !HALTED);
                }
            }
            LENGTH => {
                set32(&mut dma.regs, off, v);
                if get32(&dma.regs, b + DMACR) & RUN != 0 {
                    let s = get32(&dma.regs, b + DMASR);
                    set32(&mut dma.regs, b + DMASR, s & !IDLE);
                    dma.chan[ch].pending = true;
                }
            }
            _ => set32(&mut dma.regs, off, v),
        }
    }

    fn finish(&mut self, idx: usize, ch: usize, err: u32) {
        let b = ch * S2MM;
        let dma = &mut self.dmas[idx];
        let s = get32(&dma.regs, b + DMASR);
        let s = if err != 0 { s | err | HALTED } else { s };
        set32(&mut dma.regs, b + DMASR, s | IDLE);
        dma.chan[ch].pending = false;
    }

    /// Let every engine and the accelerator make as much progress as the
    /// available data allows.
    fn step(&mut self) {
        loop {
            let mut progress = false;
            for idx in 0..self.dmas.len() {
                for ch in 0..2 {
                    if !self.dmas[idx].chan[ch].pending {
                        continue;
                    }
                    let b = ch * S2MM;
                    let regs = &self.dmas[idx].regs;
                    let addr = u64::from(get32(regs, b + ADDR)) | (u64::from(get32(regs, b + ADDR_MSB)) << 32);
                    let len = (get32(regs, b + LENGTH) & 0x3ff_ffff) as usize;
                    let stream = self.dmas[idx].chan[ch].stream;
                    if ch == 1 && self.stream_len(stream) < len {
                        continue;
                    }
                    let mem = match self.region(addr, len) {
                        Some(mem) => mem,
                        None => {
                            self.finish(idx, ch, DMA_DEC_ERR);
                            progress = true;
                            continue;
                        }
                    };
                    if ch == 0 {
                        let data = unsafe { std::slice::from_raw_parts(mem, len) }.to_vec();
                        self.stream(stream).extend(data);
                    } else {
                        let data: Vec<u8> = self.stream(stream).drain(..len).collect();
                        unsafe { std::ptr::copy_nonoverlapping(data.as_ptr(), mem, len) };
                    }
                    self.finish(idx, ch, 0);
                    progress = true;
                }
            }
            progress |= self.step_accel();
            if !progress {
                break;
            }
        }
    }

    fn step_accel(&mut self) -> bool {
        let (inputs, output, args) = match &self.accel {
            Some(a) if get32(&a.regs, 0) & AP_START != 0 => {
                let arg = |slot: usize| get32(&a.regs, 0x10 + 8 * slot);
                (a.inputs, a.output, [arg(0), arg(1), arg(2), arg(3)])
            }
            _ => return false,
        };
        let n = args[0] as usize;
        if self.stream_len(inputs[0]) < 4 * n || self.stream_len(inputs[1]) < 4 * n {
            return false;
        }
        let word = |s: &mut VecDeque<u8>| {
            let b: Vec<u8> = s.drain(..4).collect();
            i32::from_le_bytes([b[0], b[1], b[2], b[3]])
        };
        let (a, b, c) = (args[1] as i32, args[2] as i32, args[3] as i32);
        for _ in 0..n {
            let x = word(self.stream(inputs[0]));
            let y = word(self.stream(inputs[1]));
            let out = a * x + b * y + c;
            self.stream(output).extend(out.to_le_bytes());
        }
        if let Some(accel) = &mut self.accel {
            set32(&mut accel.regs, 0, AP_DONE | AP_IDLE | AP_READY);
        }
        true
    }
}

pub type SharedBus = Rc<RefCell<Bus>>;

pub fn bus() -> SharedBus {
    Rc::new(RefCell::new(Bus::default()))
}

/// Make a buffer reachable by the simulated engines at its physical address.
pub fn attach(bus: &SharedBus, buf: &UdmaBuffer) {
    bus.borrow_mut().regions.push(Region {
        phys: buf.phys_addr(),
        ptr: buf.as_ptr(),
        len: buf.size(),
    });
}

#[derive(Clone, Copy)]
enum Kind {
    Dma(usize),
    Accel,
}

/// One register block on the simulated bus.
pub struct SimBlock {
    bus: SharedBus,
    kind: Kind,
}

impl SimBlock {
    /// An AXI DMA whose MM2S channel feeds stream `to_stream` and whose S2MM
    /// channel drains stream `from_stream`.
    pub fn dma(bus: &SharedBus, to_stream: usize, from_stream: usize, sg: bool) -> SimBlock {
        let mut b = bus.borrow_mut();
        b.dmas.push(Dma {
            regs: [0; 0x60],
            sg,
            chan: [
                Channel {
                    pending: false,
                    stream: to_stream,
                },
                Channel {
                    pending: false,
                    stream: from_stream,
                },
            ],
        });
        SimBlock {
            bus: bus.clone(),
            kind: Kind::Dma(b.dmas.len() - 1),
        }
    }

    /// A vector-sum accelerator: `out = a * in1 + b * in2 + c`, with the
    /// element count in slot 0 and `a`, `b`, `c` in slots 1 to 3.
    pub fn vec_sum(bus: &SharedBus, in1: usize, in2: usize, out: usize) -> SimBlock {
        bus.borrow_mut().accel = Some(Accel {
            regs: vec![0; 0x100],
            inputs: [in1, in2],
            output: out,
        });
        SimBlock {
            bus: bus.clone(),
            kind: Kind::Accel,
        }
    }

    /// Raw register value, bypassing the model.
    pub fn peek32(&self, off: usize) -> u32 {
        let bus = self.bus.borrow();
        match self.kind {
            Kind::Dma(i) => get32(&bus.dmas[i].regs, off),
            Kind::Accel => get32(&bus.accel.as_ref().unwrap().regs, off),
        }
    }

    pub fn poke32(&self, off: usize, v: u32) {
        let mut bus = self.bus.borrow_mut();
        match self.kind {
            Kind::Dma(i) => set32(&mut bus.dmas[i].regs, off, v),
            Kind::Accel => set32(&mut bus.accel.as_mut().unwrap().regs, off, v),
        }
    }
}

impl RegisterIo for SimBlock {
    fn read<T: Word>(&self, offset: usize) -> T {
        let mut bus = self.bus.borrow_mut();
        bus.step();
        let regs: &[u8] = match self.kind {
            Kind::Dma(i) => &bus.dmas[i].regs[..],
            Kind::Accel => &bus.accel.as_ref().unwrap().regs[..],
        };
        let mut b = [0u8; 8];
        b[..T::WIDTH].copy_from_slice(&regs[offset..offset + T::WIDTH]);
        T::from_bits(u64::from_le_bytes(b))
    }

    fn write<T: Word>(&self, offset: usize, value: T) {
        let mut bus = self.bus.borrow_mut();
        bus.reg_writes += 1;
        let bits = value.into_bits();
        match self.kind {
            Kind::Dma(i) => {
                assert_eq!(T::WIDTH, 4, "AXI DMA registers are 32 bit");
                bus.write_dma(i, offset, bits as u32);
            }
            Kind::Accel => {
                let regs = &mut bus.accel.as_mut().unwrap().regs;
                regs[offset..offset + T::WIDTH].copy_from_slice(&bits.to_le_bytes()[..T::WIDTH]);
            }
        }
        bus.step();
    }

    fn len(&self) -> usize {
        let bus = self.bus.borrow();
        match self.kind {
            Kind::Dma(i) => bus.dmas[i].regs.len(),
            Kind::Accel => bus.accel.as_ref().unwrap().regs.len(),
        }
    }
}
