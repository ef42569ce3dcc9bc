use std::fmt;

use crate::dmb;
use crate::phys_mem::PhysMem;
use crate::phys_mem::PhysMemWindow;
use crate::registers::RegisterIo;
use crate::DmaErrors;
use crate::Error;
use crate::PollPolicy;
use crate::UdmaBuffer;

/// Register block of the first AXI DMA in the reference designs.
pub const DEFAULT_DMA_BASE: u64 = 0x4040_0000;
pub const DEFAULT_DMA_LEN: usize = 0x1_0000;

/// Largest transfer the 26 bit length field can describe.
pub const MAX_TRANSFER_LEN: usize = 0x3ff_ffff;

// channel blocks
const MM2S: usize = 0x00;
const S2MM: usize = 0x30;

// registers, relative to the channel block
const DMACR: usize = 0x00;
const DMASR: usize = 0x04;
const ADDR: usize = 0x18;
const ADDR_MSB: usize = 0x1C;
const LENGTH: usize = 0x28;

const DMACR_RUN: u32 = 1 << 0;
const DMACR_RESET: u32 = 1 << 2;

const DMASR_HALTED: u32 = 1 << 0;
const DMASR_IDLE: u32 = 1 << 1;
const DMASR_SG_INCLD: u32 = 1 << 3;
const DMASR_IRQ: u32 = 0x7000;

/// Transfer direction, seen from the host.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Memory-mapped to stream (MM2S), host to device.
    ToDevice,
    /// Stream to memory-mapped (S2MM), device to host.
    FromDevice,
}

impl Direction {
    pub const ALL: [Direction; 2] = [Direction::ToDevice, Direction::FromDevice];

    fn block(self) -> usize {
        match self {
            Direction::ToDevice => MM2S,
            Direction::FromDevice => S2MM,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::ToDevice => write!(f, "MM2S (to device)"),
            Direction::FromDevice => write!(f, "S2MM (from device)"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransactionStatus {
    NotStarted,
    Programmed,
    Started,
}

/// Host-side record of the transfer programmed on one channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DmaTransaction {
    addr_low: u32,
    addr_high: u32,
    length: u32,
    status: TransactionStatus,
}

impl DmaTransaction {
    fn new() -> DmaTransaction {
        DmaTransaction {
            addr_low: 0,
            addr_high: 0,
            length: 0,
            status: TransactionStatus::NotStarted,
        }
    }

    pub fn addr(&self) -> u64 {
        (u64::from(self.addr_high) << 32) | u64::from(self.addr_low)
    }

    pub fn length(&self) -> usize {
        self.length as usize
    }

    pub fn status(&self) -> TransactionStatus {
        self.status
    }
}

/// Raw register contents of one channel.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct ChannelRegisters {
    pub control: u32,
    pub status: u32,
    pub addr_low: u32,
    pub addr_high: u32,
    pub length: u32,
}

impl fmt::Debug for ChannelRegisters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelRegisters")
            .field("control", &format_args!("{:#010x}", self.control))
            .field("status", &format_args!("{:#010x}", self.status))
            .field("addr_low", &format_args!("{:#010x}", self.addr_low))
            .field("addr_high", &format_args!("{:#010x}", self.addr_high))
            .field("length", &format_args!("{:#x}", self.length))
            .finish()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DmaRegisterDump {
    pub mm2s: ChannelRegisters,
    pub s2mm: ChannelRegisters,
}

/// An AXI DMA in Direct Register Mode.
///
/// Each channel runs one transfer at a time through
/// `program` -> `start` -> `wait`. Calls that break that order return a
/// protocol error and do not touch the hardware.
pub struct DmaEngine<R = PhysMemWindow> {
    regs: R,
    to_dev: DmaTransaction,
    from_dev: DmaTransaction,
}

impl<R: RegisterIo + fmt::Debug> fmt::Debug for DmaEngine<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "DmaEngine")?;
        writeln!(f, "  regs: {:?}", &self.regs)?;
        writeln!(f, "  to_dev: {:?}", &self.to_dev)?;
        write!(f, "  from_dev: {:?}", &self.from_dev)
    }
}

impl DmaEngine<PhysMemWindow> {
    /// Map and reset the engine whose registers live at `phys_addr`.
    pub fn open(phys_addr: u64, len: usize) -> Result<DmaEngine, Error> {
        DmaEngine::map(&PhysMem::open()?, phys_addr, len)
    }

    pub fn open_default() -> Result<DmaEngine, Error> {
        DmaEngine::open(DEFAULT_DMA_BASE, DEFAULT_DMA_LEN)
    }

    /// Map several engines through one handle to the memory device.
    pub fn open_all(blocks: &[(u64, usize)]) -> Result<Vec<DmaEngine>, Error> {
        let mem = PhysMem::open()?;
        blocks
            .iter()
            .map(|&(phys_addr, len)| DmaEngine::map(&mem, phys_addr, len))
            .collect()
    }

    pub fn map(mem: &PhysMem, phys_addr: u64, len: usize) -> Result<DmaEngine, Error> {
        DmaEngine::new(mem.map(phys_addr, len)?)
    }
}

impl<R: RegisterIo> DmaEngine<R> {
    /// Take over a register block: reset both channels and check that the
    /// engine was synthesized without Scatter/Gather support.
    pub fn new(regs: R) -> Result<DmaEngine<R>, Error> {
        let mut engine = DmaEngine {
            regs,
            to_dev: DmaTransaction::new(),
            from_dev: DmaTransaction::new(),
        };
        for direction in Direction::ALL {
            engine.init_channel(direction)?;
        }
        log::debug!("dma engine ready: {:?}", engine.registers());
        Ok(engine)
    }

    fn init_channel(&mut self, direction: Direction) -> Result<(), Error> {
        let b = direction.block();
        *self.transaction_mut(direction) = DmaTransaction::new();

        self.regs.write32(b + DMACR, DMACR_RESET);
        while self.regs.read32(b + DMACR) & DMACR_RESET != 0 {
            std::hint::spin_loop();
        }

        if self.regs.read32(b + DMASR) & DMASR_SG_INCLD != 0 {
            return Err(Error::ScatterGather(direction));
        }
        self.regs.update_bits32(b + DMASR, DMASR_IRQ, 0);
        self.regs.write32(b + ADDR_MSB, 0);
        Ok(())
    }

    pub fn registers_io(&self) -> &R {
        &self.regs
    }

    pub fn into_inner(self) -> R {
        self.regs
    }

    pub fn transaction(&self, direction: Direction) -> &DmaTransaction {
        match direction {
            Direction::ToDevice => &self.to_dev,
            Direction::FromDevice => &self.from_dev,
        }
    }

    fn transaction_mut(&mut self, direction: Direction) -> &mut DmaTransaction {
        match direction {
            Direction::ToDevice => &mut self.to_dev,
            Direction::FromDevice => &mut self.from_dev,
        }
    }

    /// Point the channel at `length` bytes of `buff`, starting at `offset`.
    ///
    /// The range must lie inside a buffer that is still mapped.
    pub fn program(
        &mut self,
        direction: Direction,
        buff: &UdmaBuffer,
        offset: usize,
        length: usize,
    ) -> Result<(), Error> {
        if !buff.is_valid() {
            return Err(Error::BufferReleased(buff.name().to_string()));
        }
        match offset.checked_add(length) {
            Some(end) if end <= buff.size() => {}
            _ => {
                return Err(Error::BufferOverrun {
                    offset,
                    length,
                    size: buff.size(),
                })
            }
        }
        self.program_addr(direction, buff.phys_addr() + offset as u64, length)
    }

    /// Point the channel at `length` bytes at bus address `addr`.
    pub fn program_addr(&mut self, direction: Direction, addr: u64, length: usize) -> Result<(), Error> {
        if self.transaction(direction).status == TransactionStatus::Started {
            return Err(Error::TransactionRunning);
        }
        if length > MAX_TRANSFER_LEN {
            return Err(Error::LengthTooLarge(length));
        }

        let b = direction.block();
        let low = (addr & 0xffff_ffff) as u32;
        let high = (addr >> 32) as u32;
        self.regs.write32(b + ADDR, low);
        self.regs.write32(b + ADDR_MSB, high);
        // address must be in place before the run bit is set
        dmb();

        let trans = self.transaction_mut(direction);
        trans.addr_low = low;
        trans.addr_high = high;
        trans.length = length as u32;
        trans.status = TransactionStatus::Programmed;
        log::trace!("{}: programmed {:#x} bytes at {:#x}", direction, length, addr);
        Ok(())
    }

    /// Arm the channel and hand it the transfer length.
    pub fn start(&mut self, direction: Direction) -> Result<(), Error> {
        let length = match self.transaction(direction).status {
            TransactionStatus::NotStarted => return Err(Error::TransactionNotProgrammed),
            TransactionStatus::Started => return Err(Error::TransactionRunning),
            TransactionStatus::Programmed => self.transaction(direction).length,
        };

        let b = direction.block();
        self.regs.set_bits32(b + DMACR, DMACR_RUN);
        dmb();
        // writing the length kicks off the transfer
        self.regs
            .update_bits32(b + LENGTH, MAX_TRANSFER_LEN as u32, length);
        dmb();

        self.transaction_mut(direction).status = TransactionStatus::Started;
        log::trace!("{}: started", direction);
        Ok(())
    }

    /// Block until the running transfer on `direction` completes.
    pub fn wait(&mut self, direction: Direction, policy: &PollPolicy) -> Result<(), Error> {
        if self.transaction(direction).status != TransactionStatus::Started {
            return Err(Error::TransactionNotStarted);
        }
        let regs = &self.regs;
        let status = direction.block() + DMASR;
        policy.poll_until(|| regs.read32(status) & DMASR_IDLE != 0)?;
        self.complete(direction);
        Ok(())
    }

    #[cfg(feature = "async")]
    pub async fn wait_async(&mut self, direction: Direction, policy: &PollPolicy) -> Result<(), Error> {
        if self.transaction(direction).status != TransactionStatus::Started {
            return Err(Error::TransactionNotStarted);
        }
        let regs = &self.regs;
        let status = direction.block() + DMASR;
        policy
            .poll_until_async(|| regs.read32(status) & DMASR_IDLE != 0)
            .await?;
        self.complete(direction);
        Ok(())
    }

    fn complete(&mut self, direction: Direction) {
        // the idle bit acts as an acquire for the transferred data
        dmb();
        self.transaction_mut(direction).status = TransactionStatus::Programmed;
        log::trace!("{}: complete", direction);
    }

    pub fn is_idle(&self, direction: Direction) -> bool {
        self.regs.read32(direction.block() + DMASR) & DMASR_IDLE != 0
    }

    pub fn is_halted(&self, direction: Direction) -> bool {
        self.regs.read32(direction.block() + DMASR) & DMASR_HALTED != 0
    }

    /// Hardware error bits of the channel's status register.
    pub fn error_status(&self, direction: Direction) -> DmaErrors {
        DmaErrors::decode(self.regs.read32(direction.block() + DMASR))
    }

    /// Bytes moved by the last transfer. For S2MM this is the number of
    /// bytes actually received, which can be less than programmed.
    pub fn transferred_len(&self, direction: Direction) -> usize {
        (self.regs.read32(direction.block() + LENGTH) & MAX_TRANSFER_LEN as u32) as usize
    }

    pub fn registers(&self) -> DmaRegisterDump {
        DmaRegisterDump {
            mm2s: self.channel_registers(Direction::ToDevice),
            s2mm: self.channel_registers(Direction::FromDevice),
        }
    }

    fn channel_registers(&self, direction: Direction) -> ChannelRegisters {
        let b = direction.block();
        ChannelRegisters {
            control: self.regs.read32(b + DMACR),
            status: self.regs.read32(b + DMASR),
            addr_low: self.regs.read32(b + ADDR),
            addr_high: self.regs.read32(b + ADDR_MSB),
            length: self.regs.read32(b + LENGTH),
        }
    }
}
