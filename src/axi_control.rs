use std::fmt;

use crate::dmb;
use crate::phys_mem::PhysMem;
use crate::phys_mem::PhysMemWindow;
use crate::registers::RegisterIo;
use crate::registers::Word;
use crate::Error;
use crate::PollPolicy;

/// Control block of the accelerator in the reference designs.
pub const DEFAULT_CONTROL_BASE: u64 = 0x43C0_0000;
pub const DEFAULT_CONTROL_LEN: usize = 0x1_0000;

const CONTROL: usize = 0x00;
const GLOBAL_INT: usize = 0x04;
const IP_INT: usize = 0x08;
const IP_INT_STATUS: usize = 0x0C;

/// Arguments start right after the four header registers.
pub const ARGS_OFFSET: usize = 0x10;
/// Every argument slot is 8 bytes wide, whatever its type.
pub const ARG_STRIDE: usize = 8;

const AP_START: u32 = 1 << 0;
const AP_DONE: u32 = 1 << 1;
const AP_IDLE: u32 = 1 << 2;
const AP_READY: u32 = 1 << 3;

const GIE: u32 = 1 << 0;
const IP_INT_MASK: u32 = 0b11;

#[derive(Clone, Copy, PartialEq, Eq)]
pub struct ControlRegisterDump {
    pub control: u32,
    pub global_int: u32,
    pub ip_int: u32,
    pub ip_int_status: u32,
}

impl fmt::Debug for ControlRegisterDump {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControlRegisterDump")
            .field("control", &format_args!("{:#x}", self.control))
            .field("global_int", &format_args!("{:#x}", self.global_int))
            .field("ip_int", &format_args!("{:#x}", self.ip_int))
            .field("ip_int_status", &format_args!("{:#x}", self.ip_int_status))
            .finish()
    }
}

/// AXI-Lite control interface of an accelerator: scalar arguments plus the
/// `ap_start` handshake. Completion is polled, interrupts are disabled.
pub struct ControlInterface<R = PhysMemWindow> {
    regs: R,
}

impl<R: RegisterIo + fmt::Debug> fmt::Debug for ControlInterface<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ControlInterface")?;
        write!(f, "  regs: {:?}", &self.regs)
    }
}

impl ControlInterface<PhysMemWindow> {
    /// Map the control block at `phys_addr`. Zero address or length select
    /// [`DEFAULT_CONTROL_BASE`] and [`DEFAULT_CONTROL_LEN`].
    pub fn open(phys_addr: u64, len: usize) -> Result<ControlInterface, Error> {
        ControlInterface::map(&PhysMem::open()?, phys_addr, len)
    }

    pub fn map(mem: &PhysMem, phys_addr: u64, len: usize) -> Result<ControlInterface, Error> {
        let phys_addr = if phys_addr == 0 { DEFAULT_CONTROL_BASE } else { phys_addr };
        let len = if len == 0 { DEFAULT_CONTROL_LEN } else { len };
        ControlInterface::new(mem.map(phys_addr, len)?)
    }
}

impl<R: RegisterIo> ControlInterface<R> {
    /// Disable and acknowledge interrupts, then make sure the accelerator is
    /// not already running.
    pub fn new(regs: R) -> Result<ControlInterface<R>, Error> {
        regs.clear_bits32(GLOBAL_INT, GIE);
        regs.clear_bits32(IP_INT, IP_INT_MASK);
        let pending = regs.read32(IP_INT_STATUS) & IP_INT_MASK;
        if pending != 0 {
            // toggle on write
            regs.write32(IP_INT_STATUS, pending);
        }

        let intf = ControlInterface { regs };
        if !intf.is_ready() {
            return Err(Error::KernelNotReady(intf.regs.read32(CONTROL)));
        }
        log::debug!("control interface ready: {:?}", intf.registers());
        Ok(intf)
    }

    pub fn registers_io(&self) -> &R {
        &self.regs
    }

    pub fn into_inner(self) -> R {
        self.regs
    }

    fn slot(slot: usize) -> usize {
        ARGS_OFFSET + ARG_STRIDE * slot
    }

    /// Write argument `slot`. The accelerator's argument count is not
    /// checked; only the mapped window bounds the access.
    pub fn set_argument<T: Word>(&mut self, slot: usize, value: T) {
        self.regs.write(Self::slot(slot), value);
    }

    pub fn argument<T: Word>(&self, slot: usize) -> T {
        self.regs.read(Self::slot(slot))
    }

    /// Number of argument slots the mapped window can hold.
    pub fn slots(&self) -> usize {
        self.regs.len().saturating_sub(ARGS_OFFSET) / ARG_STRIDE
    }

    pub fn start(&mut self) {
        // arguments must land before ap_start
        dmb();
        self.regs.set_bits32(CONTROL, AP_START);
        dmb();
        log::trace!("accelerator started");
    }

    /// Block until the accelerator drops `ap_start`.
    pub fn wait(&mut self, policy: &PollPolicy) -> Result<(), Error> {
        let regs = &self.regs;
        policy.poll_until(|| regs.read32(CONTROL) & AP_START == 0)?;
        dmb();
        log::trace!("accelerator finished");
        Ok(())
    }

    #[cfg(feature = "async")]
    pub async fn wait_async(&mut self, policy: &PollPolicy) -> Result<(), Error> {
        let regs = &self.regs;
        policy
            .poll_until_async(|| regs.read32(CONTROL) & AP_START == 0)
            .await?;
        dmb();
        Ok(())
    }

    /// Not running, so a new run can be started.
    pub fn is_ready(&self) -> bool {
        self.regs.read32(CONTROL) & AP_START == 0
    }

    /// `ap_done`; cleared by the hardware when read.
    pub fn is_done(&self) -> bool {
        self.regs.read32(CONTROL) & AP_DONE != 0
    }

    pub fn is_idle(&self) -> bool {
        self.regs.read32(CONTROL) & AP_IDLE != 0
    }

    /// `ap_ready`: the accelerator accepts new inputs.
    pub fn accepts_input(&self) -> bool {
        self.regs.read32(CONTROL) & AP_READY != 0
    }

    pub fn registers(&self) -> ControlRegisterDump {
        ControlRegisterDump {
            control: self.regs.read32(CONTROL),
            global_int: self.regs.read32(GLOBAL_INT),
            ip_int: self.regs.read32(IP_INT),
            ip_int_status: self.regs.read32(IP_INT_STATUS),
        }
    }
}
