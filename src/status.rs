use bitflags::bitflags;
use std::fmt;

bitflags! {
    /// Error bits of an AXI DMA status register (DMASR).
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct DmaErrors: u32 {
        const DMA_INTERNAL = 1 << 4;
        const DMA_SLAVE = 1 << 5;
        const DMA_DECODE = 1 << 6;
        const SG_INTERNAL = 1 << 8;
        const SG_SLAVE = 1 << 9;
        const SG_DECODE = 1 << 10;
    }
}

const NAMES: [(DmaErrors, &str); 6] = [
    (DmaErrors::DMA_INTERNAL, "DMAIntErr"),
    (DmaErrors::DMA_SLAVE, "DMASlvErr"),
    (DmaErrors::DMA_DECODE, "DMADecErr"),
    (DmaErrors::SG_INTERNAL, "SGIntErr"),
    (DmaErrors::SG_SLAVE, "SGSlvErr"),
    (DmaErrors::SG_DECODE, "SGDecErr"),
];

impl DmaErrors {
    /// Keep only the error subfield of a raw DMASR value.
    pub fn decode(status: u32) -> DmaErrors {
        DmaErrors::from_bits_truncate(status)
    }

    pub fn names(self) -> impl Iterator<Item = &'static str> {
        NAMES
            .iter()
            .filter(move |(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
    }

    /// Errors raised on the data path of the transfer itself.
    pub fn transfer(self) -> DmaErrors {
        self & (DmaErrors::DMA_INTERNAL | DmaErrors::DMA_SLAVE | DmaErrors::DMA_DECODE)
    }

    /// Errors raised while fetching descriptors.
    pub fn descriptor(self) -> DmaErrors {
        self & (DmaErrors::SG_INTERNAL | DmaErrors::SG_SLAVE | DmaErrors::SG_DECODE)
    }
}

impl fmt::Display for DmaErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "no error");
        }
        for (i, name) in self.names().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", name)?;
        }
        Ok(())
    }
}
