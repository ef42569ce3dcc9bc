//! Userspace access to AXI DMA engines and AXI-Lite accelerators on Zynq-style
//! SoCs.
//!
//! Buffers come from the u-dma-buf kernel module, register blocks are mapped
//! from `/dev/mem`, and all completion is polled.

mod axi_control;
mod axi_dma;
mod dma_buffer;
mod dmb;
mod error;
mod phys_mem;
mod poll;
mod registers;
mod status;
mod udma;

pub use axi_control::ControlInterface;
pub use axi_control::ControlRegisterDump;
pub use axi_control::ARGS_OFFSET;
pub use axi_control::ARG_STRIDE;
pub use axi_control::DEFAULT_CONTROL_BASE;
pub use axi_control::DEFAULT_CONTROL_LEN;

pub use axi_dma::ChannelRegisters;
pub use axi_dma::Direction;
pub use axi_dma::DmaEngine;
pub use axi_dma::DmaRegisterDump;
pub use axi_dma::DmaTransaction;
pub use axi_dma::TransactionStatus;
pub use axi_dma::DEFAULT_DMA_BASE;
pub use axi_dma::DEFAULT_DMA_LEN;
pub use axi_dma::MAX_TRANSFER_LEN;

pub use dma_buffer::UdmaBuffer;
pub use dmb::dmb;
pub use error::Error;
pub use error::Result;
pub use phys_mem::PhysMem;
pub use phys_mem::PhysMemWindow;
pub use phys_mem::DEV_MEM;
pub use poll::CancelToken;
pub use poll::PollPolicy;
pub use registers::RegisterIo;
pub use registers::Word;
pub use status::DmaErrors;
pub use udma::UdmaBufferManager;
pub use udma::UdmaConfig;
