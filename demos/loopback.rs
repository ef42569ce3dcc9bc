//! Passthrough test for a design whose AXI DMA has its MM2S stream looped
//! back into S2MM. Needs root for `/dev/mem` and the udmabuf module.

use axi_dmabuf::Direction;
use axi_dmabuf::DmaEngine;
use axi_dmabuf::PollPolicy;
use axi_dmabuf::UdmaBufferManager;
use axi_dmabuf::UdmaConfig;
use std::error::Error;

const BUFSIZE: usize = 1024 * 4;

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let mut udma = UdmaBufferManager::new(UdmaConfig::default());
    let mut buffers = udma.load(&[BUFSIZE, BUFSIZE])?;
    println!("{:?}", buffers[0]);
    println!("{:?}", buffers[1]);

    let mut dma = DmaEngine::open_default()?;
    println!("{:?}", dma);

    for (i, v) in buffers[0].slice_mut::<i32>().iter_mut().enumerate() {
        *v = i as i32 + 1;
    }
    buffers[1].slice_mut::<i32>().iter_mut().for_each(|v| *v = 0);

    dma.program(Direction::FromDevice, &buffers[1], 0, BUFSIZE)?;
    dma.start(Direction::FromDevice)?;
    println!("transfer from device started");

    dma.program(Direction::ToDevice, &buffers[0], 0, BUFSIZE)?;
    dma.start(Direction::ToDevice)?;
    println!("transfer to device started");
    println!("{:#?}", dma.registers());

    dma.wait(Direction::ToDevice, &PollPolicy::busy())?;
    println!("to device done");
    dma.wait(Direction::FromDevice, &PollPolicy::busy())?;
    println!("from device done");
    println!("{:#?}", dma.registers());

    for d in Direction::ALL {
        let errors = dma.error_status(d);
        if !errors.is_empty() {
            println!("{}: {}", d, errors);
        }
    }

    let src = buffers[0].slice::<i32>();
    let dst = buffers[1].slice::<i32>();
    let mut mismatches = 0;
    for (i, (a, b)) in src.iter().zip(dst).enumerate() {
        if a != b {
            mismatches += 1;
            println!("ERROR in position {}: {} instead of {}", i, b, a);
        }
    }
    if mismatches == 0 {
        println!("no errors found");
    }

    drop(dma);
    udma.unload(&mut buffers)?;
    Ok(())
}
