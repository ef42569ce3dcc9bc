//! Runs the vector-sum accelerator: `out = a * in1 + b * in2 + c`.
//!
//! The first AXI DMA streams `in1` and collects `out`, the second streams
//! `in2`. The accelerator's control block is at the default address.

use axi_dmabuf::ControlInterface;
use axi_dmabuf::Direction;
use axi_dmabuf::DmaEngine;
use axi_dmabuf::PollPolicy;
use axi_dmabuf::UdmaBufferManager;
use axi_dmabuf::UdmaConfig;
use axi_dmabuf::DEFAULT_CONTROL_LEN;
use axi_dmabuf::DEFAULT_DMA_LEN;
use std::error::Error;

const NUM_VALUES: usize = 256;
const BUFSIZE: usize = NUM_VALUES * 4;
const A: i32 = 1;
const B: i32 = 52;
const C: i32 = 4;

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let mut udma = UdmaBufferManager::new(UdmaConfig::default());
    let mut buffers = udma.load(&[BUFSIZE, BUFSIZE, BUFSIZE])?;
    println!("DMA buffers created");

    let mut engines = DmaEngine::open_all(&[
        (0x4040_0000, DEFAULT_DMA_LEN),
        (0x4041_0000, DEFAULT_DMA_LEN),
    ])?;
    println!("DMA engines created");

    let mut vec_sum = ControlInterface::open(0x43C0_0000, DEFAULT_CONTROL_LEN)?;
    println!("vector sum interface created");

    for (i, v) in buffers[0].slice_mut::<i32>().iter_mut().enumerate() {
        *v = i as i32;
    }
    for (i, v) in buffers[1].slice_mut::<i32>().iter_mut().enumerate() {
        *v = NUM_VALUES as i32 - i as i32;
    }
    buffers[2].slice_mut::<i32>().iter_mut().for_each(|v| *v = 0);

    vec_sum.set_argument(0, NUM_VALUES as u32);
    vec_sum.set_argument(1, A);
    vec_sum.set_argument(2, B);
    vec_sum.set_argument(3, C);

    let (dma0, rest) = engines.split_at_mut(1);
    let (dma0, dma1) = (&mut dma0[0], &mut rest[0]);

    dma0.program(Direction::FromDevice, &buffers[2], 0, BUFSIZE)?;
    dma0.start(Direction::FromDevice)?;
    dma0.program(Direction::ToDevice, &buffers[0], 0, BUFSIZE)?;
    dma0.start(Direction::ToDevice)?;
    dma1.program(Direction::ToDevice, &buffers[1], 0, BUFSIZE)?;
    dma1.start(Direction::ToDevice)?;

    println!("starting kernel: {:?}", vec_sum.registers());
    vec_sum.start();
    vec_sum.wait(&PollPolicy::busy())?;
    println!("kernel done");

    dma0.wait(Direction::ToDevice, &PollPolicy::busy())?;
    dma1.wait(Direction::ToDevice, &PollPolicy::busy())?;
    dma0.wait(Direction::FromDevice, &PollPolicy::busy())?;

    let in1 = buffers[0].slice::<i32>();
    let in2 = buffers[1].slice::<i32>();
    let out = buffers[2].slice::<i32>();
    let mut err = false;
    for i in 0..NUM_VALUES {
        let oracle = in1[i] * A + in2[i] * B + C;
        if out[i] != oracle {
            err = true;
            println!("ERROR in position {}: {} instead of {}", i, out[i], oracle);
        }
    }
    if !err {
        println!("no errors found");
    }

    drop(vec_sum);
    drop(engines);
    udma.unload(&mut buffers)?;
    Ok(())
}
