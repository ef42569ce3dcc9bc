use axi_dmabuf::Direction;
use axi_dmabuf::DmaEngine;
use axi_dmabuf::PollPolicy;
use axi_dmabuf::UdmaBufferManager;
use axi_dmabuf::UdmaConfig;
use std::error::Error;
use std::time::Duration;

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let mut udma = UdmaBufferManager::new(UdmaConfig::default());
    let mut buffers = udma.load(&[4096, 4096])?;

    let items = 1024;
    for v in buffers[0].slice_mut::<u32>()[..items].iter_mut() {
        *v = fastrand::u32(0..1024);
    }
    buffers[1].slice_mut::<u32>().iter_mut().for_each(|v| *v = 0);

    let mut dma = DmaEngine::open_default()?;
    let policy = PollPolicy::every(Duration::from_micros(50)).with_timeout(Duration::from_secs(1));

    async_io::block_on(async {
        dma.program(Direction::FromDevice, &buffers[1], 0, items * 4)?;
        dma.start(Direction::FromDevice)?;
        dma.program(Direction::ToDevice, &buffers[0], 0, items * 4)?;
        dma.start(Direction::ToDevice)?;
        println!("transfers started");

        dma.wait_async(Direction::ToDevice, &policy).await?;
        println!("to device done");
        dma.wait_async(Direction::FromDevice, &policy).await?;
        println!("from device done");
        Result::<(), axi_dmabuf::Error>::Ok(())
    })?;

    let src = &buffers[0].slice::<u32>()[..items];
    let dst = &buffers[1].slice::<u32>()[..items];
    assert_eq!(src, dst);

    drop(dma);
    udma.unload(&mut buffers)?;
    Ok(())
}
