mod common;

use axi_dmabuf::UdmaBufferManager;

#[test]
fn load_then_unload_leaves_nothing_behind() {
    for n in 0..4 {
        let (dir, config) = common::fake_udmabuf();
        let mut udma = UdmaBufferManager::new(config);
        let sizes: Vec<usize> = (0..n).map(|i| 4096 << i).collect();

        let mut buffers = udma.load(&sizes).unwrap();
        assert_eq!(buffers.len(), n);
        assert_eq!(udma.is_module_loaded().unwrap(), n > 0);
        for (i, b) in buffers.iter().enumerate() {
            assert_eq!(b.index(), i);
            assert_eq!(b.size(), sizes[i]);
            assert!(dir.path().join("dev").join(b.name()).exists());
        }

        udma.unload(&mut buffers).unwrap();
        assert!(buffers.iter().all(|b| !b.is_valid()));
        assert!(!udma.is_module_loaded().unwrap());
        let devices = std::fs::read_dir(dir.path().join("dev")).unwrap().count();
        assert_eq!(devices, 0, "device files left after unloading {} buffers", n);
    }
}

#[test]
fn buffers_released_early_are_skipped() {
    let (_dir, config) = common::fake_udmabuf();
    let mut udma = UdmaBufferManager::new(config);
    let mut buffers = udma.load(&[4096, 4096, 4096]).unwrap();
    assert!(buffers[1].release());
    udma.unload(&mut buffers).unwrap();
    assert!(buffers.iter().all(|b| !b.is_valid()));
}

#[test]
fn physical_addresses_are_distinct_and_stable() {
    let (_dir, config) = common::fake_udmabuf();
    let mut udma = UdmaBufferManager::new(config);
    let mut buffers = udma.load(&[4096, 4096]).unwrap();
    let before: Vec<u64> = buffers.iter().map(|b| b.phys_addr()).collect();
    assert_ne!(before[0], before[1]);
    buffers[0].slice_mut::<u64>()[0] = 1;
    let after: Vec<u64> = buffers.iter().map(|b| b.phys_addr()).collect();
    assert_eq!(before, after);
    udma.unload(&mut buffers).unwrap();
}
