//! Allocation of u-dma-buf buffers through the `udmabuf` kernel module.
//!
//! The module creates one buffer per `udmabuf<N>=<size>` parameter. Each
//! buffer shows up as `/dev/udmabuf<N>` and is configured through plain text
//! attributes under `/sys/class/udmabuf/udmabuf<N>/`.

use std::fs;
use std::path::PathBuf;
use std::process::Command;

use crate::Error;
use crate::UdmaBuffer;

/// Where the module and its buffers live, and how to (un)load it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UdmaConfig {
    /// Kernel object handed to the insert command.
    pub module_path: PathBuf,
    /// Module name as listed in `modules_list`; buffers are `<name><N>`.
    pub module_name: String,
    pub device_dir: PathBuf,
    pub class_dir: PathBuf,
    pub modules_list: PathBuf,
    /// Program and leading arguments, followed by the module path and the
    /// size parameters.
    pub insert_command: Vec<String>,
    /// Program and leading arguments, followed by the module name.
    pub remove_command: Vec<String>,
    /// Written to `sync_mode`. 1 disables the CPU cache for `O_SYNC` opens.
    pub sync_mode: u32,
    /// Written to `sync_direction`. 0 is `DMA_BIDIRECTIONAL`.
    pub sync_direction: u32,
}

impl Default for UdmaConfig {
    fn default() -> UdmaConfig {
        UdmaConfig {
            module_path: PathBuf::from("../udmabuf/udmabuf.ko"),
            module_name: "udmabuf".to_string(),
            device_dir: PathBuf::from("/dev"),
            class_dir: PathBuf::from("/sys/class/udmabuf"),
            modules_list: PathBuf::from("/proc/modules"),
            insert_command: vec!["insmod".to_string()],
            remove_command: vec!["rmmod".to_string()],
            sync_mode: 1,
            sync_direction: 0,
        }
    }
}

impl UdmaConfig {
    pub fn with_module_path(mut self, path: impl Into<PathBuf>) -> UdmaConfig {
        self.module_path = path.into();
        self
    }

    pub fn with_insert_command<S: Into<String>>(mut self, cmd: impl IntoIterator<Item = S>) -> UdmaConfig {
        self.insert_command = cmd.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_remove_command<S: Into<String>>(mut self, cmd: impl IntoIterator<Item = S>) -> UdmaConfig {
        self.remove_command = cmd.into_iter().map(Into::into).collect();
        self
    }

    pub fn buffer_name(&self, index: usize) -> String {
        format!("{}{}", self.module_name, index)
    }

    fn attribute(&self, index: usize, attr: &str) -> PathBuf {
        self.class_dir.join(self.buffer_name(index)).join(attr)
    }
}

fn command(words: &[String]) -> Option<Command> {
    let (program, args) = words.split_first()?;
    let mut cmd = Command::new(program);
    cmd.args(args);
    Some(cmd)
}

/// Loads the `udmabuf` module sized for a set of buffers and hands out the
/// mapped buffers.
///
/// Loading and unloading the module is visible to every process on the
/// system; only one manager should drive it at a time.
#[derive(Debug, Default)]
pub struct UdmaBufferManager {
    config: UdmaConfig,
}

impl UdmaBufferManager {
    pub fn new(config: UdmaConfig) -> UdmaBufferManager {
        UdmaBufferManager { config }
    }

    pub fn config(&self) -> &UdmaConfig {
        &self.config
    }

    /// Allocate one buffer per entry of `sizes`, in bytes.
    ///
    /// A module that is already loaded is removed first, so buffers from an
    /// earlier load must not be in use.
    pub fn load(&mut self, sizes: &[usize]) -> Result<Vec<UdmaBuffer>, Error> {
        if sizes.is_empty() {
            return Ok(Vec::new());
        }
        self.remove_module()?;
        self.insert_module(sizes)?;

        let buffers = sizes
            .iter()
            .enumerate()
            .map(|(i, &size)| self.open_buffer(i, size))
            .collect::<Result<Vec<_>, _>>();
        // opened buffers are dropped (unmapped) before the module goes away
        let buffers = match buffers {
            Ok(b) => b,
            Err(e) => {
                if let Err(r) = self.remove_module() {
                    log::warn!("cleanup after failed load: {}", r);
                }
                return Err(e);
            }
        };
        for b in &buffers {
            log::debug!("{:?}", b);
        }
        Ok(buffers)
    }

    fn open_buffer(&self, index: usize, size: usize) -> Result<UdmaBuffer, Error> {
        let sync_mode = self.config.attribute(index, "sync_mode");
        fs::write(&sync_mode, self.config.sync_mode.to_string())
            .map_err(|e| Error::file(&sync_mode, e))?;

        let sync_direction = self.config.attribute(index, "sync_direction");
        fs::write(&sync_direction, self.config.sync_direction.to_string())
            .map_err(|e| Error::file(&sync_direction, e))?;

        let name = self.config.buffer_name(index);
        let dev = self.config.device_dir.join(&name);

        let phys_f = self.config.attribute(index, "phys_addr");
        let buff = fs::read_to_string(&phys_f).map_err(|e| Error::file(&phys_f, e))?;
        let buff = buff.trim().trim_start_matches("0x");
        let phys_addr = u64::from_str_radix(buff, 16).map_err(|e| Error::Attribute {
            path: phys_f,
            source: e,
        })?;

        UdmaBuffer::open(index, name, &dev, size, phys_addr)
    }

    /// Release every buffer that is still mapped, then remove the module.
    ///
    /// Buffers that were already released are skipped. Failing to remove the
    /// module is logged and returned, but leaves nothing else behind.
    pub fn unload(&mut self, buffers: &mut [UdmaBuffer]) -> Result<(), Error> {
        for b in buffers.iter_mut() {
            b.release();
        }
        self.remove_module().map_err(|e| {
            log::warn!("{}", e);
            e
        })
    }

    pub fn is_module_loaded(&self) -> Result<bool, Error> {
        let list = &self.config.modules_list;
        let modules = fs::read_to_string(list).map_err(|e| Error::file(list, e))?;
        Ok(modules
            .lines()
            .filter_map(|l| l.split_whitespace().next())
            .any(|m| m == self.config.module_name))
    }

    /// Insert the module with one `<name><N>=<size>` parameter per buffer.
    pub fn insert_module(&mut self, sizes: &[usize]) -> Result<(), Error> {
        let mut cmd = command(&self.config.insert_command)
            .ok_or_else(|| Error::ModuleInsert(self.config.module_name.clone()))?;
        cmd.arg(&self.config.module_path);
        cmd.args(
            sizes
                .iter()
                .enumerate()
                .map(|(i, size)| format!("{}={}", self.config.buffer_name(i), size)),
        );
        log::info!("running: {:?}", cmd);
        if !cmd.status()?.success() {
            return Err(Error::ModuleInsert(self.config.module_name.clone()));
        }
        Ok(())
    }

    /// Remove the module. Succeeds without running anything if it is not
    /// loaded.
    pub fn remove_module(&mut self) -> Result<(), Error> {
        if !self.is_module_loaded()? {
            return Ok(());
        }
        let mut cmd = command(&self.config.remove_command)
            .ok_or_else(|| Error::ModuleRemove(self.config.module_name.clone()))?;
        cmd.arg(&self.config.module_name);
        log::info!("running: {:?}", cmd);
        if !cmd.status()?.success() {
            return Err(Error::ModuleRemove(self.config.module_name.clone()));
        }
        Ok(())
    }
}
