//! Sega Master System main system implementation

use crate::bus::{BankState, SmsBus};
use crate::cartridge::Cartridge;
use crate::config::SmsConfig;
use crate::vdp::{FrameCallback, Vdp, VdpState};
use emu_core::apu::sn76489::BlockCallback;
use emu_core::apu::{AudioChip, Sn76489Psg};
use emu_core::cpu_z80::{CpuZ80, CpuZ80State};
use emu_core::renderer::Renderer;
use emu_core::types::Frame;
use emu_core::{MountPointInfo, System};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cell::RefCell;
use std::rc::Rc;
use thiserror::Error;

pub const CARTRIDGE_MOUNT: &str = "Cartridge";

/// SMS emulator errors
#[derive(Debug, Error)]
pub enum SmsError {
    #[error("Invalid mount point")]
    InvalidMountPoint,
    #[error("ROM size {len} is not a multiple of 16KB")]
    InvalidRomSize { len: usize },
    #[error("ROM image is empty")]
    EmptyRom,
    #[error("No cartridge loaded")]
    NoCartridge,
    #[error("Invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
}

/// Save state layout; cartridge contents are never included
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SmsState {
    version: u32,
    cpu: CpuZ80State,
    vdp: VdpState,
    banks: BankState,
}

const STATE_VERSION: u32 = 1;

/// Sega Master System emulator
///
/// The CPU, bus, cartridge, VDP and PSG are built together from a ROM image.
/// Resetting rebuilds the whole graph from the same image.
pub struct SmsSystem {
    config: SmsConfig,

    // None until a cartridge is mounted
    cpu: Option<CpuZ80<SmsBus>>,
    image: Option<Vec<u8>>,

    // Shared components
    vdp: Rc<RefCell<Vdp>>,
    psg: Rc<RefCell<Sn76489Psg>>,

    // Host callbacks, reattached whenever the graph is rebuilt
    frame_callback: Option<Rc<RefCell<FrameCallback>>>,
    audio_callback: Option<Rc<RefCell<BlockCallback>>>,
}

impl SmsSystem {
    /// Create a new SMS system with default configuration
    pub fn new() -> Self {
        Self::with_config(SmsConfig::default())
    }

    pub fn with_config(config: SmsConfig) -> Self {
        let vdp = Rc::new(RefCell::new(Vdp::new(config.timing)));
        let psg = Rc::new(RefCell::new(Sn76489Psg::new(
            config.timing,
            config.sample_rate,
        )));
        Self {
            config,
            cpu: None,
            image: None,
            vdp,
            psg,
            frame_callback: None,
            audio_callback: None,
        }
    }

    pub fn config(&self) -> &SmsConfig {
        &self.config
    }

    /// Load a ROM image and power on
    pub fn load_rom(&mut self, image: &[u8]) -> Result<(), SmsError> {
        self.build(image)?;
        self.image = Some(image.to_vec());
        Ok(())
    }

    /// Construct CPU, bus, cartridge, VDP and PSG from `image`
    fn build(&mut self, image: &[u8]) -> Result<(), SmsError> {
        let cartridge = Cartridge::load(image)?;
        self.rebuild_peripherals();

        let bus = SmsBus::new(cartridge, Rc::clone(&self.vdp), Rc::clone(&self.psg));
        self.cpu = Some(CpuZ80::new(bus));
        Ok(())
    }

    fn rebuild_peripherals(&mut self) {
        self.vdp = Rc::new(RefCell::new(Vdp::new(self.config.timing)));
        self.psg = Rc::new(RefCell::new(Sn76489Psg::new(
            self.config.timing,
            self.config.sample_rate,
        )));
        self.attach_callbacks();
    }

    /// Called with each completed frame while the display is enabled
    pub fn set_frame_callback(&mut self, callback: FrameCallback) {
        self.frame_callback = Some(Rc::new(RefCell::new(callback)));
        self.attach_callbacks();
    }

    /// Called with each completed block of audio samples
    pub fn set_audio_callback(&mut self, callback: BlockCallback) {
        self.audio_callback = Some(Rc::new(RefCell::new(callback)));
        self.attach_callbacks();
    }

    fn attach_callbacks(&mut self) {
        if let Some(shared) = &self.frame_callback {
            let shared = Rc::clone(shared);
            self.vdp
                .borrow_mut()
                .set_frame_callback(Box::new(move |frame: &Frame| {
                    let mut callback = shared.borrow_mut();
                    (&mut **callback)(frame)
                }));
        }
        if let Some(shared) = &self.audio_callback {
            let shared = Rc::clone(shared);
            self.psg
                .borrow_mut()
                .set_block_callback(Box::new(move |samples: &[f32]| {
                    let mut callback = shared.borrow_mut();
                    (&mut **callback)(samples)
                }));
        }
    }

    /// Run one CPU step, then clock the PSG and VDP by the same cycle count
    pub fn step(&mut self) -> Result<u32, SmsError> {
        let cpu = self.cpu.as_mut().ok_or(SmsError::NoCartridge)?;
        let cycles = cpu.step();
        self.psg.borrow_mut().update(cycles);
        self.vdp.borrow_mut().update(cycles);
        Ok(cycles)
    }

    pub fn cpu(&self) -> Option<&CpuZ80<SmsBus>> {
        self.cpu.as_ref()
    }

    pub fn vdp(&self) -> std::cell::Ref<'_, Vdp> {
        self.vdp.borrow()
    }

    /// Set controller 1 state (active low)
    pub fn set_controller_1(&mut self, state: u8) {
        if let Some(cpu) = self.cpu.as_mut() {
            cpu.memory.set_controller_1(state);
        }
    }

    /// Set controller 2 state (active low)
    pub fn set_controller_2(&mut self, state: u8) {
        if let Some(cpu) = self.cpu.as_mut() {
            cpu.memory.set_controller_2(state);
        }
    }

    /// Pause button level
    pub fn set_pause(&mut self, pressed: bool) {
        if let Some(cpu) = self.cpu.as_mut() {
            cpu.memory.set_pause(pressed);
        }
    }

    /// Drain audio samples produced since the last call
    pub fn take_audio_samples(&mut self) -> Vec<f32> {
        self.psg.borrow_mut().take_samples()
    }
}

impl Default for SmsSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl System for SmsSystem {
    type Error = SmsError;

    fn reset(&mut self) {
        match self.image.take() {
            Some(image) => {
                // The image already loaded once, so this cannot fail
                if self.build(&image).is_err() {
                    self.cpu = None;
                }
                self.image = Some(image);
            }
            None => self.rebuild_peripherals(),
        }
    }

    fn step_frame(&mut self) -> Result<Frame, Self::Error> {
        let start = self.vdp.borrow().frame_count();
        while self.vdp.borrow().frame_count() == start {
            self.step()?;
        }
        Ok(self.vdp.borrow().get_frame().clone())
    }

    fn save_state(&self) -> Value {
        match &self.cpu {
            Some(cpu) => {
                let state = SmsState {
                    version: STATE_VERSION,
                    cpu: cpu.state(),
                    vdp: self.vdp.borrow().state(),
                    banks: cpu.memory.bank_state(),
                };
                serde_json::to_value(state).unwrap_or_default()
            }
            None => serde_json::json!({ "version": STATE_VERSION }),
        }
    }

    fn load_state(&mut self, v: &Value) -> Result<(), serde_json::Error> {
        let state: SmsState = serde_json::from_value(v.clone())?;
        if let Some(cpu) = self.cpu.as_mut() {
            cpu.restore(state.cpu);
            cpu.memory.restore_banks(state.banks);
            self.vdp.borrow_mut().restore(&state.vdp);
        }
        Ok(())
    }

    fn supports_save_states(&self) -> bool {
        true
    }

    fn mount_points(&self) -> Vec<MountPointInfo> {
        vec![MountPointInfo {
            id: CARTRIDGE_MOUNT.to_string(),
            name: "Cartridge Slot".to_string(),
            extensions: vec!["sms".to_string(), "bin".to_string()],
            required: true,
        }]
    }

    fn mount(&mut self, mount_point_id: &str, data: &[u8]) -> Result<(), Self::Error> {
        if mount_point_id == CARTRIDGE_MOUNT {
            self.load_rom(data)
        } else {
            Err(SmsError::InvalidMountPoint)
        }
    }

    fn unmount(&mut self, mount_point_id: &str) -> Result<(), Self::Error> {
        if mount_point_id == CARTRIDGE_MOUNT {
            self.cpu = None;
            self.image = None;
            Ok(())
        } else {
            Err(SmsError::InvalidMountPoint)
        }
    }

    fn is_mounted(&self, mount_point_id: &str) -> bool {
        mount_point_id == CARTRIDGE_MOUNT && self.cpu.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cartridge::PAGE_SIZE;

    /// 16KB ROM: DI; IM 1; spin
    fn spin_rom() -> Vec<u8> {
        let mut rom = vec![0; PAGE_SIZE];
        rom[..5].copy_from_slice(&[0xF3, 0xED, 0x56, 0x18, 0xFE]);
        rom
    }

    #[test]
    fn test_system_creation() {
        let sys = SmsSystem::new();
        assert!(!sys.is_mounted(CARTRIDGE_MOUNT));
        assert!(sys.cpu().is_none());
        assert_eq!(sys.config().sample_rate, 44_100);
    }

    #[test]
    fn test_step_without_cartridge() {
        let mut sys = SmsSystem::new();
        assert!(matches!(sys.step(), Err(SmsError::NoCartridge)));
        assert!(matches!(sys.step_frame(), Err(SmsError::NoCartridge)));
    }

    #[test]
    fn test_mount_points() {
        let mut sys = SmsSystem::new();
        let mp = sys.mount_points();
        assert_eq!(mp.len(), 1);
        assert_eq!(mp[0].id, "Cartridge");
        assert!(mp[0].extensions.contains(&"sms".to_string()));

        assert!(matches!(
            sys.mount("Tape", &spin_rom()),
            Err(SmsError::InvalidMountPoint)
        ));
        assert!(sys.mount(CARTRIDGE_MOUNT, &spin_rom()).is_ok());
        assert!(sys.is_mounted(CARTRIDGE_MOUNT));
        assert!(sys.unmount(CARTRIDGE_MOUNT).is_ok());
        assert!(!sys.is_mounted(CARTRIDGE_MOUNT));
    }

    #[test]
    fn test_mount_rejects_bad_rom() {
        let mut sys = SmsSystem::new();
        assert!(matches!(
            sys.mount(CARTRIDGE_MOUNT, &[0; 100]),
            Err(SmsError::InvalidRomSize { len: 100 })
        ));
        assert!(!sys.is_mounted(CARTRIDGE_MOUNT));
    }

    #[test]
    fn test_step_clocks_peripherals() {
        let mut sys = SmsSystem::new();
        sys.load_rom(&spin_rom()).unwrap();
        let mut total = 0;
        while total < 228 {
            total += sys.step().unwrap();
        }
        assert_eq!(sys.vdp().vcounter(), 1);
    }

    #[test]
    fn test_step_frame_runs_one_frame() {
        let mut sys = SmsSystem::new();
        sys.load_rom(&spin_rom()).unwrap();
        let frame = sys.step_frame().unwrap();
        assert_eq!(frame.width, 256);
        assert_eq!(frame.height, 192);
        assert_eq!(sys.vdp().frame_count(), 1);
        assert!(!sys.take_audio_samples().is_empty());
    }

    #[test]
    fn test_reset_rebuilds_machine() {
        let mut sys = SmsSystem::new();
        sys.load_rom(&spin_rom()).unwrap();
        sys.step_frame().unwrap();
        sys.reset();
        assert_eq!(sys.cpu().map(|cpu| cpu.regs.pc), Some(0));
        assert_eq!(sys.vdp().frame_count(), 0);
        assert!(sys.is_mounted(CARTRIDGE_MOUNT));
    }

    #[test]
    fn test_save_load_state() {
        let mut sys = SmsSystem::new();
        sys.load_rom(&spin_rom()).unwrap();
        for _ in 0..10 {
            sys.step().unwrap();
        }
        let saved = sys.save_state();
        assert!(saved.get("cpu").is_some());
        assert!(saved.get("rom").is_none());
        let pc = sys.cpu().map(|cpu| cpu.regs.pc);

        sys.reset();
        assert!(sys.load_state(&saved).is_ok());
        assert_eq!(sys.cpu().map(|cpu| cpu.regs.pc), pc);
        assert!(sys.supports_save_states());
    }

    #[test]
    fn test_callbacks_survive_reset() {
        let frames = Rc::new(RefCell::new(0));
        let counter = Rc::clone(&frames);

        let mut rom = vec![0; PAGE_SIZE];
        // Display on: LD A,$40 ; OUT ($BF),A ; LD A,$81 ; OUT ($BF),A ; spin
        rom[..10].copy_from_slice(&[0x3E, 0x40, 0xD3, 0xBF, 0x3E, 0x81, 0xD3, 0xBF, 0x18, 0xFE]);

        let mut sys = SmsSystem::new();
        sys.set_frame_callback(Box::new(move |_: &Frame| *counter.borrow_mut() += 1));
        sys.load_rom(&rom).unwrap();
        sys.step_frame().unwrap();
        assert_eq!(*frames.borrow(), 1);

        sys.reset();
        sys.step_frame().unwrap();
        assert_eq!(*frames.borrow(), 2);
    }
}
