//! DMA (Direct Memory Access) functions and structures.

use std::fmt::{self, Display, Formatter};

use crate::{
    consts::{DMA_ADDR, HDMA1_ADDR, HDMA2_ADDR, HDMA3_ADDR, HDMA4_ADDR, HDMA5_ADDR},
    mmu::BusComponent,
    warnln,
};

/// Number of CPU cycles consumed to copy a single 16-byte
/// block, both for GDMA and HDMA transfers, as described in
/// the CGB VRAM DMA timing tables.
pub const HDMA_BLOCK_CYCLES: u16 = 32;

/// Fixed setup cost paid once at the start of a GDMA transfer,
/// on top of the per-block cost, regardless of CPU speed.
pub const GDMA_SETUP_CYCLES: u16 = 4;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum DmaMode {
    General = 0x00,
    HBlank = 0x01,
}

impl DmaMode {
    pub fn description(&self) -> &'static str {
        match self {
            DmaMode::General => "General-Purpose DMA",
            DmaMode::HBlank => "HBlank DMA",
        }
    }

    pub fn from_u8(value: u8) -> Self {
        match value {
            0x00 => DmaMode::General,
            0x01 => DmaMode::HBlank,
            _ => DmaMode::General,
        }
    }
}

impl Display for DmaMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

impl From<u8> for DmaMode {
    fn from(value: u8) -> Self {
        Self::from_u8(value)
    }
}

/// State machine that drives the HDMA (HBlank-only VRAM DMA) transfer,
/// one 16-byte block per HBlank entry.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum HdmaState {
    Inactive,
    WaitingForHBlank,
    BlockInProgress,
    FinishedBlock,
}

impl HdmaState {
    pub fn description(&self) -> &'static str {
        match self {
            HdmaState::Inactive => "Inactive",
            HdmaState::WaitingForHBlank => "Waiting for HBlank",
            HdmaState::BlockInProgress => "Block in progress",
            HdmaState::FinishedBlock => "Finished block",
        }
    }
}

impl Display for HdmaState {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

pub struct Dma {
    source: u16,
    destination: u16,
    length: u16,
    pending: u16,
    mode: DmaMode,

    // OAM-DMA (0xFF46) state
    value_dma: u8,
    cycles_dma: u16,
    active_dma: bool,

    // GDMA state: a single blocking transfer that suppresses CPU
    // execution until every requested block has been copied
    gdma_active: bool,
    gdma_cycles: u16,

    // HDMA state machine, one block transferred per HBlank entry
    hdma_state: HdmaState,
    hdma_cycles: u16,
    was_hblank: bool,
}

impl Dma {
    pub fn new() -> Self {
        Self {
            source: 0x0,
            destination: 0x0,
            length: 0x0,
            pending: 0x0,
            mode: DmaMode::General,
            value_dma: 0x0,
            cycles_dma: 0x0,
            active_dma: false,
            gdma_active: false,
            gdma_cycles: 0x0,
            hdma_state: HdmaState::Inactive,
            hdma_cycles: 0x0,
            was_hblank: false,
        }
    }

    pub fn reset(&mut self) {
        self.source = 0x0;
        self.destination = 0x0;
        self.length = 0x0;
        self.pending = 0x0;
        self.mode = DmaMode::General;
        self.value_dma = 0x0;
        self.cycles_dma = 0x0;
        self.active_dma = false;
        self.gdma_active = false;
        self.gdma_cycles = 0x0;
        self.hdma_state = HdmaState::Inactive;
        self.hdma_cycles = 0x0;
        self.was_hblank = false;
    }

    pub fn read(&self, addr: u16) -> u8 {
        match addr {
            // 0xFF46 — DMA: OAM DMA source address & start
            DMA_ADDR => self.value_dma,
            // 0xFF55 — HDMA5: VRAM DMA length/mode/start (CGB only)
            HDMA5_ADDR => {
                let remaining_blocks = (self.pending >> 4) as u8;
                remaining_blocks.wrapping_sub(1) | ((!self.hdma_active() as u8) << 7)
            }
            _ => {
                warnln!("Reading from unknown DMA location 0x{:04x}", addr);
                #[allow(unreachable_code)]
                0xff
            }
        }
    }

    pub fn write(&mut self, addr: u16, value: u8) {
        match addr {
            // 0xFF46 — DMA: OAM DMA source address & start
            DMA_ADDR => {
                self.value_dma = value;
                self.cycles_dma = 648;
                self.active_dma = true;
            }
            // 0xFF51 — HDMA1: VRAM DMA source high (CGB only)
            HDMA1_ADDR => self.source = (self.source & 0x00ff) | ((value as u16) << 8),
            // 0xFF52 — HDMA2: VRAM DMA source low (CGB only)
            HDMA2_ADDR => self.source = (self.source & 0xff00) | ((value & 0xf0) as u16),
            // 0xFF53 — HDMA3: VRAM DMA destination high (CGB only)
            HDMA3_ADDR => {
                self.destination =
                    (self.destination & 0x00ff) | (((value & 0x1f) as u16) << 8) | 0x8000
            }
            // 0xFF54 — HDMA4: VRAM DMA destination low (CGB only)
            HDMA4_ADDR => self.destination = (self.destination & 0xff00) | ((value & 0xf0) as u16),
            // 0xFF55 — HDMA5: VRAM DMA length/mode/start (CGB only)
            HDMA5_ADDR => self.write_hdma5(value),
            _ => warnln!("Writing to unknown DMA location 0x{:04x}", addr),
        }
    }

    /// Handles a write to HDMA5, following the contract: bit 7 set starts
    /// (or restarts) an HDMA transfer; bit 7 clear while an HDMA transfer
    /// is active cancels it; bit 7 clear while inactive requests a GDMA
    /// transfer of the requested block count.
    fn write_hdma5(&mut self, value: u8) {
        let blocks = ((value & 0x7f) as u16) + 1;
        self.length = blocks << 4;
        self.mode = DmaMode::from_u8((value & 0x80) >> 7);

        if value & 0x80 == 0x00 && self.hdma_state != HdmaState::Inactive {
            self.hdma_state = HdmaState::Inactive;
            self.pending = 0;
            return;
        }

        self.pending = self.length;

        match self.mode {
            DmaMode::HBlank => {
                self.hdma_state = HdmaState::WaitingForHBlank;
            }
            DmaMode::General => {
                self.gdma_active = true;
                self.gdma_cycles = GDMA_SETUP_CYCLES + HDMA_BLOCK_CYCLES * blocks;
            }
        }
    }

    /// Advances the GDMA blocking transfer by the given number of cycles,
    /// returning `Some((source, destination, bytes))` once the whole
    /// transfer should be committed to memory in a single shot.
    pub fn clock_gdma(&mut self, cycles: u16) -> Option<(u16, u16, u16)> {
        if !self.gdma_active {
            return None;
        }
        self.gdma_cycles = self.gdma_cycles.saturating_sub(cycles);
        if self.gdma_cycles != 0 {
            return None;
        }
        self.gdma_active = false;
        let bytes = self.pending;
        let result = (self.source, self.destination, bytes);
        self.source = self.source.wrapping_add(bytes);
        self.destination = self.destination.wrapping_add(bytes);
        self.pending = 0;
        Some(result)
    }

    /// Advances the HDMA state machine by the given number of cycles and
    /// the PPU's current HBlank status, returning `Some((source,
    /// destination, 16))` whenever a single block should be committed.
    pub fn clock_hdma(&mut self, cycles: u16, in_hblank: bool) -> Option<(u16, u16, u16)> {
        let entered_hblank = in_hblank && !self.was_hblank;
        self.was_hblank = in_hblank;

        let mut result = None;

        match self.hdma_state {
            HdmaState::WaitingForHBlank if entered_hblank => {
                self.hdma_state = HdmaState::BlockInProgress;
                self.hdma_cycles = HDMA_BLOCK_CYCLES;
            }
            HdmaState::BlockInProgress => {
                self.hdma_cycles = self.hdma_cycles.saturating_sub(cycles);
                if self.hdma_cycles == 0 {
                    let bytes = self.pending.min(16);
                    result = Some((self.source, self.destination, bytes));
                    self.source = self.source.wrapping_add(bytes);
                    self.destination = self.destination.wrapping_add(bytes);
                    self.pending -= bytes;
                    self.hdma_state = HdmaState::FinishedBlock;
                }
            }
            HdmaState::FinishedBlock if !in_hblank => {
                self.hdma_state = if self.pending == 0 {
                    HdmaState::Inactive
                } else {
                    HdmaState::WaitingForHBlank
                };
            }
            _ => (),
        }

        result
    }

    pub fn source(&self) -> u16 {
        self.source
    }

    pub fn set_source(&mut self, value: u16) {
        self.source = value;
    }

    pub fn destination(&self) -> u16 {
        self.destination
    }

    pub fn set_destination(&mut self, value: u16) {
        self.destination = value;
    }

    pub fn length(&self) -> u16 {
        self.length
    }

    pub fn set_length(&mut self, value: u16) {
        self.length = value;
    }

    pub fn pending(&self) -> u16 {
        self.pending
    }

    pub fn set_pending(&mut self, value: u16) {
        self.pending = value;
    }

    pub fn mode(&self) -> DmaMode {
        self.mode
    }

    pub fn set_mode(&mut self, value: DmaMode) {
        self.mode = value;
    }

    pub fn value_dma(&self) -> u8 {
        self.value_dma
    }

    pub fn set_value_dma(&mut self, value: u8) {
        self.value_dma = value;
    }

    pub fn cycles_dma(&self) -> u16 {
        self.cycles_dma
    }

    pub fn set_cycles_dma(&mut self, value: u16) {
        self.cycles_dma = value;
    }

    pub fn active_dma(&self) -> bool {
        self.active_dma
    }

    pub fn set_active_dma(&mut self, value: bool) {
        self.active_dma = value;
    }

    pub fn hdma_state(&self) -> HdmaState {
        self.hdma_state
    }

    /// True whenever an HDMA transfer has been requested and has not
    /// finished yet (used by the HDMA5 read contract).
    pub fn hdma_active(&self) -> bool {
        self.hdma_state != HdmaState::Inactive
    }

    pub fn gdma_active(&self) -> bool {
        self.gdma_active
    }

    /// True whenever the CPU's instruction fetch should be suppressed:
    /// only GDMA blocks CPU progress, HDMA piggy-backs on HBlank.
    pub fn blocks_cpu(&self) -> bool {
        self.gdma_active
    }

    pub fn active(&self) -> bool {
        self.active_dma || self.gdma_active || self.hdma_active()
    }

    pub fn description(&self) -> String {
        format!(
            "DMA: {}\nHDMA: {}",
            self.description_dma(),
            self.description_hdma()
        )
    }

    pub fn description_dma(&self) -> String {
        format!(
            "active: {}, cycles: {}, value: 0x{:02x}",
            self.active_dma, self.cycles_dma, self.value_dma
        )
    }

    pub fn description_hdma(&self) -> String {
        format!(
            "state: {}, gdma: {}, length: 0x{:04x}, mode: {}, source: 0x{:04x}, destination: 0x{:04x}",
            self.hdma_state, self.gdma_active, self.length, self.mode, self.source, self.destination
        )
    }
}

impl BusComponent for Dma {
    fn read(&self, addr: u16) -> u8 {
        self.read(addr)
    }

    fn write(&mut self, addr: u16, value: u8) {
        self.write(addr, value);
    }
}

impl Default for Dma {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for Dma {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

#[cfg(test)]
mod tests {
    use super::{Dma, DmaMode, HdmaState};

    #[test]
    fn test_dma_default() {
        let dma = Dma::default();
        assert!(!dma.active_dma);
        assert!(!dma.gdma_active);
        assert_eq!(dma.hdma_state, HdmaState::Inactive);
        assert!(!dma.active());
    }

    #[test]
    fn test_dma_reset() {
        let mut dma = Dma::new();
        dma.source = 0x1234;
        dma.destination = 0x5678;
        dma.length = 0x9abc;
        dma.pending = 0x9abc;
        dma.mode = DmaMode::HBlank;
        dma.value_dma = 0xff;
        dma.cycles_dma = 0x0012;
        dma.active_dma = true;
        dma.hdma_state = HdmaState::BlockInProgress;

        dma.reset();

        assert_eq!(dma.source, 0x0);
        assert_eq!(dma.destination, 0x0);
        assert_eq!(dma.length, 0x0);
        assert_eq!(dma.pending, 0x0);
        assert_eq!(dma.mode, DmaMode::General);
        assert_eq!(dma.value_dma, 0x0);
        assert_eq!(dma.cycles_dma, 0x0);
        assert!(!dma.active_dma);
        assert_eq!(dma.hdma_state, HdmaState::Inactive);
    }

    #[test]
    fn test_dma_set_active() {
        let mut dma = Dma::new();
        dma.set_active_dma(true);
        assert!(dma.active_dma);
        assert!(dma.active());
    }

    #[test]
    fn test_gdma_request_blocks_until_cycles_elapse() {
        let mut dma = Dma::new();
        dma.write(0xff51, 0x00);
        dma.write(0xff52, 0x00);
        dma.write(0xff53, 0x80);
        dma.write(0xff54, 0x00);
        // one block (0x00 -> blocks = 1), bit 7 clear requests GDMA
        dma.write(0xff55, 0x00);
        assert!(dma.gdma_active());
        assert!(dma.blocks_cpu());

        // 4 setup + 32 block cycles
        assert!(dma.clock_gdma(4).is_none());
        assert!(dma.clock_gdma(31).is_none());
        let result = dma.clock_gdma(1);
        assert_eq!(result, Some((0x0000, 0x8000, 16)));
        assert!(!dma.gdma_active());
    }

    #[test]
    fn test_hdma_transfers_one_block_per_hblank_entry() {
        let mut dma = Dma::new();
        dma.write(0xff51, 0x00);
        dma.write(0xff52, 0x00);
        dma.write(0xff53, 0x80);
        dma.write(0xff54, 0x00);
        // two blocks, bit 7 set requests HDMA
        dma.write(0xff55, 0x81);
        assert_eq!(dma.hdma_state(), HdmaState::WaitingForHBlank);

        // entering HBlank starts the first block
        assert!(dma.clock_hdma(0, true).is_none());
        assert_eq!(dma.hdma_state(), HdmaState::BlockInProgress);

        let result = dma.clock_hdma(32, true);
        assert_eq!(result, Some((0x0000, 0x8000, 16)));
        assert_eq!(dma.hdma_state(), HdmaState::FinishedBlock);

        // leaving HBlank moves back to waiting since one block remains
        dma.clock_hdma(0, false);
        assert_eq!(dma.hdma_state(), HdmaState::WaitingForHBlank);

        dma.clock_hdma(0, true);
        let result = dma.clock_hdma(32, true);
        assert_eq!(result, Some((0x0010, 0x8010, 16)));
        dma.clock_hdma(0, false);
        assert_eq!(dma.hdma_state(), HdmaState::Inactive);
    }

    #[test]
    fn test_hdma5_read_reports_completion() {
        let mut dma = Dma::new();
        assert_eq!(dma.read(0xff55), 0xff);
    }
}
