//! IDENTIFY DEVICE / IDENTIFY PACKET DEVICE data records.
//!
//! Both records are 256 little-endian words. Drivers fill in what they know about the medium
//! and the device overlays the currently selected transfer modes.

use crate::defs::{DmaTransferType, ATA_SECTOR_SIZE};

pub const WORD_GENERAL_CONFIG: usize = 0;
pub const WORD_DEFAULT_CYLINDERS: usize = 1;
pub const WORD_DEFAULT_HEADS: usize = 3;
pub const WORD_DEFAULT_SECTORS_PER_TRACK: usize = 6;
pub const WORD_CAPABILITIES: usize = 49;
pub const WORD_PIO_TIMING: usize = 51;
pub const WORD_FIELD_VALIDITY: usize = 53;
pub const WORD_CURRENT_CYLINDERS: usize = 54;
pub const WORD_CURRENT_HEADS: usize = 55;
pub const WORD_CURRENT_SECTORS_PER_TRACK: usize = 56;
pub const WORD_CURRENT_CAPACITY: usize = 57;
pub const WORD_USER_ADDRESSABLE_SECTORS: usize = 60;
pub const WORD_MULTIWORD_DMA: usize = 63;
pub const WORD_ADVANCED_PIO: usize = 64;
pub const WORD_MAJOR_VERSION: usize = 80;
pub const WORD_COMMAND_SETS_SUPPORTED: usize = 82;
pub const WORD_COMMAND_SETS_ENABLED: usize = 85;
pub const WORD_ULTRA_DMA: usize = 88;
pub const WORD_SECURITY_STATUS: usize = 128;

pub const CAPABILITY_DMA: u16 = 1 << 8;
pub const CAPABILITY_LBA: u16 = 1 << 9;
pub const CAPABILITY_IORDY_DISABLE: u16 = 1 << 10;
pub const CAPABILITY_IORDY: u16 = 1 << 11;

pub const FIELD_VALID_CURRENT_GEOMETRY: u16 = 1 << 0;
pub const FIELD_VALID_WORDS_64_70: u16 = 1 << 1;
pub const FIELD_VALID_WORD_88: u16 = 1 << 2;

/// Major version bits for ATA-1 through ATA/ATAPI-4.
pub const MAJOR_VERSION_ATA4: u16 = 0b1_1110;

pub const COMMAND_SET_SECURITY: u16 = 1 << 1;
pub const COMMAND_SET_PACKET: u16 = 1 << 4;

pub const SECURITY_SUPPORTED: u16 = 1 << 0;
pub const SECURITY_ENABLED: u16 = 1 << 1;
pub const SECURITY_LOCKED: u16 = 1 << 2;

/// A 256-word identification record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentifyData {
    words: [u16; 256],
}

/// Record returned by IDENTIFY DEVICE.
pub type IdentifyDeviceData = IdentifyData;
/// Record returned by IDENTIFY PACKET DEVICE.
pub type IdentifyPacketDeviceData = IdentifyData;

impl Default for IdentifyData {
    fn default() -> Self {
        Self { words: [0; 256] }
    }
}

impl IdentifyData {
    pub fn word(&self, index: usize) -> u16 {
        self.words[index]
    }

    pub fn set_word(&mut self, index: usize, value: u16) {
        self.words[index] = value;
    }

    pub fn words(&self) -> &[u16; 256] {
        &self.words
    }

    pub fn set_serial_number(&mut self, serial: &str) {
        write_ata_string(&mut self.words[10..20], serial);
    }

    pub fn set_firmware_revision(&mut self, revision: &str) {
        write_ata_string(&mut self.words[23..27], revision);
    }

    pub fn set_model_number(&mut self, model: &str) {
        write_ata_string(&mut self.words[27..47], model);
    }

    pub fn model_number(&self) -> String {
        read_ata_string(&self.words[27..47])
    }

    pub fn serial_number(&self) -> String {
        read_ata_string(&self.words[10..20])
    }

    /// Low 16 bits in word 60, high 16 bits in word 61.
    pub fn set_user_addressable_sectors(&mut self, sectors: u32) {
        self.words[WORD_USER_ADDRESSABLE_SECTORS] = sectors as u16;
        self.words[WORD_USER_ADDRESSABLE_SECTORS + 1] = (sectors >> 16) as u16;
    }

    pub fn user_addressable_sectors(&self) -> u32 {
        u32::from(self.words[WORD_USER_ADDRESSABLE_SECTORS])
            | (u32::from(self.words[WORD_USER_ADDRESSABLE_SECTORS + 1]) << 16)
    }

    /// Marks `mode` (and none other) as the selected DMA mode. Word 63 carries multiword
    /// selections, word 88 Ultra DMA ones.
    pub fn set_selected_dma_mode(&mut self, transfer: Option<(DmaTransferType, u8)>) {
        self.words[WORD_MULTIWORD_DMA] &= 0x00FF;
        self.words[WORD_ULTRA_DMA] &= 0x00FF;
        match transfer {
            Some((DmaTransferType::MultiWord, mode)) => {
                self.words[WORD_MULTIWORD_DMA] |= 1 << (8 + u16::from(mode & 0x07));
            }
            Some((DmaTransferType::UltraDma, mode)) => {
                self.words[WORD_ULTRA_DMA] |= 1 << (8 + u16::from(mode & 0x07));
            }
            Some((DmaTransferType::SingleWord, _)) | None => {}
        }
    }

    pub fn to_bytes(&self) -> [u8; ATA_SECTOR_SIZE] {
        let mut out = [0u8; ATA_SECTOR_SIZE];
        for (chunk, word) in out.chunks_exact_mut(2).zip(self.words.iter()) {
            chunk.copy_from_slice(&word.to_le_bytes());
        }
        out
    }

    pub fn from_bytes(bytes: &[u8; ATA_SECTOR_SIZE]) -> Self {
        let mut words = [0u16; 256];
        for (word, chunk) in words.iter_mut().zip(bytes.chunks_exact(2)) {
            *word = u16::from_le_bytes([chunk[0], chunk[1]]);
        }
        Self { words }
    }
}

/// ATA strings store two characters per word, first character in the high byte, padded with
/// spaces.
fn write_ata_string(dst_words: &mut [u16], src: &str) {
    let byte_len = dst_words.len() * 2;
    let mut bytes = vec![b' '; byte_len];
    let src_bytes = src.as_bytes();
    let copy_len = src_bytes.len().min(byte_len);
    bytes[..copy_len].copy_from_slice(&src_bytes[..copy_len]);

    for (word, pair) in dst_words.iter_mut().zip(bytes.chunks_exact(2)) {
        *word = u16::from_be_bytes([pair[0], pair[1]]);
    }
}

fn read_ata_string(words: &[u16]) -> String {
    let bytes: Vec<u8> = words.iter().flat_map(|w| w.to_be_bytes()).collect();
    String::from_utf8_lossy(&bytes).trim_end().to_string()
}
