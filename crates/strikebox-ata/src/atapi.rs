//! SCSI command handling for packet (ATAPI) devices.
//!
//! The PACKET protocol in [`crate::cmds`] moves the command packet and its data; this module
//! decides what a packet means for the device.

use tracing::{debug, trace};

use crate::defs::DVD_SECTOR_SIZE;
use crate::device::AtaDevice;

pub const SCSI_TEST_UNIT_READY: u8 = 0x00;
pub const SCSI_REQUEST_SENSE: u8 = 0x03;
pub const SCSI_INQUIRY: u8 = 0x12;
pub const SCSI_START_STOP_UNIT: u8 = 0x1B;
pub const SCSI_PREVENT_ALLOW_MEDIUM_REMOVAL: u8 = 0x1E;
pub const SCSI_READ_CAPACITY: u8 = 0x25;
pub const SCSI_READ_10: u8 = 0x28;
pub const SCSI_READ_12: u8 = 0xA8;

pub const SENSE_NO_SENSE: u8 = 0x00;
pub const SENSE_NOT_READY: u8 = 0x02;
pub const SENSE_MEDIUM_ERROR: u8 = 0x03;
pub const SENSE_ILLEGAL_REQUEST: u8 = 0x05;
pub const SENSE_UNIT_ATTENTION: u8 = 0x06;

pub const ASC_INVALID_COMMAND: u8 = 0x20;
pub const ASC_LBA_OUT_OF_RANGE: u8 = 0x21;
pub const ASC_INVALID_FIELD_IN_CDB: u8 = 0x24;
pub const ASC_MEDIUM_CHANGED: u8 = 0x28;
pub const ASC_UNRECOVERED_READ_ERROR: u8 = 0x11;
pub const ASC_MEDIUM_NOT_PRESENT: u8 = 0x3A;

const REQUEST_SENSE_LEN: usize = 18;
const INQUIRY_LEN: usize = 36;

/// Latched SCSI sense data reported by REQUEST SENSE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Sense {
    pub key: u8,
    pub asc: u8,
    pub ascq: u8,
}

impl Sense {
    pub const fn new(key: u8, asc: u8, ascq: u8) -> Self {
        Self { key, asc, ascq }
    }
}

/// What the PACKET protocol should do once a command packet has been interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PacketResult {
    NoData,
    DataIn(Vec<u8>),
    /// Stream `blocks` 2048-byte blocks starting at `lba` from the medium.
    ReadBlocks { lba: u32, blocks: u32 },
    CheckCondition(Sense),
}

/// Interprets one command packet for `device`, updating its latched sense.
pub fn handle_packet(device: &mut AtaDevice, packet: &[u8]) -> PacketResult {
    let mut cdb = [0u8; 16];
    let len = packet.len().min(cdb.len());
    cdb[..len].copy_from_slice(&packet[..len]);
    let packet = &cdb;
    let opcode = packet[0];
    trace!(opcode, "ATAPI packet");
    let result = match opcode {
        SCSI_INQUIRY => {
            let alloc_len = usize::from(packet[4]);
            let data = inquiry_data(device);
            PacketResult::DataIn(data[..alloc_len.min(data.len())].to_vec())
        }
        SCSI_REQUEST_SENSE => {
            let alloc_len = usize::from(packet[4]);
            let data = request_sense_data(device.sense());
            device.clear_sense();
            return PacketResult::DataIn(data[..alloc_len.min(data.len())].to_vec());
        }
        SCSI_TEST_UNIT_READY => match check_ready(device) {
            Ok(()) => PacketResult::NoData,
            Err(sense) => PacketResult::CheckCondition(sense),
        },
        SCSI_READ_CAPACITY => match check_ready(device) {
            Ok(()) => {
                let capacity = device.driver().medium_capacity_sectors();
                let mut data = Vec::with_capacity(8);
                data.extend_from_slice(&capacity.saturating_sub(1).to_be_bytes());
                data.extend_from_slice(&(DVD_SECTOR_SIZE as u32).to_be_bytes());
                PacketResult::DataIn(data)
            }
            Err(sense) => PacketResult::CheckCondition(sense),
        },
        SCSI_READ_10 => {
            let lba = u32::from_be_bytes([packet[2], packet[3], packet[4], packet[5]]);
            let blocks = u32::from(u16::from_be_bytes([packet[7], packet[8]]));
            read_blocks(device, lba, blocks)
        }
        SCSI_READ_12 => {
            let lba = u32::from_be_bytes([packet[2], packet[3], packet[4], packet[5]]);
            let blocks = u32::from_be_bytes([packet[6], packet[7], packet[8], packet[9]]);
            read_blocks(device, lba, blocks)
        }
        SCSI_START_STOP_UNIT => start_stop_unit(device, packet[4]),
        SCSI_PREVENT_ALLOW_MEDIUM_REMOVAL => PacketResult::NoData,
        other => {
            debug!(opcode = other, "unsupported ATAPI command");
            PacketResult::CheckCondition(Sense::new(
                SENSE_ILLEGAL_REQUEST,
                ASC_INVALID_COMMAND,
                0,
            ))
        }
    };

    match &result {
        PacketResult::CheckCondition(sense) => device.set_sense(*sense),
        _ => device.clear_sense(),
    }
    result
}

fn check_ready(device: &mut AtaDevice) -> Result<(), Sense> {
    if device.driver_mut().take_medium_changed() {
        return Err(Sense::new(SENSE_UNIT_ATTENTION, ASC_MEDIUM_CHANGED, 0));
    }
    if !device.driver().has_medium() {
        return Err(Sense::new(SENSE_NOT_READY, ASC_MEDIUM_NOT_PRESENT, 0));
    }
    Ok(())
}

fn read_blocks(device: &mut AtaDevice, lba: u32, blocks: u32) -> PacketResult {
    if let Err(sense) = check_ready(device) {
        return PacketResult::CheckCondition(sense);
    }
    if blocks == 0 {
        return PacketResult::NoData;
    }
    let capacity = device.driver().medium_capacity_sectors();
    let in_range = lba
        .checked_add(blocks)
        .is_some_and(|end| end <= capacity);
    if !in_range {
        return PacketResult::CheckCondition(Sense::new(
            SENSE_ILLEGAL_REQUEST,
            ASC_LBA_OUT_OF_RANGE,
            0,
        ));
    }
    PacketResult::ReadBlocks { lba, blocks }
}

fn start_stop_unit(device: &mut AtaDevice, control: u8) -> PacketResult {
    let start = control & 0x01 != 0;
    let load_eject = control & 0x02 != 0;
    if !load_eject || start {
        return PacketResult::NoData;
    }
    match device.driver_mut().eject_medium() {
        Ok(()) => PacketResult::NoData,
        Err(err) => {
            debug!(%err, "eject refused");
            PacketResult::CheckCondition(Sense::new(
                SENSE_ILLEGAL_REQUEST,
                ASC_INVALID_FIELD_IN_CDB,
                0,
            ))
        }
    }
}

fn inquiry_data(device: &AtaDevice) -> [u8; INQUIRY_LEN] {
    let mut data = [0u8; INQUIRY_LEN];
    // CD/DVD device, removable.
    data[0] = 0x05;
    data[1] = 0x80;
    // ATAPI transport version, response data format.
    data[2] = 0x00;
    data[3] = 0x21;
    data[4] = (INQUIRY_LEN - 5) as u8;
    write_scsi_ascii(&mut data[8..16], b"STRIKEBX");
    let mut identify = crate::identify::IdentifyPacketDeviceData::default();
    let product = match device.driver().identify_packet_device(&mut identify) {
        Ok(()) => identify.model_number(),
        Err(_) => String::new(),
    };
    write_scsi_ascii(&mut data[16..32], product.as_bytes());
    write_scsi_ascii(&mut data[32..36], b"1.00");
    data
}

fn request_sense_data(sense: Sense) -> [u8; REQUEST_SENSE_LEN] {
    let mut data = [0u8; REQUEST_SENSE_LEN];
    // Current error, fixed format.
    data[0] = 0x70;
    data[2] = sense.key & 0x0F;
    data[7] = (REQUEST_SENSE_LEN - 8) as u8;
    data[12] = sense.asc;
    data[13] = sense.ascq;
    data
}

fn write_scsi_ascii(dst: &mut [u8], src: &[u8]) {
    dst.fill(b' ');
    let copy_len = src.len().min(dst.len());
    dst[..copy_len].copy_from_slice(&src[..copy_len]);
}
