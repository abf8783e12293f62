use pretty_assertions::assert_eq;
use strikebox_ata::defs::{
    ATA_CMD_IDENTIFY_DEVICE, ATA_CMD_IDENTIFY_PACKET_DEVICE, ATA_CMD_INITIALIZE_DEVICE_PARAMETERS,
    ATA_CMD_PACKET, ATA_CMD_READ_DMA, ATA_CMD_READ_SECTORS, ATA_CMD_WRITE_DMA,
    ATA_CMD_WRITE_SECTORS,
};
use strikebox_ata::identify::IdentifyDeviceData;
use strikebox_ata::{
    AtaController, ChannelId, DeviceIndex, DvdDrive, ErrorBits, HardDiskDriver, Status,
    TestIrqLine, ATA_SECTOR_SIZE, DVD_SECTOR_SIZE,
};
use strikebox_storage::MemBackend;

const BASE: u16 = 0x1F0;
const CTRL: u16 = 0x3F6;

struct Xbox {
    ctl: AtaController,
    irq14: TestIrqLine,
}

/// Hard disk as primary master, DVD drive as primary slave.
fn xbox(hdd_sectors: usize, disc: Option<Vec<u8>>) -> Xbox {
    let irq14 = TestIrqLine::default();
    let irq15 = TestIrqLine::default();
    let mut ctl = AtaController::new(Box::new(irq14.clone()), Box::new(irq15));

    let mut image = vec![0u8; hdd_sectors * ATA_SECTOR_SIZE];
    for (lba, sector) in image.chunks_exact_mut(ATA_SECTOR_SIZE).enumerate() {
        sector[..4].copy_from_slice(&(lba as u32).to_le_bytes());
    }
    let hdd = HardDiskDriver::new(Box::new(MemBackend::from_vec(image))).unwrap();
    ctl.attach(ChannelId::Primary, DeviceIndex::Master, Box::new(hdd));

    let dvd = match disc {
        Some(data) => DvdDrive::with_disc(Box::new(MemBackend::from_vec(data))),
        None => DvdDrive::empty(),
    };
    ctl.attach(ChannelId::Primary, DeviceIndex::Slave, Box::new(dvd));
    irq14.reset();
    Xbox { ctl, irq14 }
}

fn disc(sectors: usize) -> Vec<u8> {
    let mut data = vec![0u8; sectors * DVD_SECTOR_SIZE];
    for (i, sector) in data.chunks_exact_mut(DVD_SECTOR_SIZE).enumerate() {
        sector.fill(0x10 + i as u8);
    }
    data
}

impl Xbox {
    fn status(&mut self) -> Status {
        Status::from_bits_retain(self.ctl.io_read(BASE + 7, 1) as u8)
    }

    fn alt_status(&mut self) -> Status {
        Status::from_bits_retain(self.ctl.io_read(CTRL, 1) as u8)
    }

    fn select(&mut self, device: DeviceIndex, lba_bits: u8) {
        let dev = match device {
            DeviceIndex::Master => 0x00,
            DeviceIndex::Slave => 0x10,
        };
        self.ctl.io_write(BASE + 6, 1, u32::from(0xA0 | dev | lba_bits));
    }

    fn lba_command(&mut self, opcode: u8, lba: u32, count: u8) {
        self.ctl.io_write(BASE + 2, 1, u32::from(count));
        self.ctl.io_write(BASE + 3, 1, lba & 0xFF);
        self.ctl.io_write(BASE + 4, 1, (lba >> 8) & 0xFF);
        self.ctl.io_write(BASE + 5, 1, (lba >> 16) & 0xFF);
        self.select(DeviceIndex::Master, 0x40 | ((lba >> 24) as u8 & 0x0F));
        self.ctl.io_write(BASE + 7, 1, u32::from(opcode));
    }

    fn read_block(&mut self, len: usize) -> Vec<u8> {
        let mut out = Vec::with_capacity(len);
        for _ in 0..len / 2 {
            let word = self.ctl.io_read(BASE, 2) as u16;
            out.extend_from_slice(&word.to_le_bytes());
        }
        out
    }

    fn write_block(&mut self, data: &[u8]) {
        for word in data.chunks_exact(2) {
            self.ctl
                .io_write(BASE, 2, u32::from(u16::from_le_bytes([word[0], word[1]])));
        }
    }

    fn send_packet(&mut self, packet: [u8; 12], byte_count: u16) {
        self.select(DeviceIndex::Slave, 0);
        self.ctl.io_write(BASE + 1, 1, 0);
        self.ctl.io_write(BASE + 4, 1, u32::from(byte_count & 0xFF));
        self.ctl.io_write(BASE + 5, 1, u32::from(byte_count >> 8));
        self.ctl.io_write(BASE + 7, 1, u32::from(ATA_CMD_PACKET));
        assert_eq!(self.ctl.io_read(BASE + 2, 1) & 0x03, 0x01);
        self.write_block(&packet);
    }

    fn byte_count(&mut self) -> usize {
        let low = self.ctl.io_read(BASE + 4, 1) as usize;
        let high = self.ctl.io_read(BASE + 5, 1) as usize;
        (high << 8) | low
    }
}

#[test]
fn master_identify_reports_capacity_and_model() {
    let mut x = xbox(4096, None);
    x.select(DeviceIndex::Master, 0);
    x.ctl.io_write(BASE + 7, 1, u32::from(ATA_CMD_IDENTIFY_DEVICE));
    assert_eq!(x.irq14.assert_count(), 1);
    assert!(x.status().contains(Status::DRQ));

    let block = x.read_block(ATA_SECTOR_SIZE);
    let identify = IdentifyDeviceData::from_bytes(block.as_slice().try_into().unwrap());
    assert_eq!(identify.user_addressable_sectors(), 4096);
    assert_eq!(identify.model_number(), "STRIKEBOX HARD DISK");

    let status = x.status();
    assert!(!status.contains(Status::DRQ));
    assert!(status.contains(Status::DRDY));
    // No interrupt once the final block has been read.
    assert_eq!(x.irq14.assert_count(), 1);
}

#[test]
fn slave_dvd_answers_identify_packet_device() {
    let mut x = xbox(64, None);
    x.select(DeviceIndex::Slave, 0);
    x.ctl.io_write(BASE + 7, 1, u32::from(ATA_CMD_IDENTIFY_PACKET_DEVICE));
    let block = x.read_block(ATA_SECTOR_SIZE);
    let general_config = u16::from_le_bytes([block[0], block[1]]);
    assert_eq!(general_config & 0xC000, 0x8000);
    assert!(!x.status().contains(Status::ERR));
}

#[test]
fn read_sectors_returns_each_block_with_an_interrupt() {
    let mut x = xbox(64, None);
    x.lba_command(ATA_CMD_READ_SECTORS, 10, 3);
    for lba in 10u32..13 {
        assert!(x.status().contains(Status::DRQ));
        let block = x.read_block(ATA_SECTOR_SIZE);
        assert_eq!(&block[..4], &lba.to_le_bytes());
    }
    assert_eq!(x.irq14.assert_count(), 3);
    assert!(!x.status().contains(Status::DRQ));
}

#[test]
fn write_sectors_then_read_back() {
    let mut x = xbox(64, None);
    x.lba_command(ATA_CMD_WRITE_SECTORS, 5, 2);
    // The first block is requested without an interrupt.
    assert_eq!(x.irq14.assert_count(), 0);
    x.write_block(&[0xAB; ATA_SECTOR_SIZE]);
    assert_eq!(x.irq14.assert_count(), 1);
    assert!(x.status().contains(Status::DRQ));
    x.write_block(&[0xCD; ATA_SECTOR_SIZE]);
    assert_eq!(x.irq14.assert_count(), 2);
    assert!(!x.status().contains(Status::ERR));

    x.lba_command(ATA_CMD_READ_SECTORS, 5, 2);
    assert_eq!(x.read_block(ATA_SECTOR_SIZE), vec![0xAB; ATA_SECTOR_SIZE]);
    assert_eq!(x.read_block(ATA_SECTOR_SIZE), vec![0xCD; ATA_SECTOR_SIZE]);
}

#[test]
fn read_past_capacity_sets_idnf() {
    let mut x = xbox(64, None);
    x.lba_command(ATA_CMD_READ_SECTORS, 63, 2);
    let status = x.status();
    assert!(status.contains(Status::ERR));
    assert!(!status.contains(Status::DRQ));
    let error = ErrorBits::from_bits_retain(x.ctl.io_read(BASE + 1, 1) as u8);
    assert!(error.contains(ErrorBits::IDNF));
}

#[test]
fn chs_read_after_initialize_device_parameters() {
    let heads = 16u32;
    let spt = 63u32;
    let mut x = xbox((heads * spt * 12) as usize, None);

    x.ctl.io_write(BASE + 2, 1, spt);
    x.select(DeviceIndex::Master, (heads - 1) as u8);
    x.ctl.io_write(BASE + 7, 1, u32::from(ATA_CMD_INITIALIZE_DEVICE_PARAMETERS));
    assert!(!x.status().contains(Status::ERR));

    // Cylinder 10, head 5, sector 20.
    x.ctl.io_write(BASE + 2, 1, 1);
    x.ctl.io_write(BASE + 3, 1, 20);
    x.ctl.io_write(BASE + 4, 1, 10);
    x.ctl.io_write(BASE + 5, 1, 0);
    x.select(DeviceIndex::Master, 5);
    x.ctl.io_write(BASE + 7, 1, u32::from(ATA_CMD_READ_SECTORS));

    let block = x.read_block(ATA_SECTOR_SIZE);
    let expected = (10 * heads + 5) * spt + 19;
    assert_eq!(&block[..4], &expected.to_le_bytes());
}

#[test]
fn dma_read_is_driven_by_the_bus_master() {
    let mut x = xbox(256, None);
    x.lba_command(ATA_CMD_READ_DMA, 100, 3);
    assert!(x.ctl.channel(ChannelId::Primary).is_dma_active());
    assert!(x.alt_status().contains(Status::DRQ));
    assert_eq!(x.irq14.assert_count(), 0);

    let channel = x.ctl.channel_mut(ChannelId::Primary);
    let mut sector = [0u8; ATA_SECTOR_SIZE];
    for lba in 100u32..103 {
        assert!(!channel.is_dma_finished());
        assert!(channel.read_dma_sector(&mut sector));
        assert_eq!(&sector[..4], &lba.to_le_bytes());
    }
    assert!(channel.is_dma_finished());
    assert!(!channel.read_dma_sector(&mut sector));
    assert_eq!(x.irq14.assert_count(), 1);

    let status = x.status();
    assert!(!status.intersects(Status::BSY | Status::DRQ | Status::ERR));
}

#[test]
fn dma_write_lands_on_the_image() {
    let mut x = xbox(64, None);
    x.lba_command(ATA_CMD_WRITE_DMA, 7, 1);
    let channel = x.ctl.channel_mut(ChannelId::Primary);
    assert!(channel.write_dma_sector(&[0x5A; ATA_SECTOR_SIZE]));
    assert!(channel.is_dma_finished());

    x.lba_command(ATA_CMD_READ_SECTORS, 7, 1);
    assert_eq!(x.read_block(ATA_SECTOR_SIZE), vec![0x5A; ATA_SECTOR_SIZE]);
}

#[test]
fn bus_master_stop_aborts_dma() {
    let mut x = xbox(64, None);
    x.lba_command(ATA_CMD_READ_DMA, 0, 4);
    let channel = x.ctl.channel_mut(ChannelId::Primary);
    let mut sector = [0u8; ATA_SECTOR_SIZE];
    assert!(channel.read_dma_sector(&mut sector));
    channel.end_dma();
    channel.end_dma();
    assert!(!channel.is_dma_active());

    assert!(x.status().contains(Status::ERR));
    let error = ErrorBits::from_bits_retain(x.ctl.io_read(BASE + 1, 1) as u8);
    assert!(error.contains(ErrorBits::ABRT));
}

#[test]
fn atapi_read10_streams_the_disc() {
    let mut x = xbox(64, Some(disc(4)));
    let mut packet = [0u8; 12];
    packet[0] = 0x28;
    packet[5] = 1; // LBA 1
    packet[8] = 1; // one block
    x.send_packet(packet, 0xFFFE);

    let mut data = Vec::new();
    while x.status().contains(Status::DRQ) {
        assert_eq!(x.ctl.io_read(BASE + 2, 1) & 0x03, 0x02);
        let len = x.byte_count();
        assert_eq!(len, ATA_SECTOR_SIZE);
        data.extend(x.read_block(len));
    }
    assert_eq!(data, vec![0x11; DVD_SECTOR_SIZE]);
    assert_eq!(x.ctl.io_read(BASE + 2, 1) & 0x03, 0x03);
    // One per chunk plus the status phase.
    assert_eq!(x.irq14.assert_count(), 5);
    assert!(!x.status().contains(Status::ERR));
}

#[test]
fn atapi_respects_small_byte_count_limit() {
    let mut x = xbox(64, Some(disc(1)));
    let mut packet = [0u8; 12];
    packet[0] = 0x12; // INQUIRY
    packet[4] = 36;
    x.send_packet(packet, 16);

    let mut data = Vec::new();
    while x.status().contains(Status::DRQ) {
        let len = x.byte_count();
        assert!(len <= 16);
        data.extend(x.read_block(len));
    }
    assert_eq!(data.len(), 36);
    assert_eq!(data[0] & 0x1F, 0x05);
}

#[test]
fn empty_tray_reports_not_ready() {
    let mut x = xbox(64, None);
    x.send_packet([0u8; 12], 0);
    let status = x.status();
    assert!(status.contains(Status::ERR));
    let error = x.ctl.io_read(BASE + 1, 1) as u8;
    assert_eq!(error >> 4, 0x02);
    assert!(ErrorBits::from_bits_retain(error).contains(ErrorBits::ABRT));

    let mut packet = [0u8; 12];
    packet[0] = 0x03; // REQUEST SENSE
    packet[4] = 18;
    x.send_packet(packet, 18);
    let sense = x.read_block(18);
    assert_eq!(sense[2] & 0x0F, 0x02);
    assert_eq!(sense[12], 0x3A);
}

#[test]
fn data_port_is_inert_after_non_data_command() {
    let mut x = xbox(64, None);
    x.select(DeviceIndex::Master, 0);
    x.ctl.io_write(BASE + 7, 1, 0xE1); // IDLE IMMEDIATE
    let before = x.ctl.channel(ChannelId::Primary).registers().clone();
    let pending = x.ctl.channel(ChannelId::Primary).is_irq_pending();

    x.ctl.io_read(BASE, 2);
    x.ctl.io_write(BASE, 2, 0x1234);

    let channel = x.ctl.channel(ChannelId::Primary);
    assert_eq!(channel.registers(), &before);
    assert_eq!(channel.is_irq_pending(), pending);
}

#[test]
fn soft_reset_restores_signatures() {
    let mut x = xbox(64, Some(disc(1)));
    x.lba_command(ATA_CMD_READ_SECTORS, 0, 2);
    x.ctl.io_write(CTRL, 1, 0x04);
    x.ctl.io_write(CTRL, 1, 0x00);
    assert!(!x.ctl.channel(ChannelId::Primary).is_command_in_progress());
    assert_eq!(x.ctl.io_read(BASE + 1, 1), 0x01);
    assert_eq!(x.ctl.io_read(BASE + 4, 1), 0x00);
    assert_eq!(x.ctl.io_read(BASE + 5, 1), 0x00);
    assert!(x.status().contains(Status::DRDY));
}
