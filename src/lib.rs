//! Original Xbox ATA/ATAPI storage stack.
//!
//! The engine lives in [`ata`]; disk images are provided through [`storage`].

pub use strikebox_ata as ata;
pub use strikebox_storage as storage;
