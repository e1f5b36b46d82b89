//! Error related data structures.

use std::fmt::{self, Display, Formatter};

use gbc_core_common::error::Error;

/// Error raised while loading a ROM from a file or an in-memory
/// buffer, covering the cases where the data never reaches the
/// point where a [`crate::rom::Cartridge`] can be built from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RomLoadError {
    /// The underlying file could not be opened or read.
    ReadError(String),

    /// The buffer's size is not a valid Game Boy ROM size (either
    /// too small, not a multiple of the 16 KiB bank size, or not
    /// matching the bank count declared by the header).
    InvalidSize,

    /// The cartridge type declared at 0x147 does not support external
    /// RAM, but the header's RAM-size byte (0x149) is non-zero.
    InvalidExtension(String),

    /// The ROM declares a cartridge/MBC combination that is not
    /// supported by the emulator core.
    Unsupported(String),
}

impl RomLoadError {
    pub fn description(&self) -> String {
        match self {
            RomLoadError::ReadError(message) => format!("Failed to read ROM: {}", message),
            RomLoadError::InvalidSize => String::from("Invalid ROM size"),
            RomLoadError::InvalidExtension(message) => {
                format!("Invalid cartridge/RAM combination: {}", message)
            }
            RomLoadError::Unsupported(message) => format!("Unsupported ROM: {}", message),
        }
    }
}

impl Display for RomLoadError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

impl std::error::Error for RomLoadError {}

impl From<Error> for RomLoadError {
    fn from(error: Error) -> Self {
        match error {
            Error::RomSize => RomLoadError::InvalidSize,
            Error::InvalidParameter(message) => RomLoadError::InvalidExtension(message),
            Error::InvalidData | Error::IncompatibleBootRom | Error::CustomError(_) => {
                RomLoadError::Unsupported(error.description())
            }
        }
    }
}
