use std::fmt;

use thiserror::Error;

use crate::addr::Addr;

// -------------------------------------------------------------------------------------------------

/// A position in the input being assembled or disassembled: a file path plus
/// either a line number (assembly) or an address (disassembly).
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Location {
    path:   Option<String>,
    offset: Option<Offset>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Offset {
    Line(usize),
    Address(u32),
}

impl Location {
    pub fn from_path(path: impl Into<String>) -> Self {
        Self { path: Some(path.into()), offset: None }
    }

    pub fn from_line(path: impl Into<String>, line: usize) -> Self {
        Self { path: Some(path.into()), offset: Some(Offset::Line(line)) }
    }

    pub fn from_address(path: impl Into<String>, address: Addr) -> Self {
        Self { path: Some(path.into()), offset: Some(Offset::Address(address.raw())) }
    }

    pub fn is_empty(&self) -> bool {
        self.path.is_none() && self.offset.is_none()
    }

    /// Fills in fields this location is missing. An inner (more precise)
    /// location always wins over the outer context it propagates through.
    pub fn update(&mut self, outer: &Location) {
        if self.path.is_none() {
            self.path = outer.path.clone();
        }
        if self.offset.is_none() {
            self.offset = outer.offset;
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.path, self.offset) {
            (Some(path), Some(Offset::Line(line))) => write!(f, "{path}:{line}"),
            (Some(path), Some(Offset::Address(addr))) => write!(f, "{path}:{addr:#08x}"),
            (Some(path), None) => write!(f, "{path}"),
            (None, Some(Offset::Line(line))) => write!(f, "line {line}"),
            (None, Some(Offset::Address(addr))) => write!(f, "{addr:#08x}"),
            (None, None) => Ok(()),
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// The crate-wide error: a message plus the nearest known source location.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Error {
    message:  String,
    location: Location,
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), location: Location::default() }
    }

    /// Decorates this error with an outer location. Missing fields are
    /// filled in; anything the error already knows is kept.
    #[must_use]
    pub fn with_location(mut self, location: &Location) -> Self {
        self.location.update(location);
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn location(&self) -> &Location {
        &self.location
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.location.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.location, self.message)
        }
    }
}

impl std::error::Error for Error {}

macro_rules! err {
    ($($arg:tt)*) => {
        $crate::error::Error::new(format!($($arg)*))
    };
}
pub(crate) use err;

// -------------------------------------------------------------------------------------------------

/// Failures translating a 65816 address into a cartridge ROM offset.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum AddressError {
    #[error("Address {0} is outside the 65816 address space")]
    OutOfRange(Addr),
    #[error("Address {0} is in a work-RAM bank")]
    WramBank(Addr),
    #[error("Address {0} is intercepted by the system, not cartridge ROM")]
    NotRomAddress(Addr),
    #[error("Address {0} is below the LoROM cartridge window")]
    BelowLoRomWindow(Addr),
    #[error("Address {0} maps past the end of this ROM image")]
    PastEndOfRom(Addr),
}

/// Failures loading or slicing a ROM image.
#[derive(Debug, Error)]
pub enum RomError {
    #[error("ROM file is empty")]
    Empty,
    #[error("Invalid ROM size: {0} ({0:#x}) bytes")]
    BadSize(usize),
    #[error("Could not detect the ROM's memory mapping")]
    UnknownMapping,
    #[error("Reading ROM file: {0}")]
    Io(#[from] std::io::Error),
}

impl From<AddressError> for Error {
    fn from(e: AddressError) -> Self {
        Error::new(e.to_string())
    }
}

impl From<RomError> for Error {
    fn from(e: RomError) -> Self {
        Error::new(e.to_string())
    }
}

// -------------------------------------------------------------------------------------------------
