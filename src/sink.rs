use std::collections::BTreeMap;

use crate::{
    addr::Addr,
    error::{err, Result},
};

/// Write surface for assembled bytes. Implementations map the 24-bit
/// address space onto their backing store and may reject invalid writes.
pub trait OutputSink {
    fn write(&mut self, address: Addr, data: &[u8]) -> Result<()>;
}

// -------------------------------------------------------------------------------------------------

/// In-memory sink that records every byte written, keyed by address.
/// Writing the same address twice is an error; address increments wrap
/// within the bank, matching the program counter.
#[derive(Clone, Debug, Default)]
pub struct VecSink {
    bytes: BTreeMap<Addr, u8>,
}

impl VecSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bytes(&self) -> &BTreeMap<Addr, u8> {
        &self.bytes
    }

    pub fn byte_at(&self, address: Addr) -> Option<u8> {
        self.bytes.get(&address).copied()
    }

    /// The `length` bytes starting at `address`, if all were written.
    pub fn range(&self, address: Addr, length: u32) -> Option<Vec<u8>> {
        (0..length as i32).map(|i| self.byte_at(address.add_wrapped(i))).collect()
    }
}

impl OutputSink for VecSink {
    fn write(&mut self, address: Addr, data: &[u8]) -> Result<()> {
        for (i, byte) in data.iter().enumerate() {
            let target = address.add_wrapped(i as i32);
            if self.bytes.insert(target, *byte).is_some() {
                return Err(err!("Duplicate write to address {target}"));
            }
        }
        Ok(())
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_wrap_within_the_bank() {
        let mut sink = VecSink::new();
        sink.write(Addr::new(0x05FFFF), &[0xAA, 0xBB]).unwrap();
        assert_eq!(sink.byte_at(Addr::new(0x05FFFF)), Some(0xAA));
        assert_eq!(sink.byte_at(Addr::new(0x050000)), Some(0xBB));
    }

    #[test]
    fn duplicate_writes_are_rejected() {
        let mut sink = VecSink::new();
        sink.write(Addr::new(0x8000), &[0x01]).unwrap();
        let error = sink.write(Addr::new(0x8000), &[0x01]).unwrap_err();
        assert!(error.message().contains("Duplicate write"));
    }
}
