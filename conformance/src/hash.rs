//! Content hashes used to compare what one side sent with what the other
//! received.

/// Bernstein's djb2 over `data`, wrapping on overflow.
pub fn hash_djb2(data: &[u8]) -> u64 {
    data.iter().fold(5381u64, |hash, &byte| {
        hash.wrapping_mul(33).wrapping_add(u64::from(byte))
    })
}

/// Rolling hash over a sequence of messages.
///
/// Each message contributes the djb2 hash of its bytes, and one more if it
/// closes a record (`MSG_EOR`). Equal totals on both sides mean the payload
/// and the record boundaries survived the transport.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MessageHash(u64);

impl MessageHash {
    pub fn new() -> Self {
        Self(0)
    }

    pub fn add(&mut self, data: &[u8], end_of_record: bool) {
        if end_of_record {
            self.0 = self.0.wrapping_add(1);
        }
        self.0 = self.0.wrapping_add(hash_djb2(data));
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}
