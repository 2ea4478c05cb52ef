//! Key Selection Vectors.
//!
//! A KSV is the 40-bit public identifier of an HDCP device. It is carried on
//! the DDC bus least-significant byte first; SRM revocation records store it
//! most-significant byte first. [`Ksv`] always holds the DDC byte order.

use std::fmt;

/// Length of a KSV in bytes.
pub const KSV_LEN: usize = 5;

/// Number of set bits a legal KSV carries.
const KSV_ONES: u32 = 20;

/// 40-bit Key Selection Vector in DDC byte order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct Ksv(pub [u8; KSV_LEN]);

impl Ksv {
    pub fn new(bytes: [u8; KSV_LEN]) -> Self {
        Self(bytes)
    }

    /// Build from a slice in DDC byte order. Returns `None` unless the slice
    /// is exactly five bytes long.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let arr: [u8; KSV_LEN] = bytes.try_into().ok()?;
        Some(Self(arr))
    }

    /// Build from SRM byte order (most-significant byte first).
    pub fn from_be_bytes(bytes: [u8; KSV_LEN]) -> Self {
        let mut le = bytes;
        le.reverse();
        Self(le)
    }

    /// Bytes in SRM order (most-significant byte first).
    pub fn to_be_bytes(&self) -> [u8; KSV_LEN] {
        let mut be = self.0;
        be.reverse();
        be
    }

    pub fn as_bytes(&self) -> &[u8; KSV_LEN] {
        &self.0
    }

    pub fn count_ones(&self) -> u32 {
        self.0.iter().map(|b| b.count_ones()).sum()
    }

    /// A KSV is legal when exactly twenty of its forty bits are set.
    pub fn is_legal(&self) -> bool {
        self.count_ones() == KSV_ONES
    }

    /// Split a flat KSV list (as read from a KSV FIFO or receiver-ID
    /// registers) into KSVs. Trailing bytes that do not form a full KSV are
    /// ignored.
    pub fn split_list(bytes: &[u8]) -> Vec<Ksv> {
        bytes
            .chunks_exact(KSV_LEN)
            .filter_map(Ksv::from_slice)
            .collect()
    }
}

impl From<[u8; KSV_LEN]> for Ksv {
    fn from(bytes: [u8; KSV_LEN]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for Ksv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

/// Legality test on raw bytes.
pub fn is_ksv_legal(bytes: &[u8; KSV_LEN]) -> bool {
    Ksv(*bytes).is_legal()
}

#[cfg(test)]
mod tests {
    use super::*;

    mod legality {
        use super::*;

        #[test]
        fn twenty_ones_is_legal() {
            assert!(Ksv::new([0xff, 0xff, 0x0f, 0x00, 0x00]).is_legal());
            assert!(Ksv::new([0x55, 0x55, 0x55, 0x55, 0x55]).is_legal());
        }

        #[test]
        fn other_weights_are_illegal() {
            assert!(!Ksv::new([0x00; 5]).is_legal());
            assert!(!Ksv::new([0xff; 5]).is_legal());
            assert!(!Ksv::new([0xff, 0xff, 0x07, 0x00, 0x00]).is_legal());
            assert!(!Ksv::new([0xff, 0xff, 0x1f, 0x00, 0x00]).is_legal());
        }

        #[test]
        fn legal_iff_popcount_is_twenty() {
            // Pseudo-random sweep over the 40-bit space
            let mut x: u64 = 0x1234_5678_9a;
            for _ in 0..20_000 {
                x = x
                    .wrapping_mul(6364136223846793005)
                    .wrapping_add(1442695040888963407);
                let v = (x >> 13) & 0xff_ffff_ffff;
                let mut bytes = [0u8; 5];
                bytes.copy_from_slice(&v.to_le_bytes()[..5]);
                assert_eq!(is_ksv_legal(&bytes), v.count_ones() == 20);
            }
        }
    }

    mod byte_order {
        use super::*;

        #[test]
        fn be_bytes_are_reversed() {
            let ksv = Ksv::from_be_bytes([1, 2, 3, 4, 5]);
            assert_eq!(ksv.as_bytes(), &[5, 4, 3, 2, 1]);
            assert_eq!(ksv.to_be_bytes(), [1, 2, 3, 4, 5]);
        }

        #[test]
        fn from_slice_checks_length() {
            assert!(Ksv::from_slice(&[1, 2, 3, 4]).is_none());
            assert_eq!(
                Ksv::from_slice(&[1, 2, 3, 4, 5]),
                Some(Ksv::new([1, 2, 3, 4, 5]))
            );
        }

        #[test]
        fn split_list_drops_partial_tail() {
            let list = Ksv::split_list(&[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11]);
            assert_eq!(list.len(), 2);
            assert_eq!(list[1], Ksv::new([6, 7, 8, 9, 10]));
        }

        #[test]
        fn display_is_hex() {
            assert_eq!(
                Ksv::new([0xab, 0x01, 0x00, 0xff, 0x10]).to_string(),
                "ab0100ff10"
            );
        }
    }
}
