//! HDCP 1.x System Renewability Message parsing.
//!
//! Layout:
//!
//! ```text
//! byte 0      SRM id (high nibble, 0x8) | reserved
//! byte 1      reserved
//! bytes 2..4  version, big endian
//! byte 4      generation
//! bytes 5..8  VRL length, 24-bit big endian, includes itself and the
//!             40-byte signature
//! bytes 8..   revocation records: count byte (low 7 bits) then
//!             count * 5 KSV bytes, most-significant byte first
//! ```
//!
//! The DSA signature trailing the records is not verified here.

use std::collections::HashSet;

use hdcp_core::{Ksv, SrmError, KSV_LEN};
use tracing::debug;

const SRM_ID_HDCP1: u8 = 0x8;
const HEADER_LEN: usize = 8;
const VRL_LENGTH_FIELD: u32 = 3;
const SIGNATURE_LEN: u32 = 40;

/// SRM header fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SrmHeader {
    pub id: u8,
    pub version: u16,
    pub generation: u8,
    pub vrl_length: u32,
}

/// Parsed revocation list. Read-only once loaded.
#[derive(Debug, Clone, Default)]
pub struct SrmList {
    header: Option<SrmHeader>,
    records: Vec<Vec<Ksv>>,
    revoked: HashSet<Ksv>,
}

impl SrmList {
    /// List with no revocations; validation reports `NotChecked`.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build directly from revoked KSVs (DDC byte order).
    pub fn from_ksvs<I: IntoIterator<Item = Ksv>>(ksvs: I) -> Self {
        let record: Vec<Ksv> = ksvs.into_iter().collect();
        let revoked = record.iter().copied().collect();
        Self {
            header: Some(SrmHeader {
                id: SRM_ID_HDCP1,
                ..SrmHeader::default()
            }),
            records: vec![record],
            revoked,
        }
    }

    pub fn parse(data: &[u8]) -> Result<Self, SrmError> {
        if data.len() < HEADER_LEN {
            return Err(SrmError::TooShort(data.len()));
        }
        let id = data[0] >> 4;
        if id != SRM_ID_HDCP1 {
            return Err(SrmError::UnsupportedId(id));
        }
        let version = u16::from_be_bytes([data[2], data[3]]);
        let generation = data[4];
        let vrl_length = u32::from_be_bytes([0, data[5], data[6], data[7]]);
        if vrl_length < VRL_LENGTH_FIELD + SIGNATURE_LEN {
            return Err(SrmError::InvalidLength(vrl_length));
        }

        let records_len = (vrl_length - VRL_LENGTH_FIELD - SIGNATURE_LEN) as usize;
        let end = HEADER_LEN + records_len;
        if end > data.len() {
            return Err(SrmError::Truncated(data.len()));
        }

        let mut records = Vec::new();
        let mut revoked = HashSet::new();
        let mut pos = HEADER_LEN;
        while pos < end {
            let count = (data[pos] & 0x7f) as usize;
            pos += 1;
            let record_end = pos + count * KSV_LEN;
            if record_end > end {
                return Err(SrmError::Truncated(pos));
            }
            let record: Vec<Ksv> = data[pos..record_end]
                .chunks_exact(KSV_LEN)
                .map(|chunk| {
                    let mut be = [0u8; KSV_LEN];
                    be.copy_from_slice(chunk);
                    Ksv::from_be_bytes(be)
                })
                .collect();
            revoked.extend(record.iter().copied());
            records.push(record);
            pos = record_end;
        }

        debug!(
            "Loaded SRM v{} gen {}: {} records, {} revoked KSVs",
            version,
            generation,
            records.len(),
            revoked.len()
        );

        Ok(Self {
            header: Some(SrmHeader {
                id,
                version,
                generation,
                vrl_length,
            }),
            records,
            revoked,
        })
    }

    /// Header, if a list was loaded.
    pub fn header(&self) -> Option<&SrmHeader> {
        self.header.as_ref()
    }

    pub fn is_loaded(&self) -> bool {
        self.header.is_some()
    }

    pub fn records(&self) -> &[Vec<Ksv>] {
        &self.records
    }

    pub fn contains(&self, ksv: &Ksv) -> bool {
        self.revoked.contains(ksv)
    }

    pub fn revoked_count(&self) -> usize {
        self.revoked.len()
    }

    /// Serialize revoked KSVs back into the wire format with an all-zero
    /// signature. Used to build test fixtures.
    pub fn encode(version: u16, generation: u8, records: &[Vec<Ksv>]) -> Vec<u8> {
        let body: Vec<u8> = records
            .iter()
            .flat_map(|record| {
                let mut out = vec![(record.len() as u8) & 0x7f];
                for ksv in record {
                    out.extend_from_slice(&ksv.to_be_bytes());
                }
                out
            })
            .collect();
        let vrl_length = body.len() as u32 + VRL_LENGTH_FIELD + SIGNATURE_LEN;
        let mut out = vec![SRM_ID_HDCP1 << 4, 0];
        out.extend_from_slice(&version.to_be_bytes());
        out.push(generation);
        out.extend_from_slice(&vrl_length.to_be_bytes()[1..]);
        out.extend_from_slice(&body);
        out.extend_from_slice(&[0u8; SIGNATURE_LEN as usize]);
        out
    }
}
