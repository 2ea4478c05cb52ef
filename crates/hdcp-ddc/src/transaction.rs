//! Diagnostic record of a DDC transaction.

use hdcp_core::DdcError;

/// Outcome of an issued transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Ok,
    Nack,
    BusLow,
    Timeout,
}

impl Outcome {
    /// `None` for errors raised before anything reached the bus.
    pub fn from_error(err: &DdcError) -> Option<Self> {
        match err {
            DdcError::Nack { .. } => Some(Outcome::Nack),
            DdcError::BusLow => Some(Outcome::BusLow),
            DdcError::Timeout => Some(Outcome::Timeout),
            DdcError::InvalidLength(_) | DdcError::BusUnavailable(_) => None,
        }
    }
}

/// Direction of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Read,
    Write,
}

/// Request/response record of one logical transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DdcTransaction {
    pub direction: Direction,
    pub device: u8,
    pub offset: u8,
    pub length: usize,
    /// Whole-transaction retries spent.
    pub retries: u32,
    pub outcome: Outcome,
}

impl DdcTransaction {
    pub fn succeeded(&self) -> bool {
        self.outcome == Outcome::Ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_from_error() {
        assert_eq!(
            Outcome::from_error(&DdcError::Nack {
                device: 0x3a,
                offset: 0
            }),
            Some(Outcome::Nack)
        );
        assert_eq!(Outcome::from_error(&DdcError::BusLow), Some(Outcome::BusLow));
        assert_eq!(Outcome::from_error(&DdcError::Timeout), Some(Outcome::Timeout));
        assert_eq!(Outcome::from_error(&DdcError::InvalidLength(0)), None);
    }
}
