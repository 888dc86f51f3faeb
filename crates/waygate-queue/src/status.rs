// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};

/// The delivery message status FSM. Encoded on disk as the integers in §6:
/// `Pending=0, Processing=1, Delivered=2, Failed=3, DeadLetter=4`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryStatus {
    Pending,
    Processing,
    Delivered,
    Failed,
    DeadLetter,
}

impl DeliveryStatus {
    pub fn as_i64(self) -> i64 {
        match self {
            Self::Pending => 0,
            Self::Processing => 1,
            Self::Delivered => 2,
            Self::Failed => 3,
            Self::DeadLetter => 4,
        }
    }

    pub fn from_i64(v: i64) -> Self {
        match v {
            0 => Self::Pending,
            1 => Self::Processing,
            2 => Self::Delivered,
            3 => Self::Failed,
            4 => Self::DeadLetter,
            other => panic!("invalid delivery status encoding: {other}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_encoding() {
        for s in [
            DeliveryStatus::Pending,
            DeliveryStatus::Processing,
            DeliveryStatus::Delivered,
            DeliveryStatus::Failed,
            DeliveryStatus::DeadLetter,
        ] {
            assert_eq!(DeliveryStatus::from_i64(s.as_i64()), s);
        }
    }

    #[test]
    fn encoding_matches_spec_table() {
        assert_eq!(DeliveryStatus::Pending.as_i64(), 0);
        assert_eq!(DeliveryStatus::Processing.as_i64(), 1);
        assert_eq!(DeliveryStatus::Delivered.as_i64(), 2);
        assert_eq!(DeliveryStatus::Failed.as_i64(), 3);
        assert_eq!(DeliveryStatus::DeadLetter.as_i64(), 4);
    }
}
