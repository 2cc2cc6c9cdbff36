use std::fmt;

/// Interrupt reasons with a registered handler.
///
/// Lookup is by exact value: combinations such as `0x0003` are not a reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[repr(u16)]
pub enum Reason {
    /// Interrupt without a reason.
    Nothing = 0x0000,
    /// Initialize command finished.
    InitDone = 0x0001,
    /// Command finished.
    CommandDone = 0x0002,
    /// Start command finished.
    StartDone = 0x0004,
    /// Device finished its power-up self test.
    PowerupDone = 0x0080,
}

impl Reason {
    /// Every registered reason, in table order.
    pub const ALL: [Self; 5] = [
        Self::Nothing,
        Self::InitDone,
        Self::CommandDone,
        Self::StartDone,
        Self::PowerupDone,
    ];

    /// Looks up the reason registered for an exact `CSR1` value.
    #[must_use]
    pub const fn from_raw(raw: u16) -> Option<Self> {
        match raw {
            0x0000 => Some(Self::Nothing),
            0x0001 => Some(Self::InitDone),
            0x0002 => Some(Self::CommandDone),
            0x0004 => Some(Self::StartDone),
            0x0080 => Some(Self::PowerupDone),
            _ => None,
        }
    }

    /// Raw `CSR1` value of this reason.
    #[must_use]
    pub const fn raw(self) -> u16 {
        self as u16
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Nothing => "nothing done",
            Self::InitDone => "init done",
            Self::CommandDone => "command done",
            Self::StartDone => "start done",
            Self::PowerupDone => "powerup done",
        })
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::Reason;

    #[test]
    fn registered_values_roundtrip() {
        for reason in Reason::ALL {
            assert_eq!(Reason::from_raw(reason.raw()), Some(reason));
        }
    }

    #[rstest]
    #[case(0x0003)]
    #[case(0x0006)]
    #[case(0x0081)]
    #[case(0x0008)]
    #[case(0xFFFF)]
    fn composite_and_unknown_values_have_no_reason(#[case] raw: u16) {
        assert_eq!(Reason::from_raw(raw), None);
    }

    #[test]
    fn display_names_follow_device_log_wording() {
        assert_eq!(Reason::PowerupDone.to_string(), "powerup done");
        assert_eq!(Reason::CommandDone.to_string(), "command done");
    }
}
