use std::fmt;
use strum_macros::EnumIter;

#[derive(Debug, thiserror::Error)]
pub enum GainError {
    #[error(r#"gain mode {0} is not recognized, expected "high", "low" or "hdr""#)]
    Mode(String),
}

/// Detector readout gain mode
#[derive(EnumIter, Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum GainMode {
    /// Dual-gain readout: every exposure holds a high and a low gain array
    Hdr,
    High,
    Low,
}
impl GainMode {
    /// Logical readout channels of the gain mode
    ///
    /// `Hdr` expands into its high and low dual-gain channels, in the order
    /// the pixel arrays are stored inside an exposure frame.
    pub fn channels(&self) -> &'static [Channel] {
        match self {
            GainMode::Hdr => &[Channel::DualHigh, Channel::DualLow],
            GainMode::High => &[Channel::High],
            GainMode::Low => &[Channel::Low],
        }
    }
    /// Number of pixel arrays per exposure frame
    pub fn n_channel(&self) -> usize {
        self.channels().len()
    }
    /// File name token of the gain mode
    pub fn token(&self) -> &'static str {
        match self {
            GainMode::Hdr => "hdr",
            GainMode::High => "high",
            GainMode::Low => "low",
        }
    }
}
impl TryFrom<&str> for GainMode {
    type Error = GainError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.to_lowercase().as_str() {
            "hdr" => Ok(GainMode::Hdr),
            "high" => Ok(GainMode::High),
            "low" => Ok(GainMode::Low),
            _ => Err(GainError::Mode(value.to_string())),
        }
    }
}
impl fmt::Display for GainMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.token())
    }
}

/// Readout channel a measurement is attributed to
#[derive(EnumIter, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum Channel {
    DualHigh,
    DualLow,
    High,
    Low,
}
impl Channel {
    /// Index of the channel pixel array inside an exposure frame
    pub fn index(&self) -> usize {
        match self {
            Channel::DualHigh | Channel::High | Channel::Low => 0,
            Channel::DualLow => 1,
        }
    }
    /// Gain mode the channel belongs to
    pub fn gain_mode(&self) -> GainMode {
        match self {
            Channel::DualHigh | Channel::DualLow => GainMode::Hdr,
            Channel::High => GainMode::High,
            Channel::Low => GainMode::Low,
        }
    }
    pub fn label(&self) -> &'static str {
        match self {
            Channel::DualHigh => "high (dual-gain)",
            Channel::DualLow => "low (dual-gain)",
            Channel::High => "high",
            Channel::Low => "low",
        }
    }
}
impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn hdr_expands_into_two_channels() {
        let labels: Vec<_> = GainMode::Hdr.channels().iter().map(|c| c.label()).collect();
        assert_eq!(labels, vec!["high (dual-gain)", "low (dual-gain)"]);
        assert_eq!(GainMode::Hdr.channels()[1].index(), 1);
    }

    #[test]
    fn single_gain_modes_keep_their_name() {
        for mode in [GainMode::High, GainMode::Low] {
            let channels = mode.channels();
            assert_eq!(channels.len(), 1);
            assert_eq!(channels[0].label(), mode.token());
            assert_eq!(channels[0].index(), 0);
        }
    }

    #[test]
    fn every_channel_belongs_to_its_mode() {
        for channel in Channel::iter() {
            assert!(channel.gain_mode().channels().contains(&channel));
        }
    }

    #[test]
    fn parse_gain_mode() {
        assert_eq!(GainMode::try_from("HDR").unwrap(), GainMode::Hdr);
        assert!(GainMode::try_from("medium").is_err());
    }
}
