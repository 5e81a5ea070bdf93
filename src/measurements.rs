//! Derived detector quantities accumulated across the analyses

use serde::Serialize;
use std::{collections::BTreeMap, fmt, path::Path};

use crate::gain::Channel;

/// Unit a quantity is expressed in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    /// ADU based: ADU or ADU/s
    Adu,
    /// electron based: e- or e-/s
    Electron,
}

/// A measured value and its unit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quantity {
    pub value: f64,
    pub unit: Unit,
}
impl Quantity {
    pub fn adu(value: f64) -> Self {
        Self {
            value,
            unit: Unit::Adu,
        }
    }
    /// Converts an ADU quantity to electrons with the conversion gain `k` [e-/ADU]
    ///
    /// Electron quantities are returned unchanged.
    pub fn to_electrons(self, k: f64) -> Self {
        match self.unit {
            Unit::Adu => Self {
                value: self.value * k,
                unit: Unit::Electron,
            },
            Unit::Electron => self,
        }
    }
}
impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let unit = match self.unit {
            Unit::Adu => "ADU",
            Unit::Electron => "e-",
        };
        if let Some(precision) = f.precision() {
            write!(f, "{:.*} {}", precision, self.value, unit)
        } else {
            write!(f, "{} {}", self.value, unit)
        }
    }
}

/// Quantities of one readout channel
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct ChannelMeasurements {
    /// conversion gain [e-/ADU]
    pub gain: Option<f64>,
    pub read_noise: Option<Quantity>,
    /// per second
    pub dark_current: Option<Quantity>,
    pub well_depth: Option<Quantity>,
}

/// Measurements of all the channels, keyed by channel
///
/// Entries are created on first write and never removed.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct MeasurementSet(BTreeMap<Channel, ChannelMeasurements>);
impl MeasurementSet {
    pub fn new() -> Self {
        Default::default()
    }
    fn entry(&mut self, channel: Channel) -> &mut ChannelMeasurements {
        self.0.entry(channel).or_default()
    }
    pub fn get(&self, channel: Channel) -> Option<&ChannelMeasurements> {
        self.0.get(&channel)
    }
    /// Channels with at least one measurement, in channel order
    pub fn channels(&self) -> impl Iterator<Item = Channel> + '_ {
        self.0.keys().copied()
    }
    pub fn len(&self) -> usize {
        self.0.len()
    }
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
    /// Records the read noise [ADU]
    pub fn with_read_noise(mut self, channel: Channel, read_noise: f64) -> Self {
        self.entry(channel).read_noise = Some(Quantity::adu(read_noise));
        self
    }
    /// Records the dark current [ADU/s]
    pub fn with_dark_current(mut self, channel: Channel, dark_current: f64) -> Self {
        self.entry(channel).dark_current = Some(Quantity::adu(dark_current));
        self
    }
    /// Records the well depth [ADU]
    pub fn with_well_depth(mut self, channel: Channel, well_depth: f64) -> Self {
        self.entry(channel).well_depth = Some(Quantity::adu(well_depth));
        self
    }
    /// Records the conversion gain `k` [e-/ADU] of a channel and converts the
    /// channel ADU quantities into electrons
    ///
    /// Quantities already in electrons are left untouched, so applying a gain
    /// twice never converts a value twice.
    pub fn with_gain(mut self, channel: Channel, k: f64) -> Self {
        let entry = self.entry(channel);
        entry.gain = Some(k);
        entry.read_noise = entry.read_noise.map(|q| q.to_electrons(k));
        entry.dark_current = entry.dark_current.map(|q| q.to_electrons(k));
        entry.well_depth = entry.well_depth.map(|q| q.to_electrons(k));
        self
    }
    pub fn read_noise(&self, channel: Channel) -> Option<Quantity> {
        self.get(channel).and_then(|m| m.read_noise)
    }
    pub fn dark_current(&self, channel: Channel) -> Option<Quantity> {
        self.get(channel).and_then(|m| m.dark_current)
    }
    pub fn well_depth(&self, channel: Channel) -> Option<Quantity> {
        self.get(channel).and_then(|m| m.well_depth)
    }
    pub fn gain(&self, channel: Channel) -> Option<f64> {
        self.get(channel).and_then(|m| m.gain)
    }
    /// Rows of the summary table
    pub fn summary(&self) -> Vec<SummaryRow> {
        self.0
            .iter()
            .map(|(channel, m)| SummaryRow {
                gain_mode: channel.label().to_string(),
                gain: m.gain,
                read_noise: m.read_noise.map(|q| q.value),
                dark_current: m.dark_current.map(|q| q.value * 1e3),
                well_depth: m.well_depth.map(|q| q.value),
            })
            .collect()
    }
    /// Writes the summary table into a CSV file
    pub fn to_csv<P: AsRef<Path>>(&self, path: P) -> Result<(), csv::Error> {
        let mut wtr = csv::Writer::from_path(path)?;
        for row in self.summary() {
            wtr.serialize(row)?;
        }
        wtr.flush()?;
        Ok(())
    }
}

/// Summary of the measurements of a channel
///
/// Quantities are reported as measured: in electrons once the channel gain is
/// known, in ADU otherwise. The dark current is given per thousand.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryRow {
    #[serde(rename = "Gain mode")]
    pub gain_mode: String,
    #[serde(rename = "Gain (e-/ADU)")]
    pub gain: Option<f64>,
    #[serde(rename = "Read Noise (e-)")]
    pub read_noise: Option<f64>,
    #[serde(rename = "Dark Current (me-/s)")]
    pub dark_current: Option<f64>,
    #[serde(rename = "Well depth (e-)")]
    pub well_depth: Option<f64>,
}
impl SummaryRow {
    /// Table cells formatted with the report precision, empty for missing values
    pub fn cells(&self) -> [String; 5] {
        let cell = |value: Option<f64>, precision: usize| {
            value
                .map(|x| format!("{:.*}", precision, x))
                .unwrap_or_default()
        };
        [
            self.gain_mode.clone(),
            cell(self.gain, 2),
            cell(self.read_noise, 2),
            cell(self.dark_current, 2),
            cell(self.well_depth, 0),
        ]
    }
}
