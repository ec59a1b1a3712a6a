//! Event record types.
//!
//! Three record shapes share a time-of-flight field. An [`EventList`]
//! stores exactly one shape at a time and tags it with an [`EventType`].
//!
//! [`EventList`]: crate::EventList

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

const NANOS_PER_SECOND: f64 = 1.0e9;

/// Absolute pulse time in nanoseconds since the facility epoch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PulseTime(pub i64);

impl PulseTime {
    /// The smallest representable pulse time.
    pub const MIN: Self = Self(i64::MIN);
    /// The largest representable pulse time.
    pub const MAX: Self = Self(i64::MAX);

    /// Creates a pulse time from nanoseconds.
    #[inline]
    #[must_use]
    pub fn from_nanos(nanos: i64) -> Self {
        Self(nanos)
    }

    /// Returns the raw nanosecond value.
    #[inline]
    #[must_use]
    pub fn as_nanos(&self) -> i64 {
        self.0
    }

    /// Shifts the pulse time by a (possibly fractional) number of seconds.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn add_seconds(self, seconds: f64) -> Self {
        Self(self.0.saturating_add((seconds * NANOS_PER_SECOND).round() as i64))
    }

    /// Returns the time at the sample for an event with the given TOF.
    ///
    /// `tof` is in microseconds, `tof_offset` in seconds.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn at_sample(self, tof: f64, tof_factor: f64, tof_offset: f64) -> Self {
        let shift = tof_factor * tof * 1000.0 + tof_offset * NANOS_PER_SECOND;
        Self(self.0.saturating_add(shift as i64))
    }
}

impl fmt::Display for PulseTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ns", self.0)
    }
}

/// Representation currently stored by an event list.
///
/// Variants are ordered by specialisation: promotion only ever moves
/// towards `WeightedNoTime`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum EventType {
    /// Time-of-flight and pulse time, implicit unit weight.
    Tof,
    /// Time-of-flight, pulse time, weight and squared error.
    Weighted,
    /// Time-of-flight, weight and squared error; pulse time dropped.
    WeightedNoTime,
}

impl EventType {
    /// Returns true if records of this type carry a pulse time.
    #[inline]
    #[must_use]
    pub fn has_pulse_time(self) -> bool {
        !matches!(self, Self::WeightedNoTime)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Tof => "TOF",
            Self::Weighted => "WEIGHTED",
            Self::WeightedNoTime => "WEIGHTED_NOTIME",
        };
        f.write_str(name)
    }
}

/// Unweighted neutron event.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TofEvent {
    /// Time-of-flight in microseconds.
    pub tof: f64,
    /// Pulse time of the frame the event was detected in.
    pub pulse_time: PulseTime,
}

impl TofEvent {
    /// Creates a new event.
    #[inline]
    #[must_use]
    pub fn new(tof: f64, pulse_time: PulseTime) -> Self {
        Self { tof, pulse_time }
    }
}

/// Weighted neutron event with pulse time.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct WeightedEvent {
    /// Time-of-flight in microseconds.
    pub tof: f64,
    /// Pulse time of the frame the event was detected in.
    pub pulse_time: PulseTime,
    /// Event weight.
    pub weight: f32,
    /// Squared error of the weight.
    pub error_squared: f32,
}

impl WeightedEvent {
    /// Creates a new weighted event.
    #[inline]
    #[must_use]
    pub fn new(tof: f64, pulse_time: PulseTime, weight: f32, error_squared: f32) -> Self {
        Self {
            tof,
            pulse_time,
            weight,
            error_squared,
        }
    }
}

impl From<TofEvent> for WeightedEvent {
    fn from(event: TofEvent) -> Self {
        Self::new(event.tof, event.pulse_time, 1.0, 1.0)
    }
}

/// Weighted neutron event without pulse time.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct WeightedEventNoTime {
    /// Time-of-flight in microseconds.
    pub tof: f64,
    /// Event weight.
    pub weight: f32,
    /// Squared error of the weight.
    pub error_squared: f32,
}

impl WeightedEventNoTime {
    /// Creates a new weighted event without pulse time.
    #[inline]
    #[must_use]
    pub fn new(tof: f64, weight: f32, error_squared: f32) -> Self {
        Self {
            tof,
            weight,
            error_squared,
        }
    }
}

impl From<TofEvent> for WeightedEventNoTime {
    fn from(event: TofEvent) -> Self {
        Self::new(event.tof, 1.0, 1.0)
    }
}

impl From<WeightedEvent> for WeightedEventNoTime {
    fn from(event: WeightedEvent) -> Self {
        Self::new(event.tof, event.weight, event.error_squared)
    }
}

/// Common read/write interface over the three record shapes.
pub trait Event: Copy + Send + Sync {
    /// Representation tag for this record type.
    const TYPE: EventType;

    /// Returns the time-of-flight.
    fn tof(&self) -> f64;

    /// Mutable access to the time-of-flight.
    fn tof_mut(&mut self) -> &mut f64;

    /// Returns the weight (1 for unweighted events).
    fn weight(&self) -> f64;

    /// Returns the squared error (1 for unweighted events).
    fn error_squared(&self) -> f64;

    /// Returns the pulse time, if this shape carries one.
    fn pulse_time(&self) -> Option<PulseTime>;
}

/// Records that carry an explicit weight.
pub trait WeightedRecord: Event {
    /// Overwrites the weight and squared error.
    fn set_weight(&mut self, weight: f64, error_squared: f64);
}

/// Records that carry a pulse time.
pub trait TimedRecord: Event {
    /// Returns the pulse time.
    fn pulse(&self) -> PulseTime;

    /// Mutable access to the pulse time.
    fn pulse_mut(&mut self) -> &mut PulseTime;
}

impl Event for TofEvent {
    const TYPE: EventType = EventType::Tof;

    #[inline]
    fn tof(&self) -> f64 {
        self.tof
    }

    #[inline]
    fn tof_mut(&mut self) -> &mut f64 {
        &mut self.tof
    }

    #[inline]
    fn weight(&self) -> f64 {
        1.0
    }

    #[inline]
    fn error_squared(&self) -> f64 {
        1.0
    }

    #[inline]
    fn pulse_time(&self) -> Option<PulseTime> {
        Some(self.pulse_time)
    }
}

impl Event for WeightedEvent {
    const TYPE: EventType = EventType::Weighted;

    #[inline]
    fn tof(&self) -> f64 {
        self.tof
    }

    #[inline]
    fn tof_mut(&mut self) -> &mut f64 {
        &mut self.tof
    }

    #[inline]
    fn weight(&self) -> f64 {
        f64::from(self.weight)
    }

    #[inline]
    fn error_squared(&self) -> f64 {
        f64::from(self.error_squared)
    }

    #[inline]
    fn pulse_time(&self) -> Option<PulseTime> {
        Some(self.pulse_time)
    }
}

impl Event for WeightedEventNoTime {
    const TYPE: EventType = EventType::WeightedNoTime;

    #[inline]
    fn tof(&self) -> f64 {
        self.tof
    }

    #[inline]
    fn tof_mut(&mut self) -> &mut f64 {
        &mut self.tof
    }

    #[inline]
    fn weight(&self) -> f64 {
        f64::from(self.weight)
    }

    #[inline]
    fn error_squared(&self) -> f64 {
        f64::from(self.error_squared)
    }

    #[inline]
    fn pulse_time(&self) -> Option<PulseTime> {
        None
    }
}

#[allow(clippy::cast_possible_truncation)]
impl WeightedRecord for WeightedEvent {
    #[inline]
    fn set_weight(&mut self, weight: f64, error_squared: f64) {
        self.weight = weight as f32;
        self.error_squared = error_squared as f32;
    }
}

#[allow(clippy::cast_possible_truncation)]
impl WeightedRecord for WeightedEventNoTime {
    #[inline]
    fn set_weight(&mut self, weight: f64, error_squared: f64) {
        self.weight = weight as f32;
        self.error_squared = error_squared as f32;
    }
}

impl TimedRecord for TofEvent {
    #[inline]
    fn pulse(&self) -> PulseTime {
        self.pulse_time
    }

    #[inline]
    fn pulse_mut(&mut self) -> &mut PulseTime {
        &mut self.pulse_time
    }
}

impl TimedRecord for WeightedEvent {
    #[inline]
    fn pulse(&self) -> PulseTime {
        self.pulse_time
    }

    #[inline]
    fn pulse_mut(&mut self) -> &mut PulseTime {
        &mut self.pulse_time
    }
}
