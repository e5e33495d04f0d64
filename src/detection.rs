use crate::distance::great_circle;
use geo::Point;
use std::fmt;
use std::sync::Arc;

/// One observed object at one timestep.
///
/// Detections are immutable once they are ingested by the tracker, the tracker shares them
/// between the hypotheses that claim them with [Arc](std::sync::Arc).
///
/// The position is kept as a [geo::Point] where `x` is the longitude and `y` is the latitude,
/// both in degrees.
///
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    position: Point<f64>,
    surface_area: f64,
    pixels: Vec<u32>,
    threshold: f64,
    amplitude: f64,
    geo_speed: f64,
    timestep: usize,
    ordinal: usize,
}

impl Detection {
    /// Creates a detection at `lat`, `lon` (degrees) with all the measures set to zero
    ///
    pub fn new(lat: f64, lon: f64) -> Self {
        Self {
            position: Point::new(lon, lat),
            surface_area: 0.0,
            pixels: Vec::default(),
            threshold: 0.0,
            amplitude: 0.0,
            geo_speed: 0.0,
            timestep: 0,
            ordinal: 0,
        }
    }

    pub fn with_surface_area(mut self, surface_area: f64) -> Self {
        self.surface_area = surface_area;
        self
    }

    /// Sets the membership list (pixel indices) the detection was segmented from
    ///
    pub fn with_pixels(mut self, pixels: Vec<u32>) -> Self {
        self.pixels = pixels;
        self
    }

    /// Sets the threshold value the detection was derived with
    ///
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_amplitude(mut self, amplitude: f64) -> Self {
        self.amplitude = amplitude;
        self
    }

    pub fn with_geo_speed(mut self, geo_speed: f64) -> Self {
        self.geo_speed = geo_speed;
        self
    }

    /// Stamps the identity label
    ///
    /// # Parameters
    /// * `timestep` - index of the frame the detection belongs to
    /// * `ordinal` - 1-based position of the detection inside its frame
    ///
    pub fn labeled(mut self, timestep: usize, ordinal: usize) -> Self {
        self.timestep = timestep;
        self.ordinal = ordinal;
        self
    }

    pub fn lat(&self) -> f64 {
        self.position.y()
    }

    pub fn lon(&self) -> f64 {
        self.position.x()
    }

    pub fn position(&self) -> &Point<f64> {
        &self.position
    }

    pub fn surface_area(&self) -> f64 {
        self.surface_area
    }

    pub fn pixels(&self) -> &[u32] {
        &self.pixels
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn amplitude(&self) -> f64 {
        self.amplitude
    }

    pub fn geo_speed(&self) -> f64 {
        self.geo_speed
    }

    pub fn timestep(&self) -> usize {
        self.timestep
    }

    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    /// Great-circle distance to `other` in kilometers
    ///
    pub fn distance_to(&self, other: &Detection) -> f64 {
        great_circle(&self.position, &other.position)
    }

    /// Key of the logical object the detection represents
    ///
    pub fn key(&self) -> DetectionKey {
        DetectionKey::new(self.lat(), self.lon(), self.timestep)
    }

    /// Two detections are the same logical object when they share position and timestep
    ///
    pub fn same_object(&self, other: &Detection) -> bool {
        self.key() == other.key()
    }

    /// Coordinates must be finite and the latitude must stay within `[-90, 90]`
    ///
    pub(crate) fn is_well_formed(&self) -> bool {
        self.lat().is_finite() && self.lon().is_finite() && self.lat().abs() <= 90.0
    }
}

impl fmt::Display for Detection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{} {}] ({:.4}, {:.4})",
            self.timestep,
            self.ordinal,
            self.lat(),
            self.lon()
        )
    }
}

/// Equality key of a logical detection: position and timestep.
///
/// Hypotheses of the same key compete inside one conflict group during pruning.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DetectionKey {
    lat: u64,
    lon: u64,
    timestep: usize,
}

impl DetectionKey {
    pub fn new(lat: f64, lon: f64, timestep: usize) -> Self {
        // -0.0 and 0.0 must hash the same
        let bits = |v: f64| if v == 0.0 { 0.0_f64.to_bits() } else { v.to_bits() };
        Self {
            lat: bits(lat),
            lon: bits(lon),
            timestep,
        }
    }

    pub fn lat(&self) -> f64 {
        f64::from_bits(self.lat)
    }

    pub fn lon(&self) -> f64 {
        f64::from_bits(self.lon)
    }

    pub fn timestep(&self) -> usize {
        self.timestep
    }
}

impl fmt::Display for DetectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{} ({:.4}, {:.4})>", self.timestep, self.lat(), self.lon())
    }
}

/// What a hypothesis node carries
///
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Detection(Arc<Detection>),
    /// The track terminates here
    End,
    /// Reserved: the parent detection was a false positive
    FalsePositive,
}

impl Payload {
    pub fn is_sentinel(&self) -> bool {
        !matches!(self, Payload::Detection(_))
    }

    pub fn is_end(&self) -> bool {
        matches!(self, Payload::End)
    }

    pub fn detection(&self) -> Option<&Arc<Detection>> {
        match self {
            Payload::Detection(d) => Some(d),
            _ => None,
        }
    }
}
