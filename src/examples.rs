use crate::detection::Detection;
use crate::tracker::Frame;
use rand::distributions::Uniform;
use rand::prelude::ThreadRng;
use rand::Rng;

/// Random walk of one object, one detection per step.
///
/// Every step moves the object by up to `drift` degrees along each axis. The latitude is kept
/// inside `[-89, 89]`, the longitude is wrapped into `[-180, 180)`.
///
pub struct DetectionGen {
    lat: f64,
    lon: f64,
    area: f64,
    gen: ThreadRng,
    dist_pos: Uniform<f64>,
    dist_area: Uniform<f64>,
}

impl DetectionGen {
    pub fn new(lat: f64, lon: f64, drift: f64) -> Self {
        Self {
            lat,
            lon,
            area: 100.0,
            gen: rand::thread_rng(),
            dist_pos: Uniform::new_inclusive(-drift, drift),
            dist_area: Uniform::new_inclusive(-5.0, 5.0),
        }
    }
}

impl Iterator for DetectionGen {
    type Item = Detection;

    fn next(&mut self) -> Option<Self::Item> {
        self.lat = (self.lat + self.gen.sample(self.dist_pos)).clamp(-89.0, 89.0);
        self.lon = (self.lon + self.gen.sample(self.dist_pos) + 180.0).rem_euclid(360.0) - 180.0;
        self.area = (self.area + self.gen.sample(self.dist_area)).max(1.0);
        Some(
            Detection::new(self.lat, self.lon)
                .with_surface_area(self.area)
                .with_amplitude(self.gen.gen_range(1.0..20.0)),
        )
    }
}

/// `count` frames of the objects starting at `starts`, every object walks on its own
///
pub fn frames(starts: &[(f64, f64)], drift: f64, count: usize) -> Vec<Frame> {
    let mut gens = starts
        .iter()
        .map(|(lat, lon)| DetectionGen::new(*lat, *lon, drift))
        .collect::<Vec<_>>();
    (0..count)
        .map(|t| {
            Frame::new(
                format!("t{:04}", t),
                gens.iter_mut().filter_map(|g| g.next()).collect(),
            )
        })
        .collect()
}

/// Starting points on a regular lat/lon grid with `spacing` degrees between neighbours
///
pub fn grid(rows: usize, cols: usize, spacing: f64) -> Vec<(f64, f64)> {
    (0..rows)
        .flat_map(|r| (0..cols).map(move |c| (r as f64 * spacing - 45.0, c as f64 * spacing)))
        .collect()
}
