/*!
 * A connected group of fire pixels observed in a single scan, and the
 * per-scan bundle of clusters plus scan metadata.
 */

use crate::geo::{BoundingBox, Coord, DEFAULT_EPSILON};
use crate::pixel::{FirePoint, Pixel, PixelList};
use crate::satellite::{Satellite, Sector};
use chrono::{DateTime, Utc};

/// A connected fire blob: a [`PixelList`] viewed as one cluster, with cached
/// aggregates kept in sync as pixels are added.
#[derive(Debug, Clone)]
pub struct Cluster {
    pixels: PixelList,
    power: f64,
    area: f64,
    max_temperature: f64,
    max_scan_angle: f64,
}

impl Cluster {
    pub fn new() -> Self {
        Cluster {
            pixels: PixelList::new(),
            power: 0.0,
            area: 0.0,
            max_temperature: f64::NEG_INFINITY,
            max_scan_angle: 0.0,
        }
    }

    /// Append `pixel`, folding its finite measurements into the cached
    /// aggregates.
    pub fn add_pixel(&mut self, pixel: Pixel) {
        if pixel.power.is_finite() {
            self.power += pixel.power;
        }
        if pixel.area.is_finite() {
            self.area += pixel.area;
        }
        if pixel.temperature.is_finite() {
            self.max_temperature = self.max_temperature.max(pixel.temperature);
        }
        self.max_scan_angle = self.max_scan_angle.max(pixel.scan_angle);

        self.pixels.push(pixel);
    }

    pub fn pixels(&self) -> &PixelList {
        &self.pixels
    }

    pub fn take_pixels(self) -> PixelList {
        self.pixels
    }

    pub fn total_power(&self) -> f64 {
        self.power
    }

    pub fn total_area(&self) -> f64 {
        self.area
    }

    pub fn max_temperature(&self) -> f64 {
        self.max_temperature
    }

    pub fn max_scan_angle(&self) -> f64 {
        self.max_scan_angle
    }

    pub fn centroid(&self) -> Coord {
        self.pixels.centroid()
    }

    pub fn len(&self) -> usize {
        self.pixels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }
}

impl Default for Cluster {
    fn default() -> Self {
        Cluster::new()
    }
}

/// Either a successfully decoded [`ClusterList`], or the message from a
/// failed decode. A failed list carries no clusters.
#[derive(Debug, Clone)]
pub enum ClusterListError {
    Ok,
    DecodeFailure(String),
}

/// One scan's worth of [`Cluster`]s plus scan metadata.
#[derive(Debug, Clone)]
pub struct ClusterList {
    satellite: Option<Satellite>,
    sector: Option<Sector>,
    scan_start: Option<DateTime<Utc>>,
    scan_end: Option<DateTime<Utc>>,
    clusters: Vec<Cluster>,
    error: ClusterListError,
}

impl ClusterList {
    pub fn new(
        satellite: Satellite,
        sector: Sector,
        scan_start: DateTime<Utc>,
        scan_end: DateTime<Utc>,
    ) -> Self {
        ClusterList {
            satellite: Some(satellite),
            sector: Some(sector),
            scan_start: Some(scan_start),
            scan_end: Some(scan_end),
            clusters: Vec::new(),
            error: ClusterListError::Ok,
        }
    }

    /// Construct an error-state cluster list for a scan file that could not
    /// be decoded. Carries no clusters; readers must check
    /// [`ClusterList::error`] before relying on [`ClusterList::clusters`].
    pub fn decode_failure(message: impl Into<String>) -> Self {
        ClusterList {
            satellite: None,
            sector: None,
            scan_start: None,
            scan_end: None,
            clusters: Vec::new(),
            error: ClusterListError::DecodeFailure(message.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self.error, ClusterListError::Ok)
    }

    pub fn error(&self) -> &ClusterListError {
        &self.error
    }

    pub fn satellite(&self) -> Option<Satellite> {
        self.satellite
    }

    pub fn sector(&self) -> Option<Sector> {
        self.sector
    }

    pub fn scan_start(&self) -> Option<DateTime<Utc>> {
        self.scan_start
    }

    pub fn scan_end(&self) -> Option<DateTime<Utc>> {
        self.scan_end
    }

    pub fn clusters(&self) -> &[Cluster] {
        &self.clusters
    }

    pub fn take_clusters(self) -> Vec<Cluster> {
        self.clusters
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    pub fn push(&mut self, cluster: Cluster) {
        self.clusters.push(cluster);
    }

    /// Keep only clusters whose centroid lies in `box_`.
    pub fn filter_box(&mut self, box_: BoundingBox) {
        self.clusters
            .retain(|c| box_.contains_coord(c.centroid(), DEFAULT_EPSILON));
    }

    /// Keep only clusters with `max_scan_angle < theta`.
    pub fn filter_max_scan_angle(&mut self, theta: f64) {
        self.clusters.retain(|c| c.max_scan_angle() < theta);
    }

    /// Sort clusters by descending total power, for export ordering.
    pub fn sort_descending_power(&mut self) {
        self.clusters
            .sort_by(|a, b| b.total_power().partial_cmp(&a.total_power()).unwrap());
    }
}

/// Group fire points into connected components under 8-neighbor grid
/// adjacency (`|dx| <= 1 && |dy| <= 1 && (dx, dy) != (0, 0)`).
///
/// On return, every point's grid coordinate has been set to the `(0, 0)`
/// consumed sentinel. Quadratic worst case over a single scan's fire
/// points: intentionally simple, since the point count per scan (hundreds
/// to low thousands) keeps constant factors dominant.
pub fn cluster_fire_points(points: &mut [FirePoint]) -> Vec<Cluster> {
    let coords: Vec<(i32, i32)> = points.iter().map(|p| (p.x, p.y)).collect();
    let mut consumed: Vec<bool> = points.iter().map(|p| p.is_consumed_sentinel()).collect();

    let mut clusters = Vec::new();

    for seed in 0..points.len() {
        if consumed[seed] {
            continue;
        }

        let mut working = vec![seed];
        consumed[seed] = true;

        let mut i = 0;
        while i < working.len() {
            let (wx, wy) = coords[working[i]];

            for j in 0..points.len() {
                if consumed[j] {
                    continue;
                }
                let (jx, jy) = coords[j];
                let dx = jx - wx;
                let dy = jy - wy;
                if dx.abs() <= 1 && dy.abs() <= 1 && (dx, dy) != (0, 0) {
                    working.push(j);
                    consumed[j] = true;
                }
            }

            i += 1;
        }

        let mut cluster = Cluster::new();
        for &idx in &working {
            cluster.add_pixel(points[idx].pixel);
        }
        clusters.push(cluster);
    }

    for p in points.iter_mut() {
        p.x = 0;
        p.y = 0;
    }

    clusters
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::geo::Coord;

    fn pixel_at(power: f64) -> Pixel {
        Pixel {
            ul: Coord::new(1.0, 1.0),
            ur: Coord::new(1.0, 2.0),
            lr: Coord::new(0.0, 2.0),
            ll: Coord::new(0.0, 1.0),
            power,
            area: 100.0,
            temperature: 320.0,
            scan_angle: 5.0,
            mask_flag: 10,
            data_quality_flag: 0,
        }
    }

    fn point(x: i32, y: i32) -> FirePoint {
        FirePoint { pixel: pixel_at(1.0), x, y }
    }

    #[test]
    fn clustering_splits_into_expected_sizes() {
        let mut points = vec![point(3, 3), point(3, 4), point(4, 4), point(7, 7)];
        let clusters = cluster_fire_points(&mut points);

        let mut sizes: Vec<usize> = clusters.iter().map(|c| c.len()).collect();
        sizes.sort_unstable();
        assert_eq!(sizes, vec![1, 3]);
    }

    #[test]
    fn cluster_pixel_count_conserved() {
        let mut points: Vec<FirePoint> = (1..=20).map(|i| point(i, i)).collect();
        let total_in = points.len();
        let clusters = cluster_fire_points(&mut points);
        let total_out: usize = clusters.iter().map(|c| c.len()).sum();
        assert_eq!(total_in, total_out);
    }

    #[test]
    fn cluster_power_sum_conserved() {
        let mut points = vec![point(3, 3), point(3, 4), point(4, 4), point(7, 7)];
        let total_power_in: f64 = points.iter().map(|p| p.pixel.power).sum();
        let clusters = cluster_fire_points(&mut points);
        let total_power_out: f64 = clusters.iter().map(|c| c.total_power()).sum();
        assert!((total_power_in - total_power_out).abs() < 1.0e-9);
    }
}
