/*!
 * A single satellite pixel footprint and growable lists of them.
 *
 * A [`Pixel`] is a convex quadrilateral with fire-detection measurements
 * attached. [`PixelList`] is an ordered, growable sequence of pixels with a
 * stable binary on-disk form.
 */

use crate::geo::{BoundingBox, Coord, Quad, DEFAULT_EPSILON};
use std::io::{self, Read, Write};

/// Sentinel value for a missing numeric measurement.
pub const MISSING: f64 = f64::NEG_INFINITY;

/// A convex quadrilateral pixel footprint plus its per-pixel measurements.
///
/// Corners are listed in a consistent winding `(ul, ur, lr, ll)`. Each
/// numeric field is either a finite value or [`MISSING`]. `scan_angle` is
/// always `>= 0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pixel {
    pub ul: Coord,
    pub ur: Coord,
    pub lr: Coord,
    pub ll: Coord,
    /// Fire radiative power in megawatts, or [`MISSING`].
    pub power: f64,
    /// Pixel footprint area in square meters, or [`MISSING`].
    pub area: f64,
    /// Fire brightness temperature in Kelvin, or [`MISSING`].
    pub temperature: f64,
    /// Scan angle from satellite nadir, in degrees. Always `>= 0`.
    pub scan_angle: f64,
    /// Mask/quality-control taxonomy code.
    pub mask_flag: i16,
    /// Data quality flag code.
    pub data_quality_flag: i16,
}

impl Pixel {
    fn quad(&self) -> Quad {
        Quad::new(self.ul, self.ur, self.lr, self.ll)
    }

    pub fn centroid(&self) -> Coord {
        self.quad().centroid()
    }

    pub fn bounding_box(&self) -> BoundingBox {
        self.quad().bounding_box()
    }

    pub fn approx_equal(&self, other: &Pixel, eps: f64) -> bool {
        self.quad().approx_equal(&other.quad(), eps)
    }

    pub fn contains_coord(&self, c: Coord, eps: f64) -> bool {
        self.quad().contains_coord(c, eps)
    }

    pub fn overlaps(&self, other: &Pixel, eps: f64) -> bool {
        self.quad().overlaps(&other.quad(), eps)
    }

    pub fn is_adjacent(&self, other: &Pixel, eps: f64) -> bool {
        self.quad().is_adjacent(&other.quad(), eps)
    }

    pub fn is_adjacent_or_overlaps(&self, other: &Pixel, eps: f64) -> bool {
        self.quad().is_adjacent_or_overlaps(&other.quad(), eps)
    }

    /// Merge two pixels considered the same under ε: max of power/area/
    /// temperature, min ("better") of the flag codes.
    fn merged_with(&self, other: &Pixel) -> Pixel {
        Pixel {
            ul: self.ul,
            ur: self.ur,
            lr: self.lr,
            ll: self.ll,
            power: f64::max(self.power, other.power),
            area: f64::max(self.area, other.area),
            temperature: f64::max(self.temperature, other.temperature),
            scan_angle: self.scan_angle.max(other.scan_angle),
            mask_flag: self.mask_flag.min(other.mask_flag),
            data_quality_flag: self.data_quality_flag.min(other.data_quality_flag),
        }
    }

    const RECORD_LEN: usize = 8 * (4 * 2 + 4) + 2 * 2;

    fn write_to(&self, mut w: impl Write) -> io::Result<()> {
        for v in [
            self.ul.lat,
            self.ul.lon,
            self.ur.lat,
            self.ur.lon,
            self.lr.lat,
            self.lr.lon,
            self.ll.lat,
            self.ll.lon,
            self.power,
            self.area,
            self.temperature,
            self.scan_angle,
        ] {
            w.write_all(&v.to_le_bytes())?;
        }
        w.write_all(&self.mask_flag.to_le_bytes())?;
        w.write_all(&self.data_quality_flag.to_le_bytes())?;
        Ok(())
    }

    fn read_from(mut r: impl Read) -> io::Result<Pixel> {
        let mut read_f64 = || -> io::Result<f64> {
            let mut buf = [0u8; 8];
            r.read_exact(&mut buf)?;
            Ok(f64::from_le_bytes(buf))
        };

        let ul = Coord::new(read_f64()?, read_f64()?);
        let ur = Coord::new(read_f64()?, read_f64()?);
        let lr = Coord::new(read_f64()?, read_f64()?);
        let ll = Coord::new(read_f64()?, read_f64()?);
        let power = read_f64()?;
        let area = read_f64()?;
        let temperature = read_f64()?;
        let scan_angle = read_f64()?;

        let mut buf2 = [0u8; 2];
        r.read_exact(&mut buf2)?;
        let mask_flag = i16::from_le_bytes(buf2);
        r.read_exact(&mut buf2)?;
        let data_quality_flag = i16::from_le_bytes(buf2);

        Ok(Pixel {
            ul,
            ur,
            lr,
            ll,
            power,
            area,
            temperature,
            scan_angle,
            mask_flag,
            data_quality_flag,
        })
    }
}

/// A pixel together with its integer grid indices `(x, y)` in the
/// originating scan. `(0, 0)` is reserved as the "consumed" sentinel used by
/// the clustering engine.
#[derive(Debug, Clone, Copy)]
pub struct FirePoint {
    pub pixel: Pixel,
    pub x: i32,
    pub y: i32,
}

impl FirePoint {
    pub fn is_consumed_sentinel(&self) -> bool {
        self.x == 0 && self.y == 0
    }
}

/// An ordered, growable sequence of [`Pixel`], semantically a multiset of
/// distinct pixels.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PixelList(pub Vec<Pixel>);

impl PixelList {
    pub fn new() -> Self {
        PixelList(Vec::new())
    }

    pub fn push(&mut self, pixel: Pixel) {
        self.0.push(pixel);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Pixel> {
        self.0.iter()
    }

    /// Arithmetic mean of the per-pixel centroids.
    pub fn centroid(&self) -> Coord {
        let n = self.0.len() as f64;
        let (lat, lon) = self.0.iter().map(|p| p.centroid()).fold((0.0, 0.0), |(lat, lon), c| {
            (lat + c.lat, lon + c.lon)
        });
        Coord::new(lat / n, lon / n)
    }

    /// Sum of finite `power` values.
    pub fn total_power(&self) -> f64 {
        self.0.iter().map(|p| p.power).filter(|v| v.is_finite()).sum()
    }

    /// Sum of finite `area` values.
    pub fn total_area(&self) -> f64 {
        self.0.iter().map(|p| p.area).filter(|v| v.is_finite()).sum()
    }

    /// Max of finite `temperature` values, or [`MISSING`] if none are finite.
    pub fn max_temperature(&self) -> f64 {
        self.0
            .iter()
            .map(|p| p.temperature)
            .filter(|v| v.is_finite())
            .fold(MISSING, f64::max)
    }

    /// Max `scan_angle` across all pixels.
    pub fn max_scan_angle(&self) -> f64 {
        self.0.iter().map(|p| p.scan_angle).fold(0.0, f64::max)
    }

    pub fn bounding_box(&self) -> Option<BoundingBox> {
        let mut iter = self.0.iter();
        let first = iter.next()?.bounding_box();
        Some(iter.fold(first, |acc, p| acc.union(&p.bounding_box())))
    }

    /// True iff any pixel of `self` overlaps or is adjacent to any pixel of
    /// `other`.
    pub fn is_adjacent_or_overlaps(&self, other: &PixelList, eps: f64) -> bool {
        self.0
            .iter()
            .any(|p| other.0.iter().any(|q| p.is_adjacent_or_overlaps(q, eps)))
    }

    /// Aggregate `other` into `self`: pixels equal under ε are merged
    /// (max of power/temperature/area, min of flags); pixels unique to
    /// either side are retained.
    pub fn max_merge(&mut self, other: &PixelList, eps: f64) {
        for incoming in &other.0 {
            if let Some(existing) = self.0.iter_mut().find(|p| p.approx_equal(incoming, eps)) {
                *existing = existing.merged_with(incoming);
            } else {
                self.0.push(*incoming);
            }
        }
    }

    pub fn binary_serialize_buffer_size(&self) -> usize {
        16 + self.0.len() * Pixel::RECORD_LEN
    }

    /// Length-prefixed, little-endian binary form: an 8-byte count, an
    /// 8-byte capacity (equal to the count on read-back), then one
    /// fixed-size record per pixel.
    pub fn binary_serialize(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.binary_serialize_buffer_size());
        let len = self.0.len() as u64;
        buf.extend_from_slice(&len.to_le_bytes());
        buf.extend_from_slice(&len.to_le_bytes());
        for pixel in &self.0 {
            pixel
                .write_to(&mut buf)
                .expect("write to Vec<u8> is infallible");
        }
        buf
    }

    pub fn binary_deserialize(buf: &[u8]) -> io::Result<PixelList> {
        let mut cursor = io::Cursor::new(buf);

        let mut len_buf = [0u8; 8];
        cursor.read_exact(&mut len_buf)?;
        let len = u64::from_le_bytes(len_buf) as usize;

        cursor.read_exact(&mut len_buf)?;
        let capacity = u64::from_le_bytes(len_buf) as usize;
        if capacity != len {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "pixel list capacity does not match length on deserialize",
            ));
        }

        let mut pixels = Vec::with_capacity(len);
        for _ in 0..len {
            pixels.push(Pixel::read_from(&mut cursor)?);
        }

        Ok(PixelList(pixels))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn square(lat0: f64, lon0: f64, lat1: f64, lon1: f64, power: f64) -> Pixel {
        Pixel {
            ul: Coord::new(lat1, lon0),
            ur: Coord::new(lat1, lon1),
            lr: Coord::new(lat0, lon1),
            ll: Coord::new(lat0, lon0),
            power,
            area: 1000.0,
            temperature: 310.0,
            scan_angle: 10.0,
            mask_flag: 10,
            data_quality_flag: 0,
        }
    }

    #[test]
    fn pixel_list_reductions() {
        let mut list = PixelList::new();
        list.push(square(44.0, -120.0, 45.0, -119.0, 5.0));
        list.push(square(45.0, -120.0, 46.0, -119.0, 7.0));

        assert_eq!(list.total_power(), 12.0);
        assert!((list.max_scan_angle() - 10.0).abs() < 1.0e-9);
    }

    #[test]
    fn binary_round_trip() {
        let mut list = PixelList::new();
        for i in 0..9 {
            let lat0 = 43.0 + (i / 3) as f64;
            let lon0 = -121.0 + (i % 3) as f64;
            list.push(square(lat0, lon0, lat0 + 1.0, lon0 + 1.0, i as f64));
        }

        let buf = list.binary_serialize();
        assert_eq!(buf.len(), list.binary_serialize_buffer_size());

        let decoded = PixelList::binary_deserialize(&buf).unwrap();
        assert_eq!(decoded.len(), list.len());
        for (a, b) in list.iter().zip(decoded.iter()) {
            assert!(a.approx_equal(b, f64::MIN_POSITIVE));
        }
    }

    #[test]
    fn max_merge_keeps_uniques_and_merges_duplicates() {
        let mut a = PixelList::new();
        a.push(square(44.0, -120.0, 45.0, -119.0, 5.0));

        let mut b = PixelList::new();
        b.push(square(44.0, -120.0, 45.0, -119.0, 9.0));
        b.push(square(45.0, -120.0, 46.0, -119.0, 3.0));

        a.max_merge(&b, DEFAULT_EPSILON);

        assert_eq!(a.len(), 2);
        assert_eq!(a.0[0].power, 9.0);
    }
}
