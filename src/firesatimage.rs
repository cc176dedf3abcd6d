/*!
 * Decodes a single FDC NetCDF scan file into a [`ClusterList`].
 *
 * Kept deliberately thin: format/geolocation decoding is a collaborator the
 * clustering engine doesn't need to know about, grounded in the teacher's
 * GDAL-based draft but updated to the current [`Pixel`]/[`FirePoint`] shape.
 */

use crate::cluster::{cluster_fire_points, ClusterList};
use crate::pixel::{FirePoint, Pixel};
use crate::satellite::{parse_satellite_description_from_file_name, Satellite, Sector};
use crate::SatFireResult;
use chrono::{DateTime, Utc};
use gdal::raster::Buffer;
use gdal::spatial_ref::{CoordTransform, SpatialRef};
use gdal::Dataset;
use std::path::Path;

struct FireSatImage {
    dataset: Dataset,
    satellite: Satellite,
    sector: Sector,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl FireSatImage {
    fn open(path: &Path) -> SatFireResult<Self> {
        let fname = path
            .file_name()
            .ok_or("scan path has no file name component")?
            .to_string_lossy();

        let (satellite, sector, start, end) = parse_satellite_description_from_file_name(&fname)
            .ok_or("scan file name carries no recognizable satellite/sector/time marker")?;

        let open_path = format!("NETCDF:\"{}\":Power", path.to_string_lossy());
        let dataset = Dataset::open(Path::new(&open_path))?;

        Ok(FireSatImage {
            dataset,
            satellite,
            sector,
            start,
            end,
        })
    }

    fn band_as_f64(&self, subdataset_suffix: &str, path: &Path, band: usize) -> SatFireResult<Vec<f64>> {
        let open_path = format!("NETCDF:\"{}\":{}", path.to_string_lossy(), subdataset_suffix);
        let dataset = Dataset::open(Path::new(&open_path))?;
        let rasterband = dataset.rasterband(band)?;
        let Buffer { data, .. } = rasterband.read_band_as::<f64>()?;
        Ok(data)
    }

    /// Decode every above-threshold pixel into a [`FirePoint`] with its
    /// `(x, y)` grid coordinates and geolocated quadrilateral footprint.
    fn extract_fire_points(&self, path: &Path) -> SatFireResult<Vec<FirePoint>> {
        let rasterband = self.dataset.rasterband(1)?;
        let Buffer {
            data: power,
            size: (x_size, y_size),
        } = rasterband.read_band_as::<f64>()?;

        let temp = self.band_as_f64("Temp", path, 1).unwrap_or_else(|_| vec![f64::NEG_INFINITY; power.len()]);
        let area = self.band_as_f64("Area", path, 1).unwrap_or_else(|_| vec![f64::NEG_INFINITY; power.len()]);
        let mask = self.band_as_f64("Mask", path, 1).unwrap_or_else(|_| vec![0.0; power.len()]);
        let dqf = self.band_as_f64("DQF", path, 1).unwrap_or_else(|_| vec![0.0; power.len()]);

        let src_srs = self.dataset.spatial_ref()?;
        let dst_srs = SpatialRef::from_epsg(4326)?;
        let trans = CoordTransform::new(&src_srs, &dst_srs)?;
        let gtrans = self.dataset.geo_transform()?;

        let mut points = Vec::new();

        for j in 0..y_size {
            for i in 0..x_size {
                let idx = j * x_size + i;
                let pwr = power[idx];
                if !(pwr > 0.0) {
                    continue;
                }

                let ii = i as f64;
                let jj = j as f64;

                let mut xs = [ii - 0.5, ii + 0.5, ii + 0.5, ii - 0.5];
                let mut ys = [jj - 0.5, jj - 0.5, jj + 0.5, jj + 0.5];
                let mut zs = [0.0_f64; 4];

                for k in 0..4 {
                    let (px, py) = (xs[k], ys[k]);
                    xs[k] = gtrans[0] + gtrans[1] * px + gtrans[2] * py;
                    ys[k] = gtrans[3] + gtrans[4] * px + gtrans[5] * py;
                }

                trans.transform_coords(&mut xs, &mut ys, &mut zs)?;

                let pixel = Pixel {
                    ul: crate::geo::Coord::new(ys[3], xs[3]),
                    ur: crate::geo::Coord::new(ys[2], xs[2]),
                    lr: crate::geo::Coord::new(ys[1], xs[1]),
                    ll: crate::geo::Coord::new(ys[0], xs[0]),
                    power: pwr,
                    area: area[idx],
                    temperature: temp[idx],
                    scan_angle: 0.0,
                    mask_flag: mask[idx] as i16,
                    data_quality_flag: dqf[idx] as i16,
                };

                points.push(FirePoint {
                    pixel,
                    x: i as i32 + 1,
                    y: j as i32 + 1,
                });
            }
        }

        Ok(points)
    }
}

/// Decode one scan file into its per-scan [`ClusterList`].
///
/// On decode failure (missing/garbled satellite description, unreadable
/// raster), returns [`ClusterList::decode_failure`] rather than an `Err` so
/// callers can route a bad file to the pipeline's error-tracking path
/// without tearing down the worker.
pub fn decode_scan_file(path: &Path) -> ClusterList {
    match decode_scan_file_inner(path) {
        Ok(clist) => clist,
        Err(e) => ClusterList::decode_failure(e.to_string()),
    }
}

fn decode_scan_file_inner(path: &Path) -> SatFireResult<ClusterList> {
    let image = FireSatImage::open(path)?;
    let mut points = image.extract_fire_points(path)?;

    let clusters = cluster_fire_points(&mut points);

    let mut clist = ClusterList::new(image.satellite, image.sector, image.start, image.end);
    for cluster in clusters {
        clist.push(cluster);
    }

    Ok(clist)
}
