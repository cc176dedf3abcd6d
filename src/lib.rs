/*!
 * Ingests a time-ordered stream of satellite Fire Detection Characteristics
 * (FDC) scans and produces per-scan clusters of spatially connected fire
 * pixels and temporally connected wildfires.
 */

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use std::error::Error;

pub use cluster::{Cluster, ClusterList, ClusterListError};
pub use database::{
    ClusterDatabase, ClusterDatabaseAddCluster, ClusterDatabaseClusterRow,
    ClusterDatabaseQueryClusterPresent, ClusterDatabaseQueryClusters, FiresDatabase,
    FiresDatabaseAddFire,
};
pub use fire::{MergeEvent, Wildfire, WildfireList, WildfireListUpdateResult};
pub use geo::{BoundingBox, Coord, Quad, DEFAULT_EPSILON};
pub use mailbox::Mailbox;
pub use pixel::{FirePoint, Pixel, PixelList};
pub use satellite::{
    parse_satellite_description_from_file_name, DataQualityFlagCode, MaskCode, Satellite, Sector,
};

mod cluster;
mod database;
mod fire;
mod firesatimage;
mod geo;
mod mailbox;
mod pixel;
mod satellite;

pub use firesatimage::decode_scan_file;

/// Convenience alias for any boxed, thread-safe error.
pub type SatFireError = Box<dyn Error + Send + Sync>;
/// Convenience alias for a `Result` using [`SatFireError`].
pub type SatFireResult<T> = Result<T, SatFireError>;

/// Parse the `_sYYYYDDDHHMMSS` scan-start marker out of a scan file name.
pub fn start_time_from_file_name(fname: &str) -> Option<DateTime<Utc>> {
    parse_marker_time(fname, "_s")
}

/// Parse the `_eYYYYDDDHHMMSS` scan-end marker out of a scan file name.
pub fn end_time_from_file_name(fname: &str) -> Option<DateTime<Utc>> {
    parse_marker_time(fname, "_e")
}

fn parse_marker_time(fname: &str, marker: &str) -> Option<DateTime<Utc>> {
    let start = fname.find(marker)? + marker.len();
    let digits: String = fname[start..].chars().take(13).collect();
    if digits.len() < 13 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    let year: i32 = digits[0..4].parse().ok()?;
    let day_of_year: u32 = digits[4..7].parse().ok()?;
    let hour: u32 = digits[7..9].parse().ok()?;
    let minute: u32 = digits[9..11].parse().ok()?;
    let second: u32 = digits[11..13].parse().ok()?;

    let date = NaiveDate::from_yo_opt(year, day_of_year)?;
    let naive = date.and_hms_opt(hour, minute, second)?;

    Some(Utc.from_utc_datetime(&naive))
}

#[cfg(test)]
mod test {
    use super::*;

    const FNAME: &str =
        "OR_ABI-L2-FDCF-M6_G17_s20212130100319_e20212130109386_c20212130109511.nc.zip";

    #[test]
    fn parses_start_time() {
        let start = start_time_from_file_name(FNAME).unwrap();
        assert_eq!(start.format("%Y-%j %H:%M:%S").to_string(), "2021-213 01:00:31");
    }

    #[test]
    fn parses_end_time() {
        let end = end_time_from_file_name(FNAME).unwrap();
        assert_eq!(end.format("%Y-%j %H:%M:%S").to_string(), "2021-213 01:09:38");
    }

    #[test]
    fn start_is_before_end() {
        let start = start_time_from_file_name(FNAME).unwrap();
        let end = end_time_from_file_name(FNAME).unwrap();
        assert!(start < end);
    }

    #[test]
    fn malformed_name_returns_none() {
        assert!(start_time_from_file_name("not_a_scan_file.nc").is_none());
    }
}
