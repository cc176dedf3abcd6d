/*!
 * Persistence: the clusters/no_fire store written by the find-fire driver,
 * and the fires/merges store written by the connect-fire driver.
 */

use crate::cluster::{Cluster, ClusterList};
use crate::fire::Wildfire;
use crate::geo::{BoundingBox, Coord};
use crate::pixel::PixelList;
use crate::satellite::{Satellite, Sector};
use crate::SatFireResult;
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection, OpenFlags};
use std::path::Path;
use std::time::Duration as StdDuration;

fn open_read_write_create(path: impl AsRef<Path>) -> SatFireResult<Connection> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    conn.busy_timeout(StdDuration::from_secs(5))?;
    Ok(conn)
}

fn satellite_to_str(sat: Satellite) -> &'static str {
    sat.name()
}

fn satellite_from_str(s: &str) -> SatFireResult<Satellite> {
    match s {
        "G16" => Ok(Satellite::G16),
        "G17" => Ok(Satellite::G17),
        other => Err(format!("unrecognized satellite code in database row: {other}").into()),
    }
}

fn sector_to_str(sector: Sector) -> &'static str {
    sector.name()
}

fn sector_from_str(s: &str) -> SatFireResult<Sector> {
    match s {
        "FDCF" => Ok(Sector::FullDisk),
        "FDCC" => Ok(Sector::Conus),
        "FDCM1" => Ok(Sector::Meso1),
        "FDCM2" => Ok(Sector::Meso2),
        other => Err(format!("unrecognized sector code in database row: {other}").into()),
    }
}

fn timestamp_to_epoch(t: DateTime<Utc>) -> i64 {
    t.timestamp()
}

fn epoch_to_timestamp(secs: i64) -> SatFireResult<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .ok_or_else(|| "invalid epoch seconds stored in database".into())
}

/// Storage representation of a single cluster as queried from persistence.
#[derive(Debug, Clone)]
pub struct ClusterDatabaseClusterRow {
    pub rowid: i64,
    pub satellite: Satellite,
    pub sector: Sector,
    pub scan_start: DateTime<Utc>,
    pub scan_end: DateTime<Utc>,
    pub power: f64,
    pub max_temperature: f64,
    pub max_scan_angle: f64,
    pub centroid: Coord,
    pub pixels: PixelList,
}

fn row_to_cluster_row(row: &rusqlite::Row) -> rusqlite::Result<ClusterDatabaseClusterRow> {
    let sat_str: String = row.get("satellite")?;
    let sector_str: String = row.get("sector")?;
    let scan_start: i64 = row.get("scan_start")?;
    let scan_end: i64 = row.get("scan_end")?;
    let lat: f64 = row.get("lat")?;
    let lon: f64 = row.get("lon")?;
    let power: f64 = row.get("power")?;
    let max_temperature: f64 = row.get("max_temperature")?;
    let max_scan_angle: f64 = row.get("max_scan_angle")?;
    let pixels_blob: Vec<u8> = row.get("pixels")?;
    let rowid: i64 = row.get("rowid")?;

    let satellite = satellite_from_str(&sat_str)
        .map_err(|e| rusqlite::Error::InvalidColumnType(0, e.to_string(), rusqlite::types::Type::Text))?;
    let sector = sector_from_str(&sector_str)
        .map_err(|e| rusqlite::Error::InvalidColumnType(0, e.to_string(), rusqlite::types::Type::Text))?;
    let pixels = PixelList::binary_deserialize(&pixels_blob)
        .map_err(|e| rusqlite::Error::InvalidColumnType(0, e.to_string(), rusqlite::types::Type::Blob))?;

    Ok(ClusterDatabaseClusterRow {
        rowid,
        satellite,
        sector,
        scan_start: epoch_to_timestamp(scan_start)
            .map_err(|e| rusqlite::Error::InvalidColumnType(0, e.to_string(), rusqlite::types::Type::Integer))?,
        scan_end: epoch_to_timestamp(scan_end)
            .map_err(|e| rusqlite::Error::InvalidColumnType(0, e.to_string(), rusqlite::types::Type::Integer))?,
        power,
        max_temperature,
        max_scan_angle,
        centroid: Coord::new(lat, lon),
        pixels,
    })
}

/// The `clusters`/`no_fire` store written by the find-fire driver.
pub struct ClusterDatabase {
    conn: Connection,
}

impl ClusterDatabase {
    pub fn connect(path: impl AsRef<Path>) -> SatFireResult<Self> {
        let conn = open_read_write_create(path)?;
        conn.execute_batch(include_str!("database/create_cluster_db.sql"))?;
        Ok(ClusterDatabase { conn })
    }

    /// Most recent `scan_start` on record for a satellite/sector pair, if
    /// any row exists.
    pub fn newest_scan_start(
        &self,
        sat: Satellite,
        sector: Sector,
    ) -> SatFireResult<Option<DateTime<Utc>>> {
        let max_start: Option<i64> = self.conn.query_row(
            "SELECT MAX(scan_start) FROM clusters WHERE satellite = ?1 AND sector = ?2",
            params![satellite_to_str(sat), sector_to_str(sector)],
            |row| row.get(0),
        )?;

        max_start.map(epoch_to_timestamp).transpose()
    }

    pub fn prepare_to_add_clusters(&self) -> SatFireResult<ClusterDatabaseAddCluster<'_>> {
        let add_cluster_stmt = self
            .conn
            .prepare(include_str!("database/add_cluster_row.sql"))?;
        let add_no_fire_stmt = self
            .conn
            .prepare(include_str!("database/add_no_fire_row.sql"))?;

        Ok(ClusterDatabaseAddCluster {
            conn: &self.conn,
            add_cluster_stmt,
            add_no_fire_stmt,
        })
    }

    pub fn prepare_to_query_clusters_present(&self) -> SatFireResult<ClusterDatabaseQueryClusterPresent<'_>> {
        let present_stmt = self.conn.prepare(
            "SELECT COUNT(*) FROM clusters
             WHERE satellite = ?1 AND sector = ?2 AND scan_start = ?3 AND scan_end = ?4",
        )?;
        let no_fire_stmt = self.conn.prepare(
            "SELECT COUNT(*) FROM no_fire
             WHERE satellite = ?1 AND sector = ?2 AND scan_start = ?3 AND scan_end = ?4",
        )?;

        Ok(ClusterDatabaseQueryClusterPresent {
            present_stmt,
            no_fire_stmt,
        })
    }

    /// Query cluster rows ordered by `scan_start` ascending, with all
    /// filters optional.
    pub fn query_clusters(
        &self,
        sat: Option<Satellite>,
        sector: Option<Sector>,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        area: Option<BoundingBox>,
    ) -> SatFireResult<Vec<ClusterDatabaseClusterRow>> {
        let mut sql = String::from("SELECT rowid, * FROM clusters WHERE 1=1");
        if sat.is_some() {
            sql.push_str(" AND satellite = :sat");
        }
        if sector.is_some() {
            sql.push_str(" AND sector = :sector");
        }
        if start.is_some() {
            sql.push_str(" AND scan_start >= :start");
        }
        if end.is_some() {
            sql.push_str(" AND scan_end <= :end");
        }
        if area.is_some() {
            sql.push_str(" AND lat >= :lat_lo AND lat <= :lat_hi AND lon >= :lon_lo AND lon <= :lon_hi");
        }
        sql.push_str(" ORDER BY scan_start ASC");

        let mut stmt = self.conn.prepare(&sql)?;

        let mut named_params: Vec<(&str, &dyn rusqlite::ToSql)> = Vec::new();
        let sat_str = sat.map(satellite_to_str);
        let sector_str = sector.map(sector_to_str);
        let start_epoch = start.map(timestamp_to_epoch);
        let end_epoch = end.map(timestamp_to_epoch);
        let (lat_lo, lat_hi, lon_lo, lon_hi) = area
            .map(|b| (b.ll.lat, b.ur.lat, b.ll.lon, b.ur.lon))
            .unwrap_or((0.0, 0.0, 0.0, 0.0));

        if let Some(s) = &sat_str {
            named_params.push((":sat", s));
        }
        if let Some(s) = &sector_str {
            named_params.push((":sector", s));
        }
        if let Some(s) = &start_epoch {
            named_params.push((":start", s));
        }
        if let Some(e) = &end_epoch {
            named_params.push((":end", e));
        }
        if area.is_some() {
            named_params.push((":lat_lo", &lat_lo));
            named_params.push((":lat_hi", &lat_hi));
            named_params.push((":lon_lo", &lon_lo));
            named_params.push((":lon_hi", &lon_hi));
        }

        let rows = stmt.query_map(named_params.as_slice(), row_to_cluster_row)?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}

/// Batches cluster-row inserts inside one transaction per [`ClusterList`].
pub struct ClusterDatabaseAddCluster<'conn> {
    conn: &'conn Connection,
    add_cluster_stmt: rusqlite::Statement<'conn>,
    add_no_fire_stmt: rusqlite::Statement<'conn>,
}

impl<'conn> ClusterDatabaseAddCluster<'conn> {
    /// Persist one scan's `ClusterList`: an empty list is recorded as a
    /// `no_fire` marker; otherwise every cluster's row is inserted
    /// atomically in one transaction.
    pub fn add(&mut self, clist: &ClusterList) -> SatFireResult<()> {
        let sat = clist.satellite().ok_or("cluster list missing satellite")?;
        let sector = clist.sector().ok_or("cluster list missing sector")?;
        let start = clist.scan_start().ok_or("cluster list missing scan_start")?;
        let end = clist.scan_end().ok_or("cluster list missing scan_end")?;

        if clist.is_empty() {
            self.add_no_fire_stmt.execute(params![
                satellite_to_str(sat),
                sector_to_str(sector),
                timestamp_to_epoch(start),
                timestamp_to_epoch(end),
            ])?;
            return Ok(());
        }

        self.conn.execute_batch("BEGIN")?;
        for cluster in clist.clusters() {
            if let Err(e) = self.add_one(sat, sector, start, end, cluster) {
                self.conn.execute_batch("ROLLBACK")?;
                return Err(e);
            }
        }
        self.conn.execute_batch("COMMIT")?;

        Ok(())
    }

    fn add_one(
        &mut self,
        sat: Satellite,
        sector: Sector,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        cluster: &Cluster,
    ) -> SatFireResult<()> {
        let centroid = cluster.centroid();
        let pixels_blob = cluster.pixels().binary_serialize();

        self.add_cluster_stmt.execute(params![
            satellite_to_str(sat),
            sector_to_str(sector),
            timestamp_to_epoch(start),
            timestamp_to_epoch(end),
            centroid.lat,
            centroid.lon,
            cluster.total_power(),
            cluster.max_temperature(),
            cluster.max_scan_angle(),
            pixels_blob,
        ])?;

        Ok(())
    }
}

/// Answers "is this scan already present (as clusters or a no-fire marker)?"
pub struct ClusterDatabaseQueryClusterPresent<'conn> {
    present_stmt: rusqlite::Statement<'conn>,
    no_fire_stmt: rusqlite::Statement<'conn>,
}

impl<'conn> ClusterDatabaseQueryClusterPresent<'conn> {
    pub fn present(
        &mut self,
        sat: Satellite,
        sector: Sector,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> SatFireResult<bool> {
        let p = params![
            satellite_to_str(sat),
            sector_to_str(sector),
            timestamp_to_epoch(start),
            timestamp_to_epoch(end),
        ];

        let cluster_count: i64 = self.present_stmt.query_row(p, |row| row.get(0))?;
        if cluster_count > 0 {
            return Ok(true);
        }

        let no_fire_count: i64 = self.no_fire_stmt.query_row(p, |row| row.get(0))?;
        Ok(no_fire_count > 0)
    }
}

/// Unused type alias retained for API clarity at call sites; queries return
/// an owned `Vec` rather than a streaming cursor, since a scan's whole
/// result set is small.
pub type ClusterDatabaseQueryClusters = Vec<ClusterDatabaseClusterRow>;

/// The `fires`/`merges` store written by the connect-fire driver.
pub struct FiresDatabase {
    conn: Connection,
}

impl FiresDatabase {
    pub fn connect(path: impl AsRef<Path>) -> SatFireResult<Self> {
        let conn = open_read_write_create(path)?;
        conn.execute_batch(include_str!("database/create_fire_db.sql"))?;
        Ok(FiresDatabase { conn })
    }

    /// The next wildfire id to assign when restarting from a populated
    /// store: the maximum existing id, plus one.
    pub fn next_wildfire_id(&self) -> SatFireResult<u32> {
        let max_id: Option<i64> =
            self.conn
                .query_row("SELECT MAX(fire_id) FROM fires", [], |row| row.get(0))?;
        Ok(max_id.unwrap_or(0) as u32 + 1)
    }

    pub fn prepare_to_add_fires(&self) -> SatFireResult<FiresDatabaseAddFire<'_>> {
        let add_fire_stmt = self.conn.prepare(include_str!("database/add_fire_row.sql"))?;
        Ok(FiresDatabaseAddFire { add_fire_stmt })
    }

    /// Record one absorption performed by `WildfireList::merge_fires`: the
    /// surviving id, the absorbed id, and the time-step at which the merge
    /// was observed. No in-memory graph is kept; this row is the sole
    /// record of the merge.
    pub fn record_merge(
        &self,
        survivor_id: u32,
        absorbed_id: u32,
        merge_time: DateTime<Utc>,
    ) -> SatFireResult<()> {
        self.conn.execute(
            include_str!("database/add_merge_row.sql"),
            params![survivor_id, absorbed_id, timestamp_to_epoch(merge_time)],
        )?;
        Ok(())
    }
}

/// Batches retired-wildfire inserts.
pub struct FiresDatabaseAddFire<'conn> {
    add_fire_stmt: rusqlite::Statement<'conn>,
}

impl<'conn> FiresDatabaseAddFire<'conn> {
    pub fn add(&mut self, fire: &Wildfire) -> SatFireResult<()> {
        let centroid = fire.centroid();
        let pixels_blob = fire.pixels().binary_serialize();

        self.add_fire_stmt.execute(params![
            fire.id(),
            satellite_to_str(fire.satellite()),
            timestamp_to_epoch(fire.first_observed()),
            timestamp_to_epoch(fire.last_observed()),
            centroid.lat,
            centroid.lon,
            fire.max_power(),
            fire.max_temperature(),
            pixels_blob,
        ])?;
        Ok(())
    }
}
