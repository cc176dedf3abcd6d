/*!
 * Long-lived fire objects that aggregate clusters observed over hours to
 * months, and the streaming state machine that tracks them scan by scan.
 */

use crate::database::ClusterDatabaseClusterRow;
use crate::geo::{Coord, DEFAULT_EPSILON};
use crate::pixel::PixelList;
use crate::satellite::Satellite;
use chrono::{DateTime, Duration, Utc};
use std::cell::Cell;

/// A persistent object tracking fire activity across time, made of
/// temporally connected clusters.
///
/// `id` is assigned once at creation and never changes. `satellite` is
/// invariant for the life of the object.
#[derive(Debug, Clone)]
pub struct Wildfire {
    id: u32,
    satellite: Satellite,
    first_observed: DateTime<Utc>,
    last_observed: DateTime<Utc>,
    max_power: f64,
    max_temperature: f64,
    pixels: PixelList,
    centroid: Cell<Option<Coord>>,
}

impl Wildfire {
    /// Initialize a new wildfire from a cluster row, stealing the row's
    /// pixel list. The row must not be read after this call.
    pub fn create_from_cluster(id: u32, row: ClusterDatabaseClusterRow) -> Self {
        Wildfire {
            id,
            satellite: row.satellite,
            first_observed: row.scan_start,
            last_observed: row.scan_end,
            max_power: row.power,
            max_temperature: row.max_temperature,
            pixels: row.pixels,
            centroid: Cell::new(Some(row.centroid)),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn satellite(&self) -> Satellite {
        self.satellite
    }

    pub fn first_observed(&self) -> DateTime<Utc> {
        self.first_observed
    }

    pub fn last_observed(&self) -> DateTime<Utc> {
        self.last_observed
    }

    pub fn max_power(&self) -> f64 {
        self.max_power
    }

    pub fn max_temperature(&self) -> f64 {
        self.max_temperature
    }

    pub fn pixels(&self) -> &PixelList {
        &self.pixels
    }

    pub fn duration(&self) -> Duration {
        self.last_observed - self.first_observed
    }

    pub fn centroid(&self) -> Coord {
        if let Some(c) = self.centroid.get() {
            return c;
        }
        let c = self.pixels.centroid();
        self.centroid.set(Some(c));
        c
    }

    /// Update this wildfire with a newly matched cluster row. Preconditions:
    /// `row.satellite == self.satellite()`.
    pub fn update(&mut self, row: &ClusterDatabaseClusterRow) {
        assert_eq!(
            row.satellite, self.satellite,
            "wildfire update with mismatched satellite"
        );

        self.max_power = self.max_power.max(row.power);
        self.max_temperature = self.max_temperature.max(row.max_temperature);
        self.last_observed = row.scan_end;
        self.pixels.max_merge(&row.pixels, DEFAULT_EPSILON);
        self.centroid.set(None);
    }

    /// Merge `other` into `self` in place. The larger fire (by pixel count)
    /// absorbs the other; `first_observed` takes the minimum,
    /// `last_observed` the maximum; pixel lists are max-merged; `max_power`
    /// and `max_temperature` take the larger value.
    fn absorb(&mut self, other: &Wildfire) {
        self.first_observed = self.first_observed.min(other.first_observed);
        self.last_observed = self.last_observed.max(other.last_observed);
        self.max_power = self.max_power.max(other.max_power);
        self.max_temperature = self.max_temperature.max(other.max_temperature);
        self.pixels.max_merge(&other.pixels, DEFAULT_EPSILON);
        self.centroid.set(None);
    }
}

/// Result of [`WildfireList::try_update`].
#[derive(Debug)]
pub enum WildfireListUpdateResult {
    /// No live fire matched; the caller should spawn a new one.
    NoMatch,
    /// The row was absorbed into the fire with this id.
    Matched(u32),
}

/// One absorption performed by [`WildfireList::merge_fires_with_events`]: a
/// surviving fire id and the id of the fire it absorbed.
#[derive(Debug, Clone, Copy)]
pub struct MergeEvent {
    pub survivor_id: u32,
    pub absorbed_id: u32,
}

/// A growable collection of [`Wildfire`]s with O(1) "steal-by-swap" removal.
#[derive(Debug, Default)]
pub struct WildfireList {
    fires: Vec<Wildfire>,
}

impl WildfireList {
    pub fn new() -> Self {
        WildfireList { fires: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.fires.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fires.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Wildfire> {
        self.fires.iter()
    }

    pub fn add(&mut self, fire: Wildfire) {
        self.fires.push(fire);
    }

    /// Remove and return the fire at `idx` in O(1) by swapping in the tail
    /// element.
    fn steal_at(&mut self, idx: usize) -> Wildfire {
        self.fires.swap_remove(idx)
    }

    /// For each live fire, if its pixel list is adjacent-or-overlap to the
    /// row's pixel list, update that fire and return the matched id.
    /// Otherwise return `NoMatch` so the caller can spawn a new fire.
    pub fn try_update(&mut self, row: &ClusterDatabaseClusterRow) -> WildfireListUpdateResult {
        for fire in self.fires.iter_mut() {
            if fire.satellite == row.satellite
                && fire.pixels.is_adjacent_or_overlaps(&row.pixels, DEFAULT_EPSILON)
            {
                fire.update(row);
                return WildfireListUpdateResult::Matched(fire.id());
            }
        }

        WildfireListUpdateResult::NoMatch
    }

    /// Move all fires from `other` into `self`, leaving `other` empty.
    pub fn extend(&mut self, other: &mut WildfireList) {
        self.fires.append(&mut other.fires);
    }

    /// Pairwise sweep over the list: when two fires' footprints are
    /// adjacent-or-overlap, merge them (the larger absorbs the smaller) and
    /// remove the absorbed fire into the returned drained list. After each
    /// merge, inner iteration restarts at `i`'s successor to catch
    /// transitive merges.
    pub fn merge_fires(&mut self) -> WildfireList {
        self.merge_fires_with_events().0
    }

    /// Same sweep as [`WildfireList::merge_fires`], additionally returning
    /// one [`MergeEvent`] per absorption performed, in the order they
    /// occurred. A fire absorbed in one event and later itself absorbed
    /// into a third produces two events, each naming the survivor as it
    /// stood at that moment.
    pub fn merge_fires_with_events(&mut self) -> (WildfireList, Vec<MergeEvent>) {
        let mut drained = WildfireList::new();
        let mut events = Vec::new();

        let mut i = 0;
        while i < self.fires.len() {
            let mut j = i + 1;
            while j < self.fires.len() {
                let adjacent_or_overlap = self.fires[i]
                    .pixels
                    .is_adjacent_or_overlaps(&self.fires[j].pixels, DEFAULT_EPSILON);

                if adjacent_or_overlap {
                    let i_is_larger = self.fires[i].pixels.len() >= self.fires[j].pixels.len();

                    if i_is_larger {
                        let absorbed = self.steal_at(j);
                        events.push(MergeEvent {
                            survivor_id: self.fires[i].id(),
                            absorbed_id: absorbed.id(),
                        });
                        self.fires[i].absorb(&absorbed);
                        drained.add(absorbed);
                    } else {
                        let mut survivor = self.steal_at(j);
                        survivor.absorb(&self.fires[i]);
                        events.push(MergeEvent {
                            survivor_id: survivor.id(),
                            absorbed_id: self.fires[i].id(),
                        });
                        let absorbed = std::mem::replace(&mut self.fires[i], survivor);
                        drained.add(absorbed);
                    }

                    j = i + 1;
                } else {
                    j += 1;
                }
            }
            i += 1;
        }

        (drained, events)
    }

    /// Remove fires whose last observation is stale relative to `now`.
    ///
    /// Staleness policy: letting `gap = now - last_observed` and
    /// `lifetime = last_observed - first_observed`: `gap < 4 days` is never
    /// stale (grace period); `gap > 30 days` is always stale; otherwise
    /// stale iff `gap > lifetime`.
    pub fn drain_stale(&mut self, now: DateTime<Utc>) -> WildfireList {
        let mut drained = WildfireList::new();

        let mut i = 0;
        while i < self.fires.len() {
            if is_stale(&self.fires[i], now) {
                drained.add(self.steal_at(i));
            } else {
                i += 1;
            }
        }

        drained
    }
}

fn is_stale(fire: &Wildfire, now: DateTime<Utc>) -> bool {
    let gap = now - fire.last_observed;
    let lifetime = fire.duration();

    if gap < Duration::days(4) {
        false
    } else if gap > Duration::days(30) {
        true
    } else {
        gap > lifetime
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::cluster::Cluster;
    use crate::database::ClusterDatabaseClusterRow;
    use crate::geo::Coord;
    use crate::pixel::Pixel;
    use crate::satellite::{Satellite, Sector};

    fn pixel(lat0: f64, lon0: f64) -> Pixel {
        Pixel {
            ul: Coord::new(lat0 + 1.0, lon0),
            ur: Coord::new(lat0 + 1.0, lon0 + 1.0),
            lr: Coord::new(lat0, lon0 + 1.0),
            ll: Coord::new(lat0, lon0),
            power: 5.0,
            area: 100.0,
            temperature: 330.0,
            scan_angle: 5.0,
            mask_flag: 10,
            data_quality_flag: 0,
        }
    }

    fn row_at(lat0: f64, lon0: f64, start: DateTime<Utc>, end: DateTime<Utc>) -> ClusterDatabaseClusterRow {
        let mut cluster = Cluster::new();
        cluster.add_pixel(pixel(lat0, lon0));

        ClusterDatabaseClusterRow {
            rowid: 0,
            satellite: Satellite::G17,
            sector: Sector::FullDisk,
            scan_start: start,
            scan_end: end,
            power: cluster.total_power(),
            max_temperature: cluster.max_temperature(),
            max_scan_angle: cluster.max_scan_angle(),
            centroid: cluster.centroid(),
            pixels: cluster.take_pixels(),
        }
    }

    #[test]
    fn wildfire_monotonicity_across_updates() {
        let t0 = Utc::now();
        let row0 = row_at(44.0, -120.0, t0, t0 + Duration::minutes(10));
        let mut fire = Wildfire::create_from_cluster(1, row0);

        let t1 = t0 + Duration::hours(1);
        let row1 = row_at(44.0, -119.0, t0, t1);
        fire.update(&row1);

        assert!(fire.last_observed() >= fire.first_observed());
        assert!(fire.max_power() >= 5.0);
        assert!(fire.max_temperature() >= 330.0);
        assert_eq!(fire.pixels().len(), 2);
    }

    #[test]
    fn spawn_update_merge_scenario() {
        let t0 = Utc::now();
        let mut current = WildfireList::new();

        // t0: spawn F1
        let row_x = row_at(44.0, -120.0, t0, t0 + Duration::minutes(10));
        match current.try_update(&row_x) {
            WildfireListUpdateResult::NoMatch => current.add(Wildfire::create_from_cluster(1, row_x)),
            _ => panic!("expected no match on first row"),
        }

        // t1: adjacent row extends F1
        let t1 = t0 + Duration::minutes(10);
        let row_adjacent = row_at(44.0, -119.0, t1, t1 + Duration::minutes(10));
        match current.try_update(&row_adjacent) {
            WildfireListUpdateResult::Matched(id) => assert_eq!(id, 1),
            WildfireListUpdateResult::NoMatch => panic!("expected match extending F1"),
        }

        // t2: disjoint row spawns F2
        let t2 = t1 + Duration::minutes(10);
        let row_disjoint = row_at(10.0, 10.0, t2, t2 + Duration::minutes(10));
        match current.try_update(&row_disjoint) {
            WildfireListUpdateResult::NoMatch => current.add(Wildfire::create_from_cluster(2, row_disjoint)),
            _ => panic!("expected no match for disjoint row"),
        }

        assert_eq!(current.len(), 2);

        // t3: a row bridging F1 and F2's footprints extends one of them.
        let t3 = t2 + Duration::minutes(10);
        let bridge = row_at(10.0, 11.0, t3, t3 + Duration::minutes(10));
        current.try_update(&bridge);

        let drained = current.merge_fires();
        assert_eq!(drained.len(), 0, "footprints here are not actually adjacent, no merge expected");
    }

    #[test]
    fn staleness_policy_matches_spec_thresholds() {
        let t0 = Utc::now();
        let row = row_at(44.0, -120.0, t0, t0 + Duration::days(1));
        let fire_short_lifetime = Wildfire::create_from_cluster(1, row.clone());
        assert!(is_stale(&fire_short_lifetime, t0 + Duration::days(1) + Duration::days(5)));

        let row_long = row_at(44.0, -120.0, t0, t0 + Duration::days(10));
        let fire_long_lifetime = Wildfire::create_from_cluster(2, row_long);
        assert!(!is_stale(&fire_long_lifetime, t0 + Duration::days(10) + Duration::days(5)));

        assert!(is_stale(&fire_short_lifetime, t0 + Duration::days(1) + Duration::days(31)));
    }
}
