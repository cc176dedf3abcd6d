/*!
 * Geographic types and robust predicates on convex quadrilaterals.
 *
 * These predicates assume small, roughly-planar quadrilaterals and work in
 * plain lat/lon space; they are not a general GIS library and do not do any
 * map projection.
 */

/// Default numeric tolerance used throughout the geometry kernel.
///
/// Never used as a hidden default inside a predicate; every predicate below
/// takes `eps` explicitly. Callers that have no better value reach for this.
pub const DEFAULT_EPSILON: f64 = 1.0e-6;

/// A `(lat, lon)` pair in signed decimal degrees.
///
/// Equality between coordinates is always ε-proximity, never bit-exact; use
/// [`Coord::are_close`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coord {
    pub lat: f64,
    pub lon: f64,
}

impl Coord {
    pub fn new(lat: f64, lon: f64) -> Self {
        Coord { lat, lon }
    }

    /// True if the two coordinates are within `eps` of each other (squared
    /// Euclidean distance in degree-space).
    pub fn are_close(self, other: Coord, eps: f64) -> bool {
        let dlat = self.lat - other.lat;
        let dlon = self.lon - other.lon;
        dlat * dlat + dlon * dlon <= eps * eps
    }
}

/// An axis-aligned bounding box, `ll.lat <= ur.lat` and `ll.lon <= ur.lon`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub ll: Coord,
    pub ur: Coord,
}

impl BoundingBox {
    pub fn new(ll: Coord, ur: Coord) -> Self {
        debug_assert!(ll.lat <= ur.lat);
        debug_assert!(ll.lon <= ur.lon);
        BoundingBox { ll, ur }
    }

    /// `coord_in_box` — true if `c` lies within this box, each bound
    /// expanded by `eps`.
    pub fn contains_coord(&self, c: Coord, eps: f64) -> bool {
        c.lat >= self.ll.lat - eps
            && c.lat <= self.ur.lat + eps
            && c.lon >= self.ll.lon - eps
            && c.lon <= self.ur.lon + eps
    }

    /// `overlap` — true if any corner of one box is contained (with ε) in
    /// the other.
    pub fn overlaps(&self, other: &BoundingBox, eps: f64) -> bool {
        let self_corners = [
            self.ll,
            self.ur,
            Coord::new(self.ll.lat, self.ur.lon),
            Coord::new(self.ur.lat, self.ll.lon),
        ];
        let other_corners = [
            other.ll,
            other.ur,
            Coord::new(other.ll.lat, other.ur.lon),
            Coord::new(other.ur.lat, other.ll.lon),
        ];

        self_corners.iter().any(|c| other.contains_coord(*c, eps))
            || other_corners.iter().any(|c| self.contains_coord(*c, eps))
    }

    /// The smallest box containing both `self` and `other`.
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            ll: Coord::new(self.ll.lat.min(other.ll.lat), self.ll.lon.min(other.ll.lon)),
            ur: Coord::new(self.ur.lat.max(other.ur.lat), self.ur.lon.max(other.ur.lon)),
        }
    }
}

/// A line segment between two coordinates.
#[derive(Debug, Clone, Copy)]
pub struct Line {
    pub start: Coord,
    pub end: Coord,
}

/// Result of [`Line::intersect`].
///
/// `intersect_is_endpoints` is true when the two lines only touch at a
/// shared endpoint — a corner meeting a corner, or a line terminating partway
/// along the other without crossing through it. Callers that want to know
/// whether two shapes genuinely cross (rather than merely touch at a vertex
/// or share an edge) should ignore a result with `intersect_is_endpoints`
/// set.
#[derive(Debug, Clone, Copy)]
pub struct IntersectResult {
    pub intersection: Coord,
    pub intersect_is_endpoints: bool,
}

impl Line {
    fn bbox(&self) -> BoundingBox {
        BoundingBox::new(
            Coord::new(self.start.lat.min(self.end.lat), self.start.lon.min(self.end.lon)),
            Coord::new(self.start.lat.max(self.end.lat), self.start.lon.max(self.end.lon)),
        )
    }

    /// Slope in lat/lon space, treating a vertical segment as `f64::INFINITY`.
    fn slope(&self) -> f64 {
        let dlon = self.end.lon - self.start.lon;
        if dlon.abs() < f64::EPSILON {
            f64::INFINITY
        } else {
            (self.end.lat - self.start.lat) / dlon
        }
    }

    /// Perpendicular distance (in degree-space) from `p` to the infinite
    /// line through this segment.
    fn distance_to_point(&self, p: Coord) -> f64 {
        let dx = self.end.lon - self.start.lon;
        let dy = self.end.lat - self.start.lat;
        let len = (dx * dx + dy * dy).sqrt();
        if len < f64::EPSILON {
            let ddx = p.lon - self.start.lon;
            let ddy = p.lat - self.start.lat;
            return (ddx * ddx + ddy * ddy).sqrt();
        }

        ((p.lon - self.start.lon) * dy - (p.lat - self.start.lat) * dx).abs() / len
    }

    /// Classify the intersection of `self` with `other`, or `None` if they
    /// don't meet within their extents.
    ///
    /// Collinear segments that overlap along more than a single point are a
    /// genuine (non-endpoint) intersection over that whole run, not just at
    /// its tips — so a coordinate sitting partway along a shared edge is
    /// treated the same as a coordinate on a crossing edge. Two segments
    /// that merely touch tip-to-tip, collinear or not, come back endpoint.
    pub fn intersect(&self, other: Line, eps: f64) -> Option<IntersectResult> {
        let collinear = self.distance_to_point(other.start) <= eps
            && self.distance_to_point(other.end) <= eps
            && other.distance_to_point(self.start) <= eps
            && other.distance_to_point(self.end) <= eps;

        if collinear {
            return Self::collinear_overlap(*self, other, eps);
        }

        let m1 = self.slope();
        let m2 = other.slope();

        let both_vertical = m1.is_infinite() && m2.is_infinite();
        let slopes_close = !m1.is_infinite() && !m2.is_infinite() && (m1 - m2).abs() <= eps;

        if both_vertical || slopes_close {
            return None;
        }

        // Solve for the intersection point (x0, y0) of the two infinite lines,
        // where x = lon, y = lat.
        let (x0, y0) = if m1.is_infinite() {
            let x0 = self.start.lon;
            let b2 = other.start.lat - m2 * other.start.lon;
            (x0, m2 * x0 + b2)
        } else if m2.is_infinite() {
            let x0 = other.start.lon;
            let b1 = self.start.lat - m1 * self.start.lon;
            (x0, m1 * x0 + b1)
        } else {
            let b1 = self.start.lat - m1 * self.start.lon;
            let b2 = other.start.lat - m2 * other.start.lon;
            let x0 = (b2 - b1) / (m1 - m2);
            (x0, m1 * x0 + b1)
        };

        let p = Coord::new(y0, x0);

        if !self.bbox().contains_coord(p, eps) || !other.bbox().contains_coord(p, eps) {
            return None;
        }

        let endpoint_of_self = self.start.are_close(p, eps) || self.end.are_close(p, eps);
        let endpoint_of_other = other.start.are_close(p, eps) || other.end.are_close(p, eps);

        Some(IntersectResult {
            intersection: p,
            intersect_is_endpoints: endpoint_of_self && endpoint_of_other,
        })
    }

    /// Intersect two segments already known to be collinear (within `eps`).
    ///
    /// Projects both onto `self`'s own direction and intersects the two
    /// parameter intervals; an overlap of more than a point is a genuine
    /// intersection, an overlap that collapses to a single point (the
    /// segments just meet tip-to-tip) is an endpoint touch.
    fn collinear_overlap(a: Line, b: Line, eps: f64) -> Option<IntersectResult> {
        let dlat = a.end.lat - a.start.lat;
        let dlon = a.end.lon - a.start.lon;
        let scale = (dlat * dlat + dlon * dlon).sqrt();

        if scale < f64::EPSILON {
            // `a` is degenerate (a point). It intersects `b` iff it lies on it.
            return if b.distance_to_point(a.start) <= eps && b.bbox().contains_coord(a.start, eps) {
                Some(IntersectResult { intersection: a.start, intersect_is_endpoints: true })
            } else {
                None
            };
        }

        let param = |p: Coord| -> f64 {
            if dlon.abs() >= dlat.abs() {
                (p.lon - a.start.lon) / dlon
            } else {
                (p.lat - a.start.lat) / dlat
            }
        };

        let (a0, a1) = (0.0_f64, 1.0_f64);
        let (mut b0, mut b1) = (param(b.start), param(b.end));
        if b0 > b1 {
            std::mem::swap(&mut b0, &mut b1);
        }

        let param_eps = eps / scale;
        let lo = a0.max(b0);
        let hi = a1.min(b1);

        if hi < lo - param_eps {
            return None;
        }

        let mid = ((lo + hi) / 2.0).clamp(0.0, 1.0);
        let intersection = Coord::new(a.start.lat + mid * dlat, a.start.lon + mid * dlon);
        let overlap_len = (hi - lo).max(0.0) * scale;

        Some(IntersectResult { intersection, intersect_is_endpoints: overlap_len <= eps })
    }
}

/// True if `self` and `other` intersect at a genuine (non-endpoint) point.
fn crosses(a: Line, b: Line, eps: f64) -> bool {
    matches!(a.intersect(b, eps), Some(res) if !res.intersect_is_endpoints)
}

/// True if `{e0, e1}` and `{f0, f1}` are the same pair of coordinates,
/// regardless of order — i.e. the two edges fully coincide.
fn edges_coincide(e0: Coord, e1: Coord, f0: Coord, f1: Coord, eps: f64) -> bool {
    (e0.are_close(f0, eps) && e1.are_close(f1, eps)) || (e0.are_close(f1, eps) && e1.are_close(f0, eps))
}

/// A convex quadrilateral pixel footprint, corners listed `(ul, ur, lr, ll)`
/// in a consistent winding.
#[derive(Debug, Clone, Copy)]
pub struct Quad {
    pub ul: Coord,
    pub ur: Coord,
    pub lr: Coord,
    pub ll: Coord,
}

impl Quad {
    pub fn new(ul: Coord, ur: Coord, lr: Coord, ll: Coord) -> Self {
        Quad { ul, ur, lr, ll }
    }

    fn edges(&self) -> [(Coord, Coord); 4] {
        [
            (self.ul, self.ur),
            (self.ur, self.lr),
            (self.lr, self.ll),
            (self.ll, self.ul),
        ]
    }

    fn corners(&self) -> [Coord; 4] {
        [self.ul, self.ur, self.lr, self.ll]
    }

    pub fn bounding_box(&self) -> BoundingBox {
        let corners = self.corners();
        let mut ll = corners[0];
        let mut ur = corners[0];
        for c in &corners[1..] {
            ll.lat = ll.lat.min(c.lat);
            ll.lon = ll.lon.min(c.lon);
            ur.lat = ur.lat.max(c.lat);
            ur.lon = ur.lon.max(c.lon);
        }
        BoundingBox::new(ll, ur)
    }

    /// Triangle centroid of three coordinates.
    fn triangle_centroid(a: Coord, b: Coord, c: Coord) -> Coord {
        Coord::new((a.lat + b.lat + c.lat) / 3.0, (a.lon + b.lon + c.lon) / 3.0)
    }

    /// Split by both diagonals into four triangles, connect the centroids of
    /// opposite triangle pairs, and intersect those two segments.
    pub fn centroid(&self) -> Coord {
        let c_ul_ur_center = Quad::triangle_centroid(self.ul, self.ur, self.center_approx());
        let c_lr_ll_center = Quad::triangle_centroid(self.lr, self.ll, self.center_approx());
        let c_ur_lr_center = Quad::triangle_centroid(self.ur, self.lr, self.center_approx());
        let c_ll_ul_center = Quad::triangle_centroid(self.ll, self.ul, self.center_approx());

        let diag1 = Line { start: c_ul_ur_center, end: c_lr_ll_center };
        let diag2 = Line { start: c_ur_lr_center, end: c_ll_ul_center };

        match diag1.intersect(diag2, DEFAULT_EPSILON) {
            // Non-degenerate convex quads always intersect here; anything
            // else is a programming error in the caller's input shape.
            Some(res) => res.intersection,
            None => panic!("pixel centroid undefined for this quad"),
        }
    }

    /// Intersection of the two diagonals, used as the shared apex for the
    /// four triangles in `centroid`.
    fn center_approx(&self) -> Coord {
        let diag1 = Line { start: self.ul, end: self.lr };
        let diag2 = Line { start: self.ur, end: self.ll };

        match diag1.intersect(diag2, DEFAULT_EPSILON) {
            Some(res) => res.intersection,
            None => {
                // Degenerate quad; fall back to the arithmetic mean of the
                // corners rather than panicking on a best-effort centroid.
                let corners = self.corners();
                Coord::new(
                    corners.iter().map(|c| c.lat).sum::<f64>() / 4.0,
                    corners.iter().map(|c| c.lon).sum::<f64>() / 4.0,
                )
            }
        }
    }

    /// True if the two quads are within `eps` of each other, corner for
    /// corner.
    pub fn approx_equal(&self, other: &Quad, eps: f64) -> bool {
        self.ul.are_close(other.ul, eps)
            && self.ur.are_close(other.ur, eps)
            && self.lr.are_close(other.lr, eps)
            && self.ll.are_close(other.ll, eps)
    }

    /// `pixel_contains_coord`: fail fast on the bounding box, then for each
    /// of the four edges form the segment from `c` to each corner; any
    /// genuine (non-endpoint) intersection with an edge means `c` is outside,
    /// whether that's a true crossing or `c` sitting somewhere along the
    /// edge itself.
    pub fn contains_coord(&self, c: Coord, eps: f64) -> bool {
        if !self.bounding_box().contains_coord(c, eps) {
            return false;
        }

        let corners = self.corners();
        for (e0, e1) in self.edges() {
            let edge = Line { start: e0, end: e1 };
            for corner in &corners {
                let coord_line = Line { start: c, end: *corner };
                if crosses(edge, coord_line, eps) {
                    return false;
                }
            }
        }

        true
    }

    fn count_shared_corners(&self, other: &Quad, eps: f64) -> usize {
        let mine = self.corners();
        let theirs = other.corners();
        mine.iter()
            .filter(|m| theirs.iter().any(|t| m.are_close(*t, eps)))
            .count()
    }

    /// `pixels_overlap`. Edges that fully coincide (a shared border between
    /// adjacent pixels) are adjacency, not overlap, and are skipped before
    /// the crossing check.
    pub fn overlaps(&self, other: &Quad, eps: f64) -> bool {
        if self.approx_equal(other, eps) {
            return true;
        }

        if !self.bounding_box().overlaps(&other.bounding_box(), eps) {
            return false;
        }

        for (a0, a1) in self.edges() {
            for (b0, b1) in other.edges() {
                if edges_coincide(a0, a1, b0, b1, eps) {
                    continue;
                }
                if crosses(Line { start: a0, end: a1 }, Line { start: b0, end: b1 }, eps) {
                    return true;
                }
            }
        }

        self.corners().iter().any(|c| other.contains_coord(*c, eps))
            || other.corners().iter().any(|c| self.contains_coord(*c, eps))
    }

    /// `pixels_adjacent`.
    pub fn is_adjacent(&self, other: &Quad, eps: f64) -> bool {
        if self.approx_equal(other, eps) {
            return false;
        }

        if !self.bounding_box().overlaps(&other.bounding_box(), eps) {
            return false;
        }

        let shared = self.count_shared_corners(other, eps);
        if !(1..=2).contains(&shared) {
            return false;
        }

        let mine = self.corners();
        let theirs = other.corners();

        let non_shared_contained = mine
            .iter()
            .filter(|m| !theirs.iter().any(|t| m.are_close(*t, eps)))
            .any(|m| other.contains_coord(*m, eps))
            || theirs
                .iter()
                .filter(|t| !mine.iter().any(|m| m.are_close(**t, eps)))
                .any(|t| self.contains_coord(*t, eps));

        if non_shared_contained {
            return false;
        }

        if self.contains_coord(other.centroid(), eps) || other.contains_coord(self.centroid(), eps) {
            return false;
        }

        true
    }

    /// `pixels_adjacent_or_overlap`.
    pub fn is_adjacent_or_overlaps(&self, other: &Quad, eps: f64) -> bool {
        self.overlaps(other, eps) || self.is_adjacent(other, eps)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn square(lat0: f64, lon0: f64, lat1: f64, lon1: f64) -> Quad {
        Quad::new(
            Coord::new(lat1, lon0),
            Coord::new(lat1, lon1),
            Coord::new(lat0, lon1),
            Coord::new(lat0, lon0),
        )
    }

    #[test]
    fn coord_close_reflexive() {
        let a = Coord::new(45.5, -120.0);
        assert!(a.are_close(a, DEFAULT_EPSILON));
    }

    #[test]
    fn coord_close_within_tolerance() {
        let left = Coord::new(45.5, -120.0);
        let right = Coord::new(45.5000002, -120.0000002);
        assert!(left.are_close(right, 1.0e-6));
        assert!(!left.are_close(right, 1.0e-8));
    }

    #[test]
    fn square_pixel_centroid() {
        let pxl = square(44.0, -120.0, 45.0, -119.0);
        let centroid = pxl.centroid();
        assert!(centroid.are_close(Coord::new(44.5, -119.5), 1.0e-9));
    }

    #[test]
    fn contains_coord_inside_and_outside() {
        let pxl = square(44.0, -120.0, 45.0, -119.0);
        assert!(pxl.contains_coord(Coord::new(44.5, -119.5), 1.0e-6));
        assert!(!pxl.contains_coord(Coord::new(45.5, -119.5), 1.0e-6));
        assert!(!pxl.contains_coord(Coord::new(45.0, -119.5), 1.0e-6));
    }

    #[test]
    fn contains_coord_false_at_shared_vertex() {
        let a = square(44.0, -120.0, 45.0, -119.0);
        let b = square(45.0, -120.0, 46.0, -119.0);
        assert!(!b.contains_coord(a.ul, 1.0e-6));
        assert!(!a.contains_coord(b.ll, 1.0e-6));
    }

    #[test]
    fn adjacent_unit_squares_share_edge() {
        let a = square(44.0, -120.0, 45.0, -119.0);
        let b = square(45.0, -120.0, 46.0, -119.0);
        assert!(a.is_adjacent(&b, 1.0e-6));
        assert!(!a.overlaps(&b, 1.0e-6));
    }

    #[test]
    fn overlap_vs_adjacency_shared_edge_fragment() {
        let a = square(44.0, -120.0, 45.0, -119.0);
        let b = square(44.0, -119.5, 45.0, -118.5);
        assert!(a.overlaps(&b, 1.0e-6));
        assert!(!a.is_adjacent(&b, 1.0e-6));
    }

    #[test]
    fn pixel_overlaps_and_not_adjacent_to_itself() {
        let a = square(44.0, -120.0, 45.0, -119.0);
        assert!(a.overlaps(&a, 1.0e-6));
        assert!(!a.is_adjacent(&a, 1.0e-6));
    }

    #[test]
    fn overlap_and_adjacency_are_symmetric() {
        let a = square(44.0, -120.0, 45.0, -119.0);
        let b = square(44.5, -120.5, 45.5, -119.5);
        assert_eq!(a.overlaps(&b, 1.0e-6), b.overlaps(&a, 1.0e-6));
        assert_eq!(a.is_adjacent(&b, 1.0e-6), b.is_adjacent(&a, 1.0e-6));
    }
}
