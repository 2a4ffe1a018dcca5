use geo::HaversineDistance;
use geo::Point;
use rstar::{primitives::GeomWithData, RTree, AABB};
use serde::{Deserialize, Serialize};

/// Metres per degree of latitude (spherical approximation)
const METERS_PER_DEGREE: f64 = 111_320.0;

/// R-tree over `[lon, lat]` points carrying a `u32` payload
pub type PointIndex = RTree<GeomWithData<[f64; 2], u32>>;

pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let p1 = Point::new(lon1, lat1);
    let p2 = Point::new(lon2, lat2);
    p1.haversine_distance(&p2)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub min_lat: f64,
    pub min_lon: f64,
    pub max_lat: f64,
    pub max_lon: f64,
}

impl BBox {
    pub fn around(lat: f64, lon: f64) -> Self {
        Self {
            min_lat: lat,
            min_lon: lon,
            max_lat: lat,
            max_lon: lon,
        }
    }

    pub fn extend(&mut self, lat: f64, lon: f64) {
        self.min_lat = self.min_lat.min(lat);
        self.min_lon = self.min_lon.min(lon);
        self.max_lat = self.max_lat.max(lat);
        self.max_lon = self.max_lon.max(lon);
    }
}

pub fn build_index(points: impl IntoIterator<Item = (u32, f64, f64)>) -> PointIndex {
    let entries = points
        .into_iter()
        .map(|(id, lat, lon)| GeomWithData::new([lon, lat], id))
        .collect();
    RTree::bulk_load(entries)
}

/// Nearest indexed point, accepted only if it lies within `max_meters`.
///
/// The search runs in degree space and is confirmed with the haversine
/// distance, which is accurate enough at linking distances.
pub fn nearest_within(index: &PointIndex, lat: f64, lon: f64, max_meters: f64) -> Option<(u32, f64)> {
    let nearest = index.nearest_neighbor(&[lon, lat])?;
    let [n_lon, n_lat] = *nearest.geom();
    let distance = haversine_distance(lat, lon, n_lat, n_lon);
    (distance <= max_meters).then_some((nearest.data, distance))
}

/// All indexed points within `radius_meters`, sorted by distance then id
pub fn within_radius(index: &PointIndex, lat: f64, lon: f64, radius_meters: f64) -> Vec<(u32, f64)> {
    let d_lat = radius_meters / METERS_PER_DEGREE;
    let d_lon = radius_meters / (METERS_PER_DEGREE * lat.to_radians().cos().abs().max(0.01));
    let envelope = AABB::from_corners([lon - d_lon, lat - d_lat], [lon + d_lon, lat + d_lat]);

    let mut hits: Vec<(u32, f64)> = index
        .locate_in_envelope(&envelope)
        .filter_map(|point| {
            let [p_lon, p_lat] = *point.geom();
            let distance = haversine_distance(lat, lon, p_lat, p_lon);
            (distance <= radius_meters).then_some((point.data, distance))
        })
        .collect();
    hits.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
    hits
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_haversine_one_degree_latitude() {
        let d = haversine_distance(50.0, 4.0, 51.0, 4.0);
        assert!((d - 111_195.0).abs() < 500.0, "got {d}");
    }

    #[test]
    fn test_nearest_within_respects_limit() {
        let index = build_index(vec![(1, 50.0, 4.0), (2, 50.01, 4.0)]);
        let (id, dist) = nearest_within(&index, 50.0001, 4.0, 50.0).unwrap();
        assert_eq!(id, 1);
        assert!(dist < 20.0);
        assert!(nearest_within(&index, 50.005, 4.0, 50.0).is_none());
    }

    #[test]
    fn test_within_radius_sorted() {
        let index = build_index(vec![(1, 50.0, 4.0), (2, 50.001, 4.0), (3, 50.1, 4.0)]);
        let hits = within_radius(&index, 50.0, 4.0, 500.0);
        let ids: Vec<u32> = hits.iter().map(|h| h.0).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn test_bbox_extend() {
        let mut bbox = BBox::around(50.0, 4.0);
        bbox.extend(49.5, 4.5);
        assert_eq!(bbox.min_lat, 49.5);
        assert_eq!(bbox.max_lon, 4.5);
    }
}
