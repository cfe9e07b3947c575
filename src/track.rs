//! Distances and derived positions for recorded tracks.

use geo::{Centroid, HaversineDistance, MultiPoint, Point};

use crate::models::{Corners, GeoInfo, LatLong};
use crate::quickroute::GeoPayload;

fn to_point(p: &LatLong) -> Point<f64> {
    Point::new(p.long, p.lat)
}

/// Great-circle length of a track in metres.
pub fn track_distance_metres(track: &[LatLong]) -> f64 {
    track
        .windows(2)
        .map(|pair| to_point(&pair[0]).haversine_distance(&to_point(&pair[1])))
        .sum()
}

/// Track length in kilometres, counted in whole metres.
pub fn track_distance_km(track: &[LatLong]) -> f64 {
    track_distance_metres(track).floor() / 1000.0
}

/// Mean position of the four corners.
pub fn corners_centre(corners: &Corners<LatLong>) -> LatLong {
    let points: MultiPoint<f64> = corners.to_array().iter().map(to_point).collect();
    match points.centroid() {
        Some(centre) => LatLong::new(centre.y(), centre.x()),
        None => corners.sw,
    }
}

/// Turns a decoded payload into the map record's geo block. The centre falls
/// back to the middle of the map corners when the payload has none.
pub fn geo_info(payload: GeoPayload) -> GeoInfo {
    let distance_run = track_distance_km(&payload.track);
    let map_centre = payload
        .map_centre
        .unwrap_or_else(|| corners_centre(&payload.map_corners));

    GeoInfo {
        track: payload.track,
        distance_run,
        map_centre,
        map_corners: payload.map_corners,
        image_corners: payload.image_corners,
        location_size_pixels: payload.location_size_pixels,
    }
}
