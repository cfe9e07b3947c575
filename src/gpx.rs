use std::fs::File;
use std::io;
use std::io::prelude::*;

use gpx::errors::GpxError;

use crate::models::LatLong;

#[derive(Debug, thiserror::Error)]
pub enum TrackError {
    #[error("unreadable gpx: {0}")]
    Gpx(#[from] GpxError),

    #[error("gpx file has no track points")]
    Empty,

    #[error("track point out of range: lat {lat}, long {long}")]
    OutOfRange { lat: f64, long: f64 },
}

pub fn read_whole_file(filename: &str) -> Result<Vec<u8>, io::Error> {
    let mut file = File::open(filename)?;
    let mut contents = Vec::new();
    file.read_to_end(&mut contents)?;
    Ok(contents)
}

/// Points of the first track in a GPX document, all segments joined.
pub fn parse_gpx(gpx_data: &[u8]) -> Result<Vec<LatLong>, TrackError> {
    let gpx = gpx::read(gpx_data)?;
    let trk = gpx.tracks.first().ok_or(TrackError::Empty)?;

    let mut points = Vec::new();
    for trkseg in &trk.segments {
        for trkpt in &trkseg.points {
            let point = trkpt.point();
            let lat_long = LatLong::new(point.y(), point.x());
            if !lat_long.is_valid() {
                return Err(TrackError::OutOfRange {
                    lat: lat_long.lat,
                    long: lat_long.long,
                });
            }
            points.push(lat_long);
        }
    }

    if points.is_empty() {
        return Err(TrackError::Empty);
    }
    Ok(points)
}

#[cfg(test)]
mod tests {
    use super::*;

    const RUN: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx version="1.1" creator="kartbok" xmlns="http://www.topografix.com/GPX/1/1">
  <trk>
    <name>Evening run</name>
    <trkseg>
      <trkpt lat="59.3000" lon="18.0000"><ele>12.0</ele></trkpt>
      <trkpt lat="59.3010" lon="18.0000"><ele>14.5</ele></trkpt>
    </trkseg>
    <trkseg>
      <trkpt lat="59.3020" lon="18.0010"><ele>13.0</ele></trkpt>
    </trkseg>
  </trk>
</gpx>"#;

    #[test]
    fn joins_segments_of_first_track() {
        let points = parse_gpx(RUN.as_bytes()).unwrap();
        assert_eq!(points.len(), 3);
        assert_eq!(points[0], LatLong::new(59.3, 18.0));
        assert_eq!(points[2], LatLong::new(59.302, 18.001));
    }

    #[test]
    fn file_without_tracks_is_empty() {
        let doc = r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx version="1.1" creator="kartbok" xmlns="http://www.topografix.com/GPX/1/1">
</gpx>"#;
        match parse_gpx(doc.as_bytes()) {
            Err(TrackError::Empty) => (),
            other => panic!("expected empty track, got {:?}", other),
        }
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(parse_gpx(b"not xml at all").is_err());
    }
}
