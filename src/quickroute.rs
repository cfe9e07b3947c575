//! Georeferencing data embedded in JPEG map scans.
//!
//! Route-drawing tools store the map's position and the recorded route in
//! one or more APP0 segments tagged with the ASCII signature `QuickRoute`.
//! The segment data is a stream of `u8 tag, u32 length, data` records, some
//! of which nest further records. Everything is little endian except the
//! JPEG segment lengths.

use log::debug;

use crate::models::{Corners, LatLong, PixelPoint, PixelRect};

const SIGNATURE: &[u8] = b"QuickRoute";

const MARKER: u8 = 0xFF;
const SOI: u8 = 0xD8;
const EOI: u8 = 0xD9;
const SOS: u8 = 0xDA;
const APP0: u8 = 0xE0;

const TAG_MAP_CORNER_POSITIONS: u8 = 2;
const TAG_IMAGE_CORNER_POSITIONS: u8 = 3;
const TAG_MAP_LOCATION_AND_SIZE: u8 = 4;
const TAG_SESSIONS: u8 = 5;
const TAG_SESSION: u8 = 6;
const TAG_ROUTE: u8 = 7;
const TAG_PROJECTION_ORIGIN: u8 = 9;

const ATTR_POSITION: u16 = 1;
const ATTR_TIME: u16 = 2;
const ATTR_HEART_RATE: u16 = 4;
const ATTR_ALTITUDE: u16 = 8;

const TIME_ABSOLUTE: u8 = 0;

/// Coordinates are stored as integer multiples of 1/3600000 degree.
const COORDINATE_SCALE: f64 = 3_600_000.0;

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("georeferencing payload truncated while reading {0}")]
    Truncated(&'static str),

    #[error("georeferencing payload has no {0}")]
    MissingTag(&'static str),

    #[error("{what} out of range: lat {lat}, long {long}")]
    OutOfRange {
        what: &'static str,
        lat: f64,
        long: f64,
    },
}

/// What a map scan says about where it is and the route run on it.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoPayload {
    /// Waypoints of the first session's route, all segments joined.
    pub track: Vec<LatLong>,
    /// The projection origin of the first session, when recorded.
    pub map_centre: Option<LatLong>,
    pub map_corners: Corners<LatLong>,
    pub image_corners: Corners<PixelPoint>,
    pub location_size_pixels: PixelRect,
}

/// Decodes the georeferencing payload of a JPEG.
///
/// Anything that is not a JPEG, or a JPEG without a payload, gives
/// `Ok(None)`. Only a payload that is present but unreadable is an error.
pub fn extract(image: &[u8]) -> Result<Option<GeoPayload>, DecodeError> {
    match find_payload(image) {
        Some(data) => decode(&data).map(Some),
        None => Ok(None),
    }
}

/// Joins the data of every signed APP0 segment ahead of the scan data.
fn find_payload(image: &[u8]) -> Option<Vec<u8>> {
    if image.len() < 4 || image[0] != MARKER || image[1] != SOI {
        return None;
    }

    let mut payload: Option<Vec<u8>> = None;
    let mut pos = 2;
    while pos + 4 <= image.len() {
        if image[pos] != MARKER {
            debug!("no jpeg marker at offset {}, giving up", pos);
            break;
        }
        let marker = image[pos + 1];
        match marker {
            MARKER => {
                pos += 1;
                continue;
            }
            SOS | EOI => break,
            0x01 | 0xD0..=0xD7 => {
                pos += 2;
                continue;
            }
            _ => (),
        }

        let len = u16::from_be_bytes([image[pos + 2], image[pos + 3]]) as usize;
        if len < 2 || pos + 2 + len > image.len() {
            debug!("bad jpeg segment length {} at offset {}", len, pos);
            break;
        }
        let data = &image[pos + 4..pos + 2 + len];
        if marker == APP0 && data.starts_with(SIGNATURE) {
            payload
                .get_or_insert_with(Vec::new)
                .extend_from_slice(&data[SIGNATURE.len()..]);
        }
        pos += 2 + len;
    }
    payload
}

struct Session {
    track: Vec<LatLong>,
    origin: Option<LatLong>,
}

fn decode(data: &[u8]) -> Result<GeoPayload, DecodeError> {
    let mut cursor = Cursor::new(data);
    let mut map_corners = None;
    let mut image_corners = None;
    let mut location = None;
    let mut session = None;

    while let Some((tag, mut body)) = cursor.next_tag()? {
        match tag {
            TAG_MAP_CORNER_POSITIONS => {
                map_corners = Some(Corners {
                    sw: body.lat_long("map corner")?,
                    nw: body.lat_long("map corner")?,
                    ne: body.lat_long("map corner")?,
                    se: body.lat_long("map corner")?,
                })
            }
            TAG_IMAGE_CORNER_POSITIONS => {
                image_corners = Some(Corners {
                    sw: body.pixel_point()?,
                    nw: body.pixel_point()?,
                    ne: body.pixel_point()?,
                    se: body.pixel_point()?,
                })
            }
            TAG_MAP_LOCATION_AND_SIZE => {
                location = Some(PixelRect {
                    x: body.u16("map location")? as u32,
                    y: body.u16("map location")? as u32,
                    width: body.u16("map size")? as u32,
                    height: body.u16("map size")? as u32,
                })
            }
            TAG_SESSIONS if session.is_none() => session = first_session(&mut body)?,
            _ => (),
        }
    }

    let (track, map_centre) = match session {
        Some(s) => (s.track, s.origin),
        None => (Vec::new(), None),
    };

    Ok(GeoPayload {
        track,
        map_centre,
        map_corners: map_corners.ok_or(DecodeError::MissingTag("map corner positions"))?,
        image_corners: image_corners.ok_or(DecodeError::MissingTag("image corner positions"))?,
        location_size_pixels: location.ok_or(DecodeError::MissingTag("map location and size"))?,
    })
}

fn first_session(body: &mut Cursor) -> Result<Option<Session>, DecodeError> {
    let count = body.u32("session count")?;
    debug!("payload holds {} session(s)", count);
    while let Some((tag, mut session)) = body.next_tag()? {
        if tag == TAG_SESSION {
            return read_session(&mut session).map(Some);
        }
    }
    Ok(None)
}

fn read_session(body: &mut Cursor) -> Result<Session, DecodeError> {
    let mut session = Session {
        track: Vec::new(),
        origin: None,
    };
    while let Some((tag, mut part)) = body.next_tag()? {
        match tag {
            TAG_ROUTE => session.track = read_route(&mut part)?,
            TAG_PROJECTION_ORIGIN => session.origin = Some(part.lat_long("projection origin")?),
            _ => (),
        }
    }
    Ok(session)
}

fn read_route(body: &mut Cursor) -> Result<Vec<LatLong>, DecodeError> {
    let attributes = body.u16("route attributes")?;
    let extra = body.u16("route attributes")? as usize;
    let segments = body.u32("segment count")?;

    let mut track = Vec::new();
    // Without positions every waypoint could be zero bytes long.
    if attributes & ATTR_POSITION == 0 {
        return Ok(track);
    }

    for _ in 0..segments {
        let waypoints = body.u32("waypoint count")?;
        for _ in 0..waypoints {
            track.push(body.lat_long("waypoint")?);
            if attributes & ATTR_TIME != 0 {
                match body.u8("waypoint time")? {
                    TIME_ABSOLUTE => body.skip(8, "waypoint time")?,
                    _ => body.skip(2, "waypoint time")?,
                }
            }
            if attributes & ATTR_HEART_RATE != 0 {
                body.skip(1, "heart rate")?;
            }
            if attributes & ATTR_ALTITUDE != 0 {
                body.skip(2, "altitude")?;
            }
            body.skip(extra, "waypoint attributes")?;
        }
    }
    Ok(track)
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Cursor<'a> {
        Cursor { data, pos: 0 }
    }

    fn take(&mut self, n: usize, what: &'static str) -> Result<&'a [u8], DecodeError> {
        let end = self.pos.checked_add(n).ok_or(DecodeError::Truncated(what))?;
        if end > self.data.len() {
            return Err(DecodeError::Truncated(what));
        }
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn skip(&mut self, n: usize, what: &'static str) -> Result<(), DecodeError> {
        self.take(n, what).map(|_| ())
    }

    fn array<const N: usize>(&mut self, what: &'static str) -> Result<[u8; N], DecodeError> {
        let mut buf = [0u8; N];
        buf.copy_from_slice(self.take(N, what)?);
        Ok(buf)
    }

    fn u8(&mut self, what: &'static str) -> Result<u8, DecodeError> {
        Ok(self.take(1, what)?[0])
    }

    fn u16(&mut self, what: &'static str) -> Result<u16, DecodeError> {
        self.array(what).map(u16::from_le_bytes)
    }

    fn u32(&mut self, what: &'static str) -> Result<u32, DecodeError> {
        self.array(what).map(u32::from_le_bytes)
    }

    fn i32(&mut self, what: &'static str) -> Result<i32, DecodeError> {
        self.array(what).map(i32::from_le_bytes)
    }

    fn lat_long(&mut self, what: &'static str) -> Result<LatLong, DecodeError> {
        let long = self.i32(what)? as f64 / COORDINATE_SCALE;
        let lat = self.i32(what)? as f64 / COORDINATE_SCALE;
        let point = LatLong::new(lat, long);
        if !point.is_valid() {
            return Err(DecodeError::OutOfRange { what, lat, long });
        }
        Ok(point)
    }

    fn pixel_point(&mut self) -> Result<PixelPoint, DecodeError> {
        Ok(PixelPoint {
            x: self.u32("image corner")?,
            y: self.u32("image corner")?,
        })
    }

    /// The next tagged record, or `None` at the end of this stream.
    fn next_tag(&mut self) -> Result<Option<(u8, Cursor<'a>)>, DecodeError> {
        if self.pos >= self.data.len() {
            return Ok(None);
        }
        let tag = self.u8("tag")?;
        let len = self.u32("tag length")? as usize;
        let body = self.take(len, "tag data")?;
        Ok(Some((tag, Cursor::new(body))))
    }
}
