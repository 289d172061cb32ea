// src/location/nmea.rs
//! NMEA 0183 sentence decoding into location snapshots

use super::geometry::{CoordinateTransform, MapPoint, SpatialReference};
use super::snapshot::Snapshot;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use std::{fmt, sync::Arc};
use tracing::debug;

/// Nominal user equivalent range error used to turn HDOP into meters
pub const NOMINAL_UERE_M: f64 = 5.0;

const KNOTS_TO_MPS: f64 = 0.514_444;

/// Why a frame was discarded
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    Empty,
    NotAscii,
    MissingStart,
    MissingChecksum,
    BadChecksum { expected: u8, actual: u8 },
    MissingType,
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::Empty => write!(f, "empty frame"),
            FrameError::NotAscii => write!(f, "frame contains non-ASCII bytes"),
            FrameError::MissingStart => write!(f, "frame does not start with '$'"),
            FrameError::MissingChecksum => write!(f, "frame has no checksum"),
            FrameError::BadChecksum { expected, actual } => {
                write!(f, "checksum mismatch: expected {:02X}, got {:02X}", expected, actual)
            }
            FrameError::MissingType => write!(f, "frame has no sentence type"),
        }
    }
}

/// A checksum-verified sentence split into fields. `fields[0]` is the
/// address (talker + type), e.g. `GPGGA`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sentence<'a> {
    pub talker: &'a str,
    pub kind: &'a str,
    pub fields: Vec<&'a str>,
}

/// XOR of all bytes between `$` and `*`
pub fn checksum(body: &str) -> u8 {
    body.bytes().fold(0u8, |acc, b| acc ^ b)
}

/// Wrap a sentence body in `$` and its checksum
pub fn encode_sentence(body: &str) -> String {
    format!("${}*{:02X}", body, checksum(body))
}

/// Verify structure and checksum of one line
pub fn parse_frame(line: &str) -> std::result::Result<Sentence<'_>, FrameError> {
    let line = line.trim();
    if line.is_empty() {
        return Err(FrameError::Empty);
    }
    if !line.is_ascii() {
        return Err(FrameError::NotAscii);
    }
    let inner = line.strip_prefix('$').ok_or(FrameError::MissingStart)?;
    let (body, hex) = inner.split_once('*').ok_or(FrameError::MissingChecksum)?;
    let expected = u8::from_str_radix(hex.trim(), 16).map_err(|_| FrameError::MissingChecksum)?;
    let actual = checksum(body);
    if expected != actual {
        return Err(FrameError::BadChecksum { expected, actual });
    }

    let fields: Vec<&str> = body.split(',').collect();
    let address = fields[0];
    // Proprietary sentences ($P...) have no standard talker/type split
    if address.len() < 5 || address.starts_with('P') {
        return Err(FrameError::MissingType);
    }
    let (talker, kind) = address.split_at(address.len() - 3);

    Ok(Sentence { talker, kind, fields })
}

/// Stateful decoder for one connection.
///
/// `GGA` sentences produce snapshots; `RMC` contributes date, speed and
/// course (and produces snapshots only on receivers that never send `GGA`);
/// `GSA` contributes dilution of precision. Accepted snapshot timestamps are
/// strictly increasing.
pub struct NmeaDecoder {
    antenna_height: f64,
    native: SpatialReference,
    output: Option<(Arc<dyn CoordinateTransform>, SpatialReference)>,
    date: Option<NaiveDate>,
    date_assumed: bool,
    last_time_of_day: Option<NaiveTime>,
    speed: Option<f64>,
    course: Option<f64>,
    pdop: Option<f64>,
    hdop: Option<f64>,
    vdop: Option<f64>,
    gga_seen: bool,
    last_timestamp: Option<DateTime<Utc>>,
    dropped: u64,
}

impl NmeaDecoder {
    pub fn new(antenna_height: f64) -> Self {
        Self {
            antenna_height,
            native: SpatialReference::WGS84,
            output: None,
            date: None,
            date_assumed: false,
            last_time_of_day: None,
            speed: None,
            course: None,
            pdop: None,
            hdop: None,
            vdop: None,
            gga_seen: false,
            last_timestamp: None,
            dropped: 0,
        }
    }

    /// Geographic reference the receiver reports in (WGS84 unless the
    /// source says otherwise)
    pub fn with_native_reference(mut self, native: SpatialReference) -> Self {
        self.native = native;
        self
    }

    /// Project emitted positions into `target` instead of the device's
    /// native reference
    pub fn with_output(
        mut self,
        transform: Arc<dyn CoordinateTransform>,
        target: SpatialReference,
    ) -> Self {
        self.output = Some((transform, target));
        self
    }

    /// Number of frames discarded so far (malformed, out of order or
    /// unprojectable)
    pub fn dropped_frames(&self) -> u64 {
        self.dropped
    }

    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.last_timestamp
    }

    /// Feed one line. Returns a snapshot when the line completes an
    /// accepted position sample.
    pub fn decode(&mut self, line: &str, accuracy_threshold: f64) -> Option<Snapshot> {
        let sentence = match parse_frame(line) {
            Ok(s) => s,
            Err(e) => {
                debug!("Dropping frame {:?}: {}", line.trim(), e);
                self.dropped += 1;
                return None;
            }
        };

        match sentence.kind {
            "GGA" => {
                self.gga_seen = true;
                let fix = self.parse_gga(&sentence.fields)?;
                self.accept(fix, "GGA", accuracy_threshold)
            }
            "RMC" => {
                let fix = self.parse_rmc(&sentence.fields)?;
                if self.gga_seen {
                    None
                } else {
                    self.accept(fix, "RMC", accuracy_threshold)
                }
            }
            "GSA" => {
                self.parse_gsa(&sentence.fields);
                None
            }
            _ => None,
        }
    }

    /// Parse GGA (Global Positioning System Fix Data) sentence
    fn parse_gga(&mut self, parts: &[&str]) -> Option<Fix> {
        if parts.len() < 10 {
            return self.malformed("GGA too short");
        }

        let time = match parse_time(parts[1]) {
            Some(t) => t,
            None => return self.malformed("GGA without time"),
        };
        // No position yet; the receiver is still acquiring
        if parts[2].is_empty() || parts[4].is_empty() {
            return None;
        }
        let (latitude, longitude) = match (
            parse_coordinate(parts[2], parts[3], 'S', 90.0),
            parse_coordinate(parts[4], parts[5], 'W', 180.0),
        ) {
            (Some(lat), Some(lon)) => (lat, lon),
            _ => return self.malformed("GGA position out of range"),
        };

        let fix_quality = parts[6].parse::<u8>().ok();
        Some(Fix {
            time,
            latitude,
            longitude,
            altitude: parse_f64(parts[9]),
            fix_quality,
            satellites: parts[7].parse::<u8>().ok(),
            hdop: parse_f64(parts[8]).or(self.hdop),
            has_fix: fix_quality.map_or(false, |q| q > 0),
        })
    }

    /// Parse RMC (Recommended Minimum Course) sentence
    fn parse_rmc(&mut self, parts: &[&str]) -> Option<Fix> {
        if parts.len() < 10 {
            return self.malformed("RMC too short");
        }

        let time = match parse_time(parts[1]) {
            Some(t) => t,
            None => return self.malformed("RMC without time"),
        };
        if let Some(date) = parse_date(parts[9]) {
            self.adopt_date(date, time);
        }
        self.speed = parse_f64(parts[7]).map(|knots| knots * KNOTS_TO_MPS);
        self.course = parse_f64(parts[8]);

        if parts[3].is_empty() || parts[5].is_empty() {
            return None;
        }
        let (latitude, longitude) = match (
            parse_coordinate(parts[3], parts[4], 'S', 90.0),
            parse_coordinate(parts[5], parts[6], 'W', 180.0),
        ) {
            (Some(lat), Some(lon)) => (lat, lon),
            _ => return self.malformed("RMC position out of range"),
        };

        Some(Fix {
            time,
            latitude,
            longitude,
            altitude: None,
            fix_quality: None,
            satellites: None,
            hdop: self.hdop,
            has_fix: parts[2] == "A",
        })
    }

    /// Parse GSA (DOP and active satellites) sentence
    fn parse_gsa(&mut self, parts: &[&str]) {
        if parts.len() < 18 {
            debug!("Ignoring short GSA sentence");
            return;
        }
        self.pdop = parse_f64(parts[15]);
        self.hdop = parse_f64(parts[16]);
        self.vdop = parse_f64(parts[17]);
    }

    fn malformed(&mut self, reason: &str) -> Option<Fix> {
        debug!("Dropping frame: {}", reason);
        self.dropped += 1;
        None
    }

    fn adopt_date(&mut self, date: NaiveDate, time: NaiveTime) {
        // Samples already stamped with the host date keep that date line
        // unless the receiver's date is later
        if self.date_assumed
            && self.last_timestamp.is_some()
            && self.date.map_or(false, |current| date < current)
        {
            return;
        }
        self.date = Some(date);
        self.date_assumed = false;
        self.last_time_of_day = Some(time);
    }

    /// Date and timestamp `time` would get. Nothing is committed until the
    /// snapshot is accepted.
    fn stamp(&self, time: NaiveTime) -> (NaiveDate, DateTime<Utc>) {
        let mut date = self.date.unwrap_or_else(|| Utc::now().date_naive());
        if let Some(last) = self.last_time_of_day {
            let jump = time.signed_duration_since(last);
            if jump < -Duration::hours(12) {
                // Midnight passed before the next RMC could update the date
                date = date.succ_opt().unwrap_or(date);
            } else if jump > Duration::hours(12) {
                // Late frame from before midnight
                date = date.pred_opt().unwrap_or(date);
            }
        }
        (date, date.and_time(time).and_utc())
    }

    fn accept(&mut self, fix: Fix, sentence: &str, accuracy_threshold: f64) -> Option<Snapshot> {
        let (date, timestamp) = self.stamp(fix.time);
        if let Some(last) = self.last_timestamp {
            if timestamp <= last {
                debug!("Dropping {} at {}: not after {}", sentence, timestamp, last);
                self.dropped += 1;
                return None;
            }
        }

        let mut position =
            MapPoint::new(fix.longitude, fix.latitude, fix.altitude, self.native);
        if let Some((transform, target)) = &self.output {
            position = match transform.project(&position, *target) {
                Ok(p) => p,
                Err(e) => {
                    debug!("Dropping {} at {}: {}", sentence, timestamp, e);
                    self.dropped += 1;
                    return None;
                }
            };
        }

        let accuracy = fix.hdop.map(|h| h * NOMINAL_UERE_M);
        let within_threshold =
            accuracy_threshold <= 0.0 || accuracy.map_or(false, |a| a <= accuracy_threshold);

        if self.date.is_none() {
            self.date_assumed = true;
        }
        self.date = Some(date);
        self.last_time_of_day = Some(fix.time);
        self.last_timestamp = Some(timestamp);
        Some(Snapshot {
            position,
            timestamp,
            hdop: fix.hdop,
            vdop: self.vdop,
            pdop: self.pdop,
            fix_quality: fix.fix_quality,
            satellites: fix.satellites,
            speed: self.speed,
            course: self.course,
            accuracy,
            antenna_height: self.antenna_height,
            valid: fix.has_fix && within_threshold,
            sentence: sentence.to_string(),
        })
    }
}

struct Fix {
    time: NaiveTime,
    latitude: f64,
    longitude: f64,
    altitude: Option<f64>,
    fix_quality: Option<u8>,
    satellites: Option<u8>,
    hdop: Option<f64>,
    has_fix: bool,
}

fn parse_f64(field: &str) -> Option<f64> {
    if field.is_empty() {
        return None;
    }
    field.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// `ddmm.mmmm` / `dddmm.mmmm` plus hemisphere into signed decimal degrees
fn parse_coordinate(value: &str, hemisphere: &str, negative: char, max_degrees: f64) -> Option<f64> {
    if value.is_empty() || hemisphere.is_empty() {
        return None;
    }
    let raw = value.parse::<f64>().ok()?;
    let degrees = (raw / 100.0).trunc();
    let minutes = raw % 100.0;
    if minutes >= 60.0 {
        return None;
    }
    let mut decimal = degrees + minutes / 60.0;
    if !decimal.is_finite() || decimal > max_degrees {
        return None;
    }
    if hemisphere.starts_with(negative) {
        decimal = -decimal;
    }
    Some(decimal)
}

/// `hhmmss` or `hhmmss.sss`
fn parse_time(field: &str) -> Option<NaiveTime> {
    if field.len() < 6 || !field.is_char_boundary(4) {
        return None;
    }
    let hour = field[0..2].parse::<u32>().ok()?;
    let minute = field[2..4].parse::<u32>().ok()?;
    let seconds = field[4..].parse::<f64>().ok()?;
    if !(0.0..60.0).contains(&seconds) {
        return None;
    }
    let whole = seconds.trunc() as u32;
    let millis = ((seconds - seconds.trunc()) * 1000.0).round() as u32;
    NaiveTime::from_hms_milli_opt(hour, minute, whole, millis.min(999))
}

/// `ddmmyy`
fn parse_date(field: &str) -> Option<NaiveDate> {
    if field.len() != 6 {
        return None;
    }
    let day = field[0..2].parse::<u32>().ok()?;
    let month = field[2..4].parse::<u32>().ok()?;
    let yy = field[4..6].parse::<i32>().ok()?;
    let year = if yy < 80 { 2000 + yy } else { 1900 + yy };
    NaiveDate::from_ymd_opt(year, month, day)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::geometry::GeographicTransform;
    use chrono::{Datelike, Timelike};

    const GGA: &str = "$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47";
    const RMC: &str = "$GPRMC,123519,A,4807.038,N,01131.000,E,022.4,084.4,230394,003.1,W*6A";

    fn gga_at(time: &str) -> String {
        encode_sentence(&format!(
            "GPGGA,{},4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,",
            time
        ))
    }

    #[test]
    fn test_parse_frame() {
        let sentence = parse_frame(GGA).unwrap();
        assert_eq!(sentence.talker, "GP");
        assert_eq!(sentence.kind, "GGA");
        assert_eq!(sentence.fields.len(), 15);
    }

    #[test]
    fn test_frame_errors() {
        assert_eq!(parse_frame("   "), Err(FrameError::Empty));
        assert_eq!(parse_frame("GPGGA,1*00"), Err(FrameError::MissingStart));
        assert_eq!(parse_frame("$GPGGA,123519"), Err(FrameError::MissingChecksum));
        assert!(matches!(
            parse_frame("$GPGGA,123519,4807.038,N*00"),
            Err(FrameError::BadChecksum { .. })
        ));
        assert_eq!(parse_frame(&encode_sentence("PUBX,00")), Err(FrameError::MissingType));
    }

    #[test]
    fn test_gga_decoding() {
        let mut decoder = NmeaDecoder::new(1.5);
        let snap = decoder.decode(GGA, 0.0).unwrap();

        assert!((snap.position.y - 48.1173).abs() < 1e-4);
        assert!((snap.position.x - 11.516_667).abs() < 1e-4);
        assert_eq!(snap.altitude(), Some(545.4));
        assert_eq!(snap.hdop, Some(0.9));
        assert_eq!(snap.satellites, Some(8));
        assert_eq!(snap.fix_quality, Some(1));
        assert_eq!(snap.antenna_height, 1.5);
        assert_eq!(snap.timestamp.hour(), 12);
        assert_eq!(snap.timestamp.second(), 19);
        assert!(snap.valid);
    }

    #[test]
    fn test_rmc_supplies_date_speed_course() {
        let mut decoder = NmeaDecoder::new(0.0);
        let from_rmc = decoder.decode(RMC, 0.0).unwrap();
        assert_eq!(from_rmc.sentence, "RMC");
        assert_eq!(from_rmc.timestamp.year(), 1994);
        assert_eq!(from_rmc.timestamp.month(), 3);
        assert_eq!(from_rmc.timestamp.day(), 23);
        assert!((from_rmc.speed.unwrap() - 11.523).abs() < 0.01);
        assert_eq!(from_rmc.course, Some(84.4));

        let next = decoder.decode(&gga_at("123520"), 0.0).unwrap();
        assert_eq!(next.timestamp.year(), 1994);
        assert_eq!(next.course, Some(84.4));
    }

    #[test]
    fn test_rmc_ignored_once_gga_seen() {
        let mut decoder = NmeaDecoder::new(0.0);
        assert!(decoder.decode(RMC, 0.0).is_some());
        assert!(decoder.decode(&gga_at("123520"), 0.0).is_some());
        let rmc = encode_sentence("GPRMC,123521,A,4807.038,N,01131.000,E,022.4,084.4,230394,,");
        assert!(decoder.decode(&rmc, 0.0).is_none());
        assert!(decoder.decode(&gga_at("123522"), 0.0).is_some());
    }

    #[test]
    fn test_earlier_receiver_date_keeps_host_date() {
        let mut decoder = NmeaDecoder::new(0.0);
        let first = decoder.decode(&gga_at("120001"), 0.0).unwrap();
        let rmc = encode_sentence("GPRMC,120002,A,4807.038,N,01131.000,E,000.0,000.0,230394,,");
        assert!(decoder.decode(&rmc, 0.0).is_none());
        let next = decoder.decode(&gga_at("120003"), 0.0).unwrap();
        assert!(next.timestamp > first.timestamp);
        assert_eq!(next.timestamp.date_naive(), first.timestamp.date_naive());
    }

    #[test]
    fn test_gsa_supplies_vdop() {
        let mut decoder = NmeaDecoder::new(0.0);
        let gsa = encode_sentence("GPGSA,A,3,04,05,,09,12,,,24,,,,,2.5,1.3,2.1");
        assert!(decoder.decode(&gsa, 0.0).is_none());
        let snap = decoder.decode(GGA, 0.0).unwrap();
        assert_eq!(snap.vdop, Some(2.1));
        assert_eq!(snap.pdop, Some(2.5));
        // GGA's own HDOP wins over the GSA one
        assert_eq!(snap.hdop, Some(0.9));
    }

    #[test]
    fn test_out_of_order_dropped() {
        let mut decoder = NmeaDecoder::new(0.0);
        assert!(decoder.decode(&gga_at("120002"), 0.0).is_some());
        assert!(decoder.decode(&gga_at("120001"), 0.0).is_none());
        assert!(decoder.decode(&gga_at("120002"), 0.0).is_none());
        assert!(decoder.decode(&gga_at("120003"), 0.0).is_some());
        assert_eq!(decoder.dropped_frames(), 2);
    }

    #[test]
    fn test_malformed_frame_between_valid_frames() {
        let mut decoder = NmeaDecoder::new(0.0);
        let first = decoder.decode(&gga_at("120001"), 0.0);
        let bad = decoder.decode("$GPGGA,120002,4807.038,N,01131.000,E,1,08*FF", 0.0);
        let garbage = decoder.decode("\u{fffd}\u{fffd}$GP", 0.0);
        let second = decoder.decode(&gga_at("120003"), 0.0);

        assert!(first.is_some());
        assert!(bad.is_none());
        assert!(garbage.is_none());
        assert!(second.is_some());
        assert_eq!(decoder.dropped_frames(), 2);
    }

    #[test]
    fn test_unrecognized_sentence_ignored() {
        let mut decoder = NmeaDecoder::new(0.0);
        let vtg = encode_sentence("GPVTG,054.7,T,034.4,M,005.5,N,010.2,K");
        assert!(decoder.decode(&vtg, 0.0).is_none());
        assert_eq!(decoder.dropped_frames(), 0);
    }

    #[test]
    fn test_no_position_yet() {
        let mut decoder = NmeaDecoder::new(0.0);
        let empty = encode_sentence("GPGGA,120001,,,,,0,00,99.99,,,,,,");
        assert!(decoder.decode(&empty, 0.0).is_none());
    }

    #[test]
    fn test_accuracy_threshold() {
        let mut decoder = NmeaDecoder::new(0.0);
        // HDOP 0.9 -> 4.5 m
        assert!(decoder.decode(&gga_at("120001"), 10.0).unwrap().valid);
        assert!(!decoder.decode(&gga_at("120002"), 4.0).unwrap().valid);
        let no_hdop = encode_sentence("GPGGA,120003,4807.038,N,01131.000,E,1,08,,545.4,M,46.9,M,,");
        assert!(!decoder.decode(&no_hdop, 10.0).unwrap().valid);
    }

    #[test]
    fn test_invalid_fix_quality() {
        let mut decoder = NmeaDecoder::new(0.0);
        let line = encode_sentence("GNGGA,120001,4807.038,S,01131.000,W,0,00,0.9,545.4,M,46.9,M,,");
        let snap = decoder.decode(&line, 0.0).unwrap();
        assert!(!snap.valid);
        assert!(snap.position.y < 0.0);
        assert!(snap.position.x < 0.0);
    }

    #[test]
    fn test_midnight_rollover() {
        let mut decoder = NmeaDecoder::new(0.0);
        let rmc = encode_sentence("GPRMC,235959,A,4807.038,N,01131.000,E,000.0,000.0,230394,,");
        let before = decoder.decode(&rmc, 0.0).unwrap();
        let after = decoder.decode(&gga_at("000001"), 0.0).unwrap();
        assert_eq!(before.timestamp.day(), 23);
        assert_eq!(after.timestamp.day(), 24);
        assert!(after.timestamp > before.timestamp);
    }

    #[test]
    fn test_late_frame_across_midnight_dropped() {
        let mut decoder = NmeaDecoder::new(0.0);
        let rmc = encode_sentence("GPRMC,235959,A,4807.038,N,01131.000,E,000.0,000.0,230394,,");
        assert!(decoder.decode(&rmc, 0.0).is_some());
        let after = decoder.decode(&gga_at("000001"), 0.0).unwrap();
        assert_eq!(after.timestamp.day(), 24);

        // Sent before midnight, arriving after it
        assert!(decoder.decode(&gga_at("235958"), 0.0).is_none());
        assert_eq!(decoder.dropped_frames(), 1);

        let next = decoder.decode(&gga_at("000002"), 0.0).unwrap();
        assert_eq!(next.timestamp.day(), 24);

        // The receiver confirms the date; the stream keeps flowing
        let rmc = encode_sentence("GPRMC,000003,A,4807.038,N,01131.000,E,000.0,000.0,240394,,");
        assert!(decoder.decode(&rmc, 0.0).is_none());
        let later = decoder.decode(&gga_at("000004"), 0.0).unwrap();
        assert_eq!(later.timestamp.day(), 24);
        assert!(later.timestamp > next.timestamp);
        assert_eq!(decoder.dropped_frames(), 1);
    }

    #[test]
    fn test_out_of_range_position_dropped() {
        let mut decoder = NmeaDecoder::new(0.0);
        let lat = encode_sentence("GPGGA,120001,9959.000,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,");
        let lon = encode_sentence("GPGGA,120002,4807.038,N,18500.000,E,1,08,0.9,545.4,M,46.9,M,,");
        let rmc = encode_sentence("GPRMC,120003,A,9100.000,S,01131.000,E,000.0,000.0,230394,,");
        assert!(decoder.decode(&lat, 0.0).is_none());
        assert!(decoder.decode(&lon, 0.0).is_none());
        assert!(decoder.decode(&rmc, 0.0).is_none());
        assert_eq!(decoder.dropped_frames(), 3);

        let edge = encode_sentence("GPGGA,120004,9000.000,S,18000.000,W,1,08,0.9,545.4,M,46.9,M,,");
        let snap = decoder.decode(&edge, 0.0).unwrap();
        assert_eq!(snap.position.y, -90.0);
        assert_eq!(snap.position.x, -180.0);
    }

    #[test]
    fn test_native_reference_labels_positions() {
        let nad83 = SpatialReference::new(4269);
        let mut decoder = NmeaDecoder::new(0.0).with_native_reference(nad83);
        let snap = decoder.decode(GGA, 0.0).unwrap();
        assert_eq!(snap.position.spatial_reference, nad83);
    }

    #[test]
    fn test_projected_output() {
        let mut decoder = NmeaDecoder::new(0.0)
            .with_output(Arc::new(GeographicTransform), SpatialReference::WEB_MERCATOR);
        let snap = decoder.decode(GGA, 0.0).unwrap();
        assert_eq!(snap.position.spatial_reference, SpatialReference::WEB_MERCATOR);
        assert!(snap.position.x > 1_000_000.0);
        assert_eq!(snap.altitude(), Some(545.4));
    }

    #[test]
    fn test_unprojectable_output_dropped() {
        let mut decoder = NmeaDecoder::new(0.0)
            .with_output(Arc::new(GeographicTransform), SpatialReference::new(32633));
        assert!(decoder.decode(GGA, 0.0).is_none());
        assert_eq!(decoder.dropped_frames(), 1);
    }

    #[test]
    fn test_fractional_seconds() {
        let time = parse_time("123519.250").unwrap();
        assert_eq!(time.nanosecond(), 250_000_000);
        assert!(parse_time("12").is_none());
        assert!(parse_time("126519").is_none());
    }
}
