//! CSV row codec for session files
//!
//! Session files are UTF-8, comma-separated and `\n` terminated:
//! ```text
//! Location-lat,Location-long,Speed,Accelerometer-X,Accelerometer-Y,Accelerometer-Z
//! 48.856613,2.352222,12.50,0.12,-0.30,9.81
//! ```
//!
//! Latitude and longitude carry 6 decimals, speed and acceleration 2.
//! The same module encodes the status message published to the broker.

use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::fmt::Write;
use thiserror::Error;

use crate::Reading;

/// Column names, in file order
pub const COLUMNS: [&str; 6] = [
    "Location-lat",
    "Location-long",
    "Speed",
    "Accelerometer-X",
    "Accelerometer-Y",
    "Accelerometer-Z",
];

/// Header line written once when a session file is created
pub const CSV_HEADER: &str =
    "Location-lat,Location-long,Speed,Accelerometer-X,Accelerometer-Y,Accelerometer-Z";

/// Literal status message sent by the legacy publisher
pub const PLACEHOLDER_STATUS: &str = "X: Accelerometer-X, Y: Accelerometer-Y, Z: Accelerometer-Z";

/// Errors that can occur during encoding/decoding
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Expected {} columns, found {0}", COLUMNS.len())]
    ColumnCount(usize),

    #[error("Invalid number in column {column}: {value:?}")]
    InvalidNumber { column: &'static str, value: String },

    #[error("Unexpected header: {0:?}")]
    HeaderMismatch(String),

    #[error("Session file is empty")]
    Empty,

    #[error("Line {line}: {source}")]
    Line {
        line: usize,
        source: Box<CodecError>,
    },

    #[error("Row formatting error: {0}")]
    Format(#[from] std::fmt::Error),

    #[error("JSON encode error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Which payload the writer publishes after a recorded tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusFormat {
    /// The fixed [`PLACEHOLDER_STATUS`] string
    Placeholder,
    /// The recorded reading as a JSON object
    #[default]
    Reading,
}

/// One decoded data row of a session file
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CsvRow {
    pub latitude: f64,
    pub longitude: f64,
    pub speed: f64,
    pub accel_x: f64,
    pub accel_y: f64,
    pub accel_z: f64,
}

/// Encode the header line, newline included
pub fn encode_header() -> Bytes {
    let mut buf = BytesMut::with_capacity(CSV_HEADER.len() + 1);
    buf.extend_from_slice(CSV_HEADER.as_bytes());
    buf.extend_from_slice(b"\n");
    buf.freeze()
}

/// Encode a reading as one data row
pub fn encode_row(reading: &Reading) -> Result<Bytes, CodecError> {
    let mut buf = BytesMut::with_capacity(64);
    encode_row_into(reading, &mut buf)?;
    Ok(buf.freeze())
}

/// Encode a reading as one data row directly into a provided buffer
pub fn encode_row_into(reading: &Reading, buf: &mut BytesMut) -> Result<(), CodecError> {
    writeln!(
        buf,
        "{:.6},{:.6},{:.2},{:.2},{:.2},{:.2}",
        reading.latitude,
        reading.longitude,
        reading.speed,
        reading.accel_x,
        reading.accel_y,
        reading.accel_z,
    )?;
    Ok(())
}

/// Decode one data row.
///
/// Fields are trimmed, so rows written with the legacy `", "` separator
/// decode as well.
pub fn decode_row(line: &str) -> Result<CsvRow, CodecError> {
    let fields: Vec<&str> = line.trim_end().split(',').map(str::trim).collect();
    if fields.len() != COLUMNS.len() {
        return Err(CodecError::ColumnCount(fields.len()));
    }

    let mut values = [0.0f64; 6];
    for (slot, (field, column)) in values.iter_mut().zip(fields.iter().zip(COLUMNS)) {
        *slot = field.parse().map_err(|_| CodecError::InvalidNumber {
            column,
            value: field.to_string(),
        })?;
    }

    Ok(CsvRow {
        latitude: values[0],
        longitude: values[1],
        speed: values[2],
        accel_x: values[3],
        accel_y: values[4],
        accel_z: values[5],
    })
}

/// Decode a complete session file, header included
pub fn decode_file(contents: &str) -> Result<Vec<CsvRow>, CodecError> {
    let mut lines = contents.lines();
    let header = lines.next().ok_or(CodecError::Empty)?;

    let normalized = header
        .trim_start_matches('\u{feff}')
        .split(',')
        .map(str::trim)
        .collect::<Vec<_>>()
        .join(",");
    if normalized != CSV_HEADER {
        return Err(CodecError::HeaderMismatch(header.to_string()));
    }

    lines
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            decode_row(line).map_err(|e| CodecError::Line {
                line: index + 2,
                source: Box::new(e),
            })
        })
        .collect()
}

/// Encode the status message published after a recorded tick
pub fn encode_status(reading: &Reading, format: StatusFormat) -> Result<Bytes, CodecError> {
    match format {
        StatusFormat::Placeholder => Ok(Bytes::from_static(PLACEHOLDER_STATUS.as_bytes())),
        StatusFormat::Reading => Ok(Bytes::from(serde_json::to_vec(reading)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_reading() -> Reading {
        Reading {
            latitude: 48.8566129,
            longitude: 2.3522219,
            speed: 12.499,
            accel_x: 0.123,
            accel_y: -0.298,
            accel_z: 9.806,
            temperature: Some(21.5),
            humidity: None,
            rx_bytes_delta: 1.0,
            tx_bytes_delta: 0.0,
        }
    }

    #[test]
    fn test_header_has_six_columns() {
        let header = encode_header();
        assert_eq!(&header[..], format!("{}\n", CSV_HEADER).as_bytes());
        assert_eq!(CSV_HEADER.split(',').count(), 6);
        assert_eq!(CSV_HEADER, COLUMNS.join(","));
    }

    #[test]
    fn test_row_in_header_order_with_fixed_precision() {
        let row = encode_row(&create_test_reading()).expect("encode failed");
        assert_eq!(&row[..], b"48.856613,2.352222,12.50,0.12,-0.30,9.81\n");
    }

    #[test]
    fn test_decode_legacy_separator() {
        let row = decode_row("48.856613, 2.352222, 12.50, 0.12, -0.30, 9.81").expect("decode failed");
        assert_eq!(row.latitude, 48.856613);
        assert_eq!(row.speed, 12.5);
        assert_eq!(row.accel_y, -0.3);
    }

    #[test]
    fn test_decode_row_errors() {
        assert!(matches!(decode_row("1.0,2.0,3.0"), Err(CodecError::ColumnCount(3))));
        assert!(matches!(
            decode_row("1.0,2.0,fast,0,0,0"),
            Err(CodecError::InvalidNumber { column: "Speed", .. })
        ));
    }

    #[test]
    fn test_decode_file_reports_line() {
        let contents = format!("{}\n1,2,3,4,5,6\n1,2,3\n", CSV_HEADER);
        match decode_file(&contents) {
            Err(CodecError::Line { line, .. }) => assert_eq!(line, 3),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_decode_file_rejects_foreign_header() {
        let result = decode_file("time,value\n1,2\n");
        assert!(matches!(result, Err(CodecError::HeaderMismatch(_))));
        assert!(matches!(decode_file(""), Err(CodecError::Empty)));
    }

    #[test]
    fn test_decode_file_skips_blank_lines() {
        let contents = format!("{}\n1,2,3,4,5,6\n\n7,8,9,10,11,12\n", CSV_HEADER);
        let rows = decode_file(&contents).expect("decode failed");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].accel_z, 12.0);
    }

    #[test]
    fn test_placeholder_status() {
        let payload = encode_status(&create_test_reading(), StatusFormat::Placeholder)
            .expect("encode failed");
        assert_eq!(&payload[..], PLACEHOLDER_STATUS.as_bytes());
    }

    #[test]
    fn test_reading_status_is_json() {
        let payload =
            encode_status(&create_test_reading(), StatusFormat::Reading).expect("encode failed");
        let value: serde_json::Value = serde_json::from_slice(&payload).expect("invalid json");
        assert_eq!(value["accel_z"], 9.806);
        assert_eq!(value["temperature"], 21.5);
        assert!(value["humidity"].is_null());
    }
}
