use chrono::{DateTime, TimeZone, Utc};

use crate::geo::memory::MemoryGeoLookup;
use crate::types::{GeoAnnotation, RawLogEntry};

/// Line with a peer stats wrapper, a byte count and a destination with geo data.
pub const PEER_STATS_LINE: &str = "01/02/2020 10:00:00 (peer stats): Bytes: 1024 dest: 8.8.8.8";

pub const UPLOAD_LINE: &str =
    "01/02/2020 10:05:00 File Transfer Upload: Files: 3, Bytes: 4096, Seconds: 1.5, dest: 1.1.1.1";

pub const GARBAGE_LINE: &str = "garbage line with no structure";

pub fn utc(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, minute, 0)
        .single()
        .unwrap_or_else(|| panic!("invalid test timestamp {year}-{month}-{day} {hour}:{minute}"))
}

/// Builds an entry from `submit-1.example.org` shipped at `shipped_at`.
pub fn entry(message: &str, offset: u64, shipped_at: DateTime<Utc>) -> RawLogEntry {
    RawLogEntry::new(message, "submit-1.example.org", offset, shipped_at)
}

/// Annotation of `8.8.8.8` with the fields a City database typically knows.
pub fn google_dns_annotation() -> GeoAnnotation {
    let mut annotation = GeoAnnotation::new([8, 8, 8, 8].into());
    annotation.latitude = Some(37.751);
    annotation.longitude = Some(-97.822);
    annotation.continent_code = Some("NA".to_string());
    annotation.country_code = Some("US".to_string());
    annotation.country_name = Some("United States".to_string());
    annotation.timezone = Some("America/Chicago".to_string());
    annotation
}

/// Annotation of `1.1.1.1` with a country only.
pub fn cloudflare_annotation() -> GeoAnnotation {
    let mut annotation = GeoAnnotation::new([1, 1, 1, 1].into());
    annotation.country_code = Some("AU".to_string());
    annotation.country_name = Some("Australia".to_string());
    annotation
}

pub fn sample_geo_lookup() -> MemoryGeoLookup {
    MemoryGeoLookup::new()
        .with_annotation(google_dns_annotation())
        .with_annotation(cloudflare_annotation())
}
