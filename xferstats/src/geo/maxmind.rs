use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;
use std::path::Path;

use maxminddb::{MaxMindDBError, Reader, geoip2};
use tracing::info;

use crate::error::IngestResult;
use crate::geo::GeoLookup;
use crate::types::GeoAnnotation;

/// Language of the place names copied into annotations.
const NAME_LANGUAGE: &str = "en";

/// Lookup backed by a MaxMind GeoIP2 or GeoLite2 City database.
pub struct MaxMindGeoLookup {
    reader: Reader<Vec<u8>>,
}

impl MaxMindGeoLookup {
    /// Reads the whole database at `path` into memory.
    pub fn open(path: &Path) -> IngestResult<Self> {
        let reader = Reader::open_readfile(path)?;

        info!(
            path = %path.display(),
            database_type = %reader.metadata.database_type,
            build_epoch = reader.metadata.build_epoch,
            "opened geo database"
        );

        Ok(Self { reader })
    }

    pub fn from_bytes(bytes: Vec<u8>) -> IngestResult<Self> {
        let reader = Reader::from_source(bytes)?;

        Ok(Self { reader })
    }
}

impl GeoLookup for MaxMindGeoLookup {
    fn lookup(&self, ip: IpAddr) -> IngestResult<Option<GeoAnnotation>> {
        let city = match self.reader.lookup::<geoip2::City>(ip) {
            Ok(city) => city,
            Err(MaxMindDBError::AddressNotFoundError(_)) => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        Ok(Some(annotation_from_city(ip, city)))
    }
}

impl fmt::Debug for MaxMindGeoLookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MaxMindGeoLookup")
            .field("database_type", &self.reader.metadata.database_type)
            .finish()
    }
}

/// Copies whatever the database knows about `ip` into an annotation. Each field is filled
/// independently; the first subdivision is the region.
fn annotation_from_city(ip: IpAddr, city: geoip2::City<'_>) -> GeoAnnotation {
    let mut annotation = GeoAnnotation::new(ip);

    if let Some(location) = city.location {
        annotation.latitude = location.latitude;
        annotation.longitude = location.longitude;
        annotation.timezone = location.time_zone.map(str::to_string);
    }
    if let Some(continent) = city.continent {
        annotation.continent_code = continent.code.map(str::to_string);
    }
    if let Some(country) = city.country {
        annotation.country_code = country.iso_code.map(str::to_string);
        annotation.country_name = english_name(country.names);
    }
    if let Some(place) = city.city {
        annotation.city_name = english_name(place.names);
    }
    if let Some(postal) = city.postal {
        annotation.postal_code = postal.code.map(str::to_string);
    }
    let region = city
        .subdivisions
        .and_then(|subdivisions| subdivisions.into_iter().next());
    if let Some(region) = region {
        annotation.region_code = region.iso_code.map(str::to_string);
        annotation.region_name = english_name(region.names);
    }

    annotation
}

fn english_name(names: Option<BTreeMap<&str, &str>>) -> Option<String> {
    names
        .and_then(|names| names.get(NAME_LANGUAGE).copied())
        .map(str::to_string)
}
