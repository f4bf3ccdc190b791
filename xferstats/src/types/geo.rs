use std::net::IpAddr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Geographic metadata for a destination address.
///
/// Every field other than the address is independently optional; the geo database may know
/// a country but no city, coordinates but no timezone, and so on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoAnnotation {
    pub ip: IpAddr,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub continent_code: Option<String>,
    pub city_name: Option<String>,
    pub country_code: Option<String>,
    pub country_name: Option<String>,
    pub region_code: Option<String>,
    pub region_name: Option<String>,
    pub postal_code: Option<String>,
    pub timezone: Option<String>,
}

impl GeoAnnotation {
    /// Creates an annotation for `ip` with no sub-fields set.
    pub fn new(ip: IpAddr) -> Self {
        Self {
            ip,
            latitude: None,
            longitude: None,
            continent_code: None,
            city_name: None,
            country_code: None,
            country_name: None,
            region_code: None,
            region_name: None,
            postal_code: None,
            timezone: None,
        }
    }

    /// Returns `[longitude, latitude]` when both coordinates are known.
    pub fn location(&self) -> Option<[f64; 2]> {
        match (self.longitude, self.latitude) {
            (Some(longitude), Some(latitude)) => Some([longitude, latitude]),
            _ => None,
        }
    }

    /// Renders the `geoip` object of a stored document.
    ///
    /// Absent sub-fields are omitted rather than written as nulls.
    pub fn to_document(&self) -> Map<String, Value> {
        let mut geoip = Map::new();
        geoip.insert("ip".to_string(), Value::String(self.ip.to_string()));

        if let Some([longitude, latitude]) = self.location() {
            geoip.insert("latitude".to_string(), Value::from(latitude));
            geoip.insert("longitude".to_string(), Value::from(longitude));
            geoip.insert(
                "location".to_string(),
                Value::Array(vec![Value::from(longitude), Value::from(latitude)]),
            );
        }

        let optional_fields = [
            ("continent_code", &self.continent_code),
            ("city_name", &self.city_name),
            ("country_code2", &self.country_code),
            ("country_name", &self.country_name),
            ("region_code", &self.region_code),
            ("region_name", &self.region_name),
            ("postal_code", &self.postal_code),
            ("timezone", &self.timezone),
        ];
        for (name, value) in optional_fields {
            if let Some(value) = value {
                geoip.insert(name.to_string(), Value::String(value.clone()));
            }
        }

        geoip
    }
}
