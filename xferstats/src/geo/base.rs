use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use tracing::warn;

use crate::error::IngestResult;
use crate::types::GeoAnnotation;

/// Read-only geographic database keyed by IP address.
pub trait GeoLookup {
    /// Returns the annotation for `ip`, or `None` when the database has no entry for it.
    fn lookup(&self, ip: IpAddr) -> IngestResult<Option<GeoAnnotation>>;
}

/// Derives optional geographic annotations from destination addresses.
///
/// The underlying database is shared read-only by every window worker.
#[derive(Clone)]
pub struct GeoEnricher {
    inner: Arc<dyn GeoLookup + Send + Sync>,
}

impl GeoEnricher {
    pub fn new<L: GeoLookup + Send + Sync + 'static>(lookup: L) -> Self {
        GeoEnricher {
            inner: Arc::new(lookup),
        }
    }

    /// Annotates `destination`.
    ///
    /// Addresses that cannot be read, database misses and lookup failures all yield `None`;
    /// a missing annotation never stops a record from being stored.
    pub fn enrich(&self, destination: &str) -> Option<GeoAnnotation> {
        let ip = parse_destination(destination)?;

        match self.inner.lookup(ip) {
            Ok(annotation) => annotation,
            Err(err) => {
                warn!(%ip, error = %err, "geo lookup failed, storing record without geo data");
                None
            }
        }
    }
}

impl fmt::Debug for GeoEnricher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeoEnricher").finish_non_exhaustive()
    }
}

/// Reads the IP address out of a destination.
///
/// Accepts a plain address, `ip:port`, `[ipv6]:port` and the `<ip:port?params>` contact
/// strings some transfer agents log.
pub fn parse_destination(destination: &str) -> Option<IpAddr> {
    let mut address = destination.trim();
    if let Some(inner) = address
        .strip_prefix('<')
        .and_then(|rest| rest.strip_suffix('>'))
    {
        address = inner.split('?').next().unwrap_or(inner);
    }

    if let Ok(ip) = address.parse::<IpAddr>() {
        return Some(ip);
    }

    address
        .parse::<SocketAddr>()
        .ok()
        .map(|socket_addr| socket_addr.ip())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::geo::memory::MemoryGeoLookup;
    use crate::ingest_error;

    struct FailingLookup;

    impl GeoLookup for FailingLookup {
        fn lookup(&self, _ip: IpAddr) -> IngestResult<Option<GeoAnnotation>> {
            Err(ingest_error!(
                ErrorKind::GeoDatabaseError,
                "Geo database is corrupt"
            ))
        }
    }

    fn google_dns() -> GeoAnnotation {
        let mut annotation = GeoAnnotation::new("8.8.8.8".parse().unwrap());
        annotation.country_code = Some("US".to_string());
        annotation
    }

    #[test]
    fn accepts_common_address_forms() {
        let expected: IpAddr = "8.8.8.8".parse().unwrap();

        assert_eq!(parse_destination("8.8.8.8"), Some(expected));
        assert_eq!(parse_destination(" 8.8.8.8:9618"), Some(expected));
        assert_eq!(
            parse_destination("<8.8.8.8:9618?addrs=8.8.8.8-9618&noUDP>"),
            Some(expected)
        );
        assert_eq!(
            parse_destination("[2001:4860:4860::8888]:443"),
            Some("2001:4860:4860::8888".parse().unwrap())
        );
    }

    #[test]
    fn rejects_host_names() {
        assert_eq!(parse_destination("storage.example.org"), None);
        assert_eq!(parse_destination(""), None);
    }

    #[test]
    fn enriches_known_addresses_only() {
        let enricher = GeoEnricher::new(MemoryGeoLookup::new().with_annotation(google_dns()));

        assert_eq!(enricher.enrich("8.8.8.8:9618"), Some(google_dns()));
        assert_eq!(enricher.enrich("1.1.1.1"), None);
        assert_eq!(enricher.enrich("not-an-address"), None);
    }

    #[test]
    fn lookup_failures_yield_no_annotation() {
        let enricher = GeoEnricher::new(FailingLookup);

        assert_eq!(enricher.enrich("8.8.8.8"), None);
    }
}
