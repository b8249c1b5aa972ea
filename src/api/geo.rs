//! Geolocation provider client.
//!
//! Acquisition runs on a worker thread with a fixed timeout. Denial, timeout,
//! and transport errors all degrade to the (0, 0) sentinel — emergency entry
//! must never block on a location fix.

use crate::log_debug;
use serde::Deserialize;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

/// A latitude/longitude fix. `(0.0, 0.0)` is the fallback sentinel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

impl Location {
    pub const FALLBACK: Location = Location {
        latitude: 0.0,
        longitude: 0.0,
    };

    pub fn is_fallback(&self) -> bool {
        self.latitude == 0.0 && self.longitude == 0.0
    }
}

#[derive(Deserialize)]
struct GeoResponse {
    #[serde(alias = "latitude")]
    lat: f64,
    #[serde(alias = "longitude")]
    lon: f64,
}

/// Blocking client for an IP-geolocation-shaped JSON endpoint.
pub struct GeoProvider {
    http: Option<reqwest::blocking::Client>,
    url: String,
}

impl GeoProvider {
    pub fn new(url: &str, timeout: Duration) -> Self {
        let http = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .ok();
        if http.is_none() {
            log_debug("geolocation client failed to build; fixes will use the fallback");
        }
        Self {
            http,
            url: url.to_string(),
        }
    }

    /// Acquire a fix. Infallible by design: any failure is the fallback.
    pub fn locate(&self) -> Location {
        let Some(http) = self.http.as_ref() else {
            return Location::FALLBACK;
        };
        match self.fetch(http) {
            Ok(location) => location,
            Err(err) => {
                log_debug(&format!("location acquisition failed: {err}"));
                Location::FALLBACK
            }
        }
    }

    fn fetch(&self, http: &reqwest::blocking::Client) -> Result<Location, reqwest::Error> {
        let response = http.get(&self.url).send()?.error_for_status()?;
        let body: GeoResponse = response.json()?;
        Ok(Location {
            latitude: body.lat,
            longitude: body.lon,
        })
    }
}

/// Handle the UI uses to poll a pending location fix.
pub struct LocateJob {
    pub receiver: mpsc::Receiver<Location>,
    pub handle: Option<thread::JoinHandle<()>>,
}

/// Acquire the fix off the UI thread; exactly one `Location` is delivered.
pub fn start_locate_job(provider: GeoProvider) -> LocateJob {
    let (tx, rx) = mpsc::sync_channel(1);
    let handle = thread::spawn(move || {
        let _ = tx.send(provider.locate());
    });
    LocateJob {
        receiver: rx,
        handle: Some(handle),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(2);

    #[test]
    fn successful_fix_parses_lat_lon() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("GET", "/json")
            .with_status(200)
            .with_body(r#"{"lat": 51.5072, "lon": -0.1276}"#)
            .create();

        let provider = GeoProvider::new(&format!("{}/json", server.url()), TIMEOUT);
        let location = provider.locate();
        assert!((location.latitude - 51.5072).abs() < f64::EPSILON);
        assert!((location.longitude + 0.1276).abs() < f64::EPSILON);
        assert!(!location.is_fallback());
    }

    #[test]
    fn longitude_latitude_aliases_are_accepted() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("GET", "/json")
            .with_status(200)
            .with_body(r#"{"latitude": 12.5, "longitude": 33.25}"#)
            .create();

        let provider = GeoProvider::new(&format!("{}/json", server.url()), TIMEOUT);
        let location = provider.locate();
        assert!((location.latitude - 12.5).abs() < f64::EPSILON);
    }

    #[test]
    fn denial_degrades_to_fallback() {
        let mut server = mockito::Server::new();
        let _mock = server.mock("GET", "/json").with_status(403).create();

        let provider = GeoProvider::new(&format!("{}/json", server.url()), TIMEOUT);
        assert!(provider.locate().is_fallback());
    }

    #[test]
    fn unreachable_endpoint_degrades_to_fallback() {
        let provider = GeoProvider::new("http://127.0.0.1:1/json", TIMEOUT);
        assert!(provider.locate().is_fallback());
    }

    #[test]
    fn locate_job_delivers_exactly_one_fix() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("GET", "/json")
            .with_status(200)
            .with_body(r#"{"lat": 1.0, "lon": 2.0}"#)
            .create();

        let provider = GeoProvider::new(&format!("{}/json", server.url()), TIMEOUT);
        let mut job = start_locate_job(provider);
        let location = job
            .receiver
            .recv_timeout(Duration::from_secs(5))
            .expect("fix arrives");
        assert!((location.longitude - 2.0).abs() < f64::EPSILON);
        if let Some(handle) = job.handle.take() {
            let _ = handle.join();
        }
        assert!(job.receiver.recv_timeout(Duration::from_millis(50)).is_err());
    }
}
