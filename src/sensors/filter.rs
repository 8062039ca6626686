//! Minimum interval / displacement filtering for location updates

use crate::sensors::traits::LocationRequest;
use collect_shared::LocationFix;
use tokio::time::Instant;

const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Drops fixes that arrive sooner than `min_interval` after, or closer
/// than `min_distance_m` to, the last delivered fix
#[derive(Debug)]
pub struct LocationFilter {
    request: LocationRequest,
    last: Option<(Instant, LocationFix)>,
}

impl LocationFilter {
    pub fn new(request: LocationRequest) -> Self {
        Self {
            request,
            last: None,
        }
    }

    /// Returns true when `fix` should be delivered, and remembers it
    pub fn accept(&mut self, now: Instant, fix: LocationFix) -> bool {
        if let Some((delivered_at, previous)) = self.last {
            if now.saturating_duration_since(delivered_at) < self.request.min_interval {
                return false;
            }
            if self.request.min_distance_m > 0.0
                && distance_m(&previous, &fix) < self.request.min_distance_m
            {
                return false;
            }
        }

        self.last = Some((now, fix));
        true
    }
}

/// Great-circle distance between two fixes (haversine)
pub fn distance_m(a: &LocationFix, b: &LocationFix) -> f64 {
    let (lat1, lat2) = (a.latitude.to_radians(), b.latitude.to_radians());
    let dlat = lat2 - lat1;
    let dlon = (b.longitude - a.longitude).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().asin()
}
