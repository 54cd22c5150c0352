use crate::domain::order::OrderId;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// WGS84 coordinate of a merchant store or an agent's last reported
/// position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance between two points, in kilometers (haversine).
pub fn distance_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();
    let h = (d_lat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().asin()
}

/// An agent currently online, with their last reported position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AgentPosition {
    pub agent: u64,
    pub position: GeoPoint,
}

/// One candidate in an offer, ranked by distance to the order's origin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OfferCandidate {
    pub agent: u64,
    pub distance_km: f64,
}

/// A broadcast of one order to a set of agents, alive only while the
/// acceptance window is open. At most one winner is ever recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchOffer {
    pub order: OrderId,
    /// Candidates within radius, ascending by distance. The whole set is
    /// offered, not just the nearest: availability can change between the
    /// scan and acceptance, so first acceptance wins.
    pub candidates: Vec<OfferCandidate>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub winner: Option<u64>,
}

impl DispatchOffer {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn is_candidate(&self, agent: u64) -> bool {
        self.candidates.iter().any(|c| c.agent == agent)
    }
}

/// Dispatch tuning. The acceptance window and re-dispatch radius growth are
/// deliberately configuration, not contract.
#[derive(Debug, Clone, Copy)]
pub struct DispatchConfig {
    pub max_radius_km: f64,
    /// Radius multiplier applied on each re-dispatch round.
    pub redispatch_radius_factor: f64,
    pub offer_window: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_radius_km: 5.0,
            redispatch_radius_factor: 1.5,
            offer_window: Duration::seconds(30),
        }
    }
}
