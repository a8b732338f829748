/// Nearest-match estimation between clients and ambulances
///
/// Distances are planar Euclidean over raw (latitude, longitude) pairs, not
/// geodesic. Displayed "~X km" figures are calibrated against this, so the
/// conversion to kilometers stays a flat multiplication done by the caller.

use serde::{Deserialize, Serialize};

/// Degrees-to-kilometers factor used when no configuration overrides it
pub const DEFAULT_KM_PER_DEGREE: f64 = 111.0;

/// A latitude/longitude pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.latitude.is_finite() && self.longitude.is_finite()
    }

    /// True when both components lie within the usual geographic bounds
    pub fn in_range(&self) -> bool {
        (-90.0..=90.0).contains(&self.latitude) && (-180.0..=180.0).contains(&self.longitude)
    }

    /// Planar Euclidean distance in coordinate units
    pub fn planar_distance(&self, other: &Coordinates) -> f64 {
        let d_lat = self.latitude - other.latitude;
        let d_lon = self.longitude - other.longitude;
        (d_lat * d_lat + d_lon * d_lon).sqrt()
    }
}

/// Closest ambulance for one client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NearestMatch {
    pub client_id: String,
    pub ambulance_id: String,
    /// Planar distance in coordinate units
    pub distance: f64,
}

/// For every client, pick the ambulance with the smallest planar distance.
///
/// Inputs are ordered slices; on equal distances the ambulance appearing
/// first wins. No matches are produced when `ambulances` is empty.
pub fn estimate_nearest(
    clients: &[(String, Coordinates)],
    ambulances: &[(String, Coordinates)],
) -> Vec<NearestMatch> {
    clients
        .iter()
        .filter_map(|(client_id, client_pos)| {
            let mut best: Option<(&String, f64)> = None;
            for (ambulance_id, ambulance_pos) in ambulances {
                let distance = client_pos.planar_distance(ambulance_pos);
                match best {
                    Some((_, best_distance)) if distance >= best_distance => {}
                    _ => best = Some((ambulance_id, distance)),
                }
            }

            best.map(|(ambulance_id, distance)| NearestMatch {
                client_id: client_id.clone(),
                ambulance_id: ambulance_id.clone(),
                distance,
            })
        })
        .collect()
}

/// Rough kilometer figure for display
pub fn approx_km(planar_distance: f64, km_per_degree: f64) -> f64 {
    planar_distance * km_per_degree
}
