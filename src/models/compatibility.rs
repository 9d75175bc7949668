use serde::{Deserialize, Serialize};

/// Where a compatibility result came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Provenance {
    Remote,
    LocalFallback,
}

/// Per-factor compatibility scores, each within [0, 100]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompatibilityBreakdown {
    pub temperament: f64,
    pub activity: f64,
    pub size: f64,
    pub age: f64,
    pub interests: f64,
    pub lifestyle: f64,
}

impl CompatibilityBreakdown {
    pub const FACTORS: [&'static str; 6] = [
        "temperament",
        "activity",
        "size",
        "age",
        "interests",
        "lifestyle",
    ];

    pub fn values(&self) -> [f64; 6] {
        [
            self.temperament,
            self.activity,
            self.size,
            self.age,
            self.interests,
            self.lifestyle,
        ]
    }

    pub fn mean(&self) -> f64 {
        self.values().iter().sum::<f64>() / 6.0
    }

    /// Name and value of the strongest and weakest factor
    pub fn extremes(&self) -> ((&'static str, f64), (&'static str, f64)) {
        let values = self.values();
        let mut best = (Self::FACTORS[0], values[0]);
        let mut worst = best;
        for (name, value) in Self::FACTORS.iter().zip(values.iter()).skip(1) {
            if *value > best.1 {
                best = (*name, *value);
            }
            if *value < worst.1 {
                worst = (*name, *value);
            }
        }
        (best, worst)
    }
}

/// Compatibility of two profiles. Not persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompatibilityResult {
    pub overall: f64,
    pub breakdown: CompatibilityBreakdown,
    pub summary: String,
    pub provenance: Provenance,
}

/// Raw payload returned by the remote scorer
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemoteScoreResponse {
    #[serde(default)]
    pub overall: Option<f64>,
    #[serde(default)]
    pub breakdown: Option<RemoteBreakdown>,
    #[serde(default)]
    pub summary: Option<String>,
}

/// Remote breakdown; every factor is optional on the wire and checked on normalisation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemoteBreakdown {
    pub temperament: Option<f64>,
    pub activity: Option<f64>,
    pub size: Option<f64>,
    pub age: Option<f64>,
    pub interests: Option<f64>,
    pub lifestyle: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_breakdown_mean_and_extremes() {
        let b = CompatibilityBreakdown {
            temperament: 90.0,
            activity: 60.0,
            size: 30.0,
            age: 60.0,
            interests: 60.0,
            lifestyle: 60.0,
        };
        assert!((b.mean() - 60.0).abs() < 1e-9);
        let ((best, _), (worst, _)) = b.extremes();
        assert_eq!(best, "temperament");
        assert_eq!(worst, "size");
    }

    #[test]
    fn test_provenance_wire_name() {
        assert_eq!(
            serde_json::to_string(&Provenance::LocalFallback).unwrap(),
            "\"local-fallback\""
        );
    }
}
