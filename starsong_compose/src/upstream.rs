// Upstream collaborators: ephemeris and chart-to-vector model.
//
// Both are external systems. The orchestrator talks to them through the
// `Ephemeris` and `VectorModel` traits and never fails a request because one
// is absent or erroring: it logs a warning and substitutes the neutral astro
// summary or the neutral control vector. Implementations must be
// `Send + Sync` because one context is shared by concurrent requests.

use serde::{Deserialize, Serialize};
use starsong_music::astro::AstroSummary;
use starsong_music::controls::ControlVector;
use tracing::warn;

/// A place and time to cast a chart for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartPoint {
    pub latitude: f64,
    pub longitude: f64,
    /// ISO-8601 date-time, passed through to the ephemeris untouched.
    pub datetime: String,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum UpstreamError {
    #[error("upstream unavailable: {0}")]
    Unavailable(String),

    #[error("upstream returned an invalid value: {0}")]
    Invalid(String),
}

/// Astronomical ephemeris: chart point -> astro summary.
pub trait Ephemeris: Send + Sync {
    fn summarize(&self, point: &ChartPoint) -> Result<AstroSummary, UpstreamError>;
}

/// Learned model: astro summary -> six-dimensional control vector.
pub trait VectorModel: Send + Sync {
    fn infer(&self, astro: &AstroSummary) -> Result<ControlVector, UpstreamError>;
}

/// Where a value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    Upstream,
    Fallback,
}

/// Ask the ephemeris for a summary, falling back to the neutral one.
pub fn astro_or_neutral(
    ephemeris: Option<&dyn Ephemeris>,
    point: &ChartPoint,
) -> (AstroSummary, Provenance) {
    let Some(ephemeris) = ephemeris else {
        warn!("no ephemeris configured, using neutral astro summary");
        return (AstroSummary::neutral(), Provenance::Fallback);
    };
    match ephemeris.summarize(point) {
        Ok(summary) => (summary.normalized(), Provenance::Upstream),
        Err(e) => {
            warn!(
                error = %e,
                datetime = %point.datetime,
                "ephemeris failed, using neutral astro summary"
            );
            (AstroSummary::neutral(), Provenance::Fallback)
        }
    }
}

/// Ask the model for a vector, falling back to the neutral one. A vector
/// with a non-finite component counts as a failure.
pub fn vector_or_neutral(
    model: Option<&dyn VectorModel>,
    astro: &AstroSummary,
) -> (ControlVector, Provenance) {
    let Some(model) = model else {
        warn!("no vector model configured, using neutral control vector");
        return (ControlVector::neutral(), Provenance::Fallback);
    };
    let result = model.infer(astro).and_then(|v| {
        if v.as_array().iter().all(|x| x.is_finite()) {
            Ok(ControlVector::from_array(v.as_array()))
        } else {
            Err(UpstreamError::Invalid(format!("{v:?}")))
        }
    });
    match result {
        Ok(vector) => (vector, Provenance::Upstream),
        Err(e) => {
            warn!(error = %e, "vector model failed, using neutral control vector");
            (ControlVector::neutral(), Provenance::Fallback)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Down;

    impl Ephemeris for Down {
        fn summarize(&self, _: &ChartPoint) -> Result<AstroSummary, UpstreamError> {
            Err(UpstreamError::Unavailable("timeout".into()))
        }
    }

    impl VectorModel for Down {
        fn infer(&self, _: &AstroSummary) -> Result<ControlVector, UpstreamError> {
            Err(UpstreamError::Unavailable("not loaded".into()))
        }
    }

    struct NanModel;

    impl VectorModel for NanModel {
        fn infer(&self, _: &AstroSummary) -> Result<ControlVector, UpstreamError> {
            Ok(ControlVector {
                pace: f64::NAN,
                ..ControlVector::neutral()
            })
        }
    }

    struct LoudModel;

    impl VectorModel for LoudModel {
        fn infer(&self, _: &AstroSummary) -> Result<ControlVector, UpstreamError> {
            Ok(ControlVector {
                rhythm_density: 1.7,
                ..ControlVector::neutral()
            })
        }
    }

    fn point() -> ChartPoint {
        ChartPoint {
            latitude: 51.5,
            longitude: -0.1,
            datetime: "1990-04-01T12:00:00Z".into(),
        }
    }

    #[test]
    fn test_missing_ephemeris_falls_back() {
        let (astro, provenance) = astro_or_neutral(None, &point());
        assert_eq!(provenance, Provenance::Fallback);
        assert_eq!(astro, AstroSummary::neutral());
    }

    #[test]
    fn test_failing_upstreams_fall_back() {
        let (astro, p1) = astro_or_neutral(Some(&Down as &dyn Ephemeris), &point());
        let (vector, p2) = vector_or_neutral(Some(&Down as &dyn VectorModel), &astro);
        assert_eq!((p1, p2), (Provenance::Fallback, Provenance::Fallback));
        assert_eq!(vector, ControlVector::neutral());
    }

    #[test]
    fn test_non_finite_vector_falls_back() {
        let model = NanModel;
        let (vector, provenance) =
            vector_or_neutral(Some(&model as &dyn VectorModel), &AstroSummary::neutral());
        assert_eq!(provenance, Provenance::Fallback);
        assert_eq!(vector, ControlVector::neutral());
    }

    #[test]
    fn test_out_of_range_vector_is_clamped() {
        let model = LoudModel;
        let (vector, provenance) =
            vector_or_neutral(Some(&model as &dyn VectorModel), &AstroSummary::neutral());
        assert_eq!(provenance, Provenance::Upstream);
        assert_eq!(vector.rhythm_density, 1.0);
    }
}
