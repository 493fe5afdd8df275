// THEORY:
// Single-point linear calibration. A target of known reflectance photographed in the
// same frame as the samples fixes the scale between measured intensity and reflectance
// for the whole image: reflectance = intensity * (truth / calibration_intensity).
// The scale is only defined for a positive calibration intensity, so that case is
// rejected up front instead of letting inf/NaN flow into the results.

use crate::error::CalibrationError;

/// Converts a region intensity to a reflectance percentage relative to a calibration
/// region of known reflectance `calibration_truth_pct`.
pub fn normalize(
    sample_intensity: f64,
    calibration_intensity: f64,
    calibration_truth_pct: f64,
) -> Result<f64, CalibrationError> {
    // `!(x > 0.0)` also catches NaN.
    if !(calibration_intensity > 0.0) {
        return Err(CalibrationError::DegenerateCalibration {
            intensity: calibration_intensity,
        });
    }
    Ok((sample_intensity / calibration_intensity) * calibration_truth_pct)
}

/// Intensity-to-reflectance scale of one image, fixed by its calibration region.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationScale {
    calibration_intensity: f64,
    truth_pct: f64,
}

impl CalibrationScale {
    pub fn new(calibration_intensity: f64, truth_pct: f64) -> Result<Self, CalibrationError> {
        // Validate once so `apply` cannot fail.
        normalize(calibration_intensity, calibration_intensity, truth_pct)?;
        Ok(Self {
            calibration_intensity,
            truth_pct,
        })
    }

    pub fn calibration_intensity(&self) -> f64 {
        self.calibration_intensity
    }

    pub fn truth_pct(&self) -> f64 {
        self.truth_pct
    }

    pub fn apply(&self, sample_intensity: f64) -> f64 {
        (sample_intensity / self.calibration_intensity) * self.truth_pct
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn self_calibration_returns_truth() {
        for (intensity, truth) in [(1.0, 8.8), (100.0, 35.6), (0.25, 13.3), (254.9, 30.0)] {
            assert_relative_eq!(normalize(intensity, intensity, truth).unwrap(), truth);
        }
    }

    #[test]
    fn is_linear_in_sample_intensity() {
        let (c, t) = (137.0, 23.7);
        for s in [0.0, 12.5, 80.0, 255.0] {
            assert_relative_eq!(
                normalize(2.0 * s, c, t).unwrap(),
                2.0 * normalize(s, c, t).unwrap()
            );
        }
    }

    #[test]
    fn half_the_calibration_intensity_is_half_the_truth() {
        assert_relative_eq!(normalize(50.0, 100.0, 10.0).unwrap(), 5.0);
    }

    #[test]
    fn rejects_non_positive_calibration() {
        for bad in [0.0, -3.0, f64::NAN] {
            let err = normalize(50.0, bad, 10.0).unwrap_err();
            assert!(matches!(err, CalibrationError::DegenerateCalibration { .. }));
        }
    }

    #[test]
    fn scale_applies_the_same_ratio() {
        let scale = CalibrationScale::new(120.0, 30.0).unwrap();
        assert_relative_eq!(scale.apply(60.0), normalize(60.0, 120.0, 30.0).unwrap());
        assert!(CalibrationScale::new(0.0, 30.0).is_err());
    }
}
