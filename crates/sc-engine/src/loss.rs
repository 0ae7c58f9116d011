use sc_types::{validation_error, ScResult};
use serde::{Deserialize, Serialize};

/// Loss over paired (simulated, real) makespans, used to score a
/// calibration on evaluation workflows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LossFunction {
    MeanSquareError,
    #[default]
    RelativeAverageError,
}

impl LossFunction {
    pub fn compute(&self, simulated: &[f64], real: &[f64]) -> ScResult<f64> {
        if simulated.len() != real.len() {
            return Err(validation_error!(
                "loss needs paired makespans (got {} simulated, {} real)",
                simulated.len(),
                real.len()
            ));
        }
        if simulated.is_empty() {
            return Err(validation_error!("loss over an empty set of makespans"));
        }
        let n = simulated.len() as f64;
        let pairs = simulated.iter().zip(real);
        let loss = match self {
            Self::MeanSquareError => pairs.map(|(s, r)| (s - r).powi(2)).sum::<f64>() / n,
            Self::RelativeAverageError => {
                if real.iter().any(|r| *r == 0.0) {
                    return Err(validation_error!("relative error against a zero real makespan"));
                }
                pairs.map(|(s, r)| (s - r).abs() / r).sum::<f64>() / n
            }
        };
        Ok(loss)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::MeanSquareError => "mean_square_error",
            Self::RelativeAverageError => "relative_average_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_square_error() {
        let loss = LossFunction::MeanSquareError
            .compute(&[1.0, 2.0, 4.0], &[1.0, 3.0, 2.0])
            .unwrap();
        assert!((loss - 5.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn relative_average_error_divides_by_real() {
        let loss = LossFunction::RelativeAverageError
            .compute(&[12.0, 9.0], &[10.0, 10.0])
            .unwrap();
        assert!((loss - 0.15).abs() < 1e-12);
    }

    #[test]
    fn rejects_bad_inputs() {
        assert!(LossFunction::MeanSquareError.compute(&[1.0], &[]).is_err());
        assert!(LossFunction::MeanSquareError.compute(&[], &[]).is_err());
        assert!(LossFunction::RelativeAverageError.compute(&[1.0], &[0.0]).is_err());
    }

    #[test]
    fn serde_names() {
        let loss: LossFunction = serde_json::from_str("\"mean_square_error\"").unwrap();
        assert_eq!(loss, LossFunction::MeanSquareError);
        assert_eq!(LossFunction::default().name(), "relative_average_error");
    }
}
