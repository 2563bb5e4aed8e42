use crate::inference::InferenceError;
use ndarray::{Array, Ix4};

/// Top-ranked class for one input image.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub label: String,
    /// Model probability for the top class, as a percentage in `[0, 100]`.
    pub confidence: f32,
}

/// Seam between request handling and the inference runtime. The call is
/// synchronous; handlers run it on the blocking pool under a bounded timeout.
pub trait ModelService: std::fmt::Debug + Send + Sync + 'static {
    fn predict(&self, input: &Array<f32, Ix4>) -> Result<Prediction, InferenceError>;
}
