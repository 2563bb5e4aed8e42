use crate::{
    config::ModelConfig,
    labels::load_class_labels,
    model_service::{ModelService, Prediction},
    preprocess::{INPUT_HEIGHT, INPUT_WIDTH},
};
use ndarray::{Array, ArrayD, Axis, Ix4};
use ort::{
    execution_providers::CPU,
    session::{builder::GraphOptimizationLevel, Session},
    value::TensorRef,
};
use parking_lot::Mutex;
use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};
use thiserror::Error;

/// Why the classifier never became ready. Held in the application state for
/// the lifetime of the process; every prediction is rejected while set.
#[derive(Error, Debug)]
pub enum ModelLoadError {
    #[error("model file not found: {0}")]
    ModelFileMissing(PathBuf),
    #[error("labels file not found: {0}")]
    LabelsFileMissing(PathBuf),
    #[error("failed to read class labels: {0}")]
    Labels(#[from] std::io::Error),
    #[error("onnx runtime error: {0}")]
    Ort(#[from] ort::Error),
    #[error("model declares no outputs")]
    NoOutputs,
    #[error("model warmup failed: {0}")]
    Warmup(#[from] InferenceError),
    #[error("model outputs {model_classes} classes but the labels file lists {label_count}")]
    ClassCountMismatch {
        model_classes: usize,
        label_count: usize,
    },
}

#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("inference failed: {0}")]
    Run(#[from] ort::Error),
    #[error("invalid output tensor: {0}")]
    BadOutput(String),
    #[error("model returned an empty probability vector")]
    EmptyOutput,
    #[error("class index {0} outside the configured label list")]
    UnknownClass(usize),
}

/// ONNX Runtime classifier over a fixed class set. Sessions are pooled and
/// picked round-robin per request.
#[derive(Debug)]
pub struct OrtClassifier {
    sessions: Vec<Arc<Mutex<Session>>>,
    counter: AtomicUsize,
    output_name: String,
    class_labels: Vec<String>,
}

impl OrtClassifier {
    pub fn new(model_config: &ModelConfig) -> Result<Self, ModelLoadError> {
        let model_path = model_config.get_model_path();
        if !model_path.exists() {
            return Err(ModelLoadError::ModelFileMissing(model_path));
        }
        let labels_path = model_config.get_labels_path();
        if !labels_path.exists() {
            return Err(ModelLoadError::LabelsFileMissing(labels_path));
        }
        let class_labels = load_class_labels(&labels_path)?;

        ort::init()
            .with_execution_providers([CPU::default().build()])
            .commit();

        let num_instances = model_config.num_instances.max(1);
        let sessions = (0..num_instances)
            .map(|_| {
                let session = Session::builder()?
                    .with_optimization_level(GraphOptimizationLevel::Level3)?
                    .commit_from_file(&model_path)?;
                Ok(Arc::new(Mutex::new(session)))
            })
            .collect::<Result<Vec<_>, ort::Error>>()?;

        let output_name = match sessions[0].lock().outputs().first() {
            Some(output) => output.name().to_string(),
            None => return Err(ModelLoadError::NoOutputs),
        };

        let classifier = Self {
            sessions,
            counter: AtomicUsize::new(0),
            output_name,
            class_labels,
        };

        // The warmup pass doubles as the output-width check: a labels file
        // that drifted from the deployed model fails startup instead of
        // mislabeling every prediction.
        let input = Array::zeros((1, INPUT_HEIGHT as usize, INPUT_WIDTH as usize, 3));
        let probabilities = classifier.run_inference(&input)?;
        if probabilities.len() != classifier.class_labels.len() {
            return Err(ModelLoadError::ClassCountMismatch {
                model_classes: probabilities.len(),
                label_count: classifier.class_labels.len(),
            });
        }

        tracing::info!(
            "created {} ONNX sessions over {} classes",
            num_instances,
            classifier.class_labels.len()
        );

        Ok(classifier)
    }

    fn run_inference(&self, input: &Array<f32, Ix4>) -> Result<Vec<f32>, InferenceError> {
        let index = self.counter.fetch_add(1, Ordering::SeqCst) % self.sessions.len();
        let mut session = self.sessions[index].lock();
        tracing::debug!("handling request with session {}", index);

        let owned_buffer;
        let input_view = if input.view().is_standard_layout() {
            input.view()
        } else {
            owned_buffer = input.to_owned();
            owned_buffer.view()
        };

        let tensor_ref = TensorRef::from_array_view(input_view)?;
        let outputs = session.run(ort::inputs![tensor_ref])?;

        let (shape, data) = outputs[self.output_name.as_str()].try_extract_tensor::<f32>()?;
        let array = ArrayD::from_shape_vec(shape.to_ixdyn(), data.to_vec())
            .map_err(|e| InferenceError::BadOutput(e.to_string()))?;

        squeeze_probabilities(array)
    }
}

impl ModelService for OrtClassifier {
    fn predict(&self, input: &Array<f32, Ix4>) -> Result<Prediction, InferenceError> {
        let probabilities = self.run_inference(input)?;
        top_class(&probabilities, &self.class_labels)
    }
}

/// Collapses a `[1, n]` or `[n]` output into the flat probability vector.
fn squeeze_probabilities(output: ArrayD<f32>) -> Result<Vec<f32>, InferenceError> {
    match output.ndim() {
        1 => Ok(output.iter().copied().collect()),
        2 => Ok(output.index_axis(Axis(0), 0).iter().copied().collect()),
        rank => Err(InferenceError::BadOutput(format!(
            "expected a probability vector, got rank {rank}"
        ))),
    }
}

fn top_class(probabilities: &[f32], class_labels: &[String]) -> Result<Prediction, InferenceError> {
    let (index, probability) = probabilities
        .iter()
        .copied()
        .enumerate()
        .reduce(|best, candidate| if candidate.1 > best.1 { candidate } else { best })
        .ok_or(InferenceError::EmptyOutput)?;

    let label = class_labels
        .get(index)
        .cloned()
        .ok_or(InferenceError::UnknownClass(index))?;

    Ok(Prediction {
        label,
        confidence: probability * 100.0,
    })
}
