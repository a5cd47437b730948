use ctr_data::synthetic::{synthetic_dataset, SyntheticOptions};
use ctr_data::{Dataset, FeatureColumns};
use ctr_layers::{ActivationType, IndexTensor, Tensor};
use ctr_models::{build_model, AfmConfig, CtrModel, DeepFmConfig, FfmConfig, ModelConfig, ModelKind};

fn small_config() -> ModelConfig {
    ModelConfig {
        afm: AfmConfig::default(),
        deepfm: DeepFmConfig {
            k: 4,
            hidden_units: vec![16, 8],
            ..DeepFmConfig::default()
        },
        ffm: FfmConfig {
            k: 4,
            ..FfmConfig::default()
        },
    }
}

/// Smooth activations so finite differences are valid everywhere.
fn smooth_config() -> ModelConfig {
    let mut config = small_config();
    config.afm.activation = ActivationType::Tanh;
    config.deepfm.activation = ActivationType::Tanh;
    config
}

fn data(rows: usize) -> (FeatureColumns, Dataset) {
    synthetic_dataset(&SyntheticOptions::small(rows)).expect("synthetic data")
}

fn bce(probs: &Tensor, labels: &[f32]) -> f32 {
    let sum: f32 = probs
        .data()
        .iter()
        .zip(labels)
        .map(|(&p, &y)| {
            let p = p.clamp(1e-7, 1.0 - 1e-7);
            -(y * p.ln() + (1.0 - y) * (1.0 - p).ln())
        })
        .sum();
    sum / labels.len() as f32
}

#[test]
fn outputs_are_probabilities() {
    let (columns, dataset) = data(32);
    for kind in ModelKind::ALL {
        let model = build_model(kind, &columns, &small_config(), 11).expect("build");
        let probs = model.forward(dataset.dense(), dataset.sparse()).expect("forward");
        assert_eq!(probs.shape(), &[32, 1], "{kind}");
        assert!(
            probs.data().iter().all(|p| p.is_finite() && (0.0..=1.0).contains(p)),
            "{kind}"
        );
    }
}

#[test]
fn construction_and_forward_are_deterministic() {
    let (columns, dataset) = data(4);
    for kind in ModelKind::ALL {
        let a = build_model(kind, &columns, &ModelConfig::default(), 2020).expect("build");
        let b = build_model(kind, &columns, &ModelConfig::default(), 2020).expect("build");
        let pa = a.forward(dataset.dense(), dataset.sparse()).expect("forward");
        let pb = b.forward(dataset.dense(), dataset.sparse()).expect("forward");
        assert_eq!(pa.data(), pb.data(), "{kind}");
        assert!(pa.all_finite(), "{kind}");

        let c = build_model(kind, &columns, &ModelConfig::default(), 2021).expect("build");
        let pc = c.forward(dataset.dense(), dataset.sparse()).expect("forward");
        assert_ne!(pa.data(), pc.data(), "{kind}");
    }
}

#[test]
fn repeated_rows_give_identical_outputs() {
    let (columns, _) = data(4);
    let dense = Tensor::from_data(&[3, 2], vec![0.4, 0.1, 0.4, 0.1, 0.9, 0.9]);
    let sparse = IndexTensor::from_rows(&[vec![2, 1], vec![2, 1], vec![0, 1]]).expect("ids");
    for kind in ModelKind::ALL {
        let model = build_model(kind, &columns, &small_config(), 5).expect("build");
        let probs = model.forward(&dense, &sparse).expect("forward");
        assert_eq!(probs.data()[0], probs.data()[1], "{kind}");
    }
}

#[test]
fn training_forward_matches_inference_without_dropout() {
    let (columns, dataset) = data(8);
    for kind in ModelKind::ALL {
        let mut model = build_model(kind, &columns, &small_config(), 9).expect("build");
        let inference = model.forward(dataset.dense(), dataset.sparse()).expect("forward");
        let training = model
            .forward_train(dataset.dense(), dataset.sparse())
            .expect("forward_train");
        for (a, b) in inference.data().iter().zip(training.data()) {
            assert!((a - b).abs() < 1e-6, "{kind}");
        }
    }
}

#[test]
fn backward_without_forward_is_an_error() {
    let (columns, _) = data(4);
    for kind in ModelKind::ALL {
        let mut model = build_model(kind, &columns, &small_config(), 1).expect("build");
        assert!(model.backward(&Tensor::zeros(&[4, 1])).is_err(), "{kind}");
    }
}

/// `J = Σ c_b · logit_b + regularization`, whose gradient the backward pass
/// stores when fed `c` as the logit gradient.
fn objective(model: &dyn CtrModel, dataset: &Dataset, coeffs: &[f32]) -> f32 {
    let logits = model.logits(dataset.dense(), dataset.sparse()).expect("logits");
    let linear: f32 = logits.data().iter().zip(coeffs).map(|(l, c)| l * c).sum();
    linear + model.regularization_loss()
}

#[test]
fn analytic_gradients_match_finite_differences() {
    let (columns, dataset) = data(6);
    let coeffs = [0.5, -0.3, 0.8, -0.1, 0.2, -0.7];
    let eps = 1e-2;

    for kind in ModelKind::ALL {
        let mut model = build_model(kind, &columns, &smooth_config(), 3).expect("build");
        model
            .forward_train(dataset.dense(), dataset.sparse())
            .expect("forward_train");
        model
            .backward(&Tensor::from_data(&[6, 1], coeffs.to_vec()))
            .expect("backward");
        let grads: Vec<Tensor> = model
            .gradients()
            .into_iter()
            .map(|g| g.cloned().expect("gradient present"))
            .collect();

        for (p, grad) in grads.iter().enumerate() {
            // a handful of entries per tensor
            let n = grad.numel();
            for idx in [0, n / 2, n - 1] {
                let original = model.parameters_mut()[p].data()[idx];
                model.parameters_mut()[p].data_mut()[idx] = original + eps;
                let plus = objective(model.as_ref(), &dataset, &coeffs);
                model.parameters_mut()[p].data_mut()[idx] = original - eps;
                let minus = objective(model.as_ref(), &dataset, &coeffs);
                model.parameters_mut()[p].data_mut()[idx] = original;

                let numeric = (plus - minus) / (2.0 * eps);
                let analytic = grad.data()[idx];
                let tolerance = 2e-3 + 0.05 * analytic.abs();
                assert!(
                    (numeric - analytic).abs() < tolerance,
                    "{kind} param {p} idx {idx}: numeric {numeric} vs analytic {analytic}"
                );
            }
        }
    }
}

#[test]
fn gradient_descent_reduces_loss() {
    let (columns, base) = data(64);
    // Clicks whenever the first sparse id is non-zero: imbalanced and learnable.
    let labels: Vec<f32> = base
        .sparse()
        .column(0)
        .iter()
        .map(|&id| if id == 0 { 0.0 } else { 1.0 })
        .collect();
    let dataset =
        Dataset::new(base.dense().clone(), base.sparse().clone(), labels.clone()).expect("dataset");
    let batch = labels.len() as f32;

    for kind in ModelKind::ALL {
        let mut model = build_model(kind, &columns, &small_config(), 17).expect("build");
        let initial = bce(
            &model.forward(dataset.dense(), dataset.sparse()).expect("forward"),
            &labels,
        );

        for _ in 0..30 {
            let probs = model
                .forward_train(dataset.dense(), dataset.sparse())
                .expect("forward_train");
            let grad: Vec<f32> = probs
                .data()
                .iter()
                .zip(&labels)
                .map(|(p, y)| (p - y) / batch)
                .collect();
            model
                .backward(&Tensor::from_data(&[labels.len(), 1], grad))
                .expect("backward");
            let grads: Vec<Tensor> = model
                .gradients()
                .into_iter()
                .map(|g| g.cloned().expect("gradient present"))
                .collect();
            for (param, g) in model.parameters_mut().into_iter().zip(&grads) {
                for (w, d) in param.data_mut().iter_mut().zip(g.data()) {
                    *w -= 0.1 * d;
                }
            }
        }

        let trained = bce(
            &model.forward(dataset.dense(), dataset.sparse()).expect("forward"),
            &labels,
        );
        assert!(trained < initial, "{kind}: {initial} -> {trained}");
    }
}

#[test]
fn summary_counts_every_parameter() {
    let (columns, _) = data(4);
    for kind in ModelKind::ALL {
        let mut model = build_model(kind, &columns, &small_config(), 0).expect("build");
        let summary = model.summary();
        let direct: usize = model.parameters_mut().iter().map(|t| t.numel()).sum();
        assert_eq!(summary.total_params(), direct, "{kind}");
        assert_eq!(summary.model, kind.to_string());
    }
}
