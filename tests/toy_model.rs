use anyhow::Result;
use approx::assert_abs_diff_eq;
use ndarray::Array1;
use rwkvforge_rwkv::state::LOG_SCALE_SENTINEL;
use rwkvforge_rwkv::{LoadError, RawTensor, RecurrentState, RwkvModel, Slot, WeightSet};
use safetensors::tensor::TensorView;
use safetensors::Dtype;

const N_EMBD: usize = 4;
const VOCAB: usize = 6;

/// Logits after feeding `[3, 1]` to the toy model, from an independent
/// float64 evaluation of the same recurrence.
const EXPECTED_AFTER_3: [f32; VOCAB] = [
    -0.9662424, -0.8694933, -0.9285486, -0.8317994, -0.8908548, -0.7941055,
];
const EXPECTED_AFTER_3_1: [f32; VOCAB] = [
    -1.2831635, -0.3668283, -1.2375632, -0.3212279, -1.1919629, -0.2756276,
];

fn pattern(seed: usize, len: usize, scale: f32, offset: f32) -> Vec<f32> {
    (0..len)
        .map(|i| ((i * 7 + seed * 13) % 19) as f32 / 19.0 * scale + offset)
        .collect()
}

/// Hand-specified 2-layer, 4-wide model with a 6-token vocabulary.
fn toy_tensors() -> Vec<RawTensor> {
    let n = N_EMBD;
    let time = vec![1, 1, n];
    let mut tensors = vec![
        RawTensor::new("emb.weight", vec![VOCAB, n], pattern(1, VOCAB * n, 2.0, -1.0)),
        RawTensor::new("head.weight", vec![VOCAB, n], pattern(2, VOCAB * n, 2.0, -1.0)),
        RawTensor::new("blocks.0.ln0.weight", vec![n], pattern(3, n, 0.5, 0.75)),
        RawTensor::new("blocks.0.ln0.bias", vec![n], pattern(4, n, 0.2, -0.1)),
        RawTensor::new("ln_out.weight", vec![n], pattern(5, n, 0.5, 0.75)),
        RawTensor::new("ln_out.bias", vec![n], pattern(6, n, 0.2, -0.1)),
    ];
    for layer in 0..2 {
        let b = 10 + layer * 20;
        let name = |suffix: &str| format!("blocks.{}.{}", layer, suffix);
        let matrix = |seed: usize| pattern(seed, n * n, 1.0, -0.5);
        tensors.extend([
            RawTensor::new(name("ln1.weight"), vec![n], pattern(b, n, 0.5, 0.75)),
            RawTensor::new(name("ln1.bias"), vec![n], pattern(b + 1, n, 0.2, -0.1)),
            RawTensor::new(name("ln2.weight"), vec![n], pattern(b + 2, n, 0.5, 0.75)),
            RawTensor::new(name("ln2.bias"), vec![n], pattern(b + 3, n, 0.2, -0.1)),
            RawTensor::new(name("att.time_mix_k"), time.clone(), pattern(b + 4, n, 1.0, 0.0)),
            RawTensor::new(name("att.time_mix_v"), time.clone(), pattern(b + 5, n, 1.0, 0.0)),
            RawTensor::new(name("att.time_mix_r"), time.clone(), pattern(b + 6, n, 1.0, 0.0)),
            RawTensor::new(name("att.time_first"), vec![n], pattern(b + 7, n, 1.0, -0.5)),
            RawTensor::new(name("att.time_decay"), vec![n], pattern(b + 8, n, 2.0, -1.0)),
            RawTensor::new(name("att.key.weight"), vec![n, n], matrix(b + 9)),
            RawTensor::new(name("att.value.weight"), vec![n, n], matrix(b + 10)),
            RawTensor::new(name("att.receptance.weight"), vec![n, n], matrix(b + 11)),
            RawTensor::new(name("att.output.weight"), vec![n, n], matrix(b + 12)),
            RawTensor::new(name("ffn.time_mix_k"), time.clone(), pattern(b + 13, n, 1.0, 0.0)),
            RawTensor::new(name("ffn.time_mix_r"), time.clone(), pattern(b + 14, n, 1.0, 0.0)),
            RawTensor::new(name("ffn.key.weight"), vec![n, n], matrix(b + 15)),
            RawTensor::new(name("ffn.value.weight"), vec![n, n], matrix(b + 16)),
            RawTensor::new(name("ffn.receptance.weight"), vec![n, n], matrix(b + 17)),
        ]);
    }
    tensors
}

fn toy_model() -> Result<RwkvModel> {
    Ok(RwkvModel::new(WeightSet::from_tensors(toy_tensors())?))
}

fn serialize_safetensors(tensors: &[RawTensor]) -> Result<Vec<u8>> {
    let bytes: Vec<Vec<u8>> = tensors
        .iter()
        .map(|t| t.data.iter().flat_map(|x| x.to_le_bytes()).collect())
        .collect();
    let views = tensors
        .iter()
        .zip(bytes.iter())
        .map(|(t, data)| Ok((t.name.clone(), TensorView::new(Dtype::F32, t.shape.clone(), data)?)))
        .collect::<Result<Vec<_>>>()?;
    Ok(safetensors::serialize(views, &None)?)
}

fn assert_logits(actual: &Array1<f32>, expected: &[f32]) {
    assert_eq!(actual.len(), expected.len());
    for (a, e) in actual.iter().zip(expected) {
        assert_abs_diff_eq!(*a, *e, epsilon = 1e-5);
    }
}

#[test]
fn toy_model_reproduces_reference_logits() -> Result<()> {
    let model = toy_model()?;

    let (logits, state) = model.step(3, None);
    assert_logits(&logits, &EXPECTED_AFTER_3);

    let (logits, _) = model.step(1, Some(state));
    assert_logits(&logits, &EXPECTED_AFTER_3_1);
    Ok(())
}

#[test]
fn cloned_state_gives_identical_logits() -> Result<()> {
    let model = toy_model()?;
    let (_, state) = model.step(3, None);
    let fork = state.clone();

    let (from_original, _) = model.step(3, Some(state));
    let (from_fork, _) = model.step(3, Some(fork));
    assert_eq!(from_original, from_fork);
    Ok(())
}

#[test]
fn forks_follow_the_same_trajectory_as_a_replay() -> Result<()> {
    let model = toy_model()?;
    let prefix = [3, 1, 4, 1, 5];
    let branch_a = [2, 0, 5];
    let branch_b = [5, 5, 1];

    let (_, shared) = model.prefill(&prefix, None).expect("non-empty prefix");
    let fork = shared.clone();

    let (forked_a, state_a) = model.prefill(&branch_a, Some(shared)).expect("branch a");
    let (forked_b, state_b) = model.prefill(&branch_b, Some(fork)).expect("branch b");

    let replay = |branch: &[usize]| {
        let tokens: Vec<usize> = prefix.iter().chain(branch).copied().collect();
        model.prefill(&tokens, None).expect("replay")
    };
    let (replay_a, replay_state_a) = replay(&branch_a);
    let (replay_b, replay_state_b) = replay(&branch_b);

    assert_eq!(forked_a, replay_a);
    assert_eq!(state_a, replay_state_a);
    assert_eq!(forked_b, replay_b);
    assert_eq!(state_b, replay_state_b);
    assert_ne!(forked_a, forked_b);
    Ok(())
}

#[test]
fn step_is_deterministic_across_calls() -> Result<()> {
    let model = toy_model()?;
    let (_, state) = model.prefill(&[0, 2, 4], None).expect("prefix");
    let (a, _) = model.step(1, Some(state.clone()));
    let (b, _) = model.step(1, Some(state));
    assert_eq!(a, b);
    Ok(())
}

#[test]
fn long_runs_stay_finite() -> Result<()> {
    let model = toy_model()?;
    let mut tokens = token_stream();
    let mut state: Option<RecurrentState> = None;
    for _ in 0..500 {
        let token = tokens.next().unwrap_or(0);
        let (logits, next) = model.step(token, state);
        assert!(logits.iter().all(|x| x.is_finite()));
        assert!(next.is_finite());
        for layer in 0..2 {
            // The log-scale left the sentinel and is a real running maximum.
            assert!(next
                .slot(layer, Slot::LogScale)
                .iter()
                .all(|&pp| pp > LOG_SCALE_SENTINEL / 2.0));
            assert!(next.slot(layer, Slot::Denominator).iter().all(|&bb| bb > 0.0));
        }
        state = Some(next);
    }
    Ok(())
}

/// Token stream cycling through the vocabulary in an irregular order.
fn token_stream() -> impl Iterator<Item = usize> {
    (0..).map(|i: usize| (i * i * 5 + i * 3 + 1) % VOCAB)
}

#[test]
fn safetensors_load_matches_in_memory_tensors() -> Result<()> {
    let tensors = toy_tensors();
    let blob = serialize_safetensors(&tensors)?;

    let dir = tempfile::tempdir()?;
    let path = dir.path().join("toy.safetensors");
    std::fs::write(&path, &blob)?;

    let first = WeightSet::load_safetensors(&path)?;
    let second = WeightSet::load_safetensors(&path)?;
    assert_eq!(first, second);
    assert_eq!(first, WeightSet::from_tensors(tensors)?);

    for layer in &first.layers {
        assert_eq!(layer.att.time_mix_k.len(), N_EMBD);
        assert!(layer.att.time_decay.iter().all(|&w| w <= 0.0));
    }

    let model = RwkvModel::new(first);
    let (logits, _) = model.step(3, None);
    assert_logits(&logits, &EXPECTED_AFTER_3);
    Ok(())
}

#[test]
fn missing_weight_file_is_an_io_error() {
    let err = WeightSet::load_safetensors("/nonexistent/model.safetensors").unwrap_err();
    assert!(matches!(err, LoadError::Io { .. }));
}

#[test]
fn truncated_weight_file_is_a_format_error() -> Result<()> {
    let blob = serialize_safetensors(&toy_tensors())?;
    let err = WeightSet::load_safetensors_bytes(&blob[..blob.len() / 2]).unwrap_err();
    assert!(matches!(err, LoadError::Format(_)));
    Ok(())
}
