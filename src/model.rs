//! Inference backend for the two denoise stages.
//!
//! Each stage is a capability behind [`DenoiseModel`]: give it a primary
//! input vector and the stage's recurrent state, get back a primary output
//! and the updated state. The engine never looks inside a model; any backend
//! with two input slots and two output slots of matching shape can sit
//! behind this trait. [`OrtModel`] is the ONNX Runtime implementation used
//! in production; tests substitute plain-Rust doubles.

use std::path::Path;

use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;

use crate::{DtlnError, Result};

/// One denoise stage: a stateful model invoked once per analysis frame.
///
/// `invoke` must either fully succeed (both outputs written) or fail without
/// requiring any cleanup from the caller — the engine only commits recurrent
/// state after a successful return.
pub trait DenoiseModel: Send {
    fn invoke(
        &mut self,
        primary: &[f32],
        state: &[f32],
        primary_out: &mut [f32],
        state_out: &mut [f32],
    ) -> Result<()>;
}

/// ONNX Runtime backed model.
///
/// The model must expose exactly two inputs and two outputs. Slot order
/// carries the contract: input 0 / output 0 are the primary signal, input 1 /
/// output 1 are the recurrent state. Input names are discovered from the
/// session at load time, so no particular naming convention is required of
/// the exported graph.
pub struct OrtModel {
    session: Session,
    input_names: [String; 2],
    output_names: [String; 2],
}

impl OrtModel {
    /// Load a model from an ONNX file.
    ///
    /// `intra_threads` bounds ONNX Runtime's intra-op parallelism; real-time
    /// callers want 1.
    pub fn load(path: &Path, intra_threads: usize) -> Result<Self> {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(intra_threads)?
            .commit_from_file(path)?;

        let inputs: Vec<String> = session.inputs().iter().map(|i| i.name().to_string()).collect();
        let outputs: Vec<String> = session.outputs().iter().map(|o| o.name().to_string()).collect();
        if inputs.len() != 2 || outputs.len() != 2 {
            return Err(DtlnError::Config(format!(
                "model {} must have 2 inputs and 2 outputs (signal + state), found {} inputs / {} outputs",
                path.display(),
                inputs.len(),
                outputs.len()
            )));
        }

        log::info!(
            "loaded denoise model {} (inputs: {}, {}; outputs: {}, {})",
            path.display(),
            inputs[0],
            inputs[1],
            outputs[0],
            outputs[1]
        );

        let mut inputs = inputs.into_iter();
        let mut outputs = outputs.into_iter();
        Ok(Self {
            session,
            input_names: [inputs.next().unwrap_or_default(), inputs.next().unwrap_or_default()],
            output_names: [outputs.next().unwrap_or_default(), outputs.next().unwrap_or_default()],
        })
    }

}

/// Plain-Rust stage doubles for exercising the engine without model files.
#[cfg(test)]
pub(crate) mod doubles {
    use super::DenoiseModel;
    use crate::{DtlnError, Result};

    /// Constant gain mask, state passed through unchanged.
    pub struct ConstMask(pub f32);

    impl DenoiseModel for ConstMask {
        fn invoke(
            &mut self,
            _primary: &[f32],
            state: &[f32],
            primary_out: &mut [f32],
            state_out: &mut [f32],
        ) -> Result<()> {
            primary_out.fill(self.0);
            state_out.copy_from_slice(state);
            Ok(())
        }
    }

    /// Copies its input through, state unchanged.
    pub struct PassThrough;

    impl DenoiseModel for PassThrough {
        fn invoke(
            &mut self,
            primary: &[f32],
            state: &[f32],
            primary_out: &mut [f32],
            state_out: &mut [f32],
        ) -> Result<()> {
            primary_out.copy_from_slice(primary);
            state_out.copy_from_slice(state);
            Ok(())
        }
    }

    /// Emits a constant regardless of input; used to force clipping.
    pub struct ConstOutput(pub f32);

    impl DenoiseModel for ConstOutput {
        fn invoke(
            &mut self,
            _primary: &[f32],
            state: &[f32],
            primary_out: &mut [f32],
            state_out: &mut [f32],
        ) -> Result<()> {
            primary_out.fill(self.0);
            state_out.copy_from_slice(state);
            Ok(())
        }
    }

    /// A model whose output genuinely depends on evolving recurrent state,
    /// so tests can detect any divergence in state handling.
    pub struct Recurrent;

    impl DenoiseModel for Recurrent {
        fn invoke(
            &mut self,
            primary: &[f32],
            state: &[f32],
            primary_out: &mut [f32],
            state_out: &mut [f32],
        ) -> Result<()> {
            for (i, out) in primary_out.iter_mut().enumerate() {
                *out = primary[i] * 0.5 + state[i] * 0.1;
            }
            for (i, s) in state_out.iter_mut().enumerate() {
                let inject = primary.get(i).copied().unwrap_or(0.0);
                *s = state[i] * 0.9 + inject * 0.01;
            }
            Ok(())
        }
    }

    /// Wraps another double, failing exactly one invocation (by zero-based
    /// call index) and delegating every other call.
    pub struct Flaky<M> {
        pub inner: M,
        pub fail_at: u64,
        pub calls: u64,
    }

    impl<M: DenoiseModel> DenoiseModel for Flaky<M> {
        fn invoke(
            &mut self,
            primary: &[f32],
            state: &[f32],
            primary_out: &mut [f32],
            state_out: &mut [f32],
        ) -> Result<()> {
            let call = self.calls;
            self.calls += 1;
            if call == self.fail_at {
                return Err(DtlnError::Shape("injected failure".into()));
            }
            self.inner.invoke(primary, state, primary_out, state_out)
        }
    }

    pub struct AlwaysFail;

    impl DenoiseModel for AlwaysFail {
        fn invoke(&mut self, _: &[f32], _: &[f32], _: &mut [f32], _: &mut [f32]) -> Result<()> {
            Err(DtlnError::Shape("injected failure".into()))
        }
    }
}

fn copy_output(name: &str, data: &[f32], dst: &mut [f32]) -> Result<()> {
    if data.len() != dst.len() {
        return Err(DtlnError::Shape(format!(
            "output '{}' has {} elements, expected {}",
            name,
            data.len(),
            dst.len()
        )));
    }
    dst.copy_from_slice(data);
    Ok(())
}

impl DenoiseModel for OrtModel {
    fn invoke(
        &mut self,
        primary: &[f32],
        state: &[f32],
        primary_out: &mut [f32],
        state_out: &mut [f32],
    ) -> Result<()> {
        let primary_tensor =
            Tensor::from_array(([1usize, 1, primary.len()], primary.to_vec()))?;
        let state_tensor = Tensor::from_array(([1usize, 1, state.len()], state.to_vec()))?;

        let outputs = self.session.run(ort::inputs![
            self.input_names[0].as_str() => primary_tensor,
            self.input_names[1].as_str() => state_tensor,
        ])?;

        let (_shape, data) = outputs[self.output_names[0].as_str()].try_extract_tensor::<f32>()?;
        copy_output(self.output_names[0].as_str(), data, primary_out)?;
        let (_shape, data) = outputs[self.output_names[1].as_str()].try_extract_tensor::<f32>()?;
        copy_output(self.output_names[1].as_str(), data, state_out)?;
        Ok(())
    }
}
