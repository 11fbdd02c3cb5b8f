//! Shared base with N student tails

use super::output::{sum_logits, EnsembleOutput};
use crate::config::{Aggregation, EnsembleConfig};
use crate::io::{base_state, load_safetensors, StateDict};
use crate::nn::{child, Module, StateKind};
use crate::resnet::{Base, ChannelSchedule, Student, StudentOutput};
use crate::{Context, Error, Result, Tensor};
use ndarray::Array4;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::Path;

/// One shared [`Base`] feeding independently parameterized [`Student`]s
///
/// State dict names are `base.*`, `students.{j}.*` and
/// `contribution_weights`.
pub struct MultiStudentNet {
    config: EnsembleConfig,
    base: Base,
    students: Vec<Student>,
    contribution_weights: Tensor,
}

impl MultiStudentNet {
    /// Build the network described by `config`
    ///
    /// Parameters are drawn from a generator seeded with `config.seed()`.
    /// A configured pretrained checkpoint is loaded into the base before the
    /// base is frozen.
    pub fn new(config: EnsembleConfig) -> Result<Self> {
        let mut rng = StdRng::seed_from_u64(config.seed());
        let spec = config.spec();

        let mut base = Base::new(&spec, &mut rng)?;
        let mut students = config
            .schedule()
            .iter()
            .map(|widths| {
                Student::new(
                    &spec,
                    widths,
                    config.num_classes(),
                    config.dilation(),
                    &mut rng,
                )
            })
            .collect::<Result<Vec<_>>>()?;

        if config.zero_init_residual() {
            base.zero_init_residual();
            students.iter_mut().for_each(Student::zero_init_residual);
        }

        let n = students.len();
        let weighted = config.aggregation() == Aggregation::Weighted;
        let contribution_weights = Tensor::full(&[n], 1.0 / n as f32, weighted);

        let mut net = Self {
            config,
            base,
            students,
            contribution_weights,
        };

        if let Some(path) = net.config.pretrained().map(Path::to_path_buf) {
            net.load_pretrained_base_from(&path)?;
        }
        if net.config.freeze_base() {
            net.freeze_base();
        }

        tracing::info!(
            backbone = %net.config.backbone(),
            students = n,
            parameters = net.num_parameters(),
            trainable = net.num_trainable_parameters(),
            "built multi-student network"
        );
        Ok(net)
    }

    pub fn config(&self) -> &EnsembleConfig {
        &self.config
    }

    pub fn schedule(&self) -> &ChannelSchedule {
        self.config.schedule()
    }

    pub fn base(&self) -> &Base {
        &self.base
    }

    pub fn students(&self) -> &[Student] {
        &self.students
    }

    pub fn num_students(&self) -> usize {
        self.students.len()
    }

    /// Per-student weights, shape `[N]`, initialized to `1 / N`
    ///
    /// Only applied, and only trainable, when the aggregation is
    /// [`Aggregation::Weighted`].
    pub fn contribution_weights(&self) -> &Tensor {
        &self.contribution_weights
    }

    pub fn contribution_weights_mut(&mut self) -> &mut Tensor {
        &mut self.contribution_weights
    }

    /// Channels of each student's three stage outputs
    pub fn feature_channels(&self) -> Vec<[usize; 3]> {
        self.students.iter().map(Student::feature_channels).collect()
    }

    /// Run the base once and every student on its output
    pub fn forward(&mut self, x: &Array4<f32>, ctx: &Context) -> Result<EnsembleOutput> {
        let shared = self.base.forward(x, ctx)?;
        let outputs = self
            .students
            .iter_mut()
            .map(|student| student.forward(&shared, ctx))
            .collect::<Result<Vec<StudentOutput>>>()?;

        let teacher = match self.config.aggregation() {
            Aggregation::Sum => sum_logits(outputs.iter().map(|out| (1.0, &out.logits)))?,
            Aggregation::Weighted => sum_logits(
                self.contribution_weights
                    .data()
                    .iter()
                    .copied()
                    .zip(outputs.iter().map(|out| &out.logits)),
            )?,
        };

        tracing::debug!(
            batch = x.dim().0,
            students = outputs.len(),
            training = ctx.is_training(),
            "ensemble forward"
        );
        Ok(EnsembleOutput::new(teacher, outputs))
    }

    /// Run the base and a single student, as when training one baseline model
    pub fn forward_student(
        &mut self,
        j: usize,
        x: &Array4<f32>,
        ctx: &Context,
    ) -> Result<StudentOutput> {
        let n = self.students.len();
        let student = self.students.get_mut(j).ok_or_else(|| {
            Error::InvalidParameter(format!("student {j} out of range for {n} students"))
        })?;
        let shared = self.base.forward(x, ctx)?;
        student.forward(&shared, ctx)
    }

    /// Permanently stop gradient tracking on every base parameter
    ///
    /// There is no inverse operation.
    pub fn freeze_base(&mut self) {
        self.base.freeze();
        tracing::info!(
            frozen = self.base.num_parameters(),
            "froze shared base"
        );
    }

    pub fn is_base_frozen(&self) -> bool {
        self.base.is_frozen()
    }

    /// Load the base entries of a full single-network checkpoint
    ///
    /// Keys of layer2, layer3, layer4 and fc are dropped before loading; the
    /// remaining keys must match the base exactly. Returns the loaded names.
    pub fn load_pretrained_base(&mut self, state: &StateDict) -> Result<Vec<String>> {
        let filtered = base_state(state);
        let skipped = state.len() - filtered.len();
        let loaded = self.base.load_state_dict(&filtered)?;
        tracing::info!(
            loaded = loaded.len(),
            skipped,
            "loaded pretrained base"
        );
        Ok(loaded)
    }

    /// [`Self::load_pretrained_base`] from a SafeTensors file
    pub fn load_pretrained_base_from(&mut self, path: impl AsRef<Path>) -> Result<Vec<String>> {
        let path = path.as_ref();
        tracing::info!(path = %path.display(), "reading pretrained checkpoint");
        let state = load_safetensors(path)?;
        self.load_pretrained_base(&state)
    }
}

impl Module for MultiStudentNet {
    fn visit(&self, prefix: &str, f: &mut dyn FnMut(&str, StateKind, &Tensor)) {
        self.base.visit(&child(prefix, "base"), f);
        let students = child(prefix, "students");
        for (j, student) in self.students.iter().enumerate() {
            student.visit(&child(&students, &j.to_string()), f);
        }
        f(
            &child(prefix, "contribution_weights"),
            StateKind::Parameter,
            &self.contribution_weights,
        );
    }

    fn visit_mut(&mut self, prefix: &str, f: &mut dyn FnMut(&str, StateKind, &mut Tensor)) {
        self.base.visit_mut(&child(prefix, "base"), f);
        let students = child(prefix, "students");
        for (j, student) in self.students.iter_mut().enumerate() {
            student.visit_mut(&child(&students, &j.to_string()), f);
        }
        f(
            &child(prefix, "contribution_weights"),
            StateKind::Parameter,
            &mut self.contribution_weights,
        );
    }
}
