//! Parameter storage with a gradient slot

use crate::{Error, Result};
use ndarray::{ArrayD, IxDyn};

/// N-dimensional tensor with an optional gradient slot
///
/// Parameters of every layer are stored as `Tensor`s. The external optimizer
/// reads `grad()` and writes `data_mut()`; the model itself only touches data
/// at construction, initialization and state loading.
#[derive(Clone)]
pub struct Tensor {
    data: ArrayD<f32>,
    grad: Option<ArrayD<f32>>,
    requires_grad: bool,
}

impl Tensor {
    /// Create a new tensor with data
    pub fn new(data: ArrayD<f32>, requires_grad: bool) -> Self {
        Self {
            data,
            grad: None,
            requires_grad,
        }
    }

    /// Create a tensor from a flat vector and a shape
    pub fn from_shape_vec(shape: &[usize], data: Vec<f32>, requires_grad: bool) -> Result<Self> {
        let data = ArrayD::from_shape_vec(IxDyn(shape), data)?;
        Ok(Self::new(data, requires_grad))
    }

    /// Create a tensor filled with zeros
    pub fn zeros(shape: &[usize], requires_grad: bool) -> Self {
        Self::new(ArrayD::zeros(IxDyn(shape)), requires_grad)
    }

    /// Create a tensor filled with ones
    pub fn ones(shape: &[usize], requires_grad: bool) -> Self {
        Self::new(ArrayD::ones(IxDyn(shape)), requires_grad)
    }

    /// Create a tensor filled with a constant
    pub fn full(shape: &[usize], value: f32, requires_grad: bool) -> Self {
        Self::new(ArrayD::from_elem(IxDyn(shape), value), requires_grad)
    }

    /// Get reference to data
    pub fn data(&self) -> &ArrayD<f32> {
        &self.data
    }

    /// Get mutable reference to data
    pub fn data_mut(&mut self) -> &mut ArrayD<f32> {
        &mut self.data
    }

    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    /// Get gradient (if computed)
    pub fn grad(&self) -> Option<&ArrayD<f32>> {
        self.grad.as_ref()
    }

    /// Set gradient
    ///
    /// Frozen tensors silently discard the gradient.
    pub fn set_grad(&mut self, grad: ArrayD<f32>) -> Result<()> {
        self.check_grad_shape(&grad)?;
        if self.requires_grad {
            self.grad = Some(grad);
        }
        Ok(())
    }

    /// Accumulate gradient (for when tensor is used multiple times)
    pub fn accumulate_grad(&mut self, grad: ArrayD<f32>) -> Result<()> {
        self.check_grad_shape(&grad)?;
        if !self.requires_grad {
            return Ok(());
        }
        match self.grad.as_mut() {
            Some(existing) => *existing += &grad,
            None => self.grad = Some(grad),
        }
        Ok(())
    }

    /// Zero out gradient
    pub fn zero_grad(&mut self) {
        self.grad = None;
    }

    /// Check if requires gradient
    pub fn requires_grad(&self) -> bool {
        self.requires_grad
    }

    /// Permanently stop tracking gradients for this tensor
    ///
    /// There is no way to re-enable tracking on the same tensor.
    pub fn freeze(&mut self) {
        self.requires_grad = false;
        self.grad = None;
    }

    /// Get number of elements
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn check_grad_shape(&self, grad: &ArrayD<f32>) -> Result<()> {
        if grad.shape() != self.data.shape() {
            return Err(Error::ShapeMismatch {
                expected: self.data.shape().to_vec(),
                got: grad.shape().to_vec(),
            });
        }
        Ok(())
    }
}

impl std::fmt::Debug for Tensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tensor")
            .field("shape", &self.data.shape())
            .field("has_grad", &self.grad.is_some())
            .field("requires_grad", &self.requires_grad)
            .finish()
    }
}
