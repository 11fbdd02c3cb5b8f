//! Execution context for forward passes

/// Training vs evaluation mode
///
/// In training mode batch normalization normalizes with batch statistics and
/// updates its running estimates; in evaluation mode it reads the running
/// estimates only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Context {
    training: bool,
}

impl Context {
    /// Create a new context (training mode)
    pub fn new() -> Self {
        Self { training: true }
    }

    /// Create a context in evaluation mode
    pub fn evaluation() -> Self {
        Self { training: false }
    }

    /// Set training mode
    pub fn train(&mut self) {
        self.training = true;
    }

    /// Set evaluation mode
    pub fn eval(&mut self) {
        self.training = false;
    }

    /// Check if in training mode
    pub fn is_training(&self) -> bool {
        self.training
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}
