//! Parameter initialization schemes

use crate::{Error, Result, Tensor};
use ndarray::{ArrayD, IxDyn};
use rand::Rng;
use rand_distr::{Distribution, Normal};

/// Kaiming normal initialization in fan-out mode for ReLU networks
///
/// `std = sqrt(2 / fan_out)` where `fan_out = shape[0] * prod(shape[2..])`.
pub fn kaiming_normal_fan_out<R: Rng>(shape: &[usize], rng: &mut R) -> Result<Tensor> {
    let fan_out = fan_out(shape)?;
    let std = (2.0 / fan_out as f32).sqrt();
    let normal = Normal::new(0.0f32, std)
        .map_err(|e| Error::InvalidParameter(format!("kaiming std {std}: {e}")))?;

    let n: usize = shape.iter().product();
    let data: Vec<f32> = (0..n).map(|_| normal.sample(rng)).collect();
    Tensor::from_shape_vec(shape, data, true)
}

/// Uniform initialization in `[-1/sqrt(fan_in), 1/sqrt(fan_in))`
pub fn uniform_fan_in<R: Rng>(
    shape: &[usize],
    fan_in: usize,
    rng: &mut R,
) -> Result<Tensor> {
    if fan_in == 0 {
        return Err(Error::InvalidParameter("fan_in must be > 0".to_string()));
    }
    let bound = 1.0 / (fan_in as f32).sqrt();
    let n: usize = shape.iter().product();
    let data: Vec<f32> = (0..n).map(|_| rng.random_range(-bound..bound)).collect();
    Ok(Tensor::new(ArrayD::from_shape_vec(IxDyn(shape), data)?, true))
}

fn fan_out(shape: &[usize]) -> Result<usize> {
    if shape.len() < 2 {
        return Err(Error::InvalidParameter(format!(
            "fan_out needs at least 2 dimensions, got {shape:?}"
        )));
    }
    let receptive: usize = shape[2..].iter().product();
    let fan_out = shape[0] * receptive;
    if fan_out == 0 {
        return Err(Error::InvalidParameter(format!(
            "zero fan_out for shape {shape:?}"
        )));
    }
    Ok(fan_out)
}
