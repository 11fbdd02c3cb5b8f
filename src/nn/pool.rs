//! Pooling

use crate::{Error, Result};
use ndarray::{Array2, Array4, Axis};

/// 3x3 max pooling with stride 2 and padding 1
///
/// Padded positions never win the max.
pub fn max_pool2d(x: &Array4<f32>) -> Result<Array4<f32>> {
    const K: usize = 3;
    const STRIDE: usize = 2;
    const PAD: usize = 1;

    let (n, c, h, w) = x.dim();
    if h == 0 || w == 0 {
        return Err(Error::InvalidParameter(format!(
            "max pool over empty feature map {:?}",
            x.shape()
        )));
    }
    let oh = (h + 2 * PAD - K) / STRIDE + 1;
    let ow = (w + 2 * PAD - K) / STRIDE + 1;

    let out = Array4::from_shape_fn((n, c, oh, ow), |(b, ch, oy, ox)| {
        let y0 = (oy * STRIDE).saturating_sub(PAD);
        let y1 = (oy * STRIDE + K - PAD).min(h);
        let x0 = (ox * STRIDE).saturating_sub(PAD);
        let x1 = (ox * STRIDE + K - PAD).min(w);
        let mut best = f32::NEG_INFINITY;
        for iy in y0..y1 {
            for ix in x0..x1 {
                best = best.max(x[[b, ch, iy, ix]]);
            }
        }
        best
    });
    Ok(out)
}

/// Adaptive average pooling to 1x1, flattened to `(batch, channels)`
pub fn global_avg_pool(x: &Array4<f32>) -> Result<Array2<f32>> {
    x.mean_axis(Axis(3))
        .and_then(|m| m.mean_axis(Axis(2)))
        .ok_or_else(|| {
            Error::InvalidParameter(format!(
                "global average pool over empty feature map {:?}",
                x.shape()
            ))
        })
}
