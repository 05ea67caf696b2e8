//! Seeded parameter initialization.
//!
//! candle's CPU backend cannot be seeded, so parameters are drawn on the
//! host from a caller-supplied RNG and uploaded.

use candle_core::{Device, Tensor, Var};
use rand::Rng;
use rand_distr::{Distribution, Uniform};

use crate::error::{Error, Result};

/// Glorot/Xavier uniform: `U(-l, l)` with `l = sqrt(6 / (rows + cols))`.
pub fn xavier_uniform<R: Rng + ?Sized>(rows: usize, cols: usize, rng: &mut R, device: &Device) -> Result<Var> {
    let limit = (6.0 / (rows + cols).max(1) as f64).sqrt() as f32;
    let dist = Uniform::new(-limit, limit).map_err(|e| Error::InvalidConfig(format!("xavier bounds: {e}")))?;
    let data: Vec<f32> = (0..rows * cols).map(|_| dist.sample(rng)).collect();
    Ok(Var::from_tensor(&Tensor::from_vec(data, (rows, cols), device)?)?)
}

/// All-zero trainable vector.
pub fn zeros(len: usize, device: &Device) -> Result<Var> {
    Ok(Var::zeros(len, candle_core::DType::F32, device)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_xorshift::XorShiftRng;

    #[test]
    fn test_xavier_bounds_and_seed() {
        let mut a = XorShiftRng::seed_from_u64(1);
        let mut b = XorShiftRng::seed_from_u64(1);
        let x = xavier_uniform(10, 6, &mut a, &Device::Cpu).unwrap();
        let y = xavier_uniform(10, 6, &mut b, &Device::Cpu).unwrap();
        let xv = x.as_tensor().to_vec2::<f32>().unwrap();
        assert_eq!(xv, y.as_tensor().to_vec2::<f32>().unwrap());
        let limit = (6.0f32 / 16.0).sqrt();
        assert!(xv.iter().flatten().all(|v| v.abs() <= limit));
    }
}
