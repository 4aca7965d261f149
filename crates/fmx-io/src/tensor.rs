//! Scalar invariants of symmetric second-order tensors.
//!
//! Provides the quantities archives report for stress/strain fields:
//! - von Mises equivalent
//! - principal values (max, mid, min)
//! - Tresca (max shear diameter)
//! - equivalent pressure
//!
//! ## Usage
//!
//! ```rust
//! use fmx_io::tensor::{mises, TensorComponents};
//!
//! let stress = TensorComponents::new(100.0, 50.0, 25.0, 10.0, 5.0, 2.0);
//! assert!(mises(&stress) > 0.0);
//! ```

use serde::{Deserialize, Serialize};

/// Symmetric tensor components (Voigt notation)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TensorComponents {
    pub xx: f64,
    pub yy: f64,
    pub zz: f64,
    pub xy: f64,
    pub yz: f64,
    pub xz: f64,
}

impl TensorComponents {
    pub fn new(xx: f64, yy: f64, zz: f64, xy: f64, yz: f64, xz: f64) -> Self {
        Self {
            xx,
            yy,
            zz,
            xy,
            yz,
            xz,
        }
    }
}

/// Principal values (eigenvalues of tensor)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrincipalValues {
    pub max: f64,
    pub mid: f64,
    pub min: f64,
}

/// von Mises equivalent.
///
/// Formula: σ_v = sqrt(0.5 * [(σ_xx - σ_yy)² + (σ_yy - σ_zz)² + (σ_zz - σ_xx)²] + 3 * [τ_xy² + τ_yz² + τ_xz²])
pub fn mises(t: &TensorComponents) -> f64 {
    let normal =
        0.5 * ((t.xx - t.yy).powi(2) + (t.yy - t.zz).powi(2) + (t.zz - t.xx).powi(2));
    let shear = 3.0 * (t.xy.powi(2) + t.yz.powi(2) + t.xz.powi(2));
    (normal + shear).sqrt()
}

/// Equivalent pressure, the negated mean normal component.
pub fn pressure(t: &TensorComponents) -> f64 {
    -(t.xx + t.yy + t.zz) / 3.0
}

/// Tresca equivalent: difference of the extreme principal values.
pub fn tresca(t: &TensorComponents) -> f64 {
    let p = principal_values(t);
    p.max - p.min
}

/// Principal values of a symmetric 3×3 tensor.
///
/// Solves det(T - λI) = 0 with the trigonometric form of the cubic, which
/// always has three real roots for a symmetric tensor.
pub fn principal_values(t: &TensorComponents) -> PrincipalValues {
    let shear_norm = t.xy.abs() + t.yz.abs() + t.xz.abs();
    if shear_norm < 1e-10 {
        return sorted([t.xx, t.yy, t.zz]);
    }

    let i1 = t.xx + t.yy + t.zz;
    let i2 = t.xx * t.yy + t.yy * t.zz + t.zz * t.xx
        - t.xy.powi(2)
        - t.yz.powi(2)
        - t.xz.powi(2);
    let i3 = t.xx * t.yy * t.zz + 2.0 * t.xy * t.yz * t.xz
        - t.xx * t.yz.powi(2)
        - t.yy * t.xz.powi(2)
        - t.zz * t.xy.powi(2);

    // λ³ - I₁λ² + I₂λ - I₃ = 0, shifted to the depressed cubic
    let p = i2 - i1.powi(2) / 3.0;
    let q = 2.0 * i1.powi(3) / 27.0 - i1 * i2 / 3.0 + i3;

    if p.abs() < 1e-14 {
        let lambda = i1 / 3.0;
        return PrincipalValues {
            max: lambda,
            mid: lambda,
            min: lambda,
        };
    }

    // Rounding can push the cosine argument just outside [-1, 1].
    let cos_arg = ((-q / 2.0) / (-p / 3.0).powf(1.5)).clamp(-1.0, 1.0);
    let theta = cos_arg.acos();
    let k = 2.0 * (-p / 3.0).sqrt();
    let two_pi = 2.0 * std::f64::consts::PI;

    sorted([
        k * (theta / 3.0).cos() + i1 / 3.0,
        k * ((theta + two_pi) / 3.0).cos() + i1 / 3.0,
        k * ((theta + 2.0 * two_pi) / 3.0).cos() + i1 / 3.0,
    ])
}

fn sorted(mut values: [f64; 3]) -> PrincipalValues {
    values.sort_by(|a, b| b.total_cmp(a));
    PrincipalValues {
        max: values[0],
        mid: values[1],
        min: values[2],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniaxial(s: f64) -> TensorComponents {
        TensorComponents::new(s, 0.0, 0.0, 0.0, 0.0, 0.0)
    }

    #[test]
    fn mises_of_uniaxial_equals_axial_stress() {
        assert!((mises(&uniaxial(100.0)) - 100.0).abs() < 1e-9);
    }

    #[test]
    fn mises_of_pure_shear() {
        let t = TensorComponents::new(0.0, 0.0, 0.0, 100.0, 0.0, 0.0);
        assert!((mises(&t) - 3.0_f64.sqrt() * 100.0).abs() < 1e-6);
    }

    #[test]
    fn principal_values_of_pure_shear() {
        let t = TensorComponents::new(0.0, 0.0, 0.0, 50.0, 0.0, 0.0);
        let p = principal_values(&t);
        assert!((p.max - 50.0).abs() < 1e-6);
        assert!(p.mid.abs() < 1e-6);
        assert!((p.min + 50.0).abs() < 1e-6);
        assert!((tresca(&t) - 100.0).abs() < 1e-6);
    }

    #[test]
    fn principal_values_preserve_trace() {
        let t = TensorComponents::new(100.0, 50.0, 25.0, 10.0, 5.0, 2.0);
        let p = principal_values(&t);
        assert!(p.max >= p.mid && p.mid >= p.min);
        assert!((p.max + p.mid + p.min - 175.0).abs() < 1e-6);
    }

    #[test]
    fn hydrostatic_tensor_has_equal_principals_and_no_tresca() {
        let t = TensorComponents::new(-30.0, -30.0, -30.0, 0.0, 0.0, 0.0);
        assert!((pressure(&t) - 30.0).abs() < 1e-12);
        assert!(tresca(&t).abs() < 1e-12);
        assert!(mises(&t).abs() < 1e-12);
    }
}
