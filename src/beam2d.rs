//! Two-node Timoshenko beam element.
//!
//! Each node carries a transverse displacement `w` and a rotation `theta`, so
//! element matrices act on `[w1, theta1, w2, theta2]`. Shear deformation and
//! rotary inertia are included, which matters for the thick, short bars used in
//! mallet percussion.

use crate::optimization::types::Material;
use crate::types::Matrix4;

/// Shear correction factor for a rectangular cross-section.
pub const KAPPA: f64 = 5.0 / 6.0;

/// DOFs per node for the beam model (transverse displacement + rotation).
pub const DOF_PER_NODE_2D: usize = 2;

/// Shear modulus from Young's modulus and Poisson's ratio.
#[inline]
pub fn shear_modulus(e: f64, nu: f64) -> f64 {
    e / (2.0 * (1.0 + nu))
}

/// Second moment of area of a rectangle, `b * h^3 / 12`.
#[inline]
pub fn second_moment_of_area(b: f64, h: f64) -> f64 {
    b * h * h * h / 12.0
}

/// One beam element with its section and material constants resolved.
#[derive(Debug, Clone, Copy)]
pub struct TimoshenkoElement {
    /// Element length (m)
    pub length: f64,
    /// Cross-sectional area (m^2)
    pub area: f64,
    /// Second moment of area (m^4)
    pub inertia: f64,
    pub e: f64,
    pub g: f64,
    pub rho: f64,
}

impl TimoshenkoElement {
    /// Element of rectangular section `width x height`.
    pub fn rectangular(length: f64, width: f64, height: f64, material: &Material) -> Self {
        Self {
            length,
            area: width * height,
            inertia: second_moment_of_area(width, height),
            e: material.e,
            g: shear_modulus(material.e, material.nu),
            rho: material.rho,
        }
    }

    /// Shear parameter `phi = 12EI / (kappa G A le^2)`.
    pub fn shear_parameter(&self) -> f64 {
        12.0 * self.e * self.inertia / (KAPPA * self.g * self.area * self.length * self.length)
    }

    /// 4x4 stiffness matrix.
    pub fn stiffness(&self) -> Matrix4 {
        let le = self.length;
        let phi = self.shear_parameter();
        let ei = self.e * self.inertia;
        let denom = (1.0 + phi) * le * le * le;

        let k11 = 12.0 * ei / denom;
        let k12 = 6.0 * ei * le / denom;
        let k22 = (4.0 + phi) * ei * le * le / denom;
        let k24 = (2.0 - phi) * ei * le * le / denom;

        Matrix4::from_row_slice(&[
            k11, k12, -k11, k12, //
            k12, k22, -k12, k24, //
            -k11, -k12, k11, -k12, //
            k12, k24, -k12, k22,
        ])
    }

    /// 4x4 consistent mass matrix with rotary inertia.
    pub fn mass(&self) -> Matrix4 {
        let le = self.length;
        let phi = self.shear_parameter();
        let phi2 = phi * phi;
        let denom = (1.0 + phi) * (1.0 + phi);
        let m = self.rho * self.area * le;

        // translational inertia
        let t11 = (13.0 / 35.0 + 7.0 * phi / 10.0 + phi2 / 3.0) / denom;
        let t13 = (9.0 / 70.0 + 3.0 * phi / 10.0 + phi2 / 6.0) / denom;
        let t12 = (11.0 / 210.0 + 11.0 * phi / 120.0 + phi2 / 24.0) * le / denom;
        let t14 = (13.0 / 420.0 + 3.0 * phi / 40.0 + phi2 / 24.0) * le / denom;
        let t22 = (1.0 / 105.0 + phi / 60.0 + phi2 / 120.0) * le * le / denom;
        let t24 = (1.0 / 140.0 + phi / 60.0 + phi2 / 120.0) * le * le / denom;

        // rotary inertia, scaled by r^2 / le^2 with r the radius of gyration
        let gyration = self.inertia / self.area / (le * le);
        let r11 = (6.0 / 5.0) / denom * gyration;
        let r22 = (2.0 / 15.0 + phi / 6.0 + phi2 / 3.0) * le * le / denom * gyration;
        let r12 = (1.0 / 10.0 - phi / 2.0) * le / denom * gyration;
        let r24 = (-1.0 / 30.0 - phi / 6.0 + phi2 / 6.0) * le * le / denom * gyration;

        Matrix4::from_row_slice(&[
            t11 + r11,
            t12 + r12,
            t13 - r11,
            -t14 + r12,
            t12 + r12,
            t22 + r22,
            t14 - r12,
            -t24 + r24,
            t13 - r11,
            t14 - r12,
            t11 + r11,
            -t12 - r12,
            -t14 + r12,
            -t24 + r24,
            -t12 - r12,
            t22 + r22,
        ]) * m
    }
}
