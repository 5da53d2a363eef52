//! Two-port admittance of a line and the flow equations evaluated at one end.
//!
//! ```text
//!   [ If ]   [ yff  yft ] [ Vf ]
//!   [ It ] = [ ytf  ytt ] [ Vt ]
//!
//!   ys  = 1 / (r + jx)        t = tap · e^(j·shift)
//!   yff = (ys + jb/2) / |t|²  yft = -ys / conj(t)
//!   ytf = -ys / t             ytt =  ys + jb/2
//! ```
//!
//! The complex power leaving a bus into the line is `S = V · conj(I)`.

use num_complex::Complex64;
use pflow_core::{BusId, Line};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineAdmittance {
    pub yff: Complex64,
    pub yft: Complex64,
    pub ytf: Complex64,
    pub ytt: Complex64,
}

impl LineAdmittance {
    pub fn from_line(line: &Line) -> Self {
        let ys = Complex64::new(line.r, line.x).inv();
        let charging = Complex64::new(0.0, line.b / 2.0);
        let tap = Complex64::from_polar(line.tap_ratio(), line.shift);
        let tap_sq = tap.norm_sqr();

        Self {
            yff: (ys + charging) / tap_sq,
            yft: -ys / tap.conj(),
            ytf: -ys / tap,
            ytt: ys + charging,
        }
    }

    /// Self and mutual admittance seen from `bus`, which must be an endpoint.
    pub fn at(&self, line: &Line, bus: BusId) -> (Complex64, Complex64) {
        if line.from == bus {
            (self.yff, self.yft)
        } else {
            (self.ytt, self.ytf)
        }
    }
}

/// Power flowing out of one end of a line and its partial derivatives.
///
/// Derivative order is `[θ_own, V_own, θ_other, V_other]`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EndFlow {
    pub p: f64,
    pub q: f64,
    pub dp: [f64; 4],
    pub dq: [f64; 4],
}

/// Flow out of the end with voltage `vm∠va` towards the far end `vo∠ao`.
pub fn end_flow(y_self: Complex64, y_mutual: Complex64, vm: f64, va: f64, vo: f64, ao: f64) -> EndFlow {
    let (g, b) = (y_self.re, y_self.im);
    let (gm, bm) = (y_mutual.re, y_mutual.im);
    let (s, c) = (va - ao).sin_cos();
    let vv = vm * vo;

    // re/im of conj(y_mutual) · e^(jθ)
    let in_phase = gm * c + bm * s;
    let quadrature = gm * s - bm * c;

    EndFlow {
        p: g * vm * vm + vv * in_phase,
        q: -b * vm * vm + vv * quadrature,
        dp: [
            -vv * quadrature,
            2.0 * g * vm + vo * in_phase,
            vv * quadrature,
            vm * in_phase,
        ],
        dq: [
            vv * in_phase,
            -2.0 * b * vm + vo * quadrature,
            -vv * in_phase,
            vm * quadrature,
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line() -> Line {
        Line::new(BusId::new(1), BusId::new(2), 0.01, 0.085).with_charging(0.176)
    }

    #[test]
    fn test_nominal_line_is_symmetric() {
        let y = LineAdmittance::from_line(&line());
        assert!((y.yft - y.ytf).norm() < 1e-12);
        assert!((y.yff - y.ytt).norm() < 1e-12);
        let ys = Complex64::new(0.01, 0.085).inv();
        assert!((y.yff.im - (ys.im + 0.088)).abs() < 1e-12);
    }

    #[test]
    fn test_tap_and_shift_terms() {
        let shift = 5f64.to_radians();
        let l = line().with_tap(0.98, shift);
        let y = LineAdmittance::from_line(&l);
        let z = 0.01f64.powi(2) + 0.085f64.powi(2);
        let (g, b) = (0.01 / z, -0.085 / z);
        let (tapr, tapi) = (0.98 * shift.cos(), 0.98 * shift.sin());
        let tap2 = 0.98 * 0.98;

        assert!((y.yff.re - g / tap2).abs() < 1e-9);
        assert!((y.yff.im - (b + 0.088) / tap2).abs() < 1e-9);
        assert!((y.yft.re + (g * tapr - b * tapi) / tap2).abs() < 1e-9);
        assert!((y.yft.im + (b * tapr + g * tapi) / tap2).abs() < 1e-9);
        assert!((y.ytf.re + (g * tapr + b * tapi) / tap2).abs() < 1e-9);
        assert!((y.ytf.im + (b * tapr - g * tapi) / tap2).abs() < 1e-9);
        assert!((y.ytt - Complex64::new(g, b + 0.088)).norm() < 1e-9);
    }

    #[test]
    fn test_end_flow_matches_complex_power() {
        let l = line().with_tap(1.02, 0.03);
        let y = LineAdmittance::from_line(&l);
        let vf = Complex64::from_polar(1.03, 0.05);
        let vt = Complex64::from_polar(0.98, -0.02);
        let s_from = vf * (y.yff * vf + y.yft * vt).conj();
        let s_to = vt * (y.ytf * vf + y.ytt * vt).conj();

        let f = end_flow(y.yff, y.yft, 1.03, 0.05, 0.98, -0.02);
        let t = end_flow(y.ytt, y.ytf, 0.98, -0.02, 1.03, 0.05);
        assert!((f.p - s_from.re).abs() < 1e-12);
        assert!((f.q - s_from.im).abs() < 1e-12);
        assert!((t.p - s_to.re).abs() < 1e-12);
        assert!((t.q - s_to.im).abs() < 1e-12);
    }

    #[test]
    fn test_end_flow_derivatives() {
        let y = LineAdmittance::from_line(&line().with_tap(0.97, 0.1));
        let x = [0.04, 1.01, -0.03, 0.97];
        let eval = |x: &[f64; 4]| end_flow(y.yff, y.yft, x[1], x[0], x[3], x[2]);
        let base = eval(&x);
        let h = 1e-7;
        for k in 0..4 {
            let mut bumped = x;
            bumped[k] += h;
            let up = eval(&bumped);
            assert!(((up.p - base.p) / h - base.dp[k]).abs() < 1e-5, "dP[{k}]");
            assert!(((up.q - base.q) / h - base.dq[k]).abs() < 1e-5, "dQ[{k}]");
        }
    }
}
