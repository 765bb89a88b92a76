// crates/dh_physics/src/runoff/ode.rs

//! 自适应常微分方程积分器
//!
//! 五阶 Cash-Karp Runge-Kutta 方案，带四阶嵌入解误差估计与
//! 自适应步长控制，用于积水深的非线性水库方程积分。
//!
//! 标量方程专用：积水深方程彼此独立，不需要向量形式。

/// 积分失败
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OdeError {
    /// 步长缩至下溢仍无法满足容差
    StepUnderflow,
    /// 超出最大步数
    TooManySteps,
}

/// 最大积分步数
const MAX_STEPS: usize = 10_000;

/// 步长安全系数
const SAFETY: f64 = 0.9;

/// 误差收缩指数
const PSHRNK: f64 = -0.25;

/// 误差增长指数
const PGROW: f64 = -0.2;

/// 在 `[t0, t1]` 上积分 `dy/dt = f(t, y)`，就地更新 `y`
///
/// `tol` 为相对误差容差，`h1` 为初始试探步长。
pub fn integrate(
    y: &mut f64,
    t0: f64,
    t1: f64,
    tol: f64,
    h1: f64,
    f: impl Fn(f64, f64) -> f64,
) -> Result<(), OdeError> {
    let mut t = t0;
    let mut h = h1.min(t1 - t0).max(1.0e-12);

    for _ in 0..MAX_STEPS {
        if t >= t1 {
            return Ok(());
        }
        if t + h > t1 {
            h = t1 - t;
        }
        // 误差尺度：|y| + |h·dy| + 小量，防止 y 接近零时过严
        let dydt = f(t, *y);
        let yscal = y.abs() + (h * dydt).abs() + 1.0e-3;

        loop {
            let (y5, err) = cash_karp_step(t, *y, h, &f);
            let err_ratio = (err / yscal).abs() / tol;
            if err_ratio <= 1.0 {
                // 接受该步，放大下一步
                t += h;
                *y = y5;
                h *= if err_ratio > 1.89e-4 {
                    SAFETY * err_ratio.powf(PGROW)
                } else {
                    // 误差极小时限制增长为 5 倍
                    5.0
                };
                break;
            }
            // 拒绝，收缩重试（至少砍到 1/10）
            let h_new = SAFETY * h * err_ratio.powf(PSHRNK);
            h = h_new.max(0.1 * h);
            if t + h == t {
                return Err(OdeError::StepUnderflow);
            }
        }
    }
    Err(OdeError::TooManySteps)
}

/// 单步 Cash-Karp：返回五阶解与误差估计
fn cash_karp_step(t: f64, y: f64, h: f64, f: &impl Fn(f64, f64) -> f64) -> (f64, f64) {
    const A2: f64 = 0.2;
    const A3: f64 = 0.3;
    const A4: f64 = 0.6;
    const A5: f64 = 1.0;
    const A6: f64 = 0.875;
    const B21: f64 = 0.2;
    const B31: f64 = 3.0 / 40.0;
    const B32: f64 = 9.0 / 40.0;
    const B41: f64 = 0.3;
    const B42: f64 = -0.9;
    const B43: f64 = 1.2;
    const B51: f64 = -11.0 / 54.0;
    const B52: f64 = 2.5;
    const B53: f64 = -70.0 / 27.0;
    const B54: f64 = 35.0 / 27.0;
    const B61: f64 = 1631.0 / 55296.0;
    const B62: f64 = 175.0 / 512.0;
    const B63: f64 = 575.0 / 13824.0;
    const B64: f64 = 44275.0 / 110592.0;
    const B65: f64 = 253.0 / 4096.0;
    const C1: f64 = 37.0 / 378.0;
    const C3: f64 = 250.0 / 621.0;
    const C4: f64 = 125.0 / 594.0;
    const C6: f64 = 512.0 / 1771.0;
    const DC1: f64 = C1 - 2825.0 / 27648.0;
    const DC3: f64 = C3 - 18575.0 / 48384.0;
    const DC4: f64 = C4 - 13525.0 / 55296.0;
    const DC5: f64 = -277.0 / 14336.0;
    const DC6: f64 = C6 - 0.25;

    let k1 = f(t, y);
    let k2 = f(t + A2 * h, y + h * B21 * k1);
    let k3 = f(t + A3 * h, y + h * (B31 * k1 + B32 * k2));
    let k4 = f(t + A4 * h, y + h * (B41 * k1 + B42 * k2 + B43 * k3));
    let k5 = f(t + A5 * h, y + h * (B51 * k1 + B52 * k2 + B53 * k3 + B54 * k4));
    let k6 = f(
        t + A6 * h,
        y + h * (B61 * k1 + B62 * k2 + B63 * k3 + B64 * k4 + B65 * k5),
    );

    let y5 = y + h * (C1 * k1 + C3 * k3 + C4 * k4 + C6 * k6);
    let err = h * (DC1 * k1 + DC3 * k3 + DC4 * k4 + DC5 * k5 + DC6 * k6);
    (y5, err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_decay() {
        // dy/dt = -y, y(0) = 1 → y(1) = e^{-1}
        let mut y = 1.0;
        integrate(&mut y, 0.0, 1.0, 1.0e-6, 0.1, |_, y| -y).unwrap();
        assert!((y - (-1.0f64).exp()).abs() < 1e-5, "y = {}", y);
    }

    #[test]
    fn test_constant_inflow() {
        // dy/dt = 2 → y(3) = 6
        let mut y = 0.0;
        integrate(&mut y, 0.0, 3.0, 1.0e-6, 1.0, |_, _| 2.0).unwrap();
        assert!((y - 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_linear_reservoir_analytic() {
        // dy/dt = i - k·y → 平衡解 y∞ = i/k
        let i = 1.0e-5;
        let k = 0.01;
        let mut y = 0.0;
        integrate(&mut y, 0.0, 2000.0, 1.0e-6, 10.0, |_, y| i - k * y).unwrap();
        let analytic = i / k * (1.0 - (-k * 2000.0f64).exp());
        assert!((y - analytic).abs() < 1e-6, "y = {} 解析 = {}", y, analytic);
    }

    #[test]
    fn test_nonlinear_reservoir_stays_nonnegative() {
        // 无入流的非线性水库放空：深度单调不增且非负
        let alpha = 2.0;
        let mut y = 0.1;
        integrate(&mut y, 0.0, 600.0, 1.0e-4, 60.0, |_, d| {
            -alpha * d.max(0.0).powf(5.0 / 3.0)
        })
        .unwrap();
        assert!(y >= -1.0e-9);
        assert!(y < 0.1);
    }
}
