// crates/dh_physics/src/objects/xsect.rs

//! 管道断面几何
//!
//! 提供恒定流与运动波演算所需的断面几何换算：
//! 水深↔过水面积、水力半径、断面因子 S = A·R^(2/3) 及其反演。
//!
//! 断面因子反演（由 S 求 A）没有解析解，采用二分迭代；
//! 对圆形断面，断面因子在接近满管时非单调，反演域截断在
//! 因子峰值对应的面积处。

use dh_foundation::consts::TINY;

/// 断面形状
#[derive(Debug, Clone, PartialEq)]
pub enum Xsect {
    /// 虚拟断面：无水力属性，流量原样传递
    Dummy,
    /// 圆形
    Circular {
        /// 直径 [ft]
        diameter: f64,
    },
    /// 封闭矩形
    RectClosed {
        /// 宽 [ft]
        width: f64,
        /// 高 [ft]
        height: f64,
    },
    /// 开放矩形
    RectOpen {
        /// 宽 [ft]
        width: f64,
        /// 高 [ft]
        height: f64,
    },
    /// 梯形
    Trapezoidal {
        /// 底宽 [ft]
        base_width: f64,
        /// 高 [ft]
        height: f64,
        /// 边坡（水平/垂直）
        side_slope: f64,
    },
}

impl Xsect {
    /// 是否为虚拟断面
    pub fn is_dummy(&self) -> bool {
        matches!(self, Xsect::Dummy)
    }

    /// 满管水深 [ft]
    pub fn y_full(&self) -> f64 {
        match self {
            Xsect::Dummy => 0.0,
            Xsect::Circular { diameter } => *diameter,
            Xsect::RectClosed { height, .. }
            | Xsect::RectOpen { height, .. }
            | Xsect::Trapezoidal { height, .. } => *height,
        }
    }

    /// 满管面积 [ft²]
    pub fn a_full(&self) -> f64 {
        match self {
            Xsect::Dummy => 0.0,
            Xsect::Circular { diameter } => {
                std::f64::consts::PI / 4.0 * diameter * diameter
            }
            Xsect::RectClosed { width, height } | Xsect::RectOpen { width, height } => {
                width * height
            }
            Xsect::Trapezoidal {
                base_width,
                height,
                side_slope,
            } => (base_width + side_slope * height) * height,
        }
    }

    /// 满管水力半径 [ft]
    pub fn r_full(&self) -> f64 {
        match self {
            Xsect::Dummy => 0.0,
            Xsect::Circular { diameter } => diameter / 4.0,
            Xsect::RectClosed { width, height } => {
                width * height / (2.0 * (width + height))
            }
            Xsect::RectOpen { width, height } => {
                width * height / (width + 2.0 * height)
            }
            Xsect::Trapezoidal {
                base_width,
                height,
                side_slope,
            } => {
                let a = (base_width + side_slope * height) * height;
                let wp = base_width
                    + 2.0 * height * (1.0 + side_slope * side_slope).sqrt();
                if wp < TINY {
                    0.0
                } else {
                    a / wp
                }
            }
        }
    }

    /// 满管断面因子 S = A·R^(2/3)
    pub fn s_full(&self) -> f64 {
        self.a_full() * self.r_full().powf(2.0 / 3.0)
    }

    /// 由水深求过水面积 [ft²]
    pub fn a_of_y(&self, y: f64) -> f64 {
        let y = y.clamp(0.0, self.y_full());
        match self {
            Xsect::Dummy => 0.0,
            Xsect::Circular { diameter } => {
                let d = *diameter;
                if y <= 0.0 {
                    return 0.0;
                }
                if y >= d {
                    return self.a_full();
                }
                let theta = 2.0 * (1.0 - 2.0 * y / d).acos();
                d * d / 8.0 * (theta - theta.sin())
            }
            Xsect::RectClosed { width, .. } | Xsect::RectOpen { width, .. } => width * y,
            Xsect::Trapezoidal {
                base_width,
                side_slope,
                ..
            } => (base_width + side_slope * y) * y,
        }
    }

    /// 由过水面积求水深 [ft]
    pub fn y_of_a(&self, a: f64) -> f64 {
        let a_full = self.a_full();
        if a <= 0.0 || a_full <= 0.0 {
            return 0.0;
        }
        if a >= a_full {
            return self.y_full();
        }
        match self {
            Xsect::Dummy => 0.0,
            Xsect::RectClosed { width, .. } | Xsect::RectOpen { width, .. } => a / width,
            Xsect::Trapezoidal {
                base_width,
                side_slope,
                ..
            } => {
                if *side_slope < TINY {
                    return a / base_width.max(TINY);
                }
                // 解 s·y² + b·y − a = 0 的正根
                let s = *side_slope;
                let b = *base_width;
                ((b * b + 4.0 * s * a).sqrt() - b) / (2.0 * s)
            }
            Xsect::Circular { .. } => self.invert_monotone(a, |y| self.a_of_y(y)),
        }
    }

    /// 由水深求水力半径 [ft]
    pub fn r_of_y(&self, y: f64) -> f64 {
        let y = y.clamp(0.0, self.y_full());
        if y <= 0.0 {
            return 0.0;
        }
        match self {
            Xsect::Dummy => 0.0,
            Xsect::Circular { diameter } => {
                let d = *diameter;
                if y >= d {
                    return d / 4.0;
                }
                let theta = 2.0 * (1.0 - 2.0 * y / d).acos();
                if theta < TINY {
                    return 0.0;
                }
                d / 4.0 * (1.0 - theta.sin() / theta)
            }
            Xsect::RectClosed { width, height } => {
                if y >= *height {
                    self.r_full()
                } else {
                    width * y / (width + 2.0 * y)
                }
            }
            Xsect::RectOpen { width, .. } => width * y / (width + 2.0 * y),
            Xsect::Trapezoidal {
                base_width,
                side_slope,
                ..
            } => {
                let a = (base_width + side_slope * y) * y;
                let wp = base_width + 2.0 * y * (1.0 + side_slope * side_slope).sqrt();
                a / wp.max(TINY)
            }
        }
    }

    /// 由过水面积求断面因子 S = A·R^(2/3)
    pub fn s_of_a(&self, a: f64) -> f64 {
        let y = self.y_of_a(a);
        a * self.r_of_y(y).powf(2.0 / 3.0)
    }

    /// 由断面因子反求过水面积
    ///
    /// 圆形断面的 S(A) 在约 0.93·a_full 处达到峰值后回落，
    /// 反演域截断在峰值之前，超过峰值的 S 返回峰值对应面积。
    pub fn a_of_s(&self, s: f64) -> f64 {
        if s <= 0.0 {
            return 0.0;
        }
        let a_max = match self {
            // 圆形断面因子峰值出现在 y/D ≈ 0.938
            Xsect::Circular { diameter } => self.a_of_y(0.938 * diameter),
            _ => self.a_full(),
        };
        if s >= self.s_of_a(a_max) {
            return a_max;
        }
        self.invert_monotone_to(s, a_max, |a| self.s_of_a(a))
    }

    /// 在 [0, y_full] 上二分反演单调函数 f(y) = target
    fn invert_monotone(&self, target: f64, f: impl Fn(f64) -> f64) -> f64 {
        let mut lo = 0.0;
        let mut hi = self.y_full();
        for _ in 0..40 {
            let mid = 0.5 * (lo + hi);
            if f(mid) < target {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        0.5 * (lo + hi)
    }

    /// 在 [0, x_max] 上二分反演单调函数 f(x) = target
    fn invert_monotone_to(&self, target: f64, x_max: f64, f: impl Fn(f64) -> f64) -> f64 {
        let mut lo = 0.0;
        let mut hi = x_max;
        for _ in 0..40 {
            let mid = 0.5 * (lo + hi);
            if f(mid) < target {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        0.5 * (lo + hi)
    }
}
