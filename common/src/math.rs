pub fn div_or_zero(lhs: f64, rhs: f64) -> f64 {
    if rhs == 0.0 {
        0.0
    } else {
        lhs / rhs
    }
}

pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// `l / (1 + e^(-k (x - x0))) + y0`
pub fn scaled_sigmoid(x: f64, l: f64, x0: f64, y0: f64, k: f64) -> f64 {
    l / (1.0 + (-k * (x - x0)).exp()) + y0
}
