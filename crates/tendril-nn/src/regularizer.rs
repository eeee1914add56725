// nn::regularizer — weight penalties registered as layer losses
//
//   l1(a)      — a * sum(|w|)
//   l2(a)      — a * sum(w²)
//   l1_l2(a,b) — l1(a) + l2(b)

use std::rc::Rc;

use tendril_core::Regularizer;

pub fn l1(factor: f64) -> Regularizer {
    Rc::new(move |w: &[f64]| factor * w.iter().map(|v| v.abs()).sum::<f64>())
}

pub fn l2(factor: f64) -> Regularizer {
    Rc::new(move |w: &[f64]| factor * w.iter().map(|v| v * v).sum::<f64>())
}

pub fn l1_l2(l1_factor: f64, l2_factor: f64) -> Regularizer {
    let (a, b) = (l1(l1_factor), l2(l2_factor));
    Rc::new(move |w: &[f64]| a(w) + b(w))
}
