//! The `Math` namespace object (config-gated).

use crate::types::JsValue;

use super::super::Interpreter;
use super::super::types::{BindingKind, Completion};
use super::set_method;

pub(super) fn setup(interp: &mut Interpreter) {
    let math = interp.create_object();
    if let JsValue::Object(h) = &math {
        let obj = interp.get_object(h.id);
        let mut data = obj.borrow_mut();
        data.class_name = "Math".to_string();
        data.insert_builtin("PI".to_string(), JsValue::Number(std::f64::consts::PI));
        data.insert_builtin("E".to_string(), JsValue::Number(std::f64::consts::E));
    }

    unary(interp, &math, "abs", f64::abs);
    unary(interp, &math, "floor", f64::floor);
    unary(interp, &math, "ceil", f64::ceil);
    unary(interp, &math, "trunc", f64::trunc);
    unary(interp, &math, "sqrt", f64::sqrt);
    // JS rounds half-up, including negative halves: round(-0.5) is -0
    unary(interp, &math, "round", |n| {
        let r = (n + 0.5).floor();
        // inputs in [-0.5, -0.0] land on zero and must keep the sign
        if r == 0.0 && n.is_sign_negative() { -0.0 } else { r }
    });

    set_method(interp, &math, "pow", 2, |interp, _this, args| {
        let base = match number_arg(interp, args.first()) {
            Ok(n) => n,
            Err(e) => return Completion::Throw(e),
        };
        let exp = match number_arg(interp, args.get(1)) {
            Ok(n) => n,
            Err(e) => return Completion::Throw(e),
        };
        Completion::Normal(JsValue::Number(base.powf(exp)))
    });

    fold(interp, &math, "max", f64::NEG_INFINITY, f64::max);
    fold(interp, &math, "min", f64::INFINITY, f64::min);

    interp
        .global_env
        .borrow_mut()
        .define("Math", BindingKind::Const, math);
}

fn unary(
    interp: &mut Interpreter,
    math: &JsValue,
    name: &str,
    f: impl Fn(f64) -> f64 + 'static,
) {
    set_method(interp, math, name, 1, move |interp, _this, args| {
        match number_arg(interp, args.first()) {
            Ok(n) => Completion::Normal(JsValue::Number(f(n))),
            Err(e) => Completion::Throw(e),
        }
    });
}

fn fold(
    interp: &mut Interpreter,
    math: &JsValue,
    name: &str,
    identity: f64,
    f: impl Fn(f64, f64) -> f64 + 'static,
) {
    set_method(interp, math, name, 2, move |interp, _this, args| {
        let mut acc = identity;
        for arg in args {
            let n = match interp.to_number_value(arg) {
                Ok(n) => n,
                Err(e) => return Completion::Throw(e),
            };
            if n.is_nan() {
                return Completion::Normal(JsValue::Number(f64::NAN));
            }
            acc = f(acc, n);
        }
        Completion::Normal(JsValue::Number(acc))
    });
}

fn number_arg(interp: &mut Interpreter, arg: Option<&JsValue>) -> Result<f64, JsValue> {
    match arg {
        Some(v) => interp.to_number_value(v),
        None => Ok(f64::NAN),
    }
}

#[cfg(test)]
mod tests {
    use crate::ast::build::*;
    use crate::ast::Expression;
    use crate::interpreter::Interpreter;
    use crate::types::JsValue;

    fn eval_math(name: &str, args: Vec<Expression>) -> JsValue {
        let mut interp = Interpreter::new();
        let prog = program(vec![expr_stmt(call(member(ident("Math"), name), args))]);
        match interp.evaluate(&prog) {
            Ok(v) => v,
            Err(e) => panic!("unexpected exception: {e}"),
        }
    }

    fn n(v: JsValue) -> f64 {
        match v {
            JsValue::Number(x) => x,
            other => panic!("expected number, got {other:?}"),
        }
    }

    #[test]
    fn rounding_family() {
        assert_eq!(n(eval_math("floor", vec![num(1.7)])), 1.0);
        assert_eq!(n(eval_math("ceil", vec![num(1.2)])), 2.0);
        assert_eq!(n(eval_math("trunc", vec![num(-1.7)])), -1.0);
        assert_eq!(n(eval_math("round", vec![num(2.5)])), 3.0);
        assert_eq!(n(eval_math("round", vec![num(-2.5)])), -2.0);
    }

    #[test]
    fn round_negative_half_keeps_the_sign() {
        let r = n(eval_math("round", vec![num(-0.5)]));
        assert_eq!(r, 0.0);
        assert!(r.is_sign_negative());
        assert!(!n(eval_math("round", vec![num(0.4)])).is_sign_negative());
    }

    #[test]
    fn abs_sqrt_pow() {
        assert_eq!(n(eval_math("abs", vec![num(-3.0)])), 3.0);
        assert_eq!(n(eval_math("sqrt", vec![num(9.0)])), 3.0);
        assert_eq!(n(eval_math("pow", vec![num(2.0), num(10.0)])), 1024.0);
    }

    #[test]
    fn max_min_variadic() {
        assert_eq!(n(eval_math("max", vec![num(1.0), num(5.0), num(3.0)])), 5.0);
        assert_eq!(n(eval_math("min", vec![num(1.0), num(-5.0)])), -5.0);
        assert_eq!(n(eval_math("max", vec![])), f64::NEG_INFINITY);
        assert!(n(eval_math("max", vec![num(1.0), str_("x")])).is_nan());
    }

    #[test]
    fn missing_argument_is_nan() {
        assert!(n(eval_math("sqrt", vec![])).is_nan());
    }
}
