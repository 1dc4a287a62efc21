//! Global object graph: intrinsic prototypes, constructors, and the
//! free-standing conversion functions.

mod array;
mod errors;
mod function;
mod math;
mod object;

use std::io::Write;

use crate::types::JsValue;

use super::types::{BindingKind, Completion, JsFunction, PropertyDescriptor};
use super::{GlobalsConfig, Interpreter};

pub(crate) fn setup_globals(interp: &mut Interpreter, config: GlobalsConfig) {
    // intrinsic prototypes come first; every other object hangs off them
    let object_proto = interp.create_object_raw();
    interp.object_prototype = object_proto.clone();
    let function_proto = interp.create_object_with_proto(&object_proto);
    interp.function_prototype = function_proto;
    let array_proto = interp.create_object_with_proto(&object_proto);
    interp.array_prototype = array_proto;

    {
        let mut env = interp.global_env.borrow_mut();
        env.define("undefined", BindingKind::Const, JsValue::Undefined);
        env.define("NaN", BindingKind::Const, JsValue::Number(f64::NAN));
        env.define(
            "Infinity",
            BindingKind::Const,
            JsValue::Number(f64::INFINITY),
        );
    }
    let global_this = interp.create_object();
    {
        let mut env = interp.global_env.borrow_mut();
        env.define("globalThis", BindingKind::Const, global_this.clone());
        env.define("this", BindingKind::Const, global_this);
    }

    // error constructors before anything that may need to throw
    errors::setup(interp);
    object::setup(interp);
    function::setup(interp);
    array::setup(interp);
    setup_conversions(interp);

    if config.console {
        setup_console(interp);
    }
    if config.math {
        math::setup(interp);
    }
}

/// Installs a hidden (non-enumerable) method on an object.
pub(super) fn set_method(
    interp: &mut Interpreter,
    target: &JsValue,
    name: &str,
    arity: usize,
    f: impl Fn(&mut Interpreter, &JsValue, &[JsValue]) -> Completion + 'static,
) {
    let func = interp.create_function(JsFunction::native(name.to_string(), arity, f));
    if let JsValue::Object(h) = target {
        interp
            .get_object(h.id)
            .borrow_mut()
            .insert_builtin(name.to_string(), func);
    }
}

/// Builds a native constructor, wires its `prototype`/`constructor` pair,
/// and binds it as a global.
pub(super) fn register_constructor(
    interp: &mut Interpreter,
    name: &str,
    arity: usize,
    proto: &JsValue,
    f: impl Fn(&mut Interpreter, &JsValue, &[JsValue]) -> Completion + 'static,
) -> JsValue {
    let ctor = interp.create_function(JsFunction::native(name.to_string(), arity, f));
    if let JsValue::Object(h) = &ctor {
        interp.get_object(h.id).borrow_mut().insert_property(
            "prototype".to_string(),
            PropertyDescriptor::data(proto.clone(), false, false, false),
        );
    }
    if let JsValue::Object(h) = proto {
        interp
            .get_object(h.id)
            .borrow_mut()
            .insert_builtin("constructor".to_string(), ctor.clone());
    }
    interp
        .global_env
        .borrow_mut()
        .define(name, BindingKind::Const, ctor.clone());
    ctor
}

fn setup_console(interp: &mut Interpreter) {
    let console = interp.create_object();
    for name in ["log", "error"] {
        set_method(interp, &console, name, 0, |interp, _this, args| {
            let line = args
                .iter()
                .map(|a| interp.format_value(a))
                .collect::<Vec<_>>()
                .join(" ");
            let sink = interp.console_out.clone();
            let _ = writeln!(sink.borrow_mut(), "{line}");
            Completion::Normal(JsValue::Undefined)
        });
    }
    interp
        .global_env
        .borrow_mut()
        .define("console", BindingKind::Const, console);
}

fn setup_conversions(interp: &mut Interpreter) {
    interp.register_global_fn("isNaN", 1, |interp, _this, args| {
        let arg = args.first().cloned().unwrap_or(JsValue::Undefined);
        match interp.to_number_value(&arg) {
            Ok(n) => Completion::Normal(JsValue::Boolean(n.is_nan())),
            Err(e) => Completion::Throw(e),
        }
    });
    interp.register_global_fn("isFinite", 1, |interp, _this, args| {
        let arg = args.first().cloned().unwrap_or(JsValue::Undefined);
        match interp.to_number_value(&arg) {
            Ok(n) => Completion::Normal(JsValue::Boolean(n.is_finite())),
            Err(e) => Completion::Throw(e),
        }
    });
    interp.register_global_fn("parseInt", 2, |interp, _this, args| {
        let arg = args.first().cloned().unwrap_or(JsValue::Undefined);
        let s = match interp.to_string_value(&arg) {
            Ok(s) => s,
            Err(e) => return Completion::Throw(e),
        };
        let radix = match args.get(1) {
            Some(v) if !v.is_undefined() => match interp.to_number_value(v) {
                Ok(n) => Some(n),
                Err(e) => return Completion::Throw(e),
            },
            _ => None,
        };
        Completion::Normal(JsValue::Number(parse_int(&s, radix)))
    });
    interp.register_global_fn("parseFloat", 1, |interp, _this, args| {
        let arg = args.first().cloned().unwrap_or(JsValue::Undefined);
        match interp.to_string_value(&arg) {
            Ok(s) => Completion::Normal(JsValue::Number(parse_float(&s))),
            Err(e) => Completion::Throw(e),
        }
    });
    interp.register_global_fn("String", 1, |interp, _this, args| {
        match args.first() {
            None => Completion::Normal(JsValue::String(String::new())),
            Some(v) => match interp.to_string_value(v) {
                Ok(s) => Completion::Normal(JsValue::String(s)),
                Err(e) => Completion::Throw(e),
            },
        }
    });
    interp.register_global_fn("Number", 1, |interp, _this, args| {
        match args.first() {
            None => Completion::Normal(JsValue::Number(0.0)),
            Some(v) => match interp.to_number_value(v) {
                Ok(n) => Completion::Normal(JsValue::Number(n)),
                Err(e) => Completion::Throw(e),
            },
        }
    });
    interp.register_global_fn("Boolean", 1, |_interp, _this, args| {
        let arg = args.first().cloned().unwrap_or(JsValue::Undefined);
        Completion::Normal(JsValue::Boolean(super::helpers::to_boolean(&arg)))
    });
}

fn parse_int(s: &str, radix: Option<f64>) -> f64 {
    let t = s.trim_start();
    let (sign, t) = match t.strip_prefix('-') {
        Some(rest) => (-1.0, rest),
        None => (1.0, t.strip_prefix('+').unwrap_or(t)),
    };
    let mut radix = radix.map(|r| r as i64).unwrap_or(0);
    let mut t = t;
    if (radix == 16 || radix == 0)
        && let Some(rest) = t.strip_prefix("0x").or_else(|| t.strip_prefix("0X"))
    {
        t = rest;
        radix = 16;
    }
    if radix == 0 {
        radix = 10;
    }
    if !(2..=36).contains(&radix) {
        return f64::NAN;
    }
    let mut value = 0.0f64;
    let mut any = false;
    for c in t.chars() {
        let Some(digit) = c.to_digit(36) else { break };
        if digit as i64 >= radix {
            break;
        }
        value = value * radix as f64 + digit as f64;
        any = true;
    }
    if any { sign * value } else { f64::NAN }
}

fn parse_float(s: &str) -> f64 {
    let t = s.trim_start();
    let bytes = t.as_bytes();
    let mut i = 0;
    if matches!(bytes.first(), Some(b'+') | Some(b'-')) {
        i += 1;
    }
    if t[i..].starts_with("Infinity") {
        return if bytes.first() == Some(&b'-') {
            f64::NEG_INFINITY
        } else {
            f64::INFINITY
        };
    }
    let mut saw_digit = false;
    while matches!(bytes.get(i), Some(b) if b.is_ascii_digit()) {
        i += 1;
        saw_digit = true;
    }
    if bytes.get(i) == Some(&b'.') {
        i += 1;
        while matches!(bytes.get(i), Some(b) if b.is_ascii_digit()) {
            i += 1;
            saw_digit = true;
        }
    }
    if !saw_digit {
        return f64::NAN;
    }
    if matches!(bytes.get(i), Some(b'e') | Some(b'E')) {
        let mut j = i + 1;
        if matches!(bytes.get(j), Some(b'+') | Some(b'-')) {
            j += 1;
        }
        if matches!(bytes.get(j), Some(b) if b.is_ascii_digit()) {
            while matches!(bytes.get(j), Some(b) if b.is_ascii_digit()) {
                j += 1;
            }
            i = j;
        }
    }
    t[..i].parse::<f64>().unwrap_or(f64::NAN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::build::*;
    use crate::ast::*;
    use crate::interpreter::{Completion, GlobalsConfig, Interpreter};
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Shared buffer that can be handed to `set_console_output` and read
    /// back after the program runs.
    #[derive(Clone, Default)]
    struct SharedBuf(Rc<RefCell<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuf {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.borrow()).into_owned()
        }
    }

    #[test]
    fn console_log_writes_to_replaceable_sink() {
        let mut interp = Interpreter::new();
        let buf = SharedBuf::default();
        interp.set_console_output(Box::new(buf.clone()));
        let prog = program(vec![expr_stmt(call(
            member(ident("console"), "log"),
            vec![str_("hello"), num(42.0)],
        ))]);
        assert!(matches!(interp.run(&prog), Completion::Normal(_)));
        assert_eq!(buf.contents(), "hello 42\n");
    }

    #[test]
    fn console_can_be_disabled() {
        let mut interp = Interpreter::with_config(GlobalsConfig {
            console: false,
            math: true,
        });
        let prog = program(vec![expr_stmt(ident("console"))]);
        assert!(interp.evaluate(&prog).is_err());
        // Math stays available
        let prog = program(vec![expr_stmt(member(ident("Math"), "PI"))]);
        assert!(matches!(
            interp.evaluate(&prog),
            Ok(JsValue::Number(n)) if (n - std::f64::consts::PI).abs() < 1e-12
        ));
    }

    #[test]
    fn parse_int_grammar() {
        assert_eq!(parse_int("42", None), 42.0);
        assert_eq!(parse_int("  -17px", None), -17.0);
        assert_eq!(parse_int("0xff", None), 255.0);
        assert_eq!(parse_int("ff", Some(16.0)), 255.0);
        assert_eq!(parse_int("101", Some(2.0)), 5.0);
        assert!(parse_int("zz", None).is_nan());
        assert!(parse_int("5", Some(1.0)).is_nan());
    }

    #[test]
    fn parse_float_grammar() {
        assert_eq!(parse_float("3.25rem"), 3.25);
        assert_eq!(parse_float("  -2.5e2"), -250.0);
        assert_eq!(parse_float("-Infinity"), f64::NEG_INFINITY);
        assert_eq!(parse_float(".5"), 0.5);
        assert!(parse_float("abc").is_nan());
        // a bare exponent marker is not consumed
        assert_eq!(parse_float("3e"), 3.0);
    }

    #[test]
    fn conversion_globals() {
        let mut interp = Interpreter::new();
        let prog = program(vec![
            decl(
                VarKind::Let,
                "r",
                Some(Expression::Array(vec![
                    Some(call(ident("isNaN"), vec![str_("x")])),
                    Some(call(ident("isFinite"), vec![num(1.0)])),
                    Some(call(ident("Number"), vec![str_("8")])),
                    Some(call(ident("String"), vec![num(1.5)])),
                    Some(call(ident("Boolean"), vec![num(0.0)])),
                ])),
            ),
            expr_stmt(call(member(ident("r"), "join"), vec![str_(",")])),
        ]);
        match interp.evaluate(&prog) {
            Ok(JsValue::String(s)) => assert_eq!(s, "true,true,8,1.5,false"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn global_constants() {
        let mut interp = Interpreter::new();
        let prog = program(vec![expr_stmt(binary(
            BinaryOp::StrictEq,
            ident("globalThis"),
            ident("globalThis"),
        ))]);
        assert!(matches!(interp.evaluate(&prog), Ok(JsValue::Boolean(true))));
    }
}
