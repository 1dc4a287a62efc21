//! `Array` constructor and the prototype methods the core carries.

use crate::types::{JsValue, number_ops};

use super::super::Interpreter;
use super::super::helpers::strict_equality;
use super::super::types::Completion;
use super::{register_constructor, set_method};

pub(super) fn setup(interp: &mut Interpreter) {
    let proto = interp.array_prototype.clone();

    set_method(interp, &proto, "push", 1, |interp, this, args| {
        let JsValue::Object(h) = this else {
            return interp.throw_type_error("Array.prototype.push called on non-object");
        };
        let mut len = array_length(interp, h.id);
        for arg in args {
            interp.set_object_property(*h, &len.to_string(), arg.clone());
            len += 1;
        }
        interp.set_object_property(*h, "length", JsValue::Number(len as f64));
        Completion::Normal(JsValue::Number(len as f64))
    });

    set_method(interp, &proto, "pop", 0, |interp, this, _args| {
        let JsValue::Object(h) = this else {
            return interp.throw_type_error("Array.prototype.pop called on non-object");
        };
        let len = array_length(interp, h.id);
        if len == 0 {
            return Completion::Normal(JsValue::Undefined);
        }
        let key = (len - 1).to_string();
        let value = interp.get_object(h.id).borrow().get_property(&key);
        interp.get_object(h.id).borrow_mut().remove_property(&key);
        interp.set_object_property(*h, "length", JsValue::Number((len - 1) as f64));
        Completion::Normal(value)
    });

    set_method(interp, &proto, "join", 1, |interp, this, args| {
        let JsValue::Object(h) = this else {
            return interp.throw_type_error("Array.prototype.join called on non-object");
        };
        let sep = match args.first() {
            None | Some(JsValue::Undefined) => ",".to_string(),
            Some(v) => match interp.to_string_value(v) {
                Ok(s) => s,
                Err(e) => return Completion::Throw(e),
            },
        };
        let len = array_length(interp, h.id);
        let mut parts = Vec::with_capacity(len as usize);
        for i in 0..len {
            let element = interp.get_object(h.id).borrow().get_property(&i.to_string());
            // holes, null and undefined render empty
            if element.is_nullish() {
                parts.push(String::new());
            } else {
                match interp.to_string_value(&element) {
                    Ok(s) => parts.push(s),
                    Err(e) => return Completion::Throw(e),
                }
            }
        }
        Completion::Normal(JsValue::String(parts.join(&sep)))
    });

    set_method(interp, &proto, "indexOf", 1, |interp, this, args| {
        let JsValue::Object(h) = this else {
            return interp.throw_type_error("Array.prototype.indexOf called on non-object");
        };
        let needle = args.first().cloned().unwrap_or(JsValue::Undefined);
        let len = array_length(interp, h.id);
        for i in 0..len {
            let element = interp.get_object(h.id).borrow().get_property(&i.to_string());
            if strict_equality(&element, &needle) {
                return Completion::Normal(JsValue::Number(i as f64));
            }
        }
        Completion::Normal(JsValue::Number(-1.0))
    });

    set_method(interp, &proto, "slice", 2, |interp, this, args| {
        let JsValue::Object(h) = this else {
            return interp.throw_type_error("Array.prototype.slice called on non-object");
        };
        let len = array_length(interp, h.id) as i64;
        let start = match args.first() {
            None | Some(JsValue::Undefined) => 0,
            Some(v) => match interp.to_number_value(v) {
                Ok(n) => clamp_index(n, len),
                Err(e) => return Completion::Throw(e),
            },
        };
        let end = match args.get(1) {
            None | Some(JsValue::Undefined) => len,
            Some(v) => match interp.to_number_value(v) {
                Ok(n) => clamp_index(n, len),
                Err(e) => return Completion::Throw(e),
            },
        };
        let mut out = Vec::new();
        for i in start..end {
            out.push(interp.get_object(h.id).borrow().get_property(&i.to_string()));
        }
        Completion::Normal(interp.create_array(out))
    });

    set_method(interp, &proto, "toString", 0, |interp, this, _args| {
        let join = interp.get_value_property(this, "join");
        match join {
            Ok(f) if interp.is_callable(&f) => {
                interp.call_function(&f, super::super::types::CallForm::Method(this.clone()), &[])
            }
            _ => Completion::Normal(JsValue::String("[object Array]".to_string())),
        }
    });

    let ctor = register_constructor(interp, "Array", 1, &proto, |interp, _this, args| {
        // a single numeric argument sets the length; anything else lists
        // the elements
        if args.len() == 1
            && let JsValue::Number(n) = &args[0]
        {
            let len = number_ops::to_uint32(*n);
            if *n != len as f64 {
                let err = interp.create_range_error("Invalid array length");
                return Completion::Throw(err);
            }
            let arr = interp.create_array(vec![]);
            if let JsValue::Object(h) = &arr {
                interp.set_object_property(*h, "length", JsValue::Number(len as f64));
            }
            return Completion::Normal(arr);
        }
        Completion::Normal(interp.create_array(args.to_vec()))
    });

    set_method(interp, &ctor, "isArray", 1, |interp, _this, args| {
        let arg = args.first().cloned().unwrap_or(JsValue::Undefined);
        Completion::Normal(JsValue::Boolean(interp.is_array(&arg)))
    });
}

fn array_length(interp: &Interpreter, id: u64) -> u32 {
    match interp.get_object(id).borrow().get_property("length") {
        JsValue::Number(n) => number_ops::to_uint32(n),
        _ => 0,
    }
}

fn clamp_index(n: f64, len: i64) -> i64 {
    let i = if n.is_nan() { 0 } else { n.trunc() as i64 };
    if i < 0 {
        (len + i).max(0)
    } else {
        i.min(len)
    }
}

#[cfg(test)]
mod tests {
    use crate::ast::build::*;
    use crate::ast::*;
    use crate::interpreter::Interpreter;
    use crate::types::JsValue;

    fn run(stmts: Vec<Statement>) -> Result<JsValue, String> {
        Interpreter::new()
            .evaluate(&program(stmts))
            .map_err(|e| e.message)
    }

    fn arr123() -> Statement {
        decl(
            VarKind::Let,
            "a",
            Some(Expression::Array(vec![
                Some(num(1.0)),
                Some(num(2.0)),
                Some(num(3.0)),
            ])),
        )
    }

    #[test]
    fn push_returns_new_length_and_updates_length() {
        let v = run(vec![
            arr123(),
            decl(
                VarKind::Let,
                "n",
                Some(call(member(ident("a"), "push"), vec![num(4.0), num(5.0)])),
            ),
            expr_stmt(binary(
                BinaryOp::Add,
                binary(BinaryOp::Mul, ident("n"), num(10.0)),
                member(ident("a"), "length"),
            )),
        ])
        .unwrap();
        assert!(matches!(v, JsValue::Number(n) if n == 55.0));
    }

    #[test]
    fn pop_removes_and_returns_last() {
        let v = run(vec![
            arr123(),
            decl(VarKind::Let, "last", Some(call(member(ident("a"), "pop"), vec![]))),
            expr_stmt(binary(
                BinaryOp::Add,
                binary(BinaryOp::Mul, ident("last"), num(10.0)),
                member(ident("a"), "length"),
            )),
        ])
        .unwrap();
        assert!(matches!(v, JsValue::Number(n) if n == 32.0));
    }

    #[test]
    fn pop_on_empty_is_undefined() {
        let v = run(vec![
            decl(VarKind::Let, "a", Some(Expression::Array(vec![]))),
            expr_stmt(binary(
                BinaryOp::StrictEq,
                call(member(ident("a"), "pop"), vec![]),
                ident("undefined"),
            )),
        ])
        .unwrap();
        assert!(matches!(v, JsValue::Boolean(true)));
    }

    #[test]
    fn join_renders_holes_empty() {
        let v = run(vec![
            decl(
                VarKind::Let,
                "a",
                Some(Expression::Array(vec![
                    Some(num(1.0)),
                    None,
                    Some(str_("x")),
                ])),
            ),
            expr_stmt(call(member(ident("a"), "join"), vec![str_("-")])),
        ])
        .unwrap();
        assert!(matches!(v, JsValue::String(s) if s == "1--x"));
    }

    #[test]
    fn index_of_uses_strict_equality() {
        let v = run(vec![
            decl(
                VarKind::Let,
                "a",
                Some(Expression::Array(vec![Some(str_("1")), Some(num(1.0))])),
            ),
            expr_stmt(call(member(ident("a"), "indexOf"), vec![num(1.0)])),
        ])
        .unwrap();
        assert!(matches!(v, JsValue::Number(n) if n == 1.0));
    }

    #[test]
    fn slice_supports_negative_indices() {
        let v = run(vec![
            arr123(),
            expr_stmt(call(
                member(
                    call(member(ident("a"), "slice"), vec![num(-2.0)]),
                    "join",
                ),
                vec![str_(",")],
            )),
        ])
        .unwrap();
        assert!(matches!(v, JsValue::String(s) if s == "2,3"));
    }

    #[test]
    fn array_constructor_forms() {
        let v = run(vec![expr_stmt(member(
            Expression::New(Box::new(ident("Array")), vec![num(4.0)]),
            "length",
        ))])
        .unwrap();
        assert!(matches!(v, JsValue::Number(n) if n == 4.0));

        let v = run(vec![expr_stmt(call(
            member(
                Expression::New(Box::new(ident("Array")), vec![num(1.0), num(2.0)]),
                "join",
            ),
            vec![str_(",")],
        ))])
        .unwrap();
        assert!(matches!(v, JsValue::String(s) if s == "1,2"));

        let msg = run(vec![expr_stmt(Expression::New(
            Box::new(ident("Array")),
            vec![num(-1.0)],
        ))])
        .unwrap_err();
        assert_eq!(msg, "RangeError: Invalid array length");
    }

    #[test]
    fn is_array_distinguishes_arrays_from_objects() {
        let v = run(vec![expr_stmt(Expression::Sequence(vec![
            call(
                member(ident("Array"), "isArray"),
                vec![Expression::Object(vec![])],
            ),
            call(
                member(ident("Array"), "isArray"),
                vec![Expression::Array(vec![])],
            ),
        ]))])
        .unwrap();
        assert!(matches!(v, JsValue::Boolean(true)));
    }

    #[test]
    fn array_addition_coerces_through_join() {
        // [1,2] + "" goes through toString -> join
        let v = run(vec![expr_stmt(binary(
            BinaryOp::Add,
            Expression::Array(vec![Some(num(1.0)), Some(num(2.0))]),
            str_(""),
        ))])
        .unwrap();
        assert!(matches!(v, JsValue::String(s) if s == "1,2"));
    }
}
