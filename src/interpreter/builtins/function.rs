//! `Function.prototype`: explicit `this` control via call/apply/bind.

use crate::types::{JsValue, number_ops};

use super::super::Interpreter;
use super::super::types::{
    BindingKind, BoundFunction, CallForm, Completion, JsObjectData, PropertyDescriptor,
};
use super::set_method;

pub(super) fn setup(interp: &mut Interpreter) {
    let proto = interp.function_prototype.clone();

    set_method(interp, &proto, "call", 1, |interp, this, args| {
        if !interp.is_callable(this) {
            return interp.throw_type_error("Function.prototype.call called on non-function");
        }
        let this_arg = args.first().cloned().unwrap_or(JsValue::Undefined);
        let rest = args.get(1..).unwrap_or(&[]);
        interp.call_function(this, CallForm::Method(this_arg), rest)
    });

    set_method(interp, &proto, "apply", 2, |interp, this, args| {
        if !interp.is_callable(this) {
            return interp.throw_type_error("Function.prototype.apply called on non-function");
        }
        let this_arg = args.first().cloned().unwrap_or(JsValue::Undefined);
        let call_args = match args.get(1) {
            None | Some(JsValue::Undefined) | Some(JsValue::Null) => Vec::new(),
            Some(JsValue::Object(h)) => {
                let obj = interp.get_object(h.id);
                let len = match obj.borrow().get_property("length") {
                    JsValue::Number(n) => number_ops::to_uint32(n),
                    _ => 0,
                };
                (0..len)
                    .map(|i| obj.borrow().get_property(&i.to_string()))
                    .collect()
            }
            _ => {
                return interp
                    .throw_type_error("CreateListFromArrayLike called on non-object");
            }
        };
        interp.call_function(this, CallForm::Method(this_arg), &call_args)
    });

    set_method(interp, &proto, "bind", 1, |interp, this, args| {
        if !interp.is_callable(this) {
            return interp.throw_type_error("Function.prototype.bind called on non-function");
        }
        let this_arg = args.first().cloned().unwrap_or(JsValue::Undefined);
        let bound_args = args.get(1..).unwrap_or(&[]).to_vec();
        let name = match interp.get_value_property(this, "name") {
            Ok(JsValue::String(s)) => s,
            _ => String::new(),
        };
        // the bound record lives on the object so the collector can trace
        // the target and captured values
        let mut data = JsObjectData::new();
        data.class_name = "Function".to_string();
        data.prototype = match &interp.function_prototype {
            JsValue::Object(h) => Some(interp.get_object(h.id)),
            _ => None,
        };
        data.bound = Some(BoundFunction {
            target: this.clone(),
            this_val: this_arg,
            bound_args,
        });
        data.insert_property(
            "name".to_string(),
            PropertyDescriptor::data(
                JsValue::String(format!("bound {name}")),
                false,
                false,
                true,
            ),
        );
        Completion::Normal(interp.alloc(data))
    });

    // runtime compilation is not part of the evaluation core
    let ctor = interp.create_function(super::super::types::JsFunction::native(
        "Function".to_string(),
        0,
        |interp, _this, _args| {
            interp.throw_type_error("Function constructor is not supported")
        },
    ));
    if let JsValue::Object(h) = &ctor {
        interp.get_object(h.id).borrow_mut().insert_property(
            "prototype".to_string(),
            PropertyDescriptor::data(proto, false, false, false),
        );
    }
    interp
        .global_env
        .borrow_mut()
        .define("Function", BindingKind::Const, ctor);
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

    fn getter_fn() -> Statement {
        func_decl("get", &["extra"], vec![ret(Some(binary(
            BinaryOp::Add,
            member(Expression::This, "x"),
            ident("extra"),
        )))])
    }

    fn obj_x(v: f64) -> Expression {
        Expression::Object(vec![Property {
            key: PropertyKey::Identifier("x".to_string()),
            value: num(v),
        }])
    }

    #[test]
    fn call_rebinds_this_and_forwards_args() {
        let v = run(vec![
            getter_fn(),
            expr_stmt(call(
                member(ident("get"), "call"),
                vec![obj_x(40.0), num(2.0)],
            )),
        ])
        .unwrap();
        assert!(matches!(v, JsValue::Number(n) if n == 42.0));
    }

    #[test]
    fn apply_spreads_an_array_of_arguments() {
        let v = run(vec![
            getter_fn(),
            expr_stmt(call(
                member(ident("get"), "apply"),
                vec![
                    obj_x(10.0),
                    Expression::Array(vec![Some(num(5.0))]),
                ],
            )),
        ])
        .unwrap();
        assert!(matches!(v, JsValue::Number(n) if n == 15.0));
    }

    #[test]
    fn bind_fixes_this_and_leading_args() {
        let v = run(vec![
            func_decl("add", &["a", "b"], vec![ret(Some(binary(
                BinaryOp::Add,
                binary(BinaryOp::Add, member(Expression::This, "x"), ident("a")),
                ident("b"),
            )))]),
            decl(
                VarKind::Let,
                "bound",
                Some(call(
                    member(ident("add"), "bind"),
                    vec![obj_x(100.0), num(20.0)],
                )),
            ),
            expr_stmt(call(ident("bound"), vec![num(3.0)])),
        ])
        .unwrap();
        assert!(matches!(v, JsValue::Number(n) if n == 123.0));
    }

    #[test]
    fn bound_function_reports_function_typeof() {
        let v = run(vec![
            func_decl("f", &[], vec![]),
            decl(
                VarKind::Let,
                "b",
                Some(call(member(ident("f"), "bind"), vec![])),
            ),
            expr_stmt(Expression::Typeof(Box::new(ident("b")))),
        ])
        .unwrap();
        assert!(matches!(v, JsValue::String(s) if s == "function"));
    }

    #[test]
    fn function_constructor_is_rejected() {
        let msg = run(vec![expr_stmt(Expression::New(
            Box::new(ident("Function")),
            vec![str_("return 1")],
        ))])
        .unwrap_err();
        assert_eq!(msg, "TypeError: Function constructor is not supported");
    }
}
