//! The error constructor family. Every family shares one native body; the
//! family name is captured per constructor.

use crate::types::JsValue;

use super::super::Interpreter;
use super::super::types::Completion;
use super::{register_constructor, set_method};

const FAMILIES: [&str; 5] = [
    "Error",
    "TypeError",
    "ReferenceError",
    "RangeError",
    "SyntaxError",
];

pub(super) fn setup(interp: &mut Interpreter) {
    let base_proto = interp.create_object();
    init_prototype(interp, &base_proto, "Error");
    set_method(interp, &base_proto, "toString", 0, |interp, this, _args| {
        let JsValue::Object(h) = this else {
            return interp.throw_type_error("Error.prototype.toString called on non-object");
        };
        let obj = interp.get_object(h.id);
        let name = match obj.borrow().get_property("name") {
            JsValue::Undefined => "Error".to_string(),
            v => v.to_string(),
        };
        let message = obj.borrow().get_property("message").to_string();
        let text = if message.is_empty() {
            name
        } else {
            format!("{name}: {message}")
        };
        Completion::Normal(JsValue::String(text))
    });
    interp
        .error_prototypes
        .insert("Error".to_string(), base_proto.clone());
    register_family(interp, "Error", &base_proto);

    for family in &FAMILIES[1..] {
        let proto = interp.create_object_with_proto(&base_proto);
        init_prototype(interp, &proto, family);
        interp
            .error_prototypes
            .insert(family.to_string(), proto.clone());
        register_family(interp, family, &proto);
    }
}

fn init_prototype(interp: &mut Interpreter, proto: &JsValue, name: &str) {
    if let JsValue::Object(h) = proto {
        let obj = interp.get_object(h.id);
        let mut data = obj.borrow_mut();
        data.insert_builtin("name".to_string(), JsValue::String(name.to_string()));
        data.insert_builtin("message".to_string(), JsValue::String(String::new()));
    }
}

fn register_family(interp: &mut Interpreter, family: &'static str, proto: &JsValue) {
    register_constructor(interp, family, 1, proto, move |interp, this, args| {
        let message = match args.first() {
            None | Some(JsValue::Undefined) => None,
            Some(v) => match interp.to_string_value(v) {
                Ok(s) => Some(s),
                Err(e) => return Completion::Throw(e),
            },
        };
        match this {
            // `new Error(...)`: the instance with the right prototype was
            // already created by the construct path
            JsValue::Object(h) => {
                let obj = interp.get_object(h.id);
                let mut data = obj.borrow_mut();
                data.class_name = "Error".to_string();
                if let Some(msg) = message {
                    data.insert_builtin("message".to_string(), JsValue::String(msg));
                }
                Completion::Normal(this.clone())
            }
            // `Error(...)` without `new` builds an instance itself
            _ => Completion::Normal(
                interp.create_error(family, message.as_deref().unwrap_or("")),
            ),
        }
    });
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

    #[test]
    fn thrown_constructed_error_renders_name_and_message() {
        let msg = run(vec![Statement::new(StatementKind::Throw(Expression::New(
            Box::new(ident("TypeError")),
            vec![str_("bad thing")],
        )))])
        .unwrap_err();
        assert_eq!(msg, "TypeError: bad thing");
    }

    #[test]
    fn error_without_new_also_constructs() {
        let v = run(vec![expr_stmt(member(
            call(ident("RangeError"), vec![str_("m")]),
            "message",
        ))])
        .unwrap();
        assert!(matches!(v, JsValue::String(s) if s == "m"));
    }

    #[test]
    fn subclass_instances_chain_through_error_prototype() {
        let v = run(vec![
            decl(
                VarKind::Let,
                "e",
                Some(Expression::New(
                    Box::new(ident("ReferenceError")),
                    vec![str_("x")],
                )),
            ),
            expr_stmt(Expression::Sequence(vec![
                binary(BinaryOp::Instanceof, ident("e"), ident("ReferenceError")),
                binary(BinaryOp::Instanceof, ident("e"), ident("Error")),
            ])),
        ])
        .unwrap();
        assert!(matches!(v, JsValue::Boolean(true)));
    }

    #[test]
    fn to_string_composes_name_and_message() {
        let v = run(vec![expr_stmt(call(
            member(
                Expression::New(Box::new(ident("Error")), vec![str_("oops")]),
                "toString",
            ),
            vec![],
        ))])
        .unwrap();
        assert!(matches!(v, JsValue::String(s) if s == "Error: oops"));
    }

    #[test]
    fn user_code_can_catch_engine_errors() {
        let v = run(vec![
            decl(VarKind::Let, "caught", Some(str_(""))),
            Statement::new(StatementKind::Try(TryStatement {
                block: vec![expr_stmt(call(ident("no_such_fn"), vec![]))],
                handler: Some(CatchClause {
                    param: Some("e".to_string()),
                    body: vec![expr_stmt(assign(
                        ident("caught"),
                        member(ident("e"), "name"),
                    ))],
                }),
                finalizer: None,
            })),
            expr_stmt(ident("caught")),
        ])
        .unwrap();
        assert!(matches!(v, JsValue::String(s) if s == "ReferenceError"));
    }
}
