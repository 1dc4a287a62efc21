//! `Object` constructor, its statics, and `Object.prototype`.

use crate::types::JsValue;

use super::super::Interpreter;
use super::super::types::{Completion, PropertyDescriptor};
use super::{register_constructor, set_method};

pub(super) fn setup(interp: &mut Interpreter) {
    let proto = interp.object_prototype.clone();

    set_method(interp, &proto, "hasOwnProperty", 1, |interp, this, args| {
        let JsValue::Object(h) = this else {
            return Completion::Normal(JsValue::Boolean(false));
        };
        let key = match interp.to_string_value(args.first().unwrap_or(&JsValue::Undefined)) {
            Ok(k) => k,
            Err(e) => return Completion::Throw(e),
        };
        let has = interp.get_object(h.id).borrow().has_own_property(&key);
        Completion::Normal(JsValue::Boolean(has))
    });
    set_method(interp, &proto, "isPrototypeOf", 1, |interp, this, args| {
        let (JsValue::Object(this_h), Some(JsValue::Object(arg_h))) = (this, args.first()) else {
            return Completion::Normal(JsValue::Boolean(false));
        };
        let mut cursor = interp.get_object(arg_h.id).borrow().prototype.clone();
        while let Some(link) = cursor {
            if link.borrow().id == Some(this_h.id) {
                return Completion::Normal(JsValue::Boolean(true));
            }
            let next = link.borrow().prototype.clone();
            cursor = next;
        }
        Completion::Normal(JsValue::Boolean(false))
    });
    set_method(interp, &proto, "toString", 0, |interp, this, _args| {
        let tag = match this {
            JsValue::Object(h) => interp.get_object(h.id).borrow().class_name.clone(),
            JsValue::Undefined => "Undefined".to_string(),
            JsValue::Null => "Null".to_string(),
            JsValue::Boolean(_) => "Boolean".to_string(),
            JsValue::Number(_) => "Number".to_string(),
            JsValue::String(_) => "String".to_string(),
        };
        Completion::Normal(JsValue::String(format!("[object {tag}]")))
    });
    set_method(interp, &proto, "valueOf", 0, |_interp, this, _args| {
        Completion::Normal(this.clone())
    });

    let ctor = register_constructor(interp, "Object", 1, &proto, |interp, this, args| {
        match args.first() {
            Some(v @ JsValue::Object(_)) => Completion::Normal(v.clone()),
            _ => match this {
                JsValue::Object(_) => Completion::Normal(this.clone()),
                _ => Completion::Normal(interp.create_object()),
            },
        }
    });

    set_method(interp, &ctor, "keys", 1, |interp, _this, args| {
        let obj = match require_object(interp, args.first(), "Object.keys") {
            Ok(h) => h,
            Err(e) => return Completion::Throw(e),
        };
        let keys: Vec<JsValue> = interp
            .get_object(obj)
            .borrow()
            .properties
            .iter()
            .filter(|(_, d)| d.enumerable)
            .map(|(k, _)| JsValue::String(k.clone()))
            .collect();
        Completion::Normal(interp.create_array(keys))
    });
    set_method(
        interp,
        &ctor,
        "getOwnPropertyNames",
        1,
        |interp, _this, args| {
            let obj = match require_object(interp, args.first(), "Object.getOwnPropertyNames") {
                Ok(h) => h,
                Err(e) => return Completion::Throw(e),
            };
            let keys: Vec<JsValue> = interp
                .get_object(obj)
                .borrow()
                .own_keys()
                .into_iter()
                .map(JsValue::String)
                .collect();
            Completion::Normal(interp.create_array(keys))
        },
    );
    set_method(interp, &ctor, "create", 2, |interp, _this, args| {
        let proto = args.first().cloned().unwrap_or(JsValue::Undefined);
        if !matches!(proto, JsValue::Object(_) | JsValue::Null) {
            return interp
                .throw_type_error("Object prototype may only be an Object or null");
        }
        let obj = interp.create_object_with_proto(&proto);
        Completion::Normal(obj)
    });
    set_method(interp, &ctor, "defineProperty", 3, |interp, _this, args| {
        let target = match require_object(interp, args.first(), "Object.defineProperty") {
            Ok(h) => h,
            Err(e) => return Completion::Throw(e),
        };
        let key = match interp.to_string_value(args.get(1).unwrap_or(&JsValue::Undefined)) {
            Ok(k) => k,
            Err(e) => return Completion::Throw(e),
        };
        let Some(JsValue::Object(desc_h)) = args.get(2) else {
            return interp.throw_type_error("Property description must be an object");
        };
        let desc = {
            let desc_obj = interp.get_object(desc_h.id);
            let d = desc_obj.borrow();
            PropertyDescriptor {
                value: d.get_property("value"),
                writable: super::super::helpers::to_boolean(&d.get_property("writable")),
                enumerable: super::super::helpers::to_boolean(&d.get_property("enumerable")),
                configurable: super::super::helpers::to_boolean(&d.get_property("configurable")),
            }
        };
        let defined = interp
            .get_object(target)
            .borrow_mut()
            .define_own_property(key.clone(), desc);
        if !defined {
            return interp.throw_type_error(&format!("Cannot redefine property: {key}"));
        }
        Completion::Normal(JsValue::Object(crate::types::JsObject { id: target }))
    });
    set_method(
        interp,
        &ctor,
        "getOwnPropertyDescriptor",
        2,
        |interp, _this, args| {
            let target =
                match require_object(interp, args.first(), "Object.getOwnPropertyDescriptor") {
                    Ok(h) => h,
                    Err(e) => return Completion::Throw(e),
                };
            let key = match interp.to_string_value(args.get(1).unwrap_or(&JsValue::Undefined)) {
                Ok(k) => k,
                Err(e) => return Completion::Throw(e),
            };
            let desc = interp.get_object(target).borrow().get_own_property(&key).cloned();
            let Some(desc) = desc else {
                return Completion::Normal(JsValue::Undefined);
            };
            let out = interp.create_object();
            if let JsValue::Object(h) = &out {
                let obj = interp.get_object(h.id);
                let mut data = obj.borrow_mut();
                data.insert_value("value".to_string(), desc.value);
                data.insert_value("writable".to_string(), JsValue::Boolean(desc.writable));
                data.insert_value("enumerable".to_string(), JsValue::Boolean(desc.enumerable));
                data.insert_value(
                    "configurable".to_string(),
                    JsValue::Boolean(desc.configurable),
                );
            }
            Completion::Normal(out)
        },
    );
    set_method(interp, &ctor, "getPrototypeOf", 1, |interp, _this, args| {
        let target = match require_object(interp, args.first(), "Object.getPrototypeOf") {
            Ok(h) => h,
            Err(e) => return Completion::Throw(e),
        };
        let proto = interp.get_object(target).borrow().prototype.clone();
        Completion::Normal(match proto.and_then(|p| p.borrow().id) {
            Some(id) => JsValue::Object(crate::types::JsObject { id }),
            None => JsValue::Null,
        })
    });
    set_method(interp, &ctor, "setPrototypeOf", 2, |interp, _this, args| {
        let target = args.first().cloned().unwrap_or(JsValue::Undefined);
        let proto = args.get(1).cloned().unwrap_or(JsValue::Undefined);
        match interp.set_prototype_of(&target, &proto) {
            Ok(()) => Completion::Normal(target),
            Err(e) => Completion::Throw(e),
        }
    });
}

fn require_object(
    interp: &mut Interpreter,
    value: Option<&JsValue>,
    who: &str,
) -> Result<u64, JsValue> {
    match value {
        Some(JsValue::Object(h)) => Ok(h.id),
        _ => Err(interp.create_type_error(&format!("{who} called on non-object"))),
    }
}
