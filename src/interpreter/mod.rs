//! Tree-walking evaluator. The `Interpreter` owns the object arena, the
//! global environment, and the intrinsic prototypes; evaluation threads
//! `Completion` values through statements and expressions.

mod builtins;
mod eval;
mod exec;
mod gc;
mod helpers;
mod types;

use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;

use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::ast::{Position, Program};
use crate::types::{JsObject, JsValue, number_ops};

pub use helpers::strict_equality;
pub use types::{Completion, EnvRef, Environment, JsFunction, JsObjectData, PropertyDescriptor};

use types::BindingKind;

/// Selects which optional built-in families are installed into the global
/// environment. The core catalog (Object, Array, Function.prototype, the
/// error constructors, conversion functions) is always present.
#[derive(Clone, Copy, Debug)]
pub struct GlobalsConfig {
    pub console: bool,
    pub math: bool,
}

impl Default for GlobalsConfig {
    fn default() -> Self {
        GlobalsConfig {
            console: true,
            math: true,
        }
    }
}

/// A throw completion that escaped the program. The thrown value is kept
/// alongside the rendered message so embedders can inspect it.
#[derive(Debug, Error)]
#[error("Uncaught {message}")]
pub struct UncaughtException {
    pub message: String,
    pub value: JsValue,
    pub position: Option<Position>,
}

pub struct Interpreter {
    /// Object arena. `None` slots were freed by the collector and are
    /// reusable through `free_list`.
    pub(crate) objects: Vec<Option<Rc<RefCell<JsObjectData>>>>,
    pub(crate) free_list: Vec<usize>,
    pub(crate) gc_alloc_count: usize,

    pub(crate) global_env: EnvRef,
    /// Environments of the active call frames; GC roots while a collection
    /// runs mid-call.
    pub(crate) call_stack_envs: Vec<EnvRef>,
    /// Extra GC roots for values held only on the Rust side, such as the
    /// running program result between top-level statements.
    pub(crate) gc_temp_roots: Vec<JsValue>,

    pub(crate) object_prototype: JsValue,
    pub(crate) function_prototype: JsValue,
    pub(crate) array_prototype: JsValue,
    /// Keyed by constructor name ("Error", "TypeError", ...).
    pub(crate) error_prototypes: FxHashMap<String, JsValue>,

    pub(crate) console_out: Rc<RefCell<Box<dyn Write>>>,
    pub(crate) current_pos: Option<Position>,
}

impl Interpreter {
    pub fn new() -> Self {
        Self::with_config(GlobalsConfig::default())
    }

    pub fn with_config(config: GlobalsConfig) -> Self {
        let mut interp = Interpreter {
            objects: Vec::new(),
            free_list: Vec::new(),
            gc_alloc_count: 0,
            global_env: Environment::new(None),
            call_stack_envs: Vec::new(),
            gc_temp_roots: Vec::new(),
            object_prototype: JsValue::Undefined,
            function_prototype: JsValue::Undefined,
            array_prototype: JsValue::Undefined,
            error_prototypes: FxHashMap::default(),
            console_out: Rc::new(RefCell::new(Box::new(std::io::stdout()))),
            current_pos: None,
        };
        builtins::setup_globals(&mut interp, config);
        interp
    }

    /// Redirects `console.log`/`console.error` output, returning the
    /// previous sink.
    pub fn set_console_output(&mut self, sink: Box<dyn Write>) -> Box<dyn Write> {
        self.console_out.replace(sink)
    }

    /// Runs a whole program in the global environment. The result of a
    /// normal completion is the value of the last expression statement.
    pub fn run(&mut self, program: &Program) -> Completion {
        log::debug!("running program, {} top-level statements", program.body.len());
        let env = self.global_env.clone();
        if let Err(e) = self.hoist_vars(&program.body, &env) {
            return Completion::Throw(e);
        }
        match self.exec_program(&program.body, &env) {
            Completion::Break(_) => {
                let err = self.create_syntax_error("Illegal break statement");
                Completion::Throw(err)
            }
            Completion::Continue(_) => {
                let err = self.create_syntax_error("Illegal continue statement");
                Completion::Throw(err)
            }
            other => other,
        }
    }

    /// Library entry point: runs the program and maps an escaping throw to a
    /// typed host error.
    pub fn evaluate(&mut self, program: &Program) -> Result<JsValue, UncaughtException> {
        match self.run(program) {
            Completion::Normal(v) | Completion::Return(v) => Ok(v),
            Completion::Throw(value) => Err(UncaughtException {
                message: self.render_thrown(&value),
                value,
                position: self.current_pos,
            }),
            // break/continue outside a loop is rejected during execution,
            // so these cannot reach the top level
            Completion::Break(_) | Completion::Continue(_) => Ok(JsValue::Undefined),
        }
    }

    pub(crate) fn get_object(&self, id: u64) -> Rc<RefCell<JsObjectData>> {
        match self.objects.get(id as usize) {
            Some(Some(obj)) => obj.clone(),
            _ => unreachable!("stale object handle {id}"),
        }
    }

    fn proto_rc(&self, proto: &JsValue) -> Option<Rc<RefCell<JsObjectData>>> {
        match proto {
            JsValue::Object(h) => Some(self.get_object(h.id)),
            _ => None,
        }
    }

    /// Allocates an object with no prototype. Used during global setup
    /// before the intrinsic prototypes exist.
    pub(crate) fn create_object_raw(&mut self) -> JsValue {
        self.alloc(JsObjectData::new())
    }

    /// Ordinary object creation: fresh object inheriting Object.prototype.
    pub fn create_object(&mut self) -> JsValue {
        let mut data = JsObjectData::new();
        data.prototype = self.proto_rc(&self.object_prototype.clone());
        self.alloc(data)
    }

    pub(crate) fn create_object_with_proto(&mut self, proto: &JsValue) -> JsValue {
        let mut data = JsObjectData::new();
        data.prototype = self.proto_rc(proto);
        self.alloc(data)
    }

    /// Wraps a function in a callable object. User functions get an own
    /// `prototype` object with a `constructor` back-reference, which is what
    /// `new` instances inherit from.
    pub fn create_function(&mut self, function: JsFunction) -> JsValue {
        let is_constructor = matches!(
            &function,
            JsFunction::User {
                this_mode: types::ThisMode::Normal,
                ..
            }
        );
        let (name, arity) = match &function {
            JsFunction::User { name, params, .. } => {
                (name.clone().unwrap_or_default(), params.len())
            }
            JsFunction::Native(name, arity, _) => (name.clone(), *arity),
        };
        let mut data = JsObjectData::new();
        data.class_name = "Function".to_string();
        data.prototype = self.proto_rc(&self.function_prototype.clone());
        data.callable = Some(function);
        data.insert_property(
            "name".to_string(),
            PropertyDescriptor::data(JsValue::String(name), false, false, true),
        );
        data.insert_property(
            "length".to_string(),
            PropertyDescriptor::data(JsValue::Number(arity as f64), false, false, true),
        );
        let func_val = self.alloc(data);

        if is_constructor {
            let proto_obj = self.create_object();
            if let JsValue::Object(h) = &proto_obj {
                self.get_object(h.id)
                    .borrow_mut()
                    .insert_builtin("constructor".to_string(), func_val.clone());
            }
            if let JsValue::Object(h) = &func_val {
                self.get_object(h.id).borrow_mut().insert_property(
                    "prototype".to_string(),
                    PropertyDescriptor::data(proto_obj, true, false, false),
                );
            }
        }
        func_val
    }

    pub fn create_array(&mut self, elements: Vec<JsValue>) -> JsValue {
        let mut data = JsObjectData::new();
        data.class_name = "Array".to_string();
        data.prototype = self.proto_rc(&self.array_prototype.clone());
        let len = elements.len();
        for (i, element) in elements.into_iter().enumerate() {
            data.insert_value(i.to_string(), element);
        }
        data.insert_property(
            "length".to_string(),
            PropertyDescriptor::data(JsValue::Number(len as f64), true, false, false),
        );
        self.alloc(data)
    }

    /// Builds an error object of the named family with `name`/`message`
    /// own properties and the family prototype.
    pub(crate) fn create_error(&mut self, kind: &str, message: &str) -> JsValue {
        let proto = self
            .error_prototypes
            .get(kind)
            .cloned()
            .unwrap_or(JsValue::Undefined);
        let err = self.create_object_with_proto(&proto);
        if let JsValue::Object(h) = &err {
            let obj = self.get_object(h.id);
            let mut data = obj.borrow_mut();
            data.class_name = "Error".to_string();
            data.insert_builtin("name".to_string(), JsValue::String(kind.to_string()));
            data.insert_builtin("message".to_string(), JsValue::String(message.to_string()));
        }
        err
    }

    pub(crate) fn create_type_error(&mut self, message: &str) -> JsValue {
        self.create_error("TypeError", message)
    }

    pub(crate) fn create_reference_error(&mut self, message: &str) -> JsValue {
        self.create_error("ReferenceError", message)
    }

    pub(crate) fn create_range_error(&mut self, message: &str) -> JsValue {
        self.create_error("RangeError", message)
    }

    pub(crate) fn create_syntax_error(&mut self, message: &str) -> JsValue {
        self.create_error("SyntaxError", message)
    }

    pub(crate) fn throw_type_error(&mut self, message: &str) -> Completion {
        let err = self.create_type_error(message);
        Completion::Throw(err)
    }

    /// Property write with array `length` upkeep: indexed writes past the
    /// end grow `length`, and shrinking `length` drops the elements beyond
    /// the new bound.
    pub(crate) fn set_object_property(&mut self, handle: JsObject, key: &str, value: JsValue) {
        let obj = self.get_object(handle.id);
        let is_array = obj.borrow().class_name == "Array";
        if is_array {
            if key == "length" {
                if let JsValue::Number(n) = value {
                    let new_len = number_ops::to_uint32(n);
                    self.truncate_array(&obj, new_len);
                    obj.borrow_mut()
                        .set_property_value("length", JsValue::Number(new_len as f64));
                }
                return;
            }
            // an array index is at most 2^32 - 2; "4294967295" is a plain key
            if let Ok(index) = key.parse::<u32>()
                && index != u32::MAX
            {
                let mut data = obj.borrow_mut();
                data.set_property_value(key, value);
                let old_len = match data.get_property("length") {
                    JsValue::Number(n) => number_ops::to_uint32(n),
                    _ => 0,
                };
                if index >= old_len {
                    data.set_property_value("length", JsValue::Number((index + 1) as f64));
                }
                return;
            }
        }
        obj.borrow_mut().set_property_value(key, value);
    }

    fn truncate_array(&self, obj: &Rc<RefCell<JsObjectData>>, new_len: u32) {
        let doomed: Vec<String> = obj
            .borrow()
            .properties
            .keys()
            .filter(|k| matches!(k.parse::<u32>(), Ok(i) if i != u32::MAX && i >= new_len))
            .cloned()
            .collect();
        let mut data = obj.borrow_mut();
        for key in doomed {
            data.remove_property(&key);
        }
    }

    /// [[SetPrototypeOf]] with cycle rejection: walking the proposed chain
    /// must never come back to the target.
    pub(crate) fn set_prototype_of(
        &mut self,
        target: &JsValue,
        proto: &JsValue,
    ) -> Result<(), JsValue> {
        let JsValue::Object(target_handle) = target else {
            return Err(self.create_type_error("Object.setPrototypeOf called on non-object"));
        };
        let proto_rc = match proto {
            JsValue::Null => None,
            JsValue::Object(h) => Some(self.get_object(h.id)),
            _ => {
                return Err(
                    self.create_type_error("Object prototype may only be an Object or null")
                );
            }
        };
        let mut cursor = proto_rc.clone();
        while let Some(link) = cursor {
            if link.borrow().id == Some(target_handle.id) {
                return Err(self.create_type_error("Cyclic prototype chain"));
            }
            let next = link.borrow().prototype.clone();
            cursor = next;
        }
        let target_obj = self.get_object(target_handle.id);
        if !target_obj.borrow().extensible {
            return Err(self.create_type_error("Object is not extensible"));
        }
        target_obj.borrow_mut().prototype = proto_rc;
        Ok(())
    }

    /// `value instanceof ctor`: walks the value's prototype chain looking
    /// for the constructor's `prototype` object.
    pub(crate) fn instanceof_value(
        &mut self,
        value: &JsValue,
        ctor: &JsValue,
    ) -> Result<bool, JsValue> {
        if !self.is_callable(ctor) {
            return Err(self.create_type_error("Right-hand side of 'instanceof' is not callable"));
        }
        let JsValue::Object(ctor_handle) = ctor else {
            return Err(self.create_type_error("Right-hand side of 'instanceof' is not callable"));
        };
        let proto = self
            .get_object(ctor_handle.id)
            .borrow()
            .get_property("prototype");
        let JsValue::Object(proto_handle) = proto else {
            return Ok(false);
        };
        let JsValue::Object(value_handle) = value else {
            return Ok(false);
        };
        let mut cursor = self.get_object(value_handle.id).borrow().prototype.clone();
        while let Some(link) = cursor {
            if link.borrow().id == Some(proto_handle.id) {
                return Ok(true);
            }
            let next = link.borrow().prototype.clone();
            cursor = next;
        }
        Ok(false)
    }

    /// Installs a native function as a global binding.
    pub fn register_global_fn(
        &mut self,
        name: &str,
        arity: usize,
        f: impl Fn(&mut Interpreter, &JsValue, &[JsValue]) -> Completion + 'static,
    ) {
        let func = self.create_function(JsFunction::native(name.to_string(), arity, f));
        self.global_env
            .borrow_mut()
            .define(name, BindingKind::Const, func);
    }

    pub(crate) fn define_global(&mut self, name: &str, value: JsValue) {
        self.global_env
            .borrow_mut()
            .define(name, BindingKind::Var, value);
    }

    /// Display form used by `console.log` and test assertions. Never calls
    /// back into user code.
    pub fn format_value(&self, value: &JsValue) -> String {
        self.format_value_depth(value, 0, false)
    }

    fn format_value_depth(&self, value: &JsValue, depth: usize, quote_strings: bool) -> String {
        match value {
            JsValue::String(s) if quote_strings => format!("'{s}'"),
            JsValue::Object(handle) => {
                if depth > 2 {
                    return "[Object]".to_string();
                }
                let obj = self.get_object(handle.id);
                let data = obj.borrow();
                if data.callable.is_some() || data.bound.is_some() {
                    let name = match data.get_property("name") {
                        JsValue::String(s) if !s.is_empty() => format!("[Function: {s}]"),
                        _ => "[Function (anonymous)]".to_string(),
                    };
                    return name;
                }
                if data.class_name == "Array" {
                    let len = match data.get_property("length") {
                        JsValue::Number(n) => number_ops::to_uint32(n),
                        _ => 0,
                    };
                    let items: Vec<String> = (0..len)
                        .map(|i| match data.get_own_property(&i.to_string()) {
                            Some(d) => self.format_value_depth(&d.value, depth + 1, true),
                            None => "<empty>".to_string(),
                        })
                        .collect();
                    return format!("[ {} ]", items.join(", "));
                }
                if data.class_name == "Error" {
                    let name = data.get_property("name");
                    let message = data.get_property("message");
                    return match message {
                        JsValue::String(m) if !m.is_empty() => format!("{name}: {m}"),
                        _ => name.to_string(),
                    };
                }
                let entries: Vec<String> = data
                    .properties
                    .iter()
                    .filter(|(_, d)| d.enumerable)
                    .map(|(k, d)| {
                        format!("{k}: {}", self.format_value_depth(&d.value, depth + 1, true))
                    })
                    .collect();
                if entries.is_empty() {
                    "{}".to_string()
                } else {
                    format!("{{ {} }}", entries.join(", "))
                }
            }
            _ => value.to_string(),
        }
    }

    /// Renders an escaping thrown value for `UncaughtException`. Error
    /// objects print as `Name: message`; everything else uses the display
    /// form.
    fn render_thrown(&self, value: &JsValue) -> String {
        if let JsValue::Object(handle) = value {
            let obj = self.get_object(handle.id);
            let data = obj.borrow();
            if data.class_name == "Error" {
                let name = data.get_property("name");
                let message = data.get_property("message");
                return match message {
                    JsValue::String(m) if !m.is_empty() => format!("{name}: {m}"),
                    _ => name.to_string(),
                };
            }
        }
        self.format_value(value)
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::build::*;
    use crate::ast::*;

    pub(crate) fn eval_src_last(stmts: Vec<Statement>) -> JsValue {
        let mut interp = Interpreter::new();
        match interp.run(&program(stmts)) {
            Completion::Normal(v) => v,
            other => panic!("expected normal completion, got {other:?}"),
        }
    }

    #[test]
    fn arena_reuses_freed_slots() {
        let mut interp = Interpreter::new();
        let before = interp.objects.len();
        let _a = interp.create_object();
        assert_eq!(interp.objects.len(), before + 1);
    }

    #[test]
    fn error_objects_carry_name_and_message() {
        let mut interp = Interpreter::new();
        let err = interp.create_type_error("boom");
        let JsValue::Object(h) = &err else {
            panic!("expected object")
        };
        let obj = interp.get_object(h.id);
        assert!(matches!(
            obj.borrow().get_property("name"),
            JsValue::String(s) if s == "TypeError"
        ));
        assert!(matches!(
            obj.borrow().get_property("message"),
            JsValue::String(s) if s == "boom"
        ));
        // inherits Error.prototype.toString through the chain
        assert!(obj.borrow().has_property("toString"));
    }

    #[test]
    fn set_prototype_cycle_rejected() {
        let mut interp = Interpreter::new();
        let a = interp.create_object();
        let b = interp.create_object();
        interp.set_prototype_of(&a, &b).unwrap();
        let err = interp.set_prototype_of(&b, &a).unwrap_err();
        assert_eq!(interp.render_thrown(&err), "TypeError: Cyclic prototype chain");
    }

    #[test]
    fn array_length_tracks_indexed_writes() {
        let mut interp = Interpreter::new();
        let arr = interp.create_array(vec![JsValue::Number(1.0)]);
        let JsValue::Object(h) = arr else {
            panic!("expected array")
        };
        interp.set_object_property(h, "5", JsValue::Number(7.0));
        let obj = interp.get_object(h.id);
        assert!(matches!(
            obj.borrow().get_property("length"),
            JsValue::Number(n) if n == 6.0
        ));
        interp.set_object_property(h, "length", JsValue::Number(1.0));
        assert!(obj.borrow().get_property("5").is_undefined());
        assert!(matches!(
            obj.borrow().get_property("0"),
            JsValue::Number(n) if n == 1.0
        ));
    }

    #[test]
    fn max_u32_key_is_a_plain_property_not_an_index() {
        let mut interp = Interpreter::new();
        let arr = interp.create_array(vec![JsValue::Number(1.0)]);
        let JsValue::Object(h) = arr else {
            panic!("expected array")
        };
        interp.set_object_property(h, "4294967295", JsValue::Number(7.0));
        let obj = interp.get_object(h.id);
        assert!(matches!(
            obj.borrow().get_property("length"),
            JsValue::Number(n) if n == 1.0
        ));
        assert!(matches!(
            obj.borrow().get_property("4294967295"),
            JsValue::Number(n) if n == 7.0
        ));
    }

    #[test]
    fn evaluate_surfaces_uncaught_throw() {
        let mut interp = Interpreter::new();
        let prog = program(vec![Statement::new(StatementKind::Throw(str_("bad")))]);
        let err = interp.evaluate(&prog).unwrap_err();
        assert_eq!(err.message, "bad");
        assert!(matches!(err.value, JsValue::String(s) if s == "bad"));
    }

    #[test]
    fn program_result_is_last_expression_value() {
        let v = eval_src_last(vec![
            decl(VarKind::Let, "x", Some(num(2.0))),
            expr_stmt(binary(BinaryOp::Mul, ident("x"), num(21.0))),
        ]);
        assert!(matches!(v, JsValue::Number(n) if n == 42.0));
    }

    #[test]
    fn format_value_shapes() {
        let mut interp = Interpreter::new();
        let arr = interp.create_array(vec![
            JsValue::Number(1.0),
            JsValue::String("two".to_string()),
        ]);
        assert_eq!(interp.format_value(&arr), "[ 1, 'two' ]");
        let obj = interp.create_object();
        if let JsValue::Object(h) = &obj {
            interp.set_object_property(*h, "a", JsValue::Number(1.0));
        }
        assert_eq!(interp.format_value(&obj), "{ a: 1 }");
        assert_eq!(interp.format_value(&JsValue::Undefined), "undefined");
    }
}
