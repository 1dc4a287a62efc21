//! Expression evaluation, including the call and construct paths.

use crate::ast::*;
use crate::types::{JsValue, number_ops};

use super::Interpreter;
use super::helpers::{PrimitiveHint, strict_equality, to_boolean};
use super::types::{
    BindingKind, CallForm, Completion, EnvRef, Environment, JsFunction, ThisMode,
};

/// Unwraps `Result<T, Completion>`, propagating the abrupt completion.
macro_rules! tryv {
    ($e:expr) => {
        match $e {
            Ok(v) => v,
            Err(completion) => return completion,
        }
    };
}

/// Unwraps `Result<T, JsValue>` where the error is a thrown value.
macro_rules! tryt {
    ($e:expr) => {
        match $e {
            Ok(v) => v,
            Err(thrown) => return $crate::interpreter::Completion::Throw(thrown),
        }
    };
}

pub(crate) use tryv;

const MAX_CALL_DEPTH: usize = 256;

impl Interpreter {
    /// `eval_expr` flattened into a `Result` so callers can use `?` and the
    /// `tryv!` macro.
    pub(crate) fn eval_value(
        &mut self,
        expr: &Expression,
        env: &EnvRef,
    ) -> Result<JsValue, Completion> {
        match self.eval_expr(expr, env) {
            Completion::Normal(v) => Ok(v),
            other => Err(other),
        }
    }

    pub(crate) fn eval_expr(&mut self, expr: &Expression, env: &EnvRef) -> Completion {
        match expr {
            Expression::Literal(lit) => Completion::Normal(match lit {
                Literal::Null => JsValue::Null,
                Literal::Boolean(b) => JsValue::Boolean(*b),
                Literal::Number(n) => JsValue::Number(*n),
                Literal::String(s) => JsValue::String(s.clone()),
            }),
            Expression::Identifier(name) => {
                let result = env.borrow().lookup(name);
                match result {
                    Ok(v) => Completion::Normal(v),
                    Err(e) => {
                        let err = self.env_error_value(e);
                        Completion::Throw(err)
                    }
                }
            }
            Expression::This => match env.borrow().lookup("this") {
                Ok(v) => Completion::Normal(v),
                Err(_) => Completion::Normal(JsValue::Undefined),
            },
            Expression::Array(elements) => self.eval_array_literal(elements, env),
            Expression::Object(props) => self.eval_object_literal(props, env),
            Expression::Function(f) => self.eval_function_expr(f, env),
            Expression::ArrowFunction(f) => self.eval_arrow(f, env),
            Expression::Unary(op, e) => {
                let v = tryv!(self.eval_value(e, env));
                match op {
                    UnaryOp::Minus => {
                        let n = tryt!(self.to_number_value(&v));
                        Completion::Normal(JsValue::Number(-n))
                    }
                    UnaryOp::Plus => {
                        let n = tryt!(self.to_number_value(&v));
                        Completion::Normal(JsValue::Number(n))
                    }
                    UnaryOp::Not => Completion::Normal(JsValue::Boolean(!to_boolean(&v))),
                    UnaryOp::BitNot => {
                        let n = tryt!(self.to_number_value(&v));
                        Completion::Normal(JsValue::Number(!number_ops::to_int32(n) as f64))
                    }
                }
            }
            Expression::Typeof(e) => self.eval_typeof(e, env),
            Expression::Void(e) => {
                tryv!(self.eval_value(e, env));
                Completion::Normal(JsValue::Undefined)
            }
            Expression::Delete(e) => self.eval_delete(e, env),
            Expression::Update(op, prefix, target) => self.eval_update(*op, *prefix, target, env),
            Expression::Binary(op, l, r) => {
                let left = tryv!(self.eval_value(l, env));
                let right = tryv!(self.eval_value(r, env));
                let result = tryt!(self.eval_binary_op(*op, &left, &right));
                Completion::Normal(result)
            }
            Expression::Logical(op, l, r) => {
                let left = tryv!(self.eval_value(l, env));
                match op {
                    LogicalOp::And => {
                        if to_boolean(&left) {
                            self.eval_expr(r, env)
                        } else {
                            Completion::Normal(left)
                        }
                    }
                    LogicalOp::Or => {
                        if to_boolean(&left) {
                            Completion::Normal(left)
                        } else {
                            self.eval_expr(r, env)
                        }
                    }
                }
            }
            Expression::Assign(op, target, value) => self.eval_assign(*op, target, value, env),
            Expression::Conditional(test, cons, alt) => {
                let t = tryv!(self.eval_value(test, env));
                if to_boolean(&t) {
                    self.eval_expr(cons, env)
                } else {
                    self.eval_expr(alt, env)
                }
            }
            Expression::Call(callee, args) => self.eval_call(callee, args, env),
            Expression::New(callee, args) => self.eval_new(callee, args, env),
            Expression::Member(obj, prop) => {
                let obj_value = tryv!(self.eval_value(obj, env));
                let key = tryv!(self.member_key(prop, env));
                let value = tryt!(self.get_value_property(&obj_value, &key));
                Completion::Normal(value)
            }
            Expression::Sequence(exprs) => {
                let mut last = JsValue::Undefined;
                for e in exprs {
                    last = tryv!(self.eval_value(e, env));
                }
                Completion::Normal(last)
            }
        }
    }

    fn eval_array_literal(&mut self, elements: &[Option<Expression>], env: &EnvRef) -> Completion {
        let arr = self.create_array(vec![]);
        let JsValue::Object(handle) = arr else {
            return Completion::Normal(arr);
        };
        for (i, element) in elements.iter().enumerate() {
            if let Some(e) = element {
                let v = tryv!(self.eval_value(e, env));
                self.set_object_property(handle, &i.to_string(), v);
            }
        }
        // trailing holes still count toward length
        self.set_object_property(handle, "length", JsValue::Number(elements.len() as f64));
        Completion::Normal(JsValue::Object(handle))
    }

    fn eval_object_literal(&mut self, props: &[Property], env: &EnvRef) -> Completion {
        let obj = self.create_object();
        let JsValue::Object(handle) = obj else {
            return Completion::Normal(obj);
        };
        for prop in props {
            let key = match &prop.key {
                PropertyKey::Identifier(s) | PropertyKey::String(s) => s.clone(),
                PropertyKey::Number(n) => number_ops::to_string(*n),
            };
            let value = tryv!(self.eval_value(&prop.value, env));
            self.set_object_property(handle, &key, value);
        }
        Completion::Normal(JsValue::Object(handle))
    }

    /// A named function expression sees its own name as an immutable binding
    /// in a scope wedged between the closure and the body.
    fn eval_function_expr(&mut self, f: &FunctionExpr, env: &EnvRef) -> Completion {
        let scope = match &f.name {
            Some(_) => Environment::new(Some(env.clone())),
            None => env.clone(),
        };
        let func = self.create_function(JsFunction::User {
            name: f.name.clone(),
            params: f.params.clone(),
            body: f.body.clone(),
            closure: scope.clone(),
            this_mode: ThisMode::Normal,
        });
        if let Some(name) = &f.name {
            scope
                .borrow_mut()
                .define(name, BindingKind::Const, func.clone());
        }
        Completion::Normal(func)
    }

    fn eval_arrow(&mut self, f: &ArrowFunction, env: &EnvRef) -> Completion {
        let body = match &f.body {
            ArrowBody::Block(stmts) => stmts.clone(),
            ArrowBody::Expression(e) => vec![Statement::new(StatementKind::Return(Some(
                (**e).clone(),
            )))],
        };
        let func = self.create_function(JsFunction::User {
            name: None,
            params: f.params.clone(),
            body,
            closure: env.clone(),
            this_mode: ThisMode::Arrow,
        });
        Completion::Normal(func)
    }

    /// `typeof` tolerates an unresolved identifier but not a dead-zone one.
    fn eval_typeof(&mut self, e: &Expression, env: &EnvRef) -> Completion {
        if let Expression::Identifier(name) = e {
            let result = env.borrow().lookup(name);
            return match result {
                Ok(v) => Completion::Normal(JsValue::String(self.typeof_value(&v).to_string())),
                Err(super::types::EnvError::NotFound(_)) => {
                    Completion::Normal(JsValue::String("undefined".to_string()))
                }
                Err(err) => {
                    let thrown = self.env_error_value(err);
                    Completion::Throw(thrown)
                }
            };
        }
        let v = tryv!(self.eval_value(e, env));
        Completion::Normal(JsValue::String(self.typeof_value(&v).to_string()))
    }

    fn eval_delete(&mut self, e: &Expression, env: &EnvRef) -> Completion {
        match e {
            Expression::Member(obj_expr, prop) => {
                let obj = tryv!(self.eval_value(obj_expr, env));
                let key = tryv!(self.member_key(prop, env));
                match obj {
                    JsValue::Object(h) => {
                        let rc = self.get_object(h.id);
                        let configurable = rc
                            .borrow()
                            .get_own_property(&key)
                            .map(|d| d.configurable)
                            .unwrap_or(true);
                        if configurable {
                            rc.borrow_mut().remove_property(&key);
                            Completion::Normal(JsValue::Boolean(true))
                        } else {
                            Completion::Normal(JsValue::Boolean(false))
                        }
                    }
                    _ => Completion::Normal(JsValue::Boolean(true)),
                }
            }
            // bindings are not deletable
            Expression::Identifier(_) => Completion::Normal(JsValue::Boolean(false)),
            _ => Completion::Normal(JsValue::Boolean(true)),
        }
    }

    fn eval_update(
        &mut self,
        op: UpdateOp,
        prefix: bool,
        target: &Expression,
        env: &EnvRef,
    ) -> Completion {
        let delta = match op {
            UpdateOp::Increment => 1.0,
            UpdateOp::Decrement => -1.0,
        };
        match target {
            Expression::Identifier(name) => {
                let old = {
                    let result = env.borrow().lookup(name);
                    tryt!(result.map_err(|e| self.env_error_value(e)))
                };
                let old_num = tryt!(self.to_number_value(&old));
                let new_num = old_num + delta;
                let result = env.borrow_mut().assign(name, JsValue::Number(new_num));
                tryt!(result.map_err(|e| self.env_error_value(e)));
                Completion::Normal(JsValue::Number(if prefix { new_num } else { old_num }))
            }
            Expression::Member(obj_expr, prop) => {
                let obj = tryv!(self.eval_value(obj_expr, env));
                let key = tryv!(self.member_key(prop, env));
                let old = tryt!(self.get_value_property(&obj, &key));
                let old_num = tryt!(self.to_number_value(&old));
                let new_num = old_num + delta;
                tryt!(self.set_value_property(&obj, &key, JsValue::Number(new_num)));
                Completion::Normal(JsValue::Number(if prefix { new_num } else { old_num }))
            }
            _ => {
                let err =
                    self.create_syntax_error("Invalid left-hand side expression in update");
                Completion::Throw(err)
            }
        }
    }

    fn eval_assign(
        &mut self,
        op: AssignOp,
        target: &Expression,
        value_expr: &Expression,
        env: &EnvRef,
    ) -> Completion {
        match target {
            Expression::Identifier(name) => {
                let value = match op.binary_op() {
                    None => tryv!(self.eval_value(value_expr, env)),
                    Some(bin) => {
                        let old = {
                            let result = env.borrow().lookup(name);
                            tryt!(result.map_err(|e| self.env_error_value(e)))
                        };
                        let rhs = tryv!(self.eval_value(value_expr, env));
                        tryt!(self.eval_binary_op(bin, &old, &rhs))
                    }
                };
                let result = env.borrow_mut().assign(name, value.clone());
                tryt!(result.map_err(|e| self.env_error_value(e)));
                Completion::Normal(value)
            }
            Expression::Member(obj_expr, prop) => {
                let obj = tryv!(self.eval_value(obj_expr, env));
                let key = tryv!(self.member_key(prop, env));
                let value = match op.binary_op() {
                    None => tryv!(self.eval_value(value_expr, env)),
                    Some(bin) => {
                        let old = tryt!(self.get_value_property(&obj, &key));
                        let rhs = tryv!(self.eval_value(value_expr, env));
                        tryt!(self.eval_binary_op(bin, &old, &rhs))
                    }
                };
                tryt!(self.set_value_property(&obj, &key, value.clone()));
                Completion::Normal(value)
            }
            _ => {
                let err = self.create_syntax_error("Invalid assignment target");
                Completion::Throw(err)
            }
        }
    }

    fn member_key(&mut self, prop: &MemberProperty, env: &EnvRef) -> Result<String, Completion> {
        match prop {
            MemberProperty::Dot(name) => Ok(name.clone()),
            MemberProperty::Computed(e) => {
                let v = self.eval_value(e, env)?;
                self.to_string_value(&v).map_err(Completion::Throw)
            }
        }
    }

    /// Property read on an arbitrary value. Strings expose `length` and
    /// character indexing; null/undefined receivers are a TypeError.
    pub(crate) fn get_value_property(
        &mut self,
        value: &JsValue,
        key: &str,
    ) -> Result<JsValue, JsValue> {
        match value {
            JsValue::Object(h) => Ok(self.get_object(h.id).borrow().get_property(key)),
            JsValue::String(s) => {
                if key == "length" {
                    return Ok(JsValue::Number(s.chars().count() as f64));
                }
                if let Ok(i) = key.parse::<usize>() {
                    return Ok(s
                        .chars()
                        .nth(i)
                        .map(|c| JsValue::String(c.to_string()))
                        .unwrap_or(JsValue::Undefined));
                }
                Ok(JsValue::Undefined)
            }
            JsValue::Number(_) | JsValue::Boolean(_) => Ok(JsValue::Undefined),
            JsValue::Undefined | JsValue::Null => {
                let kind = if value.is_null() { "null" } else { "undefined" };
                Err(self.create_type_error(&format!(
                    "Cannot read properties of {kind} (reading '{key}')"
                )))
            }
        }
    }

    fn set_value_property(
        &mut self,
        target: &JsValue,
        key: &str,
        value: JsValue,
    ) -> Result<(), JsValue> {
        match target {
            JsValue::Object(h) => {
                self.set_object_property(*h, key, value);
                Ok(())
            }
            JsValue::Undefined | JsValue::Null => {
                let kind = if target.is_null() { "null" } else { "undefined" };
                Err(self.create_type_error(&format!(
                    "Cannot set properties of {kind} (setting '{key}')"
                )))
            }
            // writes through primitive receivers are dropped
            _ => Ok(()),
        }
    }

    fn eval_call(&mut self, callee: &Expression, args: &[Expression], env: &EnvRef) -> Completion {
        let (func, form, label) = match callee {
            Expression::Member(obj_expr, prop) => {
                let obj = tryv!(self.eval_value(obj_expr, env));
                let key = tryv!(self.member_key(prop, env));
                let func = tryt!(self.get_value_property(&obj, &key));
                (func, CallForm::Method(obj), key)
            }
            _ => {
                let func = tryv!(self.eval_value(callee, env));
                let label = match callee {
                    Expression::Identifier(n) => n.clone(),
                    _ => "expression".to_string(),
                };
                (func, CallForm::Plain, label)
            }
        };
        // arguments evaluate before the callee is checked
        let mut argv = Vec::with_capacity(args.len());
        for a in args {
            argv.push(tryv!(self.eval_value(a, env)));
        }
        if !self.is_callable(&func) {
            return self.throw_type_error(&format!("{label} is not a function"));
        }
        self.call_function(&func, form, &argv)
    }

    fn eval_new(&mut self, callee: &Expression, args: &[Expression], env: &EnvRef) -> Completion {
        let ctor = tryv!(self.eval_value(callee, env));
        let mut argv = Vec::with_capacity(args.len());
        for a in args {
            argv.push(tryv!(self.eval_value(a, env)));
        }
        let label = match callee {
            Expression::Identifier(n) => n.clone(),
            _ => "expression".to_string(),
        };
        if !self.is_callable(&ctor) {
            return self.throw_type_error(&format!("{label} is not a constructor"));
        }
        if let JsValue::Object(h) = &ctor {
            let obj = self.get_object(h.id);
            let is_arrow = matches!(
                &obj.borrow().callable,
                Some(JsFunction::User {
                    this_mode: ThisMode::Arrow,
                    ..
                })
            );
            if is_arrow {
                return self.throw_type_error(&format!("{label} is not a constructor"));
            }
        }
        let proto = tryt!(self.get_value_property(&ctor, "prototype"));
        let proto = if proto.is_object() {
            proto
        } else {
            self.object_prototype.clone()
        };
        let new_obj = self.create_object_with_proto(&proto);
        match self.call_function(&ctor, CallForm::Construct(new_obj.clone()), &argv) {
            // a body returning an object overrides the fresh instance
            Completion::Normal(v) if v.is_object() => Completion::Normal(v),
            Completion::Normal(_) => Completion::Normal(new_obj),
            other => other,
        }
    }

    /// Shared call path for every call form. Bound functions unwrap to their
    /// target with the stored `this` and leading arguments; user functions
    /// run their body in a fresh environment child of the closure scope.
    pub(crate) fn call_function(
        &mut self,
        callee: &JsValue,
        form: CallForm,
        args: &[JsValue],
    ) -> Completion {
        let JsValue::Object(handle) = callee else {
            return self.throw_type_error("called value is not a function");
        };
        let obj = self.get_object(handle.id);
        let bound = obj.borrow().bound.clone();
        if let Some(b) = bound {
            let mut all = b.bound_args.clone();
            all.extend_from_slice(args);
            let inner_form = match form {
                CallForm::Construct(_) => form,
                _ => CallForm::Method(b.this_val.clone()),
            };
            return self.call_function(&b.target, inner_form, &all);
        }
        let callable = obj.borrow().callable.clone();
        let Some(function) = callable else {
            return self.throw_type_error("called value is not a function");
        };
        if self.call_stack_envs.len() >= MAX_CALL_DEPTH {
            let err = self.create_range_error("Maximum call stack size exceeded");
            return Completion::Throw(err);
        }
        match function {
            JsFunction::Native(_, _, f) => {
                let this = form.this_value();
                f(self, &this, args)
            }
            JsFunction::User {
                params,
                body,
                closure,
                this_mode,
                ..
            } => {
                let func_env = Environment::new(Some(closure));
                if this_mode == ThisMode::Normal {
                    func_env
                        .borrow_mut()
                        .define("this", BindingKind::Const, form.this_value());
                }
                for (i, param) in params.iter().enumerate() {
                    let v = args.get(i).cloned().unwrap_or(JsValue::Undefined);
                    func_env.borrow_mut().define(param, BindingKind::Var, v);
                }
                self.call_stack_envs.push(func_env.clone());
                let result = self.exec_function_body(&body, &func_env);
                self.call_stack_envs.pop();
                match result {
                    Completion::Return(v) => Completion::Normal(v),
                    // falling off the end yields undefined
                    Completion::Normal(_) => Completion::Normal(JsValue::Undefined),
                    Completion::Throw(v) => Completion::Throw(v),
                    Completion::Break(_) | Completion::Continue(_) => {
                        let err = self.create_syntax_error("Illegal break statement");
                        Completion::Throw(err)
                    }
                }
            }
        }
    }

    pub(crate) fn eval_binary_op(
        &mut self,
        op: BinaryOp,
        left: &JsValue,
        right: &JsValue,
    ) -> Result<JsValue, JsValue> {
        match op {
            BinaryOp::Add => {
                let pl = self.to_primitive(left, PrimitiveHint::Number)?;
                let pr = self.to_primitive(right, PrimitiveHint::Number)?;
                if pl.is_string() || pr.is_string() {
                    let mut s = self.to_string_value(&pl)?;
                    s.push_str(&self.to_string_value(&pr)?);
                    Ok(JsValue::String(s))
                } else {
                    let a = self.to_number_value(&pl)?;
                    let b = self.to_number_value(&pr)?;
                    Ok(JsValue::Number(a + b))
                }
            }
            BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
                let a = self.to_number_value(left)?;
                let b = self.to_number_value(right)?;
                Ok(JsValue::Number(match op {
                    BinaryOp::Sub => a - b,
                    BinaryOp::Mul => a * b,
                    BinaryOp::Div => a / b,
                    _ => a % b,
                }))
            }
            BinaryOp::Eq => Ok(JsValue::Boolean(self.loose_equals(left, right)?)),
            BinaryOp::NotEq => Ok(JsValue::Boolean(!self.loose_equals(left, right)?)),
            BinaryOp::StrictEq => Ok(JsValue::Boolean(strict_equality(left, right))),
            BinaryOp::StrictNotEq => Ok(JsValue::Boolean(!strict_equality(left, right))),
            BinaryOp::Lt => {
                let r = self.compare_relational(left, right)?;
                Ok(JsValue::Boolean(r.unwrap_or(false)))
            }
            BinaryOp::Gt => {
                let r = self.compare_relational(right, left)?;
                Ok(JsValue::Boolean(r.unwrap_or(false)))
            }
            BinaryOp::LtEq => {
                let r = self.compare_relational(right, left)?;
                Ok(JsValue::Boolean(r == Some(false)))
            }
            BinaryOp::GtEq => {
                let r = self.compare_relational(left, right)?;
                Ok(JsValue::Boolean(r == Some(false)))
            }
            BinaryOp::LShift | BinaryOp::RShift | BinaryOp::BitAnd | BinaryOp::BitOr
            | BinaryOp::BitXor => {
                let a = number_ops::to_int32(self.to_number_value(left)?);
                let b = self.to_number_value(right)?;
                let result = match op {
                    BinaryOp::LShift => a << (number_ops::to_uint32(b) & 31),
                    BinaryOp::RShift => a >> (number_ops::to_uint32(b) & 31),
                    BinaryOp::BitAnd => a & number_ops::to_int32(b),
                    BinaryOp::BitOr => a | number_ops::to_int32(b),
                    _ => a ^ number_ops::to_int32(b),
                };
                Ok(JsValue::Number(result as f64))
            }
            BinaryOp::URShift => {
                let a = number_ops::to_uint32(self.to_number_value(left)?);
                let shift = number_ops::to_uint32(self.to_number_value(right)?) & 31;
                Ok(JsValue::Number((a >> shift) as f64))
            }
            BinaryOp::In => {
                let JsValue::Object(h) = right else {
                    return Err(self.create_type_error(
                        "Cannot use 'in' operator to search for property in non-object",
                    ));
                };
                let key = self.to_string_value(left)?;
                Ok(JsValue::Boolean(
                    self.get_object(h.id).borrow().has_property(&key),
                ))
            }
            BinaryOp::Instanceof => {
                Ok(JsValue::Boolean(self.instanceof_value(left, right)?))
            }
        }
    }
}
