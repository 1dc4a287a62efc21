//! Mark-and-sweep collection over the object arena and the environment
//! graph. Closures close over environments, environments hold function
//! objects, and objects reference each other through prototypes and
//! properties, so reference counting alone cannot reclaim cycles.

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use log::debug;

use crate::types::{JsObject, JsValue};

use super::Interpreter;
use super::types::{Environment, EnvRef, GC_THRESHOLD, JsFunction, JsObjectData};

impl Interpreter {
    /// Places an object into the arena, reusing a freed slot when one is
    /// available, and hands back its value handle.
    pub(crate) fn alloc(&mut self, mut data: JsObjectData) -> JsValue {
        let index = match self.free_list.pop() {
            Some(index) => index,
            None => {
                self.objects.push(None);
                self.objects.len() - 1
            }
        };
        data.id = Some(index as u64);
        self.objects[index] = Some(Rc::new(RefCell::new(data)));
        self.gc_alloc_count += 1;
        JsValue::Object(JsObject { id: index as u64 })
    }

    /// Collection trigger. Only called from safe points (top-level statement
    /// boundaries) where no expression is mid-flight holding handles outside
    /// the root set. Statements inside loops and callees allocate freely and
    /// are collected at the next safe point.
    pub(crate) fn maybe_gc(&mut self) {
        if self.gc_alloc_count >= GC_THRESHOLD {
            self.collect_garbage();
        }
    }

    /// Full mark-sweep pass. Roots: the global environment chain, the
    /// environments of active call frames, the temp roots, and the intrinsic
    /// prototypes. Returns the number of freed slots.
    pub(crate) fn collect_garbage(&mut self) -> usize {
        let mut marked = vec![false; self.objects.len()];
        let mut obj_stack: Vec<u64> = Vec::new();
        let mut env_stack: Vec<EnvRef> = Vec::new();
        let mut visited_envs: HashSet<*const RefCell<Environment>> = HashSet::new();

        env_stack.push(self.global_env.clone());
        env_stack.extend(self.call_stack_envs.iter().cloned());
        for root in [
            &self.object_prototype,
            &self.function_prototype,
            &self.array_prototype,
        ] {
            push_value(root, &mut obj_stack);
        }
        for proto in self.error_prototypes.values() {
            push_value(proto, &mut obj_stack);
        }
        for root in &self.gc_temp_roots {
            push_value(root, &mut obj_stack);
        }

        while !obj_stack.is_empty() || !env_stack.is_empty() {
            if let Some(env) = env_stack.pop() {
                if visited_envs.insert(Rc::as_ptr(&env)) {
                    let env_ref = env.borrow();
                    for binding in env_ref.bindings.values() {
                        push_value(&binding.value, &mut obj_stack);
                    }
                    if let Some(parent) = &env_ref.parent {
                        env_stack.push(parent.clone());
                    }
                }
                continue;
            }
            let Some(id) = obj_stack.pop() else { break };
            let index = id as usize;
            if marked.get(index).copied().unwrap_or(true) {
                continue;
            }
            let Some(Some(obj)) = self.objects.get(index) else {
                continue;
            };
            marked[index] = true;
            let data = obj.borrow();
            if let Some(proto) = &data.prototype
                && let Some(proto_id) = proto.borrow().id
            {
                obj_stack.push(proto_id);
            }
            for desc in data.properties.values() {
                push_value(&desc.value, &mut obj_stack);
            }
            if let Some(JsFunction::User { closure, .. }) = &data.callable {
                env_stack.push(closure.clone());
            }
            if let Some(bound) = &data.bound {
                push_value(&bound.target, &mut obj_stack);
                push_value(&bound.this_val, &mut obj_stack);
                for arg in &bound.bound_args {
                    push_value(arg, &mut obj_stack);
                }
            }
        }

        let mut freed = 0;
        for (index, slot) in self.objects.iter_mut().enumerate() {
            if slot.is_some() && !marked[index] {
                *slot = None;
                self.free_list.push(index);
                freed += 1;
            }
        }
        self.gc_alloc_count = 0;
        debug!(
            "gc: freed {freed} objects, {} live",
            self.objects.len() - self.free_list.len()
        );
        freed
    }

    #[cfg(test)]
    pub(crate) fn live_object_count(&self) -> usize {
        self.objects.iter().filter(|slot| slot.is_some()).count()
    }
}

fn push_value(value: &JsValue, obj_stack: &mut Vec<u64>) {
    if let JsValue::Object(handle) = value {
        obj_stack.push(handle.id);
    }
}

#[cfg(test)]
mod tests {
    use super::GC_THRESHOLD;
    use crate::ast::build::*;
    use crate::ast::*;
    use crate::interpreter::{Completion, Interpreter};
    use crate::types::JsValue;

    fn init_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    /// `function filler() { for (let i = 0; i < count; i++) { ({}); } return 1; }`
    fn filler_decl(count: f64) -> Statement {
        let loop_body = Statement::new(StatementKind::Block(vec![expr_stmt(
            Expression::Object(vec![]),
        )]));
        let burst = Statement::new(StatementKind::For(ForStatement {
            init: Some(ForInit::Variable(VariableDeclaration {
                kind: VarKind::Let,
                declarations: vec![VariableDeclarator {
                    name: "i".to_string(),
                    init: Some(num(0.0)),
                }],
            })),
            test: Some(binary(BinaryOp::Lt, ident("i"), num(count))),
            update: Some(Expression::Update(
                UpdateOp::Increment,
                false,
                Box::new(ident("i")),
            )),
            body: Box::new(loop_body),
        }));
        func_decl("filler", &[], vec![burst, ret(Some(num(1.0)))])
    }

    #[test]
    fn unrooted_objects_are_collected() {
        init_logging();
        let mut interp = Interpreter::new();
        interp.collect_garbage();
        let baseline = interp.live_object_count();
        let _ = interp.create_object();
        let _ = interp.create_array(vec![JsValue::Number(1.0)]);
        assert_eq!(interp.live_object_count(), baseline + 2);
        let freed = interp.collect_garbage();
        assert_eq!(freed, 2);
        assert_eq!(interp.live_object_count(), baseline);
    }

    #[test]
    fn globals_survive_collection() {
        let mut interp = Interpreter::new();
        let obj = interp.create_object();
        interp.define_global("keep", obj);
        interp.collect_garbage();
        assert!(interp.global_env.borrow().lookup("keep").is_ok());
        let prog = program(vec![expr_stmt(ident("keep"))]);
        assert!(matches!(
            interp.run(&prog),
            Completion::Normal(JsValue::Object(_))
        ));
    }

    #[test]
    fn closure_keeps_captured_environment_alive() {
        let mut interp = Interpreter::new();
        let setup = program(vec![
            func_decl(
                "make",
                &[],
                vec![
                    decl(
                        VarKind::Let,
                        "o",
                        Some(Expression::Object(vec![Property {
                            key: PropertyKey::Identifier("v".to_string()),
                            value: num(42.0),
                        }])),
                    ),
                    ret(Some(func_expr(
                        &[],
                        vec![ret(Some(member(ident("o"), "v")))],
                    ))),
                ],
            ),
            decl(VarKind::Let, "f", Some(call(ident("make"), vec![]))),
        ]);
        assert!(matches!(interp.run(&setup), Completion::Normal(_)));
        interp.collect_garbage();
        let use_it = program(vec![expr_stmt(call(ident("f"), vec![]))]);
        assert!(matches!(
            interp.run(&use_it),
            Completion::Normal(JsValue::Number(n)) if n == 42.0
        ));
    }

    #[test]
    fn literals_survive_allocation_pressure_mid_statement() {
        init_logging();
        let mut interp = Interpreter::new();
        // the array literal is still under construction while filler pushes
        // the allocation count past the threshold
        let prog = program(vec![
            filler_decl(GC_THRESHOLD as f64 + 2000.0),
            decl(
                VarKind::Let,
                "a",
                Some(Expression::Array(vec![
                    Some(Expression::Object(vec![Property {
                        key: PropertyKey::Identifier("v".to_string()),
                        value: num(42.0),
                    }])),
                    Some(call(ident("filler"), vec![])),
                ])),
            ),
            expr_stmt(member(index(ident("a"), num(0.0)), "v")),
        ]);
        assert!(matches!(
            interp.run(&prog),
            Completion::Normal(JsValue::Number(n)) if n == 42.0
        ));
        // the burst was reclaimed at the statement boundary
        assert!(interp.gc_alloc_count < GC_THRESHOLD);
    }

    #[test]
    fn program_result_survives_collection_at_statement_boundary() {
        init_logging();
        let mut interp = Interpreter::new();
        // the object is the program result, held only on the Rust side when
        // the declaration after it triggers a collection
        let prog = program(vec![
            filler_decl(GC_THRESHOLD as f64 + 2000.0),
            expr_stmt(Expression::Object(vec![Property {
                key: PropertyKey::Identifier("v".to_string()),
                value: num(42.0),
            }])),
            decl(VarKind::Let, "x", Some(call(ident("filler"), vec![]))),
        ]);
        let Completion::Normal(JsValue::Object(h)) = interp.run(&prog) else {
            panic!("expected object result");
        };
        assert!(matches!(
            interp.get_object(h.id).borrow().get_property("v"),
            JsValue::Number(n) if n == 42.0
        ));
    }

    #[test]
    fn cyclic_object_graph_is_collected() {
        let mut interp = Interpreter::new();
        interp.collect_garbage();
        let baseline = interp.live_object_count();
        {
            let a = interp.create_object();
            let b = interp.create_object();
            if let (JsValue::Object(ha), JsValue::Object(hb)) = (&a, &b) {
                interp.set_object_property(*ha, "other", b.clone());
                interp.set_object_property(*hb, "other", a.clone());
            }
        }
        let freed = interp.collect_garbage();
        assert_eq!(freed, 2);
        assert_eq!(interp.live_object_count(), baseline);
    }
}
