//! Statement execution: hoisting, lexical declarations, control flow.

use crate::ast::*;
use crate::types::JsValue;

use super::Interpreter;
use super::eval::tryv;
use super::helpers::{strict_equality, to_boolean};
use super::types::{BindingKind, Completion, EnvError, EnvRef, Environment, JsFunction, ThisMode};

/// How a loop responds to its body's completion, given the loop's label.
enum LoopFlow {
    Next,
    Exit,
    Propagate(Completion),
}

fn loop_flow(completion: Completion, label: Option<&str>) -> LoopFlow {
    match completion {
        Completion::Normal(_) | Completion::Continue(None) => LoopFlow::Next,
        Completion::Continue(Some(l)) if Some(l.as_str()) == label => LoopFlow::Next,
        Completion::Break(None) => LoopFlow::Exit,
        Completion::Break(Some(l)) if Some(l.as_str()) == label => LoopFlow::Exit,
        other => LoopFlow::Propagate(other),
    }
}

impl Interpreter {
    /// Recursive `var` hoisting. Declares every `var` name (and nothing
    /// else) into `env`, descending through blocks, loops, try and switch
    /// but never into nested function bodies.
    pub(crate) fn hoist_vars(&mut self, stmts: &[Statement], env: &EnvRef) -> Result<(), JsValue> {
        for stmt in stmts {
            self.hoist_statement(stmt, env)?;
        }
        Ok(())
    }

    fn hoist_statement(&mut self, stmt: &Statement, env: &EnvRef) -> Result<(), JsValue> {
        match &stmt.kind {
            StatementKind::Variable(decl) if decl.kind == VarKind::Var => {
                for d in &decl.declarations {
                    self.declare_in(env, &d.name, BindingKind::Var)?;
                }
            }
            StatementKind::Block(body) => self.hoist_vars(body, env)?,
            StatementKind::If(s) => {
                self.hoist_statement(&s.consequent, env)?;
                if let Some(alt) = &s.alternate {
                    self.hoist_statement(alt, env)?;
                }
            }
            StatementKind::While(s) => self.hoist_statement(&s.body, env)?,
            StatementKind::DoWhile(s) => self.hoist_statement(&s.body, env)?,
            StatementKind::For(s) => {
                if let Some(ForInit::Variable(decl)) = &s.init
                    && decl.kind == VarKind::Var
                {
                    for d in &decl.declarations {
                        self.declare_in(env, &d.name, BindingKind::Var)?;
                    }
                }
                self.hoist_statement(&s.body, env)?;
            }
            StatementKind::ForIn(s) => {
                if let ForInLeft::Variable(VarKind::Var, name) = &s.left {
                    self.declare_in(env, name, BindingKind::Var)?;
                }
                self.hoist_statement(&s.body, env)?;
            }
            StatementKind::Try(s) => {
                self.hoist_vars(&s.block, env)?;
                if let Some(handler) = &s.handler {
                    self.hoist_vars(&handler.body, env)?;
                }
                if let Some(finalizer) = &s.finalizer {
                    self.hoist_vars(finalizer, env)?;
                }
            }
            StatementKind::Switch(s) => {
                for case in &s.cases {
                    self.hoist_vars(&case.consequent, env)?;
                }
            }
            StatementKind::Labeled(_, inner) => self.hoist_statement(inner, env)?,
            _ => {}
        }
        Ok(())
    }

    fn declare_in(
        &mut self,
        env: &EnvRef,
        name: &str,
        kind: BindingKind,
    ) -> Result<(), JsValue> {
        let result = env.borrow_mut().declare(name, kind);
        result.map_err(|e| self.env_error_value(e))
    }

    /// Shallow lexical pass over one statement list: `let`/`const` names are
    /// declared uninitialized (dead zone), function declarations are both
    /// declared and bound to their function object before any statement
    /// runs.
    fn declare_lexical(&mut self, stmts: &[Statement], env: &EnvRef) -> Result<(), JsValue> {
        for stmt in stmts {
            match &stmt.kind {
                StatementKind::Variable(decl) if decl.kind != VarKind::Var => {
                    let kind = if decl.kind == VarKind::Let {
                        BindingKind::Let
                    } else {
                        BindingKind::Const
                    };
                    for d in &decl.declarations {
                        self.declare_in(env, &d.name, kind)?;
                    }
                }
                StatementKind::FunctionDeclaration(f) => {
                    self.declare_in(env, &f.name, BindingKind::Var)?;
                    let func = self.create_function(JsFunction::User {
                        name: Some(f.name.clone()),
                        params: f.params.clone(),
                        body: f.body.clone(),
                        closure: env.clone(),
                        this_mode: ThisMode::Normal,
                    });
                    env.borrow_mut().initialize(&f.name, func);
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Runs a statement list after its lexical pass. A normal completion
    /// carries the value of the last expression statement, which is what
    /// the program entry point reports.
    pub(crate) fn exec_statements(&mut self, stmts: &[Statement], env: &EnvRef) -> Completion {
        if let Err(e) = self.declare_lexical(stmts, env) {
            return Completion::Throw(e);
        }
        let mut result = JsValue::Undefined;
        for stmt in stmts {
            match self.exec_statement(stmt, env) {
                Completion::Normal(v) => {
                    if matches!(stmt.kind, StatementKind::Expression(_)) {
                        result = v;
                    }
                }
                abrupt => return abrupt,
            }
        }
        Completion::Normal(result)
    }

    /// Top-level statement loop. Collection is only considered here, between
    /// statements, where the in-flight program result is the sole value
    /// living outside an environment; it is temp-rooted across the check.
    pub(crate) fn exec_program(&mut self, stmts: &[Statement], env: &EnvRef) -> Completion {
        if let Err(e) = self.declare_lexical(stmts, env) {
            return Completion::Throw(e);
        }
        let mut result = JsValue::Undefined;
        for stmt in stmts {
            match self.exec_statement(stmt, env) {
                Completion::Normal(v) => {
                    if matches!(stmt.kind, StatementKind::Expression(_)) {
                        result = v;
                    }
                }
                abrupt => return abrupt,
            }
            self.gc_temp_roots.push(result.clone());
            self.maybe_gc();
            self.gc_temp_roots.clear();
        }
        Completion::Normal(result)
    }

    /// Function body entry: `var` hoisting into the call environment, then
    /// the statement list. `Return` is absorbed by the caller.
    pub(crate) fn exec_function_body(&mut self, body: &[Statement], env: &EnvRef) -> Completion {
        if let Err(e) = self.hoist_vars(body, env) {
            return Completion::Throw(e);
        }
        self.exec_statements(body, env)
    }

    pub(crate) fn exec_statement(&mut self, stmt: &Statement, env: &EnvRef) -> Completion {
        if let Some(pos) = stmt.loc {
            self.current_pos = Some(pos);
        }
        match &stmt.kind {
            StatementKind::Empty
            | StatementKind::Debugger
            | StatementKind::FunctionDeclaration(_) => Completion::Normal(JsValue::Undefined),
            StatementKind::Expression(e) => self.eval_expr(e, env),
            StatementKind::Block(body) => {
                let child = Environment::new(Some(env.clone()));
                self.exec_statements(body, &child)
            }
            StatementKind::Variable(decl) => self.exec_variable_declaration(decl, env),
            StatementKind::If(s) => {
                let test = tryv!(self.eval_value(&s.test, env));
                if to_boolean(&test) {
                    self.exec_statement(&s.consequent, env)
                } else if let Some(alt) = &s.alternate {
                    self.exec_statement(alt, env)
                } else {
                    Completion::Normal(JsValue::Undefined)
                }
            }
            StatementKind::While(s) => self.exec_while(s, env, None),
            StatementKind::DoWhile(s) => self.exec_do_while(s, env, None),
            StatementKind::For(s) => self.exec_for(s, env, None),
            StatementKind::ForIn(s) => self.exec_for_in(s, env, None),
            StatementKind::Return(arg) => {
                let value = match arg {
                    Some(e) => tryv!(self.eval_value(e, env)),
                    None => JsValue::Undefined,
                };
                Completion::Return(value)
            }
            StatementKind::Break(label) => Completion::Break(label.clone()),
            StatementKind::Continue(label) => Completion::Continue(label.clone()),
            StatementKind::Throw(e) => {
                let value = tryv!(self.eval_value(e, env));
                Completion::Throw(value)
            }
            StatementKind::Try(s) => self.exec_try(s, env),
            StatementKind::Switch(s) => self.exec_switch(s, env),
            StatementKind::Labeled(label, inner) => self.exec_labeled(label, inner, env),
        }
    }

    fn exec_variable_declaration(
        &mut self,
        decl: &VariableDeclaration,
        env: &EnvRef,
    ) -> Completion {
        for d in &decl.declarations {
            match decl.kind {
                VarKind::Var => {
                    // the binding was hoisted; without an initializer the
                    // declaration statement is inert
                    if let Some(init) = &d.init {
                        let value = tryv!(self.eval_value(init, env));
                        let result = env.borrow_mut().assign(&d.name, value);
                        if let Err(e) = result {
                            let err = self.env_error_value(e);
                            return Completion::Throw(err);
                        }
                    }
                }
                VarKind::Let | VarKind::Const => {
                    let value = match &d.init {
                        Some(init) => tryv!(self.eval_value(init, env)),
                        None if decl.kind == VarKind::Const => {
                            let err = self
                                .create_syntax_error("Missing initializer in const declaration");
                            return Completion::Throw(err);
                        }
                        None => JsValue::Undefined,
                    };
                    env.borrow_mut().initialize(&d.name, value);
                }
            }
        }
        Completion::Normal(JsValue::Undefined)
    }

    /// A label wraps a loop: the label is threaded into the loop so a
    /// matching `continue` resumes it instead of exiting. A labeled
    /// non-loop statement only absorbs a matching `break`.
    fn exec_labeled(&mut self, label: &str, inner: &Statement, env: &EnvRef) -> Completion {
        let result = match &inner.kind {
            StatementKind::While(s) => self.exec_while(s, env, Some(label)),
            StatementKind::DoWhile(s) => self.exec_do_while(s, env, Some(label)),
            StatementKind::For(s) => self.exec_for(s, env, Some(label)),
            StatementKind::ForIn(s) => self.exec_for_in(s, env, Some(label)),
            _ => self.exec_statement(inner, env),
        };
        match result {
            Completion::Break(Some(l)) if l == label => Completion::Normal(JsValue::Undefined),
            other => other,
        }
    }

    fn exec_while(
        &mut self,
        stmt: &WhileStatement,
        env: &EnvRef,
        label: Option<&str>,
    ) -> Completion {
        loop {
            let test = tryv!(self.eval_value(&stmt.test, env));
            if !to_boolean(&test) {
                break;
            }
            match loop_flow(self.exec_statement(&stmt.body, env), label) {
                LoopFlow::Next => {}
                LoopFlow::Exit => break,
                LoopFlow::Propagate(c) => return c,
            }
        }
        Completion::Normal(JsValue::Undefined)
    }

    fn exec_do_while(
        &mut self,
        stmt: &DoWhileStatement,
        env: &EnvRef,
        label: Option<&str>,
    ) -> Completion {
        loop {
            match loop_flow(self.exec_statement(&stmt.body, env), label) {
                LoopFlow::Next => {}
                LoopFlow::Exit => break,
                LoopFlow::Propagate(c) => return c,
            }
            let test = tryv!(self.eval_value(&stmt.test, env));
            if !to_boolean(&test) {
                break;
            }
        }
        Completion::Normal(JsValue::Undefined)
    }

    fn exec_for(&mut self, stmt: &ForStatement, env: &EnvRef, label: Option<&str>) -> Completion {
        let loop_env = Environment::new(Some(env.clone()));
        let mut per_iteration: Vec<String> = Vec::new();
        match &stmt.init {
            Some(ForInit::Variable(decl)) => {
                if decl.kind != VarKind::Var {
                    let kind = if decl.kind == VarKind::Let {
                        BindingKind::Let
                    } else {
                        BindingKind::Const
                    };
                    for d in &decl.declarations {
                        if let Err(e) = self.declare_in(&loop_env, &d.name, kind) {
                            return Completion::Throw(e);
                        }
                    }
                    if decl.kind == VarKind::Let {
                        per_iteration = decl.declarations.iter().map(|d| d.name.clone()).collect();
                    }
                }
                let completion = self.exec_variable_declaration(decl, &loop_env);
                if completion.is_abrupt() {
                    return completion;
                }
            }
            Some(ForInit::Expression(e)) => {
                tryv!(self.eval_value(e, &loop_env));
            }
            None => {}
        }
        // `let` loop variables get a fresh copy each iteration so closures
        // created in the body observe that iteration's value
        let mut iter_env = if per_iteration.is_empty() {
            loop_env
        } else {
            copy_loop_bindings(&loop_env, &per_iteration, env)
        };
        loop {
            if let Some(test) = &stmt.test {
                let v = tryv!(self.eval_value(test, &iter_env));
                if !to_boolean(&v) {
                    break;
                }
            }
            match loop_flow(self.exec_statement(&stmt.body, &iter_env), label) {
                LoopFlow::Next => {}
                LoopFlow::Exit => break,
                LoopFlow::Propagate(c) => return c,
            }
            if !per_iteration.is_empty() {
                iter_env = copy_loop_bindings(&iter_env, &per_iteration, env);
            }
            if let Some(update) = &stmt.update {
                tryv!(self.eval_value(update, &iter_env));
            }
        }
        Completion::Normal(JsValue::Undefined)
    }

    fn exec_for_in(
        &mut self,
        stmt: &ForInStatement,
        env: &EnvRef,
        label: Option<&str>,
    ) -> Completion {
        let right = tryv!(self.eval_value(&stmt.right, env));
        let keys: Vec<String> = match &right {
            JsValue::Object(h) => self.get_object(h.id).borrow().enumerable_keys_with_proto(),
            JsValue::String(s) => (0..s.chars().count()).map(|i| i.to_string()).collect(),
            // null/undefined (and other primitives) enumerate nothing
            _ => return Completion::Normal(JsValue::Undefined),
        };
        for key in keys {
            // keys deleted mid-loop are not visited
            if let JsValue::Object(h) = &right
                && !self.get_object(h.id).borrow().has_property(&key)
            {
                continue;
            }
            let key_value = JsValue::String(key);
            let iter_env = match &stmt.left {
                ForInLeft::Variable(VarKind::Var, name) | ForInLeft::Identifier(name) => {
                    let result = env.borrow_mut().assign(name, key_value);
                    if let Err(e) = result {
                        let err = self.env_error_value(e);
                        return Completion::Throw(err);
                    }
                    env.clone()
                }
                ForInLeft::Variable(kind, name) => {
                    let binding_kind = if *kind == VarKind::Let {
                        BindingKind::Let
                    } else {
                        BindingKind::Const
                    };
                    let child = Environment::new(Some(env.clone()));
                    child.borrow_mut().define(name, binding_kind, key_value);
                    child
                }
            };
            match loop_flow(self.exec_statement(&stmt.body, &iter_env), label) {
                LoopFlow::Next => {}
                LoopFlow::Exit => break,
                LoopFlow::Propagate(c) => return c,
            }
        }
        Completion::Normal(JsValue::Undefined)
    }

    fn exec_try(&mut self, stmt: &TryStatement, env: &EnvRef) -> Completion {
        let block_env = Environment::new(Some(env.clone()));
        let mut result = self.exec_statements(&stmt.block, &block_env);
        result = match result {
            Completion::Throw(thrown) => match &stmt.handler {
                Some(handler) => {
                    let catch_env = Environment::new(Some(env.clone()));
                    if let Some(param) = &handler.param {
                        catch_env.borrow_mut().define(param, BindingKind::Let, thrown);
                    }
                    self.exec_statements(&handler.body, &catch_env)
                }
                None => Completion::Throw(thrown),
            },
            other => other,
        };
        if let Some(finalizer) = &stmt.finalizer {
            let fin_env = Environment::new(Some(env.clone()));
            let fin = self.exec_statements(finalizer, &fin_env);
            // an abrupt finally replaces whatever was in flight
            if fin.is_abrupt() {
                return fin;
            }
        }
        result
    }

    fn exec_switch(&mut self, stmt: &SwitchStatement, env: &EnvRef) -> Completion {
        let disc = tryv!(self.eval_value(&stmt.discriminant, env));
        let switch_env = Environment::new(Some(env.clone()));
        // all cases share one lexical scope
        for case in &stmt.cases {
            if let Err(e) = self.declare_lexical(&case.consequent, &switch_env) {
                return Completion::Throw(e);
            }
        }
        let mut start = None;
        for (i, case) in stmt.cases.iter().enumerate() {
            if let Some(test) = &case.test {
                let tv = tryv!(self.eval_value(test, &switch_env));
                if strict_equality(&disc, &tv) {
                    start = Some(i);
                    break;
                }
            }
        }
        let start = start.or_else(|| stmt.cases.iter().position(|c| c.test.is_none()));
        let Some(start) = start else {
            return Completion::Normal(JsValue::Undefined);
        };
        // execution falls through case boundaries until a break
        for case in &stmt.cases[start..] {
            for s in &case.consequent {
                match self.exec_statement(s, &switch_env) {
                    Completion::Normal(_) => {}
                    Completion::Break(None) => return Completion::Normal(JsValue::Undefined),
                    abrupt => return abrupt,
                }
            }
        }
        Completion::Normal(JsValue::Undefined)
    }

    pub(crate) fn env_error_value(&mut self, err: EnvError) -> JsValue {
        match err {
            EnvError::NotFound(n) => self.create_reference_error(&format!("{n} is not defined")),
            EnvError::Uninitialized(n) => self.create_reference_error(&format!(
                "Cannot access '{n}' before initialization"
            )),
            EnvError::Immutable(_) => self.create_type_error("Assignment to constant variable."),
            EnvError::AlreadyDeclared(n) => {
                self.create_syntax_error(&format!("Identifier '{n}' has already been declared"))
            }
        }
    }
}

fn copy_loop_bindings(source: &EnvRef, names: &[String], outer: &EnvRef) -> EnvRef {
    let next = Environment::new(Some(outer.clone()));
    for name in names {
        let value = source
            .borrow()
            .lookup(name)
            .unwrap_or(JsValue::Undefined);
        next.borrow_mut().define(name, BindingKind::Let, value);
    }
    next
}
