//! ESTree JSON ingestion. The external parser produces ESTree-shaped JSON;
//! this module decodes the supported subset into the typed AST and rejects
//! everything outside it with a structured error instead of mis-evaluating.

use serde_json::Value;
use thiserror::Error;

use crate::ast::*;

#[derive(Debug, Error)]
pub enum EstreeError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported node type `{node_type}`")]
    Unsupported { node_type: String },
    #[error("unsupported pattern `{0}` in binding position")]
    UnsupportedPattern(String),
    #[error("unknown operator `{op}` on {node_type}")]
    UnknownOperator { node_type: String, op: String },
    #[error("`{node_type}` is missing field `{field}`")]
    MissingField {
        node_type: String,
        field: &'static str,
    },
    #[error("expected a node object, found `{0}`")]
    NotANode(String),
    #[error("expected a Program root, found `{0}`")]
    NotAProgram(String),
}

/// Decodes a whole ESTree program from JSON text.
pub fn parse_program(source: &str) -> Result<Program, EstreeError> {
    let value: Value = serde_json::from_str(source)?;
    program_from_value(&value)
}

/// Decodes a program from an already-parsed JSON value.
pub fn program_from_value(value: &Value) -> Result<Program, EstreeError> {
    let t = node_type(value)?;
    if t != "Program" {
        return Err(EstreeError::NotAProgram(t.to_string()));
    }
    let body = field(value, t, "body")?;
    Ok(Program {
        body: statement_list(body)?,
    })
}

fn node_type(value: &Value) -> Result<&str, EstreeError> {
    value
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| EstreeError::NotANode(value.to_string()))
}

fn field<'a>(value: &'a Value, node_type: &str, name: &'static str) -> Result<&'a Value, EstreeError> {
    match value.get(name) {
        Some(v) if !v.is_null() => Ok(v),
        _ => Err(EstreeError::MissingField {
            node_type: node_type.to_string(),
            field: name,
        }),
    }
}

/// `null` and absent fields both read as "not there".
fn opt<'a>(value: &'a Value, name: &str) -> Option<&'a Value> {
    value.get(name).filter(|v| !v.is_null())
}

fn statement_list(value: &Value) -> Result<Vec<Statement>, EstreeError> {
    let Some(items) = value.as_array() else {
        return Err(EstreeError::NotANode(value.to_string()));
    };
    items.iter().map(statement).collect()
}

fn start_position(value: &Value) -> Option<Position> {
    let start = value.get("loc")?.get("start")?;
    Some(Position {
        line: start.get("line")?.as_u64()? as u32,
        column: start.get("column")?.as_u64()? as u32,
    })
}

fn identifier_name(value: &Value) -> Result<String, EstreeError> {
    let t = node_type(value)?;
    if t != "Identifier" {
        return Err(EstreeError::UnsupportedPattern(t.to_string()));
    }
    Ok(field(value, t, "name")?
        .as_str()
        .ok_or(EstreeError::MissingField {
            node_type: t.to_string(),
            field: "name",
        })?
        .to_string())
}

fn param_names(value: &Value, node_type: &str) -> Result<Vec<String>, EstreeError> {
    let params = field(value, node_type, "params")?;
    let Some(items) = params.as_array() else {
        return Err(EstreeError::NotANode(params.to_string()));
    };
    items.iter().map(identifier_name).collect()
}

fn function_body(value: &Value, owner: &str) -> Result<Vec<Statement>, EstreeError> {
    let body = field(value, owner, "body")?;
    let t = node_type(body)?;
    if t != "BlockStatement" {
        return Err(EstreeError::Unsupported {
            node_type: t.to_string(),
        });
    }
    statement_list(field(body, t, "body")?)
}

fn reject_modifiers(value: &Value, t: &str) -> Result<(), EstreeError> {
    for flag in ["generator", "async"] {
        if value.get(flag).and_then(Value::as_bool) == Some(true) {
            return Err(EstreeError::Unsupported {
                node_type: format!("{flag} {t}"),
            });
        }
    }
    Ok(())
}

fn statement(value: &Value) -> Result<Statement, EstreeError> {
    let t = node_type(value)?;
    let loc = start_position(value);
    let kind = match t {
        "EmptyStatement" => StatementKind::Empty,
        "DebuggerStatement" => StatementKind::Debugger,
        "ExpressionStatement" => {
            StatementKind::Expression(expression(field(value, t, "expression")?)?)
        }
        "BlockStatement" => StatementKind::Block(statement_list(field(value, t, "body")?)?),
        "VariableDeclaration" => StatementKind::Variable(variable_declaration(value)?),
        "FunctionDeclaration" => {
            reject_modifiers(value, t)?;
            StatementKind::FunctionDeclaration(FunctionDecl {
                name: identifier_name(field(value, t, "id")?)?,
                params: param_names(value, t)?,
                body: function_body(value, t)?,
            })
        }
        "ReturnStatement" => {
            StatementKind::Return(opt(value, "argument").map(expression).transpose()?)
        }
        "BreakStatement" => {
            StatementKind::Break(opt(value, "label").map(identifier_name).transpose()?)
        }
        "ContinueStatement" => {
            StatementKind::Continue(opt(value, "label").map(identifier_name).transpose()?)
        }
        "IfStatement" => StatementKind::If(IfStatement {
            test: expression(field(value, t, "test")?)?,
            consequent: Box::new(statement(field(value, t, "consequent")?)?),
            alternate: opt(value, "alternate")
                .map(statement)
                .transpose()?
                .map(Box::new),
        }),
        "WhileStatement" => StatementKind::While(WhileStatement {
            test: expression(field(value, t, "test")?)?,
            body: Box::new(statement(field(value, t, "body")?)?),
        }),
        "DoWhileStatement" => StatementKind::DoWhile(DoWhileStatement {
            test: expression(field(value, t, "test")?)?,
            body: Box::new(statement(field(value, t, "body")?)?),
        }),
        "ForStatement" => {
            let init = match opt(value, "init") {
                None => None,
                Some(init) => Some(match node_type(init)? {
                    "VariableDeclaration" => ForInit::Variable(variable_declaration(init)?),
                    _ => ForInit::Expression(expression(init)?),
                }),
            };
            StatementKind::For(ForStatement {
                init,
                test: opt(value, "test").map(expression).transpose()?,
                update: opt(value, "update").map(expression).transpose()?,
                body: Box::new(statement(field(value, t, "body")?)?),
            })
        }
        "ForInStatement" => {
            let left_node = field(value, t, "left")?;
            let left = match node_type(left_node)? {
                "VariableDeclaration" => {
                    let decl = variable_declaration(left_node)?;
                    let [d] = decl.declarations.as_slice() else {
                        return Err(EstreeError::UnsupportedPattern(
                            "multiple for-in declarations".to_string(),
                        ));
                    };
                    ForInLeft::Variable(decl.kind, d.name.clone())
                }
                _ => ForInLeft::Identifier(identifier_name(left_node)?),
            };
            StatementKind::ForIn(ForInStatement {
                left,
                right: expression(field(value, t, "right")?)?,
                body: Box::new(statement(field(value, t, "body")?)?),
            })
        }
        "ThrowStatement" => StatementKind::Throw(expression(field(value, t, "argument")?)?),
        "TryStatement" => {
            let block = statement_list(field(field(value, t, "block")?, t, "body")?)?;
            let handler = match opt(value, "handler") {
                None => None,
                Some(h) => Some(CatchClause {
                    param: opt(h, "param").map(identifier_name).transpose()?,
                    body: statement_list(field(field(h, "CatchClause", "body")?, t, "body")?)?,
                }),
            };
            let finalizer = match opt(value, "finalizer") {
                None => None,
                Some(f) => Some(statement_list(field(f, t, "body")?)?),
            };
            StatementKind::Try(TryStatement {
                block,
                handler,
                finalizer,
            })
        }
        "SwitchStatement" => {
            let cases_node = field(value, t, "cases")?;
            let Some(items) = cases_node.as_array() else {
                return Err(EstreeError::NotANode(cases_node.to_string()));
            };
            let cases = items
                .iter()
                .map(|case| {
                    Ok(SwitchCase {
                        test: opt(case, "test").map(expression).transpose()?,
                        consequent: statement_list(field(case, "SwitchCase", "consequent")?)?,
                    })
                })
                .collect::<Result<Vec<_>, EstreeError>>()?;
            StatementKind::Switch(SwitchStatement {
                discriminant: expression(field(value, t, "discriminant")?)?,
                cases,
            })
        }
        "LabeledStatement" => StatementKind::Labeled(
            identifier_name(field(value, t, "label")?)?,
            Box::new(statement(field(value, t, "body")?)?),
        ),
        other => {
            return Err(EstreeError::Unsupported {
                node_type: other.to_string(),
            });
        }
    };
    Ok(Statement::at(kind, loc))
}

fn variable_declaration(value: &Value) -> Result<VariableDeclaration, EstreeError> {
    let t = "VariableDeclaration";
    let kind = match field(value, t, "kind")?.as_str() {
        Some("var") => VarKind::Var,
        Some("let") => VarKind::Let,
        Some("const") => VarKind::Const,
        other => {
            return Err(EstreeError::UnknownOperator {
                node_type: t.to_string(),
                op: other.unwrap_or("?").to_string(),
            });
        }
    };
    let decls_node = field(value, t, "declarations")?;
    let Some(items) = decls_node.as_array() else {
        return Err(EstreeError::NotANode(decls_node.to_string()));
    };
    let declarations = items
        .iter()
        .map(|d| {
            Ok(VariableDeclarator {
                name: identifier_name(field(d, "VariableDeclarator", "id")?)?,
                init: opt(d, "init").map(expression).transpose()?,
            })
        })
        .collect::<Result<Vec<_>, EstreeError>>()?;
    Ok(VariableDeclaration { kind, declarations })
}

fn expression(value: &Value) -> Result<Expression, EstreeError> {
    let t = node_type(value)?;
    match t {
        "Literal" => literal(value),
        "Identifier" => Ok(Expression::Identifier(identifier_name(value)?)),
        "ThisExpression" => Ok(Expression::This),
        "ArrayExpression" => {
            let elements = field(value, t, "elements")?;
            let Some(items) = elements.as_array() else {
                return Err(EstreeError::NotANode(elements.to_string()));
            };
            let elements = items
                .iter()
                .map(|e| {
                    if e.is_null() {
                        Ok(None)
                    } else {
                        expression(e).map(Some)
                    }
                })
                .collect::<Result<Vec<_>, EstreeError>>()?;
            Ok(Expression::Array(elements))
        }
        "ObjectExpression" => {
            let props = field(value, t, "properties")?;
            let Some(items) = props.as_array() else {
                return Err(EstreeError::NotANode(props.to_string()));
            };
            let props = items.iter().map(object_property).collect::<Result<_, _>>()?;
            Ok(Expression::Object(props))
        }
        "FunctionExpression" => {
            reject_modifiers(value, t)?;
            Ok(Expression::Function(FunctionExpr {
                name: opt(value, "id").map(identifier_name).transpose()?,
                params: param_names(value, t)?,
                body: function_body(value, t)?,
            }))
        }
        "ArrowFunctionExpression" => {
            reject_modifiers(value, t)?;
            let body_node = field(value, t, "body")?;
            let body = if node_type(body_node)? == "BlockStatement" {
                ArrowBody::Block(statement_list(field(body_node, t, "body")?)?)
            } else {
                ArrowBody::Expression(Box::new(expression(body_node)?))
            };
            Ok(Expression::ArrowFunction(ArrowFunction {
                params: param_names(value, t)?,
                body,
            }))
        }
        "UnaryExpression" => {
            let arg = Box::new(expression(field(value, t, "argument")?)?);
            let op = field(value, t, "operator")?.as_str().unwrap_or("");
            Ok(match op {
                "-" => Expression::Unary(UnaryOp::Minus, arg),
                "+" => Expression::Unary(UnaryOp::Plus, arg),
                "!" => Expression::Unary(UnaryOp::Not, arg),
                "~" => Expression::Unary(UnaryOp::BitNot, arg),
                "typeof" => Expression::Typeof(arg),
                "void" => Expression::Void(arg),
                "delete" => Expression::Delete(arg),
                _ => {
                    return Err(EstreeError::UnknownOperator {
                        node_type: t.to_string(),
                        op: op.to_string(),
                    });
                }
            })
        }
        "UpdateExpression" => {
            let op = match field(value, t, "operator")?.as_str() {
                Some("++") => UpdateOp::Increment,
                Some("--") => UpdateOp::Decrement,
                other => {
                    return Err(EstreeError::UnknownOperator {
                        node_type: t.to_string(),
                        op: other.unwrap_or("?").to_string(),
                    });
                }
            };
            Ok(Expression::Update(
                op,
                field(value, t, "prefix")?.as_bool().unwrap_or(false),
                Box::new(expression(field(value, t, "argument")?)?),
            ))
        }
        "BinaryExpression" => {
            let op = binary_op(field(value, t, "operator")?.as_str().unwrap_or(""), t)?;
            Ok(Expression::Binary(
                op,
                Box::new(expression(field(value, t, "left")?)?),
                Box::new(expression(field(value, t, "right")?)?),
            ))
        }
        "LogicalExpression" => {
            let op = match field(value, t, "operator")?.as_str() {
                Some("&&") => LogicalOp::And,
                Some("||") => LogicalOp::Or,
                other => {
                    return Err(EstreeError::UnknownOperator {
                        node_type: t.to_string(),
                        op: other.unwrap_or("?").to_string(),
                    });
                }
            };
            Ok(Expression::Logical(
                op,
                Box::new(expression(field(value, t, "left")?)?),
                Box::new(expression(field(value, t, "right")?)?),
            ))
        }
        "AssignmentExpression" => {
            let op = assign_op(field(value, t, "operator")?.as_str().unwrap_or(""), t)?;
            Ok(Expression::Assign(
                op,
                Box::new(expression(field(value, t, "left")?)?),
                Box::new(expression(field(value, t, "right")?)?),
            ))
        }
        "ConditionalExpression" => Ok(Expression::Conditional(
            Box::new(expression(field(value, t, "test")?)?),
            Box::new(expression(field(value, t, "consequent")?)?),
            Box::new(expression(field(value, t, "alternate")?)?),
        )),
        "CallExpression" | "NewExpression" => {
            if value.get("optional").and_then(Value::as_bool) == Some(true) {
                return Err(EstreeError::Unsupported {
                    node_type: "OptionalCallExpression".to_string(),
                });
            }
            let callee = Box::new(expression(field(value, t, "callee")?)?);
            let args_node = field(value, t, "arguments")?;
            let Some(items) = args_node.as_array() else {
                return Err(EstreeError::NotANode(args_node.to_string()));
            };
            let args = items
                .iter()
                .map(expression)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(if t == "CallExpression" {
                Expression::Call(callee, args)
            } else {
                Expression::New(callee, args)
            })
        }
        "MemberExpression" => {
            if value.get("optional").and_then(Value::as_bool) == Some(true) {
                return Err(EstreeError::Unsupported {
                    node_type: "OptionalMemberExpression".to_string(),
                });
            }
            let object = Box::new(expression(field(value, t, "object")?)?);
            let prop_node = field(value, t, "property")?;
            let property = if field(value, t, "computed")?.as_bool() == Some(true) {
                MemberProperty::Computed(Box::new(expression(prop_node)?))
            } else {
                MemberProperty::Dot(identifier_name(prop_node)?)
            };
            Ok(Expression::Member(object, property))
        }
        "SequenceExpression" => {
            let exprs_node = field(value, t, "expressions")?;
            let Some(items) = exprs_node.as_array() else {
                return Err(EstreeError::NotANode(exprs_node.to_string()));
            };
            Ok(Expression::Sequence(
                items.iter().map(expression).collect::<Result<_, _>>()?,
            ))
        }
        other => Err(EstreeError::Unsupported {
            node_type: other.to_string(),
        }),
    }
}

fn literal(value: &Value) -> Result<Expression, EstreeError> {
    for (marker, name) in [("regex", "RegExpLiteral"), ("bigint", "BigIntLiteral")] {
        if value.get(marker).is_some_and(|m| !m.is_null()) {
            return Err(EstreeError::Unsupported {
                node_type: name.to_string(),
            });
        }
    }
    let lit = match value.get("value") {
        None | Some(Value::Null) => Literal::Null,
        Some(Value::Bool(b)) => Literal::Boolean(*b),
        Some(Value::Number(n)) => Literal::Number(n.as_f64().unwrap_or(f64::NAN)),
        Some(Value::String(s)) => Literal::String(s.clone()),
        Some(other) => return Err(EstreeError::NotANode(other.to_string())),
    };
    Ok(Expression::Literal(lit))
}

fn object_property(value: &Value) -> Result<Property, EstreeError> {
    let t = node_type(value)?;
    if t != "Property" {
        return Err(EstreeError::Unsupported {
            node_type: t.to_string(),
        });
    }
    match value.get("kind").and_then(Value::as_str) {
        None | Some("init") => {}
        Some(kind) => {
            return Err(EstreeError::Unsupported {
                node_type: format!("{kind} accessor property"),
            });
        }
    }
    if value.get("computed").and_then(Value::as_bool) == Some(true) {
        return Err(EstreeError::Unsupported {
            node_type: "computed property key".to_string(),
        });
    }
    let key_node = field(value, t, "key")?;
    let key = match node_type(key_node)? {
        "Identifier" => PropertyKey::Identifier(identifier_name(key_node)?),
        "Literal" => match field(key_node, "Literal", "value")? {
            Value::String(s) => PropertyKey::String(s.clone()),
            Value::Number(n) => PropertyKey::Number(n.as_f64().unwrap_or(f64::NAN)),
            other => return Err(EstreeError::NotANode(other.to_string())),
        },
        other => {
            return Err(EstreeError::Unsupported {
                node_type: other.to_string(),
            });
        }
    };
    Ok(Property {
        key,
        value: expression(field(value, t, "value")?)?,
    })
}

fn binary_op(op: &str, node_type: &str) -> Result<BinaryOp, EstreeError> {
    Ok(match op {
        "+" => BinaryOp::Add,
        "-" => BinaryOp::Sub,
        "*" => BinaryOp::Mul,
        "/" => BinaryOp::Div,
        "%" => BinaryOp::Mod,
        "==" => BinaryOp::Eq,
        "!=" => BinaryOp::NotEq,
        "===" => BinaryOp::StrictEq,
        "!==" => BinaryOp::StrictNotEq,
        "<" => BinaryOp::Lt,
        ">" => BinaryOp::Gt,
        "<=" => BinaryOp::LtEq,
        ">=" => BinaryOp::GtEq,
        "<<" => BinaryOp::LShift,
        ">>" => BinaryOp::RShift,
        ">>>" => BinaryOp::URShift,
        "&" => BinaryOp::BitAnd,
        "|" => BinaryOp::BitOr,
        "^" => BinaryOp::BitXor,
        "in" => BinaryOp::In,
        "instanceof" => BinaryOp::Instanceof,
        _ => {
            return Err(EstreeError::UnknownOperator {
                node_type: node_type.to_string(),
                op: op.to_string(),
            });
        }
    })
}

fn assign_op(op: &str, node_type: &str) -> Result<AssignOp, EstreeError> {
    Ok(match op {
        "=" => AssignOp::Assign,
        "+=" => AssignOp::AddAssign,
        "-=" => AssignOp::SubAssign,
        "*=" => AssignOp::MulAssign,
        "/=" => AssignOp::DivAssign,
        "%=" => AssignOp::ModAssign,
        "<<=" => AssignOp::LShiftAssign,
        ">>=" => AssignOp::RShiftAssign,
        ">>>=" => AssignOp::URShiftAssign,
        "&=" => AssignOp::BitAndAssign,
        "|=" => AssignOp::BitOrAssign,
        "^=" => AssignOp::BitXorAssign,
        _ => {
            return Err(EstreeError::UnknownOperator {
                node_type: node_type.to_string(),
                op: op.to_string(),
            });
        }
    })
}
