//! A tree-walking evaluator for an ECMAScript subset.
//!
//! Programs arrive as ESTree-shaped ASTs, either built directly from the
//! types in [`ast`] or decoded from parser JSON with [`estree::parse_program`].
//! The [`Interpreter`] walks the tree with full lexical scoping, hoisting and
//! temporal-dead-zone enforcement, prototype-based objects with data-only
//! property descriptors, and a mark-sweep collector for the cycles that
//! closures and environments form.
//!
//! ```
//! use jseval::{Interpreter, JsValue, estree};
//!
//! let program = estree::parse_program(
//!     r#"{"type":"Program","body":[{
//!         "type":"ExpressionStatement",
//!         "expression":{"type":"BinaryExpression","operator":"*",
//!             "left":{"type":"Literal","value":6},
//!             "right":{"type":"Literal","value":7}}}]}"#,
//! )
//! .unwrap();
//! let result = Interpreter::new().evaluate(&program).unwrap();
//! assert!(matches!(result, JsValue::Number(n) if n == 42.0));
//! ```

pub mod ast;
pub mod estree;
pub mod interpreter;
pub mod types;

pub use estree::EstreeError;
pub use interpreter::{Completion, GlobalsConfig, Interpreter, UncaughtException};
pub use types::JsValue;

/// Runs a program on a fresh default-configured interpreter and returns the
/// value of its last expression statement.
pub fn evaluate(program: &ast::Program) -> Result<JsValue, UncaughtException> {
    Interpreter::new().evaluate(program)
}
