//! Abstract operations: coercions, equality, relational comparison.

use crate::types::{JsValue, number_ops};

use super::Interpreter;

pub(crate) fn to_boolean(value: &JsValue) -> bool {
    match value {
        JsValue::Undefined | JsValue::Null => false,
        JsValue::Boolean(b) => *b,
        JsValue::Number(n) => *n != 0.0 && !n.is_nan(),
        JsValue::String(s) => !s.is_empty(),
        JsValue::Object(_) => true,
    }
}

/// String-to-number per the StringNumericLiteral grammar: whitespace-only is
/// zero, hex literals are accepted, anything else unparseable is NaN.
pub(crate) fn string_to_number(s: &str) -> f64 {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    if let Some(hex) = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        return match u64::from_str_radix(hex, 16) {
            Ok(n) => n as f64,
            Err(_) => f64::NAN,
        };
    }
    match trimmed {
        "Infinity" | "+Infinity" => f64::INFINITY,
        "-Infinity" => f64::NEG_INFINITY,
        _ => trimmed.parse::<f64>().unwrap_or(f64::NAN),
    }
}

/// `===`: no coercion, NaN is unequal to itself, objects compare by handle.
pub fn strict_equality(a: &JsValue, b: &JsValue) -> bool {
    match (a, b) {
        (JsValue::Undefined, JsValue::Undefined) => true,
        (JsValue::Null, JsValue::Null) => true,
        (JsValue::Boolean(x), JsValue::Boolean(y)) => x == y,
        (JsValue::Number(x), JsValue::Number(y)) => number_ops::equal(*x, *y),
        (JsValue::String(x), JsValue::String(y)) => x == y,
        (JsValue::Object(x), JsValue::Object(y)) => x == y,
        _ => false,
    }
}

/// Which object-to-primitive method runs first.
#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) enum PrimitiveHint {
    Number,
    String,
}

impl Interpreter {
    /// ToPrimitive: tries the object's callable `valueOf`/`toString` (order
    /// set by the hint) and takes the first primitive result. Failure of both
    /// is a TypeError.
    pub(crate) fn to_primitive(
        &mut self,
        value: &JsValue,
        hint: PrimitiveHint,
    ) -> Result<JsValue, JsValue> {
        let JsValue::Object(_) = value else {
            return Ok(value.clone());
        };
        let methods: [&str; 2] = match hint {
            PrimitiveHint::Number => ["valueOf", "toString"],
            PrimitiveHint::String => ["toString", "valueOf"],
        };
        for name in methods {
            if let Some(result) = self.try_primitive_method(value, name)? {
                return Ok(result);
            }
        }
        Err(self.create_type_error("Cannot convert object to primitive value"))
    }

    /// Calls `value[name]()` if it resolves to a callable; `Ok(None)` when the
    /// method is absent, uncallable, or returned another object.
    fn try_primitive_method(
        &mut self,
        value: &JsValue,
        name: &str,
    ) -> Result<Option<JsValue>, JsValue> {
        let JsValue::Object(handle) = value else {
            return Ok(None);
        };
        let method = self.get_object(handle.id).borrow().get_property(name);
        if !self.is_callable(&method) {
            return Ok(None);
        }
        match self.call_function(&method, super::types::CallForm::Method(value.clone()), &[]) {
            super::types::Completion::Normal(v) | super::types::Completion::Return(v) => {
                if v.is_object() {
                    Ok(None)
                } else {
                    Ok(Some(v))
                }
            }
            super::types::Completion::Throw(e) => Err(e),
            _ => Ok(None),
        }
    }

    pub(crate) fn to_number_value(&mut self, value: &JsValue) -> Result<f64, JsValue> {
        match value {
            JsValue::Undefined => Ok(f64::NAN),
            JsValue::Null => Ok(0.0),
            JsValue::Boolean(b) => Ok(if *b { 1.0 } else { 0.0 }),
            JsValue::Number(n) => Ok(*n),
            JsValue::String(s) => Ok(string_to_number(s)),
            JsValue::Object(_) => {
                let prim = self.to_primitive(value, PrimitiveHint::Number)?;
                self.to_number_value(&prim)
            }
        }
    }

    pub(crate) fn to_string_value(&mut self, value: &JsValue) -> Result<String, JsValue> {
        match value {
            JsValue::Object(_) => {
                let prim = self.to_primitive(value, PrimitiveHint::String)?;
                self.to_string_value(&prim)
            }
            _ => Ok(value.to_string()),
        }
    }

    /// `==` coercion ladder. Same-type comparisons defer to `===`; otherwise
    /// null/undefined match each other, numbers and strings meet as numbers,
    /// booleans become numbers, and objects go through ToPrimitive.
    pub(crate) fn loose_equals(&mut self, a: &JsValue, b: &JsValue) -> Result<bool, JsValue> {
        match (a, b) {
            (JsValue::Undefined | JsValue::Null, JsValue::Undefined | JsValue::Null) => Ok(true),
            (JsValue::Number(x), JsValue::String(s)) => {
                Ok(number_ops::equal(*x, string_to_number(s)))
            }
            (JsValue::String(s), JsValue::Number(y)) => {
                Ok(number_ops::equal(string_to_number(s), *y))
            }
            (JsValue::Boolean(x), _) => {
                let n = JsValue::Number(if *x { 1.0 } else { 0.0 });
                self.loose_equals(&n, b)
            }
            (_, JsValue::Boolean(y)) => {
                let n = JsValue::Number(if *y { 1.0 } else { 0.0 });
                self.loose_equals(a, &n)
            }
            (JsValue::Number(_) | JsValue::String(_), JsValue::Object(_)) => {
                let prim = self.to_primitive(b, PrimitiveHint::Number)?;
                self.loose_equals(a, &prim)
            }
            (JsValue::Object(_), JsValue::Number(_) | JsValue::String(_)) => {
                let prim = self.to_primitive(a, PrimitiveHint::Number)?;
                self.loose_equals(&prim, b)
            }
            _ => Ok(strict_equality(a, b)),
        }
    }

    /// Abstract relational comparison: both operands go through ToPrimitive
    /// with the number hint; two strings compare lexicographically, anything
    /// else numerically. `None` means "undefined" (a NaN was involved).
    pub(crate) fn compare_relational(
        &mut self,
        a: &JsValue,
        b: &JsValue,
    ) -> Result<Option<bool>, JsValue> {
        let pa = self.to_primitive(a, PrimitiveHint::Number)?;
        let pb = self.to_primitive(b, PrimitiveHint::Number)?;
        if let (JsValue::String(x), JsValue::String(y)) = (&pa, &pb) {
            return Ok(Some(x < y));
        }
        let x = self.to_number_value(&pa)?;
        let y = self.to_number_value(&pb)?;
        Ok(number_ops::less_than(x, y))
    }

    pub(crate) fn is_callable(&self, value: &JsValue) -> bool {
        match value {
            JsValue::Object(handle) => {
                let obj = self.get_object(handle.id);
                let data = obj.borrow();
                data.callable.is_some() || data.bound.is_some()
            }
            _ => false,
        }
    }

    pub(crate) fn typeof_value(&self, value: &JsValue) -> &'static str {
        match value {
            JsValue::Undefined => "undefined",
            JsValue::Null => "object",
            JsValue::Boolean(_) => "boolean",
            JsValue::Number(_) => "number",
            JsValue::String(_) => "string",
            JsValue::Object(_) => {
                if self.is_callable(value) {
                    "function"
                } else {
                    "object"
                }
            }
        }
    }

    pub(crate) fn is_array(&self, value: &JsValue) -> bool {
        match value {
            JsValue::Object(handle) => self.get_object(handle.id).borrow().class_name == "Array",
            _ => false,
        }
    }
}
