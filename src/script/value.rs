//! Runtime values, environments and the formatting rules used by the console.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use futures::future::{self, LocalBoxFuture};
use futures::FutureExt;

use super::ast::FunctionDecl;
use super::interp::{Interpreter, Unwind};

pub type NativeResult = Result<Value, Unwind>;

/// Longest string a script may build, in bytes.
pub const MAX_STRING_LENGTH: usize = (1 << 29) - 24;

/// Largest `length` an array may be given.
pub const MAX_ARRAY_LENGTH: usize = u32::MAX as usize;

/// Most elements an array may hold at once. Sparse growth beyond this fails
/// instead of allocating holes.
pub const MAX_DENSE_ELEMENTS: usize = 1 << 26;

/// Formatting stops descending below this many nested arrays or objects.
pub const MAX_FORMAT_DEPTH: usize = 128;

/// Fail with `RangeError: Invalid string length` when a result would exceed
/// [`MAX_STRING_LENGTH`].
pub fn check_string_length(len: usize) -> Result<(), Unwind> {
    if len > MAX_STRING_LENGTH {
        return Err(Unwind::range_error("Invalid string length"));
    }
    Ok(())
}

/// Resize `items` to `len`, filling with `undefined`. Lengths past
/// [`MAX_ARRAY_LENGTH`] are invalid; growth past [`MAX_DENSE_ELEMENTS`] or
/// beyond what the allocator grants is reported as a `RangeError` too.
pub fn resize_array(items: &mut Vec<Value>, len: usize) -> Result<(), Unwind> {
    if len > MAX_ARRAY_LENGTH {
        return Err(Unwind::range_error("Invalid array length"));
    }
    if len > items.len() {
        if len > MAX_DENSE_ELEMENTS {
            return Err(Unwind::range_error("Array buffer allocation failed"));
        }
        items
            .try_reserve(len - items.len())
            .map_err(|_| Unwind::range_error("Array buffer allocation failed"))?;
    }
    items.resize(len, Value::Undefined);
    Ok(())
}

#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    Str(Rc<str>),
    Array(Rc<RefCell<Vec<Value>>>),
    Object(Rc<RefCell<Object>>),
    Function(Rc<Closure>),
    Native(Rc<NativeFunction>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectClass {
    Plain,
    Error,
}

#[derive(Debug, Clone)]
pub struct Object {
    props: Vec<(String, Value)>,
    pub class: ObjectClass,
    pub frozen: bool,
}

impl Object {
    pub fn new(class: ObjectClass) -> Self {
        Self { props: Vec::new(), class, frozen: false }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.props.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone())
    }

    /// Insert or overwrite, keeping first-insertion order.
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        match self.props.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.props.push((key, value)),
        }
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.props.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> Vec<String> {
        self.props.iter().map(|(k, _)| k.clone()).collect()
    }
}

pub struct Closure {
    pub decl: Rc<FunctionDecl>,
    pub env: Rc<Env>,
}

pub type NativeFuture = LocalBoxFuture<'static, NativeResult>;

/// Arguments handed to a native function.
pub struct NativeCall {
    pub args: Vec<Value>,
    /// Whether the call appears directly under `await`.
    pub awaited: bool,
    pub interp: Interpreter,
}

impl NativeCall {
    pub fn arg(&self, index: usize) -> Value {
        self.args.get(index).cloned().unwrap_or_default()
    }
}

pub struct NativeFunction {
    pub name: String,
    call: Box<dyn Fn(NativeCall) -> NativeFuture>,
}

impl NativeFunction {
    pub fn value(name: impl Into<String>, call: impl Fn(NativeCall) -> NativeFuture + 'static) -> Value {
        Value::Native(Rc::new(Self { name: name.into(), call: Box::new(call) }))
    }

    /// A native that never suspends.
    pub fn sync(name: impl Into<String>, call: impl Fn(&[Value]) -> NativeResult + 'static) -> Value {
        Self::value(name, move |native| future::ready(call(&native.args)).boxed_local())
    }

    pub fn invoke(&self, call: NativeCall) -> NativeFuture {
        (self.call)(call)
    }
}

impl Value {
    pub fn str(s: impl AsRef<str>) -> Self {
        Value::Str(Rc::from(s.as_ref()))
    }

    pub fn array(items: Vec<Value>) -> Self {
        Value::Array(Rc::new(RefCell::new(items)))
    }

    pub fn object(props: Vec<(&str, Value)>) -> Self {
        let mut obj = Object::new(ObjectClass::Plain);
        for (k, v) in props {
            obj.set(k, v);
        }
        Value::Object(Rc::new(RefCell::new(obj)))
    }

    pub fn frozen_object(props: Vec<(&str, Value)>) -> Self {
        let value = Self::object(props);
        if let Value::Object(obj) = &value {
            obj.borrow_mut().frozen = true;
        }
        value
    }

    /// An error object such as `new TypeError(message)` would produce.
    pub fn error(name: &str, message: impl Into<String>) -> Self {
        let mut obj = Object::new(ObjectClass::Error);
        obj.set("name", Value::str(name));
        obj.set("message", Value::str(message.into()));
        Value::Object(Rc::new(RefCell::new(obj)))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "object",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::Str(_) => "string",
            Value::Array(_) | Value::Object(_) => "object",
            Value::Function(_) | Value::Native(_) => "function",
        }
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Value::Function(_) | Value::Native(_))
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Str(s) => !s.is_empty(),
            _ => true,
        }
    }

    pub fn to_number(&self) -> f64 {
        match self {
            Value::Undefined => f64::NAN,
            Value::Null => 0.0,
            Value::Bool(b) => f64::from(u8::from(*b)),
            Value::Number(n) => *n,
            Value::Str(s) => parse_numeric(s),
            Value::Array(items) => {
                let items = items.borrow();
                match items.len() {
                    0 => 0.0,
                    1 => items[0].to_number(),
                    _ => f64::NAN,
                }
            }
            _ => f64::NAN,
        }
    }

    /// `String(value)` semantics.
    pub fn to_display(&self) -> String {
        self.display_with(&mut Vec::new())
    }

    fn display_with(&self, seen: &mut Vec<*const ()>) -> String {
        match self {
            Value::Undefined => "undefined".to_string(),
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => format_number(*n),
            Value::Str(s) => s.to_string(),
            Value::Array(items) => {
                // A cycle or a too-deep level joins as the empty string.
                let ptr = Rc::as_ptr(items) as *const ();
                if seen.contains(&ptr) || seen.len() >= MAX_FORMAT_DEPTH {
                    return String::new();
                }
                seen.push(ptr);
                let out = items
                    .borrow()
                    .iter()
                    .map(|v| if v.is_nullish() { String::new() } else { v.display_with(seen) })
                    .collect::<Vec<_>>()
                    .join(",");
                seen.pop();
                out
            }
            Value::Object(obj) => {
                let obj = obj.borrow();
                match obj.class {
                    ObjectClass::Error => error_summary(&obj),
                    ObjectClass::Plain => "[object Object]".to_string(),
                }
            }
            Value::Function(f) => format!("[Function: {}]", f.decl.name.as_deref().unwrap_or("(anonymous)")),
            Value::Native(f) => format!("[Function: {}]", f.name),
        }
    }

    /// Formatting used by `console.log`: structured values become compact JSON.
    pub fn to_console(&self) -> String {
        match self {
            Value::Array(_) => self.to_json(None),
            Value::Object(obj) if obj.borrow().class == ObjectClass::Plain => self.to_json(None),
            _ => self.to_display(),
        }
    }

    pub fn to_json(&self, indent: Option<usize>) -> String {
        let json = self.to_json_value(&mut Vec::new());
        match indent {
            Some(width) if width > 0 => pretty_json(&json, width),
            _ => json.to_string(),
        }
    }

    fn to_json_value(&self, seen: &mut Vec<*const ()>) -> serde_json::Value {
        use serde_json::Value as Json;
        match self {
            Value::Undefined | Value::Function(_) | Value::Native(_) => Json::Null,
            Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Number(n) => json_number(*n),
            Value::Str(s) => Json::String(s.to_string()),
            Value::Array(items) => {
                let ptr = Rc::as_ptr(items) as *const ();
                if seen.contains(&ptr) {
                    return Json::String("[Circular]".into());
                }
                if seen.len() >= MAX_FORMAT_DEPTH {
                    return Json::String("[Array]".into());
                }
                seen.push(ptr);
                let out = items.borrow().iter().map(|v| v.to_json_value(seen)).collect();
                seen.pop();
                Json::Array(out)
            }
            Value::Object(obj) => {
                let ptr = Rc::as_ptr(obj) as *const ();
                if seen.contains(&ptr) {
                    return Json::String("[Circular]".into());
                }
                if seen.len() >= MAX_FORMAT_DEPTH {
                    return Json::String("[Object]".into());
                }
                seen.push(ptr);
                let mut map = serde_json::Map::new();
                for (k, v) in obj.borrow().entries() {
                    if matches!(v, Value::Undefined | Value::Function(_) | Value::Native(_)) {
                        continue;
                    }
                    map.insert(k.to_string(), v.to_json_value(seen));
                }
                seen.pop();
                Json::Object(map)
            }
        }
    }

    pub fn from_json(json: &serde_json::Value) -> Value {
        use serde_json::Value as Json;
        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(*b),
            Json::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            Json::String(s) => Value::str(s),
            Json::Array(items) => Value::array(items.iter().map(Value::from_json).collect()),
            Json::Object(map) => {
                let mut obj = Object::new(ObjectClass::Plain);
                for (k, v) in map {
                    obj.set(k.clone(), Value::from_json(v));
                }
                Value::Object(Rc::new(RefCell::new(obj)))
            }
        }
    }

    /// `===` semantics.
    pub fn strict_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Native(a), Value::Native(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// `==` semantics for the primitive cases the language supports.
    pub fn loose_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (a, b) if a.is_nullish() && b.is_nullish() => true,
            (a, b) if a.is_nullish() || b.is_nullish() => false,
            (Value::Number(_), Value::Str(_)) | (Value::Str(_), Value::Number(_)) | (Value::Bool(_), _) | (_, Value::Bool(_)) => {
                self.to_number() == other.to_number()
            }
            _ => self.strict_equals(other),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "{s:?}"),
            other => f.write_str(&other.to_console()),
        }
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Rc::from(s))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::str(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

pub fn error_summary(obj: &Object) -> String {
    let name = obj.get("name").map(|v| v.to_display()).unwrap_or_else(|| "Error".to_string());
    match obj.get("message").map(|v| v.to_display()) {
        Some(message) if !message.is_empty() => format!("{name}: {message}"),
        _ => name,
    }
}

/// JavaScript's Number-to-String conversion for the common cases.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n == 0.0 {
        "0".to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{}", n as i128)
    } else {
        format!("{n}")
    }
}

fn json_number(n: f64) -> serde_json::Value {
    if !n.is_finite() {
        serde_json::Value::Null
    } else if n.fract() == 0.0 && n.abs() < 9.0e15 {
        serde_json::Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n).map(serde_json::Value::Number).unwrap_or(serde_json::Value::Null)
    }
}

fn pretty_json(json: &serde_json::Value, width: usize) -> String {
    use serde::Serialize;

    let indent = " ".repeat(width.min(10));
    let formatter = serde_json::ser::PrettyFormatter::with_indent(indent.as_bytes());
    let mut out = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    match json.serialize(&mut serializer) {
        Ok(()) => String::from_utf8(out).unwrap_or_default(),
        Err(_) => json.to_string(),
    }
}

/// `Number(string)`: whitespace-trimmed, empty is zero, otherwise strict.
pub fn parse_numeric(s: &str) -> f64 {
    let t = s.trim();
    if t.is_empty() {
        return 0.0;
    }
    if let Some(hex) = t.strip_prefix("0x").or_else(|| t.strip_prefix("0X")) {
        return u64::from_str_radix(hex, 16).map(|n| n as f64).unwrap_or(f64::NAN);
    }
    match t {
        "Infinity" | "+Infinity" => f64::INFINITY,
        "-Infinity" => f64::NEG_INFINITY,
        _ if t.chars().all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-')) => {
            t.parse::<f64>().unwrap_or(f64::NAN)
        }
        _ => f64::NAN,
    }
}

#[derive(Debug, Clone)]
struct Binding {
    value: Value,
    mutable: bool,
}

/// A lexical scope. Lookups walk the parent chain.
#[derive(Default)]
pub struct Env {
    vars: RefCell<HashMap<String, Binding>>,
    parent: Option<Rc<Env>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignError {
    Undeclared,
    Constant,
}

impl Env {
    pub fn root() -> Rc<Env> {
        Rc::new(Env::default())
    }

    pub fn child(parent: &Rc<Env>) -> Rc<Env> {
        Rc::new(Env { vars: RefCell::default(), parent: Some(parent.clone()) })
    }

    pub fn declare(&self, name: impl Into<String>, value: Value, mutable: bool) {
        self.vars.borrow_mut().insert(name.into(), Binding { value, mutable });
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        if let Some(binding) = self.vars.borrow().get(name) {
            return Some(binding.value.clone());
        }
        self.parent.as_ref().and_then(|p| p.get(name))
    }

    pub fn assign(&self, name: &str, value: Value) -> Result<(), AssignError> {
        if let Some(binding) = self.vars.borrow_mut().get_mut(name) {
            if !binding.mutable {
                return Err(AssignError::Constant);
            }
            binding.value = value;
            return Ok(());
        }
        match &self.parent {
            Some(parent) => parent.assign(name, value),
            None => Err(AssignError::Undeclared),
        }
    }

    /// Drop every binding; breaks closure reference cycles once a run ends.
    pub fn clear(&self) {
        let drained: Vec<Binding> = self.vars.borrow_mut().drain().map(|(_, b)| b).collect();
        drop(drained);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_format_like_javascript() {
        assert_eq!(format_number(3.0), "3");
        assert_eq!(format_number(-0.0), "0");
        assert_eq!(format_number(0.5), "0.5");
        assert_eq!(format_number(f64::NAN), "NaN");
        assert_eq!(format_number(f64::NEG_INFINITY), "-Infinity");
        assert_eq!(format_number(1e21), "1000000000000000000000");
    }

    #[test]
    fn console_formatting_renders_structures_as_json() {
        let value = Value::object(vec![
            ("name", Value::str("Ada")),
            ("tags", Value::array(vec![Value::Number(1.0), Value::Null, Value::Bool(true)])),
            ("skip", Value::Undefined),
        ]);
        assert_eq!(value.to_console(), r#"{"name":"Ada","tags":[1,null,true]}"#);
        assert_eq!(Value::Undefined.to_console(), "undefined");
        assert_eq!(Value::Null.to_console(), "null");
        assert_eq!(Value::error("TypeError", "bad").to_console(), "TypeError: bad");
    }

    #[test]
    fn circular_structures_do_not_recurse_forever() {
        let list = Value::array(vec![]);
        if let Value::Array(items) = &list {
            items.borrow_mut().push(list.clone());
        }
        assert_eq!(list.to_console(), r#"["[Circular]"]"#);
    }

    #[test]
    fn cyclic_arrays_display_without_recursing() {
        let list = Value::array(vec![Value::Number(1.0)]);
        if let Value::Array(items) = &list {
            items.borrow_mut().push(list.clone());
        }
        assert_eq!(list.to_display(), "1,");
    }

    #[test]
    fn deep_nesting_is_cut_off_when_formatting() {
        let mut value = Value::Number(0.0);
        for _ in 0..1_000 {
            value = Value::array(vec![value]);
        }
        let json = value.to_console();
        assert!(json.starts_with("[[[["));
        assert!(json.contains("\"[Array]\""));
        assert_eq!(value.to_display(), "");
    }

    #[test]
    fn oversized_strings_and_arrays_are_range_errors() {
        assert!(check_string_length(MAX_STRING_LENGTH).is_ok());
        assert!(matches!(check_string_length(MAX_STRING_LENGTH + 1), Err(Unwind::Throw(_))));

        let mut items = vec![Value::Null];
        assert!(resize_array(&mut items, 3).is_ok());
        assert_eq!(items.len(), 3);
        assert!(resize_array(&mut items, MAX_ARRAY_LENGTH + 1).is_err());
        assert!(resize_array(&mut items, MAX_DENSE_ELEMENTS + 1).is_err());
        assert_eq!(items.len(), 3);
        assert!(resize_array(&mut items, 0).is_ok());
        assert!(items.is_empty());
    }

    #[test]
    fn loose_and_strict_equality() {
        assert!(Value::Number(1.0).loose_equals(&Value::str("1")));
        assert!(!Value::Number(1.0).strict_equals(&Value::str("1")));
        assert!(Value::Null.loose_equals(&Value::Undefined));
        assert!(!Value::Null.strict_equals(&Value::Undefined));
    }

    #[test]
    fn numeric_parsing_is_strict() {
        assert_eq!(parse_numeric(" 42 "), 42.0);
        assert_eq!(parse_numeric(""), 0.0);
        assert!(parse_numeric("42px").is_nan());
    }

    #[test]
    fn const_bindings_reject_assignment() {
        let root = Env::root();
        root.declare("x", Value::Number(1.0), false);
        let child = Env::child(&root);
        assert_eq!(child.assign("x", Value::Number(2.0)), Err(AssignError::Constant));
        assert_eq!(child.assign("y", Value::Number(2.0)), Err(AssignError::Undeclared));
    }
}
