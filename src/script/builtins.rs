//! Pure standard globals. Every binding is immutable and every namespace
//! object is frozen, so scripts cannot tamper with them.

use std::cell::Cell;
use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hasher};

use super::interp::Unwind;
use super::value::{Env, NativeFunction, ObjectClass, Value};

pub fn install(env: &Env) {
    env.declare("NaN", Value::Number(f64::NAN), false);
    env.declare("Infinity", Value::Number(f64::INFINITY), false);
    env.declare("Math", math(), false);
    env.declare("JSON", json(), false);
    env.declare("Object", object(), false);
    env.declare("Array", array(), false);

    env.declare("String", NativeFunction::sync("String", |args| Ok(Value::from(first(args).to_display()))), false);
    env.declare("Number", NativeFunction::sync("Number", |args| Ok(Value::Number(first(args).to_number()))), false);
    env.declare("Boolean", NativeFunction::sync("Boolean", |args| Ok(Value::Bool(first(args).truthy()))), false);
    env.declare("parseInt", NativeFunction::sync("parseInt", |args| Ok(Value::Number(parse_int(args)))), false);
    env.declare(
        "parseFloat",
        NativeFunction::sync("parseFloat", |args| Ok(Value::Number(parse_float(&first(args).to_display())))),
        false,
    );
    env.declare("isNaN", NativeFunction::sync("isNaN", |args| Ok(Value::Bool(first(args).to_number().is_nan()))), false);
    env.declare(
        "isFinite",
        NativeFunction::sync("isFinite", |args| Ok(Value::Bool(first(args).to_number().is_finite()))),
        false,
    );

    for name in ["Error", "TypeError", "RangeError", "ReferenceError", "SyntaxError"] {
        env.declare(name, error_constructor(name), false);
    }
}

fn first(args: &[Value]) -> Value {
    args.first().cloned().unwrap_or_default()
}

fn error_constructor(name: &'static str) -> Value {
    NativeFunction::sync(name, move |args| {
        let message = match first(args) {
            Value::Undefined => String::new(),
            other => other.to_display(),
        };
        Ok(Value::error(name, message))
    })
}

fn unary(name: &'static str, f: fn(f64) -> f64) -> (&'static str, Value) {
    (name, NativeFunction::sync(name, move |args| Ok(Value::Number(f(first(args).to_number())))))
}

fn math() -> Value {
    let seed = RandomState::new().build_hasher().finish() | 1;
    let state = Cell::new(seed);
    let random = NativeFunction::sync("random", move |_| {
        // xorshift64*
        let mut x = state.get();
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        state.set(x);
        let bits = x.wrapping_mul(0x2545_F491_4F6C_DD1D) >> 11;
        Ok(Value::Number(bits as f64 / (1u64 << 53) as f64))
    });

    Value::frozen_object(vec![
        ("PI", Value::Number(std::f64::consts::PI)),
        ("E", Value::Number(std::f64::consts::E)),
        unary("floor", f64::floor),
        unary("ceil", f64::ceil),
        // JavaScript rounds halves towards +Infinity.
        unary("round", |n| (n + 0.5).floor()),
        unary("abs", f64::abs),
        unary("sqrt", f64::sqrt),
        unary("trunc", f64::trunc),
        unary("sign", |n| if n.is_nan() || n == 0.0 { n } else { n.signum() }),
        (
            "pow",
            NativeFunction::sync("pow", |args| {
                let base = first(args).to_number();
                let exp = args.get(1).cloned().unwrap_or_default().to_number();
                Ok(Value::Number(base.powf(exp)))
            }),
        ),
        ("min", NativeFunction::sync("min", |args| Ok(Value::Number(fold(args, f64::INFINITY, f64::min))))),
        ("max", NativeFunction::sync("max", |args| Ok(Value::Number(fold(args, f64::NEG_INFINITY, f64::max))))),
        ("random", random),
    ])
}

fn fold(args: &[Value], init: f64, f: fn(f64, f64) -> f64) -> f64 {
    let mut acc = init;
    for arg in args {
        let n = arg.to_number();
        if n.is_nan() {
            return f64::NAN;
        }
        acc = f(acc, n);
    }
    acc
}

fn json() -> Value {
    Value::frozen_object(vec![
        (
            "stringify",
            NativeFunction::sync("stringify", |args| {
                let value = first(args);
                if matches!(value, Value::Undefined) || value.is_callable() {
                    return Ok(Value::Undefined);
                }
                let indent = args.get(2).map(Value::to_number).filter(|n| *n >= 1.0).map(|n| n as usize);
                Ok(Value::from(value.to_json(indent)))
            }),
        ),
        (
            "parse",
            NativeFunction::sync("parse", |args| {
                let text = first(args).to_display();
                serde_json::from_str::<serde_json::Value>(&text)
                    .map(|json| Value::from_json(&json))
                    .map_err(|e| Unwind::error("SyntaxError", format!("Unexpected token in JSON: {e}")))
            }),
        ),
    ])
}

fn object() -> Value {
    fn entries(value: &Value) -> Vec<(String, Value)> {
        match value {
            Value::Object(obj) => obj.borrow().entries().map(|(k, v)| (k.to_string(), v.clone())).collect(),
            Value::Array(items) => items.borrow().iter().enumerate().map(|(i, v)| (i.to_string(), v.clone())).collect(),
            _ => Vec::new(),
        }
    }

    Value::frozen_object(vec![
        (
            "keys",
            NativeFunction::sync("keys", |args| {
                Ok(Value::array(entries(&first(args)).into_iter().map(|(k, _)| Value::from(k)).collect()))
            }),
        ),
        (
            "values",
            NativeFunction::sync("values", |args| {
                Ok(Value::array(entries(&first(args)).into_iter().map(|(_, v)| v).collect()))
            }),
        ),
        (
            "entries",
            NativeFunction::sync("entries", |args| {
                let pairs = entries(&first(args))
                    .into_iter()
                    .map(|(k, v)| Value::array(vec![Value::from(k), v]))
                    .collect();
                Ok(Value::array(pairs))
            }),
        ),
        (
            "freeze",
            NativeFunction::sync("freeze", |args| {
                let value = first(args);
                if let Value::Object(obj) = &value {
                    if obj.borrow().class == ObjectClass::Plain {
                        obj.borrow_mut().frozen = true;
                    }
                }
                Ok(value)
            }),
        ),
    ])
}

fn array() -> Value {
    Value::frozen_object(vec![(
        "isArray",
        NativeFunction::sync("isArray", |args| Ok(Value::Bool(matches!(first(args), Value::Array(_))))),
    )])
}

fn parse_int(args: &[Value]) -> f64 {
    let text = first(args).to_display();
    let mut s = text.trim();
    let negative = s.starts_with('-');
    if negative || s.starts_with('+') {
        s = &s[1..];
    }
    let mut radix = match args.get(1).map(Value::to_number) {
        Some(r) if r.is_finite() && r != 0.0 => r as u32,
        _ => 10,
    };
    if (radix == 16 || args.get(1).map_or(true, Value::is_nullish)) && (s.starts_with("0x") || s.starts_with("0X")) {
        s = &s[2..];
        radix = 16;
    }
    if !(2..=36).contains(&radix) {
        return f64::NAN;
    }
    let digits: String = s.chars().take_while(|c| c.is_digit(radix)).collect();
    if digits.is_empty() {
        return f64::NAN;
    }
    let value = digits
        .chars()
        .filter_map(|c| c.to_digit(radix))
        .fold(0.0, |acc, d| acc * f64::from(radix) + f64::from(d));
    if negative {
        -value
    } else {
        value
    }
}

/// Longest numeric prefix, as `parseFloat` does.
fn parse_float(text: &str) -> f64 {
    let s = text.trim_start();
    for prefix in ["Infinity", "+Infinity"] {
        if s.starts_with(prefix) {
            return f64::INFINITY;
        }
    }
    if s.starts_with("-Infinity") {
        return f64::NEG_INFINITY;
    }
    let candidate: String = s
        .chars()
        .enumerate()
        .take_while(|(i, c)| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E') || (*i == 0 && matches!(c, '+' | '-')))
        .map(|(_, c)| c)
        .collect();
    (1..=candidate.len())
        .rev()
        .find_map(|end| candidate[..end].parse::<f64>().ok())
        .unwrap_or(f64::NAN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_int_follows_leading_digits() {
        assert_eq!(parse_int(&[Value::str("42px")]), 42.0);
        assert_eq!(parse_int(&[Value::str("  -17")]), -17.0);
        assert_eq!(parse_int(&[Value::str("0x1f")]), 31.0);
        assert_eq!(parse_int(&[Value::str("101"), Value::Number(2.0)]), 5.0);
        assert!(parse_int(&[Value::str("abc")]).is_nan());
    }

    #[test]
    fn parse_float_takes_the_longest_prefix() {
        assert_eq!(parse_float("3.14abc"), 3.14);
        assert_eq!(parse_float("1e3x"), 1000.0);
        assert_eq!(parse_float("-.5"), -0.5);
        assert!(parse_float("x1").is_nan());
    }

    #[test]
    fn globals_are_immutable() {
        let env = Env::root();
        install(&env);
        assert!(env.assign("Math", Value::Null).is_err());
        match env.get("Math") {
            Some(Value::Object(obj)) => assert!(obj.borrow().frozen),
            other => panic!("unexpected Math binding: {other:?}"),
        }
    }
}
