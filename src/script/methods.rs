//! Built-in methods on strings, arrays and numbers.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::rc::Rc;

use super::interp::{Interpreter, Unwind};
use super::value::{check_string_length, format_number, Value, MAX_STRING_LENGTH};

pub async fn call_method(
    interp: &Interpreter,
    receiver: &Value,
    name: &str,
    args: Vec<Value>,
    describe: &str,
) -> Result<Value, Unwind> {
    let result = match receiver {
        Value::Str(s) => string_method(s, name, &args)?,
        Value::Array(items) => array_method(interp, receiver, items, name, &args).await?,
        Value::Number(n) => number_method(*n, name, &args)?,
        _ => None,
    };
    result.ok_or_else(|| Unwind::type_error(format!("{describe} is not a function")))
}

fn arg(args: &[Value], index: usize) -> Value {
    args.get(index).cloned().unwrap_or_default()
}

/// Resolve a possibly negative relative index against `len`.
fn relative_index(value: &Value, len: usize, default: usize) -> usize {
    if matches!(value, Value::Undefined) {
        return default;
    }
    let n = value.to_number();
    let n = if n.is_nan() { 0.0 } else { n.trunc() };
    if n < 0.0 {
        (len as f64 + n).max(0.0) as usize
    } else {
        (n as usize).min(len)
    }
}

fn char_index_of(haystack: &str, needle: &str) -> Option<usize> {
    haystack.find(needle).map(|byte| haystack[..byte].chars().count())
}

fn pad(s: &str, args: &[Value], at_start: bool) -> Result<Value, Unwind> {
    let target = arg(args, 0).to_number();
    let fill = match arg(args, 1) {
        Value::Undefined => " ".to_string(),
        other => other.to_display(),
    };
    let len = s.chars().count();
    if target.is_nan() || target <= len as f64 || fill.is_empty() {
        return Ok(Value::str(s));
    }
    if target > MAX_STRING_LENGTH as f64 {
        return Err(Unwind::range_error("Invalid string length"));
    }
    let missing = target as usize - len;
    let fill_chars = fill.chars().count();
    check_string_length(s.len() + missing.div_ceil(fill_chars) * fill.len())?;
    let padding: String = fill.chars().cycle().take(missing).collect();
    Ok(if at_start {
        Value::from(format!("{padding}{s}"))
    } else {
        Value::from(format!("{s}{padding}"))
    })
}

fn string_method(s: &Rc<str>, name: &str, args: &[Value]) -> Result<Option<Value>, Unwind> {
    let text = || arg(args, 0).to_display();
    let value = match name {
        "toUpperCase" => Value::from(s.to_uppercase()),
        "toLowerCase" => Value::from(s.to_lowercase()),
        "trim" => Value::str(s.trim()),
        "trimStart" => Value::str(s.trim_start()),
        "trimEnd" => Value::str(s.trim_end()),
        "toString" => Value::Str(s.clone()),
        "includes" => Value::Bool(s.contains(text().as_str())),
        "startsWith" => Value::Bool(s.starts_with(text().as_str())),
        "endsWith" => Value::Bool(s.ends_with(text().as_str())),
        "indexOf" => Value::Number(char_index_of(s, &text()).map_or(-1.0, |i| i as f64)),
        "charAt" => {
            let i = arg(args, 0).to_number();
            let i = if i.is_nan() { 0.0 } else { i };
            let c = if i < 0.0 { None } else { s.chars().nth(i as usize) };
            Value::from(c.map(String::from).unwrap_or_default())
        }
        "slice" => {
            let chars: Vec<char> = s.chars().collect();
            let start = relative_index(&arg(args, 0), chars.len(), 0);
            let end = relative_index(&arg(args, 1), chars.len(), chars.len());
            Value::from(if start < end { chars[start..end].iter().collect() } else { String::new() })
        }
        "split" => match arg(args, 0) {
            Value::Undefined => Value::array(vec![Value::Str(s.clone())]),
            sep => {
                let sep = sep.to_display();
                let parts: Vec<Value> = if sep.is_empty() {
                    s.chars().map(|c| Value::from(c.to_string())).collect()
                } else {
                    s.split(sep.as_str()).map(Value::str).collect()
                };
                Value::array(parts)
            }
        },
        "repeat" => {
            let count = arg(args, 0).to_number();
            if count < 0.0 || count.is_infinite() {
                return Err(Unwind::range_error(format!("Invalid count value: {}", format_number(count))));
            }
            let count = if count.is_nan() { 0.0 } else { count.trunc() };
            if s.is_empty() || count == 0.0 {
                Value::str("")
            } else {
                if count * s.len() as f64 > MAX_STRING_LENGTH as f64 {
                    return Err(Unwind::range_error("Invalid string length"));
                }
                Value::from(s.repeat(count as usize))
            }
        }
        "padStart" => pad(s, args, true)?,
        "padEnd" => pad(s, args, false)?,
        "replace" => Value::from(s.replacen(text().as_str(), &arg(args, 1).to_display(), 1)),
        "replaceAll" => {
            let pattern = text();
            let replacement = arg(args, 1).to_display();
            let hits = s.matches(pattern.as_str()).count();
            check_string_length(s.len() + hits.saturating_mul(replacement.len()))?;
            Value::from(s.replace(pattern.as_str(), &replacement))
        }
        _ => return Ok(None),
    };
    Ok(Some(value))
}

fn number_method(n: f64, name: &str, args: &[Value]) -> Result<Option<Value>, Unwind> {
    let value = match name {
        "toFixed" => {
            let digits = match arg(args, 0) {
                Value::Undefined => 0.0,
                other => other.to_number(),
            };
            if !(0.0..=100.0).contains(&digits) {
                return Err(Unwind::range_error("toFixed() digits argument must be between 0 and 100"));
            }
            if n.is_finite() {
                Value::from(format!("{:.*}", digits as usize, n))
            } else {
                Value::from(format_number(n))
            }
        }
        "toString" => Value::from(format_number(n)),
        _ => return Ok(None),
    };
    Ok(Some(value))
}

async fn array_method(
    interp: &Interpreter,
    receiver: &Value,
    items: &Rc<RefCell<Vec<Value>>>,
    name: &str,
    args: &[Value],
) -> Result<Option<Value>, Unwind> {
    let value = match name {
        "push" => {
            let mut items = items.borrow_mut();
            items.extend(args.iter().cloned());
            Value::Number(items.len() as f64)
        }
        "pop" => items.borrow_mut().pop().unwrap_or_default(),
        "shift" => {
            let mut items = items.borrow_mut();
            if items.is_empty() {
                Value::Undefined
            } else {
                items.remove(0)
            }
        }
        "unshift" => {
            let mut items = items.borrow_mut();
            for (i, value) in args.iter().enumerate() {
                items.insert(i, value.clone());
            }
            Value::Number(items.len() as f64)
        }
        "join" => {
            let sep = match arg(args, 0) {
                Value::Undefined => ",".to_string(),
                other => other.to_display(),
            };
            let parts: Vec<String> = items
                .borrow()
                .iter()
                .map(|v| if v.is_nullish() { String::new() } else { v.to_display() })
                .collect();
            let total = parts.iter().map(String::len).sum::<usize>()
                + parts.len().saturating_sub(1).saturating_mul(sep.len());
            check_string_length(total)?;
            Value::from(parts.join(&sep))
        }
        "toString" => Value::from(receiver.to_display()),
        "includes" => {
            let needle = arg(args, 0);
            Value::Bool(items.borrow().iter().any(|v| v.strict_equals(&needle) || both_nan(v, &needle)))
        }
        "indexOf" => {
            let needle = arg(args, 0);
            let position = items.borrow().iter().position(|v| v.strict_equals(&needle));
            Value::Number(position.map_or(-1.0, |i| i as f64))
        }
        "slice" => {
            let items = items.borrow();
            let start = relative_index(&arg(args, 0), items.len(), 0);
            let end = relative_index(&arg(args, 1), items.len(), items.len());
            Value::array(if start < end { items[start..end].to_vec() } else { Vec::new() })
        }
        "reverse" => {
            items.borrow_mut().reverse();
            receiver.clone()
        }
        "concat" => {
            let mut out = items.borrow().clone();
            for value in args {
                match value {
                    Value::Array(other) => out.extend(other.borrow().iter().cloned()),
                    other => out.push(other.clone()),
                }
            }
            Value::array(out)
        }
        "sort" => {
            sort(interp, items, &arg(args, 0)).await?;
            receiver.clone()
        }
        "map" | "filter" | "forEach" | "find" | "findIndex" | "some" | "every" => {
            iterate(interp, receiver, items, name, args).await?
        }
        "reduce" => {
            let callback = callable(args, "reduce")?;
            let snapshot = items.borrow().clone();
            let mut entries = snapshot.into_iter().enumerate();
            let mut acc = match args.get(1) {
                Some(initial) => initial.clone(),
                None => match entries.next() {
                    Some((_, first)) => first,
                    None => return Err(Unwind::type_error("Reduce of empty array with no initial value")),
                },
            };
            for (i, item) in entries {
                acc = interp
                    .call_value(&callback, vec![acc, item, Value::Number(i as f64), receiver.clone()])
                    .await?;
            }
            acc
        }
        _ => return Ok(None),
    };
    Ok(Some(value))
}

fn both_nan(a: &Value, b: &Value) -> bool {
    matches!((a, b), (Value::Number(x), Value::Number(y)) if x.is_nan() && y.is_nan())
}

fn callable(args: &[Value], method: &str) -> Result<Value, Unwind> {
    let callback = arg(args, 0);
    if callback.is_callable() {
        Ok(callback)
    } else {
        Err(Unwind::type_error(format!(
            "{} is not a function (in Array.prototype.{method})",
            callback.to_console()
        )))
    }
}

/// The callback-driven methods. Iterates over a snapshot so the callback may
/// mutate the array.
async fn iterate(
    interp: &Interpreter,
    receiver: &Value,
    items: &Rc<RefCell<Vec<Value>>>,
    name: &str,
    args: &[Value],
) -> Result<Value, Unwind> {
    let callback = callable(args, name)?;
    let snapshot = items.borrow().clone();
    let mut mapped = Vec::new();
    for (i, item) in snapshot.into_iter().enumerate() {
        let result = interp
            .call_value(&callback, vec![item.clone(), Value::Number(i as f64), receiver.clone()])
            .await?;
        match name {
            "map" => mapped.push(result),
            "filter" if result.truthy() => mapped.push(item),
            "find" if result.truthy() => return Ok(item),
            "findIndex" if result.truthy() => return Ok(Value::Number(i as f64)),
            "some" if result.truthy() => return Ok(Value::Bool(true)),
            "every" if !result.truthy() => return Ok(Value::Bool(false)),
            _ => {}
        }
    }
    Ok(match name {
        "map" | "filter" => Value::array(mapped),
        "findIndex" => Value::Number(-1.0),
        "some" => Value::Bool(false),
        "every" => Value::Bool(true),
        _ => Value::Undefined,
    })
}

/// Stable insertion sort; the comparator may be a script function.
async fn sort(interp: &Interpreter, items: &Rc<RefCell<Vec<Value>>>, comparator: &Value) -> Result<(), Unwind> {
    let mut sorted: Vec<Value> = Vec::new();
    let snapshot = items.borrow().clone();
    for item in snapshot {
        let mut at = sorted.len();
        while at > 0 {
            let ordering = compare(interp, comparator, &sorted[at - 1], &item).await?;
            if ordering != Ordering::Greater {
                break;
            }
            at -= 1;
        }
        sorted.insert(at, item);
    }
    *items.borrow_mut() = sorted;
    Ok(())
}

async fn compare(interp: &Interpreter, comparator: &Value, a: &Value, b: &Value) -> Result<Ordering, Unwind> {
    if a.is_nullish() || b.is_nullish() {
        return Ok(b.is_nullish().cmp(&a.is_nullish()).reverse());
    }
    if comparator.is_callable() {
        let n = interp.call_value(comparator, vec![a.clone(), b.clone()]).await?.to_number();
        return Ok(n.partial_cmp(&0.0).unwrap_or(Ordering::Equal));
    }
    Ok(a.to_display().cmp(&b.to_display()))
}
