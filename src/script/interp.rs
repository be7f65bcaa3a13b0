//! Async tree-walking evaluator.
//!
//! Every recursive step returns a boxed local future so that a native
//! function (the sandbox's `prompt`, for instance) can suspend the whole
//! script at an `await` and hand control back to the event loop. The
//! evaluator also counts steps: at each one it asks its owner whether the
//! run is still live, and every `yield_interval` steps it yields so that a
//! busy loop cannot starve the rest of the single-threaded runtime.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use futures::future::LocalBoxFuture;
use futures::FutureExt;

use super::ast::{BinaryOp, Expr, FunctionBody, LogicalOp, Program, Stmt, StmtKind, UnaryOp};
use super::methods;
use super::value::{
    check_string_length, error_summary, resize_array, AssignError, Closure, Env, NativeCall, ObjectClass, Value,
    MAX_ARRAY_LENGTH,
};
use crate::engine::{Location, ScriptError};

/// A thrown script value and the line of the innermost statement it escaped.
#[derive(Debug, Clone)]
pub struct Thrown {
    pub value: Value,
    pub line: Option<usize>,
}

/// Non-local exits that travel up through evaluation.
#[derive(Debug, Clone)]
pub enum Unwind {
    /// A catchable exception.
    Throw(Thrown),
    /// Ends the run and bypasses `catch`.
    Abort(ScriptError),
}

impl Unwind {
    pub fn throw(value: Value) -> Self {
        Unwind::Throw(Thrown { value, line: None })
    }

    pub fn error(name: &str, message: impl Into<String>) -> Self {
        Self::throw(Value::error(name, message))
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::error("TypeError", message)
    }

    pub fn range_error(message: impl Into<String>) -> Self {
        Self::error("RangeError", message)
    }

    pub fn reference_error(message: impl Into<String>) -> Self {
        Self::error("ReferenceError", message)
    }

    fn at_line(self, line: usize) -> Self {
        match self {
            Unwind::Throw(Thrown { value, line: None }) => Unwind::Throw(Thrown { value, line: Some(line) }),
            other => other,
        }
    }

    pub fn into_error(self) -> ScriptError {
        match self {
            Unwind::Throw(Thrown { value, line }) => {
                let message = match &value {
                    Value::Object(obj) if obj.borrow().class == ObjectClass::Error => error_summary(&obj.borrow()),
                    other => format!("Uncaught {}", other.to_console()),
                };
                ScriptError::Uncaught { message, location: Location(line) }
            }
            Unwind::Abort(err) => err,
        }
    }
}

impl From<ScriptError> for Unwind {
    fn from(err: ScriptError) -> Self {
        Unwind::Abort(err)
    }
}

enum Flow {
    Normal,
    Return(Value),
    Break,
    Continue,
}

#[derive(Debug, Clone, Copy)]
pub struct InterpreterOptions {
    /// Steps between cooperative yields; 0 disables yielding.
    pub yield_interval: u64,
    pub max_call_depth: usize,
}

impl Default for InterpreterOptions {
    fn default() -> Self {
        Self { yield_interval: 1000, max_call_depth: 256 }
    }
}

struct Inner {
    options: InterpreterOptions,
    steps: Cell<u64>,
    depth: Cell<usize>,
    live: Box<dyn Fn() -> bool>,
}

/// Cheap to clone; clones share step and depth counters.
#[derive(Clone)]
pub struct Interpreter {
    inner: Rc<Inner>,
}

impl fmt::Debug for Interpreter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interpreter")
            .field("options", &self.inner.options)
            .field("steps", &self.inner.steps.get())
            .finish()
    }
}

struct DepthGuard<'a>(&'a Cell<usize>);

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.0.set(self.0.get().saturating_sub(1));
    }
}

impl Interpreter {
    /// `live` is consulted at every step; returning false cancels the run.
    pub fn new(options: InterpreterOptions, live: impl Fn() -> bool + 'static) -> Self {
        Self {
            inner: Rc::new(Inner { options, steps: Cell::new(0), depth: Cell::new(0), live: Box::new(live) }),
        }
    }

    pub fn steps(&self) -> u64 {
        self.inner.steps.get()
    }

    pub async fn run(&self, program: &Program, env: &Rc<Env>) -> Result<(), Unwind> {
        self.exec_block(&program.body, env).await.map(|_| ())
    }

    /// Call a function value from native code (timer callbacks, array methods).
    pub fn call_value<'a>(&'a self, callee: &'a Value, args: Vec<Value>) -> LocalBoxFuture<'a, Result<Value, Unwind>> {
        self.invoke(callee, args, false, "callback")
    }

    async fn tick(&self) -> Result<(), Unwind> {
        if !(self.inner.live)() {
            return Err(ScriptError::Cancelled.into());
        }
        let steps = self.inner.steps.get() + 1;
        self.inner.steps.set(steps);
        let interval = self.inner.options.yield_interval;
        if interval > 0 && steps % interval == 0 {
            tokio::task::yield_now().await;
            if !(self.inner.live)() {
                return Err(ScriptError::Cancelled.into());
            }
        }
        Ok(())
    }

    fn hoist(&self, stmts: &[Stmt], env: &Rc<Env>) {
        for stmt in stmts {
            if let StmtKind::Function(decl) = &stmt.kind {
                if let Some(name) = &decl.name {
                    let closure = Closure { decl: decl.clone(), env: env.clone() };
                    env.declare(name.clone(), Value::Function(Rc::new(closure)), true);
                }
            }
        }
    }

    fn exec_block<'a>(&'a self, stmts: &'a [Stmt], env: &'a Rc<Env>) -> LocalBoxFuture<'a, Result<Flow, Unwind>> {
        async move {
            self.hoist(stmts, env);
            for stmt in stmts {
                match self.exec_stmt(stmt, env).await? {
                    Flow::Normal => {}
                    flow => return Ok(flow),
                }
            }
            Ok(Flow::Normal)
        }
        .boxed_local()
    }

    fn exec_stmt<'a>(&'a self, stmt: &'a Stmt, env: &'a Rc<Env>) -> LocalBoxFuture<'a, Result<Flow, Unwind>> {
        async move {
            self.tick().await?;
            self.exec_kind(&stmt.kind, env).await.map_err(|u| u.at_line(stmt.line))
        }
        .boxed_local()
    }

    async fn exec_kind(&self, kind: &StmtKind, env: &Rc<Env>) -> Result<Flow, Unwind> {
        match kind {
            StmtKind::Declare { name, init, mutable } => {
                let value = match init {
                    Some(expr) => self.eval(expr, env).await?,
                    None => Value::Undefined,
                };
                env.declare(name.clone(), value, *mutable);
                Ok(Flow::Normal)
            }
            StmtKind::Expr(expr) => {
                self.eval(expr, env).await?;
                Ok(Flow::Normal)
            }
            StmtKind::If { cond, then, otherwise } => {
                if self.eval(cond, env).await?.truthy() {
                    self.exec_stmt(then, env).await
                } else if let Some(otherwise) = otherwise {
                    self.exec_stmt(otherwise, env).await
                } else {
                    Ok(Flow::Normal)
                }
            }
            StmtKind::While { cond, body } => {
                while self.eval(cond, env).await?.truthy() {
                    match self.exec_stmt(body, env).await? {
                        Flow::Break => break,
                        Flow::Return(v) => return Ok(Flow::Return(v)),
                        Flow::Normal | Flow::Continue => {}
                    }
                    self.tick().await?;
                }
                Ok(Flow::Normal)
            }
            StmtKind::DoWhile { body, cond } => {
                loop {
                    match self.exec_stmt(body, env).await? {
                        Flow::Break => break,
                        Flow::Return(v) => return Ok(Flow::Return(v)),
                        Flow::Normal | Flow::Continue => {}
                    }
                    if !self.eval(cond, env).await?.truthy() {
                        break;
                    }
                    self.tick().await?;
                }
                Ok(Flow::Normal)
            }
            StmtKind::For { init, cond, update, body } => self.exec_for(init.as_deref(), cond.as_ref(), update.as_ref(), body, env).await,
            StmtKind::ForOf { name, mutable, iterable, body } => {
                let items = match self.eval(iterable, env).await? {
                    Value::Array(items) => items.borrow().clone(),
                    Value::Str(s) => s.chars().map(|c| Value::str(c.to_string())).collect(),
                    other => return Err(Unwind::type_error(format!("{} is not iterable", other.to_console()))),
                };
                for item in items {
                    self.tick().await?;
                    let scope = Env::child(env);
                    scope.declare(name.clone(), item, *mutable);
                    match self.exec_stmt(body, &scope).await? {
                        Flow::Break => break,
                        Flow::Return(v) => return Ok(Flow::Return(v)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
                Ok(Flow::Normal)
            }
            StmtKind::Block(body) => {
                let scope = Env::child(env);
                self.exec_block(body, &scope).await
            }
            StmtKind::Function(decl) => {
                // Already hoisted when it sits directly in a block.
                if let Some(name) = &decl.name {
                    if env.get(name).is_none() {
                        let closure = Closure { decl: decl.clone(), env: env.clone() };
                        env.declare(name.clone(), Value::Function(Rc::new(closure)), true);
                    }
                }
                Ok(Flow::Normal)
            }
            StmtKind::Return(expr) => {
                let value = match expr {
                    Some(expr) => self.eval(expr, env).await?,
                    None => Value::Undefined,
                };
                Ok(Flow::Return(value))
            }
            StmtKind::Break => Ok(Flow::Break),
            StmtKind::Continue => Ok(Flow::Continue),
            StmtKind::Throw(expr) => {
                let value = self.eval(expr, env).await?;
                Err(Unwind::throw(value))
            }
            StmtKind::Try { body, param, handler, finalizer } => {
                let outcome = self.exec_block(body, &Env::child(env)).await;
                let outcome = match (outcome, handler) {
                    (Err(Unwind::Throw(thrown)), Some(handler)) => {
                        let scope = Env::child(env);
                        if let Some(param) = param {
                            scope.declare(param.clone(), thrown.value, true);
                        }
                        self.exec_block(handler, &scope).await
                    }
                    (outcome, _) => outcome,
                };
                if let Some(finalizer) = finalizer {
                    if matches!(outcome, Err(Unwind::Abort(_))) {
                        return outcome;
                    }
                    match self.exec_block(finalizer, &Env::child(env)).await? {
                        Flow::Normal => {}
                        flow => return Ok(flow),
                    }
                }
                outcome
            }
            StmtKind::Empty => Ok(Flow::Normal),
        }
    }

    /// C-style `for`; a `let` loop variable gets a fresh binding per iteration
    /// so closures created in the body capture that iteration's value.
    async fn exec_for(
        &self,
        init: Option<&Stmt>,
        cond: Option<&Expr>,
        update: Option<&Expr>,
        body: &Stmt,
        env: &Rc<Env>,
    ) -> Result<Flow, Unwind> {
        let scope = Env::child(env);
        let mut loop_var = None;
        if let Some(init) = init {
            if let StmtKind::Declare { name, mutable, .. } = &init.kind {
                loop_var = Some((name.as_str(), *mutable));
            }
            self.exec_stmt(init, &scope).await?;
        }

        loop {
            self.tick().await?;
            if let Some(cond) = cond {
                if !self.eval(cond, &scope).await?.truthy() {
                    break;
                }
            }

            let body_env = match loop_var {
                Some((name, mutable)) => {
                    let iteration = Env::child(&scope);
                    iteration.declare(name, scope.get(name).unwrap_or_default(), mutable);
                    iteration
                }
                None => scope.clone(),
            };
            let flow = self.exec_stmt(body, &body_env).await?;
            if let Some((name, true)) = loop_var {
                if let Some(value) = body_env.get(name) {
                    // The loop variable is declared in `scope`, so this cannot fail.
                    let _ = scope.assign(name, value);
                }
            }
            match flow {
                Flow::Break => break,
                Flow::Return(v) => return Ok(Flow::Return(v)),
                Flow::Normal | Flow::Continue => {}
            }

            if let Some(update) = update {
                self.eval(update, &scope).await?;
            }
        }
        Ok(Flow::Normal)
    }

    fn eval<'a>(&'a self, expr: &'a Expr, env: &'a Rc<Env>) -> LocalBoxFuture<'a, Result<Value, Unwind>> {
        async move {
            match expr {
                Expr::Number(n) => Ok(Value::Number(*n)),
                Expr::Str(s) => Ok(Value::Str(s.clone())),
                Expr::Bool(b) => Ok(Value::Bool(*b)),
                Expr::Null => Ok(Value::Null),
                Expr::Undefined => Ok(Value::Undefined),
                Expr::Ident(name) => env
                    .get(name)
                    .ok_or_else(|| Unwind::reference_error(format!("{name} is not defined"))),
                Expr::Array(items) => {
                    let mut out = Vec::with_capacity(items.len());
                    for item in items {
                        out.push(self.eval(item, env).await?);
                    }
                    Ok(Value::array(out))
                }
                Expr::Object(props) => {
                    let mut values = Vec::with_capacity(props.len());
                    for (key, value) in props {
                        values.push((key.as_str(), self.eval(value, env).await?));
                    }
                    Ok(Value::object(values))
                }
                Expr::Function(decl) => Ok(Value::Function(Rc::new(Closure { decl: decl.clone(), env: env.clone() }))),
                Expr::Unary { op, expr } => self.eval_unary(*op, expr, env).await,
                Expr::Binary { op, left, right } => {
                    let left = self.eval(left, env).await?;
                    let right = self.eval(right, env).await?;
                    binary_op(*op, &left, &right)
                }
                Expr::Logical { op, left, right } => {
                    let left = self.eval(left, env).await?;
                    let short_circuit = match op {
                        LogicalOp::And => !left.truthy(),
                        LogicalOp::Or => left.truthy(),
                        LogicalOp::Nullish => !left.is_nullish(),
                    };
                    if short_circuit {
                        Ok(left)
                    } else {
                        self.eval(right, env).await
                    }
                }
                Expr::Conditional { cond, then, otherwise } => {
                    if self.eval(cond, env).await?.truthy() {
                        self.eval(then, env).await
                    } else {
                        self.eval(otherwise, env).await
                    }
                }
                Expr::Assign { target, op, value } => {
                    let value = match op {
                        None => self.eval(value, env).await?,
                        Some(op) => {
                            let current = self.eval(target, env).await?;
                            let rhs = self.eval(value, env).await?;
                            binary_op(*op, &current, &rhs)?
                        }
                    };
                    self.assign_to(target, value.clone(), env).await?;
                    Ok(value)
                }
                Expr::Update { target, delta, prefix } => {
                    let old = self.eval(target, env).await?.to_number();
                    let new = old + delta;
                    self.assign_to(target, Value::Number(new), env).await?;
                    Ok(Value::Number(if *prefix { new } else { old }))
                }
                Expr::Member { object, property, optional } => {
                    let object = self.eval(object, env).await?;
                    if *optional && object.is_nullish() {
                        return Ok(Value::Undefined);
                    }
                    get_property(&object, property)
                }
                Expr::Index { object, index } => {
                    let object = self.eval(object, env).await?;
                    let index = self.eval(index, env).await?;
                    get_index(&object, &index)
                }
                Expr::Call { callee, args } => self.eval_call(callee, args, false, env).await,
                Expr::New { callee, args } => {
                    let constructor = self.eval(callee, env).await?;
                    let args = self.eval_args(args, env).await?;
                    match &constructor {
                        Value::Native(_) => self.invoke(&constructor, args, false, &callee.describe()).await,
                        _ => Err(Unwind::type_error(format!("{} is not a constructor", callee.describe()))),
                    }
                }
                Expr::Await(inner) => match inner.as_ref() {
                    Expr::Call { callee, args } => self.eval_call(callee, args, true, env).await,
                    other => self.eval(other, env).await,
                },
            }
        }
        .boxed_local()
    }

    async fn eval_unary(&self, op: UnaryOp, expr: &Expr, env: &Rc<Env>) -> Result<Value, Unwind> {
        if op == UnaryOp::Typeof {
            if let Expr::Ident(name) = expr {
                if env.get(name).is_none() {
                    return Ok(Value::str("undefined"));
                }
            }
        }
        let value = self.eval(expr, env).await?;
        Ok(match op {
            UnaryOp::Not => Value::Bool(!value.truthy()),
            UnaryOp::Neg => Value::Number(-value.to_number()),
            UnaryOp::Plus => Value::Number(value.to_number()),
            UnaryOp::Typeof => Value::str(value.type_name()),
        })
    }

    async fn eval_args(&self, args: &[Expr], env: &Rc<Env>) -> Result<Vec<Value>, Unwind> {
        let mut out = Vec::with_capacity(args.len());
        for arg in args {
            out.push(self.eval(arg, env).await?);
        }
        Ok(out)
    }

    async fn eval_call(&self, callee: &Expr, args: &[Expr], awaited: bool, env: &Rc<Env>) -> Result<Value, Unwind> {
        if let Expr::Member { object, property, optional } = callee {
            let receiver = self.eval(object, env).await?;
            if *optional && receiver.is_nullish() {
                return Ok(Value::Undefined);
            }
            let args = self.eval_args(args, env).await?;
            return match &receiver {
                Value::Str(_) | Value::Array(_) | Value::Number(_) => {
                    methods::call_method(self, &receiver, property, args, &callee.describe()).await
                }
                _ => {
                    let function = get_property(&receiver, property)?;
                    self.invoke(&function, args, awaited, &callee.describe()).await
                }
            };
        }

        let function = self.eval(callee, env).await?;
        let args = self.eval_args(args, env).await?;
        self.invoke(&function, args, awaited, &callee.describe()).await
    }

    fn invoke<'a>(
        &'a self,
        function: &'a Value,
        args: Vec<Value>,
        awaited: bool,
        describe: &str,
    ) -> LocalBoxFuture<'a, Result<Value, Unwind>> {
        let not_callable = format!("{describe} is not a function");
        async move {
            match function {
                Value::Function(closure) => self.call_closure(closure.clone(), args).await,
                Value::Native(native) => native.invoke(NativeCall { args, awaited, interp: self.clone() }).await,
                _ => Err(Unwind::type_error(not_callable)),
            }
        }
        .boxed_local()
    }

    fn call_closure(&self, closure: Rc<Closure>, args: Vec<Value>) -> LocalBoxFuture<'_, Result<Value, Unwind>> {
        async move {
            self.tick().await?;
            let depth = self.inner.depth.get();
            if depth >= self.inner.options.max_call_depth {
                return Err(Unwind::range_error("Maximum call stack size exceeded"));
            }
            self.inner.depth.set(depth + 1);
            let _guard = DepthGuard(&self.inner.depth);

            let scope = Env::child(&closure.env);
            for (i, param) in closure.decl.params.iter().enumerate() {
                scope.declare(param.clone(), args.get(i).cloned().unwrap_or_default(), true);
            }
            match &closure.decl.body {
                FunctionBody::Block(body) => match self.exec_block(body, &scope).await? {
                    Flow::Return(value) => Ok(value),
                    _ => Ok(Value::Undefined),
                },
                FunctionBody::Expr(expr) => self.eval(expr, &scope).await,
            }
        }
        .boxed_local()
    }

    async fn assign_to(&self, target: &Expr, value: Value, env: &Rc<Env>) -> Result<(), Unwind> {
        match target {
            Expr::Ident(name) => env.assign(name, value).map_err(|err| match err {
                AssignError::Constant => Unwind::type_error(format!("Assignment to constant variable '{name}'")),
                AssignError::Undeclared => Unwind::reference_error(format!("{name} is not defined")),
            }),
            Expr::Member { object, property, .. } => {
                let object = self.eval(object, env).await?;
                set_property(&object, property, value)
            }
            Expr::Index { object, index } => {
                let object = self.eval(object, env).await?;
                let index = self.eval(index, env).await?;
                match (&object, &index) {
                    (Value::Array(items), Value::Number(n))
                        if n.fract() == 0.0 && *n >= 0.0 && *n < MAX_ARRAY_LENGTH as f64 =>
                    {
                        let i = *n as usize;
                        let mut items = items.borrow_mut();
                        if i >= items.len() {
                            resize_array(&mut items, i + 1)?;
                        }
                        items[i] = value;
                        Ok(())
                    }
                    _ => set_property(&object, &index.to_display(), value),
                }
            }
            _ => Err(Unwind::error("SyntaxError", "Invalid assignment target")),
        }
    }
}

fn nullish_name(value: &Value) -> &'static str {
    if matches!(value, Value::Null) {
        "null"
    } else {
        "undefined"
    }
}

pub fn get_property(object: &Value, name: &str) -> Result<Value, Unwind> {
    match object {
        Value::Undefined | Value::Null => Err(Unwind::type_error(format!(
            "Cannot read properties of {} (reading '{name}')",
            nullish_name(object)
        ))),
        Value::Str(s) if name == "length" => Ok(Value::Number(s.chars().count() as f64)),
        Value::Array(items) if name == "length" => Ok(Value::Number(items.borrow().len() as f64)),
        Value::Object(obj) => Ok(obj.borrow().get(name).unwrap_or_default()),
        Value::Native(native) if name == "name" => Ok(Value::str(&native.name)),
        Value::Function(closure) if name == "name" => Ok(Value::str(closure.decl.name.as_deref().unwrap_or(""))),
        _ => Ok(Value::Undefined),
    }
}

fn get_index(object: &Value, index: &Value) -> Result<Value, Unwind> {
    let position = match index {
        Value::Number(n) if n.fract() == 0.0 && *n >= 0.0 => Some(*n as usize),
        _ => None,
    };
    match (object, position) {
        (Value::Array(items), Some(i)) => Ok(items.borrow().get(i).cloned().unwrap_or_default()),
        (Value::Str(s), Some(i)) => Ok(s.chars().nth(i).map(|c| Value::str(c.to_string())).unwrap_or_default()),
        _ => get_property(object, &index.to_display()),
    }
}

fn set_property(object: &Value, name: &str, value: Value) -> Result<(), Unwind> {
    match object {
        Value::Undefined | Value::Null => Err(Unwind::type_error(format!(
            "Cannot set properties of {} (setting '{name}')",
            nullish_name(object)
        ))),
        Value::Object(obj) => {
            let mut obj = obj.borrow_mut();
            if obj.frozen {
                return Err(Unwind::type_error(format!("Cannot assign to read only property '{name}' of object")));
            }
            obj.set(name, value);
            Ok(())
        }
        Value::Array(items) if name == "length" => {
            let len = value.to_number();
            if len.fract() != 0.0 || !(0.0..=MAX_ARRAY_LENGTH as f64).contains(&len) {
                return Err(Unwind::range_error("Invalid array length"));
            }
            resize_array(&mut items.borrow_mut(), len as usize)
        }
        // Primitives silently ignore property writes.
        _ => Ok(()),
    }
}

fn is_primitive_numeric(value: &Value) -> bool {
    matches!(value, Value::Number(_) | Value::Bool(_) | Value::Null | Value::Undefined)
}

pub fn binary_op(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, Unwind> {
    let num = |f: fn(f64, f64) -> f64| Value::Number(f(left.to_number(), right.to_number()));
    Ok(match op {
        BinaryOp::Add => {
            if is_primitive_numeric(left) && is_primitive_numeric(right) {
                num(|a, b| a + b)
            } else {
                let (left, right) = (left.to_display(), right.to_display());
                check_string_length(left.len() + right.len())?;
                Value::from(left + &right)
            }
        }
        BinaryOp::Sub => num(|a, b| a - b),
        BinaryOp::Mul => num(|a, b| a * b),
        BinaryOp::Div => num(|a, b| a / b),
        BinaryOp::Rem => num(|a, b| a % b),
        BinaryOp::Eq => Value::Bool(left.loose_equals(right)),
        BinaryOp::NotEq => Value::Bool(!left.loose_equals(right)),
        BinaryOp::StrictEq => Value::Bool(left.strict_equals(right)),
        BinaryOp::StrictNotEq => Value::Bool(!left.strict_equals(right)),
        BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq => {
            let ordering = match (left, right) {
                (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
                _ => left.to_number().partial_cmp(&right.to_number()),
            };
            let result = match ordering {
                None => false,
                Some(ord) => match op {
                    BinaryOp::Lt => ord.is_lt(),
                    BinaryOp::LtEq => ord.is_le(),
                    BinaryOp::Gt => ord.is_gt(),
                    _ => ord.is_ge(),
                },
            };
            Value::Bool(result)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::value::NativeFunction;
    use crate::script::{builtins, parser::parse};
    use std::cell::RefCell;

    async fn run(src: &str) -> (Vec<String>, Result<(), ScriptError>) {
        run_with(src, InterpreterOptions::default()).await
    }

    /// Runs `src` with a `log` native that records its arguments.
    async fn run_with(src: &str, options: InterpreterOptions) -> (Vec<String>, Result<(), ScriptError>) {
        let program = parse(src).expect("parse");
        let log = Rc::new(RefCell::new(Vec::new()));
        let root = Env::root();
        builtins::install(&root);
        let sink = log.clone();
        root.declare(
            "log",
            NativeFunction::sync("log", move |args| {
                let line = args.iter().map(Value::to_console).collect::<Vec<_>>().join(" ");
                sink.borrow_mut().push(line);
                Ok(Value::Undefined)
            }),
            false,
        );
        let interp = Interpreter::new(options, || true);
        let env = Env::child(&root);
        let result = interp.run(&program, &env).await.map_err(Unwind::into_error);
        let lines = log.borrow().clone();
        (lines, result)
    }

    #[tokio::test]
    async fn arithmetic_and_string_concatenation() {
        let (lines, result) = run("log(1 + 2 * 3, '1' + 2, 7 % 4, 10 / 4, 'a' < 'b')").await;
        result.unwrap();
        assert_eq!(lines, ["7 12 3 2.5 true"]);
    }

    #[tokio::test]
    async fn closures_capture_per_iteration_bindings() {
        let src = "const fs = []\nfor (let i = 0; i < 3; i++) { fs.push(() => i) }\nlog(fs.map(f => f()))";
        let (lines, result) = run(src).await;
        result.unwrap();
        assert_eq!(lines, ["[0,1,2]"]);
    }

    #[tokio::test]
    async fn recursion_and_hoisting() {
        let src = "log(fact(5))\nfunction fact(n) { return n <= 1 ? 1 : n * fact(n - 1) }";
        let (lines, result) = run(src).await;
        result.unwrap();
        assert_eq!(lines, ["120"]);
    }

    #[tokio::test]
    async fn try_catch_finally_runs_in_order() {
        let src = "try { null.x } catch (e) { log(e.name, e.message) } finally { log('finally') }";
        let (lines, result) = run(src).await;
        result.unwrap();
        assert_eq!(lines, ["TypeError Cannot read properties of null (reading 'x')", "finally"]);
    }

    #[tokio::test]
    async fn uncaught_error_reports_the_innermost_line() {
        let src = "function f() {\n  return undefinedThing + 1\n}\nf()";
        let (_, result) = run(src).await;
        assert_eq!(
            result.unwrap_err().to_string(),
            "ReferenceError: undefinedThing is not defined (line 2)"
        );
    }

    #[tokio::test]
    async fn constants_and_frozen_builtins_reject_assignment() {
        let (_, result) = run("const x = 1\nx = 2").await;
        assert_eq!(result.unwrap_err().to_string(), "TypeError: Assignment to constant variable 'x' (line 2)");

        let (_, result) = run("Math.PI = 3").await;
        assert_eq!(
            result.unwrap_err().to_string(),
            "TypeError: Cannot assign to read only property 'PI' of object (line 1)"
        );
    }

    #[tokio::test]
    async fn calling_a_non_function_is_a_type_error() {
        let (_, result) = run("const o = {}\no.missing()").await;
        assert_eq!(result.unwrap_err().to_string(), "TypeError: o.missing is not a function (line 2)");
    }

    #[tokio::test]
    async fn runaway_recursion_hits_the_depth_limit() {
        let options = InterpreterOptions { max_call_depth: 32, ..InterpreterOptions::default() };
        let (_, result) = run_with("function f() { return f() }\nf()", options).await;
        assert!(result.unwrap_err().to_string().starts_with("RangeError: Maximum call stack size exceeded"));
    }

    #[tokio::test]
    async fn oversized_strings_throw_catchable_range_errors() {
        let src = "try { 'ab'.repeat(1e18) } catch (e) { log('repeat', e.name, e.message) }\n\
                   try { 'x'.padStart(1099511627776, '-') } catch (e) { log('pad', e.name) }\n\
                   log('x'.padEnd(4, 'ab'), ''.repeat(1e18).length, 'ab'.repeat(2))";
        let (lines, result) = run(src).await;
        result.unwrap();
        assert_eq!(
            lines,
            ["repeat RangeError Invalid string length", "pad RangeError", "xaba 0 abab"]
        );
    }

    #[tokio::test]
    async fn oversized_arrays_throw_catchable_range_errors() {
        let src = "const a = [1, 2]\n\
                   try { a.length = 1e18 } catch (e) { log('length', e.name, e.message) }\n\
                   try { a[1e9] = 1 } catch (e) { log('index', e.name) }\n\
                   a[1e15] = 1\n\
                   try { a.length = -1 } catch (e) { log('negative', e.name) }\n\
                   a[4] = 5\n\
                   log(a.length, a[3], a[4])\n\
                   a.length = 1\n\
                   log(a)";
        let (lines, result) = run(src).await;
        result.unwrap();
        assert_eq!(
            lines,
            ["length RangeError Invalid array length", "index RangeError", "negative RangeError", "5 undefined 5", "[1]"]
        );
    }

    #[tokio::test]
    async fn thrown_primitives_are_reported_as_uncaught() {
        let (_, result) = run("throw 'boom'").await;
        assert_eq!(result.unwrap_err().to_string(), "Uncaught boom (line 1)");
    }

    #[tokio::test]
    async fn cancellation_cannot_be_caught() {
        let program = parse("let n = 0\ntry { while (true) { n++ } } catch (e) { }").expect("parse");
        let env = Env::root();
        let budget = Rc::new(Cell::new(50usize));
        let remaining = budget.clone();
        let interp = Interpreter::new(InterpreterOptions::default(), move || {
            remaining.set(remaining.get().saturating_sub(1));
            remaining.get() > 0
        });
        let err = interp.run(&program, &env).await.map_err(Unwind::into_error).unwrap_err();
        assert_eq!(err, ScriptError::Cancelled);
    }
}
