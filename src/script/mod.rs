//! The console's script language: a small JavaScript dialect evaluated by an
//! async tree-walking interpreter.

pub mod ast;
pub mod builtins;
pub mod interp;
pub mod lexer;
pub mod methods;
pub mod parser;
pub mod value;

pub use interp::{Interpreter, InterpreterOptions, Thrown, Unwind};
pub use parser::parse;
pub use value::{Env, NativeCall, NativeFunction, Value};
