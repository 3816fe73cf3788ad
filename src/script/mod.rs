//! Glue between the Lua engine and the capability core.

pub mod evaluator;
pub mod value;

use crate::capability::{self, open_ambient_root};
use crate::cmdline::CommandLine;
use crate::config::{Config, Limits};
use crate::errors::{AppError, AppResult};
use crate::ops;
use crate::path::{CapabilityArena, PathTarget};
use anyhow::Context;
use mlua::{Lua, LuaSerdeExt, MultiValue, Value};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Instant;
use tracing::info;

pub use evaluator::LuaEvaluator;
pub use value::LuaPath;

/// Global functions registered for scripts.
pub const OPERATIONS: [&str; 4] = ["make_directory", "recursive_copy", "recursive_delete", "copy_template"];

/// Runs the script named on the command line to completion.
pub fn run(cmdline: &CommandLine, cfg: &Config) -> anyhow::Result<()> {
    let arena = CapabilityArena::new();
    let lua = Lua::new();
    register(&lua, &arena, &cfg.limits)
        .map_err(AppError::from)
        .context("registering operations")?;
    set_globals(&lua, &arena, cmdline)?;

    let source = fs::read(&cmdline.script_path)
        .with_context(|| format!("failed to read script {}", cmdline.script_path))?;
    lua.load(strip_shebang(source))
        .set_name(format!("@{}", cmdline.script_path))
        .exec()
        .map_err(AppError::from)?;
    Ok(())
}

pub fn register(lua: &Lua, arena: &Rc<CapabilityArena>, limits: &Limits) -> mlua::Result<()> {
    let globals = lua.globals();

    let a = Rc::clone(arena);
    globals.set(
        "make_directory",
        lua.create_function(move |lua, args: MultiValue| {
            audited("make_directory", || {
                let [path] = take_args("make_directory", args)?;
                make_directory(&a, &value::path_target(lua, "make_directory", 1, &path)?)
            })
        })?,
    )?;

    let a = Rc::clone(arena);
    globals.set(
        "recursive_copy",
        lua.create_function(move |lua, args: MultiValue| {
            audited("recursive_copy", || {
                let [source, destination] = take_args("recursive_copy", args)?;
                let source = a.resolve(&value::path_target(lua, "recursive_copy", 1, &source)?)?;
                let destination = a.resolve(&value::path_target(lua, "recursive_copy", 2, &destination)?)?;
                ops::recursive_copy(source.reference(), destination.reference())
            })
        })?,
    )?;

    let a = Rc::clone(arena);
    globals.set(
        "recursive_delete",
        lua.create_function(move |lua, args: MultiValue| {
            audited("recursive_delete", || {
                let [path] = take_args("recursive_delete", args)?;
                let path = a.resolve(&value::path_target(lua, "recursive_delete", 1, &path)?)?;
                ops::recursive_delete(path.reference())
            })
        })?,
    )?;

    let a = Rc::clone(arena);
    let max_bytes = limits.max_template_bytes();
    globals.set(
        "copy_template",
        lua.create_function(move |lua, args: MultiValue| {
            audited("copy_template", || {
                let [source, destination] = take_args("copy_template", args)?;
                let source = a.resolve(&value::path_target(lua, "copy_template", 1, &source)?)?;
                let destination = a.resolve(&value::path_target(lua, "copy_template", 2, &destination)?)?;
                let mut evaluator = LuaEvaluator::new(lua)?;
                ops::copy_template(source.reference(), destination.reference(), max_bytes, &mut evaluator)
            })
        })?,
    )?;

    Ok(())
}

/// Creates the directory named by `target` and hands back a new root for it.
pub fn make_directory(arena: &Rc<CapabilityArena>, target: &PathTarget) -> AppResult<LuaPath> {
    let capability = match target {
        PathTarget::Literal(path) => capability::make_ambient_directory(path, target.display())?,
        PathTarget::Value(_) => {
            let resolved = arena.resolve(target)?;
            capability::make_nested_directory(resolved.reference(), target.display())?
        }
    };
    Ok(LuaPath::adopt(arena, capability))
}

/// Publishes `src`, `path` and, when given, `args`.
pub fn set_globals(lua: &Lua, arena: &Rc<CapabilityArena>, cmdline: &CommandLine) -> anyhow::Result<()> {
    let globals = lua.globals();

    let src = script_directory(&cmdline.script_path);
    let source_root = open_ambient_root(Path::new(&src), src.as_str())
        .with_context(|| format!("opening script directory {src}"))?;
    globals
        .set("src", LuaPath::adopt(arena, source_root))
        .map_err(AppError::from)?;

    let destination = make_directory(arena, &PathTarget::Literal(PathBuf::from(&cmdline.destination_path)))
        .with_context(|| format!("creating destination {}", cmdline.destination_path))?;
    let resolved = dunce::canonicalize(&cmdline.destination_path)
        .map(|p| p.display().to_string())
        .unwrap_or_else(|_| cmdline.destination_path.clone());
    info!(path = %destination.value(), resolved = %resolved, "destination ready");
    globals.set("path", destination).map_err(AppError::from)?;

    if let Some(args_path) = &cmdline.args_json_path {
        let args = load_json(args_path).with_context(|| format!("loading arguments from {args_path}"))?;
        let args = lua.to_value(&args).map_err(AppError::from)?;
        globals.set("args", args).map_err(AppError::from)?;
    }
    Ok(())
}

/// Text before the last `/`; `.` without one, `/` when it is the first byte.
pub fn script_directory(script_path: &str) -> String {
    match script_path.rfind('/') {
        None => ".".to_string(),
        Some(0) => "/".to_string(),
        Some(slash) => script_path[..slash].to_string(),
    }
}

fn load_json(path: &str) -> anyhow::Result<serde_json::Value> {
    let mut raw = Vec::new();
    if path == "-" {
        std::io::stdin().lock().read_to_end(&mut raw)?;
    } else {
        raw = fs::read(path)?;
    }
    Ok(serde_json::from_slice(&raw)?)
}

// blank out a `#!` line but keep the line count for error messages
fn strip_shebang(mut source: Vec<u8>) -> Vec<u8> {
    if source.first() == Some(&b'#') {
        let end = source.iter().position(|&b| b == b'\n').unwrap_or(source.len());
        source.drain(..end);
    }
    source
}

fn take_args<const N: usize>(operation: &str, args: MultiValue) -> AppResult<[Value; N]> {
    let values: Vec<Value> = args.into_iter().collect();
    let count = values.len();
    values
        .try_into()
        .map_err(|_| AppError::Type(format!("{operation}: expected {N} argument(s), got {count}")))
}

fn audited<T>(operation: &'static str, f: impl FnOnce() -> AppResult<T>) -> mlua::Result<T> {
    let started = Instant::now();
    let result = f();
    let duration_ms = started.elapsed().as_millis() as u64;
    match &result {
        Ok(_) => info!(operation, outcome = "ok", code = "OK", duration_ms, "audit"),
        Err(e) => info!(operation, outcome = "error", code = e.code(), duration_ms, error = %e, "audit"),
    }
    result.map_err(mlua::Error::from)
}
