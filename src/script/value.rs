use crate::capability::DirectoryCapability;
use crate::errors::{AppError, AppResult};
use crate::path::{CapabilityArena, Lease, PathTarget, PathValue};
use mlua::{AnyUserData, Lua, MetaMethod, UserData, UserDataMethods, UserDataRef, Value};
use std::ffi::OsStr;
use std::os::unix::ffi::OsStrExt;
use std::path::PathBuf;
use std::rc::Rc;

/// Script-side handle for a [`PathValue`].
///
/// Holds a lease on its root capability, so the handle stays open for as
/// long as the engine can still reach any value derived from it.
pub struct LuaPath {
    value: PathValue,
    lease: Lease,
}

impl LuaPath {
    pub fn adopt(arena: &Rc<CapabilityArena>, capability: DirectoryCapability) -> Self {
        let (value, lease) = arena.adopt(capability);
        Self { value, lease }
    }

    pub fn value(&self) -> &PathValue {
        &self.value
    }

    fn derive(&self, value: PathValue) -> Self {
        Self { value, lease: self.lease.clone() }
    }

    fn join(&self, segment: &Value) -> AppResult<Self> {
        let segment = string_operand(segment, "path segment")?;
        Ok(self.derive(self.value.join(segment)))
    }

    // roots have no last segment, so their suffix form is a plain string
    fn suffixed(&self, lua: &Lua, suffix: &Value) -> mlua::Result<Value> {
        let suffix = string_operand(suffix, "path suffix")?;
        match self.value.with_suffix(&suffix) {
            Some(value) => Ok(Value::UserData(lua.create_userdata(self.derive(value))?)),
            None => Ok(Value::String(lua.create_string(format!("{}{suffix}", self.value))?)),
        }
    }
}

impl UserData for LuaPath {
    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_meta_method(MetaMethod::ToString, |_, this, ()| Ok(this.value.display()));
        methods.add_method("join", |_, this, segment: Value| Ok(this.join(&segment)?));
        methods.add_method("with_suffix", |lua, this, suffix: Value| this.suffixed(lua, &suffix));
        methods.add_meta_function(MetaMethod::Div, |_, (lhs, segment): (AnyUserData, Value)| {
            let this = lhs.borrow::<LuaPath>()?;
            Ok(this.join(&segment)?)
        });
        methods.add_meta_function(MetaMethod::Concat, |lua, (lhs, rhs): (Value, Value)| {
            if let Some(this) = as_path(&lhs) {
                return this.suffixed(lua, &rhs);
            }
            let Some(this) = as_path(&rhs) else {
                return Err(AppError::Type("concatenation needs a path operand".into()).into());
            };
            let prefix = string_operand(&lhs, "concatenation operand")?;
            Ok(Value::String(lua.create_string(format!("{prefix}{}", this.value))?))
        });
    }
}

fn as_path(value: &Value) -> Option<UserDataRef<LuaPath>> {
    match value {
        Value::UserData(ud) => ud.borrow::<LuaPath>().ok(),
        _ => None,
    }
}

fn string_operand(value: &Value, what: &str) -> AppResult<String> {
    match value {
        Value::String(s) => Ok(s.to_str()?.to_string()),
        other => Err(AppError::Type(format!("{what} must be a string, got {}", other.type_name()))),
    }
}

/// Interprets argument `position` of `operation` as something to resolve.
///
/// Strings are taken byte for byte; numbers are spelled the way `tostring`
/// spells them.
pub fn path_target(lua: &Lua, operation: &str, position: usize, value: &Value) -> AppResult<PathTarget> {
    match value {
        Value::String(s) => Ok(literal(s)),
        Value::Integer(_) | Value::Number(_) => match lua.coerce_string(value.clone())? {
            Some(s) => Ok(literal(&s)),
            None => Err(path_expected(operation, position, value.type_name())),
        },
        Value::UserData(ud) => match ud.borrow::<LuaPath>() {
            Ok(path) => Ok(PathTarget::Value(path.value.clone())),
            Err(_) => Err(path_expected(operation, position, "userdata")),
        },
        other => Err(path_expected(operation, position, other.type_name())),
    }
}

fn literal(text: &mlua::String) -> PathTarget {
    PathTarget::Literal(PathBuf::from(OsStr::from_bytes(&text.as_bytes())))
}

fn path_expected(operation: &str, position: usize, got: &str) -> AppError {
    AppError::Type(format!("bad argument #{position} to '{operation}' (path expected, got {got})"))
}
