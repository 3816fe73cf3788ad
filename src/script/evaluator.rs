use crate::errors::{AppError, AppResult};
use crate::template::Evaluate;
use mlua::{Function, Lua, MultiValue, Value};

/// Evaluates template expressions as `return <expression>` chunks.
pub struct LuaEvaluator<'lua> {
    lua: &'lua Lua,
    tostring: Function,
}

impl<'lua> LuaEvaluator<'lua> {
    pub fn new(lua: &'lua Lua) -> mlua::Result<Self> {
        let tostring = lua.globals().get::<Function>("tostring")?;
        Ok(Self { lua, tostring })
    }

    fn render(&self, value: Value) -> AppResult<Vec<u8>> {
        match &value {
            Value::String(s) => return Ok(s.as_bytes().to_vec()),
            Value::Integer(_) | Value::Number(_) => {}
            Value::Table(t) if has_tostring(t.metatable()) => {}
            Value::UserData(ud) => {
                let defined = ud.metatable().and_then(|mt| mt.contains("__tostring")).unwrap_or(false);
                if !defined {
                    return Err(unrenderable("userdata"));
                }
            }
            other => return Err(unrenderable(other.type_name())),
        }
        let text = self
            .tostring
            .call::<mlua::String>(value)
            .map_err(|e| AppError::TemplateEval(e.to_string()))?;
        Ok(text.as_bytes().to_vec())
    }
}

impl Evaluate for LuaEvaluator<'_> {
    fn evaluate(&mut self, expression: &[u8]) -> AppResult<Vec<u8>> {
        let mut chunk = Vec::with_capacity(expression.len() + 7);
        chunk.extend_from_slice(b"return ");
        chunk.extend_from_slice(expression);

        let values: Vec<Value> = self
            .lua
            .load(chunk)
            .set_name("=template")
            .eval::<MultiValue>()
            .map_err(|e| AppError::TemplateEval(e.to_string()))?
            .into_iter()
            .collect();
        let count = values.len();
        let [value] = <[Value; 1]>::try_from(values).map_err(|_| {
            AppError::TemplateEval(format!("expression produced {count} values, expected exactly one"))
        })?;
        self.render(value)
    }
}

fn has_tostring(metatable: Option<mlua::Table>) -> bool {
    metatable
        .and_then(|mt| mt.raw_get::<Value>("__tostring").ok())
        .is_some_and(|f| !f.is_nil())
}

fn unrenderable(type_name: &str) -> AppError {
    AppError::TemplateEval(format!("cannot render a {type_name} value without __tostring"))
}
