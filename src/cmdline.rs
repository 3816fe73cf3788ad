use crate::errors::AppError;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub script_path: String,
    pub destination_path: String,
    /// `-` reads the document from standard input.
    pub args_json_path: Option<String>,
    pub config_path: Option<PathBuf>,
}

/// Parses everything after the program name.
pub fn parse<I>(args: I) -> Result<CommandLine, AppError>
where
    I: IntoIterator<Item = String>,
{
    let mut config_path = None;
    let mut positional = Vec::new();
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let path = args.next().ok_or(AppError::Usage)?;
                config_path = Some(PathBuf::from(path));
            }
            _ => positional.push(arg),
        }
    }

    if !(2..=3).contains(&positional.len()) {
        return Err(AppError::Usage);
    }
    let mut positional = positional.into_iter();
    Ok(CommandLine {
        script_path: positional.next().ok_or(AppError::Usage)?,
        destination_path: positional.next().ok_or(AppError::Usage)?,
        args_json_path: positional.next(),
        config_path,
    })
}
