//! Input command parsing.
//!
//! Commands arrive from clients either as an argv array or as a
//! single command line. Both forms are validated here, before the
//! request is handed to the engine thread; a parse failure is
//! reported synchronously to the submitter and never reaches the
//! dispatch queue.

/// How `loadfile` treats the current playlist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    /// Stop the current file and replace the playlist.
    Replace,
    /// Append to the playlist, keep playing.
    Append,
}

/// How `seek` interprets its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekMode {
    Relative,
    Absolute,
}

/// A parsed input command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    LoadFile { path: String, mode: LoadMode },
    Stop,
    Seek { target: f64, mode: SeekMode },
    PlaylistNext,
    FrameStep,
    /// Deliver a script-input-dispatch event to the named client.
    ScriptDispatch { client: String, arg0: i32 },
    Quit,
    Ignore,
}

impl Command {
    /// Parse an argv-style command. The first element is the command
    /// name.
    pub fn parse(args: &[&str]) -> Result<Command, String> {
        let (&name, rest) = args
            .split_first()
            .ok_or_else(|| "empty command".to_string())?;

        match name {
            "loadfile" => {
                let path = arg(rest, 0, "loadfile needs a file")?;
                let mode = match rest.get(1).copied() {
                    None | Some("replace") => LoadMode::Replace,
                    Some("append") => LoadMode::Append,
                    Some(other) => return Err(format!("bad loadfile mode '{}'", other)),
                };
                check_arity(rest, 2, name)?;
                Ok(Command::LoadFile { path: path.to_string(), mode })
            }
            "stop" => {
                check_arity(rest, 0, name)?;
                Ok(Command::Stop)
            }
            "seek" => {
                let target = arg(rest, 0, "seek needs a target")?
                    .parse::<f64>()
                    .map_err(|_| "seek target must be a number".to_string())?;
                let mode = match rest.get(1).copied() {
                    None | Some("relative") => SeekMode::Relative,
                    Some("absolute") => SeekMode::Absolute,
                    Some(other) => return Err(format!("bad seek mode '{}'", other)),
                };
                check_arity(rest, 2, name)?;
                Ok(Command::Seek { target, mode })
            }
            "playlist-next" => {
                check_arity(rest, 0, name)?;
                Ok(Command::PlaylistNext)
            }
            "frame-step" => {
                check_arity(rest, 0, name)?;
                Ok(Command::FrameStep)
            }
            "script-dispatch" => {
                let client = arg(rest, 0, "script-dispatch needs a client name")?;
                let arg0 = arg(rest, 1, "script-dispatch needs an argument")?
                    .parse::<i32>()
                    .map_err(|_| "script-dispatch argument must be an integer".to_string())?;
                check_arity(rest, 2, name)?;
                Ok(Command::ScriptDispatch { client: client.to_string(), arg0 })
            }
            "quit" => {
                check_arity(rest, 0, name)?;
                Ok(Command::Quit)
            }
            "ignore" => {
                check_arity(rest, 0, name)?;
                Ok(Command::Ignore)
            }
            other => Err(format!("unknown command '{}'", other)),
        }
    }

    /// Parse a single command line. Double quotes group words;
    /// backslash escapes work inside quotes.
    pub fn parse_str(line: &str) -> Result<Command, String> {
        let words = tokenize(line)?;
        let refs: Vec<&str> = words.iter().map(String::as_str).collect();
        Command::parse(&refs)
    }
}

fn arg<'a>(rest: &[&'a str], idx: usize, missing: &str) -> Result<&'a str, String> {
    rest.get(idx).copied().ok_or_else(|| missing.to_string())
}

fn check_arity(rest: &[&str], max: usize, name: &str) -> Result<(), String> {
    if rest.len() > max {
        return Err(format!("too many arguments to '{}'", name));
    }
    Ok(())
}

fn tokenize(line: &str) -> Result<Vec<String>, String> {
    let mut words = Vec::new();
    let mut chars = line.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        let mut word = String::new();
        if c == '"' {
            chars.next();
            loop {
                match chars.next() {
                    Some('"') => break,
                    Some('\\') => match chars.next() {
                        Some('n') => word.push('\n'),
                        Some(esc) => word.push(esc),
                        None => return Err("truncated escape".to_string()),
                    },
                    Some(ch) => word.push(ch),
                    None => return Err("unterminated quote".to_string()),
                }
            }
        } else {
            while let Some(&ch) = chars.peek() {
                if ch.is_whitespace() {
                    break;
                }
                word.push(ch);
                chars.next();
            }
        }
        words.push(word);
    }

    if words.is_empty() {
        return Err("empty command".to_string());
    }
    Ok(words)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_loadfile() {
        let cmd = Command::parse(&["loadfile", "test.mkv"]).unwrap();
        assert_eq!(
            cmd,
            Command::LoadFile { path: "test.mkv".into(), mode: LoadMode::Replace }
        );

        let cmd = Command::parse(&["loadfile", "b.mkv", "append"]).unwrap();
        assert_eq!(
            cmd,
            Command::LoadFile { path: "b.mkv".into(), mode: LoadMode::Append }
        );
    }

    #[test]
    fn test_parse_seek() {
        assert_eq!(
            Command::parse(&["seek", "10"]).unwrap(),
            Command::Seek { target: 10.0, mode: SeekMode::Relative }
        );
        assert_eq!(
            Command::parse(&["seek", "-5.5", "absolute"]).unwrap(),
            Command::Seek { target: -5.5, mode: SeekMode::Absolute }
        );
        assert!(Command::parse(&["seek", "soon"]).is_err());
    }

    #[test]
    fn test_parse_rejects_unknown_and_empty() {
        assert!(Command::parse(&[]).is_err());
        assert!(Command::parse(&["transmogrify"]).is_err());
        assert!(Command::parse_str("").is_err());
        assert!(Command::parse_str("   ").is_err());
    }

    #[test]
    fn test_parse_rejects_excess_arguments() {
        assert!(Command::parse(&["stop", "now"]).is_err());
        assert!(Command::parse(&["quit", "0", "0"]).is_err());
    }

    #[test]
    fn test_parse_str_quoting() {
        let cmd = Command::parse_str("loadfile \"my file.mkv\"").unwrap();
        assert_eq!(
            cmd,
            Command::LoadFile { path: "my file.mkv".into(), mode: LoadMode::Replace }
        );

        let cmd = Command::parse_str(r#"loadfile "a \"b\".mkv" append"#).unwrap();
        assert_eq!(
            cmd,
            Command::LoadFile { path: "a \"b\".mkv".into(), mode: LoadMode::Append }
        );

        assert!(Command::parse_str("loadfile \"open.mkv").is_err());
    }

    #[test]
    fn test_parse_script_dispatch() {
        assert_eq!(
            Command::parse(&["script-dispatch", "osc", "3"]).unwrap(),
            Command::ScriptDispatch { client: "osc".into(), arg0: 3 }
        );
        assert!(Command::parse(&["script-dispatch", "osc", "x"]).is_err());
    }
}
