//! Deploy scripts.

use labgen_core::{Backend, UnifiedConfig};
use std::fmt;

/// File name of the descriptor for a backend.
pub fn descriptor_file(backend: Backend) -> &'static str {
    match backend {
        Backend::SingleHost => "docker-compose.yml",
        Backend::Cluster => "docker-stack.yml",
    }
}

/// Quote a word for a POSIX shell. Safe words are left as they are.
pub fn shell_quote(word: &str) -> String {
    let safe = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/' | ':' | '=' | '@' | ','));
    if safe {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}

/// A shell command as a list of words.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    words: Vec<String>,
    /// Shell text appended verbatim, e.g. `>/dev/null 2>&1 ||`.
    suffix: Option<&'static str>,
}

impl Command {
    pub fn new<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            words: words.into_iter().map(Into::into).collect(),
            suffix: None,
        }
    }

    fn with_suffix(mut self, suffix: &'static str) -> Self {
        self.suffix = Some(suffix);
        self
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let words: Vec<String> = self.words.iter().map(|w| shell_quote(w)).collect();
        write!(f, "{}", words.join(" "))?;
        if let Some(suffix) = self.suffix {
            write!(f, " {}", suffix)?;
        }
        Ok(())
    }
}

/// An executable deploy script for one bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployScript {
    pub commands: Vec<Vec<Command>>,
}

impl DeployScript {
    pub fn for_config(config: &UnifiedConfig) -> Self {
        let descriptor = descriptor_file(config.backend);
        let mut commands = Vec::new();

        match config.backend {
            Backend::SingleHost => {
                commands.push(vec![Command::new([
                    "docker",
                    "compose",
                    "--project-name",
                    config.project.as_str(),
                    "--file",
                    descriptor,
                    "up",
                    "--detach",
                    "--remove-orphans",
                ])]);
            }
            Backend::Cluster => {
                // Secrets with a local file are created once; the stack only
                // references them as external.
                for (name, secret) in &config.secrets {
                    if let Some(file) = &secret.file {
                        commands.push(vec![
                            Command::new(["docker", "secret", "inspect", name.as_str()])
                                .with_suffix(">/dev/null 2>&1 ||"),
                            Command::new(["docker", "secret", "create", name.as_str(), file.as_str()]),
                        ]);
                    }
                }
                commands.push(vec![Command::new([
                    "docker",
                    "stack",
                    "deploy",
                    "--compose-file",
                    descriptor,
                    "--prune",
                    config.project.as_str(),
                ])]);
            }
        }

        Self { commands }
    }
}

impl fmt::Display for DeployScript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "#!/bin/sh")?;
        writeln!(f, "# Generated by labgen. Do not edit.")?;
        writeln!(f, "set -eu")?;
        writeln!(f, "cd \"$(dirname \"$0\")\"")?;
        for line in &self.commands {
            let parts: Vec<String> = line.iter().map(ToString::to_string).collect();
            writeln!(f, "{}", parts.join(" "))?;
        }
        Ok(())
    }
}
