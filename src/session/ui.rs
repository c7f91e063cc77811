//! Prompting primitives

use rustyline::error::ReadlineError;
use std::io;

/// Line-oriented terminal interaction.
///
/// `read_line` returns `None` once input is closed; every caller treats that
/// as a request to quit.
pub trait UserInterface {
    fn say(&mut self, text: &str);

    fn read_line(&mut self, prompt: &str) -> io::Result<Option<String>>;

    /// Pick one option by its 1-based number; re-asks on bad input
    fn choose(&mut self, title: &str, options: &[String]) -> io::Result<Option<usize>> {
        if options.is_empty() {
            return Ok(None);
        }
        self.say(title);
        for (i, option) in options.iter().enumerate() {
            self.say(&format!("  {}. {option}", i + 1));
        }
        loop {
            let Some(line) = self.read_line("choice: ")? else {
                return Ok(None);
            };
            match parse_index(&line, options.len()) {
                Some(idx) => return Ok(Some(idx)),
                None => self.say(&format!("enter a number from 1 to {}", options.len())),
            }
        }
    }

    /// Pick any number of options, separated by commas or spaces
    fn choose_many(&mut self, title: &str, options: &[String]) -> io::Result<Option<Vec<usize>>> {
        self.say(title);
        for (i, option) in options.iter().enumerate() {
            self.say(&format!("  {}. {option}", i + 1));
        }
        loop {
            let Some(line) = self.read_line("choices: ")? else {
                return Ok(None);
            };
            let picked: Option<Vec<usize>> = line
                .split(|c: char| c == ',' || c.is_whitespace())
                .filter(|s| !s.is_empty())
                .map(|s| parse_index(s, options.len()))
                .collect();
            match picked {
                Some(mut picked) if !picked.is_empty() => {
                    picked.sort_unstable();
                    picked.dedup();
                    return Ok(Some(picked));
                }
                _ => self.say(&format!(
                    "enter numbers from 1 to {}, e.g. 1,3",
                    options.len()
                )),
            }
        }
    }

    /// Y/N question; anything but y/yes is no
    fn confirm(&mut self, question: &str) -> io::Result<Option<bool>> {
        let answer = self.read_line(&format!("{question} [Y/N]: "))?;
        Ok(answer.map(|a| matches!(a.trim().to_ascii_lowercase().as_str(), "y" | "yes")))
    }
}

fn parse_index(input: &str, len: usize) -> Option<usize> {
    let n: usize = input.trim().parse().ok()?;
    (1..=len).contains(&n).then(|| n - 1)
}

/// Interactive terminal with line editing and in-memory history
pub struct TerminalUi {
    editor: rustyline::DefaultEditor,
}

impl TerminalUi {
    pub fn new() -> Result<Self, ReadlineError> {
        Ok(Self {
            editor: rustyline::DefaultEditor::new()?,
        })
    }
}

impl UserInterface for TerminalUi {
    fn say(&mut self, text: &str) {
        println!("{text}");
    }

    fn read_line(&mut self, prompt: &str) -> io::Result<Option<String>> {
        match self.editor.readline(prompt) {
            Ok(line) => {
                if !line.trim().is_empty() {
                    let _ = self.editor.add_history_entry(line.as_str());
                }
                Ok(Some(line))
            }
            Err(ReadlineError::Eof | ReadlineError::Interrupted) => Ok(None),
            Err(ReadlineError::Io(e)) => Err(e),
            Err(e) => Err(io::Error::other(e.to_string())),
        }
    }
}

/// Replays canned input and records everything said
#[cfg(test)]
pub struct ScriptedUi {
    input: std::collections::VecDeque<String>,
    pub transcript: Vec<String>,
}

#[cfg(test)]
impl ScriptedUi {
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            input: lines.into_iter().map(Into::into).collect(),
            transcript: Vec::new(),
        }
    }

    pub fn said(&self, needle: &str) -> bool {
        self.transcript.iter().any(|line| line.contains(needle))
    }
}

#[cfg(test)]
impl UserInterface for ScriptedUi {
    fn say(&mut self, text: &str) {
        self.transcript.push(text.to_string());
    }

    fn read_line(&mut self, _prompt: &str) -> io::Result<Option<String>> {
        Ok(self.input.pop_front())
    }
}
