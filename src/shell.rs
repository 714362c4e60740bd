//! A text menu driving an [`AvlTree`] of `i32` keys.
//!
//! Input is consumed one whitespace-separated token at a time, so a whole
//! session can be given on a single line: `1 10 1 20 1 30 3 4`.

use std::collections::VecDeque;
use std::io::{self, BufRead, Write};

use log::{debug, info, warn};
use thiserror::Error;

use crate::tree::AvlTree;

const MENU: &str = "\n--- AVL MENU ---\n\
                    1. Insert key\n\
                    2. Delete key\n\
                    3. Show tree in pre-order\n\
                    4. Exit\n";

/// Errors that end a shell session.
#[derive(Error, Debug)]
pub enum ShellError {
    /// Reading the input or writing the output failed
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// A menu entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Option 1, reads a key and inserts it
    Insert,
    /// Option 2, reads a key and deletes it
    Delete,
    /// Option 3, prints the keys in pre-order
    Show,
    /// Option 4, ends the session
    Exit,
}

impl TryFrom<i32> for Command {
    type Error = i32;

    fn try_from(option: i32) -> Result<Self, Self::Error> {
        match option {
            1 => Ok(Command::Insert),
            2 => Ok(Command::Delete),
            3 => Ok(Command::Show),
            4 => Ok(Command::Exit),
            other => Err(other),
        }
    }
}

/// An interactive session over a tree of `i32` keys.
pub struct Shell<R, W> {
    input: R,
    output: W,
    quiet: bool,
    tokens: VecDeque<String>,
    tree: AvlTree<i32>,
}

impl<R: BufRead, W: Write> Shell<R, W> {
    /// Creates a session over an empty tree.
    /// A quiet session prints neither the menu nor the prompts.
    pub fn new(input: R, output: W, quiet: bool) -> Self {
        Self {
            input,
            output,
            quiet,
            tokens: VecDeque::new(),
            tree: AvlTree::new(),
        }
    }

    /// Returns the tree the session works on.
    pub fn tree(&self) -> &AvlTree<i32> {
        &self.tree
    }

    /// Returns the tree mutably, e.g. to insert keys before the session starts.
    pub fn tree_mut(&mut self) -> &mut AvlTree<i32> {
        &mut self.tree
    }

    /// Gives back the output sink, e.g. to inspect what was written.
    pub fn into_output(self) -> W {
        self.output
    }

    /// Runs the menu loop until the exit option is chosen or input ends.
    pub fn run(&mut self) -> Result<(), ShellError> {
        info!("Menu session started");
        loop {
            if !self.quiet {
                write!(self.output, "{MENU}")?;
            }
            let Some(option) = self.read_int("Select an option: ")? else {
                break;
            };
            let command = match Command::try_from(option) {
                Ok(command) => command,
                Err(option) => {
                    debug!("Unknown menu option {option}");
                    writeln!(self.output, "Invalid option")?;
                    continue;
                }
            };
            debug!("Menu command {command:?}");

            match command {
                Command::Insert => {
                    let Some(key) = self.read_int("Key to insert: ")? else {
                        break;
                    };
                    if let Err(err) = self.tree.insert(key) {
                        warn!("Insert of {key} failed: {err}");
                        writeln!(self.output, "{err}")?;
                    }
                }
                Command::Delete => {
                    let Some(key) = self.read_int("Key to delete: ")? else {
                        break;
                    };
                    self.tree.remove(&key);
                }
                Command::Show => self.show()?,
                Command::Exit => break,
            }
        }

        if !self.quiet {
            writeln!(self.output, "Exiting...")?;
        }
        self.output.flush()?;
        info!("Menu session ended with {} keys in the tree", self.tree.len());
        Ok(())
    }

    fn show(&mut self) -> Result<(), ShellError> {
        if !self.quiet {
            write!(self.output, "Pre-order: ")?;
        }
        for key in self.tree.preorder() {
            write!(self.output, "{key} ")?;
        }
        writeln!(self.output)?;
        Ok(())
    }

    /// Prompts until an integer is read. Returns `None` at end of input.
    fn read_int(&mut self, prompt: &str) -> Result<Option<i32>, ShellError> {
        loop {
            if !self.quiet {
                write!(self.output, "{prompt}")?;
                self.output.flush()?;
            }
            let Some(token) = self.next_token()? else {
                return Ok(None);
            };
            match token.parse::<i32>() {
                Ok(value) => return Ok(Some(value)),
                Err(err) => {
                    warn!("Rejected input {token:?}: {err}");
                    writeln!(self.output, "Invalid input")?;
                }
            }
        }
    }

    fn next_token(&mut self) -> io::Result<Option<String>> {
        while self.tokens.is_empty() {
            let mut line = String::new();
            if self.input.read_line(&mut line)? == 0 {
                return Ok(None);
            }
            self.tokens
                .extend(line.split_whitespace().map(str::to_owned));
        }
        Ok(self.tokens.pop_front())
    }
}
