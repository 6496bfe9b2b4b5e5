//! Terminal rendering for the CLI: status lines, the configuration summary
//! and answers with their facts and consistency flags.

use crate::types::{ConsistencyFlag, RetrievedFact};
use owo_colors::OwoColorize;

#[derive(Clone, Copy)]
enum Marker {
    Ok,
    Info,
    Warn,
    Error,
}

impl Marker {
    fn tag(self) -> &'static str {
        match self {
            Marker::Ok => "OK",
            Marker::Info => "INFO",
            Marker::Warn => "WARN",
            Marker::Error => "ERROR",
        }
    }
}

/// Terminal output for the `serve`, `config` and `ask` commands
pub struct Output {
    /// Whether to use colored output
    pub colored: bool,
}

impl Default for Output {
    fn default() -> Self {
        Self::new()
    }
}

impl Output {
    pub fn new() -> Self {
        Self { colored: true }
    }

    /// Plain ASCII tags instead of colors and symbols (`--no-color`)
    pub fn no_color() -> Self {
        Self { colored: false }
    }

    /// Print the startup banner
    pub fn banner(&self) {
        let version = format!("v{}", env!("CARGO_PKG_VERSION"));
        if self.colored {
            println!(
                "\n   {} {}\n   {}\n",
                "coinrag".bright_cyan().bold(),
                version.dimmed(),
                "Crypto Knowledge RAG Server".bright_white()
            );
        } else {
            println!("\n   coinrag {}\n   Crypto Knowledge RAG Server\n", version);
        }
    }

    fn status_line(&self, marker: Marker, message: &str) {
        let line = if self.colored {
            match marker {
                Marker::Ok => format!("  {} {}", "✓".green().bold(), message.green()),
                Marker::Info => format!("  {} {}", "•".blue(), message),
                Marker::Warn => format!("  {} {}", "⚠".yellow().bold(), message.yellow()),
                Marker::Error => format!("  {} {}", "✗".red().bold(), message.red()),
            }
        } else {
            format!("  [{}] {}", marker.tag(), message)
        };

        match marker {
            Marker::Error => eprintln!("{}", line),
            _ => println!("{}", line),
        }
    }

    /// Step completed, e.g. facts loaded
    pub fn success(&self, message: &str) {
        self.status_line(Marker::Ok, message);
    }

    pub fn info(&self, message: &str) {
        self.status_line(Marker::Info, message);
    }

    pub fn warning(&self, message: &str) {
        self.status_line(Marker::Warn, message);
    }

    /// Errors go to stderr
    pub fn error(&self, message: &str) {
        self.status_line(Marker::Error, message);
    }

    /// Section title, e.g. "Answer" or "Retrieved facts"
    pub fn header(&self, title: &str) {
        match self.colored {
            true => println!("\n  {}", title.bright_white().bold().underline()),
            false => println!("\n  == {} ==", title),
        }
    }

    /// Indented `key: value` line used by the configuration summary
    pub fn kv(&self, key: &str, value: &str) {
        match self.colored {
            true => println!("    {:<22} {}", key.dimmed(), value.bright_white()),
            false => println!("    {:<22} {}", key, value),
        }
    }

    pub fn hint(&self, message: &str) {
        match self.colored {
            true => println!("\n  {}", message.dimmed().italic()),
            false => println!("\n  hint: {}", message),
        }
    }

    /// Print a generated answer
    pub fn answer(&self, text: &str) {
        for line in text.lines() {
            if self.colored {
                println!("    {}", line.bright_white());
            } else {
                println!("    {}", line);
            }
        }
    }

    /// Print one consistency flag
    pub fn flag(&self, flag: ConsistencyFlag) {
        if self.colored {
            println!("    {} {}", "⚑".yellow(), flag.as_str().yellow().bold());
        } else {
            println!("    [FLAG] {}", flag);
        }
    }

    /// Print a retrieved fact with its rank and score
    pub fn fact(&self, rank: usize, fact: &RetrievedFact) {
        if self.colored {
            println!(
                "    {} {} {}",
                format!("{}.", rank).dimmed(),
                fact.fact.content,
                format!("[{} {:.3}]", fact.fact.id, fact.score).dimmed()
            );
        } else {
            println!(
                "    {}. {} [{} {:.3}]",
                rank, fact.fact.content, fact.fact.id, fact.score
            );
        }
    }
}
