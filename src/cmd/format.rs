/*!
format.rs

Human output for `diem`: the single rewritable status line plus the color /
emoji primitives it is built from.

Style decisions:
  - Color enabled unless NO_COLOR is set.
  - Emoji enabled unless NO_EMOJI is set.
  - When stdout is a terminal each status replaces the previous one
    (carriage return + clear line); otherwise statuses are plain lines.
  - Quiet mode silences everything except the final error.

Public API Summary:
  - StyleOptions::detect() -> StyleOptions
  - color(role, text, &StyleOptions) -> String
  - emoji(tag, &StyleOptions) -> &'static str
  - StatusLine::{new, step, block, done, fail}  (fail always prints `✖ <error>`)

NOTE: log output goes to stderr (see utils::logging) and never through here.
*/

use std::io::{IsTerminal, Write};

/* -------------------------------------------------------------------------- */
/* Style Options                                                              */
/* -------------------------------------------------------------------------- */

#[derive(Debug, Clone)]
pub struct StyleOptions {
    pub use_color: bool,
    pub use_emoji: bool,
    pub rewrite: bool,
}

impl StyleOptions {
    pub fn detect() -> Self {
        let no_color = std::env::var_os("NO_COLOR").is_some();
        let no_emoji = std::env::var_os("NO_EMOJI").is_some();
        StyleOptions {
            use_color: !no_color,
            use_emoji: !no_emoji,
            rewrite: std::io::stdout().is_terminal(),
        }
    }

    /// No color, no emoji, no line rewriting.
    #[cfg(test)]
    pub fn plain() -> Self {
        StyleOptions {
            use_color: false,
            use_emoji: false,
            rewrite: false,
        }
    }
}

/* -------------------------------------------------------------------------- */
/* Color / Emoji                                                              */
/* -------------------------------------------------------------------------- */

#[derive(Debug, Clone, Copy)]
pub enum Role {
    Primary,
    Success,
    Error,
    Dim,
}

pub fn color(role: Role, text: impl AsRef<str>, style: &StyleOptions) -> String {
    if !style.use_color {
        return text.as_ref().to_string();
    }
    let code = match role {
        Role::Primary => "38;5;45", // cyan-ish
        Role::Success => "38;5;82", // green
        Role::Error => "38;5;196",  // red
        Role::Dim => "2",           // faint
    };
    format!("\x1b[{code}m{}\x1b[0m", text.as_ref())
}

pub fn emoji(tag: &str, style: &StyleOptions) -> &'static str {
    if !style.use_emoji {
        return "";
    }
    match tag {
        "announce" => "📣",
        "tool" => "🛠️ ",
        "package" => "📦",
        "cabinet" => "🗄",
        "rocket" => "🚀",
        "ok" => "👌",
        _ => "",
    }
}

/// Prefix of the final error line; plain text, unaffected by NO_EMOJI.
pub const ERROR_MARK: &str = "✖";

fn with_emoji(tag: &str, text: &str, style: &StyleOptions) -> String {
    match emoji(tag, style) {
        "" => text.to_string(),
        e => format!("{e} {text}"),
    }
}

/* -------------------------------------------------------------------------- */
/* Status Line                                                                */
/* -------------------------------------------------------------------------- */

/// Progress reporting for the run pipeline, written to any sink (stdout in
/// the binary, a buffer in tests).
pub struct StatusLine<W: Write> {
    out: W,
    style: StyleOptions,
    quiet: bool,
    /// An unterminated status is currently on screen.
    open: bool,
}

impl StatusLine<std::io::Stdout> {
    pub fn stdout(quiet: bool) -> Self {
        StatusLine::new(std::io::stdout(), StyleOptions::detect(), quiet)
    }
}

impl<W: Write> StatusLine<W> {
    pub fn new(out: W, style: StyleOptions, quiet: bool) -> Self {
        StatusLine {
            out,
            style,
            quiet,
            open: false,
        }
    }

    // Status output is best effort; a closed stdout must not abort the run.
    fn emit(&mut self, text: &str) {
        let _ = self.out.write_all(text.as_bytes());
        let _ = self.out.flush();
    }

    fn clear(&mut self) {
        if !self.open {
            return;
        }
        if self.style.rewrite {
            self.emit("\r\x1b[2K");
        } else {
            self.emit("\n");
        }
        self.open = false;
    }

    /// Replace the current status with `text`.
    pub fn step(&mut self, tag: &str, text: &str) {
        if self.quiet {
            return;
        }
        self.clear();
        let line = color(Role::Primary, with_emoji(tag, text, &self.style), &self.style);
        self.emit(&line);
        self.open = true;
    }

    /// Announce a status followed by the command about to run; child output
    /// follows on its own lines.
    pub fn block(&mut self, tag: &str, text: &str, command: &str) {
        if self.quiet {
            return;
        }
        self.clear();
        let head = color(Role::Primary, with_emoji(tag, text, &self.style), &self.style);
        let cmd = color(Role::Dim, format!("> {command}"), &self.style);
        self.emit(&format!("{head}\n\n{cmd}\n\n"));
    }

    pub fn done(&mut self, text: &str) {
        if self.quiet {
            return;
        }
        self.clear();
        let line = color(Role::Success, with_emoji("ok", text, &self.style), &self.style);
        self.emit(&format!("\n{line}\n"));
    }

    /// Errors are shown even in quiet mode, always with the `✖` marker.
    pub fn fail(&mut self, text: &str) {
        self.clear();
        let line = color(Role::Error, format!("{ERROR_MARK} {text}"), &self.style);
        self.emit(&format!("{line}\n"));
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out
    }
}

/* --------------------------------- Tests ---------------------------------- */
