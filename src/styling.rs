//! Terminal output helpers: `anstream` re-exports that auto-detect color
//! support (`NO_COLOR`, `CLICOLOR_FORCE`, terminal capabilities) so every
//! print site gets the behavior for free, plus a couple of semantic
//! `anstyle` constants. Stdout is reserved for primary output, stderr for
//! error text.

use anstyle::{AnsiColor, Color, Style};

pub use anstream::eprintln;
pub use anstream::println;

pub const ERROR: Style = Style::new().fg_color(Some(Color::Ansi(AnsiColor::Red)));
pub const WARNING: Style = Style::new().fg_color(Some(Color::Ansi(AnsiColor::Yellow)));
pub const SUCCESS: Style = Style::new().fg_color(Some(Color::Ansi(AnsiColor::Green)));
