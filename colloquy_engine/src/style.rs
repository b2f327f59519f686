//! Styling helpers for terminal output.
//!
//! The [`DialogueStyle`] trait applies ANSI styling via the `colored` crate.
//! It is implemented for `&str` so string literals can be styled directly.

use colored::{ColoredString, Colorize};

/// Convenience trait for applying color and style to dialogue output.
pub trait DialogueStyle {
    fn title_style(&self) -> ColoredString;
    fn speaker_style(&self) -> ColoredString;
    fn listener_style(&self) -> ColoredString;
    fn expression_style(&self) -> ColoredString;
    fn line_style(&self) -> ColoredString;
    fn choice_style(&self) -> ColoredString;
    fn choice_disabled_style(&self) -> ColoredString;
    fn voice_style(&self) -> ColoredString;
    fn prompt_style(&self) -> ColoredString;
    fn warning_style(&self) -> ColoredString;
    fn error_style(&self) -> ColoredString;
    fn engine_style(&self) -> ColoredString;
    fn section_style(&self) -> ColoredString;
}

impl DialogueStyle for &str {
    fn title_style(&self) -> ColoredString {
        self.bright_yellow().underline()
    }
    fn speaker_style(&self) -> ColoredString {
        self.truecolor(13, 130, 60).bold()
    }
    fn listener_style(&self) -> ColoredString {
        self.truecolor(13, 130, 60).italic()
    }
    fn expression_style(&self) -> ColoredString {
        self.italic().truecolor(150, 150, 150)
    }
    fn line_style(&self) -> ColoredString {
        self.truecolor(102, 208, 250)
    }
    fn choice_style(&self) -> ColoredString {
        self.truecolor(220, 180, 40)
    }
    fn choice_disabled_style(&self) -> ColoredString {
        self.dimmed().strikethrough()
    }
    fn voice_style(&self) -> ColoredString {
        self.italic().truecolor(75, 180, 255)
    }
    fn prompt_style(&self) -> ColoredString {
        self.truecolor(150, 150, 230)
    }
    fn warning_style(&self) -> ColoredString {
        self.italic().truecolor(230, 230, 30)
    }
    fn error_style(&self) -> ColoredString {
        self.bold().truecolor(230, 30, 30)
    }
    fn engine_style(&self) -> ColoredString {
        self.truecolor(75, 80, 75)
    }
    fn section_style(&self) -> ColoredString {
        let bracketed = format!("[{self}]");
        bracketed.truecolor(75, 80, 75)
    }
}
