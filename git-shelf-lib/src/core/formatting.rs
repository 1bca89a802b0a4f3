//! Formatting and output helpers.
//!
//! We try to handle both textual output and interactive output (output to a
//! "TTY"). In the case of interactive output, we render with colors and text
//! attributes, using shell-specific escape codes.

use console::Style;

/// Text attributes which may be applied to a span of output.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TextStyle {
    /// Bold text. Used for command names in usage text.
    Bold,

    /// Italic text. Used for placeholders in usage text.
    Italic,

    /// Red text. Used for errors.
    Error,

    /// Dimmed text. Used for informational notes.
    Dim,
}

impl TextStyle {
    fn to_console_style(self) -> Style {
        match self {
            TextStyle::Bold => Style::new().bold(),
            TextStyle::Italic => Style::new().italic(),
            TextStyle::Error => Style::new().red().bold(),
            TextStyle::Dim => Style::new().dim(),
        }
    }
}

/// Glyphs and styling to use when rendering output.
#[derive(Clone, Debug)]
pub struct Glyphs {
    /// Whether or not ANSI escape codes should be emitted (e.g. to render
    /// color).
    pub should_write_ansi_escape_codes: bool,
}

impl Glyphs {
    /// Make the `Glyphs` object appropriate for `stdout`.
    pub fn detect() -> Self {
        if console::user_attended() {
            Glyphs::pretty()
        } else {
            Glyphs::text()
        }
    }

    /// Glyphs used for output to a text file or non-TTY.
    pub fn text() -> Self {
        Glyphs {
            should_write_ansi_escape_codes: false,
        }
    }

    /// Glyphs used for output to a TTY.
    pub fn pretty() -> Self {
        Glyphs {
            should_write_ansi_escape_codes: true,
        }
    }

    /// Render `text` with the given style, or return it unchanged if escape
    /// codes are disabled.
    pub fn render(&self, style: TextStyle, text: impl AsRef<str>) -> String {
        let text = text.as_ref();
        if self.should_write_ansi_escape_codes {
            style
                .to_console_style()
                .force_styling(true)
                .apply_to(text)
                .to_string()
        } else {
            text.to_owned()
        }
    }
}
