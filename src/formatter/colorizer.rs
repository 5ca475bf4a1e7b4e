//! Color output support for terminal formatting
//!
//! - ANSI color codes for different value types
//! - Colorizer that renders shell-style values with or without color

/// ANSI color codes for terminal output
pub struct AnsiColors;

impl AnsiColors {
    pub const RESET: &'static str = "\x1b[0m";
    pub const BOLD: &'static str = "\x1b[1m";
    pub const DIM: &'static str = "\x1b[2m";

    pub const RED: &'static str = "\x1b[31m";
    pub const GREEN: &'static str = "\x1b[32m";
    pub const YELLOW: &'static str = "\x1b[33m";
    pub const MAGENTA: &'static str = "\x1b[35m";
    pub const CYAN: &'static str = "\x1b[36m";

    pub const BRIGHT_BLACK: &'static str = "\x1b[90m";
}

/// Color scheme for output highlighting
#[derive(Debug, Clone, Copy)]
pub struct Colorizer {
    enabled: bool,
}

impl Colorizer {
    /// Create a new colorizer
    ///
    /// # Arguments
    /// * `enabled` - Enable color output
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    fn paint(&self, color: &str, text: &str) -> String {
        if self.enabled {
            format!("{}{}{}", color, text, AnsiColors::RESET)
        } else {
            text.to_string()
        }
    }

    /// `ERROR: <message>` in red
    pub fn error(&self, text: &str) -> String {
        self.paint(AnsiColors::RED, &format!("ERROR: {}", text))
    }

    /// Section headers such as shard banners
    pub fn header(&self, text: &str) -> String {
        self.paint(AnsiColors::BOLD, text)
    }

    /// Hints and secondary text
    pub fn hint(&self, text: &str) -> String {
        self.paint(AnsiColors::DIM, text)
    }

    /// Document keys, unquoted
    pub fn field_key(&self, key: &str) -> String {
        self.paint(AnsiColors::CYAN, key)
    }

    /// String values, single-quoted
    pub fn string(&self, text: &str) -> String {
        let escaped = text.replace('\\', "\\\\").replace('\'', "\\'");
        self.paint(AnsiColors::GREEN, &format!("'{}'", escaped))
    }

    pub fn number(&self, text: &str) -> String {
        self.paint(AnsiColors::YELLOW, text)
    }

    pub fn boolean(&self, value: bool) -> String {
        self.paint(AnsiColors::YELLOW, &value.to_string())
    }

    pub fn null(&self) -> String {
        self.paint(AnsiColors::BRIGHT_BLACK, "null")
    }

    /// `Name('value')` wrappers such as `ObjectId('...')`
    pub fn type_wrapper(&self, name: &str, value: &str) -> String {
        self.paint(AnsiColors::MAGENTA, &format!("{}('{}')", name, value))
    }

    pub fn iso_date(&self, iso: &str) -> String {
        self.type_wrapper("ISODate", iso)
    }

    pub fn bin_data(&self, subtype: u8, hex: &str) -> String {
        self.paint(AnsiColors::MAGENTA, &format!("BinData({}, '{}')", subtype, hex))
    }

    pub fn regex(&self, pattern: &str, options: &str) -> String {
        self.paint(AnsiColors::RED, &format!("/{}/{}", pattern, options))
    }

    pub fn timestamp(&self, time: u32, increment: u32) -> String {
        self.paint(
            AnsiColors::MAGENTA,
            &format!("Timestamp({{ t: {}, i: {} }})", time, increment),
        )
    }
}
