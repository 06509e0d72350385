use colored::Color;
use once_cell::sync::Lazy;

use schemaplan::ChangeType;

/// CLI color theme
pub struct ColorTheme {
    pub success: Color,
    pub error: Color,
    pub warning: Color,
    pub info: Color,
    /// Section headings and help headers
    pub heading: Color,
    /// Example group titles, command names
    pub accent: Color,
    pub dim: Color,
    pub key: Color,
    pub value: Color,
}

impl Default for ColorTheme {
    fn default() -> Self {
        Self {
            success: Color::Green,
            error: Color::Red,
            warning: Color::Yellow,
            info: Color::Blue,
            heading: Color::Cyan,
            accent: Color::BrightBlue,
            dim: Color::BrightBlack,
            key: Color::BrightCyan,
            value: Color::White,
        }
    }
}

impl ColorTheme {
    pub fn change(&self, change: ChangeType) -> Color {
        match change {
            ChangeType::Create => self.success,
            ChangeType::Alter => self.warning,
            ChangeType::Drop => self.error,
        }
    }
}

pub static THEME: Lazy<ColorTheme> = Lazy::new(ColorTheme::default);

pub struct Icons {
    pub success: &'static str,
    pub error: &'static str,
    pub warning: &'static str,
    pub info: &'static str,
    pub arrow: &'static str,
    pub bullet: &'static str,
    pub loading: &'static str,
}

pub const ICONS: Icons = Icons {
    success: "✓",
    error: "✗",
    warning: "⚠",
    info: "ℹ",
    arrow: "→",
    bullet: "•",
    loading: "⟳",
};
