//! Output formatting for CLI

use clap::ValueEnum;
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum OutputFormat {
    /// Human-readable table format
    #[default]
    Table,
    /// JSON format
    Json,
    /// YAML format
    Yaml,
    /// Plain text format
    Plain,
}

/// Items that can be displayed as a table row
pub trait TableDisplay {
    fn headers() -> Vec<&'static str>;
    fn row(&self) -> Vec<String>;
}

/// Render a list of items in the requested format
pub fn render_list<T: Serialize + TableDisplay>(items: &[T], format: OutputFormat) -> String {
    match format {
        OutputFormat::Table => {
            if items.is_empty() {
                return "No items found.".to_string();
            }
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic);

            table.set_header(T::headers());
            for item in items {
                table.add_row(item.row());
            }
            table.to_string()
        }
        OutputFormat::Json => serde_json::to_string_pretty(items).unwrap_or_default(),
        OutputFormat::Yaml => serde_yaml::to_string(items).unwrap_or_default(),
        OutputFormat::Plain => items
            .iter()
            .map(|item| {
                T::headers()
                    .iter()
                    .zip(item.row())
                    .map(|(header, value)| format!("{}: {}", header, value))
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .collect::<Vec<_>>()
            .join("\n---\n"),
    }
}

pub fn print_list<T: Serialize + TableDisplay>(items: &[T], format: OutputFormat) {
    println!("{}", render_list(items, format));
}

/// Print success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

/// Print a remediation hint
pub fn print_help(message: &str) {
    eprintln!("  {} {}", "help:".cyan(), message);
}

/// Print warning message
pub fn print_warning(message: &str) {
    eprintln!("{} {}", "!".yellow().bold(), message);
}

/// Print info message
pub fn print_info(message: &str) {
    println!("{}", message.dimmed());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Row {
        id: String,
        ok: bool,
    }

    impl TableDisplay for Row {
        fn headers() -> Vec<&'static str> {
            vec!["ID", "OK"]
        }

        fn row(&self) -> Vec<String> {
            vec![self.id.clone(), self.ok.to_string()]
        }
    }

    fn rows() -> Vec<Row> {
        vec![
            Row {
                id: "example-button--primary".to_string(),
                ok: true,
            },
            Row {
                id: "form--emptyform".to_string(),
                ok: false,
            },
        ]
    }

    #[test]
    fn test_plain_output() {
        assert_eq!(
            render_list(&rows(), OutputFormat::Plain),
            "ID: example-button--primary\nOK: true\n---\nID: form--emptyform\nOK: false"
        );
    }

    #[test]
    fn test_yaml_output() {
        let yaml = render_list(&rows(), OutputFormat::Yaml);
        assert!(yaml.contains("- id: example-button--primary"));
        assert!(yaml.contains("ok: false"));
    }

    #[test]
    fn test_empty_table() {
        assert_eq!(render_list::<Row>(&[], OutputFormat::Table), "No items found.");
        assert_eq!(render_list::<Row>(&[], OutputFormat::Json), "[]");
    }
}
