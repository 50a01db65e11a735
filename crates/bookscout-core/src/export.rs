use crate::{models::BookRecord, Error, Result};
use std::path::Path;

/// Export format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
    Markdown,
}

impl ExportFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "json" => Some(ExportFormat::Json),
            "csv" => Some(ExportFormat::Csv),
            "md" | "markdown" => Some(ExportFormat::Markdown),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
            ExportFormat::Markdown => "md",
        }
    }
}

/// Writes book lists (bookmarks, recently viewed, search results) to files
pub struct Exporter;

impl Exporter {
    /// Export to a file, picking the format from its extension
    pub fn export_to_file<P: AsRef<Path>>(books: &[BookRecord], path: P) -> Result<()> {
        let path = path.as_ref();

        let format = path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(ExportFormat::from_extension)
            .ok_or_else(|| {
                Error::ConfigError(
                    "Could not determine export format from extension. Use .json, .csv, or .md"
                        .to_string(),
                )
            })?;

        Self::export_to_file_with_format(books, path, format)
    }

    pub fn export_to_file_with_format<P: AsRef<Path>>(
        books: &[BookRecord],
        path: P,
        format: ExportFormat,
    ) -> Result<()> {
        let content = Self::render(books, format)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn render(books: &[BookRecord], format: ExportFormat) -> Result<String> {
        Ok(match format {
            ExportFormat::Json => Self::to_json(books)?,
            ExportFormat::Csv => Self::to_csv(books),
            ExportFormat::Markdown => Self::to_markdown(books),
        })
    }

    pub fn to_json(books: &[BookRecord]) -> Result<String> {
        Ok(serde_json::to_string_pretty(books)?)
    }

    pub fn to_csv(books: &[BookRecord]) -> String {
        let mut output = String::from(
            "ISBN,Title,Authors,Translators,Publisher,Price,Sale Price,Release Date,Status,URL\n",
        );

        for book in books {
            output.push_str(&format!(
                "{},{},{},{},{},{},{},{},{},{}\n",
                Self::escape_csv(&book.isbn),
                Self::escape_csv(&book.title),
                Self::escape_csv(&book.authors.join("; ")),
                Self::escape_csv(&book.translators.join("; ")),
                Self::escape_csv(&book.publisher),
                book.price,
                book.sale_price,
                book.release_day().unwrap_or(""),
                Self::escape_csv(&book.status),
                Self::escape_csv(&book.detail_url),
            ));
        }

        output
    }

    pub fn to_markdown(books: &[BookRecord]) -> String {
        let mut output = String::from("# Books\n\n");
        output.push_str(&format!("Total books: {}\n\n---\n\n", books.len()));

        for book in books {
            if book.detail_url.is_empty() {
                output.push_str(&format!("## {}\n\n", book.title));
            } else {
                output.push_str(&format!("## [{}]({})\n\n", book.title, book.detail_url));
            }

            output.push_str("| Field | Value |\n");
            output.push_str("|-------|-------|\n");
            output.push_str(&format!("| Authors | {} |\n", book.authors_display()));
            if !book.translators.is_empty() {
                output.push_str(&format!("| Translators | {} |\n", book.translators.join(", ")));
            }
            output.push_str(&format!("| Publisher | {} |\n", book.publisher));
            output.push_str(&format!("| Price | {} |\n", format_price(book.effective_price())));
            if let Some(day) = book.release_day() {
                output.push_str(&format!("| Released | {} |\n", day));
            }
            output.push_str(&format!("| ISBN | {} |\n", book.isbn));

            if !book.description.is_empty() {
                output.push_str(&format!("\n{}\n", book.description));
            }

            output.push_str("\n---\n\n");
        }

        output
    }

    fn escape_csv(s: &str) -> String {
        if s.contains(',') || s.contains('"') || s.contains('\n') {
            format!("\"{}\"", s.replace('"', "\"\""))
        } else {
            s.to_string()
        }
    }
}

/// Whole-won price with thousands separators, e.g. "27,000원"
pub fn format_price(price: i64) -> String {
    let digits = price.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    let sign = if price < 0 { "-" } else { "" };
    format!("{}{}원", sign, grouped)
}
