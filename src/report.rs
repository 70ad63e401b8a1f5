use std::fmt;

/// File name offered for every downloaded report.
pub const REPORT_FILE_NAME: &str = "plant_diagnosis_report.txt";
pub const REPORT_MIME_TYPE: &str = "text/plain";

/// Placeholder health rating shown with every report.
///
/// The model is asked for a rating but its reply is free-form text, so the
/// displayed value is this constant and is not read from the diagnosis.
pub const PLACEHOLDER_RATING: u8 = 3;
pub const MAX_RATING: u8 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StarRating {
    filled: u8,
}

impl StarRating {
    pub fn new(filled: u8) -> Self {
        Self {
            filled: filled.min(MAX_RATING),
        }
    }

    pub fn filled(&self) -> u8 {
        self.filled
    }

    pub fn to_html(&self) -> String {
        format!(r#"<div class="star-rating">{self}</div>"#)
    }
}

impl fmt::Display for StarRating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for i in 0..MAX_RATING {
            f.write_str(if i < self.filled { "★" } else { "☆" })?;
        }
        Ok(())
    }
}

/// A plain text attachment served to the browser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Download {
    pub file_name: &'static str,
    pub mime_type: &'static str,
    pub body: String,
}

/// The rendered result of one successful analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    text: String,
    rating: StarRating,
}

impl Report {
    pub fn render(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            rating: StarRating::new(PLACEHOLDER_RATING),
        }
    }

    /// The diagnosis exactly as the model returned it.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn rating(&self) -> StarRating {
        self.rating
    }

    /// Diagnosis panel body: escaped text with line breaks kept as `<br>`.
    pub fn to_html(&self) -> String {
        format!(
            r#"<div class="diagnosis-box">{}</div>"#,
            escape_html(&self.text).replace('\n', "<br>")
        )
    }

    pub fn download(&self) -> Download {
        Download {
            file_name: REPORT_FILE_NAME,
            mime_type: REPORT_MIME_TYPE,
            body: self.text.clone(),
        }
    }
}

pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
