//! Blob store object layout
//!
//! ```text
//! uploads/<ts>-<name>.pdf
//! split_pages/<docId>/page_<n>.pdf
//! <name>-optimized.pdf
//! <name>-linearized.pdf
//! ```

pub const UPLOADS_PREFIX: &str = "uploads/";
pub const SPLIT_PAGES_PREFIX: &str = "split_pages/";
pub const OPTIMIZED_SUFFIX: &str = "-optimized.pdf";
pub const LINEARIZED_SUFFIX: &str = "-linearized.pdf";

/// Reduce a (possibly Hebrew) file name to characters safe in object keys
pub fn sanitize_file_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
            out.push(c);
        } else if !out.ends_with('_') {
            out.push('_');
        }
    }

    let trimmed = out.trim_matches('_');
    if trimmed.is_empty() || trimmed == ".pdf" {
        "document.pdf".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Key for an original upload
pub fn upload_key(timestamp_millis: i64, file_name: &str) -> String {
    let name = sanitize_file_name(file_name);
    let name = if name.to_lowercase().ends_with(".pdf") {
        name
    } else {
        format!("{}.pdf", name)
    };
    format!("{}{}-{}", UPLOADS_PREFIX, timestamp_millis, name)
}

/// Key for one page produced by the split job
pub fn split_page_key(document_id: &str, page_number: u32) -> String {
    format!("{}{}/page_{}.pdf", SPLIT_PAGES_PREFIX, document_id, page_number)
}

fn strip_pdf_extension(path: &str) -> &str {
    let split = path.len().checked_sub(4).filter(|&i| path.is_char_boundary(i));
    match split {
        Some(i) if path[i..].eq_ignore_ascii_case(".pdf") => &path[..i],
        _ => path,
    }
}

/// Key the optimize job writes next to the original
pub fn optimized_key(original: &str) -> String {
    format!("{}{}", strip_pdf_extension(original), OPTIMIZED_SUFFIX)
}

/// Key the linearize job writes next to the original
pub fn linearized_key(original: &str) -> String {
    format!("{}{}", strip_pdf_extension(original), LINEARIZED_SUFFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_hebrew_name() {
        assert_eq!(sanitize_file_name("ארכיון 1948.pdf"), "1948.pdf");
        assert_eq!(sanitize_file_name("מסמך.pdf"), "document.pdf");
        assert_eq!(sanitize_file_name("report final (2).pdf"), "report_final_2_.pdf");
    }

    #[test]
    fn test_upload_key() {
        assert_eq!(upload_key(1700000000000, "letters.pdf"), "uploads/1700000000000-letters.pdf");
        assert_eq!(upload_key(5, "letters"), "uploads/5-letters.pdf");
    }

    #[test]
    fn test_derived_keys() {
        assert_eq!(split_page_key("doc-1", 12), "split_pages/doc-1/page_12.pdf");
        assert_eq!(optimized_key("uploads/5-a.pdf"), "uploads/5-a-optimized.pdf");
        assert_eq!(linearized_key("uploads/5-a.PDF"), "uploads/5-a-linearized.pdf");
    }
}
