//! Classification of resources into the formats the counters understand.

use std::fmt;

const SPREADSHEET_EXTENSIONS: &[&str] = &["xlsx", "xls", "xlsm", "ods"];
const SPREADSHEET_TAGS: &[&str] = &["xlsx", "xls", "xlsm", "ods", "excel"];
const ARCHIVE_TAGS: &[&str] = &["zip", "archive"];

/// File formats with a dedicated row counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceFormat {
    /// `.csv` bodies, counted while streaming.
    DelimitedText,
    /// Workbooks, downloaded then parsed.
    Spreadsheet,
    /// Zip archives of `.csv` entries.
    Archive,
    Unrecognized,
}

impl ResourceFormat {
    /// Order in which the auditor tries the file-based counters.
    pub const COUNTER_ORDER: [ResourceFormat; 3] = [
        ResourceFormat::DelimitedText,
        ResourceFormat::Spreadsheet,
        ResourceFormat::Archive,
    ];

    /// Classifies by the extension of the URL path, ignoring query and fragment.
    pub fn from_url(url: &str) -> Self {
        match url_extension(url).as_deref() {
            Some("csv") => ResourceFormat::DelimitedText,
            Some("zip") => ResourceFormat::Archive,
            Some(ext) if SPREADSHEET_EXTENSIONS.contains(&ext) => ResourceFormat::Spreadsheet,
            _ => ResourceFormat::Unrecognized,
        }
    }

    /// Classifies by the catalog format tag.
    pub fn from_tag(tag: Option<&str>) -> Self {
        let Some(tag) = tag.map(|t| t.trim().to_lowercase()) else {
            return ResourceFormat::Unrecognized;
        };
        if tag == "csv" {
            ResourceFormat::DelimitedText
        } else if SPREADSHEET_TAGS.contains(&tag.as_str()) {
            ResourceFormat::Spreadsheet
        } else if ARCHIVE_TAGS.contains(&tag.as_str()) {
            ResourceFormat::Archive
        } else {
            ResourceFormat::Unrecognized
        }
    }

    /// Best single label for a resource: a recognized tag wins over the extension.
    ///
    /// ```
    /// use census_core::ResourceFormat;
    ///
    /// assert_eq!(
    ///     ResourceFormat::classify(Some("https://x.org/data.zip"), Some("xlsx")),
    ///     ResourceFormat::Spreadsheet
    /// );
    /// assert_eq!(
    ///     ResourceFormat::classify(Some("https://x.org/data.CSV?dl=1"), None),
    ///     ResourceFormat::DelimitedText
    /// );
    /// assert_eq!(
    ///     ResourceFormat::classify(Some("https://x.org/report.pdf"), Some("pdf")),
    ///     ResourceFormat::Unrecognized
    /// );
    /// ```
    pub fn classify(url: Option<&str>, tag: Option<&str>) -> Self {
        match ResourceFormat::from_tag(tag) {
            ResourceFormat::Unrecognized => {
                url.map_or(ResourceFormat::Unrecognized, Self::from_url)
            }
            format => format,
        }
    }

    /// Whether this format's counter applies to the resource.
    ///
    /// The delimited-text counter only looks at the URL; the spreadsheet and
    /// archive counters accept either a matching tag or a matching extension.
    pub fn accepts(self, url: &str, tag: Option<&str>) -> bool {
        match self {
            ResourceFormat::DelimitedText => Self::from_url(url) == ResourceFormat::DelimitedText,
            ResourceFormat::Spreadsheet | ResourceFormat::Archive => {
                Self::from_tag(tag) == self || Self::from_url(url) == self
            }
            ResourceFormat::Unrecognized => false,
        }
    }

    /// Counters applicable to a resource, in [`Self::COUNTER_ORDER`].
    pub fn counters_for<'a>(
        url: &'a str,
        tag: Option<&'a str>,
    ) -> impl Iterator<Item = ResourceFormat> + 'a {
        Self::COUNTER_ORDER
            .into_iter()
            .filter(move |format| format.accepts(url, tag))
    }

    pub fn label(&self) -> &'static str {
        match self {
            ResourceFormat::DelimitedText => "csv",
            ResourceFormat::Spreadsheet => "spreadsheet",
            ResourceFormat::Archive => "archive",
            ResourceFormat::Unrecognized => "unrecognized",
        }
    }
}

impl fmt::Display for ResourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The URL without its query string and fragment.
pub fn url_path(url: &str) -> &str {
    let end = url.find(['?', '#']).unwrap_or(url.len());
    &url[..end]
}

/// Lowercased extension of the last path segment, if any.
///
/// ```
/// use census_core::format::url_extension;
///
/// assert_eq!(url_extension("https://x.org/a/b.XLSX?v=2"), Some("xlsx".to_string()));
/// assert_eq!(url_extension("https://x.org/a/b"), None);
/// ```
pub fn url_extension(url: &str) -> Option<String> {
    let path = url_path(url);
    let segment = path.rsplit('/').next().unwrap_or(path);
    let (stem, ext) = segment.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_lowercase())
}

/// File suffix under which a downloaded workbook is stored so the parser can
/// detect its flavour.
pub fn workbook_suffix(url: &str, tag: Option<&str>) -> String {
    if let Some(ext) = url_extension(url) {
        if SPREADSHEET_EXTENSIONS.contains(&ext.as_str()) {
            return format!(".{ext}");
        }
    }
    match tag.map(|t| t.trim().to_lowercase()).as_deref() {
        Some(t @ ("xls" | "xlsm" | "ods")) => format!(".{t}"),
        _ => ".xlsx".to_string(),
    }
}
