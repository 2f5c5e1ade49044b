//! Parsed manifest items.

/// One non-empty manifest line, classified
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentItem {
    /// Line that looks like an image URL
    Image { raw: String, url: String },

    /// Anything else
    Text { raw: String },
}

impl ContentItem {
    pub fn image(line: impl Into<String>) -> Self {
        let raw = line.into();
        Self::Image {
            url: raw.clone(),
            raw,
        }
    }

    pub fn text(line: impl Into<String>) -> Self {
        Self::Text { raw: line.into() }
    }

    /// The trimmed source line
    pub fn raw(&self) -> &str {
        match self {
            Self::Image { raw, .. } | Self::Text { raw } => raw,
        }
    }

    /// Image URL, if this is an image
    pub fn image_url(&self) -> Option<&str> {
        match self {
            Self::Image { url, .. } => Some(url),
            Self::Text { .. } => None,
        }
    }
}

impl std::fmt::Display for ContentItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Image { url, .. } => write!(f, "[image] {}", url),
            Self::Text { raw } => write!(f, "[text]  {}", raw),
        }
    }
}
