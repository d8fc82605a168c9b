use crate::error::TableportError;

/// A file inside a Unity Catalog volume: `/Volumes/<catalog>/<schema>/<volume>/<path...>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumePath(String);

impl VolumePath {
    pub fn parse(input: &str) -> Result<Self, TableportError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(TableportError::validation("`file_path` is required."));
        }

        let Some(rest) = input.strip_prefix("/Volumes/") else {
            return Err(TableportError::validation(format!(
                "file path must start with /Volumes/: '{}'",
                input
            )));
        };

        let segments: Vec<&str> = rest.split('/').collect();
        if segments.len() < 4 {
            return Err(TableportError::validation(
                "file path must name a catalog, schema, volume and file",
            ));
        }
        if segments
            .iter()
            .any(|s| s.is_empty() || *s == "." || *s == ".." || s.chars().any(char::is_control))
        {
            return Err(TableportError::validation(format!(
                "invalid file path segment in '{}'",
                input
            )));
        }

        Ok(Self(input.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Path segments after the leading `/`, starting with `Volumes`.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').skip(1)
    }

    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or_default()
    }
}
