use std::collections::BTreeMap;

use axum::extract::multipart::{Multipart, MultipartError};

use super::domain::UploadedFile;

/// Untyped key/value bag read from a form post.
///
/// Repeated keys (checkbox groups, multi-selects) keep every value. Keys posted in
/// the `name[]` style are folded onto `name`.
#[derive(Debug, Clone, Default)]
pub struct FormPayload {
    fields: BTreeMap<String, Vec<String>>,
    files: Vec<UploadedFile>,
}

impl FormPayload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_field(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        let name = normalize_name(name.as_ref());
        self.fields.entry(name).or_default().push(value.into());
    }

    pub fn push_file(&mut self, mut file: UploadedFile) {
        file.field = normalize_name(&file.field);
        self.files.push(file);
    }

    /// Builder-style helper, mostly for tests.
    pub fn with_field(mut self, name: &str, value: &str) -> Self {
        self.push_field(name, value);
        self
    }

    pub fn with_file(mut self, file: UploadedFile) -> Self {
        self.push_file(file);
        self
    }

    /// First trimmed, non-empty value for `name`.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)?
            .iter()
            .map(|value| value.trim())
            .find(|value| !value.is_empty())
    }

    /// Every trimmed, non-empty value for `name`, de-duplicated in submission order.
    pub fn values(&self, name: &str) -> Vec<String> {
        let mut seen = Vec::new();
        for value in self.fields.get(name).into_iter().flatten() {
            let value = value.trim();
            if !value.is_empty() && !seen.iter().any(|existing: &String| existing == value) {
                seen.push(value.to_string());
            }
        }
        seen
    }

    /// HTML checkboxes post `on`; JS clients post `true`.
    pub fn checked(&self, name: &str) -> bool {
        self.text(name)
            .map(|value| {
                matches!(
                    value.to_ascii_lowercase().as_str(),
                    "on" | "true" | "1" | "yes" | "ja"
                )
            })
            .unwrap_or(false)
    }

    /// Fields whose key starts with `prefix`, with the prefix stripped.
    pub fn with_prefix<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = (&'a str, &'a str)> {
        self.fields.iter().filter_map(move |(key, values)| {
            let suffix = key.strip_prefix(prefix)?;
            let value = values.iter().map(|v| v.trim()).find(|v| !v.is_empty())?;
            Some((suffix, value))
        })
    }

    /// Files posted under `field`. Browsers send an empty part when nothing was chosen;
    /// those are dropped while reading the multipart body.
    pub fn files(&self, field: &str) -> Vec<&UploadedFile> {
        self.files.iter().filter(|file| file.field == field).collect()
    }

    /// Drain a multipart body into a payload.
    pub async fn from_multipart(mut multipart: Multipart) -> Result<Self, MultipartError> {
        let mut payload = Self::new();

        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();
            if name.is_empty() {
                continue;
            }

            match field.file_name().map(str::to_string) {
                Some(file_name) => {
                    let content_type = field.content_type().map(str::to_string);
                    let bytes = field.bytes().await?;
                    if file_name.trim().is_empty() && bytes.is_empty() {
                        continue;
                    }
                    payload.push_file(UploadedFile {
                        field: name,
                        file_name,
                        content_type,
                        bytes,
                    });
                }
                None => {
                    let value = field.text().await?;
                    payload.push_field(&name, value);
                }
            }
        }

        Ok(payload)
    }
}

fn normalize_name(name: &str) -> String {
    name.trim().trim_end_matches("[]").to_string()
}
