//! Form binding: multipart body → raw fields → typed input or field errors.

use axum::extract::multipart::{Multipart, MultipartError};
use bytes::Bytes;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use std::str::FromStr;

/// Multipart field names that carry the uploaded image.
const FILE_FIELDS: [&str; 2] = ["image", "file"];

#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub data: Bytes,
}

/// Submitted form before validation.
#[derive(Debug, Clone, Default)]
pub struct RawForm {
    fields: BTreeMap<String, String>,
    /// Only set when a file part with content was submitted.
    pub file: Option<UploadedFile>,
}

impl RawForm {
    pub async fn from_multipart(mut multipart: Multipart) -> Result<Self, MultipartError> {
        let mut form = Self::default();

        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or("").to_string();
            let file_name = field.file_name().map(str::to_string);

            if file_name.is_some() || FILE_FIELDS.contains(&name.as_str()) {
                let content_type = field.content_type().map(str::to_string);
                let data = field.bytes().await?;
                // Browsers send an empty part when no file was chosen
                if !data.is_empty() {
                    form.file = Some(UploadedFile {
                        file_name,
                        content_type,
                        data,
                    });
                }
            } else if !name.is_empty() {
                let text = field.text().await?;
                form.fields.insert(name, text);
            }
        }

        Ok(form)
    }

    pub fn with(mut self, name: &str, value: &str) -> Self {
        self.fields.insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_file(mut self, file_name: &str, data: impl Into<Bytes>) -> Self {
        let data = data.into();
        self.file = if data.is_empty() {
            None
        } else {
            Some(UploadedFile {
                file_name: Some(file_name.to_string()),
                content_type: None,
                data,
            })
        };
        self
    }

    /// Trimmed value of a field; blank counts as absent.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    /// Submitted values, echoed back when the form is redisplayed.
    pub fn values(&self) -> BTreeMap<String, String> {
        self.fields.clone()
    }
}

/// Validation failures keyed by form field.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errors = Self::default();
        errors.add(field, message);
        errors
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }
}

/// Reads fields off a [`RawForm`], collecting every failure rather than
/// stopping at the first.
///
/// Accessors return placeholder values for failed fields; the caller builds
/// its input regardless and [`Binder::finish`] discards it if anything failed.
pub struct Binder<'a> {
    form: &'a RawForm,
    errors: FieldErrors,
}

impl<'a> Binder<'a> {
    pub fn new(form: &'a RawForm) -> Self {
        Self {
            form,
            errors: FieldErrors::default(),
        }
    }

    pub fn required(&mut self, field: &str, label: &str) -> String {
        match self.form.text(field) {
            Some(v) => v.to_string(),
            None => {
                self.errors
                    .add(field, format!("The {label} field is required."));
                String::new()
            }
        }
    }

    pub fn required_max_len(&mut self, field: &str, label: &str, max: usize) -> String {
        let value = self.required(field, label);
        if value.chars().count() > max {
            self.errors.add(
                field,
                format!("The field {label} must be a string with a maximum length of {max}."),
            );
        }
        value
    }

    pub fn optional(&self, field: &str) -> Option<String> {
        self.form.text(field).map(str::to_string)
    }

    pub fn required_int(&mut self, field: &str, label: &str) -> i32 {
        let Some(raw) = self.form.text(field) else {
            self.errors
                .add(field, format!("The {label} field is required."));
            return 0;
        };
        match raw.parse::<i32>() {
            Ok(v) => v,
            Err(_) => {
                self.errors
                    .add(field, format!("The value '{raw}' is not valid for {label}."));
                0
            }
        }
    }

    /// Non-negative decimal; blank means zero.
    pub fn optional_price(&mut self, field: &str, label: &str) -> Decimal {
        let Some(raw) = self.form.text(field) else {
            return Decimal::ZERO;
        };
        match Decimal::from_str(raw) {
            Ok(v) if !v.is_sign_negative() => v,
            _ => {
                self.errors
                    .add(field, format!("The value '{raw}' is not valid for {label}."));
                Decimal::ZERO
            }
        }
    }

    /// Date strictly after `now`.
    pub fn required_future_date(
        &mut self,
        field: &str,
        label: &str,
        now: DateTime<Utc>,
    ) -> DateTime<Utc> {
        let Some(raw) = self.form.text(field) else {
            self.errors
                .add(field, format!("The {label} field is required."));
            return now;
        };
        match parse_form_datetime(raw) {
            Some(date) if date > now => date,
            Some(_) => {
                self.errors.add(field, "The date must be in the future.");
                now
            }
            None => {
                self.errors
                    .add(field, format!("The value '{raw}' is not valid for {label}."));
                now
            }
        }
    }

    pub fn require_file(&mut self, field: &str, label: &str) {
        if self.form.file.is_none() {
            self.errors
                .add(field, format!("The {label} field is required."));
        }
    }

    pub fn finish<T>(self, input: T) -> Result<T, FieldErrors> {
        if self.errors.is_empty() {
            Ok(input)
        } else {
            Err(self.errors)
        }
    }
}

/// Accepts HTML `datetime-local` values (read as UTC) and RFC 3339.
pub fn parse_form_datetime(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| Utc.from_utc_datetime(&naive))
}
